pub mod coordinator;
pub mod limiter;
pub mod providers;
pub mod run;
pub mod telemetry;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use coordinator::{CancelFlag, FanOutCoordinator, RequestKey};
pub use limiter::{ProviderLimiter, ProviderLimits};
pub use providers::{
    CallResult, KeywordDataProvider, PageAuditProvider, ProviderCallError, SerpDataProvider,
};
pub use run::{AnalysisReport, AnalysisRequest, AnalysisRun};
