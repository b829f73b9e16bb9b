pub mod config;
pub mod error;
pub mod types;

pub use config::{EngineConfig, GapConfig, RankerConfig, ScoringConfig};
pub use error::{KeyscopeError, Result};
pub use types::*;
