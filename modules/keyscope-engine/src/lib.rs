pub mod gap;
pub mod normalize;
pub mod ops;
pub mod rank;
pub mod resolver;
pub mod score;

pub use gap::GapSynthesizer;
pub use normalize::{normalize, CallKind, NormalizeOutcome, RawResponse, RequestContext};
pub use rank::{RankCandidate, Ranker};
pub use resolver::{EntityStore, KeywordEntity, Observed, PageEntity};
pub use score::Scorer;
