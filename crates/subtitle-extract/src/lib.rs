//! Dual-engine transcript extraction: proxy failover, normalization, and
//! adjacent-phrase deduplication (spec §4.6-4.7).

pub mod engine;
pub mod error;
pub mod extractor;
pub mod normalize;
pub mod proxy_pool;

pub use engine::{FallbackEngine, PrimaryEngine, RawSegment, RawTranscript, TranscriptEngine};
pub use error::{ExtractError, ExtractResult};
pub use extractor::{extract, Extracted};
pub use proxy_pool::{ChosenProxy, ProxyPool};
