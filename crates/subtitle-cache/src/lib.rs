//! Tier-1 (in-process) and Tier-2 (Redis) caching, plus the shared-store-
//! backed rate limiter and proxy failure registry that sit on top of
//! Tier-2 primitives.

pub mod error;
pub mod memory;
pub mod proxy_registry;
pub mod rate_limiter;
pub mod shared;

pub use error::{CacheError, CacheResult};
pub use memory::MemoryCache;
pub use proxy_registry::ProxyRegistry;
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use shared::SharedCache;
