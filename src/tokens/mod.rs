//! Token counting and the shared token-count cache

pub mod cache;
pub mod counter;

pub use cache::{short_hash, CacheStats, TokenCountingCache};
pub use counter::{CachedTokenCounter, HeuristicCounter, TiktokenCounter, TokenCounter};
