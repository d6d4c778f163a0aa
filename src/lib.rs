//! Context budgeting and condensation for LLM conversations.
//!
//! Each turn, the crate decides whether a conversation still fits its model's
//! context window and shrinks it when it does not: condensation first, which
//! replaces the summarized prefix with a single message, then non-destructive
//! sliding-window truncation as the fallback. Around that core sit
//! hierarchical summary trees with drill-down expansion, relevance-scored
//! context packing, semantic compression that never touches code or URLs, and
//! a shared token-counting cache.
//!
//! [`ContextEngine`] owns the full wiring:
//!
//! ```no_run
//! use context_condenser::{Config, ContextEngine};
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = ContextEngine::from_config(Config::load()?)?;
//! engine.teardown();
//! # Ok(())
//! # }
//! ```

pub mod compress;
pub mod condense;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod prioritize;
pub mod telemetry;
pub mod tokens;

pub use config::Config;
pub use engine::ContextEngine;
pub use error::{ContextError, Result};

/// Commonly used types in one import
pub mod prelude {
    pub use crate::compress::{CompressionLevel, SemanticCompressor};
    pub use crate::condense::{
        Condensation, CondenseRequest, Condenser, HierarchicalSummarizer, LlmCondenser,
        SummaryLevel,
    };
    pub use crate::config::Config;
    pub use crate::conversation::{
        ConversationManager, ManageContextOptions, ManageContextResult, Message, Role,
    };
    pub use crate::engine::ContextEngine;
    pub use crate::error::{ContextError, Result};
    pub use crate::prioritize::{ContextCandidate, ContextItemType, ContextPrioritizer};
    pub use crate::tokens::{CachedTokenCounter, TokenCountingCache};
}
