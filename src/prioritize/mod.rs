//! Relevance scoring and budget packing for context items

pub mod prioritizer;
pub mod scoring;

pub use prioritizer::{
    ContextCandidate, ContextItemType, ContextPrioritizer, PrioritizationRequest,
    PrioritizationResult, PrioritizationStats, PrioritizedContextItem, PrioritizerConfig,
};
pub use scoring::{BoostFactors, PriorityBucket, ScoreWeights};
