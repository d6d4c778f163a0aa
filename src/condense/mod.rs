//! Condensation: summarizers, the condenser contract, and summary trees

pub mod condenser;
pub mod hierarchical;
pub mod summarizer;
pub mod tree;

pub use condenser::{
    Condensation, CondenseRequest, Condenser, CondenserConfig, LlmCondenser,
    DEFAULT_CONDENSE_PROMPT,
};
pub use hierarchical::{split_range, HierarchicalSummarizer, SummaryTreeConfig};
pub use summarizer::{
    ExtractiveSummarizer, LlmSummarizer, LlmSummarizerConfig, Summarizer, SummarizerError, Summary,
};
pub use tree::{SummaryLevel, SummaryNode, SummaryTree};
