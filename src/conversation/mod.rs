//! Conversation data model and per-turn context management

pub mod manager;
pub mod message;
pub mod trigger;
pub mod truncation;

pub use manager::{
    CondensationConfig, ConversationManager, ManageContextOptions, ManageContextResult,
};
pub use message::{ContentBlock, Message, MessageContent, Role, TruncationResult};
pub use trigger::{
    resolve_trigger, CondenseThreshold, CondenseTrigger, OverrideMode, ProfileOverride,
    ThresholdMode, DEFAULT_RESERVED_OUTPUT_TOKENS, TOKEN_BUFFER_FRACTION,
};
pub use truncation::{removal_count, truncate, visible_indices};
