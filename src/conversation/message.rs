//! Conversation message data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Typed content block within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { media_type: String, data: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Message content: plain text or an ordered sequence of typed blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Flatten to plain text; non-text blocks contribute nothing
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// View as a block sequence for token counting
    pub fn to_blocks(&self) -> Vec<ContentBlock> {
        match self {
            Self::Text(text) => vec![ContentBlock::text(text.clone())],
            Self::Blocks(blocks) => blocks.clone(),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A single conversation message
///
/// Messages are append-only from the engine's perspective. Truncation hides
/// a message by setting `truncation_parent`; nothing here ever deletes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    pub ts: DateTime<Utc>,
    /// Id of the truncation event that hid this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_parent: Option<String>,
    /// Marks a synthetic truncation marker record
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_truncation_marker: bool,
}

impl Message {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content,
            ts: Utc::now(),
            truncation_parent: None,
            is_truncation_marker: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }

    /// Visible means not hidden by truncation and not a synthetic marker
    pub fn is_visible(&self) -> bool {
        self.truncation_parent.is_none() && !self.is_truncation_marker
    }

    /// Flattened text content
    pub fn text(&self) -> String {
        self.content.as_text()
    }
}

/// Outcome of one truncation event; immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationResult {
    pub messages: Vec<Message>,
    pub truncation_id: String,
    pub messages_removed: usize,
}
