//! Token counting backends and the caching wrapper around them

use crate::conversation::message::{ContentBlock, Message, MessageContent};
use crate::error::{ContextError, Result};
use crate::tokens::cache::TokenCountingCache;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Flat per-image estimate, since image tokens are sized by the provider
const IMAGE_BLOCK_TOKENS: usize = 1000;

/// Counts tokens for message content blocks
pub trait TokenCounter: Send + Sync {
    /// Count tokens across a slice of content blocks
    fn count_blocks(&self, blocks: &[ContentBlock]) -> Result<usize>;
}

/// BPE-backed counter using the cl100k_base vocabulary
pub struct TiktokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TiktokenCounter {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base()
            .map_err(|e| ContextError::TokenCount(format!("Failed to load cl100k_base: {}", e)))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_blocks(&self, blocks: &[ContentBlock]) -> Result<usize> {
        let mut total = 0;
        for block in blocks {
            total += match block {
                ContentBlock::Text { text } => self.bpe.encode_ordinary(text).len(),
                ContentBlock::Image { .. } => IMAGE_BLOCK_TOKENS,
            };
        }
        Ok(total)
    }
}

/// Word-count heuristic for environments without the BPE vocabulary
pub struct HeuristicCounter {
    tokens_per_word: f64,
}

impl HeuristicCounter {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }
}

impl Default for HeuristicCounter {
    fn default() -> Self {
        Self::new(1.3)
    }
}

impl TokenCounter for HeuristicCounter {
    fn count_blocks(&self, blocks: &[ContentBlock]) -> Result<usize> {
        let mut total = 0;
        for block in blocks {
            total += match block {
                ContentBlock::Text { text } => {
                    let words = text.split_whitespace().count();
                    (words as f64 * self.tokens_per_word).ceil() as usize
                }
                ContentBlock::Image { .. } => IMAGE_BLOCK_TOKENS,
            };
        }
        Ok(total)
    }
}

/// Token counter that routes every count through the shared cache
#[derive(Clone)]
pub struct CachedTokenCounter {
    cache: Arc<TokenCountingCache>,
    counter: Arc<dyn TokenCounter>,
    model_id: String,
}

impl CachedTokenCounter {
    pub fn new(
        cache: Arc<TokenCountingCache>,
        counter: Arc<dyn TokenCounter>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            counter,
            model_id: model_id.into(),
        }
    }

    /// Count tokens in a plain string
    pub fn count_text(&self, text: &str) -> Result<usize> {
        self.cache.get_or_compute(text, &self.model_id, || {
            self.counter.count_blocks(&[ContentBlock::text(text)])
        })
    }

    /// Count tokens in message content
    pub fn count_content(&self, content: &MessageContent) -> Result<usize> {
        match content {
            MessageContent::Text(text) => self.count_text(text),
            MessageContent::Blocks(blocks) => {
                let key = serde_json::to_string(blocks).map_err(|e| {
                    ContextError::TokenCount(format!("Failed to serialize blocks: {}", e))
                })?;
                self.cache
                    .get_or_compute(&key, &self.model_id, || self.counter.count_blocks(blocks))
            }
        }
    }

    /// Count tokens in a single message's content
    pub fn count_message(&self, message: &Message) -> Result<usize> {
        self.count_content(&message.content)
    }

    /// Count tokens across all messages
    pub fn count_messages(&self, messages: &[Message]) -> Result<usize> {
        let mut total = 0;
        for message in messages {
            total += self.count_message(message)?;
        }
        Ok(total)
    }

    pub fn cache(&self) -> &Arc<TokenCountingCache> {
        &self.cache
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}
