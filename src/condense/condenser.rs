//! Conversation condensation: replace a summarized prefix with one message

use crate::condense::summarizer::Summarizer;
use crate::conversation::message::Message;
use crate::error::Result;
use crate::tokens::CachedTokenCounter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Instruction used when the caller supplies no custom prompt
pub const DEFAULT_CONDENSE_PROMPT: &str = "Summarize the conversation so far. Preserve \
technical details, decisions made, file paths, code identifiers, error messages, and open \
questions. Write a compact narrative the assistant can resume work from without the \
original messages.";

/// One condensation request
#[derive(Debug, Clone)]
pub struct CondenseRequest {
    pub messages: Vec<Message>,
    pub system_prompt: String,
    pub conversation_id: String,
    /// Context size before condensation, used for the shrink check; 0 skips it
    pub current_token_total: usize,
    pub is_automatic: bool,
    pub custom_prompt: Option<String>,
    pub model_override: Option<String>,
    /// Forwarded to condensers that drive provider-native tooling
    pub use_native_tools: bool,
}

/// Condensation outcome
///
/// A failure never surfaces as an `Err`: the original messages come back with
/// `error` set and whatever spend the attempt incurred.
#[derive(Debug, Clone, Default)]
pub struct Condensation {
    pub messages: Vec<Message>,
    pub summary: String,
    pub cost: f64,
    pub error: Option<String>,
}

impl Condensation {
    /// Failure outcome that hands the original messages back untouched
    pub fn failed(messages: Vec<Message>, cost: f64, error: impl Into<String>) -> Self {
        Self {
            messages,
            summary: String::new(),
            cost,
            error: Some(error.into()),
        }
    }
}

/// Condensation seam used by the conversation manager
#[async_trait]
pub trait Condenser: Send + Sync {
    async fn condense(&self, request: CondenseRequest) -> Condensation;
}

/// Condenser tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CondenserConfig {
    /// Most recent visible messages kept verbatim after condensation
    #[serde(default = "default_keep_recent")]
    pub keep_recent_messages: usize,
    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: usize,
}

fn default_keep_recent() -> usize {
    3
}

fn default_max_summary_tokens() -> usize {
    2000
}

impl Default for CondenserConfig {
    fn default() -> Self {
        Self {
            keep_recent_messages: default_keep_recent(),
            max_summary_tokens: default_max_summary_tokens(),
        }
    }
}

/// Production condenser backed by a summarization collaborator
pub struct LlmCondenser {
    summarizer: Arc<dyn Summarizer>,
    counter: CachedTokenCounter,
    config: CondenserConfig,
}

impl LlmCondenser {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        counter: CachedTokenCounter,
        config: CondenserConfig,
    ) -> Self {
        Self {
            summarizer,
            counter,
            config,
        }
    }

    fn context_tokens(&self, system_prompt: &str, messages: &[Message]) -> Result<usize> {
        let mut total = self.counter.count_text(system_prompt)?;
        total += self.counter.count_messages(messages)?;
        Ok(total)
    }
}

#[async_trait]
impl Condenser for LlmCondenser {
    async fn condense(&self, request: CondenseRequest) -> Condensation {
        let keep = self.config.keep_recent_messages;
        let visible: Vec<usize> = request
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_visible())
            .map(|(i, _)| i)
            .collect();

        // Need the first message, at least one to summarize, and the kept tail
        if visible.len() < keep + 2 {
            return Condensation::failed(request.messages, 0.0, "Not enough messages to condense");
        }

        let tail_start = visible.len() - keep;
        let texts: Vec<String> = visible[..tail_start]
            .iter()
            .map(|&i| {
                let message = &request.messages[i];
                format!("{}: {}", message.role.as_str(), message.text())
            })
            .collect();

        let instruction = request
            .custom_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_CONDENSE_PROMPT);

        debug!(
            conversation_id = %request.conversation_id,
            summarized = texts.len(),
            kept = keep,
            is_automatic = request.is_automatic,
            "Condensing conversation"
        );

        let summary = match self
            .summarizer
            .summarize(
                &texts,
                instruction,
                self.config.max_summary_tokens,
                request.model_override.as_deref(),
            )
            .await
        {
            Ok(summary) => summary,
            Err(e) => return Condensation::failed(request.messages, 0.0, e.to_string()),
        };

        if summary.text.trim().is_empty() {
            return Condensation::failed(
                request.messages,
                summary.cost,
                "Summarizer returned an empty summary",
            );
        }

        let tail: Vec<Message> = visible[tail_start..]
            .iter()
            .map(|&i| request.messages[i].clone())
            .collect();
        let mut summary_message = Message::assistant(summary.text.clone());
        if let Some(first_kept) = tail.first() {
            summary_message.ts = first_kept.ts - chrono::Duration::milliseconds(1);
        }

        let mut condensed = Vec::with_capacity(keep + 2);
        condensed.push(request.messages[visible[0]].clone());
        condensed.push(summary_message);
        condensed.extend(tail);

        let new_total = match self.context_tokens(&request.system_prompt, &condensed) {
            Ok(total) => total,
            Err(e) => return Condensation::failed(request.messages, summary.cost, e.to_string()),
        };
        if request.current_token_total > 0 && new_total >= request.current_token_total {
            return Condensation::failed(
                request.messages,
                summary.cost,
                "Context size increased during condensation",
            );
        }

        info!(
            conversation_id = %request.conversation_id,
            previous_tokens = request.current_token_total,
            new_tokens = new_total,
            cost = summary.cost,
            "Conversation condensed"
        );

        Condensation {
            messages: condensed,
            summary: summary.text,
            cost: summary.cost,
            error: None,
        }
    }
}
