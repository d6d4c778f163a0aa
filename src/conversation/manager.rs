//! Per-turn context management: condense first, truncate as a last resort

use crate::condense::{CondenseRequest, Condenser};
use crate::conversation::message::Message;
use crate::conversation::trigger::{resolve_trigger, CondenseTrigger, ProfileOverride};
use crate::conversation::truncation;
use crate::error::Result;
use crate::metrics::METRICS;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::tokens::CachedTokenCounter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fraction of removable messages hidden when truncation runs
const TRUNCATION_FRACTION: f64 = 0.5;

/// Condensation policy shared across conversations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CondensationConfig {
    #[serde(default = "default_auto_condense")]
    pub auto_condense: bool,
    #[serde(default = "default_auto_condense_percent")]
    pub auto_condense_percent: f64,
    #[serde(default)]
    pub profile_id: Option<String>,
    #[serde(default)]
    pub profile_thresholds: HashMap<String, f64>,
    #[serde(default)]
    pub profile_overrides: HashMap<String, ProfileOverride>,
}

fn default_auto_condense() -> bool {
    true
}

fn default_auto_condense_percent() -> f64 {
    75.0
}

impl Default for CondensationConfig {
    fn default() -> Self {
        Self {
            auto_condense: default_auto_condense(),
            auto_condense_percent: default_auto_condense_percent(),
            profile_id: None,
            profile_thresholds: HashMap::new(),
            profile_overrides: HashMap::new(),
        }
    }
}

/// Inputs for one management pass
#[derive(Debug, Clone)]
pub struct ManageContextOptions {
    pub messages: Vec<Message>,
    pub system_prompt: String,
    pub conversation_id: String,
    /// Reported token total for everything before the newest message
    pub total_tokens: usize,
    pub context_window: usize,
    pub max_tokens: Option<usize>,
    /// Overrides the configured profile for this call
    pub profile_id: Option<String>,
    pub custom_prompt: Option<String>,
    /// Passed through to the condenser untouched
    pub use_native_tools: bool,
}

/// Outcome of one management pass
#[derive(Debug, Clone)]
pub struct ManageContextResult {
    pub messages: Vec<Message>,
    pub summary: String,
    pub cost: f64,
    /// Non-fatal condensation failure, present alongside whatever fallback ran
    pub error: Option<String>,
    pub truncation_id: Option<String>,
    pub messages_removed: usize,
    /// Recounted context size, present when condensation or truncation changed it
    pub new_context_tokens: Option<usize>,
    pub prev_context_tokens: usize,
}

/// Orchestrates the condense-or-truncate decision for each turn
pub struct ConversationManager {
    counter: CachedTokenCounter,
    condenser: Arc<dyn Condenser>,
    telemetry: Arc<dyn TelemetrySink>,
    config: CondensationConfig,
}

impl ConversationManager {
    pub fn new(
        counter: CachedTokenCounter,
        condenser: Arc<dyn Condenser>,
        telemetry: Arc<dyn TelemetrySink>,
        config: CondensationConfig,
    ) -> Self {
        Self {
            counter,
            condenser,
            telemetry,
            config,
        }
    }

    pub fn config(&self) -> &CondensationConfig {
        &self.config
    }

    fn trigger_for(&self, options: &ManageContextOptions) -> CondenseTrigger {
        let profile_id = options
            .profile_id
            .as_deref()
            .or(self.config.profile_id.as_deref());
        resolve_trigger(
            options.context_window,
            options.max_tokens,
            self.config.auto_condense_percent,
            &self.config.profile_thresholds,
            &self.config.profile_overrides,
            profile_id,
        )
    }

    /// Token size of the newest message plus the reported running total
    fn prev_context_tokens(&self, options: &ManageContextOptions) -> Result<usize> {
        let newest = match options.messages.last() {
            Some(message) => self.counter.count_message(message)?,
            None => 0,
        };
        Ok(options.total_tokens + newest)
    }

    /// System prompt plus every surviving message, markers excluded
    fn context_tokens(&self, system_prompt: &str, messages: &[Message]) -> Result<usize> {
        let mut total = self.counter.count_text(system_prompt)?;
        for message in messages.iter().filter(|message| message.is_visible()) {
            total += self.counter.count_message(message)?;
        }
        Ok(total)
    }

    fn needs_management(
        &self,
        trigger: &CondenseTrigger,
        prev_context_tokens: usize,
        context_window: usize,
    ) -> bool {
        prev_context_tokens as f64 > trigger.allowed_tokens
            || (self.config.auto_condense
                && trigger.should_condense(prev_context_tokens, context_window))
    }

    /// Whether a management pass would change the conversation
    ///
    /// Shares the decision logic with [`manage_context`](Self::manage_context),
    /// so callers can warn before the expensive path runs.
    pub fn will_manage_context(&self, options: &ManageContextOptions) -> Result<bool> {
        let trigger = self.trigger_for(options);
        let prev_context_tokens = self.prev_context_tokens(options)?;
        Ok(self.needs_management(&trigger, prev_context_tokens, options.context_window))
    }

    /// Run one management pass over the conversation
    ///
    /// Condensation failures are reported through the result's `error` field
    /// and fall back to truncation when the context is over budget. The only
    /// `Err` this returns comes from token counting itself.
    pub async fn manage_context(
        &self,
        options: ManageContextOptions,
    ) -> Result<ManageContextResult> {
        let trigger = self.trigger_for(&options);
        let prev_context_tokens = self.prev_context_tokens(&options)?;

        let ManageContextOptions {
            messages,
            system_prompt,
            conversation_id,
            context_window,
            custom_prompt,
            use_native_tools,
            ..
        } = options;

        debug!(
            conversation_id = %conversation_id,
            prev_context_tokens,
            effective_budget = trigger.effective_budget,
            "Evaluating conversation context"
        );

        let over_budget = prev_context_tokens as f64 > trigger.allowed_tokens;
        let mut cost = 0.0;
        let mut error = None;

        if self.config.auto_condense
            && trigger.should_condense(prev_context_tokens, context_window)
        {
            let request = CondenseRequest {
                messages: messages.clone(),
                system_prompt: system_prompt.clone(),
                conversation_id: conversation_id.clone(),
                current_token_total: prev_context_tokens,
                is_automatic: true,
                custom_prompt,
                model_override: None,
                use_native_tools,
            };
            let condensation = self.condenser.condense(request).await;
            cost = condensation.cost;

            match condensation.error {
                None => {
                    let new_context_tokens =
                        self.context_tokens(&system_prompt, &condensation.messages)?;
                    METRICS.record_condensation(true, cost);
                    METRICS.record_context_tokens(prev_context_tokens, new_context_tokens);
                    self.telemetry.emit(TelemetryEvent::ContextCondensed {
                        conversation_id: conversation_id.clone(),
                        is_automatic: true,
                        prev_context_tokens,
                        new_context_tokens,
                        cost,
                    });
                    info!(
                        conversation_id = %conversation_id,
                        prev_context_tokens,
                        new_context_tokens,
                        "Condensed conversation context"
                    );
                    return Ok(ManageContextResult {
                        messages: condensation.messages,
                        summary: condensation.summary,
                        cost,
                        error: None,
                        truncation_id: None,
                        messages_removed: 0,
                        new_context_tokens: Some(new_context_tokens),
                        prev_context_tokens,
                    });
                }
                Some(message) => {
                    METRICS.record_condensation(false, cost);
                    self.telemetry.emit(TelemetryEvent::CondensationFailed {
                        conversation_id: conversation_id.clone(),
                        is_automatic: true,
                        error: message.clone(),
                    });
                    warn!(
                        conversation_id = %conversation_id,
                        error = %message,
                        "Condensation failed"
                    );
                    error = Some(message);
                }
            }
        }

        if over_budget {
            let truncation_id = Uuid::new_v4().to_string();
            let truncated = truncation::truncate(messages, TRUNCATION_FRACTION, &truncation_id);

            if truncated.messages_removed == 0 {
                return Ok(ManageContextResult {
                    messages: truncated.messages,
                    summary: String::new(),
                    cost,
                    error,
                    truncation_id: None,
                    messages_removed: 0,
                    new_context_tokens: None,
                    prev_context_tokens,
                });
            }

            let new_context_tokens = self.context_tokens(&system_prompt, &truncated.messages)?;
            METRICS.record_truncation(truncated.messages_removed);
            METRICS.record_context_tokens(prev_context_tokens, new_context_tokens);
            self.telemetry.emit(TelemetryEvent::ContextTruncated {
                conversation_id: conversation_id.clone(),
                truncation_id: truncation_id.clone(),
                messages_removed: truncated.messages_removed,
                prev_context_tokens,
                new_context_tokens,
            });
            info!(
                conversation_id = %conversation_id,
                truncation_id = %truncation_id,
                hidden = truncated.messages_removed,
                new_context_tokens,
                "Truncated conversation context"
            );
            return Ok(ManageContextResult {
                messages: truncated.messages,
                summary: String::new(),
                cost,
                error,
                truncation_id: Some(truncation_id),
                messages_removed: truncated.messages_removed,
                new_context_tokens: Some(new_context_tokens),
                prev_context_tokens,
            });
        }

        Ok(ManageContextResult {
            messages,
            summary: String::new(),
            cost,
            error,
            truncation_id: None,
            messages_removed: 0,
            new_context_tokens: None,
            prev_context_tokens,
        })
    }
}
