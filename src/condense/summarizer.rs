//! LLM-backed summarization collaborator and its offline fallback

use crate::compress::compressor::{score_sentence, split_sentences};
use crate::tokens::CachedTokenCounter;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

/// Summary text plus the spend incurred producing it
#[derive(Debug, Clone)]
pub struct Summary {
    pub text: String,
    pub cost: f64,
}

/// Summarization strategy seam
///
/// `model_override` lets a caller route one request to a different model;
/// implementations without that notion ignore it.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        texts: &[String],
        instruction: &str,
        max_tokens: usize,
        model_override: Option<&str>,
    ) -> Result<Summary, SummarizerError>;
}

/// Configuration for the LLM summarizer
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSummarizerConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Billing rate per 1k prompt tokens, used to report spend
    #[serde(default = "default_prompt_cost")]
    pub prompt_cost_per_1k: f64,
    #[serde(default = "default_completion_cost")]
    pub completion_cost_per_1k: f64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

fn default_temperature() -> f32 {
    0.3
}

fn default_prompt_cost() -> f64 {
    0.00015
}

fn default_completion_cost() -> f64 {
    0.0006
}

impl Default for LlmSummarizerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            prompt_cost_per_1k: default_prompt_cost(),
            completion_cost_per_1k: default_completion_cost(),
        }
    }
}

/// Summarizer backed by an OpenAI-compatible chat completions API
pub struct LlmSummarizer {
    client: Client,
    config: LlmSummarizerConfig,
}

impl LlmSummarizer {
    pub fn new(config: LlmSummarizerConfig) -> Result<Self, SummarizerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SummarizerError::InitializationError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn cost_from_usage(&self, usage: &ChatUsage) -> f64 {
        usage.prompt_tokens as f64 / 1000.0 * self.config.prompt_cost_per_1k
            + usage.completion_tokens as f64 / 1000.0 * self.config.completion_cost_per_1k
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        texts: &[String],
        instruction: &str,
        max_tokens: usize,
        model_override: Option<&str>,
    ) -> Result<Summary, SummarizerError> {
        if texts.is_empty() {
            return Ok(Summary {
                text: String::new(),
                cost: 0.0,
            });
        }

        let model = model_override.unwrap_or(&self.config.model).to_string();
        debug!(
            segments = texts.len(),
            max_tokens,
            model = %model,
            "Requesting summarization"
        );

        let request = ChatCompletionRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: instruction.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: texts.join("\n\n"),
                },
            ],
            max_tokens: Some(max_tokens),
            temperature: Some(self.config.temperature),
        };

        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                debug!(attempt, "Retrying summarization");
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            let mut req = self.client.post(&self.config.api_url).json(&request);
            if let Some(api_key) = &self.config.api_key {
                req = req.header(
                    "Authorization",
                    format!("Bearer {}", api_key.expose_secret()),
                );
            }

            match req.send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        last_error =
                            Some(SummarizerError::ApiError(format!("HTTP {}: {}", status, body)));
                        continue;
                    }

                    match response.json::<ChatCompletionResponse>().await {
                        Ok(completion) => {
                            let cost = completion
                                .usage
                                .as_ref()
                                .map(|u| self.cost_from_usage(u))
                                .unwrap_or(0.0);
                            match completion.choices.first() {
                                Some(choice) => {
                                    return Ok(Summary {
                                        text: choice.message.content.trim().to_string(),
                                        cost,
                                    });
                                }
                                None => {
                                    last_error = Some(SummarizerError::ApiError(
                                        "No choices in response".to_string(),
                                    ));
                                }
                            }
                        }
                        Err(e) => {
                            last_error = Some(SummarizerError::ApiError(format!(
                                "Failed to parse response: {}",
                                e
                            )));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(SummarizerError::NetworkError(e.to_string()));
                }
            }
        }

        warn!(
            attempts = self.config.max_retries,
            "Summarization failed after retries"
        );
        Err(last_error.unwrap_or(SummarizerError::Unknown))
    }
}

/// Extractive fallback: picks the highest-scoring sentences, no network calls
pub struct ExtractiveSummarizer {
    counter: CachedTokenCounter,
}

impl ExtractiveSummarizer {
    pub fn new(counter: CachedTokenCounter) -> Self {
        Self { counter }
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(
        &self,
        texts: &[String],
        _instruction: &str,
        max_tokens: usize,
        _model_override: Option<&str>,
    ) -> Result<Summary, SummarizerError> {
        let combined = texts.join("\n");
        let sentences = split_sentences(&combined);
        let total = sentences.len();
        if total == 0 {
            return Ok(Summary {
                text: String::new(),
                cost: 0.0,
            });
        }

        let scores: Vec<f64> = sentences
            .iter()
            .enumerate()
            .map(|(i, s)| score_sentence(s, i, total))
            .collect();
        let mut ranked: Vec<usize> = (0..total).collect();
        ranked.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        // Take top sentences until the token budget runs out, one minimum
        let mut kept: Vec<usize> = Vec::new();
        let mut used = 0usize;
        for index in ranked {
            let tokens = self
                .counter
                .count_text(&sentences[index])
                .map_err(|e| SummarizerError::ApiError(e.to_string()))?;
            if !kept.is_empty() && used + tokens > max_tokens {
                continue;
            }
            used += tokens;
            kept.push(index);
        }
        kept.sort_unstable();

        let text = kept
            .iter()
            .map(|&i| sentences[i].as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Summary { text, cost: 0.0 })
    }
}

/// Summarizer errors
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Unknown error")]
    Unknown,
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
