//! Budget-aware ranking of candidate context items

use crate::error::Result;
use crate::prioritize::scoring::{
    apply_boosts, combined_score, frequency_score, priority_bucket, recency_score, BoostFactors,
    PriorityBucket, ScoreWeights,
};
use crate::tokens::CachedTokenCounter;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// What kind of context a candidate carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextItemType {
    File,
    Symbol,
    Memory,
    Documentation,
    Conversation,
}

/// A candidate item competing for context budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextCandidate {
    pub id: String,
    pub item_type: ContextItemType,
    /// Origin of the item, typically a file path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub content: String,
    /// Externally supplied relevance in [0, 1]; 0.5 when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
    #[serde(default)]
    pub age_hours: f64,
}

/// One prioritization round
#[derive(Debug, Clone, Default)]
pub struct PrioritizationRequest {
    pub candidates: Vec<ContextCandidate>,
    pub token_budget: usize,
    pub active_file: Option<String>,
    pub recently_edited_files: Vec<String>,
    pub user_mentions: Vec<String>,
}

/// A candidate that made it into the budget
#[derive(Debug, Clone, Serialize)]
pub struct PrioritizedContextItem {
    pub id: String,
    pub item_type: ContextItemType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub content: String,
    pub relevance: f64,
    pub recency: f64,
    pub frequency: f64,
    pub score: f64,
    pub bucket: PriorityBucket,
    pub tokens: usize,
}

/// Packing statistics for one round
#[derive(Debug, Clone, Serialize)]
pub struct PrioritizationStats {
    pub considered: usize,
    pub included: usize,
    pub excluded: usize,
    pub budget_tokens: usize,
    pub used_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrioritizationResult {
    pub included: Vec<PrioritizedContextItem>,
    /// Scored candidates that did not fit the budget, ranking preserved
    pub excluded: Vec<PrioritizedContextItem>,
    pub stats: PrioritizationStats,
}

/// Prioritizer tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrioritizerConfig {
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub boosts: BoostFactors,
    #[serde(default = "default_decay_hours")]
    pub decay_hours: f64,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: f64,
    #[serde(default = "default_recency_floor")]
    pub recency_floor: f64,
    #[serde(default = "default_frequency_cap")]
    pub frequency_cap: u32,
}

fn default_decay_hours() -> f64 {
    24.0
}

fn default_max_age_hours() -> f64 {
    168.0
}

fn default_recency_floor() -> f64 {
    0.1
}

fn default_frequency_cap() -> u32 {
    100
}

impl Default for PrioritizerConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            boosts: BoostFactors::default(),
            decay_hours: default_decay_hours(),
            max_age_hours: default_max_age_hours(),
            recency_floor: default_recency_floor(),
            frequency_cap: default_frequency_cap(),
        }
    }
}

/// Scores candidates and packs the best of them into a token budget
pub struct ContextPrioritizer {
    config: PrioritizerConfig,
    counter: CachedTokenCounter,
    access_counts: DashMap<String, u32>,
}

impl ContextPrioritizer {
    pub fn new(config: PrioritizerConfig, counter: CachedTokenCounter) -> Self {
        Self {
            config,
            counter,
            access_counts: DashMap::new(),
        }
    }

    /// Score, rank, and greedily pack candidates into the budget
    ///
    /// Items that do not fit are skipped rather than ending the pass, so a
    /// smaller lower-ranked item can still use leftover budget.
    pub fn prioritize(&self, request: PrioritizationRequest) -> Result<PrioritizationResult> {
        let considered = request.candidates.len();
        let mut scored: Vec<(f64, [f64; 3], ContextCandidate)> = Vec::with_capacity(considered);

        for candidate in request.candidates {
            let relevance = candidate.relevance.unwrap_or(0.5).clamp(0.0, 1.0);
            let recency = recency_score(
                candidate.age_hours,
                self.config.decay_hours,
                self.config.max_age_hours,
                self.config.recency_floor,
            );
            let accesses = self
                .access_counts
                .get(&candidate.id)
                .map(|entry| *entry)
                .unwrap_or(0);
            let frequency = frequency_score(accesses, self.config.frequency_cap);

            let base = combined_score(relevance, recency, frequency, &self.config.weights);
            let is_active = candidate.source.is_some()
                && candidate.source.as_deref() == request.active_file.as_deref();
            let is_edited = candidate
                .source
                .as_deref()
                .map(|s| request.recently_edited_files.iter().any(|f| f == s))
                .unwrap_or(false);
            let is_mentioned = request
                .user_mentions
                .iter()
                .any(|m| m == &candidate.id || Some(m.as_str()) == candidate.source.as_deref());

            let score = apply_boosts(base, is_active, is_edited, is_mentioned, &self.config.boosts);
            scored.push((score, [relevance, recency, frequency], candidate));
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.2.id.cmp(&b.2.id))
        });

        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut used_tokens = 0usize;
        for (score, [relevance, recency, frequency], candidate) in scored {
            let tokens = self.counter.count_text(&candidate.content)?;
            let fits = used_tokens + tokens <= request.token_budget;
            let item = PrioritizedContextItem {
                id: candidate.id,
                item_type: candidate.item_type,
                source: candidate.source,
                content: candidate.content,
                relevance,
                recency,
                frequency,
                score,
                bucket: priority_bucket(score),
                tokens,
            };
            if fits {
                used_tokens += tokens;
                self.record_access(&item.id);
                included.push(item);
            } else {
                excluded.push(item);
            }
        }

        let stats = PrioritizationStats {
            considered,
            included: included.len(),
            excluded: excluded.len(),
            budget_tokens: request.token_budget,
            used_tokens,
        };
        debug!(
            considered = stats.considered,
            included = stats.included,
            used_tokens = stats.used_tokens,
            budget_tokens = stats.budget_tokens,
            "Prioritized context items"
        );

        Ok(PrioritizationResult {
            included,
            excluded,
            stats,
        })
    }

    /// Bump the access counter for an item
    pub fn record_access(&self, item_id: &str) {
        *self.access_counts.entry(item_id.to_string()).or_insert(0) += 1;
    }

    /// Adjust an item's counter from explicit feedback, floored at zero
    pub fn apply_feedback(&self, item_id: &str, helpful: bool) {
        let mut entry = self.access_counts.entry(item_id.to_string()).or_insert(0);
        *entry = if helpful {
            entry.saturating_add(5)
        } else {
            entry.saturating_sub(2)
        };
    }

    pub fn access_count(&self, item_id: &str) -> u32 {
        self.access_counts
            .get(item_id)
            .map(|entry| *entry)
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        self.access_counts.clear();
    }
}
