//! Pure scoring functions for context prioritization

use serde::{Deserialize, Serialize};

/// Weights applied to the three score components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_relevance_weight")]
    pub relevance: f64,
    #[serde(default = "default_recency_weight")]
    pub recency: f64,
    #[serde(default = "default_frequency_weight")]
    pub frequency: f64,
}

fn default_relevance_weight() -> f64 {
    0.5
}

fn default_recency_weight() -> f64 {
    0.3
}

fn default_frequency_weight() -> f64 {
    0.2
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            relevance: default_relevance_weight(),
            recency: default_recency_weight(),
            frequency: default_frequency_weight(),
        }
    }
}

/// Multiplicative boost factors for contextual signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostFactors {
    #[serde(default = "default_active_file_boost")]
    pub active_file: f64,
    #[serde(default = "default_recently_edited_boost")]
    pub recently_edited: f64,
    #[serde(default = "default_user_mention_boost")]
    pub user_mention: f64,
}

fn default_active_file_boost() -> f64 {
    1.5
}

fn default_recently_edited_boost() -> f64 {
    1.3
}

fn default_user_mention_boost() -> f64 {
    1.2
}

impl Default for BoostFactors {
    fn default() -> Self {
        Self {
            active_file: default_active_file_boost(),
            recently_edited: default_recently_edited_boost(),
            user_mention: default_user_mention_boost(),
        }
    }
}

/// Priority tier derived from the combined score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityBucket {
    Critical,
    High,
    Medium,
    Low,
    Minimal,
}

impl PriorityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityBucket::Critical => "critical",
            PriorityBucket::High => "high",
            PriorityBucket::Medium => "medium",
            PriorityBucket::Low => "low",
            PriorityBucket::Minimal => "minimal",
        }
    }
}

/// Exponential recency decay with an age cap and a score floor
pub fn recency_score(age_hours: f64, decay_hours: f64, max_age_hours: f64, floor: f64) -> f64 {
    let age = age_hours.clamp(0.0, max_age_hours);
    (-age / decay_hours).exp().max(floor)
}

/// Logarithmic frequency score normalized against a cap
pub fn frequency_score(access_count: u32, cap: u32) -> f64 {
    if cap == 0 {
        return 0.0;
    }
    let count = access_count.min(cap) as f64;
    ((1.0 + count).ln() / (1.0 + cap as f64).ln()).min(1.0)
}

/// Weighted combination of the three components
pub fn combined_score(relevance: f64, recency: f64, frequency: f64, weights: &ScoreWeights) -> f64 {
    relevance * weights.relevance + recency * weights.recency + frequency * weights.frequency
}

/// Apply contextual boosts, clamped so the score never exceeds 1.0
pub fn apply_boosts(
    score: f64,
    is_active_file: bool,
    is_recently_edited: bool,
    is_mentioned: bool,
    boosts: &BoostFactors,
) -> f64 {
    let mut boosted = score;
    if is_active_file {
        boosted *= boosts.active_file;
    }
    if is_recently_edited {
        boosted *= boosts.recently_edited;
    }
    if is_mentioned {
        boosted *= boosts.user_mention;
    }
    boosted.min(1.0)
}

/// Map a combined score to its priority bucket
pub fn priority_bucket(score: f64) -> PriorityBucket {
    if score >= 0.9 {
        PriorityBucket::Critical
    } else if score >= 0.7 {
        PriorityBucket::High
    } else if score >= 0.5 {
        PriorityBucket::Medium
    } else if score >= 0.3 {
        PriorityBucket::Low
    } else {
        PriorityBucket::Minimal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recency_decay() {
        assert!((recency_score(0.0, 24.0, 168.0, 0.1) - 1.0).abs() < 1e-9);
        let one_decay = recency_score(24.0, 24.0, 168.0, 0.1);
        assert!((one_decay - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_recency_floor_and_cap() {
        // Ancient items are capped at max age and then floored
        let ancient = recency_score(10_000.0, 24.0, 168.0, 0.1);
        assert_eq!(ancient, 0.1);
        assert_eq!(
            recency_score(168.0, 24.0, 168.0, 0.1),
            recency_score(500.0, 24.0, 168.0, 0.1)
        );
    }

    #[test]
    fn test_frequency_is_logarithmic() {
        assert_eq!(frequency_score(0, 100), 0.0);
        assert_eq!(frequency_score(100, 100), 1.0);
        assert_eq!(frequency_score(200, 100), 1.0);

        let low = frequency_score(5, 100);
        let high = frequency_score(50, 100);
        assert!(low > 0.0 && high < 1.0);
        // Doubling access count gains less than double the score
        assert!(frequency_score(10, 100) < 2.0 * frequency_score(5, 100));
    }

    #[test]
    fn test_combined_score_weights() {
        let weights = ScoreWeights::default();
        let score = combined_score(1.0, 1.0, 1.0, &weights);
        assert!((score - 1.0).abs() < 1e-9);
        assert!((combined_score(1.0, 0.0, 0.0, &weights) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_boosts_clamp_at_one() {
        let boosts = BoostFactors::default();
        let boosted = apply_boosts(0.9, true, true, true, &boosts);
        assert_eq!(boosted, 1.0);

        let mild = apply_boosts(0.4, false, false, true, &boosts);
        assert!((mild - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_edges() {
        assert_eq!(priority_bucket(0.95), PriorityBucket::Critical);
        assert_eq!(priority_bucket(0.9), PriorityBucket::Critical);
        assert_eq!(priority_bucket(0.89), PriorityBucket::High);
        assert_eq!(priority_bucket(0.7), PriorityBucket::High);
        assert_eq!(priority_bucket(0.5), PriorityBucket::Medium);
        assert_eq!(priority_bucket(0.3), PriorityBucket::Low);
        assert_eq!(priority_bucket(0.29), PriorityBucket::Minimal);
    }
}
