//! Threshold resolution for the condense/truncate decision

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Share of the context window held back as safety margin
pub const TOKEN_BUFFER_FRACTION: f64 = 0.10;
/// Output reservation when the model reports no usable max_tokens
pub const DEFAULT_RESERVED_OUTPUT_TOKENS: usize = 8192;
pub const MIN_CONDENSE_THRESHOLD: f64 = 5.0;
pub const MAX_CONDENSE_THRESHOLD: f64 = 100.0;
/// Sentinel profile threshold meaning "use the global default percent"
pub const INHERIT_GLOBAL_THRESHOLD: f64 = -1.0;

/// How a profile override expresses its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    Tokens,
    Percent,
}

/// Per-profile threshold override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverride {
    pub enabled: bool,
    pub mode: OverrideMode,
    pub value: f64,
}

/// Which comparison the resolved threshold uses downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    GlobalPercent,
    ProfilePercent,
    ProfileTokens,
}

/// Resolved condensation threshold
#[derive(Debug, Clone, PartialEq)]
pub enum CondenseThreshold {
    /// Compare the context's share of the whole window against a percent
    GlobalPercent { percent: f64 },
    /// Profile percent, pre-converted to an absolute token threshold
    ProfilePercent { percent: f64, tokens: usize },
    ProfileTokens { tokens: usize },
}

/// Resolved budget and threshold for one conversation turn
#[derive(Debug, Clone, PartialEq)]
pub struct CondenseTrigger {
    pub reserved_tokens: usize,
    pub allowed_tokens: f64,
    pub effective_budget: usize,
    pub threshold: CondenseThreshold,
}

impl CondenseTrigger {
    pub fn mode(&self) -> ThresholdMode {
        match self.threshold {
            CondenseThreshold::GlobalPercent { .. } => ThresholdMode::GlobalPercent,
            CondenseThreshold::ProfilePercent { .. } => ThresholdMode::ProfilePercent,
            CondenseThreshold::ProfileTokens { .. } => ThresholdMode::ProfileTokens,
        }
    }

    /// Whether the accumulated context has crossed the condensation trigger
    pub fn should_condense(&self, prev_context_tokens: usize, context_window: usize) -> bool {
        if prev_context_tokens as f64 > self.allowed_tokens {
            return true;
        }
        match &self.threshold {
            CondenseThreshold::GlobalPercent { percent } => {
                let context_percent = 100.0 * prev_context_tokens as f64 / context_window as f64;
                context_percent >= *percent
            }
            CondenseThreshold::ProfilePercent { tokens, .. }
            | CondenseThreshold::ProfileTokens { tokens } => prev_context_tokens >= *tokens,
        }
    }
}

fn percent_to_tokens(percent: f64, effective_budget: usize) -> usize {
    let tokens = (percent / 100.0 * effective_budget.max(1) as f64).floor();
    (tokens as usize).max(1)
}

/// Compute the effective budget and threshold for a turn
///
/// Pure and side-effect free apart from a log line on invalid profile
/// thresholds; safe to call concurrently.
pub fn resolve_trigger(
    context_window: usize,
    max_tokens: Option<usize>,
    auto_condense_percent: f64,
    profile_thresholds: &HashMap<String, f64>,
    profile_overrides: &HashMap<String, ProfileOverride>,
    profile_id: Option<&str>,
) -> CondenseTrigger {
    let reserved_tokens = match max_tokens {
        Some(tokens) if tokens > 0 => tokens,
        _ => DEFAULT_RESERVED_OUTPUT_TOKENS,
    };
    let allowed_tokens =
        context_window as f64 * (1.0 - TOKEN_BUFFER_FRACTION) - reserved_tokens as f64;
    let effective_budget = allowed_tokens.floor().max(0.0) as usize;

    let threshold = resolve_threshold(
        auto_condense_percent,
        effective_budget,
        profile_thresholds,
        profile_overrides,
        profile_id,
    );

    CondenseTrigger {
        reserved_tokens,
        allowed_tokens,
        effective_budget,
        threshold,
    }
}

fn resolve_threshold(
    auto_condense_percent: f64,
    effective_budget: usize,
    profile_thresholds: &HashMap<String, f64>,
    profile_overrides: &HashMap<String, ProfileOverride>,
    profile_id: Option<&str>,
) -> CondenseThreshold {
    if let Some(id) = profile_id {
        if let Some(profile_override) = profile_overrides.get(id) {
            if profile_override.enabled {
                match profile_override.mode {
                    OverrideMode::Tokens => {
                        let cap = effective_budget.max(1) as i64;
                        let tokens = (profile_override.value.floor() as i64).clamp(1, cap) as usize;
                        return CondenseThreshold::ProfileTokens { tokens };
                    }
                    OverrideMode::Percent => {
                        let percent = profile_override
                            .value
                            .clamp(MIN_CONDENSE_THRESHOLD, MAX_CONDENSE_THRESHOLD);
                        return CondenseThreshold::ProfilePercent {
                            percent,
                            tokens: percent_to_tokens(percent, effective_budget),
                        };
                    }
                }
            }
        }

        if let Some(&threshold) = profile_thresholds.get(id) {
            if (threshold - INHERIT_GLOBAL_THRESHOLD).abs() < f64::EPSILON {
                // Sentinel: fall through to the global percent
            } else if (MIN_CONDENSE_THRESHOLD..=MAX_CONDENSE_THRESHOLD).contains(&threshold) {
                return CondenseThreshold::ProfilePercent {
                    percent: threshold,
                    tokens: percent_to_tokens(threshold, effective_budget),
                };
            } else {
                warn!(
                    profile_id = id,
                    threshold, "Profile threshold out of range, using global default"
                );
            }
        }
    }

    CondenseThreshold::GlobalPercent {
        percent: auto_condense_percent.clamp(MIN_CONDENSE_THRESHOLD, MAX_CONDENSE_THRESHOLD),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_profiles() -> (HashMap<String, f64>, HashMap<String, ProfileOverride>) {
        (HashMap::new(), HashMap::new())
    }

    #[test]
    fn test_budget_arithmetic() {
        let (thresholds, overrides) = no_profiles();
        let trigger = resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, None);

        assert_eq!(trigger.reserved_tokens, 4096);
        assert_eq!(trigger.allowed_tokens, 85_904.0);
        assert_eq!(trigger.effective_budget, 85_904);
        assert_eq!(trigger.mode(), ThresholdMode::GlobalPercent);
    }

    #[test]
    fn test_reserved_default_when_max_tokens_missing() {
        let (thresholds, overrides) = no_profiles();
        let none = resolve_trigger(100_000, None, 75.0, &thresholds, &overrides, None);
        let zero = resolve_trigger(100_000, Some(0), 75.0, &thresholds, &overrides, None);

        assert_eq!(none.reserved_tokens, DEFAULT_RESERVED_OUTPUT_TOKENS);
        assert_eq!(zero.reserved_tokens, DEFAULT_RESERVED_OUTPUT_TOKENS);
    }

    #[test]
    fn test_budget_never_negative() {
        let (thresholds, overrides) = no_profiles();
        let trigger = resolve_trigger(1_000, Some(4096), 75.0, &thresholds, &overrides, None);

        assert!(trigger.allowed_tokens < 0.0);
        assert_eq!(trigger.effective_budget, 0);
    }

    #[test]
    fn test_determinism() {
        let (thresholds, overrides) = no_profiles();
        let a = resolve_trigger(64_000, Some(2048), 80.0, &thresholds, &overrides, None);
        let b = resolve_trigger(64_000, Some(2048), 80.0, &thresholds, &overrides, None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_token_override_clamped_to_budget() {
        let thresholds = HashMap::new();
        let mut overrides = HashMap::new();
        overrides.insert(
            "p".to_string(),
            ProfileOverride {
                enabled: true,
                mode: OverrideMode::Tokens,
                value: 1e9,
            },
        );

        let trigger =
            resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, Some("p"));
        assert_eq!(
            trigger.threshold,
            CondenseThreshold::ProfileTokens { tokens: 85_904 }
        );

        overrides.get_mut("p").unwrap().value = -50.0;
        let trigger =
            resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, Some("p"));
        assert_eq!(
            trigger.threshold,
            CondenseThreshold::ProfileTokens { tokens: 1 }
        );
    }

    #[test]
    fn test_percent_override_clamped() {
        let thresholds = HashMap::new();
        let mut overrides = HashMap::new();
        overrides.insert(
            "p".to_string(),
            ProfileOverride {
                enabled: true,
                mode: OverrideMode::Percent,
                value: 150.0,
            },
        );

        let trigger =
            resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, Some("p"));
        match trigger.threshold {
            CondenseThreshold::ProfilePercent { percent, tokens } => {
                assert_eq!(percent, 100.0);
                assert_eq!(tokens, 85_904);
            }
            other => panic!("unexpected threshold {:?}", other),
        }

        overrides.get_mut("p").unwrap().value = 1.0;
        let trigger =
            resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, Some("p"));
        match trigger.threshold {
            CondenseThreshold::ProfilePercent { percent, .. } => {
                assert_eq!(percent, MIN_CONDENSE_THRESHOLD)
            }
            other => panic!("unexpected threshold {:?}", other),
        }
    }

    #[test]
    fn test_disabled_override_is_ignored() {
        let thresholds = HashMap::new();
        let mut overrides = HashMap::new();
        overrides.insert(
            "p".to_string(),
            ProfileOverride {
                enabled: false,
                mode: OverrideMode::Tokens,
                value: 500.0,
            },
        );

        let trigger =
            resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, Some("p"));
        assert_eq!(trigger.mode(), ThresholdMode::GlobalPercent);
    }

    #[test]
    fn test_profile_percent_threshold() {
        let mut thresholds = HashMap::new();
        thresholds.insert("p".to_string(), 50.0);
        let overrides = HashMap::new();

        let trigger =
            resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, Some("p"));
        assert_eq!(
            trigger.threshold,
            CondenseThreshold::ProfilePercent {
                percent: 50.0,
                tokens: 42_952,
            }
        );
    }

    #[test]
    fn test_sentinel_inherits_global() {
        let mut thresholds = HashMap::new();
        thresholds.insert("p".to_string(), INHERIT_GLOBAL_THRESHOLD);
        let overrides = HashMap::new();

        let trigger =
            resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, Some("p"));
        assert_eq!(
            trigger.threshold,
            CondenseThreshold::GlobalPercent { percent: 75.0 }
        );
    }

    #[test]
    fn test_out_of_range_profile_threshold_falls_back() {
        let mut thresholds = HashMap::new();
        thresholds.insert("p".to_string(), 200.0);
        let overrides = HashMap::new();

        let trigger =
            resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, Some("p"));
        assert_eq!(trigger.mode(), ThresholdMode::GlobalPercent);
    }

    #[test]
    fn test_should_condense_global_percent() {
        let (thresholds, overrides) = no_profiles();
        let trigger = resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, None);

        // 80% of the window crosses the 75% threshold
        assert!(trigger.should_condense(80_000, 100_000));
        assert!(!trigger.should_condense(70_000, 100_000));
        // Exceeding allowed tokens triggers regardless of the percent
        assert!(trigger.should_condense(86_000, 100_000));
    }

    #[test]
    fn test_should_condense_profile_tokens() {
        let thresholds = HashMap::new();
        let mut overrides = HashMap::new();
        overrides.insert(
            "p".to_string(),
            ProfileOverride {
                enabled: true,
                mode: OverrideMode::Tokens,
                value: 50_000.0,
            },
        );

        let trigger =
            resolve_trigger(100_000, Some(4096), 75.0, &thresholds, &overrides, Some("p"));
        assert!(trigger.should_condense(50_000, 100_000));
        assert!(!trigger.should_condense(49_999, 100_000));
    }
}
