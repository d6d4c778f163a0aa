//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Histogram, Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Condensation metrics
    pub condensations: CounterVec,
    pub condensation_cost: Histogram,

    // Truncation metrics
    pub truncations: Counter,
    pub truncated_messages: Counter,

    // Context size metrics
    pub context_tokens_before: Histogram,
    pub context_tokens_after: Histogram,

    // Token cache metrics
    pub token_cache_lookups: CounterVec,

    // Summary tree metrics
    pub tree_builds: CounterVec,
    pub tree_nodes: Histogram,

    // Compression metrics
    pub compression_ratio: Histogram,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let condensations = register_counter_vec_with_registry!(
            Opts::new("condensations_total", "Total condensation attempts"),
            &["outcome"],
            registry
        )?;

        let condensation_cost = register_histogram_with_registry!(
            "condensation_cost_dollars",
            "Cost per successful condensation in dollars",
            registry
        )?;

        let truncations = register_counter_with_registry!(
            Opts::new("truncations_total", "Total truncation operations"),
            registry
        )?;

        let truncated_messages = register_counter_with_registry!(
            Opts::new(
                "truncated_messages_total",
                "Total messages hidden by truncation"
            ),
            registry
        )?;

        let context_tokens_before = register_histogram_with_registry!(
            "context_tokens_before",
            "Context size in tokens before management",
            registry
        )?;

        let context_tokens_after = register_histogram_with_registry!(
            "context_tokens_after",
            "Context size in tokens after management",
            registry
        )?;

        let token_cache_lookups = register_counter_vec_with_registry!(
            Opts::new("token_cache_lookups_total", "Total token cache lookups"),
            &["outcome"],
            registry
        )?;

        let tree_builds = register_counter_vec_with_registry!(
            Opts::new("summary_tree_builds_total", "Total summary tree builds"),
            &["outcome"],
            registry
        )?;

        let tree_nodes = register_histogram_with_registry!(
            "summary_tree_nodes",
            "Nodes per built summary tree",
            registry
        )?;

        let compression_ratio = register_histogram_with_registry!(
            "compression_ratio",
            "Compressed over original token ratio",
            registry
        )?;

        Ok(Self {
            registry,
            condensations,
            condensation_cost,
            truncations,
            truncated_messages,
            context_tokens_before,
            context_tokens_after,
            token_cache_lookups,
            tree_builds,
            tree_nodes,
            compression_ratio,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a condensation attempt
    pub fn record_condensation(&self, success: bool, cost: f64) {
        let outcome = if success { "success" } else { "failure" };
        self.condensations.with_label_values(&[outcome]).inc();
        if success {
            self.condensation_cost.observe(cost);
        }
    }

    /// Record a truncation operation
    pub fn record_truncation(&self, messages_removed: usize) {
        self.truncations.inc();
        self.truncated_messages.inc_by(messages_removed as f64);
    }

    /// Record context size before and after management
    pub fn record_context_tokens(&self, before: usize, after: usize) {
        self.context_tokens_before.observe(before as f64);
        self.context_tokens_after.observe(after as f64);
    }

    /// Record a token cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.token_cache_lookups.with_label_values(&[outcome]).inc();
    }

    /// Record a summary tree build
    pub fn record_tree_build(&self, outcome: &str, node_count: Option<usize>) {
        self.tree_builds.with_label_values(&[outcome]).inc();
        if let Some(count) = node_count {
            self.tree_nodes.observe(count as f64);
        }
    }

    /// Record a compression result
    pub fn record_compression(&self, ratio: f64) {
        self.compression_ratio.observe(ratio);
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = Metrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_record_condensation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_condensation(true, 0.002);
        metrics.record_condensation(false, 0.0);
        // Metrics should be recorded without panicking
    }

    #[test]
    fn test_record_tree_build() {
        let metrics = Metrics::new().unwrap();
        metrics.record_tree_build("success", Some(7));
        metrics.record_tree_build("failure", None);
    }

    #[test]
    fn test_export_uses_own_registry() {
        let metrics = Metrics::new().unwrap();
        metrics.record_truncation(4);
        let text = metrics.export_prometheus();
        assert!(text.contains("truncations_total"));
    }
}
