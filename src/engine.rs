//! Wiring of the full context pipeline behind one owner

use crate::compress::SemanticCompressor;
use crate::condense::{
    Condenser, ExtractiveSummarizer, HierarchicalSummarizer, LlmCondenser, LlmSummarizer,
    Summarizer,
};
use crate::config::Config;
use crate::conversation::ConversationManager;
use crate::error::{ContextError, Result};
use crate::prioritize::ContextPrioritizer;
use crate::telemetry::{TelemetrySink, TracingSink};
use crate::tokens::{
    CachedTokenCounter, HeuristicCounter, TiktokenCounter, TokenCounter, TokenCountingCache,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Owns every component of the context pipeline
///
/// All state lives inside the engine; two engines never share caches or
/// summary trees. Drop the engine, or call [`teardown`](Self::teardown)
/// first to release cached state explicitly.
pub struct ContextEngine {
    config: Config,
    cache: Arc<TokenCountingCache>,
    counter: CachedTokenCounter,
    compressor: Arc<SemanticCompressor>,
    prioritizer: Arc<ContextPrioritizer>,
    summary_tree: Arc<HierarchicalSummarizer>,
    manager: Arc<ConversationManager>,
}

impl ContextEngine {
    /// Assemble an engine from pre-built collaborators
    pub fn new(
        config: Config,
        cache: Arc<TokenCountingCache>,
        counter: CachedTokenCounter,
        summarizer: Arc<dyn Summarizer>,
        condenser: Arc<dyn Condenser>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let compressor = Arc::new(SemanticCompressor::new(
            config.compressor.clone(),
            counter.clone(),
        ));
        let prioritizer = Arc::new(ContextPrioritizer::new(
            config.prioritizer.clone(),
            counter.clone(),
        ));
        let summary_tree = Arc::new(HierarchicalSummarizer::new(
            summarizer,
            counter.clone(),
            config.summary_tree.clone(),
        ));
        let manager = Arc::new(ConversationManager::new(
            counter.clone(),
            condenser,
            telemetry,
            config.condensation.clone(),
        ));

        Self {
            config,
            cache,
            counter,
            compressor,
            prioritizer,
            summary_tree,
            manager,
        }
    }

    /// Build the default production wiring from configuration
    ///
    /// Uses the LLM summarizer when an API key is configured and falls back
    /// to extractive summaries otherwise.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(TokenCountingCache::new(
            Duration::from_secs(config.token_cache.ttl_secs),
            config.token_cache.max_entries,
        ));
        let base: Arc<dyn TokenCounter> = match TiktokenCounter::new() {
            Ok(counter) => Arc::new(counter),
            Err(error) => {
                warn!(%error, "Tokenizer unavailable, using heuristic token counts");
                Arc::new(HeuristicCounter::default())
            }
        };
        let counter =
            CachedTokenCounter::new(cache.clone(), base, config.token_cache.model_id.clone());

        let summarizer: Arc<dyn Summarizer> = if config.summarizer.api_key.is_some() {
            Arc::new(
                LlmSummarizer::new(config.summarizer.clone())
                    .map_err(|error| ContextError::Summarization(error.to_string()))?,
            )
        } else {
            warn!("No summarizer API key configured, using extractive summaries");
            Arc::new(ExtractiveSummarizer::new(counter.clone()))
        };

        let condenser: Arc<dyn Condenser> = Arc::new(LlmCondenser::new(
            summarizer.clone(),
            counter.clone(),
            config.condenser.clone(),
        ));
        let telemetry: Arc<dyn TelemetrySink> = Arc::new(TracingSink);

        Ok(Self::new(
            config, cache, counter, summarizer, condenser, telemetry,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn token_cache(&self) -> &Arc<TokenCountingCache> {
        &self.cache
    }

    pub fn counter(&self) -> &CachedTokenCounter {
        &self.counter
    }

    pub fn compressor(&self) -> &Arc<SemanticCompressor> {
        &self.compressor
    }

    pub fn prioritizer(&self) -> &Arc<ContextPrioritizer> {
        &self.prioritizer
    }

    pub fn summary_tree(&self) -> &Arc<HierarchicalSummarizer> {
        &self.summary_tree
    }

    pub fn manager(&self) -> &Arc<ConversationManager> {
        &self.manager
    }

    /// Release every piece of cached state
    ///
    /// The engine stays usable afterwards; caches simply start cold.
    pub fn teardown(&self) {
        self.cache.clear();
        self.compressor.clear_cache();
        self.prioritizer.clear();
        self.summary_tree.clear();
        info!("Context engine state cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_api_key() {
        let engine = ContextEngine::from_config(Config::default()).unwrap();
        assert!(engine.config().summarizer.api_key.is_none());
        assert_eq!(engine.counter().model_id(), "cl100k_base");
    }

    #[test]
    fn test_engines_do_not_share_state() {
        let a = ContextEngine::from_config(Config::default()).unwrap();
        let b = ContextEngine::from_config(Config::default()).unwrap();

        a.counter().count_text("some shared text").unwrap();
        assert_eq!(a.token_cache().stats().total_entries, 1);
        assert_eq!(b.token_cache().stats().total_entries, 0);
    }

    #[test]
    fn test_teardown_clears_caches() {
        let engine = ContextEngine::from_config(Config::default()).unwrap();
        engine.counter().count_text("cached once").unwrap();
        assert_eq!(engine.token_cache().stats().total_entries, 1);

        engine.teardown();
        assert_eq!(engine.token_cache().stats().total_entries, 0);
    }
}
