//! Lossy text compression with protected-span preservation

use crate::compress::protected::{extract_protected_spans, ProtectedSpan};
use crate::error::Result;
use crate::metrics::METRICS;
use crate::tokens::{short_hash, CachedTokenCounter};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

const MASK_OPEN: char = '\u{E000}';
const MASK_CLOSE: char = '\u{E001}';

const FILLER_PHRASES: &[&str] = &[
    "as a matter of fact",
    "at the end of the day",
    "for what it's worth",
    "needless to say",
    "in other words",
    "to be honest",
    "you know",
    "i mean",
    "basically",
    "essentially",
    "actually",
    "obviously",
    "clearly",
    "frankly",
    "honestly",
    "literally",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "at", "for", "with", "from", "by", "as", "is",
    "are", "was", "were", "be", "been", "being", "that", "this", "it", "its", "and", "or",
    "but", "so", "very", "really", "just", "quite", "rather", "some",
];

const SIGNAL_TERMS: &[&str] = &[
    "error", "fail", "warn", "must", "should", "important", "note", "fix", "bug", "function",
    "result", "because", "decided", "config",
];

/// Compression intensity, ordered from lossless to most lossy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    None,
    Light,
    Moderate,
    Aggressive,
}

impl CompressionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionLevel::None => "none",
            CompressionLevel::Light => "light",
            CompressionLevel::Moderate => "moderate",
            CompressionLevel::Aggressive => "aggressive",
        }
    }
}

/// Result of compressing one piece of content
#[derive(Debug, Clone, Serialize)]
pub struct CompressedContent {
    pub original: String,
    pub compressed: String,
    pub level: CompressionLevel,
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub ratio: f64,
    /// Protected spans carried through verbatim
    pub preserved_segments: Vec<String>,
    /// Fragments the lossy passes dropped, in document order per pass
    pub removed_segments: Vec<String>,
}

/// Compressor tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressorConfig {
    #[serde(default = "default_stopword_ratio")]
    pub stopword_ratio: f64,
    #[serde(default = "default_keep_fraction")]
    pub aggressive_keep_fraction: f64,
    #[serde(default = "default_min_sentences")]
    pub min_sentences: usize,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_stopword_ratio() -> f64 {
    0.5
}

fn default_keep_fraction() -> f64 {
    0.4
}

fn default_min_sentences() -> usize {
    2
}

fn default_cache_max_entries() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            stopword_ratio: default_stopword_ratio(),
            aggressive_keep_fraction: default_keep_fraction(),
            min_sentences: default_min_sentences(),
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Collapse runs of spaces and blank lines
pub fn normalize_whitespace(text: &str) -> String {
    let collapsed: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    let mut out: Vec<String> = Vec::with_capacity(collapsed.len());
    let mut blank_run = 0;
    for line in collapsed {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }

    out.join("\n").trim().to_string()
}

/// Remove filler phrases, returning the phrases that were cut
pub fn strip_filler(text: &str) -> (String, Vec<String>) {
    let lower = text.to_ascii_lowercase();
    let bytes = text.as_bytes();
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    for phrase in FILLER_PHRASES {
        let mut from = 0;
        while let Some(pos) = lower[from..].find(phrase) {
            let start = from + pos;
            let end = start + phrase.len();
            from = end;
            if !at_word_boundary(&lower, start, end) {
                continue;
            }
            if ranges.iter().any(|&(s, e)| start < e && end > s) {
                continue;
            }
            let mut wide_end = end;
            if wide_end < bytes.len() && bytes[wide_end] == b',' {
                wide_end += 1;
            }
            while wide_end < bytes.len() && bytes[wide_end] == b' ' {
                wide_end += 1;
            }
            ranges.push((start, wide_end));
        }
    }

    if ranges.is_empty() {
        return (text.to_string(), Vec::new());
    }

    ranges.sort_unstable();
    let mut removed = Vec::with_capacity(ranges.len());
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in ranges {
        out.push_str(&text[cursor..start]);
        removed.push(text[start..end].trim_end_matches([' ', ',']).to_string());
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    (out, removed)
}

fn at_word_boundary(lower: &str, start: usize, end: usize) -> bool {
    let bytes = lower.as_bytes();
    let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
    let after_ok = end >= bytes.len() || !bytes[end].is_ascii_alphanumeric();
    before_ok && after_ok
}

/// Drop the last `ratio` share of bare stopword tokens
///
/// Only tokens that are exactly a stopword with no attached punctuation are
/// candidates, which keeps the pass deterministic.
pub fn drop_stopwords(text: &str, ratio: f64) -> (String, Vec<String>) {
    let mut occurrences: Vec<(usize, usize)> = Vec::new();
    let mut token_start: Option<usize> = None;

    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(start) = token_start.take() {
                record_stopword(text, start, i, &mut occurrences);
            }
        } else if token_start.is_none() {
            token_start = Some(i);
        }
    }
    if let Some(start) = token_start {
        record_stopword(text, start, text.len(), &mut occurrences);
    }

    let count = (occurrences.len() as f64 * ratio).floor() as usize;
    if count == 0 {
        return (text.to_string(), Vec::new());
    }

    let victims = &occurrences[occurrences.len() - count..];
    let mut removed = Vec::with_capacity(count);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for &(start, end) in victims {
        out.push_str(&text[cursor..start]);
        removed.push(text[start..end].to_string());
        let mut wide_end = end;
        if wide_end < text.len() && text.as_bytes()[wide_end] == b' ' {
            wide_end += 1;
        }
        cursor = wide_end;
    }
    out.push_str(&text[cursor..]);
    (out, removed)
}

fn record_stopword(text: &str, start: usize, end: usize, occurrences: &mut Vec<(usize, usize)>) {
    let token = &text[start..end];
    if token.chars().all(|c| c.is_ascii_alphabetic())
        && STOPWORDS.contains(&token.to_ascii_lowercase().as_str())
    {
        occurrences.push((start, end));
    }
}

/// Split text into sentences on terminators and line breaks
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;

    let push = |from: usize, to: usize, out: &mut Vec<String>| {
        let trimmed = text[from..to].trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    };

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                push(start, i, &mut sentences);
                start = i + 1;
                i += 1;
            }
            b'.' | b'!' | b'?' => {
                let mut j = i + 1;
                while j < bytes.len() && matches!(bytes[j], b'.' | b'!' | b'?') {
                    j += 1;
                }
                if j >= bytes.len() || bytes[j] == b' ' || bytes[j] == b'\n' {
                    push(start, j, &mut sentences);
                    start = j;
                }
                i = j;
            }
            _ => i += 1,
        }
    }
    push(start, bytes.len(), &mut sentences);

    sentences
}

/// Score a sentence by position, length, and signal terms
pub fn score_sentence(sentence: &str, index: usize, total: usize) -> f64 {
    let position = if index == 0 {
        1.0
    } else if total > 0 && index == total - 1 {
        0.8
    } else {
        0.5
    };

    let words = sentence.split_whitespace().count();
    let length = (words as f64 / 20.0).min(1.0) * 0.5;

    let lower = sentence.to_lowercase();
    let mut signal: f64 = 0.0;
    for term in SIGNAL_TERMS {
        if lower.contains(term) {
            signal += 0.3;
        }
    }
    signal = signal.min(0.6);

    let numeric = if sentence.chars().any(|c| c.is_ascii_digit()) {
        0.2
    } else {
        0.0
    };

    position + length + signal + numeric
}

fn mask_spans(text: &str, spans: &[ProtectedSpan]) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(text.len());
    let mut store = Vec::with_capacity(spans.len());
    let mut cursor = 0;

    for span in spans {
        masked.push_str(&text[cursor..span.start]);
        masked.push(MASK_OPEN);
        masked.push_str(&store.len().to_string());
        masked.push(MASK_CLOSE);
        store.push(text[span.start..span.end].to_string());
        cursor = span.end;
    }
    masked.push_str(&text[cursor..]);
    (masked, store)
}

fn unmask(text: &str, store: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch != MASK_OPEN {
            out.push(ch);
            continue;
        }
        let mut index = 0usize;
        for digit in chars.by_ref() {
            if digit == MASK_CLOSE {
                break;
            }
            if let Some(d) = digit.to_digit(10) {
                index = index * 10 + d as usize;
            }
        }
        if let Some(original) = store.get(index) {
            out.push_str(original);
        }
    }
    out
}

/// Digest key standing in for the full content string
fn content_id(content: &str) -> String {
    format!("{}:{}", short_hash(content), content.len())
}

/// Cached compression result with TTL and access ordering
struct CacheEntry {
    record: CompressedContent,
    inserted_at: Instant,
    last_access: u64,
}

/// Content compressor that preserves code, URLs, and file paths
///
/// Results are cached by (content digest, level). Eviction is strict LRU once
/// `cache_max_entries` is reached; expired entries are purged lazily on access.
pub struct SemanticCompressor {
    config: CompressorConfig,
    counter: CachedTokenCounter,
    cache: Mutex<HashMap<(String, CompressionLevel), CacheEntry>>,
    clock: AtomicU64,
}

impl SemanticCompressor {
    pub fn new(config: CompressorConfig, counter: CachedTokenCounter) -> Self {
        Self {
            config,
            counter,
            cache: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    fn cache_get(&self, key: &(String, CompressionLevel)) -> Option<CompressedContent> {
        let mut entries = self.cache.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            if entry.inserted_at.elapsed() < self.cache_ttl() {
                entry.last_access = self.clock.fetch_add(1, AtomicOrdering::Relaxed);
                return Some(entry.record.clone());
            }
            // Expired, purge lazily
            entries.remove(key);
        }
        None
    }

    /// Store a result, evicting the least-recently-used entry at capacity
    fn cache_put(&self, key: (String, CompressionLevel), record: CompressedContent) {
        if self.config.cache_max_entries == 0 {
            return;
        }

        let mut entries = self.cache.lock().unwrap();
        if entries.len() >= self.config.cache_max_entries && !entries.contains_key(&key) {
            if let Some(lru_key) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone())
            {
                entries.remove(&lru_key);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                record,
                inserted_at: Instant::now(),
                last_access: self.clock.fetch_add(1, AtomicOrdering::Relaxed),
            },
        );
    }

    /// Compress content at the given level
    pub fn compress(&self, content: &str, level: CompressionLevel) -> Result<CompressedContent> {
        let key = (content_id(content), level);
        if let Some(hit) = self.cache_get(&key) {
            return Ok(hit);
        }

        let original_tokens = self.counter.count_text(content)?;
        let spans = extract_protected_spans(content);
        let (masked, store) = mask_spans(content, &spans);

        let (compressed_masked, removed) = match level {
            CompressionLevel::None => (masked.clone(), Vec::new()),
            CompressionLevel::Light => {
                let (stripped, removed) = strip_filler(&masked);
                (normalize_whitespace(&stripped), removed)
            }
            CompressionLevel::Moderate => {
                let (stripped, mut removed) = strip_filler(&masked);
                let (thinned, dropped) = drop_stopwords(&stripped, self.config.stopword_ratio);
                removed.extend(dropped);
                (normalize_whitespace(&thinned), removed)
            }
            CompressionLevel::Aggressive => {
                self.select_sentences(&normalize_whitespace(&masked))
            }
        };

        let compressed = unmask(&compressed_masked, &store);
        let compressed_tokens = self.counter.count_text(&compressed)?;
        let ratio = if original_tokens == 0 {
            1.0
        } else {
            compressed_tokens as f64 / original_tokens as f64
        };

        METRICS.record_compression(ratio);
        debug!(
            level = level.as_str(),
            original_tokens, compressed_tokens, "Compressed content"
        );

        let record = CompressedContent {
            original: content.to_string(),
            compressed,
            level,
            original_tokens,
            compressed_tokens,
            ratio,
            preserved_segments: store,
            removed_segments: removed,
        };
        self.cache_put(key, record.clone());
        Ok(record)
    }

    /// Pick the weakest level expected to fit the budget
    pub fn optimal_level(&self, content: &str, token_budget: usize) -> Result<CompressionLevel> {
        let tokens = self.counter.count_text(content)?;
        if tokens <= token_budget {
            return Ok(CompressionLevel::None);
        }

        let ratio = token_budget as f64 / tokens as f64;
        let level = if ratio >= 0.8 {
            CompressionLevel::Light
        } else if ratio >= 0.5 {
            CompressionLevel::Moderate
        } else {
            CompressionLevel::Aggressive
        };

        debug!(
            tokens,
            token_budget,
            level = level.as_str(),
            "Selected compression level"
        );
        Ok(level)
    }

    fn select_sentences(&self, text: &str) -> (String, Vec<String>) {
        let sentences = split_sentences(text);
        let total = sentences.len();
        if total == 0 {
            return (String::new(), Vec::new());
        }

        let keep = self
            .config
            .min_sentences
            .max((total as f64 * self.config.aggressive_keep_fraction).ceil() as usize)
            .min(total);

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

        let mut selected: HashSet<usize> = ranked.into_iter().take(keep).collect();
        // Sentences carrying protected content always survive
        for (i, sentence) in sentences.iter().enumerate() {
            if sentence.contains(MASK_OPEN) {
                selected.insert(i);
            }
        }

        let mut kept: Vec<usize> = selected.iter().copied().collect();
        kept.sort_unstable();
        let joined = kept
            .iter()
            .map(|&i| sentences[i].as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let dropped = sentences
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !selected.contains(i))
            .map(|(_, s)| s)
            .collect();
        (joined, dropped)
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{HeuristicCounter, TokenCountingCache};
    use std::sync::Arc;
    use std::time::Duration;

    fn compressor_with(config: CompressorConfig) -> SemanticCompressor {
        let cache = Arc::new(TokenCountingCache::new(Duration::from_secs(60), 1000));
        let counter =
            CachedTokenCounter::new(cache, Arc::new(HeuristicCounter::default()), "test-model");
        SemanticCompressor::new(config, counter)
    }

    fn compressor() -> SemanticCompressor {
        compressor_with(CompressorConfig::default())
    }

    #[test]
    fn test_none_level_is_identity() {
        let c = compressor();
        let text = "Exact   spacing\n\n\nand all.";
        let result = c.compress(text, CompressionLevel::None).unwrap();
        assert_eq!(result.compressed, text);
        assert!(result.removed_segments.is_empty());
    }

    #[test]
    fn test_light_strips_filler_and_whitespace() {
        let c = compressor();
        let result = c
            .compress(
                "Basically, the   retry loop works.   Obviously, it needs a cap.",
                CompressionLevel::Light,
            )
            .unwrap();
        assert_eq!(
            result.compressed,
            "the retry loop works. it needs a cap."
        );
        assert_eq!(result.removed_segments, vec!["Basically", "Obviously"]);
        assert!(result.ratio <= 1.0);
    }

    #[test]
    fn test_moderate_drops_trailing_stopwords() {
        let c = compressor();
        let result = c
            .compress(
                "the cat sat on the mat because the dog was in the way",
                CompressionLevel::Moderate,
            )
            .unwrap();
        // 7 bare stopword occurrences, the last 3 go
        assert_eq!(result.compressed, "the cat sat on the mat because the dog way");
        assert_eq!(result.removed_segments, vec!["was", "in", "the"]);
    }

    #[test]
    fn test_aggressive_keeps_ceiling_of_sentences() {
        let c = compressor();
        let text = (1..=10)
            .map(|i| format!("This is sentence number {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let result = c.compress(&text, CompressionLevel::Aggressive).unwrap();
        assert_eq!(result.removed_segments.len(), 6);
        assert!(result
            .removed_segments
            .contains(&"This is sentence number 4.".to_string()));
        assert_eq!(split_sentences(&result.compressed).len(), 4);
    }

    #[test]
    fn test_aggressive_keeps_minimum_two() {
        let c = compressor();
        let result = c
            .compress(
                "First point here. Second point here. Third point here.",
                CompressionLevel::Aggressive,
            )
            .unwrap();
        assert_eq!(split_sentences(&result.compressed).len(), 2);
    }

    #[test]
    fn test_code_block_survives_aggressive() {
        let c = compressor();
        let mut text = (1..=8)
            .map(|i| format!("Filler sentence number {}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        text.push_str("\n```rust\nlet answer = 42;\n```\n");
        text.push_str("Closing remark here.");

        let result = c.compress(&text, CompressionLevel::Aggressive).unwrap();
        assert!(result.compressed.contains("let answer = 42;"));
        assert!(result
            .preserved_segments
            .iter()
            .any(|s| s.contains("let answer = 42;")));
    }

    #[test]
    fn test_url_and_path_survive_moderate() {
        let c = compressor();
        let result = c
            .compress(
                "the docs live at https://example.com/a/b and the code is in src/lib.rs today",
                CompressionLevel::Moderate,
            )
            .unwrap();
        assert!(result.compressed.contains("https://example.com/a/b"));
        assert!(result.compressed.contains("src/lib.rs"));
    }

    #[test]
    fn test_optimal_level_thresholds() {
        let c = compressor();
        // 100 words at 1.3 tokens per word is 130 tokens
        let text = vec!["word"; 100].join(" ");

        assert_eq!(
            c.optimal_level(&text, 200).unwrap(),
            CompressionLevel::None
        );
        assert_eq!(
            c.optimal_level(&text, 110).unwrap(),
            CompressionLevel::Light
        );
        assert_eq!(
            c.optimal_level(&text, 70).unwrap(),
            CompressionLevel::Moderate
        );
        assert_eq!(
            c.optimal_level(&text, 30).unwrap(),
            CompressionLevel::Aggressive
        );
    }

    #[test]
    fn test_empty_content() {
        let c = compressor();
        let result = c.compress("", CompressionLevel::Aggressive).unwrap();
        assert_eq!(result.compressed, "");
        assert_eq!(result.ratio, 1.0);
        assert_eq!(c.optimal_level("", 0).unwrap(), CompressionLevel::None);
    }

    #[test]
    fn test_split_sentences_handles_terminator_runs() {
        let sentences = split_sentences("Really?! Yes. Absolutely!!");
        assert_eq!(sentences, vec!["Really?!", "Yes.", "Absolutely!!"]);
    }

    #[test]
    fn test_cache_keyed_by_digest_and_level() {
        let c = compressor();
        let text = "Basically, the cached record comes back on the second call.";

        let first = c.compress(text, CompressionLevel::Light).unwrap();
        let second = c.compress(text, CompressionLevel::Light).unwrap();
        assert_eq!(second.compressed, first.compressed);
        assert_eq!(c.cache.lock().unwrap().len(), 1);

        c.compress(text, CompressionLevel::Moderate).unwrap();
        assert_eq!(c.cache.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_cache_bounded_by_lru_eviction() {
        let c = compressor_with(CompressorConfig {
            cache_max_entries: 2,
            ..CompressorConfig::default()
        });

        c.compress("first entry text", CompressionLevel::Light).unwrap();
        c.compress("second entry text", CompressionLevel::Light).unwrap();
        // Touch the first entry so the second becomes least recently used
        c.compress("first entry text", CompressionLevel::Light).unwrap();
        c.compress("third entry text", CompressionLevel::Light).unwrap();

        let entries = c.cache.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key(&(content_id("first entry text"), CompressionLevel::Light)));
        assert!(entries.contains_key(&(content_id("third entry text"), CompressionLevel::Light)));
        assert!(!entries.contains_key(&(content_id("second entry text"), CompressionLevel::Light)));
    }

    #[test]
    fn test_cache_entries_expire() {
        let c = compressor_with(CompressorConfig {
            cache_ttl_secs: 0,
            ..CompressorConfig::default()
        });

        c.compress("short lived entry", CompressionLevel::Light).unwrap();
        let key = (content_id("short lived entry"), CompressionLevel::Light);
        assert!(c.cache_get(&key).is_none());
        // The expired entry was purged on access
        assert!(c.cache.lock().unwrap().is_empty());
    }
}
