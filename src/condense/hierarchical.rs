//! Builds and maintains per-conversation summary trees

use crate::condense::summarizer::Summarizer;
use crate::condense::tree::{SummaryLevel, SummaryNode, SummaryTree};
use crate::conversation::message::Message;
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use crate::tokens::CachedTokenCounter;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Summary tree tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryTreeConfig {
    /// A range is only split while each half has at least this many messages
    #[serde(default = "default_min_messages")]
    pub min_messages_for_summary: usize,
    /// Token target for a minimal-level node; deeper levels scale up from it
    #[serde(default = "default_node_tokens")]
    pub max_node_tokens: usize,
}

fn default_min_messages() -> usize {
    4
}

fn default_node_tokens() -> usize {
    100
}

impl Default for SummaryTreeConfig {
    fn default() -> Self {
        Self {
            min_messages_for_summary: default_min_messages(),
            max_node_tokens: default_node_tokens(),
        }
    }
}

/// Split a half-open range into `parts` contiguous near-equal segments
///
/// Ranges smaller than `parts` yield fewer segments; empty segments are
/// never produced.
pub fn split_range(start: usize, end: usize, parts: usize) -> Vec<(usize, usize)> {
    if parts == 0 || end <= start {
        return Vec::new();
    }

    let len = end - start;
    let base = len / parts;
    let remainder = len % parts;
    let mut segments = Vec::with_capacity(parts);
    let mut cursor = start;
    for i in 0..parts {
        let size = base + usize::from(i < remainder);
        if size == 0 {
            continue;
        }
        segments.push((cursor, cursor + size));
        cursor += size;
    }
    segments
}

fn level_instruction(level: SummaryLevel) -> &'static str {
    match level {
        SummaryLevel::Minimal => {
            "Summarize this conversation segment in one or two sentences, keeping only the \
             most important outcome."
        }
        SummaryLevel::Brief => {
            "Summarize this conversation segment in a short paragraph covering the main \
             points and decisions."
        }
        SummaryLevel::Standard => {
            "Summarize this conversation segment, preserving decisions, constraints, and the \
             technical detail needed to continue the work."
        }
        SummaryLevel::Detailed => {
            "Write a detailed summary of this conversation segment, preserving technical \
             specifics, identifiers, and reasoning steps."
        }
    }
}

/// Maintains one summary tree per conversation id
pub struct HierarchicalSummarizer {
    summarizer: Arc<dyn Summarizer>,
    counter: CachedTokenCounter,
    config: SummaryTreeConfig,
    trees: DashMap<String, SummaryTree>,
}

impl HierarchicalSummarizer {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        counter: CachedTokenCounter,
        config: SummaryTreeConfig,
    ) -> Self {
        Self {
            summarizer,
            counter,
            config,
            trees: DashMap::new(),
        }
    }

    fn level_max_tokens(&self, level: SummaryLevel) -> usize {
        let multiplier = match level {
            SummaryLevel::Minimal => 1,
            SummaryLevel::Brief => 2,
            SummaryLevel::Standard => 4,
            SummaryLevel::Detailed => 8,
        };
        self.config.max_node_tokens * multiplier
    }

    async fn summarize_range(
        &self,
        conversation_id: &str,
        messages: &[Message],
        start: usize,
        end: usize,
        level: SummaryLevel,
        parent_id: Option<String>,
    ) -> Result<SummaryNode> {
        let texts: Vec<String> = messages[start..end]
            .iter()
            .filter(|m| m.is_visible())
            .map(|m| format!("{}: {}", m.role.as_str(), m.text()))
            .collect();

        let summary = self
            .summarizer
            .summarize(
                &texts,
                level_instruction(level),
                self.level_max_tokens(level),
                None,
            )
            .await
            .map_err(|e| ContextError::Summarization(e.to_string()))?;
        let tokens = self.counter.count_text(&summary.text)?;

        debug!(
            conversation_id = %conversation_id,
            level = level.as_str(),
            start,
            end,
            tokens,
            "Summarized message range"
        );

        Ok(SummaryNode {
            id: Uuid::new_v4().to_string(),
            level,
            text: summary.text,
            tokens,
            parent_id,
            child_ids: Vec::new(),
            start_index: start,
            end_index: end,
            created_at: Utc::now(),
        })
    }

    /// Build a fresh tree for the conversation, replacing any existing one
    ///
    /// The new tree is published only after every level succeeded, so an
    /// aborted or failed build leaves the previous tree untouched.
    pub async fn build(&self, conversation_id: &str, messages: &[Message]) -> Result<SummaryTree> {
        let result = self.build_inner(conversation_id, messages).await;
        match &result {
            Ok(tree) => METRICS.record_tree_build("success", Some(tree.node_count())),
            Err(_) => METRICS.record_tree_build("failure", None),
        }
        result
    }

    async fn build_inner(
        &self,
        conversation_id: &str,
        messages: &[Message],
    ) -> Result<SummaryTree> {
        if messages.len() < self.config.min_messages_for_summary {
            return Err(ContextError::Summarization(format!(
                "Need at least {} messages to build a summary tree, got {}",
                self.config.min_messages_for_summary,
                messages.len()
            )));
        }

        let root = self
            .summarize_range(
                conversation_id,
                messages,
                0,
                messages.len(),
                SummaryLevel::Minimal,
                None,
            )
            .await?;
        let mut tree = SummaryTree::new(conversation_id, root, messages.len());

        let mut parent_level = SummaryLevel::Minimal;
        for level in [SummaryLevel::Brief, SummaryLevel::Standard] {
            let parents: Vec<(String, usize, usize)> = tree
                .nodes_at_level(parent_level)
                .iter()
                .filter(|n| n.end_index - n.start_index >= 2 * self.config.min_messages_for_summary)
                .map(|n| (n.id.clone(), n.start_index, n.end_index))
                .collect();
            if parents.is_empty() {
                break;
            }

            for (parent_id, start, end) in parents {
                let futures = split_range(start, end, 2).into_iter().map(|(s, e)| {
                    self.summarize_range(
                        conversation_id,
                        messages,
                        s,
                        e,
                        level,
                        Some(parent_id.clone()),
                    )
                });
                for child in try_join_all(futures).await? {
                    tree.insert(child);
                }
            }
            parent_level = level;
        }

        info!(
            conversation_id = %conversation_id,
            nodes = tree.node_count(),
            total_tokens = tree.total_tokens,
            "Built summary tree"
        );
        self.trees.insert(conversation_id.to_string(), tree.clone());
        Ok(tree)
    }

    /// Deepen one leaf node by splitting its range into three segments
    ///
    /// A node that already has children hands them back without another
    /// summarization call.
    pub async fn expand(
        &self,
        conversation_id: &str,
        node_id: &str,
        messages: &[Message],
    ) -> Result<Vec<SummaryNode>> {
        let (start, end, level) = {
            let tree = self.trees.get(conversation_id).ok_or_else(|| {
                ContextError::Summarization(format!(
                    "No summary tree for conversation {}",
                    conversation_id
                ))
            })?;
            let node = tree.get(node_id).ok_or_else(|| {
                ContextError::Summarization(format!("Unknown summary node {}", node_id))
            })?;
            if !node.child_ids.is_empty() {
                return Ok(node
                    .child_ids
                    .iter()
                    .filter_map(|cid| tree.get(cid).cloned())
                    .collect());
            }
            (node.start_index, node.end_index, node.level)
        };

        let next_level = level.more_detailed().ok_or_else(|| {
            ContextError::Summarization("Node is already at the most detailed level".to_string())
        })?;
        if end - start < 2 {
            return Err(ContextError::Summarization(
                "Node range is too small to expand".to_string(),
            ));
        }
        if end > messages.len() {
            return Err(ContextError::Summarization(
                "Message list no longer covers the node range".to_string(),
            ));
        }

        let futures = split_range(start, end, 3).into_iter().map(|(s, e)| {
            self.summarize_range(
                conversation_id,
                messages,
                s,
                e,
                next_level,
                Some(node_id.to_string()),
            )
        });
        let children = try_join_all(futures).await?;

        let mut tree = self.trees.get_mut(conversation_id).ok_or_else(|| {
            ContextError::Summarization(format!(
                "No summary tree for conversation {}",
                conversation_id
            ))
        })?;
        for child in &children {
            tree.insert(child.clone());
        }
        info!(
            conversation_id = %conversation_id,
            node_id = %node_id,
            children = children.len(),
            "Expanded summary node"
        );

        Ok(children)
    }

    /// Assemble the most detailed summary that fits the token budget
    ///
    /// Breadth-first from the root: a node that fits is included, unless its
    /// children also fit the remaining budget, in which case they replace it.
    pub fn summary_for_budget(&self, conversation_id: &str, token_budget: usize) -> Result<String> {
        let tree = self.trees.get(conversation_id).ok_or_else(|| {
            ContextError::Summarization(format!(
                "No summary tree for conversation {}",
                conversation_id
            ))
        })?;

        let mut remaining = token_budget;
        let mut selected: Vec<(usize, String)> = Vec::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(tree.root_id.clone());

        while let Some(id) = queue.pop_front() {
            let node = match tree.get(&id) {
                Some(node) => node,
                None => continue,
            };
            if node.tokens > remaining {
                continue;
            }

            let child_sum: usize = node
                .child_ids
                .iter()
                .filter_map(|cid| tree.get(cid))
                .map(|child| child.tokens)
                .sum();
            if !node.child_ids.is_empty() && child_sum > 0 && child_sum <= remaining {
                queue.extend(node.child_ids.iter().cloned());
            } else {
                remaining -= node.tokens;
                selected.push((node.start_index, node.text.clone()));
            }
        }

        selected.sort_by_key(|(start, _)| *start);
        Ok(selected
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Concatenate all summaries at one level, ordered by message range
    pub fn summary_at_level(&self, conversation_id: &str, level: SummaryLevel) -> Result<String> {
        let tree = self.trees.get(conversation_id).ok_or_else(|| {
            ContextError::Summarization(format!(
                "No summary tree for conversation {}",
                conversation_id
            ))
        })?;

        Ok(tree
            .nodes_at_level(level)
            .iter()
            .map(|node| node.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Rebuild the conversation's tree from the current message list
    pub async fn update(&self, conversation_id: &str, messages: &[Message]) -> Result<SummaryTree> {
        {
            if let Some(existing) = self.trees.get(conversation_id) {
                // A pure append keeps the old tree a prefix of the new range
                let appended_only = existing.message_count <= messages.len();
                debug!(
                    conversation_id = %conversation_id,
                    previous_messages = existing.message_count,
                    current_messages = messages.len(),
                    appended_only,
                    "Rebuilding summary tree"
                );
            }
        }
        self.build(conversation_id, messages).await
    }

    pub fn tree(&self, conversation_id: &str) -> Option<SummaryTree> {
        self.trees.get(conversation_id).map(|tree| tree.clone())
    }

    pub fn remove_tree(&self, conversation_id: &str) -> Option<SummaryTree> {
        self.trees.remove(conversation_id).map(|(_, tree)| tree)
    }

    pub fn clear(&self) {
        self.trees.clear();
    }
}
