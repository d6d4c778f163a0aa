//! Arena-style tree of multi-granularity conversation summaries

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Summary granularity, ordered from most to least condensed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLevel {
    Minimal,
    Brief,
    Standard,
    Detailed,
}

impl SummaryLevel {
    /// The next level down toward full detail, if any
    pub fn more_detailed(&self) -> Option<SummaryLevel> {
        match self {
            SummaryLevel::Minimal => Some(SummaryLevel::Brief),
            SummaryLevel::Brief => Some(SummaryLevel::Standard),
            SummaryLevel::Standard => Some(SummaryLevel::Detailed),
            SummaryLevel::Detailed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLevel::Minimal => "minimal",
            SummaryLevel::Brief => "brief",
            SummaryLevel::Standard => "standard",
            SummaryLevel::Detailed => "detailed",
        }
    }
}

/// One node in the arena; owned exclusively by its tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryNode {
    pub id: String,
    pub level: SummaryLevel,
    pub text: String,
    pub tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    /// Half-open range [start, end) into the conversation's message list
    pub start_index: usize,
    pub end_index: usize,
    pub created_at: DateTime<Utc>,
}

/// Summary tree for one conversation
///
/// Nodes live in an id-indexed arena; parents reference children by id, which
/// keeps the structure serializable and free of ownership cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryTree {
    pub conversation_id: String,
    pub root_id: String,
    pub nodes: IndexMap<String, SummaryNode>,
    /// Always equals the sum of all node token counts
    pub total_tokens: usize,
    pub levels: Vec<SummaryLevel>,
    /// Length of the message list this tree was built from
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

impl SummaryTree {
    pub fn new(conversation_id: impl Into<String>, root: SummaryNode, message_count: usize) -> Self {
        let root_id = root.id.clone();
        let total_tokens = root.tokens;
        let levels = vec![root.level];
        let mut nodes = IndexMap::new();
        nodes.insert(root.id.clone(), root);

        Self {
            conversation_id: conversation_id.into(),
            root_id,
            nodes,
            total_tokens,
            levels,
            message_count,
            created_at: Utc::now(),
        }
    }

    /// Insert a node, keeping token totals, levels, and parent links consistent
    pub fn insert(&mut self, node: SummaryNode) {
        self.total_tokens += node.tokens;
        if !self.levels.contains(&node.level) {
            self.levels.push(node.level);
        }
        if let Some(parent_id) = node.parent_id.clone() {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                if !parent.child_ids.contains(&node.id) {
                    parent.child_ids.push(node.id.clone());
                }
            }
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<&SummaryNode> {
        self.nodes.get(id)
    }

    pub fn root(&self) -> Option<&SummaryNode> {
        self.nodes.get(&self.root_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes at one level, ordered by the start of their message range
    pub fn nodes_at_level(&self, level: SummaryLevel) -> Vec<&SummaryNode> {
        let mut nodes: Vec<&SummaryNode> = self
            .nodes
            .values()
            .filter(|node| node.level == level)
            .collect();
        nodes.sort_by_key(|node| node.start_index);
        nodes
    }
}
