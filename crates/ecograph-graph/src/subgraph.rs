//! Assembles a [`SubgraphResponse`] from streamed node/relationship rows.

use std::collections::HashSet;

use ecograph_core::types::{NodeResponse, RelationshipResponse, SubgraphResponse};

/// Deduplicating accumulator with a node cap.
///
/// Nodes are kept in insertion order, so callers feed the center first and
/// nearer nodes before farther ones. Relationships are kept only if both
/// endpoints survived the cap.
#[derive(Debug)]
pub struct SubgraphBuilder {
    limit: usize,
    nodes: Vec<NodeResponse>,
    node_uids: HashSet<String>,
    relationships: Vec<RelationshipResponse>,
    rel_keys: HashSet<(String, String, String)>,
}

impl SubgraphBuilder {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            nodes: Vec::new(),
            node_uids: HashSet::new(),
            relationships: Vec::new(),
            rel_keys: HashSet::new(),
        }
    }

    /// Add a node unless already present or the cap is reached.
    pub fn add_node(&mut self, node: NodeResponse) -> bool {
        if self.node_uids.contains(&node.uid) || self.nodes.len() >= self.limit {
            return false;
        }
        self.node_uids.insert(node.uid.clone());
        self.nodes.push(node);
        true
    }

    pub fn add_relationship(&mut self, rel: RelationshipResponse) {
        if self.rel_keys.insert(rel.identity()) {
            self.relationships.push(rel);
        }
    }

    pub fn contains_node(&self, uid: &str) -> bool {
        self.node_uids.contains(uid)
    }

    pub fn build(self) -> SubgraphResponse {
        let node_uids = self.node_uids;
        let relationships = self
            .relationships
            .into_iter()
            .filter(|r| node_uids.contains(&r.source_uid) && node_uids.contains(&r.target_uid))
            .collect();
        SubgraphResponse::new(self.nodes, relationships)
    }
}
