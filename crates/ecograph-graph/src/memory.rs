//! In-process [`GraphStore`] with the same semantics as the Neo4j one.
//!
//! Used by the service test-suite and by the CLI's `--in-memory` dry runs.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use ecograph_core::filter::{NodeFilter, RelationshipFilter, SubgraphFilter};
use ecograph_core::types::{
    new_uid, GraphStats, Label, NodeCreate, NodeResponse, NodeUpdate, Properties,
    RelationshipCreate, RelationshipKey, RelationshipResponse, RelationshipUpdate,
    SubgraphResponse,
};
use ecograph_core::Result;

use crate::store::GraphStore;
use crate::subgraph::SubgraphBuilder;

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<String, NodeResponse>,
    relationships: Vec<RelationshipResponse>,
}

impl State {
    fn matches_key(rel: &RelationshipResponse, key: &RelationshipKey) -> bool {
        rel.source_uid == key.source_uid
            && rel.target_uid == key.target_uid
            && rel.rel_type == key.rel_type.as_str()
    }

    fn sorted_by_name<'a>(nodes: impl Iterator<Item = &'a NodeResponse>) -> Vec<&'a NodeResponse> {
        let mut nodes: Vec<_> = nodes.collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uid.cmp(&b.uid)));
        nodes
    }

    /// Undirected breadth-first walk over admissible nodes and relationships.
    ///
    /// Returns reached nodes (center first) with their hop distance.
    fn reach(
        &self,
        center: &str,
        depth: u32,
        node_ok: impl Fn(&NodeResponse) -> bool,
        rel_ok: impl Fn(&RelationshipResponse) -> bool,
    ) -> Vec<(String, u32)> {
        let mut order = vec![(center.to_string(), 0)];
        let mut dist: HashMap<&str, u32> = HashMap::from([(center, 0)]);
        let mut queue = VecDeque::from([center]);

        while let Some(uid) = queue.pop_front() {
            let d = dist[uid];
            if d >= depth {
                continue;
            }
            let mut next: Vec<&NodeResponse> = self
                .relationships
                .iter()
                .filter(|&r| rel_ok(r))
                .filter_map(|r| {
                    if r.source_uid == uid {
                        Some(r.target_uid.as_str())
                    } else if r.target_uid == uid {
                        Some(r.source_uid.as_str())
                    } else {
                        None
                    }
                })
                .filter_map(|other| self.nodes.get(other))
                .filter(|&n| !dist.contains_key(n.uid.as_str()) && node_ok(n))
                .collect();
            next.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uid.cmp(&b.uid)));
            next.dedup_by(|a, b| a.uid == b.uid);

            for node in next {
                dist.insert(node.uid.as_str(), d + 1);
                order.push((node.uid.clone(), d + 1));
                queue.push_back(node.uid.as_str());
            }
        }
        order
    }

    fn neighborhood(&self, filter: &SubgraphFilter, center_uid: &str) -> SubgraphResponse {
        let Some(center) = self.nodes.get(center_uid) else {
            return SubgraphResponse::default();
        };
        let node_ok = |n: &NodeResponse| filter.node_filter.as_ref().map_or(true, |f| f.matches(n));
        let rel_ok =
            |r: &RelationshipResponse| filter.rel_filter.as_ref().map_or(true, |f| f.matches(r));

        let mut reached = self.reach(&center.uid, filter.depth, node_ok, rel_ok);
        reached[1..].sort_by(|(a, da), (b, db)| {
            let name = |uid: &str| self.nodes.get(uid).map(|n| n.name.as_str());
            da.cmp(db)
                .then_with(|| name(a).cmp(&name(b)))
                .then_with(|| a.cmp(b))
        });
        let dist: HashMap<&str, u32> = reached.iter().map(|(u, d)| (u.as_str(), *d)).collect();

        let mut builder = SubgraphBuilder::new(filter.limit as usize);
        for (uid, _) in &reached {
            if let Some(node) = self.nodes.get(uid) {
                builder.add_node(node.clone());
            }
        }
        for rel in self.relationships.iter().filter(|&r| rel_ok(r)) {
            let (Some(a), Some(b)) = (
                dist.get(rel.source_uid.as_str()),
                dist.get(rel.target_uid.as_str()),
            ) else {
                continue;
            };
            if (*a).min(*b) + 1 <= filter.depth {
                builder.add_relationship(rel.clone());
            }
        }
        builder.build()
    }

    fn filtered_subgraph(&self, filter: &SubgraphFilter) -> SubgraphResponse {
        let candidates = self
            .nodes
            .values()
            .filter(|n| filter.node_filter.as_ref().map_or(true, |f| f.matches(n)));

        let mut builder = SubgraphBuilder::new(filter.limit as usize);
        for node in Self::sorted_by_name(candidates) {
            builder.add_node(node.clone());
        }
        for rel in &self.relationships {
            if builder.contains_node(&rel.source_uid)
                && builder.contains_node(&rel.target_uid)
                && filter.rel_filter.as_ref().map_or(true, |f| f.matches(rel))
            {
                builder.add_relationship(rel.clone());
            }
        }
        builder.build()
    }
}

/// Graph held in process memory behind an async `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Property values as Neo4j stores them: a null value is never stored.
fn stored(props: &Properties) -> Properties {
    props
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// `SET x += $props`: null removes the key, anything else replaces it.
fn merge(target: &mut Properties, patch: &Properties) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn page<T>(items: Vec<T>, offset: u32, limit: u32) -> Vec<T> {
    items
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.nodes.clear();
        state.relationships.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let state = self.state.read().await;
        let mut label_counts = BTreeMap::new();
        for node in state.nodes.values() {
            *label_counts.entry(node.label.clone()).or_insert(0) += 1;
        }
        Ok(GraphStats {
            total_nodes: state.nodes.len() as i64,
            total_relationships: state.relationships.len() as i64,
            label_counts,
        })
    }

    async fn create_node(&self, data: &NodeCreate) -> Result<NodeResponse> {
        let now = Utc::now();
        let node = NodeResponse {
            uid: new_uid(),
            label: data.label.to_string(),
            name: data.name.clone(),
            description: data.description.clone(),
            properties: stored(&data.properties),
            source: data.source.clone(),
            created_at: now,
            updated_at: now,
        };
        self.state
            .write()
            .await
            .nodes
            .insert(node.uid.clone(), node.clone());
        Ok(node)
    }

    async fn get_node(&self, uid: &str) -> Result<Option<NodeResponse>> {
        Ok(self.state.read().await.nodes.get(uid).cloned())
    }

    async fn node_exists(&self, label: &Label, name: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .nodes
            .values()
            .any(|n| n.label == label.as_str() && n.name == name))
    }

    async fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeResponse>> {
        let state = self.state.read().await;
        let matching = State::sorted_by_name(state.nodes.values().filter(|n| filter.matches(n)))
            .into_iter()
            .cloned()
            .collect();
        Ok(page(matching, filter.offset, filter.limit))
    }

    async fn update_node(&self, uid: &str, data: &NodeUpdate) -> Result<Option<NodeResponse>> {
        let mut state = self.state.write().await;
        let Some(node) = state.nodes.get_mut(uid) else {
            return Ok(None);
        };
        if let Some(name) = &data.name {
            node.name = name.clone();
        }
        if let Some(description) = &data.description {
            node.description = Some(description.clone());
        }
        if let Some(source) = &data.source {
            node.source = Some(source.clone());
        }
        if let Some(props) = &data.properties {
            merge(&mut node.properties, props);
        }
        node.updated_at = Utc::now();
        Ok(Some(node.clone()))
    }

    async fn delete_node(&self, uid: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.nodes.remove(uid).is_none() {
            return Ok(false);
        }
        state
            .relationships
            .retain(|r| r.source_uid != uid && r.target_uid != uid);
        Ok(true)
    }

    async fn create_relationship(
        &self,
        data: &RelationshipCreate,
    ) -> Result<Option<RelationshipResponse>> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(&data.source_uid) || !state.nodes.contains_key(&data.target_uid)
        {
            return Ok(None);
        }
        let now = Utc::now();
        let rel = RelationshipResponse {
            source_uid: data.source_uid.clone(),
            target_uid: data.target_uid.clone(),
            rel_type: data.rel_type.to_string(),
            weight: data.weight,
            properties: stored(&data.properties),
            source: data.source.clone(),
            created_at: now,
            updated_at: now,
        };
        state.relationships.push(rel.clone());
        Ok(Some(rel))
    }

    async fn get_relationships(
        &self,
        uid: &str,
        filter: Option<&RelationshipFilter>,
    ) -> Result<Vec<RelationshipResponse>> {
        let default = RelationshipFilter::default();
        let filter = filter.unwrap_or(&default);
        let state = self.state.read().await;

        let mut rels: Vec<RelationshipResponse> = state
            .relationships
            .iter()
            .filter(|r| (r.source_uid == uid || r.target_uid == uid) && filter.matches(r))
            .cloned()
            .collect();
        rels.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        Ok(page(rels, filter.offset, filter.limit))
    }

    async fn update_relationship(
        &self,
        key: &RelationshipKey,
        data: &RelationshipUpdate,
    ) -> Result<Option<RelationshipResponse>> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut updated = None;
        for rel in state
            .relationships
            .iter_mut()
            .filter(|r| State::matches_key(r, key))
        {
            if let Some(weight) = data.weight {
                rel.weight = weight;
            }
            if let Some(source) = &data.source {
                rel.source = Some(source.clone());
            }
            if let Some(props) = &data.properties {
                merge(&mut rel.properties, props);
            }
            rel.updated_at = now;
            updated.get_or_insert_with(|| rel.clone());
        }
        Ok(updated)
    }

    async fn delete_relationship(&self, key: &RelationshipKey) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.relationships.len();
        state.relationships.retain(|r| !State::matches_key(r, key));
        Ok(state.relationships.len() < before)
    }

    async fn get_subgraph(&self, filter: &SubgraphFilter) -> Result<SubgraphResponse> {
        let state = self.state.read().await;
        Ok(match &filter.center_uid {
            Some(center) => state.neighborhood(filter, center),
            None => state.filtered_subgraph(filter),
        })
    }
}
