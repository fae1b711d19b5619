//! ecograph-service: business rules over a [`GraphStore`].
//!
//! The service validates payloads and filters, enforces existence and
//! (label, name) uniqueness, and turns absent results into typed errors.
//! Storage is reached only through the trait, so the same rules run against
//! Neo4j ([`GraphRepository`]) or the in-process [`MemoryStore`].

pub mod config;

use std::sync::Arc;

use ecograph_core::filter::{NodeFilter, RelationshipFilter, SubgraphFilter};
use ecograph_core::types::{
    GraphStats, NodeCreate, NodeResponse, NodeUpdate, RelationshipCreate, RelationshipKey,
    RelationshipResponse, RelationshipUpdate, SubgraphResponse,
};
use ecograph_core::{GraphError, Result};
use ecograph_graph::{GraphClient, GraphConfig, GraphRepository, GraphStore, MemoryStore};

/// Domain operations on the technology graph.
#[derive(Clone)]
pub struct GraphService {
    store: Arc<dyn GraphStore>,
    client: Option<GraphClient>,
}

impl GraphService {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            client: None,
        }
    }

    /// Connect to Neo4j and build a service over it.
    pub async fn connect(config: GraphConfig) -> Result<Self> {
        let client = GraphClient::new(config);
        client.connect().await?;
        Ok(Self {
            store: Arc::new(GraphRepository::new(client.clone())),
            client: Some(client),
        })
    }

    /// Service over an empty in-process graph.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Release the Neo4j pool, if any. Idempotent.
    pub async fn close(&self) {
        if let Some(client) = &self.client {
            client.close().await;
        }
    }

    // ── Maintenance ──────────────────────────────────────────────

    pub async fn init_schema(&self) -> Result<()> {
        self.store.init_schema().await
    }

    pub async fn get_stats(&self) -> Result<GraphStats> {
        self.store.stats().await
    }

    /// Delete every node and relationship.
    pub async fn clear_all(&self) -> Result<()> {
        tracing::warn!("Clearing all nodes and relationships");
        self.store.clear_all().await
    }

    // ── Nodes ────────────────────────────────────────────────────

    /// Create a node; (label, name) must not already exist.
    ///
    /// The check and the write are separate round trips, so two concurrent
    /// creates of the same pair can both succeed.
    pub async fn create_node(&self, data: &NodeCreate) -> Result<NodeResponse> {
        data.validate()?;
        if self.store.node_exists(&data.label, &data.name).await? {
            return Err(GraphError::DuplicateNode(format!(
                "{} '{}' already exists",
                data.label, data.name
            )));
        }
        let node = self.store.create_node(data).await?;
        tracing::info!(uid = %node.uid, label = %node.label, name = %node.name, "Created node");
        Ok(node)
    }

    pub async fn get_node(&self, uid: &str) -> Result<NodeResponse> {
        self.store
            .get_node(uid)
            .await?
            .ok_or_else(|| GraphError::NodeNotFound(uid.to_string()))
    }

    pub async fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeResponse>> {
        filter.validate()?;
        self.store.find_nodes(filter).await
    }

    pub async fn update_node(&self, uid: &str, data: &NodeUpdate) -> Result<NodeResponse> {
        data.validate()?;
        let node = self
            .store
            .update_node(uid, data)
            .await?
            .ok_or_else(|| GraphError::NodeNotFound(uid.to_string()))?;
        tracing::info!(uid, "Updated node");
        Ok(node)
    }

    /// Delete a node together with its relationships.
    pub async fn delete_node(&self, uid: &str) -> Result<bool> {
        if !self.store.delete_node(uid).await? {
            return Err(GraphError::NodeNotFound(uid.to_string()));
        }
        tracing::info!(uid, "Deleted node");
        Ok(true)
    }

    // ── Relationships ────────────────────────────────────────────

    async fn require_node(&self, uid: &str) -> Result<()> {
        match self.store.get_node(uid).await? {
            Some(_) => Ok(()),
            None => Err(GraphError::NodeNotFound(uid.to_string())),
        }
    }

    /// Create a relationship between two existing nodes.
    pub async fn create_relationship(&self, data: &RelationshipCreate) -> Result<RelationshipResponse> {
        data.validate()?;
        self.require_node(&data.source_uid).await?;
        self.require_node(&data.target_uid).await?;

        let rel = self
            .store
            .create_relationship(data)
            .await?
            .ok_or_else(|| {
                GraphError::NodeNotFound(format!(
                    "{} or {}",
                    data.source_uid, data.target_uid
                ))
            })?;
        tracing::info!(
            source = %rel.source_uid,
            target = %rel.target_uid,
            rel_type = %rel.rel_type,
            "Created relationship"
        );
        Ok(rel)
    }

    pub async fn get_relationships(
        &self,
        uid: &str,
        filter: Option<&RelationshipFilter>,
    ) -> Result<Vec<RelationshipResponse>> {
        if let Some(f) = filter {
            f.validate()?;
        }
        self.require_node(uid).await?;
        self.store.get_relationships(uid, filter).await
    }

    pub async fn update_relationship(
        &self,
        key: &RelationshipKey,
        data: &RelationshipUpdate,
    ) -> Result<RelationshipResponse> {
        data.validate()?;
        let rel = self
            .store
            .update_relationship(key, data)
            .await?
            .ok_or_else(|| GraphError::RelationshipNotFound(key.to_string()))?;
        tracing::info!(relationship = %key, "Updated relationship");
        Ok(rel)
    }

    pub async fn delete_relationship(&self, key: &RelationshipKey) -> Result<bool> {
        if !self.store.delete_relationship(key).await? {
            return Err(GraphError::RelationshipNotFound(key.to_string()));
        }
        tracing::info!(relationship = %key, "Deleted relationship");
        Ok(true)
    }

    // ── Subgraphs ────────────────────────────────────────────────

    pub async fn get_subgraph(&self, filter: &SubgraphFilter) -> Result<SubgraphResponse> {
        filter.validate()?;
        if let Some(center) = &filter.center_uid {
            self.require_node(center).await?;
        }
        self.store.get_subgraph(filter).await
    }

    // ── Batches ──────────────────────────────────────────────────

    /// Create nodes one by one. Duplicates are logged and skipped; any other
    /// failure aborts the batch.
    pub async fn create_nodes_batch(&self, items: &[NodeCreate]) -> Result<Vec<NodeResponse>> {
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            match self.create_node(item).await {
                Ok(node) => created.push(node),
                Err(e) if e.is_skippable() => {
                    tracing::warn!(label = %item.label, name = %item.name, error = %e, "Skipping node");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(requested = items.len(), created = created.len(), "Node batch done");
        Ok(created)
    }

    /// Create relationships one by one. Missing endpoints are logged and
    /// skipped; any other failure aborts the batch.
    pub async fn create_relationships_batch(
        &self,
        items: &[RelationshipCreate],
    ) -> Result<Vec<RelationshipResponse>> {
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            match self.create_relationship(item).await {
                Ok(rel) => created.push(rel),
                Err(e) if e.is_skippable() => {
                    tracing::warn!(relationship = %item.key(), error = %e, "Skipping relationship");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            requested = items.len(),
            created = created.len(),
            "Relationship batch done"
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecograph_core::types::{Label, RelType};

    fn tech(name: &str) -> NodeCreate {
        NodeCreate::new(Label::new("Technology").unwrap(), name)
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_store() {
        let service = GraphService::in_memory();
        let err = service
            .create_node(&tech("Kafka").with_property("uid", "forged"))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
        assert_eq!(service.get_stats().await.unwrap().total_nodes, 0);
    }

    #[tokio::test]
    async fn invalid_filter_is_rejected() {
        let service = GraphService::in_memory();
        let filter = NodeFilter {
            limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            service.find_nodes(&filter).await,
            Err(GraphError::InvalidFilter(_))
        ));

        let sub = SubgraphFilter::around("anything", 11);
        assert!(matches!(
            service.get_subgraph(&sub).await,
            Err(GraphError::InvalidFilter(_))
        ));
    }

    #[tokio::test]
    async fn relationship_lookups_name_the_missing_key() {
        let service = GraphService::in_memory();
        let key = RelationshipCreate::new("a", "b", RelType::new("USES").unwrap()).key();
        match service.delete_relationship(&key).await {
            Err(GraphError::RelationshipNotFound(msg)) => assert_eq!(msg, "a -[USES]-> b"),
            other => panic!("expected RelationshipNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_without_client_is_noop() {
        let service = GraphService::in_memory();
        service.close().await;
        service.close().await;
    }
}
