//! Repository contract the domain service is written against.

use async_trait::async_trait;

use ecograph_core::filter::{NodeFilter, RelationshipFilter, SubgraphFilter};
use ecograph_core::types::{
    GraphStats, Label, NodeCreate, NodeResponse, NodeUpdate, RelationshipCreate, RelationshipKey,
    RelationshipResponse, RelationshipUpdate, SubgraphResponse,
};
use ecograph_core::Result;

/// Storage operations over the property graph.
///
/// Implementations do no business checks: absence is reported as `None` /
/// `false`, and uniqueness of (label, name) is the caller's concern.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Declare the uid constraint and the name/source indexes. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    /// Detach-delete every node.
    async fn clear_all(&self) -> Result<()>;

    async fn stats(&self) -> Result<GraphStats>;

    // ── Nodes ──

    /// Persist a node under a freshly generated uid.
    async fn create_node(&self, data: &NodeCreate) -> Result<NodeResponse>;

    async fn get_node(&self, uid: &str) -> Result<Option<NodeResponse>>;

    async fn node_exists(&self, label: &Label, name: &str) -> Result<bool>;

    async fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeResponse>>;

    async fn update_node(&self, uid: &str, data: &NodeUpdate) -> Result<Option<NodeResponse>>;

    /// Remove a node and every incident relationship.
    async fn delete_node(&self, uid: &str) -> Result<bool>;

    // ── Relationships ──

    /// `None` when either endpoint is missing.
    async fn create_relationship(
        &self,
        data: &RelationshipCreate,
    ) -> Result<Option<RelationshipResponse>>;

    /// Incoming and outgoing relationships of `uid`, heaviest first.
    async fn get_relationships(
        &self,
        uid: &str,
        filter: Option<&RelationshipFilter>,
    ) -> Result<Vec<RelationshipResponse>>;

    async fn update_relationship(
        &self,
        key: &RelationshipKey,
        data: &RelationshipUpdate,
    ) -> Result<Option<RelationshipResponse>>;

    async fn delete_relationship(&self, key: &RelationshipKey) -> Result<bool>;

    // ── Subgraphs ──

    /// Neighborhood extraction when `center_uid` is set, otherwise a
    /// node-first filtered subgraph.
    async fn get_subgraph(&self, filter: &SubgraphFilter) -> Result<SubgraphResponse>;
}
