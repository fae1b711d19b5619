//! Neo4j-backed [`GraphStore`].

use async_trait::async_trait;

use ecograph_core::filter::{NodeFilter, RelationshipFilter, SubgraphFilter};
use ecograph_core::types::{
    GraphStats, Label, NodeCreate, NodeResponse, NodeUpdate, RelationshipCreate, RelationshipKey,
    RelationshipResponse, RelationshipUpdate, SubgraphResponse,
};
use ecograph_core::Result;

use crate::client::GraphClient;
use crate::store::GraphStore;

/// Repository over a shared [`GraphClient`]. Reads live in `queries.rs`,
/// writes in `mutations.rs`.
#[derive(Clone)]
pub struct GraphRepository {
    pub(crate) client: GraphClient,
}

impl GraphRepository {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }
}

#[async_trait]
impl GraphStore for GraphRepository {
    async fn init_schema(&self) -> Result<()> {
        GraphRepository::init_schema(self).await
    }

    async fn clear_all(&self) -> Result<()> {
        GraphRepository::clear_all(self).await
    }

    async fn stats(&self) -> Result<GraphStats> {
        GraphRepository::stats(self).await
    }

    async fn create_node(&self, data: &NodeCreate) -> Result<NodeResponse> {
        GraphRepository::create_node(self, data).await
    }

    async fn get_node(&self, uid: &str) -> Result<Option<NodeResponse>> {
        GraphRepository::get_node(self, uid).await
    }

    async fn node_exists(&self, label: &Label, name: &str) -> Result<bool> {
        GraphRepository::node_exists(self, label, name).await
    }

    async fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeResponse>> {
        GraphRepository::find_nodes(self, filter).await
    }

    async fn update_node(&self, uid: &str, data: &NodeUpdate) -> Result<Option<NodeResponse>> {
        GraphRepository::update_node(self, uid, data).await
    }

    async fn delete_node(&self, uid: &str) -> Result<bool> {
        GraphRepository::delete_node(self, uid).await
    }

    async fn create_relationship(
        &self,
        data: &RelationshipCreate,
    ) -> Result<Option<RelationshipResponse>> {
        GraphRepository::create_relationship(self, data).await
    }

    async fn get_relationships(
        &self,
        uid: &str,
        filter: Option<&RelationshipFilter>,
    ) -> Result<Vec<RelationshipResponse>> {
        GraphRepository::get_relationships(self, uid, filter).await
    }

    async fn update_relationship(
        &self,
        key: &RelationshipKey,
        data: &RelationshipUpdate,
    ) -> Result<Option<RelationshipResponse>> {
        GraphRepository::update_relationship(self, key, data).await
    }

    async fn delete_relationship(&self, key: &RelationshipKey) -> Result<bool> {
        GraphRepository::delete_relationship(self, key).await
    }

    async fn get_subgraph(&self, filter: &SubgraphFilter) -> Result<SubgraphResponse> {
        GraphRepository::get_subgraph(self, filter).await
    }
}
