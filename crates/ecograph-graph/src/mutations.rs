//! Write operations against Neo4j.
//!
//! Creates stamp `created_at`/`updated_at` with the server clock; updates
//! refresh `updated_at` and merge the open property map.

use ecograph_core::types::{
    new_uid, NodeCreate, NodeResponse, NodeUpdate, RelationshipCreate, RelationshipKey,
    RelationshipResponse, RelationshipUpdate,
};
use ecograph_core::{GraphError, Result};

use crate::client::Record;
use crate::cypher;
use crate::mapper::{int_column, node_column, relationship_column};
use crate::repository::GraphRepository;

fn deleted(records: &[Record]) -> Result<bool> {
    match records.first() {
        Some(record) => Ok(int_column(record, "deleted")? > 0),
        None => Ok(false),
    }
}

impl GraphRepository {
    // ── Schema ───────────────────────────────────────────────────

    pub async fn init_schema(&self) -> Result<()> {
        for statement in cypher::schema() {
            self.client.execute_write(&statement).await?;
        }
        tracing::info!("Schema constraints and indexes ensured");
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.client.execute_write(&cypher::clear_all()).await?;
        Ok(())
    }

    // ── Nodes ────────────────────────────────────────────────────

    pub async fn create_node(&self, data: &NodeCreate) -> Result<NodeResponse> {
        let uid = new_uid();
        let records = self
            .client
            .execute_write(&cypher::create_node(&uid, data))
            .await?;
        let created = match records.first() {
            Some(record) => node_column(record, "n")?,
            None => None,
        };
        created.ok_or_else(|| GraphError::query(format!("Create returned no row for node {uid}")))
    }

    pub async fn update_node(&self, uid: &str, data: &NodeUpdate) -> Result<Option<NodeResponse>> {
        let records = self
            .client
            .execute_write(&cypher::update_node(uid, data))
            .await?;
        match records.first() {
            Some(record) => node_column(record, "n"),
            None => Ok(None),
        }
    }

    pub async fn delete_node(&self, uid: &str) -> Result<bool> {
        let records = self.client.execute_write(&cypher::delete_node(uid)).await?;
        deleted(&records)
    }

    // ── Relationships ────────────────────────────────────────────

    /// No row comes back when either endpoint is missing.
    pub async fn create_relationship(
        &self,
        data: &RelationshipCreate,
    ) -> Result<Option<RelationshipResponse>> {
        let records = self
            .client
            .execute_write(&cypher::create_relationship(data))
            .await?;
        match records.first() {
            Some(record) => relationship_column(record, "r"),
            None => Ok(None),
        }
    }

    pub async fn update_relationship(
        &self,
        key: &RelationshipKey,
        data: &RelationshipUpdate,
    ) -> Result<Option<RelationshipResponse>> {
        let records = self
            .client
            .execute_write(&cypher::update_relationship(key, data))
            .await?;
        match records.first() {
            Some(record) => relationship_column(record, "r"),
            None => Ok(None),
        }
    }

    pub async fn delete_relationship(&self, key: &RelationshipKey) -> Result<bool> {
        let records = self
            .client
            .execute_write(&cypher::delete_relationship(key))
            .await?;
        deleted(&records)
    }
}
