//! Read operations against Neo4j.

use ecograph_core::filter::{NodeFilter, RelationshipFilter, SubgraphFilter};
use ecograph_core::types::{GraphStats, Label, NodeResponse, RelationshipResponse, SubgraphResponse};
use ecograph_core::Result;

use crate::cypher;
use crate::mapper::{
    bool_column, int_column, node_column, relationship_column, node_from_value,
    relationship_from_value,
};
use crate::repository::GraphRepository;
use crate::subgraph::SubgraphBuilder;

impl GraphRepository {
    // ── Statistics ───────────────────────────────────────────────

    pub async fn stats(&self) -> Result<GraphStats> {
        let total_nodes = self.single_count(&cypher::count_nodes()).await?;
        let total_relationships = self.single_count(&cypher::count_relationships()).await?;

        let mut label_counts = std::collections::BTreeMap::new();
        for record in self.client.execute_read(&cypher::label_counts()).await? {
            let label = record
                .get("label")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string();
            label_counts.insert(label, int_column(&record, "count")?);
        }

        Ok(GraphStats {
            total_nodes,
            total_relationships,
            label_counts,
        })
    }

    async fn single_count(&self, statement: &cypher::Statement) -> Result<i64> {
        match self.client.execute_read(statement).await?.first() {
            Some(record) => int_column(record, "count"),
            None => Ok(0),
        }
    }

    // ── Nodes ────────────────────────────────────────────────────

    pub async fn get_node(&self, uid: &str) -> Result<Option<NodeResponse>> {
        let records = self.client.execute_read(&cypher::get_node(uid)).await?;
        match records.first() {
            Some(record) => node_column(record, "n"),
            None => Ok(None),
        }
    }

    pub async fn node_exists(&self, label: &Label, name: &str) -> Result<bool> {
        let records = self
            .client
            .execute_read(&cypher::node_exists(label, name))
            .await?;
        match records.first() {
            Some(record) => bool_column(record, "found"),
            None => Ok(false),
        }
    }

    pub async fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeResponse>> {
        self.client
            .execute_read(&cypher::find_nodes(filter))
            .await?
            .iter()
            .filter_map(|record| record.get("n"))
            .map(node_from_value)
            .collect()
    }

    // ── Relationships ────────────────────────────────────────────

    pub async fn get_relationships(
        &self,
        uid: &str,
        filter: Option<&RelationshipFilter>,
    ) -> Result<Vec<RelationshipResponse>> {
        self.client
            .execute_read(&cypher::get_relationships(uid, filter))
            .await?
            .iter()
            .filter_map(|record| record.get("r"))
            .map(relationship_from_value)
            .collect()
    }

    // ── Subgraphs ────────────────────────────────────────────────

    pub async fn get_subgraph(&self, filter: &SubgraphFilter) -> Result<SubgraphResponse> {
        if filter.center_uid.is_some() {
            self.neighborhood(filter).await
        } else {
            self.filtered_subgraph(filter).await
        }
    }

    /// Rows arrive nearest-first; the center is seeded before anything else
    /// so the node cap never evicts it.
    async fn neighborhood(&self, filter: &SubgraphFilter) -> Result<SubgraphResponse> {
        let records = self
            .client
            .execute_read(&cypher::neighborhood(filter))
            .await?;

        let mut builder = SubgraphBuilder::new(filter.limit as usize);
        if let Some(center) = records
            .first()
            .map(|r| node_column(r, "center"))
            .transpose()?
            .flatten()
        {
            builder.add_node(center);
        }
        for record in &records {
            if let Some(node) = node_column(record, "node")? {
                builder.add_node(node);
            }
            if let Some(rel) = relationship_column(record, "rel")? {
                builder.add_relationship(rel);
            }
        }

        let subgraph = builder.build();
        tracing::debug!(
            center = ?filter.center_uid,
            depth = filter.depth,
            nodes = subgraph.total_nodes,
            relationships = subgraph.total_relationships,
            "Extracted neighborhood"
        );
        Ok(subgraph)
    }

    async fn filtered_subgraph(&self, filter: &SubgraphFilter) -> Result<SubgraphResponse> {
        let records = self
            .client
            .execute_read(&cypher::filtered_subgraph(filter))
            .await?;

        let mut builder = SubgraphBuilder::new(filter.limit as usize);
        for record in &records {
            if let Some(node) = node_column(record, "node")? {
                builder.add_node(node);
            }
            if let Some(rel) = relationship_column(record, "rel")? {
                builder.add_relationship(rel);
            }
        }

        let subgraph = builder.build();
        tracing::debug!(
            nodes = subgraph.total_nodes,
            relationships = subgraph.total_relationships,
            "Extracted filtered subgraph"
        );
        Ok(subgraph)
    }
}
