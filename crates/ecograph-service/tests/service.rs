//! Business-rule tests for GraphService, run against the in-process store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use ecograph_core::{
    GraphError, GraphStats, Label, NodeCreate, NodeFilter, NodeResponse, NodeUpdate, Properties,
    RelType, RelationshipCreate, RelationshipFilter, RelationshipKey, RelationshipResponse,
    RelationshipUpdate, SubgraphFilter, SubgraphResponse,
};
use ecograph_graph::{GraphStore, MemoryStore};
use ecograph_service::GraphService;

fn tech(name: &str) -> NodeCreate {
    NodeCreate::new(Label::new("Technology").unwrap(), name)
}

fn company(name: &str) -> NodeCreate {
    NodeCreate::new(Label::new("Company").unwrap(), name)
}

fn rel(a: &str, b: &str, rel_type: &str) -> RelationshipCreate {
    RelationshipCreate::new(a, b, RelType::new(rel_type).unwrap())
}

fn uids(sub: &SubgraphResponse) -> HashSet<&str> {
    sub.nodes.iter().map(|n| n.uid.as_str()).collect()
}

// ── Nodes ────────────────────────────────────────────────────────

#[tokio::test]
async fn create_node_echoes_payload_with_fresh_uid() {
    let service = GraphService::in_memory();
    let kafka = service.create_node(&tech("Apache Kafka")).await.unwrap();
    let flink = service.create_node(&tech("Apache Flink")).await.unwrap();

    assert!(!kafka.uid.is_empty());
    assert_ne!(kafka.uid, flink.uid);
    assert_eq!(kafka.label, "Technology");
    assert_eq!(kafka.name, "Apache Kafka");
    assert!(kafka.properties.is_empty());
    assert_eq!(kafka.created_at, kafka.updated_at);
}

#[tokio::test]
async fn duplicate_label_and_name_is_rejected() {
    let service = GraphService::in_memory();
    service.create_node(&tech("Apache Kafka")).await.unwrap();

    let err = service.create_node(&tech("Apache Kafka")).await.unwrap_err();
    assert!(matches!(err, GraphError::DuplicateNode(_)));
    assert_eq!(service.get_stats().await.unwrap().total_nodes, 1);

    // Same name under another label is a different node.
    service.create_node(&company("Apache Kafka")).await.unwrap();
    assert_eq!(service.get_stats().await.unwrap().total_nodes, 2);
}

#[tokio::test]
async fn missing_node_errors() {
    let service = GraphService::in_memory();
    assert!(matches!(
        service.get_node("nope").await,
        Err(GraphError::NodeNotFound(_))
    ));
    assert!(matches!(
        service.update_node("nope", &NodeUpdate::default()).await,
        Err(GraphError::NodeNotFound(_))
    ));
    assert!(matches!(
        service.delete_node("nope").await,
        Err(GraphError::NodeNotFound(_))
    ));
}

#[tokio::test]
async fn update_merges_properties() {
    let service = GraphService::in_memory();
    let node = service
        .create_node(&tech("Apache Kafka").with_property("license", "Apache-2.0"))
        .await
        .unwrap();

    let mut props = Properties::new();
    props.insert("stars".into(), json!(27000));
    let update = NodeUpdate {
        description: Some("Distributed event streaming".into()),
        properties: Some(props),
        ..Default::default()
    };
    let updated = service.update_node(&node.uid, &update).await.unwrap();

    assert_eq!(updated.name, "Apache Kafka");
    assert_eq!(updated.description.as_deref(), Some("Distributed event streaming"));
    assert_eq!(updated.properties["license"], json!("Apache-2.0"));
    assert_eq!(updated.properties["stars"], json!(27000));
    assert!(updated.updated_at >= node.updated_at);
    assert_eq!(updated.created_at, node.created_at);
}

#[tokio::test]
async fn find_nodes_filters_and_paginates() {
    let service = GraphService::in_memory();
    for name in ["Kafka Streams", "Apache Kafka", "Redpanda"] {
        service
            .create_node(&tech(name).with_source("wikidata"))
            .await
            .unwrap();
    }
    service.create_node(&company("Confluent Kafka Inc")).await.unwrap();

    let filter = NodeFilter {
        labels: Some(vec![Label::new("Technology").unwrap()]),
        name_contains: Some("kafka".into()),
        ..Default::default()
    };
    let names: Vec<String> = service
        .find_nodes(&filter)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(names, vec!["Apache Kafka", "Kafka Streams"]);

    let page = NodeFilter {
        source: Some("wikidata".into()),
        limit: 1,
        offset: 1,
        ..Default::default()
    };
    let found = service.find_nodes(&page).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Kafka Streams");
}

#[tokio::test]
async fn delete_node_removes_incident_relationships() {
    let service = GraphService::in_memory();
    let a = service.create_node(&tech("A")).await.unwrap();
    let b = service.create_node(&tech("B")).await.unwrap();
    service
        .create_relationship(&rel(&a.uid, &b.uid, "DEPENDS_ON"))
        .await
        .unwrap();

    assert!(service.delete_node(&a.uid).await.unwrap());
    assert!(service
        .get_relationships(&b.uid, None)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(service.get_stats().await.unwrap().total_relationships, 0);
}

// ── Relationships ────────────────────────────────────────────────

#[tokio::test]
async fn relationship_to_missing_target_is_rejected() {
    let service = GraphService::in_memory();
    let a = service.create_node(&tech("A")).await.unwrap();

    let err = service
        .create_relationship(&rel(&a.uid, "missing", "DEPENDS_ON"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::NodeNotFound(ref uid) if uid == "missing"));
    assert_eq!(service.get_stats().await.unwrap().total_relationships, 0);
}

#[tokio::test]
async fn relationships_report_true_direction() {
    let service = GraphService::in_memory();
    let a = service.create_node(&tech("A")).await.unwrap();
    let b = service.create_node(&tech("B")).await.unwrap();
    let c = service.create_node(&tech("C")).await.unwrap();
    service
        .create_relationship(&rel(&a.uid, &b.uid, "DEPENDS_ON").with_weight(0.2))
        .await
        .unwrap();
    service
        .create_relationship(&rel(&c.uid, &a.uid, "USED_WITH").with_weight(0.7))
        .await
        .unwrap();

    let all = service.get_relationships(&a.uid, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!((all[0].source_uid.as_str(), all[0].target_uid.as_str()), (c.uid.as_str(), a.uid.as_str()));
    assert_eq!(all[1].rel_type, "DEPENDS_ON");

    let heavy = RelationshipFilter {
        weight_min: Some(0.5),
        ..Default::default()
    };
    let only = service.get_relationships(&a.uid, Some(&heavy)).await.unwrap();
    assert_eq!(only.len(), 1);
    assert_eq!(only[0].rel_type, "USED_WITH");

    assert!(matches!(
        service.get_relationships("missing", None).await,
        Err(GraphError::NodeNotFound(_))
    ));
}

#[tokio::test]
async fn update_and_delete_relationship() {
    let service = GraphService::in_memory();
    let a = service.create_node(&tech("A")).await.unwrap();
    let b = service.create_node(&tech("B")).await.unwrap();
    let created = service
        .create_relationship(&rel(&a.uid, &b.uid, "DEPENDS_ON").with_property("since", 2019))
        .await
        .unwrap();
    let key = RelationshipKey {
        source_uid: a.uid.clone(),
        target_uid: b.uid.clone(),
        rel_type: RelType::new("DEPENDS_ON").unwrap(),
    };

    let update = RelationshipUpdate {
        weight: Some(3.5),
        ..Default::default()
    };
    let updated = service.update_relationship(&key, &update).await.unwrap();
    assert_eq!(updated.weight, 3.5);
    assert_eq!(updated.properties["since"], json!(2019));
    assert_eq!(updated.created_at, created.created_at);

    assert!(service.delete_relationship(&key).await.unwrap());
    assert!(matches!(
        service.delete_relationship(&key).await,
        Err(GraphError::RelationshipNotFound(_))
    ));
    assert!(matches!(
        service.update_relationship(&key, &update).await,
        Err(GraphError::RelationshipNotFound(_))
    ));
}

// ── Subgraphs ────────────────────────────────────────────────────

#[tokio::test]
async fn neighborhood_depth_one_is_direct_neighbors() {
    let service = GraphService::in_memory();
    let a = service.create_node(&tech("A")).await.unwrap();
    let b = service.create_node(&tech("B")).await.unwrap();
    let c = service.create_node(&tech("C")).await.unwrap();
    let d = service.create_node(&tech("D")).await.unwrap();
    service.create_relationship(&rel(&a.uid, &b.uid, "DEPENDS_ON")).await.unwrap();
    service.create_relationship(&rel(&a.uid, &c.uid, "DEPENDS_ON")).await.unwrap();
    service.create_relationship(&rel(&b.uid, &d.uid, "DEPENDS_ON")).await.unwrap();

    let sub = service
        .get_subgraph(&SubgraphFilter::around(&a.uid, 1))
        .await
        .unwrap();
    assert_eq!(
        uids(&sub),
        HashSet::from([a.uid.as_str(), b.uid.as_str(), c.uid.as_str()])
    );
    assert_eq!(sub.total_nodes, 3);
    assert_eq!(sub.total_relationships, 2);
    assert_eq!(sub.nodes[0].uid, a.uid);

    let sub = service
        .get_subgraph(&SubgraphFilter::around(&a.uid, 2))
        .await
        .unwrap();
    assert_eq!(sub.total_nodes, 4);
    assert_eq!(sub.total_relationships, 3);
}

#[tokio::test]
async fn neighborhood_paths_must_satisfy_filters() {
    // A -DEPENDS_ON-> B -DEPENDS_ON-> C
    // A -MENTIONS->   D -DEPENDS_ON-> E
    let service = GraphService::in_memory();
    let a = service.create_node(&tech("A")).await.unwrap();
    let b = service.create_node(&tech("B")).await.unwrap();
    let c = service.create_node(&tech("C")).await.unwrap();
    let d = service.create_node(&tech("D")).await.unwrap();
    let e = service.create_node(&tech("E")).await.unwrap();
    service.create_relationship(&rel(&a.uid, &b.uid, "DEPENDS_ON")).await.unwrap();
    service.create_relationship(&rel(&b.uid, &c.uid, "DEPENDS_ON")).await.unwrap();
    service.create_relationship(&rel(&a.uid, &d.uid, "MENTIONS")).await.unwrap();
    service.create_relationship(&rel(&d.uid, &e.uid, "DEPENDS_ON")).await.unwrap();

    let filter = SubgraphFilter {
        rel_filter: Some(RelationshipFilter {
            rel_types: Some(vec![RelType::new("DEPENDS_ON").unwrap()]),
            ..Default::default()
        }),
        ..SubgraphFilter::around(&a.uid, 2)
    };
    let sub = service.get_subgraph(&filter).await.unwrap();
    assert_eq!(
        uids(&sub),
        HashSet::from([a.uid.as_str(), b.uid.as_str(), c.uid.as_str()])
    );
    assert_eq!(sub.total_relationships, 2);
    assert!(sub.relationships.iter().all(|r| r.rel_type == "DEPENDS_ON"));
}

#[tokio::test]
async fn neighborhood_of_missing_center_fails() {
    let service = GraphService::in_memory();
    assert!(matches!(
        service.get_subgraph(&SubgraphFilter::around("missing", 1)).await,
        Err(GraphError::NodeNotFound(_))
    ));
}

#[tokio::test]
async fn filtered_subgraph_keeps_isolated_matches() {
    let service = GraphService::in_memory();
    let kafka = service.create_node(&tech("Apache Kafka")).await.unwrap();
    let flink = service.create_node(&tech("Apache Flink")).await.unwrap();
    let lonely = service.create_node(&tech("Apache Lonely")).await.unwrap();
    let acme = service.create_node(&company("Acme")).await.unwrap();
    service
        .create_relationship(&rel(&flink.uid, &kafka.uid, "USED_WITH"))
        .await
        .unwrap();
    service
        .create_relationship(&rel(&acme.uid, &kafka.uid, "USES"))
        .await
        .unwrap();

    let filter = SubgraphFilter {
        node_filter: Some(NodeFilter {
            name_contains: Some("apache".into()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let sub = service.get_subgraph(&filter).await.unwrap();

    assert_eq!(sub.total_nodes, 3);
    assert!(uids(&sub).contains(lonely.uid.as_str()));
    assert!(!uids(&sub).contains(acme.uid.as_str()));
    // Only the relationship with both endpoints selected survives.
    assert_eq!(sub.total_relationships, 1);
    assert_eq!(sub.relationships[0].rel_type, "USED_WITH");
}

// ── Batches and stats ────────────────────────────────────────────

#[tokio::test]
async fn batch_skips_duplicates_and_missing_endpoints() {
    let service = GraphService::in_memory();
    let nodes = service
        .create_nodes_batch(&[tech("Rust"), tech("Go"), tech("Rust"), company("Mozilla")])
        .await
        .unwrap();
    assert_eq!(nodes.len(), 3);

    let rels = service
        .create_relationships_batch(&[
            rel(&nodes[2].uid, &nodes[0].uid, "CREATED"),
            rel(&nodes[2].uid, "missing", "CREATED"),
            rel(&nodes[0].uid, &nodes[1].uid, "COMPETES_WITH"),
        ])
        .await
        .unwrap();
    assert_eq!(rels.len(), 2);

    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.total_nodes, 3);
    assert_eq!(stats.total_relationships, 2);
    assert_eq!(stats.label_counts["Technology"], 2);
    assert_eq!(stats.label_counts["Company"], 1);
    assert!(!stats.label_counts.contains_key("_Node"));
}

#[tokio::test]
async fn batch_aborts_on_other_errors() {
    let store = Arc::new(FailingStore::after(1));
    let service = GraphService::new(store);
    let err = service
        .create_nodes_batch(&[tech("Rust"), tech("Go"), tech("Zig")])
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Connection { .. }));
}

#[tokio::test]
async fn clear_all_empties_graph() {
    let service = GraphService::in_memory();
    let a = service.create_node(&tech("A")).await.unwrap();
    let b = service.create_node(&tech("B")).await.unwrap();
    service.create_relationship(&rel(&a.uid, &b.uid, "USES")).await.unwrap();

    service.clear_all().await.unwrap();
    assert_eq!(service.get_stats().await.unwrap(), GraphStats::default());
}

/// Store whose `create_node` starts failing with a connection error after
/// `ok` successful calls.
struct FailingStore {
    inner: MemoryStore,
    ok: usize,
    calls: AtomicUsize,
}

impl FailingStore {
    fn after(ok: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            ok,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GraphStore for FailingStore {
    async fn init_schema(&self) -> ecograph_core::Result<()> {
        self.inner.init_schema().await
    }

    async fn clear_all(&self) -> ecograph_core::Result<()> {
        self.inner.clear_all().await
    }

    async fn stats(&self) -> ecograph_core::Result<GraphStats> {
        self.inner.stats().await
    }

    async fn create_node(&self, data: &NodeCreate) -> ecograph_core::Result<NodeResponse> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok {
            return Err(GraphError::connection("All 3 attempts failed: connection reset"));
        }
        self.inner.create_node(data).await
    }

    async fn get_node(&self, uid: &str) -> ecograph_core::Result<Option<NodeResponse>> {
        self.inner.get_node(uid).await
    }

    async fn node_exists(&self, label: &Label, name: &str) -> ecograph_core::Result<bool> {
        self.inner.node_exists(label, name).await
    }

    async fn find_nodes(&self, filter: &NodeFilter) -> ecograph_core::Result<Vec<NodeResponse>> {
        self.inner.find_nodes(filter).await
    }

    async fn update_node(
        &self,
        uid: &str,
        data: &NodeUpdate,
    ) -> ecograph_core::Result<Option<NodeResponse>> {
        self.inner.update_node(uid, data).await
    }

    async fn delete_node(&self, uid: &str) -> ecograph_core::Result<bool> {
        self.inner.delete_node(uid).await
    }

    async fn create_relationship(
        &self,
        data: &RelationshipCreate,
    ) -> ecograph_core::Result<Option<RelationshipResponse>> {
        self.inner.create_relationship(data).await
    }

    async fn get_relationships(
        &self,
        uid: &str,
        filter: Option<&RelationshipFilter>,
    ) -> ecograph_core::Result<Vec<RelationshipResponse>> {
        self.inner.get_relationships(uid, filter).await
    }

    async fn update_relationship(
        &self,
        key: &RelationshipKey,
        data: &RelationshipUpdate,
    ) -> ecograph_core::Result<Option<RelationshipResponse>> {
        self.inner.update_relationship(key, data).await
    }

    async fn delete_relationship(&self, key: &RelationshipKey) -> ecograph_core::Result<bool> {
        self.inner.delete_relationship(key).await
    }

    async fn get_subgraph(
        &self,
        filter: &SubgraphFilter,
    ) -> ecograph_core::Result<SubgraphResponse> {
        self.inner.get_subgraph(filter).await
    }
}
