//! Cypher statement builder.
//!
//! Filters are first lowered into a list of predicate clauses plus parameter
//! bindings ([`Conditions`]); text is rendered last. Values are never
//! spliced into query text. The only literal identifiers are labels,
//! relationship types and property keys, which are validated at the model
//! boundary and backtick-quoted again here.

use std::collections::BTreeMap;

use serde_json::Value;

use ecograph_core::filter::{NodeFilter, RelationshipFilter, SubgraphFilter};
use ecograph_core::types::{
    Label, NodeCreate, NodeUpdate, RelType, RelationshipCreate, RelationshipKey,
    RelationshipUpdate, MARKER_LABEL,
};

/// Query text plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    text: String,
    params: BTreeMap<String, Value>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    fn with_params(mut self, params: BTreeMap<String, Value>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// Convert into a driver query, binding every parameter.
    pub fn to_query(&self) -> neo4rs::Query {
        self.params
            .iter()
            .fold(neo4rs::query(&self.text), |q, (key, value)| {
                q.param(key, to_bolt(value))
            })
    }
}

fn to_bolt(value: &Value) -> neo4rs::BoltType {
    use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType};
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(entries) => {
            let mut map = BoltMap::new();
            for (key, item) in entries {
                map.put(BoltString::from(key.as_str()), to_bolt(item));
            }
            BoltType::Map(map)
        }
    }
}

// ── Identifiers and projections ──────────────────────────────────

/// Backtick-quote an identifier.
pub fn ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn label_ident(label: &Label) -> String {
    ident(label.as_str())
}

/// `:A|B` alternation for a relationship pattern; empty when unrestricted.
fn type_alternation(types: &[RelType]) -> String {
    if types.is_empty() {
        return String::new();
    }
    let alts: Vec<String> = types.iter().map(|t| ident(t.as_str())).collect();
    format!(":{}", alts.join("|"))
}

/// Node map projection: all stored properties, temporal values as ISO
/// strings, plus the label list under `_labels`.
pub fn node_projection(alias: &str) -> String {
    format!(
        "{alias} {{.*, created_at: toString({alias}.created_at), \
         updated_at: toString({alias}.updated_at), _labels: labels({alias})}}"
    )
}

/// Relationship map projection with type and true direction.
pub fn rel_projection(alias: &str) -> String {
    format!(
        "{alias} {{.*, created_at: toString({alias}.created_at), \
         updated_at: toString({alias}.updated_at), _rel_type: type({alias}), \
         _source_uid: startNode({alias}).uid, _target_uid: endNode({alias}).uid}}"
    )
}

// ── Predicate IR ─────────────────────────────────────────────────

/// Predicate clauses over one alias, with their parameter bindings.
#[derive(Debug, Default)]
pub struct Conditions {
    clauses: Vec<String>,
    params: BTreeMap<String, Value>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    fn bind(&mut self, name: String, value: impl Into<Value>) -> String {
        self.params.insert(name.clone(), value.into());
        format!("${name}")
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Add node predicates for `alias`. Parameter names are prefixed with
    /// `prefix` so node and relationship predicates can share a statement.
    pub fn node(mut self, alias: &str, filter: &NodeFilter, prefix: &str) -> Self {
        if let Some(labels) = filter.labels.as_ref().filter(|l| !l.is_empty()) {
            let alts: Vec<String> = labels
                .iter()
                .map(|l| format!("{alias}:{}", label_ident(l)))
                .collect();
            self.push(format!("({})", alts.join(" OR ")));
        }
        if let Some(needle) = filter.name_contains.as_ref().filter(|n| !n.is_empty()) {
            let p = self.bind(format!("{prefix}name_contains"), needle.as_str());
            self.push(format!("toLower({alias}.name) CONTAINS toLower({p})"));
        }
        if let Some(props) = &filter.properties_match {
            for (i, (key, value)) in props.iter().enumerate() {
                let p = self.bind(format!("{prefix}prop_{i}"), value.clone());
                self.push(format!("{alias}.{} = {p}", ident(key)));
            }
        }
        if let Some(source) = &filter.source {
            let p = self.bind(format!("{prefix}source"), source.as_str());
            self.push(format!("{alias}.source = {p}"));
        }
        if let Some(after) = filter.created_after {
            let p = self.bind(format!("{prefix}created_after"), after.to_rfc3339());
            self.push(format!("{alias}.created_at >= datetime({p})"));
        }
        if let Some(before) = filter.created_before {
            let p = self.bind(format!("{prefix}created_before"), before.to_rfc3339());
            self.push(format!("{alias}.created_at <= datetime({p})"));
        }
        self
    }

    /// Add relationship post-match predicates (weight bounds, source) for
    /// `alias`. Type membership belongs in the pattern, see [`type_alternation`].
    pub fn relationship(mut self, alias: &str, filter: &RelationshipFilter, prefix: &str) -> Self {
        if let Some(min) = filter.weight_min {
            let p = self.bind(format!("{prefix}weight_min"), min);
            self.push(format!("{alias}.weight >= {p}"));
        }
        if let Some(max) = filter.weight_max {
            let p = self.bind(format!("{prefix}weight_max"), max);
            self.push(format!("{alias}.weight <= {p}"));
        }
        if let Some(source) = &filter.source {
            let p = self.bind(format!("{prefix}source"), source.as_str());
            self.push(format!("{alias}.source = {p}"));
        }
        self
    }

    /// Add a raw clause with no parameters.
    pub fn clause(mut self, clause: impl Into<String>) -> Self {
        self.push(clause.into());
        self
    }

    /// `a AND b AND c`, or `None` when empty.
    pub fn conjunction(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(self.clauses.join(" AND "))
        }
    }

    /// `WHERE ...` or an empty string.
    pub fn where_clause(&self) -> String {
        self.conjunction()
            .map(|c| format!("WHERE {c}"))
            .unwrap_or_default()
    }

    pub fn into_params(self) -> BTreeMap<String, Value> {
        self.params
    }
}

// ── Schema and maintenance ───────────────────────────────────────

/// Idempotent constraint and index declarations.
pub fn schema() -> Vec<Statement> {
    vec![
        Statement::new(format!(
            "CREATE CONSTRAINT node_uid_unique IF NOT EXISTS \
             FOR (n:{MARKER_LABEL}) REQUIRE n.uid IS UNIQUE"
        )),
        Statement::new(format!(
            "CREATE INDEX node_name_index IF NOT EXISTS FOR (n:{MARKER_LABEL}) ON (n.name)"
        )),
        Statement::new(format!(
            "CREATE INDEX node_source_index IF NOT EXISTS FOR (n:{MARKER_LABEL}) ON (n.source)"
        )),
    ]
}

pub fn clear_all() -> Statement {
    Statement::new("MATCH (n) DETACH DELETE n")
}

pub fn count_nodes() -> Statement {
    Statement::new(format!("MATCH (n:{MARKER_LABEL}) RETURN count(n) AS count"))
}

/// Each directed relationship is counted once.
pub fn count_relationships() -> Statement {
    Statement::new(format!(
        "MATCH (:{MARKER_LABEL})-[r]->(:{MARKER_LABEL}) RETURN count(r) AS count"
    ))
}

pub fn label_counts() -> Statement {
    Statement::new(format!(
        "MATCH (n:{MARKER_LABEL})
         UNWIND labels(n) AS label
         WITH label WHERE label <> $marker
         RETURN label, count(*) AS count
         ORDER BY count DESC"
    ))
    .param("marker", MARKER_LABEL)
}

// ── Nodes ────────────────────────────────────────────────────────

pub fn create_node(uid: &str, data: &NodeCreate) -> Statement {
    Statement::new(format!(
        "CREATE (n:{MARKER_LABEL}:{label} {{
           uid: $uid, name: $name, description: $description, source: $source,
           created_at: datetime(), updated_at: datetime()
         }})
         SET n += $properties
         RETURN {projection} AS n",
        label = label_ident(&data.label),
        projection = node_projection("n"),
    ))
    .param("uid", uid)
    .param("name", data.name.as_str())
    .param("description", data.description.clone())
    .param("source", data.source.clone())
    .param("properties", Value::Object(data.properties.clone()))
}

pub fn get_node(uid: &str) -> Statement {
    Statement::new(format!(
        "MATCH (n:{MARKER_LABEL} {{uid: $uid}}) RETURN {} AS n",
        node_projection("n")
    ))
    .param("uid", uid)
}

pub fn node_exists(label: &Label, name: &str) -> Statement {
    Statement::new(format!(
        "MATCH (n:{MARKER_LABEL}:{} {{name: $name}}) RETURN count(n) > 0 AS found",
        label_ident(label)
    ))
    .param("name", name)
}

pub fn find_nodes(filter: &NodeFilter) -> Statement {
    let conditions = Conditions::new().node("n", filter, "");
    let text = format!(
        "MATCH (n:{MARKER_LABEL})
         {where_clause}
         RETURN {projection} AS n
         ORDER BY n.name
         SKIP $offset LIMIT $limit",
        where_clause = conditions.where_clause(),
        projection = node_projection("n"),
    );
    Statement::new(text)
        .with_params(conditions.into_params())
        .param("offset", filter.offset)
        .param("limit", filter.limit)
}

/// Scalars are replaced; `properties` is merged with `+=`.
pub fn update_node(uid: &str, data: &NodeUpdate) -> Statement {
    let mut sets = vec!["n.updated_at = datetime()".to_string()];
    let mut stmt = Statement::new(String::new()).param("uid", uid);

    if let Some(name) = &data.name {
        sets.push("n.name = $name".into());
        stmt = stmt.param("name", name.as_str());
    }
    if let Some(description) = &data.description {
        sets.push("n.description = $description".into());
        stmt = stmt.param("description", description.as_str());
    }
    if let Some(source) = &data.source {
        sets.push("n.source = $source".into());
        stmt = stmt.param("source", source.as_str());
    }
    if let Some(props) = &data.properties {
        sets.push("n += $properties".into());
        stmt = stmt.param("properties", Value::Object(props.clone()));
    }

    stmt.text = format!(
        "MATCH (n:{MARKER_LABEL} {{uid: $uid}})
         SET {}
         RETURN {} AS n",
        sets.join(", "),
        node_projection("n")
    );
    stmt
}

/// Detaching delete: incident relationships go in the same statement.
pub fn delete_node(uid: &str) -> Statement {
    Statement::new(format!(
        "MATCH (n:{MARKER_LABEL} {{uid: $uid}})
         DETACH DELETE n
         RETURN count(n) AS deleted"
    ))
    .param("uid", uid)
}

// ── Relationships ────────────────────────────────────────────────

pub fn create_relationship(data: &RelationshipCreate) -> Statement {
    Statement::new(format!(
        "MATCH (a:{MARKER_LABEL} {{uid: $source_uid}})
         MATCH (b:{MARKER_LABEL} {{uid: $target_uid}})
         CREATE (a)-[r:{rel_type} {{
           weight: $weight, source: $source,
           created_at: datetime(), updated_at: datetime()
         }}]->(b)
         SET r += $properties
         RETURN {projection} AS r",
        rel_type = ident(data.rel_type.as_str()),
        projection = rel_projection("r"),
    ))
    .param("source_uid", data.source_uid.as_str())
    .param("target_uid", data.target_uid.as_str())
    .param("weight", data.weight)
    .param("source", data.source.clone())
    .param("properties", Value::Object(data.properties.clone()))
}

/// Relationships incident to `uid` in either direction, heaviest first.
pub fn get_relationships(uid: &str, filter: Option<&RelationshipFilter>) -> Statement {
    let default = RelationshipFilter::default();
    let filter = filter.unwrap_or(&default);
    let conditions = Conditions::new().relationship("r", filter, "rel_");
    let text = format!(
        "MATCH (a:{MARKER_LABEL} {{uid: $uid}})-[r{types}]-(:{MARKER_LABEL})
         {where_clause}
         RETURN {projection} AS r
         ORDER BY r.weight DESC
         SKIP $offset LIMIT $limit",
        types = type_alternation(filter.types()),
        where_clause = conditions.where_clause(),
        projection = rel_projection("r"),
    );
    Statement::new(text)
        .with_params(conditions.into_params())
        .param("uid", uid)
        .param("offset", filter.offset)
        .param("limit", filter.limit)
}

fn match_relationship(key: &RelationshipKey) -> String {
    format!(
        "MATCH (:{MARKER_LABEL} {{uid: $source_uid}})-[r:{}]->(:{MARKER_LABEL} {{uid: $target_uid}})",
        ident(key.rel_type.as_str())
    )
}

pub fn update_relationship(key: &RelationshipKey, data: &RelationshipUpdate) -> Statement {
    let mut sets = vec!["r.updated_at = datetime()".to_string()];
    let mut stmt = Statement::new(String::new())
        .param("source_uid", key.source_uid.as_str())
        .param("target_uid", key.target_uid.as_str());

    if let Some(weight) = data.weight {
        sets.push("r.weight = $weight".into());
        stmt = stmt.param("weight", weight);
    }
    if let Some(source) = &data.source {
        sets.push("r.source = $source".into());
        stmt = stmt.param("source", source.as_str());
    }
    if let Some(props) = &data.properties {
        sets.push("r += $properties".into());
        stmt = stmt.param("properties", Value::Object(props.clone()));
    }

    stmt.text = format!(
        "{}
         SET {}
         RETURN {} AS r",
        match_relationship(key),
        sets.join(", "),
        rel_projection("r")
    );
    stmt
}

pub fn delete_relationship(key: &RelationshipKey) -> Statement {
    Statement::new(format!(
        "{}
         DELETE r
         RETURN count(r) AS deleted",
        match_relationship(key)
    ))
    .param("source_uid", key.source_uid.as_str())
    .param("target_uid", key.target_uid.as_str())
}

// ── Subgraphs ────────────────────────────────────────────────────

/// Path-first extraction around `center_uid`.
///
/// Every node after the center and every relationship on a path must satisfy
/// the filters. Reached nodes are ranked by hop distance (then name) and cut
/// to `limit - 1` on the server, so the result never grows with the size of
/// the neighborhood. A relationship between two kept nodes is returned when
/// it passes the relationship filter and starts within `depth - 1` hops,
/// i.e. it lies on some qualifying path. One row per (kept node,
/// relationship), center first. Columns: `center`, `node`, `rel` (null when
/// the node has no qualifying relationship).
pub fn neighborhood(filter: &SubgraphFilter) -> Statement {
    let center_uid = filter.center_uid.as_deref().unwrap_or_default();
    let types = filter
        .rel_filter
        .as_ref()
        .map(|rf| type_alternation(rf.types()))
        .unwrap_or_default();

    let node_conditions = match &filter.node_filter {
        Some(nf) => Conditions::new().node("x", nf, "node_"),
        None => Conditions::new(),
    };
    let (path_rel_conditions, edge_conditions) = match &filter.rel_filter {
        Some(rf) => (
            Conditions::new().relationship("y", rf, "rel_"),
            Conditions::new().relationship("r", rf, "rel_"),
        ),
        None => (Conditions::new(), Conditions::new()),
    };

    let mut path_conditions = Conditions::new().clause("m <> center");
    if let Some(c) = node_conditions.conjunction() {
        path_conditions = path_conditions.clause(format!("ALL(x IN nodes(path)[1..] WHERE {c})"));
    }
    if let Some(c) = path_rel_conditions.conjunction() {
        path_conditions = path_conditions.clause(format!("ALL(y IN relationships(path) WHERE {c})"));
    }

    let mut edge_where = Conditions::new()
        .clause("a.hops < $depth")
        .clause("b IN [k IN members | k.node]");
    if let Some(c) = edge_conditions.conjunction() {
        edge_where = edge_where.clause(c);
    }

    let text = format!(
        "MATCH (center:{MARKER_LABEL} {{uid: $center_uid}})
         OPTIONAL MATCH path = (center)-[{types}*1..{depth}]-(m:{MARKER_LABEL})
         {path_where}
         WITH center, m, min(length(path)) AS hops
         ORDER BY hops, m.name, m.uid
         WITH center, [k IN collect({{node: m, hops: hops}}) WHERE k.node IS NOT NULL][..$neighbor_limit] AS kept
         WITH center, [{{node: center, hops: 0}}] + kept AS members
         UNWIND range(0, size(members) - 1) AS i
         WITH center, members, i, members[i] AS a
         WITH center, members, i, a, a.node AS an
         OPTIONAL MATCH (an)-[r{types}]-(b:{MARKER_LABEL})
         {edge_where}
         RETURN {center_projection} AS center, {node_projection} AS node, {rel_projection} AS rel
         ORDER BY i",
        depth = filter.depth,
        path_where = path_conditions.where_clause(),
        edge_where = edge_where.where_clause(),
        center_projection = node_projection("center"),
        node_projection = node_projection("an"),
        rel_projection = rel_projection("r"),
    );

    Statement::new(text)
        .with_params(node_conditions.into_params())
        .with_params(path_rel_conditions.into_params())
        .param("center_uid", center_uid)
        .param("depth", filter.depth)
        .param("neighbor_limit", filter.limit.saturating_sub(1))
}

/// Node-first extraction: select matching nodes (by name, capped at
/// `limit`), then optionally expand each to qualifying relationships whose
/// other endpoint is also selected. Columns: `node`, `rel` (null when the
/// node has no qualifying relationship).
pub fn filtered_subgraph(filter: &SubgraphFilter) -> Statement {
    let node_conditions = match &filter.node_filter {
        Some(nf) => Conditions::new().node("n", nf, "node_"),
        None => Conditions::new(),
    };
    let (types, rel_conditions) = match &filter.rel_filter {
        Some(rf) => (
            type_alternation(rf.types()),
            Conditions::new().relationship("r", rf, "rel_"),
        ),
        None => (String::new(), Conditions::new()),
    };
    let expansion = rel_conditions.clause("m IN selected");

    let text = format!(
        "MATCH (n:{MARKER_LABEL})
         {node_where}
         WITH n ORDER BY n.name LIMIT $limit
         WITH collect(n) AS selected
         UNWIND selected AS n
         OPTIONAL MATCH (n)-[r{types}]-(m:{MARKER_LABEL})
         {expansion_where}
         RETURN {node_projection} AS node, {rel_projection} AS rel",
        node_where = node_conditions.where_clause(),
        expansion_where = expansion.where_clause(),
        node_projection = node_projection("n"),
        rel_projection = rel_projection("r"),
    );

    Statement::new(text)
        .with_params(node_conditions.into_params())
        .with_params(expansion.into_params())
        .param("limit", filter.limit)
}
