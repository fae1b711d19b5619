//! Domain payloads for the technology graph.
//!
//! Identifiers that end up as literal Cypher syntax (labels, relationship
//! types, property keys) are validated here, at the model boundary, and
//! nowhere else. Everything else travels as a bound parameter.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{GraphError, Result};

/// Internal label carried by every node alongside its domain label.
pub const MARKER_LABEL: &str = "_Node";

/// Node keys managed by the store; never part of the open property map.
pub const RESERVED_NODE_KEYS: &[&str] = &[
    "uid",
    "name",
    "description",
    "source",
    "created_at",
    "updated_at",
];

/// Relationship keys managed by the store.
pub const RESERVED_RELATIONSHIP_KEYS: &[&str] = &["weight", "source", "created_at", "updated_at"];

const MAX_IDENT_LEN: usize = 100;
const MAX_NAME_LEN: usize = 500;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_SOURCE_LEN: usize = 200;

/// Open key/value properties attached to nodes and relationships.
pub type Properties = serde_json::Map<String, Value>;

/// Generate a fresh node uid.
pub fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

// ── Identifiers ──────────────────────────────────────────────────

/// Domain label of a node, e.g. `Technology`.
///
/// PascalCase-ish: an ASCII uppercase letter followed by letters, digits or
/// underscores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(String);

impl Label {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let mut chars = value.chars();
        let valid = value.len() <= MAX_IDENT_LEN
            && chars.next().is_some_and(|c| c.is_ascii_uppercase())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(GraphError::Validation(format!(
                "Label must start with an uppercase letter and contain only letters, digits or '_', got '{value}'"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Relationship type in UPPER_SNAKE_CASE, e.g. `DEPENDS_ON`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelType(String);

impl RelType {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let mut chars = value.chars();
        let valid = value.len() <= MAX_IDENT_LEN
            && chars.next().is_some_and(|c| c.is_ascii_uppercase())
            && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(GraphError::Validation(format!(
                "Relationship type must be UPPER_SNAKE_CASE without spaces, got '{value}'"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! ident_conversions {
    ($ty:ident) => {
        impl TryFrom<String> for $ty {
            type Error = GraphError;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl FromStr for $ty {
            type Err = GraphError;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

ident_conversions!(Label);
ident_conversions!(RelType);

/// Check a property key against the safe-identifier pattern `[A-Za-z][A-Za-z0-9_]*`.
pub fn validate_property_key(key: &str) -> Result<()> {
    let mut chars = key.chars();
    let valid = key.len() <= MAX_IDENT_LEN
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(GraphError::Validation(format!(
            "Property key must match [A-Za-z][A-Za-z0-9_]*, got '{key}'"
        )))
    }
}

/// Validate an open property map: safe keys, no reserved keys, storable values.
pub fn validate_properties(props: &Properties, reserved: &[&str]) -> Result<()> {
    for (key, value) in props {
        validate_property_key(key)?;
        if reserved.contains(&key.as_str()) {
            return Err(GraphError::Validation(format!(
                "Property key '{key}' is reserved"
            )));
        }
        if !is_storable(value) {
            return Err(GraphError::Validation(format!(
                "Property '{key}' must be a scalar or a list of scalars"
            )));
        }
    }
    Ok(())
}

/// Scalars, or lists whose items are all non-null scalars of one kind.
fn is_storable(value: &Value) -> bool {
    fn kind(v: &Value) -> Option<u8> {
        match v {
            Value::Bool(_) => Some(0),
            Value::Number(_) => Some(1),
            Value::String(_) => Some(2),
            _ => None,
        }
    }
    match value {
        Value::Object(_) => false,
        Value::Array(items) => {
            let first = items.first().and_then(kind);
            items.iter().all(|v| kind(v).is_some() && kind(v) == first)
        }
        _ => true,
    }
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(GraphError::Validation(format!(
            "{field} must be between {min} and {max} characters, got {len}"
        )));
    }
    Ok(())
}

fn check_opt_len(field: &str, value: &Option<String>, max: usize) -> Result<()> {
    match value {
        Some(v) => check_len(field, v, 0, max),
        None => Ok(()),
    }
}

fn check_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(GraphError::Validation(format!(
            "Relationship weight must be a non-negative number, got {weight}"
        )));
    }
    Ok(())
}

// ── Nodes ────────────────────────────────────────────────────────

/// Payload for creating a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeCreate {
    pub label: Label,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub source: Option<String>,
}

impl NodeCreate {
    pub fn new(label: Label, name: impl Into<String>) -> Self {
        Self {
            label,
            name: name.into(),
            description: None,
            properties: Properties::new(),
            source: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_len("Node name", &self.name, 1, MAX_NAME_LEN)?;
        check_opt_len("Node description", &self.description, MAX_DESCRIPTION_LEN)?;
        check_opt_len("Node source", &self.source, MAX_SOURCE_LEN)?;
        validate_properties(&self.properties, RESERVED_NODE_KEYS)
    }
}

/// Partial update of a node. Scalars are replaced, `properties` is merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Option<Properties>,
    #[serde(default)]
    pub source: Option<String>,
}

impl NodeUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            check_len("Node name", name, 1, MAX_NAME_LEN)?;
        }
        check_opt_len("Node description", &self.description, MAX_DESCRIPTION_LEN)?;
        check_opt_len("Node source", &self.source, MAX_SOURCE_LEN)?;
        match &self.properties {
            Some(props) => validate_properties(props, RESERVED_NODE_KEYS),
            None => Ok(()),
        }
    }
}

/// A node as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeResponse {
    pub uid: String,
    pub label: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Relationships ────────────────────────────────────────────────

fn default_weight() -> f64 {
    1.0
}

/// Payload for creating a directed relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipCreate {
    pub source_uid: String,
    pub target_uid: String,
    pub rel_type: RelType,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub source: Option<String>,
}

impl RelationshipCreate {
    pub fn new(
        source_uid: impl Into<String>,
        target_uid: impl Into<String>,
        rel_type: RelType,
    ) -> Self {
        Self {
            source_uid: source_uid.into(),
            target_uid: target_uid.into(),
            rel_type,
            weight: default_weight(),
            properties: Properties::new(),
            source: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> RelationshipKey {
        RelationshipKey {
            source_uid: self.source_uid.clone(),
            target_uid: self.target_uid.clone(),
            rel_type: self.rel_type.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_uid.is_empty() || self.target_uid.is_empty() {
            return Err(GraphError::Validation(
                "Relationship endpoints must be non-empty uids".to_string(),
            ));
        }
        check_weight(self.weight)?;
        check_opt_len("Relationship source", &self.source, MAX_SOURCE_LEN)?;
        validate_properties(&self.properties, RESERVED_RELATIONSHIP_KEYS)
    }
}

/// Partial update of a relationship.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelationshipUpdate {
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub properties: Option<Properties>,
    #[serde(default)]
    pub source: Option<String>,
}

impl RelationshipUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(weight) = self.weight {
            check_weight(weight)?;
        }
        check_opt_len("Relationship source", &self.source, MAX_SOURCE_LEN)?;
        match &self.properties {
            Some(props) => validate_properties(props, RESERVED_RELATIONSHIP_KEYS),
            None => Ok(()),
        }
    }
}

/// Identity of a relationship: (source, target, type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub source_uid: String,
    pub target_uid: String,
    pub rel_type: RelType,
}

impl fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -[{}]-> {}",
            self.source_uid, self.rel_type, self.target_uid
        )
    }
}

/// A relationship as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipResponse {
    pub source_uid: String,
    pub target_uid: String,
    pub rel_type: String,
    pub weight: f64,
    #[serde(default)]
    pub properties: Properties,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelationshipResponse {
    /// The (source, target, type) triple used for deduplication.
    pub fn identity(&self) -> (String, String, String) {
        (
            self.source_uid.clone(),
            self.target_uid.clone(),
            self.rel_type.clone(),
        )
    }
}

// ── Aggregates ───────────────────────────────────────────────────

/// Result of a neighborhood or filtered-subgraph extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubgraphResponse {
    pub nodes: Vec<NodeResponse>,
    pub relationships: Vec<RelationshipResponse>,
    pub total_nodes: usize,
    pub total_relationships: usize,
}

impl SubgraphResponse {
    pub fn new(nodes: Vec<NodeResponse>, relationships: Vec<RelationshipResponse>) -> Self {
        Self {
            total_nodes: nodes.len(),
            total_relationships: relationships.len(),
            nodes,
            relationships,
        }
    }
}

/// Aggregate counts over the whole graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphStats {
    pub total_nodes: i64,
    pub total_relationships: i64,
    pub label_counts: BTreeMap<String, i64>,
}
