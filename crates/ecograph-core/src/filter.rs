//! Sparse, optional filter specifications.
//!
//! Every field is optional; an absent field places no constraint. The same
//! predicates are rendered to Cypher by the graph crate and evaluated in
//! process by [`NodeFilter::matches`] / [`RelationshipFilter::matches`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::types::{
    validate_property_key, Label, NodeResponse, Properties, RelType, RelationshipResponse,
};

pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 10_000;
pub const MIN_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 10;

fn default_limit() -> u32 {
    100
}

fn default_depth() -> u32 {
    1
}

/// Cypher equality: numbers compare by value regardless of integer/float
/// representation, and null equals nothing.
fn property_equals(stored: Option<&Value>, wanted: &Value) -> bool {
    match (stored, wanted) {
        (None | Some(Value::Null), _) | (_, Value::Null) => false,
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(Value::Array(a)), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| property_equals(Some(x), y))
        }
        (Some(a), b) => a == b,
    }
}

fn check_limit(what: &str, limit: u32) -> Result<()> {
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(GraphError::InvalidFilter(format!(
            "{what} limit must be between {MIN_LIMIT} and {MAX_LIMIT}, got {limit}"
        )));
    }
    Ok(())
}

/// Node selection criteria.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeFilter {
    /// Match any of these labels.
    #[serde(default)]
    pub labels: Option<Vec<Label>>,
    /// Case-insensitive substring of the node name.
    #[serde(default)]
    pub name_contains: Option<String>,
    /// Exact match on each listed property.
    #[serde(default)]
    pub properties_match: Option<Properties>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for NodeFilter {
    fn default() -> Self {
        Self {
            labels: None,
            name_contains: None,
            properties_match: None,
            source: None,
            created_after: None,
            created_before: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl NodeFilter {
    pub fn validate(&self) -> Result<()> {
        check_limit("Node filter", self.limit)?;
        if let Some(props) = &self.properties_match {
            for key in props.keys() {
                validate_property_key(key)
                    .map_err(|e| GraphError::InvalidFilter(e.to_string()))?;
            }
        }
        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(GraphError::InvalidFilter(format!(
                    "created_after ({after}) is later than created_before ({before})"
                )));
            }
        }
        Ok(())
    }

    /// Whether any predicate (as opposed to pagination) is set.
    pub fn has_predicates(&self) -> bool {
        self.labels.as_ref().is_some_and(|l| !l.is_empty())
            || self.name_contains.as_ref().is_some_and(|n| !n.is_empty())
            || self.properties_match.as_ref().is_some_and(|p| !p.is_empty())
            || self.source.is_some()
            || self.created_after.is_some()
            || self.created_before.is_some()
    }

    /// Evaluate the predicates against a node. Pagination is ignored.
    pub fn matches(&self, node: &NodeResponse) -> bool {
        if let Some(labels) = self.labels.as_ref().filter(|l| !l.is_empty()) {
            if !labels.iter().any(|l| l.as_str() == node.label) {
                return false;
            }
        }
        if let Some(needle) = self.name_contains.as_ref().filter(|n| !n.is_empty()) {
            if !node.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(props) = &self.properties_match {
            if !props.iter().all(|(k, v)| property_equals(node.properties.get(k), v)) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if node.source.as_ref() != Some(source) {
                return false;
            }
        }
        if self.created_after.is_some_and(|t| node.created_at < t) {
            return false;
        }
        if self.created_before.is_some_and(|t| node.created_at > t) {
            return false;
        }
        true
    }
}

/// Relationship selection criteria.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipFilter {
    /// Match any of these relationship types.
    #[serde(default)]
    pub rel_types: Option<Vec<RelType>>,
    #[serde(default)]
    pub weight_min: Option<f64>,
    #[serde(default)]
    pub weight_max: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for RelationshipFilter {
    fn default() -> Self {
        Self {
            rel_types: None,
            weight_min: None,
            weight_max: None,
            source: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl RelationshipFilter {
    pub fn validate(&self) -> Result<()> {
        check_limit("Relationship filter", self.limit)?;
        for (name, bound) in [("weight_min", self.weight_min), ("weight_max", self.weight_max)] {
            if let Some(w) = bound {
                if !w.is_finite() || w < 0.0 {
                    return Err(GraphError::InvalidFilter(format!(
                        "{name} must be a non-negative number, got {w}"
                    )));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.weight_min, self.weight_max) {
            if min > max {
                return Err(GraphError::InvalidFilter(format!(
                    "weight_min ({min}) is greater than weight_max ({max})"
                )));
            }
        }
        Ok(())
    }

    /// The relationship types to traverse, if restricted.
    pub fn types(&self) -> &[RelType] {
        self.rel_types.as_deref().unwrap_or(&[])
    }

    /// Evaluate the predicates against a relationship. Pagination is ignored.
    pub fn matches(&self, rel: &RelationshipResponse) -> bool {
        let types = self.types();
        if !types.is_empty() && !types.iter().any(|t| t.as_str() == rel.rel_type) {
            return false;
        }
        if self.weight_min.is_some_and(|w| rel.weight < w) {
            return false;
        }
        if self.weight_max.is_some_and(|w| rel.weight > w) {
            return false;
        }
        if let Some(source) = &self.source {
            if rel.source.as_ref() != Some(source) {
                return false;
            }
        }
        true
    }
}

/// Subgraph extraction request.
///
/// With `center_uid` set this is a neighborhood extraction bounded by
/// `depth`; otherwise a node-first filtered subgraph. The nested filters'
/// own pagination is ignored in both modes; `limit` caps the node count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubgraphFilter {
    #[serde(default)]
    pub node_filter: Option<NodeFilter>,
    #[serde(default)]
    pub rel_filter: Option<RelationshipFilter>,
    #[serde(default)]
    pub center_uid: Option<String>,
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl Default for SubgraphFilter {
    fn default() -> Self {
        Self {
            node_filter: None,
            rel_filter: None,
            center_uid: None,
            depth: default_depth(),
            limit: default_limit(),
        }
    }
}

impl SubgraphFilter {
    /// Neighborhood request around `center_uid`.
    pub fn around(center_uid: impl Into<String>, depth: u32) -> Self {
        Self {
            center_uid: Some(center_uid.into()),
            depth,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&self.depth) {
            return Err(GraphError::InvalidFilter(format!(
                "depth must be between {MIN_DEPTH} and {MAX_DEPTH}, got {}",
                self.depth
            )));
        }
        check_limit("Subgraph", self.limit)?;
        if self.center_uid.as_deref() == Some("") {
            return Err(GraphError::InvalidFilter(
                "center_uid must not be empty".to_string(),
            ));
        }
        if let Some(nf) = &self.node_filter {
            nf.validate()?;
        }
        if let Some(rf) = &self.rel_filter {
            rf.validate()?;
        }
        Ok(())
    }
}
