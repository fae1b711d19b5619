//! Record-to-model conversion.
//!
//! Statements project nodes and relationships as maps (see
//! [`crate::cypher::node_projection`]); this module turns those maps back
//! into response types, splitting managed fields from the open property map.

use chrono::{DateTime, Utc};
use serde_json::Value;

use ecograph_core::types::{
    NodeResponse, Properties, RelationshipResponse, MARKER_LABEL, RESERVED_NODE_KEYS,
    RESERVED_RELATIONSHIP_KEYS,
};
use ecograph_core::{GraphError, Result};

use crate::client::Record;

/// Domain label reported when a node carries only the marker label.
pub const UNKNOWN_LABEL: &str = "Unknown";

const LABELS_KEY: &str = "_labels";
const REL_TYPE_KEY: &str = "_rel_type";
const SOURCE_UID_KEY: &str = "_source_uid";
const TARGET_UID_KEY: &str = "_target_uid";

fn decode_error(what: &str, detail: impl std::fmt::Display) -> GraphError {
    GraphError::query(format!("Unexpected {what} record: {detail}"))
}

fn as_object<'a>(what: &str, value: &'a Value) -> Result<&'a Properties> {
    value
        .as_object()
        .ok_or_else(|| decode_error(what, format!("expected a map, got {value}")))
}

fn required_str(what: &str, map: &Properties, key: &str) -> Result<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| decode_error(what, format!("missing string field '{key}'")))
}

fn optional_str(map: &Properties, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required_time(what: &str, map: &Properties, key: &str) -> Result<DateTime<Utc>> {
    let raw = map
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| decode_error(what, format!("missing timestamp '{key}'")))?;
    parse_timestamp(raw).ok_or_else(|| decode_error(what, format!("bad timestamp '{raw}'")))
}

/// Parse the ISO-8601 rendering of a store datetime. A trailing named zone
/// (`...+01:00[Europe/Paris]`) is dropped; the offset already fixes the instant.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.split('[').next().unwrap_or(raw);
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// First label that is not the marker, or [`UNKNOWN_LABEL`].
pub fn domain_label(labels: &[Value]) -> String {
    labels
        .iter()
        .filter_map(Value::as_str)
        .find(|l| *l != MARKER_LABEL)
        .unwrap_or(UNKNOWN_LABEL)
        .to_string()
}

fn open_properties(map: &Properties, reserved: &[&str]) -> Properties {
    map.iter()
        .filter(|(k, _)| !reserved.contains(&k.as_str()) && !k.starts_with('_'))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub fn node_from_value(value: &Value) -> Result<NodeResponse> {
    let map = as_object("node", value)?;
    let labels = map
        .get(LABELS_KEY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    Ok(NodeResponse {
        uid: required_str("node", map, "uid")?,
        label: domain_label(labels),
        name: required_str("node", map, "name")?,
        description: optional_str(map, "description"),
        properties: open_properties(map, RESERVED_NODE_KEYS),
        source: optional_str(map, "source"),
        created_at: required_time("node", map, "created_at")?,
        updated_at: required_time("node", map, "updated_at")?,
    })
}

pub fn relationship_from_value(value: &Value) -> Result<RelationshipResponse> {
    let map = as_object("relationship", value)?;
    Ok(RelationshipResponse {
        source_uid: required_str("relationship", map, SOURCE_UID_KEY)?,
        target_uid: required_str("relationship", map, TARGET_UID_KEY)?,
        rel_type: required_str("relationship", map, REL_TYPE_KEY)?,
        weight: map.get("weight").and_then(Value::as_f64).unwrap_or(1.0),
        properties: open_properties(map, RESERVED_RELATIONSHIP_KEYS),
        source: optional_str(map, "source"),
        created_at: required_time("relationship", map, "created_at")?,
        updated_at: required_time("relationship", map, "updated_at")?,
    })
}

/// Node in `column`, or `None` when the column is null or absent.
pub fn node_column(record: &Record, column: &str) -> Result<Option<NodeResponse>> {
    match record.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => node_from_value(value).map(Some),
    }
}

pub fn relationship_column(record: &Record, column: &str) -> Result<Option<RelationshipResponse>> {
    match record.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => relationship_from_value(value).map(Some),
    }
}

pub fn int_column(record: &Record, column: &str) -> Result<i64> {
    record
        .get(column)
        .and_then(Value::as_i64)
        .ok_or_else(|| decode_error("count", format!("missing integer column '{column}'")))
}

pub fn bool_column(record: &Record, column: &str) -> Result<bool> {
    record
        .get(column)
        .and_then(Value::as_bool)
        .ok_or_else(|| decode_error("flag", format!("missing boolean column '{column}'")))
}
