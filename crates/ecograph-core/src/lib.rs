//! ecograph-core: Shared model for the ecograph technology graph.
//!
//! This crate provides the foundational types used across all ecograph components:
//! - Create/update/response payloads for nodes and relationships
//! - Validated identifiers (labels, relationship types, property keys)
//! - Filter specifications for node, relationship and subgraph queries
//! - The error taxonomy shared by every layer

pub mod error;
pub mod filter;
pub mod types;

pub use error::{GraphError, Result};
pub use filter::{NodeFilter, RelationshipFilter, SubgraphFilter};
pub use types::{
    GraphStats, Label, NodeCreate, NodeResponse, NodeUpdate, Properties, RelType,
    RelationshipCreate, RelationshipKey, RelationshipResponse, RelationshipUpdate,
    SubgraphResponse, MARKER_LABEL,
};
