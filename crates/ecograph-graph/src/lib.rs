//! ecograph-graph: Neo4j persistence for the technology graph.
//!
//! Every read and write goes through [`GraphClient`], which runs one scoped
//! transaction per statement and retries transient failures. Statements are
//! produced by [`cypher`] from typed filters; [`mapper`] turns projected
//! records back into responses. [`GraphStore`] is the seam the service layer
//! depends on, implemented by [`GraphRepository`] (Neo4j) and
//! [`MemoryStore`] (in process).

pub mod client;
pub mod cypher;
pub mod mapper;
pub mod memory;
mod mutations;
mod queries;
pub mod repository;
pub mod retry;
pub mod store;
pub mod subgraph;

pub use client::{ConnectionState, GraphClient, GraphConfig, Record};
pub use memory::MemoryStore;
pub use repository::GraphRepository;
pub use retry::{RetryConfig, RetryPolicy};
pub use store::GraphStore;
