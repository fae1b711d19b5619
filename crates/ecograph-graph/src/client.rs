//! Neo4j connection management and the shared graph client.

use std::sync::Arc;
use std::time::Duration;

use neo4rs::{ConfigBuilder, Graph, Row, Txn};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::timeout;

use ecograph_core::{GraphError, Result};

use crate::cypher::Statement;
use crate::retry::{RetryConfig, RetryPolicy};

/// One result row: column name to value.
pub type Record = serde_json::Map<String, Value>;

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GraphConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
    /// Upper bound on waiting for a pooled session.
    #[serde(default = "default_acquisition_timeout_secs")]
    pub acquisition_timeout_secs: u64,
    /// Time allowed for retrying one logical operation. A running attempt
    /// is never cancelled by it.
    #[serde(default = "default_max_transaction_retry_secs")]
    pub max_transaction_retry_secs: u64,
    /// Upper bound on a single connect-and-verify attempt.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Initial backoff for connect retries; queries use `retry.base_delay_ms`.
    #[serde(default = "default_connect_base_delay_ms")]
    pub connect_base_delay_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "ecograph-dev".to_string()
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> u32 {
    50
}

fn default_fetch_size() -> usize {
    256
}

fn default_acquisition_timeout_secs() -> u64 {
    60
}

fn default_max_transaction_retry_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_connect_base_delay_ms() -> u64 {
    2_000
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            database: default_database(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
            acquisition_timeout_secs: default_acquisition_timeout_secs(),
            max_transaction_retry_secs: default_max_transaction_retry_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            connect_base_delay_ms: default_connect_base_delay_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl GraphConfig {
    pub fn query_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
            .with_budget(Duration::from_secs(self.max_transaction_retry_secs))
    }

    pub fn connect_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
            .with_base_delay(Duration::from_millis(self.connect_base_delay_ms))
    }
}

/// Lifecycle of a [`GraphClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// A failed attempt, before classification into [`GraphError`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum Fault {
    #[error(transparent)]
    Driver(#[from] neo4rs::Error),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

const TRANSIENT_MARKERS: &[&str] = &[
    "TransientError",
    "SessionExpired",
    "ServiceUnavailable",
    "Connection refused",
    "connection reset",
    "broken pipe",
];

fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|m| lower.contains(&m.to_ascii_lowercase()))
}

fn is_auth_message(message: &str) -> bool {
    message.contains("Neo.ClientError.Security") || message.contains("Unauthorized")
}

pub(crate) fn is_retryable(fault: &Fault) -> bool {
    match fault {
        Fault::Timeout(..) => true,
        Fault::Driver(
            neo4rs::Error::IOError { .. } | neo4rs::Error::ConnectionError { .. },
        ) => true,
        Fault::Driver(neo4rs::Error::AuthenticationError { .. }) => false,
        Fault::Driver(e) => {
            let message = e.to_string();
            !is_auth_message(&message) && is_transient_message(&message)
        }
    }
}

/// Non-retryable faults on a statement: authentication problems are
/// connection errors, everything else is a query error.
fn permanent_query_error(fault: Fault) -> GraphError {
    let auth = match &fault {
        Fault::Driver(neo4rs::Error::AuthenticationError { .. }) => true,
        other => is_auth_message(&other.to_string()),
    };
    if auth {
        GraphError::connection_caused_by("Authentication failed", fault)
    } else {
        GraphError::query_caused_by(format!("Query failed: {fault}"), fault)
    }
}

fn permanent_connect_error(fault: Fault) -> GraphError {
    GraphError::connection_caused_by(format!("Failed to connect: {fault}"), fault)
}

struct Inner {
    state: ConnectionState,
    graph: Option<Graph>,
}

/// Thread-safe Neo4j client with connection pooling.
///
/// Every statement runs in its own transaction on a pooled session, with
/// transient failures retried per [`GraphConfig::retry`]. Clone is cheap
/// (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    config: Arc<GraphConfig>,
    inner: Arc<RwLock<Inner>>,
}

impl GraphClient {
    /// Create a disconnected client. Call [`connect`](Self::connect) before use.
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config: Arc::new(config),
            inner: Arc::new(RwLock::new(Inner {
                state: ConnectionState::Disconnected,
                graph: None,
            })),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.read().await.state
    }

    /// Open the pool and verify reachability. No-op when already connected.
    ///
    /// The client lock is released while backing off, so other callers see
    /// `Connecting` instead of waiting out the retry schedule.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut inner = self.inner.write().await;
            if inner.state == ConnectionState::Connected {
                return Ok(());
            }
            inner.state = ConnectionState::Connecting;
        }

        let policy = self.config.connect_policy();
        let result = policy.run("connect", is_retryable, || self.open()).await;

        let mut inner = self.inner.write().await;
        match inner.state {
            ConnectionState::Closed => {
                return Err(GraphError::connection("Client was closed while connecting"))
            }
            // A concurrent connect() won the race.
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting | ConnectionState::Disconnected => {}
        }
        match result {
            Ok(graph) => {
                inner.graph = Some(graph);
                inner.state = ConnectionState::Connected;
                tracing::info!(
                    uri = %self.config.uri,
                    database = %self.config.database,
                    "Connected to Neo4j"
                );
                Ok(())
            }
            Err(e) => {
                inner.state = ConnectionState::Disconnected;
                Err(e.into_graph_error(permanent_connect_error))
            }
        }
    }

    async fn open(&self) -> std::result::Result<Graph, Fault> {
        let config = &self.config;
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()?;

        let deadline = Duration::from_secs(config.connect_timeout_secs);
        timeout(deadline, async {
            let graph = Graph::connect(neo_config).await?;
            graph.run(neo4rs::query("RETURN 1")).await?;
            Ok::<_, Fault>(graph)
        })
        .await
        .map_err(|_| Fault::Timeout("connect", deadline))?
    }

    /// Release the pool. Safe to call repeatedly.
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        if inner.graph.take().is_some() {
            tracing::info!(uri = %self.config.uri, "Closed Neo4j connection");
        }
        inner.state = ConnectionState::Closed;
    }

    async fn graph(&self) -> Result<Graph> {
        let inner = self.inner.read().await;
        match (&inner.state, &inner.graph) {
            (ConnectionState::Connected, Some(graph)) => Ok(graph.clone()),
            (state, _) => Err(GraphError::connection(format!(
                "Client is {state:?}; call connect() first"
            ))),
        }
    }

    /// Run a read statement and collect its rows.
    pub async fn execute_read(&self, statement: &Statement) -> Result<Vec<Record>> {
        self.execute("read", statement).await
    }

    /// Run a write statement and collect its rows.
    pub async fn execute_write(&self, statement: &Statement) -> Result<Vec<Record>> {
        self.execute("write", statement).await
    }

    async fn execute(&self, mode: &'static str, statement: &Statement) -> Result<Vec<Record>> {
        let graph = self.graph().await?;
        let acquisition = Duration::from_secs(self.config.acquisition_timeout_secs);

        tracing::debug!(mode, query = statement.text(), "Executing statement");

        let graph = &graph;
        let policy = self.config.query_policy();
        let rows = policy
            .run(mode, is_retryable, move || {
                Self::run_in_txn(graph, statement, acquisition)
            })
            .await
            .map_err(|e| e.into_graph_error(permanent_query_error))?;

        rows.iter()
            .map(|row| {
                row.to::<Record>()
                    .map_err(|e| GraphError::query_caused_by("Failed to decode result row", e))
            })
            .collect()
    }

    /// One scoped transaction: commit on success, roll back on failure.
    async fn run_in_txn(
        graph: &Graph,
        statement: &Statement,
        acquisition: Duration,
    ) -> std::result::Result<Vec<Row>, Fault> {
        let mut txn = timeout(acquisition, graph.start_txn())
            .await
            .map_err(|_| Fault::Timeout("session acquisition", acquisition))??;

        match Self::collect(&mut txn, statement).await {
            Ok(rows) => {
                txn.commit().await?;
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn collect(txn: &mut Txn, statement: &Statement) -> std::result::Result<Vec<Row>, Fault> {
        let mut stream = txn.execute(statement.to_query()).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(txn.handle()).await? {
            rows.push(row);
        }
        Ok(rows)
    }
}
