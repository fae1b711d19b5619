use thiserror::Error;

/// Boxed cause carried by transport-level failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure categories shared by every ecograph layer.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Transport or authentication failure. Raised only after retries are
    /// exhausted, or immediately when credentials are rejected.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Non-retryable execution failure (malformed query, constraint violation,
    /// unexpected record shape).
    #[error("Query error: {message}")]
    Query {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// A create/update payload was rejected at the model boundary.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl GraphError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_caused_by(
        message: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(cause.into()),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            source: None,
        }
    }

    pub fn query_caused_by(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::Query {
            message: message.into(),
            source: Some(cause.into()),
        }
    }

    /// Business-level failures that batch operations log and skip.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateNode(_) | Self::NodeNotFound(_) | Self::RelationshipNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn connection_error_keeps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = GraphError::connection_caused_by("All 3 attempts failed", io);

        assert_eq!(err.to_string(), "Connection error: All 3 attempts failed");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("refused"));
    }

    #[test]
    fn only_business_errors_are_skippable() {
        assert!(GraphError::DuplicateNode("x".into()).is_skippable());
        assert!(GraphError::NodeNotFound("x".into()).is_skippable());
        assert!(GraphError::RelationshipNotFound("x".into()).is_skippable());
        assert!(!GraphError::query("boom").is_skippable());
        assert!(!GraphError::connection("down").is_skippable());
        assert!(!GraphError::InvalidFilter("limit".into()).is_skippable());
    }
}
