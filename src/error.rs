//! Error types for operation controllers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::document::OperationKind;

/// A controller was given a document of the wrong operation kind.
///
/// This is a programmer error and is returned synchronously, both when a
/// controller is constructed and when its document is swapped later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected a {expected} document, but got a {actual}")]
pub struct WrongOperationKind {
    /// The kind the controller requires.
    pub expected: OperationKind,
    /// The kind the classifier found.
    pub actual: OperationKind,
}

/// GraphQL error location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    /// Line number in the document (1-based).
    pub line: u32,
    /// Column number in the document (1-based).
    pub column: u32,
}

/// GraphQL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphqlPathSegment {
    /// Field name.
    Key(String),
    /// List index.
    Index(i64),
}

/// A single entry of a response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error message.
    pub message: String,
    /// Location(s) within the document.
    #[serde(default)]
    pub locations: Vec<GraphqlErrorLocation>,
    /// Path within the response where the error occurred.
    #[serde(default)]
    pub path: Vec<GraphqlPathSegment>,
    /// Extensions metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphqlError {
    /// Create an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }
}

/// Errors surfaced by an operation invocation.
///
/// Both variants are recoverable: they are recorded in the result snapshot and
/// handed to `on_error`. They only come back out of a dispatch future when no
/// `on_error` callback is registered.
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// The executor settled successfully, but the response carried a non-empty
    /// `errors` list.
    ///
    /// `data` holds whatever partial data came with the errors.
    #[error("{}", GraphqlMessages(.errors))]
    GraphqlResponse {
        /// The errors reported by the server.
        errors: Vec<GraphqlError>,
        /// Partial data delivered alongside the errors.
        data: Option<Value>,
    },

    /// The executor itself failed.
    #[error("Network error: {0}")]
    Transport(Arc<anyhow::Error>),
}

struct GraphqlMessages<'a>(&'a [GraphqlError]);

impl fmt::Display for GraphqlMessages<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "GraphQL error: {}", error.message)?;
        }
        Ok(())
    }
}

impl OperationError {
    /// Wrap an executor failure.
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        OperationError::Transport(Arc::new(err.into()))
    }

    /// Compose an error from a response's `errors` list.
    ///
    /// Returns `None` when the list is empty.
    pub fn from_graphql(errors: &[GraphqlError], data: Option<&Value>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        Some(OperationError::GraphqlResponse {
            errors: errors.to_vec(),
            data: data.cloned(),
        })
    }

    /// Returns the GraphQL errors if this is a `GraphqlResponse` variant.
    pub fn graphql_errors(&self) -> &[GraphqlError] {
        match self {
            OperationError::GraphqlResponse { errors, .. } => errors,
            OperationError::Transport(_) => &[],
        }
    }

    /// Returns `true` if the executor failed rather than the server reporting errors.
    pub fn is_transport(&self) -> bool {
        matches!(self, OperationError::Transport(_))
    }

    /// Returns a reference to the inner transport error.
    pub fn transport_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            OperationError::Transport(e) => Some(e),
            OperationError::GraphqlResponse { .. } => None,
        }
    }

    /// Attempts to downcast the transport error to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.transport_error().and_then(|e| e.downcast_ref::<E>())
    }

    /// Returns `true` if this is a transport error of type `E`.
    pub fn is<E: std::error::Error + Send + Sync + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_message_joins_every_error() {
        let err = OperationError::from_graphql(
            &[GraphqlError::new("first"), GraphqlError::new("second")],
            None,
        )
        .unwrap();
        assert_eq!(
            err.to_string(),
            "GraphQL error: first\nGraphQL error: second"
        );
        assert_eq!(err.graphql_errors().len(), 2);
    }

    #[test]
    fn test_empty_errors_compose_nothing() {
        assert!(OperationError::from_graphql(&[], None).is_none());
    }

    #[test]
    fn test_transport_downcast() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = OperationError::transport(io);
        assert!(err.is_transport());
        assert!(err.is::<std::io::Error>());
        assert_eq!(err.to_string(), "Network error: reset");
    }

    #[test]
    fn test_wrong_kind_message() {
        let err = WrongOperationKind {
            expected: OperationKind::Mutation,
            actual: OperationKind::Query,
        };
        assert_eq!(err.to_string(), "expected a mutation document, but got a query");
    }
}
