//! The request/response contract with the external executor.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{Document, OperationKind};
use crate::error::GraphqlError;

/// Operation variables, keyed by variable name.
pub type Variables = Map<String, Value>;

/// Opaque per-request context handed through to the executor.
pub type Context = Map<String, Value>;

/// Store-update hook run by the executor after a mutation result arrives.
pub type UpdateFn = Arc<dyn Fn(&ExecutionResponse) + Send + Sync>;

/// An operation to refetch, with the variables to refetch it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefetchOperation {
    /// Document to re-run.
    pub document: Document,
    /// Variables to re-run it with.
    #[serde(default)]
    pub variables: Variables,
}

impl RefetchOperation {
    /// Create a refetch operation.
    pub fn new(document: impl Into<Document>, variables: Variables) -> Self {
        Self {
            document: document.into(),
            variables,
        }
    }
}

/// Computes refetch targets from a mutation's response. Evaluated by the
/// executor once the mutation settles.
pub type RefetchProvider = Arc<dyn Fn(&ExecutionResponse) -> Vec<RefetchTarget> + Send + Sync>;

/// One entry of a mutation's refetch list.
#[derive(Clone)]
pub enum RefetchTarget {
    /// Refetch by operation name. Names the registry cannot resolve are handed
    /// to the executor as names.
    Named(String),
    /// Refetch an explicit document with explicit variables.
    Operation(RefetchOperation),
    /// Let the executor ask for targets once the response is known. Handed
    /// through untouched.
    Provider(RefetchProvider),
}

impl RefetchTarget {
    /// Wrap a function computing targets from the mutation response.
    pub fn provider(
        provider: impl Fn(&ExecutionResponse) -> Vec<RefetchTarget> + Send + Sync + 'static,
    ) -> Self {
        RefetchTarget::Provider(Arc::new(provider))
    }
}

impl fmt::Debug for RefetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefetchTarget::Named(name) => f.debug_tuple("Named").field(name).finish(),
            RefetchTarget::Operation(operation) => {
                f.debug_tuple("Operation").field(operation).finish()
            }
            RefetchTarget::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Providers compare by identity.
impl PartialEq for RefetchTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RefetchTarget::Named(a), RefetchTarget::Named(b)) => a == b,
            (RefetchTarget::Operation(a), RefetchTarget::Operation(b)) => a == b,
            (RefetchTarget::Provider(a), RefetchTarget::Provider(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for RefetchTarget {
    fn from(name: &str) -> Self {
        RefetchTarget::Named(name.to_string())
    }
}

impl From<String> for RefetchTarget {
    fn from(name: String) -> Self {
        RefetchTarget::Named(name)
    }
}

impl From<RefetchOperation> for RefetchTarget {
    fn from(operation: RefetchOperation) -> Self {
        RefetchTarget::Operation(operation)
    }
}

/// Cache interaction hint passed through to the executor for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Read from the cache, go to the network on a miss.
    #[default]
    CacheFirst,
    /// Return cached data, then refresh from the network.
    CacheAndNetwork,
    /// Always go to the network, write the result to the cache.
    NetworkOnly,
    /// Never go to the network.
    CacheOnly,
    /// Always go to the network, skip the cache entirely.
    NoCache,
}

/// Side effects the executor performs around a mutation.
#[derive(Clone, Default)]
pub struct SideEffectHooks {
    /// Result to write to the store before the server answers.
    pub optimistic_response: Option<Value>,
    /// Store-update hook.
    pub update: Option<UpdateFn>,
    /// Operations to refetch once the mutation settles.
    pub refetch_queries: Vec<RefetchTarget>,
    /// Whether the mutation waits for its refetches before settling.
    pub await_refetch_queries: bool,
}

impl fmt::Debug for SideEffectHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SideEffectHooks")
            .field("optimistic_response", &self.optimistic_response)
            .field("update", &self.update.as_ref().map(|_| "Fn"))
            .field("refetch_queries", &self.refetch_queries)
            .field("await_refetch_queries", &self.await_refetch_queries)
            .finish()
    }
}

/// A fully resolved request, ready for the executor.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Kind of the operation, as checked by the controller.
    pub kind: OperationKind,
    /// The request document.
    pub document: Document,
    /// Effective variables.
    pub variables: Variables,
    /// Effective context.
    pub context: Context,
    /// Mutation side effects. Empty for queries.
    pub hooks: SideEffectHooks,
    /// Query fetch policy, passed through untouched.
    pub fetch_policy: Option<FetchPolicy>,
    /// Query poll interval, passed through untouched.
    pub poll_interval: Option<Duration>,
}

impl ExecutionRequest {
    /// Create a request with no side effects and no query hints.
    pub fn new(kind: OperationKind, document: Document, variables: Variables) -> Self {
        Self {
            kind,
            document,
            variables,
            context: Context::new(),
            hooks: SideEffectHooks::default(),
            fetch_policy: None,
            poll_interval: None,
        }
    }
}

/// Response payload returned by the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    /// Response data.
    #[serde(default)]
    pub data: Option<Value>,
    /// GraphQL errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphqlError>,
    /// Extensions payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl ExecutionResponse {
    /// A response carrying only data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// A response carrying only errors.
    pub fn errors(errors: Vec<GraphqlError>) -> Self {
        Self {
            errors,
            ..Self::default()
        }
    }

    /// Returns `true` if no GraphQL errors were returned.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Deserialize the data into `T`. Returns `Ok(None)` when there is no data.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.data.clone().map(serde_json::from_value).transpose()
    }
}

/// The external execution client.
///
/// Network I/O, caching, normalization and optimistic store updates all live
/// behind this trait. A failed future is a transport failure; GraphQL-level
/// errors come back inside [`ExecutionResponse::errors`].
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Execute a resolved request.
    async fn execute(&self, request: ExecutionRequest) -> anyhow::Result<ExecutionResponse>;
}
