//! Operation-Flow: lifecycle controllers for declarative GraphQL operations.
//!
//! This crate sits between a component-based UI and an external GraphQL
//! execution client. It decides when an operation is issued, which of several
//! overlapping invocations may write the visible result, and whether a result
//! may be written at all once the consumer has detached.
//!
//! # Key Features
//!
//! - **Latest invocation wins**: every invocation carries its own identity;
//!   only the most recently issued one may commit to the snapshot
//! - **Callbacks always fire**: `on_completed`/`on_error` run for superseded and
//!   detached invocations too
//! - **Mount guard**: explicit, idempotent `activate`/`deactivate`
//! - **Option merging**: per-call overrides over operation defaults, with
//!   name-based refetch targets resolved at call time
//! - **Kind checking**: documents are classified at construction and whenever
//!   they change
//!
//! # Example
//!
//! ```ignore
//! use futures::executor::ThreadPool;
//! use operation_flow::{ClientContext, MutationController, MutationOptions, MutationOverrides};
//!
//! let create_todo = "mutation createTodo($text: String!) { createTodo(text: $text) { id } }";
//! let context = ClientContext::new(client, ThreadPool::new()?);
//! let mutation = MutationController::new(
//!     MutationOptions::new(create_todo).on_error(|err| eprintln!("{err}")),
//!     &context,
//! )?;
//! mutation.activate();
//!
//! let pending = mutation.trigger(MutationOverrides::default().with_variables(vars));
//! assert!(mutation.result().loading);
//! let response = pending.await?;
//! ```
//!
//! Nothing here talks to a network: the [`Executor`] does the I/O. Each
//! invocation runs on the spawner given to the [`ClientContext`], so the
//! returned [`Dispatch`] handles may be awaited or dropped.

#![deny(missing_docs)]

mod context;
mod controller;
mod document;
mod error;
mod lifecycle;
mod mutation;
mod query;
mod registry;
mod request;
pub mod resolve;
mod sequencer;
mod snapshot;
pub mod tracer;

pub use context::ClientContext;
pub use controller::{Dispatch, OnCompleted, OnError};
pub use document::{assert_kind, Classifier, Document, KeywordClassifier, OperationKind};
pub use error::{
    GraphqlError, GraphqlErrorLocation, GraphqlPathSegment, OperationError, WrongOperationKind,
};
pub use lifecycle::LifecycleGuard;
pub use mutation::{MutationController, MutationOptions, MutationOverrides, MutationTrigger};
pub use query::{QueryController, QueryOptions};
pub use registry::OperationRegistry;
pub use request::{
    Context, ExecutionRequest, ExecutionResponse, Executor, FetchPolicy, RefetchOperation,
    RefetchProvider, RefetchTarget, SideEffectHooks, UpdateFn, Variables,
};
pub use sequencer::{InvocationId, InvocationSequencer};
pub use snapshot::{Listener, ListenerKey, OperationResult, ResultSnapshot};
pub use tracer::{NoopTracer, SettleOutcome, Suppression, Tracer, TracerOperation};
