//! Tracer trait for observing controller execution.
//!
//! This module defines the [`Tracer`] trait and related types for observing
//! invocations as they are issued, settle, and get committed or suppressed.
//! The default [`NoopTracer`] costs nothing when observation is not needed.
//! Log output goes through the `tracing` crate independently of the tracer.
//!
//! # Example
//!
//! ```ignore
//! use operation_flow::{ClientContext, InvocationId, Tracer, TracerOperation};
//!
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn on_commit(&self, id: InvocationId, operation: &TracerOperation) {
//!         println!("{operation:?} committed {id}");
//!     }
//! }
//!
//! let context = ClientContext::new(client).with_tracer(PrintTracer);
//! ```

use crate::document::{Document, OperationKind};
use crate::sequencer::InvocationId;

/// Identifies an operation in a tracer event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TracerOperation {
    /// Kind of the operation.
    pub kind: OperationKind,
    /// Operation name from the document, if it has one.
    pub name: Option<String>,
}

impl TracerOperation {
    /// Describe the operation defined by `document`.
    pub fn new(kind: OperationKind, document: &Document) -> Self {
        Self {
            kind,
            name: document.operation_name().map(str::to_string),
        }
    }
}

/// How an invocation settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Response without errors.
    Data,
    /// Response carrying GraphQL errors.
    GraphqlErrors {
        /// Number of errors in the response.
        count: usize,
    },
    /// The executor failed.
    Transport {
        /// Display form of the failure.
        message: String,
    },
}

/// Why a settled invocation did not touch the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suppression {
    /// A later invocation has been issued since.
    Superseded,
    /// The consumer is detached.
    Inactive,
    /// The operation ignores results.
    Ignored,
}

/// Tracer trait for observing controller execution.
///
/// All methods have default empty implementations, so you only need to override
/// the events you're interested in.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` as dispatch futures may settle on any
/// thread.
pub trait Tracer: Send + Sync + 'static {
    /// Called when an invocation has been minted, before dispatch.
    #[inline]
    fn on_invocation_start(&self, _id: InvocationId, _operation: &TracerOperation) {}

    /// Called when the executor settles an invocation.
    #[inline]
    fn on_settle(
        &self,
        _id: InvocationId,
        _operation: &TracerOperation,
        _outcome: &SettleOutcome,
    ) {
    }

    /// Called when a settled invocation is committed to the snapshot.
    #[inline]
    fn on_commit(&self, _id: InvocationId, _operation: &TracerOperation) {}

    /// Called when a settled invocation is kept out of the snapshot.
    #[inline]
    fn on_suppressed(
        &self,
        _id: InvocationId,
        _operation: &TracerOperation,
        _reason: Suppression,
    ) {
    }

    /// Called when the consumer attaches or detaches.
    #[inline]
    fn on_lifecycle(&self, _operation: &TracerOperation, _active: bool) {}
}

/// Zero-cost tracer that discards all events.
///
/// This is the default tracer for [`ClientContext`](crate::ClientContext).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}
