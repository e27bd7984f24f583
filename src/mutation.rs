//! Mutation controller: issues its operation only when triggered.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::context::ClientContext;
use crate::controller::{
    Controller, Dispatch, LoadingTransition, OnCompleted, OnError, SettlePolicy,
};
use crate::document::{assert_kind, Document, OperationKind};
use crate::error::{OperationError, WrongOperationKind};
use crate::request::{Context, ExecutionResponse, Executor, RefetchTarget, UpdateFn, Variables};
use crate::resolve::resolve_mutation;
use crate::snapshot::{Listener, ListenerKey, OperationResult, ResultSnapshot};
use crate::tracer::TracerOperation;

/// Operation-level configuration of a mutation.
#[derive(Clone)]
pub struct MutationOptions {
    /// The mutation document.
    pub document: Document,
    /// Default variables, merged under per-call variables.
    pub variables: Option<Variables>,
    /// Client to use instead of the context's client.
    pub client: Option<Arc<dyn Executor>>,
    /// Result written to the store before the server answers.
    pub optimistic_response: Option<Value>,
    /// Store-update hook run by the executor.
    pub update: Option<UpdateFn>,
    /// Operations to refetch after the mutation.
    pub refetch_queries: Vec<RefetchTarget>,
    /// Whether the mutation waits for its refetches.
    pub await_refetch_queries: bool,
    /// Never record results in the snapshot.
    pub ignore_results: bool,
    /// Context handed to the executor.
    pub context: Option<Context>,
    /// Called with the data of every invocation that completes without errors.
    pub on_completed: Option<OnCompleted>,
    /// Called with the error of every failed invocation. Registering it keeps
    /// failures out of the dispatch futures.
    pub on_error: Option<OnError>,
}

impl MutationOptions {
    /// Options for `document` with every other field at its default.
    pub fn new(document: impl Into<Document>) -> Self {
        Self {
            document: document.into(),
            variables: None,
            client: None,
            optimistic_response: None,
            update: None,
            refetch_queries: Vec::new(),
            await_refetch_queries: false,
            ignore_results: false,
            context: None,
            on_completed: None,
            on_error: None,
        }
    }

    /// Set default variables.
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Use `client` instead of the context's client.
    pub fn with_client(mut self, client: Arc<dyn Executor>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the optimistic response.
    pub fn with_optimistic_response(mut self, response: Value) -> Self {
        self.optimistic_response = Some(response);
        self
    }

    /// Set the store-update hook.
    pub fn with_update(
        mut self,
        update: impl Fn(&ExecutionResponse) + Send + Sync + 'static,
    ) -> Self {
        self.update = Some(Arc::new(update));
        self
    }

    /// Set the refetch list.
    pub fn with_refetch_queries<T: Into<RefetchTarget>>(
        mut self,
        targets: impl IntoIterator<Item = T>,
    ) -> Self {
        self.refetch_queries = targets.into_iter().map(Into::into).collect();
        self
    }

    /// Wait for refetches before settling.
    pub fn await_refetch_queries(mut self, await_refetch: bool) -> Self {
        self.await_refetch_queries = await_refetch;
        self
    }

    /// Keep results out of the snapshot.
    pub fn ignore_results(mut self, ignore: bool) -> Self {
        self.ignore_results = ignore;
        self
    }

    /// Set the executor context.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Register the completion callback.
    pub fn on_completed(
        mut self,
        callback: impl Fn(Option<&Value>) + Send + Sync + 'static,
    ) -> Self {
        self.on_completed = Some(Arc::new(callback));
        self
    }

    /// Register the error callback.
    pub fn on_error(mut self, callback: impl Fn(&OperationError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for MutationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("document", &self.document)
            .field("variables", &self.variables)
            .field("optimistic_response", &self.optimistic_response)
            .field("refetch_queries", &self.refetch_queries)
            .field("await_refetch_queries", &self.await_refetch_queries)
            .field("ignore_results", &self.ignore_results)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Per-call overrides for one mutation invocation.
///
/// Unset fields fall back to the [`MutationOptions`].
#[derive(Clone, Default)]
pub struct MutationOverrides {
    /// Variables merged over the default variables.
    pub variables: Option<Variables>,
    /// Replaces the optimistic response.
    pub optimistic_response: Option<Value>,
    /// Replaces the store-update hook.
    pub update: Option<UpdateFn>,
    /// Replaces the whole refetch list.
    pub refetch_queries: Option<Vec<RefetchTarget>>,
    /// Replaces the await-refetch flag.
    pub await_refetch_queries: Option<bool>,
    /// Replaces the context.
    pub context: Option<Context>,
}

impl MutationOverrides {
    /// Set the per-call variables.
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Set the per-call optimistic response.
    pub fn with_optimistic_response(mut self, response: Value) -> Self {
        self.optimistic_response = Some(response);
        self
    }

    /// Set the per-call store-update hook.
    pub fn with_update(
        mut self,
        update: impl Fn(&ExecutionResponse) + Send + Sync + 'static,
    ) -> Self {
        self.update = Some(Arc::new(update));
        self
    }

    /// Set the per-call refetch list.
    pub fn with_refetch_queries<T: Into<RefetchTarget>>(
        mut self,
        targets: impl IntoIterator<Item = T>,
    ) -> Self {
        self.refetch_queries = Some(targets.into_iter().map(Into::into).collect());
        self
    }

    /// Set the per-call await-refetch flag.
    pub fn await_refetch_queries(mut self, await_refetch: bool) -> Self {
        self.await_refetch_queries = Some(await_refetch);
        self
    }

    /// Set the per-call context.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Debug for MutationOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOverrides")
            .field("variables", &self.variables)
            .field("optimistic_response", &self.optimistic_response)
            .field("refetch_queries", &self.refetch_queries)
            .field("await_refetch_queries", &self.await_refetch_queries)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

struct MutationInner {
    options: RwLock<MutationOptions>,
    context: ClientContext,
}

/// Controller for one mutation call site.
///
/// Every [`trigger`](Self::trigger) mints a new invocation. Invocations may
/// overlap; only the most recently triggered one may write the snapshot, while
/// the callbacks of all of them run.
///
/// This is cheap to clone - all data is behind `Arc`.
///
/// # Example
///
/// ```ignore
/// let mutation = MutationController::new(
///     MutationOptions::new("mutation createTodo { createTodo { id } }")
///         .on_completed(|data| println!("created {data:?}")),
///     &context,
/// )?;
/// mutation.activate();
///
/// let response = mutation.trigger(MutationOverrides::default()).await?;
/// assert!(!mutation.result().loading);
/// ```
#[derive(Clone)]
pub struct MutationController {
    core: Controller,
    inner: Arc<MutationInner>,
}

impl MutationController {
    /// Create a controller. Fails if the document is not a mutation.
    pub fn new(
        options: MutationOptions,
        context: &ClientContext,
    ) -> Result<Self, WrongOperationKind> {
        assert_kind(&*context.classifier, &options.document, OperationKind::Mutation)?;
        let client = options
            .client
            .clone()
            .unwrap_or_else(|| context.client.clone());
        let core = Controller::new(
            client,
            context,
            TracerOperation::new(OperationKind::Mutation, &options.document),
        );
        Ok(Self {
            core,
            inner: Arc::new(MutationInner {
                options: RwLock::new(options),
                context: context.clone(),
            }),
        })
    }

    /// The consumer attached.
    pub fn activate(&self) {
        self.core.activate();
    }

    /// The consumer detached. Pending invocations stop writing the snapshot.
    pub fn deactivate(&self) {
        self.core.deactivate();
    }

    /// Whether the consumer is attached.
    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// Current projection: snapshot plus client.
    pub fn result(&self) -> OperationResult {
        self.core.result()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ResultSnapshot {
        self.core.snapshot()
    }

    /// The projection together with a handle that triggers this mutation.
    pub fn api(&self) -> (OperationResult, MutationTrigger) {
        (
            self.result(),
            MutationTrigger {
                controller: self.clone(),
            },
        )
    }

    /// Trigger the mutation.
    ///
    /// Unless results are ignored, the snapshot enters loading before this
    /// returns. The invocation is spawned right away; awaiting the handle is
    /// optional.
    pub fn trigger(&self, overrides: MutationOverrides) -> Dispatch {
        let (request, policy, transition) = {
            let options = self.inner.options.read();
            let request = resolve_mutation(&options, &overrides, &self.inner.context.registry);
            let policy = SettlePolicy {
                on_completed: options.on_completed.clone(),
                on_error: options.on_error.clone(),
                ignore_results: options.ignore_results,
            };
            let transition = if options.ignore_results {
                LoadingTransition::Skip
            } else {
                LoadingTransition::ClearData
            };
            (request, policy, transition)
        };
        self.core.dispatch(transition, request, policy)
    }

    /// Replace the options. A changed document is checked again and rejected
    /// if it is not a mutation, leaving the old options in place.
    pub fn set_options(&self, options: MutationOptions) -> Result<(), WrongOperationKind> {
        let document_changed = self.inner.options.read().document != options.document;
        if document_changed {
            assert_kind(
                &*self.inner.context.classifier,
                &options.document,
                OperationKind::Mutation,
            )?;
            self.core.set_operation(TracerOperation::new(
                OperationKind::Mutation,
                &options.document,
            ));
        }
        let client = options
            .client
            .clone()
            .unwrap_or_else(|| self.inner.context.client.clone());
        self.core.set_client(client, false);
        *self.inner.options.write() = options;
        Ok(())
    }

    /// Bind a different client. Pending invocations keep the client they were
    /// issued with.
    pub fn set_client(&self, client: Arc<dyn Executor>) {
        self.core.set_client(client, false);
    }

    /// Run `listener` after every snapshot change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&ResultSnapshot) + Send + Sync + 'static,
    ) -> ListenerKey {
        let listener: Listener = Arc::new(listener);
        self.core.subscribe(listener)
    }

    /// Remove a listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, key: ListenerKey) -> bool {
        self.core.unsubscribe(key)
    }
}

impl fmt::Debug for MutationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationController")
            .field("options", &*self.inner.options.read())
            .field("snapshot", &self.core.snapshot())
            .finish_non_exhaustive()
    }
}

/// Cloneable handle that triggers a mutation.
#[derive(Clone, Debug)]
pub struct MutationTrigger {
    controller: MutationController,
}

impl MutationTrigger {
    /// Trigger the mutation. See [`MutationController::trigger`].
    pub fn call(&self, overrides: MutationOverrides) -> Dispatch {
        self.controller.trigger(overrides)
    }
}
