//! Query controller: issues its operation on activation and on input change.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::context::ClientContext;
use crate::controller::{
    Controller, Dispatch, LatestStatus, LoadingTransition, OnCompleted, OnError, SettlePolicy,
};
use crate::document::{assert_kind, Document, OperationKind};
use crate::error::{OperationError, WrongOperationKind};
use crate::request::{Context, Executor, FetchPolicy, RefetchOperation, Variables};
use crate::resolve::resolve_query;
use crate::snapshot::{Listener, ListenerKey, OperationResult, ResultSnapshot};
use crate::tracer::TracerOperation;

/// Configuration of a query call site.
#[derive(Clone)]
pub struct QueryOptions {
    /// The query document.
    pub document: Document,
    /// Query variables.
    pub variables: Option<Variables>,
    /// Client to use instead of the context's client.
    pub client: Option<Arc<dyn Executor>>,
    /// Context handed to the executor.
    pub context: Option<Context>,
    /// Passed through to the executor.
    pub fetch_policy: Option<FetchPolicy>,
    /// Passed through to the executor.
    pub poll_interval: Option<Duration>,
    /// Do not issue automatically.
    pub skip: bool,
    /// Called with the data of every fetch that completes without errors.
    pub on_completed: Option<OnCompleted>,
    /// Called with the error of every failed fetch.
    pub on_error: Option<OnError>,
}

impl QueryOptions {
    /// Options for `document` with every other field at its default.
    pub fn new(document: impl Into<Document>) -> Self {
        Self {
            document: document.into(),
            variables: None,
            client: None,
            context: None,
            fetch_policy: None,
            poll_interval: None,
            skip: false,
            on_completed: None,
            on_error: None,
        }
    }

    /// Set the variables.
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Use `client` instead of the context's client.
    pub fn with_client(mut self, client: Arc<dyn Executor>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the executor context.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the fetch policy.
    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = Some(policy);
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Disable automatic issuing.
    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
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

    fn inputs(&self) -> QueryInputs {
        QueryInputs {
            document: self.document.clone(),
            variables: self.variables.clone().unwrap_or_default(),
            context: self.context.clone().unwrap_or_default(),
            fetch_policy: self.fetch_policy,
            poll_interval: self.poll_interval,
        }
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("document", &self.document)
            .field("variables", &self.variables)
            .field("context", &self.context)
            .field("fetch_policy", &self.fetch_policy)
            .field("poll_interval", &self.poll_interval)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

/// The parts of [`QueryOptions`] whose change triggers a new fetch.
#[derive(Debug, Clone, PartialEq)]
struct QueryInputs {
    document: Document,
    variables: Variables,
    context: Context,
    fetch_policy: Option<FetchPolicy>,
    poll_interval: Option<Duration>,
}

struct QueryInner {
    options: RwLock<QueryOptions>,
    /// Inputs of the last issued fetch; `None` forces the next activation to issue.
    issued: Mutex<Option<QueryInputs>>,
    context: ClientContext,
}

/// Controller for one query call site.
///
/// The query is issued when the consumer attaches and again whenever its
/// inputs change while attached. Methods that may issue return the
/// [`Dispatch`] handle of the fetch they started.
///
/// This is cheap to clone - all data is behind `Arc`.
#[derive(Clone)]
pub struct QueryController {
    core: Controller,
    inner: Arc<QueryInner>,
}

impl QueryController {
    /// Create a controller. Fails if the document is not a query. Nothing is
    /// issued until [`activate`](Self::activate).
    pub fn new(
        options: QueryOptions,
        context: &ClientContext,
    ) -> Result<Self, WrongOperationKind> {
        assert_kind(&*context.classifier, &options.document, OperationKind::Query)?;
        let client = options
            .client
            .clone()
            .unwrap_or_else(|| context.client.clone());
        let core = Controller::new(
            client,
            context,
            TracerOperation::new(OperationKind::Query, &options.document),
        );
        Ok(Self {
            core,
            inner: Arc::new(QueryInner {
                options: RwLock::new(options),
                issued: Mutex::new(None),
                context: context.clone(),
            }),
        })
    }

    /// The consumer attached. Issues the query unless the current inputs have
    /// already been fetched, or re-issues it if the last result arrived while
    /// detached.
    pub fn activate(&self) -> Option<Dispatch> {
        self.core.activate();
        self.needs_issue().then(|| self.issue(None))
    }

    /// The consumer detached. Pending fetches stop writing the snapshot.
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

    /// Replace the options.
    ///
    /// A changed document is checked again and rejected if it is not a query,
    /// leaving the old options in place. If the resolved client changed the
    /// snapshot is reset. While attached, changed inputs issue a new fetch.
    pub fn set_options(
        &self,
        options: QueryOptions,
    ) -> Result<Option<Dispatch>, WrongOperationKind> {
        let document_changed = self.inner.options.read().document != options.document;
        if document_changed {
            assert_kind(
                &*self.inner.context.classifier,
                &options.document,
                OperationKind::Query,
            )?;
            self.core.set_operation(TracerOperation::new(
                OperationKind::Query,
                &options.document,
            ));
        }
        let client = options
            .client
            .clone()
            .unwrap_or_else(|| self.inner.context.client.clone());
        *self.inner.options.write() = options;
        if self.core.set_client(client, true) {
            *self.inner.issued.lock() = None;
        }
        Ok(self.issue_if_active())
    }

    /// Bind a different client. The snapshot resets to its initial state and,
    /// while attached, the query is issued against the new client.
    pub fn set_client(&self, client: Arc<dyn Executor>) -> Option<Dispatch> {
        if !self.core.set_client(client, true) {
            return None;
        }
        *self.inner.issued.lock() = None;
        self.issue_if_active()
    }

    /// Issue the query now, with `variables` merged over the configured ones
    /// for this fetch only.
    pub fn refetch(&self, variables: Option<Variables>) -> Dispatch {
        self.issue(variables.as_ref())
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

    fn issue_if_active(&self) -> Option<Dispatch> {
        (self.core.is_active() && self.needs_issue()).then(|| self.issue(None))
    }

    fn needs_issue(&self) -> bool {
        let options = self.inner.options.read();
        if options.skip {
            return false;
        }
        let stale = self.inner.issued.lock().as_ref() != Some(&options.inputs());
        stale || self.core.latest_status() == LatestStatus::Suppressed
    }

    fn issue(&self, variables: Option<&Variables>) -> Dispatch {
        let (request, policy) = {
            let options = self.inner.options.read();
            *self.inner.issued.lock() = Some(options.inputs());
            let policy = SettlePolicy {
                on_completed: options.on_completed.clone(),
                on_error: options.on_error.clone(),
                ignore_results: false,
            };
            (resolve_query(&options, variables), policy)
        };
        if let Some(name) = request.document.operation_name() {
            debug!(name, "registering query for refetch");
            self.inner.context.registry.register(
                name,
                RefetchOperation::new(request.document.clone(), request.variables.clone()),
            );
        }
        self.core.dispatch(LoadingTransition::KeepData, request, policy)
    }
}

impl fmt::Debug for QueryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryController")
            .field("options", &*self.inner.options.read())
            .field("snapshot", &self.core.snapshot())
            .finish_non_exhaustive()
    }
}
