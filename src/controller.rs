//! Lifecycle core shared by the query and mutation controllers.
//!
//! The core owns the result snapshot, the invocation sequencer and the
//! lifecycle guard behind one lock. Each dispatched invocation closes over its
//! own identity; when it settles, the "is this still the latest invocation"
//! check, the "is the consumer attached" check and the commit all happen under
//! that single lock acquisition. Callbacks and listeners run after the lock is
//! released.
//!
//! Invocations run as tasks on the context's spawner, so an invocation
//! settles, commits and runs its callbacks even if nobody awaits its
//! [`Dispatch`].

use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{self, BoxFuture};
use futures::task::{Spawn, SpawnExt};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::context::ClientContext;
use crate::error::OperationError;
use crate::lifecycle::LifecycleGuard;
use crate::request::{ExecutionRequest, ExecutionResponse, Executor};
use crate::sequencer::{InvocationId, InvocationSequencer};
use crate::snapshot::{Listener, ListenerKey, Listeners, OperationResult, ResultSnapshot};
use crate::tracer::{SettleOutcome, Suppression, Tracer, TracerOperation};

/// Handle to an issued invocation.
///
/// Resolves to:
/// - `Ok(Some(response))` with the raw response when the executor answered,
///   including responses carrying GraphQL errors that `on_error` handled,
/// - `Ok(None)` when the executor failed and `on_error` handled the failure,
/// - `Err(error)` when the invocation failed and no `on_error` is registered.
///
/// The invocation is already running when the handle is returned. Dropping
/// the handle only discards the outcome: the snapshot and the callbacks are
/// still updated when the executor settles.
pub type Dispatch = BoxFuture<'static, Result<Option<ExecutionResponse>, OperationError>>;

/// Called with the response data when an invocation completes without errors.
pub type OnCompleted = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Called with the error when an invocation fails.
pub type OnError = Arc<dyn Fn(&OperationError) + Send + Sync>;

/// How the snapshot changes when an invocation is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadingTransition {
    /// Leave the snapshot alone.
    Skip,
    /// Enter loading with no data or error, unless already loading.
    ClearData,
    /// Enter loading, keeping the previous data until the new result commits.
    KeepData,
}

/// What became of the most recently minted invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LatestStatus {
    Idle,
    Pending,
    Committed,
    /// Settled while the consumer was detached.
    Suppressed,
}

/// Per-invocation settlement rules.
#[derive(Clone, Default)]
pub(crate) struct SettlePolicy {
    pub(crate) on_completed: Option<OnCompleted>,
    pub(crate) on_error: Option<OnError>,
    pub(crate) ignore_results: bool,
}

struct ControllerState {
    sequencer: InvocationSequencer,
    guard: LifecycleGuard,
    snapshot: ResultSnapshot,
    client: Arc<dyn Executor>,
    latest: LatestStatus,
    operation: TracerOperation,
}

impl ControllerState {
    /// Returns `true` if the snapshot changed.
    fn begin(&mut self, transition: LoadingTransition) -> bool {
        match transition {
            LoadingTransition::Skip => false,
            LoadingTransition::ClearData if self.snapshot.loading => false,
            LoadingTransition::ClearData => {
                self.snapshot = ResultSnapshot {
                    called: true,
                    loading: true,
                    data: None,
                    error: None,
                };
                true
            }
            LoadingTransition::KeepData => {
                self.snapshot.called = true;
                self.snapshot.loading = true;
                self.snapshot.error = None;
                true
            }
        }
    }

    fn suppression(&self, id: InvocationId, commit_allowed: bool) -> Option<Suppression> {
        if !self.sequencer.is_latest(id) {
            Some(Suppression::Superseded)
        } else if !self.guard.is_active() {
            Some(Suppression::Inactive)
        } else if !commit_allowed {
            Some(Suppression::Ignored)
        } else {
            None
        }
    }
}

struct Shared {
    state: Mutex<ControllerState>,
    listeners: Listeners,
    tracer: Arc<dyn Tracer>,
    spawner: Arc<dyn Spawn + Send + Sync>,
}

/// The generic operation lifecycle controller.
///
/// This is cheap to clone - all data is behind `Arc`.
#[derive(Clone)]
pub(crate) struct Controller {
    shared: Arc<Shared>,
}

impl Controller {
    pub(crate) fn new(
        client: Arc<dyn Executor>,
        context: &ClientContext,
        operation: TracerOperation,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState {
                    sequencer: InvocationSequencer::new(),
                    guard: LifecycleGuard::new(),
                    snapshot: ResultSnapshot::initial(),
                    client,
                    latest: LatestStatus::Idle,
                    operation,
                }),
                listeners: Listeners::default(),
                tracer: context.tracer.clone(),
                spawner: context.spawner.clone(),
            }),
        }
    }

    /// Returns `true` if the consumer was not attached before.
    pub(crate) fn activate(&self) -> bool {
        self.set_active(true)
    }

    /// Returns `true` if the consumer was attached before.
    pub(crate) fn deactivate(&self) -> bool {
        self.set_active(false)
    }

    fn set_active(&self, active: bool) -> bool {
        let (changed, operation) = {
            let mut state = self.shared.state.lock();
            let changed = if active {
                state.guard.activate()
            } else {
                state.guard.deactivate()
            };
            (changed, state.operation.clone())
        };
        if changed {
            debug!(
                operation = ?operation.name,
                kind = %operation.kind,
                active,
                "lifecycle changed"
            );
            self.shared.tracer.on_lifecycle(&operation, active);
        }
        changed
    }

    pub(crate) fn is_active(&self) -> bool {
        self.shared.state.lock().guard.is_active()
    }

    pub(crate) fn snapshot(&self) -> ResultSnapshot {
        self.shared.state.lock().snapshot.clone()
    }

    pub(crate) fn result(&self) -> OperationResult {
        let state = self.shared.state.lock();
        OperationResult {
            snapshot: state.snapshot.clone(),
            client: state.client.clone(),
        }
    }

    pub(crate) fn latest_status(&self) -> LatestStatus {
        self.shared.state.lock().latest
    }

    pub(crate) fn set_operation(&self, operation: TracerOperation) {
        self.shared.state.lock().operation = operation;
    }

    /// Bind a different client. With `reset`, the snapshot returns to its
    /// initial state. Returns `false` if `client` is already bound.
    pub(crate) fn set_client(&self, client: Arc<dyn Executor>, reset: bool) -> bool {
        let reset_snapshot = {
            let mut state = self.shared.state.lock();
            if Arc::ptr_eq(&state.client, &client) {
                return false;
            }
            state.client = client;
            if reset {
                state.snapshot = ResultSnapshot::initial();
                state.latest = LatestStatus::Idle;
                Some(state.snapshot.clone())
            } else {
                None
            }
        };
        debug!(reset, "client changed");
        if let Some(snapshot) = reset_snapshot {
            self.shared.listeners.notify(&snapshot);
        }
        true
    }

    pub(crate) fn subscribe(&self, listener: Listener) -> ListenerKey {
        self.shared.listeners.insert(listener)
    }

    pub(crate) fn unsubscribe(&self, key: ListenerKey) -> bool {
        self.shared.listeners.remove(key)
    }

    /// Issue an invocation: apply the loading transition and mint an identity
    /// synchronously, then spawn the task that runs the executor and settles.
    pub(crate) fn dispatch(
        &self,
        transition: LoadingTransition,
        request: ExecutionRequest,
        policy: SettlePolicy,
    ) -> Dispatch {
        let operation = TracerOperation::new(request.kind, &request.document);
        let (id, client, loading) = {
            let mut state = self.shared.state.lock();
            let changed = state.begin(transition);
            let id = state.sequencer.next();
            state.latest = LatestStatus::Pending;
            (id, state.client.clone(), changed.then(|| state.snapshot.clone()))
        };

        debug!(
            invocation = %id,
            operation = ?operation.name,
            kind = %operation.kind,
            "issuing operation"
        );
        self.shared.tracer.on_invocation_start(id, &operation);
        if let Some(snapshot) = loading {
            self.shared.listeners.notify(&snapshot);
        }

        let (tx, rx) = oneshot::channel();
        let task = {
            let controller = self.clone();
            let operation = operation.clone();
            let policy = policy.clone();
            async move {
                let outcome = client.execute(request).await;
                // The handle may have been dropped.
                let _ = tx.send(controller.settle(id, &operation, outcome, policy));
            }
        };

        if let Err(err) = self.shared.spawner.spawn(task) {
            warn!(invocation = %id, error = %err, "failed to spawn operation");
            let settled = self.settle(id, &operation, Err(anyhow::Error::new(err)), policy);
            return Box::pin(future::ready(settled));
        }

        Box::pin(async move {
            rx.await.unwrap_or_else(|_| {
                Err(OperationError::transport(anyhow::anyhow!(
                    "operation task was dropped before settling"
                )))
            })
        })
    }

    fn settle(
        &self,
        id: InvocationId,
        operation: &TracerOperation,
        outcome: anyhow::Result<ExecutionResponse>,
        policy: SettlePolicy,
    ) -> Result<Option<ExecutionResponse>, OperationError> {
        match outcome {
            Ok(response) => {
                let error = OperationError::from_graphql(&response.errors, response.data.as_ref());
                let settled = match &error {
                    None => SettleOutcome::Data,
                    Some(_) => SettleOutcome::GraphqlErrors {
                        count: response.errors.len(),
                    },
                };
                trace!(invocation = %id, outcome = ?settled, "operation settled");
                self.shared.tracer.on_settle(id, operation, &settled);

                self.commit(id, operation, !policy.ignore_results, |snapshot| {
                    snapshot.loading = false;
                    snapshot.data = response.data.clone();
                    snapshot.error = error.clone();
                });

                match error {
                    None => {
                        if let Some(on_completed) = &policy.on_completed {
                            on_completed(response.data.as_ref());
                        }
                        Ok(Some(response))
                    }
                    Some(error) => match &policy.on_error {
                        Some(on_error) => {
                            on_error(&error);
                            Ok(Some(response))
                        }
                        None => Err(error),
                    },
                }
            }
            Err(source) => {
                let error = OperationError::transport(source);
                let settled = SettleOutcome::Transport {
                    message: error.to_string(),
                };
                debug!(invocation = %id, error = %error, "operation failed");
                self.shared.tracer.on_settle(id, operation, &settled);

                self.commit(id, operation, true, |snapshot| {
                    snapshot.loading = false;
                    snapshot.error = Some(error.clone());
                });

                match &policy.on_error {
                    Some(on_error) => {
                        on_error(&error);
                        Ok(None)
                    }
                    None => Err(error),
                }
            }
        }
    }

    /// Apply `update` if `id` is still the latest invocation, the consumer is
    /// attached and `commit_allowed` holds. Returns whether it was applied.
    fn commit(
        &self,
        id: InvocationId,
        operation: &TracerOperation,
        commit_allowed: bool,
        update: impl FnOnce(&mut ResultSnapshot),
    ) -> bool {
        let committed = {
            let mut state = self.shared.state.lock();
            let suppression = state.suppression(id, commit_allowed);
            if state.sequencer.is_latest(id) {
                state.latest = match suppression {
                    Some(Suppression::Inactive) => LatestStatus::Suppressed,
                    _ => LatestStatus::Committed,
                };
            }
            match suppression {
                Some(reason) => Err(reason),
                None => {
                    update(&mut state.snapshot);
                    Ok(state.snapshot.clone())
                }
            }
        };

        match committed {
            Ok(snapshot) => {
                trace!(invocation = %id, "committed");
                self.shared.tracer.on_commit(id, operation);
                self.shared.listeners.notify(&snapshot);
                true
            }
            Err(reason) => {
                debug!(invocation = %id, ?reason, "result suppressed");
                self.shared.tracer.on_suppressed(id, operation, reason);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, OperationKind};
    use async_trait::async_trait;
    use futures::executor::block_on;
    use futures::future::FutureObj;
    use futures::task::SpawnError;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Executor for Echo {
        async fn execute(&self, request: ExecutionRequest) -> anyhow::Result<ExecutionResponse> {
            Ok(ExecutionResponse::data(Value::Object(request.variables)))
        }
    }

    /// Holds spawned tasks until the test runs them, in any order.
    #[derive(Clone, Default)]
    struct TaskQueue {
        tasks: Arc<Mutex<Vec<Option<FutureObj<'static, ()>>>>>,
    }

    impl TaskQueue {
        fn run(&self, index: usize) {
            let task = self.tasks.lock()[index].take().unwrap();
            block_on(task);
        }
    }

    impl Spawn for TaskQueue {
        fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
            self.tasks.lock().push(Some(future));
            Ok(())
        }
    }

    struct ShutDown;

    impl Spawn for ShutDown {
        fn spawn_obj(&self, _future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
            Err(SpawnError::shutdown())
        }
    }

    fn controller(spawner: impl Spawn + Send + Sync + 'static) -> Controller {
        let document = Document::new("mutation echo { echo }");
        let context = ClientContext::new(Arc::new(Echo), spawner);
        Controller::new(
            context.client.clone(),
            &context,
            TracerOperation::new(OperationKind::Mutation, &document),
        )
    }

    fn request(n: i64) -> ExecutionRequest {
        ExecutionRequest::new(
            OperationKind::Mutation,
            Document::new("mutation echo { echo }"),
            json!({ "n": n }).as_object().cloned().unwrap(),
        )
    }

    fn dispatch(controller: &Controller, n: i64) -> Dispatch {
        controller.dispatch(
            LoadingTransition::ClearData,
            request(n),
            SettlePolicy::default(),
        )
    }

    #[test]
    fn test_loading_is_set_synchronously() {
        let controller = controller(TaskQueue::default());
        controller.activate();
        let _pending = dispatch(&controller, 1);
        let snapshot = controller.snapshot();
        assert!(snapshot.loading);
        assert!(snapshot.called);
        assert_eq!(controller.latest_status(), LatestStatus::Pending);
    }

    #[test]
    fn test_superseded_invocation_does_not_commit() {
        let queue = TaskQueue::default();
        let controller = controller(queue.clone());
        controller.activate();
        let first = dispatch(&controller, 1);
        let second = dispatch(&controller, 2);

        queue.run(1);
        block_on(second).unwrap();
        assert_eq!(controller.snapshot().data, Some(json!({ "n": 2 })));

        queue.run(0);
        let stale = block_on(first).unwrap().unwrap();
        assert_eq!(stale.data, Some(json!({ "n": 1 })));
        assert_eq!(controller.snapshot().data, Some(json!({ "n": 2 })));
    }

    #[test]
    fn test_inactive_settlement_is_marked_suppressed() {
        let queue = TaskQueue::default();
        let controller = controller(queue.clone());
        let pending =
            controller.dispatch(LoadingTransition::KeepData, request(1), SettlePolicy::default());
        queue.run(0);
        block_on(pending).unwrap();

        assert_eq!(controller.latest_status(), LatestStatus::Suppressed);
        assert!(controller.snapshot().loading);
    }

    #[test]
    fn test_dropped_handle_still_settles() {
        let queue = TaskQueue::default();
        let controller = controller(queue.clone());
        controller.activate();
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = completed.clone();
        let policy = SettlePolicy {
            on_completed: Some(Arc::new(move |data: Option<&Value>| {
                sink.lock().push(data.cloned())
            })),
            ..SettlePolicy::default()
        };

        drop(controller.dispatch(LoadingTransition::ClearData, request(7), policy));
        assert!(controller.snapshot().loading);

        queue.run(0);
        assert!(!controller.snapshot().loading);
        assert_eq!(controller.snapshot().data, Some(json!({ "n": 7 })));
        assert_eq!(*completed.lock(), vec![Some(json!({ "n": 7 }))]);
    }

    #[test]
    fn test_spawn_failure_settles_as_transport_error() {
        let controller = controller(ShutDown);
        controller.activate();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let policy = SettlePolicy {
            on_error: Some(Arc::new(move |err: &OperationError| {
                sink.lock().push(err.to_string())
            })),
            ..SettlePolicy::default()
        };

        let pending = controller.dispatch(LoadingTransition::ClearData, request(1), policy);
        assert!(block_on(pending).unwrap().is_none());

        let snapshot = controller.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.error.as_ref().unwrap().is_transport());
        assert_eq!(errors.lock().len(), 1);
    }
}
