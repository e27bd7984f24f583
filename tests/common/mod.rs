//! Shared executors and recorders for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::future::FutureObj;
use futures::task::{Spawn, SpawnError};
use parking_lot::Mutex;
use serde_json::Value;

use operation_flow::{
    ClientContext, ExecutionRequest, ExecutionResponse, Executor, InvocationId, OperationError,
    Suppression, Tracer, TracerOperation, Variables,
};

pub const CREATE_TODO: &str =
    "mutation createTodo($text: String!) { createTodo(text: $text) { id text completed } }";
pub const ALL_PEOPLE: &str =
    "query people($first: Int) { allPeople(first: $first) { people { name } } }";
pub const ON_TODO: &str = "subscription onTodo { todoAdded { id } }";

pub fn vars(value: Value) -> Variables {
    value.as_object().cloned().expect("variables must be an object")
}

// ============================================================================
// Runtime
// ============================================================================

/// Spawns invocations on the test's tokio runtime.
pub struct TokioSpawner;

impl Spawn for TokioSpawner {
    fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
        tokio::spawn(future);
        Ok(())
    }
}

pub fn client_context(client: Arc<dyn Executor>) -> ClientContext {
    ClientContext::new(client, TokioSpawner)
}

/// Yield to spawned tasks until `done` holds.
pub async fn until(mut done: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached after yielding to spawned tasks");
}

// ============================================================================
// Executors
// ============================================================================

/// Answers requests from a queue of canned results, in call order.
#[derive(Default)]
pub struct MockExecutor {
    results: Mutex<VecDeque<anyhow::Result<ExecutionResponse>>>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl MockExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: anyhow::Result<ExecutionResponse>) {
        self.results.lock().push_back(result);
    }

    pub fn push_data(&self, data: Value) {
        self.push(Ok(ExecutionResponse::data(data)));
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, request: ExecutionRequest) -> anyhow::Result<ExecutionResponse> {
        self.requests.lock().push(request);
        let next = self.results.lock().pop_front();
        next.unwrap_or_else(|| Err(anyhow::anyhow!("no mocked response")))
    }
}

type Reply = anyhow::Result<ExecutionResponse>;

#[derive(Default)]
struct Channel {
    tx: Option<oneshot::Sender<Reply>>,
    rx: Option<oneshot::Receiver<Reply>>,
}

/// Holds every request until the test answers it by call index.
///
/// A reply may be given before the request arrives; it is delivered when it
/// does.
#[derive(Default)]
pub struct DeferredExecutor {
    channels: Mutex<Vec<Channel>>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl DeferredExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_channel<R>(&self, index: usize, f: impl FnOnce(&mut Channel) -> R) -> R {
        let mut channels = self.channels.lock();
        while channels.len() <= index {
            let (tx, rx) = oneshot::channel();
            channels.push(Channel {
                tx: Some(tx),
                rx: Some(rx),
            });
        }
        f(&mut channels[index])
    }

    pub fn respond(&self, index: usize, result: Reply) {
        let responder = self
            .with_channel(index, |channel| channel.tx.take())
            .expect("request already answered");
        let _ = responder.send(result);
    }

    pub fn respond_data(&self, index: usize, data: Value) {
        self.respond(index, Ok(ExecutionResponse::data(data)));
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Wait until `count` requests have reached the executor.
    pub async fn wait_for_calls(&self, count: usize) {
        until(|| self.calls() >= count).await;
    }
}

#[async_trait]
impl Executor for DeferredExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Reply {
        let index = {
            let mut requests = self.requests.lock();
            requests.push(request);
            requests.len() - 1
        };
        let reply = self
            .with_channel(index, |channel| channel.rx.take())
            .expect("request index reused");
        reply
            .await
            .unwrap_or_else(|_| Err(anyhow::anyhow!("request abandoned")))
    }
}

// ============================================================================
// Recorders
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    Completed(Option<Value>),
    Error(String),
}

/// Records callback invocations in the order they happen.
#[derive(Clone, Default)]
pub struct Callbacks {
    events: Arc<Mutex<Vec<Callback>>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_completed(&self) -> impl Fn(Option<&Value>) + Send + Sync + 'static {
        let events = self.events.clone();
        move |data| events.lock().push(Callback::Completed(data.cloned()))
    }

    pub fn on_error(&self) -> impl Fn(&OperationError) + Send + Sync + 'static {
        let events = self.events.clone();
        move |err| events.lock().push(Callback::Error(err.to_string()))
    }

    pub fn events(&self) -> Vec<Callback> {
        self.events.lock().clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Start(InvocationId),
    Commit(InvocationId),
    Suppressed(InvocationId, Suppression),
}

/// Tracer collecting start, commit and suppression events.
#[derive(Clone, Default)]
pub struct EventCollector {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl EventCollector {
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }
}

impl Tracer for EventCollector {
    fn on_invocation_start(&self, id: InvocationId, _operation: &TracerOperation) {
        self.events.lock().push(TraceEvent::Start(id));
    }

    fn on_commit(&self, id: InvocationId, _operation: &TracerOperation) {
        self.events.lock().push(TraceEvent::Commit(id));
    }

    fn on_suppressed(&self, id: InvocationId, _operation: &TracerOperation, reason: Suppression) {
        self.events.lock().push(TraceEvent::Suppressed(id, reason));
    }
}
