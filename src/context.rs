//! The provider every controller is constructed from.

use std::fmt;
use std::sync::Arc;

use futures::task::Spawn;

use crate::document::{Classifier, KeywordClassifier};
use crate::registry::OperationRegistry;
use crate::request::Executor;
use crate::tracer::{NoopTracer, Tracer};

/// Collaborators shared by all controllers under one provider: the client,
/// the spawner invocations run on, the document classifier, the refetch
/// registry and the tracer.
///
/// This is cheap to clone - all data is behind `Arc`.
///
/// # Example
///
/// ```ignore
/// let pool = futures::executor::ThreadPool::new()?;
/// let context = ClientContext::new(Arc::new(MyExecutor::default()), pool)
///     .with_classifier(MyParser::default())
///     .with_tracer(MyTracer);
///
/// let mutation = MutationController::new(options, &context)?;
/// ```
#[derive(Clone)]
pub struct ClientContext {
    pub(crate) client: Arc<dyn Executor>,
    pub(crate) spawner: Arc<dyn Spawn + Send + Sync>,
    pub(crate) classifier: Arc<dyn Classifier>,
    pub(crate) registry: Arc<OperationRegistry>,
    pub(crate) tracer: Arc<dyn Tracer>,
}

impl ClientContext {
    /// Create a context around `client`, with a [`KeywordClassifier`], an
    /// empty registry and a [`NoopTracer`].
    ///
    /// Every invocation is spawned on `spawner` as soon as it is issued, so it
    /// settles whether or not its dispatch handle is awaited.
    pub fn new(client: Arc<dyn Executor>, spawner: impl Spawn + Send + Sync + 'static) -> Self {
        Self {
            client,
            spawner: Arc::new(spawner),
            classifier: Arc::new(KeywordClassifier),
            registry: Arc::new(OperationRegistry::new()),
            tracer: Arc::new(NoopTracer),
        }
    }

    /// Use a different document classifier.
    pub fn with_classifier(mut self, classifier: impl Classifier) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Share an existing registry, e.g. with another provider bound to the
    /// same client.
    pub fn with_registry(mut self, registry: Arc<OperationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Observe controllers created from this context.
    pub fn with_tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Arc::new(tracer);
        self
    }

    /// The client controllers dispatch to unless their options override it.
    pub fn client(&self) -> &Arc<dyn Executor> {
        &self.client
    }

    /// The refetch registry.
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
