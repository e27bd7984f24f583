//! Request documents and operation-kind classification.

use std::fmt;
use std::sync::Arc;

use graphql_parser::query::{parse_query, Definition, OperationDefinition};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::WrongOperationKind;

/// The kind of operation a document defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// A read operation.
    Query,
    /// A write operation.
    Mutation,
    /// A long-lived push operation.
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        })
    }
}

/// A GraphQL request document.
///
/// Cheap to clone. Two documents are equal when their source text is equal.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    source: Arc<str>,
}

impl Document {
    /// Create a document from its source text.
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Return the source text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Name of the first operation defined in the document, if it has one.
    ///
    /// Fragment definitions are skipped. Anonymous operations, the `{ ... }`
    /// shorthand and documents that do not parse have no name.
    pub fn operation_name(&self) -> Option<&str> {
        match first_operation(&self.source)? {
            OperationDefinition::Query(query) => query.name,
            OperationDefinition::Mutation(mutation) => mutation.name,
            OperationDefinition::Subscription(subscription) => subscription.name,
            OperationDefinition::SelectionSet(_) => None,
        }
    }
}

/// Parse `source` and return its first operation definition.
fn first_operation(source: &str) -> Option<OperationDefinition<'_, &str>> {
    let document = match parse_query::<&str>(source) {
        Ok(document) => document,
        Err(err) => {
            trace!(error = %err, "document does not parse");
            return None;
        }
    };
    document
        .definitions
        .into_iter()
        .find_map(|definition| match definition {
            Definition::Operation(operation) => Some(operation),
            Definition::Fragment(_) => None,
        })
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operation_name() {
            Some(name) => write!(f, "Document({name})"),
            None => write!(f, "Document({:?})", self.source),
        }
    }
}

impl From<&str> for Document {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for Document {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

/// Classifies a document by operation kind.
///
/// [`KeywordClassifier`] only parses; implement this trait to plug in a
/// classifier that also validates against a schema.
pub trait Classifier: Send + Sync + 'static {
    /// Return the kind of the operation defined by `document`.
    fn classify(&self, document: &Document) -> OperationKind;
}

impl<F> Classifier for F
where
    F: Fn(&Document) -> OperationKind + Send + Sync + 'static,
{
    fn classify(&self, document: &Document) -> OperationKind {
        self(document)
    }
}

/// Classifier that parses the document and reads its first operation.
///
/// Fragment definitions are skipped. The `{ ... }` shorthand is a query, and
/// so is a document that does not parse: validation belongs to the executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl Classifier for KeywordClassifier {
    fn classify(&self, document: &Document) -> OperationKind {
        match first_operation(document.as_str()) {
            Some(OperationDefinition::Mutation(_)) => OperationKind::Mutation,
            Some(OperationDefinition::Subscription(_)) => OperationKind::Subscription,
            Some(OperationDefinition::Query(_) | OperationDefinition::SelectionSet(_)) | None => {
                OperationKind::Query
            }
        }
    }
}

/// Fail with [`WrongOperationKind`] unless `document` classifies as `expected`.
pub fn assert_kind(
    classifier: &dyn Classifier,
    document: &Document,
    expected: OperationKind,
) -> Result<(), WrongOperationKind> {
    let actual = classifier.classify(document);
    if actual == expected {
        Ok(())
    } else {
        Err(WrongOperationKind { expected, actual })
    }
}
