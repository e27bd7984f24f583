//! Merging operation defaults with per-call overrides.
//!
//! Every function here is pure: inputs are borrowed and never modified.

use tracing::trace;

use crate::document::OperationKind;
use crate::mutation::{MutationOptions, MutationOverrides};
use crate::query::QueryOptions;
use crate::registry::OperationRegistry;
use crate::request::{ExecutionRequest, RefetchTarget, SideEffectHooks, Variables};

/// Shallow-merge `overrides` over `base`. Override keys win.
pub fn merge_variables(base: Option<&Variables>, overrides: Option<&Variables>) -> Variables {
    let mut merged = base.cloned().unwrap_or_default();
    if let Some(overrides) = overrides {
        for (name, value) in overrides {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

/// Resolve named refetch targets against `registry`.
///
/// Names with no registered operation are passed through as names; the
/// executor may still know how to refetch them. Explicit operations and
/// providers are passed through as they are.
pub fn resolve_refetch_targets(
    targets: &[RefetchTarget],
    registry: &OperationRegistry,
) -> Vec<RefetchTarget> {
    targets
        .iter()
        .map(|target| match target {
            RefetchTarget::Named(name) => match registry.lookup(name) {
                Some(operation) => RefetchTarget::Operation(operation),
                None => {
                    trace!(name = %name, "refetch target not registered, passing name through");
                    target.clone()
                }
            },
            RefetchTarget::Operation(_) | RefetchTarget::Provider(_) => target.clone(),
        })
        .collect()
}

/// Build the effective request for one mutation invocation.
///
/// A present override replaces the base value; refetch lists are replaced
/// whole, never merged. Variables are the one exception and merge key by key.
pub fn resolve_mutation(
    base: &MutationOptions,
    overrides: &MutationOverrides,
    registry: &OperationRegistry,
) -> ExecutionRequest {
    let refetch_queries = overrides
        .refetch_queries
        .as_deref()
        .unwrap_or(&base.refetch_queries);

    ExecutionRequest {
        kind: OperationKind::Mutation,
        document: base.document.clone(),
        variables: merge_variables(base.variables.as_ref(), overrides.variables.as_ref()),
        context: overrides
            .context
            .as_ref()
            .or(base.context.as_ref())
            .cloned()
            .unwrap_or_default(),
        hooks: SideEffectHooks {
            optimistic_response: overrides
                .optimistic_response
                .as_ref()
                .or(base.optimistic_response.as_ref())
                .cloned(),
            update: overrides.update.as_ref().or(base.update.as_ref()).cloned(),
            refetch_queries: resolve_refetch_targets(refetch_queries, registry),
            await_refetch_queries: overrides
                .await_refetch_queries
                .unwrap_or(base.await_refetch_queries),
        },
        fetch_policy: None,
        poll_interval: None,
    }
}

/// Build the effective request for one query invocation, optionally with
/// refetch variables merged over the configured ones.
pub fn resolve_query(base: &QueryOptions, variables: Option<&Variables>) -> ExecutionRequest {
    ExecutionRequest {
        kind: OperationKind::Query,
        document: base.document.clone(),
        variables: merge_variables(base.variables.as_ref(), variables),
        context: base.context.clone().unwrap_or_default(),
        hooks: SideEffectHooks::default(),
        fetch_policy: base.fetch_policy,
        poll_interval: base.poll_interval,
    }
}
