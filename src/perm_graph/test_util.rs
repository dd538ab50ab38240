//! Utilities for testing
//!

use super::{PermGraph, ScopeId};

/// Create a chain of scopes, child first: each scope is declared a subset
/// of the next one.
pub(crate) fn scope_chain(graph: &mut PermGraph, names: &[&str]) -> Vec<ScopeId> {
    let scopes: Vec<_> = names.iter().map(|name| graph.create_scope(*name)).collect();
    for pair in scopes.windows(2) {
        graph
            .set_subset_of(pair[0], pair[1])
            .expect("fresh scopes can not form a cycle");
    }
    scopes
}
