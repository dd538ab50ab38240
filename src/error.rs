//! Error kinds surfaced by the engine.
//!

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = AuthzError> = std::result::Result<T, E>;

/// Everything that can go wrong while mutating or querying the graph.
///
/// Mutators are fail-fast: a returned error means no partial edges were
/// written. Resolver queries never produce an error for "no result".
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A scoped perm or ability was used outside a covering scope.
    #[error("{label} {name} only works in scope {scope}")]
    ScopeMismatch {
        /// Label of the scoped node.
        label: &'static str,
        /// Name of the scoped node.
        name: String,
        /// Name of the scope the node is attached to.
        scope: String,
    },

    /// An activation was requested for a perm the ability does not support.
    #[error("perm {perm} is not supported by ability {ability}")]
    UnsupportedPerm {
        /// Name of the ability.
        ability: String,
        /// Name of the unsupported perm.
        perm: String,
    },

    /// A global-group election collided with the current global group.
    #[error("can not make group {group} global: {existing} is already global")]
    GlobalGroupConflict {
        /// Name of the group that was to be elected.
        group: String,
        /// Name of the group currently holding the global flag.
        existing: String,
    },

    /// The requested edge would close an `INHERITS` or `SUBSET_OF` cycle.
    #[error("{edge} edge from {from} to {to} would create a cycle")]
    CycleDetected {
        /// The edge type that was being set.
        edge: &'static str,
        /// Name of the node the edge would start from.
        from: String,
        /// Name of the node the edge would point to.
        to: String,
    },

    /// A lookup or mutation referenced a node that does not exist.
    #[error("no {label} node with id {id}")]
    NotFound {
        /// Expected node label.
        label: &'static str,
        /// The id that failed to resolve.
        id: u64,
    },

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
