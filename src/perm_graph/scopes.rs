//! Scope operations: the `SUBSET_OF` hierarchy and scope-hosted perm links.
//!

use indexmap::IndexSet;
use tracing::debug;

use crate::error::{AuthzError, Result};

use super::{
    AuthzNode, EdgeType, NodeId, PermGraph, PermId, ScopeAttributes, ScopeId, ScopeQualifier,
    ToNodeId,
};

fn subset_edge(e: &EdgeType) -> bool {
    matches!(e, EdgeType::SubsetOf)
}

impl PermGraph {
    /// Create a new scope.
    pub fn create_scope(&mut self, name: impl Into<String>) -> ScopeId {
        ScopeId(
            self.graph
                .create_node(AuthzNode::Scope(ScopeAttributes { name: name.into() })),
        )
    }

    /// The parent scope, if any.
    pub fn subset_of(&self, scope: ScopeId) -> Result<Option<ScopeId>> {
        self.scope_attrs(scope)?;
        Ok(self
            .graph
            .edges_out(scope.node_id())
            .into_iter()
            .find(|(e, _)| subset_edge(e))
            .map(|(_, parent)| ScopeId(parent)))
    }

    /// Declare `child ⊂ parent`, replacing any prior parent. The hierarchy
    /// must stay acyclic.
    pub fn set_subset_of(&mut self, child: ScopeId, parent: ScopeId) -> Result<()> {
        let child_name = self.scope_attrs(child)?.name.clone();
        let parent_name = self.scope_attrs(parent)?.name.clone();
        if child == parent
            || self
                .graph
                .reachable_from(parent.node_id(), subset_edge)
                .contains(&child.node_id())
        {
            return Err(AuthzError::CycleDetected {
                edge: "SUBSET_OF",
                from: child_name,
                to: parent_name,
            });
        }
        self.graph
            .remove_edges(Some(child.node_id()), None, subset_edge);
        self.graph
            .add_edge(child.node_id(), EdgeType::SubsetOf, parent.node_id());
        debug!(child = %child_name, parent = %parent_name, "scope subset declared");
        Ok(())
    }

    /// Detach the scope from its parent.
    pub fn clear_subset_of(&mut self, scope: ScopeId) -> Result<()> {
        self.scope_attrs(scope)?;
        self.graph
            .remove_edges(Some(scope.node_id()), None, subset_edge);
        Ok(())
    }

    /// The node ids accepted when resolving within `scope`: the scope itself
    /// plus every ancestor reached by climbing `SUBSET_OF`.
    pub(crate) fn scope_set(&self, scope: ScopeId) -> IndexSet<NodeId> {
        let mut set = IndexSet::from([scope.node_id()]);
        set.extend(self.graph.reachable_from(scope.node_id(), subset_edge));
        set
    }

    /// Whether `node`'s scope attachment chain reaches `scope`, i.e. the
    /// node exists in that scope. A node without an attachment reaches
    /// nothing.
    pub(crate) fn reaches_scope(&self, node: NodeId, scope: ScopeId) -> bool {
        match self.attached_scope(node) {
            Some(local) => {
                local == scope
                    || self
                        .graph
                        .reachable_from(local.node_id(), subset_edge)
                        .contains(&scope.node_id())
            }
            None => false,
        }
    }

    /// Inject a perm into the scope: every query resolved within the scope
    /// (or one of its descendants) will see an `ALLOW` path through it.
    pub fn scope_link_perm(&mut self, scope: ScopeId, perm: PermId) -> Result<()> {
        self.scope_attrs(scope)?;
        self.perm_attrs(perm)?;
        self.scope_reset_perm(scope, perm)?;
        self.graph.add_edge(
            scope.node_id(),
            EdgeType::Allow(ScopeQualifier::Any),
            perm.node_id(),
        );
        Ok(())
    }

    /// Remove the scope's link to `perm`.
    pub fn scope_reset_perm(&mut self, scope: ScopeId, perm: PermId) -> Result<()> {
        self.scope_attrs(scope)?;
        self.perm_attrs(perm)?;
        self.graph.remove_edges(
            Some(scope.node_id()),
            Some(perm.node_id()),
            EdgeType::is_polarized,
        );
        Ok(())
    }

    /// Remove every perm link hosted by the scope.
    pub fn scope_reset_all_perms(&mut self, scope: ScopeId) -> Result<()> {
        self.scope_attrs(scope)?;
        self.graph
            .remove_edges(Some(scope.node_id()), None, EdgeType::is_polarized);
        Ok(())
    }

    /// Perms linked from the scope, with their polarity (always allow).
    pub fn scope_linked_perms(&self, scope: ScopeId) -> Result<Vec<(PermId, bool)>> {
        self.scope_attrs(scope)?;
        Ok(self
            .graph
            .edges_out(scope.node_id())
            .into_iter()
            .filter(|(e, _)| e.is_polarized())
            .map(|(e, p)| (PermId(p), matches!(e, EdgeType::Allow(_))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::perm_graph::test_util::scope_chain;

    #[test]
    fn subset_cycle_is_rejected() {
        let mut g = PermGraph::new();
        let scopes = scope_chain(&mut g, &["server", "modpack", "realm"]);

        let err = g.set_subset_of(scopes[2], scopes[0]).unwrap_err();
        assert!(matches!(err, AuthzError::CycleDetected { .. }));

        let err = g.set_subset_of(scopes[0], scopes[0]).unwrap_err();
        assert!(matches!(err, AuthzError::CycleDetected { .. }));
    }

    #[test]
    fn set_subset_of_replaces_prior_parent() {
        let mut g = PermGraph::new();
        let a = g.create_scope("a");
        let b = g.create_scope("b");
        let c = g.create_scope("c");

        g.set_subset_of(a, b).unwrap();
        g.set_subset_of(a, c).unwrap();
        assert_eq!(g.subset_of(a).unwrap(), Some(c));
    }

    #[test]
    fn scope_set_climbs_upward_only() {
        let mut g = PermGraph::new();
        let scopes = scope_chain(&mut g, &["server", "modpack", "realm"]);
        let stray = g.create_scope("stray");

        let set = g.scope_set(scopes[1]);
        assert!(set.contains(&scopes[1].node_id()));
        assert!(set.contains(&scopes[2].node_id()));
        // descendants and unrelated scopes stay out
        assert!(!set.contains(&scopes[0].node_id()));
        assert!(!set.contains(&stray.node_id()));
    }

    #[test]
    fn reaches_scope_walks_the_chain() {
        let mut g = PermGraph::new();
        let scopes = scope_chain(&mut g, &["server", "modpack"]);
        let p = g.create_perm("fly");
        g.set_scope(p, scopes[0]).unwrap();

        assert!(g.reaches_scope(p.node_id(), scopes[0]));
        assert!(g.reaches_scope(p.node_id(), scopes[1]));

        let elsewhere = g.create_scope("elsewhere");
        assert!(!g.reaches_scope(p.node_id(), elsewhere));
    }
}
