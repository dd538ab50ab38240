//! Perm nodes and the `EXISTS_IN` scope attachment shared by perms, groups
//! and abilities.
//!

use crate::error::{AuthzError, Result};

use super::{AuthzNode, EdgeType, NodeId, PermAttributes, PermGraph, PermId, ScopeId, ToNodeId};

fn exists_in(e: &EdgeType) -> bool {
    matches!(e, EdgeType::ExistsIn)
}

impl PermGraph {
    /// Create a new perm.
    pub fn create_perm(&mut self, name: impl Into<String>) -> PermId {
        PermId(
            self.graph
                .create_node(AuthzNode::Perm(PermAttributes { name: name.into() })),
        )
    }

    /// Attach a perm, group or ability to a scope, replacing any prior
    /// attachment.
    pub fn set_scope(&mut self, node: impl ToNodeId, scope: ScopeId) -> Result<()> {
        let id = node.node_id();
        self.scope_attrs(scope)?;
        match self.graph.node(id) {
            Some(AuthzNode::Perm(_) | AuthzNode::Group(_) | AuthzNode::Ability(_)) => {}
            Some(n) => {
                return Err(AuthzError::Store(anyhow::anyhow!(
                    "{} nodes can not be scoped",
                    n.label()
                )))
            }
            None => {
                return Err(AuthzError::NotFound {
                    label: "node",
                    id: id.0,
                })
            }
        }
        self.graph.remove_edges(Some(id), None, exists_in);
        self.graph.add_edge(id, EdgeType::ExistsIn, scope.node_id());
        Ok(())
    }

    /// Detach the node from its scope.
    pub fn clear_scope(&mut self, node: impl ToNodeId) -> Result<()> {
        let id = node.node_id();
        if self.graph.node(id).is_none() {
            return Err(AuthzError::NotFound {
                label: "node",
                id: id.0,
            });
        }
        self.graph.remove_edges(Some(id), None, exists_in);
        Ok(())
    }

    /// The scope the node is attached to, if any.
    pub fn scope_of(&self, node: impl ToNodeId) -> Result<Option<ScopeId>> {
        let id = node.node_id();
        if self.graph.node(id).is_none() {
            return Err(AuthzError::NotFound {
                label: "node",
                id: id.0,
            });
        }
        Ok(self.attached_scope(id))
    }

    pub(crate) fn attached_scope(&self, node: NodeId) -> Option<ScopeId> {
        self.graph
            .edges_out(node)
            .into_iter()
            .find(|(e, _)| exists_in(e))
            .map(|(_, s)| ScopeId(s))
    }

    /// Check that a scoped object may be used within `scope`: fine when the
    /// object has no scope attachment; otherwise the query scope must equal
    /// the attached scope or be one of its subsets.
    pub fn is_scope_supported(&self, node: impl ToNodeId, scope: Option<ScopeId>) -> Result<()> {
        let id = node.node_id();
        let local = match self.attached_scope(id) {
            None => return Ok(()),
            Some(local) => local,
        };
        if let Some(s) = scope {
            if s == local
                || self
                    .graph
                    .reachable_from(s.node_id(), |e| matches!(e, EdgeType::SubsetOf))
                    .contains(&local.node_id())
            {
                return Ok(());
            }
        }
        let (label, name) = match self.graph.node(id) {
            Some(n) => (n.label(), n.name().unwrap_or_default().to_owned()),
            None => ("node", id.to_string()),
        };
        Err(AuthzError::ScopeMismatch {
            label,
            name,
            scope: self
                .scope_attrs(local)
                .map(|a| a.name.clone())
                .unwrap_or_else(|_| local.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::perm_graph::test_util::scope_chain;

    #[test]
    fn unscoped_perm_supports_any_scope() {
        let mut g = PermGraph::new();
        let p = g.create_perm("select");
        let s = g.create_scope("server");

        assert!(g.is_scope_supported(p, None).is_ok());
        assert!(g.is_scope_supported(p, Some(s)).is_ok());
    }

    #[test]
    fn scoped_perm_requires_covered_query_scope() {
        let mut g = PermGraph::new();
        let scopes = scope_chain(&mut g, &["server", "modpack", "realm"]);
        let off_scope = g.create_scope("off_scope");
        let p = g.create_perm("fly");
        g.set_scope(p, scopes[1]).unwrap();

        // its own scope and descendants are fine, the full chain included
        assert!(g.is_scope_supported(p, Some(scopes[1])).is_ok());
        assert!(g.is_scope_supported(p, Some(scopes[0])).is_ok());

        // ancestors, strangers and "no scope at all" are not
        assert!(matches!(
            g.is_scope_supported(p, Some(scopes[2])),
            Err(AuthzError::ScopeMismatch { .. })
        ));
        assert!(matches!(
            g.is_scope_supported(p, Some(off_scope)),
            Err(AuthzError::ScopeMismatch { .. })
        ));
        assert!(matches!(
            g.is_scope_supported(p, None),
            Err(AuthzError::ScopeMismatch { .. })
        ));
    }

    #[test]
    fn set_scope_replaces_prior_attachment() {
        let mut g = PermGraph::new();
        let p = g.create_perm("fly");
        let a = g.create_scope("a");
        let b = g.create_scope("b");

        g.set_scope(p, a).unwrap();
        g.set_scope(p, b).unwrap();
        assert_eq!(g.scope_of(p).unwrap(), Some(b));

        g.clear_scope(p).unwrap();
        assert_eq!(g.scope_of(p).unwrap(), None);
    }

    #[test]
    fn entities_can_not_be_scoped() {
        let mut g = PermGraph::new();
        let e = g.create_entity("someone");
        let s = g.create_scope("server");
        assert!(g.set_scope(e, s).is_err());
    }
}
