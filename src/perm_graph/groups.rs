//! Group operations: inheritance, the global-group election and group-level
//! perm links.
//!

use tracing::debug;

use crate::error::{AuthzError, Result};

use super::{
    AuthzNode, EdgeType, GroupAttributes, GroupId, PermGraph, PermId, ScopeQualifier, ToNodeId,
};

fn inherits_edge(e: &EdgeType) -> bool {
    matches!(e, EdgeType::Inherits)
}

impl PermGraph {
    /// Create a new (non-global) group.
    pub fn create_group(&mut self, name: impl Into<String>) -> GroupId {
        GroupId(
            self.graph
                .create_node(AuthzNode::Group(GroupAttributes::new(name))),
        )
    }

    /// The group this group inherits from, if any.
    pub fn inherits_of(&self, group: GroupId) -> Result<Option<GroupId>> {
        self.group_attrs(group)?;
        Ok(self
            .graph
            .edges_out(group.node_id())
            .into_iter()
            .find(|(e, _)| inherits_edge(e))
            .map(|(_, parent)| GroupId(parent)))
    }

    /// Make `group` inherit the linked perms of `parent`, replacing any
    /// prior inheritance. The inheritance chain must stay acyclic.
    pub fn set_inherits(&mut self, group: GroupId, parent: GroupId) -> Result<()> {
        let group_name = self.group_attrs(group)?.name.clone();
        let parent_name = self.group_attrs(parent)?.name.clone();
        if group == parent
            || self
                .graph
                .reachable_from(parent.node_id(), inherits_edge)
                .contains(&group.node_id())
        {
            return Err(AuthzError::CycleDetected {
                edge: "INHERITS",
                from: group_name,
                to: parent_name,
            });
        }
        self.graph
            .remove_edges(Some(group.node_id()), None, inherits_edge);
        self.graph
            .add_edge(group.node_id(), EdgeType::Inherits, parent.node_id());
        Ok(())
    }

    /// Drop the group's inheritance.
    pub fn clear_inherits(&mut self, group: GroupId) -> Result<()> {
        self.group_attrs(group)?;
        self.graph
            .remove_edges(Some(group.node_id()), None, inherits_edge);
        Ok(())
    }

    /// The current global group, if one has been elected.
    pub fn global_group(&self) -> Option<GroupId> {
        self.graph
            .find_one(|n| matches!(n, AuthzNode::Group(a) if a.is_global))
            .map(GroupId)
    }

    /// The global group, lazily creating one named `*` when absent.
    pub fn ensure_global_group(&mut self) -> Result<GroupId> {
        match self.global_group() {
            Some(g) => Ok(g),
            None => {
                let g = self.create_group("*");
                self.make_global(g, true)?;
                Ok(g)
            }
        }
    }

    /// Elect `group` as the global group. Every existing entity acquires an
    /// automatic membership, and every entity saved later will too. When a
    /// different global group exists the election fails unless `force` is
    /// set, in which case the incumbent is demoted first.
    pub fn make_global(&mut self, group: GroupId, force: bool) -> Result<()> {
        if self.group_attrs(group)?.is_global {
            return Ok(());
        }
        if let Some(existing) = self.global_group() {
            if !force {
                return Err(AuthzError::GlobalGroupConflict {
                    group: self.group_attrs(group)?.name.clone(),
                    existing: self.group_attrs(existing)?.name.clone(),
                });
            }
            self.make_optional(existing)?;
        }
        self.group_attrs_mut(group)?.is_global = true;
        debug!(group = %self.group_attrs(group)?.name, "elected global group");
        let entities = self
            .graph
            .nodes_matching(|n| matches!(n, AuthzNode::Entity(_)));
        for e in entities {
            if !self
                .graph
                .has_edge(e, group.node_id(), |e| matches!(e, EdgeType::IsInAuto))
            {
                self.graph.add_edge(e, EdgeType::IsInAuto, group.node_id());
            }
        }
        Ok(())
    }

    /// Demote the group to an ordinary one, deleting its automatic
    /// memberships. A no-op when the group is not global.
    pub fn make_optional(&mut self, group: GroupId) -> Result<()> {
        if !self.group_attrs(group)?.is_global {
            return Ok(());
        }
        self.group_attrs_mut(group)?.is_global = false;
        self.graph
            .remove_edges(None, Some(group.node_id()), |e| {
                matches!(e, EdgeType::IsInAuto)
            });
        Ok(())
    }

    /// Link a perm to the group. Group links carry no scope qualifier; any
    /// prior polarized link to the same perm is replaced.
    pub fn group_link_perm(&mut self, group: GroupId, perm: PermId, allow: bool) -> Result<()> {
        self.group_attrs(group)?;
        self.perm_attrs(perm)?;
        self.graph.remove_edges(
            Some(group.node_id()),
            Some(perm.node_id()),
            EdgeType::is_polarized,
        );
        let edge = if allow {
            EdgeType::Allow(ScopeQualifier::Any)
        } else {
            EdgeType::Deny(ScopeQualifier::Any)
        };
        self.graph.add_edge(group.node_id(), edge, perm.node_id());
        Ok(())
    }

    /// Remove the group's polarized link to `perm`.
    pub fn group_reset_perm(&mut self, group: GroupId, perm: PermId) -> Result<()> {
        self.group_attrs(group)?;
        self.perm_attrs(perm)?;
        self.graph.remove_edges(
            Some(group.node_id()),
            Some(perm.node_id()),
            EdgeType::is_polarized,
        );
        Ok(())
    }

    /// Remove every polarized link of the group.
    pub fn group_reset_all_perms(&mut self, group: GroupId) -> Result<()> {
        self.group_attrs(group)?;
        self.graph
            .remove_edges(Some(group.node_id()), None, EdgeType::is_polarized);
        Ok(())
    }

    /// Reset all prior links, then attach a polarized link to every existing
    /// perm.
    pub fn group_link_all_perms(&mut self, group: GroupId, allow: bool) -> Result<()> {
        self.group_reset_all_perms(group)?;
        let edge = if allow {
            EdgeType::Allow(ScopeQualifier::Any)
        } else {
            EdgeType::Deny(ScopeQualifier::Any)
        };
        let perms = self
            .graph
            .nodes_matching(|n| matches!(n, AuthzNode::Perm(_)));
        for p in perms {
            self.graph.add_edge(group.node_id(), edge, p);
        }
        Ok(())
    }

    /// Perms linked from the group, with their polarity (`true` = allow).
    pub fn group_linked_perms(&self, group: GroupId) -> Result<Vec<(PermId, bool)>> {
        self.group_attrs(group)?;
        Ok(self
            .graph
            .edges_out(group.node_id())
            .into_iter()
            .filter(|(e, _)| e.is_polarized())
            .map(|(e, p)| (PermId(p), matches!(e, EdgeType::Allow(_))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::perm_graph::NodeId;

    fn auto_edges_to(g: &PermGraph, group: GroupId) -> Vec<NodeId> {
        let mut sources: Vec<_> = g
            .store()
            .edges_in(group.node_id())
            .into_iter()
            .filter(|(e, _)| matches!(e, EdgeType::IsInAuto))
            .map(|(_, e)| e)
            .collect();
        sources.sort();
        sources
    }

    #[test]
    fn only_one_group_is_global() {
        let mut g = PermGraph::new();
        let users = g.create_group("Users");
        let staff = g.create_group("Staff");

        g.make_global(users, false).unwrap();
        assert_eq!(g.global_group(), Some(users));

        let err = g.make_global(staff, false).unwrap_err();
        assert!(matches!(err, AuthzError::GlobalGroupConflict { .. }));
        assert_eq!(g.global_group(), Some(users));

        g.make_global(staff, true).unwrap();
        assert_eq!(g.global_group(), Some(staff));
        assert!(!g.group_attrs(users).unwrap().is_global());
    }

    #[test]
    fn election_moves_auto_memberships() {
        let mut g = PermGraph::new();
        let adam = g.create_entity("adam");
        let eve = g.create_entity("eve");
        let users = g.create_group("Users");
        let staff = g.create_group("Staff");

        g.make_global(users, false).unwrap();
        assert_eq!(
            auto_edges_to(&g, users),
            vec![adam.node_id(), eve.node_id()]
        );

        g.make_global(staff, true).unwrap();
        assert!(auto_edges_to(&g, users).is_empty());
        assert_eq!(
            auto_edges_to(&g, staff),
            vec![adam.node_id(), eve.node_id()]
        );
    }

    #[test]
    fn make_optional_clears_flag_and_edges() {
        let mut g = PermGraph::new();
        g.create_entity("adam");
        let users = g.create_group("Users");
        g.make_global(users, false).unwrap();

        g.make_optional(users).unwrap();
        assert!(!g.group_attrs(users).unwrap().is_global());
        assert!(auto_edges_to(&g, users).is_empty());
        assert_eq!(g.global_group(), None);
    }

    #[test]
    fn ensure_global_group_creates_star_once() {
        let mut g = PermGraph::new();
        let star = g.ensure_global_group().unwrap();
        assert_eq!(g.group_attrs(star).unwrap().name, "*");
        assert_eq!(g.ensure_global_group().unwrap(), star);
    }

    #[test]
    fn inherits_cycle_is_rejected() {
        let mut g = PermGraph::new();
        let a = g.create_group("a");
        let b = g.create_group("b");
        let c = g.create_group("c");
        g.set_inherits(b, a).unwrap();
        g.set_inherits(c, b).unwrap();

        let err = g.set_inherits(a, c).unwrap_err();
        assert!(matches!(err, AuthzError::CycleDetected { .. }));
        assert_eq!(g.inherits_of(a).unwrap(), None);
    }

    #[test]
    fn group_link_perm_replaces_polarity() {
        let mut g = PermGraph::new();
        let editors = g.create_group("Editors");
        let update = g.create_perm("update");

        g.group_link_perm(editors, update, true).unwrap();
        g.group_link_perm(editors, update, false).unwrap();
        assert_eq!(
            g.group_linked_perms(editors).unwrap(),
            vec![(update, false)]
        );
    }

    #[test]
    fn group_link_all_perms_covers_every_perm() {
        let mut g = PermGraph::new();
        let admins = g.create_group("Admins");
        let select = g.create_perm("select");
        let update = g.create_perm("update");
        g.group_link_perm(admins, select, false).unwrap();

        g.group_link_all_perms(admins, true).unwrap();
        let mut linked = g.group_linked_perms(admins).unwrap();
        linked.sort();
        assert_eq!(linked, vec![(select, true), (update, true)]);
    }
}
