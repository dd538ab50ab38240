//! Entity operations: group membership, auto-membership upkeep and
//! entity-level perm links.
//!

use indexmap::IndexSet;
use tracing::debug;

use crate::error::Result;

use super::{
    AuthzNode, EdgeType, EntityAttributes, EntityId, GroupId, PermGraph, PermId, ScopeId,
    ScopeQualifier, ToNodeId,
};

fn is_in(e: &EdgeType) -> bool {
    matches!(e, EdgeType::IsIn)
}

fn is_in_auto(e: &EdgeType) -> bool {
    matches!(e, EdgeType::IsInAuto)
}

impl PermGraph {
    /// Create a new entity. The entity immediately acquires automatic
    /// membership in the current global group, if one exists.
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        self.create_entity_with(EntityAttributes::new(name))
    }

    /// Create a new entity from prepared attributes.
    pub fn create_entity_with(&mut self, attrs: EntityAttributes) -> EntityId {
        let id = EntityId(self.graph.create_node(AuthzNode::Entity(attrs)));
        self.refresh_auto_membership(id);
        id
    }

    /// Persist an entity, re-establishing its automatic membership: stale
    /// `IS_IN_AUTO` edges are dropped and one to the current global group is
    /// added. Idempotent.
    pub fn save_entity(&mut self, entity: EntityId) -> Result<()> {
        self.entity_attrs(entity)?;
        self.refresh_auto_membership(entity);
        Ok(())
    }

    fn refresh_auto_membership(&mut self, entity: EntityId) {
        self.graph
            .remove_edges(Some(entity.node_id()), None, is_in_auto);
        if let Some(global) = self.global_group() {
            self.graph
                .add_edge(entity.node_id(), EdgeType::IsInAuto, global.node_id());
        }
    }

    /// Add explicit membership in a group. Idempotent.
    pub fn add_to_group(&mut self, entity: EntityId, group: GroupId) -> Result<()> {
        self.entity_attrs(entity)?;
        self.group_attrs(group)?;
        if !self.graph.has_edge(entity.node_id(), group.node_id(), is_in) {
            self.graph
                .add_edge(entity.node_id(), EdgeType::IsIn, group.node_id());
        }
        Ok(())
    }

    /// Remove explicit membership in a group. Automatic membership is
    /// untouched.
    pub fn remove_from_group(&mut self, entity: EntityId, group: GroupId) -> Result<()> {
        self.entity_attrs(entity)?;
        self.group_attrs(group)?;
        self.graph
            .remove_edges(Some(entity.node_id()), Some(group.node_id()), is_in);
        Ok(())
    }

    /// Remove every explicit membership of the entity.
    pub fn remove_from_all_groups(&mut self, entity: EntityId) -> Result<()> {
        self.entity_attrs(entity)?;
        self.graph
            .remove_edges(Some(entity.node_id()), None, is_in);
        Ok(())
    }

    /// Direct (`IS_IN`) memberships of the entity. Groups also reached by an
    /// automatic edge are skipped, and a scope argument restricts the result
    /// to groups existing in that scope. The sequence concludes with the
    /// current global group when one exists.
    pub fn groups_of(&self, entity: EntityId, scope: Option<ScopeId>) -> Result<Vec<GroupId>> {
        self.entity_attrs(entity)?;
        if let Some(s) = scope {
            self.scope_attrs(s)?;
        }
        let mut out = IndexSet::new();
        for (edge, g) in self.graph.edges_out(entity.node_id()) {
            if !is_in(&edge) {
                continue;
            }
            if self.graph.has_edge(entity.node_id(), g, is_in_auto) {
                continue;
            }
            if let Some(s) = scope {
                if !self.reaches_scope(g, s) {
                    continue;
                }
            }
            out.insert(GroupId(g));
        }
        if let Some(global) = self.global_group() {
            out.insert(global);
        }
        Ok(out.into_iter().collect())
    }

    /// Link a perm to the entity with the given polarity, qualified by
    /// `scope` (or the `"*"` qualifier without one). Fails with a scope
    /// mismatch when the perm is scoped and the target scope does not fall
    /// under it; any prior polarized link with the same qualifier is
    /// replaced.
    pub fn link_perm(
        &mut self,
        entity: EntityId,
        perm: PermId,
        scope: Option<ScopeId>,
        allow: bool,
    ) -> Result<()> {
        self.entity_attrs(entity)?;
        self.perm_attrs(perm)?;
        if let Some(s) = scope {
            self.scope_attrs(s)?;
        }
        self.is_scope_supported(perm, scope)?;
        let qualifier = match scope {
            Some(s) => ScopeQualifier::In(s),
            None => ScopeQualifier::Any,
        };
        self.graph
            .remove_edges(Some(entity.node_id()), Some(perm.node_id()), |e| {
                e.qualifier() == Some(qualifier)
            });
        let edge = if allow {
            EdgeType::Allow(qualifier)
        } else {
            EdgeType::Deny(qualifier)
        };
        debug!(%edge, %qualifier, "linking perm to entity");
        self.graph.add_edge(entity.node_id(), edge, perm.node_id());
        Ok(())
    }

    /// Remove the entity's polarized link to `perm` carrying the given
    /// scope qualifier.
    pub fn reset_perm(&mut self, entity: EntityId, perm: PermId, scope: Option<ScopeId>) -> Result<()> {
        self.entity_attrs(entity)?;
        self.perm_attrs(perm)?;
        let qualifier = match scope {
            Some(s) => ScopeQualifier::In(s),
            None => ScopeQualifier::Any,
        };
        self.graph
            .remove_edges(Some(entity.node_id()), Some(perm.node_id()), |e| {
                e.qualifier() == Some(qualifier)
            });
        Ok(())
    }

    /// Remove every polarized link of the entity carrying the given scope
    /// qualifier.
    pub fn reset_all_perms_in_scope(
        &mut self,
        entity: EntityId,
        scope: Option<ScopeId>,
    ) -> Result<()> {
        self.entity_attrs(entity)?;
        let qualifier = match scope {
            Some(s) => ScopeQualifier::In(s),
            None => ScopeQualifier::Any,
        };
        self.graph
            .remove_edges(Some(entity.node_id()), None, |e| {
                e.qualifier() == Some(qualifier)
            });
        Ok(())
    }

    /// Remove every polarized link of the entity, whatever its qualifier.
    pub fn reset_all_perms(&mut self, entity: EntityId) -> Result<()> {
        self.entity_attrs(entity)?;
        self.graph
            .remove_edges(Some(entity.node_id()), None, EdgeType::is_polarized);
        Ok(())
    }

    /// Perms linked from the entity with exactly the given scope qualifier,
    /// with their polarity (`true` = allow).
    pub fn linked_perms(
        &self,
        entity: EntityId,
        scope: Option<ScopeId>,
    ) -> Result<Vec<(PermId, bool)>> {
        self.entity_attrs(entity)?;
        let qualifier = match scope {
            Some(s) => ScopeQualifier::In(s),
            None => ScopeQualifier::Any,
        };
        Ok(self
            .graph
            .edges_out(entity.node_id())
            .into_iter()
            .filter(|(e, _)| e.qualifier() == Some(qualifier))
            .map(|(e, p)| (PermId(p), matches!(e, EdgeType::Allow(_))))
            .collect())
    }

    /// Every perm linked from the entity, whatever its qualifier.
    pub fn all_linked_perms(&self, entity: EntityId) -> Result<Vec<(PermId, bool)>> {
        self.entity_attrs(entity)?;
        Ok(self
            .graph
            .edges_out(entity.node_id())
            .into_iter()
            .filter(|(e, _)| e.is_polarized())
            .map(|(e, p)| (PermId(p), matches!(e, EdgeType::Allow(_))))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::AuthzError;
    use crate::perm_graph::test_util::scope_chain;

    #[test]
    fn add_to_group_is_idempotent() {
        let mut g = PermGraph::new();
        let e = g.create_entity("e");
        let grp = g.create_group("g");

        g.add_to_group(e, grp).unwrap();
        g.add_to_group(e, grp).unwrap();
        assert_eq!(g.groups_of(e, None).unwrap(), vec![grp]);

        g.remove_from_group(e, grp).unwrap();
        assert!(g.groups_of(e, None).unwrap().is_empty());
    }

    #[test]
    fn subtypes_are_attributes_not_labels() {
        let mut g = PermGraph::new();
        let bot = g.create_entity_with(EntityAttributes::subtyped("crawler", "ServiceAccount"));
        let attrs = g.entity_attrs(bot).unwrap();
        assert_eq!(attrs.subtype.as_deref(), Some("ServiceAccount"));
        assert_eq!(
            g.store().node(bot.node_id()).unwrap().label(),
            "Entity"
        );
    }

    #[test]
    fn groups_of_ends_with_the_global_group() {
        let mut g = PermGraph::new();
        let e = g.create_entity("e");
        let editors = g.create_group("Editors");
        let users = g.create_group("Users");
        g.make_global(users, false).unwrap();
        g.save_entity(e).unwrap();
        g.add_to_group(e, editors).unwrap();

        assert_eq!(g.groups_of(e, None).unwrap(), vec![editors, users]);
    }

    #[test]
    fn groups_of_filters_by_scope() {
        let mut g = PermGraph::new();
        let scopes = scope_chain(&mut g, &["server", "modpack"]);
        let off_scope = g.create_scope("off_scope");
        let e = g.create_entity("e");
        let contributors = g.create_group("Contributors");
        let editors = g.create_group("Editors");
        g.set_scope(contributors, scopes[0]).unwrap();
        g.add_to_group(e, contributors).unwrap();
        g.add_to_group(e, editors).unwrap();

        // unscoped groups never make a scoped listing
        assert_eq!(g.groups_of(e, Some(scopes[1])).unwrap(), vec![contributors]);
        assert!(g.groups_of(e, Some(off_scope)).unwrap().is_empty());
    }

    #[test]
    fn save_entity_refreshes_auto_membership() {
        let mut g = PermGraph::new();
        let users = g.create_group("Users");
        g.make_global(users, false).unwrap();
        let e = g.create_entity("e");

        let autos = |g: &PermGraph| {
            g.store()
                .edges_out(e.node_id())
                .into_iter()
                .filter(|(edge, _)| matches!(edge, EdgeType::IsInAuto))
                .count()
        };
        assert_eq!(autos(&g), 1);
        g.save_entity(e).unwrap();
        g.save_entity(e).unwrap();
        assert_eq!(autos(&g), 1);
    }

    #[test]
    fn link_perm_checks_perm_scope() {
        let mut g = PermGraph::new();
        let scopes = scope_chain(&mut g, &["server", "modpack"]);
        let e = g.create_entity("e");
        let fly = g.create_perm("fly");
        g.set_scope(fly, scopes[1]).unwrap();

        g.link_perm(e, fly, Some(scopes[0]), true).unwrap();
        assert!(matches!(
            g.link_perm(e, fly, None, true),
            Err(AuthzError::ScopeMismatch { .. })
        ));
    }

    #[test]
    fn link_perm_is_keyed_by_qualifier() {
        let mut g = PermGraph::new();
        let s = g.create_scope("server");
        let e = g.create_entity("e");
        let p = g.create_perm("p");

        g.link_perm(e, p, None, true).unwrap();
        g.link_perm(e, p, Some(s), false).unwrap();
        // one edge per qualifier, relinking replaces in place
        g.link_perm(e, p, Some(s), true).unwrap();

        assert_eq!(g.linked_perms(e, None).unwrap(), vec![(p, true)]);
        assert_eq!(g.linked_perms(e, Some(s)).unwrap(), vec![(p, true)]);
        assert_eq!(g.all_linked_perms(e).unwrap().len(), 2);
    }

    #[test]
    fn reset_perm_undoes_link_perm() {
        let mut g = PermGraph::new();
        let e = g.create_entity("e");
        let p = g.create_perm("p");
        let before = g.store().edge_count();

        g.link_perm(e, p, None, false).unwrap();
        g.reset_perm(e, p, None).unwrap();
        assert_eq!(g.store().edge_count(), before);
        assert!(g.all_linked_perms(e).unwrap().is_empty());
    }

    #[test]
    fn reset_all_perms_in_scope_leaves_other_qualifiers() {
        let mut g = PermGraph::new();
        let s = g.create_scope("server");
        let e = g.create_entity("e");
        let p1 = g.create_perm("p1");
        let p2 = g.create_perm("p2");
        g.link_perm(e, p1, Some(s), true).unwrap();
        g.link_perm(e, p2, Some(s), true).unwrap();
        g.link_perm(e, p2, None, true).unwrap();

        g.reset_all_perms_in_scope(e, Some(s)).unwrap();
        assert!(g.linked_perms(e, Some(s)).unwrap().is_empty());
        assert_eq!(g.linked_perms(e, None).unwrap(), vec![(p2, true)]);

        g.reset_all_perms(e).unwrap();
        assert!(g.all_linked_perms(e).unwrap().is_empty());
    }
}
