//! Ability operations: the supported-perm set and activation records.
//!
//! An activation record wires an entity to `(ability, perm, scope)` and is
//! keyed by `(entity, ability, scope)`; re-activating with another perm
//! updates the record in place.

use tracing::debug;

use crate::error::{AuthzError, Result};

use super::{
    AbilityAttributes, AbilityId, ActivationAttributes, ActivationId, AuthzNode, EdgeType,
    EntityId, PermGraph, PermId, ScopeId, ToNodeId,
};

impl PermGraph {
    /// Create a new ability.
    pub fn create_ability(&mut self, name: impl Into<String>) -> AbilityId {
        AbilityId(
            self.graph
                .create_node(AuthzNode::Ability(AbilityAttributes { name: name.into() })),
        )
    }

    /// Declare that `perm` is valid for the ability. Idempotent.
    pub fn add_perm_support(&mut self, ability: AbilityId, perm: PermId) -> Result<()> {
        self.ability_attrs(ability)?;
        self.perm_attrs(perm)?;
        if !self
            .graph
            .has_edge(ability.node_id(), perm.node_id(), |e| {
                matches!(e, EdgeType::Supports)
            })
        {
            self.graph
                .add_edge(ability.node_id(), EdgeType::Supports, perm.node_id());
        }
        Ok(())
    }

    /// Withdraw support for `perm`.
    pub fn remove_perm_support(&mut self, ability: AbilityId, perm: PermId) -> Result<()> {
        self.ability_attrs(ability)?;
        self.perm_attrs(perm)?;
        self.graph
            .remove_edges(Some(ability.node_id()), Some(perm.node_id()), |e| {
                matches!(e, EdgeType::Supports)
            });
        Ok(())
    }

    /// Withdraw support for every perm.
    pub fn remove_all_supported_perms(&mut self, ability: AbilityId) -> Result<()> {
        self.ability_attrs(ability)?;
        self.graph
            .remove_edges(Some(ability.node_id()), None, |e| {
                matches!(e, EdgeType::Supports)
            });
        Ok(())
    }

    /// Perms valid for the ability.
    pub fn supported_perms(&self, ability: AbilityId) -> Result<Vec<PermId>> {
        self.ability_attrs(ability)?;
        Ok(self
            .graph
            .edges_out(ability.node_id())
            .into_iter()
            .filter(|(e, _)| matches!(e, EdgeType::Supports))
            .map(|(_, p)| PermId(p))
            .collect())
    }

    /// All abilities existing in `scope`, i.e. attached to it or to one of
    /// its descendants.
    pub fn abilities_in_scope(&self, scope: ScopeId) -> Result<Vec<AbilityId>> {
        self.scope_attrs(scope)?;
        Ok(self
            .graph
            .nodes_matching(|n| matches!(n, AuthzNode::Ability(_)))
            .into_iter()
            .filter(|&a| self.reaches_scope(a, scope))
            .map(AbilityId)
            .collect())
    }

    /// Activate the ability for an entity with a concrete perm, optionally
    /// within a scope. The ability must support the perm, and the ability's
    /// own scope (if any) must cover the target scope. One record exists per
    /// `(entity, ability, scope)`; its perm is updated on re-activation.
    pub fn activate_ability(
        &mut self,
        entity: EntityId,
        ability: AbilityId,
        perm: PermId,
        scope: Option<ScopeId>,
    ) -> Result<ActivationId> {
        self.entity_attrs(entity)?;
        let ability_name = self.ability_attrs(ability)?.name.clone();
        let perm_name = self.perm_attrs(perm)?.name.clone();
        if let Some(s) = scope {
            self.scope_attrs(s)?;
        }
        self.is_scope_supported(ability, scope)?;
        if !self
            .graph
            .has_edge(ability.node_id(), perm.node_id(), |e| {
                matches!(e, EdgeType::Supports)
            })
        {
            return Err(AuthzError::UnsupportedPerm {
                ability: ability_name,
                perm: perm_name,
            });
        }

        let existing = self.graph.find_one(|n| {
            matches!(n, AuthzNode::Activation(a)
                if a.entity == entity && a.ability == ability && a.scope == scope)
        });
        let id = match existing {
            Some(record) => {
                if let Some(AuthzNode::Activation(a)) = self.graph.node_mut(record) {
                    a.perm = perm;
                }
                self.graph.remove_edges(Some(record), None, |e| {
                    matches!(e, EdgeType::Activated)
                });
                self.graph
                    .add_edge(record, EdgeType::Activated, perm.node_id());
                ActivationId(record)
            }
            None => {
                let record = self
                    .graph
                    .create_node(AuthzNode::Activation(ActivationAttributes {
                        entity,
                        ability,
                        scope,
                        perm,
                    }));
                self.graph
                    .add_edge(entity.node_id(), EdgeType::Enabled, record);
                self.graph
                    .add_edge(record, EdgeType::RelatedTo, ability.node_id());
                self.graph
                    .add_edge(record, EdgeType::Activated, perm.node_id());
                if let Some(s) = scope {
                    self.graph
                        .add_edge(record, EdgeType::ActivatedIn, s.node_id());
                }
                ActivationId(record)
            }
        };
        debug!(ability = %ability_name, perm = %perm_name, "ability activated");
        Ok(id)
    }

    /// Drop the activation of `ability` for the entity in exactly `scope`.
    pub fn reset_ability(
        &mut self,
        entity: EntityId,
        ability: AbilityId,
        scope: Option<ScopeId>,
    ) -> Result<()> {
        self.entity_attrs(entity)?;
        self.ability_attrs(ability)?;
        let doomed = self.graph.nodes_matching(|n| {
            matches!(n, AuthzNode::Activation(a)
                if a.entity == entity && a.ability == ability && a.scope == scope)
        });
        for record in doomed {
            self.graph.delete_node(record);
        }
        Ok(())
    }

    /// Drop every activation of `ability` for the entity, whatever the
    /// scope.
    pub fn reset_ability_in_all_scopes(
        &mut self,
        entity: EntityId,
        ability: AbilityId,
    ) -> Result<()> {
        self.entity_attrs(entity)?;
        self.ability_attrs(ability)?;
        let doomed = self.graph.nodes_matching(|n| {
            matches!(n, AuthzNode::Activation(a) if a.entity == entity && a.ability == ability)
        });
        for record in doomed {
            self.graph.delete_node(record);
        }
        Ok(())
    }

    /// Drop every activation held by the entity.
    pub fn reset_all_abilities(&mut self, entity: EntityId) -> Result<()> {
        self.entity_attrs(entity)?;
        let doomed = self
            .graph
            .nodes_matching(|n| matches!(n, AuthzNode::Activation(a) if a.entity == entity));
        for record in doomed {
            self.graph.delete_node(record);
        }
        Ok(())
    }

    /// Every activation record held by the entity.
    pub fn activations(&self, entity: EntityId) -> Result<Vec<ActivationId>> {
        self.entity_attrs(entity)?;
        Ok(self
            .graph
            .edges_out(entity.node_id())
            .into_iter()
            .filter(|(e, _)| matches!(e, EdgeType::Enabled))
            .map(|(_, record)| ActivationId(record))
            .collect())
    }

    /// Activation records held by the entity for exactly the given scope.
    pub fn activations_in_scope(
        &self,
        entity: EntityId,
        scope: Option<ScopeId>,
    ) -> Result<Vec<ActivationId>> {
        Ok(self
            .activations(entity)?
            .into_iter()
            .filter(|&record| {
                matches!(self.graph.node(record.node_id()),
                    Some(AuthzNode::Activation(a)) if a.scope == scope)
            })
            .collect())
    }

    /// Borrow an activation record.
    pub fn activation(&self, record: ActivationId) -> Result<&ActivationAttributes> {
        match self.graph.node(record.node_id()) {
            Some(AuthzNode::Activation(a)) => Ok(a),
            _ => Err(AuthzError::NotFound {
                label: "AbilityPerm",
                id: record.node_id().0,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::perm_graph::test_util::scope_chain;

    struct Fixture {
        graph: PermGraph,
        adam: EntityId,
        fly: AbilityId,
        fly1: PermId,
        fly2: PermId,
        server: ScopeId,
        modpack: ScopeId,
    }

    fn fixture() -> Fixture {
        let mut graph = PermGraph::new();
        let scopes = scope_chain(&mut graph, &["server", "modpack"]);
        let adam = graph.create_entity("adam");
        let fly = graph.create_ability("Fly");
        graph.set_scope(fly, scopes[1]).unwrap();
        let fly1 = graph.create_perm("fly1");
        let fly2 = graph.create_perm("fly2");
        graph.add_perm_support(fly, fly1).unwrap();
        graph.add_perm_support(fly, fly2).unwrap();
        Fixture {
            graph,
            adam,
            fly,
            fly1,
            fly2,
            server: scopes[0],
            modpack: scopes[1],
        }
    }

    #[test]
    fn activation_requires_supported_perm() {
        let mut f = fixture();
        let walk = f.graph.create_perm("walk");
        let err = f
            .graph
            .activate_ability(f.adam, f.fly, walk, Some(f.server))
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnsupportedPerm { .. }));
        assert!(f.graph.activations(f.adam).unwrap().is_empty());
    }

    #[test]
    fn activation_requires_covered_scope() {
        let mut f = fixture();
        let off_scope = f.graph.create_scope("off_scope");
        let err = f
            .graph
            .activate_ability(f.adam, f.fly, f.fly1, Some(off_scope))
            .unwrap_err();
        assert!(matches!(err, AuthzError::ScopeMismatch { .. }));
    }

    #[test]
    fn activation_is_keyed_by_entity_ability_scope() {
        let mut f = fixture();
        let first = f
            .graph
            .activate_ability(f.adam, f.fly, f.fly1, Some(f.server))
            .unwrap();
        // same key updates the perm in place
        let second = f
            .graph
            .activate_ability(f.adam, f.fly, f.fly2, Some(f.server))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(f.graph.activation(first).unwrap().perm(), f.fly2);

        // another scope is another record
        let third = f
            .graph
            .activate_ability(f.adam, f.fly, f.fly2, Some(f.modpack))
            .unwrap();
        assert_ne!(first, third);
        assert_eq!(f.graph.activations(f.adam).unwrap().len(), 2);
        assert_eq!(
            f.graph
                .activations_in_scope(f.adam, Some(f.server))
                .unwrap(),
            vec![first]
        );
    }

    #[test]
    fn reset_ability_detaches_the_record() {
        let mut f = fixture();
        let record = f
            .graph
            .activate_ability(f.adam, f.fly, f.fly1, Some(f.server))
            .unwrap();
        f.graph
            .activate_ability(f.adam, f.fly, f.fly2, Some(f.modpack))
            .unwrap();

        f.graph.reset_ability(f.adam, f.fly, Some(f.server)).unwrap();
        assert!(f.graph.activation(record).is_err());
        assert_eq!(f.graph.activations(f.adam).unwrap().len(), 1);

        f.graph.reset_ability_in_all_scopes(f.adam, f.fly).unwrap();
        assert!(f.graph.activations(f.adam).unwrap().is_empty());
    }

    #[test]
    fn deleting_an_entity_detaches_its_activations() {
        let mut f = fixture();
        let record = f
            .graph
            .activate_ability(f.adam, f.fly, f.fly1, Some(f.server))
            .unwrap();

        f.graph.delete(f.adam).unwrap();
        assert!(f.graph.activation(record).is_err());
        assert!(f.graph.entity_attrs(f.adam).is_err());
    }

    #[test]
    fn abilities_in_scope_yields_all_matches() {
        let mut f = fixture();
        let dig = f.graph.create_ability("Dig");
        f.graph.set_scope(dig, f.server).unwrap();
        let unscoped = f.graph.create_ability("Chat");

        let mut found = f.graph.abilities_in_scope(f.modpack).unwrap();
        found.sort();
        let mut expected = vec![f.fly, dig];
        expected.sort();
        assert_eq!(found, expected);
        assert!(!found.contains(&unscoped));

        assert_eq!(f.graph.abilities_in_scope(f.server).unwrap(), vec![dig]);
    }
}
