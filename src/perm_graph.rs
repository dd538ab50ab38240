//! # Permission Graph
//!
//! `perm_graph` models authorization state as a labeled directed graph:
//! entities belong to groups, groups inherit from groups, scopes form a
//! subset hierarchy, and polarized `ALLOW`/`DENY` links attach subjects to
//! perms. [`PermGraph`] is the engine facade; the resolution queries live in
//! [`mod@self::graph`]'s search primitives plus the resolver rules in this
//! module tree.

pub mod graph;

mod abilities;
mod entities;
mod groups;
mod perms;
mod resolve;
mod scopes;
#[cfg(test)]
pub(crate) mod test_util;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};

use self::graph::Graph;

pub use resolve::{Subject, MAX_PATH_LEN};

/// Stable identifier of a node in the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversion into the underlying untyped node id.
pub trait ToNodeId {
    /// The untyped id of this node.
    fn node_id(&self) -> NodeId;
}

impl ToNodeId for NodeId {
    fn node_id(&self) -> NodeId {
        *self
    }
}

macro_rules! typed_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub(crate) NodeId);

        impl ToNodeId for $name {
            fn node_id(&self) -> NodeId {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

typed_id! {
    /// Id of an `Entity` node.
    EntityId
}
typed_id! {
    /// Id of a `Group` node.
    GroupId
}
typed_id! {
    /// Id of a `Perm` node.
    PermId
}
typed_id! {
    /// Id of a `Scope` node.
    ScopeId
}
typed_id! {
    /// Id of an `Ability` node.
    AbilityId
}
typed_id! {
    /// Id of an activation (`AbilityPerm`) node.
    ActivationId
}

/// Attributes associated with an Entity node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAttributes {
    /// Display name.
    pub name: String,
    /// Optional user-defined subtype tag (`User`, `ServiceAccount`, ...).
    /// Subtypes are an attribute, not a label: every subject stays an
    /// `Entity` node.
    pub subtype: Option<String>,
}

impl EntityAttributes {
    /// Attributes with the given name and no subtype.
    pub fn new(name: impl Into<String>) -> Self {
        EntityAttributes {
            name: name.into(),
            subtype: None,
        }
    }

    /// Attributes carrying a subtype tag.
    pub fn subtyped(name: impl Into<String>, subtype: impl Into<String>) -> Self {
        EntityAttributes {
            name: name.into(),
            subtype: Some(subtype.into()),
        }
    }
}

/// Attributes associated with a Group node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAttributes {
    /// Display name.
    pub name: String,
    pub(crate) is_global: bool,
}

impl GroupAttributes {
    /// Attributes for an ordinary (non-global) group.
    pub fn new(name: impl Into<String>) -> Self {
        GroupAttributes {
            name: name.into(),
            is_global: false,
        }
    }

    /// Whether this group currently holds the global flag.
    pub fn is_global(&self) -> bool {
        self.is_global
    }
}

/// Attributes associated with a Perm node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermAttributes {
    /// Display name.
    pub name: String,
}

/// Attributes associated with a Scope node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeAttributes {
    /// Display name.
    pub name: String,
}

/// Attributes associated with an Ability node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityAttributes {
    /// Display name.
    pub name: String,
}

/// One activation record: which perm currently activates an ability in a
/// given scope for a given entity. Identity is `(entity, ability, scope)`;
/// the perm is updatable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationAttributes {
    pub(crate) entity: EntityId,
    pub(crate) ability: AbilityId,
    pub(crate) scope: Option<ScopeId>,
    pub(crate) perm: PermId,
}

impl ActivationAttributes {
    /// The entity holding the activation.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// The activated ability.
    pub fn ability(&self) -> AbilityId {
        self.ability
    }

    /// The scope the activation works in, if any.
    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    /// The perm currently activating the ability.
    pub fn perm(&self) -> PermId {
        self.perm
    }
}

/// Enum of node kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthzNode {
    /// An authorization subject.
    Entity(EntityAttributes),
    /// A named collection of entities.
    Group(GroupAttributes),
    /// An atomic permission token.
    Perm(PermAttributes),
    /// A context in the subset-of hierarchy.
    Scope(ScopeAttributes),
    /// A higher-level capability mediating perms.
    Ability(AbilityAttributes),
    /// One ability activation. Persists under the `AbilityPerm` label.
    Activation(ActivationAttributes),
}

impl AuthzNode {
    /// The persisted label string for this node kind.
    pub fn label(&self) -> &'static str {
        match self {
            AuthzNode::Entity(_) => "Entity",
            AuthzNode::Group(_) => "Group",
            AuthzNode::Perm(_) => "Perm",
            AuthzNode::Scope(_) => "Scope",
            AuthzNode::Ability(_) => "Ability",
            AuthzNode::Activation(_) => "AbilityPerm",
        }
    }

    /// Display name, where the kind carries one.
    pub fn name(&self) -> Option<&str> {
        match self {
            AuthzNode::Entity(a) => Some(&a.name),
            AuthzNode::Group(a) => Some(&a.name),
            AuthzNode::Perm(a) => Some(&a.name),
            AuthzNode::Scope(a) => Some(&a.name),
            AuthzNode::Ability(a) => Some(&a.name),
            AuthzNode::Activation(_) => None,
        }
    }
}

/// Scope qualifier carried by polarized (`ALLOW`/`DENY`) edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeQualifier {
    /// The `"*"` sentinel: the link applies in any scope.
    Any,
    /// The link applies for queries whose scope set contains the given
    /// scope.
    In(ScopeId),
}

impl fmt::Display for ScopeQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeQualifier::Any => f.write_str("*"),
            ScopeQualifier::In(s) => write!(f, "{s}"),
        }
    }
}

/// Enum of edge types. `Display` output uses the wire vocabulary (`IS_IN`,
/// `ALLOW`, `ACTIVATED_IN`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    /// Explicit entity membership in a group.
    IsIn,
    /// Automatic membership in the global group.
    IsInAuto,
    /// Group-to-group inheritance of linked perms.
    Inherits,
    /// Attachment of a scoped object to its scope.
    ExistsIn,
    /// Child scope to parent scope.
    SubsetOf,
    /// Perm is valid for an ability.
    Supports,
    /// Polarized allow link to a perm.
    Allow(ScopeQualifier),
    /// Polarized deny link to a perm.
    Deny(ScopeQualifier),
    /// Activation record to its perm.
    Activated,
    /// Activation record to its ability.
    RelatedTo,
    /// Activation record to the scope it works in.
    ActivatedIn,
    /// Entity to an activation record it holds.
    Enabled,
}

impl EdgeType {
    /// The scope qualifier, when this is a polarized link.
    pub fn qualifier(&self) -> Option<ScopeQualifier> {
        match self {
            EdgeType::Allow(q) | EdgeType::Deny(q) => Some(*q),
            _ => None,
        }
    }

    /// Whether this is a polarized (`ALLOW`/`DENY`) link.
    pub fn is_polarized(&self) -> bool {
        matches!(self, EdgeType::Allow(_) | EdgeType::Deny(_))
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeType::IsIn => "IS_IN",
            EdgeType::IsInAuto => "IS_IN_AUTO",
            EdgeType::Inherits => "INHERITS",
            EdgeType::ExistsIn => "EXISTS_IN",
            EdgeType::SubsetOf => "SUBSET_OF",
            EdgeType::Supports => "SUPPORTS",
            EdgeType::Allow(_) => "ALLOW",
            EdgeType::Deny(_) => "DENY",
            EdgeType::Activated => "ACTIVATED",
            EdgeType::RelatedTo => "RELATED_TO",
            EdgeType::ActivatedIn => "ACTIVATED_IN",
            EdgeType::Enabled => "ENABLED",
        };
        f.write_str(s)
    }
}

/// The authorization graph: the store plus the engine's invariants.
#[derive(Default, Serialize, Deserialize)]
pub struct PermGraph {
    pub(crate) graph: Graph,
}

impl PermGraph {
    /// An empty graph.
    pub fn new() -> Self {
        PermGraph::default()
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &Graph {
        &self.graph
    }

    /// Serialize the whole graph into a bincode snapshot.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| AuthzError::Store(e.into()))
    }

    /// Restore a graph from a bincode snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| AuthzError::Store(e.into()))
    }

    pub(crate) fn entity_attrs(&self, id: EntityId) -> Result<&EntityAttributes> {
        match self.graph.node(id.node_id()) {
            Some(AuthzNode::Entity(a)) => Ok(a),
            _ => Err(AuthzError::NotFound {
                label: "Entity",
                id: id.node_id().0,
            }),
        }
    }

    pub(crate) fn group_attrs(&self, id: GroupId) -> Result<&GroupAttributes> {
        match self.graph.node(id.node_id()) {
            Some(AuthzNode::Group(a)) => Ok(a),
            _ => Err(AuthzError::NotFound {
                label: "Group",
                id: id.node_id().0,
            }),
        }
    }

    pub(crate) fn group_attrs_mut(&mut self, id: GroupId) -> Result<&mut GroupAttributes> {
        match self.graph.node_mut(id.node_id()) {
            Some(AuthzNode::Group(a)) => Ok(a),
            _ => Err(AuthzError::NotFound {
                label: "Group",
                id: id.node_id().0,
            }),
        }
    }

    pub(crate) fn perm_attrs(&self, id: PermId) -> Result<&PermAttributes> {
        match self.graph.node(id.node_id()) {
            Some(AuthzNode::Perm(a)) => Ok(a),
            _ => Err(AuthzError::NotFound {
                label: "Perm",
                id: id.node_id().0,
            }),
        }
    }

    pub(crate) fn scope_attrs(&self, id: ScopeId) -> Result<&ScopeAttributes> {
        match self.graph.node(id.node_id()) {
            Some(AuthzNode::Scope(a)) => Ok(a),
            _ => Err(AuthzError::NotFound {
                label: "Scope",
                id: id.node_id().0,
            }),
        }
    }

    pub(crate) fn ability_attrs(&self, id: AbilityId) -> Result<&AbilityAttributes> {
        match self.graph.node(id.node_id()) {
            Some(AuthzNode::Ability(a)) => Ok(a),
            _ => Err(AuthzError::NotFound {
                label: "Ability",
                id: id.node_id().0,
            }),
        }
    }

    /// Delete a node along with its incident edges. Deleting an entity also
    /// detach-deletes its activation records.
    pub fn delete(&mut self, node: impl ToNodeId) -> Result<()> {
        let id = node.node_id();
        let is_entity = match self.graph.node(id) {
            Some(n) => matches!(n, AuthzNode::Entity(_)),
            None => {
                return Err(AuthzError::NotFound {
                    label: "node",
                    id: id.0,
                })
            }
        };
        if is_entity {
            let entity = EntityId(id);
            let records = self.graph.nodes_matching(
                |n| matches!(n, AuthzNode::Activation(a) if a.entity == entity),
            );
            for r in records {
                self.graph.delete_node(r);
            }
        }
        self.graph.delete_node(id);
        Ok(())
    }
}
