//! The resolution algorithm.
//!
//! Authorization is decided by the shortest polarized path from the subject
//! to the perm, searched under a scope filter over membership, inheritance
//! and link edges. Because precedence is distance, direct entity links beat
//! group links, child-group links beat inherited parent-group links, and a
//! `DENY` sitting closer to the subject silences any `ALLOW` farther out.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::error::Result;

use super::graph::TerminalPaths;
use super::{
    AuthzNode, EdgeType, EntityId, GroupId, NodeId, PermGraph, PermId, ScopeId, ScopeQualifier,
    ToNodeId,
};

/// Maximum resolution path length, in edges.
pub const MAX_PATH_LEN: usize = 16;

/// A resolution subject: an entity or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Resolve for an entity.
    Entity(EntityId),
    /// Resolve for a group.
    Group(GroupId),
}

impl From<EntityId> for Subject {
    fn from(id: EntityId) -> Self {
        Subject::Entity(id)
    }
}

impl From<GroupId> for Subject {
    fn from(id: GroupId) -> Self {
        Subject::Group(id)
    }
}

impl ToNodeId for Subject {
    fn node_id(&self) -> NodeId {
        match self {
            Subject::Entity(e) => e.node_id(),
            Subject::Group(g) => g.node_id(),
        }
    }
}

fn traversal_edge(e: &EdgeType) -> bool {
    matches!(e, EdgeType::IsIn | EdgeType::IsInAuto | EdgeType::Inherits)
}

impl PermGraph {
    /// Whether the subject is allowed `perm` within `scope`. Never fails for
    /// "no result": an unreachable or denied perm simply yields `false`.
    pub fn is_allowed(
        &self,
        subject: impl Into<Subject>,
        perm: PermId,
        scope: Option<ScopeId>,
    ) -> Result<bool> {
        self.perm_attrs(perm)?;
        Ok(self.allowed_perm_set(subject.into(), scope)?.contains(&perm))
    }

    /// Every perm the subject is allowed within `scope`, in stable id
    /// order. An empty result is not an error.
    pub fn allowed_perms(
        &self,
        subject: impl Into<Subject>,
        scope: Option<ScopeId>,
    ) -> Result<Vec<PermId>> {
        Ok(self
            .allowed_perm_set(subject.into(), scope)?
            .into_iter()
            .collect())
    }

    fn allowed_perm_set(
        &self,
        subject: Subject,
        scope: Option<ScopeId>,
    ) -> Result<IndexSet<PermId>> {
        match subject {
            Subject::Entity(e) => {
                self.entity_attrs(e)?;
            }
            Subject::Group(g) => {
                self.group_attrs(g)?;
            }
        }
        if let Some(s) = scope {
            self.scope_attrs(s)?;
        }

        // the scope set: the query scope, its ancestors, and (implicitly)
        // the `*` qualifier
        let accepted = scope.map(|s| self.scope_set(s));

        // start frontier: the subject, plus every scope-set member so their
        // hosted ALLOW links inject directly
        let mut starts = vec![subject.node_id()];
        if let Some(set) = &accepted {
            starts.extend(set.iter().copied());
        }

        let verdicts = self.graph.shortest_terminal_paths(
            &starts,
            MAX_PATH_LEN,
            traversal_edge,
            |id, _| self.passes_intermediate_filter(id, accepted.as_ref()),
            |edge, _, node| {
                matches!(node, AuthzNode::Perm(_))
                    && edge.is_polarized()
                    && qualifier_accepted(edge, accepted.as_ref())
            },
        );

        let mut allowed = decide(verdicts);
        if let (Subject::Group(g), Some(s)) = (subject, scope) {
            let set = accepted.unwrap_or_default();
            allowed.retain(|&p| self.group_scope_admits(g, p, s, &set));
        }
        Ok(allowed)
    }

    /// The intermediate-node scope filter: under a scoped query, a node on
    /// the path must be unscoped or attached to a scope-set member.
    fn passes_intermediate_filter(&self, id: NodeId, accepted: Option<&IndexSet<NodeId>>) -> bool {
        match accepted {
            Some(set) => match self.attached_scope(id) {
                Some(s) => set.contains(&s.node_id()),
                None => true,
            },
            None => true,
        }
    }

    /// The extra exclusions of a scoped group-subject query: the perm must
    /// be unscoped or scoped within the scope set, and no *other* group in
    /// the wrong scope may hold a polarized link to it.
    fn group_scope_admits(
        &self,
        subject: GroupId,
        perm: PermId,
        scope: ScopeId,
        accepted: &IndexSet<NodeId>,
    ) -> bool {
        if let Some(s) = self.attached_scope(perm.node_id()) {
            if !accepted.contains(&s.node_id()) {
                return false;
            }
        }
        for (edge, src) in self.graph.edges_in(perm.node_id()) {
            if !edge.is_polarized() || src == subject.node_id() {
                continue;
            }
            if !matches!(self.graph.node(src), Some(AuthzNode::Group(_))) {
                continue;
            }
            if !self.reaches_scope(src, scope) {
                return false;
            }
        }
        true
    }
}

/// Whether a terminal edge's qualifier is usable under the scope set. `Any`
/// always passes; without a query scope there is nothing to check.
fn qualifier_accepted(edge: &EdgeType, accepted: Option<&IndexSet<NodeId>>) -> bool {
    match (edge.qualifier(), accepted) {
        (Some(ScopeQualifier::In(s)), Some(set)) => set.contains(&s.node_id()),
        _ => true,
    }
}

/// Apply shortest-path precedence: a perm is allowed when its minimal
/// distance carries an `ALLOW` and no `DENY`. Equal-distance mixed verdicts
/// deny. The result is ordered by perm id.
fn decide(verdicts: HashMap<NodeId, TerminalPaths>) -> IndexSet<PermId> {
    let mut hits: Vec<(NodeId, TerminalPaths)> = verdicts.into_iter().collect();
    hits.sort_by_key(|(id, _)| *id);
    hits.into_iter()
        .filter(|(_, paths)| {
            let allow = paths.edges.iter().any(|e| matches!(e, EdgeType::Allow(_)));
            let deny = paths.edges.iter().any(|e| matches!(e, EdgeType::Deny(_)));
            allow && !deny
        })
        .map(|(id, _)| PermId(id))
        .collect()
}
