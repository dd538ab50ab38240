//! The in-memory graph store.
//!
//! Holds labeled nodes and typed edges and offers the lookup, filter and
//! bounded path-search primitives the engine is built on. Nothing in here
//! knows about authorization semantics; the resolver supplies those through
//! the matcher closures.

use std::collections::{HashMap, VecDeque};

use anyhow::{anyhow, Context, Result};
use bimap::BiHashMap;
use graphviz_rust as graphviz;
use graphviz_rust::cmd::CommandArg;
use graphviz_rust::cmd::Format;
use graphviz_rust::printer::PrinterContext;
use indexmap::IndexSet;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::{dot, Direction};
use serde::{Deserialize, Serialize};

use super::{AuthzNode, EdgeType, NodeId};

/// The main graph wrapper
#[derive(Default, Serialize, Deserialize)]
pub struct Graph {
    graph: StableDiGraph<AuthzNode, EdgeType>,
    /// A map of node ids to indices
    ids: BiHashMap<NodeId, NodeIndex>,
    next_id: u64,
}

/// Minimal terminal-path answer for a single target node of
/// [`Graph::shortest_terminal_paths`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalPaths {
    /// Length in edges of the shortest qualifying path.
    pub len: usize,
    /// Every terminal edge realizing that minimal length.
    pub edges: Vec<EdgeType>,
}

impl Graph {
    fn idx(&self, id: NodeId) -> Option<NodeIndex> {
        self.ids.get_by_left(&id).copied()
    }

    fn id_of(&self, idx: NodeIndex) -> Option<NodeId> {
        self.ids.get_by_right(&idx).copied()
    }

    /// Number of nodes currently in the store.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges currently in the store.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Insert a node and return its freshly allocated id.
    pub fn create_node(&mut self, node: AuthzNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let idx = self.graph.add_node(node);
        self.ids.insert(id, idx);
        id
    }

    /// Remove a node along with its incident edges. Returns whether the node
    /// existed.
    pub fn delete_node(&mut self, id: NodeId) -> bool {
        match self.idx(id) {
            Some(idx) => {
                self.ids.remove_by_left(&id);
                self.graph.remove_node(idx).is_some()
            }
            None => false,
        }
    }

    /// Borrow a node by id.
    pub fn node(&self, id: NodeId) -> Option<&AuthzNode> {
        self.idx(id).map(|idx| &self.graph[idx])
    }

    /// Mutably borrow a node by id.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut AuthzNode> {
        let idx = self.idx(id)?;
        self.graph.node_weight_mut(idx)
    }

    /// The first node accepted by `matcher`, scanning in insertion order.
    pub fn find_one(&self, matcher: impl Fn(&AuthzNode) -> bool) -> Option<NodeId> {
        self.nodes_matching(matcher).into_iter().next()
    }

    /// Ids of all nodes accepted by `matcher`, in insertion order.
    pub fn nodes_matching(&self, matcher: impl Fn(&AuthzNode) -> bool) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&idx| matcher(&self.graph[idx]))
            .filter_map(|idx| self.id_of(idx))
            .collect()
    }

    /// Insert a directed edge. Returns false (and writes nothing) when
    /// either endpoint is missing.
    pub fn add_edge(&mut self, from: NodeId, edge: EdgeType, to: NodeId) -> bool {
        match (self.idx(from), self.idx(to)) {
            (Some(f), Some(t)) => {
                self.graph.add_edge(f, t, edge);
                true
            }
            _ => false,
        }
    }

    /// Whether an edge accepted by `matcher` runs from `from` to `to`.
    pub fn has_edge(&self, from: NodeId, to: NodeId, matcher: impl Fn(&EdgeType) -> bool) -> bool {
        match (self.idx(from), self.idx(to)) {
            (Some(f), Some(t)) => self
                .graph
                .edges_directed(f, Direction::Outgoing)
                .any(|e| e.target() == t && matcher(e.weight())),
            _ => false,
        }
    }

    /// Remove every edge accepted by `matcher` between the given endpoints.
    /// A `None` endpoint matches any node. Returns the number of edges
    /// removed.
    pub fn remove_edges(
        &mut self,
        from: Option<NodeId>,
        to: Option<NodeId>,
        matcher: impl Fn(&EdgeType) -> bool,
    ) -> usize {
        let from_idx = match from {
            Some(f) => match self.idx(f) {
                Some(idx) => Some(idx),
                None => return 0,
            },
            None => None,
        };
        let to_idx = match to {
            Some(t) => match self.idx(t) {
                Some(idx) => Some(idx),
                None => return 0,
            },
            None => None,
        };

        let doomed: Vec<_> = match (from_idx, to_idx) {
            (Some(f), _) => self
                .graph
                .edges_directed(f, Direction::Outgoing)
                .filter(|e| to_idx.map_or(true, |t| e.target() == t) && matcher(e.weight()))
                .map(|e| e.id())
                .collect(),
            (None, Some(t)) => self
                .graph
                .edges_directed(t, Direction::Incoming)
                .filter(|e| matcher(e.weight()))
                .map(|e| e.id())
                .collect(),
            (None, None) => self
                .graph
                .edge_indices()
                .filter(|&e| matcher(&self.graph[e]))
                .collect(),
        };

        let removed = doomed.len();
        for e in doomed {
            self.graph.remove_edge(e);
        }
        removed
    }

    /// Outgoing `(edge, target)` pairs of a node.
    pub fn edges_out(&self, id: NodeId) -> Vec<(EdgeType, NodeId)> {
        match self.idx(id) {
            Some(idx) => self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .filter_map(|e| self.id_of(e.target()).map(|n| (*e.weight(), n)))
                .collect(),
            None => vec![],
        }
    }

    /// Incoming `(edge, source)` pairs of a node.
    pub fn edges_in(&self, id: NodeId) -> Vec<(EdgeType, NodeId)> {
        match self.idx(id) {
            Some(idx) => self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .filter_map(|e| self.id_of(e.source()).map(|n| (*e.weight(), n)))
                .collect(),
            None => vec![],
        }
    }

    /// Nodes reachable from `start` over edges accepted by `edge_matcher`,
    /// in breadth-first order. `start` itself is not part of the result.
    pub fn reachable_from(
        &self,
        start: NodeId,
        edge_matcher: impl Fn(&EdgeType) -> bool,
    ) -> Vec<NodeId> {
        let mut visited: IndexSet<NodeIndex> = IndexSet::new();
        if let Some(start_idx) = self.idx(start) {
            visited.insert(start_idx);
            let mut queue = VecDeque::from([start_idx]);
            while let Some(u) = queue.pop_front() {
                for e in self.graph.edges_directed(u, Direction::Outgoing) {
                    if edge_matcher(e.weight()) && visited.insert(e.target()) {
                        queue.push_back(e.target());
                    }
                }
            }
        }
        visited
            .into_iter()
            .skip(1) // drop the start node
            .filter_map(|idx| self.id_of(idx))
            .collect()
    }

    /// Bounded multi-source breadth-first search.
    ///
    /// Walks outgoing edges from every node in `starts`. An edge accepted by
    /// `terminal_matcher` ends a candidate path at its target; an edge
    /// accepted by `edge_matcher` continues the walk, but only into targets
    /// accepted by `passthrough_matcher`. Start nodes are expanded
    /// unconditionally. Paths longer than `max_len` edges are not
    /// considered.
    ///
    /// Returns, for every node reached by a terminal edge, the minimal
    /// qualifying path length together with all terminal edges realizing it.
    pub fn shortest_terminal_paths(
        &self,
        starts: &[NodeId],
        max_len: usize,
        edge_matcher: impl Fn(&EdgeType) -> bool,
        passthrough_matcher: impl Fn(NodeId, &AuthzNode) -> bool,
        terminal_matcher: impl Fn(&EdgeType, NodeId, &AuthzNode) -> bool,
    ) -> HashMap<NodeId, TerminalPaths> {
        let mut dist: HashMap<NodeIndex, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        for &s in starts {
            if let Some(idx) = self.idx(s) {
                if !dist.contains_key(&idx) {
                    dist.insert(idx, 0);
                    queue.push_back(idx);
                }
            }
        }

        let mut found: HashMap<NodeIndex, TerminalPaths> = HashMap::new();
        while let Some(u) = queue.pop_front() {
            let d = dist[&u];
            if d >= max_len {
                continue;
            }
            for e in self.graph.edges_directed(u, Direction::Outgoing) {
                let v = e.target();
                let v_id = match self.id_of(v) {
                    Some(id) => id,
                    None => continue,
                };
                let weight = e.weight();
                if terminal_matcher(weight, v_id, &self.graph[v]) {
                    let hit = found.entry(v).or_insert_with(|| TerminalPaths {
                        len: d + 1,
                        edges: Vec::new(),
                    });
                    // BFS visits in distance order, so only equal-length
                    // hits extend the minimal set
                    if hit.len == d + 1 {
                        hit.edges.push(*weight);
                    }
                }
                if edge_matcher(weight)
                    && !dist.contains_key(&v)
                    && passthrough_matcher(v_id, &self.graph[v])
                {
                    dist.insert(v, d + 1);
                    queue.push_back(v);
                }
            }
        }

        found
            .into_iter()
            .filter_map(|(idx, paths)| self.id_of(idx).map(|id| (id, paths)))
            .collect()
    }

    /// Save an svg of the graph to the specified filename
    pub fn visualize(&self, path: &str) -> Result<String> {
        let my_dot = dot::Dot::new(&self.graph);
        let g = graphviz::parse(&format!["{:?}", my_dot])
            .map_err(|s| anyhow!(s))
            .context("failed to parse")?;
        let draw = graphviz::exec(
            g,
            &mut PrinterContext::default(),
            vec![
                CommandArg::Format(Format::Svg),
                CommandArg::Output(path.to_owned()),
            ],
        )
        .context("failed to exec graphviz. do you need to install it?")?;
        Ok(draw)
    }
}
