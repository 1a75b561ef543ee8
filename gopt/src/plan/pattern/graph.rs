// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pattern graph and its canonical ordering
//!
//! Elements live in a petgraph arena and are addressed by `NodeIndex` /
//! `EdgeIndex`. After construction, [`Pattern::reorder`] assigns every vertex
//! and edge a canonical order: isomorphic patterns with equal element types
//! receive equal orders and an equal [`Pattern::code`], whatever order their
//! elements were added in.

use crate::error::{OptimizerError, OptimizerResult};
use crate::schema::{EdgeTriplet, LabelId};
use petgraph::algo::connected_components;
use petgraph::graph::{EdgeIndex, Graph, NodeIndex, UnGraph};
use petgraph::visit::{Bfs, EdgeRef, NodeFiltered};
use petgraph::Direction as EdgeDir;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PATTERN_ID: AtomicU64 = AtomicU64::new(1);

/// Individualization branches explored before ties are broken by a single
/// refinement step
const CANONICAL_SEARCH_BUDGET: usize = 64;

/// Give `chosen` a color of its own, ahead of the rest of its class
fn individualize(colors: &[u64], members: &[NodeIndex], chosen: NodeIndex) -> Vec<u64> {
    let mut next: Vec<u64> = colors.iter().map(|c| c * 2).collect();
    for other in members {
        if *other != chosen {
            next[other.index()] += 1;
        }
    }
    next
}

/// Per-element statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementDetails {
    pub selectivity: f64,
}

impl Default for ElementDetails {
    fn default() -> Self {
        Self { selectivity: 1.0 }
    }
}

impl ElementDetails {
    pub fn with_selectivity(selectivity: f64) -> Self {
        Self { selectivity }
    }
}

/// A vertex with one (or, when fuzzy, several) admissible labels
#[derive(Debug, Clone, PartialEq)]
pub struct PatternVertex {
    /// Unique within the pattern, stable across reordering
    pub id: usize,
    pub types: Vec<LabelId>,
    pub details: ElementDetails,
}

impl PatternVertex {
    pub fn is_fuzzy(&self) -> bool {
        self.types.len() > 1
    }

    pub fn type_set(&self) -> BTreeSet<LabelId> {
        self.types.iter().copied().collect()
    }
}

/// A typed edge between two pattern vertices
#[derive(Debug, Clone, PartialEq)]
pub struct PatternEdge {
    pub id: usize,
    pub types: Vec<EdgeTriplet>,
    /// Match regardless of direction
    pub both: bool,
    pub details: ElementDetails,
}

impl PatternEdge {
    pub fn is_fuzzy(&self) -> bool {
        self.types.len() > 1
    }

    pub fn src_labels(&self) -> BTreeSet<LabelId> {
        self.types.iter().map(|t| t.src_label).collect()
    }

    pub fn dst_labels(&self) -> BTreeSet<LabelId> {
        self.types.iter().map(|t| t.dst_label).collect()
    }
}

/// Graph shape abstracted out of a match
#[derive(Debug, Clone)]
pub struct Pattern {
    id: u64,
    graph: Graph<PatternVertex, PatternEdge>,
    vertex_order: Vec<usize>,
    vertex_by_order: Vec<NodeIndex>,
    edge_order: Vec<usize>,
    edge_by_order: Vec<EdgeIndex>,
    code: String,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern {
    pub fn new() -> Self {
        Self {
            id: NEXT_PATTERN_ID.fetch_add(1, Ordering::Relaxed),
            graph: Graph::new(),
            vertex_order: Vec::new(),
            vertex_by_order: Vec::new(),
            edge_order: Vec::new(),
            edge_by_order: Vec::new(),
            code: String::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn add_vertex(&mut self, mut types: Vec<LabelId>, details: ElementDetails) -> NodeIndex {
        types.sort_unstable();
        types.dedup();
        self.invalidate_order();
        let id = self.graph.node_count();
        self.graph.add_node(PatternVertex { id, types, details })
    }

    pub fn add_edge(
        &mut self,
        src: NodeIndex,
        dst: NodeIndex,
        mut types: Vec<EdgeTriplet>,
        both: bool,
        details: ElementDetails,
    ) -> OptimizerResult<EdgeIndex> {
        if self.graph.node_weight(src).is_none() || self.graph.node_weight(dst).is_none() {
            return Err(OptimizerError::invariant(format!(
                "edge endpoints {:?} -> {:?} are not in pattern {}",
                src, dst, self.id
            )));
        }
        types.sort_unstable();
        types.dedup();
        self.invalidate_order();
        let id = self.graph.edge_count();
        Ok(self.graph.add_edge(
            src,
            dst,
            PatternEdge {
                id,
                types,
                both,
                details,
            },
        ))
    }

    fn invalidate_order(&mut self) {
        self.vertex_order.clear();
        self.vertex_by_order.clear();
        self.edge_order.clear();
        self.edge_by_order.clear();
        self.code.clear();
    }

    pub fn is_ordered(&self) -> bool {
        self.vertex_by_order.len() == self.graph.node_count()
            && self.edge_by_order.len() == self.graph.edge_count()
    }

    pub fn vertex(&self, node: NodeIndex) -> Option<&PatternVertex> {
        self.graph.node_weight(node)
    }

    pub fn edge(&self, edge: EdgeIndex) -> Option<&PatternEdge> {
        self.graph.edge_weight(edge)
    }

    pub fn endpoints(&self, edge: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(edge)
    }

    /// Vertices in canonical order, insertion order before `reorder`
    pub fn vertices(&self) -> Vec<NodeIndex> {
        if self.is_ordered() {
            self.vertex_by_order.clone()
        } else {
            self.graph.node_indices().collect()
        }
    }

    /// Edges in canonical order, insertion order before `reorder`
    pub fn edges(&self) -> Vec<EdgeIndex> {
        if self.is_ordered() {
            self.edge_by_order.clone()
        } else {
            self.graph.edge_indices().collect()
        }
    }

    pub fn vertex_order(&self, node: NodeIndex) -> Option<usize> {
        self.vertex_order.get(node.index()).copied()
    }

    pub fn vertex_by_order(&self, order: usize) -> Option<NodeIndex> {
        self.vertex_by_order.get(order).copied()
    }

    pub fn edge_order(&self, edge: EdgeIndex) -> Option<usize> {
        self.edge_order.get(edge.index()).copied()
    }

    pub fn edge_by_order(&self, order: usize) -> Option<EdgeIndex> {
        self.edge_by_order.get(order).copied()
    }

    /// Edges touching `node` in either direction
    pub fn incident_edges(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(node, EdgeDir::Outgoing)
            .chain(self.graph.edges_directed(node, EdgeDir::Incoming))
            .map(|e| e.id())
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Canonical shape code; empty before `reorder`
    ///
    /// Equal for isomorphic patterns whenever the canonical search fits its
    /// budget. Past it, a tied class is split at the vertex whose
    /// individualization refines to the smallest partition, so the code can
    /// still depend on insertion order between vertices that no refinement
    /// step tells apart.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Shape code plus element statistics in canonical order
    pub fn memo_key(&self) -> String {
        let mut key = self.code.clone();
        for node in &self.vertex_by_order {
            if let Some(v) = self.graph.node_weight(*node) {
                let _ = write!(key, "|{:.6}", v.details.selectivity);
            }
        }
        for edge in &self.edge_by_order {
            if let Some(e) = self.graph.edge_weight(*edge) {
                let _ = write!(key, "|{:.6}", e.details.selectivity);
            }
        }
        key
    }

    /// Product of the selectivities of every element
    pub fn selectivity(&self) -> f64 {
        let vertices: f64 = self
            .graph
            .node_weights()
            .map(|v| v.details.selectivity)
            .product();
        let edges: f64 = self
            .graph
            .edge_weights()
            .map(|e| e.details.selectivity)
            .product();
        vertices * edges
    }

    /// Every edge's endpoint labels must equal the labels its type admits
    pub fn check_consistency(&self) -> OptimizerResult<()> {
        for edge in self.graph.edge_references() {
            let weight = edge.weight();
            let src = self.graph[edge.source()].type_set();
            let dst = self.graph[edge.target()].type_set();
            let edge_src = weight.src_labels();
            let edge_dst = weight.dst_labels();

            let directed = src == edge_src && dst == edge_dst;
            let undirected = weight.both
                && ((src == edge_dst && dst == edge_src)
                    || src.union(&dst).copied().collect::<BTreeSet<_>>()
                        == edge_src.union(&edge_dst).copied().collect::<BTreeSet<_>>());
            if !(directed || undirected) {
                return Err(OptimizerError::invariant(format!(
                    "edge {} admits {:?} -> {:?} but its endpoints have types {:?} -> {:?}",
                    weight.id, edge_src, edge_dst, src, dst
                )));
            }
        }
        Ok(())
    }

    /// Compute the canonical order of vertices and edges
    pub fn reorder(&mut self) {
        self.reorder_with_budget(CANONICAL_SEARCH_BUDGET);
    }

    fn reorder_with_budget(&mut self, mut budget: usize) {
        let n = self.graph.node_count();
        let order = if n == 0 {
            Vec::new()
        } else {
            self.canonical_search(self.initial_colors(), &mut budget).1
        };

        self.vertex_order = vec![0; n];
        for (pos, node) in order.iter().enumerate() {
            self.vertex_order[node.index()] = pos;
        }
        self.vertex_by_order = order;

        let mut edges: Vec<EdgeIndex> = self.graph.edge_indices().collect();
        edges.sort_by_key(|e| (self.edge_sort_key(*e), e.index()));
        self.edge_order = vec![0; edges.len()];
        for (pos, edge) in edges.iter().enumerate() {
            self.edge_order[edge.index()] = pos;
        }
        self.edge_by_order = edges;
        self.code = self.encode(&self.vertex_by_order);
    }

    fn edge_sort_key(&self, edge: EdgeIndex) -> (usize, usize, bool, Vec<EdgeTriplet>) {
        let (src, dst) = self
            .graph
            .edge_endpoints(edge)
            .unwrap_or((NodeIndex::end(), NodeIndex::end()));
        let weight = &self.graph[edge];
        let (a, b) = (self.vertex_order[src.index()], self.vertex_order[dst.index()]);
        let (a, b) = if weight.both { (a.min(b), a.max(b)) } else { (a, b) };
        (a, b, weight.both, weight.types.clone())
    }

    fn initial_colors(&self) -> Vec<u64> {
        let types: BTreeSet<&Vec<LabelId>> = self.graph.node_weights().map(|v| &v.types).collect();
        let rank: BTreeMap<&Vec<LabelId>, u64> = types
            .into_iter()
            .enumerate()
            .map(|(i, t)| (t, i as u64))
            .collect();
        self.graph
            .node_weights()
            .map(|v| rank.get(&v.types).copied().unwrap_or(0))
            .collect()
    }

    /// Color refinement: split classes by the multiset of (edge type, neighbor class)
    fn refine(&self, mut colors: Vec<u64>) -> Vec<u64> {
        let mut classes = colors.iter().collect::<BTreeSet<_>>().len();
        loop {
            let signatures: Vec<(u64, Vec<(u8, bool, Vec<EdgeTriplet>, u64)>)> = self
                .graph
                .node_indices()
                .map(|node| {
                    let mut neighborhood: Vec<(u8, bool, Vec<EdgeTriplet>, u64)> = self
                        .graph
                        .edges_directed(node, EdgeDir::Outgoing)
                        .map(|e| (0u8, e.target(), e.weight()))
                        .chain(
                            self.graph
                                .edges_directed(node, EdgeDir::Incoming)
                                .map(|e| (1u8, e.source(), e.weight())),
                        )
                        .map(|(dir, other, w)| {
                            let dir = if w.both { 2 } else { dir };
                            (dir, w.both, w.types.clone(), colors[other.index()])
                        })
                        .collect();
                    neighborhood.sort();
                    (colors[node.index()], neighborhood)
                })
                .collect();

            let distinct: BTreeSet<&(u64, Vec<(u8, bool, Vec<EdgeTriplet>, u64)>)> =
                signatures.iter().collect();
            let rank: BTreeMap<_, u64> = distinct
                .iter()
                .enumerate()
                .map(|(i, s)| (*s, i as u64))
                .collect();
            colors = signatures
                .iter()
                .map(|s| rank.get(s).copied().unwrap_or(0))
                .collect();

            let refined = rank.len();
            if refined == classes {
                return colors;
            }
            classes = refined;
        }
    }

    /// Individualize-and-refine until every vertex has its own color, keeping
    /// the ordering with the smallest code
    fn canonical_search(&self, colors: Vec<u64>, budget: &mut usize) -> (String, Vec<NodeIndex>) {
        let colors = self.refine(colors);

        let mut classes: BTreeMap<u64, Vec<NodeIndex>> = BTreeMap::new();
        for node in self.graph.node_indices() {
            classes.entry(colors[node.index()]).or_default().push(node);
        }

        let tied = classes.values().find(|members| members.len() > 1).cloned();
        let Some(members) = tied else {
            let order: Vec<NodeIndex> = classes.into_values().flatten().collect();
            return (self.encode(&order), order);
        };

        let candidates = if *budget > 0 {
            members.clone()
        } else {
            self.tie_break(&colors, &members).into_iter().collect()
        };
        let mut best: Option<(String, Vec<NodeIndex>)> = None;
        for chosen in candidates {
            *budget = budget.saturating_sub(1);
            let candidate = self.canonical_search(individualize(&colors, &members, chosen), budget);
            if best.as_ref().map_or(true, |(code, _)| candidate.0 < *code) {
                best = Some(candidate);
            }
        }
        best.unwrap_or_default()
    }

    /// Member whose individualization refines to the smallest color multiset
    fn tie_break(&self, colors: &[u64], members: &[NodeIndex]) -> Option<NodeIndex> {
        members.iter().copied().min_by_key(|chosen| {
            let mut refined = self.refine(individualize(colors, members, *chosen));
            refined.sort_unstable();
            refined
        })
    }

    fn encode(&self, order: &[NodeIndex]) -> String {
        let mut position = vec![0usize; self.graph.node_count()];
        for (pos, node) in order.iter().enumerate() {
            position[node.index()] = pos;
        }

        let vertices: Vec<String> = order
            .iter()
            .map(|n| {
                self.graph[*n]
                    .types
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect();

        let mut edges: Vec<(usize, usize, bool, String)> = self
            .graph
            .edge_references()
            .map(|e| {
                let (a, b) = (position[e.source().index()], position[e.target().index()]);
                let w = e.weight();
                let (a, b) = if w.both { (a.min(b), a.max(b)) } else { (a, b) };
                let types = w
                    .types
                    .iter()
                    .map(|t| format!("{}/{}/{}", t.label, t.src_label, t.dst_label))
                    .collect::<Vec<_>>()
                    .join(",");
                (a, b, w.both, types)
            })
            .collect();
        edges.sort();

        let edges: Vec<String> = edges
            .into_iter()
            .map(|(a, b, both, types)| {
                format!("{}{}{}:{}", a, if both { "-" } else { ">" }, b, types)
            })
            .collect();
        format!("V[{}]E[{}]", vertices.join(";"), edges.join(";"))
    }

    /// Whether the vertices, minus `exclude`, form one connected component
    pub fn is_connected_without(&self, exclude: Option<NodeIndex>) -> bool {
        let Some(cut) = exclude else {
            return connected_components(&self.graph) <= 1;
        };
        let remaining = self.graph.node_count() - 1;
        match self.graph.node_indices().find(|n| *n != cut) {
            Some(start) => self.component(start, exclude).len() == remaining,
            None => true,
        }
    }

    /// Connected components left after removing `cut`
    pub fn components_without(&self, cut: NodeIndex) -> Vec<BTreeSet<NodeIndex>> {
        let mut seen: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut components = Vec::new();
        for node in self.graph.node_indices() {
            if node == cut || seen.contains(&node) {
                continue;
            }
            let component = self.component(node, Some(cut));
            seen.extend(component.iter().copied());
            components.push(component);
        }
        components
    }

    /// Vertices reachable from `node`, ignoring edge direction
    pub fn component_of(&self, node: NodeIndex) -> BTreeSet<NodeIndex> {
        self.component(node, None)
    }

    fn component(&self, start: NodeIndex, exclude: Option<NodeIndex>) -> BTreeSet<NodeIndex> {
        let undirected: UnGraph<(), ()> = self.graph.map(|_, _| (), |_, _| ()).into_edge_type();
        let visible = NodeFiltered::from_fn(&undirected, |n| Some(n) != exclude);
        let mut bfs = Bfs::new(&visible, start);
        let mut visited = BTreeSet::new();
        while let Some(node) = bfs.next(&visible) {
            visited.insert(node);
        }
        visited
    }

    /// Induced sub-pattern over the vertices at the given canonical orders.
    ///
    /// Returns the reordered sub-pattern and, for each of its vertex orders,
    /// the corresponding order in `self`.
    pub fn sub_pattern(&self, orders: &[usize]) -> OptimizerResult<(Pattern, Vec<usize>)> {
        let mut sub = Pattern::new();
        let mut node_map: BTreeMap<NodeIndex, NodeIndex> = BTreeMap::new();
        let mut parent_order_of: Vec<usize> = Vec::with_capacity(orders.len());

        let mut sorted = orders.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for order in sorted {
            let node = self.vertex_by_order(order).ok_or_else(|| {
                OptimizerError::invariant(format!(
                    "vertex order {} is not in pattern {}",
                    order, self.id
                ))
            })?;
            let vertex = &self.graph[node];
            let copy = sub.add_vertex(vertex.types.clone(), vertex.details);
            node_map.insert(node, copy);
            parent_order_of.push(order);
        }

        for edge in &self.edge_by_order {
            let Some((src, dst)) = self.graph.edge_endpoints(*edge) else {
                continue;
            };
            if let (Some(s), Some(d)) = (node_map.get(&src), node_map.get(&dst)) {
                let w = &self.graph[*edge];
                sub.add_edge(*s, *d, w.types.clone(), w.both, w.details)?;
            }
        }
        sub.reorder();

        let mapping = sub
            .vertex_by_order
            .iter()
            .map(|node| parent_order_of[node.index()])
            .collect();
        Ok((sub, mapping))
    }
}
