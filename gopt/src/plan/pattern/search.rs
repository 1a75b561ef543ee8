// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cost-based decomposition of patterns
//!
//! A [`PatternPlan`] describes how to build a pattern bottom-up: start from a
//! single vertex, repeatedly extend the partial pattern by one vertex through
//! one or more edges (several edges into the same vertex require an
//! intersection), or join two sub-patterns that share vertices. Every child
//! plan carries its own pattern with its own canonical order, plus a mapping
//! from those orders into the parent's.

use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::logical::Direction;
use crate::plan::pattern::graph::Pattern;
use crate::schema::LabelId;
use log::debug;
use petgraph::graph::NodeIndex;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;
use std::sync::Arc;

/// Vertex count assumed when the catalog knows nothing about a label
pub const DEFAULT_VERTEX_CARDINALITY: f64 = 1000.0;

/// Average fan-out assumed when the catalog knows nothing about an edge
pub const DEFAULT_EXPAND_FACTOR: f64 = 5.0;

/// Pattern-shape → cardinality statistics
pub trait PatternCatalog: Send + Sync + std::fmt::Debug {
    /// Estimated match count of `pattern` ignoring element filters, `None` if unknown
    fn cardinality(&self, pattern: &Pattern) -> Option<f64>;
}

/// Search for the cheapest decomposition of a pattern
pub trait PatternSearch: Send + std::fmt::Debug {
    fn best_plan(&mut self, pattern: &Pattern) -> OptimizerResult<PatternPlan>;

    /// Discard memoized state
    fn clear(&mut self);
}

/// One edge of an extend step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendEdge {
    /// Order of the already-bound endpoint in the target pattern
    pub source: usize,
    /// Canonical order of the edge in the target pattern
    pub edge: usize,
    /// Direction as seen from `source`
    pub direction: Direction,
}

/// Bind `target` through `edges`; more than one edge means an intersection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendStep {
    pub target: usize,
    pub edges: Vec<ExtendEdge>,
}

impl ExtendStep {
    pub fn is_intersect(&self) -> bool {
        self.edges.len() > 1
    }
}

#[derive(Debug, Clone)]
pub enum PlanStep {
    /// Scan of the single vertex of a one-vertex pattern
    Root,
    Extend {
        source: Box<PatternPlan>,
        /// source order → target order
        source_to_target: Vec<usize>,
        step: ExtendStep,
    },
    Join {
        left: Box<PatternPlan>,
        left_to_target: Vec<usize>,
        right: Box<PatternPlan>,
        right_to_target: Vec<usize>,
        /// Target orders present on both sides
        join_vertices: Vec<usize>,
    },
}

/// Decomposition of `pattern`
#[derive(Debug, Clone)]
pub struct PatternPlan {
    pub pattern: Pattern,
    pub step: PlanStep,
    pub cost: f64,
}

impl PatternPlan {
    pub fn root(pattern: Pattern, cost: f64) -> OptimizerResult<PatternPlan> {
        if pattern.vertex_count() != 1 {
            return Err(OptimizerError::invariant(format!(
                "root plan over a pattern of {} vertices",
                pattern.vertex_count()
            )));
        }
        Ok(PatternPlan {
            pattern,
            step: PlanStep::Root,
            cost,
        })
    }

    /// Extend `source` by the vertex at `target` of `pattern`, through every
    /// edge connecting it to the source's vertices
    pub fn extend(
        pattern: Pattern,
        source: PatternPlan,
        source_to_target: Vec<usize>,
        target: usize,
        cost: f64,
    ) -> OptimizerResult<PatternPlan> {
        if source_to_target.len() != source.pattern.vertex_count()
            || source_to_target.len() + 1 != pattern.vertex_count()
            || source_to_target.contains(&target)
        {
            return Err(OptimizerError::invariant(format!(
                "extend of {} vertices to {} does not add exactly vertex {}",
                source.pattern.vertex_count(),
                pattern.vertex_count(),
                target
            )));
        }

        let target_node = pattern
            .vertex_by_order(target)
            .ok_or_else(|| OptimizerError::invariant(format!("no vertex at order {}", target)))?;
        let mut edges = Vec::new();
        for edge in pattern.incident_edges(target_node) {
            let (src, dst) = pattern
                .endpoints(edge)
                .ok_or_else(|| OptimizerError::invariant("dangling pattern edge"))?;
            let both = pattern.edge(edge).map(|e| e.both).unwrap_or(false);
            let (other, direction) = if src == target_node {
                (dst, Direction::In)
            } else {
                (src, Direction::Out)
            };
            let direction = if both { Direction::Both } else { direction };
            let other = pattern
                .vertex_order(other)
                .ok_or_else(|| OptimizerError::invariant("unordered pattern vertex"))?;
            let order = pattern
                .edge_order(edge)
                .ok_or_else(|| OptimizerError::invariant("unordered pattern edge"))?;
            edges.push(ExtendEdge {
                source: other,
                edge: order,
                direction,
            });
        }
        edges.sort_by_key(|e| e.edge);

        if edges.is_empty() {
            return Err(OptimizerError::invariant(format!(
                "vertex {} is not connected to the partial pattern",
                target
            )));
        }

        Ok(PatternPlan {
            pattern,
            step: PlanStep::Extend {
                source: Box::new(source),
                source_to_target,
                step: ExtendStep { target, edges },
            },
            cost,
        })
    }

    pub fn join(
        pattern: Pattern,
        left: PatternPlan,
        left_to_target: Vec<usize>,
        right: PatternPlan,
        right_to_target: Vec<usize>,
        cost: f64,
    ) -> OptimizerResult<PatternPlan> {
        let l: BTreeSet<usize> = left_to_target.iter().copied().collect();
        let r: BTreeSet<usize> = right_to_target.iter().copied().collect();
        if l.union(&r).count() != pattern.vertex_count() {
            return Err(OptimizerError::invariant(
                "join sides do not cover the pattern",
            ));
        }
        let join_vertices = l.intersection(&r).copied().collect();
        Ok(PatternPlan {
            pattern,
            step: PlanStep::Join {
                left: Box::new(left),
                left_to_target,
                right: Box::new(right),
                right_to_target,
                join_vertices,
            },
            cost,
        })
    }

    /// Number of intersect steps in the whole decomposition
    pub fn intersect_count(&self) -> usize {
        match &self.step {
            PlanStep::Root => 0,
            PlanStep::Extend { source, step, .. } => {
                source.intersect_count() + usize::from(step.is_intersect())
            }
            PlanStep::Join { left, right, .. } => left.intersect_count() + right.intersect_count(),
        }
    }

    /// One-line rendering in the plan's own orders
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out);
        out
    }

    fn describe_into(&self, out: &mut String) {
        match &self.step {
            PlanStep::Root => {
                let _ = write!(out, "Root");
            }
            PlanStep::Extend { source, step, .. } => {
                let _ = write!(out, "Extend(v{} <- [", step.target);
                let edges: Vec<String> = step
                    .edges
                    .iter()
                    .map(|e| format!("v{} {:?} e{}", e.source, e.direction, e.edge))
                    .collect();
                let _ = write!(out, "{}], ", edges.join(", "));
                source.describe_into(out);
                out.push(')');
            }
            PlanStep::Join {
                left,
                right,
                join_vertices,
                ..
            } => {
                let _ = write!(out, "Join({:?}, ", join_vertices);
                left.describe_into(out);
                out.push_str(", ");
                right.describe_into(out);
                out.push(')');
            }
        }
    }
}

/// Knobs of [`ExtendSearch`]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub max_pattern_size: usize,
    pub join_min_pattern_size: usize,
    pub join_queue_capacity: usize,
    /// Label pairs join decomposition is restricted to, `None` for no restriction
    pub foreign_keys: Option<Vec<(LabelId, LabelId)>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_pattern_size: 3,
            join_min_pattern_size: 5,
            join_queue_capacity: 3,
            foreign_keys: None,
        }
    }
}

/// Memoizing top-down search over extend and join decompositions
#[derive(Debug)]
pub struct ExtendSearch {
    catalog: Arc<dyn PatternCatalog>,
    options: SearchOptions,
    memo: HashMap<String, PatternPlan>,
    shape_cardinality: HashMap<String, f64>,
}

impl ExtendSearch {
    pub fn new(catalog: Arc<dyn PatternCatalog>, options: SearchOptions) -> Self {
        Self {
            catalog,
            options,
            memo: HashMap::new(),
            shape_cardinality: HashMap::new(),
        }
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    fn search(&mut self, pattern: &Pattern) -> OptimizerResult<PatternPlan> {
        let key = pattern.memo_key();
        if let Some(plan) = self.memo.get(&key) {
            return Ok(plan.clone());
        }

        let cardinality = self.cardinality(pattern)?;
        let n = pattern.vertex_count();
        let plan = if n == 1 {
            PatternPlan::root(pattern.clone(), cardinality)?
        } else if !pattern.is_connected_without(None) {
            self.cross_join(pattern, cardinality)?
        } else {
            let mut best: Option<PatternPlan> = None;
            for candidate in self.extend_candidates(pattern, cardinality)? {
                if best.as_ref().map_or(true, |b| candidate.cost < b.cost) {
                    best = Some(candidate);
                }
            }
            if n >= self.options.join_min_pattern_size {
                for candidate in self.join_candidates(pattern, cardinality)? {
                    if best.as_ref().map_or(true, |b| candidate.cost < b.cost) {
                        best = Some(candidate);
                    }
                }
            }
            best.ok_or_else(|| {
                OptimizerError::invariant(format!("no decomposition of pattern {}", pattern.code()))
            })?
        };

        debug!(
            "pattern {} ({} vertices): {} cost={:.2}",
            pattern.id(),
            n,
            plan.describe(),
            plan.cost
        );
        self.memo.insert(key, plan.clone());
        Ok(plan)
    }

    fn extend_candidates(
        &mut self,
        pattern: &Pattern,
        cardinality: f64,
    ) -> OptimizerResult<Vec<PatternPlan>> {
        let n = pattern.vertex_count();
        let mut candidates = Vec::new();
        for order in 0..n {
            let node = pattern
                .vertex_by_order(order)
                .ok_or_else(|| OptimizerError::invariant("unordered pattern"))?;
            if !pattern.is_connected_without(Some(node)) {
                continue;
            }
            let rest: Vec<usize> = (0..n).filter(|o| *o != order).collect();
            let (sub, mapping) = pattern.sub_pattern(&rest)?;
            let sub_plan = self.search(&sub)?;
            let cost = sub_plan.cost + cardinality;
            candidates.push(PatternPlan::extend(
                pattern.clone(),
                sub_plan,
                mapping,
                order,
                cost,
            )?);
        }
        Ok(candidates)
    }

    /// Binary joins at cut vertices, at most `join_queue_capacity` of them
    fn join_candidates(
        &mut self,
        pattern: &Pattern,
        cardinality: f64,
    ) -> OptimizerResult<Vec<PatternPlan>> {
        let mut candidates = Vec::new();
        for cut in pattern.vertices() {
            if candidates.len() >= self.options.join_queue_capacity {
                break;
            }
            let components = pattern.components_without(cut);
            if components.len() < 2 || !self.allowed_by_foreign_keys(pattern, cut) {
                continue;
            }
            let cut_order = pattern
                .vertex_order(cut)
                .ok_or_else(|| OptimizerError::invariant("unordered pattern"))?;
            let mut left_orders: Vec<usize> = components[0]
                .iter()
                .filter_map(|n| pattern.vertex_order(*n))
                .collect();
            let mut right_orders: Vec<usize> = components[1..]
                .iter()
                .flatten()
                .filter_map(|n| pattern.vertex_order(*n))
                .collect();
            left_orders.push(cut_order);
            right_orders.push(cut_order);

            let (left, left_map) = pattern.sub_pattern(&left_orders)?;
            let (right, right_map) = pattern.sub_pattern(&right_orders)?;
            let left_plan = self.search(&left)?;
            let right_plan = self.search(&right)?;
            let cost = left_plan.cost + right_plan.cost + cardinality;
            candidates.push(PatternPlan::join(
                pattern.clone(),
                left_plan,
                left_map,
                right_plan,
                right_map,
                cost,
            )?);
        }
        Ok(candidates)
    }

    fn allowed_by_foreign_keys(&self, pattern: &Pattern, cut: NodeIndex) -> bool {
        let Some(keys) = &self.options.foreign_keys else {
            return true;
        };
        let Some(cut_types) = pattern.vertex(cut).map(|v| v.type_set()) else {
            return false;
        };
        pattern.incident_edges(cut).into_iter().any(|edge| {
            let Some((src, dst)) = pattern.endpoints(edge) else {
                return false;
            };
            let other = if src == cut { dst } else { src };
            let other_types = pattern.vertex(other).map(|v| v.type_set()).unwrap_or_default();
            keys.iter().any(|(s, t)| {
                (other_types.contains(s) && cut_types.contains(t))
                    || (cut_types.contains(s) && other_types.contains(t))
            })
        })
    }

    /// Join the component of the first vertex with the rest, without join keys
    fn cross_join(&mut self, pattern: &Pattern, cardinality: f64) -> OptimizerResult<PatternPlan> {
        let first = pattern
            .vertex_by_order(0)
            .ok_or_else(|| OptimizerError::invariant("unordered pattern"))?;
        let n = pattern.vertex_count();
        let left_orders: Vec<usize> = pattern
            .component_of(first)
            .into_iter()
            .filter_map(|node| pattern.vertex_order(node))
            .collect();
        let right_orders: Vec<usize> = (0..n).filter(|o| !left_orders.contains(o)).collect();

        let (left, left_map) = pattern.sub_pattern(&left_orders)?;
        let (right, right_map) = pattern.sub_pattern(&right_orders)?;
        let left_plan = self.search(&left)?;
        let right_plan = self.search(&right)?;
        let cost = left_plan.cost + right_plan.cost + cardinality;
        PatternPlan::join(
            pattern.clone(),
            left_plan,
            left_map,
            right_plan,
            right_map,
            cost,
        )
    }

    /// Estimated match count including element selectivities
    fn cardinality(&mut self, pattern: &Pattern) -> OptimizerResult<f64> {
        Ok(self.shape_cardinality(pattern)? * pattern.selectivity())
    }

    fn shape_cardinality(&mut self, pattern: &Pattern) -> OptimizerResult<f64> {
        if let Some(known) = self.shape_cardinality.get(pattern.code()) {
            return Ok(*known);
        }
        let n = pattern.vertex_count();
        let from_catalog = if n <= self.options.max_pattern_size {
            self.catalog.cardinality(pattern)
        } else {
            None
        };
        let value = match from_catalog {
            Some(value) => value,
            None => self.extrapolate(pattern)?,
        };
        self.shape_cardinality.insert(pattern.code().to_string(), value);
        Ok(value)
    }

    /// Grow the estimate of a smaller sub-pattern by the fan-out of the
    /// edges reaching the removed vertex
    fn extrapolate(&mut self, pattern: &Pattern) -> OptimizerResult<f64> {
        let n = pattern.vertex_count();
        if n == 0 {
            return Ok(0.0);
        }
        if n == 1 {
            return Ok(DEFAULT_VERTEX_CARDINALITY);
        }
        if !pattern.is_connected_without(None) {
            // independent components multiply
            let first = pattern
                .vertex_by_order(0)
                .ok_or_else(|| OptimizerError::invariant("unordered pattern"))?;
            let reached = pattern.component_of(first);
            let (left, right): (Vec<usize>, Vec<usize>) = (0..n).partition(|o| {
                pattern
                    .vertex_by_order(*o)
                    .map(|node| reached.contains(&node))
                    .unwrap_or(false)
            });
            let (l, _) = pattern.sub_pattern(&left)?;
            let (r, _) = pattern.sub_pattern(&right)?;
            return Ok(self.shape_cardinality(&l)? * self.shape_cardinality(&r)?);
        }

        let removed = (0..n)
            .rev()
            .filter_map(|o| pattern.vertex_by_order(o))
            .find(|node| pattern.is_connected_without(Some(*node)))
            .ok_or_else(|| OptimizerError::invariant("connected pattern without a removable vertex"))?;
        let removed_order = pattern
            .vertex_order(removed)
            .ok_or_else(|| OptimizerError::invariant("unordered pattern"))?;
        let rest: Vec<usize> = (0..n).filter(|o| *o != removed_order).collect();
        let (sub, _) = pattern.sub_pattern(&rest)?;
        let base = self.shape_cardinality(&sub)?;

        let mut neighbors: BTreeSet<usize> = BTreeSet::new();
        for edge in pattern.incident_edges(removed) {
            if let Some((src, dst)) = pattern.endpoints(edge) {
                let other = if src == removed { dst } else { src };
                if let Some(order) = pattern.vertex_order(other) {
                    neighbors.insert(order);
                }
            }
        }

        let mut factor = 1.0;
        for neighbor in neighbors {
            if n == 2 {
                let edges = pattern.edge_count() as i32;
                factor *= DEFAULT_EXPAND_FACTOR.powi(edges);
                continue;
            }
            let (pair, _) = pattern.sub_pattern(&[neighbor, removed_order])?;
            let (single, _) = pattern.sub_pattern(&[neighbor])?;
            let single = self.shape_cardinality(&single)?;
            factor *= if single > 0.0 {
                self.shape_cardinality(&pair)? / single
            } else {
                0.0
            };
        }
        Ok(base * factor)
    }
}

impl PatternSearch for ExtendSearch {
    fn best_plan(&mut self, pattern: &Pattern) -> OptimizerResult<PatternPlan> {
        if !pattern.is_ordered() {
            return Err(OptimizerError::invariant(format!(
                "pattern {} was not reordered before search",
                pattern.id()
            )));
        }
        self.search(pattern)
    }

    fn clear(&mut self) {
        debug!(
            "clearing pattern search memo ({} plans, {} shapes)",
            self.memo.len(),
            self.shape_cardinality.len()
        );
        self.memo.clear();
        self.shape_cardinality.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::pattern::graph::ElementDetails;
    use crate::schema::EdgeTriplet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingCatalog {
        calls: AtomicUsize,
    }

    impl PatternCatalog for CountingCatalog {
        fn cardinality(&self, pattern: &Pattern) -> Option<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(10f64.powi(pattern.vertex_count() as i32))
        }
    }

    fn path(len: usize) -> Pattern {
        let mut p = Pattern::new();
        let nodes: Vec<_> = (0..len)
            .map(|_| p.add_vertex(vec![0], ElementDetails::default()))
            .collect();
        for pair in nodes.windows(2) {
            p.add_edge(
                pair[0],
                pair[1],
                vec![EdgeTriplet::new(0, 0, 0)],
                false,
                ElementDetails::default(),
            )
            .unwrap();
        }
        p.reorder();
        p
    }

    #[test]
    fn test_single_vertex_is_root() {
        let mut search = ExtendSearch::new(Arc::new(CountingCatalog::default()), SearchOptions::default());
        let plan = search.best_plan(&path(1)).unwrap();
        assert!(matches!(plan.step, PlanStep::Root));
        assert_eq!(plan.cost, 10.0);
    }

    #[test]
    fn test_path_is_built_by_extends() {
        let mut search = ExtendSearch::new(Arc::new(CountingCatalog::default()), SearchOptions::default());
        let plan = search.best_plan(&path(3)).unwrap();
        match &plan.step {
            PlanStep::Extend { step, source, source_to_target } => {
                assert_eq!(step.edges.len(), 1);
                assert_eq!(source.pattern.vertex_count(), 2);
                assert_eq!(source_to_target.len(), 2);
                assert!(!source_to_target.contains(&step.target));
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(plan.intersect_count(), 0);
    }

    #[test]
    fn test_unordered_pattern_is_rejected() {
        let mut search = ExtendSearch::new(Arc::new(CountingCatalog::default()), SearchOptions::default());
        let mut p = Pattern::new();
        p.add_vertex(vec![0], ElementDetails::default());
        assert!(search.best_plan(&p).is_err());
    }

    #[test]
    fn test_clear_forces_catalog_reconsultation() {
        let catalog = Arc::new(CountingCatalog::default());
        let mut search = ExtendSearch::new(catalog.clone(), SearchOptions::default());
        let pattern = path(3);

        search.best_plan(&pattern).unwrap();
        let first = catalog.calls.load(Ordering::SeqCst);
        assert!(first > 0);

        search.best_plan(&pattern).unwrap();
        assert_eq!(catalog.calls.load(Ordering::SeqCst), first);

        search.clear();
        assert_eq!(search.memo_len(), 0);
        search.best_plan(&pattern).unwrap();
        assert!(catalog.calls.load(Ordering::SeqCst) > first);
    }

    #[test]
    fn test_disconnected_pattern_becomes_cross_join() {
        let mut p = Pattern::new();
        p.add_vertex(vec![0], ElementDetails::default());
        p.add_vertex(vec![1], ElementDetails::default());
        p.reorder();
        let mut search = ExtendSearch::new(Arc::new(CountingCatalog::default()), SearchOptions::default());
        let plan = search.best_plan(&p).unwrap();
        match plan.step {
            PlanStep::Join { join_vertices, .. } => assert!(join_vertices.is_empty()),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_large_path_considers_joins() {
        let options = SearchOptions {
            max_pattern_size: 2,
            join_min_pattern_size: 5,
            join_queue_capacity: 1,
            foreign_keys: None,
        };
        let mut search = ExtendSearch::new(Arc::new(CountingCatalog::default()), options);
        let plan = search.best_plan(&path(5)).unwrap();
        assert_eq!(plan.pattern.vertex_count(), 5);
        assert!(plan.cost.is_finite());
    }
}
