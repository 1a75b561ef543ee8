// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Conversion between match sub-plans and patterns
//!
//! [`PatternBridge::process_input`] replaces every (non-optional) match with a
//! `Pattern` node carrying the pattern and its element table.
//! [`PatternBridge::process_output`] asks a [`PatternSearch`] for the best
//! decomposition of each such pattern and rebuilds scan/expand/join operators
//! from it.

use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::estimate::CardinalityEstimator;
use crate::plan::expr::Expr;
use crate::plan::logical::{
    column_index, next_plan_id, Column, Direction, JoinType, LogicalNode, ProjectItem,
};
use crate::plan::nested::NestedPlans;
use crate::plan::pattern::element_table::{DataKey, DataValue, ElementTable};
use crate::plan::pattern::graph::{ElementDetails, Pattern};
use crate::plan::pattern::search::{ExtendEdge, PatternPlan, PatternSearch, PlanStep};
use crate::schema::{ElementKind, GraphSchemaType};
use log::debug;
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

/// A match replaced by its pattern
#[derive(Debug, Clone)]
pub struct MatchPattern {
    pub pattern: Pattern,
    pub table: ElementTable,
    /// Output columns of the replaced match
    pub columns: Vec<Column>,
}

impl PartialEq for MatchPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.id() == other.pattern.id()
            && self.table == other.table
            && self.columns == other.columns
    }
}

/// Alias, normalized filter and type of an element bound while walking a match
#[derive(Debug)]
struct Bound {
    alias: String,
    filter: Option<Expr>,
    schema_type: GraphSchemaType,
}

impl Bound {
    fn into_value(self) -> DataValue {
        DataValue {
            alias: self.alias,
            filter: self.filter,
            schema_type: self.schema_type,
        }
    }
}

/// Incremental pattern construction over the sentences of one match
struct PatternBuilder<'a> {
    estimator: &'a dyn CardinalityEstimator,
    pattern: Pattern,
    vertices: Vec<(NodeIndex, Bound)>,
    edges: Vec<(EdgeIndex, Bound)>,
    by_alias: HashMap<String, usize>,
}

impl<'a> PatternBuilder<'a> {
    fn new(estimator: &'a dyn CardinalityEstimator) -> Self {
        Self {
            estimator,
            pattern: Pattern::new(),
            vertices: Vec::new(),
            edges: Vec::new(),
            by_alias: HashMap::new(),
        }
    }

    /// The graph operators of a sentence, leaf first
    fn chain(sentence: &LogicalNode) -> OptimizerResult<Vec<&LogicalNode>> {
        let mut ops = Vec::new();
        let mut current = sentence;
        loop {
            match current {
                LogicalNode::Source { .. } => {
                    ops.push(current);
                    break;
                }
                LogicalNode::Expand { input, .. } | LogicalNode::GetVertex { input, .. } => {
                    ops.push(current);
                    current = input;
                }
                other => {
                    return Err(OptimizerError::unsupported(format!(
                        "{} inside a match sentence",
                        other.name()
                    )))
                }
            }
        }
        ops.reverse();
        Ok(ops)
    }

    /// Filter of a graph operator rewritten to address its own column at 0
    fn normalize_filter(alias: &str, filter: Option<&Expr>) -> OptimizerResult<Option<Expr>> {
        match filter {
            None => Ok(None),
            Some(f) if f.contains_subquery() => Err(OptimizerError::unsupported(format!(
                "sub-query in the filter of '{}'",
                alias
            ))),
            Some(f) => Ok(Some(f.retarget(alias, 0)?)),
        }
    }

    fn add_sentence(&mut self, sentence: &LogicalNode) -> OptimizerResult<()> {
        let ops = Self::chain(sentence)?;
        let mut ops = ops.into_iter();

        let source = ops
            .next()
            .ok_or_else(|| OptimizerError::invariant("match sentence without a source"))?;
        let LogicalNode::Source {
            alias,
            schema_type,
            filter,
        } = source
        else {
            return Err(OptimizerError::invariant("match sentence without a source"));
        };
        if schema_type.kind != ElementKind::Vertex {
            return Err(OptimizerError::unsupported(format!(
                "edge scan '{}' inside a match",
                alias
            )));
        }
        let mut previous = self.bind_vertex(source, alias, schema_type, filter.as_ref())?;

        while let Some(op) = ops.next() {
            let LogicalNode::Expand {
                start_alias,
                alias: edge_alias,
                direction,
                schema_type: edge_type,
                filter: edge_filter,
                ..
            } = op
            else {
                return Err(OptimizerError::unsupported(format!(
                    "{} without a preceding expand",
                    op.name()
                )));
            };
            let target_op = ops.next().ok_or_else(|| {
                OptimizerError::unsupported(format!(
                    "expand '{}' is not followed by a get-vertex",
                    edge_alias
                ))
            })?;
            let LogicalNode::GetVertex {
                edge_alias: read_alias,
                opt,
                alias,
                schema_type,
                filter,
                ..
            } = target_op
            else {
                return Err(OptimizerError::unsupported(format!(
                    "expand '{}' is followed by {}",
                    edge_alias,
                    target_op.name()
                )));
            };

            if read_alias != edge_alias {
                return Err(OptimizerError::invariant(format!(
                    "get-vertex '{}' reads '{}' but follows expand '{}'",
                    alias, read_alias, edge_alias
                )));
            }
            if *opt != direction.target_endpoint() {
                return Err(OptimizerError::unsupported(format!(
                    "get-vertex {:?} after a {:?} expand",
                    opt, direction
                )));
            }
            let start = self.vertex_node(start_alias)?;
            if start != previous {
                debug!("expand '{}' starts from '{}', not the previous vertex", edge_alias, start_alias);
            }
            let target = self.bind_vertex(target_op, alias, schema_type, filter.as_ref())?;
            if target == start {
                return Err(OptimizerError::unsupported(format!(
                    "self loop on '{}'",
                    start_alias
                )));
            }
            self.bind_edge(op, edge_alias, *direction, edge_type, edge_filter.as_ref(), start, target)?;
            previous = target;
        }
        Ok(())
    }

    fn vertex_node(&self, alias: &str) -> OptimizerResult<NodeIndex> {
        self.by_alias
            .get(alias)
            .and_then(|i| self.vertices.get(*i))
            .map(|(node, _)| *node)
            .ok_or_else(|| OptimizerError::invariant(format!("expand from unbound vertex '{}'", alias)))
    }

    fn bind_vertex(
        &mut self,
        node: &LogicalNode,
        alias: &str,
        schema_type: &GraphSchemaType,
        filter: Option<&Expr>,
    ) -> OptimizerResult<NodeIndex> {
        let filter = Self::normalize_filter(alias, filter)?;

        if let Some(index) = self.by_alias.get(alias) {
            let (existing, bound) = &self.vertices[*index];
            if bound.schema_type.label_ids() != schema_type.label_ids() {
                return Err(OptimizerError::invariant(format!(
                    "vertex '{}' is bound with labels {} and {}",
                    alias,
                    bound.schema_type.label_names(),
                    schema_type.label_names()
                )));
            }
            if let Some(repeated) = &filter {
                let recorded = bound.filter.as_ref().map(|f| f.conjuncts()).unwrap_or_default();
                if !repeated.conjuncts().iter().all(|c| recorded.contains(c)) {
                    return Err(OptimizerError::invariant(format!(
                        "repeated filter on '{}' is not part of its first filter",
                        alias
                    )));
                }
            }
            return Ok(*existing);
        }

        let selectivity = self.estimator.selectivity(node, filter.as_ref());
        let index = self.pattern.add_vertex(
            schema_type.label_ids(),
            ElementDetails::with_selectivity(selectivity),
        );
        self.by_alias.insert(alias.to_string(), self.vertices.len());
        self.vertices.push((
            index,
            Bound {
                alias: alias.to_string(),
                filter,
                schema_type: schema_type.clone(),
            },
        ));
        Ok(index)
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_edge(
        &mut self,
        node: &LogicalNode,
        alias: &str,
        direction: Direction,
        schema_type: &GraphSchemaType,
        filter: Option<&Expr>,
        start: NodeIndex,
        target: NodeIndex,
    ) -> OptimizerResult<()> {
        if schema_type.kind != ElementKind::Edge {
            return Err(OptimizerError::invariant(format!(
                "expand '{}' carries a vertex type",
                alias
            )));
        }
        if self.by_alias.contains_key(alias) || self.edges.iter().any(|(_, b)| b.alias == alias) {
            return Err(OptimizerError::unsupported(format!(
                "alias '{}' bound twice in one match",
                alias
            )));
        }
        let filter = Self::normalize_filter(alias, filter)?;
        let selectivity = self.estimator.selectivity(node, filter.as_ref());
        let (src, dst, both) = match direction {
            Direction::Out => (start, target, false),
            Direction::In => (target, start, false),
            Direction::Both => (start, target, true),
        };
        let index = self.pattern.add_edge(
            src,
            dst,
            schema_type.triplets(),
            both,
            ElementDetails::with_selectivity(selectivity),
        )?;
        self.edges.push((
            index,
            Bound {
                alias: alias.to_string(),
                filter,
                schema_type: schema_type.clone(),
            },
        ));
        Ok(())
    }

    /// Validate, order and key every element by its canonical order
    fn finish(mut self, columns: Vec<Column>) -> OptimizerResult<MatchPattern> {
        self.pattern.check_consistency()?;
        self.pattern.reorder();

        let mut table = ElementTable::new();
        for (node, bound) in self.vertices {
            table.insert(DataKey::of_vertex(&self.pattern, node)?, bound.into_value())?;
        }
        for (edge, bound) in self.edges {
            table.insert(DataKey::of_edge(&self.pattern, edge)?, bound.into_value())?;
        }
        Ok(MatchPattern {
            pattern: self.pattern,
            table,
            columns,
        })
    }
}

/// Converts matches into patterns and chosen decompositions back into plans
#[derive(Debug, Clone)]
pub struct PatternBridge {
    estimator: Arc<dyn CardinalityEstimator>,
}

impl PatternBridge {
    pub fn new(estimator: Arc<dyn CardinalityEstimator>) -> Self {
        Self { estimator }
    }

    /// Replace every non-optional match, including those in nested plans,
    /// with a pattern node
    pub fn process_input(&self, plan: LogicalNode) -> OptimizerResult<LogicalNode> {
        let mut nested = NestedPlans::new();
        self.input_pass(plan, &mut nested)
    }

    fn input_pass(&self, mut plan: LogicalNode, nested: &mut NestedPlans) -> OptimizerResult<LogicalNode> {
        nested.rewrite(&mut plan, &mut |sub, nested| self.input_pass(sub, nested))?;
        self.replace_matches(&mut plan)?;
        Ok(plan)
    }

    fn replace_matches(&self, node: &mut LogicalNode) -> OptimizerResult<()> {
        if matches!(node, LogicalNode::Match { optional: false, .. }) {
            let columns = node.output_columns();
            if let LogicalNode::Match { sentences, .. } = node {
                let pattern = self.match_to_pattern(sentences, columns)?;
                *node = LogicalNode::Pattern(Box::new(pattern));
            }
            return Ok(());
        }
        for input in node.inputs_mut() {
            self.replace_matches(input)?;
        }
        Ok(())
    }

    /// Build the pattern of one match from its sentences
    pub fn match_to_pattern(
        &self,
        sentences: &[LogicalNode],
        columns: Vec<Column>,
    ) -> OptimizerResult<MatchPattern> {
        let mut builder = PatternBuilder::new(self.estimator.as_ref());
        for sentence in sentences {
            builder.add_sentence(sentence)?;
        }
        let pattern = builder.finish(columns)?;
        debug!(
            "match of {} sentences bridged to pattern {} ({} vertices, {} edges)",
            sentences.len(),
            pattern.pattern.id(),
            pattern.pattern.vertex_count(),
            pattern.pattern.edge_count()
        );
        Ok(pattern)
    }

    /// Replace every pattern node with the plan of its best decomposition
    pub fn process_output(
        &self,
        plan: LogicalNode,
        search: &mut dyn PatternSearch,
    ) -> OptimizerResult<LogicalNode> {
        let mut nested = NestedPlans::new();
        self.output_pass(plan, search, &mut nested)
    }

    fn output_pass(
        &self,
        mut plan: LogicalNode,
        search: &mut dyn PatternSearch,
        nested: &mut NestedPlans,
    ) -> OptimizerResult<LogicalNode> {
        nested.rewrite(&mut plan, &mut |sub, nested| {
            self.output_pass(sub, &mut *search, nested)
        })?;
        self.replace_patterns(&mut plan, search)?;
        Ok(plan)
    }

    fn replace_patterns(&self, node: &mut LogicalNode, search: &mut dyn PatternSearch) -> OptimizerResult<()> {
        if let LogicalNode::Pattern(pattern) = node {
            let decision = search.best_plan(&pattern.pattern)?;
            *node = self.materialize(pattern, &decision)?;
            return Ok(());
        }
        for input in node.inputs_mut() {
            self.replace_patterns(input, search)?;
        }
        Ok(())
    }

    /// Build the operators of `decision` and restore the match's column order
    pub fn materialize(&self, matched: &MatchPattern, decision: &PatternPlan) -> OptimizerResult<LogicalNode> {
        if decision.pattern.code() != matched.pattern.code() {
            return Err(OptimizerError::invariant(format!(
                "decision for shape {} applied to pattern {}",
                decision.pattern.code(),
                matched.pattern.code()
            )));
        }
        let identity: Vec<usize> = (0..matched.pattern.vertex_count()).collect();
        let plan = self.build(matched, decision, &identity)?;

        let columns = plan.output_columns();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let expected: Vec<&str> = matched.columns.iter().map(|c| c.name.as_str()).collect();
        if names == expected {
            return Ok(plan);
        }

        let items = matched
            .columns
            .iter()
            .map(|column| {
                let index = column_index(&columns, &column.name).ok_or_else(|| {
                    OptimizerError::invariant(format!(
                        "alias '{}' lost while rebuilding pattern {}",
                        column.name,
                        matched.pattern.id()
                    ))
                })?;
                Ok(ProjectItem::new(Expr::var(index, &column.name), &column.name))
            })
            .collect::<OptimizerResult<Vec<_>>>()?;
        Ok(plan.project(items, false))
    }

    /// `to_top` maps `decision`'s vertex orders to orders of `matched.pattern`
    fn build(
        &self,
        matched: &MatchPattern,
        decision: &PatternPlan,
        to_top: &[usize],
    ) -> OptimizerResult<LogicalNode> {
        match &decision.step {
            PlanStep::Root => {
                let value = matched.table.get(&DataKey::vertex(0).translate(to_top)?)?;
                Ok(LogicalNode::Source {
                    alias: value.alias.clone(),
                    schema_type: value.schema_type.clone(),
                    filter: retarget(value, 0)?,
                })
            }
            PlanStep::Extend {
                source,
                source_to_target,
                step,
            } => {
                let source_to_top = compose(source_to_target, to_top)?;
                let input = self.build(matched, source, &source_to_top)?;
                let target = matched
                    .table
                    .get(&DataKey::vertex(step.target).translate(to_top)?)?;

                if let [edge] = step.edges.as_slice() {
                    return self.extend_branch(matched, decision, to_top, input, edge, target);
                }

                let shared = LogicalNode::CommonRef {
                    id: next_plan_id(),
                    plan: Arc::new(input),
                };
                let mut inputs = Vec::with_capacity(step.edges.len());
                let mut keys = Vec::with_capacity(step.edges.len());
                for edge in &step.edges {
                    let branch =
                        self.extend_branch(matched, decision, to_top, shared.clone(), edge, target)?;
                    let index = column_index(&branch.output_columns(), &target.alias)
                        .ok_or_else(|| OptimizerError::invariant("branch without its target column"))?;
                    keys.push(Expr::var(index, &target.alias));
                    inputs.push(branch);
                }
                debug!(
                    "intersect on '{}' over {} branches",
                    target.alias,
                    inputs.len()
                );
                Ok(LogicalNode::MultiJoin { inputs, keys })
            }
            PlanStep::Join {
                left,
                left_to_target,
                right,
                right_to_target,
                join_vertices,
            } => {
                let left = self.build(matched, left, &compose(left_to_target, to_top)?)?;
                let right = self.build(matched, right, &compose(right_to_target, to_top)?)?;
                let left_columns = left.output_columns();
                let right_columns = right.output_columns();

                let mut conjuncts = Vec::with_capacity(join_vertices.len());
                for order in join_vertices {
                    let alias = &matched
                        .table
                        .get(&DataKey::vertex(*order).translate(to_top)?)?
                        .alias;
                    let (Some(l), Some(r)) = (
                        column_index(&left_columns, alias),
                        column_index(&right_columns, alias),
                    ) else {
                        return Err(OptimizerError::invariant(format!(
                            "join vertex '{}' missing from a join side",
                            alias
                        )));
                    };
                    conjuncts.push(Expr::eq(
                        Expr::var(l, alias),
                        Expr::var(left_columns.len() + r, alias),
                    ));
                }
                Ok(LogicalNode::Join {
                    left: Box::new(left),
                    right: Box::new(right),
                    join_type: JoinType::Inner,
                    condition: Expr::conjunction(conjuncts),
                })
            }
        }
    }

    /// `input` → expand along `edge` → get-vertex binding `target`
    fn extend_branch(
        &self,
        matched: &MatchPattern,
        decision: &PatternPlan,
        to_top: &[usize],
        input: LogicalNode,
        edge: &ExtendEdge,
        target: &DataValue,
    ) -> OptimizerResult<LogicalNode> {
        let index = decision
            .pattern
            .edge_by_order(edge.edge)
            .ok_or_else(|| OptimizerError::invariant(format!("no edge at order {}", edge.edge)))?;
        let edge_value = matched
            .table
            .get(&DataKey::of_edge(&decision.pattern, index)?.translate(to_top)?)?;
        let start = matched
            .table
            .get(&DataKey::vertex(edge.source).translate(to_top)?)?;

        let width = input.output_columns().len();
        Ok(LogicalNode::GetVertex {
            input: Box::new(LogicalNode::Expand {
                input: Box::new(input),
                start_alias: start.alias.clone(),
                alias: edge_value.alias.clone(),
                direction: edge.direction,
                schema_type: edge_value.schema_type.clone(),
                filter: retarget(edge_value, width)?,
            }),
            edge_alias: edge_value.alias.clone(),
            opt: edge.direction.target_endpoint(),
            alias: target.alias.clone(),
            schema_type: target.schema_type.clone(),
            filter: retarget(target, width + 1)?,
        })
    }
}

fn retarget(value: &DataValue, index: usize) -> OptimizerResult<Option<Expr>> {
    value
        .filter
        .as_ref()
        .map(|f| f.retarget(&value.alias, index))
        .transpose()
}

/// `inner` maps child → parent, `outer` parent → top; result child → top
fn compose(inner: &[usize], outer: &[usize]) -> OptimizerResult<Vec<usize>> {
    inner
        .iter()
        .map(|o| {
            outer.get(*o).copied().ok_or_else(|| {
                OptimizerError::invariant(format!("order {} outside the parent pattern", o))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::estimate::HeuristicEstimator;
    use crate::plan::expr::Operator;
    use crate::plan::logical::GetVertexOpt;
    use crate::schema::{EdgeTriplet, GraphSchema, MemorySchema, ScalarType};

    fn schema() -> MemorySchema {
        MemorySchema::new()
            .with_vertex(0, "person", &[("name", ScalarType::String), ("age", ScalarType::Int)])
            .with_vertex(1, "software", &[("name", ScalarType::String)])
            .with_edge(0, "knows", &[(0, 0)], &[("weight", ScalarType::Float)])
            .with_edge(1, "created", &[(0, 1)], &[])
    }

    fn bridge() -> PatternBridge {
        PatternBridge::new(Arc::new(HeuristicEstimator::new()))
    }

    fn person() -> GraphSchemaType {
        schema().vertex_type(&[0]).unwrap()
    }

    fn software() -> GraphSchemaType {
        schema().vertex_type(&[1]).unwrap()
    }

    fn created() -> GraphSchemaType {
        schema().edge_type(&[EdgeTriplet::new(1, 0, 1)]).unwrap()
    }

    fn knows() -> GraphSchemaType {
        schema().edge_type(&[EdgeTriplet::new(0, 0, 0)]).unwrap()
    }

    #[test]
    fn test_optional_match_is_left_alone() {
        let plan = LogicalNode::Match {
            sentences: vec![LogicalNode::source("a", person())],
            optional: true,
        };
        let out = bridge().process_input(plan.clone()).unwrap();
        assert_eq!(out, plan);
    }

    #[test]
    fn test_inconsistent_endpoint_types_fail() {
        let sentence = LogicalNode::source("a", software())
            .expand("a", "e", Direction::Out, created())
            .get_vertex("e", GetVertexOpt::End, "b", software());
        let plan = LogicalNode::Match {
            sentences: vec![sentence],
            optional: false,
        };
        let err = bridge().process_input(plan).unwrap_err();
        assert!(matches!(err, OptimizerError::InvariantViolation(_)));
    }

    #[test]
    fn test_repeated_filter_must_be_subset() {
        let age = Expr::binary(Operator::GreaterThan, Expr::prop(0, "a", "age"), Expr::int(30));
        let first = LogicalNode::source("a", person())
            .expand("a", "e", Direction::Out, knows())
            .get_vertex("e", GetVertexOpt::End, "b", person());
        let second = LogicalNode::source("a", person()).with_filter(age);
        let plan = LogicalNode::Match {
            sentences: vec![first, second],
            optional: false,
        };
        let err = bridge().process_input(plan).unwrap_err();
        assert!(matches!(err, OptimizerError::InvariantViolation(_)));
    }

    #[test]
    fn test_filter_on_other_alias_is_unsupported() {
        let cross = Expr::eq(Expr::prop(0, "a", "name"), Expr::prop(1, "b", "name"));
        let sentence = LogicalNode::source("a", person()).with_filter(cross);
        let plan = LogicalNode::Match {
            sentences: vec![sentence],
            optional: false,
        };
        assert!(bridge().process_input(plan).unwrap_err().is_fallback_eligible());
    }

    #[test]
    fn test_in_expand_builds_reversed_edge() {
        let sentence = LogicalNode::source("s", software())
            .expand("s", "e", Direction::In, created())
            .get_vertex("e", GetVertexOpt::Start, "p", person());
        let plan = LogicalNode::Match {
            sentences: vec![sentence],
            optional: false,
        };
        let LogicalNode::Pattern(matched) = bridge().process_input(plan).unwrap() else {
            panic!("match was not replaced");
        };
        assert_eq!(matched.pattern.vertex_count(), 2);
        assert_eq!(matched.table.len(), 3);
        let edge = matched.pattern.edges()[0];
        let (src, _) = matched.pattern.endpoints(edge).unwrap();
        assert_eq!(matched.pattern.vertex(src).unwrap().types, vec![0]);
    }
}
