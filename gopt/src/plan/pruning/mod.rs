// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Column pruning
//!
//! [`FieldTrimmer`] walks the plan once from the root. Each operator receives
//! the columns its parent reads ([`UsedFields`]), works out what it needs from
//! its own inputs, trims them, rebuilds itself over the trimmed inputs and
//! hands back a [`Mapping`] from its old output positions to the new ones.
//!
//! Projections only drop whole columns. Vertex and edge columns are narrowed
//! at the graph operator that binds them, keeping just the properties read
//! above, so a projection that renames an element (`p AS a`) forwards the
//! properties read from `a` to `p` instead of pinning all of `p`.
//!
//! A shared sub-plan (`CommonRef`) is trimmed once, against the union of what
//! every one of its consumers reads, and each consumer is remapped through the
//! shared plan's mapping.

pub mod used_fields;

pub use used_fields::{Mapping, PropertySet, UsedFields};

use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::expr::{Expr, Literal, Operator};
use crate::plan::logical::{
    column_index, AggregateCall, AggregateFunction, LogicalNode, ProjectItem, SortKey,
};
use crate::plan::nested::NestedPlans;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Alias of the single column kept by a projection nobody reads from
pub const DUMMY_ALIAS: &str = "~dummy";

fn width(node: &LogicalNode) -> usize {
    node.output_columns().len()
}

fn identity(width: usize) -> Mapping {
    (0..width).map(Some).collect()
}

fn alias_index(node: &LogicalNode, alias: &str) -> OptimizerResult<usize> {
    column_index(&node.output_columns(), alias).ok_or_else(|| {
        OptimizerError::invariant(format!("'{}' is not bound below {}", alias, node.name()))
    })
}

fn remap_filter(filter: Option<Expr>, mapping: &[Option<usize>]) -> OptimizerResult<Option<Expr>> {
    filter.map(|f| f.remap(mapping)).transpose()
}

/// A bare reference to an input column, the only expression that forwards
/// a property requirement instead of consuming the whole column
fn forwarded_column(expr: &Expr) -> Option<usize> {
    expr.as_var().filter(|v| v.property.is_none()).map(|v| v.index)
}

/// Requirement of a join key: a bare element reference, or an equality of
/// two, only needs the elements' identity
fn key_usage(key: &Expr) -> UsedFields {
    if let Some(column) = forwarded_column(key) {
        let mut used = UsedFields::new();
        used.add(column, PropertySet::none());
        return used;
    }
    if let Expr::Binary {
        op: Operator::Equal,
        left,
        right,
    } = key
    {
        if let (Some(l), Some(r)) = (forwarded_column(left), forwarded_column(right)) {
            let mut used = UsedFields::new();
            used.add(l, PropertySet::none());
            used.add(r, PropertySet::none());
            return used;
        }
    }
    UsedFields::of_expr(key)
}

/// Shared plans in `node`, each listed after every shared plan nested in it
fn shared_plans(node: &LogicalNode, order: &mut Vec<(u64, Arc<LogicalNode>)>) {
    if let LogicalNode::CommonRef { id, plan } = node {
        if !order.iter().any(|(seen, _)| seen == id) {
            shared_plans(plan, order);
            order.push((*id, plan.clone()));
        }
        return;
    }
    for input in node.inputs() {
        shared_plans(input, order);
    }
}

/// Consumer requirements and trimmed versions of shared plans, by plan id
#[derive(Debug, Clone, Default)]
struct SharedState {
    required: HashMap<u64, UsedFields>,
    trimmed: HashMap<u64, (Arc<LogicalNode>, Mapping)>,
}

fn distinct_names(inputs: &[LogicalNode]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for input in inputs {
        for column in input.output_columns() {
            if !names.contains(&column.name) {
                names.push(column.name);
            }
        }
    }
    names
}

/// Column pruning pass
#[derive(Debug, Clone, Default)]
pub struct FieldTrimmer {
    shared: RefCell<SharedState>,
}

impl FieldTrimmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prune `plan` with every root column required in full.
    ///
    /// Sub-query plans are pruned once each with their full output required.
    /// Shared plans are then narrowed to what their consumers read.
    pub fn trim_plan(&self, plan: LogicalNode) -> OptimizerResult<LogicalNode> {
        let mut nested = NestedPlans::new();
        self.trim_full(plan, &mut nested)
    }

    fn trim_full(&self, mut plan: LogicalNode, nested: &mut NestedPlans) -> OptimizerResult<LogicalNode> {
        nested.rewrite(&mut plan, &mut |sub, nested| self.trim_full(sub, nested))?;
        self.trim_root(plan)
    }

    /// Trim `plan` and the shared plans under it.
    ///
    /// Requirements are collected outermost first, so a shared plan is only
    /// visited once every consumer of it has reported. Shared plans are then
    /// rebuilt innermost first and the root last, each consumer picking up
    /// the rebuilt plan and its mapping.
    fn trim_root(&self, plan: LogicalNode) -> OptimizerResult<LogicalNode> {
        let mut order = Vec::new();
        shared_plans(&plan, &mut order);
        self.shared.replace(SharedState::default());
        let required = UsedFields::all(width(&plan));

        if !order.is_empty() {
            self.trim(plan.clone(), &required)?;
            for (id, shared) in order.iter().rev() {
                let used = self.shared_requirement(*id);
                self.trim(shared.as_ref().clone(), &used)?;
            }
            for (id, shared) in &order {
                let used = self.shared_requirement(*id);
                let (trimmed, mapping) = self.trim(shared.as_ref().clone(), &used)?;
                debug!(
                    "shared plan #{} trimmed to {} of {} columns",
                    id,
                    width(&trimmed),
                    mapping.len()
                );
                self.shared
                    .borrow_mut()
                    .trimmed
                    .insert(*id, (Arc::new(trimmed), mapping));
            }
        }

        let (plan, _) = self.trim(plan, &required)?;
        self.shared.replace(SharedState::default());
        Ok(plan)
    }

    fn shared_requirement(&self, id: u64) -> UsedFields {
        self.shared.borrow().required.get(&id).cloned().unwrap_or_default()
    }

    /// Rebuild `node` producing only the columns in `required`.
    ///
    /// The returned mapping has one entry per old output column.
    pub fn trim(&self, node: LogicalNode, required: &UsedFields) -> OptimizerResult<(LogicalNode, Mapping)> {
        match node {
            LogicalNode::Source {
                alias,
                schema_type,
                filter,
            } => {
                let mut used = required.clone();
                if let Some(f) = &filter {
                    used.add_expr(f);
                }
                let narrowed = used.properties(0).narrow(&schema_type);
                if narrowed != schema_type {
                    debug!("narrowed '{}' to {}", alias, narrowed);
                }
                Ok((
                    LogicalNode::Source {
                        alias,
                        schema_type: narrowed,
                        filter,
                    },
                    vec![Some(0)],
                ))
            }
            LogicalNode::Expand {
                input,
                start_alias,
                alias,
                direction,
                schema_type,
                filter,
            } => {
                let start = alias_index(&input, &start_alias)?;
                let (input, mapping, own) = self.trim_graph_input(*input, required, filter.as_ref(), &[start], 1)?;
                Ok((
                    LogicalNode::Expand {
                        input: Box::new(input),
                        start_alias,
                        alias,
                        direction,
                        schema_type: own.properties(0).narrow(&schema_type),
                        filter: remap_filter(filter, &mapping)?,
                    },
                    mapping,
                ))
            }
            LogicalNode::GetVertex {
                input,
                edge_alias,
                opt,
                alias,
                schema_type,
                filter,
            } => {
                let edge = alias_index(&input, &edge_alias)?;
                let (input, mapping, own) = self.trim_graph_input(*input, required, filter.as_ref(), &[edge], 1)?;
                let narrowed = own.properties(0).narrow(&schema_type);
                if narrowed != schema_type {
                    debug!("narrowed '{}' to {}", alias, narrowed);
                }
                Ok((
                    LogicalNode::GetVertex {
                        input: Box::new(input),
                        edge_alias,
                        opt,
                        alias,
                        schema_type: narrowed,
                        filter: remap_filter(filter, &mapping)?,
                    },
                    mapping,
                ))
            }
            LogicalNode::PathExpand {
                input,
                start_alias,
                alias,
                direction,
                edge_type,
                min_hops,
                max_hops,
            } => {
                let start = alias_index(&input, &start_alias)?;
                let (input, mapping, _) = self.trim_graph_input(*input, required, None, &[start], 1)?;
                Ok((
                    LogicalNode::PathExpand {
                        input: Box::new(input),
                        start_alias,
                        alias,
                        direction,
                        edge_type,
                        min_hops,
                        max_hops,
                    },
                    mapping,
                ))
            }
            LogicalNode::ExpandVertex {
                input,
                start_alias,
                edge_alias,
                edge_type,
                direction,
                alias,
                schema_type,
                filter,
            } => {
                let start = alias_index(&input, &start_alias)?;
                let (input, mapping, own) = self.trim_graph_input(*input, required, filter.as_ref(), &[start], 2)?;
                Ok((
                    LogicalNode::ExpandVertex {
                        input: Box::new(input),
                        start_alias,
                        edge_alias,
                        edge_type: own.properties(0).narrow(&edge_type),
                        direction,
                        alias,
                        schema_type: own.properties(1).narrow(&schema_type),
                        filter: remap_filter(filter, &mapping)?,
                    },
                    mapping,
                ))
            }
            LogicalNode::Filter { input, condition } => {
                let mut used = required.clone();
                used.add_expr(&condition);
                let (input, mapping) = self.trim(*input, &used)?;
                let condition = condition.remap(&mapping)?;
                Ok((input.filter(condition), mapping))
            }
            LogicalNode::Sort {
                input,
                keys,
                offset,
                fetch,
            } => {
                let mut used = required.clone();
                for key in &keys {
                    used.add_expr(&key.expr);
                }
                let (input, mapping) = self.trim(*input, &used)?;
                let keys = keys
                    .into_iter()
                    .map(|key| {
                        Ok(SortKey {
                            expr: key.expr.remap(&mapping)?,
                            ascending: key.ascending,
                        })
                    })
                    .collect::<OptimizerResult<Vec<_>>>()?;
                Ok((
                    LogicalNode::Sort {
                        input: Box::new(input),
                        keys,
                        offset,
                        fetch,
                    },
                    mapping,
                ))
            }
            LogicalNode::Project {
                input,
                items,
                append,
            } => self.trim_project(*input, items, append, required),
            LogicalNode::Aggregate { input, keys, calls } => {
                self.trim_aggregate(*input, keys, calls, required)
            }
            LogicalNode::Match {
                sentences,
                optional,
            } => {
                let expected = distinct_names(&sentences).len();
                let sentences = sentences
                    .into_iter()
                    .map(|sentence| {
                        let full = UsedFields::all(width(&sentence));
                        self.trim(sentence, &full).map(|(s, _)| s)
                    })
                    .collect::<OptimizerResult<Vec<_>>>()?;
                let rebuilt = LogicalNode::Match {
                    sentences,
                    optional,
                };
                let actual = width(&rebuilt);
                if actual != expected {
                    return Err(OptimizerError::invariant(format!(
                        "match sentences produce {} fields after pruning, expected {}",
                        actual, expected
                    )));
                }
                Ok((rebuilt, identity(expected)))
            }
            LogicalNode::Union { inputs, all } => self.trim_union(inputs, all, required),
            LogicalNode::Join {
                left,
                right,
                join_type,
                condition,
            } => {
                let left_width = width(&left);
                let mut used = required.clone();
                if let Some(c) = &condition {
                    for conjunct in c.conjuncts() {
                        used.merge(&key_usage(&conjunct));
                    }
                }
                let (left_used, right_used) = used.split_at(left_width);
                let (left, left_mapping) = self.trim(*left, &left_used)?;
                let (right, right_mapping) = self.trim(*right, &right_used)?;
                let new_left_width = width(&left);
                let combined: Mapping = left_mapping
                    .iter()
                    .copied()
                    .chain(right_mapping.iter().map(|m| m.map(|i| i + new_left_width)))
                    .collect();
                let condition = remap_filter(condition, &combined)?;
                let mapping = if join_type.projects_right() {
                    combined
                } else {
                    left_mapping
                };
                Ok((
                    LogicalNode::Join {
                        left: Box::new(left),
                        right: Box::new(right),
                        join_type,
                        condition,
                    },
                    mapping,
                ))
            }
            LogicalNode::MultiJoin { inputs, keys } => self.trim_multi_join(inputs, keys, required),
            LogicalNode::CommonRef { id, plan } => {
                let mut shared = self.shared.borrow_mut();
                shared.required.entry(id).or_default().merge(required);
                if let Some((plan, mapping)) = shared.trimmed.get(&id) {
                    return Ok((
                        LogicalNode::CommonRef {
                            id,
                            plan: plan.clone(),
                        },
                        mapping.clone(),
                    ));
                }
                let mapping = identity(plan.output_columns().len());
                Ok((LogicalNode::CommonRef { id, plan }, mapping))
            }
            node @ LogicalNode::Pattern(_) => {
                let mapping = identity(width(&node));
                Ok((node, mapping))
            }
        }
    }

    /// Trim the input of a graph operator appending `own_width` columns.
    ///
    /// `bound` are input positions the operator reads by alias. Returns the
    /// trimmed input, the operator's full mapping and the requirement on its
    /// own columns (shifted to start at zero), including its filter's usage.
    fn trim_graph_input(
        &self,
        input: LogicalNode,
        required: &UsedFields,
        filter: Option<&Expr>,
        bound: &[usize],
        own_width: usize,
    ) -> OptimizerResult<(LogicalNode, Mapping, UsedFields)> {
        let input_width = width(&input);
        let mut used = required.clone();
        if let Some(f) = filter {
            used.add_expr(f);
        }
        let (mut below, own) = used.split_at(input_width);
        for index in bound {
            below.add(*index, PropertySet::none());
        }
        let (input, mut mapping) = self.trim(input, &below)?;
        let new_width = width(&input);
        mapping.extend((0..own_width).map(|i| Some(new_width + i)));
        Ok((input, mapping, own))
    }

    fn trim_project(
        &self,
        input: LogicalNode,
        items: Vec<ProjectItem>,
        append: bool,
        required: &UsedFields,
    ) -> OptimizerResult<(LogicalNode, Mapping)> {
        let item_count = items.len();
        let input_width = width(&input);
        let (mut below, wanted) = if append {
            required.split_at(input_width)
        } else {
            (UsedFields::new(), required.clone())
        };

        let mut kept = Vec::with_capacity(item_count);
        for (index, item) in items.into_iter().enumerate() {
            let Some(properties) = wanted.get(index) else {
                continue;
            };
            match forwarded_column(&item.expr) {
                Some(column) => below.add(column, properties.clone()),
                None => below.add_expr(&item.expr),
            }
            kept.push((index, item));
        }

        let (input, input_mapping) = self.trim(input, &below)?;
        if kept.is_empty() {
            if append {
                let mut mapping = input_mapping;
                mapping.extend(std::iter::repeat(None).take(item_count));
                return Ok((input, mapping));
            }
            debug!("projection of {} items reduced to a dummy column", item_count);
            let dummy = ProjectItem::new(Expr::Literal(Literal::Integer(1)), DUMMY_ALIAS);
            return Ok((input.project(vec![dummy], false), vec![None; item_count]));
        }

        let offset = if append { width(&input) } else { 0 };
        let mut item_mapping: Mapping = vec![None; item_count];
        let mut rebuilt = Vec::with_capacity(kept.len());
        for (position, (index, item)) in kept.into_iter().enumerate() {
            item_mapping[index] = Some(offset + position);
            rebuilt.push(ProjectItem {
                expr: item.expr.remap(&input_mapping)?,
                alias: item.alias,
            });
        }
        let mut mapping = if append { input_mapping } else { Vec::new() };
        mapping.extend(item_mapping);
        Ok((input.project(rebuilt, append), mapping))
    }

    fn trim_aggregate(
        &self,
        input: LogicalNode,
        keys: Vec<ProjectItem>,
        calls: Vec<AggregateCall>,
        required: &UsedFields,
    ) -> OptimizerResult<(LogicalNode, Mapping)> {
        let key_count = keys.len();
        let call_count = calls.len();
        let mut below = UsedFields::new();
        for (index, key) in keys.iter().enumerate() {
            match forwarded_column(&key.expr) {
                Some(column) => below.add(column, required.properties(index)),
                None => below.add_expr(&key.expr),
            }
        }

        let mut kept: Vec<(usize, AggregateCall)> = Vec::with_capacity(call_count);
        let mut first = None;
        for (index, call) in calls.into_iter().enumerate() {
            if required.contains(key_count + index) {
                kept.push((index, call));
            } else if first.is_none() {
                first = Some((index, call));
            }
        }
        // A global aggregate still has to produce its single row
        if kept.is_empty() && key_count == 0 {
            kept.extend(first);
        }
        for (_, call) in &kept {
            match (call.function, call.args.as_slice()) {
                (AggregateFunction::Count, [arg]) if forwarded_column(arg).is_some() => {
                    if let Some(column) = forwarded_column(arg) {
                        below.add(column, PropertySet::none());
                    }
                }
                _ => call.args.iter().for_each(|arg| below.add_expr(arg)),
            }
        }

        let (input, input_mapping) = self.trim(input, &below)?;
        let keys = keys
            .into_iter()
            .map(|key| {
                Ok(ProjectItem {
                    expr: key.expr.remap(&input_mapping)?,
                    alias: key.alias,
                })
            })
            .collect::<OptimizerResult<Vec<_>>>()?;

        let mut mapping = identity(key_count);
        mapping.extend(std::iter::repeat(None).take(call_count));
        let mut rebuilt = Vec::with_capacity(kept.len());
        for (position, (index, call)) in kept.drain(..).enumerate() {
            mapping[key_count + index] = Some(key_count + position);
            rebuilt.push(AggregateCall {
                args: call
                    .args
                    .iter()
                    .map(|arg| arg.remap(&input_mapping))
                    .collect::<OptimizerResult<Vec<_>>>()?,
                ..call
            });
        }
        Ok((
            LogicalNode::Aggregate {
                input: Box::new(input),
                keys,
                calls: rebuilt,
            },
            mapping,
        ))
    }

    fn trim_union(
        &self,
        inputs: Vec<LogicalNode>,
        all: bool,
        required: &UsedFields,
    ) -> OptimizerResult<(LogicalNode, Mapping)> {
        let (trimmed, mappings) = self.trim_each(&inputs, required)?;
        if mappings.windows(2).all(|w| w[0] == w[1]) {
            let mapping = mappings.into_iter().next().unwrap_or_default();
            return Ok((LogicalNode::Union { inputs: trimmed, all }, mapping));
        }

        // Branches dropped different columns: keep the union of what any kept
        let mut widened = required.clone();
        for mapping in &mappings {
            for (old, new) in mapping.iter().enumerate() {
                if new.is_some() {
                    widened.add(old, PropertySet::none());
                }
            }
        }
        let (trimmed, mappings) = self.trim_each(&inputs, &widened)?;
        if !mappings.windows(2).all(|w| w[0] == w[1]) {
            return Err(OptimizerError::invariant(
                "union branches disagree on their pruned columns",
            ));
        }
        let mapping = mappings.into_iter().next().unwrap_or_default();
        Ok((LogicalNode::Union { inputs: trimmed, all }, mapping))
    }

    fn trim_each(
        &self,
        inputs: &[LogicalNode],
        required: &UsedFields,
    ) -> OptimizerResult<(Vec<LogicalNode>, Vec<Mapping>)> {
        let mut trimmed = Vec::with_capacity(inputs.len());
        let mut mappings = Vec::with_capacity(inputs.len());
        for input in inputs {
            let (node, mapping) = self.trim(input.clone(), required)?;
            trimmed.push(node);
            mappings.push(mapping);
        }
        Ok((trimmed, mappings))
    }

    fn trim_multi_join(
        &self,
        inputs: Vec<LogicalNode>,
        keys: Vec<Expr>,
        required: &UsedFields,
    ) -> OptimizerResult<(LogicalNode, Mapping)> {
        if inputs.len() != keys.len() {
            return Err(OptimizerError::invariant(format!(
                "multi-join of {} inputs carries {} keys",
                inputs.len(),
                keys.len()
            )));
        }
        let names = distinct_names(&inputs);

        let mut trimmed = Vec::with_capacity(inputs.len());
        let mut rebuilt_keys = Vec::with_capacity(keys.len());
        for (input, key) in inputs.into_iter().zip(keys) {
            let columns = input.output_columns();
            let mut used = key_usage(&key);
            for (index, name) in names.iter().enumerate() {
                if let (Some(properties), Some(local)) =
                    (required.get(index), column_index(&columns, name))
                {
                    used.add(local, properties.clone());
                }
            }
            let (input, mapping) = self.trim(input, &used)?;
            rebuilt_keys.push(key.remap(&mapping)?);
            trimmed.push(input);
        }

        let new_names = distinct_names(&trimmed);
        let mapping = names
            .iter()
            .map(|name| new_names.iter().position(|n| n == name))
            .collect();
        Ok((
            LogicalNode::MultiJoin {
                inputs: trimmed,
                keys: rebuilt_keys,
            },
            mapping,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::logical::{next_plan_id, Direction, GetVertexOpt, JoinType};
    use crate::schema::{DataType, EdgeTriplet, GraphSchemaType, LabelEntry, PropertyDef, ScalarType};
    use std::collections::BTreeSet;

    fn names(properties: &[&str]) -> BTreeSet<String> {
        properties.iter().map(|p| p.to_string()).collect()
    }

    fn person() -> GraphSchemaType {
        GraphSchemaType::vertex(
            vec![LabelEntry::vertex(0, "person")],
            vec![
                PropertyDef::new(0, "name", ScalarType::String),
                PropertyDef::new(1, "age", ScalarType::Int),
            ],
        )
    }

    fn knows() -> GraphSchemaType {
        GraphSchemaType::edge(
            vec![LabelEntry::edge(EdgeTriplet::new(0, 0, 0), "knows")],
            vec![PropertyDef::new(2, "weight", ScalarType::Float)],
        )
    }

    fn resident() -> GraphSchemaType {
        GraphSchemaType::vertex(
            vec![LabelEntry::vertex(0, "person")],
            vec![
                PropertyDef::new(0, "name", ScalarType::String),
                PropertyDef::new(1, "age", ScalarType::Int),
                PropertyDef::new(3, "city", ScalarType::String),
            ],
        )
    }

    fn shared_ref(plan: LogicalNode) -> LogicalNode {
        LogicalNode::CommonRef {
            id: next_plan_id(),
            plan: Arc::new(plan),
        }
    }

    /// Source types of every shared plan referenced under `plan`
    fn shared_types(plan: &LogicalNode, found: &mut Vec<GraphSchemaType>) {
        if let LogicalNode::CommonRef { plan, .. } = plan {
            found.push(source_type(plan));
            return;
        }
        for input in plan.inputs() {
            shared_types(input, found);
        }
    }

    fn adult(index: usize, alias: &str) -> Expr {
        Expr::binary(Operator::GreaterThan, Expr::prop(index, alias, "age"), Expr::int(18))
    }

    fn source_type(plan: &LogicalNode) -> GraphSchemaType {
        let mut node = plan;
        loop {
            match node {
                LogicalNode::Source { schema_type, .. } => return schema_type.clone(),
                other => node = other.inputs()[0],
            }
        }
    }

    fn trim(plan: LogicalNode) -> LogicalNode {
        FieldTrimmer::new().trim_plan(plan).unwrap()
    }

    #[test]
    fn test_fully_used_plan_is_unchanged() {
        let plan = LogicalNode::source("a", person())
            .expand("a", "e", Direction::Out, knows())
            .get_vertex("e", GetVertexOpt::End, "b", person())
            .filter(Expr::eq(Expr::var(0, "a"), Expr::var(2, "b")));
        let required = UsedFields::all(3);
        let (trimmed, mapping) = FieldTrimmer::new().trim(plan.clone(), &required).unwrap();
        assert_eq!(trimmed, plan);
        assert_eq!(mapping, identity(3));
    }

    #[test]
    fn test_projected_property_keeps_only_that_property() {
        let plan = LogicalNode::source("p", person())
            .project(vec![ProjectItem::new(Expr::prop(0, "p", "age"), "a")], false)
            .filter(Expr::binary(Operator::GreaterThan, Expr::var(0, "a"), Expr::int(18)));
        let trimmed = trim(plan);
        assert_eq!(source_type(&trimmed).property_names(), names(&["age"]));
    }

    #[test]
    fn test_renamed_element_forwards_property_usage() {
        let plan = LogicalNode::source("p", person())
            .project(vec![ProjectItem::new(Expr::var(0, "p"), "a")], false)
            .filter(adult(0, "a"))
            .project(vec![ProjectItem::new(Expr::prop(0, "a", "name"), "n")], false);
        let trimmed = trim(plan);
        assert_eq!(
            source_type(&trimmed).property_names(),
            names(&["age", "name"])
        );
    }

    #[test]
    fn test_pruning_twice_is_pruning_once() {
        let plan = LogicalNode::source("a", person())
            .with_filter(adult(0, "a"))
            .expand("a", "e", Direction::Out, knows())
            .get_vertex("e", GetVertexOpt::End, "b", person())
            .project(
                vec![
                    ProjectItem::new(Expr::prop(2, "b", "name"), "name"),
                    ProjectItem::new(Expr::prop(1, "e", "weight"), "w"),
                ],
                true,
            )
            .project(vec![ProjectItem::new(Expr::var(3, "name"), "name")], false);
        let once = trim(plan);
        let twice = trim(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unread_projection_becomes_dummy() {
        let plan = LogicalNode::source("a", person())
            .project(vec![ProjectItem::new(Expr::prop(0, "a", "name"), "n")], false);
        let (trimmed, mapping) = FieldTrimmer::new().trim(plan, &UsedFields::new()).unwrap();
        assert_eq!(mapping, vec![None]);
        let columns = trimmed.output_columns();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, DUMMY_ALIAS);
        assert_eq!(source_type(&trimmed).properties.len(), 0);
    }

    #[test]
    fn test_unread_aggregate_call_is_dropped() {
        let plan = LogicalNode::Aggregate {
            input: Box::new(LogicalNode::source("a", person())),
            keys: vec![ProjectItem::new(Expr::prop(0, "a", "name"), "name")],
            calls: vec![
                AggregateCall {
                    function: AggregateFunction::Count,
                    args: vec![Expr::var(0, "a")],
                    distinct: false,
                    alias: "cnt".to_string(),
                },
                AggregateCall {
                    function: AggregateFunction::Max,
                    args: vec![Expr::prop(0, "a", "age")],
                    distinct: false,
                    alias: "oldest".to_string(),
                },
            ],
        };
        let mut required = UsedFields::new();
        required.add(0, PropertySet::All);
        required.add(1, PropertySet::All);
        let (trimmed, mapping) = FieldTrimmer::new().trim(plan, &required).unwrap();
        assert_eq!(mapping, vec![Some(0), Some(1), None]);
        assert_eq!(trimmed.output_columns()[1].data_type, DataType::Int);
        assert_eq!(source_type(&trimmed).property_names(), names(&["name"]));
    }

    #[test]
    fn test_join_requirements_split_by_side() {
        let left = LogicalNode::source("a", person());
        let right = LogicalNode::source("b", person());
        let plan = LogicalNode::Join {
            left: Box::new(left),
            right: Box::new(right),
            join_type: JoinType::Inner,
            condition: Some(Expr::eq(Expr::prop(0, "a", "name"), Expr::prop(1, "b", "name"))),
        }
        .project(vec![ProjectItem::new(Expr::prop(1, "b", "age"), "age")], false);
        let trimmed = trim(plan);
        let LogicalNode::Project { input, .. } = &trimmed else {
            panic!("expected a projection");
        };
        let LogicalNode::Join { left, right, .. } = input.as_ref() else {
            panic!("expected a join");
        };
        assert_eq!(source_type(left).property_names(), names(&["name"]));
        assert_eq!(
            source_type(right).property_names(),
            names(&["age", "name"])
        );
    }

    #[test]
    fn test_multi_join_key_needs_only_identity() {
        let plan = LogicalNode::MultiJoin {
            inputs: vec![
                LogicalNode::source("a", person()),
                LogicalNode::source("a", person()).expand("a", "e", Direction::Out, knows()),
            ],
            keys: vec![Expr::var(0, "a"), Expr::var(0, "a")],
        }
        .project(vec![ProjectItem::new(Expr::prop(0, "a", "name"), "n")], false);
        let trimmed = trim(plan);
        let LogicalNode::Project { input, .. } = &trimmed else {
            panic!("expected a projection");
        };
        let LogicalNode::MultiJoin { inputs, keys } = input.as_ref() else {
            panic!("expected a multi-join");
        };
        for branch in inputs {
            assert_eq!(source_type(branch).property_names(), names(&["name"]));
        }
        assert_eq!(keys, &vec![Expr::var(0, "a"), Expr::var(0, "a")]);
        let LogicalNode::Expand { schema_type, .. } = &inputs[1] else {
            panic!("expected an expand");
        };
        assert!(schema_type.properties.is_empty());
    }

    #[test]
    fn test_shared_plan_trimmed_to_union_of_consumers() {
        let shared = shared_ref(LogicalNode::source("a", resident()));
        let plan = LogicalNode::MultiJoin {
            inputs: vec![shared.clone(), shared.filter(adult(0, "a"))],
            keys: vec![Expr::var(0, "a"), Expr::var(0, "a")],
        }
        .project(vec![ProjectItem::new(Expr::prop(0, "a", "name"), "n")], false);

        let trimmed = trim(plan);
        let mut found = Vec::new();
        shared_types(&trimmed, &mut found);
        assert_eq!(found.len(), 2);
        for ty in &found {
            assert_eq!(ty.property_names(), names(&["age", "name"]));
        }
        assert_eq!(trimmed.output_columns()[0].name, "n");
    }

    #[test]
    fn test_nested_shared_plans_are_narrowed() {
        let inner = shared_ref(LogicalNode::source("a", resident()));
        let outer = shared_ref(LogicalNode::MultiJoin {
            inputs: vec![inner.clone(), inner.expand("a", "e", Direction::Out, knows())],
            keys: vec![Expr::var(0, "a"), Expr::var(0, "a")],
        });
        let plan = outer
            .project(vec![ProjectItem::new(Expr::prop(0, "a", "city"), "c")], false);

        let trimmed = trim(plan);
        let LogicalNode::Project { input, .. } = &trimmed else {
            panic!("expected a projection");
        };
        let LogicalNode::CommonRef { plan: outer, .. } = input.as_ref() else {
            panic!("expected the shared plan");
        };
        let mut found = Vec::new();
        shared_types(outer, &mut found);
        assert_eq!(found.len(), 2);
        for ty in &found {
            assert_eq!(ty.property_names(), names(&["city"]));
        }
    }

    #[test]
    fn test_shared_plan_width_change_is_remapped() {
        let shared = shared_ref(
            LogicalNode::source("a", person())
                .project(
                    vec![
                        ProjectItem::new(Expr::prop(0, "a", "name"), "n"),
                        ProjectItem::new(Expr::prop(0, "a", "age"), "g"),
                    ],
                    false,
                ),
        );
        let plan = shared.project(vec![ProjectItem::new(Expr::var(1, "g"), "g")], false);
        let trimmed = trim(plan);
        let LogicalNode::Project { input, items, .. } = &trimmed else {
            panic!("expected a projection");
        };
        assert_eq!(items[0].expr, Expr::var(0, "g"));
        assert_eq!(input.output_columns().len(), 1);
        let mut found = Vec::new();
        shared_types(input, &mut found);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].property_names(), names(&["age"]));
    }

    #[test]
    fn test_join_on_element_identity_keeps_no_properties() {
        let plan = LogicalNode::Join {
            left: Box::new(LogicalNode::source("a", person())),
            right: Box::new(LogicalNode::source("a", person())),
            join_type: JoinType::Inner,
            condition: Some(Expr::eq(Expr::var(0, "a"), Expr::var(1, "a"))),
        }
        .project(vec![ProjectItem::new(Expr::prop(0, "a", "name"), "n")], false);
        let trimmed = trim(plan);
        let LogicalNode::Project { input, .. } = &trimmed else {
            panic!("expected a projection");
        };
        let LogicalNode::Join { left, right, .. } = input.as_ref() else {
            panic!("expected a join");
        };
        assert_eq!(source_type(left).property_names(), names(&["name"]));
        assert!(source_type(right).properties.is_empty());
    }
}
