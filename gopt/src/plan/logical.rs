// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical query plan representation
//!
//! Plans are trees over a small closed vocabulary of operators. Every operator
//! produces a row whose layout is given by [`LogicalNode::output_columns`];
//! expressions address those rows by position.
//!
//! Row layout rules:
//! - graph operators (`Source`, `Expand`, `GetVertex`, `PathExpand`) append
//!   their own alias column to the input row, `ExpandVertex` appends the edge
//!   and the vertex column
//! - `Match` outputs the distinct aliases of its sentences in first-appearance
//!   order
//! - `Join` outputs left ++ right, only left for semi/anti joins
//! - `MultiJoin` concatenates its inputs keeping the first column of each alias
//! - `Union` takes the layout of its first input

use crate::plan::expr::{Expr, Literal};
use crate::plan::pattern::MatchPattern;
use crate::schema::{DataType, GraphSchemaType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_PLAN_ID: AtomicU64 = AtomicU64::new(1);

/// Fresh id for a shared plan or sub-query
pub fn next_plan_id() -> u64 {
    NEXT_PLAN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Prefix of system-generated aliases that no user expression refers to
pub const ANONYMOUS_ALIAS_PREFIX: &str = "~";

pub fn is_anonymous(alias: &str) -> bool {
    alias.starts_with(ANONYMOUS_ALIAS_PREFIX)
}

/// Direction of an expand relative to its start vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    pub fn reverse(self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }

    /// Which endpoint of the traversed edge is the vertex reached
    pub fn target_endpoint(self) -> GetVertexOpt {
        match self {
            Direction::Out => GetVertexOpt::End,
            Direction::In => GetVertexOpt::Start,
            Direction::Both => GetVertexOpt::Other,
        }
    }
}

/// Endpoint of the preceding edge a `GetVertex` extracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GetVertexOpt {
    Start,
    End,
    /// The endpoint that is not the expand's start vertex
    Other,
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    LeftSemi,
    LeftAnti,
}

impl JoinType {
    /// Whether the right side contributes columns to the output
    pub fn projects_right(&self) -> bool {
        matches!(self, JoinType::Inner | JoinType::LeftOuter)
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Collect,
}

/// Output column of a plan node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Position of the first column named `alias`
pub fn column_index(columns: &[Column], alias: &str) -> Option<usize> {
    columns.iter().position(|c| c.name == alias)
}

/// Project expression with its output alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectItem {
    pub expr: Expr,
    pub alias: String,
}

impl ProjectItem {
    pub fn new(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: alias.into(),
        }
    }
}

/// Aggregate call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    pub args: Vec<Expr>,
    #[serde(default)]
    pub distinct: bool,
    pub alias: String,
}

/// Sort expression with order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub ascending: bool,
}

/// Logical plan node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalNode {
    /// Scan all elements admitted by `schema_type`
    Source {
        alias: String,
        schema_type: GraphSchemaType,
        filter: Option<Expr>,
    },

    /// Expand from the vertex bound to `start_alias` along edges
    Expand {
        input: Box<LogicalNode>,
        start_alias: String,
        alias: String,
        direction: Direction,
        schema_type: GraphSchemaType,
        filter: Option<Expr>,
    },

    /// Bind an endpoint of the edge bound to `edge_alias`
    GetVertex {
        input: Box<LogicalNode>,
        edge_alias: String,
        opt: GetVertexOpt,
        alias: String,
        schema_type: GraphSchemaType,
        filter: Option<Expr>,
    },

    /// Variable-length expand producing a path column
    PathExpand {
        input: Box<LogicalNode>,
        start_alias: String,
        alias: String,
        direction: Direction,
        edge_type: GraphSchemaType,
        min_hops: u32,
        max_hops: u32,
    },

    /// Fused expand + get-vertex
    ExpandVertex {
        input: Box<LogicalNode>,
        start_alias: String,
        edge_alias: String,
        edge_type: GraphSchemaType,
        direction: Direction,
        alias: String,
        schema_type: GraphSchemaType,
        filter: Option<Expr>,
    },

    /// Filter rows based on condition
    Filter {
        input: Box<LogicalNode>,
        condition: Expr,
    },

    /// Compute expressions; with `append` the input columns are kept in front
    Project {
        input: Box<LogicalNode>,
        items: Vec<ProjectItem>,
        append: bool,
    },

    /// Group by `keys`, output keys then calls
    Aggregate {
        input: Box<LogicalNode>,
        keys: Vec<ProjectItem>,
        calls: Vec<AggregateCall>,
    },

    /// Sort with optional offset/fetch
    Sort {
        input: Box<LogicalNode>,
        keys: Vec<SortKey>,
        offset: Option<usize>,
        fetch: Option<usize>,
    },

    /// Graph pattern match; one sentence is a single match
    Match {
        sentences: Vec<LogicalNode>,
        optional: bool,
    },

    /// Union of multiple plans
    Union { inputs: Vec<LogicalNode>, all: bool },

    /// Join two plans; `condition` addresses the left ++ right row
    Join {
        left: Box<LogicalNode>,
        right: Box<LogicalNode>,
        join_type: JoinType,
        condition: Option<Expr>,
    },

    /// Multi-way equi-join, one key per input over that input's own row
    MultiJoin {
        inputs: Vec<LogicalNode>,
        keys: Vec<Expr>,
    },

    /// Reference to a plan shared by several parents
    CommonRef { id: u64, plan: Arc<LogicalNode> },

    /// A match replaced by its pattern, waiting for cost-based search
    #[serde(skip)]
    Pattern(Box<MatchPattern>),
}

impl LogicalNode {
    pub fn source(alias: impl Into<String>, schema_type: GraphSchemaType) -> LogicalNode {
        LogicalNode::Source {
            alias: alias.into(),
            schema_type,
            filter: None,
        }
    }

    pub fn expand(
        self,
        start_alias: impl Into<String>,
        alias: impl Into<String>,
        direction: Direction,
        schema_type: GraphSchemaType,
    ) -> LogicalNode {
        LogicalNode::Expand {
            input: Box::new(self),
            start_alias: start_alias.into(),
            alias: alias.into(),
            direction,
            schema_type,
            filter: None,
        }
    }

    pub fn get_vertex(
        self,
        edge_alias: impl Into<String>,
        opt: GetVertexOpt,
        alias: impl Into<String>,
        schema_type: GraphSchemaType,
    ) -> LogicalNode {
        LogicalNode::GetVertex {
            input: Box::new(self),
            edge_alias: edge_alias.into(),
            opt,
            alias: alias.into(),
            schema_type,
            filter: None,
        }
    }

    pub fn filter(self, condition: Expr) -> LogicalNode {
        LogicalNode::Filter {
            input: Box::new(self),
            condition,
        }
    }

    pub fn project(self, items: Vec<ProjectItem>, append: bool) -> LogicalNode {
        LogicalNode::Project {
            input: Box::new(self),
            items,
            append,
        }
    }

    /// Attach `filter` to a graph operator, AND-ing it with any existing one
    pub fn with_filter(mut self, extra: Expr) -> LogicalNode {
        if let Some(slot) = self.graph_filter_mut() {
            let existing = slot.take();
            *slot = Some(Expr::and_optional(existing, extra));
            self
        } else {
            self.filter(extra)
        }
    }

    /// Alias bound by a graph operator
    pub fn alias(&self) -> Option<&str> {
        match self {
            LogicalNode::Source { alias, .. }
            | LogicalNode::Expand { alias, .. }
            | LogicalNode::GetVertex { alias, .. }
            | LogicalNode::PathExpand { alias, .. }
            | LogicalNode::ExpandVertex { alias, .. } => Some(alias),
            _ => None,
        }
    }

    pub fn is_graph_operator(&self) -> bool {
        self.alias().is_some()
    }

    /// Residual filter slot of a graph operator
    pub fn graph_filter_mut(&mut self) -> Option<&mut Option<Expr>> {
        match self {
            LogicalNode::Source { filter, .. }
            | LogicalNode::Expand { filter, .. }
            | LogicalNode::GetVertex { filter, .. }
            | LogicalNode::ExpandVertex { filter, .. } => Some(filter),
            _ => None,
        }
    }

    pub fn graph_filter(&self) -> Option<&Expr> {
        match self {
            LogicalNode::Source { filter, .. }
            | LogicalNode::Expand { filter, .. }
            | LogicalNode::GetVertex { filter, .. }
            | LogicalNode::ExpandVertex { filter, .. } => filter.as_ref(),
            _ => None,
        }
    }

    /// Direct inputs, including match sentences but not shared plans
    pub fn inputs(&self) -> Vec<&LogicalNode> {
        match self {
            LogicalNode::Source { .. } | LogicalNode::CommonRef { .. } | LogicalNode::Pattern(_) => {
                vec![]
            }
            LogicalNode::Expand { input, .. }
            | LogicalNode::GetVertex { input, .. }
            | LogicalNode::PathExpand { input, .. }
            | LogicalNode::ExpandVertex { input, .. }
            | LogicalNode::Filter { input, .. }
            | LogicalNode::Project { input, .. }
            | LogicalNode::Aggregate { input, .. }
            | LogicalNode::Sort { input, .. } => vec![input.as_ref()],
            LogicalNode::Match { sentences, .. } => sentences.iter().collect(),
            LogicalNode::Union { inputs, .. } | LogicalNode::MultiJoin { inputs, .. } => {
                inputs.iter().collect()
            }
            LogicalNode::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }

    pub fn inputs_mut(&mut self) -> Vec<&mut LogicalNode> {
        match self {
            LogicalNode::Source { .. } | LogicalNode::CommonRef { .. } | LogicalNode::Pattern(_) => {
                vec![]
            }
            LogicalNode::Expand { input, .. }
            | LogicalNode::GetVertex { input, .. }
            | LogicalNode::PathExpand { input, .. }
            | LogicalNode::ExpandVertex { input, .. }
            | LogicalNode::Filter { input, .. }
            | LogicalNode::Project { input, .. }
            | LogicalNode::Aggregate { input, .. }
            | LogicalNode::Sort { input, .. } => vec![input.as_mut()],
            LogicalNode::Match { sentences, .. } => sentences.iter_mut().collect(),
            LogicalNode::Union { inputs, .. } | LogicalNode::MultiJoin { inputs, .. } => {
                inputs.iter_mut().collect()
            }
            LogicalNode::Join { left, right, .. } => vec![left.as_mut(), right.as_mut()],
        }
    }

    /// Expressions owned by this node
    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            LogicalNode::Source { filter, .. }
            | LogicalNode::Expand { filter, .. }
            | LogicalNode::GetVertex { filter, .. }
            | LogicalNode::ExpandVertex { filter, .. } => filter.iter_mut().collect(),
            LogicalNode::Filter { condition, .. } => vec![condition],
            LogicalNode::Project { items, .. } => items.iter_mut().map(|i| &mut i.expr).collect(),
            LogicalNode::Aggregate { keys, calls, .. } => keys
                .iter_mut()
                .map(|k| &mut k.expr)
                .chain(calls.iter_mut().flat_map(|c| c.args.iter_mut()))
                .collect(),
            LogicalNode::Sort { keys, .. } => keys.iter_mut().map(|k| &mut k.expr).collect(),
            LogicalNode::Join { condition, .. } => condition.iter_mut().collect(),
            LogicalNode::MultiJoin { keys, .. } => keys.iter_mut().collect(),
            LogicalNode::PathExpand { .. }
            | LogicalNode::Match { .. }
            | LogicalNode::Union { .. }
            | LogicalNode::CommonRef { .. }
            | LogicalNode::Pattern(_) => vec![],
        }
    }

    /// Row layout produced by this node
    pub fn output_columns(&self) -> Vec<Column> {
        match self {
            LogicalNode::Source {
                alias, schema_type, ..
            } => vec![Column::new(alias, DataType::from_graph_type(schema_type.clone()))],
            LogicalNode::Expand {
                input,
                alias,
                schema_type,
                ..
            }
            | LogicalNode::GetVertex {
                input,
                alias,
                schema_type,
                ..
            } => {
                let mut columns = input.output_columns();
                columns.push(Column::new(alias, DataType::from_graph_type(schema_type.clone())));
                columns
            }
            LogicalNode::PathExpand { input, alias, .. } => {
                let mut columns = input.output_columns();
                columns.push(Column::new(alias, DataType::Path));
                columns
            }
            LogicalNode::ExpandVertex {
                input,
                edge_alias,
                edge_type,
                alias,
                schema_type,
                ..
            } => {
                let mut columns = input.output_columns();
                columns.push(Column::new(edge_alias, DataType::from_graph_type(edge_type.clone())));
                columns.push(Column::new(alias, DataType::from_graph_type(schema_type.clone())));
                columns
            }
            LogicalNode::Filter { input, .. } | LogicalNode::Sort { input, .. } => {
                input.output_columns()
            }
            LogicalNode::Project {
                input,
                items,
                append,
            } => {
                let input_columns = input.output_columns();
                let mut columns = if *append {
                    input_columns.clone()
                } else {
                    Vec::with_capacity(items.len())
                };
                columns.extend(
                    items
                        .iter()
                        .map(|item| Column::new(&item.alias, expr_type(&item.expr, &input_columns))),
                );
                columns
            }
            LogicalNode::Aggregate { input, keys, calls } => {
                let input_columns = input.output_columns();
                let mut columns: Vec<Column> = keys
                    .iter()
                    .map(|key| Column::new(&key.alias, expr_type(&key.expr, &input_columns)))
                    .collect();
                columns.extend(calls.iter().map(|call| {
                    let data_type = match call.function {
                        AggregateFunction::Count => DataType::Int,
                        AggregateFunction::Avg => DataType::Float,
                        _ => call
                            .args
                            .first()
                            .map(|arg| expr_type(arg, &input_columns))
                            .unwrap_or(DataType::Any),
                    };
                    Column::new(&call.alias, data_type)
                }));
                columns
            }
            LogicalNode::Match { sentences, .. } => {
                let mut seen = HashSet::new();
                let mut columns = Vec::new();
                for sentence in sentences {
                    for column in sentence.output_columns() {
                        if seen.insert(column.name.clone()) {
                            columns.push(column);
                        }
                    }
                }
                columns
            }
            LogicalNode::Union { inputs, .. } => inputs
                .first()
                .map(|input| input.output_columns())
                .unwrap_or_default(),
            LogicalNode::Join {
                left,
                right,
                join_type,
                ..
            } => {
                let mut columns = left.output_columns();
                if join_type.projects_right() {
                    columns.extend(right.output_columns());
                }
                columns
            }
            LogicalNode::MultiJoin { inputs, .. } => {
                let mut seen = HashSet::new();
                let mut columns = Vec::new();
                for input in inputs {
                    for column in input.output_columns() {
                        if seen.insert(column.name.clone()) {
                            columns.push(column);
                        }
                    }
                }
                columns
            }
            LogicalNode::CommonRef { plan, .. } => plan.output_columns(),
            LogicalNode::Pattern(pattern) => pattern.columns.clone(),
        }
    }

    /// Number of operators in the tree, shared plans counted once per reference
    pub fn node_count(&self) -> usize {
        let nested = match self {
            LogicalNode::CommonRef { plan, .. } => plan.node_count(),
            _ => 0,
        };
        1 + nested + self.inputs().iter().map(|i| i.node_count()).sum::<usize>()
    }

    /// Operator name used by explain and the rule tracer
    pub fn name(&self) -> &'static str {
        match self {
            LogicalNode::Source { .. } => "Source",
            LogicalNode::Expand { .. } => "Expand",
            LogicalNode::GetVertex { .. } => "GetVertex",
            LogicalNode::PathExpand { .. } => "PathExpand",
            LogicalNode::ExpandVertex { .. } => "ExpandVertex",
            LogicalNode::Filter { .. } => "Filter",
            LogicalNode::Project { .. } => "Project",
            LogicalNode::Aggregate { .. } => "Aggregate",
            LogicalNode::Sort { .. } => "Sort",
            LogicalNode::Match { .. } => "Match",
            LogicalNode::Union { .. } => "Union",
            LogicalNode::Join { .. } => "Join",
            LogicalNode::MultiJoin { .. } => "MultiJoin",
            LogicalNode::CommonRef { .. } => "CommonRef",
            LogicalNode::Pattern(_) => "Pattern",
        }
    }

    /// Render the plan as an indented tree
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), self.describe());
        if let LogicalNode::CommonRef { plan, .. } = self {
            plan.explain_into(out, depth + 1);
        }
        for input in self.inputs() {
            input.explain_into(out, depth + 1);
        }
    }

    fn describe(&self) -> String {
        let with_filter = |head: String, filter: &Option<Expr>| match filter {
            Some(f) => format!("{} filter={}", head, f),
            None => head,
        };
        match self {
            LogicalNode::Source {
                alias,
                schema_type,
                filter,
            } => with_filter(format!("Source({}: {})", alias, schema_type), filter),
            LogicalNode::Expand {
                start_alias,
                alias,
                direction,
                schema_type,
                filter,
                ..
            } => with_filter(
                format!(
                    "Expand({} -[{}: {}]- {:?})",
                    start_alias, alias, schema_type, direction
                ),
                filter,
            ),
            LogicalNode::GetVertex {
                edge_alias,
                opt,
                alias,
                schema_type,
                filter,
                ..
            } => with_filter(
                format!("GetVertex({}.{:?} as {}: {})", edge_alias, opt, alias, schema_type),
                filter,
            ),
            LogicalNode::PathExpand {
                start_alias,
                alias,
                direction,
                edge_type,
                min_hops,
                max_hops,
                ..
            } => format!(
                "PathExpand({} -[{}: {}*{}..{}]- {:?})",
                start_alias, alias, edge_type, min_hops, max_hops, direction
            ),
            LogicalNode::ExpandVertex {
                start_alias,
                edge_alias,
                edge_type,
                direction,
                alias,
                schema_type,
                filter,
                ..
            } => with_filter(
                format!(
                    "ExpandVertex({} -[{}: {}]- {:?} as {}: {})",
                    start_alias, edge_alias, edge_type, direction, alias, schema_type
                ),
                filter,
            ),
            LogicalNode::Filter { condition, .. } => format!("Filter({})", condition),
            LogicalNode::Project { items, append, .. } => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|i| format!("{} as {}", i.expr, i.alias))
                    .collect();
                format!(
                    "Project{}[{}]",
                    if *append { "+" } else { "" },
                    rendered.join(", ")
                )
            }
            LogicalNode::Aggregate { keys, calls, .. } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{} as {}", k.expr, k.alias))
                    .collect();
                let calls: Vec<String> = calls
                    .iter()
                    .map(|c| {
                        let args: Vec<String> = c.args.iter().map(|a| a.to_string()).collect();
                        format!(
                            "{:?}({}{}) as {}",
                            c.function,
                            if c.distinct { "DISTINCT " } else { "" },
                            args.join(", "),
                            c.alias
                        )
                    })
                    .collect();
                format!("Aggregate(keys=[{}], calls=[{}])", keys.join(", "), calls.join(", "))
            }
            LogicalNode::Sort {
                keys,
                offset,
                fetch,
                ..
            } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{} {}", k.expr, if k.ascending { "ASC" } else { "DESC" }))
                    .collect();
                let mut head = format!("Sort[{}]", keys.join(", "));
                if let Some(offset) = offset {
                    let _ = write!(head, " offset={}", offset);
                }
                if let Some(fetch) = fetch {
                    let _ = write!(head, " fetch={}", fetch);
                }
                head
            }
            LogicalNode::Match {
                sentences,
                optional,
            } => format!(
                "{}Match(sentences={})",
                if *optional { "Optional" } else { "" },
                sentences.len()
            ),
            LogicalNode::Union { all, .. } => format!("Union(all={})", all),
            LogicalNode::Join {
                join_type,
                condition,
                ..
            } => match condition {
                Some(c) => format!("Join({:?}, {})", join_type, c),
                None => format!("Join({:?})", join_type),
            },
            LogicalNode::MultiJoin { keys, .. } => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                format!("MultiJoin(keys=[{}])", keys.join(", "))
            }
            LogicalNode::CommonRef { id, .. } => format!("CommonRef(#{})", id),
            LogicalNode::Pattern(pattern) => format!(
                "Pattern(#{}, vertices={}, edges={})",
                pattern.pattern.id(),
                pattern.pattern.vertex_count(),
                pattern.pattern.edge_count()
            ),
        }
    }
}

/// Type of an expression evaluated over `columns`
pub fn expr_type(expr: &Expr, columns: &[Column]) -> DataType {
    match expr {
        Expr::Var(var) => match (&var.property, columns.get(var.index)) {
            (None, Some(column)) => column.data_type.clone(),
            (Some(prop), Some(column)) => column
                .data_type
                .graph_type()
                .and_then(|ty| ty.property(prop))
                .map(|p| DataType::from_scalar(p.data_type))
                .unwrap_or(DataType::Any),
            _ => DataType::Any,
        },
        Expr::Literal(lit) => match lit {
            Literal::Boolean(_) => DataType::Bool,
            Literal::Integer(_) => DataType::Int,
            Literal::Float(_) => DataType::Float,
            Literal::String(_) => DataType::String,
            Literal::Null => DataType::Any,
        },
        Expr::Binary { op, .. } if op.is_comparison() => DataType::Bool,
        _ => DataType::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::expr::Operator;
    use crate::schema::{LabelEntry, PropertyDef, ScalarType};

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
            vec![LabelEntry::edge(crate::schema::EdgeTriplet::new(0, 0, 0), "knows")],
            vec![],
        )
    }

    fn chain() -> LogicalNode {
        LogicalNode::source("a", person())
            .expand("a", "e", Direction::Out, knows())
            .get_vertex("e", GetVertexOpt::End, "b", person())
    }

    #[test]
    fn test_graph_operators_append_alias_columns() {
        let names: Vec<String> = chain().output_columns().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "e", "b"]);
    }

    #[test]
    fn test_match_deduplicates_aliases() {
        let second = LogicalNode::source("b", person())
            .expand("b", "f", Direction::Out, knows())
            .get_vertex("f", GetVertexOpt::End, "c", person());
        let m = LogicalNode::Match {
            sentences: vec![chain(), second],
            optional: false,
        };
        let names: Vec<String> = m.output_columns().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "e", "b", "f", "c"]);
    }

    #[test]
    fn test_project_item_types() {
        let plan = chain().project(
            vec![
                ProjectItem::new(Expr::prop(0, "a", "age"), "age"),
                ProjectItem::new(Expr::var(2, "b"), "b"),
            ],
            false,
        );
        let columns = plan.output_columns();
        assert_eq!(columns[0].data_type, DataType::Int);
        assert_eq!(columns[1].data_type, DataType::Vertex(person()));
    }

    #[test]
    fn test_with_filter_merges_on_graph_operator() {
        let cond = Expr::binary(Operator::GreaterThan, Expr::prop(0, "a", "age"), Expr::int(3));
        let node = LogicalNode::source("a", person())
            .with_filter(cond.clone())
            .with_filter(cond.clone());
        assert_eq!(node.graph_filter().map(|f| f.conjuncts().len()), Some(2));
    }

    #[test]
    fn test_explain_indents_children() {
        let text = chain().explain();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("GetVertex"));
        assert!(lines[2].starts_with("    Source(a: person{name,age})"));
    }
}
