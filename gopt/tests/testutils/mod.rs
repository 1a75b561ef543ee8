//! Shared fixtures for gopt integration tests
//!
//! A small social graph schema (person, software, knows, created) and
//! helpers building match sentences over it.

#![allow(dead_code)]

use gopt::plan::logical::{Direction, GetVertexOpt};
use gopt::plan::pattern::{PatternCatalog, StatisticsCatalog};
use gopt::schema::{EdgeTriplet, GraphSchemaType, ScalarType};
use gopt::{GraphMeta, GraphSchema, LogicalNode, MemorySchema};
use std::sync::Arc;

pub const PERSON: i32 = 0;
pub const SOFTWARE: i32 = 1;

/// Route optimizer logs to the test harness; safe to call from every test
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn schema() -> MemorySchema {
    MemorySchema::new()
        .with_vertex(PERSON, "person", &[("name", ScalarType::String), ("age", ScalarType::Int)])
        .with_vertex(SOFTWARE, "software", &[("name", ScalarType::String), ("lang", ScalarType::String)])
        .with_edge(0, "knows", &[(PERSON, PERSON)], &[("weight", ScalarType::Float)])
        .with_edge(1, "created", &[(PERSON, SOFTWARE)], &[])
}

pub fn catalog() -> StatisticsCatalog {
    StatisticsCatalog::new()
        .with_vertex(PERSON, 1_000.0)
        .with_vertex(SOFTWARE, 100.0)
        .with_edge(EdgeTriplet::new(0, PERSON, PERSON), 10_000.0)
        .with_edge(EdgeTriplet::new(1, PERSON, SOFTWARE), 2_000.0)
}

pub fn meta() -> GraphMeta {
    meta_with(Arc::new(catalog()))
}

pub fn meta_with(catalog: Arc<dyn PatternCatalog>) -> GraphMeta {
    GraphMeta::new(Arc::new(schema()), catalog)
}

pub fn person() -> GraphSchemaType {
    schema().vertex_type(&[PERSON]).unwrap()
}

pub fn software() -> GraphSchemaType {
    schema().vertex_type(&[SOFTWARE]).unwrap()
}

pub fn knows() -> GraphSchemaType {
    schema().edge_type(&[EdgeTriplet::new(0, PERSON, PERSON)]).unwrap()
}

pub fn created() -> GraphSchemaType {
    schema().edge_type(&[EdgeTriplet::new(1, PERSON, SOFTWARE)]).unwrap()
}

/// `(start)-[edge]->(end)` as a single match sentence
pub fn hop(
    start: &str,
    start_type: GraphSchemaType,
    edge: &str,
    edge_type: GraphSchemaType,
    end: &str,
    end_type: GraphSchemaType,
) -> LogicalNode {
    LogicalNode::source(start, start_type)
        .expand(start, edge, Direction::Out, edge_type)
        .get_vertex(edge, GetVertexOpt::End, end, end_type)
}

pub fn matched(sentences: Vec<LogicalNode>) -> LogicalNode {
    LogicalNode::Match {
        sentences,
        optional: false,
    }
}

pub fn column_names(plan: &LogicalNode) -> Vec<String> {
    plan.output_columns().into_iter().map(|c| c.name).collect()
}

/// Every node of the tree, shared plans included
pub fn collect<'a>(plan: &'a LogicalNode, out: &mut Vec<&'a LogicalNode>) {
    out.push(plan);
    if let LogicalNode::CommonRef { plan, .. } = plan {
        collect(plan, out);
    }
    for input in plan.inputs() {
        collect(input, out);
    }
}

pub fn count_nodes(plan: &LogicalNode, name: &str) -> usize {
    let mut nodes = Vec::new();
    collect(plan, &mut nodes);
    nodes.iter().filter(|n| n.name() == name).count()
}
