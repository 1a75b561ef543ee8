// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Physical operator fusion

use super::Rule;
use crate::error::OptimizerResult;
use crate::plan::logical::{is_anonymous, LogicalNode};

/// Fuse an expand whose edge is never named by the query with the get-vertex
/// reading its far endpoint.
///
/// The fused operator still outputs the edge column, so positions above it
/// do not move.
pub struct ExpandGetVertexFusionRule;

impl Rule for ExpandGetVertexFusionRule {
    fn name(&self) -> &'static str {
        "ExpandGetVertexFusionRule"
    }

    fn apply(&self, node: &LogicalNode) -> OptimizerResult<Option<LogicalNode>> {
        let LogicalNode::GetVertex {
            input,
            edge_alias,
            opt,
            alias,
            schema_type,
            filter,
        } = node
        else {
            return Ok(None);
        };
        let LogicalNode::Expand {
            input: expand_input,
            start_alias,
            alias: expanded,
            direction,
            schema_type: edge_type,
            filter: None,
        } = input.as_ref()
        else {
            return Ok(None);
        };
        if expanded != edge_alias || !is_anonymous(edge_alias) || *opt != direction.target_endpoint() {
            return Ok(None);
        }
        Ok(Some(LogicalNode::ExpandVertex {
            input: expand_input.clone(),
            start_alias: start_alias.clone(),
            edge_alias: edge_alias.clone(),
            edge_type: edge_type.clone(),
            direction: *direction,
            alias: alias.clone(),
            schema_type: schema_type.clone(),
            filter: filter.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::logical::{Direction, GetVertexOpt};
    use crate::schema::{EdgeTriplet, GraphSchemaType, LabelEntry};

    fn person() -> GraphSchemaType {
        GraphSchemaType::vertex(vec![LabelEntry::vertex(0, "person")], vec![])
    }

    fn knows() -> GraphSchemaType {
        GraphSchemaType::edge(vec![LabelEntry::edge(EdgeTriplet::new(0, 0, 0), "knows")], vec![])
    }

    #[test]
    fn test_anonymous_edge_is_fused() {
        let plan = LogicalNode::source("a", person())
            .expand("a", "~e0", Direction::In, knows())
            .get_vertex("~e0", GetVertexOpt::Start, "b", person());
        let before = plan.output_columns();
        let fused = ExpandGetVertexFusionRule.apply(&plan).unwrap().unwrap();
        assert_eq!(fused.name(), "ExpandVertex");
        assert_eq!(fused.output_columns(), before);
    }

    #[test]
    fn test_named_edge_is_kept() {
        let plan = LogicalNode::source("a", person())
            .expand("a", "e", Direction::Out, knows())
            .get_vertex("e", GetVertexOpt::End, "b", person());
        assert!(ExpandGetVertexFusionRule.apply(&plan).unwrap().is_none());
    }
}
