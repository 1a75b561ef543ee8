// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Filter pushdown rules

use super::Rule;
use crate::error::OptimizerResult;
use crate::plan::expr::Expr;
use crate::plan::logical::{column_index, JoinType, LogicalNode};
use log::debug;

/// Push single-alias conjuncts of a filter over a match into the graph
/// operator binding that alias.
///
/// The conjunct lands on the first binding in traversal order (sentence by
/// sentence, leaf first), which is also where pattern bridging records an
/// element's filter.
pub struct FilterIntoMatchRule;

impl FilterIntoMatchRule {
    fn push_into(node: &mut LogicalNode, alias: &str, conjunct: &Expr) -> OptimizerResult<bool> {
        for input in node.inputs_mut() {
            if Self::push_into(input, alias, conjunct)? {
                return Ok(true);
            }
        }
        if node.alias() != Some(alias) {
            return Ok(false);
        }
        let Some(index) = column_index(&node.output_columns(), alias) else {
            return Ok(false);
        };
        let Some(slot) = node.graph_filter_mut() else {
            return Ok(false);
        };
        let retargeted = conjunct.retarget(alias, index)?;
        let existing = slot.take();
        *slot = Some(Expr::and_optional(existing, retargeted));
        Ok(true)
    }
}

impl Rule for FilterIntoMatchRule {
    fn name(&self) -> &'static str {
        "FilterIntoMatchRule"
    }

    fn apply(&self, node: &LogicalNode) -> OptimizerResult<Option<LogicalNode>> {
        let LogicalNode::Filter { input, condition } = node else {
            return Ok(None);
        };
        if !matches!(input.as_ref(), LogicalNode::Match { optional: false, .. }) {
            return Ok(None);
        }

        let mut matched = input.as_ref().clone();
        let mut remaining = Vec::new();
        let mut pushed = 0;
        for conjunct in condition.conjuncts() {
            let aliases = conjunct.aliases();
            let single = match aliases.iter().next() {
                Some(alias) if aliases.len() == 1 && !conjunct.contains_subquery() => alias,
                _ => {
                    remaining.push(conjunct);
                    continue;
                }
            };
            let mut target = false;
            if let LogicalNode::Match { sentences, .. } = &mut matched {
                for sentence in sentences.iter_mut() {
                    if Self::push_into(sentence, single, &conjunct)? {
                        target = true;
                        break;
                    }
                }
            }
            if target {
                pushed += 1;
            } else {
                remaining.push(conjunct);
            }
        }

        if pushed == 0 {
            return Ok(None);
        }
        debug!("pushed {} conjuncts into match", pushed);
        Ok(Some(match Expr::conjunction(remaining) {
            Some(rest) => matched.filter(rest),
            None => matched,
        }))
    }
}

/// `Filter(Filter(x, a), b)` → `Filter(x, a AND b)`
pub struct FilterMergeRule;

impl Rule for FilterMergeRule {
    fn name(&self) -> &'static str {
        "FilterMergeRule"
    }

    fn apply(&self, node: &LogicalNode) -> OptimizerResult<Option<LogicalNode>> {
        let LogicalNode::Filter { input, condition } = node else {
            return Ok(None);
        };
        let LogicalNode::Filter {
            input: inner,
            condition: inner_condition,
        } = input.as_ref()
        else {
            return Ok(None);
        };
        Ok(Some(
            inner
                .as_ref()
                .clone()
                .filter(Expr::and(inner_condition.clone(), condition.clone())),
        ))
    }
}

/// Push conjuncts that read only one side of an inner join below it
pub struct FilterJoinTransposeRule;

impl Rule for FilterJoinTransposeRule {
    fn name(&self) -> &'static str {
        "FilterJoinTransposeRule"
    }

    fn apply(&self, node: &LogicalNode) -> OptimizerResult<Option<LogicalNode>> {
        let LogicalNode::Filter { input, condition } = node else {
            return Ok(None);
        };
        let LogicalNode::Join {
            left,
            right,
            join_type: JoinType::Inner,
            condition: join_condition,
        } = input.as_ref()
        else {
            return Ok(None);
        };

        let left_width = left.output_columns().len();
        let mut to_left = Vec::new();
        let mut to_right = Vec::new();
        let mut remaining = Vec::new();
        for conjunct in condition.conjuncts() {
            let indices = conjunct.input_indices();
            if indices.is_empty() || conjunct.contains_subquery() {
                remaining.push(conjunct);
            } else if indices.iter().all(|i| *i < left_width) {
                to_left.push(conjunct);
            } else if indices.iter().all(|i| *i >= left_width) {
                to_right.push(conjunct.shift(-(left_width as isize))?);
            } else {
                remaining.push(conjunct);
            }
        }
        if to_left.is_empty() && to_right.is_empty() {
            return Ok(None);
        }

        let push = |side: &LogicalNode, conjuncts: Vec<Expr>| match Expr::conjunction(conjuncts) {
            Some(c) => side.clone().filter(c),
            None => side.clone(),
        };
        let join = LogicalNode::Join {
            left: Box::new(push(left.as_ref(), to_left)),
            right: Box::new(push(right.as_ref(), to_right)),
            join_type: JoinType::Inner,
            condition: join_condition.clone(),
        };
        Ok(Some(match Expr::conjunction(remaining) {
            Some(rest) => join.filter(rest),
            None => join,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::expr::Operator;
    use crate::plan::logical::{Direction, GetVertexOpt};
    use crate::schema::{EdgeTriplet, GraphSchemaType, LabelEntry};

    fn person() -> GraphSchemaType {
        GraphSchemaType::vertex(vec![LabelEntry::vertex(0, "person")], vec![])
    }

    fn knows() -> GraphSchemaType {
        GraphSchemaType::edge(vec![LabelEntry::edge(EdgeTriplet::new(0, 0, 0), "knows")], vec![])
    }

    fn gt(index: usize, alias: &str, value: i64) -> Expr {
        Expr::binary(Operator::GreaterThan, Expr::prop(index, alias, "age"), Expr::int(value))
    }

    #[test]
    fn test_filter_pushed_to_binding_operator() {
        let sentence = LogicalNode::source("a", person())
            .expand("a", "e", Direction::Out, knows())
            .get_vertex("e", GetVertexOpt::End, "b", person());
        let cross = Expr::eq(Expr::prop(0, "a", "name"), Expr::prop(2, "b", "name"));
        let plan = LogicalNode::Match {
            sentences: vec![sentence],
            optional: false,
        }
        .filter(Expr::and(Expr::and(gt(2, "b", 30), gt(0, "a", 20)), cross.clone()));

        let out = FilterIntoMatchRule.apply(&plan).unwrap().unwrap();
        let LogicalNode::Filter { input, condition } = &out else {
            panic!("cross-alias conjunct should stay above the match");
        };
        assert_eq!(condition, &cross);
        let LogicalNode::Match { sentences, .. } = input.as_ref() else {
            panic!("expected a match");
        };
        let get_vertex = &sentences[0];
        assert_eq!(get_vertex.graph_filter(), Some(&gt(2, "b", 30)));
        let source = get_vertex.inputs()[0].inputs()[0];
        assert_eq!(source.graph_filter(), Some(&gt(0, "a", 20)));
    }

    #[test]
    fn test_optional_match_untouched() {
        let plan = LogicalNode::Match {
            sentences: vec![LogicalNode::source("a", person())],
            optional: true,
        }
        .filter(gt(0, "a", 20));
        assert!(FilterIntoMatchRule.apply(&plan).unwrap().is_none());
    }

    #[test]
    fn test_merge_filters() {
        let plan = LogicalNode::source("a", person())
            .filter(gt(0, "a", 1))
            .filter(gt(0, "a", 2));
        let out = FilterMergeRule.apply(&plan).unwrap().unwrap();
        let LogicalNode::Filter { condition, .. } = out else {
            panic!("expected a filter");
        };
        assert_eq!(condition.conjuncts(), vec![gt(0, "a", 1), gt(0, "a", 2)]);
    }

    #[test]
    fn test_right_only_conjunct_is_shifted() {
        let plan = LogicalNode::Join {
            left: Box::new(LogicalNode::source("a", person())),
            right: Box::new(LogicalNode::source("b", person())),
            join_type: JoinType::Inner,
            condition: None,
        }
        .filter(gt(1, "b", 3));
        let out = FilterJoinTransposeRule.apply(&plan).unwrap().unwrap();
        let LogicalNode::Join { right, .. } = out else {
            panic!("filter should be fully pushed");
        };
        let LogicalNode::Filter { condition, .. } = right.as_ref() else {
            panic!("expected a filter on the right side");
        };
        assert_eq!(condition, &gt(0, "b", 3));
    }
}
