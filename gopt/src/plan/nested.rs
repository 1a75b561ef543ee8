// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plans nested inside other plans
//!
//! Shared sub-plans (`CommonRef`) and scalar sub-queries are not inputs of the
//! operator holding them, so a plain tree walk never reaches them. Every pass
//! that must see them runs through [`NestedPlans::rewrite`], which hands each
//! nested plan to the pass once per id and reuses the result for every other
//! reference.

use crate::error::OptimizerResult;
use crate::plan::expr::Subquery;
use crate::plan::logical::LogicalNode;
use std::collections::HashMap;
use std::sync::Arc;

pub type NestedRewrite<'a> =
    dyn FnMut(LogicalNode, &mut NestedPlans) -> OptimizerResult<LogicalNode> + 'a;

/// Per-pass memo of rewritten nested plans, keyed by plan id
#[derive(Debug, Default)]
pub struct NestedPlans {
    done: HashMap<u64, Arc<LogicalNode>>,
}

impl NestedPlans {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nested plans rewritten so far
    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Rewrite every plan nested anywhere in `node`'s tree with `f`.
    ///
    /// `f` receives this memo so it can recurse into plans nested deeper.
    pub fn rewrite(&mut self, node: &mut LogicalNode, f: &mut NestedRewrite<'_>) -> OptimizerResult<()> {
        if let LogicalNode::CommonRef { id, plan } = node {
            *plan = self.resolve(*id, plan, f)?;
        }
        for expr in node.exprs_mut() {
            if expr.contains_subquery() {
                *expr = expr.try_map_subqueries(&mut |sub| {
                    Ok(Subquery {
                        id: sub.id,
                        plan: self.resolve(sub.id, &sub.plan, &mut *f)?,
                    })
                })?;
            }
        }
        for input in node.inputs_mut() {
            self.rewrite(input, f)?;
        }
        Ok(())
    }

    fn resolve(
        &mut self,
        id: u64,
        plan: &Arc<LogicalNode>,
        f: &mut NestedRewrite<'_>,
    ) -> OptimizerResult<Arc<LogicalNode>> {
        if let Some(done) = self.done.get(&id) {
            return Ok(done.clone());
        }
        let rewritten = Arc::new(f(plan.as_ref().clone(), self)?);
        self.done.insert(id, rewritten.clone());
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::expr::{Expr, Operator};
    use crate::plan::logical::{next_plan_id, ProjectItem};
    use crate::schema::{GraphSchemaType, LabelEntry};

    fn source(alias: &str) -> LogicalNode {
        LogicalNode::source(alias, GraphSchemaType::vertex(vec![LabelEntry::vertex(0, "person")], vec![]))
    }

    #[test]
    fn test_shared_plan_rewritten_once() {
        let shared = Arc::new(source("a"));
        let id = next_plan_id();
        let mut plan = LogicalNode::Join {
            left: Box::new(LogicalNode::CommonRef { id, plan: shared.clone() }),
            right: Box::new(LogicalNode::CommonRef { id, plan: shared }),
            join_type: crate::plan::logical::JoinType::Inner,
            condition: None,
        };

        let mut calls = 0;
        let mut nested = NestedPlans::new();
        nested
            .rewrite(&mut plan, &mut |sub, _| {
                calls += 1;
                Ok(sub.filter(Expr::Literal(crate::plan::expr::Literal::Boolean(true))))
            })
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(nested.len(), 1);
        for input in plan.inputs() {
            match input {
                LogicalNode::CommonRef { plan, .. } => assert_eq!(plan.name(), "Filter"),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_subquery_in_expression_is_reached() {
        let sub = Subquery {
            id: next_plan_id(),
            plan: Arc::new(source("b")),
        };
        let mut plan = source("a").project(
            vec![ProjectItem::new(
                Expr::binary(Operator::Plus, Expr::int(1), Expr::Subquery(sub)),
                "x",
            )],
            false,
        );
        let mut seen = Vec::new();
        NestedPlans::new()
            .rewrite(&mut plan, &mut |sub, _| {
                seen.push(sub.alias().map(|a| a.to_string()));
                Ok(sub)
            })
            .unwrap();
        assert_eq!(seen, vec![Some("b".to_string())]);
    }
}
