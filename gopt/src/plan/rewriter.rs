// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Fixed-point rule engine
//!
//! Runs an ordered rule list over the plan top-down until a full pass fires no
//! rule. Plans nested inside the tree (shared sub-plans, sub-queries) are
//! optimized first, each once, and their rewritten form is reused by every
//! reference before the outer plan is processed.

use crate::error::OptimizerResult;
use crate::plan::logical::LogicalNode;
use crate::plan::nested::NestedPlans;
use crate::plan::rules::{BoxedRule, RuleRegistry};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Ordered rules plus per-call firing counts
pub struct RuleEngine {
    rule_names: Vec<String>,
    rules: Vec<BoxedRule>,
    max_iterations: usize,
    stats: BTreeMap<&'static str, usize>,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rule_names)
            .field("max_iterations", &self.max_iterations)
            .field("stats", &self.stats)
            .finish()
    }
}

impl RuleEngine {
    pub fn new(rule_names: &[String], max_iterations: usize) -> OptimizerResult<Self> {
        Ok(Self {
            rule_names: rule_names.to_vec(),
            rules: RuleRegistry::resolve(rule_names)?,
            max_iterations,
            stats: BTreeMap::new(),
        })
    }

    /// Names of the loaded rules, in application order
    pub fn rule_names(&self) -> &[String] {
        &self.rule_names
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Firing counts since the last [`RuleEngine::take_stats`]
    pub fn stats(&self) -> &BTreeMap<&'static str, usize> {
        &self.stats
    }

    pub fn take_stats(&mut self) -> BTreeMap<&'static str, usize> {
        std::mem::take(&mut self.stats)
    }

    /// Reload the rule list this engine was built with and drop its counters
    pub fn clear(&mut self) -> OptimizerResult<()> {
        self.rules = RuleRegistry::resolve(&self.rule_names)?;
        self.stats.clear();
        Ok(())
    }

    pub fn optimize(&mut self, plan: LogicalNode) -> OptimizerResult<LogicalNode> {
        let mut nested = NestedPlans::new();
        let plan = self.optimize_nested(plan, &mut nested)?;
        if !nested.is_empty() {
            debug!("rule engine rewrote {} nested plans", nested.len());
        }
        Ok(plan)
    }

    fn optimize_nested(&mut self, mut plan: LogicalNode, nested: &mut NestedPlans) -> OptimizerResult<LogicalNode> {
        nested.rewrite(&mut plan, &mut |sub, nested| self.optimize_nested(sub, nested))?;
        self.fixed_point(plan)
    }

    fn fixed_point(&mut self, mut plan: LogicalNode) -> OptimizerResult<LogicalNode> {
        if self.rules.is_empty() {
            return Ok(plan);
        }
        for iteration in 0..self.max_iterations {
            if !self.pass(&mut plan)? {
                debug!("rule engine reached a fixed point after {} passes", iteration + 1);
                return Ok(plan);
            }
        }
        warn!(
            "rule engine stopped after {} passes without reaching a fixed point",
            self.max_iterations
        );
        Ok(plan)
    }

    /// One top-down pass; at most one rule fires per visited node
    fn pass(&mut self, node: &mut LogicalNode) -> OptimizerResult<bool> {
        let mut changed = false;
        for rule in &self.rules {
            if let Some(rewritten) = rule.apply(node)? {
                debug!("{} fired on {}", rule.name(), node.name());
                *self.stats.entry(rule.name()).or_default() += 1;
                *node = rewritten;
                changed = true;
                break;
            }
        }
        for input in node.inputs_mut() {
            changed |= self.pass(input)?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::expr::{Expr, Operator, Subquery};
    use crate::plan::logical::{next_plan_id, ProjectItem};
    use crate::schema::{GraphSchemaType, LabelEntry};
    use std::sync::Arc;

    fn scan(alias: &str) -> LogicalNode {
        LogicalNode::source(alias, GraphSchemaType::vertex(vec![LabelEntry::vertex(0, "person")], vec![]))
    }

    fn gt(value: i64) -> Expr {
        Expr::binary(Operator::GreaterThan, Expr::prop(0, "a", "age"), Expr::int(value))
    }

    fn engine(names: &[&str]) -> RuleEngine {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        RuleEngine::new(&names, 16).unwrap()
    }

    #[test]
    fn test_runs_to_fixed_point() {
        let plan = scan("a").filter(gt(1)).filter(gt(2)).filter(gt(3));
        let mut engine = engine(&["FilterMergeRule"]);
        let out = engine.optimize(plan).unwrap();
        let LogicalNode::Filter { input, condition } = out else {
            panic!("expected a single filter");
        };
        assert_eq!(*input, scan("a"));
        assert_eq!(condition.conjuncts().len(), 3);
        assert_eq!(engine.stats().get("FilterMergeRule"), Some(&2));
    }

    #[test]
    fn test_subquery_plan_is_optimized() {
        let identity = scan("b").project(vec![ProjectItem::new(Expr::var(0, "b"), "b")], false);
        let sub = Subquery {
            id: next_plan_id(),
            plan: Arc::new(identity),
        };
        let plan = scan("a").filter(Expr::eq(Expr::var(0, "a"), Expr::Subquery(sub)));
        let out = engine(&["ProjectRemoveRule"]).optimize(plan).unwrap();
        let LogicalNode::Filter { condition, .. } = out else {
            panic!("expected a filter");
        };
        let Expr::Binary { right, .. } = condition else {
            panic!("expected a comparison");
        };
        let Expr::Subquery(sub) = *right else {
            panic!("expected a sub-query");
        };
        assert_eq!(*sub.plan, scan("b"));
    }

    #[test]
    fn test_clear_keeps_rule_list() {
        let mut engine = engine(&["FilterMergeRule", "ProjectRemoveRule"]);
        engine
            .optimize(scan("a").filter(gt(1)).filter(gt(2)))
            .unwrap();
        engine.clear().unwrap();
        assert!(engine.stats().is_empty());
        assert_eq!(engine.rule_names(), &["FilterMergeRule".to_string(), "ProjectRemoveRule".to_string()]);
    }
}
