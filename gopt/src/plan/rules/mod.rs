// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Named rewrite rules
//!
//! Rules are looked up by name from the planner configuration. Each rule
//! inspects a single node (and whatever it needs below it) and either returns
//! a rewritten replacement or `None` when it does not apply.

mod filter_rules;
mod fusion;
mod project_rules;

pub use filter_rules::{FilterIntoMatchRule, FilterJoinTransposeRule, FilterMergeRule};
pub use fusion::ExpandGetVertexFusionRule;
pub use project_rules::{ProjectMergeRule, ProjectRemoveRule};

use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::logical::LogicalNode;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrite `node`, or `None` if the rule does not match it
    fn apply(&self, node: &LogicalNode) -> OptimizerResult<Option<LogicalNode>>;
}

pub type BoxedRule = Box<dyn Rule>;

type RuleFactory = fn() -> BoxedRule;

static REGISTRY: Lazy<BTreeMap<&'static str, RuleFactory>> = Lazy::new(|| {
    let factories: [(&'static str, RuleFactory); 6] = [
        ("FilterIntoMatchRule", || Box::new(FilterIntoMatchRule)),
        ("FilterMergeRule", || Box::new(FilterMergeRule)),
        ("FilterJoinTransposeRule", || Box::new(FilterJoinTransposeRule)),
        ("ProjectMergeRule", || Box::new(ProjectMergeRule)),
        ("ProjectRemoveRule", || Box::new(ProjectRemoveRule)),
        ("ExpandGetVertexFusionRule", || Box::new(ExpandGetVertexFusionRule)),
    ];
    factories.into_iter().collect()
});

/// Process-wide table of rule constructors
pub struct RuleRegistry;

impl RuleRegistry {
    /// Instantiate `names` in order; an unknown name is a configuration error
    pub fn resolve(names: &[String]) -> OptimizerResult<Vec<BoxedRule>> {
        names
            .iter()
            .map(|name| {
                REGISTRY
                    .get(name.as_str())
                    .map(|factory| factory())
                    .ok_or_else(|| OptimizerError::Config(format!("unknown rule '{}'", name)))
            })
            .collect()
    }

    pub fn contains(name: &str) -> bool {
        REGISTRY.contains_key(name)
    }

    /// Registered rule names, sorted
    pub fn names() -> Vec<&'static str> {
        REGISTRY.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keeps_order() {
        let names = vec!["ProjectRemoveRule".to_string(), "FilterMergeRule".to_string()];
        let rules = RuleRegistry::resolve(&names).unwrap();
        let resolved: Vec<&str> = rules.iter().map(|r| r.name()).collect();
        assert_eq!(resolved, vec!["ProjectRemoveRule", "FilterMergeRule"]);
    }

    #[test]
    fn test_unknown_rule_is_config_error() {
        let err = RuleRegistry::resolve(&["NoSuchRule".to_string()]).err();
        assert!(matches!(err, Some(OptimizerError::Config(_))));
    }

    #[test]
    fn test_factory_names_match_rule_names() {
        for name in RuleRegistry::names() {
            let rules = RuleRegistry::resolve(&[name.to_string()]).unwrap();
            assert_eq!(rules[0].name(), name);
        }
    }
}
