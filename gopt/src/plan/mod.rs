// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Logical plans and the passes that rewrite them
//!
//! This module holds the plan vocabulary ([`LogicalNode`], [`Expr`]) together
//! with the individual optimization passes: rule-based rewriting, pattern
//! bridging and search, and column pruning. The [`crate::planner`] module
//! chains them into a pipeline.

pub mod estimate;
pub mod expr;
pub mod logical;
pub mod nested;
pub mod pattern;
pub mod pruning;
pub mod rewriter;
pub mod rules;

pub use estimate::{CardinalityEstimator, HeuristicEstimator};
pub use expr::{Expr, Literal, Operator, Subquery, Variable};
pub use logical::{
    AggregateCall, AggregateFunction, Column, Direction, GetVertexOpt, JoinType, LogicalNode,
    ProjectItem, SortKey,
};
pub use nested::NestedPlans;
pub use pruning::{FieldTrimmer, UsedFields};
pub use rewriter::RuleEngine;
pub use rules::{BoxedRule, Rule, RuleRegistry};
