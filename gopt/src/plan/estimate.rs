// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Selectivity estimation for pattern elements
//!
//! The bridge asks an estimator for the selectivity of every scan/expand it
//! turns into a pattern element. Implementations are expected to be
//! idempotent; the optimizer calls them again on every compilation and does
//! not cache answers across calls.

use crate::plan::expr::{Expr, Literal, Operator};
use crate::plan::logical::LogicalNode;

/// Selectivity of a graph operator's residual filter
pub trait CardinalityEstimator: Send + Sync + std::fmt::Debug {
    /// Fraction of the elements produced by `node` that survive `filter`, in [0, 1]
    fn selectivity(&self, node: &LogicalNode, filter: Option<&Expr>) -> f64;
}

/// Fixed per-predicate selectivities
#[derive(Debug, Clone)]
pub struct HeuristicEstimator {
    pub equality: f64,
    pub range: f64,
    pub other: f64,
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self {
            equality: 0.1,
            range: 0.3,
            other: 0.5,
        }
    }
}

impl HeuristicEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    fn estimate(&self, expr: &Expr) -> f64 {
        match expr {
            Expr::Binary {
                op: Operator::And,
                left,
                right,
            } => self.estimate(left) * self.estimate(right),
            Expr::Binary {
                op: Operator::Or,
                left,
                right,
            } => (self.estimate(left) + self.estimate(right)).min(1.0),
            Expr::Unary {
                op: Operator::Not,
                operand,
            } => 1.0 - self.estimate(operand),
            Expr::Binary {
                op: Operator::Equal,
                ..
            } => self.equality,
            Expr::Binary { op, .. } if op.is_range() => self.range,
            Expr::Literal(Literal::Boolean(true)) => 1.0,
            Expr::Literal(Literal::Boolean(false)) => 0.0,
            _ => self.other,
        }
    }
}

impl CardinalityEstimator for HeuristicEstimator {
    fn selectivity(&self, _node: &LogicalNode, filter: Option<&Expr>) -> f64 {
        filter.map(|f| self.estimate(f)).unwrap_or(1.0).clamp(0.0, 1.0)
    }
}
