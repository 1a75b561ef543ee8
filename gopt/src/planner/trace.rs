// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planning pipeline tracing
//!
//! Captures what each phase of [`crate::planner::PlannerGroup::optimize_with_trace`]
//! did to the plan, for explain output and debugging.

use crate::plan::logical::LogicalNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Planning phases for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanningPhase {
    RulePrePass,
    PatternSearch,
    ColumnPruning,
    PhysicalPass,
}

impl fmt::Display for PlanningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanningPhase::RulePrePass => "rule pre-pass",
            PlanningPhase::PatternSearch => "pattern search",
            PlanningPhase::ColumnPruning => "column pruning",
            PlanningPhase::PhysicalPass => "physical pass",
        };
        f.write_str(name)
    }
}

/// Individual step in the planning process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub phase: PlanningPhase,
    pub duration: Duration,
    pub nodes_before: usize,
    pub nodes_after: usize,
    /// Rule name → number of firings during this step
    pub rule_firings: BTreeMap<String, usize>,
}

/// Trace of one `optimize` call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanTrace {
    pub steps: Vec<TraceStep>,
    pub total_duration: Duration,
}

/// Builder for creating plan traces
#[derive(Debug)]
pub struct PlanTracer {
    steps: Vec<TraceStep>,
    start_time: Instant,
    current_step: Option<(Instant, usize)>,
}

impl Default for PlanTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanTracer {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            start_time: Instant::now(),
            current_step: None,
        }
    }

    /// Start timing a step over `plan`
    pub fn start_step(&mut self, plan: &LogicalNode) {
        self.current_step = Some((Instant::now(), plan.node_count()));
    }

    /// End the current step and record it
    pub fn end_step(
        &mut self,
        phase: PlanningPhase,
        plan: &LogicalNode,
        rule_firings: BTreeMap<&'static str, usize>,
    ) {
        let nodes_after = plan.node_count();
        let (duration, nodes_before) = self
            .current_step
            .take()
            .map(|(start, nodes)| (start.elapsed(), nodes))
            .unwrap_or((Duration::from_millis(0), nodes_after));

        self.steps.push(TraceStep {
            phase,
            duration,
            nodes_before,
            nodes_after,
            rule_firings: rule_firings
                .into_iter()
                .map(|(name, count)| (name.to_string(), count))
                .collect(),
        });
    }

    pub fn finalize(self) -> PlanTrace {
        PlanTrace {
            steps: self.steps,
            total_duration: self.start_time.elapsed(),
        }
    }
}

impl PlanTrace {
    pub fn step(&self, phase: PlanningPhase) -> Option<&TraceStep> {
        self.steps.iter().find(|s| s.phase == phase)
    }

    /// Total rule firings over all steps
    pub fn total_firings(&self) -> usize {
        self.steps
            .iter()
            .flat_map(|s| s.rule_firings.values())
            .sum()
    }

    /// Format the trace as a phase summary
    pub fn format(&self) -> String {
        let mut output = String::new();
        output.push_str("Planning Steps\n");
        output.push_str(&"-".repeat(30));
        output.push('\n');
        for (i, step) in self.steps.iter().enumerate() {
            output.push_str(&format!(
                "{}. {} ({:.1}ms) nodes {} -> {}\n",
                i + 1,
                step.phase,
                step.duration.as_secs_f64() * 1000.0,
                step.nodes_before,
                step.nodes_after
            ));
            for (rule, count) in &step.rule_firings {
                output.push_str(&format!("   {} x{}\n", rule, count));
            }
        }
        output.push_str(&format!(
            "Total: {:.1}ms\n",
            self.total_duration.as_secs_f64() * 1000.0
        ));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::expr::{Expr, Literal};
    use crate::schema::{GraphSchemaType, LabelEntry};

    #[test]
    fn test_records_steps_in_order() {
        let plan = LogicalNode::source("a", GraphSchemaType::vertex(vec![LabelEntry::vertex(0, "person")], vec![]));
        let filtered = plan.clone().filter(Expr::Literal(Literal::Boolean(true)));

        let mut tracer = PlanTracer::new();
        tracer.start_step(&filtered);
        tracer.end_step(
            PlanningPhase::RulePrePass,
            &plan,
            BTreeMap::from([("FilterMergeRule", 2)]),
        );
        tracer.start_step(&plan);
        tracer.end_step(PlanningPhase::ColumnPruning, &plan, BTreeMap::new());
        let trace = tracer.finalize();

        assert_eq!(trace.steps.len(), 2);
        let first = trace.step(PlanningPhase::RulePrePass).unwrap();
        assert_eq!((first.nodes_before, first.nodes_after), (2, 1));
        assert_eq!(trace.total_firings(), 2);
        let text = trace.format();
        assert!(text.contains("1. rule pre-pass"));
        assert!(text.contains("FilterMergeRule x2"));
        assert!(text.contains("2. column pruning"));
    }
}
