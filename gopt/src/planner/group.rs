// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner group: one instance of every stateful pass
//!
//! A group is not safe for concurrent use; the managers in
//! [`crate::planner::manager`] hand out exclusive access to it.

use crate::config::PlannerConfig;
use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::estimate::{CardinalityEstimator, HeuristicEstimator};
use crate::plan::logical::LogicalNode;
use crate::plan::pattern::{ExtendSearch, PatternBridge, PatternCatalog, PatternSearch, SearchOptions};
use crate::plan::pruning::FieldTrimmer;
use crate::plan::rewriter::RuleEngine;
use crate::planner::trace::{PlanTrace, PlanTracer, PlanningPhase};
use crate::schema::{GraphSchema, LabelId};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Schema and statistics shared by every group of a manager
#[derive(Debug, Clone)]
pub struct GraphMeta {
    pub schema: Arc<dyn GraphSchema>,
    pub catalog: Arc<dyn PatternCatalog>,
    pub estimator: Arc<dyn CardinalityEstimator>,
}

impl GraphMeta {
    /// Metadata with the default per-predicate selectivity estimator
    pub fn new(schema: Arc<dyn GraphSchema>, catalog: Arc<dyn PatternCatalog>) -> Self {
        Self {
            schema,
            catalog,
            estimator: Arc::new(HeuristicEstimator::new()),
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn CardinalityEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Label ids of the configured foreign-key pairs
    fn foreign_keys(&self, config: &PlannerConfig) -> OptimizerResult<Option<Vec<(LabelId, LabelId)>>> {
        if !config.join_by_foreign_key {
            return Ok(None);
        }
        let label = |name: &str| {
            self.schema
                .vertex_labels()
                .into_iter()
                .find(|l| l.name == name)
                .map(|l| l.id)
                .ok_or_else(|| {
                    OptimizerError::Config(format!("foreign key references unknown label '{}'", name))
                })
        };
        config
            .foreign_keys
            .iter()
            .map(|fk| Ok((label(&fk.source_label)?, label(&fk.target_label)?)))
            .collect::<OptimizerResult<Vec<_>>>()
            .map(Some)
    }
}

/// The passes of one optimization pipeline
#[derive(Debug)]
pub struct PlannerGroup {
    config: PlannerConfig,
    rules: RuleEngine,
    bridge: PatternBridge,
    search: Box<dyn PatternSearch>,
    trimmer: FieldTrimmer,
    physical: Option<RuleEngine>,
}

impl PlannerGroup {
    /// Build a group using [`ExtendSearch`] over `meta.catalog`
    pub fn new(config: PlannerConfig, meta: &GraphMeta) -> OptimizerResult<Self> {
        config.validate()?;
        let options = SearchOptions {
            max_pattern_size: config.max_pattern_size,
            join_min_pattern_size: config.join_min_pattern_size,
            join_queue_capacity: config.join_queue_capacity,
            foreign_keys: meta.foreign_keys(&config)?,
        };
        let search = Box::new(ExtendSearch::new(meta.catalog.clone(), options));
        Self::with_search(config, meta, search)
    }

    /// Build a group around a caller-supplied pattern search
    pub fn with_search(
        config: PlannerConfig,
        meta: &GraphMeta,
        search: Box<dyn PatternSearch>,
    ) -> OptimizerResult<Self> {
        config.validate()?;
        let rules = RuleEngine::new(&config.rules, config.max_rule_iterations)?;
        let physical = if config.physical_rules.is_empty() {
            None
        } else {
            Some(RuleEngine::new(&config.physical_rules, config.max_rule_iterations)?)
        };
        debug!(
            "planner group ready: {:?} mode, {} rules, {} physical rules",
            config.mode,
            config.rules.len(),
            config.physical_rules.len()
        );
        Ok(Self {
            bridge: PatternBridge::new(meta.estimator.clone()),
            config,
            rules,
            search,
            trimmer: FieldTrimmer::new(),
            physical,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Rules of the pre-pass, in load order
    pub fn rule_names(&self) -> &[String] {
        self.rules.rule_names()
    }

    pub fn physical_rule_names(&self) -> &[String] {
        self.physical.as_ref().map(|p| p.rule_names()).unwrap_or(&[])
    }

    pub fn optimize(&mut self, plan: LogicalNode) -> OptimizerResult<LogicalNode> {
        self.optimize_with_trace(plan).map(|(plan, _)| plan)
    }

    /// Run the whole pipeline and report what every phase did
    pub fn optimize_with_trace(&mut self, plan: LogicalNode) -> OptimizerResult<(LogicalNode, PlanTrace)> {
        if !self.config.enabled {
            return Ok((plan, PlanTrace::default()));
        }
        let result = self.run(plan);
        self.reset_transient();
        result
    }

    fn run(&mut self, plan: LogicalNode) -> OptimizerResult<(LogicalNode, PlanTrace)> {
        let mut tracer = PlanTracer::new();

        tracer.start_step(&plan);
        let mut plan = self.rules.optimize(plan)?;
        tracer.end_step(PlanningPhase::RulePrePass, &plan, self.rules.take_stats());

        if self.config.is_cost_based() {
            tracer.start_step(&plan);
            plan = self.bridge.process_input(plan)?;
            plan = self.bridge.process_output(plan, self.search.as_mut())?;
            tracer.end_step(PlanningPhase::PatternSearch, &plan, BTreeMap::new());
        }

        if self.config.trim_fields {
            tracer.start_step(&plan);
            plan = self.trimmer.trim_plan(plan)?;
            tracer.end_step(PlanningPhase::ColumnPruning, &plan, BTreeMap::new());
        }

        if let Some(physical) = self.physical.as_mut() {
            tracer.start_step(&plan);
            plan = physical.optimize(plan)?;
            tracer.end_step(PlanningPhase::PhysicalPass, &plan, physical.take_stats());
        }

        Ok((plan, tracer.finalize()))
    }

    /// Drop counters left over by a call
    fn reset_transient(&mut self) {
        self.rules.take_stats();
        if let Some(physical) = self.physical.as_mut() {
            physical.take_stats();
        }
    }

    /// Reload every pass with the rules it was built with and drop the
    /// search memo
    pub fn clear(&mut self) -> OptimizerResult<()> {
        self.rules.clear()?;
        if let Some(physical) = self.physical.as_mut() {
            physical.clear()?;
        }
        self.search.clear();
        info!("planner group cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForeignKey;
    use crate::plan::expr::{Expr, Operator};
    use crate::plan::pattern::StatisticsCatalog;
    use crate::schema::{MemorySchema, ScalarType};

    fn meta() -> GraphMeta {
        let schema = MemorySchema::new()
            .with_vertex(0, "person", &[("name", ScalarType::String), ("age", ScalarType::Int)])
            .with_edge(0, "knows", &[(0, 0)], &[]);
        GraphMeta::new(Arc::new(schema), Arc::new(StatisticsCatalog::new()))
    }

    fn person(meta: &GraphMeta) -> crate::schema::GraphSchemaType {
        meta.schema.vertex_type(&[0]).unwrap()
    }

    #[test]
    fn test_disabled_is_identity() {
        let meta = meta();
        let config = PlannerConfig {
            enabled: false,
            ..PlannerConfig::default()
        };
        let mut group = PlannerGroup::new(config, &meta).unwrap();
        let plan = LogicalNode::source("a", person(&meta))
            .filter(Expr::Literal(crate::plan::expr::Literal::Boolean(true)))
            .filter(Expr::Literal(crate::plan::expr::Literal::Boolean(true)));
        assert_eq!(group.optimize(plan.clone()).unwrap(), plan);
    }

    #[test]
    fn test_unknown_foreign_key_label_rejected() {
        let config = PlannerConfig {
            join_by_foreign_key: true,
            foreign_keys: vec![ForeignKey {
                source_label: "person".to_string(),
                target_label: "company".to_string(),
            }],
            ..PlannerConfig::cost_based()
        };
        let err = PlannerGroup::new(config, &meta()).err();
        assert!(matches!(err, Some(OptimizerError::Config(_))));
    }

    #[test]
    fn test_trace_lists_enabled_phases() {
        let meta = meta();
        let mut group = PlannerGroup::new(PlannerConfig::rule_based(), &meta).unwrap();
        let age = Expr::binary(Operator::GreaterThan, Expr::prop(0, "a", "age"), Expr::int(3));
        let plan = LogicalNode::source("a", person(&meta)).filter(age.clone()).filter(age);
        let (_, trace) = group.optimize_with_trace(plan).unwrap();
        let phases: Vec<PlanningPhase> = trace.steps.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                PlanningPhase::RulePrePass,
                PlanningPhase::ColumnPruning,
                PlanningPhase::PhysicalPass
            ]
        );
        assert_eq!(trace.steps[0].rule_firings.get("FilterMergeRule"), Some(&1));
    }
}
