// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner configuration

use crate::error::{OptimizerError, OptimizerResult};
use crate::planner::mode::GroupMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Optimization strategy
///
/// Parsed from `RuleBased`/`RBO` or `CostBased`/`CBO`, case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum OptimizationMode {
    /// Rule-based rewrites only
    #[default]
    RuleBased,
    /// Rule-based rewrites plus cost-based pattern search
    CostBased,
}

impl FromStr for OptimizationMode {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rulebased" | "rbo" => Ok(OptimizationMode::RuleBased),
            "costbased" | "cbo" => Ok(OptimizationMode::CostBased),
            _ => Err(OptimizerError::Config(format!(
                "unsupported optimization mode '{}'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for OptimizationMode {
    type Error = OptimizerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A label pair along which join decomposition is allowed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub source_label: String,
    pub target_label: String,
}

/// Configuration of one planner group and of the pool around it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Enable/disable optimization entirely
    pub enabled: bool,

    pub mode: OptimizationMode,

    /// Ordered rule names loaded into the rule-based pre-pass
    pub rules: Vec<String>,

    /// Ordered rule names loaded into the physical pass; empty disables it
    pub physical_rules: Vec<String>,

    /// Run column pruning after pattern search
    pub trim_fields: bool,

    /// Largest pattern (in vertices) the statistics catalog is queried for
    pub max_pattern_size: usize,

    /// Fixed-point iteration cap of the rule engine
    pub max_rule_iterations: usize,

    pub group_mode: GroupMode,

    /// Number of groups in the dynamic pool
    pub pool_size: usize,

    /// Memory-pressure sweep interval of the dynamic pool
    pub reset_interval_ms: u64,

    /// Groups are cleared when free/total memory drops below this fraction
    pub free_memory_threshold: f64,

    /// Minimum pattern size before join decomposition is attempted
    pub join_min_pattern_size: usize,

    /// Maximum join decompositions considered per pattern
    pub join_queue_capacity: usize,

    /// Only decompose along `foreign_keys`
    pub join_by_foreign_key: bool,

    pub foreign_keys: Vec<ForeignKey>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: OptimizationMode::RuleBased,
            rules: vec![
                "FilterIntoMatchRule".to_string(),
                "FilterMergeRule".to_string(),
                "FilterJoinTransposeRule".to_string(),
                "ProjectMergeRule".to_string(),
                "ProjectRemoveRule".to_string(),
            ],
            physical_rules: vec!["ExpandGetVertexFusionRule".to_string()],
            trim_fields: true,
            max_pattern_size: 3,
            max_rule_iterations: 64,
            group_mode: GroupMode::Static,
            pool_size: 4,
            reset_interval_ms: 60_000,
            free_memory_threshold: 0.2,
            join_min_pattern_size: 5,
            join_queue_capacity: 3,
            join_by_foreign_key: false,
            foreign_keys: Vec::new(),
        }
    }
}

impl PlannerConfig {
    pub fn rule_based() -> Self {
        Self::default()
    }

    pub fn cost_based() -> Self {
        Self {
            mode: OptimizationMode::CostBased,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> OptimizerResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if let Some(mode) = value.get("mode").and_then(|m| m.as_str()) {
            mode.parse::<OptimizationMode>()?;
        }
        let config: PlannerConfig = serde_json::from_value(value)?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> OptimizerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn is_cost_based(&self) -> bool {
        self.mode == OptimizationMode::CostBased
    }

    pub fn reset_interval(&self) -> Duration {
        Duration::from_millis(self.reset_interval_ms)
    }

    /// Check everything that can be checked without a schema.
    ///
    /// Rule names are resolved separately when a group loads them.
    pub fn validate(&self) -> OptimizerResult<()> {
        if self.pool_size == 0 {
            return Err(OptimizerError::Config(
                "pool_size must be positive".to_string(),
            ));
        }
        if self.max_pattern_size == 0 {
            return Err(OptimizerError::Config(
                "max_pattern_size must be positive".to_string(),
            ));
        }
        if self.max_rule_iterations == 0 {
            return Err(OptimizerError::Config(
                "max_rule_iterations must be positive".to_string(),
            ));
        }
        if !(self.free_memory_threshold > 0.0 && self.free_memory_threshold <= 1.0) {
            return Err(OptimizerError::Config(format!(
                "free_memory_threshold must be in (0, 1], got {}",
                self.free_memory_threshold
            )));
        }
        if self.group_mode == GroupMode::Dynamic && self.reset_interval_ms == 0 {
            return Err(OptimizerError::Config(
                "reset_interval_ms must be positive for the dynamic pool".to_string(),
            ));
        }
        if self.join_by_foreign_key && self.foreign_keys.is_empty() {
            return Err(OptimizerError::Config(
                "join_by_foreign_key requires at least one foreign key".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_cost_based());
        assert_eq!(config.rules.len(), 5);
    }

    #[test]
    fn test_mode_aliases() {
        let config = PlannerConfig::from_json_str(r#"{"mode": "CBO"}"#).unwrap();
        assert_eq!(config.mode, OptimizationMode::CostBased);
        let config = PlannerConfig::from_json_str(r#"{"mode": "RBO", "pool_size": 8}"#).unwrap();
        assert_eq!(config.mode, OptimizationMode::RuleBased);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.max_pattern_size, 3);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = PlannerConfig::from_json_str(r#"{"mode": "Genetic"}"#).unwrap_err();
        assert!(matches!(err, OptimizerError::Config(_)));
        let err = PlannerConfig::from_json_str(r#"{"mode": 3}"#).unwrap_err();
        assert!(matches!(err, OptimizerError::ConfigSource(_)));
    }

    #[test]
    fn test_mode_parses_case_insensitively() {
        assert_eq!("cbo".parse::<OptimizationMode>().unwrap(), OptimizationMode::CostBased);
        assert_eq!("RuleBased".parse::<OptimizationMode>().unwrap(), OptimizationMode::RuleBased);
        let err = "volcano".parse::<OptimizationMode>().unwrap_err();
        assert!(matches!(err, OptimizerError::Config(_)));
        let config = PlannerConfig::from_json_str(r#"{"mode": "costbased"}"#).unwrap();
        assert!(config.is_cost_based());
    }

    #[test]
    fn test_non_positive_pool_size() {
        let config = PlannerConfig {
            pool_size: 0,
            ..PlannerConfig::default()
        };
        assert!(matches!(config.validate(), Err(OptimizerError::Config(_))));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = PlannerConfig {
            free_memory_threshold: 1.5,
            ..PlannerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"mode": "CostBased", "group_mode": "Dynamic", "foreign_keys": [{{"source_label": "person", "target_label": "city"}}]}}"#
        )
        .unwrap();
        let config = PlannerConfig::from_file(file.path()).unwrap();
        assert!(config.is_cost_based());
        assert_eq!(config.group_mode, GroupMode::Dynamic);
        assert_eq!(config.foreign_keys[0].target_label, "city");
    }
}
