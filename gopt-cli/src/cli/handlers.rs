// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI command handlers

use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use super::commands::{ModeArg, OutputFormat};
use super::output::PlanFormatter;
use gopt::plan::pattern::StatisticsCatalog;
use gopt::plan::RuleRegistry;
use gopt::{GraphMeta, GroupManager, LogicalNode, MemorySchema, OptimizationMode, PlannerConfig};

/// Handle the rules command
pub fn handle_rules() -> Result<(), Box<dyn std::error::Error>> {
    let defaults = PlannerConfig::default();
    println!("{}", "Available rules".bold().green());
    for name in RuleRegistry::names() {
        let marker = if defaults.rules.iter().any(|r| r == name) {
            " (default)"
        } else if defaults.physical_rules.iter().any(|r| r == name) {
            " (default, physical)"
        } else {
            ""
        };
        println!("  {}{}", name.cyan(), marker.dimmed());
    }
    Ok(())
}

/// Handle the optimize command
///
/// A plan the optimizer has no handler for is printed unchanged with a
/// warning; any other error aborts.
#[allow(clippy::too_many_arguments)]
pub fn handle_optimize(
    plan: PathBuf,
    schema: PathBuf,
    config: Option<PathBuf>,
    statistics: Option<PathBuf>,
    mode: Option<ModeArg>,
    format: OutputFormat,
    trace: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match config {
        Some(path) => PlannerConfig::from_file(path)?,
        None => PlannerConfig::default(),
    };
    match mode {
        Some(ModeArg::Rbo) => config.mode = OptimizationMode::RuleBased,
        Some(ModeArg::Cbo) => config.mode = OptimizationMode::CostBased,
        None => {}
    }

    let schema = MemorySchema::from_file(&schema)?;
    let catalog = match statistics {
        Some(path) => StatisticsCatalog::from_file(path)?,
        None => StatisticsCatalog::new(),
    };
    let meta = GraphMeta::new(Arc::new(schema), Arc::new(catalog));

    let text = std::fs::read_to_string(&plan)
        .map_err(|e| format!("Failed to read plan {:?}: {}", plan, e))?;
    let input: LogicalNode = serde_json::from_str(&text)?;
    log::info!("loaded plan of {} operators from {:?}", input.node_count(), plan);

    let manager = GroupManager::new(config, &meta)?;
    let result = manager.optimize_with_trace(input.clone());
    manager.shutdown();

    let (optimized, plan_trace) = match result {
        Ok(done) => done,
        Err(e) if e.is_fallback_eligible() => {
            eprintln!(
                "{}",
                format!("Optimization skipped, plan left unchanged: {}", e).yellow()
            );
            (input, Default::default())
        }
        Err(e) => return Err(format!("Optimization failed: {}", e).into()),
    };

    print!("{}", PlanFormatter::format(&optimized, format)?);
    if trace {
        print!("{}", PlanFormatter::format_trace(&plan_trace));
    }
    Ok(())
}
