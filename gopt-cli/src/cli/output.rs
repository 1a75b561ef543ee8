// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan formatting for CLI output

use colored::*;
use gopt::{LogicalNode, PlanTrace};

use super::commands::OutputFormat;

/// Formatter for optimized plans
pub struct PlanFormatter;

impl PlanFormatter {
    pub fn format(plan: &LogicalNode, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Explain => Ok(Self::format_explain(plan)),
            OutputFormat::Json => Self::format_json(plan),
        }
    }

    fn format_explain(plan: &LogicalNode) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", "Optimized Plan".bold().green()));
        let columns: Vec<String> = plan.output_columns().into_iter().map(|c| c.name).collect();
        output.push_str(&format!("Columns: {}\n", columns.join(", ")));
        output.push_str(&format!("Operators: {}\n\n", plan.node_count()));
        output.push_str(&plan.explain());
        if !output.ends_with('\n') {
            output.push('\n');
        }
        output
    }

    fn format_json(plan: &LogicalNode) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(plan)?;
        json.push('\n');
        Ok(json)
    }

    pub fn format_trace(trace: &PlanTrace) -> String {
        if trace.steps.is_empty() {
            return format!("{}\n", "Optimizer disabled, no phases ran".yellow());
        }
        format!("\n{}", trace.format().cyan())
    }
}
