// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! gopt CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v/--verbose takes precedence over --log-level; RUST_LOG still applies
    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{} {}", "gopt".bold().green(), gopt::VERSION);
            println!("Graph query optimizer");
            Ok(())
        }

        Commands::Rules => cli::handle_rules(),

        Commands::Optimize {
            plan,
            schema,
            config,
            statistics,
            mode,
            format,
            trace,
        } => cli::handle_optimize(plan, schema, config, statistics, mode, format, trace),
    }
}
