// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for gopt
//!
//! Loads a serialized logical plan with its schema, statistics and planner
//! config, runs the optimizer and prints the result.

pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{Cli, Commands};
pub use handlers::{handle_optimize, handle_rules};
