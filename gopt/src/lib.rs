// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! gopt - query optimization core for graph queries
//!
//! Takes a logical plan built from a graph query and returns an equivalent,
//! cheaper one. The pipeline runs in up to four phases:
//!
//! - **Rule pre-pass**: ordered rewrite rules applied to a fixed point,
//!   including inside shared sub-plans and sub-queries
//! - **Pattern search** (cost-based mode): match operators are converted to
//!   pattern graphs, the cheapest decomposition is searched, and the result is
//!   materialized back into expand, join and intersect operators
//! - **Column pruning**: columns and properties no ancestor reads are dropped
//! - **Physical pass**: operator fusion rules
//!
//! # Usage
//!
//! ```ignore
//! use gopt::{GraphMeta, GroupManager, PlannerConfig};
//!
//! let meta = GraphMeta::new(schema, catalog);
//! let manager = GroupManager::new(PlannerConfig::cost_based(), &meta)?;
//! let optimized = manager.optimize(plan)?;
//! ```

pub mod config;
pub mod error;
pub mod plan;
pub mod planner;
pub mod schema;

pub use config::{ForeignKey, OptimizationMode, PlannerConfig};
pub use error::{OptimizerError, OptimizerResult};
pub use plan::{Expr, LogicalNode};
pub use planner::{
    DynamicGroupManager, GraphMeta, GroupManager, GroupMode, PlanTrace, PlannerGroup,
    StaticGroupManager,
};
pub use schema::{GraphSchema, MemorySchema};

/// gopt version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
