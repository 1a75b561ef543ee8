// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pattern-based join ordering
//!
//! Matches are lifted into [`Pattern`]s by the [`PatternBridge`], decomposed by
//! a [`PatternSearch`] and lowered back into scan, expand and join operators.

pub mod bridge;
pub mod catalog;
pub mod element_table;
pub mod graph;
pub mod search;

pub use bridge::{MatchPattern, PatternBridge};
pub use catalog::{EdgeStatistics, StatisticsCatalog, VertexStatistics};
pub use element_table::{DataKey, DataValue, ElementTable};
pub use graph::{ElementDetails, Pattern, PatternEdge, PatternVertex};
pub use search::{
    ExtendEdge, ExtendSearch, ExtendStep, PatternCatalog, PatternPlan, PatternSearch, PlanStep,
    SearchOptions, DEFAULT_EXPAND_FACTOR, DEFAULT_VERTEX_CARDINALITY,
};
