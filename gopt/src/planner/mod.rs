// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Optimization pipeline and the managers that share it between threads

pub mod group;
pub mod manager;
pub mod mode;
pub mod trace;

pub use group::{GraphMeta, PlannerGroup};
pub use manager::{
    group_index_for, DynamicGroupManager, FixedProbe, GroupGuard, GroupManager, MemoryProbe,
    MemorySample, ProcMeminfoProbe, StaticGroupManager,
};
pub use mode::GroupMode;
pub use trace::{PlanTrace, PlanTracer, PlanningPhase, TraceStep};
