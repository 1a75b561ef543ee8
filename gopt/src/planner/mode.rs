// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner group sharing modes

use serde::{Deserialize, Serialize};

/// How planner groups are shared between compilations
///
/// # Modes
///
/// - **Static**: a single group serves every compilation. Concurrent
///   compilations serialize on it and its search memo grows until it is
///   cleared explicitly.
///
/// - **Dynamic**: a fixed pool of groups. Each compilation uses the group
///   selected by hashing the calling thread, and a background sweeper clears
///   every group when free memory runs low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupMode {
    /// One shared group (default)
    ///
    /// Use this mode when:
    /// - Compilations are already serialized by the caller
    /// - Memo growth between explicit clears is acceptable
    #[default]
    Static,

    /// Thread-sharded pool with memory-pressure resets
    ///
    /// Use this mode when:
    /// - Many threads compile queries concurrently
    /// - The process runs long enough for the search memo to matter
    Dynamic,
}

impl GroupMode {
    pub fn is_pooled(&self) -> bool {
        matches!(self, GroupMode::Dynamic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_static() {
        assert_eq!(GroupMode::default(), GroupMode::Static);
        assert!(!GroupMode::Static.is_pooled());
        assert!(GroupMode::Dynamic.is_pooled());
    }
}
