// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Label-count statistics
//!
//! Estimates a pattern's match count under independence:
//! `Π |V(v)| × Π |E(e)| / (|V(src)| · |V(dst)|)`, which for a tree reduces to
//! the root's count times the average fan-out of each edge.

use crate::error::OptimizerResult;
use crate::plan::pattern::graph::Pattern;
use crate::plan::pattern::search::PatternCatalog;
use crate::schema::{EdgeTriplet, LabelId};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexStatistics {
    pub label: LabelId,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeStatistics {
    pub label: LabelId,
    pub src_label: LabelId,
    pub dst_label: LabelId,
    pub count: f64,
}

/// Per-label vertex and per-triplet edge counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsCatalog {
    #[serde(default)]
    pub vertices: Vec<VertexStatistics>,
    #[serde(default)]
    pub edges: Vec<EdgeStatistics>,
}

impl StatisticsCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> OptimizerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> OptimizerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn with_vertex(mut self, label: LabelId, count: f64) -> Self {
        self.vertices.push(VertexStatistics { label, count });
        self
    }

    pub fn with_edge(mut self, triplet: EdgeTriplet, count: f64) -> Self {
        self.edges.push(EdgeStatistics {
            label: triplet.label,
            src_label: triplet.src_label,
            dst_label: triplet.dst_label,
            count,
        });
        self
    }

    fn vertex_count(&self, labels: &[LabelId]) -> Option<f64> {
        labels
            .iter()
            .map(|l| self.vertices.iter().find(|v| v.label == *l).map(|v| v.count))
            .sum()
    }

    fn edge_count(&self, triplets: &[EdgeTriplet]) -> Option<f64> {
        triplets
            .iter()
            .map(|t| {
                self.edges
                    .iter()
                    .find(|e| e.label == t.label && e.src_label == t.src_label && e.dst_label == t.dst_label)
                    .map(|e| e.count)
            })
            .sum()
    }
}

impl PatternCatalog for StatisticsCatalog {
    fn cardinality(&self, pattern: &Pattern) -> Option<f64> {
        let mut estimate = 1.0;
        for node in pattern.vertices() {
            estimate *= self.vertex_count(&pattern.vertex(node)?.types)?;
        }
        for edge in pattern.edges() {
            let (src, dst) = pattern.endpoints(edge)?;
            let edges = self.edge_count(&pattern.edge(edge)?.types)?;
            let src = self.vertex_count(&pattern.vertex(src)?.types)?;
            let dst = self.vertex_count(&pattern.vertex(dst)?.types)?;
            let domain = src * dst;
            estimate *= if domain > 0.0 { edges / domain } else { 0.0 };
        }
        Some(estimate)
    }
}
