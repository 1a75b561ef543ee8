// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph schema handle consumed by the optimizer
//!
//! Schema loading and refresh live outside this crate. The optimizer only needs
//! to resolve label ids to their names and declared properties, which is what
//! [`GraphSchema`] exposes. [`MemorySchema`] is a plain in-memory implementation
//! that can be built programmatically or loaded from JSON.

pub mod types;

pub use types::{
    DataType, EdgeTriplet, ElementKind, GraphSchemaType, LabelEntry, LabelId, PropertyDef,
    PropertyId, ScalarType,
};

use crate::error::{OptimizerError, OptimizerResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A vertex label and its declared properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDef {
    pub id: LabelId,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

/// An edge label, the vertex label pairs it connects and its properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeLabelDef {
    pub id: LabelId,
    pub name: String,
    /// (source label, destination label) pairs
    pub relations: Vec<(LabelId, LabelId)>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

impl EdgeLabelDef {
    pub fn triplets(&self) -> impl Iterator<Item = EdgeTriplet> + '_ {
        self.relations
            .iter()
            .map(move |(src, dst)| EdgeTriplet::new(self.id, *src, *dst))
    }
}

/// Read-only schema metadata
pub trait GraphSchema: Send + Sync + std::fmt::Debug {
    fn vertex_label(&self, id: LabelId) -> Option<&LabelDef>;

    fn edge_label(&self, id: LabelId) -> Option<&EdgeLabelDef>;

    fn vertex_labels(&self) -> Vec<&LabelDef>;

    fn edge_labels(&self) -> Vec<&EdgeLabelDef>;

    /// Whether downstream serialization refers to properties by id instead of name
    fn is_column_id(&self) -> bool {
        false
    }

    /// Build the column type of a vertex admitting any of `labels`.
    ///
    /// Properties of all labels are merged by name, first declaration wins.
    fn vertex_type(&self, labels: &[LabelId]) -> OptimizerResult<GraphSchemaType> {
        let mut entries = Vec::with_capacity(labels.len());
        let mut properties: Vec<PropertyDef> = Vec::new();
        for id in labels {
            let def = self.vertex_label(*id).ok_or_else(|| {
                OptimizerError::invariant(format!("vertex label {} is not in the schema", id))
            })?;
            entries.push(LabelEntry::vertex(def.id, def.name.clone()));
            for prop in &def.properties {
                if !properties.iter().any(|p| p.name == prop.name) {
                    properties.push(prop.clone());
                }
            }
        }
        Ok(GraphSchemaType::vertex(entries, properties))
    }

    /// Build the column type of an edge admitting any of `triplets`
    fn edge_type(&self, triplets: &[EdgeTriplet]) -> OptimizerResult<GraphSchemaType> {
        let mut entries = Vec::with_capacity(triplets.len());
        let mut properties: Vec<PropertyDef> = Vec::new();
        for triplet in triplets {
            let def = self.edge_label(triplet.label).ok_or_else(|| {
                OptimizerError::invariant(format!(
                    "edge label {} is not in the schema",
                    triplet.label
                ))
            })?;
            entries.push(LabelEntry::edge(*triplet, def.name.clone()));
            for prop in &def.properties {
                if !properties.iter().any(|p| p.name == prop.name) {
                    properties.push(prop.clone());
                }
            }
        }
        Ok(GraphSchemaType::edge(entries, properties))
    }
}

/// In-memory schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySchema {
    #[serde(default)]
    pub vertex_labels: Vec<LabelDef>,
    #[serde(default)]
    pub edge_labels: Vec<EdgeLabelDef>,
    #[serde(default)]
    pub column_id: bool,
}

impl MemorySchema {
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

    /// Add a vertex label; property ids are assigned in declaration order
    pub fn with_vertex(mut self, id: LabelId, name: &str, properties: &[(&str, ScalarType)]) -> Self {
        self.vertex_labels.push(LabelDef {
            id,
            name: name.to_string(),
            properties: Self::property_defs(properties),
        });
        self
    }

    pub fn with_edge(
        mut self,
        id: LabelId,
        name: &str,
        relations: &[(LabelId, LabelId)],
        properties: &[(&str, ScalarType)],
    ) -> Self {
        self.edge_labels.push(EdgeLabelDef {
            id,
            name: name.to_string(),
            relations: relations.to_vec(),
            properties: Self::property_defs(properties),
        });
        self
    }

    pub fn vertex_label_by_name(&self, name: &str) -> Option<&LabelDef> {
        self.vertex_labels.iter().find(|l| l.name == name)
    }

    pub fn edge_label_by_name(&self, name: &str) -> Option<&EdgeLabelDef> {
        self.edge_labels.iter().find(|l| l.name == name)
    }

    fn property_defs(properties: &[(&str, ScalarType)]) -> Vec<PropertyDef> {
        properties
            .iter()
            .enumerate()
            .map(|(i, (name, ty))| PropertyDef::new(i as PropertyId, *name, *ty))
            .collect()
    }
}

impl GraphSchema for MemorySchema {
    fn vertex_label(&self, id: LabelId) -> Option<&LabelDef> {
        self.vertex_labels.iter().find(|l| l.id == id)
    }

    fn edge_label(&self, id: LabelId) -> Option<&EdgeLabelDef> {
        self.edge_labels.iter().find(|l| l.id == id)
    }

    fn vertex_labels(&self) -> Vec<&LabelDef> {
        self.vertex_labels.iter().collect()
    }

    fn edge_labels(&self) -> Vec<&EdgeLabelDef> {
        self.edge_labels.iter().collect()
    }

    fn is_column_id(&self) -> bool {
        self.column_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modern() -> MemorySchema {
        MemorySchema::new()
            .with_vertex(0, "person", &[("name", ScalarType::String), ("age", ScalarType::Int)])
            .with_vertex(1, "software", &[("name", ScalarType::String), ("lang", ScalarType::String)])
            .with_edge(0, "knows", &[(0, 0)], &[("weight", ScalarType::Float)])
            .with_edge(1, "created", &[(0, 1)], &[("weight", ScalarType::Float)])
    }

    #[test]
    fn test_fuzzy_vertex_type_merges_properties() {
        let ty = modern().vertex_type(&[0, 1]).unwrap();
        assert!(ty.is_fuzzy());
        let names: Vec<&str> = ty.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name", "age", "lang"]);
    }

    #[test]
    fn test_unknown_label_is_invariant_violation() {
        let err = modern().vertex_type(&[42]).unwrap_err();
        assert!(matches!(err, OptimizerError::InvariantViolation(_)));
    }

    #[test]
    fn test_schema_from_json() {
        let json = r#"{
            "vertex_labels": [{"id": 0, "name": "person"}],
            "edge_labels": [{"id": 0, "name": "knows", "relations": [[0, 0]]}],
            "column_id": true
        }"#;
        let schema = MemorySchema::from_json_str(json).unwrap();
        assert!(schema.is_column_id());
        let edge = schema.edge_type(&[EdgeTriplet::new(0, 0, 0)]).unwrap();
        assert_eq!(edge.label_names(), "knows");
    }
}
