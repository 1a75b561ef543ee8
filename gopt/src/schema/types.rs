// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Column types seen by the optimizer
//!
//! A `GraphSchemaType` describes a vertex or edge column: which labels the
//! element may carry and which properties are still visible at that point of
//! the plan. Column pruning produces narrowed copies with fewer properties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type LabelId = i32;
pub type PropertyId = i32;

/// Kind of graph element a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    Vertex,
    Edge,
}

/// Scalar property types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Bool,
    Int,
    Float,
    String,
    Any,
}

/// A declared property of a label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyDef {
    pub id: PropertyId,
    pub name: String,
    pub data_type: ScalarType,
}

impl PropertyDef {
    pub fn new(id: PropertyId, name: impl Into<String>, data_type: ScalarType) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
        }
    }
}

/// (edge label, source vertex label, destination vertex label)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeTriplet {
    pub label: LabelId,
    pub src_label: LabelId,
    pub dst_label: LabelId,
}

impl EdgeTriplet {
    pub fn new(label: LabelId, src_label: LabelId, dst_label: LabelId) -> Self {
        Self {
            label,
            src_label,
            dst_label,
        }
    }
}

/// One label admitted by a graph column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label: LabelId,
    pub name: String,
    /// Endpoint labels, only set for edge columns
    pub src_label: Option<LabelId>,
    pub dst_label: Option<LabelId>,
}

impl LabelEntry {
    pub fn vertex(label: LabelId, name: impl Into<String>) -> Self {
        Self {
            label,
            name: name.into(),
            src_label: None,
            dst_label: None,
        }
    }

    pub fn edge(triplet: EdgeTriplet, name: impl Into<String>) -> Self {
        Self {
            label: triplet.label,
            name: name.into(),
            src_label: Some(triplet.src_label),
            dst_label: Some(triplet.dst_label),
        }
    }

    pub fn triplet(&self) -> Option<EdgeTriplet> {
        match (self.src_label, self.dst_label) {
            (Some(src), Some(dst)) => Some(EdgeTriplet::new(self.label, src, dst)),
            _ => None,
        }
    }
}

/// Composite type of a vertex or edge column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphSchemaType {
    pub kind: ElementKind,
    pub labels: Vec<LabelEntry>,
    pub properties: Vec<PropertyDef>,
}

impl GraphSchemaType {
    pub fn vertex(labels: Vec<LabelEntry>, properties: Vec<PropertyDef>) -> Self {
        Self {
            kind: ElementKind::Vertex,
            labels,
            properties,
        }
    }

    pub fn edge(labels: Vec<LabelEntry>, properties: Vec<PropertyDef>) -> Self {
        Self {
            kind: ElementKind::Edge,
            labels,
            properties,
        }
    }

    /// More than one admissible label
    pub fn is_fuzzy(&self) -> bool {
        self.labels.len() > 1
    }

    /// Distinct label ids in ascending order
    pub fn label_ids(&self) -> Vec<LabelId> {
        let ids: BTreeSet<LabelId> = self.labels.iter().map(|l| l.label).collect();
        ids.into_iter().collect()
    }

    pub fn triplets(&self) -> Vec<EdgeTriplet> {
        let mut triplets: Vec<EdgeTriplet> =
            self.labels.iter().filter_map(|l| l.triplet()).collect();
        triplets.sort();
        triplets.dedup();
        triplets
    }

    /// Source vertex labels reachable through this edge type
    pub fn src_label_ids(&self) -> BTreeSet<LabelId> {
        self.labels.iter().filter_map(|l| l.src_label).collect()
    }

    /// Destination vertex labels reachable through this edge type
    pub fn dst_label_ids(&self) -> BTreeSet<LabelId> {
        self.labels.iter().filter_map(|l| l.dst_label).collect()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_names(&self) -> BTreeSet<String> {
        self.properties.iter().map(|p| p.name.clone()).collect()
    }

    /// Copy of this type that only exposes the given properties.
    ///
    /// Declaration order is preserved; names unknown to this type are ignored.
    pub fn narrow(&self, keep: &BTreeSet<String>) -> GraphSchemaType {
        GraphSchemaType {
            kind: self.kind,
            labels: self.labels.clone(),
            properties: self
                .properties
                .iter()
                .filter(|p| keep.contains(&p.name))
                .cloned()
                .collect(),
        }
    }

    pub fn label_names(&self) -> String {
        self.labels
            .iter()
            .map(|l| l.name.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl fmt::Display for GraphSchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let props: Vec<&str> = self.properties.iter().map(|p| p.name.as_str()).collect();
        write!(f, "{}{{{}}}", self.label_names(), props.join(","))
    }
}

/// Type of an output column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Float,
    String,
    Vertex(GraphSchemaType),
    Edge(GraphSchemaType),
    Path,
    Any,
}

impl DataType {
    pub fn graph_type(&self) -> Option<&GraphSchemaType> {
        match self {
            DataType::Vertex(ty) | DataType::Edge(ty) => Some(ty),
            _ => None,
        }
    }

    /// Vertex or edge typed column
    pub fn is_graph(&self) -> bool {
        self.graph_type().is_some()
    }

    pub fn from_graph_type(ty: GraphSchemaType) -> DataType {
        match ty.kind {
            ElementKind::Vertex => DataType::Vertex(ty),
            ElementKind::Edge => DataType::Edge(ty),
        }
    }

    pub fn from_scalar(ty: ScalarType) -> DataType {
        match ty {
            ScalarType::Bool => DataType::Bool,
            ScalarType::Int => DataType::Int,
            ScalarType::Float => DataType::Float,
            ScalarType::String => DataType::String,
            ScalarType::Any => DataType::Any,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "BOOL"),
            DataType::Int => write!(f, "INT"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::String => write!(f, "STRING"),
            DataType::Vertex(ty) => write!(f, "VERTEX({})", ty),
            DataType::Edge(ty) => write!(f, "EDGE({})", ty),
            DataType::Path => write!(f, "PATH"),
            DataType::Any => write!(f, "ANY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> GraphSchemaType {
        GraphSchemaType::vertex(
            vec![LabelEntry::vertex(0, "person")],
            vec![
                PropertyDef::new(0, "name", ScalarType::String),
                PropertyDef::new(1, "age", ScalarType::Int),
                PropertyDef::new(2, "city", ScalarType::String),
            ],
        )
    }

    #[test]
    fn test_narrow_keeps_declaration_order() {
        let keep: BTreeSet<String> = ["city", "name"].iter().map(|s| s.to_string()).collect();
        let narrowed = person().narrow(&keep);
        let names: Vec<&str> = narrowed.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name", "city"]);
        assert_eq!(narrowed.labels, person().labels);
    }

    #[test]
    fn test_edge_endpoint_sets() {
        let edge = GraphSchemaType::edge(
            vec![
                LabelEntry::edge(EdgeTriplet::new(10, 0, 1), "created"),
                LabelEntry::edge(EdgeTriplet::new(10, 0, 2), "created"),
            ],
            vec![],
        );
        assert!(edge.is_fuzzy());
        assert_eq!(edge.src_label_ids().into_iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(edge.dst_label_ids().into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(edge.label_ids(), vec![10]);
    }
}
