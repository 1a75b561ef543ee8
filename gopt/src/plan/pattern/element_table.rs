// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Alias and filter metadata of pattern elements
//!
//! Keys are canonical orders, so translating a key between a sub-pattern and
//! its parent is a pure index lookup.

use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::expr::Expr;
use crate::plan::pattern::graph::Pattern;
use crate::schema::GraphSchemaType;
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::collections::BTreeMap;
use std::fmt;

/// Position-independent identity of a pattern element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataKey {
    Vertex { order: usize },
    /// Endpoint orders; for direction-agnostic edges `src <= dst`
    Edge { src: usize, dst: usize, both: bool },
}

impl DataKey {
    pub fn vertex(order: usize) -> DataKey {
        DataKey::Vertex { order }
    }

    pub fn edge(src: usize, dst: usize, both: bool) -> DataKey {
        if both {
            DataKey::Edge {
                src: src.min(dst),
                dst: src.max(dst),
                both,
            }
        } else {
            DataKey::Edge { src, dst, both }
        }
    }

    /// Key of the vertex at `node` in `pattern`
    pub fn of_vertex(pattern: &Pattern, node: NodeIndex) -> OptimizerResult<DataKey> {
        pattern
            .vertex_order(node)
            .map(DataKey::vertex)
            .ok_or_else(|| OptimizerError::invariant(format!("vertex {:?} has no canonical order", node)))
    }

    /// Key of `edge` in `pattern`
    pub fn of_edge(pattern: &Pattern, edge: EdgeIndex) -> OptimizerResult<DataKey> {
        let missing = || OptimizerError::invariant(format!("edge {:?} is not in the pattern", edge));
        let (src, dst) = pattern.endpoints(edge).ok_or_else(missing)?;
        let both = pattern.edge(edge).ok_or_else(missing)?.both;
        let src = DataKey::of_vertex(pattern, src)?;
        let dst = DataKey::of_vertex(pattern, dst)?;
        match (src, dst) {
            (DataKey::Vertex { order: s }, DataKey::Vertex { order: d }) => Ok(DataKey::edge(s, d, both)),
            _ => Err(missing()),
        }
    }

    /// Translate a key expressed in a sub-pattern's orders into its parent's
    pub fn translate(&self, mapping: &[usize]) -> OptimizerResult<DataKey> {
        let map = |order: usize| {
            mapping.get(order).copied().ok_or_else(|| {
                OptimizerError::invariant(format!(
                    "order {} is outside a mapping of {} vertices",
                    order,
                    mapping.len()
                ))
            })
        };
        Ok(match *self {
            DataKey::Vertex { order } => DataKey::vertex(map(order)?),
            DataKey::Edge { src, dst, both } => DataKey::edge(map(src)?, map(dst)?, both),
        })
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKey::Vertex { order } => write!(f, "v{}", order),
            DataKey::Edge { src, dst, both } => {
                write!(f, "e{}{}{}", src, if *both { "-" } else { ">" }, dst)
            }
        }
    }
}

/// Metadata recorded for one pattern element
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    pub alias: String,
    /// Residual filter, its own column at position 0
    pub filter: Option<Expr>,
    pub schema_type: GraphSchemaType,
}

/// DataKey → DataValue side table of one pattern
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementTable {
    entries: BTreeMap<DataKey, DataValue>,
}

impl ElementTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record an element; a second element under the same key is rejected
    pub fn insert(&mut self, key: DataKey, value: DataValue) -> OptimizerResult<()> {
        if let Some(existing) = self.entries.get(&key) {
            return Err(OptimizerError::unsupported(format!(
                "elements '{}' and '{}' share pattern position {}",
                existing.alias, value.alias, key
            )));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Lookup that treats a missing key as a broken pattern
    pub fn get(&self, key: &DataKey) -> OptimizerResult<&DataValue> {
        self.entries
            .get(key)
            .ok_or_else(|| OptimizerError::invariant(format!("no element recorded for {}", key)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DataKey, &DataValue)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LabelEntry;

    fn value(alias: &str) -> DataValue {
        DataValue {
            alias: alias.to_string(),
            filter: None,
            schema_type: GraphSchemaType::vertex(vec![LabelEntry::vertex(0, "person")], vec![]),
        }
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let table = ElementTable::new();
        let err = table.get(&DataKey::vertex(3)).unwrap_err();
        assert!(matches!(err, OptimizerError::InvariantViolation(_)));
    }

    #[test]
    fn test_both_edge_keys_are_normalized() {
        assert_eq!(DataKey::edge(2, 1, true), DataKey::edge(1, 2, true));
        assert_ne!(DataKey::edge(2, 1, false), DataKey::edge(1, 2, false));
    }

    #[test]
    fn test_translate_through_mapping() {
        let mapping = vec![2, 0];
        assert_eq!(DataKey::vertex(1).translate(&mapping).unwrap(), DataKey::vertex(0));
        assert_eq!(
            DataKey::edge(0, 1, false).translate(&mapping).unwrap(),
            DataKey::edge(2, 0, false)
        );
        assert!(DataKey::vertex(5).translate(&mapping).is_err());
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut table = ElementTable::new();
        table.insert(DataKey::vertex(0), value("a")).unwrap();
        assert!(table
            .insert(DataKey::vertex(0), value("b"))
            .unwrap_err()
            .is_fallback_eligible());
        assert_eq!(table.len(), 1);
    }
}
