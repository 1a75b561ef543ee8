// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Column requirements passed down by the field trimmer

use crate::plan::expr::Expr;
use crate::schema::GraphSchemaType;
use std::collections::{BTreeMap, BTreeSet};

/// Old output position → new output position, `None` when the column was dropped
pub type Mapping = Vec<Option<usize>>;

/// Properties of a vertex/edge column a consumer reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySet {
    /// The element itself is consumed, so every property must stay visible
    All,
    Only(BTreeSet<String>),
}

impl PropertySet {
    /// Only the identity of the element is consumed
    pub fn none() -> Self {
        PropertySet::Only(BTreeSet::new())
    }

    pub fn one(property: impl Into<String>) -> Self {
        PropertySet::Only(BTreeSet::from([property.into()]))
    }

    pub fn merge(&mut self, other: &PropertySet) {
        match other {
            PropertySet::All => *self = PropertySet::All,
            PropertySet::Only(theirs) => {
                if let PropertySet::Only(mine) = self {
                    mine.extend(theirs.iter().cloned());
                }
            }
        }
    }

    /// `ty` restricted to these properties
    pub fn narrow(&self, ty: &GraphSchemaType) -> GraphSchemaType {
        match self {
            PropertySet::All => ty.clone(),
            PropertySet::Only(keep) => ty.narrow(keep),
        }
    }
}

/// Required output columns of a node, by position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedFields {
    fields: BTreeMap<usize, PropertySet>,
}

impl UsedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every one of `width` columns, fully
    pub fn all(width: usize) -> Self {
        Self {
            fields: (0..width).map(|i| (i, PropertySet::All)).collect(),
        }
    }

    pub fn of_expr(expr: &Expr) -> Self {
        let mut used = Self::new();
        used.add_expr(expr);
        used
    }

    pub fn add(&mut self, index: usize, properties: PropertySet) {
        match self.fields.get_mut(&index) {
            Some(existing) => existing.merge(&properties),
            None => {
                self.fields.insert(index, properties);
            }
        }
    }

    /// A bare variable consumes the whole element, `v.p` only `p`
    pub fn add_expr(&mut self, expr: &Expr) {
        expr.visit_variables(&mut |var| {
            let properties = match &var.property {
                Some(p) => PropertySet::one(p.clone()),
                None => PropertySet::All,
            };
            self.add(var.index, properties);
        });
    }

    pub fn merge(&mut self, other: &UsedFields) {
        for (index, properties) in &other.fields {
            self.add(*index, properties.clone());
        }
    }

    pub fn get(&self, index: usize) -> Option<&PropertySet> {
        self.fields.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.fields.contains_key(&index)
    }

    /// Requirement on `index`, identity-only when the column is not required
    pub fn properties(&self, index: usize) -> PropertySet {
        self.get(index).cloned().unwrap_or_else(PropertySet::none)
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Split into positions below `at` and positions from `at` on, the latter
    /// shifted down to start at zero
    pub fn split_at(&self, at: usize) -> (UsedFields, UsedFields) {
        let mut low = UsedFields::new();
        let mut high = UsedFields::new();
        for (index, properties) in &self.fields {
            if *index < at {
                low.fields.insert(*index, properties.clone());
            } else {
                high.fields.insert(index - at, properties.clone());
            }
        }
        (low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::expr::Operator;

    #[test]
    fn test_all_wins_over_properties() {
        let mut set = PropertySet::one("age");
        set.merge(&PropertySet::All);
        assert_eq!(set, PropertySet::All);

        let mut set = PropertySet::All;
        set.merge(&PropertySet::one("age"));
        assert_eq!(set, PropertySet::All);
    }

    #[test]
    fn test_expression_usage() {
        let expr = Expr::and(
            Expr::binary(Operator::GreaterThan, Expr::prop(0, "p", "age"), Expr::int(1)),
            Expr::eq(Expr::prop(0, "p", "name"), Expr::var(2, "x")),
        );
        let used = UsedFields::of_expr(&expr);
        assert_eq!(
            used.get(0),
            Some(&PropertySet::Only(BTreeSet::from(["age".to_string(), "name".to_string()])))
        );
        assert_eq!(used.get(2), Some(&PropertySet::All));
        assert!(!used.contains(1));
    }

    #[test]
    fn test_split_shifts_upper_half() {
        let mut used = UsedFields::new();
        used.add(1, PropertySet::All);
        used.add(3, PropertySet::none());
        let (low, high) = used.split_at(2);
        assert_eq!(low.indices().collect::<Vec<_>>(), vec![1]);
        assert_eq!(high.indices().collect::<Vec<_>>(), vec![1]);
        assert_eq!(high.properties(0), PropertySet::none());
    }
}
