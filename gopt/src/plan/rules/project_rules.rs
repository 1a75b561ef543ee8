// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Projection rules

use super::Rule;
use crate::error::OptimizerResult;
use crate::plan::expr::{Expr, Variable};
use crate::plan::logical::{LogicalNode, ProjectItem};

/// Collapse a projection over another non-appending projection by
/// substituting the inner expressions.
///
/// `v.p` over an inner item can only be substituted when that item is a bare
/// element reference; otherwise the rule does not apply.
pub struct ProjectMergeRule;

impl ProjectMergeRule {
    fn substitutable(outer: &[ProjectItem], inner: &[ProjectItem]) -> bool {
        outer.iter().all(|item| {
            let mut ok = true;
            item.expr.visit_variables(&mut |var: &Variable| {
                ok &= match inner.get(var.index) {
                    None => false,
                    Some(source) if source.expr.contains_subquery() => false,
                    Some(source) => match (&var.property, source.expr.as_var()) {
                        (None, _) => true,
                        (Some(_), Some(bare)) => bare.property.is_none(),
                        (Some(_), None) => false,
                    },
                };
            });
            ok
        })
    }
}

impl Rule for ProjectMergeRule {
    fn name(&self) -> &'static str {
        "ProjectMergeRule"
    }

    fn apply(&self, node: &LogicalNode) -> OptimizerResult<Option<LogicalNode>> {
        let LogicalNode::Project {
            input,
            items,
            append: false,
        } = node
        else {
            return Ok(None);
        };
        let LogicalNode::Project {
            input: inner_input,
            items: inner_items,
            append: false,
        } = input.as_ref()
        else {
            return Ok(None);
        };
        if !Self::substitutable(items, inner_items) {
            return Ok(None);
        }

        let merged = items
            .iter()
            .map(|item| {
                let expr = item.expr.try_map_variables(&mut |var| {
                    // `substitutable` guarantees the index and the bare reference
                    let source = &inner_items[var.index].expr;
                    Ok(match (&var.property, source.as_var()) {
                        (Some(property), Some(bare)) => {
                            Expr::prop(bare.index, bare.alias.clone(), property.clone())
                        }
                        _ => source.clone(),
                    })
                })?;
                Ok(ProjectItem::new(expr, item.alias.clone()))
            })
            .collect::<OptimizerResult<Vec<_>>>()?;
        Ok(Some(inner_input.as_ref().clone().project(merged, false)))
    }
}

/// Drop projections that reproduce their input row
pub struct ProjectRemoveRule;

impl ProjectRemoveRule {
    fn is_identity(input: &LogicalNode, items: &[ProjectItem]) -> bool {
        let columns = input.output_columns();
        columns.len() == items.len()
            && items.iter().zip(columns.iter()).enumerate().all(|(i, (item, column))| {
                item.alias == column.name
                    && matches!(item.expr.as_var(), Some(var) if var.index == i && var.property.is_none())
            })
    }
}

impl Rule for ProjectRemoveRule {
    fn name(&self) -> &'static str {
        "ProjectRemoveRule"
    }

    fn apply(&self, node: &LogicalNode) -> OptimizerResult<Option<LogicalNode>> {
        let LogicalNode::Project {
            input,
            items,
            append,
        } = node
        else {
            return Ok(None);
        };
        let removable = if *append {
            items.is_empty()
        } else {
            Self::is_identity(input, items)
        };
        Ok(removable.then(|| input.as_ref().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::expr::Operator;
    use crate::schema::{GraphSchemaType, LabelEntry};

    fn scan() -> LogicalNode {
        LogicalNode::source("p", GraphSchemaType::vertex(vec![LabelEntry::vertex(0, "person")], vec![]))
    }

    #[test]
    fn test_merge_substitutes_renamed_element() {
        let plan = scan()
            .project(vec![ProjectItem::new(Expr::var(0, "p"), "a")], false)
            .project(vec![ProjectItem::new(Expr::prop(0, "a", "age"), "age")], false);
        let out = ProjectMergeRule.apply(&plan).unwrap().unwrap();
        let LogicalNode::Project { input, items, .. } = out else {
            panic!("expected a projection");
        };
        assert_eq!(*input, scan());
        assert_eq!(items, vec![ProjectItem::new(Expr::prop(0, "p", "age"), "age")]);
    }

    #[test]
    fn test_merge_refuses_property_of_computed_value() {
        let plan = scan()
            .project(
                vec![ProjectItem::new(
                    Expr::function("head", vec![Expr::var(0, "p")]),
                    "a",
                )],
                false,
            )
            .project(vec![ProjectItem::new(Expr::prop(0, "a", "age"), "age")], false);
        assert!(ProjectMergeRule.apply(&plan).unwrap().is_none());
    }

    #[test]
    fn test_identity_projection_removed() {
        let plan = scan().project(vec![ProjectItem::new(Expr::var(0, "p"), "p")], false);
        assert_eq!(ProjectRemoveRule.apply(&plan).unwrap(), Some(scan()));

        let renamed = scan().project(vec![ProjectItem::new(Expr::var(0, "p"), "q")], false);
        assert!(ProjectRemoveRule.apply(&renamed).unwrap().is_none());

        let computed = scan().project(
            vec![ProjectItem::new(
                Expr::binary(Operator::Plus, Expr::prop(0, "p", "age"), Expr::int(1)),
                "p",
            )],
            false,
        );
        assert!(ProjectRemoveRule.apply(&computed).unwrap().is_none());
    }
}
