// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Scalar expressions over plan rows
//!
//! Expressions address input columns by position ([`Variable::index`]). The
//! alias name of the referenced column travels with every variable so that a
//! residual filter lifted out of a match can be re-targeted once the pattern is
//! rebuilt with a different column layout.

use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::logical::LogicalNode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// Operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Logical
    And,
    Or,
    Not,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Predicates
    In,
    Contains,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Equal
                | Operator::NotEqual
                | Operator::LessThan
                | Operator::LessEqual
                | Operator::GreaterThan
                | Operator::GreaterEqual
        )
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Operator::LessThan | Operator::LessEqual | Operator::GreaterThan | Operator::GreaterEqual
        )
    }

    fn symbol(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::LessThan => "<",
            Operator::LessEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterEqual => ">=",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Percent => "%",
            Operator::In => "IN",
            Operator::Contains => "CONTAINS",
            Operator::StartsWith => "STARTS WITH",
            Operator::EndsWith => "ENDS WITH",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

/// Reference to an input column, optionally to one property of it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub index: usize,
    pub alias: String,
    pub property: Option<String>,
}

impl Variable {
    pub fn new(index: usize, alias: impl Into<String>) -> Self {
        Self {
            index,
            alias: alias.into(),
            property: None,
        }
    }

    pub fn with_property(index: usize, alias: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            index,
            alias: alias.into(),
            property: Some(property.into()),
        }
    }

    fn at(&self, index: usize) -> Variable {
        Variable {
            index,
            alias: self.alias.clone(),
            property: self.property.clone(),
        }
    }
}

/// A scalar sub-query embedded in an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subquery {
    /// Identity of the nested plan, stable across clones
    pub id: u64,
    pub plan: Arc<LogicalNode>,
}

/// Scalar expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Var(Variable),
    Binary {
        op: Operator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: Operator,
        operand: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Subquery(Subquery),
}

impl Expr {
    pub fn var(index: usize, alias: impl Into<String>) -> Expr {
        Expr::Var(Variable::new(index, alias))
    }

    pub fn prop(index: usize, alias: impl Into<String>, property: impl Into<String>) -> Expr {
        Expr::Var(Variable::with_property(index, alias, property))
    }

    pub fn int(value: i64) -> Expr {
        Expr::Literal(Literal::Integer(value))
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn binary(op: Operator, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::binary(Operator::Equal, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::binary(Operator::And, left, right)
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// The variable this expression is, if it is a bare column reference
    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Expr::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Split a conjunction into its operands
    pub fn conjuncts(&self) -> Vec<Expr> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts(&self, out: &mut Vec<Expr>) {
        match self {
            Expr::Binary {
                op: Operator::And,
                left,
                right,
            } => {
                left.collect_conjuncts(out);
                right.collect_conjuncts(out);
            }
            other => out.push(other.clone()),
        }
    }

    /// Fold conjuncts back into a single AND chain; `None` for an empty list
    pub fn conjunction(conjuncts: Vec<Expr>) -> Option<Expr> {
        conjuncts.into_iter().reduce(Expr::and)
    }

    /// AND `other` onto an optional existing condition
    pub fn and_optional(existing: Option<Expr>, other: Expr) -> Expr {
        match existing {
            Some(expr) => Expr::and(expr, other),
            None => other,
        }
    }

    /// Visit every column reference outside nested sub-queries
    pub fn visit_variables<F: FnMut(&Variable)>(&self, f: &mut F) {
        match self {
            Expr::Var(var) => f(var),
            Expr::Binary { left, right, .. } => {
                left.visit_variables(f);
                right.visit_variables(f);
            }
            Expr::Unary { operand, .. } => operand.visit_variables(f),
            Expr::Function { args, .. } => args.iter().for_each(|a| a.visit_variables(f)),
            Expr::Literal(_) | Expr::Subquery(_) => {}
        }
    }

    pub fn variables(&self) -> Vec<Variable> {
        let mut vars = Vec::new();
        self.visit_variables(&mut |v| vars.push(v.clone()));
        vars
    }

    /// Input positions referenced by this expression
    pub fn input_indices(&self) -> BTreeSet<usize> {
        let mut indices = BTreeSet::new();
        self.visit_variables(&mut |v| {
            indices.insert(v.index);
        });
        indices
    }

    pub fn aliases(&self) -> BTreeSet<String> {
        let mut aliases = BTreeSet::new();
        self.visit_variables(&mut |v| {
            aliases.insert(v.alias.clone());
        });
        aliases
    }

    pub fn contains_subquery(&self) -> bool {
        match self {
            Expr::Subquery(_) => true,
            Expr::Binary { left, right, .. } => left.contains_subquery() || right.contains_subquery(),
            Expr::Unary { operand, .. } => operand.contains_subquery(),
            Expr::Function { args, .. } => args.iter().any(|a| a.contains_subquery()),
            Expr::Literal(_) | Expr::Var(_) => false,
        }
    }

    /// Rebuild the expression with every variable passed through `f`
    pub fn try_map_variables<F>(&self, f: &mut F) -> OptimizerResult<Expr>
    where
        F: FnMut(&Variable) -> OptimizerResult<Expr>,
    {
        Ok(match self {
            Expr::Var(var) => f(var)?,
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.try_map_variables(f)?),
                right: Box::new(right.try_map_variables(f)?),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(operand.try_map_variables(f)?),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.try_map_variables(f))
                    .collect::<OptimizerResult<Vec<_>>>()?,
            },
            Expr::Literal(_) | Expr::Subquery(_) => self.clone(),
        })
    }

    /// Translate column positions through an old→new position mapping.
    ///
    /// A reference to a dropped column is an invariant violation.
    pub fn remap(&self, mapping: &[Option<usize>]) -> OptimizerResult<Expr> {
        self.try_map_variables(&mut |var| {
            let index = mapping.get(var.index).copied().flatten().ok_or_else(|| {
                OptimizerError::invariant(format!(
                    "expression references column {} ({}) that was pruned",
                    var.index, var.alias
                ))
            })?;
            Ok(Expr::Var(var.at(index)))
        })
    }

    /// Shift every column position by `offset` (may be negative)
    pub fn shift(&self, offset: isize) -> OptimizerResult<Expr> {
        self.try_map_variables(&mut |var| {
            let index = var.index as isize + offset;
            if index < 0 {
                return Err(OptimizerError::invariant(format!(
                    "column {} shifted out of range",
                    var.alias
                )));
            }
            Ok(Expr::Var(var.at(index as usize)))
        })
    }

    /// Point every reference to `alias` at `index`
    pub fn retarget(&self, alias: &str, index: usize) -> OptimizerResult<Expr> {
        self.try_map_variables(&mut |var| {
            if var.alias == alias {
                Ok(Expr::Var(var.at(index)))
            } else {
                Err(OptimizerError::unsupported(format!(
                    "filter on '{}' also references '{}'",
                    alias, var.alias
                )))
            }
        })
    }

    /// Rebuild the expression with every nested sub-query passed through `f`
    pub fn try_map_subqueries<F>(&self, f: &mut F) -> OptimizerResult<Expr>
    where
        F: FnMut(&Subquery) -> OptimizerResult<Subquery>,
    {
        Ok(match self {
            Expr::Subquery(sub) => Expr::Subquery(f(sub)?),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.try_map_subqueries(f)?),
                right: Box::new(right.try_map_subqueries(f)?),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(operand.try_map_subqueries(f)?),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| a.try_map_subqueries(f))
                    .collect::<OptimizerResult<Vec<_>>>()?,
            },
            Expr::Literal(_) | Expr::Var(_) => self.clone(),
        })
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::String(s) => write!(f, "'{}'", s),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::Var(var) => match &var.property {
                Some(prop) => write!(f, "{}.{}", var.alias, prop),
                None => write!(f, "{}", var.alias),
            },
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Unary { op, operand } => match op {
                Operator::IsNull | Operator::IsNotNull => write!(f, "({} {})", operand, op.symbol()),
                _ => write!(f, "({} {})", op.symbol(), operand),
            },
            Expr::Function { name, args } => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", name, rendered.join(", "))
            }
            Expr::Subquery(sub) => write!(f, "subquery#{}", sub.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age_filter() -> Expr {
        Expr::and(
            Expr::binary(Operator::GreaterThan, Expr::prop(2, "p", "age"), Expr::int(18)),
            Expr::eq(Expr::prop(2, "p", "name"), Expr::string("marko")),
        )
    }

    #[test]
    fn test_conjunct_round_trip() {
        let conjuncts = age_filter().conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(Expr::conjunction(conjuncts), Some(age_filter()));
        assert_eq!(Expr::conjunction(vec![]), None);
    }

    #[test]
    fn test_remap_moves_columns() {
        let mapping = vec![None, None, Some(0)];
        let remapped = age_filter().remap(&mapping).unwrap();
        assert_eq!(remapped.input_indices().into_iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_remap_of_pruned_column_fails() {
        let mapping = vec![Some(0), Some(1), None];
        let err = age_filter().remap(&mapping).unwrap_err();
        assert!(matches!(err, OptimizerError::InvariantViolation(_)));
    }

    #[test]
    fn test_retarget_rejects_foreign_alias() {
        let expr = Expr::eq(Expr::prop(0, "a", "id"), Expr::prop(1, "b", "id"));
        assert!(expr.retarget("a", 3).unwrap_err().is_fallback_eligible());
        let own = Expr::eq(Expr::prop(0, "a", "id"), Expr::int(1));
        assert_eq!(own.retarget("a", 3).unwrap().input_indices().len(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(age_filter().to_string(), "((p.age > 18) AND (p.name = 'marko'))");
    }
}
