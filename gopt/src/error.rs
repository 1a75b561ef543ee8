// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Optimizer error types

use thiserror::Error;

/// Errors raised while building or running the optimization pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    /// Invalid planner configuration, detected before any planner is started
    #[error("Configuration error: {0}")]
    Config(String),

    /// A config, schema or statistics source could not be read or parsed
    #[error("Configuration source error: {0}")]
    ConfigSource(String),

    /// The plan violates a structural invariant that earlier phases guarantee.
    /// Aborts the compilation; never retried.
    #[error("Plan invariant violated: {0}")]
    InvariantViolation(String),

    /// The plan contains a construct this optimizer has no handler for
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl OptimizerError {
    /// Whether the caller may fall back to an unoptimized plan.
    ///
    /// Only coverage gaps qualify; invariant violations mean the plan is
    /// already corrupt.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, OptimizerError::Unsupported(_))
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        OptimizerError::InvariantViolation(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        OptimizerError::Unsupported(message.into())
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(error: serde_json::Error) -> Self {
        OptimizerError::ConfigSource(error.to_string())
    }
}

impl From<std::io::Error> for OptimizerError {
    fn from(error: std::io::Error) -> Self {
        OptimizerError::ConfigSource(error.to_string())
    }
}

/// Result alias used throughout the optimizer
pub type OptimizerResult<T> = Result<T, OptimizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unsupported_is_fallback_eligible() {
        assert!(OptimizerError::unsupported("path expand").is_fallback_eligible());
        assert!(!OptimizerError::invariant("missing key").is_fallback_eligible());
        assert!(!OptimizerError::Config("bad".into()).is_fallback_eligible());
    }

    #[test]
    fn test_display_messages() {
        let err = OptimizerError::invariant("edge types disagree");
        assert_eq!(err.to_string(), "Plan invariant violated: edge types disagree");
    }
}
