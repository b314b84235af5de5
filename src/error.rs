//! # Error Types
//!
//! Typed errors for data validation, estimation and optimization. Every
//! fallible operation in the crate returns [`Result`] with this error.

use thiserror::Error;

/// Errors produced by data handling, estimation and optimization.
#[derive(Debug, Error)]
pub enum Error {
  /// Not enough observations to compute the requested quantity.
  #[error("insufficient data: required {required} observations, got {got}")]
  InsufficientData { required: usize, got: usize },

  /// A price or return series failed validation.
  #[error("invalid series: {0}")]
  InvalidSeries(String),

  /// A scalar parameter is out of its admissible range.
  #[error("invalid parameter `{name}`: {reason}")]
  InvalidParameter { name: String, reason: String },

  /// A weight vector violates the budget or bound constraints.
  #[error("invalid weights: {0}")]
  InvalidWeights(String),

  /// The constrained solver exhausted its iteration budget without
  /// reaching a feasible stationary point.
  #[error(
    "solver failed to converge: best objective {objective}, constraint infeasibility {infeasibility}"
  )]
  SolverNonConvergence { objective: f64, infeasibility: f64 },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_formats_carry_context() {
    let e = Error::InsufficientData {
      required: 2,
      got: 1,
    };
    assert_eq!(
      e.to_string(),
      "insufficient data: required 2 observations, got 1"
    );

    let e = Error::InvalidParameter {
      name: "confidence".into(),
      reason: "must lie in (0, 1)".into(),
    };
    assert!(e.to_string().contains("confidence"));
  }
}
