//! # Constrained Solver
//!
//! $$
//! \min_{\mathbf{w}\in[\mathbf{l},\mathbf{u}]} \ f(\mathbf{w})
//!   + \sum_j \lambda_j c_j(\mathbf{w}) + \tfrac{\rho}{2}\, c_j(\mathbf{w})^2
//! $$
//!
//! Augmented-Lagrangian treatment of linear equality constraints over
//! per-asset box bounds. The inner subproblem is minimized by projected
//! gradient descent with Armijo backtracking; the outer loop updates
//! multipliers and escalates the penalty until the worst equality
//! violation falls under tolerance.

use ndarray::Array1;
use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;
const PENALTY_CEILING: f64 = 1e12;
const FEASIBILITY_FALLBACK: f64 = 1e-6;

/// Smooth objective over a weight vector.
pub trait Objective {
  fn value(&self, weights: &Array1<f64>) -> f64;
  fn gradient(&self, weights: &Array1<f64>) -> Array1<f64>;
}

/// Linear equality constraint `a . w = target`.
#[derive(Clone, Debug)]
pub struct LinearEquality {
  pub coefficients: Array1<f64>,
  pub target: f64,
}

impl LinearEquality {
  pub fn new(coefficients: Array1<f64>, target: f64) -> Self {
    Self {
      coefficients,
      target,
    }
  }

  /// The full-investment constraint `sum(w) = 1`.
  pub fn budget(n: usize) -> Self {
    Self::new(Array1::ones(n), 1.0)
  }

  /// Signed constraint residual at `w`.
  pub fn violation(&self, weights: &Array1<f64>) -> f64 {
    self.coefficients.dot(weights) - self.target
  }
}

/// Iteration budgets and tolerances for the solver.
#[derive(Clone, Copy, Debug)]
pub struct SolverConfig {
  pub max_outer_iterations: usize,
  pub max_inner_iterations: usize,
  /// Acceptable worst equality violation at convergence.
  pub tolerance: f64,
  /// Projected-gradient infinity norm treated as stationary.
  pub stationarity_tolerance: f64,
  pub initial_penalty: f64,
}

impl Default for SolverConfig {
  fn default() -> Self {
    Self {
      max_outer_iterations: 60,
      max_inner_iterations: 500,
      tolerance: 1e-9,
      stationarity_tolerance: 1e-8,
      initial_penalty: 10.0,
    }
  }
}

/// Interface every constrained weight solver satisfies.
///
/// `bounds` holds one `[lo, hi]` pair per asset; a returned vector
/// respects all bounds and every equality within the configured
/// tolerance, and non-convergence surfaces as
/// [`Error::SolverNonConvergence`] rather than a silently wrong vector.
pub trait ConstrainedSolver: Send + Sync {
  fn solve(
    &self,
    objective: &dyn Objective,
    equalities: &[LinearEquality],
    bounds: &[(f64, f64)],
    initial: &Array1<f64>,
  ) -> Result<Array1<f64>>;
}

/// Augmented-Lagrangian projected-gradient solver.
#[derive(Clone, Copy, Debug, Default)]
pub struct AugmentedLagrangianSolver {
  pub config: SolverConfig,
}

impl AugmentedLagrangianSolver {
  pub fn new(config: SolverConfig) -> Self {
    Self { config }
  }
}

fn project(weights: &Array1<f64>, bounds: &[(f64, f64)]) -> Array1<f64> {
  Array1::from_iter(
    weights
      .iter()
      .zip(bounds.iter())
      .map(|(&w, &(lo, hi))| w.clamp(lo, hi)),
  )
}

fn inf_norm(v: &Array1<f64>) -> f64 {
  v.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs()))
}

fn lagrangian_value(
  objective: &dyn Objective,
  equalities: &[LinearEquality],
  lambda: &[f64],
  rho: f64,
  weights: &Array1<f64>,
) -> f64 {
  let mut acc = objective.value(weights);
  for (eq, &l) in equalities.iter().zip(lambda.iter()) {
    let c = eq.violation(weights);
    acc += l * c + 0.5 * rho * c * c;
  }
  acc
}

fn lagrangian_gradient(
  objective: &dyn Objective,
  equalities: &[LinearEquality],
  lambda: &[f64],
  rho: f64,
  weights: &Array1<f64>,
) -> Array1<f64> {
  let mut grad = objective.gradient(weights);
  for (eq, &l) in equalities.iter().zip(lambda.iter()) {
    let c = eq.violation(weights);
    grad.scaled_add(l + rho * c, &eq.coefficients);
  }
  grad
}

#[allow(clippy::too_many_arguments)]
fn minimize_subproblem(
  objective: &dyn Objective,
  equalities: &[LinearEquality],
  lambda: &[f64],
  rho: f64,
  bounds: &[(f64, f64)],
  start: Array1<f64>,
  stationarity_tol: f64,
  max_iterations: usize,
) -> Array1<f64> {
  let mut w = project(&start, bounds);
  let mut step = 1.0_f64;

  for _ in 0..max_iterations {
    let grad = lagrangian_gradient(objective, equalities, lambda, rho, &w);

    let stationarity = inf_norm(&(&w - &project(&(&w - &grad), bounds)));
    if stationarity <= stationarity_tol {
      break;
    }

    let f0 = lagrangian_value(objective, equalities, lambda, rho, &w);
    let mut t = step;
    let mut accepted = None;

    for _ in 0..MAX_BACKTRACKS {
      let candidate = project(&(&w - &grad.mapv(|g| g * t)), bounds);
      let direction = &candidate - &w;
      let decrease = grad.dot(&direction);
      let value = lagrangian_value(objective, equalities, lambda, rho, &candidate);

      if value <= f0 + ARMIJO_C1 * decrease {
        accepted = Some((candidate, inf_norm(&direction)));
        break;
      }
      t *= 0.5;
    }

    match accepted {
      Some((next, moved)) => {
        step = if t >= step { step * 1.5 } else { t.max(1e-12) };
        w = next;
        if moved < 1e-18 {
          break;
        }
      }
      None => break,
    }
  }

  w
}

impl ConstrainedSolver for AugmentedLagrangianSolver {
  fn solve(
    &self,
    objective: &dyn Objective,
    equalities: &[LinearEquality],
    bounds: &[(f64, f64)],
    initial: &Array1<f64>,
  ) -> Result<Array1<f64>> {
    let n = initial.len();
    if bounds.len() != n {
      return Err(Error::InvalidParameter {
        name: "bounds".into(),
        reason: format!("{} bound pairs for {} assets", bounds.len(), n),
      });
    }
    for eq in equalities {
      if eq.coefficients.len() != n {
        return Err(Error::InvalidParameter {
          name: "equalities".into(),
          reason: format!("{} coefficients for {} assets", eq.coefficients.len(), n),
        });
      }
    }

    let config = self.config;
    let mut lambda = vec![0.0_f64; equalities.len()];
    let mut rho = config.initial_penalty;
    let mut w = project(initial, bounds);
    let mut best: Option<(Array1<f64>, f64, f64)> = None;
    let mut prev_violation = f64::INFINITY;

    for outer in 0..config.max_outer_iterations {
      let inner_tol =
        (1e-4 * 0.1_f64.powi(outer as i32)).max(config.stationarity_tolerance);
      w = minimize_subproblem(
        objective,
        equalities,
        &lambda,
        rho,
        bounds,
        w,
        inner_tol,
        config.max_inner_iterations,
      );

      let violation = equalities
        .iter()
        .map(|eq| eq.violation(&w).abs())
        .fold(0.0_f64, f64::max);
      let value = objective.value(&w);

      let improved = match &best {
        None => true,
        Some((_, best_violation, best_value)) => {
          violation < best_violation - 1e-15
            || (violation <= best_violation + 1e-15 && value < *best_value)
        }
      };
      if improved {
        best = Some((w.clone(), violation, value));
      }

      if violation <= config.tolerance {
        debug!(
          outer_iterations = outer + 1,
          penalty = rho,
          objective = value,
          "constrained solve converged"
        );
        return Ok(w);
      }

      for (l, eq) in lambda.iter_mut().zip(equalities.iter()) {
        *l += rho * eq.violation(&w);
      }
      if violation > 0.25 * prev_violation {
        rho = (rho * 10.0).min(PENALTY_CEILING);
      }
      prev_violation = violation;
    }

    let (best_w, best_violation, best_value) = match best {
      Some(b) => b,
      None => {
        let violation = equalities
          .iter()
          .map(|eq| eq.violation(&w).abs())
          .fold(0.0_f64, f64::max);
        let value = objective.value(&w);
        (w, violation, value)
      }
    };

    if best_violation <= FEASIBILITY_FALLBACK {
      warn!(
        infeasibility = best_violation,
        "iteration budget exhausted, accepting near-feasible weights"
      );
      Ok(best_w)
    } else {
      Err(Error::SolverNonConvergence {
        objective: best_value,
        infeasibility: best_violation,
      })
    }
  }
}
