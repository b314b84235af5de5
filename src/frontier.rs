//! # Efficient Frontier
//!
//! $$
//! t_k = r_{\min} + \frac{k}{N-1}(r_{\max} - r_{\min}), \qquad k = 0,\dots,N-1
//! $$
//!
//! Sweeps evenly spaced target returns between the minimum-volatility
//! return and the maximum attainable return, solving each point
//! independently in parallel. Unattainable targets are skipped and
//! counted, never aborting the sweep.

use rayon::prelude::*;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::optimizer::OptimizationResult;
use crate::optimizer::PortfolioOptimizer;

/// Frontier points ordered by ascending target return.
#[derive(Clone, Debug, Default)]
pub struct EfficientFrontier {
  pub volatilities: Vec<f64>,
  pub returns: Vec<f64>,
  pub sharpe_ratios: Vec<f64>,
  /// Targets whose solve failed and were dropped from the sweep.
  pub skipped: usize,
}

/// Target-return sweep over a [`PortfolioOptimizer`].
pub struct EfficientFrontierGenerator<'a> {
  optimizer: &'a PortfolioOptimizer,
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
  if n == 1 || (end - start).abs() <= 1e-12 {
    return vec![start];
  }
  (0..n)
    .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
    .collect()
}

impl<'a> EfficientFrontierGenerator<'a> {
  pub fn new(optimizer: &'a PortfolioOptimizer) -> Self {
    Self { optimizer }
  }

  /// Solve `num_portfolios` targets between the minimum-volatility and
  /// maximum-return portfolios, inclusive. Collapses to a single point
  /// when the two coincide.
  pub fn generate(&self, num_portfolios: usize) -> Result<EfficientFrontier> {
    if num_portfolios == 0 {
      return Err(Error::InvalidParameter {
        name: "num_portfolios".into(),
        reason: "at least one frontier point required".into(),
      });
    }

    let min_ret = self.optimizer.optimize_min_volatility()?.expected_return;
    let max_ret = self.optimizer.optimize_max_return()?.expected_return;

    let targets = linspace(min_ret, max_ret, num_portfolios);

    // Independent solves; ordered collect keeps the result aligned with
    // the ascending targets regardless of completion order.
    let solved: Vec<Option<OptimizationResult>> = targets
      .par_iter()
      .map(|&target| self.optimizer.optimize_target_return(target).ok())
      .collect();

    let mut frontier = EfficientFrontier::default();
    for (target, result) in targets.iter().zip(solved) {
      match result {
        Some(point) => {
          frontier.volatilities.push(point.volatility);
          frontier.returns.push(point.expected_return);
          frontier.sharpe_ratios.push(point.sharpe_ratio);
        }
        None => {
          frontier.skipped += 1;
          warn!(target_return = target, "skipping unattainable frontier point");
        }
      }
    }

    Ok(frontier)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;
  use ndarray::Array1;
  use ndarray::arr1;
  use ndarray::arr2;

  use crate::data::MomentEstimates;
  use crate::solver::AugmentedLagrangianSolver;
  use crate::solver::ConstrainedSolver;
  use crate::solver::LinearEquality;
  use crate::solver::Objective;

  fn estimates() -> MomentEstimates {
    MomentEstimates {
      assets: vec!["A".into(), "B".into(), "C".into()],
      expected_returns: arr1(&[0.08, 0.10, 0.06]),
      covariance: arr2(&[
        [0.0400, 0.0060, 0.0020],
        [0.0060, 0.0900, 0.0030],
        [0.0020, 0.0030, 0.0225],
      ]),
    }
  }

  #[test]
  fn frontier_returns_ascend_between_the_anchors() {
    let optimizer = PortfolioOptimizer::new(estimates(), 0.04).unwrap();
    let frontier = EfficientFrontierGenerator::new(&optimizer)
      .generate(10)
      .unwrap();

    assert_eq!(frontier.skipped, 0);
    assert_eq!(frontier.returns.len(), 10);

    for pair in frontier.returns.windows(2) {
      assert!(pair[1] >= pair[0] - 1e-6);
    }

    let min_vol = optimizer.optimize_min_volatility().unwrap();
    assert_relative_eq!(frontier.returns[0], min_vol.expected_return, epsilon = 1e-5);
    assert_relative_eq!(
      *frontier.returns.last().unwrap(),
      optimizer.optimize_max_return().unwrap().expected_return,
      epsilon = 1e-5
    );

    for &vol in &frontier.volatilities {
      assert!(vol >= min_vol.volatility - 1e-6);
    }
  }

  #[test]
  fn single_asset_collapses_to_one_point() {
    let est = MomentEstimates {
      assets: vec!["A".into()],
      expected_returns: arr1(&[0.08]),
      covariance: arr2(&[[0.04]]),
    };
    let optimizer = PortfolioOptimizer::new(est, 0.04).unwrap();

    let frontier = EfficientFrontierGenerator::new(&optimizer)
      .generate(20)
      .unwrap();
    assert_eq!(frontier.returns.len(), 1);
    assert_relative_eq!(frontier.returns[0], 0.08, epsilon = 1e-6);
  }

  #[test]
  fn zero_points_is_rejected() {
    let optimizer = PortfolioOptimizer::new(estimates(), 0.04).unwrap();
    let result = EfficientFrontierGenerator::new(&optimizer).generate(0);
    assert!(matches!(result, Err(Error::InvalidParameter { .. })));
  }

  struct FailingTargets(AugmentedLagrangianSolver);

  impl ConstrainedSolver for FailingTargets {
    fn solve(
      &self,
      objective: &dyn Objective,
      equalities: &[LinearEquality],
      bounds: &[(f64, f64)],
      initial: &Array1<f64>,
    ) -> crate::error::Result<Array1<f64>> {
      if equalities.len() > 1 {
        return Err(Error::SolverNonConvergence {
          objective: 0.0,
          infeasibility: 1.0,
        });
      }
      self.0.solve(objective, equalities, bounds, initial)
    }
  }

  #[test]
  fn failed_points_are_counted_not_fatal() {
    let optimizer = PortfolioOptimizer::new(estimates(), 0.04)
      .unwrap()
      .with_solver(Box::new(FailingTargets(AugmentedLagrangianSolver::default())));

    let frontier = EfficientFrontierGenerator::new(&optimizer)
      .generate(5)
      .unwrap();

    assert_eq!(frontier.skipped, 5);
    assert!(frontier.returns.is_empty());
    assert!(frontier.volatilities.is_empty());
  }
}
