//! # Portfolio Optimizer
//!
//! $$
//! \mathbf{w}^\* = \arg\max_{\mathbf{w}}
//!   \frac{\mathbf{w}^\top\boldsymbol{\mu} - r_f}
//!        {\sqrt{\mathbf{w}^\top\Sigma\,\mathbf{w}}}
//! \quad \text{s.t.} \quad \mathbf{1}^\top\mathbf{w} = 1,\;
//!   \mathbf{l} \le \mathbf{w} \le \mathbf{u}
//! $$
//!
//! Mean-variance allocation over fixed annualized moments. Every
//! `optimize_*` call is a pure function of the construction state and
//! its arguments.

use std::collections::HashMap;

use ndarray::Array1;
use ndarray::Array2;

use crate::data::MomentEstimates;
use crate::error::Error;
use crate::error::Result;
use crate::solver::AugmentedLagrangianSolver;
use crate::solver::ConstrainedSolver;
use crate::solver::LinearEquality;
use crate::solver::Objective;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Output of a single optimization run.
#[derive(Clone, Debug, Default)]
pub struct OptimizationResult {
  /// Final weights in the optimizer's canonical asset order.
  pub weights: Vec<f64>,
  /// Annualized expected portfolio return.
  pub expected_return: f64,
  /// Annualized portfolio volatility.
  pub volatility: f64,
  /// `(expected_return - risk_free) / volatility`, `0` at zero volatility.
  pub sharpe_ratio: f64,
}

struct NegativeSharpe<'a> {
  mu: &'a Array1<f64>,
  sigma: &'a Array2<f64>,
  risk_free_rate: f64,
}

impl Objective for NegativeSharpe<'_> {
  fn value(&self, weights: &Array1<f64>) -> f64 {
    let variance = weights.dot(&self.sigma.dot(weights));
    if variance > 1e-16 {
      -(self.mu.dot(weights) - self.risk_free_rate) / variance.sqrt()
    } else {
      0.0
    }
  }

  fn gradient(&self, weights: &Array1<f64>) -> Array1<f64> {
    let sigma_w = self.sigma.dot(weights);
    let variance = weights.dot(&sigma_w);
    if variance <= 1e-16 {
      return Array1::zeros(weights.len());
    }

    let volatility = variance.sqrt();
    let excess = self.mu.dot(weights) - self.risk_free_rate;

    let mut grad = self.mu.mapv(|m| -m / volatility);
    grad.scaled_add(excess / (volatility * variance), &sigma_w);
    grad
  }
}

struct Variance<'a> {
  sigma: &'a Array2<f64>,
}

impl Objective for Variance<'_> {
  fn value(&self, weights: &Array1<f64>) -> f64 {
    weights.dot(&self.sigma.dot(weights))
  }

  fn gradient(&self, weights: &Array1<f64>) -> Array1<f64> {
    self.sigma.dot(weights).mapv(|x| 2.0 * x)
  }
}

struct NegativeReturn<'a> {
  mu: &'a Array1<f64>,
}

impl Objective for NegativeReturn<'_> {
  fn value(&self, weights: &Array1<f64>) -> f64 {
    -self.mu.dot(weights)
  }

  fn gradient(&self, _weights: &Array1<f64>) -> Array1<f64> {
    self.mu.mapv(|m| -m)
  }
}

/// Mean-variance optimizer over immutable `mu`, `Sigma`, risk-free rate
/// and per-asset bounds.
pub struct PortfolioOptimizer {
  assets: Vec<String>,
  expected_returns: Array1<f64>,
  covariance: Array2<f64>,
  risk_free_rate: f64,
  bounds: Vec<(f64, f64)>,
  solver: Box<dyn ConstrainedSolver>,
}

impl PortfolioOptimizer {
  /// Long-only optimizer with the default `[0, 1]` bounds per asset.
  pub fn new(estimates: MomentEstimates, risk_free_rate: f64) -> Result<Self> {
    let n = estimates.assets.len();
    Self::with_asset_bounds(estimates, risk_free_rate, vec![(0.0, 1.0); n])
  }

  /// Uniform `[min_weight, max_weight]` bounds for every asset.
  pub fn with_bounds(
    estimates: MomentEstimates,
    risk_free_rate: f64,
    min_weight: f64,
    max_weight: f64,
  ) -> Result<Self> {
    let n = estimates.assets.len();
    Self::with_asset_bounds(estimates, risk_free_rate, vec![(min_weight, max_weight); n])
  }

  /// Per-asset `[lo, hi]` bounds. Rejects bound sets that cannot hold a
  /// fully invested portfolio.
  pub fn with_asset_bounds(
    estimates: MomentEstimates,
    risk_free_rate: f64,
    bounds: Vec<(f64, f64)>,
  ) -> Result<Self> {
    let n = estimates.assets.len();
    if n == 0 {
      return Err(Error::InsufficientData {
        required: 1,
        got: 0,
      });
    }

    if estimates.expected_returns.len() != n || estimates.covariance.dim() != (n, n) {
      return Err(Error::InvalidParameter {
        name: "estimates".into(),
        reason: format!(
          "{} assets with mu of length {} and covariance {:?}",
          n,
          estimates.expected_returns.len(),
          estimates.covariance.dim()
        ),
      });
    }

    if bounds.len() != n {
      return Err(Error::InvalidWeights(format!(
        "{} bound pairs for {} assets",
        bounds.len(),
        n
      )));
    }

    let mut lo_sum = 0.0;
    let mut hi_sum = 0.0;
    for &(lo, hi) in &bounds {
      if !lo.is_finite() || !hi.is_finite() || lo > hi {
        return Err(Error::InvalidWeights(format!("bad bound pair [{lo}, {hi}]")));
      }
      lo_sum += lo;
      hi_sum += hi;
    }
    if lo_sum > 1.0 + 1e-12 || hi_sum < 1.0 - 1e-12 {
      return Err(Error::InvalidWeights(format!(
        "bounds admit no fully invested portfolio (sum of lows {lo_sum}, sum of highs {hi_sum})"
      )));
    }

    Ok(Self {
      assets: estimates.assets,
      expected_returns: estimates.expected_returns,
      covariance: estimates.covariance,
      risk_free_rate,
      bounds,
      solver: Box::new(AugmentedLagrangianSolver::default()),
    })
  }

  /// Swap in a different [`ConstrainedSolver`] implementation.
  pub fn with_solver(mut self, solver: Box<dyn ConstrainedSolver>) -> Self {
    self.solver = solver;
    self
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  pub fn expected_returns(&self) -> &Array1<f64> {
    &self.expected_returns
  }

  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  pub fn risk_free_rate(&self) -> f64 {
    self.risk_free_rate
  }

  /// Maximize the Sharpe ratio.
  pub fn optimize_max_sharpe(&self) -> Result<OptimizationResult> {
    let objective = NegativeSharpe {
      mu: &self.expected_returns,
      sigma: &self.covariance,
      risk_free_rate: self.risk_free_rate,
    };
    self.solve_with(&objective, None)
  }

  /// Minimize portfolio volatility.
  pub fn optimize_min_volatility(&self) -> Result<OptimizationResult> {
    let objective = Variance {
      sigma: &self.covariance,
    };
    self.solve_with(&objective, None)
  }

  /// Maximize expected return.
  pub fn optimize_max_return(&self) -> Result<OptimizationResult> {
    let objective = NegativeReturn {
      mu: &self.expected_returns,
    };
    self.solve_with(&objective, None)
  }

  /// Minimize volatility subject to `w . mu = target_return`.
  pub fn optimize_target_return(&self, target_return: f64) -> Result<OptimizationResult> {
    let objective = Variance {
      sigma: &self.covariance,
    };
    let constraint = LinearEquality::new(self.expected_returns.clone(), target_return);
    self.solve_with(&objective, Some(constraint))
  }

  /// Closed-form `1/n` allocation.
  pub fn equal_weight(&self) -> OptimizationResult {
    let n = self.assets.len();
    self.result_from_weights(Array1::from_elem(n, 1.0 / n as f64))
  }

  /// Weights proportional to the supplied caps; assets without an entry
  /// default to `1.0`.
  pub fn cap_weight(&self, caps: &HashMap<String, f64>) -> OptimizationResult {
    let raw: Vec<f64> = self
      .assets
      .iter()
      .map(|asset| caps.get(asset).copied().unwrap_or(1.0))
      .collect();

    let total: f64 = raw.iter().sum();
    let n = self.assets.len();
    let weights = if total > 1e-15 {
      Array1::from_iter(raw.iter().map(|&c| c / total))
    } else {
      Array1::from_elem(n, 1.0 / n as f64)
    };

    self.result_from_weights(weights)
  }

  fn solve_with(
    &self,
    objective: &dyn Objective,
    extra: Option<LinearEquality>,
  ) -> Result<OptimizationResult> {
    let n = self.assets.len();
    let initial = Array1::from_elem(n, 1.0 / n as f64);

    let mut equalities = vec![LinearEquality::budget(n)];
    if let Some(eq) = extra {
      equalities.push(eq);
    }

    let weights = self
      .solver
      .solve(objective, &equalities, &self.bounds, &initial)?;
    let weights = self.checked_weights(weights)?;

    Ok(self.result_from_weights(weights))
  }

  /// Renormalize a near-unit weight sum; anything further off is an
  /// invalid solution, never silently returned.
  fn checked_weights(&self, mut weights: Array1<f64>) -> Result<Array1<f64>> {
    let sum = weights.sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
      return Err(Error::InvalidWeights(format!(
        "weight sum {sum} not within {WEIGHT_SUM_TOLERANCE} of 1"
      )));
    }

    weights.mapv_inplace(|w| w / sum);
    Ok(weights)
  }

  fn result_from_weights(&self, weights: Array1<f64>) -> OptimizationResult {
    let expected_return = self.expected_returns.dot(&weights);
    let variance = weights.dot(&self.covariance.dot(&weights));
    let volatility = variance.max(0.0).sqrt();
    let sharpe_ratio = if volatility > 1e-15 {
      (expected_return - self.risk_free_rate) / volatility
    } else {
      0.0
    };

    OptimizationResult {
      weights: weights.to_vec(),
      expected_return,
      volatility,
      sharpe_ratio,
    }
  }
}
