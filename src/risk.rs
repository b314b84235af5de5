//! # Portfolio Risk Analytics
//!
//! $$
//! \sigma_p = \sqrt{\mathbf{w}^\top \Sigma_{\mathrm{ann}} \mathbf{w}}, \qquad
//! \beta = \frac{\mathrm{cov}(r_p, r_b)}{\mathrm{var}(r_b)}
//! $$
//!
//! Fixed-weight portfolio statistics over a time-aligned return matrix:
//! annualized return and volatility, historical tail risk on the
//! realized weighted series, and benchmark beta.

use ndarray::Array2;

use crate::TRADING_DAYS_PER_YEAR;
use crate::data::CovarianceEstimator;
use crate::data::ReturnMatrix;
use crate::data::correlation_matrix;
use crate::error::Error;
use crate::error::Result;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

fn sample_mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

fn sample_variance(xs: &[f64], mean: f64) -> f64 {
  if xs.len() < 2 {
    return 0.0;
  }

  let mut acc = 0.0;
  for &x in xs {
    let d = x - mean;
    acc += d * d;
  }
  acc / (xs.len() - 1) as f64
}

fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
  if sorted.is_empty() {
    return 0.0;
  }
  if sorted.len() == 1 {
    return sorted[0];
  }

  let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let lo = rank.floor() as usize;
  let hi = rank.ceil() as usize;
  let frac = rank - lo as f64;

  sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Risk statistics for externally supplied weight vectors.
///
/// Weights are passed per call; a sum within `1e-6` of one is
/// renormalized, anything further off is rejected. Degenerate
/// denominators make the affected statistic `0.0`.
#[derive(Clone, Debug)]
pub struct RiskAnalytics {
  matrix: ReturnMatrix,
  risk_free_rate: f64,
}

impl RiskAnalytics {
  pub fn new(matrix: ReturnMatrix, risk_free_rate: f64) -> Self {
    Self {
      matrix,
      risk_free_rate,
    }
  }

  pub fn matrix(&self) -> &ReturnMatrix {
    &self.matrix
  }

  pub fn risk_free_rate(&self) -> f64 {
    self.risk_free_rate
  }

  fn checked_weights(&self, weights: &[f64]) -> Result<Vec<f64>> {
    let n = self.matrix.n_assets();
    if weights.len() != n {
      return Err(Error::InvalidWeights(format!(
        "{} weights for {} assets",
        weights.len(),
        n
      )));
    }

    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
      return Err(Error::InvalidWeights(format!(
        "weight sum {sum} not within {WEIGHT_SUM_TOLERANCE} of 1"
      )));
    }

    Ok(weights.iter().map(|&w| w / sum).collect())
  }

  fn weighted_returns(&self, weights: &[f64]) -> Vec<f64> {
    let returns = self.matrix.returns();
    (0..self.matrix.n_periods())
      .map(|t| {
        weights
          .iter()
          .enumerate()
          .map(|(a, &w)| w * returns[[t, a]])
          .sum()
      })
      .collect()
  }

  /// Annualized weighted mean return, `sum(mean(r_i) w_i) * 252`.
  pub fn portfolio_return(&self, weights: &[f64]) -> Result<f64> {
    let weights = self.checked_weights(weights)?;
    let series = self.weighted_returns(&weights);
    Ok(sample_mean(&series) * TRADING_DAYS_PER_YEAR)
  }

  /// Annualized volatility of the weighted return series.
  pub fn portfolio_volatility(&self, weights: &[f64]) -> Result<f64> {
    let weights = self.checked_weights(weights)?;
    let series = self.weighted_returns(&weights);
    let variance = sample_variance(&series, sample_mean(&series));
    Ok((variance * TRADING_DAYS_PER_YEAR).sqrt())
  }

  /// Sharpe ratio of the weighted portfolio, `0` at zero volatility.
  pub fn portfolio_sharpe(&self, weights: &[f64]) -> Result<f64> {
    let ret = self.portfolio_return(weights)?;
    let vol = self.portfolio_volatility(weights)?;
    if vol > 1e-15 {
      Ok((ret - self.risk_free_rate) / vol)
    } else {
      Ok(0.0)
    }
  }

  /// Pearson correlation matrix of the period returns (unannualized).
  pub fn correlation_matrix(&self) -> Result<Array2<f64>> {
    correlation_matrix(&self.matrix)
  }

  /// Annualized sample covariance matrix.
  pub fn covariance_matrix(&self) -> Result<Array2<f64>> {
    CovarianceEstimator
      .estimate(&self.matrix)
      .map(|estimates| estimates.covariance)
  }

  /// Historical VaR: the `(1 - confidence)` percentile of the realized
  /// weighted return series, linearly interpolated.
  pub fn historical_var(&self, weights: &[f64], confidence: f64) -> Result<f64> {
    let weights = self.checked_weights(weights)?;
    let sorted = self.sorted_weighted_returns(&weights, confidence)?;
    Ok(percentile_sorted(&sorted, (1.0 - confidence) * 100.0))
  }

  /// Historical CVaR: mean of realized weighted returns at or below the
  /// VaR for the same confidence.
  pub fn historical_cvar(&self, weights: &[f64], confidence: f64) -> Result<f64> {
    let weights = self.checked_weights(weights)?;
    let sorted = self.sorted_weighted_returns(&weights, confidence)?;
    let var = percentile_sorted(&sorted, (1.0 - confidence) * 100.0);
    let tail: Vec<f64> = sorted.iter().copied().take_while(|&r| r <= var).collect();
    Ok(sample_mean(&tail))
  }

  fn sorted_weighted_returns(&self, weights: &[f64], confidence: f64) -> Result<Vec<f64>> {
    if !(confidence > 0.0 && confidence < 1.0) {
      return Err(Error::InvalidParameter {
        name: "confidence".into(),
        reason: format!("{confidence} not in (0, 1)"),
      });
    }

    let mut series = self.weighted_returns(weights);
    series.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(series)
  }

  /// Portfolio beta against a benchmark return series, `0` when the
  /// benchmark variance vanishes.
  pub fn beta(&self, weights: &[f64], benchmark_returns: &[f64]) -> Result<f64> {
    let weights = self.checked_weights(weights)?;

    if benchmark_returns.len() != self.matrix.n_periods() {
      return Err(Error::InvalidParameter {
        name: "benchmark_returns".into(),
        reason: format!(
          "{} periods, expected {}",
          benchmark_returns.len(),
          self.matrix.n_periods()
        ),
      });
    }

    let series = self.weighted_returns(&weights);
    let mp = sample_mean(&series);
    let mb = sample_mean(benchmark_returns);

    let n = series.len();
    if n < 2 {
      return Ok(0.0);
    }

    let mut cov = 0.0;
    for t in 0..n {
      cov += (series[t] - mp) * (benchmark_returns[t] - mb);
    }
    cov /= (n - 1) as f64;

    let bench_var = sample_variance(benchmark_returns, mb);
    if bench_var > 1e-15 {
      Ok(cov / bench_var)
    } else {
      Ok(0.0)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  fn matrix() -> ReturnMatrix {
    ReturnMatrix::from_columns(
      vec!["A".into(), "B".into()],
      vec![
        vec![-0.04, -0.02, 0.00, 0.02, 0.04],
        vec![0.01, -0.01, 0.02, 0.00, 0.03],
      ],
    )
    .unwrap()
  }

  fn analytics() -> RiskAnalytics {
    RiskAnalytics::new(matrix(), 0.04)
  }

  #[test]
  fn portfolio_return_is_the_annualized_weighted_mean() {
    let ra = analytics();
    let ret = ra.portfolio_return(&[0.5, 0.5]).unwrap();

    let mean_a = 0.0;
    let mean_b = 0.01;
    assert_relative_eq!(ret, (0.5 * mean_a + 0.5 * mean_b) * 252.0, epsilon = 1e-12);
  }

  #[test]
  fn weight_validation_rejects_bad_vectors() {
    let ra = analytics();
    assert!(matches!(
      ra.portfolio_return(&[1.0]),
      Err(Error::InvalidWeights(_))
    ));
    assert!(matches!(
      ra.portfolio_return(&[0.7, 0.7]),
      Err(Error::InvalidWeights(_))
    ));
  }

  #[test]
  fn near_unit_weight_sums_are_renormalized() {
    let ra = analytics();
    let exact = ra.portfolio_return(&[0.5, 0.5]).unwrap();
    let nudged = ra.portfolio_return(&[0.5000002, 0.5000001]).unwrap();
    assert_relative_eq!(exact, nudged, epsilon = 1e-7);
  }

  #[test]
  fn historical_var_and_cvar_keep_their_ordering() {
    let ra = analytics();
    let w = [1.0, 0.0];

    let var = ra.historical_var(&w, 0.95).unwrap();
    let cvar = ra.historical_cvar(&w, 0.95).unwrap();

    // 5th percentile of [-0.04, -0.02, 0.0, 0.02, 0.04]
    assert_relative_eq!(var, -0.036, epsilon = 1e-12);
    assert_relative_eq!(cvar, -0.04, epsilon = 1e-12);
    assert!(cvar <= var);
    assert!(var <= 0.0);
  }

  #[test]
  fn confidence_must_be_a_probability() {
    let ra = analytics();
    assert!(matches!(
      ra.historical_var(&[0.5, 0.5], 1.0),
      Err(Error::InvalidParameter { .. })
    ));
  }

  #[test]
  fn beta_against_itself_is_one() {
    let ra = analytics();
    let w = [0.5, 0.5];

    let series: Vec<f64> = (0..5)
      .map(|t| 0.5 * ra.matrix().returns()[[t, 0]] + 0.5 * ra.matrix().returns()[[t, 1]])
      .collect();

    let beta = ra.beta(&w, &series).unwrap();
    assert_relative_eq!(beta, 1.0, epsilon = 1e-12);
  }

  #[test]
  fn beta_is_zero_for_a_flat_benchmark() {
    let ra = analytics();
    let beta = ra.beta(&[0.5, 0.5], &[0.01; 5]).unwrap();
    assert_eq!(beta, 0.0);
  }

  #[test]
  fn beta_rejects_length_mismatch() {
    let ra = analytics();
    assert!(matches!(
      ra.beta(&[0.5, 0.5], &[0.01, 0.02]),
      Err(Error::InvalidParameter { .. })
    ));
  }

  #[test]
  fn matrices_are_symmetric_with_unit_diagonal() {
    let ra = analytics();

    let corr = ra.correlation_matrix().unwrap();
    assert_relative_eq!(corr[[0, 0]], 1.0, epsilon = 1e-15);
    assert_relative_eq!(corr[[0, 1]], corr[[1, 0]], epsilon = 1e-15);
    assert!(corr[[0, 1]].abs() <= 1.0);

    let cov = ra.covariance_matrix().unwrap();
    assert_relative_eq!(cov[[0, 1]], cov[[1, 0]], epsilon = 1e-15);
    let var_a = sample_variance(&ra.matrix().column(0), 0.0) * 252.0;
    assert_relative_eq!(cov[[0, 0]], var_a, epsilon = 1e-12);
  }

  #[test]
  fn constant_portfolio_has_zero_sharpe() {
    let matrix = ReturnMatrix::from_columns(
      vec!["A".into(), "B".into()],
      vec![vec![0.01, 0.01, 0.01], vec![0.01, 0.01, 0.01]],
    )
    .unwrap();
    let ra = RiskAnalytics::new(matrix, 0.04);

    assert_eq!(ra.portfolio_volatility(&[0.5, 0.5]).unwrap(), 0.0);
    assert_eq!(ra.portfolio_sharpe(&[0.5, 0.5]).unwrap(), 0.0);
  }
}
