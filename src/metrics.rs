//! # Performance and Risk Metrics
//!
//! $$
//! \mathrm{Sharpe} = \frac{R_a - r_f}{\sigma_a}, \qquad
//! \mathrm{MDD} = \min_t \frac{W_t - \max_{s\le t} W_s}{\max_{s\le t} W_s}
//! $$
//!
//! Per-asset metrics battery over a single price history: annualized
//! return and volatility, ratio family, drawdown, distribution shape,
//! rolling windows, concentration and Monte Carlo tail risk.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;

use crate::TRADING_DAYS_PER_YEAR;
use crate::data::PriceSeries;
use crate::data::ReturnKind;
use crate::error::Error;
use crate::error::Result;

/// Rolling-volatility window used by the convenience accessor.
pub const DEFAULT_VOLATILITY_WINDOW: usize = 30;

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

fn sample_stdev(xs: &[f64]) -> f64 {
  sample_variance(xs, sample_mean(xs)).sqrt()
}

fn central_moment(xs: &[f64], mean: f64, order: i32) -> f64 {
  if xs.is_empty() {
    return 0.0;
  }
  xs.iter().map(|&x| (x - mean).powi(order)).sum::<f64>() / xs.len() as f64
}

/// Population skewness `m3 / m2^{3/2}`, zero for degenerate series.
pub fn skewness(xs: &[f64]) -> f64 {
  let mean = sample_mean(xs);
  let m2 = central_moment(xs, mean, 2);
  if m2 < 1e-30 {
    0.0
  } else {
    central_moment(xs, mean, 3) / m2.powf(1.5)
  }
}

/// Population kurtosis `m4 / m2^2`, zero for degenerate series.
pub fn kurtosis(xs: &[f64]) -> f64 {
  let mean = sample_mean(xs);
  let m2 = central_moment(xs, mean, 2);
  if m2 < 1e-30 {
    0.0
  } else {
    central_moment(xs, mean, 4) / (m2 * m2)
  }
}

/// Linear-interpolation percentile of an ascending-sorted slice.
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

/// Difference prices over a `periods`-long lag.
pub fn period_returns(prices: &[f64], kind: ReturnKind, periods: usize) -> Vec<f64> {
  let periods = periods.max(1);
  let mut out = Vec::with_capacity(prices.len().saturating_sub(periods));
  for i in periods..prices.len() {
    let ratio = prices[i] / prices[i - periods];
    out.push(match kind {
      ReturnKind::Simple => ratio - 1.0,
      ReturnKind::Log => ratio.ln(),
    });
  }
  out
}

/// Herfindahl-Hirschman concentration index `sum(w_i^2)`.
pub fn herfindahl_index(weights: &[f64]) -> f64 {
  weights.iter().map(|w| w * w).sum()
}

/// Effective number of positions `1 / HHI`, zero for an empty book.
pub fn effective_n(weights: &[f64]) -> f64 {
  let hhi = herfindahl_index(weights);
  if hhi < 1e-15 { 0.0 } else { 1.0 / hhi }
}

/// Snapshot of the full metrics battery for one series.
#[derive(Clone, Debug, Default)]
pub struct MetricsBundle {
  pub annualized_return: f64,
  pub annualized_volatility: f64,
  pub sharpe_ratio: f64,
  pub sortino_ratio: f64,
  pub max_drawdown: f64,
  pub cumulative_return: f64,
  pub skewness: f64,
  pub kurtosis: f64,
  pub win_rate: f64,
}

/// Tail figures over the worst realized periods.
#[derive(Clone, Debug, Default)]
pub struct StressReport {
  /// Single worst period return.
  pub worst_return: f64,
  /// Mean of the worst `floor(len * p / 100)` periods (at least one).
  pub avg_worst_return: f64,
  pub worst_5_mean: f64,
  pub worst_10_mean: f64,
}

/// Metrics battery over one asset's price history.
///
/// The simple-return series is derived once at construction; every
/// accessor is a pure function of it. Degenerate denominators make the
/// affected ratio `0.0`, never an error.
#[derive(Clone, Debug)]
pub struct MetricsEngine {
  prices: Vec<f64>,
  returns: Vec<f64>,
  risk_free_rate: f64,
}

impl MetricsEngine {
  pub fn new(prices: Vec<f64>, risk_free_rate: f64) -> Result<Self> {
    if prices.is_empty() {
      return Err(Error::InsufficientData {
        required: 1,
        got: 0,
      });
    }

    if let Some(&bad) = prices.iter().find(|p| !p.is_finite() || **p <= 0.0) {
      return Err(Error::InvalidSeries(format!(
        "non-positive or non-finite price {bad}"
      )));
    }

    let returns = period_returns(&prices, ReturnKind::Simple, 1);

    Ok(Self {
      prices,
      returns,
      risk_free_rate,
    })
  }

  /// Build from an already validated [`PriceSeries`].
  pub fn from_series(series: &PriceSeries, risk_free_rate: f64) -> Self {
    Self {
      prices: series.prices().to_vec(),
      returns: series.returns(ReturnKind::Simple),
      risk_free_rate,
    }
  }

  pub fn returns(&self) -> &[f64] {
    &self.returns
  }

  pub fn risk_free_rate(&self) -> f64 {
    self.risk_free_rate
  }

  /// Geometric annualization of the whole price path, `0` below two
  /// observations.
  pub fn annualized_return(&self) -> f64 {
    let n = self.prices.len();
    if n < 2 {
      return 0.0;
    }

    let total = self.prices[n - 1] / self.prices[0];
    total.powf(TRADING_DAYS_PER_YEAR / n as f64) - 1.0
  }

  /// Sample standard deviation of period returns, scaled by `sqrt(252)`.
  pub fn annualized_volatility(&self) -> f64 {
    sample_stdev(&self.returns) * TRADING_DAYS_PER_YEAR.sqrt()
  }

  pub fn sharpe_ratio(&self) -> f64 {
    let vol = self.annualized_volatility();
    if vol > 1e-15 {
      (self.annualized_return() - self.risk_free_rate) / vol
    } else {
      0.0
    }
  }

  /// Sortino ratio against `target_return`; downside deviation uses only
  /// strictly sub-target periods.
  pub fn sortino_ratio(&self, target_return: f64) -> f64 {
    let downside: Vec<f64> = self
      .returns
      .iter()
      .copied()
      .filter(|&r| r < target_return)
      .collect();

    let downside_vol = sample_stdev(&downside) * TRADING_DAYS_PER_YEAR.sqrt();
    if downside_vol > 1e-15 {
      (self.annualized_return() - target_return) / downside_vol
    } else {
      0.0
    }
  }

  /// Worst peak-to-trough loss of the cumulative wealth path. Always
  /// `<= 0`, exactly `0` for a non-decreasing path.
  pub fn max_drawdown(&self) -> f64 {
    let mut wealth = 1.0;
    let mut peak: f64 = 1.0;
    let mut worst = 0.0_f64;

    for &r in &self.returns {
      wealth *= 1.0 + r;
      peak = peak.max(wealth);
      worst = worst.min((wealth - peak) / peak);
    }

    worst
  }

  pub fn cumulative_return(&self) -> f64 {
    self.returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0
  }

  pub fn skewness(&self) -> f64 {
    skewness(&self.returns)
  }

  pub fn kurtosis(&self) -> f64 {
    kurtosis(&self.returns)
  }

  /// Fraction of strictly positive periods, `0` for an empty series.
  pub fn win_rate(&self) -> f64 {
    if self.returns.is_empty() {
      return 0.0;
    }
    self.returns.iter().filter(|&&r| r > 0.0).count() as f64 / self.returns.len() as f64
  }

  /// Total return per unit of drawdown, `0` when the path never drew down.
  pub fn recovery_factor(&self) -> f64 {
    let dd = self.max_drawdown();
    if dd.abs() < 1e-15 {
      0.0
    } else {
      self.cumulative_return() / dd.abs()
    }
  }

  /// Annualized return per unit of drawdown, `0` when the path never
  /// drew down.
  pub fn calmar_ratio(&self) -> f64 {
    let dd = self.max_drawdown();
    if dd.abs() < 1e-15 {
      0.0
    } else {
      self.annualized_return() / dd.abs()
    }
  }

  /// Annualized mean excess over the benchmark divided by annualized
  /// tracking error, `0` when the tracking error vanishes.
  pub fn information_ratio(&self, benchmark_returns: &[f64]) -> Result<f64> {
    if benchmark_returns.len() != self.returns.len() {
      return Err(Error::InvalidParameter {
        name: "benchmark_returns".into(),
        reason: format!(
          "{} periods, expected {}",
          benchmark_returns.len(),
          self.returns.len()
        ),
      });
    }

    let excess: Vec<f64> = self
      .returns
      .iter()
      .zip(benchmark_returns.iter())
      .map(|(p, b)| p - b)
      .collect();

    let tracking_error = sample_stdev(&excess) * TRADING_DAYS_PER_YEAR.sqrt();
    if tracking_error > 1e-15 {
      Ok(sample_mean(&excess) * TRADING_DAYS_PER_YEAR / tracking_error)
    } else {
      Ok(0.0)
    }
  }

  /// Excess return per unit of systematic risk, `0` for zero beta.
  pub fn treynor_ratio(&self, beta: f64) -> f64 {
    if beta.abs() < 1e-15 {
      0.0
    } else {
      (self.annualized_return() - self.risk_free_rate) / beta
    }
  }

  /// Whole battery in one pass. Sortino target is `0`.
  pub fn metrics(&self) -> MetricsBundle {
    MetricsBundle {
      annualized_return: self.annualized_return(),
      annualized_volatility: self.annualized_volatility(),
      sharpe_ratio: self.sharpe_ratio(),
      sortino_ratio: self.sortino_ratio(0.0),
      max_drawdown: self.max_drawdown(),
      cumulative_return: self.cumulative_return(),
      skewness: self.skewness(),
      kurtosis: self.kurtosis(),
      win_rate: self.win_rate(),
    }
  }

  /// Tail means over the worst realized periods. `percentile` is in
  /// percent of the sample, `(0, 100]`.
  pub fn stress_test(&self, percentile: f64) -> Result<StressReport> {
    if !(percentile > 0.0 && percentile <= 100.0) {
      return Err(Error::InvalidParameter {
        name: "percentile".into(),
        reason: format!("{percentile} not in (0, 100]"),
      });
    }

    if self.returns.is_empty() {
      return Ok(StressReport::default());
    }

    let mut sorted = self.returns.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let k = ((sorted.len() as f64 * percentile / 100.0).floor() as usize)
      .max(1)
      .min(sorted.len());
    let tail_mean = |m: usize| sample_mean(&sorted[..m.min(sorted.len())]);

    Ok(StressReport {
      worst_return: sorted[0],
      avg_worst_return: tail_mean(k),
      worst_5_mean: tail_mean(5),
      worst_10_mean: tail_mean(10),
    })
  }

  /// Rolling sample volatility scaled by `sqrt(252)`; the first
  /// `window - 1` positions are `None`.
  pub fn rolling_volatility(&self, window: usize) -> impl Iterator<Item = Option<f64>> + '_ {
    rolling_map(&self.returns, window, |w| {
      sample_stdev(w) * TRADING_DAYS_PER_YEAR.sqrt()
    })
  }

  /// [`rolling_volatility`](Self::rolling_volatility) with the
  /// 30-period default window.
  pub fn default_rolling_volatility(&self) -> impl Iterator<Item = Option<f64>> + '_ {
    self.rolling_volatility(DEFAULT_VOLATILITY_WINDOW)
  }

  /// Rolling mean return scaled by `252`.
  pub fn rolling_mean_return(&self, window: usize) -> impl Iterator<Item = Option<f64>> + '_ {
    rolling_map(&self.returns, window, |w| {
      sample_mean(w) * TRADING_DAYS_PER_YEAR
    })
  }

  pub fn rolling_skewness(&self, window: usize) -> impl Iterator<Item = Option<f64>> + '_ {
    rolling_map(&self.returns, window, skewness)
  }

  pub fn rolling_kurtosis(&self, window: usize) -> impl Iterator<Item = Option<f64>> + '_ {
    rolling_map(&self.returns, window, kurtosis)
  }

  /// Monte Carlo `(VaR, CVaR)` from `simulations` normal draws with the
  /// series' sample mean and deviation. The seed is explicit so equal
  /// inputs reproduce bit-identical draws.
  pub fn monte_carlo_var(
    &self,
    confidence: f64,
    simulations: usize,
    seed: u64,
  ) -> Result<(f64, f64)> {
    if !(confidence > 0.0 && confidence < 1.0) {
      return Err(Error::InvalidParameter {
        name: "confidence".into(),
        reason: format!("{confidence} not in (0, 1)"),
      });
    }
    if simulations == 0 {
      return Err(Error::InvalidParameter {
        name: "simulations".into(),
        reason: "at least one simulation required".into(),
      });
    }

    let mean = sample_mean(&self.returns);
    let std = sample_stdev(&self.returns);

    let mut simulated = if std > 1e-15 {
      let normal = Normal::new(mean, std).map_err(|e| Error::InvalidParameter {
        name: "returns".into(),
        reason: e.to_string(),
      })?;
      let mut rng = StdRng::seed_from_u64(seed);
      (0..simulations).map(|_| normal.sample(&mut rng)).collect()
    } else {
      vec![mean; simulations]
    };

    simulated.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let var = percentile_sorted(&simulated, (1.0 - confidence) * 100.0);
    let tail: Vec<f64> = simulated.iter().copied().filter(|&r| r <= var).collect();
    let cvar = sample_mean(&tail);

    Ok((var, cvar))
  }
}

fn rolling_map<'a, F>(
  returns: &'a [f64],
  window: usize,
  f: F,
) -> impl Iterator<Item = Option<f64>> + 'a
where
  F: Fn(&[f64]) -> f64 + 'a,
{
  let window = window.max(1);
  (0..returns.len()).map(move |i| {
    if i + 1 < window {
      None
    } else {
      Some(f(&returns[i + 1 - window..=i]))
    }
  })
}
