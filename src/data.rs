//! # Price and Return Data
//!
//! $$
//! r_t = \ln\frac{P_t}{P_{t-1}}, \qquad \hat\Sigma = 252\,\mathrm{cov}(r)
//! $$
//!
//! Validated price series, return differencing, date alignment across
//! assets and annualized moment estimation.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;

use crate::TRADING_DAYS_PER_YEAR;
use crate::error::Error;
use crate::error::Result;

fn sample_mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
  let n = x.len().min(y.len());
  if n < 2 {
    return 0.0;
  }

  let mx = sample_mean(x);
  let my = sample_mean(y);

  let mut cov = 0.0;
  let mut sx = 0.0;
  let mut sy = 0.0;

  for i in 0..n {
    let dx = x[i] - mx;
    let dy = y[i] - my;
    cov += dx * dy;
    sx += dx * dx;
    sy += dy * dy;
  }

  let denom = (sx * sy).sqrt();
  if denom < 1e-15 {
    0.0
  } else {
    (cov / denom).clamp(-1.0, 1.0)
  }
}

/// How consecutive prices are differenced into period returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReturnKind {
  /// `P_t / P_{t-1} - 1`
  Simple,
  /// `ln(P_t / P_{t-1})`
  #[default]
  Log,
}

/// Dated close prices for a single asset.
///
/// Dates are strictly increasing and prices are finite and positive;
/// the constructor rejects anything else.
#[derive(Clone, Debug)]
pub struct PriceSeries {
  name: String,
  dates: Vec<NaiveDate>,
  prices: Vec<f64>,
}

impl PriceSeries {
  pub fn new(name: impl Into<String>, dates: Vec<NaiveDate>, prices: Vec<f64>) -> Result<Self> {
    let name = name.into();

    if dates.len() != prices.len() {
      return Err(Error::InvalidSeries(format!(
        "`{}`: {} dates vs {} prices",
        name,
        dates.len(),
        prices.len()
      )));
    }

    if dates.is_empty() {
      return Err(Error::InvalidSeries(format!("`{name}`: empty series")));
    }

    for pair in dates.windows(2) {
      if pair[1] <= pair[0] {
        return Err(Error::InvalidSeries(format!(
          "`{}`: dates not strictly increasing at {}",
          name, pair[1]
        )));
      }
    }

    for (date, &price) in dates.iter().zip(prices.iter()) {
      if !price.is_finite() || price <= 0.0 {
        return Err(Error::InvalidSeries(format!(
          "`{name}`: non-positive or non-finite price {price} at {date}"
        )));
      }
    }

    Ok(Self {
      name,
      dates,
      prices,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn prices(&self) -> &[f64] {
    &self.prices
  }

  pub fn len(&self) -> usize {
    self.prices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.prices.is_empty()
  }

  /// Difference the prices into period returns. Empty below 2 observations.
  pub fn returns(&self, kind: ReturnKind) -> Vec<f64> {
    returns_from_prices(&self.prices, kind)
  }
}

/// Convert close prices to period returns.
pub fn returns_from_prices(prices: &[f64], kind: ReturnKind) -> Vec<f64> {
  let mut out = Vec::with_capacity(prices.len().saturating_sub(1));
  for i in 1..prices.len() {
    let ratio = prices[i] / prices[i - 1];
    out.push(match kind {
      ReturnKind::Simple => ratio - 1.0,
      ReturnKind::Log => ratio.ln(),
    });
  }
  out
}

/// Time-aligned period returns for a set of assets.
///
/// Rows are time periods, columns are assets in the canonical order
/// given by `assets`.
#[derive(Clone, Debug)]
pub struct ReturnMatrix {
  assets: Vec<String>,
  returns: Array2<f64>,
}

impl ReturnMatrix {
  /// Build from already-aligned per-asset return columns.
  pub fn from_columns(assets: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
    if assets.is_empty() {
      return Err(Error::InsufficientData {
        required: 1,
        got: 0,
      });
    }

    if assets.len() != columns.len() {
      return Err(Error::InvalidSeries(format!(
        "{} assets vs {} return columns",
        assets.len(),
        columns.len()
      )));
    }

    let n_periods = columns[0].len();
    for (asset, column) in assets.iter().zip(columns.iter()) {
      if column.len() != n_periods {
        return Err(Error::InvalidSeries(format!(
          "`{}`: {} periods, expected {}",
          asset,
          column.len(),
          n_periods
        )));
      }
      if let Some(&bad) = column.iter().find(|r| !r.is_finite()) {
        return Err(Error::InvalidSeries(format!(
          "`{asset}`: non-finite return {bad}"
        )));
      }
    }

    let returns = Array2::from_shape_fn((n_periods, assets.len()), |(t, a)| columns[a][t]);

    Ok(Self { assets, returns })
  }

  /// Inner-join a set of price series on their common dates, then
  /// difference each aligned series with `kind`.
  pub fn from_price_series(series: &[PriceSeries], kind: ReturnKind) -> Result<Self> {
    if series.is_empty() {
      return Err(Error::InsufficientData {
        required: 1,
        got: 0,
      });
    }

    let mut common: BTreeSet<NaiveDate> = series[0].dates.iter().copied().collect();
    for s in &series[1..] {
      let dates: BTreeSet<NaiveDate> = s.dates.iter().copied().collect();
      common = common.intersection(&dates).copied().collect();
    }

    if common.len() < 2 {
      return Err(Error::InsufficientData {
        required: 2,
        got: common.len(),
      });
    }

    let mut assets = Vec::with_capacity(series.len());
    let mut columns = Vec::with_capacity(series.len());
    for s in series {
      let aligned: Vec<f64> = s
        .dates
        .iter()
        .zip(s.prices.iter())
        .filter(|(date, _)| common.contains(date))
        .map(|(_, &price)| price)
        .collect();
      assets.push(s.name.clone());
      columns.push(returns_from_prices(&aligned, kind));
    }

    Self::from_columns(assets, columns)
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  pub fn n_periods(&self) -> usize {
    self.returns.nrows()
  }

  pub fn returns(&self) -> &Array2<f64> {
    &self.returns
  }

  /// Period returns of a single asset column.
  pub fn column(&self, asset: usize) -> Vec<f64> {
    self.returns.column(asset).to_vec()
  }
}

/// Annualized first and second moments over the canonical asset order.
#[derive(Clone, Debug)]
pub struct MomentEstimates {
  pub assets: Vec<String>,
  pub expected_returns: Array1<f64>,
  pub covariance: Array2<f64>,
}

/// Estimates annualized expected returns and covariance from period returns.
///
/// `mu_i = mean(r_i) * 252` and `Sigma = cov(r) * 252` with the sample
/// (n-1) covariance, so both live on the same annual scale.
#[derive(Clone, Copy, Debug, Default)]
pub struct CovarianceEstimator;

impl CovarianceEstimator {
  pub fn estimate(&self, matrix: &ReturnMatrix) -> Result<MomentEstimates> {
    let n_periods = matrix.n_periods();
    if n_periods < 2 {
      return Err(Error::InsufficientData {
        required: 2,
        got: n_periods,
      });
    }

    let n_assets = matrix.n_assets();
    let returns = matrix.returns();

    let means: Vec<f64> = (0..n_assets)
      .map(|a| returns.column(a).sum() / n_periods as f64)
      .collect();

    let expected_returns = Array1::from_iter(means.iter().map(|&m| m * TRADING_DAYS_PER_YEAR));

    let mut covariance = Array2::zeros((n_assets, n_assets));
    for i in 0..n_assets {
      for j in i..n_assets {
        let mut acc = 0.0;
        for t in 0..n_periods {
          acc += (returns[[t, i]] - means[i]) * (returns[[t, j]] - means[j]);
        }
        let cov = acc / (n_periods - 1) as f64 * TRADING_DAYS_PER_YEAR;
        covariance[[i, j]] = cov;
        covariance[[j, i]] = cov;
      }
    }

    Ok(MomentEstimates {
      assets: matrix.assets.clone(),
      expected_returns,
      covariance,
    })
  }
}

/// Pearson correlation matrix of the period returns (unannualized).
pub fn correlation_matrix(matrix: &ReturnMatrix) -> Result<Array2<f64>> {
  let n = matrix.n_assets();
  if n < 2 {
    return Err(Error::InsufficientData {
      required: 2,
      got: n,
    });
  }

  let columns: Vec<Vec<f64>> = (0..n).map(|a| matrix.column(a)).collect();
  let mut corr = Array2::from_elem((n, n), 1.0);

  for i in 0..n {
    for j in (i + 1)..n {
      let r = pearson(&columns[i], &columns[j]);
      corr[[i, j]] = r;
      corr[[j, i]] = r;
    }
  }

  Ok(corr)
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn series(name: &str, start_day: u32, prices: &[f64]) -> PriceSeries {
    let dates = (0..prices.len() as u32)
      .map(|i| date(2024, 1, start_day + i))
      .collect();
    PriceSeries::new(name, dates, prices.to_vec()).unwrap()
  }

  #[test]
  fn price_series_rejects_unsorted_dates() {
    let dates = vec![date(2024, 1, 2), date(2024, 1, 1)];
    let result = PriceSeries::new("SPY", dates, vec![100.0, 101.0]);
    assert!(matches!(result, Err(Error::InvalidSeries(_))));
  }

  #[test]
  fn price_series_rejects_non_positive_prices() {
    let dates = vec![date(2024, 1, 1), date(2024, 1, 2)];
    let result = PriceSeries::new("SPY", dates, vec![100.0, 0.0]);
    assert!(matches!(result, Err(Error::InvalidSeries(_))));
  }

  #[test]
  fn simple_and_log_returns_agree_on_the_ratio() {
    let s = series("SPY", 1, &[100.0, 110.0, 99.0]);

    let simple = s.returns(ReturnKind::Simple);
    assert_relative_eq!(simple[0], 0.1, epsilon = 1e-12);
    assert_relative_eq!(simple[1], -0.1, epsilon = 1e-12);

    let log = s.returns(ReturnKind::Log);
    assert_relative_eq!(log[0], 1.1_f64.ln(), epsilon = 1e-12);
    assert_relative_eq!(log[1], 0.9_f64.ln(), epsilon = 1e-12);
  }

  #[test]
  fn from_price_series_inner_joins_on_common_dates() {
    let a = series("A", 1, &[100.0, 101.0, 102.0, 103.0]);
    // B misses Jan 2, so only Jan 1/3/4 survive the join.
    let b = PriceSeries::new(
      "B",
      vec![date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 4)],
      vec![50.0, 51.0, 52.0],
    )
    .unwrap();

    let matrix = ReturnMatrix::from_price_series(&[a, b], ReturnKind::Simple).unwrap();
    assert_eq!(matrix.n_assets(), 2);
    assert_eq!(matrix.n_periods(), 2);
    assert_relative_eq!(matrix.returns()[[0, 0]], 102.0 / 100.0 - 1.0, epsilon = 1e-12);
    assert_relative_eq!(matrix.returns()[[0, 1]], 51.0 / 50.0 - 1.0, epsilon = 1e-12);
  }

  #[test]
  fn from_price_series_needs_two_common_dates() {
    let a = series("A", 1, &[100.0, 101.0]);
    let b = series("B", 2, &[50.0, 51.0]);

    let result = ReturnMatrix::from_price_series(&[a, b], ReturnKind::Log);
    assert!(matches!(
      result,
      Err(Error::InsufficientData { required: 2, got: 1 })
    ));
  }

  #[test]
  fn estimator_annualizes_sample_moments() {
    let matrix = ReturnMatrix::from_columns(
      vec!["A".into(), "B".into()],
      vec![vec![0.01, -0.01, 0.02], vec![0.00, 0.01, -0.02]],
    )
    .unwrap();

    let est = CovarianceEstimator.estimate(&matrix).unwrap();

    let mean_a = (0.01 - 0.01 + 0.02) / 3.0;
    assert_relative_eq!(est.expected_returns[0], mean_a * 252.0, epsilon = 1e-12);

    // var_a over n-1, times 252
    let var_a = [0.01, -0.01, 0.02]
      .iter()
      .map(|r| (r - mean_a).powi(2))
      .sum::<f64>()
      / 2.0;
    assert_relative_eq!(est.covariance[[0, 0]], var_a * 252.0, epsilon = 1e-12);
    assert_relative_eq!(est.covariance[[0, 1]], est.covariance[[1, 0]], epsilon = 1e-15);
  }

  #[test]
  fn estimator_needs_two_periods() {
    let matrix =
      ReturnMatrix::from_columns(vec!["A".into()], vec![vec![0.01]]).unwrap();
    assert!(matches!(
      CovarianceEstimator.estimate(&matrix),
      Err(Error::InsufficientData { required: 2, got: 1 })
    ));
  }

  #[test]
  fn correlation_of_identical_columns_is_one() {
    let matrix = ReturnMatrix::from_columns(
      vec!["A".into(), "B".into()],
      vec![vec![0.01, -0.02, 0.03], vec![0.01, -0.02, 0.03]],
    )
    .unwrap();

    let corr = correlation_matrix(&matrix).unwrap();
    assert_relative_eq!(corr[[0, 1]], 1.0, epsilon = 1e-12);
    assert_relative_eq!(corr[[0, 0]], 1.0, epsilon = 1e-15);
  }

  #[test]
  fn correlation_needs_two_assets() {
    let matrix =
      ReturnMatrix::from_columns(vec!["A".into()], vec![vec![0.01, 0.02]]).unwrap();
    assert!(matches!(
      correlation_matrix(&matrix),
      Err(Error::InsufficientData { required: 2, got: 1 })
    ));
  }
}
