//! # Mean-Variance Portfolio Optimization and Risk Analytics
//!
//! `markowitz_rs` estimates return moments from price history, solves
//! constrained mean-variance allocation problems, sweeps the efficient
//! frontier, and evaluates performance and tail-risk metrics on the
//! resulting portfolios.
//!
//! ## Modules
//!
//! | Module        | Description                                                                              |
//! |---------------|------------------------------------------------------------------------------------------|
//! | [`data`]      | Price series, return matrices, and annualized moment estimation.                         |
//! | [`error`]     | Crate-wide error and result types.                                                       |
//! | [`frontier`]  | Parallel efficient-frontier generation over a target-return sweep.                       |
//! | [`metrics`]   | Performance metrics, rolling statistics, stress tests, and Monte Carlo VaR.              |
//! | [`optimizer`] | Max-Sharpe, min-volatility, max-return, and target-return portfolio construction.        |
//! | [`risk`]      | Portfolio-level historical VaR/CVaR, beta, and correlation analytics.                    |
//! | [`solver`]    | Augmented Lagrangian solver with projected-gradient subproblems.                         |
//!
//! ## Parallelism
//!
//! Frontier points are independent solves and run on `rayon`; everything
//! else is single-threaded and deterministic (Monte Carlo takes an
//! explicit seed).
//!
//! ## Example Usage
//!
//! ```rust
//! use markowitz_rs::data::MomentEstimates;
//! use markowitz_rs::optimizer::PortfolioOptimizer;
//! use ndarray::arr1;
//! use ndarray::arr2;
//!
//! let estimates = MomentEstimates {
//!   assets: vec!["A".into(), "B".into()],
//!   expected_returns: arr1(&[0.08, 0.10]),
//!   covariance: arr2(&[[0.04, 0.006], [0.006, 0.09]]),
//! };
//! let optimizer = PortfolioOptimizer::new(estimates, 0.04).unwrap();
//! let portfolio = optimizer.optimize_max_sharpe().unwrap();
//! assert!(portfolio.sharpe_ratio > 0.0);
//! ```

pub mod data;
pub mod error;
pub mod frontier;
pub mod metrics;
pub mod optimizer;
pub mod risk;
pub mod solver;

pub use error::Error;
pub use error::Result;

/// Annualization convention for daily observations.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
