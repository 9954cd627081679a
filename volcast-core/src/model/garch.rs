//! GARCH(p, q) estimation with a constant mean and Gaussian errors.
//!
//! sigma2[t] = omega + sum_i alpha[i] * e2[t-1-i] + sum_j beta[j] * sigma2[t-1-j]
//!
//! `p` counts variance lags (beta), `q` counts shock lags (alpha).
//! Pre-sample terms use an exponentially weighted backcast of the first
//! squared residuals (decay 0.94, up to 75 observations).
//!
//! The negative log-likelihood is minimized by argmin's Nelder-Mead solver on
//! data scaled to unit variance; MLE is scale-equivariant, so the fitted
//! parameters are mapped back exactly (mu * s, omega * s^2).

use super::ModelError;
use argmin::core::{CostFunction, Error as ArgminError, Executor, State, TerminationReason};
use argmin::solver::neldermead::NelderMead;
use serde::{Deserialize, Serialize};

const LN_2PI: f64 = 1.837_877_066_409_345_3;
const PENALTY: f64 = 1e12;
const MAX_ITERS: u64 = 20_000;
const SD_TOLERANCE: f64 = 1e-8;
const BACKCAST_DECAY: f64 = 0.94;
const BACKCAST_WINDOW: usize = 75;

/// Lag orders of the variance equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarchOrder {
    /// Variance lags (beta terms).
    pub p: usize,
    /// Shock lags (alpha terms).
    pub q: usize,
}

impl GarchOrder {
    pub fn new(p: usize, q: usize) -> Result<Self, ModelError> {
        if q == 0 {
            return Err(ModelError::InvalidOrder(
                "q (shock lags) must be at least 1".into(),
            ));
        }
        Ok(Self { p, q })
    }

    /// Convert signed request values, rejecting negatives.
    pub fn from_signed(p: i64, q: i64) -> Result<Self, ModelError> {
        let p = usize::try_from(p)
            .map_err(|_| ModelError::InvalidOrder(format!("p must be non-negative, got {p}")))?;
        let q = usize::try_from(q)
            .map_err(|_| ModelError::InvalidOrder(format!("q must be non-negative, got {q}")))?;
        Self::new(p, q)
    }

    /// mu, omega, q alphas, p betas.
    pub fn n_params(&self) -> usize {
        2 + self.p + self.q
    }

    /// Observations needed for a fit: one per parameter plus the longest lag.
    pub fn min_observations(&self) -> usize {
        self.n_params() + self.p.max(self.q) + 1
    }
}

/// Parameters in the units of the data they were fitted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GarchParams {
    pub mu: f64,
    pub omega: f64,
    pub alpha: Vec<f64>,
    pub beta: Vec<f64>,
}

impl GarchParams {
    pub fn persistence(&self) -> f64 {
        self.alpha.iter().sum::<f64>() + self.beta.iter().sum::<f64>()
    }

    /// Positive intercept, non-negative lags, covariance stationary.
    pub fn is_admissible(&self) -> bool {
        self.mu.is_finite()
            && self.omega.is_finite()
            && self.omega > 0.0
            && self.alpha.iter().chain(&self.beta).all(|&c| c.is_finite() && c >= 0.0)
            && self.persistence() < 1.0
    }

    /// Long-run variance, if stationary.
    pub fn unconditional_variance(&self) -> Option<f64> {
        let persistence = self.persistence();
        (persistence < 1.0).then(|| self.omega / (1.0 - persistence))
    }

    fn from_slice(order: GarchOrder, x: &[f64]) -> Self {
        Self {
            mu: x[0],
            omega: x[1],
            alpha: x[2..2 + order.q].to_vec(),
            beta: x[2 + order.q..2 + order.q + order.p].to_vec(),
        }
    }

    fn to_vec(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(2 + self.alpha.len() + self.beta.len());
        v.push(self.mu);
        v.push(self.omega);
        v.extend_from_slice(&self.alpha);
        v.extend_from_slice(&self.beta);
        v
    }
}

/// A fitted model: parameters plus the variance state at the end of the sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedGarch {
    pub order: GarchOrder,
    pub params: GarchParams,
    pub log_likelihood: f64,
    pub n_obs: usize,
    pub iterations: u64,
    /// Last `q` squared residuals, oldest first.
    pub recent_resid2: Vec<f64>,
    /// Last `p` conditional variances, oldest first.
    pub recent_sigma2: Vec<f64>,
}

impl FittedGarch {
    /// Estimate a GARCH model on `data`.
    pub fn fit(data: &[f64], order: GarchOrder) -> Result<Self, ModelError> {
        let needed = order.min_observations();
        if data.len() < needed {
            return Err(ModelError::InsufficientData {
                needed,
                available: data.len(),
            });
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::DegenerateSeries);
        }

        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let var = data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let scale = var.sqrt();
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(ModelError::DegenerateSeries);
        }

        let scaled: Vec<f64> = data.iter().map(|v| v / scale).collect();
        let scaled_mean = mean / scale;
        let backcast = backcast(&scaled, scaled_mean);

        let start = starting_values(order, scaled_mean);
        let simplex = initial_simplex(order, &start);

        let problem = NegLogLikelihood {
            data: scaled,
            order,
            backcast,
        };
        let solver = NelderMead::new(simplex)
            .with_sd_tolerance(SD_TOLERANCE)
            .map_err(|e| ModelError::Convergence(format!("solver setup: {e}")))?;
        let result = Executor::new(problem, solver)
            .configure(|state| state.max_iters(MAX_ITERS))
            .run()
            .map_err(|e| ModelError::Convergence(e.to_string()))?;

        let state = result.state();
        let reason = state.get_termination_reason();
        if !matches!(reason, Some(TerminationReason::SolverConverged)) {
            return Err(ModelError::Convergence(format!(
                "optimizer stopped without converging ({reason:?}) after {} iterations",
                state.get_iter()
            )));
        }
        let best = state
            .get_best_param()
            .ok_or_else(|| ModelError::Convergence("optimizer returned no parameters".into()))?;

        let scaled_params = GarchParams::from_slice(order, best);
        if !scaled_params.is_admissible() {
            return Err(ModelError::Convergence(
                "optimum lies outside the admissible region".into(),
            ));
        }

        let params = GarchParams {
            mu: scaled_params.mu * scale,
            omega: scaled_params.omega * var,
            alpha: scaled_params.alpha,
            beta: scaled_params.beta,
        };

        let resid2: Vec<f64> = data.iter().map(|v| (v - params.mu).powi(2)).collect();
        let sigma2 = conditional_variances(&resid2, &params, backcast * var);
        let log_likelihood = -negative_log_likelihood(&resid2, &sigma2);
        if !log_likelihood.is_finite() {
            return Err(ModelError::Convergence("non-finite log-likelihood".into()));
        }

        Ok(Self {
            order,
            recent_resid2: tail(&resid2, order.q, backcast * var),
            recent_sigma2: tail(&sigma2, order.p, backcast * var),
            params,
            log_likelihood,
            n_obs: data.len(),
            iterations: state.get_iter(),
        })
    }

    /// Variance path for the next `horizon` days.
    ///
    /// Beyond one step, future squared shocks are replaced by their expectation.
    /// The output buffer is reserved up front; a horizon the allocator cannot
    /// satisfy is `HorizonTooLarge`.
    pub fn forecast_variance(&self, horizon: usize) -> Result<Vec<f64>, ModelError> {
        let mut out = Vec::new();
        out.try_reserve_exact(horizon)
            .map_err(|_| ModelError::HorizonTooLarge(horizon))?;
        let mut e2 = self.recent_resid2.clone();
        let mut s2 = self.recent_sigma2.clone();

        for _ in 0..horizon {
            let next = self.params.omega
                + dot_recent(&self.params.alpha, &e2)
                + dot_recent(&self.params.beta, &s2);
            out.push(next);
            roll(&mut e2, next);
            roll(&mut s2, next);
        }

        Ok(out)
    }

    /// Structural checks for models read back from disk.
    pub fn validate(&self) -> Result<(), ModelError> {
        let ok = self.params.alpha.len() == self.order.q
            && self.params.beta.len() == self.order.p
            && self.recent_resid2.len() == self.order.q
            && self.recent_sigma2.len() == self.order.p
            && self.params.is_admissible()
            && self
                .recent_resid2
                .iter()
                .chain(&self.recent_sigma2)
                .all(|v| v.is_finite() && *v >= 0.0);
        if ok {
            Ok(())
        } else {
            Err(ModelError::Artifact("inconsistent GARCH state".into()))
        }
    }
}

struct NegLogLikelihood {
    data: Vec<f64>,
    order: GarchOrder,
    backcast: f64,
}

impl CostFunction for NegLogLikelihood {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, ArgminError> {
        let params = GarchParams::from_slice(self.order, x);
        if !params.is_admissible() {
            return Ok(PENALTY);
        }
        let resid2: Vec<f64> = self.data.iter().map(|v| (v - params.mu).powi(2)).collect();
        let sigma2 = conditional_variances(&resid2, &params, self.backcast);
        let nll = negative_log_likelihood(&resid2, &sigma2);
        Ok(if nll.is_finite() { nll } else { PENALTY })
    }
}

fn conditional_variances(resid2: &[f64], params: &GarchParams, backcast: f64) -> Vec<f64> {
    let mut sigma2: Vec<f64> = Vec::with_capacity(resid2.len());
    for t in 0..resid2.len() {
        let mut s = params.omega;
        for (i, a) in params.alpha.iter().enumerate() {
            s += a * if t > i { resid2[t - 1 - i] } else { backcast };
        }
        for (j, b) in params.beta.iter().enumerate() {
            s += b * if t > j { sigma2[t - 1 - j] } else { backcast };
        }
        sigma2.push(s);
    }
    sigma2
}

fn negative_log_likelihood(resid2: &[f64], sigma2: &[f64]) -> f64 {
    resid2
        .iter()
        .zip(sigma2)
        .map(|(e2, s2)| {
            if *s2 <= 0.0 {
                f64::INFINITY
            } else {
                0.5 * (LN_2PI + s2.ln() + e2 / s2)
            }
        })
        .sum()
}

fn backcast(data: &[f64], mean: f64) -> f64 {
    let window = data.len().min(BACKCAST_WINDOW);
    let mut weight = 1.0;
    let mut total_weight = 0.0;
    let mut acc = 0.0;
    for v in &data[..window] {
        acc += weight * (v - mean).powi(2);
        total_weight += weight;
        weight *= BACKCAST_DECAY;
    }
    acc / total_weight
}

fn starting_values(order: GarchOrder, mean: f64) -> GarchParams {
    let alpha_total = 0.1;
    let beta_total = if order.p > 0 { 0.8 } else { 0.0 };
    GarchParams {
        mu: mean,
        omega: 1.0 - alpha_total - beta_total,
        alpha: vec![alpha_total / order.q as f64; order.q],
        beta: vec![beta_total / order.p.max(1) as f64; order.p],
    }
}

/// Start vertex plus one feasible perturbation per coordinate.
fn initial_simplex(order: GarchOrder, start: &GarchParams) -> Vec<Vec<f64>> {
    let x0 = start.to_vec();
    let mut vertices = vec![x0.clone()];
    for k in 0..x0.len() {
        let mut v = x0.clone();
        v[k] = match k {
            0 => v[0] + 0.1 * v[0].abs().max(0.1),
            1 => v[1] * 1.5,
            k if k < 2 + order.q => v[k] + 0.05 / order.q as f64,
            _ => v[k] * 0.85,
        };
        vertices.push(v);
    }
    vertices
}

fn tail(values: &[f64], len: usize, pad: f64) -> Vec<f64> {
    let available = values.len().min(len);
    let mut out = vec![pad; len - available];
    out.extend_from_slice(&values[values.len() - available..]);
    out
}

/// Sum of coef[lag-1] * history[most recent - (lag-1)].
fn dot_recent(coefs: &[f64], history: &[f64]) -> f64 {
    coefs
        .iter()
        .zip(history.iter().rev())
        .map(|(c, h)| c * h)
        .sum()
}

fn roll(history: &mut Vec<f64>, next: f64) {
    if !history.is_empty() {
        history.remove(0);
        history.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{garch_price_series, SyntheticParams};
    use crate::data::absolute_returns;
    use chrono::NaiveDate;

    fn sample_returns(label: &str, rows: usize) -> Vec<f64> {
        let prices = garch_price_series(
            label,
            rows,
            NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            SyntheticParams::default(),
        );
        absolute_returns(&prices, rows as i64).values
    }

    #[test]
    fn order_validation() {
        assert!(GarchOrder::new(1, 1).is_ok());
        assert!(GarchOrder::new(0, 1).is_ok());
        assert!(matches!(GarchOrder::new(1, 0), Err(ModelError::InvalidOrder(_))));
        assert!(matches!(GarchOrder::from_signed(-1, 1), Err(ModelError::InvalidOrder(_))));
        assert_eq!(GarchOrder::new(1, 1).unwrap().n_params(), 4);
    }

    #[test]
    fn fit_garch_11_converges_to_admissible_params() {
        let data = sample_returns("FIT", 1500);
        let fit = FittedGarch::fit(&data, GarchOrder::new(1, 1).unwrap()).unwrap();

        assert!(fit.params.is_admissible());
        assert_eq!(fit.params.alpha.len(), 1);
        assert_eq!(fit.params.beta.len(), 1);
        assert_eq!(fit.n_obs, data.len());
        assert!(fit.log_likelihood.is_finite());
        assert!(fit.params.mu > 0.0, "absolute returns have a positive mean");
        assert!(fit.validate().is_ok());
    }

    #[test]
    fn fit_higher_orders() {
        let data = sample_returns("ORDERS", 1200);
        for (p, q) in [(0, 1), (2, 1), (1, 2)] {
            let order = GarchOrder::new(p, q).unwrap();
            let fit = FittedGarch::fit(&data, order).unwrap();
            assert_eq!(fit.recent_sigma2.len(), p);
            assert_eq!(fit.recent_resid2.len(), q);
        }
    }

    #[test]
    fn forecast_is_positive_and_mean_reverting() {
        let data = sample_returns("FC", 1500);
        let fit = FittedGarch::fit(&data, GarchOrder::new(1, 1).unwrap()).unwrap();
        let path = fit.forecast_variance(500).unwrap();

        assert_eq!(path.len(), 500);
        assert!(path.iter().all(|v| v.is_finite() && *v > 0.0));

        let long_run = fit.params.unconditional_variance().unwrap();
        let last = *path.last().unwrap();
        let first = path[0];
        assert!((last - long_run).abs() <= (first - long_run).abs() + 1e-15);
    }

    #[test]
    fn forecast_zero_horizon_is_empty() {
        let data = sample_returns("ZERO", 600);
        let fit = FittedGarch::fit(&data, GarchOrder::new(1, 1).unwrap()).unwrap();
        assert!(fit.forecast_variance(0).unwrap().is_empty());
    }

    #[test]
    fn unallocatable_horizon_is_an_error() {
        let data = sample_returns("HUGE", 600);
        let fit = FittedGarch::fit(&data, GarchOrder::new(1, 1).unwrap()).unwrap();
        assert!(matches!(
            fit.forecast_variance(1_000_000_000_000),
            Err(ModelError::HorizonTooLarge(1_000_000_000_000))
        ));
        assert!(matches!(
            fit.forecast_variance(usize::MAX),
            Err(ModelError::HorizonTooLarge(usize::MAX))
        ));
    }

    #[test]
    fn insufficient_data_is_reported() {
        let err = FittedGarch::fit(&[0.01, 0.02, 0.015], GarchOrder::new(1, 1).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::InsufficientData { needed: 6, available: 3 }
        ));
    }

    #[test]
    fn constant_series_is_degenerate() {
        let err = FittedGarch::fit(&[0.01; 100], GarchOrder::new(1, 1).unwrap()).unwrap_err();
        assert!(matches!(err, ModelError::DegenerateSeries));
    }

    #[test]
    fn one_step_forecast_matches_recursion() {
        let fit = FittedGarch {
            order: GarchOrder { p: 1, q: 1 },
            params: GarchParams {
                mu: 0.0,
                omega: 0.1,
                alpha: vec![0.2],
                beta: vec![0.7],
            },
            log_likelihood: 0.0,
            n_obs: 10,
            iterations: 0,
            recent_resid2: vec![2.0],
            recent_sigma2: vec![1.0],
        };
        let path = fit.forecast_variance(3).unwrap();
        assert!((path[0] - (0.1 + 0.2 * 2.0 + 0.7 * 1.0)).abs() < 1e-12);
        assert!((path[1] - (0.1 + 0.9 * path[0])).abs() < 1e-12);
        assert!((path[2] - (0.1 + 0.9 * path[1])).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_mismatched_state() {
        let mut fit = FittedGarch {
            order: GarchOrder { p: 1, q: 1 },
            params: GarchParams {
                mu: 0.0,
                omega: 0.1,
                alpha: vec![0.2],
                beta: vec![0.7],
            },
            log_likelihood: 0.0,
            n_obs: 10,
            iterations: 0,
            recent_resid2: vec![2.0],
            recent_sigma2: vec![],
        };
        assert!(fit.validate().is_err());
        fit.recent_sigma2.push(1.0);
        assert!(fit.validate().is_ok());
    }

    #[test]
    fn tail_pads_short_history() {
        assert_eq!(tail(&[1.0], 3, 9.0), vec![9.0, 9.0, 1.0]);
        assert_eq!(tail(&[1.0, 2.0, 3.0], 2, 9.0), vec![2.0, 3.0]);
        assert!(tail(&[1.0], 0, 9.0).is_empty());
    }
}
