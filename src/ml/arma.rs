//! ARMA estimation by exact Gaussian likelihood
//!
//! The model is written in Harvey state-space form with state dimension
//! `r = max(p, q + 1)`:
//!
//! ```text
//! y_t       = Z a_t                     Z = [1, 0, .., 0]
//! a_{t+1}   = T a_t + R e_{t+1}         e ~ N(0, sigma2)
//! ```
//!
//! `T` carries the AR coefficients in its first column and ones on the
//! super-diagonal, `R = [1, theta_1, .., theta_{r-1}]'`. The likelihood is
//! evaluated with a Kalman filter started from an approximate-diffuse prior
//! (variance `1e6`), the first `r` prediction errors are burned, and
//! `sigma2` is concentrated out. There is no trend constant.

use anyhow::Result;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::optimization::{nelder_mead, NelderMeadConfig};

const DIFFUSE_VARIANCE: f64 = 1e6;

/// Non-seasonal `(p, d, q)` order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl Default for ArmaOrder {
    fn default() -> Self {
        Self { p: 1, d: 0, q: 1 }
    }
}

impl ArmaOrder {
    pub fn state_dim(&self) -> usize {
        self.p.max(self.q + 1)
    }
}

impl std::fmt::Display for ArmaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// Estimated coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmaParams {
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub sigma2: f64,
}

/// Estimation options
#[derive(Debug, Clone, PartialEq)]
pub struct ArmaOptions {
    /// Reject AR coefficients whose polynomial has a root on or inside the unit circle
    pub enforce_stationarity: bool,
    /// Reject MA coefficients whose polynomial has a root on or inside the unit circle
    pub enforce_invertibility: bool,
    pub max_iterations: usize,
}

impl Default for ArmaOptions {
    fn default() -> Self {
        Self {
            enforce_stationarity: false,
            enforce_invertibility: false,
            max_iterations: 500,
        }
    }
}

/// A fitted ARMA model, ready to forecast from the end of its series
#[derive(Debug, Clone)]
pub struct ArmaFit {
    pub order: ArmaOrder,
    pub params: ArmaParams,
    /// `None` for the degenerate constant-series fit
    pub log_likelihood: Option<f64>,
    pub n_obs: usize,
    pub converged: bool,
    /// True when the series was constant and the zero-noise limit was used
    pub degenerate: bool,
    transition: DMatrix<f64>,
    disturbance: DMatrix<f64>,
    // predicted state and unit-scale covariance for t = n + 1
    state: DVector<f64>,
    cov: DMatrix<f64>,
}

impl ArmaFit {
    pub fn fit(series: &[f64], order: ArmaOrder, options: &ArmaOptions) -> Result<Self> {
        if order.d != 0 {
            anyhow::bail!("differencing is not supported (d = {})", order.d);
        }
        let r = order.state_dim();
        if series.len() <= r {
            anyhow::bail!(
                "series of length {} is too short for order {}",
                series.len(),
                order
            );
        }
        if series.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("series contains non-finite values");
        }

        if is_constant(series) {
            return Self::constant(series, order);
        }
        // Only the burn-in varies: every scored residual can be driven to zero
        if is_constant(&series[r..]) {
            anyhow::bail!(
                "series is constant after its first {} observations, no noise variance to estimate",
                r
            );
        }

        let objective = |coeffs: &[f64]| -> f64 {
            let (ar, ma) = coeffs.split_at(order.p);
            if options.enforce_stationarity && !roots_outside_unit_circle(ar, -1.0) {
                return f64::INFINITY;
            }
            if options.enforce_invertibility && !roots_outside_unit_circle(ma, 1.0) {
                return f64::INFINITY;
            }
            let (t, rr) = system_matrices(ar, ma, r);
            match kalman_filter(series, &t, &rr, r) {
                Some(out) => out.concentrated_nll(),
                None => f64::INFINITY,
            }
        };

        let mut start = starting_values(series, order);
        if options.enforce_stationarity && !roots_outside_unit_circle(&start[..order.p], -1.0) {
            start[..order.p].iter_mut().for_each(|c| *c = 0.0);
        }
        let nm_config = NelderMeadConfig {
            max_iter: options.max_iterations,
            ..NelderMeadConfig::default()
        };
        let result = nelder_mead(objective, &start, &nm_config);

        if !result.value.is_finite() || result.point.iter().any(|c| !c.is_finite()) {
            anyhow::bail!("likelihood could not be evaluated at any candidate parameters");
        }
        if !result.converged {
            warn!(
                iterations = result.iterations,
                "ARMA likelihood optimisation did not converge, using best parameters found"
            );
        }

        let (ar, ma) = result.point.split_at(order.p);
        let (transition, disturbance) = system_matrices(ar, ma, r);
        let out = kalman_filter(series, &transition, &disturbance, r)
            .ok_or_else(|| anyhow::anyhow!("Kalman filter failed at fitted parameters"))?;

        let sigma2 = out.sum_sq / out.n_eff as f64;
        let n_eff = out.n_eff as f64;
        let log_likelihood = -0.5 * n_eff * ((2.0 * std::f64::consts::PI).ln() + 1.0 + sigma2.ln())
            - 0.5 * out.sum_log_f;

        if !sigma2.is_finite() || sigma2 <= 0.0 || !log_likelihood.is_finite() {
            anyhow::bail!(
                "fit produced an invalid noise variance ({}) or likelihood ({})",
                sigma2,
                log_likelihood
            );
        }

        debug!(
            ?ar,
            ?ma,
            sigma2,
            log_likelihood,
            iterations = result.iterations,
            "fitted ARMA{}",
            order
        );

        Ok(Self {
            order,
            params: ArmaParams {
                ar: ar.to_vec(),
                ma: ma.to_vec(),
                sigma2,
            },
            log_likelihood: Some(log_likelihood),
            n_obs: series.len(),
            converged: result.converged,
            degenerate: false,
            transition,
            disturbance,
            state: out.state,
            cov: out.cov,
        })
    }

    /// Zero-noise limit for a constant series: unit AR root, no MA terms.
    fn constant(series: &[f64], order: ArmaOrder) -> Result<Self> {
        if order.p == 0 {
            anyhow::bail!("a constant series cannot be represented without an AR term");
        }
        let r = order.state_dim();
        let mut ar = vec![0.0; order.p];
        ar[0] = 1.0;
        let ma = vec![0.0; order.q];
        let (transition, disturbance) = system_matrices(&ar, &ma, r);

        let mut state = DVector::<f64>::zeros(r);
        state[0] = series[series.len() - 1];

        Ok(Self {
            order,
            params: ArmaParams {
                ar,
                ma,
                sigma2: 0.0,
            },
            log_likelihood: None,
            n_obs: series.len(),
            converged: true,
            degenerate: true,
            transition,
            disturbance,
            state,
            cov: DMatrix::zeros(r, r),
        })
    }

    /// Number of estimated parameters, noise variance included
    pub fn n_params(&self) -> usize {
        self.order.p + self.order.q + 1
    }

    pub fn aic(&self) -> Option<f64> {
        self.log_likelihood
            .map(|ll| -2.0 * ll + 2.0 * self.n_params() as f64)
    }

    /// Mean and variance of the forecast distribution for the next `steps` periods
    pub fn forecast(&self, steps: usize) -> Vec<(f64, f64)> {
        let mut state = self.state.clone();
        let mut cov = self.cov.clone();
        let mut out = Vec::with_capacity(steps);

        for _ in 0..steps {
            out.push((state[0], self.params.sigma2 * cov[(0, 0)]));
            state = &self.transition * &state;
            cov = &self.transition * &cov * self.transition.transpose() + &self.disturbance;
        }

        out
    }
}

struct FilterOutput {
    sum_sq: f64,
    sum_log_f: f64,
    n_eff: usize,
    state: DVector<f64>,
    cov: DMatrix<f64>,
}

impl FilterOutput {
    /// Negative log-likelihood with sigma2 concentrated out, constants dropped
    fn concentrated_nll(&self) -> f64 {
        let sigma2 = (self.sum_sq / self.n_eff as f64).max(f64::MIN_POSITIVE);
        0.5 * (self.n_eff as f64 * sigma2.ln() + self.sum_log_f)
    }
}

/// Transition matrix `T` and `R R'` for the given coefficients
fn system_matrices(ar: &[f64], ma: &[f64], r: usize) -> (DMatrix<f64>, DMatrix<f64>) {
    let mut t = DMatrix::<f64>::zeros(r, r);
    for (i, phi) in ar.iter().enumerate() {
        t[(i, 0)] = *phi;
    }
    for i in 0..r.saturating_sub(1) {
        t[(i, i + 1)] = 1.0;
    }

    let mut rvec = DVector::<f64>::zeros(r);
    rvec[0] = 1.0;
    for (i, theta) in ma.iter().enumerate() {
        rvec[i + 1] = *theta;
    }

    let rr = &rvec * rvec.transpose();
    (t, rr)
}

/// Unit-variance Kalman filter. `None` if a prediction-error variance
/// stops being positive and finite.
fn kalman_filter(
    y: &[f64],
    t: &DMatrix<f64>,
    rr: &DMatrix<f64>,
    burn: usize,
) -> Option<FilterOutput> {
    let r = t.nrows();
    let mut state = DVector::<f64>::zeros(r);
    let mut cov = DMatrix::<f64>::identity(r, r) * DIFFUSE_VARIANCE;

    let mut sum_sq = 0.0;
    let mut sum_log_f = 0.0;
    let mut n_eff = 0;

    for (i, &obs) in y.iter().enumerate() {
        let f = cov[(0, 0)];
        if !f.is_finite() || f <= 0.0 {
            return None;
        }
        let v = obs - state[0];

        if i >= burn {
            sum_sq += v * v / f;
            sum_log_f += f.ln();
            n_eff += 1;
        }

        let gain = cov.column(0).into_owned() / f;
        let first_row = cov.row(0).into_owned();
        let state_upd = &state + &gain * v;
        let cov_upd = &cov - &gain * &first_row;

        state = t * state_upd;
        cov = t * cov_upd * t.transpose() + rr;
        cov = (&cov + cov.transpose()) * 0.5;
    }

    if n_eff == 0 || !sum_sq.is_finite() || !sum_log_f.is_finite() {
        return None;
    }

    Some(FilterOutput {
        sum_sq,
        sum_log_f,
        n_eff,
        state,
        cov,
    })
}

/// True when `1 + sign * (c_1 z + .. + c_k z^k)` has every root outside the unit circle.
///
/// AR polynomials use `sign = -1`, MA polynomials `sign = +1`.
fn roots_outside_unit_circle(coeffs: &[f64], sign: f64) -> bool {
    match coeffs.len() {
        0 => true,
        1 => coeffs[0].abs() < 1.0,
        k => {
            // Companion matrix eigenvalues are the reciprocal roots
            let mut companion = DMatrix::<f64>::zeros(k, k);
            for (j, c) in coeffs.iter().enumerate() {
                companion[(0, j)] = -sign * c;
            }
            for i in 1..k {
                companion[(i, i - 1)] = 1.0;
            }
            companion
                .complex_eigenvalues()
                .iter()
                .all(|z| z.norm() < 1.0)
        }
    }
}

/// Lag-1 least squares through the origin for the first AR term, zeros elsewhere
fn starting_values(series: &[f64], order: ArmaOrder) -> Vec<f64> {
    let mut start = vec![0.0; order.p + order.q];
    if order.p > 0 {
        let num: f64 = series.windows(2).map(|w| w[0] * w[1]).sum();
        let den: f64 = series[..series.len() - 1].iter().map(|v| v * v).sum();
        if den > 0.0 {
            start[0] = num / den;
        }
    }
    start
}

fn is_constant(series: &[f64]) -> bool {
    let first = series[0];
    let scale = first.abs().max(1.0);
    series.iter().all(|v| (v - first).abs() <= 1e-12 * scale)
}
