//! Elastic-net regression by cyclic coordinate descent.
//!
//! The objective is
//! ```text
//! 1/(2n) ‖y − Xβ − b‖² + α ρ ‖β‖₁ + α (1 − ρ)/2 ‖β‖²
//! ```
//! with mixing parameter `ρ = l1_ratio`; `ρ = 1` is the lasso and
//! `ρ = 0` ridge. Each coordinate update is a soft-thresholded
//! univariate least squares step against the running residual.

use super::{centre_xy, gram_cholesky, LinearFit};
use crate::error::{MungError, Result};
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone)]
pub struct ElasticNetConfig {
    /// overall penalty strength α
    pub alpha: f64,
    /// mixing ρ between L1 (1.0) and L2 (0.0)
    pub l1_ratio: f64,
    pub max_iter: usize,
    /// stop when the largest coefficient change relative to the
    /// largest coefficient falls below `tol`
    pub tol: f64,
    pub fit_intercept: bool,
}

impl Default for ElasticNetConfig {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            l1_ratio: 0.5,
            max_iter: 1000,
            tol: 1e-4,
            fit_intercept: true,
        }
    }
}

impl ElasticNetConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(MungError::InvalidConfig(format!(
                "alpha must be a non-negative number, got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.l1_ratio) {
            return Err(MungError::InvalidConfig(format!(
                "l1_ratio must be within [0, 1], got {}",
                self.l1_ratio
            )));
        }
        if self.max_iter == 0 {
            return Err(MungError::InvalidConfig("max_iter must be positive".into()));
        }
        Ok(())
    }
}

/// Soft-thresholding operator S(x, λ) = sign(x) max(|x| − λ, 0)
#[inline]
fn soft_threshold(x: f64, threshold: f64) -> f64 {
    if x > threshold {
        x - threshold
    } else if x < -threshold {
        x + threshold
    } else {
        0.0
    }
}

/// Fit an elastic-net model
pub fn fit_elastic_net(
    xx: &DMatrix<f64>,
    yy: &DVector<f64>,
    config: &ElasticNetConfig,
) -> Result<LinearFit> {
    let mut path = fit_elastic_net_path(xx, yy, &[config.alpha], config)?;
    path.pop()
        .ok_or_else(|| MungError::InsufficientData("empty regularization path".into()))
}

/// Fit a sequence of penalties, warm-starting each fit from the
/// previous solution. Pass `alphas` in decreasing order.
pub fn fit_elastic_net_path(
    xx: &DMatrix<f64>,
    yy: &DVector<f64>,
    alphas: &[f64],
    config: &ElasticNetConfig,
) -> Result<Vec<LinearFit>> {
    config.validate()?;

    let nn = xx.nrows();
    let pp = xx.ncols();

    if nn != yy.len() {
        return Err(MungError::Alignment(format!(
            "design has {} rows but the response has {} values",
            nn,
            yy.len()
        )));
    }
    if nn == 0 {
        return Err(MungError::InsufficientData(
            "no samples to fit an elastic net".into(),
        ));
    }

    let (xc, yc, x_mean, y_mean) = if config.fit_intercept {
        centre_xy(xx, yy)
    } else {
        (xx.clone(), yy.clone(), DVector::zeros(pp), 0.0)
    };

    let col_norm_sq: Vec<f64> = xc.column_iter().map(|c| c.norm_squared()).collect();

    // an unpenalized fit needs a unique solution; constant columns stay
    // at zero and do not count against the rank
    if alphas.iter().any(|&a| a == 0.0) {
        let varying: Vec<usize> = (0..pp).filter(|&j| col_norm_sq[j] >= 1e-12).collect();
        gram_cholesky(&xc.select_columns(&varying), 0.0)?;
    }

    let mut beta = DVector::<f64>::zeros(pp);
    let mut resid = yc.clone();
    let mut path = Vec::with_capacity(alphas.len());

    for &alpha in alphas {
        let l1 = alpha * config.l1_ratio * nn as f64;
        let l2 = alpha * (1.0 - config.l1_ratio) * nn as f64;

        let mut converged = false;

        for _iter in 0..config.max_iter {
            let mut max_change = 0_f64;
            let mut max_beta = 0_f64;

            for j in 0..pp {
                if col_norm_sq[j] < 1e-12 {
                    continue;
                }
                let x_j = xc.column(j);
                let old = beta[j];

                // ρ_j = x_jᵀ (r + x_j β_j)
                let rho = x_j.dot(&resid) + col_norm_sq[j] * old;
                let new = soft_threshold(rho, l1) / (col_norm_sq[j] + l2);

                if new != old {
                    resid.axpy(old - new, &x_j, 1.0);
                    beta[j] = new;
                }

                max_change = max_change.max((new - old).abs());
                max_beta = max_beta.max(new.abs());
            }

            if max_beta == 0.0 || max_change / max_beta < config.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            log::warn!(
                "elastic net did not converge in {} iterations (alpha = {})",
                config.max_iter,
                alpha
            );
        }

        if beta.iter().any(|b| !b.is_finite()) {
            return Err(MungError::DegenerateFit(format!(
                "non-finite elastic-net coefficients at alpha = {}",
                alpha
            )));
        }

        let intercept = y_mean - x_mean.dot(&beta);
        path.push(LinearFit {
            coef: beta.clone(),
            intercept,
        });
    }

    Ok(path)
}

/// Log-spaced penalty grid from the smallest α that zeroes all
/// coefficients down to `eps` times that value, in decreasing order
pub fn alpha_grid(
    xx: &DMatrix<f64>,
    yy: &DVector<f64>,
    l1_ratio: f64,
    n_alphas: usize,
    eps: f64,
    fit_intercept: bool,
) -> Vec<f64> {
    let nn = xx.nrows().max(1) as f64;
    let (xc, yc) = if fit_intercept {
        let (xc, yc, _, _) = centre_xy(xx, yy);
        (xc, yc)
    } else {
        (xx.clone(), yy.clone())
    };

    // a pure ridge path has no zeroing α; borrow a small L1 share
    let l1_ratio = l1_ratio.max(1e-3);

    let xty = xc.tr_mul(&yc);
    let alpha_max = xty.iter().fold(0_f64, |a, &v| a.max(v.abs())) / (nn * l1_ratio);

    if !(alpha_max > f64::EPSILON) || n_alphas < 2 {
        return vec![alpha_max.max(f64::EPSILON); n_alphas.max(1)];
    }

    let log_max = alpha_max.ln();
    let log_min = (alpha_max * eps).ln();
    let step = (log_max - log_min) / (n_alphas - 1) as f64;
    (0..n_alphas)
        .map(|k| (log_max - step * k as f64).exp())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn toy() -> (DMatrix<f64>, DVector<f64>) {
        let xx = DMatrix::from_fn(30, 3, |i, j| ((i * 7 + j * 13) % 11) as f64 - 5.0);
        let yy = DVector::from_fn(30, |i, _| 1.0 + 2.0 * xx[(i, 0)] - 1.0 * xx[(i, 2)]);
        (xx, yy)
    }

    #[test]
    fn tiny_penalty_recovers_ols() -> anyhow::Result<()> {
        let (xx, yy) = toy();
        let config = ElasticNetConfig {
            alpha: 1e-8,
            tol: 1e-10,
            max_iter: 100_000,
            ..Default::default()
        };
        let fit = fit_elastic_net(&xx, &yy, &config)?;
        assert_abs_diff_eq!(fit.coef[0], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.coef[1], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.coef[2], -1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.intercept, 1.0, epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn lasso_single_feature_matches_soft_threshold() -> anyhow::Result<()> {
        // x centred with ‖x‖² = n; β = S(xᵀy / n, α)
        let xx = DMatrix::from_column_slice(4, 1, &[1.0, -1.0, 1.0, -1.0]);
        let yy = DVector::from_vec(vec![3.0, -1.0, 2.0, -2.0]);
        let config = ElasticNetConfig {
            alpha: 0.5,
            l1_ratio: 1.0,
            ..Default::default()
        };
        let fit = fit_elastic_net(&xx, &yy, &config)?;
        // xᵀ(y − ȳ) / n = (3 + 1 + 2 + 2) / 4 = 2
        assert_abs_diff_eq!(fit.coef[0], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept, 0.5, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn alpha_max_zeroes_everything() -> anyhow::Result<()> {
        let (xx, yy) = toy();
        let grid = alpha_grid(&xx, &yy, 0.5, 10, 1e-3, true);
        assert_eq!(grid.len(), 10);
        assert!(grid.windows(2).all(|w| w[0] > w[1]));
        assert_abs_diff_eq!(grid[9] / grid[0], 1e-3, epsilon = 1e-12);

        let config = ElasticNetConfig {
            alpha: grid[0] * 1.0001,
            ..Default::default()
        };
        let fit = fit_elastic_net(&xx, &yy, &config)?;
        assert!(fit.coef.iter().all(|&b| b == 0.0));
        Ok(())
    }

    #[test]
    fn unpenalized_duplicate_columns_are_degenerate() -> anyhow::Result<()> {
        let xx = DMatrix::from_fn(10, 2, |i, _| i as f64);
        let yy = DVector::from_fn(10, |i, _| 3.0 * i as f64 + 1.0);
        let config = ElasticNetConfig {
            alpha: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            fit_elastic_net(&xx, &yy, &config),
            Err(MungError::DegenerateFit(_))
        ));

        // a penalty makes the split between the copies unique
        let fit = fit_elastic_net(&xx, &yy, &ElasticNetConfig::default())?;
        assert!(fit.coef.iter().all(|b| b.is_finite()));

        // a constant column does not make the design singular
        let xx = DMatrix::from_fn(10, 2, |i, j| if j == 0 { i as f64 } else { 2.0 });
        let fit = fit_elastic_net(&xx, &yy, &config)?;
        assert_abs_diff_eq!(fit.coef[0], 3.0, epsilon = 1e-3);
        assert_eq!(fit.coef[1], 0.0);
        Ok(())
    }

    #[test]
    fn unconverged_fit_is_still_returned() -> anyhow::Result<()> {
        let (xx, yy) = toy();
        let config = ElasticNetConfig {
            alpha: 1e-6,
            max_iter: 1,
            tol: 0.0,
            ..Default::default()
        };
        let fit = fit_elastic_net(&xx, &yy, &config)?;
        assert!(fit.coef.iter().all(|b| b.is_finite()));
        Ok(())
    }

    #[test]
    fn invalid_mixing_is_rejected() {
        let (xx, yy) = toy();
        let config = ElasticNetConfig {
            l1_ratio: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            fit_elastic_net(&xx, &yy, &config),
            Err(MungError::InvalidConfig(_))
        ));
    }
}
