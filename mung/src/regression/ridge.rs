use super::{centre_xy, gram_cholesky, LinearFit};
use crate::error::{MungError, Result};
use nalgebra::{DMatrix, DVector};

/// Ridge regression
///
/// Minimizes `‖y − Xβ − b‖² + α‖β‖²` with an unpenalized intercept
/// `b` when `fit_intercept` is set. The normal equations
/// `(XᵀX + αI)β = Xᵀy` are solved on centred data by Cholesky
/// decomposition.
///
/// * `xx` - n x p design matrix
/// * `yy` - n response vector
/// * `alpha` - L2 penalty, must be non-negative
///
pub fn fit_ridge(
    xx: &DMatrix<f64>,
    yy: &DVector<f64>,
    alpha: f64,
    fit_intercept: bool,
) -> Result<LinearFit> {
    if !(alpha >= 0.0) {
        return Err(MungError::InvalidConfig(format!(
            "ridge penalty must be non-negative, got {}",
            alpha
        )));
    }
    if xx.nrows() != yy.len() {
        return Err(MungError::Alignment(format!(
            "design has {} rows but the response has {} values",
            xx.nrows(),
            yy.len()
        )));
    }

    let (xc, yc, x_mean, y_mean) = if fit_intercept {
        centre_xy(xx, yy)
    } else {
        (xx.clone(), yy.clone(), DVector::zeros(xx.ncols()), 0.0)
    };

    let chol = gram_cholesky(&xc, alpha)?;
    let xty = xc.tr_mul(&yc);

    let coef = chol.solve(&xty);

    if coef.iter().any(|b| !b.is_finite()) {
        return Err(MungError::DegenerateFit(
            "non-finite ridge coefficients".to_string(),
        ));
    }

    let intercept = y_mean - x_mean.dot(&coef);
    Ok(LinearFit { coef, intercept })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn single_column_closed_form() -> anyhow::Result<()> {
        // centred x = [1, -1], centred y = [0.5, -0.5]
        let xx = DMatrix::from_column_slice(2, 1, &[1.0, -1.0]);
        let yy = DVector::from_vec(vec![2.0, 1.0]);
        let fit = fit_ridge(&xx, &yy, 0.1, true)?;
        assert_abs_diff_eq!(fit.coef[0], 1.0 / 2.1, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.intercept, 1.5, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn recovers_ols_with_tiny_penalty() -> anyhow::Result<()> {
        let xx = DMatrix::from_fn(20, 2, |i, j| ((i * (j + 2)) % 7) as f64 + 0.1 * i as f64);
        let yy = DVector::from_fn(20, |i, _| 3.0 + 2.0 * xx[(i, 0)] - 0.5 * xx[(i, 1)]);
        let fit = fit_ridge(&xx, &yy, 1e-10, true)?;
        assert_abs_diff_eq!(fit.coef[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.coef[1], -0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.intercept, 3.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn collinear_without_penalty_is_degenerate() {
        let xx = DMatrix::from_fn(5, 2, |i, _| i as f64);
        let yy = DVector::from_fn(5, |i, _| i as f64);
        let err = fit_ridge(&xx, &yy, 0.0, true).unwrap_err();
        assert!(matches!(err, MungError::DegenerateFit(_)));

        // the same design is fine once penalized
        assert!(fit_ridge(&xx, &yy, 0.1, true).is_ok());
    }
}
