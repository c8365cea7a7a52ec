pub mod elastic_net;
pub mod ridge;
pub mod standardize;

pub use elastic_net::*;
pub use ridge::*;
pub use standardize::*;

use crate::error::{MungError, Result};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// Coefficients and intercept of a fitted linear model
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub coef: DVector<f64>,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, xx: &DMatrix<f64>) -> DVector<f64> {
        let mut yhat = xx * &self.coef;
        yhat.add_scalar_mut(self.intercept);
        yhat
    }
}

/// Centre columns of `xx` and `yy`; returns the centred copies and
/// the means so that the intercept can be recovered afterwards
pub(crate) fn centre_xy(
    xx: &DMatrix<f64>,
    yy: &DVector<f64>,
) -> (DMatrix<f64>, DVector<f64>, DVector<f64>, f64) {
    let nn = xx.nrows().max(1) as f64;
    let x_mean = DVector::from_iterator(xx.ncols(), xx.column_iter().map(|c| c.sum() / nn));
    let y_mean = yy.sum() / nn;

    let mut xc = xx.clone();
    for (j, mut col) in xc.column_iter_mut().enumerate() {
        col.add_scalar_mut(-x_mean[j]);
    }
    let yc = yy.add_scalar(-y_mean);
    (xc, yc, x_mean, y_mean)
}

/// Cholesky factor of `XᵀX + αI`. Without a penalty a numerically
/// singular system may still factorize, so it is rejected by the
/// spread of the pivots.
pub(crate) fn gram_cholesky(xc: &DMatrix<f64>, alpha: f64) -> Result<Cholesky<f64, Dyn>> {
    let pp = xc.ncols();
    let mut xtx = xc.tr_mul(xc);
    for j in 0..pp {
        xtx[(j, j)] += alpha;
    }

    let chol = xtx.cholesky().ok_or_else(|| {
        MungError::DegenerateFit(format!(
            "XᵀX + {}I is not positive definite ({} rows, {} columns)",
            alpha,
            xc.nrows(),
            pp
        ))
    })?;

    if alpha == 0.0 && pp > 0 {
        let diag = chol.l_dirty().diagonal();
        let dmax = diag.iter().cloned().fold(0_f64, f64::max);
        let dmin = diag.iter().cloned().fold(f64::INFINITY, f64::min);
        if !(dmin > dmax * 1e-8) {
            return Err(MungError::DegenerateFit(format!(
                "XᵀX is numerically singular ({} rows, {} columns)",
                xc.nrows(),
                pp
            )));
        }
    }
    Ok(chol)
}
