use crate::error::{MungError, Result};
use crate::keyed::{align_keys, KeyedVector};
use log::{info, warn};
use matrix_util::dmatrix_io::NamedMatrix;

/// Ordinary least squares line `y = a + b x`
#[derive(Debug, Clone, Copy)]
pub struct CovariateFit {
    pub intercept: f64,
    pub slope: f64,
    pub n: usize,
}

/// Fit `y = a + b x` over positions where both are finite
pub fn fit_covariate(xx: &[f64], yy: &[f64]) -> Result<CovariateFit> {
    let pairs: Vec<(f64, f64)> = xx
        .iter()
        .zip(yy.iter())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
        .collect();

    let nn = pairs.len();
    if nn < 2 {
        return Err(MungError::InsufficientData(format!(
            "{} complete covariate/response pairs",
            nn
        )));
    }

    let x_mean = pairs.iter().map(|p| p.0).sum::<f64>() / nn as f64;
    let y_mean = pairs.iter().map(|p| p.1).sum::<f64>() / nn as f64;
    let sxx = pairs.iter().map(|p| (p.0 - x_mean).powi(2)).sum::<f64>();
    let sxy = pairs
        .iter()
        .map(|p| (p.0 - x_mean) * (p.1 - y_mean))
        .sum::<f64>();

    let x_sq = pairs.iter().map(|p| p.0 * p.0).sum::<f64>();

    // relative to the covariate's own magnitude
    if !(sxx > f64::EPSILON * x_sq) {
        return Err(MungError::InsufficientData(
            "covariate has no variance".into(),
        ));
    }

    let slope = sxy / sxx;
    Ok(CovariateFit {
        intercept: y_mean - slope * x_mean,
        slope,
        n: nn,
    })
}

/// Remove the linear effect of `covariate` from `response`
///
/// Returns residuals keyed like `response`, in the same order. A
/// residual is missing where the response or the covariate is.
pub fn regress_out(covariate: &KeyedVector, response: &KeyedVector) -> Result<KeyedVector> {
    let pairs = align_keys(&response.keys, &covariate.keys)?;

    let mut xx = vec![f64::NAN; response.len()];
    for (i, j) in pairs {
        xx[i] = covariate.values[j];
    }

    let fit = fit_covariate(&xx, &response.values)?;

    let values = response
        .values
        .iter()
        .zip(xx.iter())
        .map(|(&y, &x)| {
            if y.is_finite() && x.is_finite() {
                y - (fit.intercept + fit.slope * x)
            } else {
                f64::NAN
            }
        })
        .collect();

    Ok(KeyedVector {
        keys: response.keys.clone(),
        values,
    })
}

/// Residualize each row of a features × samples table against a
/// sample-keyed covariate. Rows without enough complete pairs become
/// entirely missing.
pub fn regress_out_rows(covariate: &KeyedVector, table: &NamedMatrix) -> Result<NamedMatrix> {
    let pairs = align_keys(&table.cols, &covariate.keys)?;
    if pairs.len() < table.cols.len() {
        warn!(
            "covariate covers {} of {} samples; the rest become missing",
            pairs.len(),
            table.cols.len()
        );
    }

    let mut xx = vec![f64::NAN; table.cols.len()];
    for (i, j) in pairs {
        xx[i] = covariate.values[j];
    }

    let mut mat = table.mat.clone();
    let mut n_dropped = 0;

    for (r, mut row) in mat.row_iter_mut().enumerate() {
        let yy: Vec<f64> = row.iter().copied().collect();
        match fit_covariate(&xx, &yy) {
            Ok(fit) => {
                for (j, y) in row.iter_mut().enumerate() {
                    *y = if y.is_finite() && xx[j].is_finite() {
                        *y - (fit.intercept + fit.slope * xx[j])
                    } else {
                        f64::NAN
                    };
                }
            }
            Err(e) if e.is_insufficient_data() => {
                warn!("{}: {}", table.rows[r], e);
                row.fill(f64::NAN);
                n_dropped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "regressed out the covariate from {} rows ({} without enough data)",
        table.rows.len() - n_dropped,
        n_dropped
    );

    Ok(NamedMatrix {
        rows: table.rows.clone(),
        cols: table.cols.clone(),
        mat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn keys(n: usize) -> Vec<Box<str>> {
        (0..n).map(|i| format!("s{}", i).into_boxed_str()).collect()
    }

    #[test]
    fn residuals_have_zero_mean() -> anyhow::Result<()> {
        let nn = 50;
        let mut rng = StdRng::seed_from_u64(42);
        let noise = Normal::new(0.0, 0.1)?;

        let growth: Vec<f64> = (0..nn).map(|i| i as f64 / 10.0).collect();
        let resp: Vec<f64> = growth.iter().map(|g| 2.0 * g + noise.sample(&mut rng)).collect();

        let cov = KeyedVector::new(keys(nn), growth)?;
        let resp = KeyedVector::new(keys(nn), resp)?;
        let resid = regress_out(&cov, &resp)?;

        assert_eq!(resid.keys, resp.keys);
        let mean = resid.values.iter().sum::<f64>() / nn as f64;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-10);

        // nothing linear is left
        let refit = fit_covariate(&cov.values, &resid.values)?;
        assert_abs_diff_eq!(refit.slope, 0.0, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn variance_check_ignores_units() -> anyhow::Result<()> {
        let yy: Vec<f64> = (0..10).map(|i| 1.0 + 0.5 * i as f64).collect();

        // the same growth rates in tiny units
        let xx: Vec<f64> = (0..10).map(|i| i as f64 * 1e-9).collect();
        let fit = fit_covariate(&xx, &yy)?;
        assert_abs_diff_eq!(fit.slope * 1e-9, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.intercept, 1.0, epsilon = 1e-6);

        // a constant covariate with a large offset has no variance
        let err = fit_covariate(&[1e6; 10], &yy).unwrap_err();
        assert!(err.is_insufficient_data());
        Ok(())
    }

    #[test]
    fn missing_values_propagate() -> anyhow::Result<()> {
        let cov = KeyedVector::from_pairs([("a", 1.0), ("b", 2.0), ("c", f64::NAN), ("d", 4.0)])?;
        let resp = KeyedVector::from_pairs([
            ("d", 8.0),
            ("c", 5.0),
            ("b", 4.0),
            ("a", 2.0),
            ("e", 1.0),
        ])?;
        let resid = regress_out(&cov, &resp)?;
        assert_eq!(resid.keys, resp.keys);
        assert_abs_diff_eq!(resid.values[0], 0.0, epsilon = 1e-12);
        assert!(resid.values[1].is_nan());
        assert!(resid.values[4].is_nan());
        Ok(())
    }

    #[test]
    fn disjoint_keys_are_fatal() -> anyhow::Result<()> {
        let cov = KeyedVector::from_pairs([("a", 1.0), ("b", 2.0)])?;
        let resp = KeyedVector::from_pairs([("x", 1.0), ("y", 2.0)])?;
        assert!(matches!(
            regress_out(&cov, &resp),
            Err(MungError::Alignment(_))
        ));
        Ok(())
    }

    #[test]
    fn rows_without_data_become_missing() -> anyhow::Result<()> {
        let cov = KeyedVector::from_pairs([("s1", 1.0), ("s2", 2.0), ("s3", 3.0)])?;
        let table = NamedMatrix::new(
            vec!["k1".into(), "k2".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
            nalgebra::DMatrix::from_row_slice(
                2,
                3,
                &[1.0, 3.0, 2.0, f64::NAN, 7.0, f64::NAN],
            ),
        )?;
        let out = regress_out_rows(&cov, &table)?;
        assert_abs_diff_eq!(out.mat.row(0).sum(), 0.0, epsilon = 1e-12);
        assert!(out.mat.row(1).iter().all(|x| x.is_nan()));
        Ok(())
    }
}
