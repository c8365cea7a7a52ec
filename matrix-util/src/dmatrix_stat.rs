use crate::traits::ColumnStatOps;
use nalgebra::DMatrix;

impl ColumnStatOps for DMatrix<f64> {
    fn count_finite_columns(&self) -> Vec<usize> {
        self.column_iter()
            .map(|col| col.iter().filter(|x| x.is_finite()).count())
            .collect()
    }
}

/// Median of the finite values (`NaN` if there are none). Even
/// counts take the midpoint of the two central values.
pub fn median_finite(xs: impl Iterator<Item = f64>) -> f64 {
    let mut finite: Vec<f64> = xs.filter(|x| x.is_finite()).collect();
    let nn = finite.len();
    if nn == 0 {
        return f64::NAN;
    }
    finite.sort_by(|a, b| a.total_cmp(b));
    if nn % 2 == 1 {
        finite[nn / 2]
    } else {
        0.5 * (finite[nn / 2 - 1] + finite[nn / 2])
    }
}
