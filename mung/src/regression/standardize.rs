use nalgebra::{DMatrix, DVector};

/// Column-wise affine transform `(x − mean) / scale` whose statistics
/// come from one partition (train) and are reused unchanged on any
/// other partition (test).
#[derive(Debug, Clone)]
pub struct Standardizer {
    pub mean: DVector<f64>,
    pub scale: DVector<f64>,
}

impl Standardizer {
    /// * `xx` - train rows only
    /// * `unit_variance` - also divide by the (population) standard
    ///   deviation; zero-variance columns keep a scale of one
    pub fn fit(xx: &DMatrix<f64>, unit_variance: bool) -> Self {
        let nn = xx.nrows().max(1) as f64;
        let pp = xx.ncols();

        let mean = DVector::from_iterator(pp, xx.column_iter().map(|c| c.sum() / nn));

        let scale = if unit_variance {
            DVector::from_iterator(
                pp,
                xx.column_iter().enumerate().map(|(j, c)| {
                    let var = c.iter().map(|x| (x - mean[j]).powi(2)).sum::<f64>() / nn;
                    let sd = var.sqrt();
                    if sd > 1e-12 && sd.is_finite() {
                        sd
                    } else {
                        1.0
                    }
                }),
            )
        } else {
            DVector::from_element(pp, 1.0)
        };

        Self { mean, scale }
    }

    pub fn transform(&self, xx: &DMatrix<f64>) -> DMatrix<f64> {
        let mut ret = xx.clone();
        for (j, mut col) in ret.column_iter_mut().enumerate() {
            col.add_scalar_mut(-self.mean[j]);
            col /= self.scale[j];
        }
        ret
    }
}

/// Centre (and optionally scale) a response with train statistics and
/// map predictions back to the original units
#[derive(Debug, Clone, Copy)]
pub struct ResponseScaler {
    pub mean: f64,
    pub scale: f64,
}

impl ResponseScaler {
    pub fn fit(yy: &DVector<f64>, unit_variance: bool) -> Self {
        let nn = yy.len().max(1) as f64;
        let mean = yy.sum() / nn;
        let scale = if unit_variance {
            let sd = (yy.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / nn).sqrt();
            if sd > 1e-12 && sd.is_finite() {
                sd
            } else {
                1.0
            }
        } else {
            1.0
        };
        Self { mean, scale }
    }

    pub fn transform(&self, yy: &DVector<f64>) -> DVector<f64> {
        yy.map(|y| (y - self.mean) / self.scale)
    }

    pub fn inverse(&self, yy: &DVector<f64>) -> DVector<f64> {
        yy.map(|y| y * self.scale + self.mean)
    }
}
