use super::align::AlignedData;
use super::folds::{CvScheme, Fold, FoldGenerator, ShuffleSplit};
use crate::error::{MungError, Result};
use crate::regression::*;

use indicatif::ParallelProgressIterator;
use log::{debug, info, warn};
use matrix_util::dmatrix_io::NamedMatrix;
use matrix_util::dmatrix_stat::median_finite;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Penalty selection by shuffle-split within each outer train
/// partition
#[derive(Debug, Clone)]
pub struct InnerCvConfig {
    pub n_splits: usize,
    pub test_fraction: f64,
    /// size of the log-spaced α grid
    pub n_alphas: usize,
    /// α_min / α_max
    pub eps: f64,
    pub seed: u64,
}

impl Default for InnerCvConfig {
    fn default() -> Self {
        Self {
            n_splits: 10,
            test_fraction: 0.2,
            n_alphas: 100,
            eps: 1e-3,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CvConfig {
    pub model: ElasticNetConfig,
    /// divide features by their train standard deviation (they are
    /// always centred)
    pub scale_features: bool,
    /// divide the response by its train standard deviation
    pub scale_response: bool,
    /// choose α per fold instead of using `model.alpha`
    pub inner_cv: Option<InnerCvConfig>,
    /// folds with fewer usable train samples are skipped
    pub min_train_samples: usize,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            model: ElasticNetConfig::default(),
            scale_features: true,
            scale_response: false,
            inner_cv: None,
            min_train_samples: 2,
        }
    }
}

impl CvConfig {
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        if let Some(inner) = &self.inner_cv {
            self.inner_splitter(inner).validate()?;
            if inner.n_alphas == 0 {
                return Err(MungError::InvalidConfig(
                    "the α grid needs at least one value".into(),
                ));
            }
            if !(inner.eps > 0.0 && inner.eps < 1.0) {
                return Err(MungError::InvalidConfig(format!(
                    "α grid ratio must be within (0, 1), got {}",
                    inner.eps
                )));
            }
        }
        Ok(())
    }

    fn inner_splitter(&self, inner: &InnerCvConfig) -> ShuffleSplit {
        ShuffleSplit {
            n_splits: inner.n_splits,
            test_fraction: inner.test_fraction,
            seed: inner.seed,
        }
    }
}

/// One held-out prediction
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub sample: Box<str>,
    pub response: Box<str>,
    pub fold: usize,
    pub predicted: f64,
    /// `NaN` where the response was not measured
    pub measured: f64,
}

/// One fitted coefficient, on the (standardized) scale the model was
/// fit on
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRecord {
    pub feature: Box<str>,
    pub response: Box<str>,
    pub fold: usize,
    pub coef: f64,
}

/// Median coefficient of a (response, feature) pair across folds
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub response: Box<str>,
    pub feature: Box<str>,
    pub coef: f64,
    pub coef_abs: f64,
}

#[derive(Debug, Clone)]
pub struct CvOutput {
    pub samples: Vec<Box<str>>,
    pub responses: Vec<Box<str>>,
    pub num_folds: usize,
    /// sorted by (response, fold, sample) in input order
    pub predictions: Vec<PredictionRecord>,
    /// sorted by (response, fold, feature) in input order
    pub coefficients: Vec<CoefficientRecord>,
    /// (fold, response) units without enough train samples
    pub skipped_folds: usize,
}

impl CvOutput {
    /// Per-(response, feature) median over folds, strongest first
    pub fn median_coefficients(&self) -> Vec<InteractionRecord> {
        let mut groups: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
        for rec in &self.coefficients {
            groups
                .entry((rec.response.as_ref(), rec.feature.as_ref()))
                .or_default()
                .push(rec.coef);
        }

        let mut ret: Vec<InteractionRecord> = groups
            .into_iter()
            .map(|((response, feature), coefs)| {
                let coef = median_finite(coefs.into_iter());
                InteractionRecord {
                    response: response.into(),
                    feature: feature.into(),
                    coef,
                    coef_abs: coef.abs(),
                }
            })
            .collect();

        // stable: ties keep (response, feature) order; NaN goes last
        ret.sort_by(|a, b| {
            let ka = if a.coef_abs.is_finite() { a.coef_abs } else { f64::NEG_INFINITY };
            let kb = if b.coef_abs.is_finite() { b.coef_abs } else { f64::NEG_INFINITY };
            kb.total_cmp(&ka)
        });
        ret
    }

    /// samples × responses table of held-out predictions; a cell
    /// predicted in several folds holds their mean and a cell never
    /// held out is `NaN`
    pub fn predictions_matrix(&self) -> NamedMatrix {
        let sample_index: BTreeMap<&str, usize> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_ref(), i))
            .collect();
        let response_index: BTreeMap<&str, usize> = self
            .responses
            .iter()
            .enumerate()
            .map(|(j, r)| (r.as_ref(), j))
            .collect();

        let nn = self.samples.len();
        let mm = self.responses.len();
        let mut sum = DMatrix::<f64>::zeros(nn, mm);
        let mut cnt = DMatrix::<f64>::zeros(nn, mm);

        for rec in &self.predictions {
            if let (Some(&i), Some(&j)) = (
                sample_index.get(rec.sample.as_ref()),
                response_index.get(rec.response.as_ref()),
            ) {
                sum[(i, j)] += rec.predicted;
                cnt[(i, j)] += 1.0;
            }
        }

        let mat = sum.zip_map(&cnt, |s, c| if c > 0.0 { s / c } else { f64::NAN });

        NamedMatrix {
            rows: self.samples.clone(),
            cols: self.responses.clone(),
            mat,
        }
    }
}

enum UnitOutcome {
    Fitted {
        predicted: DVector<f64>,
        coef: DVector<f64>,
    },
    Skipped,
}

/// Pick α from a log-spaced grid by the smallest mean squared error
/// over inner shuffle-split resamples of the train partition
fn select_alpha(
    xx: &DMatrix<f64>,
    yy: &DVector<f64>,
    model: &ElasticNetConfig,
    splitter: &ShuffleSplit,
    inner: &InnerCvConfig,
) -> Result<f64> {
    let alphas = alpha_grid(
        xx,
        yy,
        model.l1_ratio,
        inner.n_alphas,
        inner.eps,
        model.fit_intercept,
    );

    let mut mse = vec![0_f64; alphas.len()];
    for fold in splitter.split(xx.nrows())? {
        let x_tr = xx.select_rows(&fold.train);
        let y_tr = yy.select_rows(&fold.train);
        let x_te = xx.select_rows(&fold.test);
        let y_te = yy.select_rows(&fold.test);

        let path = fit_elastic_net_path(&x_tr, &y_tr, &alphas, model)?;
        for (k, fit) in path.iter().enumerate() {
            mse[k] += (fit.predict(&x_te) - &y_te).norm_squared() / y_te.len() as f64;
        }
    }

    // first minimum; the grid runs from the largest α down
    let best = mse
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(kb, eb), (k, &e)| {
            if e < eb {
                (k, e)
            } else {
                (kb, eb)
            }
        })
        .0;

    debug!("selected α = {:.3e} ({} of {})", alphas[best], best + 1, alphas.len());
    Ok(alphas[best])
}

fn fit_unit(
    data: &AlignedData,
    fold: &Fold,
    fold_index: usize,
    response: usize,
    config: &CvConfig,
) -> Result<UnitOutcome> {
    let y_col = data.y.column(response);

    let train: Vec<usize> = fold
        .train
        .iter()
        .copied()
        .filter(|&i| y_col[i].is_finite())
        .collect();

    if train.len() < config.min_train_samples.max(1) {
        warn!(
            "{} fold {}: {} usable train samples, skipped",
            data.responses[response],
            fold_index,
            train.len()
        );
        return Ok(UnitOutcome::Skipped);
    }

    let pp = data.num_features();
    if config.model.alpha == 0.0 && config.inner_cv.is_none() && train.len() < pp + 1 {
        return Err(MungError::DegenerateFit(format!(
            "{} train samples for {} features without penalty",
            train.len(),
            pp
        )));
    }

    let x_train = data.x.select_rows(&train);
    let y_train = DVector::from_iterator(train.len(), train.iter().map(|&i| y_col[i]));
    let x_test = data.x.select_rows(&fold.test);

    let feat_scaler = Standardizer::fit(&x_train, config.scale_features);
    let resp_scaler = ResponseScaler::fit(&y_train, config.scale_response);
    let xs_train = feat_scaler.transform(&x_train);
    let ys_train = resp_scaler.transform(&y_train);

    let model = match &config.inner_cv {
        Some(inner) => {
            let splitter = config.inner_splitter(inner);
            match select_alpha(&xs_train, &ys_train, &config.model, &splitter, inner) {
                Ok(alpha) => ElasticNetConfig {
                    alpha,
                    ..config.model.clone()
                },
                Err(e) if e.is_insufficient_data() => {
                    warn!(
                        "{} fold {}: {}, skipped",
                        data.responses[response], fold_index, e
                    );
                    return Ok(UnitOutcome::Skipped);
                }
                Err(e) => return Err(e),
            }
        }
        None => config.model.clone(),
    };

    let fit = match fit_elastic_net(&xs_train, &ys_train, &model) {
        Ok(fit) => fit,
        Err(e) if e.is_insufficient_data() => {
            warn!(
                "{} fold {}: {}, skipped",
                data.responses[response], fold_index, e
            );
            return Ok(UnitOutcome::Skipped);
        }
        Err(e) => return Err(e),
    };

    let predicted = resp_scaler.inverse(&fit.predict(&feat_scaler.transform(&x_test)));

    Ok(UnitOutcome::Fitted {
        predicted,
        coef: fit.coef,
    })
}

/// Fit one elastic-net model per (fold, response) on the train
/// partition and predict the held-out samples
///
/// * `data` - aligned features and responses
/// * `scheme` - how samples are held out
/// * `config` - model and preprocessing
pub fn cv_predict(data: &AlignedData, scheme: &CvScheme, config: &CvConfig) -> Result<CvOutput> {
    config.validate()?;

    // too few samples to hold any out leaves every response unscored
    let folds = match scheme.folds(&data.samples) {
        Ok(folds) => folds,
        Err(e) if e.is_insufficient_data() => {
            warn!("{}: {}", scheme, e);
            vec![]
        }
        Err(e) => return Err(e),
    };
    if folds.is_empty() {
        warn!("{} produced no fold; nothing is predicted", scheme);
        return Ok(CvOutput {
            samples: data.samples.clone(),
            responses: data.responses.clone(),
            num_folds: 0,
            predictions: vec![],
            coefficients: vec![],
            skipped_folds: 0,
        });
    }

    let units: Vec<(usize, usize)> = (0..data.num_responses())
        .flat_map(|r| (0..folds.len()).map(move |f| (r, f)))
        .collect();

    info!(
        "{}: {} folds x {} responses, {} samples, {} features",
        scheme,
        folds.len(),
        data.num_responses(),
        data.num_samples(),
        data.num_features()
    );

    let outcomes = units
        .par_iter()
        .progress_count(units.len() as u64)
        .map(|&(r, f)| fit_unit(data, &folds[f], f, r, config))
        .collect::<Result<Vec<_>>>()?;

    // single writer: units are in (response, fold) order and test
    // indices ascend within a fold
    let mut predictions = vec![];
    let mut coefficients = vec![];
    let mut skipped_folds = 0;

    for (&(r, f), outcome) in units.iter().zip(outcomes) {
        match outcome {
            UnitOutcome::Fitted { predicted, coef } => {
                let response = &data.responses[r];
                for (k, &i) in folds[f].test.iter().enumerate() {
                    predictions.push(PredictionRecord {
                        sample: data.samples[i].clone(),
                        response: response.clone(),
                        fold: f,
                        predicted: predicted[k],
                        measured: data.y[(i, r)],
                    });
                }
                for (j, &c) in coef.iter().enumerate() {
                    coefficients.push(CoefficientRecord {
                        feature: data.features[j].clone(),
                        response: response.clone(),
                        fold: f,
                        coef: c,
                    });
                }
            }
            UnitOutcome::Skipped => skipped_folds += 1,
        }
    }

    if skipped_folds > 0 {
        warn!("skipped {} of {} fold x response units", skipped_folds, units.len());
    }
    info!("{} held-out predictions", predictions.len());

    Ok(CvOutput {
        samples: data.samples.clone(),
        responses: data.responses.clone(),
        num_folds: folds.len(),
        predictions,
        coefficients,
        skipped_folds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::folds::LeaveGroupOut;
    use approx::assert_abs_diff_eq;
    use std::collections::HashSet;

    fn names(prefix: &str, n: usize) -> Vec<Box<str>> {
        (0..n).map(|i| format!("{}{}", prefix, i).into_boxed_str()).collect()
    }

    fn linear_data(nn: usize) -> AlignedData {
        let x = DMatrix::from_fn(nn, 2, |i, j| ((i * 5 + j * 3) % 7) as f64 + 0.1 * i as f64);
        let y = DMatrix::from_fn(nn, 2, |i, r| {
            if r == 0 {
                2.0 * x[(i, 0)] - x[(i, 1)] + 1.0
            } else {
                x[(i, 1)]
            }
        });
        AlignedData {
            samples: names("s", nn),
            features: names("K", 2),
            responses: names("m", 2),
            x,
            y,
        }
    }

    #[test]
    fn leave_one_out_predicts_each_sample_once() -> anyhow::Result<()> {
        let data = linear_data(12);
        let config = CvConfig {
            model: ElasticNetConfig {
                alpha: 1e-4,
                ..Default::default()
            },
            ..Default::default()
        };
        let out = cv_predict(&data, &CvScheme::LeaveOneOut, &config)?;

        assert_eq!(out.skipped_folds, 0);
        assert_eq!(out.predictions.len(), 12 * 2);
        for r in data.responses.iter() {
            let seen: HashSet<_> = out
                .predictions
                .iter()
                .filter(|p| &p.response == r)
                .map(|p| p.sample.clone())
                .collect();
            assert_eq!(seen.len(), 12);
        }

        for p in &out.predictions {
            assert_abs_diff_eq!(p.predicted, p.measured, epsilon = 0.05);
        }

        let mat = out.predictions_matrix();
        assert_eq!(mat.mat.shape(), (12, 2));
        assert!(mat.mat.iter().all(|x| x.is_finite()));
        Ok(())
    }

    #[test]
    fn median_coefficients_rank_by_magnitude() -> anyhow::Result<()> {
        let data = linear_data(15);
        let out = cv_predict(&data, &CvScheme::LeaveOneOut, &CvConfig::default())?;
        let inter = out.median_coefficients();
        assert_eq!(inter.len(), 4);
        for w in inter.windows(2) {
            assert!(w[0].coef_abs >= w[1].coef_abs);
        }
        // m0 depends on both features, m1 on K1 only
        let m1_k0 = inter
            .iter()
            .find(|x| x.response.as_ref() == "m1" && x.feature.as_ref() == "K0")
            .map(|x| x.coef_abs)
            .unwrap_or(f64::NAN);
        assert!(m1_k0 < 0.1);
        Ok(())
    }

    #[test]
    fn short_train_partitions_are_skipped() -> anyhow::Result<()> {
        let mut data = linear_data(6);
        // m1 measured in two samples only
        for i in 2..6 {
            data.y[(i, 1)] = f64::NAN;
        }
        let scheme = CvScheme::LeaveGroupOut(LeaveGroupOut {
            groups: vec!["s0".into(), "s1".into(), "s2".into()],
        });
        let out = cv_predict(&data, &scheme, &CvConfig::default())?;

        // m1 folds holding out s0 or s1 keep a single usable train sample
        assert_eq!(out.skipped_folds, 2);
        assert_eq!(
            out.predictions
                .iter()
                .filter(|p| p.response.as_ref() == "m1")
                .count(),
            1
        );
        assert!(out
            .coefficients
            .iter()
            .all(|c| !(c.response.as_ref() == "m1" && c.fold < 2)));
        Ok(())
    }

    #[test]
    fn unpenalized_underdetermined_fit_is_fatal() {
        let data = linear_data(3);
        let config = CvConfig {
            model: ElasticNetConfig {
                alpha: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            cv_predict(&data, &CvScheme::LeaveOneOut, &config),
            Err(MungError::DegenerateFit(_))
        ));
    }

    #[test]
    fn unpenalized_rank_deficient_fit_is_fatal() {
        let mut data = linear_data(10);
        // K1 duplicates K0; 10 samples exceed 2 features + 1
        for i in 0..10 {
            data.x[(i, 1)] = data.x[(i, 0)];
        }
        let config = CvConfig {
            model: ElasticNetConfig {
                alpha: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            cv_predict(&data, &CvScheme::LeaveOneOut, &config),
            Err(MungError::DegenerateFit(_))
        ));
    }

    #[test]
    fn single_sample_leaves_responses_unscored() -> anyhow::Result<()> {
        let data = AlignedData {
            samples: names("s", 1),
            features: names("K", 1),
            responses: names("m", 2),
            x: DMatrix::from_element(1, 1, 1.0),
            y: DMatrix::from_element(1, 2, 2.0),
        };
        let out = cv_predict(&data, &CvScheme::LeaveOneOut, &CvConfig::default())?;
        assert_eq!(out.num_folds, 0);
        assert!(out.predictions.is_empty());
        assert!(out.coefficients.is_empty());

        let scores = crate::scoring::score_by_response(&out)?;
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|r| r.score.is_none()));
        Ok(())
    }

    #[test]
    fn inner_cv_is_reproducible() -> anyhow::Result<()> {
        let data = linear_data(20);
        let scheme = CvScheme::ShuffleSplit(ShuffleSplit {
            n_splits: 4,
            test_fraction: 0.25,
            seed: 3,
        });
        let config = CvConfig {
            inner_cv: Some(InnerCvConfig {
                n_splits: 3,
                n_alphas: 20,
                ..Default::default()
            }),
            ..Default::default()
        };
        let a = cv_predict(&data, &scheme, &config)?;
        let b = cv_predict(&data, &scheme, &config)?;
        assert_eq!(a.predictions, b.predictions);
        assert_eq!(a.predictions.len(), 4 * 5 * 2);
        Ok(())
    }
}
