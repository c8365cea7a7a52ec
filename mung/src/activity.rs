//! Regulator (kinase / transcription factor) activity inference.
//!
//! For one sample, the measured changes of all substrates/targets
//! are regressed on a design matrix of signed regulator → target
//! weights (targets × regulators). A single ridge fit gives one
//! coefficient per regulator, its activity score.

use crate::error::{MungError, Result};
use crate::regression::fit_ridge;
use log::{debug, info};
use matrix_util::dmatrix_io::NamedMatrix;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// regulator -> (target -> signed weight)
///
/// A positive weight marks an activating influence, a negative
/// weight an inhibiting one.
#[derive(Debug, Clone)]
pub struct TargetWeights {
    regulators: BTreeMap<Box<str>, BTreeMap<Box<str>, f64>>,
}

impl TargetWeights {
    /// Regulators without any non-zero, finite weight are dropped.
    /// Nothing left is a data error.
    pub fn new(regulators: BTreeMap<Box<str>, BTreeMap<Box<str>, f64>>) -> Result<Self> {
        let regulators: BTreeMap<_, _> = regulators
            .into_iter()
            .map(|(reg, targets)| {
                let targets: BTreeMap<_, _> = targets
                    .into_iter()
                    .filter(|(_, w)| w.is_finite() && *w != 0.0)
                    .collect();
                (reg, targets)
            })
            .filter(|(_, targets)| !targets.is_empty())
            .collect();

        if regulators.is_empty() {
            return Err(MungError::EmptyWeights);
        }
        Ok(Self { regulators })
    }

    /// Build from `(regulator, target, weight)` triplets; repeated
    /// pairs keep the last weight
    pub fn from_triplets<R, T>(triplets: impl IntoIterator<Item = (R, T, f64)>) -> Result<Self>
    where
        R: Into<Box<str>>,
        T: Into<Box<str>>,
    {
        let mut regulators: BTreeMap<Box<str>, BTreeMap<Box<str>, f64>> = BTreeMap::new();
        for (r, t, w) in triplets {
            regulators.entry(r.into()).or_default().insert(t.into(), w);
        }
        Self::new(regulators)
    }

    pub fn num_regulators(&self) -> usize {
        self.regulators.len()
    }

    /// Regulator names in sorted order
    pub fn regulators(&self) -> impl Iterator<Item = &str> {
        self.regulators.keys().map(|r| r.as_ref())
    }

    pub fn targets_of(&self, regulator: &str) -> Option<&BTreeMap<Box<str>, f64>> {
        self.regulators.get(regulator)
    }

    /// All targets of any regulator
    pub fn all_targets(&self) -> BTreeSet<&str> {
        self.regulators
            .values()
            .flat_map(|t| t.keys().map(|k| k.as_ref()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ActivityConfig {
    /// ridge penalty of the per-sample fit
    pub alpha: f64,
    /// regulators with fewer measured targets get a missing score
    pub min_targets: usize,
    pub fit_intercept: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            min_targets: 2,
            fit_intercept: true,
        }
    }
}

/// One activity score per regulator; `NaN` marks "no evidence"
#[derive(Debug, Clone)]
pub struct ActivityVector {
    pub regulators: Vec<Box<str>>,
    pub scores: Vec<f64>,
}

impl ActivityVector {
    /// Finite score of `regulator`
    pub fn get(&self, regulator: &str) -> Option<f64> {
        self.regulators
            .iter()
            .position(|r| r.as_ref() == regulator)
            .map(|i| self.scores[i])
            .filter(|s| s.is_finite())
    }

    fn all_missing(regulators: Vec<Box<str>>) -> Self {
        let scores = vec![f64::NAN; regulators.len()];
        Self { regulators, scores }
    }
}

pub struct ActivityEstimator {
    weights: TargetWeights,
    config: ActivityConfig,
}

impl ActivityEstimator {
    pub fn new(weights: TargetWeights, config: ActivityConfig) -> Result<Self> {
        if weights.num_regulators() == 0 {
            return Err(MungError::EmptyWeights);
        }
        if !(config.alpha >= 0.0 && config.alpha.is_finite()) {
            return Err(MungError::InvalidConfig(format!(
                "activity ridge penalty must be non-negative, got {}",
                config.alpha
            )));
        }
        Ok(Self { weights, config })
    }

    pub fn weights(&self) -> &TargetWeights {
        &self.weights
    }

    /// Estimate regulator activities of one sample
    ///
    /// * `measurement` - target -> measured value; non-finite values
    ///   count as not measured
    pub fn estimate(&self, measurement: &HashMap<&str, f64>) -> Result<ActivityVector> {
        let regulators: Vec<Box<str>> = self.weights.regulators().map(Box::from).collect();

        // inner join of weights and measured targets
        let eligible: Vec<(usize, Vec<(&str, f64)>)> = self
            .weights
            .regulators
            .values()
            .enumerate()
            .filter_map(|(k, targets)| {
                let overlap: Vec<(&str, f64)> = targets
                    .iter()
                    .filter(|(t, _)| measurement.get(t.as_ref()).is_some_and(|y| y.is_finite()))
                    .map(|(t, &w)| (t.as_ref(), w))
                    .collect();
                (overlap.len() >= self.config.min_targets.max(1)).then_some((k, overlap))
            })
            .collect();

        if eligible.is_empty() {
            return Ok(ActivityVector::all_missing(regulators));
        }

        let rows: Vec<&str> = eligible
            .iter()
            .flat_map(|(_, overlap)| overlap.iter().map(|&(t, _)| t))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // a single measured target leaves nothing to regress
        if rows.len() < 2 {
            return Ok(ActivityVector::all_missing(regulators));
        }

        let row_index: HashMap<&str, usize> =
            rows.iter().enumerate().map(|(i, &t)| (t, i)).collect();

        let mut xx = DMatrix::<f64>::zeros(rows.len(), eligible.len());
        for (col, (_, overlap)) in eligible.iter().enumerate() {
            for &(t, w) in overlap {
                xx[(row_index[t], col)] = w;
            }
        }
        let yy = DVector::from_iterator(rows.len(), rows.iter().map(|t| measurement[t]));

        let fit = fit_ridge(&xx, &yy, self.config.alpha, self.config.fit_intercept)?;

        let mut scores = vec![f64::NAN; regulators.len()];
        for (col, (k, _)) in eligible.iter().enumerate() {
            scores[*k] = fit.coef[col];
        }

        debug!(
            "{} of {} regulators scored from {} targets",
            eligible.len(),
            regulators.len(),
            rows.len()
        );

        Ok(ActivityVector { regulators, scores })
    }

    /// Estimate every sample column of a targets × samples table and
    /// assemble a regulators × samples activity table
    pub fn estimate_matrix(&self, measurements: &NamedMatrix) -> Result<NamedMatrix> {
        let ncols = measurements.cols.len();
        info!(
            "estimating activities of {} regulators over {} samples",
            self.weights.num_regulators(),
            ncols
        );

        let columns = (0..ncols)
            .into_par_iter()
            .map(|j| {
                let measurement: HashMap<&str, f64> = measurements
                    .rows
                    .iter()
                    .zip(measurements.mat.column(j).iter())
                    .map(|(t, &y)| (t.as_ref(), y))
                    .collect();
                self.estimate(&measurement)
            })
            .collect::<Result<Vec<_>>>()?;

        let regulators: Vec<Box<str>> = self.weights.regulators().map(Box::from).collect();
        let mut mat = DMatrix::<f64>::from_element(regulators.len(), ncols, f64::NAN);
        for (j, col) in columns.iter().enumerate() {
            for (i, &s) in col.scores.iter().enumerate() {
                mat[(i, j)] = s;
            }
        }

        let n_missing = mat.iter().filter(|x| !x.is_finite()).count();
        info!(
            "activity table: {} x {}, {} missing",
            regulators.len(),
            ncols,
            n_missing
        );

        Ok(NamedMatrix {
            rows: regulators,
            cols: measurements.cols.clone(),
            mat,
        })
    }
}
