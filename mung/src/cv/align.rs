use crate::error::{MungError, Result};
use crate::keyed::align_keys;
use log::{info, warn};
use matrix_util::dmatrix_io::NamedMatrix;
use nalgebra::DMatrix;
use std::collections::HashSet;

/// Feature and response matrices over the same samples, in the same
/// row order
#[derive(Debug, Clone)]
pub struct AlignedData {
    pub samples: Vec<Box<str>>,
    pub features: Vec<Box<str>>,
    pub responses: Vec<Box<str>>,
    /// samples × features, all finite
    pub x: DMatrix<f64>,
    /// samples × responses, may contain `NaN`
    pub y: DMatrix<f64>,
}

impl AlignedData {
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn num_responses(&self) -> usize {
        self.responses.len()
    }
}

fn check_unique(names: &[Box<str>], what: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(names.len());
    for k in names {
        if !seen.insert(k.as_ref()) {
            return Err(MungError::Alignment(format!("duplicate {} {}", what, k)));
        }
    }
    Ok(())
}

/// Join a samples × features table and a samples × responses table on
/// their row (sample) keys, keeping the feature table's order.
///
/// Samples with any non-finite feature are dropped.
pub fn align_samples(features: &NamedMatrix, responses: &NamedMatrix) -> Result<AlignedData> {
    check_unique(&features.rows, "sample")?;
    check_unique(&responses.rows, "sample")?;
    check_unique(&features.cols, "feature")?;
    check_unique(&responses.cols, "response")?;

    let pairs = align_keys(&features.rows, &responses.rows)?;

    let (complete, incomplete): (Vec<(usize, usize)>, Vec<(usize, usize)>) = pairs
        .into_iter()
        .partition(|&(i, _)| features.mat.row(i).iter().all(|x| x.is_finite()));

    if !incomplete.is_empty() {
        warn!(
            "dropped {} samples with missing feature values",
            incomplete.len()
        );
    }

    if complete.is_empty() {
        return Err(MungError::Alignment(
            "no shared sample has a complete feature vector".into(),
        ));
    }

    let nn = complete.len();
    let x = DMatrix::from_fn(nn, features.cols.len(), |r, c| {
        features.mat[(complete[r].0, c)]
    });
    let y = DMatrix::from_fn(nn, responses.cols.len(), |r, c| {
        responses.mat[(complete[r].1, c)]
    });
    let samples = complete
        .iter()
        .map(|&(i, _)| features.rows[i].clone())
        .collect();

    info!(
        "aligned {} samples ({} in features, {} in responses)",
        nn,
        features.rows.len(),
        responses.rows.len()
    );

    Ok(AlignedData {
        samples,
        features: features.cols.clone(),
        responses: responses.cols.clone(),
        x,
        y,
    })
}
