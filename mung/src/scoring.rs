//! Agreement between measured and predicted values.

use crate::cv::CvOutput;
use crate::error::{MungError, Result};
use crate::keyed::{align_keys, KeyedVector};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    /// Pearson correlation; `None` for a constant prediction
    pub correlation: Option<f64>,
    /// two-sided, Student's t with `n − 2` degrees of freedom
    pub p_value: Option<f64>,
    /// `1 − SS_res / SS_tot`; negative when worse than the mean
    pub r_squared: f64,
    /// number of complete pairs
    pub n: usize,
}

/// Score `predicted` against `measured` over positions where both are
/// finite. Measurements without variance leave nothing to explain and
/// are `InsufficientData`; a constant prediction still has an R² but no
/// correlation.
pub fn score(measured: &[f64], predicted: &[f64]) -> Result<Score> {
    if measured.len() != predicted.len() {
        return Err(MungError::Alignment(format!(
            "{} measured vs. {} predicted values",
            measured.len(),
            predicted.len()
        )));
    }

    let pairs: Vec<(f64, f64)> = measured
        .iter()
        .zip(predicted.iter())
        .filter(|(y, yhat)| y.is_finite() && yhat.is_finite())
        .map(|(&y, &yhat)| (y, yhat))
        .collect();

    let nn = pairs.len();
    if nn < 3 {
        return Err(MungError::InsufficientData(format!(
            "{} complete pairs to score",
            nn
        )));
    }

    let n = nn as f64;
    let y_mean = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let yhat_mean = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut syy = 0.0;
    let mut shh = 0.0;
    let mut syh = 0.0;
    let mut ss_res = 0.0;
    let mut y_sq = 0.0;
    let mut yhat_sq = 0.0;
    for &(y, yhat) in &pairs {
        let dy = y - y_mean;
        let dh = yhat - yhat_mean;
        syy += dy * dy;
        shh += dh * dh;
        syh += dy * dh;
        ss_res += (y - yhat) * (y - yhat);
        y_sq += y * y;
        yhat_sq += yhat * yhat;
    }

    if !(syy > f64::EPSILON * y_sq) {
        return Err(MungError::InsufficientData(
            "constant measurements; R² is undefined".into(),
        ));
    }

    let (correlation, p_value) = if shh > f64::EPSILON * yhat_sq {
        let r = (syh / (syy.sqrt() * shh.sqrt())).clamp(-1.0, 1.0);
        (Some(r), Some(t_test_p_value(r, n)?))
    } else {
        (None, None)
    };

    Ok(Score {
        correlation,
        p_value,
        r_squared: 1.0 - ss_res / syy,
        n: nn,
    })
}

/// Two-sided p-value of a Pearson correlation over `n` pairs
fn t_test_p_value(r: f64, n: f64) -> Result<f64> {
    if 1.0 - r.abs() < 1e-12 {
        return Ok(0.0);
    }
    let df = n - 2.0;
    let t = r * (df / (1.0 - r * r)).sqrt();
    let t_dist =
        StudentsT::new(0.0, 1.0, df).map_err(|e| MungError::InsufficientData(e.to_string()))?;
    Ok((2.0 * t_dist.sf(t.abs())).min(1.0))
}

/// Coefficient of determination over finite pairs. Unlike the
/// correlation it stays defined for a constant prediction; predicting
/// the measured mean gives zero.
pub fn r_squared(measured: &[f64], predicted: &[f64]) -> Result<f64> {
    let pairs: Vec<(f64, f64)> = measured
        .iter()
        .zip(predicted.iter())
        .filter(|(y, yhat)| y.is_finite() && yhat.is_finite())
        .map(|(&y, &yhat)| (y, yhat))
        .collect();

    if pairs.len() < 2 {
        return Err(MungError::InsufficientData(format!(
            "{} complete pairs for R²",
            pairs.len()
        )));
    }

    let y_mean = pairs.iter().map(|p| p.0).sum::<f64>() / pairs.len() as f64;
    let ss_tot = pairs.iter().map(|p| (p.0 - y_mean).powi(2)).sum::<f64>();
    let ss_res = pairs.iter().map(|p| (p.0 - p.1).powi(2)).sum::<f64>();
    let y_sq = pairs.iter().map(|p| p.0 * p.0).sum::<f64>();

    if !(ss_tot > f64::EPSILON * y_sq) {
        return Err(MungError::InsufficientData(
            "constant measurements; R² is undefined".into(),
        ));
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Join two keyed vectors before scoring
pub fn score_keyed(measured: &KeyedVector, predicted: &KeyedVector) -> Result<Score> {
    let pairs = align_keys(&measured.keys, &predicted.keys)?;
    let (yy, yhat): (Vec<f64>, Vec<f64>) = pairs
        .into_iter()
        .map(|(i, j)| (measured.values[i], predicted.values[j]))
        .unzip();
    score(&yy, &yhat)
}

/// Which axis varies while the other is fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrType {
    /// one response, across samples
    Responses,
    /// one sample, across responses
    Samples,
}

impl std::fmt::Display for CorrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrType::Responses => write!(f, "responses"),
            CorrType::Samples => write!(f, "samples"),
        }
    }
}

/// Score of one response or one sample; `None` when there was not
/// enough data
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub variable: Box<str>,
    pub corr_type: CorrType,
    pub score: Option<Score>,
}

fn score_groups<'a>(
    order: &'a [Box<str>],
    corr_type: CorrType,
    key_of: impl Fn(&'a crate::cv::PredictionRecord) -> &'a str,
    output: &'a CvOutput,
) -> Result<Vec<ScoreRecord>> {
    let mut groups: HashMap<&str, (Vec<f64>, Vec<f64>)> = HashMap::new();
    for rec in &output.predictions {
        let (yy, yhat) = groups.entry(key_of(rec)).or_default();
        yy.push(rec.measured);
        yhat.push(rec.predicted);
    }

    order
        .iter()
        .map(|variable| {
            let result = match groups.get(variable.as_ref()) {
                Some((yy, yhat)) => match score(yy, yhat) {
                    Ok(s) => Some(s),
                    Err(e) if e.is_insufficient_data() => {
                        log::debug!("{} {}: {}", corr_type, variable, e);
                        None
                    }
                    Err(e) => return Err(e),
                },
                None => None,
            };
            Ok(ScoreRecord {
                variable: variable.clone(),
                corr_type,
                score: result,
            })
        })
        .collect()
}

/// One score per response over all of its held-out predictions
pub fn score_by_response(output: &CvOutput) -> Result<Vec<ScoreRecord>> {
    score_groups(
        &output.responses,
        CorrType::Responses,
        |rec| rec.response.as_ref(),
        output,
    )
}

/// One score per sample over all responses predicted for it
pub fn score_by_sample(output: &CvOutput) -> Result<Vec<ScoreRecord>> {
    score_groups(
        &output.samples,
        CorrType::Samples,
        |rec| rec.sample.as_ref(),
        output,
    )
}

/// Benjamini-Hochberg adjusted p-values (FDR); missing stays missing
pub fn benjamini_hochberg(p_values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut order: Vec<(usize, f64)> = p_values
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.filter(|x| x.is_finite()).map(|x| (i, x)))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mm = order.len() as f64;
    let mut ret = vec![None; p_values.len()];
    let mut running_min = 1_f64;

    for (rank, &(i, p)) in order.iter().enumerate().rev() {
        let q = p * mm / (rank + 1) as f64;
        running_min = running_min.min(q);
        ret[i] = Some(running_min);
    }
    ret
}

/// Area under the ROC curve of `scores` discriminating `labels`,
/// with tied scores sharing their average rank
pub fn roc_auc(scores: &[f64], labels: &[bool]) -> Result<f64> {
    if scores.len() != labels.len() {
        return Err(MungError::Alignment(format!(
            "{} scores vs. {} labels",
            scores.len(),
            labels.len()
        )));
    }

    let mut ranked: Vec<(f64, bool)> = scores
        .iter()
        .zip(labels.iter())
        .filter(|(s, _)| s.is_finite())
        .map(|(&s, &l)| (s, l))
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n_pos = ranked.iter().filter(|x| x.1).count();
    let n_neg = ranked.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(MungError::InsufficientData(format!(
            "{} positives and {} negatives",
            n_pos, n_neg
        )));
    }

    let mut pos_rank_sum = 0_f64;
    let mut lb = 0;
    while lb < ranked.len() {
        let mut ub = lb + 1;
        while ub < ranked.len() && ranked[ub].0 == ranked[lb].0 {
            ub += 1;
        }
        // ranks lb+1 ..= ub
        let avg_rank = (lb + 1 + ub) as f64 / 2.0;
        let n_pos_tied = ranked[lb..ub].iter().filter(|x| x.1).count();
        pos_rank_sum += avg_rank * n_pos_tied as f64;
        lb = ub;
    }

    let (np, nn) = (n_pos as f64, n_neg as f64);
    Ok((pos_rank_sum - np * (np + 1.0) / 2.0) / (np * nn))
}
