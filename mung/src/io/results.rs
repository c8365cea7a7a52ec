use crate::cv::{InteractionRecord, PredictionRecord};
use crate::scoring::ScoreRecord;

use anyhow::Result;
use log::info;
use matrix_util::common_io::{delimiter_for, write_lines};
use matrix_util::dmatrix_io::{format_cell, DEFAULT_PRECISION, MISSING_TOKEN};

/// Labels repeated on every row of a score table
#[derive(Debug, Clone)]
pub struct ScoreLabels {
    /// e.g. `kinases` or `tfs`
    pub feature_type: Box<str>,
    /// e.g. `steady_state` or `dynamic`
    pub dataset: Box<str>,
    /// `with_growth` or `no_growth`
    pub growth: Box<str>,
}

fn cell(x: f64) -> String {
    format_cell(x, DEFAULT_PRECISION)
}

fn opt_cell(x: Option<f64>, fmt: fn(f64) -> String) -> String {
    x.map(fmt).unwrap_or_else(|| MISSING_TOKEN.to_string())
}

/// p-values keep their magnitude
fn sci_cell(x: f64) -> String {
    if x.is_finite() {
        format!("{:.6e}", x)
    } else {
        MISSING_TOKEN.to_string()
    }
}

fn join(words: &[&str], delim: &str) -> Box<str> {
    words.join(delim).into_boxed_str()
}

/// Write a long-format score table.
///
/// Columns: `feature_type dataset growth variable corr_type cor pval rsquared n`
pub fn write_scores(file: &str, labels: &ScoreLabels, records: &[ScoreRecord]) -> Result<()> {
    let delim = delimiter_for(file);

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(join(
        &[
            "feature_type",
            "dataset",
            "growth",
            "variable",
            "corr_type",
            "cor",
            "pval",
            "rsquared",
            "n",
        ],
        delim,
    ));

    for rec in records {
        let corr_type = rec.corr_type.to_string();
        let (cor, pval, rsquared, n) = match &rec.score {
            Some(s) => (
                opt_cell(s.correlation, cell),
                opt_cell(s.p_value, sci_cell),
                cell(s.r_squared),
                s.n.to_string(),
            ),
            None => (
                MISSING_TOKEN.to_string(),
                MISSING_TOKEN.to_string(),
                MISSING_TOKEN.to_string(),
                MISSING_TOKEN.to_string(),
            ),
        };
        lines.push(join(
            &[
                &labels.feature_type,
                &labels.dataset,
                &labels.growth,
                &rec.variable,
                &corr_type,
                &cor,
                &pval,
                &rsquared,
                &n,
            ],
            delim,
        ));
    }

    write_lines(&lines, file)?;
    info!("Wrote {} scores: {}", records.len(), file);
    Ok(())
}

/// Write median coefficients, strongest first.
///
/// Columns: `response feature coef coef_abs`
pub fn write_interactions(file: &str, records: &[InteractionRecord]) -> Result<()> {
    let delim = delimiter_for(file);

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(join(&["response", "feature", "coef", "coef_abs"], delim));

    for rec in records {
        lines.push(join(
            &[
                &rec.response,
                &rec.feature,
                &cell(rec.coef),
                &cell(rec.coef_abs),
            ],
            delim,
        ));
    }

    write_lines(&lines, file)?;
    info!("Wrote {} interactions: {}", records.len(), file);
    Ok(())
}

/// Write every held-out prediction.
///
/// Columns: `sample response fold predicted measured`
pub fn write_predictions(file: &str, records: &[PredictionRecord]) -> Result<()> {
    let delim = delimiter_for(file);

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(join(
        &["sample", "response", "fold", "predicted", "measured"],
        delim,
    ));

    for rec in records {
        lines.push(join(
            &[
                &rec.sample,
                &rec.response,
                &rec.fold.to_string(),
                &cell(rec.predicted),
                &cell(rec.measured),
            ],
            delim,
        ));
    }

    write_lines(&lines, file)?;
    info!("Wrote {} predictions: {}", records.len(), file);
    Ok(())
}

/// Write parameters JSON.
pub fn write_parameters(param_file: &str, params: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(params)?;
    write_lines(&[text.into_boxed_str()], param_file)?;
    info!("Wrote parameters: {}", param_file);
    Ok(())
}
