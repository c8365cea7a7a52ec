use std::collections::HashSet;

use anyhow::{ensure, Result};
use clap::{Args, ValueEnum};
use log::{info, warn};
use matrix_util::common_io::{mkdir, read_lines_of_words_delim};
use matrix_util::dmatrix_io::NamedMatrix;
use matrix_util::traits::ColumnStatOps;

use mung::cv::*;
use mung::io::normalize_key;
use mung::io::results::*;
use mung::regression::ElasticNetConfig;
use mung::scoring::*;

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "kebab-case")]
pub enum SchemeKind {
    LeaveOneOut,
    ShuffleSplit,
    LeaveGroupOut,
}

#[derive(Args, Debug, Clone)]
pub struct CvArgs {
    // ── Input ────────────────────────────────────────────────────────────
    #[arg(long, help = "Feature table: regulators (rows) x samples (columns)")]
    pub features: String,

    #[arg(
        long,
        help = "Response table: metabolites (rows) x samples (columns)",
        long_help = "Response table: metabolites (rows) x samples (columns).\n\
            Numeric row names (m/z) are normalized to 4 decimals."
    )]
    pub responses: String,

    #[arg(
        long,
        help = "Known (response, feature) pairs for ROC AUC of the interactions",
        long_help = "Known (response, feature) pairs with a header line.\n\
            The area under the ROC curve of |median coefficient| against\n\
            this reference is logged and saved with the parameters."
    )]
    pub reference: Option<String>,

    // ── Cross-validation ─────────────────────────────────────────────────
    #[arg(long, value_enum, default_value = "leave-one-out", help = "How samples are held out")]
    pub scheme: SchemeKind,

    #[arg(long, default_value_t = 10, help = "Shuffle-split resamples")]
    pub n_splits: usize,

    #[arg(long, default_value_t = 0.2, help = "Shuffle-split test fraction")]
    pub test_fraction: f64,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    pub seed: u64,

    #[arg(
        long,
        value_delimiter = ',',
        help = "Leave-group-out sample key prefixes (comma separated)"
    )]
    pub groups: Vec<String>,

    #[arg(
        long,
        default_value_t = 2,
        help = "Skip folds with fewer usable train samples"
    )]
    pub min_train_samples: usize,

    // ── Model ────────────────────────────────────────────────────────────
    #[arg(long, default_value_t = 0.01, help = "Elastic-net penalty α")]
    pub alpha: f64,

    #[arg(long, default_value_t = 0.5, help = "L1 share of the penalty")]
    pub l1_ratio: f64,

    #[arg(long, default_value_t = 1000, help = "Coordinate descent sweeps")]
    pub max_iter: usize,

    #[arg(long, default_value_t = 1e-4, help = "Convergence tolerance")]
    pub tol: f64,

    #[arg(
        long,
        default_value_t = false,
        help = "Choose α per fold by an inner shuffle-split"
    )]
    pub inner_cv: bool,

    #[arg(long, default_value_t = 10, help = "Inner shuffle-split resamples")]
    pub inner_n_splits: usize,

    #[arg(long, default_value_t = 0.2, help = "Inner shuffle-split test fraction")]
    pub inner_test_fraction: f64,

    #[arg(long, default_value_t = 100, help = "Size of the inner α grid")]
    pub n_alphas: usize,

    #[arg(long, default_value_t = 1e-3, help = "α_min / α_max of the inner grid")]
    pub eps: f64,

    #[arg(long, default_value_t = false, help = "Only centre features")]
    pub no_scale_features: bool,

    #[arg(long, default_value_t = false, help = "Scale responses to unit variance")]
    pub scale_response: bool,

    // ── Output ───────────────────────────────────────────────────────────
    #[arg(short, long, help = "Output prefix")]
    pub output: String,

    #[arg(long, default_value = "features", help = "feature_type label")]
    pub feature_type: String,

    #[arg(long, default_value = "dataset", help = "dataset label")]
    pub dataset: String,

    #[arg(long, default_value = "with_growth", help = "growth label")]
    pub growth: String,
}

impl CvArgs {
    fn scheme(&self) -> Result<CvScheme> {
        Ok(match self.scheme {
            SchemeKind::LeaveOneOut => CvScheme::LeaveOneOut,
            SchemeKind::ShuffleSplit => CvScheme::ShuffleSplit(ShuffleSplit {
                n_splits: self.n_splits,
                test_fraction: self.test_fraction,
                seed: self.seed,
            }),
            SchemeKind::LeaveGroupOut => {
                ensure!(
                    !self.groups.is_empty(),
                    "leave-group-out needs --groups"
                );
                CvScheme::LeaveGroupOut(LeaveGroupOut {
                    groups: self.groups.iter().map(|g| g.as_str().into()).collect(),
                })
            }
        })
    }

    fn config(&self) -> CvConfig {
        CvConfig {
            model: ElasticNetConfig {
                alpha: self.alpha,
                l1_ratio: self.l1_ratio,
                max_iter: self.max_iter,
                tol: self.tol,
                fit_intercept: true,
            },
            scale_features: !self.no_scale_features,
            scale_response: self.scale_response,
            inner_cv: self.inner_cv.then(|| InnerCvConfig {
                n_splits: self.inner_n_splits,
                test_fraction: self.inner_test_fraction,
                n_alphas: self.n_alphas,
                eps: self.eps,
                seed: self.seed,
            }),
            min_train_samples: self.min_train_samples,
        }
    }
}

/// (response, feature) pairs of a reference table
fn read_reference(file: &str) -> Result<HashSet<(Box<str>, Box<str>)>> {
    let parsed = read_lines_of_words_delim(file, &['\t', ','], 0)?;
    let mut pairs = HashSet::with_capacity(parsed.lines.len());
    for row in parsed.lines {
        ensure!(row.len() >= 2, "{}: expected response and feature", file);
        pairs.insert((normalize_key(&row[0]), row[1].clone()));
    }
    info!("{} reference pairs in {}", pairs.len(), file);
    Ok(pairs)
}

pub fn run_cv(args: &CvArgs) -> Result<()> {
    mkdir(&args.output)?;

    let scheme = args.scheme()?;
    let config = args.config();

    // ── Load and align ───────────────────────────────────────────────
    info!("Reading features from {}", args.features);
    let features = NamedMatrix::from_file(&args.features)?.transpose();

    info!("Reading responses from {}", args.responses);
    let responses = NamedMatrix::from_file(&args.responses)?
        .map_row_names(normalize_key)
        .transpose();

    let data = align_samples(&features, &responses)?;

    let n_measured = data.y.count_finite_columns();
    if let Some(min) = n_measured.iter().min() {
        info!(
            "{} responses measured in {} to {} samples",
            data.num_responses(),
            min,
            n_measured.iter().max().unwrap_or(min)
        );
    }

    // ── Fit ──────────────────────────────────────────────────────────
    let out = cv_predict(&data, &scheme, &config)?;

    // ── Score ────────────────────────────────────────────────────────
    let by_response = score_by_response(&out)?;
    let by_sample = score_by_sample(&out)?;

    let q_values = benjamini_hochberg(
        &by_response
            .iter()
            .map(|r| r.score.and_then(|s| s.p_value))
            .collect::<Vec<_>>(),
    );
    let n_fdr = q_values.iter().flatten().filter(|&&q| q < 0.05).count();
    info!(
        "{} of {} responses correlate at FDR < 5%",
        n_fdr,
        by_response.len()
    );

    let interactions = out.median_coefficients();

    let auc = match &args.reference {
        Some(file) => {
            let reference = read_reference(file)?;
            let (scores, labels): (Vec<f64>, Vec<bool>) = interactions
                .iter()
                .map(|x| {
                    let known = reference.contains(&(x.response.clone(), x.feature.clone()));
                    (x.coef_abs, known)
                })
                .unzip();
            match roc_auc(&scores, &labels) {
                Ok(auc) => {
                    info!("ROC AUC against {}: {:.3}", file, auc);
                    Some(auc)
                }
                Err(e) => {
                    warn!("no ROC AUC against {}: {}", file, e);
                    None
                }
            }
        }
        None => None,
    };

    // ── Write ────────────────────────────────────────────────────────
    let labels = ScoreLabels {
        feature_type: args.feature_type.as_str().into(),
        dataset: args.dataset.as_str().into(),
        growth: args.growth.as_str().into(),
    };
    let scores: Vec<ScoreRecord> = by_response.into_iter().chain(by_sample).collect();

    let score_file = format!("{}.scores.tsv", args.output);
    let interaction_file = format!("{}.interactions.tsv", args.output);
    let prediction_file = format!("{}.predictions.tsv.gz", args.output);
    let predicted_file = format!("{}.predicted.tsv.gz", args.output);

    write_scores(&score_file, &labels, &scores)?;
    write_interactions(&interaction_file, &interactions)?;
    write_predictions(&prediction_file, &out.predictions)?;
    out.predictions_matrix()
        .transpose()
        .to_file(&predicted_file, "response")?;

    let params = serde_json::json!({
        "command": "cv",
        "features": args.features,
        "responses": args.responses,
        "scheme": scheme.to_string(),
        "n_splits": args.n_splits,
        "test_fraction": args.test_fraction,
        "seed": args.seed,
        "groups": args.groups,
        "alpha": args.alpha,
        "l1_ratio": args.l1_ratio,
        "max_iter": args.max_iter,
        "tol": args.tol,
        "inner_cv": args.inner_cv,
        "inner_n_splits": args.inner_n_splits,
        "inner_test_fraction": args.inner_test_fraction,
        "n_alphas": args.n_alphas,
        "eps": args.eps,
        "scale_features": !args.no_scale_features,
        "scale_response": args.scale_response,
        "min_train_samples": args.min_train_samples,
        "num_samples": data.num_samples(),
        "num_features": data.num_features(),
        "num_responses": data.num_responses(),
        "num_folds": out.num_folds,
        "num_predictions": out.predictions.len(),
        "skipped_folds": out.skipped_folds,
        "num_responses_fdr_05": n_fdr,
        "reference": args.reference,
        "roc_auc": auc,
        "score_file": score_file,
        "interaction_file": interaction_file,
        "prediction_file": prediction_file,
        "predicted_file": predicted_file,
    });
    write_parameters(&format!("{}.parameters.json", args.output), &params)?;

    info!("Done");
    Ok(())
}
