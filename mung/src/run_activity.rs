use anyhow::Result;
use clap::Args;
use log::info;
use matrix_util::common_io::mkdir;
use matrix_util::dmatrix_io::NamedMatrix;

use mung::activity::{ActivityConfig, ActivityEstimator};
use mung::io::results::write_parameters;
use mung::io::weights::read_target_weights;

#[derive(Args, Debug, Clone)]
pub struct ActivityArgs {
    #[arg(
        long,
        help = "Measurement table: targets (rows) x samples (columns)",
        long_help = "Measurement table: targets (rows) x samples (columns).\n\
            Tab separated, or comma separated for .csv; .gz is supported.\n\
            Missing cells (NA, NaN, empty) count as not measured."
    )]
    pub measurements: String,

    #[arg(
        long,
        help = "Regulator-target weights (regulator, target, weight)",
        long_help = "Regulator-target weights.\n\
            Long format with a header: regulator, target, signed weight.\n\
            With --wide: a targets x regulators matrix."
    )]
    pub weights: String,

    #[arg(long, default_value_t = false, help = "Weights are a targets x regulators matrix")]
    pub wide: bool,

    #[arg(short, long, help = "Output prefix")]
    pub output: String,

    #[arg(long, default_value_t = 0.1, help = "Ridge penalty")]
    pub alpha: f64,

    #[arg(
        long,
        default_value_t = 2,
        help = "Regulators with fewer measured targets get a missing score"
    )]
    pub min_targets: usize,

    #[arg(long, default_value_t = false, help = "Fit without intercept")]
    pub no_intercept: bool,
}

pub fn run_activity(args: &ActivityArgs) -> Result<()> {
    mkdir(&args.output)?;

    let weights = read_target_weights(&args.weights, args.wide)?;

    info!("Reading measurements from {}", args.measurements);
    let measurements = NamedMatrix::from_file(&args.measurements)?;
    info!(
        "{} targets x {} samples",
        measurements.rows.len(),
        measurements.cols.len()
    );

    let config = ActivityConfig {
        alpha: args.alpha,
        min_targets: args.min_targets,
        fit_intercept: !args.no_intercept,
    };
    let estimator = ActivityEstimator::new(weights, config)?;
    let activity = estimator.estimate_matrix(&measurements)?;

    let activity_file = format!("{}.activity.tsv.gz", args.output);
    activity.to_file(&activity_file, "regulator")?;
    info!("Wrote activities: {}", activity_file);

    let n_scored = activity
        .mat
        .row_iter()
        .filter(|r| r.iter().any(|x| x.is_finite()))
        .count();

    let params = serde_json::json!({
        "command": "activity",
        "measurements": args.measurements,
        "weights": args.weights,
        "wide": args.wide,
        "alpha": args.alpha,
        "min_targets": args.min_targets,
        "fit_intercept": !args.no_intercept,
        "num_regulators": activity.rows.len(),
        "num_regulators_scored": n_scored,
        "num_samples": activity.cols.len(),
        "activity_file": activity_file,
    });
    write_parameters(&format!("{}.parameters.json", args.output), &params)?;

    info!("Done");
    Ok(())
}
