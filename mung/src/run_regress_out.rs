use anyhow::Result;
use clap::Args;
use log::info;
use matrix_util::common_io::mkdir;
use matrix_util::dmatrix_io::NamedMatrix;

use mung::io::covariate::read_covariate;
use mung::io::results::write_parameters;
use mung::residualize::regress_out_rows;

#[derive(Args, Debug, Clone)]
pub struct RegressOutArgs {
    #[arg(long, help = "Table to correct: features (rows) x samples (columns)")]
    pub input: String,

    #[arg(long, help = "Sample covariate table (sample, value...) with a header")]
    pub covariate: String,

    #[arg(long, help = "Covariate column name (default: the first value column)")]
    pub covariate_column: Option<String>,

    #[arg(short, long, help = "Output prefix")]
    pub output: String,
}

pub fn run_regress_out(args: &RegressOutArgs) -> Result<()> {
    mkdir(&args.output)?;

    let covariate = read_covariate(&args.covariate, args.covariate_column.as_deref())?;

    info!("Reading {}", args.input);
    let table = NamedMatrix::from_file(&args.input)?;

    let residuals = regress_out_rows(&covariate, &table)?;

    let out_file = format!("{}.residuals.tsv.gz", args.output);
    residuals.to_file(&out_file, "feature")?;
    info!("Wrote residuals: {}", out_file);

    let n_missing_rows = residuals
        .mat
        .row_iter()
        .filter(|r| r.iter().all(|x| !x.is_finite()))
        .count();

    let params = serde_json::json!({
        "command": "regress-out",
        "input": args.input,
        "covariate": args.covariate,
        "covariate_column": args.covariate_column,
        "num_rows": residuals.rows.len(),
        "num_rows_missing": n_missing_rows,
        "num_samples": residuals.cols.len(),
        "residual_file": out_file,
    });
    write_parameters(&format!("{}.parameters.json", args.output), &params)?;

    info!("Done");
    Ok(())
}
