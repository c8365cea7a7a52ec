mod run_activity;
mod run_cv;
mod run_regress_out;

use run_activity::*;
use run_cv::*;
use run_regress_out::*;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mung")]
#[command(
    about = "Metabolite prediction from regulator activities: activity inference, growth correction and cross-validated elastic nets"
)]
struct Cli {
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer kinase / transcription factor activities from target measurements by ridge regression
    Activity(ActivityArgs),
    /// Remove the linear effect of a sample covariate (e.g. growth rate) from every row of a table
    RegressOut(RegressOutArgs),
    /// Predict metabolite levels from regulator activities with cross-validated elastic nets
    Cv(CvArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::Activity(args) => {
            run_activity(args)?;
        }
        Commands::RegressOut(args) => {
            run_regress_out(args)?;
        }
        Commands::Cv(args) => {
            run_cv(args)?;
        }
    }

    Ok(())
}
