#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command line entry point of the heat source potential module.
//!
//! `heatsrc compute` runs one calculation and prints the result envelope,
//! `heatsrc signature` prints the registration document, and running
//! without a subcommand (or with `interactive`) prompts for everything.
//!
//! Configuration comes from `--config` or, without it, from the
//! `HEATSRC_*` environment variables.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use heatsrc_calculation::Calculator;
use heatsrc_cli_utils::IndicatifProgress;
use heatsrc_config::HeatsrcConfig;
use heatsrc_engine::grass::GrassEngine;

#[derive(Parser)]
#[command(name = "heatsrc", about = "WWTP heat source potential")]
struct Cli {
    /// TOML configuration file (defaults to the environment)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify WWTP sites and package the result
    Compute {
        /// Maximum distance to count as within the urban areas (m)
        #[arg(long, default_value = "150")]
        within_dist: String,
        /// Maximum distance to count as near the urban areas (m)
        #[arg(long, default_value = "1000")]
        near_dist: String,
        /// WWTP point file
        #[arg(long)]
        wwtp: PathBuf,
        /// Directory receiving the packaged result
        #[arg(long)]
        output_dir: PathBuf,
    },
    /// Print the module signature as JSON
    Signature,
    /// Prompt for the inputs and run one calculation
    Interactive,
}

fn load_config(path: Option<&Path>) -> Result<HeatsrcConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => HeatsrcConfig::load(path)?,
        None => HeatsrcConfig::from_env()?,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = heatsrc_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Interactive) {
        Commands::Signature => {
            println!(
                "{}",
                serde_json::to_string_pretty(&heatsrc_calculation::signature())?
            );
        }
        Commands::Compute {
            within_dist,
            near_dist,
            wwtp,
            output_dir,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let engine = GrassEngine::new(&config.engine.executable);
            let calculator = Calculator::new(&engine, &config);
            let progress = IndicatifProgress::pipeline_bar(&multi, "Starting");

            let result = calculator.calculation_from_text(
                &output_dir,
                &wwtp,
                &within_dist,
                &near_dist,
                progress.as_ref(),
            )?;
            if result.is_warning() {
                log::warn!("Calculation returned a warning, nothing was computed");
            }

            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Interactive => {
            let config = load_config(cli.config.as_deref())?;
            let progress = IndicatifProgress::pipeline_bar(&multi, "Starting");
            heatsrc_calculation::interactive::run(&config, progress.as_ref())?;
        }
    }

    Ok(())
}
