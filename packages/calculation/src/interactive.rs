//! Interactive runner for the calculation.
//!
//! Prompts for the WWTP file, output directory and both radii with
//! `dialoguer`, runs the calculation against GRASS and prints the result
//! envelope as JSON.

use std::path::PathBuf;

use dialoguer::{Confirm, Input};
use heatsrc_config::HeatsrcConfig;
use heatsrc_engine::grass::GrassEngine;
use heatsrc_pipeline::progress::ProgressCallback;
use heatsrc_suitability_models::params::{DEFAULT_NEAR_DIST, DEFAULT_WITHIN_DIST};

use crate::Calculator;

/// Runs the interactive calculation.
///
/// # Errors
///
/// Returns an error if a prompt or the calculation fails.
pub fn run(
    config: &HeatsrcConfig,
    progress: &dyn ProgressCallback,
) -> Result<(), Box<dyn std::error::Error>> {
    let wwtp: String = Input::new()
        .with_prompt("WWTP point file (GeoJSON, GeoPackage, shapefile)")
        .interact_text()?;

    let output_dir: String = Input::new()
        .with_prompt("Output directory")
        .default("data/output".to_string())
        .interact_text()?;

    let within_dist: String = Input::new()
        .with_prompt("Maximum distance within the urban areas (m)")
        .default(DEFAULT_WITHIN_DIST.to_string())
        .interact_text()?;

    let near_dist: String = Input::new()
        .with_prompt("Maximum distance near the urban areas (m)")
        .default(DEFAULT_NEAR_DIST.to_string())
        .interact_text()?;

    let proceed = Confirm::new()
        .with_prompt(format!(
            "Classify {wwtp} with within={within_dist} m, near={near_dist} m?"
        ))
        .default(true)
        .interact()?;
    if !proceed {
        log::info!("Cancelled");
        return Ok(());
    }

    let engine = GrassEngine::new(&config.engine.executable);
    let calculator = Calculator::new(&engine, config);
    let result = calculator.calculation_from_text(
        &PathBuf::from(output_dir),
        &PathBuf::from(wwtp.trim()),
        &within_dist,
        &near_dist,
        progress,
    )?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
