#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Calculation entry point of the heat source potential module.
//!
//! [`Calculator::calculation`] is what the platform calls for each request:
//!
//! 1. Invalid parameters produce a warning result without any computation
//! 2. The result cache is consulted for the parameter pair; on a miss the
//!    pipeline runs and its artifact and indicators become the entry
//! 3. The artifact set is copied to the caller's directory and zipped

pub mod indicators;
pub mod interactive;
pub mod signature;

use std::path::Path;

use heatsrc_cache::{CacheError, CacheKey, ComputedArtifact, ResultCache};
use heatsrc_calculation_models::{ComputationResult, Indicator, VectorLayer};
use heatsrc_config::HeatsrcConfig;
use heatsrc_engine::GeoEngine;
use heatsrc_packager::PackagingError;
use heatsrc_pipeline::progress::ProgressCallback;
use heatsrc_pipeline::{ARTIFACT_STEM, PIPELINE_STEPS, Pipeline, PipelineError};
use heatsrc_suitability_models::{ClassificationParams, ParamError, ValidationError};

pub use indicators::indicators;
pub use signature::signature;

/// Module name reported in every result.
pub const CM_NAME: &str = "CM - Heat sources potential";

/// Module id assigned by the platform.
pub const CM_ID: u32 = 11;

/// Errors that fail a request.
#[derive(Debug, thiserror::Error)]
pub enum CalculationError {
    /// A parameter is not an integer.
    #[error(transparent)]
    Param(#[from] ParamError),

    /// The pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The cache could not be read or committed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The artifact could not be delivered.
    #[error(transparent)]
    Packaging(#[from] PackagingError),
}

/// Result returned for parameters that fail validation.
#[must_use]
pub fn warning_result(error: &ValidationError) -> ComputationResult {
    let mut result = ComputationResult::empty(CM_NAME);
    result.indicator.push(Indicator::warning(&error.to_string()));
    result
}

/// Serves calculation requests against one engine, configuration and cache.
pub struct Calculator<'a> {
    engine: &'a dyn GeoEngine,
    config: &'a HeatsrcConfig,
    cache: ResultCache,
}

impl std::fmt::Debug for Calculator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calculator")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<'a> Calculator<'a> {
    /// Creates a calculator using the cache directory from `config`.
    #[must_use]
    pub fn new(engine: &'a dyn GeoEngine, config: &'a HeatsrcConfig) -> Self {
        Self {
            engine,
            config,
            cache: ResultCache::new(&config.cache.root),
        }
    }

    /// The result cache.
    #[must_use]
    pub const fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Parses textual parameters and runs [`Self::calculation`].
    ///
    /// # Errors
    ///
    /// Returns [`CalculationError::Param`] if a value is not an integer,
    /// otherwise see [`Self::calculation`].
    pub fn calculation_from_text(
        &self,
        output_dir: &Path,
        wwtp_vector: &Path,
        within_dist: &str,
        near_dist: &str,
        progress: &dyn ProgressCallback,
    ) -> Result<ComputationResult, CalculationError> {
        let params = ClassificationParams::parse(within_dist, near_dist)?;
        self.calculation(output_dir, wwtp_vector, &params, progress)
    }

    /// Computes (or reuses) the classified WWTP layer for `params` and
    /// delivers it into `output_dir`.
    ///
    /// Invalid parameters are not an error: the result carries one warning
    /// indicator and the engine and cache are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CalculationError`] if the pipeline, the cache or the
    /// packaging fails. Nothing is cached for a failed pipeline run.
    pub fn calculation(
        &self,
        output_dir: &Path,
        wwtp_vector: &Path,
        params: &ClassificationParams,
        progress: &dyn ProgressCallback,
    ) -> Result<ComputationResult, CalculationError> {
        if let Err(e) = params.validate() {
            log::warn!("Rejected parameters: {e}");
            return Ok(warning_result(&e));
        }

        let key = CacheKey::from(params);
        let cached = self.cache.get_or_compute(key, |staging| {
            let output = Pipeline::new(self.engine, self.config).run(
                params,
                wwtp_vector,
                staging,
                progress,
            )?;
            Ok::<_, CalculationError>(ComputedArtifact {
                artifact: output.artifact,
                metadata: indicators(&output.sites),
            })
        })?;

        if cached.from_cache {
            log::info!(
                "Reusing {} computed at {}",
                cached.path.display(),
                cached.created_at
            );
            progress.set_position(PIPELINE_STEPS);
            progress.finish(format!("Reused {}", cached.path.display()));
        }

        let identifier = heatsrc_packager::new_identifier();
        let archive = heatsrc_packager::package_for_caller(&cached.path, &identifier, output_dir)?;

        let mut result = ComputationResult::empty(CM_NAME);
        result.indicator = cached.metadata;
        result.vector_layers.push(VectorLayer {
            name: ARTIFACT_STEM.to_string(),
            path: archive,
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatsrc_calculation_models::IndicatorValue;
    use heatsrc_engine::recording::RecordingEngine;
    use heatsrc_pipeline::progress::NullProgress;
    use std::path::PathBuf;

    const SITES: &str = "cat|capacity|power|dist150m_sum|dist1000m_sum\n\
                         1|3000|10|0|30\n\
                         2|200000|50|40|100\n\
                         3|1000|5|0|0\n";

    fn setup(name: &str) -> (HeatsrcConfig, PathBuf) {
        let root = std::env::temp_dir().join(format!("heatsrc_calculation_{name}"));
        let _ = std::fs::remove_dir_all(&root);
        let config =
            HeatsrcConfig::new(root.join("gisdb"), root.join("clc.tif"), root.join("cache"));
        (config, root)
    }

    fn engine() -> RecordingEngine {
        let engine = RecordingEngine::new();
        engine.respond_to_query("SELECT cat, capacity", SITES);
        engine
    }

    #[test]
    fn invalid_params_yield_a_warning_without_engine_calls() {
        let (config, root) = setup("warning");
        let engine = engine();
        let calculator = Calculator::new(&engine, &config);

        let result = calculator
            .calculation(
                &root.join("out"),
                &root.join("wwtp.geojson"),
                &ClassificationParams::new(1000, 100),
                &NullProgress,
            )
            .unwrap();

        assert_eq!(result.name, CM_NAME);
        assert_eq!(result.indicator.len(), 1);
        assert_eq!(
            result.indicator[0].name,
            "near distance limit (100) <= within distance limit (1000), please correct the values and try again"
        );
        assert_eq!(result.indicator[0].unit, "-");
        assert_eq!(
            result.indicator[0].value,
            IndicatorValue::Text(String::new())
        );
        assert!(result.vector_layers.is_empty());
        assert!(result.is_warning());
        assert_eq!(engine.interactions(), 0);
        assert!(!root.join("cache").exists());
    }

    #[test]
    fn second_request_reuses_the_cached_artifact() {
        let (config, root) = setup("reuse");
        let engine = engine();
        let calculator = Calculator::new(&engine, &config);
        let params = ClassificationParams::new(150, 1000);

        let first = calculator
            .calculation(
                &root.join("out1"),
                &root.join("wwtp.geojson"),
                &params,
                &NullProgress,
            )
            .unwrap();
        let commands_after_first = engine.commands().len();
        assert!(commands_after_first > 0);
        assert!(calculator.cache().contains(CacheKey::new(150, 1000)));
        assert!(root.join("cache/150_1000/wwtp_potential.shp").is_file());

        let second = calculator
            .calculation(
                &root.join("out2"),
                &root.join("wwtp.geojson"),
                &params,
                &NullProgress,
            )
            .unwrap();

        assert_eq!(engine.commands().len(), commands_after_first);
        assert_eq!(engine.created_mapsets().len(), 1);
        assert_eq!(first.indicator, second.indicator);
        assert_eq!(first.indicator.len(), 7);

        let first_zip = &first.vector_layers[0].path;
        let second_zip = &second.vector_layers[0].path;
        assert!(first_zip.starts_with(root.join("out1")));
        assert!(second_zip.starts_with(root.join("out2")));
        assert!(first_zip.is_file());
        assert!(second_zip.is_file());
        assert_ne!(first_zip.file_name(), second_zip.file_name());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[derive(Default)]
    struct FinishedProgress {
        finished: std::sync::Mutex<Vec<String>>,
        position: std::sync::Mutex<u64>,
    }

    impl ProgressCallback for FinishedProgress {
        fn set_total(&self, _total: u64) {}
        fn set_position(&self, pos: u64) {
            *self.position.lock().unwrap() = pos;
        }
        fn inc(&self, delta: u64) {
            *self.position.lock().unwrap() += delta;
        }
        fn set_message(&self, _msg: String) {}
        fn finish(&self, msg: String) {
            self.finished.lock().unwrap().push(msg);
        }
        fn finish_and_clear(&self) {}
    }

    #[test]
    fn cache_hit_finishes_progress() {
        let (config, root) = setup("hit_progress");
        let engine = engine();
        let calculator = Calculator::new(&engine, &config);
        let params = ClassificationParams::new(150, 1000);

        calculator
            .calculation(
                &root.join("out1"),
                &root.join("wwtp.geojson"),
                &params,
                &NullProgress,
            )
            .unwrap();

        let progress = FinishedProgress::default();
        calculator
            .calculation(
                &root.join("out2"),
                &root.join("wwtp.geojson"),
                &params,
                &progress,
            )
            .unwrap();

        let finished = progress.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert!(finished[0].starts_with("Reused "));
        assert_eq!(*progress.position.lock().unwrap(), PIPELINE_STEPS);
        drop(finished);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn failed_pipeline_is_not_cached() {
        let (config, root) = setup("failed");
        let engine = engine();
        engine.fail_on("v.out.ogr", "ERROR: unable to create datasource");
        let calculator = Calculator::new(&engine, &config);
        let params = ClassificationParams::new(150, 1000);

        let err = calculator
            .calculation(
                &root.join("out"),
                &root.join("wwtp.geojson"),
                &params,
                &NullProgress,
            )
            .unwrap_err();
        assert!(matches!(err, CalculationError::Pipeline(PipelineError::Engine(_))));
        assert!(!calculator.cache().contains(CacheKey::new(150, 1000)));

        engine.clear_failure("v.out.ogr");
        let result = calculator
            .calculation(
                &root.join("out"),
                &root.join("wwtp.geojson"),
                &params,
                &NullProgress,
            )
            .unwrap();
        assert_eq!(result.vector_layers.len(), 1);
        assert_eq!(engine.created_mapsets().len(), 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn non_integer_text_is_rejected() {
        let (config, root) = setup("text");
        let engine = engine();
        let calculator = Calculator::new(&engine, &config);

        let err = calculator
            .calculation_from_text(
                &root.join("out"),
                &root.join("wwtp.geojson"),
                "150m",
                "1000",
                &NullProgress,
            )
            .unwrap_err();
        assert!(matches!(err, CalculationError::Param(_)));
        assert_eq!(engine.interactions(), 0);
    }
}
