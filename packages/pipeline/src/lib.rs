#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Heat source potential pipeline.
//!
//! One run takes a WWTP point file and a parameter pair and produces a
//! classified shapefile:
//!
//! 1. Make sure the shared base location (urban mask) exists
//! 2. Open an ephemeral mapset and import the sites
//! 3. Buffer the sites at both radii and join the urban coverage sums
//! 4. Classify the sites and write the derived attributes
//! 5. Shorten long column names and export the buffered sites
//!
//! Every engine failure is returned unchanged and the mapset is removed on
//! every exit path.

pub mod base;
pub mod columns;
pub mod progress;

use std::path::{Path, PathBuf};

use heatsrc_config::HeatsrcConfig;
use heatsrc_engine::{EngineError, GeoEngine, RasterHandle, Session, VectorFormat};
use heatsrc_suitability::ClassifyError;
use heatsrc_suitability_models::{ClassificationParams, Site, ValidationError};
use strum_macros::Display;

use crate::progress::ProgressCallback;

/// Name of the imported site layer.
pub const SITE_LAYER: &str = "wwtp";

/// File stem of the exported artifact.
pub const ARTIFACT_STEM: &str = "wwtp_potential";

/// Format of the exported artifact.
pub const ARTIFACT_FORMAT: VectorFormat = VectorFormat::EsriShapefile;

/// Steps reported through [`ProgressCallback`].
pub const PIPELINE_STEPS: u64 = 6;

/// Errors that end a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An engine command failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The parameters violate `near_dist > within_dist`.
    #[error(transparent)]
    InvalidParams(#[from] ValidationError),

    /// The site table could not be classified.
    #[error("Classification failed: {0}")]
    Classify(ClassifyError),

    /// Filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<ClassifyError> for PipelineError {
    fn from(e: ClassifyError) -> Self {
        match e {
            ClassifyError::Engine(e) => Self::Engine(e),
            other => Self::Classify(other),
        }
    }
}

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PipelineState {
    Init,
    BaseReady,
    Imported,
    Buffered,
    Joined,
    Classified,
    Exported,
    Done,
    Failed,
}

impl PipelineState {
    /// Whether no further transition can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Path of the exported `.shp` file.
    pub artifact: PathBuf,
    /// Sites as classified in this run.
    pub sites: Vec<Site>,
}

struct Tracker<'a> {
    state: PipelineState,
    progress: &'a dyn ProgressCallback,
}

impl<'a> Tracker<'a> {
    fn new(progress: &'a dyn ProgressCallback) -> Self {
        progress.set_total(PIPELINE_STEPS);
        progress.set_position(0);
        Self {
            state: PipelineState::Init,
            progress,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        log::info!("Pipeline {} -> {next}", self.state);
        self.state = next;
        self.progress.set_message(next.to_string());
        if next != PipelineState::Buffered {
            self.progress.inc(1);
        }
    }

    fn fail(&mut self, error: &PipelineError) {
        log::error!("Pipeline failed in {}: {error}", self.state);
        self.state = PipelineState::Failed;
        self.progress.finish(format!("{}: {error}", PipelineState::Failed));
    }
}

/// Runs the heat source pipeline against one engine and configuration.
pub struct Pipeline<'a> {
    engine: &'a dyn GeoEngine,
    config: &'a HeatsrcConfig,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(engine: &'a dyn GeoEngine, config: &'a HeatsrcConfig) -> Self {
        Self { engine, config }
    }

    /// Classifies the sites in `wwtp_vector` and exports them into
    /// `output_dir` as `wwtp_potential.shp` (plus companions).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidParams`] before touching the engine
    /// if the parameters are invalid, otherwise the first error any step
    /// hits. Engine errors are passed through unchanged.
    pub fn run(
        &self,
        params: &ClassificationParams,
        wwtp_vector: &Path,
        output_dir: &Path,
        progress: &dyn ProgressCallback,
    ) -> Result<PipelineOutput, PipelineError> {
        params.validate()?;

        let mut tracker = Tracker::new(progress);
        match self.execute(params, wwtp_vector, output_dir, &mut tracker) {
            Ok(output) => {
                tracker.advance(PipelineState::Done);
                progress.finish(format!(
                    "Classified {} sites into {}",
                    output.sites.len(),
                    output.artifact.display()
                ));
                Ok(output)
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        params: &ClassificationParams,
        wwtp_vector: &Path,
        output_dir: &Path,
        tracker: &mut Tracker<'_>,
    ) -> Result<PipelineOutput, PipelineError> {
        base::ensure_base_workspace(self.engine, self.config)?;
        tracker.advance(PipelineState::BaseReady);

        let mapset = format!("mset_{}", uuid::Uuid::new_v4().simple());
        let session = Session::ephemeral(
            self.engine,
            &self.config.workspace.gisdb,
            &self.config.workspace.location,
            &mapset,
        )?;

        let sites = session.import_vector(wwtp_vector, SITE_LAYER)?;
        tracker.advance(PipelineState::Imported);

        let urban = RasterHandle::new(base::URBAN_RASTER);
        session.fit_region(&urban, &sites, self.config.engine.region_grow_cells)?;

        let within_column = session.buffer_and_join(&sites, params.within_dist, &urban)?;
        tracker.advance(PipelineState::Buffered);
        let near_column = session.buffer_and_join(&sites, params.near_dist, &urban)?;
        tracker.advance(PipelineState::Buffered);
        tracker.advance(PipelineState::Joined);

        let classified =
            heatsrc_suitability::classify_layer(&session, &sites, &within_column, &near_column)?;
        tracker.advance(PipelineState::Classified);

        let names = session.column_names(&sites)?;
        let limit = ARTIFACT_FORMAT.max_column_name_len();
        for (from, to) in columns::normalize_column_names(&names, limit) {
            log::debug!("Renaming column {from} -> {to}");
            session.rename_column(&sites, &from, &to)?;
        }

        let target = output_dir.join(format!("{ARTIFACT_STEM}.{}", ARTIFACT_FORMAT.extension()));
        let artifact = session.export_vector(
            &sites,
            self.config.engine.export_buffer,
            ARTIFACT_FORMAT,
            &target,
        )?;
        tracker.advance(PipelineState::Exported);

        session.close()?;

        Ok(PipelineOutput {
            artifact,
            sites: classified,
        })
    }
}
