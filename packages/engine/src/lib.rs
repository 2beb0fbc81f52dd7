#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geoprocessing engine boundary.
//!
//! The heavy spatial work (buffering, raster statistics, reclassification,
//! export) runs in GRASS GIS. This crate describes every operation the
//! heat-source pipeline needs as an [`EngineCommand`] variant and routes
//! them through the [`GeoEngine`] trait, so the pipeline never builds
//! command lines itself and tests can swap in
//! [`recording::RecordingEngine`].
//!
//! A [`session::Session`] binds the engine to one isolated workspace (a
//! GRASS mapset) and removes it again when dropped.

pub mod command;
pub mod grass;
pub mod recording;
pub mod session;
pub mod table;

use std::path::{Path, PathBuf};

pub use command::{ColumnDef, EngineCommand, ModuleCall, VectorFormat};
pub use session::{Assignment, AttributeUpdate, LayerHandle, RasterHandle, Session, SqlExpr};
pub use table::{Record, Table};

/// Name of the mapset holding the shared base dataset.
pub const PERMANENT_MAPSET: &str = "PERMANENT";

/// Errors reported by the geoprocessing engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine executable could not be started.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        /// Executable that failed to start.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The engine ran the command and reported a failure.
    #[error("Engine command {module} failed ({status}): {stderr}")]
    CommandFailed {
        /// Engine module name (e.g. `v.buffer`).
        module: String,
        /// Exit status description.
        status: String,
        /// Diagnostic text written by the engine.
        stderr: String,
    },

    /// The engine's output could not be interpreted.
    #[error("Malformed output from {module}: {message}")]
    Parse {
        /// Engine module name.
        module: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Workspace file operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl EngineError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// One isolated unit of engine state: `gisdb/location/mapset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Workspace {
    /// Root directory of all engine databases.
    pub gisdb: PathBuf,
    /// Location (projection-bound database) name.
    pub location: String,
    /// Mapset name inside the location.
    pub mapset: String,
}

impl Workspace {
    /// Creates a workspace reference.
    #[must_use]
    pub fn new(gisdb: impl Into<PathBuf>, location: &str, mapset: &str) -> Self {
        Self {
            gisdb: gisdb.into(),
            location: location.to_string(),
            mapset: mapset.to_string(),
        }
    }

    /// The permanent mapset of a location.
    #[must_use]
    pub fn permanent(gisdb: impl Into<PathBuf>, location: &str) -> Self {
        Self::new(gisdb, location, PERMANENT_MAPSET)
    }

    /// Directory of the location.
    #[must_use]
    pub fn location_path(&self) -> PathBuf {
        self.gisdb.join(&self.location)
    }

    /// Directory of the mapset.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.location_path().join(&self.mapset)
    }
}

/// Command execution interface of a geoprocessing engine.
///
/// Every call blocks until the engine answers. Implementations never retry.
pub trait GeoEngine: Send + Sync {
    /// Creates a new location bound to the `EPSG` code.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the engine refuses to create it.
    fn create_location(&self, gisdb: &Path, location: &str, epsg: u32)
    -> Result<(), EngineError>;

    /// Creates an empty mapset inside an existing location.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the mapset cannot be created.
    fn create_mapset(&self, workspace: &Workspace) -> Result<(), EngineError>;

    /// Deletes a mapset and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the mapset cannot be removed.
    fn remove_mapset(&self, workspace: &Workspace) -> Result<(), EngineError>;

    /// Runs one command inside a workspace and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] carrying the engine diagnostics on failure.
    fn execute(&self, workspace: &Workspace, command: &EngineCommand)
    -> Result<String, EngineError>;
}
