//! Shared base location.
//!
//! Every request works in its own mapset, but all of them read the urban
//! area raster from the permanent mapset of one base location. That
//! location is built once per GIS database: the land cover raster is
//! imported and reclassed into a 1/NULL urban mask.
//!
//! The location is built under a private staging name inside the GIS
//! database and renamed into place only after every step succeeded and the
//! marker file was written. Concurrent builders in other processes never
//! see or touch each other's half-built locations; the first rename wins
//! and later builders discard their own copy.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use heatsrc_config::HeatsrcConfig;
use heatsrc_engine::{GeoEngine, RasterHandle, Session, Workspace};

use crate::PipelineError;

/// Marker file written into the location once it is complete.
pub const READY_MARKER: &str = ".heatsrc-ready";

/// Land cover raster name in the permanent mapset.
pub const CLC_RASTER: &str = "clc";

/// Population density raster name in the permanent mapset.
pub const POPDENS_RASTER: &str = "popdens";

/// Urban mask raster name in the permanent mapset.
pub const URBAN_RASTER: &str = "urbanareas";

static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Reclass rules mapping the given land cover classes to 1 and everything
/// else to NULL.
#[must_use]
pub fn urban_rules(categories: &[u32]) -> String {
    let cats = categories
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    format!("{cats} = 1 urban areas\n* = NULL\n")
}

/// Title of the urban mask raster.
#[must_use]
pub fn urban_title(categories: &[u32]) -> String {
    let cats = categories
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("Urban Areas from Corine Land Cover ({cats})")
}

/// Whether the base location described by `config` is complete.
#[must_use]
pub fn is_ready(config: &HeatsrcConfig) -> bool {
    base_workspace(config)
        .location_path()
        .join(READY_MARKER)
        .is_file()
}

/// The permanent mapset of the base location.
#[must_use]
pub fn base_workspace(config: &HeatsrcConfig) -> Workspace {
    Workspace::permanent(&config.workspace.gisdb, &config.workspace.location)
}

/// Builds the base location unless it is already complete.
///
/// Concurrent callers in one process are serialized; the second caller
/// finds the marker and returns immediately.
///
/// # Errors
///
/// Returns [`PipelineError`] if any engine step or file operation fails.
/// The staging location is removed in that case, so the next call starts
/// over.
pub fn ensure_base_workspace(
    engine: &dyn GeoEngine,
    config: &HeatsrcConfig,
) -> Result<Workspace, PipelineError> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);

    let workspace = base_workspace(config);
    let location = workspace.location_path();

    if location.join(READY_MARKER).is_file() {
        log::debug!("Base location {} is ready", location.display());
        return Ok(workspace);
    }

    let gisdb = &config.workspace.gisdb;
    std::fs::create_dir_all(gisdb).map_err(|e| PipelineError::io(gisdb, e))?;

    let staging_name = format!(
        ".{}.tmp-{}",
        config.workspace.location,
        uuid::Uuid::new_v4().simple()
    );
    let staging = Workspace::permanent(gisdb, &staging_name);
    let staging_path = staging.location_path();

    log::info!(
        "Creating base location {} (EPSG:{})",
        location.display(),
        config.workspace.epsg
    );

    let result = build_location(engine, config, &staging)
        .and_then(|()| commit_location(&staging_path, &location));

    if staging_path.exists() {
        let _ = std::fs::remove_dir_all(&staging_path);
    }
    result?;

    log::info!("Base location {} ready", location.display());
    Ok(workspace)
}

fn build_location(
    engine: &dyn GeoEngine,
    config: &HeatsrcConfig,
    staging: &Workspace,
) -> Result<(), PipelineError> {
    engine.create_location(&staging.gisdb, &staging.location, config.workspace.epsg)?;

    let session = Session::attach(engine, staging.clone());
    let clc = session.import_raster(&config.data.clc_raster, CLC_RASTER)?;
    if let Some(popdens) = &config.data.popdens_raster {
        session.import_raster(popdens, POPDENS_RASTER)?;
    }
    build_urban_mask(&session, &clc, &config.data.urban_categories)?;
    session.close()?;

    write_marker(&staging.location_path().join(READY_MARKER))
}

/// Moves a finished staging location to its final name.
///
/// A complete location committed by another process in the meantime is
/// kept and the staging copy is left for the caller to remove. A location
/// without the marker at the final name was not produced by a staged build
/// and is set aside before the rename.
fn commit_location(staging: &Path, location: &Path) -> Result<(), PipelineError> {
    let marker = location.join(READY_MARKER);

    if location.exists() && !marker.is_file() {
        log::warn!(
            "Base location {} is incomplete, replacing it",
            location.display()
        );
        let stale = location.with_file_name(format!(
            ".{}.stale-{}",
            location
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default(),
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::rename(location, &stale).map_err(|e| PipelineError::io(location, e))?;
        let _ = std::fs::remove_dir_all(&stale);
    }

    if let Err(e) = std::fs::rename(staging, location) {
        if marker.is_file() {
            log::debug!(
                "Base location {} was committed concurrently",
                location.display()
            );
            return Ok(());
        }
        return Err(PipelineError::io(location, e));
    }
    Ok(())
}

fn build_urban_mask(
    session: &Session<'_>,
    clc: &RasterHandle,
    categories: &[u32],
) -> Result<RasterHandle, PipelineError> {
    Ok(session.reclass(
        clc,
        URBAN_RASTER,
        &urban_title(categories),
        &urban_rules(categories),
    )?)
}

fn write_marker(marker: &Path) -> Result<(), PipelineError> {
    std::fs::write(marker, b"ok\n").map_err(|e| PipelineError::io(marker, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatsrc_engine::EngineCommand;
    use heatsrc_engine::recording::RecordingEngine;

    fn config(name: &str) -> HeatsrcConfig {
        let root = std::env::temp_dir().join(format!("heatsrc_base_{name}"));
        let _ = std::fs::remove_dir_all(&root);
        HeatsrcConfig::new(root.join("gisdb"), root.join("clc.tif"), root.join("cache"))
    }

    fn cleanup(config: &HeatsrcConfig) {
        if let Some(root) = config.workspace.gisdb.parent() {
            let _ = std::fs::remove_dir_all(root);
        }
    }

    #[test]
    fn rules_and_title_follow_categories() {
        assert_eq!(
            urban_rules(&[111, 112, 121]),
            "111 112 121 = 1 urban areas\n* = NULL\n"
        );
        assert_eq!(
            urban_title(&[111, 112, 121]),
            "Urban Areas from Corine Land Cover (111, 112, 121)"
        );
    }

    #[test]
    fn base_is_built_once() {
        let config = config("once");
        let engine = RecordingEngine::new();

        ensure_base_workspace(&engine, &config).unwrap();
        ensure_base_workspace(&engine, &config).unwrap();

        assert!(is_ready(&config));
        assert_eq!(engine.locations().len(), 1);
        assert_eq!(engine.modules(), vec!["r.import", "r.reclass"]);
        cleanup(&config);
    }

    #[test]
    fn population_density_is_imported_when_configured() {
        let mut config = config("popdens");
        config.data.popdens_raster = Some(config.workspace.gisdb.join("popdens.tif"));
        let engine = RecordingEngine::new();

        ensure_base_workspace(&engine, &config).unwrap();

        let imported = engine
            .commands()
            .into_iter()
            .filter_map(|c| match c.command {
                EngineCommand::ImportRaster { output, .. } => Some(output),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(imported, vec![CLC_RASTER, POPDENS_RASTER]);
        cleanup(&config);
    }

    fn gisdb_entries(config: &HeatsrcConfig) -> Vec<String> {
        let mut names = std::fs::read_dir(&config.workspace.gisdb)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn interrupted_build_leaves_nothing_behind() {
        let config = config("stale");
        let engine = RecordingEngine::new();
        engine.fail_on("r.reclass", "ERROR: raster <clc> not found");

        assert!(ensure_base_workspace(&engine, &config).is_err());
        assert!(!is_ready(&config));
        assert!(!base_workspace(&config).location_path().exists());
        assert!(gisdb_entries(&config).is_empty());

        engine.clear_failure("r.reclass");
        ensure_base_workspace(&engine, &config).unwrap();

        assert!(is_ready(&config));
        assert_eq!(engine.locations().len(), 2);
        assert_eq!(gisdb_entries(&config), vec![config.workspace.location.clone()]);
        cleanup(&config);
    }

    #[test]
    fn build_in_progress_elsewhere_is_left_alone() {
        let config = config("inflight");
        let other = config
            .workspace
            .gisdb
            .join(".heatsrc.tmp-otherworker/PERMANENT/cellhd");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(other.join(CLC_RASTER), b"partial").unwrap();
        let engine = RecordingEngine::new();

        ensure_base_workspace(&engine, &config).unwrap();

        assert!(is_ready(&config));
        assert!(other.join(CLC_RASTER).is_file());
        assert_eq!(engine.locations().len(), 1);
        assert_ne!(
            engine.locations()[0],
            base_workspace(&config).location_path()
        );
        cleanup(&config);
    }

    #[test]
    fn unmarked_location_is_replaced() {
        let config = config("unmarked");
        let leftover = base_workspace(&config).path().join("cellhd");
        std::fs::create_dir_all(&leftover).unwrap();
        std::fs::write(leftover.join(CLC_RASTER), b"partial").unwrap();
        let engine = RecordingEngine::new();

        ensure_base_workspace(&engine, &config).unwrap();

        assert!(is_ready(&config));
        assert!(!leftover.join(CLC_RASTER).exists());
        assert_eq!(gisdb_entries(&config), vec![config.workspace.location.clone()]);
        cleanup(&config);
    }

    /// Commits a complete base location, as another process would, while
    /// this one is still building its own.
    struct RacingEngine {
        inner: RecordingEngine,
        final_location: std::path::PathBuf,
    }

    impl GeoEngine for RacingEngine {
        fn create_location(
            &self,
            gisdb: &Path,
            location: &str,
            epsg: u32,
        ) -> Result<(), heatsrc_engine::EngineError> {
            let permanent = self.final_location.join(heatsrc_engine::PERMANENT_MAPSET);
            std::fs::create_dir_all(&permanent).unwrap();
            std::fs::write(self.final_location.join(READY_MARKER), b"ok\n").unwrap();
            std::fs::write(permanent.join("winner"), b"").unwrap();
            self.inner.create_location(gisdb, location, epsg)
        }

        fn create_mapset(&self, workspace: &Workspace) -> Result<(), heatsrc_engine::EngineError> {
            self.inner.create_mapset(workspace)
        }

        fn remove_mapset(&self, workspace: &Workspace) -> Result<(), heatsrc_engine::EngineError> {
            self.inner.remove_mapset(workspace)
        }

        fn execute(
            &self,
            workspace: &Workspace,
            command: &EngineCommand,
        ) -> Result<String, heatsrc_engine::EngineError> {
            self.inner.execute(workspace, command)
        }
    }

    #[test]
    fn location_committed_concurrently_is_reused() {
        let config = config("racing");
        let engine = RacingEngine {
            inner: RecordingEngine::new(),
            final_location: base_workspace(&config).location_path(),
        };

        ensure_base_workspace(&engine, &config).unwrap();

        assert!(is_ready(&config));
        assert!(base_workspace(&config).path().join("winner").is_file());
        assert_eq!(gisdb_entries(&config), vec![config.workspace.location.clone()]);
        cleanup(&config);
    }

    #[test]
    fn concurrent_initialization_builds_once() {
        let config = config("threads");
        let engine = RecordingEngine::new();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| ensure_base_workspace(&engine, &config).unwrap());
            }
        });

        assert_eq!(engine.locations().len(), 1);
        assert_eq!(engine.count("r.reclass"), 1);
        cleanup(&config);
    }
}
