#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Runtime configuration for the heat source potential module.
//!
//! All paths the pipeline touches (engine database, reference rasters,
//! cache directory) live in one [`HeatsrcConfig`] that is built once at
//! startup and handed to each component.
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |---|---|
//! | `HEATSRC_CONFIG` | Path of a TOML file to load first |
//! | `HEATSRC_GISDB` | Overrides `workspace.gisdb` |
//! | `HEATSRC_CACHE_DIR` | Overrides `cache.root` |
//! | `HEATSRC_CLC_RASTER` | Overrides `data.clc_raster` |
//! | `HEATSRC_GRASS` | Overrides `engine.executable` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`HeatsrcConfig`].
    #[error("Invalid config {path}: {message}")]
    Parse {
        /// Path of the file.
        path: String,
        /// Parser message.
        message: String,
    },

    /// A required value was given neither in a file nor in the environment.
    #[error("Missing configuration value: {name}")]
    Missing {
        /// Name of the missing setting.
        name: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatsrcConfig {
    /// Engine database layout.
    pub workspace: WorkspaceConfig,
    /// Reference datasets.
    pub data: DataConfig,
    /// Result cache.
    pub cache: CacheConfig,
    /// Engine invocation.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Where the engine keeps its databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root directory holding all locations.
    pub gisdb: PathBuf,
    /// Name of the shared base location.
    #[serde(default = "default_location")]
    pub location: String,
    /// Projection of the base location.
    #[serde(default = "default_epsg")]
    pub epsg: u32,
}

/// Reference datasets imported into the base location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    /// CORINE land cover raster.
    pub clc_raster: PathBuf,
    /// Population density raster, imported alongside when present.
    #[serde(default)]
    pub popdens_raster: Option<PathBuf>,
    /// Land cover classes that count as urban.
    #[serde(default = "default_urban_categories")]
    pub urban_categories: Vec<u32>,
}

/// Result cache location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one subdirectory per parameter pair.
    pub root: PathBuf,
}

/// Engine invocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// GRASS launcher.
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    /// Cells added around the computational region.
    #[serde(default = "default_region_grow")]
    pub region_grow_cells: u32,
    /// Buffer (meters) applied to points before export.
    #[serde(default = "default_export_buffer")]
    pub export_buffer: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            region_grow_cells: default_region_grow(),
            export_buffer: default_export_buffer(),
        }
    }
}

fn default_location() -> String {
    "heatsrc".to_string()
}

const fn default_epsg() -> u32 {
    3035
}

fn default_urban_categories() -> Vec<u32> {
    // continuous urban fabric, discontinuous urban fabric,
    // industrial or commercial units
    vec![111, 112, 121]
}

fn default_executable() -> PathBuf {
    PathBuf::from("grass")
}

const fn default_region_grow() -> u32 {
    100
}

const fn default_export_buffer() -> f64 {
    1.0
}

impl HeatsrcConfig {
    /// Builds a configuration with defaults for everything but the paths.
    #[must_use]
    pub fn new(gisdb: impl Into<PathBuf>, clc_raster: impl Into<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace: WorkspaceConfig {
                gisdb: gisdb.into(),
                location: default_location(),
                epsg: default_epsg(),
            },
            data: DataConfig {
                clc_raster: clc_raster.into(),
                popdens_raster: None,
                urban_categories: default_urban_categories(),
            },
            cache: CacheConfig {
                root: cache_root.into(),
            },
            engine: EngineConfig::default(),
        }
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid config.
    pub fn from_toml(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::de::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&text, &path.display().to_string())?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the referenced file is unusable or a
    /// required path is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// A file named by `HEATSRC_CONFIG` is loaded first; the individual
    /// `HEATSRC_*` variables override its values or, without a file,
    /// supply them.
    ///
    /// # Errors
    ///
    /// See [`HeatsrcConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut config = match var("HEATSRC_CONFIG") {
            Some(path) => Self::load(Path::new(&path))?,
            None => {
                let require = |name: &str| {
                    var(name).ok_or_else(|| ConfigError::Missing {
                        name: name.to_string(),
                    })
                };
                Self::new(
                    require("HEATSRC_GISDB")?,
                    require("HEATSRC_CLC_RASTER")?,
                    require("HEATSRC_CACHE_DIR")?,
                )
            }
        };

        if let Some(gisdb) = var("HEATSRC_GISDB") {
            config.workspace.gisdb = PathBuf::from(gisdb);
        }
        if let Some(root) = var("HEATSRC_CACHE_DIR") {
            config.cache.root = PathBuf::from(root);
        }
        if let Some(clc) = var("HEATSRC_CLC_RASTER") {
            config.data.clc_raster = PathBuf::from(clc);
        }
        if let Some(grass) = var("HEATSRC_GRASS") {
            config.engine.executable = PathBuf::from(grass);
        }

        Ok(config)
    }
}
