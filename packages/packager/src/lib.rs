#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Hands an exported shapefile set to the caller.
//!
//! A shapefile is only usable with its companions, so the packager either
//! delivers the whole set (copied under a fresh name and zipped) or
//! nothing. The zip is written to a temporary file and renamed into place.

use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Files that make up one shapefile artifact.
pub const COMPANION_EXTENSIONS: &[&str] = &["shp", "shx", "dbf", "prj"];

/// Errors that can occur while packaging.
#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    /// A file of the artifact set does not exist.
    #[error("Missing companion file {path}")]
    MissingCompanion {
        /// Expected path of the file.
        path: String,
    },

    /// The artifact path has no file name or parent directory.
    #[error("Invalid artifact path {path}")]
    InvalidArtifact {
        /// The offending path.
        path: String,
    },

    /// Filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing the archive failed.
    #[error("Zip error at {path}: {source}")]
    Zip {
        /// Archive path.
        path: String,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
}

impl PackagingError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// A fresh identifier for delivered files.
#[must_use]
pub fn new_identifier() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Paths of every file in the artifact set of `artifact`.
///
/// # Errors
///
/// Returns [`PackagingError::InvalidArtifact`] if `artifact` has no file
/// stem or parent directory.
pub fn companion_paths(artifact: &Path) -> Result<Vec<PathBuf>, PackagingError> {
    let invalid = || PackagingError::InvalidArtifact {
        path: artifact.display().to_string(),
    };
    let dir = artifact.parent().ok_or_else(invalid)?;
    let stem = artifact
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;

    Ok(COMPANION_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .collect())
}

/// Copies the artifact set into `output_dir` as `<new_identifier>.<ext>`
/// and bundles the copies into `<new_identifier>.zip`.
///
/// Returns the archive path.
///
/// # Errors
///
/// Returns [`PackagingError::MissingCompanion`] before writing anything if
/// a file of the set is absent. Any later failure removes what was
/// already written, so no partial set or archive is left behind.
pub fn package_for_caller(
    artifact: &Path,
    new_identifier: &str,
    output_dir: &Path,
) -> Result<PathBuf, PackagingError> {
    let sources = companion_paths(artifact)?;
    if let Some(missing) = sources.iter().find(|p| !p.is_file()) {
        return Err(PackagingError::MissingCompanion {
            path: missing.display().to_string(),
        });
    }

    std::fs::create_dir_all(output_dir).map_err(|e| PackagingError::io(output_dir, e))?;

    let archive = output_dir.join(format!("{new_identifier}.zip"));
    let tmp = output_dir.join(format!("{new_identifier}.zip.tmp"));
    let mut written = Vec::with_capacity(sources.len());

    let result = copy_set(&sources, new_identifier, output_dir, &mut written)
        .and_then(|()| write_zip(&tmp, &written))
        .and_then(|()| std::fs::rename(&tmp, &archive).map_err(|e| PackagingError::io(&archive, e)));

    if let Err(e) = result {
        log::warn!("Packaging {} failed: {e}", artifact.display());
        for path in written.iter().chain(std::iter::once(&tmp)) {
            let _ = std::fs::remove_file(path);
        }
        return Err(e);
    }

    log::info!("Packaged {} into {}", artifact.display(), archive.display());
    Ok(archive)
}

fn copy_set(
    sources: &[PathBuf],
    new_identifier: &str,
    output_dir: &Path,
    written: &mut Vec<PathBuf>,
) -> Result<(), PackagingError> {
    for source in sources {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let target = output_dir.join(format!("{new_identifier}.{ext}"));
        // recorded first so a copy that fails midway is still cleaned up
        written.push(target.clone());
        std::fs::copy(source, &target).map_err(|e| PackagingError::io(source, e))?;
    }
    Ok(())
}

fn write_zip(path: &Path, files: &[PathBuf]) -> Result<(), PackagingError> {
    let zip_err = |source: zip::result::ZipError| PackagingError::Zip {
        path: path.display().to_string(),
        source,
    };

    let file = std::fs::File::create(path).map_err(|e| PackagingError::io(path, e))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for source in files {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PackagingError::InvalidArtifact {
                path: source.display().to_string(),
            })?;
        let data = std::fs::read(source).map_err(|e| PackagingError::io(source, e))?;
        writer.start_file(name, options).map_err(zip_err)?;
        writer
            .write_all(&data)
            .map_err(|e| PackagingError::io(path, e))?;
    }

    writer.finish().map_err(zip_err)?;
    Ok(())
}
