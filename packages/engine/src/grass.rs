//! [`GeoEngine`] backed by the `grass` executable.
//!
//! Locations and mapsets are created with `grass -c ... -e`, modules are
//! run with `grass <mapset path> --exec <module> key=value ...`.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::{EngineCommand, EngineError, GeoEngine, Workspace};

/// Runs engine commands through a GRASS GIS installation.
#[derive(Debug, Clone)]
pub struct GrassEngine {
    executable: PathBuf,
}

impl Default for GrassEngine {
    fn default() -> Self {
        Self::new("grass")
    }
}

impl GrassEngine {
    /// Creates an adapter that launches `executable`.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    fn run(&self, module: &str, args: &[String], stdin: Option<&str>) -> Result<Output, EngineError> {
        let program = self.executable.display().to_string();
        log::debug!("» {program} {}", args.join(" "));

        let mut child = Command::new(&self.executable)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(text.as_bytes())
                .map_err(|source| EngineError::Spawn {
                    program: program.clone(),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|source| EngineError::Spawn { program, source })?;

        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                module: module.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

impl GeoEngine for GrassEngine {
    fn create_location(
        &self,
        gisdb: &Path,
        location: &str,
        epsg: u32,
    ) -> Result<(), EngineError> {
        std::fs::create_dir_all(gisdb).map_err(|e| EngineError::io(gisdb, e))?;
        let path = gisdb.join(location);
        log::info!("» Creating location {} (EPSG:{epsg})", path.display());
        self.run(
            "grass -c",
            &[
                "-c".to_string(),
                format!("EPSG:{epsg}"),
                "-e".to_string(),
                path.display().to_string(),
            ],
            None,
        )?;
        Ok(())
    }

    fn create_mapset(&self, workspace: &Workspace) -> Result<(), EngineError> {
        log::info!("» Creating mapset {}", workspace.path().display());
        self.run(
            "grass -c",
            &[
                "-c".to_string(),
                "-e".to_string(),
                workspace.path().display().to_string(),
            ],
            None,
        )?;
        Ok(())
    }

    fn remove_mapset(&self, workspace: &Workspace) -> Result<(), EngineError> {
        let path = workspace.path();
        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|e| EngineError::io(&path, e))?;
        }
        Ok(())
    }

    fn execute(
        &self,
        workspace: &Workspace,
        command: &EngineCommand,
    ) -> Result<String, EngineError> {
        let call = command.to_module_call();

        let mut args = vec![
            workspace.path().display().to_string(),
            "--exec".to_string(),
            call.module.to_string(),
        ];
        args.extend(call.to_args());

        let output = self.run(call.module, &args, call.stdin.as_deref())?;

        String::from_utf8(output.stdout).map_err(|e| EngineError::Parse {
            module: call.module.to_string(),
            message: e.to_string(),
        })
    }
}
