//! In-memory [`GeoEngine`] that records commands instead of running GRASS.
//!
//! Locations and mapsets are mirrored as plain directories so workspace
//! lifecycle can be observed on disk. Attribute columns are tracked per
//! table, query results are scripted, and exports write empty shapefile
//! companion files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{EngineCommand, EngineError, GeoEngine, Workspace};

/// Companion files written for every shapefile export.
const SHAPEFILE_PARTS: &[&str] = &["shp", "shx", "dbf", "prj"];

/// A command together with the workspace it ran in.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    /// Workspace the command targeted.
    pub workspace: Workspace,
    /// The command itself.
    pub command: EngineCommand,
}

#[derive(Debug, Default)]
struct State {
    commands: Vec<RecordedCommand>,
    queries: Vec<(String, String)>,
    failures: BTreeMap<&'static str, String>,
    import_columns: Vec<String>,
    tables: BTreeMap<String, Vec<String>>,
    locations: Vec<PathBuf>,
    created_mapsets: Vec<Workspace>,
    removed_mapsets: Vec<Workspace>,
}

/// Test double for the geoprocessing engine.
#[derive(Debug)]
pub struct RecordingEngine {
    state: Mutex<State>,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    /// Creates an engine whose imported vectors carry `cat`, `capacity` and
    /// `power` columns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                import_columns: vec![
                    "cat".to_string(),
                    "capacity".to_string(),
                    "power".to_string(),
                ],
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers every query whose SQL starts with `sql_prefix` with `output`.
    pub fn respond_to_query(&self, sql_prefix: &str, output: &str) {
        self.state()
            .queries
            .push((sql_prefix.to_string(), output.to_string()));
    }

    /// Makes every call of `module` fail with `stderr`.
    pub fn fail_on(&self, module: &'static str, stderr: &str) {
        self.state().failures.insert(module, stderr.to_string());
    }

    /// Removes a failure installed with [`Self::fail_on`].
    pub fn clear_failure(&self, module: &'static str) {
        self.state().failures.remove(module);
    }

    /// Every command executed so far.
    #[must_use]
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state().commands.clone()
    }

    /// Module names of the executed commands, in order.
    #[must_use]
    pub fn modules(&self) -> Vec<&'static str> {
        self.state()
            .commands
            .iter()
            .map(|c| c.command.module())
            .collect()
    }

    /// Number of executed commands of one module.
    #[must_use]
    pub fn count(&self, module: &str) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|c| c.command.module() == module)
            .count()
    }

    /// Total number of engine interactions, including workspace lifecycle.
    #[must_use]
    pub fn interactions(&self) -> usize {
        let state = self.state();
        state.commands.len()
            + state.locations.len()
            + state.created_mapsets.len()
            + state.removed_mapsets.len()
    }

    /// Locations created so far.
    #[must_use]
    pub fn locations(&self) -> Vec<PathBuf> {
        self.state().locations.clone()
    }

    /// Mapsets created so far.
    #[must_use]
    pub fn created_mapsets(&self) -> Vec<Workspace> {
        self.state().created_mapsets.clone()
    }

    /// Mapsets removed so far.
    #[must_use]
    pub fn removed_mapsets(&self) -> Vec<Workspace> {
        self.state().removed_mapsets.clone()
    }

    /// Current column list of a table.
    #[must_use]
    pub fn table_columns(&self, table: &str) -> Vec<String> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    fn apply(state: &mut State, command: &EngineCommand) -> Result<String, EngineError> {
        match command {
            EngineCommand::ImportVector { output, .. } => {
                let columns = state.import_columns.clone();
                state.tables.insert(output.clone(), columns);
            }
            EngineCommand::Buffer { output, .. } => {
                state.tables.insert(output.clone(), vec!["cat".to_string()]);
            }
            EngineCommand::RasterStats {
                map,
                column_prefix,
                method,
                ..
            } => {
                state
                    .tables
                    .entry(map.clone())
                    .or_default()
                    .push(format!("{column_prefix}_{method}"));
            }
            EngineCommand::Join {
                map,
                subset_columns,
                ..
            } => {
                state
                    .tables
                    .entry(map.clone())
                    .or_default()
                    .extend(subset_columns.iter().cloned());
            }
            EngineCommand::AddColumns { map, columns } => {
                state
                    .tables
                    .entry(map.clone())
                    .or_default()
                    .extend(columns.iter().map(|c| c.name.clone()));
            }
            EngineCommand::RenameColumn { map, from, to } => {
                let columns = state.tables.entry(map.clone()).or_default();
                match columns.iter_mut().find(|c| c.as_str() == from.as_str()) {
                    Some(column) => column.clone_from(to),
                    None => {
                        return Err(EngineError::CommandFailed {
                            module: command.module().to_string(),
                            status: "exit status: 1".to_string(),
                            stderr: format!("ERROR: Column <{from}> not found in table <{map}>"),
                        });
                    }
                }
            }
            EngineCommand::ListColumns { table } => {
                return Ok(state
                    .tables
                    .get(table)
                    .map(|c| c.join("\n"))
                    .unwrap_or_default());
            }
            EngineCommand::Query { sql } => {
                return Ok(state
                    .queries
                    .iter()
                    .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
                    .map(|(_, output)| output.clone())
                    .unwrap_or_default());
            }
            EngineCommand::Export { output, .. } => write_shapefile_parts(output)?,
            EngineCommand::ImportRaster { .. }
            | EngineCommand::Reclass { .. }
            | EngineCommand::SetRegion { .. }
            | EngineCommand::Execute { .. } => {}
        }
        Ok(String::new())
    }
}

fn write_shapefile_parts(output: &Path) -> Result<(), EngineError> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
    }
    for ext in SHAPEFILE_PARTS {
        let part = output.with_extension(ext);
        std::fs::write(&part, ext.as_bytes()).map_err(|e| EngineError::io(&part, e))?;
    }
    Ok(())
}

impl GeoEngine for RecordingEngine {
    fn create_location(
        &self,
        gisdb: &Path,
        location: &str,
        _epsg: u32,
    ) -> Result<(), EngineError> {
        let path = gisdb.join(location);
        let permanent = path.join(crate::PERMANENT_MAPSET);
        std::fs::create_dir_all(&permanent).map_err(|e| EngineError::io(&permanent, e))?;
        self.state().locations.push(path);
        Ok(())
    }

    fn create_mapset(&self, workspace: &Workspace) -> Result<(), EngineError> {
        let path = workspace.path();
        std::fs::create_dir_all(&path).map_err(|e| EngineError::io(&path, e))?;
        self.state().created_mapsets.push(workspace.clone());
        Ok(())
    }

    fn remove_mapset(&self, workspace: &Workspace) -> Result<(), EngineError> {
        let path = workspace.path();
        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|e| EngineError::io(&path, e))?;
        }
        self.state().removed_mapsets.push(workspace.clone());
        Ok(())
    }

    fn execute(
        &self,
        workspace: &Workspace,
        command: &EngineCommand,
    ) -> Result<String, EngineError> {
        let mut state = self.state();
        state.commands.push(RecordedCommand {
            workspace: workspace.clone(),
            command: command.clone(),
        });

        if let Some(stderr) = state.failures.get(command.module()) {
            return Err(EngineError::CommandFailed {
                module: command.module().to_string(),
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            });
        }

        Self::apply(&mut state, command)
    }
}
