//! Session facade over one engine workspace.
//!
//! A [`Session`] opened with [`Session::ephemeral`] owns a freshly created
//! mapset and deletes it when closed or dropped, whichever path the
//! caller leaves through. [`Session::attach`] wraps an existing workspace
//! (the shared base) and never deletes it.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{ColumnDef, EngineCommand, EngineError, GeoEngine, Table, VectorFormat, Workspace};

/// Name of a vector layer inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerHandle(String);

impl LayerHandle {
    /// Layer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a raster map visible from a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RasterHandle(String);

impl RasterHandle {
    /// Refers to a raster by name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Raster name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Right-hand side of a SQL assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// Quoted string literal.
    Text(String),
    /// Numeric literal.
    Number(f64),
    /// Expression inserted verbatim (e.g. `COALESCE(power, 0)`).
    Raw(String),
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Number(n) => write!(f, "{n}"),
            Self::Raw(s) => f.write_str(s),
        }
    }
}

/// `column = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Target column.
    pub column: String,
    /// Value expression.
    pub value: SqlExpr,
}

impl Assignment {
    /// Creates an assignment.
    #[must_use]
    pub fn new(column: &str, value: SqlExpr) -> Self {
        Self {
            column: column.to_string(),
            value,
        }
    }
}

/// One `UPDATE ... SET ... WHERE predicate` in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUpdate {
    /// SQL predicate selecting the rows.
    pub predicate: String,
    /// Columns to set.
    pub assignments: Vec<Assignment>,
}

impl AttributeUpdate {
    fn to_sql(&self, table: &str) -> String {
        let sets = self
            .assignments
            .iter()
            .map(|a| format!("{} = {}", a.column, a.value))
            .collect::<Vec<_>>()
            .join(", ");
        format!("UPDATE {table} SET {sets} WHERE {};", self.predicate)
    }
}

/// Renders a batch of updates as one transaction.
#[must_use]
pub fn batch_script(table: &str, updates: &[AttributeUpdate]) -> String {
    let mut sql = String::from("BEGIN TRANSACTION;\n");
    for update in updates {
        sql.push_str(&update.to_sql(table));
        sql.push('\n');
    }
    sql.push_str("COMMIT;\n");
    sql
}

/// Narrow command surface bound to one workspace.
pub struct Session<'a> {
    engine: &'a dyn GeoEngine,
    workspace: Workspace,
    ephemeral: bool,
    closed: bool,
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("workspace", &self.workspace)
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

impl<'a> Session<'a> {
    /// Creates a new mapset in `gisdb/location` and binds a session to it.
    /// The mapset is removed when the session is closed or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the mapset cannot be created.
    pub fn ephemeral(
        engine: &'a dyn GeoEngine,
        gisdb: &Path,
        location: &str,
        mapset: &str,
    ) -> Result<Self, EngineError> {
        let workspace = Workspace::new(gisdb, location, mapset);
        engine.create_mapset(&workspace)?;
        Ok(Self {
            engine,
            workspace,
            ephemeral: true,
            closed: false,
        })
    }

    /// Binds a session to an existing workspace without taking ownership.
    #[must_use]
    pub fn attach(engine: &'a dyn GeoEngine, workspace: Workspace) -> Self {
        Self {
            engine,
            workspace,
            ephemeral: false,
            closed: false,
        }
    }

    /// The bound workspace.
    #[must_use]
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn run(&self, command: &EngineCommand) -> Result<String, EngineError> {
        log::debug!(
            "[{}] {}",
            self.workspace.mapset,
            command.to_module_call()
        );
        self.engine.execute(&self.workspace, command)
    }

    /// Imports a vector file as a layer named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the import fails.
    pub fn import_vector(&self, path: &Path, name: &str) -> Result<LayerHandle, EngineError> {
        log::info!("» Importing: {name} from {}", path.display());
        self.run(&EngineCommand::ImportVector {
            input: path.to_path_buf(),
            output: name.to_string(),
        })?;
        Ok(LayerHandle(name.to_string()))
    }

    /// Imports a raster file as a map named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the import fails.
    pub fn import_raster(&self, path: &Path, name: &str) -> Result<RasterHandle, EngineError> {
        log::info!("» Importing: {name} from {}", path.display());
        self.run(&EngineCommand::ImportRaster {
            input: path.to_path_buf(),
            output: name.to_string(),
        })?;
        Ok(RasterHandle::new(name))
    }

    /// Reclassifies `input` into `output` with textual rules.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the reclassification fails.
    pub fn reclass(
        &self,
        input: &RasterHandle,
        output: &str,
        title: &str,
        rules: &str,
    ) -> Result<RasterHandle, EngineError> {
        self.run(&EngineCommand::Reclass {
            input: input.name().to_string(),
            output: output.to_string(),
            title: title.to_string(),
            rules: rules.to_string(),
        })?;
        Ok(RasterHandle::new(output))
    }

    /// Aligns the computational region to a raster, extends it over a
    /// layer and grows it by `grow` cells.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if either region call fails.
    pub fn fit_region(
        &self,
        raster: &RasterHandle,
        layer: &LayerHandle,
        grow: u32,
    ) -> Result<(), EngineError> {
        self.run(&EngineCommand::SetRegion {
            align: Some(raster.name().to_string()),
            vector: Some(layer.name().to_string()),
            grow: None,
        })?;
        self.run(&EngineCommand::SetRegion {
            align: None,
            vector: None,
            grow: Some(grow),
        })?;
        Ok(())
    }

    /// Buffers `sites` by `distance` meters, sums the `urban` raster inside
    /// each buffer and joins the sum back onto `sites`.
    ///
    /// Returns the name of the joined sum column (`dist<d>m_sum`). Buffers
    /// that contain no urban cell get `0` instead of NULL.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if any of the underlying commands fail.
    pub fn buffer_and_join(
        &self,
        sites: &LayerHandle,
        distance: u32,
        urban: &RasterHandle,
    ) -> Result<String, EngineError> {
        let buffered = format!("{sites}__buf{distance}m");
        let prefix = format!("dist{distance}m");
        let column = format!("{prefix}_sum");

        self.run(&EngineCommand::Buffer {
            input: sites.name().to_string(),
            output: buffered.clone(),
            distance: f64::from(distance),
        })?;
        self.run(&EngineCommand::RasterStats {
            map: buffered.clone(),
            raster: urban.name().to_string(),
            column_prefix: prefix,
            method: "sum".to_string(),
        })?;
        self.run(&EngineCommand::Execute {
            sql: format!("UPDATE {buffered} SET {column} = 0 WHERE {column} IS NULL"),
        })?;
        self.run(&EngineCommand::Join {
            map: sites.name().to_string(),
            column: "cat".to_string(),
            other_table: buffered,
            other_column: "cat".to_string(),
            subset_columns: vec![column.clone()],
        })?;

        Ok(column)
    }

    /// Adds attribute columns to a layer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the engine rejects the columns.
    pub fn add_columns(&self, layer: &LayerHandle, columns: &[ColumnDef]) -> Result<(), EngineError> {
        self.run(&EngineCommand::AddColumns {
            map: layer.name().to_string(),
            columns: columns.to_vec(),
        })?;
        Ok(())
    }

    /// Applies all updates to a layer's attribute table in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the engine fails the script; no update of
    /// the batch is kept in that case.
    pub fn batch_update(
        &self,
        layer: &LayerHandle,
        updates: &[AttributeUpdate],
    ) -> Result<(), EngineError> {
        if updates.is_empty() {
            return Ok(());
        }
        self.run(&EngineCommand::Execute {
            sql: batch_script(layer.name(), updates),
        })?;
        Ok(())
    }

    /// Runs a raw select.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the query fails or its output is malformed.
    pub fn query(&self, sql: &str) -> Result<Table, EngineError> {
        let output = self.run(&EngineCommand::Query {
            sql: sql.to_string(),
        })?;
        Table::parse_pipe(&output)
    }

    /// Lists a layer's attribute column names.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the listing fails.
    pub fn column_names(&self, layer: &LayerHandle) -> Result<Vec<String>, EngineError> {
        let output = self.run(&EngineCommand::ListColumns {
            table: layer.name().to_string(),
        })?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Renames one attribute column.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the rename fails.
    pub fn rename_column(&self, layer: &LayerHandle, from: &str, to: &str) -> Result<(), EngineError> {
        self.run(&EngineCommand::RenameColumn {
            map: layer.name().to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })?;
        Ok(())
    }

    /// Exports a layer to `output`.
    ///
    /// Point layers cannot be written as polygons, so the layer is first
    /// buffered by `buffer_distance` meters and the buffer is exported.
    /// Returns the path of the written file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the buffer or export fails.
    pub fn export_vector(
        &self,
        layer: &LayerHandle,
        buffer_distance: f64,
        format: VectorFormat,
        output: &Path,
    ) -> Result<PathBuf, EngineError> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }

        let buffered = format!("{layer}__buffer");
        self.run(&EngineCommand::Buffer {
            input: layer.name().to_string(),
            output: buffered.clone(),
            distance: buffer_distance,
        })?;
        self.run(&EngineCommand::Export {
            input: buffered,
            output: output.to_path_buf(),
            format,
        })?;

        log::info!("Exported output to {}", output.display());
        Ok(output.to_path_buf())
    }

    /// Closes the session, removing the workspace if the session owns it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the workspace cannot be removed.
    pub fn close(mut self) -> Result<(), EngineError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.ephemeral {
            log::debug!("Removing mapset {}", self.workspace.path().display());
            self.engine.remove_mapset(&self.workspace)?;
        }
        Ok(())
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::warn!(
                "Failed to remove mapset {}: {e}",
                self.workspace.path().display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingEngine;

    fn gisdb(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("heatsrc_session_{name}"))
    }

    #[test]
    fn text_literals_are_escaped() {
        assert_eq!(SqlExpr::Text("O'Brien".to_string()).to_string(), "'O''Brien'");
        assert_eq!(SqlExpr::Number(0.8).to_string(), "0.8");
    }

    #[test]
    fn batch_script_is_one_transaction() {
        let script = batch_script(
            "wwtp",
            &[AttributeUpdate {
                predicate: "cat IN (1, 2)".to_string(),
                assignments: vec![
                    Assignment::new("suitability", SqlExpr::Text("Suitable".to_string())),
                    Assignment::new("opacity", SqlExpr::Number(0.8)),
                ],
            }],
        );
        assert_eq!(
            script,
            "BEGIN TRANSACTION;\n\
             UPDATE wwtp SET suitability = 'Suitable', opacity = 0.8 WHERE cat IN (1, 2);\n\
             COMMIT;\n"
        );
    }

    #[test]
    fn ephemeral_session_is_removed_on_drop() {
        let root = gisdb("drop");
        let _ = std::fs::remove_dir_all(&root);
        let engine = RecordingEngine::new();
        engine.create_location(&root, "loc", 3035).unwrap();

        let path = {
            let session = Session::ephemeral(&engine, &root, "loc", "mset_drop").unwrap();
            let path = session.workspace().path();
            assert!(path.exists());
            path
        };

        assert!(!path.exists());
        assert_eq!(engine.removed_mapsets().len(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn attached_session_is_never_removed() {
        let root = gisdb("attach");
        let _ = std::fs::remove_dir_all(&root);
        let engine = RecordingEngine::new();
        engine.create_location(&root, "loc", 3035).unwrap();

        let session = Session::attach(&engine, Workspace::permanent(&root, "loc"));
        session.close().unwrap();

        assert!(engine.removed_mapsets().is_empty());
        assert!(root.join("loc/PERMANENT").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn buffer_and_join_names_sum_column() {
        let root = gisdb("buffer");
        let engine = RecordingEngine::new();
        let session = Session::attach(&engine, Workspace::permanent(&root, "loc"));

        let column = session
            .buffer_and_join(
                &LayerHandle("wwtp".to_string()),
                150,
                &RasterHandle::new("urbanareas"),
            )
            .unwrap();

        assert_eq!(column, "dist150m_sum");
        assert_eq!(
            engine.modules(),
            vec!["v.buffer", "v.rast.stats", "db.execute", "v.db.join"]
        );
    }

    #[test]
    fn failing_command_still_tears_down() {
        let root = gisdb("fail");
        let _ = std::fs::remove_dir_all(&root);
        let engine = RecordingEngine::new();
        engine.create_location(&root, "loc", 3035).unwrap();
        engine.fail_on("v.import", "ERROR: file not found");

        let result = {
            let session = Session::ephemeral(&engine, &root, "loc", "mset_fail").unwrap();
            session.import_vector(Path::new("/missing.geojson"), "wwtp")
        };

        assert!(matches!(result, Err(EngineError::CommandFailed { .. })));
        assert!(!root.join("loc/mset_fail").exists());
        let _ = std::fs::remove_dir_all(&root);
    }
}
