//! Typed engine commands and their rendering into GRASS module calls.

use std::fmt;
use std::path::PathBuf;

/// A column to add to an attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// SQL type, e.g. `varchar(16)` or `DOUBLE PRECISION`.
    pub sql_type: String,
}

impl ColumnDef {
    /// Creates a column definition.
    #[must_use]
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
        }
    }
}

/// Interchange formats the export step can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorFormat {
    /// ESRI Shapefile (`.shp` + `.shx` + `.dbf` + `.prj`).
    EsriShapefile,
}

impl VectorFormat {
    /// OGR driver name.
    #[must_use]
    pub const fn driver(self) -> &'static str {
        match self {
            Self::EsriShapefile => "ESRI_Shapefile",
        }
    }

    /// Extension of the main output file.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::EsriShapefile => "shp",
        }
    }

    /// Maximum attribute name length the format accepts.
    #[must_use]
    pub const fn max_column_name_len(self) -> usize {
        match self {
            Self::EsriShapefile => 10,
        }
    }
}

/// Every operation the pipeline asks of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// Import a raster file as a named map.
    ImportRaster { input: PathBuf, output: String },
    /// Import a vector file as a named layer.
    ImportVector { input: PathBuf, output: String },
    /// Reclassify a raster with textual rules.
    Reclass {
        input: String,
        output: String,
        title: String,
        rules: String,
    },
    /// Set the computational region.
    SetRegion {
        align: Option<String>,
        vector: Option<String>,
        grow: Option<u32>,
    },
    /// Buffer every feature of a layer into a new layer.
    Buffer {
        input: String,
        output: String,
        distance: f64,
    },
    /// Aggregate raster cells inside each polygon into attribute columns.
    RasterStats {
        map: String,
        raster: String,
        column_prefix: String,
        method: String,
    },
    /// Join columns of another table onto a layer.
    Join {
        map: String,
        column: String,
        other_table: String,
        other_column: String,
        subset_columns: Vec<String>,
    },
    /// Add attribute columns to a layer.
    AddColumns { map: String, columns: Vec<ColumnDef> },
    /// Rename one attribute column.
    RenameColumn {
        map: String,
        from: String,
        to: String,
    },
    /// List the column names of a table, one per line.
    ListColumns { table: String },
    /// Execute SQL statements (no result set).
    Execute { sql: String },
    /// Run a select and return a pipe-delimited table with a header row.
    Query { sql: String },
    /// Write a layer to an interchange file.
    Export {
        input: String,
        output: PathBuf,
        format: VectorFormat,
    },
}

impl EngineCommand {
    /// Engine module that implements this command.
    #[must_use]
    pub const fn module(&self) -> &'static str {
        match self {
            Self::ImportRaster { .. } => "r.import",
            Self::ImportVector { .. } => "v.import",
            Self::Reclass { .. } => "r.reclass",
            Self::SetRegion { .. } => "g.region",
            Self::Buffer { .. } => "v.buffer",
            Self::RasterStats { .. } => "v.rast.stats",
            Self::Join { .. } => "v.db.join",
            Self::AddColumns { .. } => "v.db.addcolumn",
            Self::RenameColumn { .. } => "v.db.renamecolumn",
            Self::ListColumns { .. } => "db.columns",
            Self::Execute { .. } => "db.execute",
            Self::Query { .. } => "db.select",
            Self::Export { .. } => "v.out.ogr",
        }
    }

    /// Renders the command as a module invocation.
    #[must_use]
    pub fn to_module_call(&self) -> ModuleCall {
        let mut call = ModuleCall::new(self.module());
        match self {
            Self::ImportRaster { input, output } | Self::ImportVector { input, output } => {
                call.arg("input", input.display());
                call.arg("output", output);
            }
            Self::Reclass {
                input,
                output,
                title,
                rules,
            } => {
                call.arg("input", input);
                call.arg("output", output);
                call.arg("rules", "-");
                call.arg("title", title);
                call.stdin = Some(rules.clone());
            }
            Self::SetRegion {
                align,
                vector,
                grow,
            } => {
                if let Some(align) = align {
                    call.arg("align", align);
                }
                if let Some(vector) = vector {
                    call.arg("vector", vector);
                }
                if let Some(grow) = grow {
                    call.arg("grow", grow);
                }
            }
            Self::Buffer {
                input,
                output,
                distance,
            } => {
                call.arg("input", input);
                call.arg("output", output);
                call.arg("distance", distance);
                // keep the attribute table so cats survive the buffer
                call.flags = Some("t");
            }
            Self::RasterStats {
                map,
                raster,
                column_prefix,
                method,
            } => {
                call.arg("map", map);
                call.arg("raster", raster);
                call.arg("column_prefix", column_prefix);
                call.arg("method", method);
            }
            Self::Join {
                map,
                column,
                other_table,
                other_column,
                subset_columns,
            } => {
                call.arg("map", map);
                call.arg("column", column);
                call.arg("other_table", other_table);
                call.arg("other_column", other_column);
                call.arg("subset_columns", subset_columns.join(","));
            }
            Self::AddColumns { map, columns } => {
                call.arg("map", map);
                call.arg(
                    "columns",
                    columns
                        .iter()
                        .map(|c| format!("{} {}", c.name, c.sql_type))
                        .collect::<Vec<_>>()
                        .join(","),
                );
            }
            Self::RenameColumn { map, from, to } => {
                call.arg("map", map);
                call.arg("column", format!("{from},{to}"));
            }
            Self::ListColumns { table } => {
                call.arg("table", table);
            }
            Self::Execute { sql } => {
                call.arg("input", "-");
                call.stdin = Some(sql.clone());
            }
            Self::Query { sql } => {
                call.arg("sql", sql);
                call.arg("separator", "pipe");
                call.arg("null_value", "");
            }
            Self::Export {
                input,
                output,
                format,
            } => {
                call.arg("input", input);
                call.arg("output", output.display());
                call.arg("format", format.driver());
            }
        }
        call
    }
}

/// A module name with `key=value` arguments, optional flags and stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCall {
    /// Module name.
    pub module: &'static str,
    /// Named arguments in insertion order.
    pub args: Vec<(&'static str, String)>,
    /// Single-letter flags, without the leading dash.
    pub flags: Option<&'static str>,
    /// Text fed to the module's standard input.
    pub stdin: Option<String>,
}

impl ModuleCall {
    fn new(module: &'static str) -> Self {
        Self {
            module,
            args: Vec::new(),
            flags: None,
            stdin: None,
        }
    }

    fn arg(&mut self, key: &'static str, value: impl fmt::Display) {
        self.args.push((key, value.to_string()));
    }

    /// Command-line arguments following the module name.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if let Some(flags) = self.flags {
            out.push(format!("-{flags}"));
        }
        out.push("--quiet".to_string());
        out
    }
}

impl fmt::Display for ModuleCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.module, self.to_args().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keeps_table() {
        let call = EngineCommand::Buffer {
            input: "wwtp".to_string(),
            output: "wwtp__buf150m".to_string(),
            distance: 150.0,
        }
        .to_module_call();

        assert_eq!(call.module, "v.buffer");
        assert_eq!(
            call.to_args(),
            vec![
                "input=wwtp",
                "output=wwtp__buf150m",
                "distance=150",
                "-t",
                "--quiet"
            ]
        );
    }

    #[test]
    fn add_columns_joins_definitions() {
        let call = EngineCommand::AddColumns {
            map: "wwtp".to_string(),
            columns: vec![
                ColumnDef::new("suitability", "varchar(16)"),
                ColumnDef::new("opacity", "DOUBLE PRECISION"),
            ],
        }
        .to_module_call();

        assert!(
            call.args
                .contains(&("columns", "suitability varchar(16),opacity DOUBLE PRECISION".to_string()))
        );
    }

    #[test]
    fn sql_scripts_go_through_stdin() {
        let call = EngineCommand::Execute {
            sql: "UPDATE wwtp SET a = 1;".to_string(),
        }
        .to_module_call();
        assert_eq!(call.stdin.as_deref(), Some("UPDATE wwtp SET a = 1;"));
        assert!(call.args.contains(&("input", "-".to_string())));
    }

    #[test]
    fn rename_uses_comma_pair() {
        let call = EngineCommand::RenameColumn {
            map: "wwtp".to_string(),
            from: "suitability".to_string(),
            to: "suitabilit".to_string(),
        }
        .to_module_call();
        assert_eq!(
            call.to_string(),
            "v.db.renamecolumn map=wwtp column=suitability,suitabilit --quiet"
        );
    }

    #[test]
    fn shapefile_name_limit() {
        assert_eq!(VectorFormat::EsriShapefile.max_column_name_len(), 10);
        assert_eq!(VectorFormat::EsriShapefile.extension(), "shp");
    }
}
