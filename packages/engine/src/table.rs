//! Tabular query results.
//!
//! `db.select` prints a header row followed by one line per record, with
//! values separated by `|` and NULLs rendered as empty strings.

use crate::EngineError;

/// A parsed query result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Parses delimited text with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parse`] if a row has a different number of
    /// fields than the header.
    pub fn parse(text: &str, delimiter: u8) -> Result<Self, EngineError> {
        let parse_err = |e: csv::Error| EngineError::Parse {
            module: "db.select".to_string(),
            message: e.to_string(),
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .quoting(false)
            .has_headers(true)
            .from_reader(text.as_bytes());

        let columns = reader
            .headers()
            .map_err(parse_err)?
            .iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(parse_err)?;
            rows.push(record.iter().map(|v| v.trim().to_string()).collect());
        }

        Ok(Self { columns, rows })
    }

    /// Parses the pipe-delimited output of a query command.
    ///
    /// # Errors
    ///
    /// See [`Table::parse`].
    pub fn parse_pipe(text: &str) -> Result<Self, EngineError> {
        Self::parse(text, b'|')
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, by exact name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterates rows as named records.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|row| Record { table: self, row })
    }
}

/// One row of a [`Table`].
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    table: &'a Table,
    row: &'a [String],
}

impl Record<'_> {
    /// Raw value of a column; empty values (NULL) come back as `None`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.table
            .column_index(column)
            .and_then(|i| self.row.get(i))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Numeric value of a column.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parse`] if the column is missing from the
    /// result or its value is not a number.
    pub fn get_f64(&self, column: &str) -> Result<Option<f64>, EngineError> {
        self.require(column)?;
        self.get(column)
            .map(|v| {
                v.parse::<f64>().map_err(|e| EngineError::Parse {
                    module: "db.select".to_string(),
                    message: format!("column {column}: '{v}': {e}"),
                })
            })
            .transpose()
    }

    /// Integer value of a column.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Parse`] if the column is missing from the
    /// result or its value is not an integer.
    pub fn get_i64(&self, column: &str) -> Result<Option<i64>, EngineError> {
        self.require(column)?;
        self.get(column)
            .map(|v| {
                v.parse::<i64>().map_err(|e| EngineError::Parse {
                    module: "db.select".to_string(),
                    message: format!("column {column}: '{v}': {e}"),
                })
            })
            .transpose()
    }

    fn require(&self, column: &str) -> Result<(), EngineError> {
        if self.table.column_index(column).is_none() {
            return Err(EngineError::Parse {
                module: "db.select".to_string(),
                message: format!("missing column {column}"),
            });
        }
        Ok(())
    }
}
