#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Site classifier.
//!
//! Reads the site layer's attribute table back from the engine, runs every
//! site through the decision matrix and writes the derived attributes
//! (labels, power split, rendering style) into the same table as one
//! transaction. Export later reads these columns straight from the table.

use heatsrc_engine::{
    Assignment, AttributeUpdate, ColumnDef, EngineError, LayerHandle, Session, SqlExpr,
};
use heatsrc_suitability_models::{
    Classification, DistanceBucket, SizeBucket, Site, Suitability, lookup,
};

/// Opacity written for every classified site.
pub const OPACITY: f64 = 0.8;

/// Maximum number of ids per `cat IN (...)` predicate.
const CATS_PER_PREDICATE: usize = 500;

/// Columns the classifier writes, with their SQL types.
pub const CLASSIFICATION_COLUMNS: &[(&str, &str)] = &[
    ("suitability", "varchar(16)"),
    ("distance_label", "varchar(16)"),
    ("plantsize_label", "varchar(16)"),
    ("conditional", "DOUBLE PRECISION"),
    ("suitable", "DOUBLE PRECISION"),
    ("color", "varchar(16)"),
    ("fillColor", "varchar(16)"),
    ("opacity", "DOUBLE PRECISION"),
];

/// Errors raised while classifying a layer.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// An engine command failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A row of the attribute table has no category id.
    #[error("Layer {layer} has a feature without a category id (row {row})")]
    MissingCategory {
        /// Layer name.
        layer: String,
        /// Zero-based row index in the query result.
        row: usize,
    },
}

/// Column definitions for [`CLASSIFICATION_COLUMNS`].
#[must_use]
pub fn classification_columns() -> Vec<ColumnDef> {
    CLASSIFICATION_COLUMNS
        .iter()
        .map(|(name, sql_type)| ColumnDef::new(name, sql_type))
        .collect()
}

/// Classifies every site. Pure; the input is left untouched.
#[must_use]
pub fn apply_classification(sites: &[Site]) -> Vec<Site> {
    sites.iter().map(Site::classified).collect()
}

/// Builds the attribute updates for already classified sites.
///
/// Sites are grouped by matrix cell so each populated cell yields one
/// `UPDATE` (more for very large cells). Unmatched sites produce no update.
#[must_use]
pub fn updates_for(sites: &[Site]) -> Vec<AttributeUpdate> {
    let mut updates = Vec::new();

    for &size in SizeBucket::all() {
        for &distance in DistanceBucket::all() {
            let cell = Classification {
                size,
                distance,
                suitability: lookup(size, distance),
            };
            let cats = sites
                .iter()
                .filter(|s| s.classification == Some(cell))
                .map(|s| s.cat)
                .collect::<Vec<_>>();

            for chunk in cats.chunks(CATS_PER_PREDICATE) {
                let ids = chunk
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                updates.push(AttributeUpdate {
                    predicate: format!("cat IN ({ids})"),
                    assignments: assignments_for(cell),
                });
            }
        }
    }

    updates
}

fn assignments_for(cell: Classification) -> Vec<Assignment> {
    let power_if = |label: Suitability| {
        if cell.suitability == label {
            SqlExpr::Raw("COALESCE(power, 0)".to_string())
        } else {
            SqlExpr::Number(0.0)
        }
    };
    let text = |value: &str| SqlExpr::Text(value.to_string());

    vec![
        Assignment::new("suitability", text(cell.suitability.as_ref())),
        Assignment::new("distance_label", text(cell.distance.as_ref())),
        Assignment::new("plantsize_label", text(cell.size.as_ref())),
        Assignment::new("conditional", power_if(Suitability::Conditionally)),
        Assignment::new("suitable", power_if(Suitability::Suitable)),
        Assignment::new("color", text(cell.color())),
        Assignment::new("fillColor", text(cell.color())),
        Assignment::new("opacity", SqlExpr::Number(OPACITY)),
    ]
}

/// Reads the sites of a layer together with two joined buffer sums.
///
/// # Errors
///
/// Returns [`ClassifyError`] if the query fails, a value is not numeric,
/// or a feature has no category id.
pub fn read_sites(
    session: &Session<'_>,
    layer: &LayerHandle,
    within_column: &str,
    near_column: &str,
) -> Result<Vec<Site>, ClassifyError> {
    let table = session.query(&format!(
        "SELECT cat, capacity, power, {within_column}, {near_column} FROM {layer}"
    ))?;

    let mut sites = Vec::with_capacity(table.len());
    for (row, record) in table.records().enumerate() {
        let cat = record
            .get_i64("cat")?
            .ok_or_else(|| ClassifyError::MissingCategory {
                layer: layer.to_string(),
                row,
            })?;
        sites.push(Site::new(
            cat,
            record.get_f64("capacity")?,
            record.get_f64("power")?,
            record.get_f64(within_column)?.unwrap_or(0.0),
            record.get_f64(near_column)?.unwrap_or(0.0),
        ));
    }

    Ok(sites)
}

/// Classifies a site layer in place.
///
/// Adds any missing classification columns, reads the sites, classifies
/// them and writes every derived field in one transaction. Returns the
/// classified sites.
///
/// # Errors
///
/// Returns [`ClassifyError`] on any engine failure. The batch is
/// transactional, so a failed write leaves every site unchanged.
pub fn classify_layer(
    session: &Session<'_>,
    layer: &LayerHandle,
    within_column: &str,
    near_column: &str,
) -> Result<Vec<Site>, ClassifyError> {
    let existing = session.column_names(layer)?;
    let missing = classification_columns()
        .into_iter()
        .filter(|c| !existing.iter().any(|e| e.eq_ignore_ascii_case(&c.name)))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        session.add_columns(layer, &missing)?;
    }

    let sites = apply_classification(&read_sites(session, layer, within_column, near_column)?);

    let unmatched = sites.iter().filter(|s| s.classification.is_none()).count();
    if unmatched > 0 {
        log::warn!(
            "{unmatched} of {} sites in {layer} match no decision matrix cell",
            sites.len()
        );
    }

    session.batch_update(layer, &updates_for(&sites))?;
    log::info!(
        "Classified {} sites in {layer}",
        sites.len() - unmatched
    );

    Ok(sites)
}
