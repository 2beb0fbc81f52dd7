//! Attribute name normalization for formats with short column names.
//!
//! DBF (the attribute part of a shapefile) keeps at most 10 characters per
//! column name. Exporting longer names lets the driver truncate them on its
//! own, which can silently merge two columns; renaming up front keeps every
//! column and makes the resulting names predictable.

use std::collections::BTreeSet;

/// Computes the renames needed so every name fits in `limit` characters.
///
/// Names already within the limit are kept. A long name is truncated; if
/// the truncation collides with another name (case-insensitively), its
/// tail is replaced by the smallest numeric suffix that is still free.
/// Returns `(old, new)` pairs in input order.
#[must_use]
pub fn normalize_column_names(names: &[String], limit: usize) -> Vec<(String, String)> {
    let mut taken = names
        .iter()
        .filter(|n| n.chars().count() <= limit)
        .map(|n| n.to_ascii_lowercase())
        .collect::<BTreeSet<_>>();

    let mut renames = Vec::new();
    for name in names.iter().filter(|n| n.chars().count() > limit) {
        let mut candidate = truncate(name, limit);
        let mut n = 1_usize;
        while taken.contains(&candidate.to_ascii_lowercase()) {
            let suffix = n.to_string();
            candidate = format!(
                "{}{suffix}",
                truncate(name, limit.saturating_sub(suffix.len()))
            );
            n += 1;
        }
        taken.insert(candidate.to_ascii_lowercase());
        renames.push((name.clone(), candidate));
    }

    renames
}

fn truncate(name: &str, len: usize) -> String {
    name.chars().take(len).collect()
}
