#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Suitability decision matrix and site types for WWTP heat recovery.
//!
//! A waste-water treatment plant is placed in one plant-size bucket by its
//! capacity and one distance bucket by the urban coverage found inside two
//! buffers around it. The `(size, distance)` cell of [`DECISION_MATRIX`]
//! decides whether the plant is a good heat source.

pub mod params;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use params::{ClassificationParams, ParamError, ValidationError};

/// Minimum urban coverage (sum of urban raster cells inside a buffer) for a
/// buffer to count as touching the urban area.
pub const URBAN_COVERAGE_THRESHOLD: f64 = 25.0;

/// Plant-size bucket, keyed on the plant capacity (population equivalent).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum SizeBucket {
    /// Capacity in `(2000, 5000]`
    #[serde(rename = "Small")]
    #[strum(serialize = "Small")]
    Small,
    /// Capacity in `(5000, 50000]`
    #[serde(rename = "Medium-small")]
    #[strum(serialize = "Medium-small")]
    MediumSmall,
    /// Capacity in `(50000, 150000]`
    #[serde(rename = "Medium-high")]
    #[strum(serialize = "Medium-high")]
    MediumHigh,
    /// Capacity above 150000
    #[serde(rename = "High")]
    #[strum(serialize = "High")]
    High,
}

impl SizeBucket {
    /// Returns all buckets in ascending capacity order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Small, Self::MediumSmall, Self::MediumHigh, Self::High]
    }

    /// Returns the `(exclusive lower, inclusive upper)` capacity bounds.
    /// `None` as the upper bound means unbounded.
    #[must_use]
    pub const fn capacity_range(self) -> (f64, Option<f64>) {
        match self {
            Self::Small => (2_000.0, Some(5_000.0)),
            Self::MediumSmall => (5_000.0, Some(50_000.0)),
            Self::MediumHigh => (50_000.0, Some(150_000.0)),
            Self::High => (150_000.0, None),
        }
    }

    /// Returns `true` if `capacity` falls inside this bucket.
    #[must_use]
    pub fn contains(self, capacity: f64) -> bool {
        let (lower, upper) = self.capacity_range();
        capacity > lower && upper.is_none_or(|upper| capacity <= upper)
    }

    /// Finds the bucket for a capacity, if any.
    #[must_use]
    pub fn for_capacity(capacity: f64) -> Option<Self> {
        Self::all().iter().copied().find(|b| b.contains(capacity))
    }

    const fn row(self) -> usize {
        match self {
            Self::Small => 0,
            Self::MediumSmall => 1,
            Self::MediumHigh => 2,
            Self::High => 3,
        }
    }
}

/// Distance bucket, derived from the urban coverage of the inner and outer
/// buffers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum DistanceBucket {
    /// Inner buffer touches urban area and outer buffer is well covered.
    Within,
    /// Only the outer buffer is covered.
    Near,
    /// Neither buffer is meaningfully covered.
    Far,
}

impl DistanceBucket {
    /// Returns all buckets in precedence order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Within, Self::Near, Self::Far]
    }

    /// Returns `true` if the two buffer sums satisfy this bucket's rule.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn matches(self, within_sum: f64, near_sum: f64) -> bool {
        match self {
            Self::Within => within_sum > 0.0 && near_sum >= URBAN_COVERAGE_THRESHOLD,
            Self::Near => within_sum == 0.0 && near_sum >= URBAN_COVERAGE_THRESHOLD,
            Self::Far => {
                within_sum < URBAN_COVERAGE_THRESHOLD && near_sum < URBAN_COVERAGE_THRESHOLD
            }
        }
    }

    /// Finds the first bucket whose rule matches, if any.
    #[must_use]
    pub fn for_sums(within_sum: f64, near_sum: f64) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|b| b.matches(within_sum, near_sum))
    }

    const fn column(self) -> usize {
        match self {
            Self::Within => 0,
            Self::Near => 1,
            Self::Far => 2,
        }
    }
}

/// Outcome of the classification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Suitability {
    #[serde(rename = "Suitable")]
    #[strum(serialize = "Suitable")]
    Suitable,
    #[serde(rename = "Conditionally")]
    #[strum(serialize = "Conditionally")]
    Conditionally,
    #[serde(rename = "Not suitable")]
    #[strum(serialize = "Not suitable")]
    NotSuitable,
}

impl Suitability {
    /// Returns all labels.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Suitable, Self::Conditionally, Self::NotSuitable]
    }

    /// Rendering color for this label.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Suitable => "#188B7D",
            Self::Conditionally => "#D9C259",
            Self::NotSuitable => "#F34616",
        }
    }
}

/// Rows are [`SizeBucket`]s in ascending order, columns are
/// [`DistanceBucket`]s `Within`, `Near`, `Far`.
pub static DECISION_MATRIX: [[Suitability; 3]; 4] = [
    [
        Suitability::Conditionally,
        Suitability::Conditionally,
        Suitability::NotSuitable,
    ],
    [
        Suitability::Suitable,
        Suitability::Conditionally,
        Suitability::Conditionally,
    ],
    [
        Suitability::Suitable,
        Suitability::Suitable,
        Suitability::Conditionally,
    ],
    [
        Suitability::Suitable,
        Suitability::Suitable,
        Suitability::Suitable,
    ],
];

/// Looks up the matrix cell for a bucket pair.
#[must_use]
pub const fn lookup(size: SizeBucket, distance: DistanceBucket) -> Suitability {
    DECISION_MATRIX[size.row()][distance.column()]
}

/// A single decision-matrix outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    /// Plant-size bucket.
    pub size: SizeBucket,
    /// Distance bucket.
    pub distance: DistanceBucket,
    /// Matrix value for the cell.
    pub suitability: Suitability,
}

impl Classification {
    /// Rendering color of the suitability label.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        self.suitability.color()
    }
}

/// Classifies a plant by capacity and buffer sums.
///
/// Returns `None` when the capacity falls outside every size bucket or the
/// sums satisfy no distance rule.
#[must_use]
pub fn classify(capacity: f64, within_sum: f64, near_sum: f64) -> Option<Classification> {
    let size = SizeBucket::for_capacity(capacity)?;
    let distance = DistanceBucket::for_sums(within_sum, near_sum)?;
    Some(Classification {
        size,
        distance,
        suitability: lookup(size, distance),
    })
}

/// One WWTP point record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Feature category id in the engine's attribute table.
    pub cat: i64,
    /// Plant capacity (population equivalent).
    pub capacity: Option<f64>,
    /// Recoverable power.
    pub power: Option<f64>,
    /// Urban coverage inside the inner buffer.
    pub within_sum: f64,
    /// Urban coverage inside the outer buffer.
    pub near_sum: f64,
    /// Decision-matrix outcome, `None` until classified or when unmatched.
    pub classification: Option<Classification>,
    /// Power counted as conditionally suitable.
    pub conditional: Option<f64>,
    /// Power counted as suitable.
    pub suitable: Option<f64>,
}

impl Site {
    /// Creates an unclassified site.
    #[must_use]
    pub const fn new(
        cat: i64,
        capacity: Option<f64>,
        power: Option<f64>,
        within_sum: f64,
        near_sum: f64,
    ) -> Self {
        Self {
            cat,
            capacity,
            power,
            within_sum,
            near_sum,
            classification: None,
            conditional: None,
            suitable: None,
        }
    }

    /// Returns a copy of this site with the derived fields computed from
    /// the decision matrix. Unmatched sites come back with the derived
    /// fields cleared.
    #[must_use]
    pub fn classified(&self) -> Self {
        let classification = self
            .capacity
            .and_then(|capacity| classify(capacity, self.within_sum, self.near_sum));

        let power = self.power.unwrap_or(0.0);
        let split = |label: Suitability| {
            classification.map(|c| if c.suitability == label { power } else { 0.0 })
        };

        Self {
            classification,
            conditional: split(Suitability::Conditionally),
            suitable: split(Suitability::Suitable),
            ..self.clone()
        }
    }

    /// Suitability label, if classified.
    #[must_use]
    pub fn suitability(&self) -> Option<Suitability> {
        self.classification.map(|c| c.suitability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_plant_near_urban_area_is_conditionally_suitable() {
        let c = classify(3000.0, 0.0, 30.0).unwrap();
        assert_eq!(c.size, SizeBucket::Small);
        assert_eq!(c.distance, DistanceBucket::Near);
        assert_eq!(c.suitability, Suitability::Conditionally);
        assert_eq!(c.color(), "#D9C259");
    }

    #[test]
    fn matrix_corners() {
        assert_eq!(
            lookup(SizeBucket::Small, DistanceBucket::Far),
            Suitability::NotSuitable
        );
        assert_eq!(
            lookup(SizeBucket::High, DistanceBucket::Far),
            Suitability::Suitable
        );
        assert_eq!(
            lookup(SizeBucket::MediumSmall, DistanceBucket::Within),
            Suitability::Suitable
        );
        assert_eq!(
            lookup(SizeBucket::MediumHigh, DistanceBucket::Far),
            Suitability::Conditionally
        );
    }

    #[test]
    fn capacity_bounds_are_lower_exclusive_upper_inclusive() {
        assert_eq!(SizeBucket::for_capacity(2000.0), None);
        assert_eq!(SizeBucket::for_capacity(2000.5), Some(SizeBucket::Small));
        assert_eq!(SizeBucket::for_capacity(5000.0), Some(SizeBucket::Small));
        assert_eq!(
            SizeBucket::for_capacity(5000.1),
            Some(SizeBucket::MediumSmall)
        );
        assert_eq!(
            SizeBucket::for_capacity(150_000.0),
            Some(SizeBucket::MediumHigh)
        );
        assert_eq!(SizeBucket::for_capacity(150_001.0), Some(SizeBucket::High));
        assert_eq!(SizeBucket::for_capacity(f64::NAN), None);
    }

    #[test]
    fn buckets_are_mutually_exclusive() {
        let capacities = [0.0, 2000.0, 2500.0, 5000.0, 7000.0, 50_000.0, 60_000.0, 2e6];
        let sums = [-1.0, 0.0, 0.5, 10.0, 24.9, 25.0, 40.0, 1000.0];

        for &capacity in &capacities {
            let sizes = SizeBucket::all()
                .iter()
                .filter(|b| b.contains(capacity))
                .count();
            assert!(sizes <= 1, "capacity {capacity} matched {sizes} size buckets");
        }

        for &within in &sums {
            for &near in &sums {
                let distances = DistanceBucket::all()
                    .iter()
                    .filter(|b| b.matches(within, near))
                    .count();
                assert!(
                    distances <= 1,
                    "sums ({within}, {near}) matched {distances} distance buckets"
                );
            }
        }
    }

    #[test]
    fn size_buckets_cover_everything_above_2000() {
        for capacity in [2001.0, 4999.0, 5001.0, 49_999.0, 100_000.0, 1e9] {
            assert!(SizeBucket::for_capacity(capacity).is_some());
        }
    }

    #[test]
    fn unmatched_when_inner_covered_but_outer_sparse() {
        assert_eq!(classify(10_000.0, 30.0, 20.0), None);
        assert_eq!(classify(10_000.0, -1.0, 30.0), None);
    }

    #[test]
    fn classify_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(
                classify(80_000.0, 3.0, 90.0),
                Some(Classification {
                    size: SizeBucket::MediumHigh,
                    distance: DistanceBucket::Within,
                    suitability: Suitability::Suitable,
                })
            );
        }
    }

    #[test]
    fn labels_round_trip_through_strum() {
        assert_eq!(SizeBucket::MediumSmall.to_string(), "Medium-small");
        assert_eq!(
            "Not suitable".parse::<Suitability>().unwrap(),
            Suitability::NotSuitable
        );
        assert_eq!(DistanceBucket::Far.as_ref(), "Far");
    }

    #[test]
    fn classified_site_splits_power() {
        let site = Site::new(1, Some(3000.0), Some(120.0), 0.0, 30.0).classified();
        assert_eq!(site.suitability(), Some(Suitability::Conditionally));
        assert_eq!(site.conditional, Some(120.0));
        assert_eq!(site.suitable, Some(0.0));

        let site = Site::new(2, Some(200_000.0), None, 0.0, 0.0).classified();
        assert_eq!(site.suitability(), Some(Suitability::Suitable));
        assert_eq!(site.suitable, Some(0.0));
        assert_eq!(site.conditional, Some(0.0));
    }

    #[test]
    fn unmatched_site_keeps_derived_fields_unset() {
        let site = Site::new(3, Some(1000.0), Some(50.0), 0.0, 30.0).classified();
        assert_eq!(site.classification, None);
        assert_eq!(site.conditional, None);
        assert_eq!(site.suitable, None);
    }

    #[test]
    fn classifying_twice_is_idempotent() {
        let once = Site::new(4, Some(9000.0), Some(10.0), 2.0, 40.0).classified();
        let twice = once.classified();
        assert_eq!(once, twice);
    }
}
