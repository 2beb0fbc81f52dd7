//! Summary indicators of a classified site set.

use heatsrc_calculation_models::Indicator;
use heatsrc_suitability_models::{Site, Suitability};

/// Counts per suitability label and the recoverable power of the suitable
/// and conditionally suitable plants.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn indicators(sites: &[Site]) -> Vec<Indicator> {
    let count = |label: Option<Suitability>| {
        sites.iter().filter(|s| s.suitability() == label).count() as f64
    };
    // folded from +0.0 so an empty set reports 0 rather than -0
    let power = |select: fn(&Site) -> Option<f64>| {
        sites.iter().filter_map(select).fold(0.0, |acc, p| acc + p)
    };

    vec![
        Indicator::new(
            "Number of waste water treatment plants",
            "-",
            sites.len() as f64,
        ),
        Indicator::new(
            "Number of suitable waste water treatment plants",
            "-",
            count(Some(Suitability::Suitable)),
        ),
        Indicator::new(
            "Number of conditionally suitable waste water treatment plants",
            "-",
            count(Some(Suitability::Conditionally)),
        ),
        Indicator::new(
            "Number of not suitable waste water treatment plants",
            "-",
            count(Some(Suitability::NotSuitable)),
        ),
        Indicator::new(
            "Number of not classified waste water treatment plants",
            "-",
            count(None),
        ),
        Indicator::new("Suitable power", "kW", power(|s| s.suitable)),
        Indicator::new("Conditionally suitable power", "kW", power(|s| s.conditional)),
    ]
}
