//! Registration document announced to the platform.

use heatsrc_calculation_models::{InputParameter, Signature};
use heatsrc_suitability_models::params::{DEFAULT_NEAR_DIST, DEFAULT_WITHIN_DIST};

use crate::{CM_ID, CM_NAME};

/// Wiki root used when `WIKIURL` is not set.
pub const DEFAULT_WIKI_URL: &str = "https://wiki.hotmaps.eu/en/";

/// Wiki page of the module, appended to the wiki root.
pub const WIKI_PAGE: &str = "CM-Heat-source-potential";

const DESCRIPTION: &str = "This computation module calculates the potential of waste water \
                           treatment plants that can be utilized in the selected area";

/// The module signature, with the wiki root taken from `WIKIURL`.
#[must_use]
pub fn signature() -> Signature {
    signature_with_wiki(std::env::var("WIKIURL").ok().as_deref())
}

/// The module signature for an explicit wiki root.
#[must_use]
pub fn signature_with_wiki(wiki_root: Option<&str>) -> Signature {
    let wiki_root = wiki_root.unwrap_or(DEFAULT_WIKI_URL);

    Signature {
        category: "Supply".to_string(),
        authorized_scale: ["NUTS 3", "NUTS 2", "NUTS 0", "LAU 2"]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        cm_name: CM_NAME.to_string(),
        layers_needed: Vec::new(),
        type_layer_needed: Vec::new(),
        vectors_needed: Vec::new(),
        type_vectors_needed: Vec::new(),
        cm_url: "Do not add something".to_string(),
        cm_description: DESCRIPTION.to_string(),
        cm_id: CM_ID,
        wiki_url: format!("{wiki_root}{WIKI_PAGE}"),
        inputs_calculation_module: vec![
            InputParameter {
                input_name: "Maximum distance to consider the heat source within the urban areas"
                    .to_string(),
                input_type: "input".to_string(),
                input_parameter_name: "within_dist".to_string(),
                input_value: DEFAULT_WITHIN_DIST.to_string(),
                input_priority: 0,
                input_unit: "m".to_string(),
                input_min: 50,
                input_max: 2000,
                cm_id: CM_ID,
            },
            InputParameter {
                input_name: "Maximum distance to consider the heat source near the urban areas, \
                             all the areas above this threshold will be classified as far from \
                             the urban areas"
                    .to_string(),
                input_type: "input".to_string(),
                input_parameter_name: "near_dist".to_string(),
                input_value: DEFAULT_NEAR_DIST.to_string(),
                input_priority: 0,
                input_unit: "m".to_string(),
                input_min: 200,
                input_max: 10000,
                cm_id: CM_ID,
            },
        ],
    }
}
