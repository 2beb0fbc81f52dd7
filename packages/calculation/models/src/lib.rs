#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Wire types exchanged with the platform that calls the module.
//!
//! Field names match the JSON documents the platform expects, which is why
//! some of them (`indicator`, `cm_name`) are not idiomatic Rust names.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Value of an indicator: numeric for results, text for warnings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValue {
    Number(f64),
    Text(String),
}

impl From<f64> for IndicatorValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for IndicatorValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One `{unit, name, value}` record of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub unit: String,
    pub name: String,
    pub value: IndicatorValue,
}

impl Indicator {
    /// Creates an indicator.
    #[must_use]
    pub fn new(name: &str, unit: &str, value: impl Into<IndicatorValue>) -> Self {
        Self {
            unit: unit.to_string(),
            name: name.to_string(),
            value: value.into(),
        }
    }

    /// A warning shown to the user instead of results.
    #[must_use]
    pub fn warning(message: &str) -> Self {
        Self::new(message, "-", "")
    }
}

/// A vector file delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorLayer {
    pub name: String,
    pub path: PathBuf,
}

/// Output envelope of one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationResult {
    pub name: String,
    pub indicator: Vec<Indicator>,
    /// Always empty.
    pub graphics: Vec<serde_json::Value>,
    pub vector_layers: Vec<VectorLayer>,
    /// Always empty.
    pub raster_layers: Vec<serde_json::Value>,
}

impl ComputationResult {
    /// An envelope with only a name.
    #[must_use]
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            indicator: Vec::new(),
            graphics: Vec::new(),
            vector_layers: Vec::new(),
            raster_layers: Vec::new(),
        }
    }

    /// Whether this result carries a warning instead of results.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.vector_layers.is_empty()
            && self
                .indicator
                .iter()
                .any(|i| i.value == IndicatorValue::Text(String::new()))
    }
}

/// Descriptor of one user-facing input parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParameter {
    pub input_name: String,
    pub input_type: String,
    pub input_parameter_name: String,
    /// Default value, as text.
    pub input_value: String,
    pub input_priority: u32,
    pub input_unit: String,
    pub input_min: u32,
    pub input_max: u32,
    pub cm_id: u32,
}

/// Registration document of the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub category: String,
    pub authorized_scale: Vec<String>,
    pub cm_name: String,
    pub layers_needed: Vec<String>,
    pub type_layer_needed: Vec<String>,
    pub vectors_needed: Vec<String>,
    pub type_vectors_needed: Vec<String>,
    pub cm_url: String,
    pub cm_description: String,
    pub cm_id: u32,
    pub wiki_url: String,
    pub inputs_calculation_module: Vec<InputParameter>,
}
