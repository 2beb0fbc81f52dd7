//! Classification parameters: the inner and outer buffer radii.

use serde::{Deserialize, Serialize};

/// Default inner radius in meters.
pub const DEFAULT_WITHIN_DIST: u32 = 150;

/// Default outer radius in meters.
pub const DEFAULT_NEAR_DIST: u32 = 1000;

/// Buffer radii used to derive the distance bucket. Both in meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassificationParams {
    /// Radius of the inner ("within") buffer.
    pub within_dist: u32,
    /// Radius of the outer ("near") buffer.
    pub near_dist: u32,
}

impl Default for ClassificationParams {
    fn default() -> Self {
        Self::new(DEFAULT_WITHIN_DIST, DEFAULT_NEAR_DIST)
    }
}

impl ClassificationParams {
    /// Creates parameters without validating them.
    #[must_use]
    pub const fn new(within_dist: u32, near_dist: u32) -> Self {
        Self {
            within_dist,
            near_dist,
        }
    }

    /// Parses both radii from decimal integer text.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::NotAnInteger`] if either value is not a
    /// non-negative integer.
    pub fn parse(within_dist: &str, near_dist: &str) -> Result<Self, ParamError> {
        Ok(Self::new(
            parse_distance("within_dist", within_dist)?,
            parse_distance("near_dist", near_dist)?,
        ))
    }

    /// Checks that the outer radius lies strictly beyond the inner one.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NearNotBeyondWithin`] when
    /// `near_dist <= within_dist`.
    pub const fn validate(&self) -> Result<(), ValidationError> {
        if self.near_dist <= self.within_dist {
            return Err(ValidationError::NearNotBeyondWithin {
                within_dist: self.within_dist,
                near_dist: self.near_dist,
            });
        }
        Ok(())
    }
}

fn parse_distance(name: &'static str, value: &str) -> Result<u32, ParamError> {
    value
        .trim()
        .parse()
        .map_err(|_| ParamError::NotAnInteger {
            name,
            value: value.to_string(),
        })
}

/// Parameter text that could not be turned into a radius.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// Value is not a non-negative decimal integer.
    #[error("parameter {name} must be a non-negative integer, got '{value}'")]
    NotAnInteger {
        /// Parameter name.
        name: &'static str,
        /// Raw value that failed to parse.
        value: String,
    },
}

/// Parameters that parse but cannot be used for a computation.
///
/// The message is shown to the user verbatim as a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// `near_dist <= within_dist`.
    #[error(
        "near distance limit ({near_dist}) <= within distance limit ({within_dist}), please correct the values and try again"
    )]
    NearNotBeyondWithin {
        /// Inner radius.
        within_dist: u32,
        /// Outer radius.
        near_dist: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_matches_user_warning() {
        let err = ClassificationParams::new(1000, 100).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "near distance limit (100) <= within distance limit (1000), please correct the values and try again"
        );
    }

    #[test]
    fn equal_radii_are_rejected() {
        assert!(ClassificationParams::new(500, 500).validate().is_err());
        assert!(ClassificationParams::new(150, 1000).validate().is_ok());
    }

    #[test]
    fn parse_trims_and_rejects_garbage() {
        assert_eq!(
            ClassificationParams::parse(" 150", "1000 ").unwrap(),
            ClassificationParams::new(150, 1000)
        );
        assert!(matches!(
            ClassificationParams::parse("150m", "1000"),
            Err(ParamError::NotAnInteger {
                name: "within_dist",
                ..
            })
        ));
        assert!(ClassificationParams::parse("150", "-1").is_err());
    }

    #[test]
    fn default_matches_module_defaults() {
        let params = ClassificationParams::default();
        assert_eq!(params.within_dist, 150);
        assert_eq!(params.near_dist, 1000);
        assert!(params.validate().is_ok());
    }
}
