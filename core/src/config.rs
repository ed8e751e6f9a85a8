//! # INJECTOR CONFIGURATION
//!
//! **PURPOSE**: Runtime knobs for the resolver, loadable from JSON.

use crate::errors::{error_codes, ProjectError};
use serde::Deserialize;

/// Maximum length of a single resolution path before it is rejected.
pub const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InjectorConfig {
    /// **MAXIMUM RESOLUTION DEPTH** - Longest chain of nested constructions
    pub max_resolution_depth: usize,

    /// **PANIC CAPTURE** - Report panics from constructors, strategies, converters
    /// and field setters as construction failures
    pub catch_constructor_panics: bool,

    /// **DEFAULT PERSISTENCE UNIT** - Used by `@PersistenceContext` without a unit name
    pub default_persistence_unit: String,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
            catch_constructor_panics: true,
            default_persistence_unit: String::new(),
        }
    }
}

impl InjectorConfig {
    pub fn from_json(json: &str) -> Result<Self, ProjectError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ProjectError::Configuration {
            code: error_codes::INVALID_CONFIG.to_string(),
            message: format!("Invalid injector configuration: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProjectError> {
        if self.max_resolution_depth == 0 {
            return Err(ProjectError::Configuration {
                code: error_codes::INVALID_CONFIG.to_string(),
                message: "max_resolution_depth must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
