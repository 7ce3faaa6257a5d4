//! Exploration settings.

use serde::{Deserialize, Serialize};

use crate::error::DseResult;

/// Settings shared by every adapter of one exploration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Seed of the adapter's random source.
    pub seed: u64,

    /// Memoize fitness per committed version.
    pub cache_fitness: bool,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            cache_fitness: true,
        }
    }
}

impl ExplorationConfig {
    /// Default settings with an explicit seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Recompute fitness on every request. For objectives that read state outside the model.
    pub fn uncached() -> Self {
        Self {
            cache_fitness: false,
            ..Default::default()
        }
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> DseResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> DseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ExplorationConfig::from_json(r#"{ "seed": 42 }"#).unwrap();
        assert_eq!(config, ExplorationConfig::seeded(42));
        assert!(config.cache_fitness);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ExplorationConfig::uncached();
        let back = ExplorationConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
        assert!(ExplorationConfig::from_json("{ nope").is_err());
    }
}
