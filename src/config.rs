//! Engine configuration.
//!
//! Provides configuration file support via `meshgraph.toml`, environment
//! variables, and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (constructed `EngineConfig` values)
//! 2. Environment variables (`MESHGRAPH_*`)
//! 3. Configuration file (`meshgraph.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Key that failed validation.
        key: String,
        /// Validation failure message.
        message: String,
    },
}

/// Engine configuration: the tunables named in spec.md §6, plus the
/// supplemented string-property limits from `SPEC_FULL.md`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bits of vertex id used as the in-shard local slot. Shard size is
    /// `2^vertex_group_bits`. Spec default: 8.
    pub vertex_group_bits: u32,

    /// Capacity of a clustered segment / range-tree inner segment. The
    /// extraction threshold to a private range tree is half this value.
    pub range_leaf_size: usize,

    /// ART leaf capacity before the trie deepens by one byte.
    pub art_leaf_size: usize,

    /// Degree at which a private range tree is rebuilt as an ART.
    pub art_extract_threshold: usize,

    /// Below this segment size, search within a segment is linear; above,
    /// binary search is used.
    pub sequential_scan_threshold: usize,

    /// Worker-pool size used to dispatch parallel batch edge ingest.
    pub batch_update_thread_num: usize,

    /// Buffered edge count below which a batch commit falls back to the
    /// per-edge insertion path.
    pub batch_update_enable_threshold: usize,

    /// Number of scalar properties carried per vertex. 0 disables vertex
    /// property storage.
    pub vertex_property_num: usize,

    /// Number of scalar properties carried per edge. 0 disables edge
    /// property storage.
    pub edge_property_num: usize,

    /// Number of named string properties carried per vertex (supplemented
    /// feature; see `SPEC_FULL.md`). 0 disables the feature.
    pub vertex_string_property_num: usize,

    /// Number of named string properties carried per edge (supplemented
    /// feature; see `SPEC_FULL.md`). 0 disables the feature.
    pub edge_string_property_num: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vertex_group_bits: 8,
            range_leaf_size: 256,
            art_leaf_size: 64,
            art_extract_threshold: 1024,
            sequential_scan_threshold: 16,
            batch_update_thread_num: 4,
            batch_update_enable_threshold: 1024,
            vertex_property_num: 0,
            edge_property_num: 0,
            vertex_string_property_num: 0,
            edge_string_property_num: 0,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `meshgraph.toml` plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is present but malformed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("meshgraph.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MESHGRAPH_").split("_").lowercase(false));

        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from a TOML string, for tests and embedders.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        let config: Self = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field relationships the engine depends on.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vertex_group_bits == 0 || self.vertex_group_bits > 32 {
            return Err(ConfigError::InvalidValue {
                key: "vertex_group_bits".into(),
                message: format!("{} must be in 1..=32", self.vertex_group_bits),
            });
        }
        if self.range_leaf_size < 4 || self.range_leaf_size % 2 != 0 {
            return Err(ConfigError::InvalidValue {
                key: "range_leaf_size".into(),
                message: format!("{} must be even and >= 4", self.range_leaf_size),
            });
        }
        if self.art_extract_threshold <= self.range_leaf_size / 2 {
            return Err(ConfigError::InvalidValue {
                key: "art_extract_threshold".into(),
                message: "must be greater than range_leaf_size / 2".into(),
            });
        }
        if self.art_leaf_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "art_leaf_size".into(),
                message: "must be >= 1".into(),
            });
        }
        if self.batch_update_thread_num == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_update_thread_num".into(),
                message: "must be >= 1".into(),
            });
        }
        Ok(())
    }

    /// Number of vertex slots held per shard (`2^vertex_group_bits`).
    #[must_use]
    pub const fn shard_size(&self) -> u64 {
        1u64 << self.vertex_group_bits
    }

    /// Degree at which a clustered-inline vertex is extracted to a private
    /// range tree: `range_leaf_size / 2`.
    #[must_use]
    pub const fn clustered_extract_threshold(&self) -> usize {
        self.range_leaf_size / 2
    }

    /// Serializes the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_odd_range_leaf_size() {
        let mut cfg = EngineConfig::default();
        cfg.range_leaf_size = 255;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_low_art_threshold() {
        let mut cfg = EngineConfig::default();
        cfg.art_extract_threshold = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn shard_size_matches_bits() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.shard_size(), 256);
    }

    #[test]
    fn from_toml_overrides_defaults() {
        let cfg = EngineConfig::from_toml("range_leaf_size = 512\nart_extract_threshold = 2048\n")
            .unwrap();
        assert_eq!(cfg.range_leaf_size, 512);
        assert_eq!(cfg.art_extract_threshold, 2048);
        assert_eq!(cfg.vertex_group_bits, 8);
    }
}
