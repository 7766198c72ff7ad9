//! Configuration for the hierarchy registry.
//!
//! Loaded from TOML. Every field has a default so a partial file (or none at
//! all) yields a strict registry logging at `info`.
//!
//! ```toml
//! tolerate_missing_on_delete = false
//! logger_category = "DoHierarchy"
//!
//! [diagnostics]
//! NotInCell = "warn"
//!
//! [logging]
//! level = "info"
//!
//! [logging.categories]
//! DoHierarchy = "debug"
//!
//! [zone_policy]
//! meta_zone_threshold = 1000
//! allowed_meta_zones = [1]
//! ```

use crate::diagnostics::{Disposition, FailureKind};
use crate::error::ConfigError;
use crate::logging::Severity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

/// Default category name for registry log records.
pub const DEFAULT_LOGGER_CATEGORY: &str = "DoHierarchy";

fn default_logger_category() -> String {
    DEFAULT_LOGGER_CATEGORY.to_string()
}
fn default_level() -> String {
    "info".to_string()
}
fn default_history_capacity() -> usize {
    256
}
fn default_meta_zone_threshold() -> u32 {
    1000
}
fn default_allowed_meta_zones() -> Vec<u32> {
    vec![1]
}

/// Top-level registry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Deleting an unknown id only traces instead of reporting MissingId
    #[serde(default)]
    pub tolerate_missing_on_delete: bool,
    /// A soft DuplicateRegistration moves the id to the new cell
    #[serde(default)]
    pub relocate_on_duplicate: bool,
    /// Log category used by the table and the diagnostics channel
    #[serde(default = "default_logger_category")]
    pub logger_category: String,
    /// Failure kind name to disposition overrides
    #[serde(default)]
    pub diagnostics: BTreeMap<String, Disposition>,
    /// Logger thresholds and history
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Player location policy offered by the dispatcher adapter
    #[serde(default)]
    pub zone_policy: ZonePolicySettings,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default threshold (error, warning, info, debug)
    #[serde(default = "default_level")]
    pub level: String,
    /// Whether a host subscriber should emit JSON
    #[serde(default)]
    pub json_format: bool,
    /// Number of records kept in memory (0 disables the history)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Per-category threshold overrides
    #[serde(default)]
    pub categories: BTreeMap<String, Severity>,
}

/// Zone validity policy for player locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonePolicySettings {
    /// Zones below this value are meta zones
    #[serde(default = "default_meta_zone_threshold")]
    pub meta_zone_threshold: u32,
    /// Meta zones that are nevertheless valid player locations
    #[serde(default = "default_allowed_meta_zones")]
    pub allowed_meta_zones: Vec<u32>,
    /// Parents whose zones are all valid player locations
    #[serde(default)]
    pub exempt_parents: Vec<u64>,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            tolerate_missing_on_delete: false,
            relocate_on_duplicate: false,
            logger_category: default_logger_category(),
            diagnostics: BTreeMap::new(),
            logging: LoggingSettings::default(),
            zone_policy: ZonePolicySettings::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
            history_capacity: default_history_capacity(),
            categories: BTreeMap::new(),
        }
    }
}

impl Default for ZonePolicySettings {
    fn default() -> Self {
        Self {
            meta_zone_threshold: default_meta_zone_threshold(),
            allowed_meta_zones: default_allowed_meta_zones(),
            exempt_parents: Vec::new(),
        }
    }
}

impl HierarchyConfig {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file is created with the default configuration.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            let default_config = HierarchyConfig::default();
            std::fs::write(path, default_config.to_toml()?)?;
            info!("Created default hierarchy configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Disposition overrides keyed by failure kind.
    pub fn dispositions(&self) -> Result<HashMap<FailureKind, Disposition>, ConfigError> {
        self.diagnostics
            .iter()
            .map(|(name, disposition)| {
                FailureKind::from_name(name)
                    .map(|kind| (kind, *disposition))
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown failure kind: {name}")))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.logger_category.trim().is_empty() {
            return Err("logger_category cannot be empty".to_string());
        }

        let dispositions = self.dispositions().map_err(|e| e.to_string())?;
        if let Some(disposition) = dispositions.get(&FailureKind::InvariantBreach) {
            if *disposition != Disposition::Error {
                return Err(format!(
                    "InvariantBreach is always an error, got {disposition:?}"
                ));
            }
        }

        let valid_levels = ["error", "warn", "warning", "info", "debug", "trace"];
        if Severity::parse(&self.logging.level).is_none() {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.zone_policy.meta_zone_threshold == 0 && !self.zone_policy.allowed_meta_zones.is_empty() {
            return Err(
                "zone_policy.allowed_meta_zones has no effect with a zero meta_zone_threshold"
                    .to_string(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HierarchyConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.tolerate_missing_on_delete);
        assert_eq!(config.logger_category, "DoHierarchy");
        assert_eq!(config.zone_policy.meta_zone_threshold, 1000);
        assert_eq!(config.zone_policy.allowed_meta_zones, vec![1]);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = HierarchyConfig::from_toml(
            r#"
            tolerate_missing_on_delete = true

            [diagnostics]
            NotInCell = "warn"
            MisuseError = "trace"

            [logging.categories]
            DoHierarchy = "debug"
            "#,
        )
        .unwrap();

        assert!(config.tolerate_missing_on_delete);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.categories["DoHierarchy"], Severity::Debug);

        let dispositions = config.dispositions().unwrap();
        assert_eq!(dispositions[&FailureKind::NotInCell], Disposition::Warn);
        assert_eq!(dispositions[&FailureKind::Misuse], Disposition::Trace);
    }

    #[test]
    fn test_validation_rejects_soft_invariant_breach() {
        let mut config = HierarchyConfig::default();
        config
            .diagnostics
            .insert("InvariantBreach".to_string(), Disposition::Warn);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_kind_and_level() {
        let mut config = HierarchyConfig::default();
        config
            .diagnostics
            .insert("Whatever".to_string(), Disposition::Warn);
        assert!(config.validate().is_err());

        let mut config = HierarchyConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = HierarchyConfig::default();
        config.logger_category = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hierarchy.toml");

        let created = HierarchyConfig::load_from_file(&path).unwrap();
        assert!(path.exists());

        let reloaded = HierarchyConfig::load_from_file(&path).unwrap();
        assert_eq!(created, reloaded);
    }

    #[test]
    fn test_load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hierarchy.toml");
        std::fs::write(&path, "logger_category = \"Replica\"\n").unwrap();

        let config = HierarchyConfig::load_from_file(&path).unwrap();
        assert_eq!(config.logger_category, "Replica");
    }
}
