//! Driver configuration
//!
//! Read from TOML:
//!
//! ```toml
//! dimensions = ["overworld", "nether"]
//! stop = true
//! max_generation_rate = 20.0
//! save_progress = true
//!
//! [region]
//! x1 = -16
//! z1 = -16
//! x2 = 15
//! z2 = 15
//!
//! [timeouts]
//! startup_secs = 100
//! ready_poll_ms = 1000
//! ready_attempts = 100
//! ```

use crate::region::Region;
use pregen_adapter::{Dimension, SelectionPolicy};
use pregen_symbol::CatalogOrder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// IO error
        #[source]
        source: std::io::Error,
    },

    /// Not valid TOML of the expected shape
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid value for `{key}`: {reason}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Startup and readiness limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Seconds the entry point may take to return
    pub startup_secs: u64,
    /// Milliseconds between readiness polls
    pub ready_poll_ms: u64,
    /// Readiness polls before giving up
    pub ready_attempts: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup_secs: 100,
            ready_poll_ms: 1000,
            ready_attempts: 100,
        }
    }
}

fn default_dimensions() -> Vec<Dimension> {
    vec![Dimension::Overworld]
}

fn default_progress_file() -> PathBuf {
    PathBuf::from("pregen-progress.json")
}

/// Complete driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Chunks to generate
    pub region: Region,
    /// Dimensions to generate, in order
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<Dimension>,
    /// Mapping document of the target release
    #[serde(default)]
    pub mapping: Option<PathBuf>,
    /// Release manifest
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    /// Order in which the manifest lists releases
    #[serde(default)]
    pub catalog_order: CatalogOrder,
    /// Send `stop` to the target when done
    #[serde(default)]
    pub stop: bool,
    /// Fall back to the oldest variant for releases older than every variant
    #[serde(default)]
    pub best_effort: bool,
    /// Chunks per second; zero disables pacing
    #[serde(default)]
    pub max_generation_rate: f64,
    /// Keep the last completed chunk on disk
    #[serde(default)]
    pub save_progress: bool,
    /// Where progress is kept
    #[serde(default = "default_progress_file")]
    pub progress_file: PathBuf,
    /// Discard the target's console output
    #[serde(default)]
    pub suppress_target_output: bool,
    /// Startup and readiness limits
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl DriverConfig {
    /// Configuration for `region` with every other key at its default
    #[must_use]
    pub fn new(region: Region) -> Self {
        Self {
            region,
            dimensions: default_dimensions(),
            mapping: None,
            manifest: None,
            catalog_order: CatalogOrder::default(),
            stop: false,
            best_effort: false,
            max_generation_rate: 0.0,
            save_progress: false,
            progress_file: default_progress_file(),
            suppress_target_output: false,
            timeouts: Timeouts::default(),
        }
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text)?;
        config.normalize()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), region = %config.region, "loaded driver config");
        Ok(config)
    }

    /// Validate values and bring them into canonical form
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn normalize(&mut self) -> Result<(), ConfigError> {
        let rate = self.max_generation_rate;
        if !rate.is_finite() || rate < 0.0 {
            return Err(ConfigError::invalid(
                "max_generation_rate",
                format!("must be a non-negative number, got {rate}"),
            ));
        }
        self.max_generation_rate = (rate * 1000.0).trunc() / 1000.0;

        if self.dimensions.is_empty() {
            return Err(ConfigError::invalid("dimensions", "at least one dimension is required"));
        }
        let mut seen = Vec::with_capacity(self.dimensions.len());
        self.dimensions.retain(|d| {
            let first = !seen.contains(d);
            seen.push(*d);
            first
        });

        if self.timeouts.startup_secs == 0 {
            return Err(ConfigError::invalid("timeouts.startup_secs", "must be positive"));
        }
        if self.timeouts.ready_attempts == 0 {
            return Err(ConfigError::invalid("timeouts.ready_attempts", "must be positive"));
        }
        if self.save_progress && self.progress_file.as_os_str().is_empty() {
            return Err(ConfigError::invalid("progress_file", "must not be empty"));
        }
        Ok(())
    }

    /// Variant selection policy
    #[inline]
    #[must_use]
    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            best_effort: self.best_effort,
        }
    }

    /// Driver settings derived from this configuration
    #[must_use]
    pub fn settings(&self) -> DriverSettings {
        DriverSettings {
            startup_timeout: Duration::from_secs(self.timeouts.startup_secs),
            ready_poll_interval: Duration::from_millis(self.timeouts.ready_poll_ms),
            ready_attempts: self.timeouts.ready_attempts,
            max_generation_rate: self.max_generation_rate,
            send_stop: self.stop,
        }
    }
}

/// Runtime limits of a [`crate::Driver`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverSettings {
    /// Time the entry point may take to return
    pub startup_timeout: Duration,
    /// Pause between readiness polls
    pub ready_poll_interval: Duration,
    /// Readiness polls before giving up
    pub ready_attempts: u32,
    /// Chunks per second; zero disables pacing
    pub max_generation_rate: f64,
    /// Send `stop` through the console on [`crate::Driver::stop`]
    pub send_stop: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        Self {
            startup_timeout: Duration::from_secs(timeouts.startup_secs),
            ready_poll_interval: Duration::from_millis(timeouts.ready_poll_ms),
            ready_attempts: timeouts.ready_attempts,
            max_generation_rate: 0.0,
            send_stop: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = DriverConfig::from_toml_str("[region]\nx1 = 0\nz1 = 0\nx2 = 9\nz2 = 9\n").unwrap();
        assert_eq!(config, DriverConfig::new(Region::new(0, 0, 9, 9)));
        assert_eq!(config.timeouts.startup_secs, 100);
        assert_eq!(config.settings().ready_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn full_config() {
        let text = r#"
            dimensions = ["nether", "End", "NETHER"]
            mapping = "maps/1.16.txt"
            catalog_order = "chronological"
            stop = true
            best_effort = true
            max_generation_rate = 12.34567
            save_progress = true
            progress_file = "state/progress.json"

            [region]
            x1 = 5
            z1 = 5
            x2 = -5
            z2 = -5

            [timeouts]
            ready_attempts = 3
        "#;
        let config = DriverConfig::from_toml_str(text).unwrap();
        assert_eq!(config.region, Region::new(-5, -5, 5, 5));
        assert_eq!(config.dimensions, vec![Dimension::Nether, Dimension::End]);
        assert_eq!(config.catalog_order, CatalogOrder::Chronological);
        assert!((config.max_generation_rate - 12.345).abs() < 1e-9);
        assert_eq!(config.timeouts.ready_attempts, 3);
        assert_eq!(config.timeouts.startup_secs, 100);
        assert!(config.selection_policy().best_effort);
        assert!(config.settings().send_stop);
    }

    #[test]
    fn negative_rate_names_key() {
        let err = DriverConfig::from_toml_str(
            "max_generation_rate = -1.0\n[region]\nx1 = 0\nz1 = 0\nx2 = 0\nz2 = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "max_generation_rate", .. }));
    }

    #[test]
    fn empty_dimensions_rejected() {
        let err = DriverConfig::from_toml_str("dimensions = []\n[region]\nx1 = 0\nz1 = 0\nx2 = 0\nz2 = 0\n")
            .unwrap_err();
        assert!(err.to_string().contains("`dimensions`"), "{err}");
    }

    #[test]
    fn unknown_dimension_is_parse_error() {
        let err = DriverConfig::from_toml_str("dimensions = [\"moon\"]\n[region]\nx1 = 0\nz1 = 0\nx2 = 0\nz2 = 0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("moon"), "{err}");
    }

    #[test]
    fn missing_region_is_parse_error() {
        assert!(matches!(DriverConfig::from_toml_str("stop = true"), Err(ConfigError::Parse(_))));
    }
}
