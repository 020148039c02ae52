//! MSI settings - relevance radius, polling cadence and storage location
//!
//! Every section implements `Default` with the values in `defaults`, so a
//! missing or partial TOML file still yields a complete configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Settings
// ============================================================================

/// Root configuration for the MSI handler.
///
/// Load with `MsiSettings::load()` which searches:
/// 1. `$MSI_CONFIG` env var
/// 2. `./msi_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MsiSettings {
    #[serde(default)]
    pub relevance: RelevanceConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl MsiSettings {
    /// Load settings using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(settings) => {
                        info!(path = %p.display(), "Loaded MSI settings from {}", defaults::CONFIG_ENV_VAR);
                        return settings;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load MSI settings, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(settings) => {
                    info!("Loaded MSI settings from ./{}", defaults::CONFIG_FILE_NAME);
                    return settings;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::CONFIG_FILE_NAME);
                }
            }
        }

        info!("No MSI config file found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges, collecting every problem rather than stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let r = &self.relevance;
        if !(r.radius_nm.is_finite() && r.radius_nm > 0.0) {
            errors.push(format!(
                "relevance.radius_nm must be a positive number (got {})",
                r.radius_nm
            ));
        }
        if !(r.position_update_distance_nm.is_finite() && r.position_update_distance_nm >= 0.0) {
            errors.push(format!(
                "relevance.position_update_distance_nm must be >= 0 (got {})",
                r.position_update_distance_nm
            ));
        }
        if !(0..=defaults::MAX_VALIDITY_TOLERANCE_SECS).contains(&r.validity_tolerance_secs) {
            errors.push(format!(
                "relevance.validity_tolerance_secs must be in 0..={} (got {})",
                defaults::MAX_VALIDITY_TOLERANCE_SECS,
                r.validity_tolerance_secs
            ));
        }

        let p = &self.polling;
        for (name, secs) in [
            ("interval_secs", p.interval_secs),
            ("timeout_secs", p.timeout_secs),
            ("tick_secs", p.tick_secs),
        ] {
            if !(1..=defaults::MAX_POLLING_SECS).contains(&secs) {
                errors.push(format!(
                    "polling.{name} must be in 1..={} (got {secs})",
                    defaults::MAX_POLLING_SECS
                ));
            }
        }
        if p.unhealthy_after_failures == 0 {
            errors.push("polling.unhealthy_after_failures must be > 0".to_string());
        }

        if self.storage.path.as_os_str().is_empty() {
            errors.push("storage.path must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({path}): {err}", path = .0.display(), err = .1)]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({path}): {err}", path = .0.display(), err = .1)]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Relevance
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    /// Distance from own ship within which a located warning is visible (nm)
    pub radius_nm: f64,
    /// Own-ship movement that triggers a position recompute (nm)
    pub position_update_distance_nm: f64,
    /// Slack on `valid_from` for clock differences with the shore (seconds)
    pub validity_tolerance_secs: i64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            radius_nm: defaults::RELEVANCE_RADIUS_NM,
            position_update_distance_nm: defaults::POSITION_UPDATE_DISTANCE_NM,
            validity_tolerance_secs: defaults::VALIDITY_TOLERANCE_SECS,
        }
    }
}

impl RelevanceConfig {
    /// Tolerance clamped to the accepted range, so unvalidated settings
    /// cannot overflow date arithmetic.
    pub fn validity_tolerance(&self) -> chrono::Duration {
        let secs = self
            .validity_tolerance_secs
            .clamp(0, defaults::MAX_VALIDITY_TOLERANCE_SECS);
        chrono::Duration::try_seconds(secs).unwrap_or_else(chrono::Duration::zero)
    }
}

// ============================================================================
// Polling
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub tick_secs: u64,
    pub unhealthy_after_failures: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::POLL_INTERVAL_SECS,
            timeout_secs: defaults::POLL_TIMEOUT_SECS,
            tick_secs: defaults::TICK_INTERVAL_SECS,
            unhealthy_after_failures: defaults::LINK_UNHEALTHY_AFTER_FAILURES,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File holding the persisted store
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::STORE_PATH),
        }
    }
}
