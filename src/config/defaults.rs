//! Default values for the MSI settings.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Relevance
// ============================================================================

/// Radius around own ship inside which a located warning is shown (nm).
pub const RELEVANCE_RADIUS_NM: f64 = 100.0;

/// Minimum own-ship movement before position relevance is recomputed (nm).
///
/// GPS fixes arrive at 1 Hz; recomputing on every fix is wasted work.
pub const POSITION_UPDATE_DISTANCE_NM: f64 = 0.5;

/// Slack applied to `valid_from` when deciding whether a warning has started (seconds).
pub const VALIDITY_TOLERANCE_SECS: i64 = 0;

/// Largest accepted validity tolerance (one day).
pub const MAX_VALIDITY_TOLERANCE_SECS: i64 = 86_400;

// ============================================================================
// Polling
// ============================================================================

/// Interval between polls of the shore service (seconds).
pub const POLL_INTERVAL_SECS: u64 = 600;

/// Upper bound on a single poll call (seconds).
pub const POLL_TIMEOUT_SECS: u64 = 30;

/// Coordinator timer period (seconds). Each tick runs poll → expire → recompute.
pub const TICK_INTERVAL_SECS: u64 = 10;

/// Consecutive poll failures before the shore link is reported unhealthy.
pub const LINK_UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// Largest accepted poll interval, timeout and tick period (one week).
pub const MAX_POLLING_SECS: u64 = 7 * 86_400;

// ============================================================================
// Storage
// ============================================================================

/// Store file used when none is configured.
pub const STORE_PATH: &str = "./data/msi_store.json";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "msi_config.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "MSI_CONFIG";
