//! MSI Settings Module
//!
//! Settings are loaded from TOML and injected into the store and handler at
//! construction; nothing reads process-wide state. The active settings sit
//! behind an `ArcSwap` so the config watcher can replace them while the
//! coordinator and callers keep reading without blocking.
//!
//! ## Loading Order
//!
//! 1. `MSI_CONFIG` environment variable (path to TOML file)
//! 2. `msi_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Settings are never persisted with the store, so old store files are always
//! interpreted with the current radius and tolerances.

mod settings;
pub mod defaults;
pub mod watcher;

pub use settings::*;

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Settings shared between the handler, the store and the config watcher.
pub type SharedSettings = Arc<ArcSwap<MsiSettings>>;

/// Wrap settings for sharing.
pub fn shared(settings: MsiSettings) -> SharedSettings {
    Arc::new(ArcSwap::from_pointee(settings))
}
