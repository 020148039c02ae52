//! Polling-based settings file watcher.
//!
//! Checks the config file's mtime every 2 seconds. When a change is detected,
//! debounces for 500ms (to handle partial writes from editors), then reloads
//! and validates the file and sends the result via an mpsc channel. The
//! receiver pushes accepted settings into the handler.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;

use super::MsiSettings;

/// Events emitted by the settings watcher.
#[derive(Debug)]
pub enum SettingsEvent {
    /// File changed and parsed cleanly.
    Reloaded(Box<MsiSettings>),
    /// Reload was attempted but failed (old settings remain active).
    Error(String),
}

/// Interval between mtime checks.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Debounce delay after detecting a change.
const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Run the settings watcher loop.
///
/// Returns when the channel is closed or the task is cancelled.
pub async fn run_settings_watcher(path: PathBuf, tx: mpsc::Sender<SettingsEvent>) {
    run_with_intervals(path, tx, POLL_INTERVAL, DEBOUNCE_DELAY).await;
}

async fn run_with_intervals(
    path: PathBuf,
    tx: mpsc::Sender<SettingsEvent>,
    poll_interval: Duration,
    debounce: Duration,
) {
    tracing::info!(path = %path.display(), "Settings watcher started");

    let mut last_mtime = get_mtime(&path);

    loop {
        tokio::time::sleep(poll_interval).await;

        let Some(current) = get_mtime(&path) else {
            if last_mtime.is_some() {
                tracing::warn!(
                    path = %path.display(),
                    "Settings file not accessible — keeping current settings, will retry"
                );
                last_mtime = None;
            }
            continue;
        };

        if last_mtime == Some(current) {
            continue;
        }

        tokio::time::sleep(debounce).await;
        if get_mtime(&path) != Some(current) {
            continue;
        }
        last_mtime = Some(current);

        let event = match MsiSettings::load_from_file(&path) {
            Ok(settings) => {
                tracing::info!(path = %path.display(), "Settings reloaded");
                SettingsEvent::Reloaded(Box::new(settings))
            }
            Err(e) => {
                tracing::error!(error = %e, "Settings reload failed — keeping previous settings");
                SettingsEvent::Error(e.to_string())
            }
        };

        if tx.send(event).await.is_err() {
            tracing::debug!("Settings watcher channel closed, stopping");
            return;
        }
    }
}

fn get_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
