//! Shore link status for the "last updated" indicator

use chrono::{DateTime, Utc};

/// Shore link health
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkHealth {
    /// Last poll succeeded
    Healthy,
    /// Polling is failing or has not succeeded yet; data may be stale
    Degraded { reason: String },
    /// Repeated failures; new warnings are not reaching the ship
    Unhealthy { reason: String },
}

impl std::fmt::Display for LinkHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::Degraded { reason } => write!(f, "DEGRADED: {reason}"),
            Self::Unhealthy { reason } => write!(f, "UNHEALTHY: {reason}"),
        }
    }
}

/// Point-in-time link summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub health: LinkHealth,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub successful_polls: u64,
}

/// Mutable poll bookkeeping kept by the handler.
#[derive(Debug, Default)]
pub(crate) struct LinkTracker {
    last_success: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_error: Option<String>,
    successful_polls: u64,
}

impl LinkTracker {
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.last_success = Some(at);
        self.last_attempt = Some(at);
        self.consecutive_failures = 0;
        self.last_error = None;
        self.successful_polls += 1;
    }

    pub fn record_failure(&mut self, at: DateTime<Utc>, error: String) {
        self.last_attempt = Some(at);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error);
    }

    pub const fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    pub fn status(&self, unhealthy_after: u32) -> LinkStatus {
        let health = match (self.last_success, self.consecutive_failures) {
            (_, n) if n >= unhealthy_after => LinkHealth::Unhealthy {
                reason: format!("{n} consecutive poll failures"),
            },
            (_, n) if n > 0 => LinkHealth::Degraded {
                reason: format!(
                    "last poll failed: {}",
                    self.last_error.as_deref().unwrap_or("unknown error")
                ),
            },
            (None, _) => LinkHealth::Degraded {
                reason: "no successful poll yet".to_string(),
            },
            (Some(_), _) => LinkHealth::Healthy,
        };

        LinkStatus {
            health,
            last_success: self.last_success,
            last_attempt: self.last_attempt,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            successful_polls: self.successful_polls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_progression() {
        let mut tracker = LinkTracker::default();
        assert!(matches!(tracker.status(3).health, LinkHealth::Degraded { .. }));

        let now = Utc::now();
        tracker.record_success(now);
        assert_eq!(tracker.status(3).health, LinkHealth::Healthy);

        tracker.record_failure(now, "connection refused".into());
        let status = tracker.status(3);
        assert!(matches!(status.health, LinkHealth::Degraded { .. }));
        assert_eq!(status.last_success, Some(now));

        tracker.record_failure(now, "connection refused".into());
        tracker.record_failure(now, "connection refused".into());
        assert!(matches!(tracker.status(3).health, LinkHealth::Unhealthy { .. }));

        tracker.record_success(now);
        let status = tracker.status(3);
        assert_eq!(status.health, LinkHealth::Healthy);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.successful_polls, 2);
    }
}
