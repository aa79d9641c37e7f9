//! Observable capture state.

use std::fmt;

/// Everything a UI needs to render the capture controls and the mouth.
///
/// Published through a `tokio::sync::watch` channel; see
/// [`CaptureManager::subscribe()`](crate::CaptureManager::subscribe).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureSnapshot {
    /// `true` while a session is wired up and running.
    pub is_live: bool,
    /// Normalized loudness in `[0, 1]`. Always 0 when not live.
    pub volume: f32,
    /// Message of the last failed `start()`, cleared by the next attempt.
    pub error: Option<String>,
}

impl CaptureSnapshot {
    /// Collapses the snapshot into a [`CaptureStatus`].
    pub fn status(&self) -> CaptureStatus {
        if self.is_live {
            CaptureStatus::Live
        } else if let Some(error) = &self.error {
            CaptureStatus::Failed(error.clone())
        } else {
            CaptureStatus::Idle
        }
    }
}

/// Coarse session state for status lines and buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Nothing is captured.
    Idle,
    /// A session is live.
    Live,
    /// Nothing is captured because the last `start()` failed.
    Failed(String),
}

impl CaptureStatus {
    /// Returns `true` for [`CaptureStatus::Live`].
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Live => f.write_str("Live"),
            Self::Failed(reason) => write!(f, "Failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_idle() {
        let snapshot = CaptureSnapshot::default();
        assert_eq!(snapshot.status(), CaptureStatus::Idle);
        assert_eq!(snapshot.volume, 0.0);
    }

    #[test]
    fn test_live_wins_over_stale_error() {
        let snapshot = CaptureSnapshot {
            is_live: true,
            volume: 0.3,
            error: Some("old".to_string()),
        };
        assert_eq!(snapshot.status(), CaptureStatus::Live);
    }

    #[test]
    fn test_failed_status() {
        let snapshot = CaptureSnapshot {
            error: Some("no audio track".to_string()),
            ..Default::default()
        };
        let status = snapshot.status();
        assert!(!status.is_live());
        assert_eq!(status.to_string(), "Failed: no audio track");
    }
}
