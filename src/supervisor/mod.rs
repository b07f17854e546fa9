//! Capture helper supervision and event fan-out
//!
//! The supervisor owns the helper child process, turns its stdout line
//! protocol into typed events, records analytics, and broadcasts a feed
//! that the IPC layer relays to subscribed clients.

mod process;
mod service;

pub use process::CaptureProcess;
pub use service::Supervisor;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::analytics::AnalyticsSnapshot;
use crate::event::KeyEvent;

/// Where the capture pipeline currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// No helper running and none requested.
    #[default]
    Idle,
    /// Helper spawned, waiting for its ready line.
    Starting,
    /// Helper reported its tap is installed.
    Ready,
    /// Helper is up but could not install its tap.
    Unavailable,
    /// Helper exited on its own.
    Stopped,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "Idle"),
            CaptureState::Starting => write!(f, "Starting"),
            CaptureState::Ready => write!(f, "Ready"),
            CaptureState::Unavailable => write!(f, "Unavailable"),
            CaptureState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Daemon-wide state, shared with the IPC server for status queries.
#[derive(Debug)]
pub struct DaemonState {
    /// Whether the helper is supposed to be running.
    pub tracking_enabled: bool,
    pub capture: CaptureState,
    pub started_at: Instant,
}

impl DaemonState {
    pub fn new() -> Self {
        Self {
            tracking_enabled: false,
            capture: CaptureState::Idle,
            started_at: Instant::now(),
        }
    }
}

impl Default for DaemonState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events broadcast to feed subscribers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A key transition from the helper.
    Key(KeyEvent),
    /// The capture pipeline changed state.
    Capture(CaptureState),
}

/// Commands from the IPC layer into the supervisor loop.
#[derive(Debug)]
pub enum SupervisorCommand {
    /// Start or stop the capture helper.
    SetTracking {
        enabled: bool,
        reply: oneshot::Sender<Result<(), String>>,
    },
    /// Clear all recorded analytics, answering with the cleared snapshot.
    ResetAnalytics {
        reply: oneshot::Sender<AnalyticsSnapshot>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_state_serializes_snake_case() {
        let json = serde_json::to_string(&CaptureState::Unavailable).unwrap();
        assert_eq!(json, "\"unavailable\"");

        let state: CaptureState = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(state, CaptureState::Ready);
    }
}
