//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsSnapshot;
use crate::event::KeyKind;
use crate::supervisor::{CaptureState, FeedEvent};

/// Requests from clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Request an analytics snapshot
    GetAnalytics,

    /// Start or stop the capture helper
    SetTracking { enabled: bool },

    /// Clear all accumulated analytics
    ResetAnalytics,

    /// Subscribe to key event and capture state notifications
    Subscribe,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Analytics snapshot
    Analytics(AnalyticsSnapshot),

    /// Tracking state after a set_tracking request
    Tracking { enabled: bool },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A key went down
    Key { name: String },

    /// A key came back up
    Release { name: String },

    /// The capture pipeline changed state
    Capture { state: CaptureState },
}

/// Everything the daemon writes on a client connection. The `kind` tag
/// lets clients split request replies from subscription pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerFrame {
    Response(Response),
    Notification(Notification),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Whether the capture helper should be running
    pub tracking_enabled: bool,

    /// Current capture pipeline state
    pub capture: CaptureState,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Keystrokes recorded since the counts were last reset
    pub total_keystrokes: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            tracking_enabled: false,
            capture: CaptureState::default(),
            uptime_secs: 0,
            total_keystrokes: 0,
        }
    }
}

/// Convert an internal feed event into its wire notification
impl From<FeedEvent> for Notification {
    fn from(event: FeedEvent) -> Self {
        match event {
            FeedEvent::Key(key) => {
                let name = key.name.into_owned();
                match key.kind {
                    KeyKind::Press => Notification::Key { name },
                    KeyKind::Release => Notification::Release { name },
                }
            }
            FeedEvent::Capture(state) => Notification::Capture { state },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyEvent;

    #[test]
    fn test_request_serialization() {
        let req = Request::SetTracking { enabled: true };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("set_tracking"));
        assert!(json.contains("true"));
    }

    #[test]
    fn test_request_parses_from_raw_json() {
        let req: Request = serde_json::from_str(r#"{"type":"get_analytics"}"#).unwrap();
        assert!(matches!(req, Request::GetAnalytics));
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_server_frame_envelope_round_trip() {
        let frame = ServerFrame::Notification(Notification::Key {
            name: "KeyA".to_string(),
        });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("notification"));
        assert!(json.contains("KeyA"));

        let parsed: ServerFrame = serde_json::from_str(&json).unwrap();
        match parsed {
            ServerFrame::Notification(Notification::Key { name }) => assert_eq!(name, "KeyA"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_feed_event_conversion() {
        let press = Notification::from(FeedEvent::Key(KeyEvent::press("KeyQ")));
        assert!(matches!(press, Notification::Key { ref name } if name == "KeyQ"));

        let state = Notification::from(FeedEvent::Capture(CaptureState::Ready));
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("capture"));
        assert!(json.contains("ready"));
    }
}
