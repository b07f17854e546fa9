//! Global keyboard capture
//!
//! `TapListener` owns the platform event tap and delivers normalized
//! key events over a channel. Everything platform specific lives in the
//! listener; the raw-event model and the normalization pipeline are
//! portable and testable anywhere.

mod listener;

pub use listener::TapListener;

use crate::event::KeyEvent;
use crate::keymap::{self, RawKeyCode};
use crate::modifier::{ModifierMask, ModifierTracker};

/// Raw keyboard transitions as the OS reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    KeyDown(RawKeyCode),
    KeyUp(RawKeyCode),
    /// Modifier flags changed. Carries the new mask and the raw keycode
    /// of the key that changed it.
    FlagsChanged { mask: ModifierMask, code: RawKeyCode },
}

/// Errors from the capture backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("capture is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    TapCreation,

    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(String),

    #[error("global key capture is not supported on this platform")]
    Unsupported,
}

/// Turns raw OS events into canonical key events.
///
/// Ordinary keys translate through the keycode table. Modifier flag
/// changes go through the edge detector, which keeps the previous mask
/// between calls.
#[derive(Debug, Default)]
pub struct EventNormalizer {
    modifiers: ModifierTracker,
}

impl EventNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one raw event. Plain key events always yield exactly one
    /// transition; flags changes may yield several or none.
    pub fn process(&mut self, raw: RawEvent) -> Vec<KeyEvent> {
        match raw {
            RawEvent::KeyDown(code) => vec![KeyEvent::press(keymap::normalize(code))],
            RawEvent::KeyUp(code) => vec![KeyEvent::release(keymap::normalize(code))],
            RawEvent::FlagsChanged { mask, code } => self.modifiers.update(mask, code),
        }
    }
}
