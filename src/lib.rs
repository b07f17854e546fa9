//! keyscope: system-wide keyboard activity monitoring
//!
//! Two binaries are built from this library:
//! - `keyscope-capture` taps the platform keyboard stream and prints one
//!   protocol line per key transition on stdout
//! - `keyscoped` supervises the helper, aggregates keystroke analytics,
//!   and serves them over a Unix socket

pub mod analytics;
pub mod capture;
pub mod config;
pub mod event;
pub mod ipc;
pub mod keymap;
pub mod lifecycle;
pub mod modifier;
pub mod protocol;
pub mod supervisor;

pub use event::{KeyEvent, KeyKind};
pub use keymap::{normalize, RawKeyCode};
pub use modifier::{detect_edges, Modifier, ModifierMask, ModifierTracker};
pub use protocol::{Line, LineEmitter, LineParseError};
