//! Shared key event types
//!
//! Events stay typed everywhere inside the process; they only become
//! protocol text at the stdout boundary.

use std::borrow::Cow;

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Key went down
    Press,
    /// Key came back up
    Release,
}

/// A single normalized key transition.
///
/// Names from the keycode table are borrowed statics; fallback names own
/// their string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyKind,
    pub name: Cow<'static, str>,
}

impl KeyEvent {
    pub fn press(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: KeyKind::Press,
            name: name.into(),
        }
    }

    pub fn release(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: KeyKind::Release,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let press = KeyEvent::press("KeyA");
        assert_eq!(press.kind, KeyKind::Press);
        assert_eq!(press.name, "KeyA");

        let release = KeyEvent::release(String::from("Unknown10"));
        assert_eq!(release.kind, KeyKind::Release);
        assert_eq!(release.name, "Unknown10");
    }
}
