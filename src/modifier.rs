//! Modifier flag tracking and press/release edge detection
//!
//! Modifier keys do not arrive as ordinary key-down/key-up events; the OS
//! reports them as a changed flags bitmask on a flags-changed event. This
//! module diffs consecutive masks and synthesizes the press and release
//! transitions the rest of the pipeline expects.

use crate::event::KeyEvent;
use crate::keymap::{RawKeyCode, ALT_LEFT, CONTROL_LEFT, META_LEFT, SHIFT_LEFT};

/// Modifier flag bitmask as reported by the OS event.
///
/// Bit positions match macOS `CGEventFlags`. Bits outside the tracked set
/// (caps-lock, shift, control, alt, command) are carried but ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierMask(u64);

impl ModifierMask {
    /// No modifier held.
    pub const NONE: Self = Self(0);

    pub fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn contains(self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    pub fn with(self, modifier: Modifier) -> Self {
        Self(self.0 | modifier.bit())
    }

    pub fn without(self, modifier: Modifier) -> Self {
        Self(self.0 & !modifier.bit())
    }
}

/// The modifier classes the edge detector tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Shift,
    Control,
    Alt,
    Command,
    CapsLock,
}

impl Modifier {
    /// Check order when several flags flip in one event. Fixed so the
    /// emitted stream is reproducible.
    pub const PRIORITY: [Modifier; 5] = [
        Modifier::Shift,
        Modifier::Control,
        Modifier::Alt,
        Modifier::Command,
        Modifier::CapsLock,
    ];

    /// Bit in the OS flags word for this modifier.
    pub fn bit(self) -> u64 {
        match self {
            Modifier::CapsLock => 1 << 16,
            Modifier::Shift => 1 << 17,
            Modifier::Control => 1 << 18,
            Modifier::Alt => 1 << 19,
            Modifier::Command => 1 << 20,
        }
    }

    /// Canonical name for a transition of this modifier.
    ///
    /// The flags word does not say which physical key changed; the raw
    /// keycode carried by the same event does. A code equal to the left
    /// variant selects the left name, anything else the right. Caps-lock
    /// has no sides.
    pub fn key_name(self, changed_key: RawKeyCode) -> &'static str {
        match self {
            Modifier::Shift if changed_key == SHIFT_LEFT => "ShiftLeft",
            Modifier::Shift => "ShiftRight",
            Modifier::Control if changed_key == CONTROL_LEFT => "ControlLeft",
            Modifier::Control => "ControlRight",
            Modifier::Alt if changed_key == ALT_LEFT => "AltLeft",
            Modifier::Alt => "AltRight",
            Modifier::Command if changed_key == META_LEFT => "MetaLeft",
            Modifier::Command => "MetaRight",
            Modifier::CapsLock => "CapsLock",
        }
    }
}

/// Diff two modifier masks and emit the resulting key transitions.
///
/// `changed_key` is the raw keycode carried by the flags-changed event.
/// An unchanged mask yields no events, so duplicate OS callbacks are
/// harmless. Events come out in [`Modifier::PRIORITY`] order.
pub fn detect_edges(
    current: ModifierMask,
    changed_key: RawKeyCode,
    previous: ModifierMask,
) -> Vec<KeyEvent> {
    let changed = current.raw() ^ previous.raw();
    let mut events = Vec::new();

    for modifier in Modifier::PRIORITY {
        if changed & modifier.bit() == 0 {
            continue;
        }

        let name = modifier.key_name(changed_key);
        if current.contains(modifier) {
            events.push(KeyEvent::press(name));
        } else {
            events.push(KeyEvent::release(name));
        }
    }

    events
}

/// Owns the previous mask so callers can feed raw flags snapshots and get
/// edges back.
///
/// Single writer only: the OS delivers flags-changed callbacks serially
/// on the tap thread.
#[derive(Debug, Default)]
pub struct ModifierTracker {
    previous: ModifierMask,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next flags snapshot, returning any modifier transitions.
    pub fn update(&mut self, current: ModifierMask, changed_key: RawKeyCode) -> Vec<KeyEvent> {
        let events = detect_edges(current, changed_key, self.previous);
        self.previous = current;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyKind;

    #[test]
    fn test_unchanged_mask_yields_nothing() {
        let mask = ModifierMask::NONE.with(Modifier::Shift);
        assert!(detect_edges(mask, SHIFT_LEFT, mask).is_empty());
        assert!(detect_edges(ModifierMask::NONE, 0, ModifierMask::NONE).is_empty());
    }

    #[test]
    fn test_left_shift_press_and_release() {
        let down = ModifierMask::NONE.with(Modifier::Shift);

        let events = detect_edges(down, SHIFT_LEFT, ModifierMask::NONE);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, KeyKind::Press);
        assert_eq!(events[0].name, "ShiftLeft");

        let events = detect_edges(ModifierMask::NONE, SHIFT_LEFT, down);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, KeyKind::Release);
        assert_eq!(events[0].name, "ShiftLeft");
    }

    #[test]
    fn test_right_side_resolved_by_keycode() {
        let down = ModifierMask::NONE.with(Modifier::Control);

        // Raw code 62 is the right Control key
        let events = detect_edges(down, 62, ModifierMask::NONE);
        assert_eq!(events[0].name, "ControlRight");

        let down = ModifierMask::NONE.with(Modifier::Command);
        let events = detect_edges(down, 54, ModifierMask::NONE);
        assert_eq!(events[0].name, "MetaRight");
    }

    #[test]
    fn test_simultaneous_flips_come_out_in_priority_order() {
        let current = ModifierMask::NONE
            .with(Modifier::Shift)
            .with(Modifier::Control);

        let events = detect_edges(current, SHIFT_LEFT, ModifierMask::NONE);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "ShiftLeft");
        // The changed keycode is shift's, so control resolves to the right name
        assert_eq!(events[1].name, "ControlRight");
        assert!(events.iter().all(|e| e.kind == KeyKind::Press));
    }

    #[test]
    fn test_caps_lock_has_no_side() {
        let down = ModifierMask::NONE.with(Modifier::CapsLock);

        let events = detect_edges(down, 57, ModifierMask::NONE);
        assert_eq!(events[0].name, "CapsLock");
        assert_eq!(events[0].kind, KeyKind::Press);

        let events = detect_edges(ModifierMask::NONE, 57, down);
        assert_eq!(events[0].name, "CapsLock");
        assert_eq!(events[0].kind, KeyKind::Release);
    }

    #[test]
    fn test_untracked_bits_are_ignored() {
        // Bit 8 is an event-coalescing flag, not a modifier
        let current = ModifierMask::from_raw(1 << 8);
        assert!(detect_edges(current, 0, ModifierMask::NONE).is_empty());
    }

    #[test]
    fn test_mixed_press_and_release_in_one_event() {
        let previous = ModifierMask::NONE.with(Modifier::Shift);
        let current = ModifierMask::NONE.with(Modifier::Alt);

        let events = detect_edges(current, ALT_LEFT, previous);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, KeyKind::Release);
        assert_eq!(events[0].name, "ShiftRight");
        assert_eq!(events[1].kind, KeyKind::Press);
        assert_eq!(events[1].name, "AltLeft");
    }

    #[test]
    fn test_tracker_follows_a_sequence() {
        let mut tracker = ModifierTracker::new();

        let shift = ModifierMask::NONE.with(Modifier::Shift);
        let events = tracker.update(shift, SHIFT_LEFT);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "ShiftLeft");

        let shift_control = shift.with(Modifier::Control);
        let events = tracker.update(shift_control, CONTROL_LEFT);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "ControlLeft");
        assert_eq!(events[0].kind, KeyKind::Press);

        // Duplicate snapshot: no edges
        assert!(tracker.update(shift_control, CONTROL_LEFT).is_empty());

        let events = tracker.update(ModifierMask::NONE, SHIFT_LEFT);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == KeyKind::Release));
        assert_eq!(events[0].name, "ShiftLeft");
        assert_eq!(events[1].name, "ControlRight");
    }
}
