//! In-memory typing statistics
//!
//! Single writer: the supervisor loop records transitions as they arrive
//! off the helper stream. All histories are bounded, so memory stays flat
//! however long the daemon runs.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::KeyCountEntry;

/// Bounded history sizes.
const DWELL_WINDOW: usize = 100;
const RHYTHM_WINDOW: usize = 50;
const PRESS_WINDOW: usize = 100;

/// Rolling window for the keys-per-second figure.
const KPS_WINDOW: Duration = Duration::from_secs(1);

/// Keys struck by the left hand on a QWERTY layout. Anything else counts
/// as the right hand.
const LEFT_HAND_KEYS: [&str; 28] = [
    "KeyQ", "KeyW", "KeyE", "KeyR", "KeyT",
    "KeyA", "KeyS", "KeyD", "KeyF", "KeyG",
    "KeyZ", "KeyX", "KeyC", "KeyV", "KeyB",
    "Digit1", "Digit2", "Digit3", "Digit4", "Digit5",
    "Tab", "CapsLock", "ShiftLeft", "ControlLeft", "AltLeft", "MetaLeft",
    "Backquote", "Escape",
];

/// Press counts split by hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandBalance {
    pub left: u64,
    pub right: u64,
}

/// Point-in-time view of the statistics, shaped for the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub total_keystrokes: u64,
    pub keys_per_second: f64,
    pub average_dwell_ms: f64,
    pub hand_balance: HandBalance,
    pub top_keys: Vec<KeyCountEntry>,
    /// Intervals between recent consecutive presses, oldest first.
    pub rhythm_ms: Vec<u64>,
}

/// Live typing statistics.
pub struct KeyStats {
    total_keystrokes: u64,
    key_frequency: HashMap<String, u64>,
    dwell_times: VecDeque<Duration>,
    rhythm: VecDeque<Duration>,
    presses: VecDeque<Instant>,
    key_down_at: HashMap<String, Instant>,
    hand_balance: HandBalance,
    dirty: bool,
}

impl KeyStats {
    pub fn new() -> Self {
        Self {
            total_keystrokes: 0,
            key_frequency: HashMap::new(),
            dwell_times: VecDeque::with_capacity(DWELL_WINDOW),
            rhythm: VecDeque::with_capacity(RHYTHM_WINDOW),
            presses: VecDeque::with_capacity(PRESS_WINDOW),
            key_down_at: HashMap::new(),
            hand_balance: HandBalance::default(),
            dirty: false,
        }
    }

    /// Record a key press at the given instant.
    pub fn record_press(&mut self, name: &str, now: Instant) {
        self.total_keystrokes += 1;
        *self.key_frequency.entry(name.to_string()).or_insert(0) += 1;

        if let Some(&last) = self.presses.back() {
            push_bounded(&mut self.rhythm, now.saturating_duration_since(last), RHYTHM_WINDOW);
        }
        push_bounded(&mut self.presses, now, PRESS_WINDOW);

        self.key_down_at.insert(name.to_string(), now);

        if LEFT_HAND_KEYS.contains(&name) {
            self.hand_balance.left += 1;
        } else {
            self.hand_balance.right += 1;
        }

        self.dirty = true;
    }

    /// Record a key release. A release with no matching press is ignored.
    pub fn record_release(&mut self, name: &str, now: Instant) {
        if let Some(down_at) = self.key_down_at.remove(name) {
            push_bounded(
                &mut self.dwell_times,
                now.saturating_duration_since(down_at),
                DWELL_WINDOW,
            );
        }
    }

    pub fn total_keystrokes(&self) -> u64 {
        self.total_keystrokes
    }

    pub fn hand_balance(&self) -> HandBalance {
        self.hand_balance
    }

    /// Presses within the last second, counted backwards from `now`.
    pub fn keys_per_second(&self, now: Instant) -> f64 {
        if self.presses.len() < 2 {
            return 0.0;
        }

        let mut count = 0u32;
        for &pressed_at in self.presses.iter().rev() {
            if now.saturating_duration_since(pressed_at) <= KPS_WINDOW {
                count += 1;
            } else {
                break;
            }
        }

        f64::from(count)
    }

    /// Mean press-to-release time over the recent dwell window.
    pub fn average_dwell_ms(&self) -> f64 {
        if self.dwell_times.is_empty() {
            return 0.0;
        }

        let total: Duration = self.dwell_times.iter().sum();
        total.as_secs_f64() * 1000.0 / self.dwell_times.len() as f64
    }

    /// The `n` most pressed keys, count descending. Ties break by name so
    /// the order is stable.
    pub fn top_keys(&self, n: usize) -> Vec<KeyCountEntry> {
        let mut entries = self.entries();
        entries.truncate(n);
        entries
    }

    /// All per-key counts, sorted the way the analytics file is written.
    pub fn entries(&self) -> Vec<KeyCountEntry> {
        let mut entries: Vec<KeyCountEntry> = self
            .key_frequency
            .iter()
            .map(|(key, &count)| KeyCountEntry {
                key: key.clone(),
                count,
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        entries
    }

    /// Rebuild counts and the total from saved entries.
    ///
    /// Timing histories are not persisted, so they start empty.
    pub fn hydrate(&mut self, entries: Vec<KeyCountEntry>) {
        for entry in entries {
            self.total_keystrokes += entry.count;
            *self.key_frequency.entry(entry.key).or_insert(0) += entry.count;
        }
    }

    /// Drop everything recorded so far.
    pub fn reset(&mut self) {
        *self = Self {
            dirty: true,
            ..Self::new()
        };
    }

    /// Whether counts have changed since the last `clear_dirty`.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the current counts as persisted.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Snapshot the current statistics.
    pub fn snapshot(&self, now: Instant) -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            total_keystrokes: self.total_keystrokes,
            keys_per_second: self.keys_per_second(now),
            average_dwell_ms: self.average_dwell_ms(),
            hand_balance: self.hand_balance,
            top_keys: self.top_keys(5),
            rhythm_ms: self.rhythm.iter().map(|d| d.as_millis() as u64).collect(),
        }
    }
}

impl Default for KeyStats {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded<T>(deque: &mut VecDeque<T>, value: T, cap: usize) {
    if deque.len() == cap {
        deque.pop_front();
    }
    deque.push_back(value);
}
