//! Raw keycode to canonical key name translation
//!
//! The table mirrors the macOS virtual keycode layout for an ANSI
//! keyboard. Lookup is total: codes outside the table map to a stable
//! `Unknown<code>` name instead of failing.

use std::borrow::Cow;

/// Raw keycode as delivered in the OS keyboard event field.
pub type RawKeyCode = i64;

/// Raw keycode of the left Shift key.
pub const SHIFT_LEFT: RawKeyCode = 56;
/// Raw keycode of the left Control key.
pub const CONTROL_LEFT: RawKeyCode = 59;
/// Raw keycode of the left Option/Alt key.
pub const ALT_LEFT: RawKeyCode = 58;
/// Raw keycode of the left Command key.
pub const META_LEFT: RawKeyCode = 55;

/// Look up the canonical name for a raw keycode.
///
/// Returns `None` for codes outside the table. Most callers want
/// [`normalize`], which never fails.
pub fn lookup(code: RawKeyCode) -> Option<&'static str> {
    let name = match code {
        0 => "KeyA",
        1 => "KeyS",
        2 => "KeyD",
        3 => "KeyF",
        4 => "KeyH",
        5 => "KeyG",
        6 => "KeyZ",
        7 => "KeyX",
        8 => "KeyC",
        9 => "KeyV",
        11 => "KeyB",
        12 => "KeyQ",
        13 => "KeyW",
        14 => "KeyE",
        15 => "KeyR",
        16 => "KeyY",
        17 => "KeyT",
        18 => "Digit1",
        19 => "Digit2",
        20 => "Digit3",
        21 => "Digit4",
        22 => "Digit6",
        23 => "Digit5",
        24 => "Equal",
        25 => "Digit9",
        26 => "Digit7",
        27 => "Minus",
        28 => "Digit8",
        29 => "Digit0",
        30 => "BracketRight",
        31 => "KeyO",
        32 => "KeyU",
        33 => "BracketLeft",
        34 => "KeyI",
        35 => "KeyP",
        36 => "Enter",
        37 => "KeyL",
        38 => "KeyJ",
        39 => "Quote",
        40 => "KeyK",
        41 => "Semicolon",
        42 => "Backslash",
        43 => "Comma",
        44 => "Slash",
        45 => "KeyN",
        46 => "KeyM",
        47 => "Period",
        48 => "Tab",
        49 => "Space",
        50 => "Backquote",
        51 => "Backspace",
        53 => "Escape",
        54 => "MetaRight",
        55 => "MetaLeft",
        56 => "ShiftLeft",
        57 => "CapsLock",
        58 => "AltLeft",
        59 => "ControlLeft",
        60 => "ShiftRight",
        61 => "AltRight",
        62 => "ControlRight",
        63 => "Function",
        64 => "F17",
        65 => "NumpadDecimal",
        67 => "NumpadMultiply",
        69 => "NumpadAdd",
        71 => "NumpadClear",
        72 => "VolumeUp",
        73 => "VolumeDown",
        74 => "Mute",
        75 => "NumpadDivide",
        76 => "NumpadEnter",
        78 => "NumpadSubtract",
        79 => "F18",
        80 => "F19",
        81 => "NumpadEqual",
        82 => "Numpad0",
        83 => "Numpad1",
        84 => "Numpad2",
        85 => "Numpad3",
        86 => "Numpad4",
        87 => "Numpad5",
        88 => "Numpad6",
        89 => "Numpad7",
        91 => "Numpad8",
        92 => "Numpad9",
        96 => "F5",
        97 => "F6",
        98 => "F7",
        99 => "F3",
        100 => "F8",
        101 => "F9",
        103 => "F11",
        105 => "F13",
        106 => "F16",
        107 => "F14",
        109 => "F10",
        111 => "F12",
        113 => "F15",
        114 => "Help",
        115 => "Home",
        116 => "PageUp",
        117 => "Delete",
        118 => "F4",
        119 => "End",
        120 => "F2",
        121 => "PageDown",
        122 => "F1",
        123 => "ArrowLeft",
        124 => "ArrowRight",
        125 => "ArrowDown",
        126 => "ArrowUp",
        _ => return None,
    };
    Some(name)
}

/// Translate a raw keycode into its canonical name.
///
/// Total over all inputs. Unmapped codes become `Unknown<code>`, which is
/// deterministic per code and can never collide with a table name.
pub fn normalize(code: RawKeyCode) -> Cow<'static, str> {
    match lookup(code) {
        Some(name) => Cow::Borrowed(name),
        None => Cow::Owned(format!("Unknown{code}")),
    }
}
