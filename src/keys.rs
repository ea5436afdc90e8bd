//! Virtual-key codes, the named-key table and a fixed-size key bitset
//!
//! Codes follow the Windows virtual-key numbering. The whole code space is
//! 256 values, so a set of keys is four machine words.

use std::fmt;

/// A virtual-key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u8);

impl KeyCode {
    pub const BACK: KeyCode = KeyCode(0x08);
    pub const TAB: KeyCode = KeyCode(0x09);
    pub const RETURN: KeyCode = KeyCode(0x0D);
    pub const SHIFT: KeyCode = KeyCode(0x10);
    pub const CONTROL: KeyCode = KeyCode(0x11);
    pub const MENU: KeyCode = KeyCode(0x12);
    pub const PAUSE: KeyCode = KeyCode(0x13);
    pub const CAPITAL: KeyCode = KeyCode(0x14);
    pub const ESCAPE: KeyCode = KeyCode(0x1B);
    pub const SPACE: KeyCode = KeyCode(0x20);
    pub const PRIOR: KeyCode = KeyCode(0x21);
    pub const NEXT: KeyCode = KeyCode(0x22);
    pub const END: KeyCode = KeyCode(0x23);
    pub const HOME: KeyCode = KeyCode(0x24);
    pub const LEFT: KeyCode = KeyCode(0x25);
    pub const UP: KeyCode = KeyCode(0x26);
    pub const RIGHT: KeyCode = KeyCode(0x27);
    pub const DOWN: KeyCode = KeyCode(0x28);
    pub const SNAPSHOT: KeyCode = KeyCode(0x2C);
    pub const INSERT: KeyCode = KeyCode(0x2D);
    pub const DELETE: KeyCode = KeyCode(0x2E);
    pub const LWIN: KeyCode = KeyCode(0x5B);
    pub const RWIN: KeyCode = KeyCode(0x5C);
    pub const NUMPAD0: KeyCode = KeyCode(0x60);
    pub const F1: KeyCode = KeyCode(0x70);
    pub const NUMLOCK: KeyCode = KeyCode(0x90);
    pub const SCROLL: KeyCode = KeyCode(0x91);
    pub const LSHIFT: KeyCode = KeyCode(0xA0);
    pub const RSHIFT: KeyCode = KeyCode(0xA1);
    pub const LCONTROL: KeyCode = KeyCode(0xA2);
    pub const RCONTROL: KeyCode = KeyCode(0xA3);
    pub const LMENU: KeyCode = KeyCode(0xA4);
    pub const RMENU: KeyCode = KeyCode(0xA5);

    /// Letter or digit key for an ASCII alphanumeric character.
    pub const fn from_ascii(c: u8) -> KeyCode {
        KeyCode(c.to_ascii_uppercase())
    }

    /// Classify a raw code reported by the OS. Anything outside 1..=255 has
    /// no virtual-key meaning.
    pub fn from_raw(raw: u32) -> Option<KeyCode> {
        match raw {
            1..=255 => Some(KeyCode(raw as u8)),
            _ => None,
        }
    }

    /// Look up a trigger key by (lowercase) name. Modifier names are not
    /// trigger keys and resolve to `None`.
    pub fn from_name(name: &str) -> Option<KeyCode> {
        if let Some(code) = NAMED_KEYS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, code)| *code)
        {
            return Some(code);
        }

        let bytes = name.as_bytes();
        if bytes.len() == 1 && bytes[0].is_ascii_alphanumeric() {
            return Some(KeyCode::from_ascii(bytes[0]));
        }

        if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            if (1..=24).contains(&n) {
                return Some(KeyCode(KeyCode::F1.0 + n - 1));
            }
        }

        if let Some(n) = name.strip_prefix("num").and_then(|n| n.parse::<u8>().ok()) {
            if n <= 9 {
                return Some(KeyCode(KeyCode::NUMPAD0.0 + n));
            }
        }

        None
    }

    /// Human-readable label used in the overlay and tray text.
    pub fn label(self) -> String {
        match self.0 {
            c @ (b'A'..=b'Z' | b'0'..=b'9') => (c as char).to_string(),
            c if (KeyCode::F1.0..KeyCode::F1.0 + 24).contains(&c) => {
                format!("F{}", c - KeyCode::F1.0 + 1)
            }
            c if (KeyCode::NUMPAD0.0..KeyCode::NUMPAD0.0 + 10).contains(&c) => {
                format!("Num{}", c - KeyCode::NUMPAD0.0)
            }
            _ => match canonical_name(self) {
                Some(name) => {
                    let mut chars = name.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    }
                }
                None => format!("0x{:02X}", self.0),
            },
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            c @ (b'A'..=b'Z' | b'0'..=b'9') => write!(f, "{}", (c as char).to_ascii_lowercase()),
            _ => write!(f, "{}", self.label().to_lowercase()),
        }
    }
}

/// Named trigger keys. The first entry for a code is its canonical name.
const NAMED_KEYS: &[(&str, KeyCode)] = &[
    ("space", KeyCode::SPACE),
    ("enter", KeyCode::RETURN),
    ("return", KeyCode::RETURN),
    ("escape", KeyCode::ESCAPE),
    ("esc", KeyCode::ESCAPE),
    ("tab", KeyCode::TAB),
    ("backspace", KeyCode::BACK),
    ("delete", KeyCode::DELETE),
    ("del", KeyCode::DELETE),
    ("insert", KeyCode::INSERT),
    ("ins", KeyCode::INSERT),
    ("home", KeyCode::HOME),
    ("end", KeyCode::END),
    ("pageup", KeyCode::PRIOR),
    ("pgup", KeyCode::PRIOR),
    ("pagedown", KeyCode::NEXT),
    ("pgdn", KeyCode::NEXT),
    ("up", KeyCode::UP),
    ("down", KeyCode::DOWN),
    ("left", KeyCode::LEFT),
    ("right", KeyCode::RIGHT),
    ("capslock", KeyCode::CAPITAL),
    ("numlock", KeyCode::NUMLOCK),
    ("scrolllock", KeyCode::SCROLL),
    ("pause", KeyCode::PAUSE),
    ("printscreen", KeyCode::SNAPSHOT),
    ("prtsc", KeyCode::SNAPSHOT),
    // Media
    ("volumemute", KeyCode(0xAD)),
    ("mute", KeyCode(0xAD)),
    ("volumedown", KeyCode(0xAE)),
    ("volumeup", KeyCode(0xAF)),
    ("nexttrack", KeyCode(0xB0)),
    ("prevtrack", KeyCode(0xB1)),
    ("mediastop", KeyCode(0xB2)),
    ("playpause", KeyCode(0xB3)),
    // Punctuation (US layout positions)
    ("semicolon", KeyCode(0xBA)),
    (";", KeyCode(0xBA)),
    ("equals", KeyCode(0xBB)),
    ("=", KeyCode(0xBB)),
    ("comma", KeyCode(0xBC)),
    (",", KeyCode(0xBC)),
    ("minus", KeyCode(0xBD)),
    ("-", KeyCode(0xBD)),
    ("period", KeyCode(0xBE)),
    (".", KeyCode(0xBE)),
    ("slash", KeyCode(0xBF)),
    ("/", KeyCode(0xBF)),
    ("backtick", KeyCode(0xC0)),
    ("`", KeyCode(0xC0)),
    ("leftbracket", KeyCode(0xDB)),
    ("[", KeyCode(0xDB)),
    ("backslash", KeyCode(0xDC)),
    ("\\", KeyCode(0xDC)),
    ("rightbracket", KeyCode(0xDD)),
    ("]", KeyCode(0xDD)),
    ("quote", KeyCode(0xDE)),
    ("'", KeyCode(0xDE)),
];

fn canonical_name(code: KeyCode) -> Option<&'static str> {
    NAMED_KEYS
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(name, _)| *name)
}

/// Set of virtual-key codes covering the full 0..=255 code space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeySet([u64; 4]);

impl KeySet {
    pub const fn empty() -> Self {
        KeySet([0; 4])
    }

    /// Every code, named or not.
    pub const fn full() -> Self {
        KeySet([u64::MAX; 4])
    }

    pub fn insert(&mut self, code: KeyCode) -> bool {
        let (word, bit) = Self::slot(code);
        let was_set = self.0[word] & bit != 0;
        self.0[word] |= bit;
        !was_set
    }

    pub fn remove(&mut self, code: KeyCode) -> bool {
        let (word, bit) = Self::slot(code);
        let was_set = self.0[word] & bit != 0;
        self.0[word] &= !bit;
        was_set
    }

    pub fn contains(&self, code: KeyCode) -> bool {
        let (word, bit) = Self::slot(code);
        self.0[word] & bit != 0
    }

    pub fn clear(&mut self) {
        self.0 = [0; 4];
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn slot(code: KeyCode) -> (usize, u64) {
        ((code.0 >> 6) as usize, 1u64 << (code.0 & 63))
    }
}
