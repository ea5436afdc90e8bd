//! Hotkey parsing and matching
//!
//! A hotkey is one trigger key plus a non-empty set of modifiers, written as
//! a `+`-delimited, case-insensitive list such as `"ctrl+shift+l"`.

use crate::keys::KeyCode;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;

/// Modifier bitmask. Left and right variants collapse into one flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const CTRL: Modifiers = Modifiers(0b0001);
    pub const ALT: Modifiers = Modifiers(0b0010);
    pub const SHIFT: Modifiers = Modifiers(0b0100);
    pub const WIN: Modifiers = Modifiers(0b1000);

    /// Display order for canonical text and labels
    const ORDERED: [(Modifiers, &'static str, &'static str); 4] = [
        (Modifiers::CTRL, "ctrl", "Ctrl"),
        (Modifiers::ALT, "alt", "Alt"),
        (Modifiers::SHIFT, "shift", "Shift"),
        (Modifiers::WIN, "win", "Win"),
    ];

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Modifiers) -> Modifiers {
        Modifiers(self.0 | other.0)
    }

    /// The modifier a key code stands for, if it is a modifier key at all.
    /// Covers the generic, left and right variants.
    pub fn of_key(code: KeyCode) -> Option<Modifiers> {
        match code {
            KeyCode::CONTROL | KeyCode::LCONTROL | KeyCode::RCONTROL => Some(Modifiers::CTRL),
            KeyCode::MENU | KeyCode::LMENU | KeyCode::RMENU => Some(Modifiers::ALT),
            KeyCode::SHIFT | KeyCode::LSHIFT | KeyCode::RSHIFT => Some(Modifiers::SHIFT),
            KeyCode::LWIN | KeyCode::RWIN => Some(Modifiers::WIN),
            _ => None,
        }
    }

    fn from_token(token: &str) -> Option<Modifiers> {
        match token {
            "ctrl" | "control" => Some(Modifiers::CTRL),
            "alt" => Some(Modifiers::ALT),
            "shift" => Some(Modifiers::SHIFT),
            "win" | "windows" | "meta" | "super" => Some(Modifiers::WIN),
            _ => None,
        }
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

impl BitOrAssign for Modifiers {
    fn bitor_assign(&mut self, rhs: Modifiers) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("hotkey is empty")]
    Empty,

    #[error("unknown key '{0}'")]
    UnknownToken(String),

    #[error("hotkey has no trigger key")]
    MissingTriggerKey,

    #[error("hotkey has two trigger keys: '{0}' and '{1}'")]
    MultipleTriggerKeys(String, String),

    #[error("hotkey needs at least one modifier (ctrl, alt, shift or win)")]
    NoModifier,
}

/// A parsed hotkey. Immutable; re-parse to change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotkeyCombo {
    modifiers: Modifiers,
    key: KeyCode,
}

impl HotkeyCombo {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut modifiers = Modifiers::NONE;
        let mut trigger: Option<(String, KeyCode)> = None;

        for token in text.split('+').map(str::trim) {
            if let Some(modifier) = Modifiers::from_token(token) {
                modifiers |= modifier;
                continue;
            }

            let code = KeyCode::from_name(token)
                .ok_or_else(|| ParseError::UnknownToken(token.to_string()))?;

            if let Some((first, _)) = &trigger {
                return Err(ParseError::MultipleTriggerKeys(
                    first.clone(),
                    token.to_string(),
                ));
            }
            trigger = Some((token.to_string(), code));
        }

        let (_, key) = trigger.ok_or(ParseError::MissingTriggerKey)?;
        if modifiers.is_empty() {
            return Err(ParseError::NoModifier);
        }

        Ok(Self { modifiers, key })
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn key(&self) -> KeyCode {
        self.key
    }

    /// True when exactly this combo's modifiers are held and `key` is the
    /// trigger. Extra modifiers do not match.
    pub fn matches(&self, active: Modifiers, key: KeyCode) -> bool {
        active == self.modifiers && key == self.key
    }

    /// Title-case form for user-facing text, e.g. `Ctrl+Shift+L`.
    pub fn label(&self) -> String {
        let mut parts: Vec<String> = Modifiers::ORDERED
            .iter()
            .filter(|(m, _, _)| self.modifiers.contains(*m))
            .map(|(_, _, label)| label.to_string())
            .collect();
        parts.push(self.key.label());
        parts.join("+")
    }
}

/// Ctrl+B, the out-of-the-box toggle.
impl Default for HotkeyCombo {
    fn default() -> Self {
        Self {
            modifiers: Modifiers::CTRL,
            key: KeyCode::from_ascii(b'b'),
        }
    }
}

/// Canonical lowercase form, stable across aliases.
impl fmt::Display for HotkeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (m, name, _) in Modifiers::ORDERED.iter() {
            if self.modifiers.contains(*m) {
                write!(f, "{}+", name)?;
            }
        }
        write!(f, "{}", self.key)
    }
}

impl FromStr for HotkeyCombo {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
