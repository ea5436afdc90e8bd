//! Configuration management for Keylatch
//!
//! Stores settings in JSON format at ~/.keylatch/config.json

use crate::hotkey::{HotkeyCombo, ParseError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

pub const DEFAULT_HOTKEY: &str = "ctrl+b";
pub const MIN_OPACITY: f32 = 0.05;
pub const MAX_OPACITY: f32 = 0.9;

/// Command-line flag that restores the default config at startup
pub const RESET_FLAG: &str = "--reset-config";
/// Environment variable with the same effect as [`RESET_FLAG`]
pub const RESET_ENV: &str = "KEYLATCH_RESET_CONFIG";

/// Opacity choices offered in the tray menu
pub const OPACITY_PRESETS: [f32; 6] = [0.05, 0.1, 0.3, 0.5, 0.7, 0.9];

/// Overlay colors offered in the tray menu, all colorblind-friendly
pub const COLOR_PRESETS: [(&str, &str); 6] = [
    ("Forest Green", "#1B5E20"),
    ("Deep Blue", "#1565C0"),
    ("Dark Purple", "#4A148C"),
    ("Charcoal Gray", "#37474F"),
    ("Dark Orange", "#E65100"),
    ("Deep Teal", "#00695C"),
];

const DEFAULT_OVERLAY_COLOR: &str = "#1B5E20";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid hotkey: {0}")]
    Hotkey(#[from] ParseError),

    #[error("opacity {0} is outside 0.05..=0.9")]
    Opacity(f32),

    #[error("overlay color '{0}' is not #RRGGBB")]
    Color(String),
}

/// Whether a click on the overlay unlocks, in addition to the hotkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockPolicy {
    #[default]
    HotkeyOnly,
    HotkeyOrClick,
}

impl UnlockPolicy {
    pub fn click_unlocks(self) -> bool {
        self == UnlockPolicy::HotkeyOrClick
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hotkey to toggle lock (e.g., "ctrl+b", "ctrl+shift+l")
    pub hotkey: String,

    /// Overlay opacity, kept within MIN_OPACITY..=MAX_OPACITY
    pub opacity: f32,

    /// Whether to show a notification when locking
    pub notifications_enabled: bool,

    /// Overlay color in hex (e.g., "#2D5A27" for green)
    pub overlay_color: String,

    pub unlock_policy: UnlockPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: DEFAULT_HOTKEY.to_string(),
            opacity: 0.3,
            notifications_enabled: true,
            overlay_color: DEFAULT_OVERLAY_COLOR.to_string(),
            unlock_policy: UnlockPolicy::default(),
        }
    }
}

impl Config {
    /// Per-user application directory (~/.keylatch)
    pub fn app_dir() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".keylatch")
    }

    /// Get the config file path (~/.keylatch/config.json)
    pub fn config_path() -> PathBuf {
        Self::app_dir().join("config.json")
    }

    /// Single-instance lock file path (~/.keylatch/instance.lock)
    pub fn lock_file_path() -> PathBuf {
        Self::app_dir().join("instance.lock")
    }

    /// Load from `path`. A missing file is created with defaults; an
    /// unreadable or malformed one is replaced with defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("using default config: {}", e);
                let config = Self::default();
                if let Err(e) = config.save_to(path) {
                    warn!("failed to write default config: {}", e);
                }
                config
            }
        }
    }

    /// Read and sanitize the config at `path`, writing defaults if absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("no config at {}, creating defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = serde_json::from_str(&contents)?;
        config.sanitize();
        Ok(config)
    }

    /// Overwrite `path` with defaults.
    pub fn reset(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::default();
        config.save_to(path)?;
        info!("config reset to defaults at {}", path.display());
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).map_err(io_err)
    }

    /// Clamp out-of-range values read from disk.
    pub fn sanitize(&mut self) {
        if !(MIN_OPACITY..=MAX_OPACITY).contains(&self.opacity) {
            let clamped = if self.opacity.is_nan() {
                Config::default().opacity
            } else {
                self.opacity.clamp(MIN_OPACITY, MAX_OPACITY)
            };
            warn!("opacity {} out of range, using {}", self.opacity, clamped);
            self.opacity = clamped;
        }
    }

    /// Change opacity, rejecting values outside the allowed range.
    pub fn set_opacity(&mut self, opacity: f32) -> Result<(), ConfigError> {
        if !(MIN_OPACITY..=MAX_OPACITY).contains(&opacity) {
            return Err(ConfigError::Opacity(opacity));
        }
        self.opacity = opacity;
        Ok(())
    }

    /// The configured hotkey, parsed.
    pub fn parse_hotkey(&self) -> Result<HotkeyCombo, ParseError> {
        self.hotkey.parse()
    }

    /// True when `opacity` is the current setting (tray checkmarks).
    pub fn opacity_is(&self, opacity: f32) -> bool {
        (self.opacity - opacity).abs() < 0.001
    }

    /// Change the overlay color, rejecting anything that is not `#RRGGBB`.
    pub fn set_overlay_color(&mut self, color: &str) -> Result<(), ConfigError> {
        if parse_hex_color(color).is_none() {
            return Err(ConfigError::Color(color.to_string()));
        }
        self.overlay_color = color.trim().to_ascii_uppercase();
        Ok(())
    }

    /// True when `color` is the current setting (tray checkmarks).
    pub fn overlay_color_is(&self, color: &str) -> bool {
        parse_hex_color(color).is_some_and(|rgb| parse_hex_color(&self.overlay_color) == Some(rgb))
    }

    /// Overlay color as RGB, falling back to the default green when the
    /// stored value does not parse.
    pub fn parse_overlay_color(&self) -> (u8, u8, u8) {
        parse_hex_color(&self.overlay_color).unwrap_or((0x1B, 0x5E, 0x20))
    }
}

/// `#RRGGBB` (leading `#` optional) to RGB.
fn parse_hex_color(text: &str) -> Option<(u8, u8, u8)> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Whether startup should overwrite the config with defaults.
pub fn reset_requested<I, S>(args: I, env_value: Option<&str>) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let env_set = env_value.is_some_and(|v| !matches!(v.trim(), "" | "0" | "false"));
    env_set || args.into_iter().any(|a| a.as_ref() == RESET_FLAG)
}

/// The live configuration, shared between the coordinator (writer) and the
/// tray (reader at menu render time).
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<Config>>);

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn snapshot(&self) -> Config {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Apply `f` to the config and return the updated copy.
    pub fn update<F>(&self, f: F) -> Config
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut config);
        config.clone()
    }
}
