//! Keylatch - Windows keyboard locking utility
//!
//! Blocks keyboard input system-wide (say, a cat walking across the
//! keyboard) until a configurable hotkey is pressed again. The platform-free
//! core lives in the top-level modules; [`platform`] wires it to Win32.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod geometry;
pub mod hotkey;
pub mod instance;
pub mod interceptor;
pub mod janitor;
pub mod keys;
pub mod lock_state;
pub mod signal;

#[cfg(windows)]
pub mod platform;

pub use config::{Config, SharedConfig, UnlockPolicy};
pub use coordinator::{Coordinator, Effect, OverlaySpec};
pub use error::StartupError;
pub use hotkey::{HotkeyCombo, Modifiers, ParseError};
pub use interceptor::{Interceptor, KeyEvent, Verdict};
pub use keys::{KeyCode, KeySet};
pub use lock_state::LockState;
pub use signal::{Setting, Signal, SignalReceiver, SignalSender, UnlockSource};
