//! Keylatch - Windows keyboard locking utility
//!
//! Locks the whole keyboard behind a full-screen overlay until the hotkey
//! is pressed again. Useful when a cat decides to sit on the keyboard.

#![windows_subsystem = "windows"]

use keylatch::config::{reset_requested, RESET_ENV};
use keylatch::StartupError;
use log::{error, info};

fn main() {
    // Initialize logging (only in debug builds)
    #[cfg(debug_assertions)]
    env_logger::init();

    info!("Keylatch starting...");

    let env_value = std::env::var(RESET_ENV).ok();
    let reset = reset_requested(std::env::args().skip(1), env_value.as_deref());

    if let Err(e) = start(reset) {
        if e.is_already_running() {
            info!("{}", e);
            show_info(&e.user_message());
            return;
        }
        error!("{}", e);
        show_error(&e.user_message());
        std::process::exit(1);
    }
}

#[cfg(windows)]
fn start(reset_config: bool) -> Result<(), StartupError> {
    keylatch::platform::run(reset_config)
}

#[cfg(not(windows))]
fn start(_reset_config: bool) -> Result<(), StartupError> {
    Err(StartupError::Unsupported)
}

#[cfg(windows)]
fn show_error(message: &str) {
    keylatch::platform::show_error(message);
}

#[cfg(windows)]
fn show_info(message: &str) {
    keylatch::platform::show_info(message);
}

#[cfg(not(windows))]
fn show_error(message: &str) {
    eprintln!("keylatch: {}", message);
}

#[cfg(not(windows))]
fn show_info(message: &str) {
    eprintln!("keylatch: {}", message);
}
