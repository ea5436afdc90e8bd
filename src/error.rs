//! Startup failures surfaced to the user

use crate::config::ConfigError;
use crate::instance::InstanceError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to install keyboard hook: {0}")]
    HookInstall(String),

    #[error("failed to create {what}: {reason}")]
    Ui { what: &'static str, reason: String },

    #[error("failed to start {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("keylatch only runs on Windows")]
    Unsupported,
}

impl StartupError {
    /// Text for the error dialog shown before exiting.
    pub fn user_message(&self) -> String {
        match self {
            StartupError::Instance(InstanceError::AlreadyRunning { .. }) => {
                "Keylatch is already running.\n\nCheck your system tray.".to_string()
            }
            StartupError::HookInstall(_) => format!(
                "{}\n\nKeylatch cannot lock the keyboard without it.",
                self
            ),
            other => other.to_string(),
        }
    }

    /// Another instance is not a failure of this one.
    pub fn is_already_running(&self) -> bool {
        matches!(
            self,
            StartupError::Instance(InstanceError::AlreadyRunning { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_running_has_friendly_text() {
        let err = StartupError::from(InstanceError::AlreadyRunning { pid: 42 });
        assert!(err.is_already_running());
        assert!(err.user_message().contains("already running"));
        assert_eq!(err.to_string(), "another instance is already running (pid 42)");
    }

    #[test]
    fn hook_failure_mentions_the_cause() {
        let err = StartupError::HookInstall("access denied".into());
        assert!(!err.is_already_running());
        assert!(err.user_message().contains("access denied"));
    }
}
