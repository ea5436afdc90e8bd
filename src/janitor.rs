//! Periodic held-key clearing
//!
//! Held-key tracking can go stale when key releases never reach the hook,
//! most notably across a Windows session lock/unlock. The hotkey would then
//! look permanently pressed. A low-priority thread asks the interceptor to
//! forget its held keys at a fixed interval; clearing too often costs nothing.

use crate::lock_state::LockState;
use log::{debug, trace};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const HELD_KEY_RESET_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to the clearing thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct HeldKeyJanitor {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl HeldKeyJanitor {
    pub fn spawn(state: Arc<LockState>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("held-key-janitor".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        trace!("requesting held-key reset");
                        state.request_held_key_reset();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        debug!("held-key janitor running every {:?}", interval);
        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl Drop for HeldKeyJanitor {
    fn drop(&mut self) {
        // Disconnecting the channel wakes the thread immediately
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
