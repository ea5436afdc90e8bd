//! Requests flowing into the coordinator
//!
//! Every producer (interceptor thread, tray thread, overlay window) holds a
//! cloned [`SignalSender`]. The UI thread owns the single receiver. Sending
//! never blocks; after queueing, the sender runs a wake hook so a UI thread
//! parked in its message pump notices the new signal.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

/// Where an unlock request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockSource {
    /// Left click on the overlay
    Pointer,
}

/// A configuration change requested from the tray
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    Opacity(f32),
    /// `#RRGGBB`
    OverlayColor(String),
    Notifications(bool),
    Hotkey(String),
    ClickToUnlock(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The hotkey edge was seen by the interceptor
    Toggle,
    /// Tray "Lock Keyboard"
    RequestLock,
    /// Overlay asked to be dismissed
    UnlockRequested(UnlockSource),
    SettingChanged(Setting),
    /// Tray "Quit" or the UI thread's pump ending
    Quit,
}

type Waker = Arc<dyn Fn() + Send + Sync>;

/// Cloneable, thread-safe producer handle.
#[derive(Clone)]
pub struct SignalSender {
    sender: Sender<Signal>,
    wake: Waker,
}

impl SignalSender {
    /// Queue a signal. Returns false once the receiver is gone, which only
    /// happens during shutdown.
    pub fn send(&self, signal: Signal) -> bool {
        if self.sender.send(signal).is_err() {
            return false;
        }
        (self.wake)();
        true
    }
}

impl fmt::Debug for SignalSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalSender").finish_non_exhaustive()
    }
}

/// Consumer side, owned by the UI thread.
#[derive(Debug)]
pub struct SignalReceiver {
    receiver: Receiver<Signal>,
}

impl SignalReceiver {
    /// Everything queued right now, in send order.
    pub fn drain(&self) -> Vec<Signal> {
        let mut signals = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(signal) => signals.push(signal),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        signals
    }
}

/// Create a channel whose senders call `wake` after every send.
pub fn channel<F>(wake: F) -> (SignalSender, SignalReceiver)
where
    F: Fn() + Send + Sync + 'static,
{
    let (sender, receiver) = mpsc::channel();
    (
        SignalSender {
            sender,
            wake: Arc::new(wake),
        },
        SignalReceiver { receiver },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn drains_in_send_order_and_wakes_per_send() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let (tx, rx) = channel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(tx.send(Signal::Toggle));
        assert!(tx.send(Signal::SettingChanged(Setting::Notifications(false))));
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        assert_eq!(
            rx.drain(),
            vec![
                Signal::Toggle,
                Signal::SettingChanged(Setting::Notifications(false))
            ]
        );
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn senders_work_across_threads() {
        let (tx, rx) = channel(|| {});
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let tx = tx.clone();
                std::thread::spawn(move || tx.send(Signal::RequestLock))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(rx.drain().len(), 3);
    }

    #[test]
    fn send_fails_after_receiver_dropped() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let (tx, rx) = channel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(rx);
        assert!(!tx.send(Signal::Quit));
        assert_eq!(wakes.load(Ordering::SeqCst), 0);
    }
}
