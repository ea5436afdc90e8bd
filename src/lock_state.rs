//! Shared Locked/Unlocked state
//!
//! One instance is created at startup (always Unlocked) and shared as an
//! `Arc` between the coordinator, which is the only writer, and the
//! interceptor thread, which reads `is_locked` on every key event. The
//! instance lives until the last `Arc` is dropped at process exit.

use crate::keys::{KeyCode, KeySet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct LockState {
    /// Hot-path flag read by the interceptor
    locked: AtomicBool,
    /// Non-empty iff `locked`. Transitions happen under this mutex.
    suppressed: Mutex<KeySet>,
    /// Pending request for the interceptor to forget its held keys
    held_reset: AtomicBool,
}

impl LockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Unlocked -> Locked. Returns false if already locked.
    pub fn engage(&self) -> bool {
        let mut suppressed = self.suppressed();
        if self.locked.load(Ordering::Acquire) {
            return false;
        }
        *suppressed = KeySet::full();
        self.locked.store(true, Ordering::Release);
        true
    }

    /// Locked -> Unlocked. Returns false if already unlocked.
    ///
    /// Also asks the interceptor to drop its held-key tracking so the hotkey
    /// cannot look stuck right after an unlock.
    pub fn release(&self) -> bool {
        let mut suppressed = self.suppressed();
        if !self.locked.load(Ordering::Acquire) {
            return false;
        }
        suppressed.clear();
        self.locked.store(false, Ordering::Release);
        self.request_held_key_reset();
        true
    }

    /// Snapshot of the keys currently being suppressed.
    pub fn suppressed_keys(&self) -> KeySet {
        *self.suppressed()
    }

    pub fn is_suppressed(&self, code: KeyCode) -> bool {
        self.suppressed().contains(code)
    }

    /// Ask the interceptor to clear its held-key state on its next event.
    /// Does not touch the lock itself.
    pub fn request_held_key_reset(&self) {
        self.held_reset.store(true, Ordering::Release);
    }

    /// Consume a pending held-key reset request.
    pub fn take_held_key_reset(&self) -> bool {
        self.held_reset.swap(false, Ordering::AcqRel)
    }

    fn suppressed(&self) -> MutexGuard<'_, KeySet> {
        self.suppressed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_unlocked_with_nothing_suppressed() {
        let state = LockState::new();
        assert!(!state.is_locked());
        assert!(state.suppressed_keys().is_empty());
        assert!(!state.take_held_key_reset());
    }

    #[test]
    fn engage_suppresses_the_whole_code_space() {
        let state = LockState::new();
        assert!(state.engage());
        assert!(state.is_locked());
        assert_eq!(state.suppressed_keys().len(), 256);
        assert!(state.is_suppressed(KeyCode(0xE9)));
    }

    #[test]
    fn engage_then_release_is_idempotent() {
        let state = LockState::new();
        assert!(state.engage());
        assert!(!state.engage());
        assert!(!state.engage());
        assert!(state.release());
        assert!(!state.is_locked());
        assert!(state.suppressed_keys().is_empty());
        assert!(!state.release());
        assert!(!state.is_locked());
    }

    #[test]
    fn release_requests_held_key_reset() {
        let state = LockState::new();
        state.engage();
        assert!(!state.take_held_key_reset());
        state.release();
        assert!(state.take_held_key_reset());
        assert!(!state.take_held_key_reset());
    }

    #[test]
    fn held_key_reset_leaves_lock_alone() {
        let state = LockState::new();
        state.engage();
        state.request_held_key_reset();
        assert!(state.is_locked());
        assert_eq!(state.suppressed_keys().len(), 256);
    }

    #[test]
    fn concurrent_readers_see_consistent_state() {
        let state = Arc::new(LockState::new());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || (0..1000).filter(|_| state.is_locked()).count())
            })
            .collect();

        for _ in 0..100 {
            state.engage();
            assert_eq!(state.is_locked(), !state.suppressed_keys().is_empty());
            state.release();
            assert_eq!(state.is_locked(), !state.suppressed_keys().is_empty());
        }

        for reader in readers {
            assert!(reader.join().unwrap() <= 1000);
        }
        assert!(!state.is_locked());
    }
}
