//! Per-event keyboard decision logic
//!
//! [`Interceptor`] is driven by the low-level hook on the hook thread, one
//! call per raw key event. It keeps its own record of held keys (built from
//! make/break events, never from OS key-state queries) so hotkey detection
//! stays accurate even while nearly everything is being suppressed.
//!
//! The callback must stay cheap and must not fail: no I/O, no blocking, no
//! panicking paths. Anything slower is handed to the coordinator as a
//! [`Signal`].

use crate::hotkey::{HotkeyCombo, Modifiers};
use crate::keys::{KeyCode, KeySet};
use crate::lock_state::LockState;
use crate::signal::{Signal, SignalSender};
use log::{debug, trace};
use std::sync::Arc;

/// Outcome for a single key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Consume the event; no application sees it
    Suppress,
    /// Hand the event to the next hook
    PassThrough,
}

/// A raw key event as reported by the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Virtual-key code, unvalidated
    pub raw_code: u32,
    /// Make (true) or break (false)
    pub pressed: bool,
}

impl KeyEvent {
    pub fn down(code: KeyCode) -> Self {
        Self {
            raw_code: code.0 as u32,
            pressed: true,
        }
    }

    pub fn up(code: KeyCode) -> Self {
        Self {
            raw_code: code.0 as u32,
            pressed: false,
        }
    }
}

/// A combination the OS reserves for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedCombo {
    pub name: &'static str,
    pub modifiers: Modifiers,
    pub key: KeyCode,
}

/// Let through while locked. The hook cannot actually block these on
/// Windows; listing them keeps the behavior explicit.
pub const RESERVED_COMBOS: &[ReservedCombo] = &[
    ReservedCombo {
        name: "secure attention",
        modifiers: Modifiers::CTRL.union(Modifiers::ALT),
        key: KeyCode::DELETE,
    },
    ReservedCombo {
        name: "session lock",
        modifiers: Modifiers::WIN,
        key: KeyCode::from_ascii(b'l'),
    },
    ReservedCombo {
        name: "task manager",
        modifiers: Modifiers::CTRL.union(Modifiers::SHIFT),
        key: KeyCode::ESCAPE,
    },
];

/// Modifier key codes tracked in the held set
const MODIFIER_KEYS: [KeyCode; 11] = [
    KeyCode::SHIFT,
    KeyCode::CONTROL,
    KeyCode::MENU,
    KeyCode::LSHIFT,
    KeyCode::RSHIFT,
    KeyCode::LCONTROL,
    KeyCode::RCONTROL,
    KeyCode::LMENU,
    KeyCode::RMENU,
    KeyCode::LWIN,
    KeyCode::RWIN,
];

#[derive(Debug)]
pub struct Interceptor {
    hotkey: HotkeyCombo,
    state: Arc<LockState>,
    signals: SignalSender,
    /// Keys currently down, per our own make/break tracking
    held: KeySet,
    /// Keys whose press was suppressed; their repeats and release follow
    swallowed: KeySet,
}

impl Interceptor {
    /// The hotkey is captured by value; a new combo needs a new interceptor.
    pub fn new(hotkey: HotkeyCombo, state: Arc<LockState>, signals: SignalSender) -> Self {
        Self {
            hotkey,
            state,
            signals,
            held: KeySet::empty(),
            swallowed: KeySet::empty(),
        }
    }

    /// Modifiers currently held according to our own tracking.
    pub fn held_modifiers(&self) -> Modifiers {
        let mut active = Modifiers::NONE;
        for code in MODIFIER_KEYS {
            if self.held.contains(code) {
                if let Some(modifier) = Modifiers::of_key(code) {
                    active |= modifier;
                }
            }
        }
        active
    }

    /// Forget every held key. Lock state and signals are untouched.
    pub fn reset_held_keys(&mut self) {
        self.held.clear();
    }

    pub fn on_key_event(&mut self, event: KeyEvent) -> Verdict {
        if self.state.take_held_key_reset() {
            trace!("clearing held-key state");
            self.reset_held_keys();
        }

        let locked = self.state.is_locked();

        let Some(code) = KeyCode::from_raw(event.raw_code) else {
            trace!("unmapped key code {:#x}", event.raw_code);
            return if locked {
                Verdict::Suppress
            } else {
                Verdict::PassThrough
            };
        };

        if !event.pressed {
            self.held.remove(code);
            // A release follows whatever its press got
            return if self.swallowed.remove(code) {
                Verdict::Suppress
            } else {
                Verdict::PassThrough
            };
        }

        // A swallowed key is still down until its release arrives, even when
        // a held-key reset emptied `held`
        let is_repeat = !self.held.insert(code) || self.swallowed.contains(code);

        if is_repeat {
            return self.repeat(code, locked);
        }

        if self.hotkey.matches(self.held_modifiers(), code) {
            debug!("hotkey {} pressed (locked={})", self.hotkey, locked);
            self.signals.send(Signal::Toggle);
            return self.swallow(code);
        }

        if !locked {
            return Verdict::PassThrough;
        }

        if let Some(combo) = self.reserved_combo(code) {
            debug!("letting reserved combo through: {}", combo.name);
            return Verdict::PassThrough;
        }

        self.swallow(code)
    }

    /// Auto-repeat of a key that is already down. The release must get the
    /// same verdict as the original press, so `swallowed` is left alone.
    fn repeat(&self, code: KeyCode, locked: bool) -> Verdict {
        if self.swallowed.contains(code) {
            return Verdict::Suppress;
        }
        if !locked || self.reserved_combo(code).is_some() {
            return Verdict::PassThrough;
        }
        // Pressed before the lock: hide the repeat, let the release through
        Verdict::Suppress
    }

    fn reserved_combo(&self, code: KeyCode) -> Option<&'static ReservedCombo> {
        let held = self.held_modifiers();
        RESERVED_COMBOS
            .iter()
            .find(|combo| combo.key == code && held.contains(combo.modifiers))
    }

    fn swallow(&mut self, code: KeyCode) -> Verdict {
        self.swallowed.insert(code);
        Verdict::Suppress
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{channel, SignalReceiver};

    fn key(c: u8) -> KeyCode {
        KeyCode::from_ascii(c)
    }

    fn setup(hotkey: &str) -> (Interceptor, Arc<LockState>, SignalReceiver) {
        let state = Arc::new(LockState::new());
        let (tx, rx) = channel(|| {});
        let combo = HotkeyCombo::parse(hotkey).unwrap();
        (Interceptor::new(combo, Arc::clone(&state), tx), state, rx)
    }

    fn tap(interceptor: &mut Interceptor, code: KeyCode) -> (Verdict, Verdict) {
        (
            interceptor.on_key_event(KeyEvent::down(code)),
            interceptor.on_key_event(KeyEvent::up(code)),
        )
    }

    #[test]
    fn unlocked_keys_pass_through() {
        let (mut interceptor, _state, rx) = setup("ctrl+b");
        assert_eq!(
            tap(&mut interceptor, key(b'a')),
            (Verdict::PassThrough, Verdict::PassThrough)
        );
        assert_eq!(
            tap(&mut interceptor, key(b'b')),
            (Verdict::PassThrough, Verdict::PassThrough)
        );
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn hotkey_is_suppressed_and_signals_toggle() {
        let (mut interceptor, _state, rx) = setup("ctrl+b");
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(KeyCode::LCONTROL)),
            Verdict::PassThrough
        );
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'b'))),
            Verdict::Suppress
        );
        assert_eq!(rx.drain(), vec![Signal::Toggle]);

        // held trigger repeats and its release stay hidden
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'b'))),
            Verdict::Suppress
        );
        assert_eq!(
            interceptor.on_key_event(KeyEvent::up(key(b'b'))),
            Verdict::Suppress
        );
        assert!(rx.drain().is_empty(), "auto-repeat is not an edge");

        assert_eq!(
            interceptor.on_key_event(KeyEvent::up(KeyCode::LCONTROL)),
            Verdict::PassThrough
        );
    }

    #[test]
    fn extra_modifier_does_not_fire_subset_combo() {
        let (mut interceptor, _state, rx) = setup("ctrl+b");
        interceptor.on_key_event(KeyEvent::down(KeyCode::RCONTROL));
        interceptor.on_key_event(KeyEvent::down(KeyCode::LSHIFT));
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'b'))),
            Verdict::PassThrough
        );
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn locked_suppresses_every_non_reserved_code() {
        let (mut interceptor, state, rx) = setup("ctrl+alt+f12");
        state.engage();
        for raw in 1..=255u8 {
            let code = KeyCode(raw);
            let verdict = interceptor.on_key_event(KeyEvent::down(code));
            assert_eq!(verdict, Verdict::Suppress, "code {raw:#x}");
            interceptor.on_key_event(KeyEvent::up(code));
        }
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn locked_modifiers_are_suppressed_but_still_tracked() {
        let (mut interceptor, state, rx) = setup("ctrl+b");
        state.engage();
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(KeyCode::LCONTROL)),
            Verdict::Suppress
        );
        assert_eq!(interceptor.held_modifiers(), Modifiers::CTRL);
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'b'))),
            Verdict::Suppress
        );
        assert_eq!(rx.drain(), vec![Signal::Toggle]);
    }

    #[test]
    fn reserved_combos_pass_while_locked() {
        let (mut interceptor, state, _rx) = setup("ctrl+b");
        state.engage();

        interceptor.on_key_event(KeyEvent::down(KeyCode::LCONTROL));
        interceptor.on_key_event(KeyEvent::down(KeyCode::LMENU));
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(KeyCode::DELETE)),
            Verdict::PassThrough
        );
        assert_eq!(
            interceptor.on_key_event(KeyEvent::up(KeyCode::DELETE)),
            Verdict::PassThrough
        );
        interceptor.on_key_event(KeyEvent::up(KeyCode::LMENU));

        interceptor.on_key_event(KeyEvent::down(KeyCode::RSHIFT));
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(KeyCode::ESCAPE)),
            Verdict::PassThrough
        );
        interceptor.on_key_event(KeyEvent::up(KeyCode::ESCAPE));
        interceptor.on_key_event(KeyEvent::up(KeyCode::RSHIFT));
        interceptor.on_key_event(KeyEvent::up(KeyCode::LCONTROL));

        interceptor.on_key_event(KeyEvent::down(KeyCode::LWIN));
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'l'))),
            Verdict::PassThrough
        );

        // Delete on its own is still blocked
        interceptor.reset_held_keys();
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(KeyCode::DELETE)),
            Verdict::Suppress
        );
    }

    #[test]
    fn unmapped_codes_default_by_lock_state() {
        let (mut interceptor, state, _rx) = setup("ctrl+b");
        let odd = KeyEvent {
            raw_code: 0x1_0A,
            pressed: true,
        };
        assert_eq!(interceptor.on_key_event(odd), Verdict::PassThrough);
        state.engage();
        assert_eq!(interceptor.on_key_event(odd), Verdict::Suppress);
    }

    #[test]
    fn release_of_key_pressed_before_lock_passes_through() {
        let (mut interceptor, state, _rx) = setup("ctrl+b");
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(KeyCode::LSHIFT)),
            Verdict::PassThrough
        );
        state.engage();
        assert_eq!(
            interceptor.on_key_event(KeyEvent::up(KeyCode::LSHIFT)),
            Verdict::PassThrough
        );
    }

    #[test]
    fn repeat_of_key_pressed_before_lock_keeps_its_release() {
        let (mut interceptor, state, _rx) = setup("ctrl+b");
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(KeyCode::LCONTROL)),
            Verdict::PassThrough
        );
        state.engage();
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(KeyCode::LCONTROL)),
            Verdict::Suppress
        );
        assert_eq!(
            interceptor.on_key_event(KeyEvent::up(KeyCode::LCONTROL)),
            Verdict::PassThrough
        );
    }

    #[test]
    fn held_trigger_survives_held_key_reset_without_leaking() {
        let (mut interceptor, state, rx) = setup("ctrl+b");
        interceptor.on_key_event(KeyEvent::down(KeyCode::LCONTROL));
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'b'))),
            Verdict::Suppress
        );
        assert_eq!(rx.drain(), vec![Signal::Toggle]);
        // Simulate the coordinator acting on the toggle
        state.engage();
        state.release();

        // Periodic clear while the trigger is still held down
        state.request_held_key_reset();
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'b'))),
            Verdict::Suppress
        );
        assert_eq!(
            interceptor.on_key_event(KeyEvent::up(key(b'b'))),
            Verdict::Suppress
        );
        assert!(rx.drain().is_empty());

        assert_eq!(
            tap(&mut interceptor, key(b'b')),
            (Verdict::PassThrough, Verdict::PassThrough)
        );
    }

    #[test]
    fn reserved_key_repeats_pass_while_locked() {
        let (mut interceptor, state, _rx) = setup("ctrl+b");
        state.engage();
        interceptor.on_key_event(KeyEvent::down(KeyCode::LCONTROL));
        interceptor.on_key_event(KeyEvent::down(KeyCode::LMENU));
        interceptor.on_key_event(KeyEvent::down(KeyCode::DELETE));
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(KeyCode::DELETE)),
            Verdict::PassThrough
        );
    }

    #[test]
    fn release_of_key_pressed_while_locked_stays_hidden_after_unlock() {
        let (mut interceptor, state, _rx) = setup("ctrl+b");
        state.engage();
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'x'))),
            Verdict::Suppress
        );
        state.release();
        assert_eq!(
            interceptor.on_key_event(KeyEvent::up(key(b'x'))),
            Verdict::Suppress
        );
        assert_eq!(
            tap(&mut interceptor, key(b'x')),
            (Verdict::PassThrough, Verdict::PassThrough)
        );
    }

    #[test]
    fn held_key_reset_does_not_touch_lock_or_signal() {
        let (mut interceptor, state, rx) = setup("ctrl+b");
        state.engage();
        interceptor.on_key_event(KeyEvent::down(KeyCode::LCONTROL));
        assert_eq!(interceptor.held_modifiers(), Modifiers::CTRL);

        state.request_held_key_reset();
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'q'))),
            Verdict::Suppress
        );
        assert_eq!(interceptor.held_modifiers(), Modifiers::NONE);
        assert!(state.is_locked());
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn stale_modifier_is_cleared_by_reset() {
        let (mut interceptor, state, rx) = setup("ctrl+b");
        // Ctrl release lost, e.g. across a session lock
        interceptor.on_key_event(KeyEvent::down(KeyCode::LCONTROL));
        interceptor.on_key_event(KeyEvent::down(KeyCode::LSHIFT));
        interceptor.on_key_event(KeyEvent::up(KeyCode::LSHIFT));
        assert_eq!(
            interceptor.on_key_event(KeyEvent::down(key(b'b'))),
            Verdict::Suppress
        );
        interceptor.on_key_event(KeyEvent::up(key(b'b')));
        assert_eq!(rx.drain(), vec![Signal::Toggle]);

        state.request_held_key_reset();
        assert_eq!(
            tap(&mut interceptor, key(b'b')),
            (Verdict::PassThrough, Verdict::PassThrough)
        );
        assert!(rx.drain().is_empty());
    }
}
