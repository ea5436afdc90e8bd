//! Lock/unlock coordination
//!
//! The coordinator consumes [`Signal`]s on the UI thread and answers with
//! [`Effect`]s for the platform runtime to carry out. It is the only code
//! that mutates [`LockState`], and it guarantees at most one overlay: a
//! second show is never issued while one is live.

use crate::config::{Config, SharedConfig, UnlockPolicy};
use crate::hotkey::HotkeyCombo;
use crate::lock_state::LockState;
use crate::signal::{Setting, Signal, UnlockSource};
use log::{debug, info, warn};
use std::sync::Arc;

/// Everything the overlay window needs to render itself.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpec {
    pub opacity: f32,
    pub color: (u8, u8, u8),
    pub text: String,
    pub click_to_unlock: bool,
}

/// Work for the runtime, in the order it must happen.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Notify the user; best-effort, never blocks
    NotifyLocked { hotkey_label: String },
    /// Open the overlay and run its loop until a `HideOverlay` arrives
    ShowOverlay(OverlaySpec),
    HideOverlay,
    /// Tear down the hook and install one for `hotkey`
    ReinstallInterceptor {
        hotkey: HotkeyCombo,
        previous: HotkeyCombo,
    },
    SaveConfig(Config),
    /// Leave the UI loop; the keyboard is already unlocked
    Exit,
}

#[derive(Debug)]
pub struct Coordinator {
    state: Arc<LockState>,
    config: SharedConfig,
    hotkey: HotkeyCombo,
    overlay_live: bool,
    exiting: bool,
}

impl Coordinator {
    /// An invalid configured hotkey falls back to the default combo.
    pub fn new(state: Arc<LockState>, config: SharedConfig) -> Self {
        let current = config.snapshot();
        let hotkey = match current.parse_hotkey() {
            Ok(combo) => combo,
            Err(e) => {
                let fallback = HotkeyCombo::default();
                warn!(
                    "configured hotkey '{}' is invalid ({}), using {}",
                    current.hotkey, e, fallback
                );
                fallback
            }
        };

        Self {
            state,
            config,
            hotkey,
            overlay_live: false,
            exiting: false,
        }
    }

    pub fn hotkey(&self) -> HotkeyCombo {
        self.hotkey
    }

    pub fn overlay_live(&self) -> bool {
        self.overlay_live
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    pub fn handle(&mut self, signal: Signal) -> Vec<Effect> {
        if self.exiting {
            debug!("ignoring {:?} during shutdown", signal);
            return Vec::new();
        }

        match signal {
            Signal::Toggle => {
                if self.state.is_locked() || self.overlay_live {
                    self.unlock()
                } else {
                    self.lock()
                }
            }
            Signal::RequestLock => {
                if self.state.is_locked() {
                    debug!("lock requested while already locked");
                    Vec::new()
                } else {
                    self.lock()
                }
            }
            Signal::UnlockRequested(UnlockSource::Pointer) => {
                let policy = self.config.snapshot().unlock_policy;
                if policy.click_unlocks() {
                    self.unlock()
                } else {
                    debug!("pointer unlock ignored under {:?}", policy);
                    Vec::new()
                }
            }
            Signal::SettingChanged(setting) => self.apply_setting(setting),
            Signal::Quit => self.shutdown(),
        }
    }

    /// Unlock, close the overlay and exit. Used for every way out.
    pub fn shutdown(&mut self) -> Vec<Effect> {
        if self.exiting {
            return Vec::new();
        }
        info!("shutting down");
        let mut effects = self.unlock();
        effects.push(Effect::Exit);
        self.exiting = true;
        effects
    }

    /// The overlay window went away without a `HideOverlay` (creation
    /// failure or the window was destroyed externally).
    pub fn overlay_closed(&mut self) {
        if self.overlay_live {
            warn!("overlay closed unexpectedly");
            self.overlay_live = false;
        }
    }

    /// Installing `hotkey` failed and `previous` was put back.
    pub fn hotkey_install_failed(&mut self, previous: HotkeyCombo) -> Vec<Effect> {
        warn!("reverting hotkey to {}", previous);
        self.hotkey = previous;
        let config = self.config.update(|c| c.hotkey = previous.to_string());
        vec![Effect::SaveConfig(config)]
    }

    pub fn overlay_spec(&self) -> OverlaySpec {
        let config = self.config.snapshot();
        let click_to_unlock = config.unlock_policy.click_unlocks();
        let mut text = format!("Keyboard locked - press {} to unlock", self.hotkey.label());
        if click_to_unlock {
            text.push_str(" or click anywhere");
        }

        OverlaySpec {
            opacity: config.opacity,
            color: config.parse_overlay_color(),
            text,
            click_to_unlock,
        }
    }

    fn lock(&mut self) -> Vec<Effect> {
        if self.overlay_live {
            warn!("overlay already showing, ignoring lock request");
            return Vec::new();
        }

        self.state.engage();
        self.overlay_live = true;
        info!("keyboard locked");

        let mut effects = Vec::with_capacity(2);
        if self.config.snapshot().notifications_enabled {
            effects.push(Effect::NotifyLocked {
                hotkey_label: self.hotkey.label(),
            });
        }
        effects.push(Effect::ShowOverlay(self.overlay_spec()));
        effects
    }

    fn unlock(&mut self) -> Vec<Effect> {
        if self.state.release() {
            info!("keyboard unlocked");
        }
        if self.overlay_live {
            self.overlay_live = false;
            vec![Effect::HideOverlay]
        } else {
            Vec::new()
        }
    }

    fn apply_setting(&mut self, setting: Setting) -> Vec<Effect> {
        match setting {
            Setting::Opacity(opacity) => {
                let mut rejected = None;
                let config = self.config.update(|c| {
                    if let Err(e) = c.set_opacity(opacity) {
                        rejected = Some(e);
                    }
                });
                match rejected {
                    Some(e) => {
                        warn!("{}", e);
                        Vec::new()
                    }
                    None => vec![Effect::SaveConfig(config)],
                }
            }
            Setting::OverlayColor(color) => {
                let mut rejected = None;
                let config = self.config.update(|c| {
                    if let Err(e) = c.set_overlay_color(&color) {
                        rejected = Some(e);
                    }
                });
                match rejected {
                    Some(e) => {
                        warn!("{}", e);
                        Vec::new()
                    }
                    None => vec![Effect::SaveConfig(config)],
                }
            }
            Setting::Notifications(enabled) => {
                let config = self.config.update(|c| c.notifications_enabled = enabled);
                vec![Effect::SaveConfig(config)]
            }
            Setting::ClickToUnlock(enabled) => {
                let policy = if enabled {
                    UnlockPolicy::HotkeyOrClick
                } else {
                    UnlockPolicy::HotkeyOnly
                };
                let config = self.config.update(|c| c.unlock_policy = policy);
                vec![Effect::SaveConfig(config)]
            }
            Setting::Hotkey(text) => match HotkeyCombo::parse(&text) {
                Err(e) => {
                    warn!("rejected hotkey '{}': {}, keeping {}", text, e, self.hotkey);
                    Vec::new()
                }
                Ok(combo) => {
                    let previous = self.hotkey;
                    self.hotkey = combo;
                    let config = self.config.update(|c| c.hotkey = combo.to_string());
                    if combo == previous {
                        return vec![Effect::SaveConfig(config)];
                    }
                    info!("hotkey changed from {} to {}", previous, combo);
                    vec![
                        Effect::ReinstallInterceptor {
                            hotkey: combo,
                            previous,
                        },
                        Effect::SaveConfig(config),
                    ]
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(config: Config) -> (Coordinator, Arc<LockState>, SharedConfig) {
        let state = Arc::new(LockState::new());
        let shared = SharedConfig::new(config);
        (
            Coordinator::new(Arc::clone(&state), shared.clone()),
            state,
            shared,
        )
    }

    fn quiet() -> Config {
        Config {
            notifications_enabled: false,
            ..Config::default()
        }
    }

    fn shows_overlay(effects: &[Effect]) -> bool {
        effects.iter().any(|e| matches!(e, Effect::ShowOverlay(_)))
    }

    #[test]
    fn toggle_locks_then_unlocks() {
        let (mut coord, state, _) = setup(quiet());

        let effects = coord.handle(Signal::Toggle);
        assert_eq!(effects.len(), 1);
        assert!(shows_overlay(&effects));
        assert!(state.is_locked());
        assert!(coord.overlay_live());

        assert_eq!(coord.handle(Signal::Toggle), vec![Effect::HideOverlay]);
        assert!(!state.is_locked());
        assert!(!coord.overlay_live());
    }

    #[test]
    fn notification_precedes_overlay() {
        let (mut coord, _, _) = setup(Config::default());
        let effects = coord.handle(Signal::Toggle);
        assert_eq!(
            effects[0],
            Effect::NotifyLocked {
                hotkey_label: "Ctrl+B".into()
            }
        );
        assert!(matches!(effects[1], Effect::ShowOverlay(_)));
    }

    #[test]
    fn second_lock_request_never_shows_a_second_overlay() {
        let (mut coord, state, _) = setup(quiet());
        assert!(shows_overlay(&coord.handle(Signal::RequestLock)));
        assert!(coord.handle(Signal::RequestLock).is_empty());
        assert!(state.is_locked());
    }

    #[test]
    fn pointer_unlock_follows_policy() {
        let (mut coord, state, shared) = setup(quiet());
        coord.handle(Signal::Toggle);
        assert!(coord
            .handle(Signal::UnlockRequested(UnlockSource::Pointer))
            .is_empty());
        assert!(state.is_locked());

        coord.handle(Signal::SettingChanged(Setting::ClickToUnlock(true)));
        assert_eq!(shared.snapshot().unlock_policy, UnlockPolicy::HotkeyOrClick);
        assert_eq!(
            coord.handle(Signal::UnlockRequested(UnlockSource::Pointer)),
            vec![Effect::HideOverlay]
        );
        assert!(!state.is_locked());
    }

    #[test]
    fn overlay_text_names_the_hotkey_and_click_policy() {
        let (coord, _, _) = setup(Config {
            hotkey: "ctrl+shift+l".into(),
            unlock_policy: UnlockPolicy::HotkeyOrClick,
            ..quiet()
        });
        let spec = coord.overlay_spec();
        assert_eq!(
            spec.text,
            "Keyboard locked - press Ctrl+Shift+L to unlock or click anywhere"
        );
        assert!(spec.click_to_unlock);
        assert_eq!(spec.opacity, 0.3);
    }

    #[test]
    fn quit_while_locked_unlocks_first() {
        let (mut coord, state, _) = setup(quiet());
        coord.handle(Signal::Toggle);
        assert_eq!(
            coord.handle(Signal::Quit),
            vec![Effect::HideOverlay, Effect::Exit]
        );
        assert!(!state.is_locked());
        assert!(coord.is_exiting());
        assert!(coord.handle(Signal::Toggle).is_empty());
        assert!(!state.is_locked());
    }

    #[test]
    fn quit_while_unlocked_just_exits() {
        let (mut coord, _, _) = setup(quiet());
        assert_eq!(coord.handle(Signal::Quit), vec![Effect::Exit]);
        assert!(coord.shutdown().is_empty());
    }

    #[test]
    fn hotkey_change_reinstalls_and_saves() {
        let (mut coord, _, shared) = setup(quiet());
        let previous = coord.hotkey();
        let effects = coord.handle(Signal::SettingChanged(Setting::Hotkey(
            "Control + Alt + K".into(),
        )));
        let combo = HotkeyCombo::parse("ctrl+alt+k").unwrap();
        assert_eq!(
            effects[0],
            Effect::ReinstallInterceptor {
                hotkey: combo,
                previous
            }
        );
        assert!(matches!(&effects[1], Effect::SaveConfig(c) if c.hotkey == "ctrl+alt+k"));
        assert_eq!(coord.hotkey(), combo);
        assert_eq!(shared.snapshot().hotkey, "ctrl+alt+k");
    }

    #[test]
    fn invalid_hotkey_keeps_the_previous_one() {
        let (mut coord, _, shared) = setup(quiet());
        let before = coord.hotkey();
        for bad in ["k", "ctrl+banana", "ctrl+shift", ""] {
            assert!(coord
                .handle(Signal::SettingChanged(Setting::Hotkey(bad.into())))
                .is_empty());
        }
        assert_eq!(coord.hotkey(), before);
        assert_eq!(shared.snapshot().hotkey, "ctrl+b");
    }

    #[test]
    fn failed_install_rolls_back() {
        let (mut coord, _, shared) = setup(quiet());
        let previous = coord.hotkey();
        coord.handle(Signal::SettingChanged(Setting::Hotkey("alt+f9".into())));
        let effects = coord.hotkey_install_failed(previous);
        assert_eq!(coord.hotkey(), previous);
        assert_eq!(shared.snapshot().hotkey, "ctrl+b");
        assert!(matches!(&effects[0], Effect::SaveConfig(c) if c.hotkey == "ctrl+b"));
    }

    #[test]
    fn overlay_color_change_reaches_the_next_overlay() {
        let (mut coord, _, shared) = setup(quiet());
        assert!(coord
            .handle(Signal::SettingChanged(Setting::OverlayColor("blue".into())))
            .is_empty());
        assert_eq!(shared.snapshot().overlay_color, "#1B5E20");

        let effects = coord.handle(Signal::SettingChanged(Setting::OverlayColor(
            "#1565C0".into(),
        )));
        assert!(matches!(&effects[0], Effect::SaveConfig(c) if c.overlay_color == "#1565C0"));
        assert_eq!(coord.overlay_spec().color, (0x15, 0x65, 0xC0));
    }

    #[test]
    fn out_of_range_opacity_is_rejected() {
        let (mut coord, _, shared) = setup(quiet());
        assert!(coord
            .handle(Signal::SettingChanged(Setting::Opacity(1.0)))
            .is_empty());
        assert_eq!(shared.snapshot().opacity, 0.3);
        let effects = coord.handle(Signal::SettingChanged(Setting::Opacity(0.7)));
        assert!(matches!(&effects[0], Effect::SaveConfig(c) if c.opacity_is(0.7)));
        assert!(coord.overlay_spec().opacity > 0.69);
    }

    #[test]
    fn invalid_configured_hotkey_falls_back_to_default() {
        let (coord, _, _) = setup(Config {
            hotkey: "banana".into(),
            ..quiet()
        });
        assert_eq!(coord.hotkey(), HotkeyCombo::default());
        assert_eq!(coord.hotkey().to_string(), crate::config::DEFAULT_HOTKEY);
    }

    #[test]
    fn lost_overlay_can_be_reopened() {
        let (mut coord, state, _) = setup(quiet());
        coord.handle(Signal::Toggle);
        coord.overlay_closed();
        assert!(!coord.overlay_live());
        // Still locked: the next toggle unlocks rather than stacking
        assert!(coord.handle(Signal::Toggle).is_empty());
        assert!(!state.is_locked());
        assert!(shows_overlay(&coord.handle(Signal::Toggle)));
    }
}
