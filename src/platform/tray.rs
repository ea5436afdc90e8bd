//! System tray icon and menu for Keylatch
//!
//! The tray runs on its own thread: the notification-area icon needs a
//! message loop on the thread that created it, and the UI thread is busy
//! whenever the overlay is up. Menu clicks become [`Signal`]s; check marks
//! are re-derived from [`SharedConfig`] whenever the config changes.

use super::hotkey_dialog;
use crate::config::{Config, SharedConfig, COLOR_PRESETS, OPACITY_PRESETS};
use crate::error::StartupError;
use crate::signal::{Setting, Signal, SignalSender};
use image::{Rgba, RgbaImage};
use log::{debug, info, warn};
use muda::{CheckMenuItem, Menu, MenuEvent, MenuItem, PredefinedMenuItem, Submenu};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE, WM_QUIT,
};

/// Menu item IDs
const MENU_LOCK: &str = "lock";
const MENU_NOTIFICATIONS: &str = "notifications";
const MENU_OPACITY_PREFIX: &str = "opacity:";
const MENU_COLOR_PREFIX: &str = "color:";
const MENU_CLICK_UNLOCK: &str = "click_unlock";
const MENU_HOTKEY: &str = "hotkey";
const MENU_QUIT: &str = "quit";

const ICON_SIZE: u32 = 64;
const POLL_INTERVAL: Duration = Duration::from_millis(16);
const READY_TIMEOUT: Duration = Duration::from_secs(5);

// High-contrast blue/orange, distinguishable for common color-vision types
const ICON_BACKGROUND: Rgba<u8> = Rgba([0x15, 0x65, 0xC0, 0xFF]);
const ICON_FOREGROUND: Rgba<u8> = Rgba([0xFF, 0x6D, 0x00, 0xFF]);
const ICON_CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Handle to the tray thread. Dropping it removes the icon.
#[derive(Debug)]
pub struct TrayThread {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl TrayThread {
    pub fn spawn(config: SharedConfig, signals: SignalSender) -> Result<Self, StartupError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);

        let thread_stop = Arc::clone(&stop);
        let join = std::thread::Builder::new()
            .name("tray".into())
            .spawn(move || match TrayMenu::build(&config.snapshot()) {
                Ok(mut tray) => {
                    let _ = ready_tx.send(Ok(()));
                    tray.run(&config, &signals, &thread_stop);
                }
                Err(reason) => {
                    let _ = ready_tx.send(Err(reason));
                }
            })
            .map_err(|source| StartupError::Thread {
                name: "tray",
                source,
            })?;

        let ui_error = |reason| StartupError::Ui {
            what: "tray icon",
            reason,
        };
        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(())) => {
                info!("Tray icon created");
                Ok(Self {
                    stop,
                    join: Some(join),
                })
            }
            Ok(Err(reason)) => {
                let _ = join.join();
                Err(ui_error(reason))
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                Err(ui_error("tray thread did not start".into()))
            }
        }
    }
}

impl Drop for TrayThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

struct TrayMenu {
    icon: TrayIcon,
    notifications: CheckMenuItem,
    opacity: Vec<(f32, CheckMenuItem)>,
    colors: Vec<(&'static str, CheckMenuItem)>,
    click_unlock: CheckMenuItem,
    /// Config the checkmarks currently reflect; `None` forces a refresh
    rendered: Option<Config>,
}

impl TrayMenu {
    fn build(config: &Config) -> Result<Self, String> {
        let menu = Menu::new();

        let lock_item = MenuItem::with_id(MENU_LOCK, "Lock Keyboard", true, None);
        let notifications = CheckMenuItem::with_id(
            MENU_NOTIFICATIONS,
            "Notifications",
            true,
            config.notifications_enabled,
            None,
        );

        let opacity_menu = Submenu::new("Overlay Opacity", true);
        let mut opacity = Vec::with_capacity(OPACITY_PRESETS.len());
        for (index, preset) in OPACITY_PRESETS.iter().enumerate() {
            let item = CheckMenuItem::with_id(
                format!("{}{}", MENU_OPACITY_PREFIX, index),
                format!("{}%", (preset * 100.0).round() as u32),
                true,
                config.opacity_is(*preset),
                None,
            );
            opacity_menu.append(&item).map_err(|e| e.to_string())?;
            opacity.push((*preset, item));
        }

        let color_menu = Submenu::new("Overlay Color", true);
        let mut colors = Vec::with_capacity(COLOR_PRESETS.len());
        for (index, (name, hex)) in COLOR_PRESETS.iter().enumerate() {
            let item = CheckMenuItem::with_id(
                format!("{}{}", MENU_COLOR_PREFIX, index),
                *name,
                true,
                config.overlay_color_is(hex),
                None,
            );
            color_menu.append(&item).map_err(|e| e.to_string())?;
            colors.push((*hex, item));
        }

        let click_unlock = CheckMenuItem::with_id(
            MENU_CLICK_UNLOCK,
            "Click Overlay to Unlock",
            true,
            config.unlock_policy.click_unlocks(),
            None,
        );
        let hotkey_item = MenuItem::with_id(MENU_HOTKEY, "Change Hotkey...", true, None);
        let quit_item = MenuItem::with_id(MENU_QUIT, "Quit", true, None);

        menu.append_items(&[
            &lock_item,
            &PredefinedMenuItem::separator(),
            &notifications,
            &opacity_menu,
            &color_menu,
            &click_unlock,
            &hotkey_item,
            &PredefinedMenuItem::separator(),
            &quit_item,
        ])
        .map_err(|e| e.to_string())?;

        let icon = create_tray_icon().map_err(|e| e.to_string())?;
        let icon = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(tooltip(config))
            .with_icon(icon)
            .build()
            .map_err(|e| e.to_string())?;

        Ok(Self {
            icon,
            notifications,
            opacity,
            colors,
            click_unlock,
            rendered: Some(config.clone()),
        })
    }

    fn run(&mut self, config: &SharedConfig, signals: &SignalSender, stop: &AtomicBool) {
        let menu_receiver = MenuEvent::receiver();

        while !stop.load(Ordering::SeqCst) {
            // The notification-area icon is a window on this thread
            unsafe {
                let mut msg = MSG::default();
                while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                    if msg.message == WM_QUIT {
                        return;
                    }
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }

            while let Ok(event) = menu_receiver.try_recv() {
                self.on_menu_event(event.id.0.as_str(), config, signals);
                // muda toggled the clicked check itself; resync from config
                self.rendered = None;
            }

            self.refresh(&config.snapshot());
            std::thread::sleep(POLL_INTERVAL);
        }
        debug!("tray loop finished");
    }

    fn on_menu_event(&self, id: &str, config: &SharedConfig, signals: &SignalSender) {
        let signal = match id {
            MENU_LOCK => Some(Signal::RequestLock),
            MENU_NOTIFICATIONS => Some(Signal::SettingChanged(Setting::Notifications(
                self.notifications.is_checked(),
            ))),
            MENU_CLICK_UNLOCK => Some(Signal::SettingChanged(Setting::ClickToUnlock(
                self.click_unlock.is_checked(),
            ))),
            MENU_HOTKEY => {
                let current = config.snapshot().parse_hotkey().unwrap_or_default();
                hotkey_dialog::prompt_hotkey(&current)
                    .map(|combo| Signal::SettingChanged(Setting::Hotkey(combo.to_string())))
            }
            MENU_QUIT => {
                info!("Quit requested from tray");
                Some(Signal::Quit)
            }
            other => preset_index(other, MENU_OPACITY_PREFIX)
                .and_then(|index| OPACITY_PRESETS.get(index))
                .map(|preset| Signal::SettingChanged(Setting::Opacity(*preset)))
                .or_else(|| {
                    preset_index(other, MENU_COLOR_PREFIX)
                        .and_then(|index| COLOR_PRESETS.get(index))
                        .map(|(_, hex)| {
                            Signal::SettingChanged(Setting::OverlayColor(hex.to_string()))
                        })
                }),
        };

        if let Some(signal) = signal {
            if !signals.send(signal) {
                warn!("coordinator is gone, dropping tray command '{}'", id);
            }
        }
    }

    fn refresh(&mut self, config: &Config) {
        if self.rendered.as_ref() == Some(config) {
            return;
        }

        self.notifications.set_checked(config.notifications_enabled);
        for (preset, item) in &self.opacity {
            item.set_checked(config.opacity_is(*preset));
        }
        for (hex, item) in &self.colors {
            item.set_checked(config.overlay_color_is(hex));
        }
        self.click_unlock
            .set_checked(config.unlock_policy.click_unlocks());
        if let Err(e) = self.icon.set_tooltip(Some(tooltip(config))) {
            warn!("failed to update tray tooltip: {}", e);
        }

        self.rendered = Some(config.clone());
    }
}

/// Index out of a preset item id such as `opacity:2`.
fn preset_index(id: &str, prefix: &str) -> Option<usize> {
    id.strip_prefix(prefix)?.parse().ok()
}

fn tooltip(config: &Config) -> String {
    match config.parse_hotkey() {
        Ok(combo) => format!("Keylatch - {} locks and unlocks", combo.label()),
        Err(_) => "Keylatch".to_string(),
    }
}

fn create_tray_icon() -> Result<Icon, tray_icon::BadIcon> {
    let image = render_padlock(ICON_SIZE);
    let (width, height) = image.dimensions();
    Icon::from_rgba(image.into_raw(), width, height)
}

/// Orange padlock on a blue disc.
fn render_padlock(size: u32) -> RgbaImage {
    let s = size as f32;
    let center = s / 2.0;
    let radius = center - 2.0;

    let body_left = s * 0.28;
    let body_right = s * 0.72;
    let body_top = s * 0.46;
    let body_bottom = s * 0.78;
    let shackle_outer = s * 0.19;
    let shackle_inner = s * 0.12;
    let keyhole = s * 0.05;

    RgbaImage::from_fn(size, size, |x, y| {
        let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
        let dist = ((px - center).powi(2) + (py - center).powi(2)).sqrt();
        if dist >= radius {
            return ICON_CLEAR;
        }

        let in_body = (body_left..body_right).contains(&px) && (body_top..body_bottom).contains(&py);
        let keyhole_dist = ((px - center).powi(2) + (py - s * 0.6).powi(2)).sqrt();
        if in_body {
            return if keyhole_dist < keyhole {
                ICON_BACKGROUND
            } else {
                ICON_FOREGROUND
            };
        }

        let shackle_dist = ((px - center).powi(2) + (py - body_top).powi(2)).sqrt();
        if py < body_top && (shackle_inner..shackle_outer).contains(&shackle_dist) {
            return ICON_FOREGROUND;
        }

        ICON_BACKGROUND
    })
}
