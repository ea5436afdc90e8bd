//! UI-thread runtime
//!
//! Owns the coordinator and every platform resource. Signals from the hook,
//! tray and overlay arrive through the signal channel; each send posts
//! [`WM_APP_SIGNAL`] to this thread so the message pump wakes up. While the
//! keyboard is locked the thread sits in the overlay's loop, which ends when
//! the lock does.

use super::hook::InterceptorThread;
use super::notify;
use super::overlay::OverlayWindow;
use super::tray::TrayThread;
use crate::config::{Config, SharedConfig};
use crate::coordinator::{Coordinator, Effect, OverlaySpec};
use crate::error::StartupError;
use crate::hotkey::HotkeyCombo;
use crate::instance::SingleInstanceGuard;
use crate::janitor::{HeldKeyJanitor, HELD_KEY_RESET_INTERVAL};
use crate::lock_state::LockState;
use crate::signal::{self, SignalReceiver, SignalSender};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, TranslateMessage, MSG,
    PM_NOREMOVE, WM_APP,
};

/// Thread message meaning "signals are waiting"
pub const WM_APP_SIGNAL: u32 = WM_APP + 1;

/// Start Keylatch and block until it quits.
pub fn run(reset_config: bool) -> Result<(), StartupError> {
    // Before touching the config: a second instance must not rewrite it
    let instance = SingleInstanceGuard::acquire(Config::lock_file_path())?;
    debug!(
        "instance lock held at {} for pid {}",
        instance.path().display(),
        instance.pid()
    );

    let config_path = Config::config_path();
    let config = if reset_config {
        Config::reset(&config_path)?
    } else {
        Config::load_or_default(&config_path)
    };
    info!(
        "Loaded config: hotkey={}, opacity={}, policy={:?}",
        config.hotkey, config.opacity, config.unlock_policy
    );

    let runtime = Runtime::start(config, config_path)?;
    runtime.run();

    info!("Keylatch exiting...");
    Ok(())
}

/// What the caller's loop should do after effects ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Flow {
    Continue,
    CloseOverlay,
    Exit,
}

enum Pumped {
    Signal,
    Dispatched,
    Quit,
}

struct Runtime {
    coordinator: Coordinator,
    state: Arc<LockState>,
    signals: SignalReceiver,
    sender: SignalSender,
    config_path: PathBuf,
    /// Overlay requested by the last batch, opened by the outer loop
    pending_overlay: Option<OverlaySpec>,
    interceptor: Option<InterceptorThread>,
    tray: Option<TrayThread>,
    janitor: Option<HeldKeyJanitor>,
}

impl Runtime {
    fn start(config: Config, config_path: PathBuf) -> Result<Self, StartupError> {
        let ui_thread = unsafe { GetCurrentThreadId() };
        // Create this thread's queue before any producer posts to it
        unsafe {
            let mut msg = MSG::default();
            let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
        }

        let (sender, signals) = signal::channel(move || unsafe {
            let _ = PostThreadMessageW(ui_thread, WM_APP_SIGNAL, WPARAM(0), LPARAM(0));
        });

        let state = Arc::new(LockState::new());
        let shared = SharedConfig::new(config);
        let coordinator = Coordinator::new(Arc::clone(&state), shared.clone());

        let interceptor =
            InterceptorThread::spawn(coordinator.hotkey(), Arc::clone(&state), sender.clone())?;
        let janitor = HeldKeyJanitor::spawn(Arc::clone(&state), HELD_KEY_RESET_INTERVAL)
            .map_err(|source| StartupError::Thread {
                name: "held-key janitor",
                source,
            })?;
        let tray = TrayThread::spawn(shared, sender.clone())?;

        info!("Keylatch running, {} toggles the lock", coordinator.hotkey().label());
        Ok(Self {
            coordinator,
            state,
            signals,
            sender,
            config_path,
            pending_overlay: None,
            interceptor: Some(interceptor),
            tray: Some(tray),
            janitor: Some(janitor),
        })
    }

    fn run(mut self) {
        loop {
            if let Some(spec) = self.pending_overlay.take() {
                if self.run_overlay(spec) == Flow::Exit {
                    break;
                }
                continue;
            }

            match pump_one() {
                Pumped::Signal => {
                    if self.dispatch_signals() == Flow::Exit {
                        break;
                    }
                }
                Pumped::Dispatched => {}
                Pumped::Quit => {
                    let effects = self.coordinator.shutdown();
                    self.execute(effects);
                    break;
                }
            }
        }
    }

    /// The overlay's scoped loop: open, pump until the lock ends, close.
    /// The window is dropped on every path out.
    fn run_overlay(&mut self, spec: OverlaySpec) -> Flow {
        let window = match OverlayWindow::open(&spec, self.sender.clone()) {
            Ok(window) => window,
            Err(e) => {
                // Still locked; the hotkey keeps working without the overlay
                error!("failed to create overlay: {}", e);
                self.coordinator.overlay_closed();
                return Flow::Continue;
            }
        };
        debug!("overlay open");

        let flow = loop {
            match pump_one() {
                Pumped::Signal => match self.dispatch_signals() {
                    Flow::Continue => {}
                    Flow::CloseOverlay => break Flow::Continue,
                    Flow::Exit => break Flow::Exit,
                },
                Pumped::Dispatched => {
                    if !window.is_open() {
                        if self.coordinator.overlay_live() {
                            warn!("overlay window went away while locked");
                        }
                        self.coordinator.overlay_closed();
                        break Flow::Continue;
                    }
                }
                Pumped::Quit => {
                    let effects = self.coordinator.shutdown();
                    self.execute(effects);
                    break Flow::Exit;
                }
            }
        };

        drop(window);
        debug!("overlay closed");
        flow
    }

    fn dispatch_signals(&mut self) -> Flow {
        let mut flow = Flow::Continue;
        for signal in self.signals.drain() {
            debug!("signal {:?}", signal);
            let effects = self.coordinator.handle(signal);
            flow = flow.max(self.execute(effects));
        }
        flow
    }

    fn execute(&mut self, effects: Vec<Effect>) -> Flow {
        let mut flow = Flow::Continue;
        for effect in effects {
            match effect {
                Effect::NotifyLocked { hotkey_label } => notify::notify_locked(&hotkey_label),
                Effect::ShowOverlay(spec) => {
                    if self.pending_overlay.replace(spec).is_some() {
                        warn!("replacing an overlay request that never opened");
                    }
                }
                Effect::HideOverlay => {
                    // Lock ended before its overlay opened
                    if self.pending_overlay.take().is_none() {
                        flow = flow.max(Flow::CloseOverlay);
                    }
                }
                Effect::ReinstallInterceptor { hotkey, previous } => {
                    flow = flow.max(self.reinstall(hotkey, previous));
                }
                Effect::SaveConfig(config) => {
                    if let Err(e) = config.save_to(&self.config_path) {
                        error!("failed to save config: {}", e);
                    }
                }
                Effect::Exit => flow = Flow::Exit,
            }
        }
        flow
    }

    /// Swap the hook for one matching `hotkey`, falling back to `previous`.
    fn reinstall(&mut self, hotkey: HotkeyCombo, previous: HotkeyCombo) -> Flow {
        // Only one hook at a time; the old one must be gone first
        if let Some(old) = self.interceptor.take() {
            debug!("removing hook for {}", old.hotkey());
        }

        match InterceptorThread::spawn(hotkey, Arc::clone(&self.state), self.sender.clone()) {
            Ok(interceptor) => {
                self.interceptor = Some(interceptor);
                Flow::Continue
            }
            Err(e) => {
                warn!("installing hook for {} failed: {}", hotkey, e);
                match InterceptorThread::spawn(previous, Arc::clone(&self.state), self.sender.clone())
                {
                    Ok(interceptor) => {
                        self.interceptor = Some(interceptor);
                        let effects = self.coordinator.hotkey_install_failed(previous);
                        self.execute(effects)
                    }
                    Err(e) => {
                        error!("restoring hook for {} failed: {}", previous, e);
                        super::show_error(&format!(
                            "Keylatch lost its keyboard hook and will exit.\n\n{}",
                            e
                        ));
                        let effects = self.coordinator.shutdown();
                        self.execute(effects);
                        Flow::Exit
                    }
                }
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.coordinator.is_exiting() {
            warn!("runtime stopped without a shutdown");
        }
        // Never leave the keyboard suppressed, whatever got us here
        if self.state.release() {
            warn!("runtime stopped while locked, keyboard released");
        }
        self.interceptor.take();
        self.tray.take();
        self.janitor.take();
    }
}

fn pump_one() -> Pumped {
    let mut msg = MSG::default();
    let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
    if r.0 == 0 {
        return Pumped::Quit;
    }
    if r.0 < 0 {
        error!("GetMessageW failed: {}", windows::core::Error::from_win32());
        return Pumped::Quit;
    }

    if msg.hwnd.0.is_null() && msg.message == WM_APP_SIGNAL {
        return Pumped::Signal;
    }

    unsafe {
        let _ = TranslateMessage(&msg);
        DispatchMessageW(&msg);
    }
    Pumped::Dispatched
}
