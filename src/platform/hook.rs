//! Low-level keyboard hook thread
//!
//! WH_KEYBOARD_LL callbacks run on the thread that installed the hook, and
//! only while that thread pumps messages. The hook therefore gets a thread
//! of its own that does nothing but pump. The [`Interceptor`] lives in
//! thread-local storage there because the callback cannot capture state.

use crate::error::StartupError;
use crate::hotkey::HotkeyCombo;
use crate::interceptor::{Interceptor, KeyEvent, Verdict};
use crate::lock_state::LockState;
use crate::signal::SignalSender;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT,
    MSG, PM_NOREMOVE, WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN,
};

const READY_TIMEOUT: Duration = Duration::from_secs(2);

thread_local! {
    static INTERCEPTOR: RefCell<Option<Interceptor>> = const { RefCell::new(None) };
}

/// An installed hook. Dropping it unhooks and joins the thread.
#[derive(Debug)]
pub struct InterceptorThread {
    hotkey: HotkeyCombo,
    thread_id: u32,
    join: Option<JoinHandle<()>>,
}

impl InterceptorThread {
    /// Install the hook for `hotkey`; returns once the hook is live or
    /// installation failed.
    pub fn spawn(
        hotkey: HotkeyCombo,
        state: Arc<LockState>,
        signals: SignalSender,
    ) -> Result<Self, StartupError> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32, String>>(1);

        let join = std::thread::Builder::new()
            .name("keyboard-hook".into())
            .spawn(move || {
                let mut msg = MSG::default();
                // Make sure the thread has a queue before anyone posts to it
                unsafe {
                    let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
                }

                INTERCEPTOR.with(|slot| {
                    *slot.borrow_mut() = Some(Interceptor::new(hotkey, state, signals));
                });

                let hook = match install() {
                    Ok(hook) => hook,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(unsafe { GetCurrentThreadId() }));

                loop {
                    let r = unsafe { GetMessageW(&mut msg, None, 0, 0) };
                    if r.0 <= 0 {
                        break;
                    }
                    unsafe {
                        let _ = TranslateMessage(&msg);
                        DispatchMessageW(&msg);
                    }
                }

                unsafe {
                    let _ = UnhookWindowsHookEx(hook);
                }
                INTERCEPTOR.with(|slot| slot.borrow_mut().take());
                debug!("keyboard hook removed");
            })
            .map_err(|source| StartupError::Thread {
                name: "keyboard hook",
                source,
            })?;

        match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(thread_id)) => {
                info!("keyboard hook installed for {}", hotkey);
                Ok(Self {
                    hotkey,
                    thread_id,
                    join: Some(join),
                })
            }
            Ok(Err(reason)) => {
                let _ = join.join();
                Err(StartupError::HookInstall(reason))
            }
            // The thread is wedged somewhere; leave it detached
            Err(_) => Err(StartupError::HookInstall(
                "hook thread did not report readiness".into(),
            )),
        }
    }

    pub fn hotkey(&self) -> HotkeyCombo {
        self.hotkey
    }
}

impl Drop for InterceptorThread {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) {
                warn!("failed to stop keyboard hook thread: {}", e);
                return;
            }
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn install() -> windows::core::Result<HHOOK> {
    unsafe {
        let module = GetModuleHandleW(None)?;
        SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), module, 0)
    }
}

unsafe extern "system" fn keyboard_hook_proc(
    code: i32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if code == HC_ACTION as i32 {
        let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
        let message = wparam.0 as u32;
        let event = KeyEvent {
            raw_code: info.vkCode,
            pressed: message == WM_KEYDOWN || message == WM_SYSKEYDOWN,
        };

        // A re-entrant call (only possible if something pumped inside the
        // callback) falls through to the next hook
        let verdict = INTERCEPTOR.with(|slot| {
            slot.try_borrow_mut()
                .ok()
                .and_then(|mut guard| guard.as_mut().map(|i| i.on_key_event(event)))
        });

        if verdict == Some(Verdict::Suppress) {
            return LRESULT(1);
        }
    }

    CallNextHookEx(HHOOK(std::ptr::null_mut()), code, wparam, lparam)
}
