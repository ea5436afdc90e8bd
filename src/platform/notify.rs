//! Best-effort "keyboard locked" balloon
//!
//! A short-lived hidden window owns a notification-area entry just long
//! enough to show one balloon. Everything happens on a throwaway thread so
//! the UI thread never waits on the shell.

use super::fill_wide;
use log::{debug, warn};
use std::sync::Once;
use std::time::Duration;
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Shell::{
    Shell_NotifyIconW, NIF_ICON, NIF_INFO, NIF_TIP, NIIF_INFO, NIM_ADD, NIM_DELETE,
    NOTIFYICONDATAW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, LoadIconW, RegisterClassW, IDI_INFORMATION,
    WINDOW_EX_STYLE, WINDOW_STYLE, WNDCLASSW,
};

const NOTIFY_CLASS_NAME: PCWSTR = w!("KeylatchNotify");
const BALLOON_LIFETIME: Duration = Duration::from_secs(5);
const BALLOON_ID: u32 = 1;

/// Fire and forget. Failures are logged and otherwise ignored.
pub fn notify_locked(hotkey_label: &str) {
    let body = format!("Press {} to unlock", hotkey_label);
    let spawned = std::thread::Builder::new()
        .name("lock-notification".into())
        .spawn(move || {
            if let Err(e) = show_balloon("Keyboard locked", &body) {
                warn!("lock notification failed: {}", e);
            }
        });
    if let Err(e) = spawned {
        warn!("failed to start notification thread: {}", e);
    }
}

fn show_balloon(title: &str, body: &str) -> windows::core::Result<()> {
    let hwnd = create_message_window()?;

    let mut data = NOTIFYICONDATAW {
        cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
        hWnd: hwnd,
        uID: BALLOON_ID,
        uFlags: NIF_ICON | NIF_TIP | NIF_INFO,
        hIcon: unsafe { LoadIconW(None, IDI_INFORMATION) }.unwrap_or_default(),
        dwInfoFlags: NIIF_INFO,
        ..Default::default()
    };
    fill_wide(&mut data.szTip, "Keylatch");
    fill_wide(&mut data.szInfoTitle, title);
    fill_wide(&mut data.szInfo, body);

    let shown = unsafe { Shell_NotifyIconW(NIM_ADD, &data) }.as_bool();
    if shown {
        debug!("lock notification shown");
        std::thread::sleep(BALLOON_LIFETIME);
        unsafe {
            let _ = Shell_NotifyIconW(NIM_DELETE, &data);
        }
    }

    unsafe {
        let _ = DestroyWindow(hwnd);
    }

    if shown {
        Ok(())
    } else {
        Err(windows::core::Error::from_win32())
    }
}

fn create_message_window() -> windows::core::Result<HWND> {
    static REGISTER_CLASS: Once = Once::new();

    unsafe {
        let hinstance = GetModuleHandleW(None)?;

        REGISTER_CLASS.call_once(|| {
            let wc = WNDCLASSW {
                hInstance: hinstance.into(),
                lpszClassName: NOTIFY_CLASS_NAME,
                lpfnWndProc: Some(notify_wnd_proc),
                ..Default::default()
            };
            RegisterClassW(&wc);
        });

        CreateWindowExW(
            WINDOW_EX_STYLE(0),
            NOTIFY_CLASS_NAME,
            PCWSTR::null(),
            WINDOW_STYLE(0),
            0,
            0,
            0,
            0,
            None,
            None,
            hinstance,
            None,
        )
    }
}

unsafe extern "system" fn notify_wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    DefWindowProcW(hwnd, msg, wparam, lparam)
}
