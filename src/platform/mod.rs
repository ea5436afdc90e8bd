//! Win32 side of Keylatch
//!
//! Everything here is a thin shell around the platform-free core: the hook
//! thread feeds [`crate::interceptor::Interceptor`], the overlay renders an
//! [`crate::coordinator::OverlaySpec`], and [`app`] executes the
//! coordinator's effects on the UI thread.

pub mod app;
pub mod hook;
pub mod hotkey_dialog;
pub mod notify;
pub mod overlay;
pub mod tray;

pub use app::run;

use windows::core::PCWSTR;
use windows::Win32::UI::WindowsAndMessaging::{
    MessageBoxW, MB_ICONERROR, MB_ICONINFORMATION, MB_OK, MESSAGEBOX_STYLE,
};

/// Null-terminated UTF-16 copy of `s`
pub(crate) fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

pub(crate) fn from_wide(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

/// Copy `s` into a fixed-size UTF-16 field, truncating and terminating.
pub(crate) fn fill_wide<const N: usize>(field: &mut [u16; N], s: &str) {
    let mut len = 0;
    for (slot, unit) in field.iter_mut().take(N.saturating_sub(1)).zip(s.encode_utf16()) {
        *slot = unit;
        len += 1;
    }
    if N > 0 {
        field[len] = 0;
    }
}

pub fn show_error(message: &str) {
    message_box(message, "Keylatch Error", MB_ICONERROR);
}

pub fn show_info(message: &str) {
    message_box(message, "Keylatch", MB_ICONINFORMATION);
}

fn message_box(message: &str, title: &str, icon: MESSAGEBOX_STYLE) {
    let wide_msg = to_wide(message);
    let wide_title = to_wide(title);

    unsafe {
        MessageBoxW(
            None,
            PCWSTR(wide_msg.as_ptr()),
            PCWSTR(wide_title.as_ptr()),
            MB_OK | icon,
        );
    }
}
