//! "Change Hotkey" dialog
//!
//! A small native window with one edit box. OK validates the text with
//! [`HotkeyCombo::parse`]; invalid input keeps the dialog open and shows why.

use super::{from_wide, to_wide};
use crate::hotkey::HotkeyCombo;
use log::debug;
use std::cell::RefCell;
use std::sync::Once;
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    CreateFontW, DeleteObject, CLEARTYPE_QUALITY, CLIP_DEFAULT_PRECIS, DEFAULT_CHARSET,
    DEFAULT_PITCH, FW_NORMAL, HBRUSH, HFONT, OUT_DEFAULT_PRECIS,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::SetFocus;
use windows::Win32::UI::WindowsAndMessaging::*;

// Control IDs
const ID_OK: i32 = 1;
const ID_CANCEL: i32 = 2;
const ID_HOTKEY_EDIT: i32 = 100;
const ID_ERROR_LABEL: i32 = 101;

const DIALOG_WIDTH: i32 = 400;
const DIALOG_HEIGHT: i32 = 200;

const DIALOG_CLASS_NAME: PCWSTR = w!("KeylatchHotkeyDialog");

thread_local! {
    static DIALOG_RESULT: RefCell<Option<HotkeyCombo>> = const { RefCell::new(None) };
}

/// Show the dialog modally on the calling thread. `None` on cancel.
pub fn prompt_hotkey(current: &HotkeyCombo) -> Option<HotkeyCombo> {
    DIALOG_RESULT.with(|r| *r.borrow_mut() = None);

    unsafe {
        let hwnd = create_dialog_window().ok()?;
        let font = default_font();
        create_dialog_controls(hwnd, font, &current.to_string());

        let mut msg = MSG::default();
        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            if !IsDialogMessageW(hwnd, &msg).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }

            if !IsWindow(hwnd).as_bool() {
                break;
            }
        }

        let _ = DeleteObject(font);
    }

    DIALOG_RESULT.with(|r| r.borrow_mut().take())
}

unsafe fn create_dialog_window() -> windows::core::Result<HWND> {
    static REGISTER_CLASS: Once = Once::new();
    let hinstance = GetModuleHandleW(None)?;

    REGISTER_CLASS.call_once(|| {
        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(dialog_wnd_proc),
            hInstance: hinstance.into(),
            hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
            hbrBackground: HBRUSH((COLOR_3DFACE.0 + 1) as usize as *mut std::ffi::c_void),
            lpszClassName: DIALOG_CLASS_NAME,
            ..Default::default()
        };
        RegisterClassExW(&wc);
    });

    // Center on the primary screen
    let x = (GetSystemMetrics(SM_CXSCREEN) - DIALOG_WIDTH) / 2;
    let y = (GetSystemMetrics(SM_CYSCREEN) - DIALOG_HEIGHT) / 2;

    let hwnd = CreateWindowExW(
        WS_EX_DLGMODALFRAME | WS_EX_TOPMOST,
        DIALOG_CLASS_NAME,
        w!("Keylatch - Change Hotkey"),
        WS_OVERLAPPED | WS_CAPTION | WS_SYSMENU | WS_VISIBLE,
        x,
        y,
        DIALOG_WIDTH,
        DIALOG_HEIGHT,
        None,
        None,
        hinstance,
        None,
    )?;
    let _ = SetForegroundWindow(hwnd);
    Ok(hwnd)
}

#[allow(clippy::too_many_arguments)]
unsafe fn create_control(
    parent: HWND,
    font: HFONT,
    class: PCWSTR,
    text: PCWSTR,
    style: WINDOW_STYLE,
    ex_style: WINDOW_EX_STYLE,
    (x, y, width, height): (i32, i32, i32, i32),
    id: i32,
) -> Option<HWND> {
    let hinstance = GetModuleHandleW(None).ok()?;
    let hwnd = CreateWindowExW(
        ex_style,
        class,
        text,
        WS_CHILD | WS_VISIBLE | style,
        x,
        y,
        width,
        height,
        parent,
        HMENU(id as isize as *mut std::ffi::c_void),
        hinstance,
        None,
    )
    .ok()?;
    SendMessageW(hwnd, WM_SETFONT, WPARAM(font.0 as usize), LPARAM(1));
    Some(hwnd)
}

unsafe fn create_dialog_controls(hwnd: HWND, font: HFONT, current: &str) {
    let none = WINDOW_EX_STYLE(0);

    create_control(
        hwnd,
        font,
        w!("STATIC"),
        w!("Hotkey (e.g. ctrl+shift+l):"),
        WINDOW_STYLE(0),
        none,
        (20, 20, 360, 20),
        -1,
    );

    let current = to_wide(current);
    if let Some(edit) = create_control(
        hwnd,
        font,
        w!("EDIT"),
        PCWSTR(current.as_ptr()),
        WS_TABSTOP | WINDOW_STYLE(ES_AUTOHSCROLL as u32),
        WS_EX_CLIENTEDGE,
        (20, 44, 360, 24),
        ID_HOTKEY_EDIT,
    ) {
        let _ = SetFocus(edit);
    }

    create_control(
        hwnd,
        font,
        w!("STATIC"),
        PCWSTR::null(),
        WINDOW_STYLE(0),
        none,
        (20, 76, 360, 20),
        ID_ERROR_LABEL,
    );

    create_control(
        hwnd,
        font,
        w!("BUTTON"),
        w!("OK"),
        WS_TABSTOP | WINDOW_STYLE(BS_DEFPUSHBUTTON as u32),
        none,
        (200, 110, 80, 28),
        ID_OK,
    );

    create_control(
        hwnd,
        font,
        w!("BUTTON"),
        w!("Cancel"),
        WS_TABSTOP,
        none,
        (290, 110, 80, 28),
        ID_CANCEL,
    );
}

unsafe fn default_font() -> HFONT {
    CreateFontW(
        -14,
        0,
        0,
        0,
        FW_NORMAL.0 as i32,
        0,
        0,
        0,
        DEFAULT_CHARSET.0 as u32,
        OUT_DEFAULT_PRECIS.0 as u32,
        CLIP_DEFAULT_PRECIS.0 as u32,
        CLEARTYPE_QUALITY.0 as u32,
        DEFAULT_PITCH.0 as u32,
        w!("Segoe UI"),
    )
}

unsafe fn read_edit(hwnd: HWND) -> String {
    let Ok(edit) = GetDlgItem(hwnd, ID_HOTKEY_EDIT) else {
        return String::new();
    };
    let mut buffer = [0u16; 256];
    let len = GetWindowTextW(edit, &mut buffer) as usize;
    from_wide(&buffer[..len.min(buffer.len())])
}

unsafe fn show_error(hwnd: HWND, message: &str) {
    if let Ok(label) = GetDlgItem(hwnd, ID_ERROR_LABEL) {
        let text = to_wide(message);
        let _ = SetWindowTextW(label, PCWSTR(text.as_ptr()));
    }
}

unsafe extern "system" fn dialog_wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_COMMAND => {
            let id = (wparam.0 & 0xFFFF) as i32;
            match id {
                ID_OK => {
                    let text = read_edit(hwnd);
                    match HotkeyCombo::parse(&text) {
                        Ok(combo) => {
                            debug!("hotkey dialog accepted {}", combo);
                            DIALOG_RESULT.with(|r| *r.borrow_mut() = Some(combo));
                            let _ = DestroyWindow(hwnd);
                        }
                        Err(e) => show_error(hwnd, &format!("Invalid hotkey: {}", e)),
                    }
                }
                ID_CANCEL => {
                    let _ = DestroyWindow(hwnd);
                }
                _ => {}
            }
            LRESULT(0)
        }

        WM_CLOSE => {
            let _ = DestroyWindow(hwnd);
            LRESULT(0)
        }

        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
