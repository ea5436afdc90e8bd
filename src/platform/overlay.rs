//! Full-screen overlay window shown while the keyboard is locked
//!
//! One layered, topmost, undecorated window spans the combined bounds of
//! every monitor. The status text is drawn on the primary monitor's part of
//! the window. Under the hotkey-only policy the window is click-through.

use crate::coordinator::OverlaySpec;
use crate::geometry::{Monitor, OverlayLayout, Rect};
use crate::signal::{Signal, SignalSender, UnlockSource};
use log::{debug, warn};
use std::cell::RefCell;
use std::sync::Once;
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{BOOL, COLORREF, HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    BeginPaint, CreateFontW, CreateSolidBrush, DeleteObject, DrawTextW, EndPaint,
    EnumDisplayMonitors, FillRect, GetMonitorInfoW, InvalidateRect, SelectObject, SetBkMode,
    SetTextColor, CLEARTYPE_QUALITY, CLIP_DEFAULT_PRECIS, DEFAULT_CHARSET, DEFAULT_PITCH,
    DT_CENTER, DT_SINGLELINE, DT_VCENTER, FF_DONTCARE, FW_BOLD, HDC, HMONITOR, MONITORINFOEXW,
    OUT_DEFAULT_PRECIS, PAINTSTRUCT, TRANSPARENT,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, GetSystemMetrics, IsWindow, LoadCursorW,
    PostQuitMessage, RegisterClassExW, SetLayeredWindowAttributes, SetWindowPos, ShowWindow,
    CS_HREDRAW, CS_VREDRAW, HWND_TOPMOST, IDC_ARROW, LWA_ALPHA, MONITORINFOF_PRIMARY,
    SM_CXSCREEN, SM_CYSCREEN, SWP_NOMOVE, SWP_NOSIZE, SWP_SHOWWINDOW, SW_SHOW, WINDOW_EX_STYLE,
    WM_DESTROY, WM_ENDSESSION, WM_ERASEBKGND, WM_LBUTTONDOWN, WM_PAINT, WNDCLASSEXW,
    WS_EX_LAYERED, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_EX_TRANSPARENT, WS_POPUP,
};

const OVERLAY_CLASS_NAME: PCWSTR = w!("KeylatchOverlay");

thread_local! {
    static OVERLAY_STATE: RefCell<Option<OverlayState>> = const { RefCell::new(None) };
}

struct OverlayState {
    color: COLORREF,
    text: Vec<u16>,
    text_rect: RECT,
    click_to_unlock: bool,
    signals: SignalSender,
}

/// The live overlay. Destroyed on drop, whichever way the lock ends.
#[derive(Debug)]
pub struct OverlayWindow {
    hwnd: HWND,
}

impl OverlayWindow {
    pub fn open(spec: &OverlaySpec, signals: SignalSender) -> windows::core::Result<Self> {
        let layout = OverlayLayout::compute(&enumerate_monitors(), primary_screen());
        let bounds = layout.bounds;
        debug!("overlay bounds {:?}, text region {:?}", bounds, layout.text);

        let (r, g, b) = spec.color;
        OVERLAY_STATE.with(|os| {
            *os.borrow_mut() = Some(OverlayState {
                color: rgb(r, g, b),
                // DrawTextW wants the text without the terminator
                text: spec.text.encode_utf16().collect(),
                text_rect: to_rect(&layout.text),
                click_to_unlock: spec.click_to_unlock,
                signals,
            });
        });

        let mut ex_style = WS_EX_LAYERED | WS_EX_TOPMOST | WS_EX_TOOLWINDOW;
        if !spec.click_to_unlock {
            ex_style |= WS_EX_TRANSPARENT;
        }

        let hwnd = match create_window(ex_style, &bounds) {
            Ok(hwnd) => hwnd,
            Err(e) => {
                OVERLAY_STATE.with(|os| os.borrow_mut().take());
                return Err(e);
            }
        };
        let window = Self { hwnd };

        let alpha = (spec.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        unsafe {
            SetLayeredWindowAttributes(hwnd, COLORREF(0), alpha, LWA_ALPHA)?;
            let _ = ShowWindow(hwnd, SW_SHOW);
            let _ = SetWindowPos(
                hwnd,
                HWND_TOPMOST,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_SHOWWINDOW,
            );
            let _ = InvalidateRect(hwnd, None, true);
        }

        Ok(window)
    }

    /// False once the window was destroyed behind our back.
    pub fn is_open(&self) -> bool {
        unsafe { IsWindow(self.hwnd).as_bool() }
    }
}

impl Drop for OverlayWindow {
    fn drop(&mut self) {
        if self.is_open() {
            unsafe {
                if let Err(e) = DestroyWindow(self.hwnd) {
                    warn!("failed to destroy overlay: {}", e);
                }
            }
        }
        OVERLAY_STATE.with(|os| os.borrow_mut().take());
    }
}

fn create_window(ex_style: WINDOW_EX_STYLE, bounds: &Rect) -> windows::core::Result<HWND> {
    static REGISTER_CLASS: Once = Once::new();

    unsafe {
        let hinstance = GetModuleHandleW(None)?;

        REGISTER_CLASS.call_once(|| {
            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(overlay_wnd_proc),
                hInstance: hinstance.into(),
                hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
                lpszClassName: OVERLAY_CLASS_NAME,
                ..Default::default()
            };
            RegisterClassExW(&wc);
        });

        CreateWindowExW(
            ex_style,
            OVERLAY_CLASS_NAME,
            w!("Keylatch Overlay"),
            WS_POPUP,
            bounds.left,
            bounds.top,
            bounds.width(),
            bounds.height(),
            None,
            None,
            hinstance,
            None,
        )
    }
}

fn rgb(r: u8, g: u8, b: u8) -> COLORREF {
    COLORREF((r as u32) | ((g as u32) << 8) | ((b as u32) << 16))
}

fn to_rect(r: &Rect) -> RECT {
    RECT {
        left: r.left,
        top: r.top,
        right: r.right,
        bottom: r.bottom,
    }
}

/// Used when monitor enumeration yields nothing.
fn primary_screen() -> Rect {
    unsafe {
        Rect::from_origin_size(
            0,
            0,
            GetSystemMetrics(SM_CXSCREEN),
            GetSystemMetrics(SM_CYSCREEN),
        )
    }
}

fn enumerate_monitors() -> Vec<Monitor> {
    unsafe extern "system" fn enum_proc(
        monitor: HMONITOR,
        _hdc: HDC,
        _rect: *mut RECT,
        data: LPARAM,
    ) -> BOOL {
        let monitors = &mut *(data.0 as *mut Vec<Monitor>);
        let mut info = MONITORINFOEXW::default();
        info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
        if GetMonitorInfoW(monitor, &mut info.monitorInfo as *mut _ as *mut _).as_bool() {
            let rc = info.monitorInfo.rcMonitor;
            monitors.push(Monitor {
                rect: Rect::new(rc.left, rc.top, rc.right, rc.bottom),
                primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
            });
        }
        BOOL(1)
    }

    let mut monitors: Vec<Monitor> = Vec::new();
    let ok = unsafe {
        EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(enum_proc),
            LPARAM(&mut monitors as *mut Vec<Monitor> as isize),
        )
    };
    if !ok.as_bool() {
        warn!("monitor enumeration failed, falling back to the primary screen");
    }
    monitors
}

unsafe extern "system" fn overlay_wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_PAINT => {
            let mut ps = PAINTSTRUCT::default();
            let hdc = BeginPaint(hwnd, &mut ps);
            OVERLAY_STATE.with(|os| {
                if let Some(state) = os.borrow().as_ref() {
                    paint(hdc, &ps.rcPaint, state);
                }
            });
            let _ = EndPaint(hwnd, &ps);
            LRESULT(0)
        }

        // Handled in WM_PAINT
        WM_ERASEBKGND => LRESULT(1),

        WM_LBUTTONDOWN => {
            OVERLAY_STATE.with(|os| {
                if let Some(state) = os.borrow().as_ref() {
                    if state.click_to_unlock {
                        state
                            .signals
                            .send(Signal::UnlockRequested(UnlockSource::Pointer));
                    }
                }
            });
            LRESULT(0)
        }

        // Session ending: leave the UI loop so the lock is released
        WM_ENDSESSION if wparam.0 != 0 => {
            PostQuitMessage(0);
            LRESULT(0)
        }

        WM_DESTROY => LRESULT(0),

        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

unsafe fn paint(hdc: HDC, dirty: &RECT, state: &OverlayState) {
    let brush = CreateSolidBrush(state.color);
    FillRect(hdc, dirty, brush);
    let _ = DeleteObject(brush);

    let font = CreateFontW(
        48,
        0,
        0,
        0,
        FW_BOLD.0 as i32,
        0,
        0,
        0,
        DEFAULT_CHARSET.0 as u32,
        OUT_DEFAULT_PRECIS.0 as u32,
        CLIP_DEFAULT_PRECIS.0 as u32,
        CLEARTYPE_QUALITY.0 as u32,
        DEFAULT_PITCH.0 as u32 | FF_DONTCARE.0 as u32,
        w!("Segoe UI"),
    );

    let old_font = SelectObject(hdc, font);
    SetTextColor(hdc, COLORREF(0xFFFFFF));
    SetBkMode(hdc, TRANSPARENT);

    let mut text = state.text.clone();
    let mut rect = state.text_rect;
    DrawTextW(
        hdc,
        &mut text,
        &mut rect,
        DT_CENTER | DT_VCENTER | DT_SINGLELINE,
    );

    SelectObject(hdc, old_font);
    let _ = DeleteObject(font);
}
