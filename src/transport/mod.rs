//! Display-server transport
//!
//! The widget core talks to the server only through [`Transport`]. The X11
//! implementation lives in [`x11`]; [`recording`] is an in-memory transport
//! that records requests and replays queued events.
//!
//! Events are translated into the protocol-neutral [`ProtocolEvent`] before
//! they reach the core.

pub mod recording;
pub mod x11;

use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;

use crate::error::Result;
use crate::geometry::Rect;

/// Opaque server-side window identifier
pub type WindowHandle = u32;

/// Server atom
pub type Atom = u32;

/// Server timestamp in milliseconds; 0 means "current time"
pub type Timestamp = u32;

pub const CURRENT_TIME: Timestamp = 0;

bitflags! {
    /// Event selection mask (core protocol bit values)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const KEY_PRESS        = 1 << 0;
        const KEY_RELEASE      = 1 << 1;
        const BUTTON_PRESS     = 1 << 2;
        const BUTTON_RELEASE   = 1 << 3;
        const ENTER_WINDOW     = 1 << 4;
        const LEAVE_WINDOW     = 1 << 5;
        const POINTER_MOTION   = 1 << 6;
        const EXPOSURE         = 1 << 15;
        const STRUCTURE_NOTIFY = 1 << 17;
        const FOCUS_CHANGE     = 1 << 21;
        const PROPERTY_CHANGE  = 1 << 22;
    }
}

bitflags! {
    /// Keyboard modifiers and held pointer buttons
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierMask: u32 {
        const SHIFT   = 1 << 0;
        const LOCK    = 1 << 1;
        const CONTROL = 1 << 2;
        const MOD1    = 1 << 3;
        const MOD2    = 1 << 4;
        const MOD3    = 1 << 5;
        const MOD4    = 1 << 6;
        const MOD5    = 1 << 7;
        const BUTTON1 = 1 << 8;
        const BUTTON2 = 1 << 9;
        const BUTTON3 = 1 << 10;
        const BUTTON4 = 1 << 11;
        const BUTTON5 = 1 << 12;
        const ALL_BUTTONS = Self::BUTTON1.bits()
            | Self::BUTTON2.bits()
            | Self::BUTTON3.bits()
            | Self::BUTTON4.bits()
            | Self::BUTTON5.bits();
    }
}

/// Pointer button number (1-based, as reported by the server)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Button(pub u8);

impl Button {
    pub const LEFT: Button = Button(1);
    pub const MIDDLE: Button = Button(2);
    pub const RIGHT: Button = Button(3);
    pub const WHEEL_UP: Button = Button(4);
    pub const WHEEL_DOWN: Button = Button(5);

    pub fn is_wheel(self) -> bool {
        self == Self::WHEEL_UP || self == Self::WHEEL_DOWN
    }

    /// Modifier bit set while this button is held (empty beyond button 5)
    pub fn mask(self) -> ModifierMask {
        match self.0 {
            1..=5 => ModifierMask::from_bits_truncate(ModifierMask::BUTTON1.bits() << (self.0 - 1)),
            _ => ModifierMask::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossingMode {
    #[default]
    Normal,
    Grab,
    Ungrab,
    WhileGrabbed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossingDetail {
    #[default]
    Ancestor,
    Virtual,
    Inferior,
    Nonlinear,
    NonlinearVirtual,
}

/// Pointer position with modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerEvent {
    /// Window-relative position
    pub x: i32,
    pub y: i32,
    pub root_x: i32,
    pub root_y: i32,
    pub state: ModifierMask,
    pub time: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub pointer: PointerEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyEvent {
    pub keysym: u32,
    pub state: ModifierMask,
    /// Text produced by the key, if any
    pub text: Option<String>,
    pub time: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrossingEvent {
    pub x: i32,
    pub y: i32,
    pub state: ModifierMask,
    /// Child window the pointer came from / went to
    pub subwindow: Option<WindowHandle>,
    pub mode: CrossingMode,
    pub detail: CrossingDetail,
    pub time: Timestamp,
}

impl CrossingEvent {
    /// Blank crossing used for client-side enter/leave synthesis
    pub fn synthetic() -> Self {
        Self::default()
    }
}

/// Protocol event payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    KeyPress(KeyEvent),
    KeyRelease(KeyEvent),
    ButtonPress(ButtonEvent),
    ButtonRelease(ButtonEvent),
    Motion(PointerEvent),
    Enter(CrossingEvent),
    Leave(CrossingEvent),
    FocusIn,
    FocusOut,
    /// Server-reported damage in window coordinates
    Expose(Rect),
    /// New geometry of the window itself
    Configure(Rect),
    ClientMessage { message_type: Atom, data: [u32; 5] },
    Property { time: Timestamp },
    Selection { time: Timestamp },
    Other,
}

/// Event addressed to one server window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolEvent {
    pub window: WindowHandle,
    pub kind: EventKind,
}

impl ProtocolEvent {
    pub fn new(window: WindowHandle, kind: EventKind) -> Self {
        Self { window, kind }
    }

    /// Server time carried by the event, if the event type has one
    pub fn time(&self) -> Option<Timestamp> {
        match &self.kind {
            EventKind::KeyPress(e) | EventKind::KeyRelease(e) => Some(e.time),
            EventKind::ButtonPress(e) | EventKind::ButtonRelease(e) => Some(e.pointer.time),
            EventKind::Motion(e) => Some(e.time),
            EventKind::Enter(e) | EventKind::Leave(e) => Some(e.time),
            EventKind::Property { time } | EventKind::Selection { time } => Some(*time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowClass {
    InputOutput,
    InputOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Background {
    /// Show the parent's background through the window
    #[default]
    ParentRelative,
    Pixel(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMode {
    Above,
    Below,
}

/// Parameters for window creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub parent: WindowHandle,
    pub bounds: Rect,
    pub class: WindowClass,
    pub background: Background,
    pub override_redirect: bool,
}

/// Subset of window attributes to change in one configure request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowChanges {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub sibling: Option<WindowHandle>,
    pub stack_mode: Option<StackMode>,
}

impl WindowChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Root window of one screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    pub root: WindowHandle,
    pub width: i32,
    pub height: i32,
    pub black_pixel: u32,
    pub white_pixel: u32,
}

/// Blocking wait for transport readiness, usable without the display lock
pub trait EventWaiter: Send + Sync {
    /// Block up to `timeout` for incoming data. `Ok(true)` means an event
    /// may be ready to read.
    fn wait(&self, timeout: Duration) -> Result<bool>;
}

/// Requests the widget core issues to the display server.
///
/// All calls happen while the display lock is held.
pub trait Transport: Send {
    fn screens(&self) -> Vec<ScreenInfo>;

    fn create_window(&mut self, spec: &WindowSpec) -> Result<WindowHandle>;
    fn destroy_window(&mut self, window: WindowHandle) -> Result<()>;
    fn map_window(&mut self, window: WindowHandle) -> Result<()>;
    fn unmap_window(&mut self, window: WindowHandle) -> Result<()>;
    fn configure_window(&mut self, window: WindowHandle, changes: &WindowChanges) -> Result<()>;
    fn reparent_window(
        &mut self,
        window: WindowHandle,
        parent: WindowHandle,
        x: i32,
        y: i32,
    ) -> Result<()>;
    fn select_input(&mut self, window: WindowHandle, mask: EventMask) -> Result<()>;
    fn set_background(&mut self, window: WindowHandle, background: Background) -> Result<()>;
    fn set_title(&mut self, window: WindowHandle, title: &str) -> Result<()>;

    fn grab_pointer(
        &mut self,
        window: WindowHandle,
        mask: EventMask,
        time: Timestamp,
    ) -> Result<()>;
    fn grab_keyboard(&mut self, window: WindowHandle, time: Timestamp) -> Result<()>;
    fn ungrab_pointer(&mut self, time: Timestamp) -> Result<()>;
    fn ungrab_keyboard(&mut self, time: Timestamp) -> Result<()>;

    /// Clear `rect` to the window background; `exposures` asks the server to
    /// report the cleared area back as expose events.
    fn clear_area(&mut self, window: WindowHandle, rect: Rect, exposures: bool) -> Result<()>;
    fn fill_rectangles(&mut self, window: WindowHandle, pixel: u32, rects: &[Rect]) -> Result<()>;

    fn intern_atom(&mut self, name: &str) -> Result<Atom>;
    fn send_client_message(
        &mut self,
        window: WindowHandle,
        message_type: Atom,
        data: [u32; 5],
    ) -> Result<()>;
    /// Number of buttons in the pointer mapping
    fn pointer_button_count(&mut self) -> Result<u8>;

    fn flush(&mut self) -> Result<()>;
    /// Round trip: returns once the server processed every request
    fn sync(&mut self) -> Result<()>;
    /// Next already-received event, without blocking
    fn poll_event(&mut self) -> Result<Option<ProtocolEvent>>;
    fn waiter(&self) -> Arc<dyn EventWaiter>;

    /// Release the connection; later calls may fail
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_masks() {
        assert_eq!(Button::LEFT.mask(), ModifierMask::BUTTON1);
        assert_eq!(Button::WHEEL_DOWN.mask(), ModifierMask::BUTTON5);
        assert_eq!(Button(9).mask(), ModifierMask::empty());
        assert!(ModifierMask::ALL_BUTTONS.contains(Button::RIGHT.mask()));
        assert!(Button::WHEEL_UP.is_wheel());
        assert!(!Button::MIDDLE.is_wheel());
    }
}
