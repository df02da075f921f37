//! Shared fixtures: a display over the recording transport and a handler
//! that logs everything it is called with.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use area_toolkit::transport::recording::{RecordingHandle, RecordingTransport, Request};
use area_toolkit::transport::{
    ButtonEvent, CrossingEvent, EventKind, KeyEvent, ModifierMask, PointerEvent, ProtocolEvent,
    WindowHandle,
};
use area_toolkit::{
    Button, Display, DisplayOptions, Painter, Rect, Region, WidgetEvent, WidgetHandler, WidgetId,
};

/// One handler call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Event(WidgetId, WidgetEvent),
    Paint(WidgetId, Region),
}

/// Log shared by every recorder of a test
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Seen>>>);

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, seen: Seen) {
        self.0.lock().unwrap().push(seen);
    }

    pub fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    /// Events received by one widget, paints excluded
    pub fn events_for(&self, widget: WidgetId) -> Vec<WidgetEvent> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|seen| match seen {
                Seen::Event(w, event) if *w == widget => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn paints_for(&self, widget: WidgetId) -> Vec<Region> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|seen| match seen {
                Seen::Paint(w, clip) if *w == widget => Some(clip.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every event, with map notifications left out
    pub fn input(&self) -> Vec<(WidgetId, WidgetEvent)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|seen| match seen {
                Seen::Event(_, WidgetEvent::MapStateChanged(_)) => None,
                Seen::Event(w, event) => Some((*w, event.clone())),
                Seen::Paint(..) => None,
            })
            .collect()
    }
}

/// Handler that records its calls. Keys and wheel notches are consumed
/// only when `consume` is set.
pub struct Recorder {
    log: Log,
    consume: bool,
}

impl Recorder {
    pub fn new(log: &Log) -> Arc<Self> {
        Arc::new(Self {
            log: log.clone(),
            consume: false,
        })
    }

    pub fn consuming(log: &Log) -> Arc<Self> {
        Arc::new(Self {
            log: log.clone(),
            consume: true,
        })
    }

    fn record(&self, widget: WidgetId, event: WidgetEvent) {
        self.log.push(Seen::Event(widget, event));
    }
}

impl WidgetHandler for Recorder {
    fn on_paint(&self, painter: &mut Painter<'_>) -> area_toolkit::Result<()> {
        self.log.push(Seen::Paint(painter.widget(), painter.clip().clone()));
        Ok(())
    }

    fn on_move_resize(&self, _display: &Display, widget: WidgetId, bounds: Rect) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::MoveResize(bounds));
        Ok(())
    }

    fn on_map_state_changed(&self, _display: &Display, widget: WidgetId, mapped: bool) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::MapStateChanged(mapped));
        Ok(())
    }

    fn on_sensitivity_changed(
        &self,
        _display: &Display,
        widget: WidgetId,
        sensitive: bool,
    ) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::SensitivityChanged(sensitive));
        Ok(())
    }

    fn on_enter(
        &self,
        _display: &Display,
        widget: WidgetId,
        child: Option<WidgetId>,
        event: &CrossingEvent,
    ) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::Enter { child, event: *event });
        Ok(())
    }

    fn on_leave(
        &self,
        _display: &Display,
        widget: WidgetId,
        child: Option<WidgetId>,
        event: &CrossingEvent,
    ) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::Leave { child, event: *event });
        Ok(())
    }

    fn on_button_press(&self, _display: &Display, widget: WidgetId, event: &ButtonEvent) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::ButtonPress(*event));
        Ok(())
    }

    fn on_button_release(&self, _display: &Display, widget: WidgetId, event: &ButtonEvent) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::ButtonRelease(*event));
        Ok(())
    }

    fn on_button_double_click(
        &self,
        _display: &Display,
        widget: WidgetId,
        event: &ButtonEvent,
    ) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::ButtonDoubleClick(*event));
        Ok(())
    }

    fn on_button_wheel(
        &self,
        _display: &Display,
        widget: WidgetId,
        event: &ButtonEvent,
        delta: i32,
    ) -> area_toolkit::Result<bool> {
        self.record(widget, WidgetEvent::Wheel { event: *event, delta });
        Ok(self.consume)
    }

    fn on_pointer_motion(&self, _display: &Display, widget: WidgetId, event: &PointerEvent) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::Motion(*event));
        Ok(())
    }

    fn on_key_press(&self, _display: &Display, widget: WidgetId, event: &KeyEvent) -> area_toolkit::Result<bool> {
        self.record(widget, WidgetEvent::KeyPress(event.clone()));
        Ok(self.consume)
    }

    fn on_key_release(&self, _display: &Display, widget: WidgetId, event: &KeyEvent) -> area_toolkit::Result<bool> {
        self.record(widget, WidgetEvent::KeyRelease(event.clone()));
        Ok(self.consume)
    }

    fn on_focus_in(
        &self,
        _display: &Display,
        widget: WidgetId,
        previous: Option<WidgetId>,
    ) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::FocusIn(previous));
        Ok(())
    }

    fn on_focus_out(&self, _display: &Display, widget: WidgetId, next: Option<WidgetId>) -> area_toolkit::Result<()> {
        self.record(widget, WidgetEvent::FocusOut(next));
        Ok(())
    }
}

pub fn open() -> (Display, RecordingHandle) {
    open_with(DisplayOptions::default())
}

pub fn open_with(options: DisplayOptions) -> (Display, RecordingHandle) {
    let (transport, handle) = RecordingTransport::new();
    let display = Display::open(Box::new(transport), options).unwrap();
    (display, handle)
}

pub fn pointer(x: i32, y: i32, root_x: i32, root_y: i32, time: u32) -> PointerEvent {
    PointerEvent {
        x,
        y,
        root_x,
        root_y,
        state: ModifierMask::empty(),
        time,
    }
}

pub fn press(window: WindowHandle, button: Button, pointer: PointerEvent) -> ProtocolEvent {
    ProtocolEvent::new(window, EventKind::ButtonPress(ButtonEvent { button, pointer }))
}

pub fn release(window: WindowHandle, button: Button, pointer: PointerEvent) -> ProtocolEvent {
    ProtocolEvent::new(window, EventKind::ButtonRelease(ButtonEvent { button, pointer }))
}

pub fn key_press(window: WindowHandle, keysym: u32) -> ProtocolEvent {
    ProtocolEvent::new(
        window,
        EventKind::KeyPress(KeyEvent {
            keysym,
            ..KeyEvent::default()
        }),
    )
}

/// Handle of the input-only override-redirect window the display created
/// for popup grabs
pub fn catcher_window(requests: &[Request]) -> Option<WindowHandle> {
    requests.iter().find_map(|request| match request {
        Request::CreateWindow { window, spec }
            if spec.override_redirect
                && spec.class == area_toolkit::transport::WindowClass::InputOnly =>
        {
            Some(*window)
        }
        _ => None,
    })
}
