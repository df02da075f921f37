//! Recording transport
//!
//! Keeps every request in a log and serves events from a queue filled by the
//! caller, so the whole widget core runs without a display server. The
//! server's side effects that the core depends on are emulated: exposing
//! clears report the cleared area back, and client messages are echoed to
//! their target window.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Result, ToolkitError};
use crate::geometry::Rect;

use super::{
    Atom, Background, EventKind, EventMask, EventWaiter, ProtocolEvent, ScreenInfo, Timestamp,
    Transport, WindowChanges, WindowHandle, WindowSpec,
};

/// First handle given to created windows
const FIRST_HANDLE: WindowHandle = 0x0020_0000;

/// One logged request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateWindow { window: WindowHandle, spec: WindowSpec },
    DestroyWindow(WindowHandle),
    MapWindow(WindowHandle),
    UnmapWindow(WindowHandle),
    ConfigureWindow { window: WindowHandle, changes: WindowChanges },
    ReparentWindow { window: WindowHandle, parent: WindowHandle, x: i32, y: i32 },
    SelectInput { window: WindowHandle, mask: EventMask },
    SetBackground { window: WindowHandle, background: Background },
    SetTitle { window: WindowHandle, title: String },
    GrabPointer { window: WindowHandle, time: Timestamp },
    GrabKeyboard { window: WindowHandle, time: Timestamp },
    UngrabPointer,
    UngrabKeyboard,
    ClearArea { window: WindowHandle, rect: Rect, exposures: bool },
    FillRectangles { window: WindowHandle, pixel: u32, rects: Vec<Rect> },
    SendClientMessage { window: WindowHandle, message_type: Atom, data: [u32; 5] },
    Flush,
    Sync,
}

struct RecordingState {
    screens: Vec<ScreenInfo>,
    requests: Vec<Request>,
    events: VecDeque<ProtocolEvent>,
    atoms: Vec<String>,
    next_handle: WindowHandle,
    button_count: u8,
    /// Requests still accepted before one is refused
    fail_after: Option<usize>,
    closed: bool,
}

struct Shared {
    state: Mutex<RecordingState>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory transport
pub struct RecordingTransport {
    shared: Arc<Shared>,
}

/// Test-side view of a [`RecordingTransport`] after it was handed to a display
#[derive(Clone)]
pub struct RecordingHandle {
    shared: Arc<Shared>,
}

impl RecordingTransport {
    /// Single 1024x768 screen with root window 1
    pub fn new() -> (Self, RecordingHandle) {
        Self::with_screens(vec![ScreenInfo {
            root: 1,
            width: 1024,
            height: 768,
            black_pixel: 0,
            white_pixel: 0x00ff_ffff,
        }])
    }

    pub fn with_screens(screens: Vec<ScreenInfo>) -> (Self, RecordingHandle) {
        let shared = Arc::new(Shared {
            state: Mutex::new(RecordingState {
                screens,
                requests: Vec::new(),
                events: VecDeque::new(),
                atoms: Vec::new(),
                next_handle: FIRST_HANDLE,
                button_count: 3,
                fail_after: None,
                closed: false,
            }),
            ready: Condvar::new(),
        });
        (
            Self {
                shared: shared.clone(),
            },
            RecordingHandle { shared },
        )
    }

    fn record(&self, request: Request) -> Result<()> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(ToolkitError::ConnectionLost);
        }
        match state.fail_after {
            Some(0) => {
                state.fail_after = None;
                return Err(ToolkitError::transport(format!("request refused: {:?}", request)));
            }
            Some(n) => state.fail_after = Some(n - 1),
            None => {}
        }
        state.requests.push(request);
        Ok(())
    }
}

impl RecordingHandle {
    /// Queue an event as if the server had sent it
    pub fn push_event(&self, event: ProtocolEvent) {
        self.shared.lock().events.push_back(event);
        self.shared.ready.notify_all();
    }

    pub fn requests(&self) -> Vec<Request> {
        self.shared.lock().requests.clone()
    }

    /// Drain the request log
    pub fn take_requests(&self) -> Vec<Request> {
        std::mem::take(&mut self.shared.lock().requests)
    }

    pub fn pending_events(&self) -> usize {
        self.shared.lock().events.len()
    }

    /// Pointer mapping size reported to the display at open time
    pub fn set_button_count(&self, count: u8) {
        self.shared.lock().button_count = count;
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Accept `count` more requests, then refuse the next one with a
    /// transport error. Refused requests are not logged.
    pub fn fail_after(&self, count: usize) {
        self.shared.lock().fail_after = Some(count);
    }
}

impl Transport for RecordingTransport {
    fn screens(&self) -> Vec<ScreenInfo> {
        self.shared.lock().screens.clone()
    }

    fn create_window(&mut self, spec: &WindowSpec) -> Result<WindowHandle> {
        let window = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(ToolkitError::ConnectionLost);
            }
            let window = state.next_handle;
            state.next_handle += 1;
            window
        };
        self.record(Request::CreateWindow {
            window,
            spec: spec.clone(),
        })?;
        Ok(window)
    }

    fn destroy_window(&mut self, window: WindowHandle) -> Result<()> {
        self.record(Request::DestroyWindow(window))
    }

    fn map_window(&mut self, window: WindowHandle) -> Result<()> {
        self.record(Request::MapWindow(window))
    }

    fn unmap_window(&mut self, window: WindowHandle) -> Result<()> {
        self.record(Request::UnmapWindow(window))
    }

    fn configure_window(&mut self, window: WindowHandle, changes: &WindowChanges) -> Result<()> {
        self.record(Request::ConfigureWindow {
            window,
            changes: *changes,
        })
    }

    fn reparent_window(
        &mut self,
        window: WindowHandle,
        parent: WindowHandle,
        x: i32,
        y: i32,
    ) -> Result<()> {
        self.record(Request::ReparentWindow { window, parent, x, y })
    }

    fn select_input(&mut self, window: WindowHandle, mask: EventMask) -> Result<()> {
        self.record(Request::SelectInput { window, mask })
    }

    fn set_background(&mut self, window: WindowHandle, background: Background) -> Result<()> {
        self.record(Request::SetBackground { window, background })
    }

    fn set_title(&mut self, window: WindowHandle, title: &str) -> Result<()> {
        self.record(Request::SetTitle {
            window,
            title: title.to_string(),
        })
    }

    fn grab_pointer(
        &mut self,
        window: WindowHandle,
        _mask: EventMask,
        time: Timestamp,
    ) -> Result<()> {
        self.record(Request::GrabPointer { window, time })
    }

    fn grab_keyboard(&mut self, window: WindowHandle, time: Timestamp) -> Result<()> {
        self.record(Request::GrabKeyboard { window, time })
    }

    fn ungrab_pointer(&mut self, _time: Timestamp) -> Result<()> {
        self.record(Request::UngrabPointer)
    }

    fn ungrab_keyboard(&mut self, _time: Timestamp) -> Result<()> {
        self.record(Request::UngrabKeyboard)
    }

    fn clear_area(&mut self, window: WindowHandle, rect: Rect, exposures: bool) -> Result<()> {
        self.record(Request::ClearArea {
            window,
            rect,
            exposures,
        })?;
        if exposures {
            self.shared
                .lock()
                .events
                .push_back(ProtocolEvent::new(window, EventKind::Expose(rect)));
            self.shared.ready.notify_all();
        }
        Ok(())
    }

    fn fill_rectangles(&mut self, window: WindowHandle, pixel: u32, rects: &[Rect]) -> Result<()> {
        self.record(Request::FillRectangles {
            window,
            pixel,
            rects: rects.to_vec(),
        })
    }

    fn intern_atom(&mut self, name: &str) -> Result<Atom> {
        let mut state = self.shared.lock();
        let index = match state.atoms.iter().position(|a| a == name) {
            Some(index) => index,
            None => {
                state.atoms.push(name.to_string());
                state.atoms.len() - 1
            }
        };
        // Leave room for the predefined atoms
        Ok(100 + index as Atom)
    }

    fn send_client_message(
        &mut self,
        window: WindowHandle,
        message_type: Atom,
        data: [u32; 5],
    ) -> Result<()> {
        self.record(Request::SendClientMessage {
            window,
            message_type,
            data,
        })?;
        self.shared.lock().events.push_back(ProtocolEvent::new(
            window,
            EventKind::ClientMessage { message_type, data },
        ));
        self.shared.ready.notify_all();
        Ok(())
    }

    fn pointer_button_count(&mut self) -> Result<u8> {
        Ok(self.shared.lock().button_count)
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(ToolkitError::ConnectionLost);
        }
        // Consecutive flushes carry no information for tests
        if state.requests.last() != Some(&Request::Flush) {
            state.requests.push(Request::Flush);
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.record(Request::Sync)
    }

    fn poll_event(&mut self) -> Result<Option<ProtocolEvent>> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(ToolkitError::ConnectionLost);
        }
        Ok(state.events.pop_front())
    }

    fn waiter(&self) -> Arc<dyn EventWaiter> {
        Arc::new(RecordingWaiter {
            shared: self.shared.clone(),
        })
    }

    fn close(&mut self) {
        self.shared.lock().closed = true;
        self.shared.ready.notify_all();
    }
}

struct RecordingWaiter {
    shared: Arc<Shared>,
}

impl EventWaiter for RecordingWaiter {
    fn wait(&self, timeout: Duration) -> Result<bool> {
        let state = self.shared.lock();
        if !state.events.is_empty() {
            return Ok(true);
        }
        if timeout.is_zero() || state.closed {
            return Ok(false);
        }
        let (state, _) = self
            .shared
            .ready
            .wait_timeout_while(state, timeout, |s| s.events.is_empty() && !s.closed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(!state.events.is_empty())
    }
}
