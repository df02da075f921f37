//! X11 Transport
//!
//! x11rb implementation of [`Transport`]. Requests are buffered by x11rb and
//! written on [`Transport::flush`]; the timed wait polls the socket with mio
//! so the event loop can block without holding the display lock.

use std::os::unix::io::AsRawFd;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::{
    AtomEnum, BackPixmap, ChangeGCAux, ChangeWindowAttributesAux, ClientMessageEvent,
    ConfigureWindowAux, ConnectionExt as _, CreateGCAux, CreateWindowAux,
    EventMask as XEventMask, Gcontext, GrabMode, GrabStatus, NotifyDetail, NotifyMode, PropMode,
    Rectangle, StackMode as XStackMode, WindowClass as XWindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::error::{Result, ToolkitError};
use crate::geometry::Rect;

use super::{
    Atom, Background, Button, ButtonEvent, CrossingDetail, CrossingEvent, CrossingMode, EventKind,
    EventMask, EventWaiter, KeyEvent, ModifierMask, PointerEvent, ProtocolEvent, ScreenInfo,
    StackMode, Timestamp, Transport, WindowChanges, WindowClass, WindowHandle, WindowSpec,
};

/// Keycode to keysym table fetched once at connect time
struct Keymap {
    min_keycode: u8,
    per_keycode: usize,
    keysyms: Vec<u32>,
}

impl Keymap {
    fn load(conn: &RustConnection) -> Result<Self> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode - min_keycode + 1;
        let reply = conn.get_keyboard_mapping(min_keycode, count)?.reply()?;
        Ok(Self {
            min_keycode,
            per_keycode: usize::from(reply.keysyms_per_keycode),
            keysyms: reply.keysyms,
        })
    }

    /// Keysym for a keycode; shifted column when SHIFT is held and one exists
    fn lookup(&self, keycode: u8, state: ModifierMask) -> u32 {
        if keycode < self.min_keycode || self.per_keycode == 0 {
            return 0;
        }
        let base = usize::from(keycode - self.min_keycode) * self.per_keycode;
        let unshifted = self.keysyms.get(base).copied().unwrap_or(0);
        if !state.contains(ModifierMask::SHIFT) || self.per_keycode < 2 {
            return unshifted;
        }
        match self.keysyms.get(base + 1).copied() {
            Some(0) | None => unshifted,
            Some(shifted) => shifted,
        }
    }
}

/// Latin-1 keysyms map directly onto their code points
fn keysym_text(keysym: u32) -> Option<String> {
    match keysym {
        0x20..=0x7e | 0xa0..=0xff => char::from_u32(keysym).map(String::from),
        _ => None,
    }
}

/// Connection to an X server
pub struct X11Transport {
    conn: Arc<RustConnection>,
    screens: Vec<ScreenInfo>,
    /// One GC per screen, drawn through for `fill_rectangles`
    gcs: Vec<Gcontext>,
    keymap: Keymap,
    waiter: Arc<X11Waiter>,
    closed: bool,
}

impl X11Transport {
    /// Open a connection; `None` uses `$DISPLAY`.
    pub fn connect(name: Option<&str>) -> Result<Self> {
        let (conn, default_screen) = x11rb::connect(name)?;
        let conn = Arc::new(conn);
        info!(
            "Connected to X server {:?} (default screen {})",
            name.unwrap_or("$DISPLAY"),
            default_screen
        );

        let mut screens = Vec::new();
        let mut gcs = Vec::new();
        for screen in &conn.setup().roots {
            screens.push(ScreenInfo {
                root: screen.root,
                width: i32::from(screen.width_in_pixels),
                height: i32::from(screen.height_in_pixels),
                black_pixel: screen.black_pixel,
                white_pixel: screen.white_pixel,
            });
            let gc = conn.generate_id()?;
            conn.create_gc(gc, screen.root, &CreateGCAux::new())?;
            gcs.push(gc);
        }

        let keymap = Keymap::load(&conn)?;
        let waiter = Arc::new(X11Waiter::new(&conn)?);
        conn.flush()?;

        Ok(Self {
            conn,
            screens,
            gcs,
            keymap,
            waiter,
            closed: false,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(ToolkitError::ConnectionLost)
        } else {
            Ok(())
        }
    }

    fn gc_for(&self, window: WindowHandle) -> Result<Gcontext> {
        // Toolkit windows inherit the root depth, so a screen GC fits them
        let index = self
            .screens
            .iter()
            .position(|s| s.root == window)
            .unwrap_or(0);
        self.gcs
            .get(index)
            .copied()
            .ok_or_else(|| ToolkitError::transport("no screen available"))
    }

    fn translate(&self, event: Event) -> Option<ProtocolEvent> {
        let pointer = |x: i16, y: i16, rx: i16, ry: i16, state: u16, time: u32| PointerEvent {
            x: i32::from(x),
            y: i32::from(y),
            root_x: i32::from(rx),
            root_y: i32::from(ry),
            state: ModifierMask::from_bits_truncate(u32::from(state)),
            time,
        };
        let event = match event {
            Event::KeyPress(e) => {
                let key = self.key_event(e.detail, u16::from(e.state), e.time);
                ProtocolEvent::new(e.event, EventKind::KeyPress(key))
            }
            Event::KeyRelease(e) => {
                let key = self.key_event(e.detail, u16::from(e.state), e.time);
                ProtocolEvent::new(e.event, EventKind::KeyRelease(key))
            }
            Event::ButtonPress(e) => ProtocolEvent::new(
                e.event,
                EventKind::ButtonPress(ButtonEvent {
                    button: Button(e.detail),
                    pointer: pointer(
                        e.event_x,
                        e.event_y,
                        e.root_x,
                        e.root_y,
                        u16::from(e.state),
                        e.time,
                    ),
                }),
            ),
            Event::ButtonRelease(e) => ProtocolEvent::new(
                e.event,
                EventKind::ButtonRelease(ButtonEvent {
                    button: Button(e.detail),
                    pointer: pointer(
                        e.event_x,
                        e.event_y,
                        e.root_x,
                        e.root_y,
                        u16::from(e.state),
                        e.time,
                    ),
                }),
            ),
            Event::MotionNotify(e) => ProtocolEvent::new(
                e.event,
                EventKind::Motion(pointer(
                    e.event_x,
                    e.event_y,
                    e.root_x,
                    e.root_y,
                    u16::from(e.state),
                    e.time,
                )),
            ),
            Event::EnterNotify(e) => ProtocolEvent::new(
                e.event,
                EventKind::Enter(crossing(
                    e.event_x, e.event_y, u16::from(e.state), e.child, e.mode, e.detail, e.time,
                )),
            ),
            Event::LeaveNotify(e) => ProtocolEvent::new(
                e.event,
                EventKind::Leave(crossing(
                    e.event_x, e.event_y, u16::from(e.state), e.child, e.mode, e.detail, e.time,
                )),
            ),
            Event::FocusIn(e) => ProtocolEvent::new(e.event, EventKind::FocusIn),
            Event::FocusOut(e) => ProtocolEvent::new(e.event, EventKind::FocusOut),
            Event::Expose(e) => ProtocolEvent::new(
                e.window,
                EventKind::Expose(Rect::new(
                    i32::from(e.x),
                    i32::from(e.y),
                    i32::from(e.width),
                    i32::from(e.height),
                )),
            ),
            // Only the window's own structure notifications, not its parent's copy
            Event::ConfigureNotify(e) if e.event == e.window => ProtocolEvent::new(
                e.window,
                EventKind::Configure(Rect::new(
                    i32::from(e.x),
                    i32::from(e.y),
                    i32::from(e.width),
                    i32::from(e.height),
                )),
            ),
            Event::ClientMessage(e) => ProtocolEvent::new(
                e.window,
                EventKind::ClientMessage {
                    message_type: e.type_,
                    data: e.data.as_data32(),
                },
            ),
            Event::PropertyNotify(e) => {
                ProtocolEvent::new(e.window, EventKind::Property { time: e.time })
            }
            Event::SelectionNotify(e) => {
                ProtocolEvent::new(e.requestor, EventKind::Selection { time: e.time })
            }
            Event::SelectionRequest(e) => {
                ProtocolEvent::new(e.owner, EventKind::Selection { time: e.time })
            }
            Event::SelectionClear(e) => {
                ProtocolEvent::new(e.owner, EventKind::Selection { time: e.time })
            }
            Event::Error(e) => {
                warn!("X11 error: {:?} (sequence {})", e.error_kind, e.sequence);
                return None;
            }
            _ => return None,
        };
        Some(event)
    }

    fn key_event(&self, keycode: u8, state: u16, time: Timestamp) -> KeyEvent {
        let state = ModifierMask::from_bits_truncate(u32::from(state));
        let keysym = self.keymap.lookup(keycode, state);
        KeyEvent {
            keysym,
            state,
            text: keysym_text(keysym),
            time,
        }
    }
}

fn crossing(
    x: i16,
    y: i16,
    state: u16,
    child: u32,
    mode: NotifyMode,
    detail: NotifyDetail,
    time: u32,
) -> CrossingEvent {
    let mode = if mode == NotifyMode::GRAB {
        CrossingMode::Grab
    } else if mode == NotifyMode::UNGRAB {
        CrossingMode::Ungrab
    } else if mode == NotifyMode::WHILE_GRABBED {
        CrossingMode::WhileGrabbed
    } else {
        CrossingMode::Normal
    };
    let detail = if detail == NotifyDetail::VIRTUAL {
        CrossingDetail::Virtual
    } else if detail == NotifyDetail::INFERIOR {
        CrossingDetail::Inferior
    } else if detail == NotifyDetail::NONLINEAR {
        CrossingDetail::Nonlinear
    } else if detail == NotifyDetail::NONLINEAR_VIRTUAL {
        CrossingDetail::NonlinearVirtual
    } else {
        CrossingDetail::Ancestor
    };
    CrossingEvent {
        x: i32::from(x),
        y: i32::from(y),
        state: ModifierMask::from_bits_truncate(u32::from(state)),
        subwindow: (child != x11rb::NONE).then_some(child),
        mode,
        detail,
        time,
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn clamp_u16(value: i32) -> u16 {
    value.clamp(0, i32::from(u16::MAX)) as u16
}

fn rectangle(rect: &Rect) -> Rectangle {
    Rectangle {
        x: clamp_i16(rect.x),
        y: clamp_i16(rect.y),
        width: clamp_u16(rect.width),
        height: clamp_u16(rect.height),
    }
}

impl Transport for X11Transport {
    fn screens(&self) -> Vec<ScreenInfo> {
        self.screens.clone()
    }

    fn create_window(&mut self, spec: &WindowSpec) -> Result<WindowHandle> {
        self.check_open()?;
        let window = self.conn.generate_id()?;
        let mut aux = CreateWindowAux::new();
        if spec.override_redirect {
            aux = aux.override_redirect(1);
        }
        let class = match spec.class {
            WindowClass::InputOutput => {
                aux = match spec.background {
                    Background::ParentRelative => {
                        aux.background_pixmap(u32::from(BackPixmap::PARENT_RELATIVE))
                    }
                    Background::Pixel(pixel) => aux.background_pixel(pixel),
                };
                XWindowClass::INPUT_OUTPUT
            }
            WindowClass::InputOnly => XWindowClass::INPUT_ONLY,
        };
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            spec.parent,
            clamp_i16(spec.bounds.x),
            clamp_i16(spec.bounds.y),
            clamp_u16(spec.bounds.width),
            clamp_u16(spec.bounds.height),
            0,
            class,
            x11rb::COPY_FROM_PARENT,
            &aux,
        )?;
        debug!("Created window {} under {}", window, spec.parent);
        Ok(window)
    }

    fn destroy_window(&mut self, window: WindowHandle) -> Result<()> {
        self.check_open()?;
        self.conn.destroy_window(window)?;
        Ok(())
    }

    fn map_window(&mut self, window: WindowHandle) -> Result<()> {
        self.check_open()?;
        self.conn.map_window(window)?;
        Ok(())
    }

    fn unmap_window(&mut self, window: WindowHandle) -> Result<()> {
        self.check_open()?;
        self.conn.unmap_window(window)?;
        Ok(())
    }

    fn configure_window(&mut self, window: WindowHandle, changes: &WindowChanges) -> Result<()> {
        self.check_open()?;
        let mut aux = ConfigureWindowAux::new();
        if let Some(x) = changes.x {
            aux = aux.x(x);
        }
        if let Some(y) = changes.y {
            aux = aux.y(y);
        }
        if let Some(width) = changes.width {
            aux = aux.width(width.max(1) as u32);
        }
        if let Some(height) = changes.height {
            aux = aux.height(height.max(1) as u32);
        }
        if let Some(sibling) = changes.sibling {
            aux = aux.sibling(sibling);
        }
        if let Some(mode) = changes.stack_mode {
            aux = aux.stack_mode(match mode {
                StackMode::Above => XStackMode::ABOVE,
                StackMode::Below => XStackMode::BELOW,
            });
        }
        self.conn.configure_window(window, &aux)?;
        Ok(())
    }

    fn reparent_window(
        &mut self,
        window: WindowHandle,
        parent: WindowHandle,
        x: i32,
        y: i32,
    ) -> Result<()> {
        self.check_open()?;
        self.conn
            .reparent_window(window, parent, clamp_i16(x), clamp_i16(y))?;
        Ok(())
    }

    fn select_input(&mut self, window: WindowHandle, mask: EventMask) -> Result<()> {
        self.check_open()?;
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(XEventMask::from(mask.bits())),
        )?;
        Ok(())
    }

    fn set_background(&mut self, window: WindowHandle, background: Background) -> Result<()> {
        self.check_open()?;
        let aux = match background {
            Background::ParentRelative => ChangeWindowAttributesAux::new()
                .background_pixmap(u32::from(BackPixmap::PARENT_RELATIVE)),
            Background::Pixel(pixel) => ChangeWindowAttributesAux::new().background_pixel(pixel),
        };
        self.conn.change_window_attributes(window, &aux)?;
        Ok(())
    }

    fn set_title(&mut self, window: WindowHandle, title: &str) -> Result<()> {
        self.check_open()?;
        self.conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title.as_bytes(),
        )?;
        Ok(())
    }

    fn grab_pointer(
        &mut self,
        window: WindowHandle,
        mask: EventMask,
        time: Timestamp,
    ) -> Result<()> {
        self.check_open()?;
        let reply = self
            .conn
            .grab_pointer(
                false,
                window,
                XEventMask::from(mask.bits()),
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                time,
            )?
            .reply()?;
        if reply.status != GrabStatus::SUCCESS {
            warn!("Pointer grab on {} failed: {:?}", window, reply.status);
        }
        Ok(())
    }

    fn grab_keyboard(&mut self, window: WindowHandle, time: Timestamp) -> Result<()> {
        self.check_open()?;
        let reply = self
            .conn
            .grab_keyboard(false, window, time, GrabMode::ASYNC, GrabMode::ASYNC)?
            .reply()?;
        if reply.status != GrabStatus::SUCCESS {
            warn!("Keyboard grab on {} failed: {:?}", window, reply.status);
        }
        Ok(())
    }

    fn ungrab_pointer(&mut self, time: Timestamp) -> Result<()> {
        self.check_open()?;
        self.conn.ungrab_pointer(time)?;
        Ok(())
    }

    fn ungrab_keyboard(&mut self, time: Timestamp) -> Result<()> {
        self.check_open()?;
        self.conn.ungrab_keyboard(time)?;
        Ok(())
    }

    fn clear_area(&mut self, window: WindowHandle, rect: Rect, exposures: bool) -> Result<()> {
        self.check_open()?;
        let r = rectangle(&rect);
        self.conn
            .clear_area(exposures, window, r.x, r.y, r.width, r.height)?;
        Ok(())
    }

    fn fill_rectangles(&mut self, window: WindowHandle, pixel: u32, rects: &[Rect]) -> Result<()> {
        self.check_open()?;
        if rects.is_empty() {
            return Ok(());
        }
        let gc = self.gc_for(window)?;
        self.conn
            .change_gc(gc, &ChangeGCAux::new().foreground(pixel))?;
        let rectangles: Vec<Rectangle> = rects.iter().map(rectangle).collect();
        self.conn.poly_fill_rectangle(window, gc, &rectangles)?;
        Ok(())
    }

    fn intern_atom(&mut self, name: &str) -> Result<Atom> {
        self.check_open()?;
        Ok(self.conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
    }

    fn send_client_message(
        &mut self,
        window: WindowHandle,
        message_type: Atom,
        data: [u32; 5],
    ) -> Result<()> {
        self.check_open()?;
        let event = ClientMessageEvent::new(32, window, message_type, data);
        self.conn
            .send_event(false, window, XEventMask::NO_EVENT, event)?;
        Ok(())
    }

    fn pointer_button_count(&mut self) -> Result<u8> {
        self.check_open()?;
        let reply = self.conn.get_pointer_mapping()?.reply()?;
        Ok(u8::try_from(reply.map.len()).unwrap_or(u8::MAX))
    }

    fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.conn.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.check_open()?;
        self.conn.get_input_focus()?.reply()?;
        Ok(())
    }

    fn poll_event(&mut self) -> Result<Option<ProtocolEvent>> {
        self.check_open()?;
        while let Some(event) = self.conn.poll_for_event()? {
            if let Some(event) = self.translate(event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn waiter(&self) -> Arc<dyn EventWaiter> {
        self.waiter.clone()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        for gc in self.gcs.drain(..) {
            if let Err(e) = self.conn.free_gc(gc) {
                debug!("Freeing GC {} on close failed: {}", gc, e);
            }
        }
        if let Err(e) = self.conn.flush() {
            debug!("Flush on close failed: {}", e);
        }
        self.closed = true;
        info!("X11 transport closed");
    }
}

/// Timed readiness wait on the connection socket.
///
/// Events x11rb already read into its buffer while fetching a reply do not
/// wake this wait; the loop drains `poll_event` before every wait and caps
/// the timeout, which bounds the delay.
pub struct X11Waiter {
    poll: Mutex<(mio::Poll, mio::Events)>,
}

impl X11Waiter {
    fn new(conn: &Arc<RustConnection>) -> Result<Self> {
        let fd = conn.stream().as_raw_fd();
        let poll = mio::Poll::new().map_err(|e| ToolkitError::transport(e.to_string()))?;
        poll.registry()
            .register(
                &mut mio::unix::SourceFd(&fd),
                mio::Token(0),
                mio::Interest::READABLE,
            )
            .map_err(|e| ToolkitError::transport(e.to_string()))?;
        Ok(Self {
            poll: Mutex::new((poll, mio::Events::with_capacity(1))),
        })
    }
}

impl EventWaiter for X11Waiter {
    fn wait(&self, timeout: Duration) -> Result<bool> {
        let mut guard = self
            .poll
            .lock()
            .map_err(|_| ToolkitError::ConnectionLost)?;
        let (poll, events) = &mut *guard;
        match poll.poll(events, Some(timeout)) {
            Ok(()) => Ok(!events.is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(false),
            Err(e) => Err(ToolkitError::transport(e.to_string())),
        }
    }
}
