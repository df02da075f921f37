//! Display Connection
//!
//! A [`Display`] owns the transport, the widget arena, the damage lists, the
//! timer queue and one grab router per screen, all behind a single mutex.
//!
//! Handlers are never called with the mutex held: every operation computes
//! the notifications it causes while locked, releases the lock, and only
//! then runs them. A handler can therefore call back into the display, even
//! to destroy the widget it is running for; anything that went stale in the
//! meantime is skipped at delivery time.

mod dispatch;
pub mod event_loop;
mod popup;
mod widgets;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::damage::DamageQueues;
use crate::error::{Result, ToolkitError};
use crate::geometry::Rect;
use crate::grab::GrabRouter;
use crate::timer::{TimerId, TimerQueue};
use crate::transport::x11::X11Transport;
use crate::transport::{
    Atom, Button, EventWaiter, ModifierMask, ScreenInfo, Timestamp, Transport, CURRENT_TIME,
};
use crate::widget::{Capabilities, NullHandler, WidgetId, WidgetNode, WidgetOptions, WidgetTree};

pub(crate) use dispatch::Delivery;
pub use event_loop::LoopEvent;

/// Atom naming the client message that carries a [`Display::begin_invoke`] call
const INVOKE_ATOM: &str = "_AREA_TOOLKIT_BEGIN_INVOKE";

pub(crate) type TimerCallback = Box<dyn FnMut(&Display) -> Result<()> + Send>;
pub(crate) type InvokeCallback = Box<dyn FnOnce(&Display) -> Result<()> + Send>;

/// Connection tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Largest gap between two presses that still counts as a double click
    pub double_click: Duration,
    /// Wait cap while no timer is armed
    pub idle_wait: Duration,
    /// Wait cap while the next timer is far away
    pub max_wait: Duration,
    /// Round-trip on every flush so server errors surface immediately
    pub synchronous: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            double_click: Duration::from_millis(500),
            idle_wait: Duration::from_millis(100),
            max_wait: Duration::from_secs(100),
            synchronous: false,
        }
    }
}

/// Per-screen bookkeeping
pub(crate) struct ScreenState {
    pub(crate) info: ScreenInfo,
    pub(crate) root: WidgetId,
    /// Created the first time a popup is mapped on this screen
    pub(crate) catcher: Option<WidgetId>,
    pub(crate) grab: GrabRouter,
}

/// Everything guarded by the connection lock
pub(crate) struct DisplayState {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) closed: bool,
    pub(crate) quit: bool,
    pub(crate) options: DisplayOptions,
    pub(crate) screens: Vec<ScreenState>,
    pub(crate) tree: WidgetTree,
    pub(crate) damage: DamageQueues,
    pub(crate) timers: TimerQueue<TimerCallback>,
    pub(crate) invokes: HashMap<u32, (WidgetId, InvokeCallback)>,
    pub(crate) next_invoke: u32,
    pub(crate) invoke_atom: Atom,
    pub(crate) button_count: u8,
    /// Server time of the last event that carried one
    pub(crate) known_event_time: Timestamp,
}

struct DisplayInner {
    state: Mutex<DisplayState>,
    /// Kept outside the mutex so a blocked wait never holds the lock
    waiter: Arc<dyn EventWaiter>,
}

/// Shared handle to one display connection
#[derive(Clone)]
pub struct Display {
    inner: Arc<DisplayInner>,
}

impl Display {
    /// Open a display over an already connected transport.
    ///
    /// A root widget is registered for every screen the transport reports.
    pub fn open(mut transport: Box<dyn Transport>, options: DisplayOptions) -> Result<Self> {
        let infos = transport.screens();
        if infos.is_empty() {
            return Err(ToolkitError::CannotConnect(
                "display server reported no screens".into(),
            ));
        }
        let invoke_atom = transport.intern_atom(INVOKE_ATOM)?;
        let button_count = transport.pointer_button_count()?;
        let waiter = transport.waiter();

        let mut tree = WidgetTree::new();
        let mut screens = Vec::with_capacity(infos.len());
        for (index, info) in infos.into_iter().enumerate() {
            let options = WidgetOptions::new(Rect::sized(info.width, info.height))
                .with_capabilities(Capabilities::ROOT);
            let mut node = WidgetNode::new(info.root, index, &options, Arc::new(NullHandler));
            node.mapped = true;
            let (root, _) = tree.insert(node, None)?;
            debug!(
                "Screen {}: root 0x{:x} ({}x{})",
                index, info.root, info.width, info.height
            );
            screens.push(ScreenState {
                info,
                root,
                catcher: None,
                grab: GrabRouter::new(),
            });
        }
        info!(
            "Display opened with {} screen(s), {} pointer buttons",
            screens.len(),
            button_count
        );

        Ok(Self {
            inner: Arc::new(DisplayInner {
                state: Mutex::new(DisplayState {
                    transport,
                    closed: false,
                    quit: false,
                    options,
                    screens,
                    tree,
                    damage: DamageQueues::new(),
                    timers: TimerQueue::new(),
                    invokes: HashMap::new(),
                    next_invoke: 1,
                    invoke_atom,
                    button_count,
                    known_event_time: CURRENT_TIME,
                }),
                waiter,
            }),
        })
    }

    /// Connect to an X server (`None` uses `$DISPLAY`)
    pub fn connect(name: Option<&str>, options: DisplayOptions) -> Result<Self> {
        let transport = X11Transport::connect(name)?;
        Self::open(Box::new(transport), options)
    }

    /// Take the connection lock. Fails once the display has been closed.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, DisplayState>> {
        let guard = self.lock_any();
        if guard.closed {
            return Err(ToolkitError::ConnectionLost);
        }
        Ok(guard)
    }

    fn lock_any(&self) -> MutexGuard<'_, DisplayState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn waiter(&self) -> &Arc<dyn EventWaiter> {
        &self.inner.waiter
    }

    /// Both handles refer to the same connection
    pub fn same_connection(&self, other: &Display) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn options(&self) -> Result<DisplayOptions> {
        Ok(self.lock()?.options)
    }

    pub fn is_closed(&self) -> bool {
        self.lock_any().closed
    }

    pub fn screen_count(&self) -> Result<usize> {
        Ok(self.lock()?.screens.len())
    }

    pub fn screen(&self, index: usize) -> Result<ScreenInfo> {
        Ok(self.lock()?.screen(index)?.info)
    }

    /// Root widget of a screen
    pub fn root(&self, screen: usize) -> Result<WidgetId> {
        Ok(self.lock()?.screen(screen)?.root)
    }

    pub fn default_root(&self) -> Result<WidgetId> {
        self.root(0)
    }

    /// Server time of the last event that carried one, or `CURRENT_TIME`
    pub fn known_event_time(&self) -> Result<Timestamp> {
        Ok(self.lock()?.known_event_time)
    }

    /// Push buffered requests to the server
    pub fn flush(&self) -> Result<()> {
        self.lock()?.flush_transport()
    }

    /// Wait until the server has processed every request
    pub fn sync(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.transport.sync()
    }

    /// Ask the event loop to stop at its next iteration
    pub fn quit(&self) -> Result<()> {
        self.lock()?.quit = true;
        debug!("Event loop quit requested");
        Ok(())
    }

    /// Disassociate every widget, then release the transport. Later calls
    /// on this display fail with `ConnectionLost`.
    pub fn close(&self) -> Result<()> {
        // Handlers of removed widgets drop after the lock is released
        let _removed = {
            let mut state = self.lock_any();
            if state.closed {
                return Ok(());
            }
            let roots: Vec<WidgetId> = state.screens.iter().map(|s| s.root).collect();
            for root in &roots {
                state.tree.get(*root)?;
            }
            let mut removed = Vec::new();
            for root in roots {
                removed.extend(state.tree.remove(root)?);
            }
            state.damage = DamageQueues::new();
            state.timers = TimerQueue::new();
            state.invokes.clear();
            state.transport.close();
            state.closed = true;
            info!("Display closed, {} widget(s) disassociated", removed.len());
            removed
        };
        Ok(())
    }

    // Buttons

    /// Button that selects things
    pub fn select_button(&self) -> Button {
        Button::LEFT
    }

    /// Button that opens context menus: the right button, or the middle one
    /// on two-button pointers
    pub fn menu_button(&self) -> Result<Button> {
        Ok(if self.lock()?.button_count >= 3 {
            Button::RIGHT
        } else {
            Button::MIDDLE
        })
    }

    pub fn is_select(&self, button: Button) -> bool {
        button == self.select_button()
    }

    pub fn is_menu(&self, button: Button) -> Result<bool> {
        Ok(button == self.menu_button()?)
    }

    /// Select button held in a modifier state
    pub fn is_select_state(&self, state: ModifierMask) -> bool {
        state.contains(self.select_button().mask())
    }

    /// Menu button held in a modifier state
    pub fn is_menu_state(&self, state: ModifierMask) -> Result<bool> {
        Ok(state.contains(self.menu_button()?.mask()))
    }

    // Timers

    /// Arm a timer `due` from now. With a `period` it keeps firing every
    /// period until stopped; without one it fires once.
    pub fn add_timer<F>(&self, due: Duration, period: Option<Duration>, callback: F) -> Result<TimerId>
    where
        F: FnMut(&Display) -> Result<()> + Send + 'static,
    {
        check_period(period)?;
        let mut state = self.lock()?;
        Ok(state
            .timers
            .insert(Instant::now() + due, period, Box::new(callback)))
    }

    /// Reschedule a timer. Returns false if it already retired.
    pub fn change_timer(&self, id: TimerId, due: Duration, period: Option<Duration>) -> Result<bool> {
        check_period(period)?;
        let mut state = self.lock()?;
        Ok(state.timers.change(id, Instant::now() + due, period))
    }

    pub fn stop_timer(&self, id: TimerId) -> Result<bool> {
        Ok(self.lock()?.timers.stop(id))
    }

    // Cross-thread calls

    /// Run `callback` on the event loop thread.
    ///
    /// Callable from any thread: the call is posted to the widget's window as
    /// a client message, which also wakes a loop blocked in its wait. The
    /// callback is dropped unrun if the widget is destroyed first.
    pub fn begin_invoke<F>(&self, widget: WidgetId, callback: F) -> Result<()>
    where
        F: FnOnce(&Display) -> Result<()> + Send + 'static,
    {
        let mut state = self.lock()?;
        let window = state.tree.get(widget)?.handle;
        let id = state.next_invoke;
        state.next_invoke = state.next_invoke.wrapping_add(1).max(1);
        state.invokes.insert(id, (widget, Box::new(callback)));
        let atom = state.invoke_atom;
        state
            .transport
            .send_client_message(window, atom, [id, 0, 0, 0, 0])?;
        state.transport.flush()
    }
}

fn check_period(period: Option<Duration>) -> Result<()> {
    if period.is_some_and(|p| p.is_zero()) {
        return Err(ToolkitError::invalid_argument("timer period must be positive"));
    }
    Ok(())
}

impl DisplayState {
    pub(crate) fn screen(&self, index: usize) -> Result<&ScreenState> {
        self.screens
            .get(index)
            .ok_or_else(|| ToolkitError::invalid_argument(format!("no screen {}", index)))
    }

    /// Flush, or round-trip in synchronous mode
    pub(crate) fn flush_transport(&mut self) -> Result<()> {
        if self.options.synchronous {
            self.transport.sync()
        } else {
            self.transport.flush()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::recording::RecordingTransport;

    fn open() -> (Display, crate::transport::recording::RecordingHandle) {
        let (transport, handle) = RecordingTransport::new();
        let display = Display::open(Box::new(transport), DisplayOptions::default()).unwrap();
        (display, handle)
    }

    #[test]
    fn test_open_registers_screen_roots() {
        let (display, _) = open();
        assert_eq!(display.screen_count().unwrap(), 1);
        let root = display.default_root().unwrap();
        assert_eq!(display.bounds(root).unwrap(), Rect::sized(1024, 768));
        assert!(display.is_mapped(root).unwrap());
        assert!(display.screen(1).is_err());
    }

    #[test]
    fn test_menu_button_depends_on_pointer() {
        let (display, _) = open();
        assert_eq!(display.menu_button().unwrap(), Button::RIGHT);
        assert!(display.is_select_state(ModifierMask::BUTTON1 | ModifierMask::SHIFT));
        assert!(!display.is_menu_state(ModifierMask::BUTTON2).unwrap());

        let (transport, handle) = RecordingTransport::new();
        handle.set_button_count(2);
        let display = Display::open(Box::new(transport), DisplayOptions::default()).unwrap();
        assert_eq!(display.menu_button().unwrap(), Button::MIDDLE);
        assert!(display.is_menu(Button::MIDDLE).unwrap());
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let (display, _) = open();
        let err = display
            .add_timer(Duration::ZERO, Some(Duration::ZERO), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, ToolkitError::InvalidArgument(_)));
    }

    #[test]
    fn test_close_is_final() {
        let (display, handle) = open();
        let root = display.default_root().unwrap();
        display.close().unwrap();
        assert!(handle.is_closed());
        assert!(display.is_closed());
        assert_eq!(display.bounds(root), Err(ToolkitError::ConnectionLost));
        assert_eq!(display.flush(), Err(ToolkitError::ConnectionLost));
        display.close().unwrap();
    }

    #[test]
    fn test_failed_close_leaves_display_open() {
        let (display, handle) = open();
        let root = display.default_root().unwrap();
        display.lock().unwrap().tree.remove(root).unwrap();

        assert!(display.close().is_err());
        assert!(!display.is_closed());
        assert!(!handle.is_closed());
        display.flush().unwrap();
    }
}
