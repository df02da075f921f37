//! Event loop
//!
//! One iteration:
//!
//! 1. flush pending invalidates (background clears come back as exposes)
//! 2. flush the outgoing request buffer
//! 3. stop if a quit was requested
//! 4. dispatch one queued protocol event
//! 5. otherwise drain the expose list
//! 6. otherwise wait for input, bounded by the next timer deadline
//! 7. fire the timers that came due
//!
//! The lock is released while waiting and while any handler, paint callback
//! or timer callback runs.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::error::{Result, ToolkitError};
use crate::region::Region;
use crate::transport::ProtocolEvent;
use crate::widget::WidgetId;

use super::{Display, DisplayState};

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    /// A quit was requested
    Quit,
    /// A protocol event was dispatched or repaints were done
    Regular,
    /// One or more timers fired
    Timer,
    /// Nothing was ready
    NoEvent,
}

impl Display {
    /// Run one loop iteration. With `wait` the call blocks until input
    /// arrives or the next timer is due.
    pub fn handle_next_event(&self, wait: bool) -> Result<LoopEvent> {
        {
            let mut state = self.lock()?;
            state.flush_invalidates()?;
            state.flush_transport()?;
            if state.quit {
                return Ok(LoopEvent::Quit);
            }
        }

        if let Some(event) = self.poll_event()? {
            self.dispatch(event)?;
            return Ok(LoopEvent::Regular);
        }

        if self.lock()?.damage.has_exposes() {
            self.drain_exposes()?;
            return Ok(LoopEvent::Regular);
        }

        if wait {
            let (timeout, has_timers) = {
                let state = self.lock()?;
                let options = state.options;
                match state.timers.next_timeout(Instant::now()) {
                    Some(next) => (next.min(options.max_wait), true),
                    None => (options.idle_wait, false),
                }
            };
            if self.waiter().wait(timeout)? {
                if let Some(event) = self.poll_event()? {
                    self.dispatch(event)?;
                    return Ok(LoopEvent::Regular);
                }
            }
            if !has_timers {
                return Ok(LoopEvent::Regular);
            }
        }

        if self.fire_timers()? {
            Ok(LoopEvent::Timer)
        } else {
            Ok(LoopEvent::NoEvent)
        }
    }

    /// Run iterations until a quit is requested. The quit request is
    /// consumed, so the loop can be entered again.
    pub fn run(&self) -> Result<()> {
        info!("Entering event loop");
        while self.handle_next_event(true)? != LoopEvent::Quit {}
        self.lock()?.quit = false;
        info!("Event loop finished");
        Ok(())
    }

    /// Block for and handle one iteration
    pub fn wait_for_event(&self) -> Result<LoopEvent> {
        self.handle_next_event(true)
    }

    /// Handle everything that is ready without blocking
    pub fn process_pending_events(&self) -> Result<()> {
        loop {
            match self.handle_next_event(false)? {
                LoopEvent::NoEvent | LoopEvent::Quit => return Ok(()),
                LoopEvent::Regular | LoopEvent::Timer => {}
            }
        }
    }

    fn poll_event(&self) -> Result<Option<ProtocolEvent>> {
        self.lock()?.transport.poll_event()
    }

    /// Paint every widget on the expose list once
    fn drain_exposes(&self) -> Result<()> {
        loop {
            let next = self.lock()?.next_expose()?;
            let Some((widget, clip)) = next else {
                return Ok(());
            };
            match self.paint_widget(widget, clip) {
                Err(ToolkitError::WidgetDestroyed(gone)) => {
                    debug!("Widget {} destroyed during repaint of {}", gone, widget);
                }
                other => other?,
            }
        }
    }

    /// Fire every timer due at the start of the call. Returns whether any fired.
    fn fire_timers(&self) -> Result<bool> {
        let now = Instant::now();
        let mut fired = false;
        loop {
            let Some((id, mut callback)) = self.lock()?.timers.pop_due(now) else {
                return Ok(fired);
            };
            trace!("Timer {:?} fired", id);
            let result = callback(self);
            self.lock()?.timers.finish(id, callback, now);
            result?;
            fired = true;
        }
    }

    /// Time until the next timer deadline
    pub fn next_timer_timeout(&self) -> Result<Option<Duration>> {
        Ok(self.lock()?.timers.next_timeout(Instant::now()))
    }
}

impl DisplayState {
    /// Empty the invalidate list, clearing backgrounds on the server
    pub(crate) fn flush_invalidates(&mut self) -> Result<()> {
        if !self.damage.has_invalidates() {
            return Ok(());
        }
        let clears = self.damage.flush_invalidates(&mut self.tree)?;
        for clear in clears {
            trace!(
                "Clearing {} rect(s) of widget {}",
                clear.rects.len(),
                clear.widget
            );
            for rect in clear.rects {
                self.transport.clear_area(clear.window, rect, true)?;
            }
        }
        Ok(())
    }

    pub(crate) fn next_expose(&mut self) -> Result<Option<(WidgetId, Region)>> {
        self.damage.next_expose(&mut self.tree)
    }
}
