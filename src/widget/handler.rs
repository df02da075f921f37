//! Widget override points
//!
//! A widget's behaviour is a [`WidgetHandler`] shared with the display. The
//! display always calls handlers with its lock released, so a handler may
//! call back into the [`Display`] freely, including destroying the widget it
//! was called for.

use crate::display::Display;
use crate::error::Result;
use crate::geometry::Rect;
use crate::paint::Painter;
use crate::transport::{ButtonEvent, CrossingEvent, KeyEvent, PointerEvent};

use super::{WidgetEvent, WidgetId};

/// Every method has a do-nothing default.
pub trait WidgetHandler: Send + Sync {
    /// Repaint the area in `painter.clip()`. Only called for paintable widgets.
    fn on_paint(&self, _painter: &mut Painter<'_>) -> Result<()> {
        Ok(())
    }

    fn on_move_resize(&self, _display: &Display, _widget: WidgetId, _bounds: Rect) -> Result<()> {
        Ok(())
    }

    fn on_map_state_changed(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _mapped: bool,
    ) -> Result<()> {
        Ok(())
    }

    fn on_sensitivity_changed(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _sensitive: bool,
    ) -> Result<()> {
        Ok(())
    }

    fn on_enter(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _child: Option<WidgetId>,
        _event: &CrossingEvent,
    ) -> Result<()> {
        Ok(())
    }

    fn on_leave(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _child: Option<WidgetId>,
        _event: &CrossingEvent,
    ) -> Result<()> {
        Ok(())
    }

    fn on_button_press(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _event: &ButtonEvent,
    ) -> Result<()> {
        Ok(())
    }

    fn on_button_release(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _event: &ButtonEvent,
    ) -> Result<()> {
        Ok(())
    }

    fn on_button_double_click(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _event: &ButtonEvent,
    ) -> Result<()> {
        Ok(())
    }

    /// Return `true` when the wheel notch was consumed; `false` passes it to
    /// the parent.
    fn on_button_wheel(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _event: &ButtonEvent,
        _delta: i32,
    ) -> Result<bool> {
        Ok(true)
    }

    fn on_pointer_motion(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _event: &PointerEvent,
    ) -> Result<()> {
        Ok(())
    }

    /// Return `true` when the key was consumed; `false` passes it to the
    /// parent.
    fn on_key_press(&self, _display: &Display, _widget: WidgetId, _event: &KeyEvent) -> Result<bool> {
        Ok(false)
    }

    fn on_key_release(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _event: &KeyEvent,
    ) -> Result<bool> {
        Ok(false)
    }

    fn on_focus_in(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _previous: Option<WidgetId>,
    ) -> Result<()> {
        Ok(())
    }

    fn on_focus_out(
        &self,
        _display: &Display,
        _widget: WidgetId,
        _next: Option<WidgetId>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Handler with no behaviour (roots, the grab catcher, plain containers)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHandler;

impl WidgetHandler for NullHandler {}

/// Call the override point matching `event`.
///
/// Returns whether a key or wheel event was consumed; other events report
/// `true`.
pub(crate) fn deliver(
    handler: &dyn WidgetHandler,
    display: &Display,
    widget: WidgetId,
    event: &WidgetEvent,
) -> Result<bool> {
    match event {
        WidgetEvent::ButtonPress(e) => handler.on_button_press(display, widget, e)?,
        WidgetEvent::ButtonRelease(e) => handler.on_button_release(display, widget, e)?,
        WidgetEvent::ButtonDoubleClick(e) => handler.on_button_double_click(display, widget, e)?,
        WidgetEvent::Wheel { event, delta } => {
            return handler.on_button_wheel(display, widget, event, *delta);
        }
        WidgetEvent::Motion(e) => handler.on_pointer_motion(display, widget, e)?,
        WidgetEvent::Enter { child, event } => handler.on_enter(display, widget, *child, event)?,
        WidgetEvent::Leave { child, event } => handler.on_leave(display, widget, *child, event)?,
        WidgetEvent::KeyPress(e) => return handler.on_key_press(display, widget, e),
        WidgetEvent::KeyRelease(e) => return handler.on_key_release(display, widget, e),
        WidgetEvent::FocusIn(previous) => handler.on_focus_in(display, widget, *previous)?,
        WidgetEvent::FocusOut(next) => handler.on_focus_out(display, widget, *next)?,
        WidgetEvent::MapStateChanged(mapped) => {
            handler.on_map_state_changed(display, widget, *mapped)?
        }
        WidgetEvent::MoveResize(bounds) => handler.on_move_resize(display, widget, *bounds)?,
        WidgetEvent::SensitivityChanged(sensitive) => {
            handler.on_sensitivity_changed(display, widget, *sensitive)?
        }
    }
    Ok(true)
}
