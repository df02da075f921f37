//! Widget-level events
//!
//! Protocol events are resolved to a target widget and reshaped into
//! [`WidgetEvent`]s before they reach a [`WidgetHandler`](super::WidgetHandler).

use crate::geometry::Rect;
use crate::transport::{ButtonEvent, CrossingEvent, KeyEvent, PointerEvent};

use super::WidgetId;

/// Wheel notch size passed to wheel handlers
pub const WHEEL_DELTA: i32 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    ButtonPress(ButtonEvent),
    ButtonRelease(ButtonEvent),
    /// Second press of the same button within the double-click interval
    ButtonDoubleClick(ButtonEvent),
    /// Wheel notch; `delta` is `+WHEEL_DELTA` for up, `-WHEEL_DELTA` for down
    Wheel { event: ButtonEvent, delta: i32 },
    Motion(PointerEvent),
    /// `child` is the child widget the pointer came from, if any
    Enter {
        child: Option<WidgetId>,
        event: CrossingEvent,
    },
    Leave {
        child: Option<WidgetId>,
        event: CrossingEvent,
    },
    KeyPress(KeyEvent),
    KeyRelease(KeyEvent),
    /// Focus arrived; carries the widget that had it before
    FocusIn(Option<WidgetId>),
    /// Focus left; carries the widget receiving it
    FocusOut(Option<WidgetId>),
    MapStateChanged(bool),
    /// New parent-relative bounds
    MoveResize(Rect),
    SensitivityChanged(bool),
}

impl WidgetEvent {
    /// Client-side enter with no server crossing behind it
    pub fn synthetic_enter() -> Self {
        Self::Enter {
            child: None,
            event: CrossingEvent::synthetic(),
        }
    }

    pub fn synthetic_leave() -> Self {
        Self::Leave {
            child: None,
            event: CrossingEvent::synthetic(),
        }
    }

    /// Keyboard and wheel input is dropped for insensitive widgets
    pub fn requires_sensitivity(&self) -> bool {
        matches!(
            self,
            Self::KeyPress(_) | Self::KeyRelease(_) | Self::Wheel { .. }
        )
    }

    /// Same event with its window-relative pointer position replaced
    pub fn at(&self, x: i32, y: i32) -> Self {
        let mut event = self.clone();
        match &mut event {
            Self::ButtonPress(e)
            | Self::ButtonRelease(e)
            | Self::ButtonDoubleClick(e)
            | Self::Wheel { event: e, .. } => {
                e.pointer.x = x;
                e.pointer.y = y;
            }
            Self::Motion(p) => {
                p.x = x;
                p.y = y;
            }
            Self::Enter { event: c, .. } | Self::Leave { event: c, .. } => {
                c.x = x;
                c.y = y;
            }
            _ => {}
        }
        event
    }
}
