//! area-toolkit
//!
//! Client-side windowing core for X11: a tree of widgets mapped onto server
//! windows, damage tracking that turns exposes and invalidates into clipped
//! repaints, popup grabs routed through an off-screen catcher window, and a
//! single-threaded event loop with timers.
//!
//! Everything hangs off a [`Display`]. Widgets are created with
//! [`Display::create_widget`] and given behaviour through a
//! [`WidgetHandler`]; the loop is driven with [`Display::run`] or
//! [`Display::handle_next_event`].

pub mod config;
pub mod damage;
pub mod display;
pub mod error;
pub mod geometry;
pub mod grab;
pub mod paint;
pub mod region;
pub mod timer;
pub mod transport;
pub mod widget;

pub use display::{Display, DisplayOptions, LoopEvent};
pub use error::{Result, ToolkitError};
pub use geometry::{Point, Rect};
pub use paint::Painter;
pub use region::Region;
pub use timer::TimerId;
pub use transport::{Background, Button, ButtonEvent, CrossingEvent, KeyEvent, PointerEvent};
pub use widget::{Capabilities, WidgetEvent, WidgetHandler, WidgetId, WidgetOptions};
