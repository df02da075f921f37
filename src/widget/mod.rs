//! Widget Tree
//!
//! Widgets live in an arena owned by the display ([`WidgetTree`]) and are
//! addressed by generational [`WidgetId`]s, so a stale id left in a pending
//! list or captured by a callback resolves to "destroyed" instead of a
//! different widget.
//!
//! What a widget can do is decided by its [`Capabilities`] rather than by a
//! type hierarchy: an input-only widget has none, a paintable widget has
//! `PAINTABLE`, top-level windows and popups add `TOP_LEVEL` or `POPUP`.

pub mod event;
pub mod handler;
pub mod tree;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::damage::DamageState;
use crate::geometry::Rect;
use crate::transport::{Background, Button, Timestamp, WindowHandle};

pub use event::WidgetEvent;
pub use handler::{NullHandler, WidgetHandler};
pub use tree::{Restack, WidgetTree};

/// Stable widget address: arena slot plus the slot's generation at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId {
    index: u32,
    generation: u32,
}

impl WidgetId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

bitflags! {
    /// What a widget is allowed to do
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Has its own pixels: receives exposes, takes part in damage
        const PAINTABLE         = 1 << 0;
        /// Managed top-level window; owns a focus scope
        const TOP_LEVEL         = 1 << 1;
        /// Override-redirect popup routed through the grab catcher
        const POPUP             = 1 << 2;
        /// Root window of a screen
        const ROOT              = 1 << 3;
        /// Off-screen window that owns the popup grab
        const GRAB_CATCHER      = 1 << 4;
        /// Bypass the window manager
        const OVERRIDE_REDIRECT = 1 << 5;
    }
}

impl Capabilities {
    /// Widgets that track keyboard focus for their subtree
    pub fn is_focus_scope(self) -> bool {
        self.intersects(Self::TOP_LEVEL | Self::POPUP)
    }
}

/// Construction parameters
#[derive(Debug, Clone)]
pub struct WidgetOptions {
    /// Position relative to the parent, and size
    pub bounds: Rect,
    pub layer: i32,
    pub capabilities: Capabilities,
    pub background: Background,
    pub foreground: u32,
    pub title: Option<String>,
    /// Map new children at construction (always true for roots)
    pub auto_map_children: bool,
    pub focusable: bool,
    /// Clear the background before repainting invalidated areas
    pub draw_background: bool,
}

impl WidgetOptions {
    /// Input-only widget
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            layer: 0,
            capabilities: Capabilities::empty(),
            background: Background::ParentRelative,
            foreground: 0,
            title: None,
            auto_map_children: true,
            focusable: true,
            draw_background: true,
        }
    }

    /// Input-output widget with its own background
    pub fn paintable(bounds: Rect) -> Self {
        Self::new(bounds).with_capabilities(Capabilities::PAINTABLE)
    }

    pub fn top_level(bounds: Rect, title: impl Into<String>) -> Self {
        let mut options =
            Self::paintable(bounds).with_capabilities(Capabilities::TOP_LEVEL);
        options.title = Some(title.into());
        options
    }

    pub fn popup(bounds: Rect) -> Self {
        Self::paintable(bounds)
            .with_capabilities(Capabilities::POPUP | Capabilities::OVERRIDE_REDIRECT)
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities |= capabilities;
        self
    }

    pub fn with_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    pub fn with_foreground(mut self, pixel: u32) -> Self {
        self.foreground = pixel;
        self
    }

    pub fn with_auto_map_children(mut self, auto_map: bool) -> Self {
        self.auto_map_children = auto_map;
        self
    }

    pub fn with_focusable(mut self, focusable: bool) -> Self {
        self.focusable = focusable;
        self
    }

    pub fn with_draw_background(mut self, draw: bool) -> Self {
        self.draw_background = draw;
        self
    }
}

/// Keyboard focus bookkeeping of a top-level or popup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FocusState {
    /// The server gave this window the input focus
    pub primary: bool,
    /// Widget receiving key events inside the scope
    pub focus_widget: Option<WidgetId>,
    /// Widget that takes the focus when the scope gains primary focus
    pub default_focus: Option<WidgetId>,
}

/// Last press, for double-click detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClickState {
    pub button: Option<Button>,
    pub time: Timestamp,
}

/// One widget in the arena
pub struct WidgetNode {
    pub(crate) id: WidgetId,
    pub(crate) handle: WindowHandle,
    pub(crate) screen: usize,
    /// Parent-relative position and size
    pub(crate) bounds: Rect,
    pub(crate) layer: i32,
    pub(crate) mapped: bool,
    pub(crate) sensitive: bool,
    pub(crate) ancestor_sensitive: bool,
    pub(crate) capabilities: Capabilities,
    pub(crate) focusable: bool,
    pub(crate) auto_map_children: bool,
    pub(crate) draw_background: bool,
    pub(crate) background: Background,
    pub(crate) foreground: u32,

    pub(crate) parent: Option<WidgetId>,
    /// Topmost child; lower children hang off `next_below`
    pub(crate) top_child: Option<WidgetId>,
    pub(crate) next_above: Option<WidgetId>,
    pub(crate) next_below: Option<WidgetId>,

    pub(crate) handler: Arc<dyn WidgetHandler>,
    pub(crate) damage: DamageState,
    pub(crate) focus: Option<FocusState>,
    pub(crate) click: ClickState,
}

impl WidgetNode {
    pub(crate) fn new(
        handle: WindowHandle,
        screen: usize,
        options: &WidgetOptions,
        handler: Arc<dyn WidgetHandler>,
    ) -> Self {
        let capabilities = options.capabilities;
        Self {
            id: WidgetId::new(0, 0),
            handle,
            screen,
            bounds: options.bounds,
            layer: options.layer,
            mapped: false,
            sensitive: true,
            ancestor_sensitive: true,
            capabilities,
            focusable: options.focusable,
            auto_map_children: options.auto_map_children
                || capabilities.contains(Capabilities::ROOT),
            draw_background: options.draw_background,
            background: options.background,
            foreground: options.foreground,
            parent: None,
            top_child: None,
            next_above: None,
            next_below: None,
            handler,
            damage: DamageState::Idle,
            focus: None,
            click: ClickState::default(),
        }
    }

    pub fn id(&self) -> WidgetId {
        self.id
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    pub fn screen(&self) -> usize {
        self.screen
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn layer(&self) -> i32 {
        self.layer
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn parent(&self) -> Option<WidgetId> {
        self.parent
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Sensitive and every ancestor sensitive
    pub fn is_fully_sensitive(&self) -> bool {
        self.sensitive && self.ancestor_sensitive
    }

    pub fn is_paintable(&self) -> bool {
        self.capabilities.contains(Capabilities::PAINTABLE)
    }

    pub fn is_root(&self) -> bool {
        self.capabilities.contains(Capabilities::ROOT)
    }

    pub(crate) fn handler(&self) -> Arc<dyn WidgetHandler> {
        self.handler.clone()
    }
}

impl fmt::Debug for WidgetNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetNode")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("bounds", &self.bounds)
            .field("layer", &self.layer)
            .field("mapped", &self.mapped)
            .field("capabilities", &self.capabilities)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}
