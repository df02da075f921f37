//! Widget operations
//!
//! The imperative widget API: creation and destruction, mapping, geometry,
//! stacking, sensitivity, focus and repainting. Each call validates its
//! arguments before any request reaches the server.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::damage::clip_to_widget;
use crate::error::{Result, ToolkitError};
use crate::geometry::{validate_bounds, validate_position, validate_size, Point, Rect};
use crate::paint::Painter;
use crate::region::Region;
use crate::transport::{
    Background, EventMask, WindowChanges, WindowClass, WindowHandle, WindowSpec,
};
use crate::widget::{
    Capabilities, FocusState, Restack, WidgetEvent, WidgetHandler, WidgetId, WidgetNode,
    WidgetOptions,
};

use super::{Delivery, Display, DisplayState};

/// Input every widget listens for
const BASE_EVENTS: EventMask = EventMask::BUTTON_PRESS
    .union(EventMask::BUTTON_RELEASE)
    .union(EventMask::POINTER_MOTION)
    .union(EventMask::ENTER_WINDOW)
    .union(EventMask::LEAVE_WINDOW)
    .union(EventMask::KEY_PRESS)
    .union(EventMask::KEY_RELEASE);

fn event_mask(capabilities: Capabilities) -> EventMask {
    let mut mask = BASE_EVENTS;
    if capabilities.contains(Capabilities::PAINTABLE) {
        mask |= EventMask::EXPOSURE;
    }
    if capabilities.contains(Capabilities::TOP_LEVEL) {
        mask |= EventMask::STRUCTURE_NOTIFY | EventMask::FOCUS_CHANGE | EventMask::PROPERTY_CHANGE;
    }
    mask
}

impl Display {
    /// Create a widget under `parent`.
    ///
    /// Top-levels and popups must be children of a root and start unmapped;
    /// other widgets are mapped straight away when the parent auto-maps its
    /// children. No handler is called during creation.
    pub fn create_widget(
        &self,
        parent: WidgetId,
        options: WidgetOptions,
        handler: Arc<dyn WidgetHandler>,
    ) -> Result<WidgetId> {
        validate_bounds(&options.bounds)?;
        let mut state = self.lock()?;
        state.create_widget(parent, options, handler)
    }

    /// Destroy a widget and everything below it
    pub fn destroy(&self, widget: WidgetId) -> Result<()> {
        let (deliveries, _removed) = {
            let mut state = self.lock()?;
            state.destroy_widget(widget)?
        };
        self.run_deliveries(deliveries)
    }

    pub fn map(&self, widget: WidgetId) -> Result<()> {
        let deliveries = self.lock()?.map_widget(widget)?;
        self.run_deliveries(deliveries)
    }

    pub fn unmap(&self, widget: WidgetId) -> Result<()> {
        let deliveries = self.lock()?.unmap_widget(widget)?;
        self.run_deliveries(deliveries)
    }

    /// Change position and size in one request
    pub fn move_resize(&self, widget: WidgetId, bounds: Rect) -> Result<()> {
        validate_bounds(&bounds)?;
        let deliveries = self.lock()?.move_resize(widget, bounds)?;
        self.run_deliveries(deliveries)
    }

    pub fn move_to(&self, widget: WidgetId, x: i32, y: i32) -> Result<()> {
        validate_position(x, y)?;
        let bounds = self.bounds(widget)?;
        self.move_resize(widget, Rect::new(x, y, bounds.width, bounds.height))
    }

    pub fn resize(&self, widget: WidgetId, width: i32, height: i32) -> Result<()> {
        validate_size(width, height)?;
        let bounds = self.bounds(widget)?;
        self.move_resize(widget, Rect::new(bounds.x, bounds.y, width, height))
    }

    // Stacking

    /// Top of the widget's layer
    pub fn raise(&self, widget: WidgetId) -> Result<()> {
        let mut state = self.lock()?;
        let restack = state.tree.raise(widget)?;
        state.apply_restack(restack)
    }

    /// Bottom of the widget's layer
    pub fn lower(&self, widget: WidgetId) -> Result<()> {
        let mut state = self.lock()?;
        let restack = state.tree.lower(widget)?;
        state.apply_restack(restack)
    }

    /// Directly above `sibling`; ignored unless both share a layer
    pub fn move_to_above(&self, widget: WidgetId, sibling: WidgetId) -> Result<()> {
        let mut state = self.lock()?;
        let restack = state.tree.move_to_above(widget, sibling)?;
        state.apply_restack(restack)
    }

    /// Directly below `sibling`; ignored unless both share a layer
    pub fn move_to_below(&self, widget: WidgetId, sibling: WidgetId) -> Result<()> {
        let mut state = self.lock()?;
        let restack = state.tree.move_to_below(widget, sibling)?;
        state.apply_restack(restack)
    }

    pub fn layer(&self, widget: WidgetId) -> Result<i32> {
        Ok(self.lock()?.tree.get(widget)?.layer)
    }

    pub fn set_layer(&self, widget: WidgetId, layer: i32) -> Result<()> {
        let mut state = self.lock()?;
        let restack = state.tree.set_layer(widget, layer)?;
        state.apply_restack(restack)
    }

    /// Move under `parent` at `(x, y)`, keeping the layer
    pub fn reparent(&self, widget: WidgetId, parent: WidgetId, x: i32, y: i32) -> Result<()> {
        validate_position(x, y)?;
        let deliveries = self.lock()?.reparent(widget, parent, x, y)?;
        self.run_deliveries(deliveries)
    }

    // Sensitivity

    pub fn set_sensitive(&self, widget: WidgetId, sensitive: bool) -> Result<()> {
        let changes = self.lock()?.tree.set_sensitive(widget, sensitive)?;
        self.run_deliveries(sensitivity_deliveries(changes))
    }

    /// The widget's own flag
    pub fn is_sensitive(&self, widget: WidgetId) -> Result<bool> {
        Ok(self.lock()?.tree.get(widget)?.is_sensitive())
    }

    /// Own flag and every ancestor's
    pub fn is_fully_sensitive(&self, widget: WidgetId) -> Result<bool> {
        Ok(self.lock()?.tree.get(widget)?.is_fully_sensitive())
    }

    pub fn set_auto_map_children(&self, widget: WidgetId, auto_map: bool) -> Result<()> {
        let mut state = self.lock()?;
        let node = state.tree.get_mut(widget)?;
        node.auto_map_children = auto_map || node.is_root();
        Ok(())
    }

    // Focus

    /// Give `widget` the keyboard focus within its top-level or popup
    pub fn request_focus(&self, widget: WidgetId) -> Result<()> {
        let deliveries = self.lock()?.set_focus(widget)?;
        self.run_deliveries(deliveries)
    }

    /// Widget that takes the focus whenever its top-level gains it
    pub fn set_default_focus(&self, widget: WidgetId) -> Result<()> {
        let mut state = self.lock()?;
        let scope = state.focus_scope_of(widget)?;
        if let Some(focus) = state.tree.get_mut(scope)?.focus.as_mut() {
            focus.default_focus = Some(widget);
        }
        Ok(())
    }

    /// Current focus widget of a top-level or popup
    pub fn focus_widget(&self, scope: WidgetId) -> Result<Option<WidgetId>> {
        Ok(self
            .lock()?
            .tree
            .get(scope)?
            .focus
            .and_then(|focus| focus.focus_widget))
    }

    /// The widget's top-level has primary focus and the widget is its focus widget
    pub fn has_focus(&self, widget: WidgetId) -> Result<bool> {
        let state = self.lock()?;
        let Some(scope) = state.tree.focus_scope(widget)? else {
            return Ok(false);
        };
        Ok(state
            .tree
            .get(scope)?
            .focus
            .is_some_and(|f| f.primary && f.focus_widget == Some(widget)))
    }

    pub fn has_primary_focus(&self, scope: WidgetId) -> Result<bool> {
        Ok(self
            .lock()?
            .tree
            .get(scope)?
            .focus
            .is_some_and(|f| f.primary))
    }

    // Appearance

    /// Window title of a top-level
    pub fn set_title(&self, widget: WidgetId, title: &str) -> Result<()> {
        let mut state = self.lock()?;
        let node = state.tree.get(widget)?;
        if !node.capabilities.contains(Capabilities::TOP_LEVEL) {
            return Err(ToolkitError::invalid_operation(format!(
                "widget {} is not a top-level window",
                widget
            )));
        }
        let window = node.handle;
        state.transport.set_title(window, title)
    }

    pub fn set_background(&self, widget: WidgetId, background: Background) -> Result<()> {
        let mut state = self.lock()?;
        let node = state.tree.get_mut(widget)?;
        if !node.is_paintable() {
            return Err(ToolkitError::invalid_operation(format!(
                "widget {} has no background",
                widget
            )));
        }
        node.background = background;
        let window = node.handle;
        state.transport.set_background(window, background)
    }

    pub fn set_foreground(&self, widget: WidgetId, pixel: u32) -> Result<()> {
        self.lock()?.tree.get_mut(widget)?.foreground = pixel;
        Ok(())
    }

    pub fn foreground(&self, widget: WidgetId) -> Result<u32> {
        Ok(self.lock()?.tree.get(widget)?.foreground)
    }

    pub fn background(&self, widget: WidgetId) -> Result<Background> {
        Ok(self.lock()?.tree.get(widget)?.background)
    }

    /// Skip the server-side clear when invalidated areas are repainted
    pub fn set_draw_background(&self, widget: WidgetId, draw: bool) -> Result<()> {
        self.lock()?.tree.get_mut(widget)?.draw_background = draw;
        Ok(())
    }

    // Repainting

    /// Queue the whole widget for repaint
    pub fn repaint(&self, widget: WidgetId) -> Result<()> {
        let mut state = self.lock()?;
        let bounds = state.tree.get(widget)?.bounds;
        let region = Region::from_rect(Rect::sized(bounds.width, bounds.height));
        state.invalidate(widget, &region)
    }

    /// Queue part of a widget for repaint, in widget coordinates
    pub fn repaint_rect(&self, widget: WidgetId, rect: Rect) -> Result<()> {
        validate_position(rect.x, rect.y)?;
        self.repaint_region(widget, &Region::from_rect(rect))
    }

    pub fn repaint_region(&self, widget: WidgetId, region: &Region) -> Result<()> {
        self.lock()?.invalidate(widget, region)
    }

    /// Paint the widget's pending damage now instead of waiting for the
    /// loop, clearing the background first when `clear` is set.
    pub fn update(&self, widget: WidgetId, clear: bool) -> Result<()> {
        let clip = {
            let mut state = self.lock()?;
            let state = &mut *state;
            let Some(pending) = state.damage.take_pending(&mut state.tree, widget)? else {
                return Ok(());
            };
            let clip = clip_to_widget(&state.tree, widget, &pending)?;
            let node = state.tree.get(widget)?;
            if clear && node.draw_background {
                let window = node.handle;
                for rect in clip.rectangles() {
                    state.transport.clear_area(window, *rect, false)?;
                }
            }
            clip
        };
        if clip.is_empty() {
            return Ok(());
        }
        self.paint_widget(widget, clip)
    }

    /// Run a widget's paint handler over `clip`
    pub(crate) fn paint_widget(&self, widget: WidgetId, clip: Region) -> Result<()> {
        let (handler, window) = {
            let state = self.lock()?;
            let node = state.tree.get(widget)?;
            if !node.is_paintable() {
                return Ok(());
            }
            (node.handler(), node.handle)
        };
        trace!("Painting widget {} ({} rects)", widget, clip.rectangles().len());
        let mut painter = Painter::new(self, widget, window, clip);
        handler.on_paint(&mut painter)
    }

    // Queries

    pub fn contains(&self, widget: WidgetId) -> bool {
        self.lock().is_ok_and(|state| state.tree.contains(widget))
    }

    /// Parent-relative bounds
    pub fn bounds(&self, widget: WidgetId) -> Result<Rect> {
        Ok(self.lock()?.tree.get(widget)?.bounds)
    }

    pub fn capabilities(&self, widget: WidgetId) -> Result<Capabilities> {
        Ok(self.lock()?.tree.get(widget)?.capabilities)
    }

    pub fn is_mapped(&self, widget: WidgetId) -> Result<bool> {
        Ok(self.lock()?.tree.get(widget)?.mapped)
    }

    /// Mapped with every ancestor mapped
    pub fn is_viewable(&self, widget: WidgetId) -> Result<bool> {
        self.lock()?.tree.is_viewable(widget)
    }

    pub fn ancestors_mapped(&self, widget: WidgetId) -> Result<bool> {
        self.lock()?.tree.ancestors_mapped(widget)
    }

    pub fn parent(&self, widget: WidgetId) -> Result<Option<WidgetId>> {
        self.lock()?.tree.parent(widget)
    }

    /// Children, topmost first
    pub fn children(&self, widget: WidgetId) -> Result<Vec<WidgetId>> {
        self.lock()?.tree.children(widget)
    }

    pub fn child_count(&self, widget: WidgetId) -> Result<usize> {
        self.lock()?.tree.child_count(widget)
    }

    pub fn next_above(&self, widget: WidgetId) -> Result<Option<WidgetId>> {
        self.lock()?.tree.next_above(widget)
    }

    pub fn next_below(&self, widget: WidgetId) -> Result<Option<WidgetId>> {
        self.lock()?.tree.next_below(widget)
    }

    pub fn top_level(&self, widget: WidgetId) -> Result<Option<WidgetId>> {
        self.lock()?.tree.top_level(widget)
    }

    pub fn screen_of(&self, widget: WidgetId) -> Result<usize> {
        Ok(self.lock()?.tree.get(widget)?.screen)
    }

    pub fn window_handle(&self, widget: WidgetId) -> Result<WindowHandle> {
        Ok(self.lock()?.tree.get(widget)?.handle)
    }

    pub fn widget_for_window(&self, window: WindowHandle) -> Result<Option<WidgetId>> {
        Ok(self.lock()?.tree.lookup(window))
    }

    /// Widget coordinates to root coordinates
    pub fn to_root(&self, widget: WidgetId, point: Point) -> Result<Point> {
        self.lock()?.tree.to_root(widget, point)
    }

    /// Root coordinates to widget coordinates
    pub fn from_root(&self, widget: WidgetId, point: Point) -> Result<Point> {
        self.lock()?.tree.from_root(widget, point)
    }

    /// Widgets alive on this connection, roots included
    pub fn widget_count(&self) -> Result<usize> {
        Ok(self.lock()?.tree.len())
    }

    /// Registrations on the expose and invalidate lists
    pub fn pending_damage(&self) -> Result<(usize, usize)> {
        let state = self.lock()?;
        Ok((state.damage.expose_len(), state.damage.invalidate_len()))
    }
}

fn sensitivity_deliveries(changes: Vec<(WidgetId, bool)>) -> Vec<Delivery> {
    changes
        .into_iter()
        .map(|(widget, sensitive)| {
            Delivery::Event(widget, WidgetEvent::SensitivityChanged(sensitive))
        })
        .collect()
}

impl DisplayState {
    fn create_widget(
        &mut self,
        parent: WidgetId,
        options: WidgetOptions,
        handler: Arc<dyn WidgetHandler>,
    ) -> Result<WidgetId> {
        let capabilities = options.capabilities;
        if capabilities.intersects(Capabilities::ROOT | Capabilities::GRAB_CATCHER) {
            return Err(ToolkitError::invalid_argument(
                "root and grab catcher widgets are created by the display",
            ));
        }
        let parent_node = self.tree.get(parent)?;
        let scope = capabilities.is_focus_scope();
        if scope && !parent_node.is_root() {
            return Err(ToolkitError::invalid_operation(
                "top-level and popup widgets must be children of a root",
            ));
        }
        let screen = parent_node.screen;
        let auto_map = parent_node.auto_map_children && !scope;
        let class = if capabilities.contains(Capabilities::PAINTABLE) {
            WindowClass::InputOutput
        } else {
            WindowClass::InputOnly
        };

        let window = self.transport.create_window(&WindowSpec {
            parent: parent_node.handle,
            bounds: options.bounds,
            class,
            background: options.background,
            override_redirect: capabilities.contains(Capabilities::OVERRIDE_REDIRECT),
        })?;
        let id = match self.attach_window(window, parent, screen, options, handler, auto_map) {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = self.transport.destroy_window(window) {
                    debug!("Destroying half-created window 0x{:x} failed: {}", window, cleanup);
                }
                return Err(e);
            }
        };
        debug!(
            "Widget {} created as window 0x{:x} under {} ({:?})",
            id, window, parent, capabilities
        );
        Ok(id)
    }

    /// Everything after the server window exists. On failure no node for
    /// `window` is left in the tree.
    fn attach_window(
        &mut self,
        window: WindowHandle,
        parent: WidgetId,
        screen: usize,
        options: WidgetOptions,
        handler: Arc<dyn WidgetHandler>,
        auto_map: bool,
    ) -> Result<WidgetId> {
        let capabilities = options.capabilities;
        self.transport.select_input(window, event_mask(capabilities))?;
        if let Some(title) = options.title.as_deref() {
            if capabilities.contains(Capabilities::TOP_LEVEL) {
                self.transport.set_title(window, title)?;
            }
        }

        let node = WidgetNode::new(window, screen, &options, handler);
        let (id, restack) = self.tree.insert(node, Some(parent))?;
        let settled = self.apply_restack(restack).and_then(|()| {
            if capabilities.is_focus_scope() {
                self.tree.get_mut(id)?.focus = Some(FocusState {
                    focus_widget: Some(id),
                    ..FocusState::default()
                });
            }
            if auto_map {
                self.transport.map_window(window)?;
                self.tree.set_mapped(id, true)?;
            }
            Ok(())
        });
        if let Err(e) = settled {
            if let Err(cleanup) = self.tree.remove(id) {
                debug!("Dropping half-created widget {} failed: {}", id, cleanup);
            }
            return Err(e);
        }
        Ok(id)
    }

    /// Returns the notifications to run and the removed nodes, which the
    /// caller drops once the lock is released.
    fn destroy_widget(&mut self, widget: WidgetId) -> Result<(Vec<Delivery>, Vec<WidgetNode>)> {
        let node = self.tree.get(widget)?;
        if node.capabilities.intersects(Capabilities::ROOT | Capabilities::GRAB_CATCHER) {
            return Err(ToolkitError::invalid_operation(format!(
                "widget {} is owned by the display",
                widget
            )));
        }
        let window = node.handle;
        let parent = node.parent;
        let ids = self.tree.subtree(widget)?;

        let mut deliveries = Vec::new();
        for id in &ids {
            let popup = self.tree.get(*id)?.capabilities.contains(Capabilities::POPUP);
            if popup {
                deliveries.extend(self.remove_popup(*id)?);
            }
        }
        for screen in &mut self.screens {
            for id in &ids {
                screen.grab.forget(*id);
            }
        }
        self.damage.forget(&mut self.tree, &ids);
        self.invokes.retain(|_, (target, _)| !ids.contains(target));
        if let Some(parent) = parent {
            self.release_focus(parent, &ids)?;
        }

        let removed = self.tree.remove(widget)?;
        self.transport.destroy_window(window)?;
        debug!("Widget {} destroyed with {} descendant(s)", widget, removed.len() - 1);
        Ok((deliveries, removed))
    }

    /// Point the focus of the scope above `from` away from widgets that are
    /// leaving it
    fn release_focus(&mut self, from: WidgetId, leaving: &[WidgetId]) -> Result<()> {
        let Some(scope) = self.tree.focus_scope(from)? else {
            return Ok(());
        };
        if let Some(focus) = self.tree.get_mut(scope)?.focus.as_mut() {
            if focus.focus_widget.is_some_and(|w| leaving.contains(&w)) {
                focus.focus_widget = Some(scope);
            }
            if focus.default_focus.is_some_and(|w| leaving.contains(&w)) {
                focus.default_focus = None;
            }
        }
        Ok(())
    }

    fn focus_scope_of(&self, widget: WidgetId) -> Result<WidgetId> {
        self.tree.focus_scope(widget)?.ok_or_else(|| {
            ToolkitError::invalid_operation(format!(
                "widget {} is not inside a top-level or popup",
                widget
            ))
        })
    }

    fn map_widget(&mut self, widget: WidgetId) -> Result<Vec<Delivery>> {
        let node = self.tree.get(widget)?;
        if node.mapped || node.is_root() {
            return Ok(Vec::new());
        }
        let window = node.handle;
        let popup = node.capabilities.contains(Capabilities::POPUP);
        self.transport.map_window(window)?;
        self.tree.set_mapped(widget, true)?;
        let mut deliveries = Vec::new();
        if popup {
            deliveries.extend(self.add_popup(widget)?);
        }
        deliveries.push(Delivery::Event(widget, WidgetEvent::MapStateChanged(true)));
        trace!("Widget {} mapped", widget);
        Ok(deliveries)
    }

    fn unmap_widget(&mut self, widget: WidgetId) -> Result<Vec<Delivery>> {
        let node = self.tree.get(widget)?;
        if !node.mapped || node.is_root() {
            return Ok(Vec::new());
        }
        if node.capabilities.contains(Capabilities::GRAB_CATCHER) {
            return Err(ToolkitError::invalid_operation("the grab catcher stays mapped"));
        }
        let window = node.handle;
        let popup = node.capabilities.contains(Capabilities::POPUP);
        self.transport.unmap_window(window)?;
        self.tree.set_mapped(widget, false)?;

        // Nothing below an unmapped widget can be painted
        let hidden = self.tree.subtree(widget)?;
        self.damage.forget(&mut self.tree, &hidden);

        let mut deliveries = Vec::new();
        if popup {
            deliveries.extend(self.remove_popup(widget)?);
        }
        deliveries.push(Delivery::Event(widget, WidgetEvent::MapStateChanged(false)));
        trace!("Widget {} unmapped", widget);
        Ok(deliveries)
    }

    fn move_resize(&mut self, widget: WidgetId, bounds: Rect) -> Result<Vec<Delivery>> {
        let node = self.tree.get_mut(widget)?;
        if node.is_root() {
            return Err(ToolkitError::invalid_operation("cannot move a root widget"));
        }
        let old = node.bounds;
        if old == bounds {
            return Ok(Vec::new());
        }
        let changes = WindowChanges {
            x: (old.x != bounds.x).then_some(bounds.x),
            y: (old.y != bounds.y).then_some(bounds.y),
            width: (old.width != bounds.width).then_some(bounds.width),
            height: (old.height != bounds.height).then_some(bounds.height),
            ..WindowChanges::default()
        };
        node.bounds = bounds;
        let window = node.handle;
        self.transport.configure_window(window, &changes)?;
        Ok(vec![Delivery::Event(widget, WidgetEvent::MoveResize(bounds))])
    }

    fn reparent(&mut self, widget: WidgetId, parent: WidgetId, x: i32, y: i32) -> Result<Vec<Delivery>> {
        let node = self.tree.get(widget)?;
        if node
            .capabilities
            .intersects(Capabilities::TOP_LEVEL | Capabilities::POPUP | Capabilities::GRAB_CATCHER)
        {
            return Err(ToolkitError::invalid_operation(format!(
                "widget {} cannot change parent",
                widget
            )));
        }
        let window = node.handle;
        let old_parent = node.parent;
        let moving = self.tree.subtree(widget)?;

        let restack = self.tree.reparent(widget, parent, x, y)?;
        let parent_window = self.tree.get(parent)?.handle;
        self.transport.reparent_window(window, parent_window, x, y)?;
        self.apply_restack(restack)?;

        if let Some(old_parent) = old_parent {
            if self.tree.focus_scope(old_parent)? != self.tree.focus_scope(parent)? {
                self.release_focus(old_parent, &moving)?;
            }
        }
        let changes = self.tree.refresh_sensitivity(widget)?;
        debug!("Widget {} reparented under {} at ({}, {})", widget, parent, x, y);
        Ok(sensitivity_deliveries(changes))
    }

    /// Forward a tree stacking change to the server
    pub(crate) fn apply_restack(&mut self, restack: Option<Restack>) -> Result<()> {
        let Some(restack) = restack else {
            return Ok(());
        };
        let window = self.tree.get(restack.widget)?.handle;
        let sibling = self.tree.get(restack.sibling)?.handle;
        self.transport.configure_window(
            window,
            &WindowChanges {
                sibling: Some(sibling),
                stack_mode: Some(restack.mode),
                ..WindowChanges::default()
            },
        )
    }

    pub(crate) fn invalidate(&mut self, widget: WidgetId, region: &Region) -> Result<()> {
        self.damage.invalidate(&mut self.tree, widget, region)?;
        Ok(())
    }
}
