//! Event dispatch
//!
//! Protocol events are resolved to widgets under the lock, producing a list
//! of [`Delivery`]s; the deliveries run after the lock is released.
//!
//! Keyboard and wheel input is owned by top-level windows: the server may
//! report it on any descendant, so it is first walked up to the child of the
//! root and then bubbled down-to-up from the top-level's focus widget.

use tracing::trace;

use crate::error::Result;
use crate::geometry::Point;
use crate::grab::GrabAction;
use crate::transport::{Button, ButtonEvent, EventKind, EventMask, ProtocolEvent, CURRENT_TIME};
use crate::widget::event::WHEEL_DELTA;
use crate::widget::{handler, Capabilities, WidgetEvent, WidgetId};

use super::{Display, DisplayState, InvokeCallback};

/// Pointer events the grab catcher listens for
pub(crate) const GRAB_POINTER_MASK: EventMask = EventMask::BUTTON_PRESS
    .union(EventMask::BUTTON_RELEASE)
    .union(EventMask::POINTER_MOTION);

/// A notification waiting for the lock to be released
pub(crate) enum Delivery {
    Event(WidgetId, WidgetEvent),
    /// Offer the event to each widget in turn until one consumes it
    Bubble(Vec<WidgetId>, WidgetEvent),
    /// Focus arrival that is dropped if the focus moved on in the meantime
    FocusIn {
        scope: WidgetId,
        widget: WidgetId,
        previous: Option<WidgetId>,
    },
    Invoke(InvokeCallback),
}

impl Display {
    /// Resolve one protocol event and run its deliveries
    pub(crate) fn dispatch(&self, event: ProtocolEvent) -> Result<()> {
        let deliveries = {
            let mut state = self.lock()?;
            state.known_event_time = event.time().unwrap_or(CURRENT_TIME);
            state.resolve(event)?
        };
        self.run_deliveries(deliveries)
    }

    pub(crate) fn run_deliveries(&self, deliveries: Vec<Delivery>) -> Result<()> {
        for delivery in deliveries {
            match delivery {
                Delivery::Event(widget, event) => {
                    self.deliver(widget, event)?;
                }
                Delivery::Bubble(chain, event) => {
                    for widget in chain {
                        if self.deliver(widget, event.clone())? {
                            break;
                        }
                    }
                }
                Delivery::FocusIn {
                    scope,
                    widget,
                    previous,
                } => {
                    let current = {
                        let state = self.lock()?;
                        state
                            .tree
                            .get(scope)
                            .ok()
                            .and_then(|node| node.focus)
                            .and_then(|focus| focus.focus_widget)
                    };
                    if current == Some(widget) {
                        self.deliver(widget, WidgetEvent::FocusIn(previous))?;
                    }
                }
                Delivery::Invoke(callback) => callback(self)?,
            }
        }
        Ok(())
    }

    /// Call one handler. Returns whether a key or wheel event was consumed;
    /// widgets destroyed or made insensitive in the meantime consume nothing.
    fn deliver(&self, widget: WidgetId, event: WidgetEvent) -> Result<bool> {
        let (handler, event) = {
            let mut state = self.lock()?;
            let threshold = state.options.double_click.as_millis().min(u32::MAX as u128) as u32;
            let Ok(node) = state.tree.get_mut(widget) else {
                trace!("Dropping {:?} for destroyed widget {}", event, widget);
                return Ok(false);
            };
            if event.requires_sensitivity() && !node.is_fully_sensitive() {
                return Ok(false);
            }
            let event = match event {
                WidgetEvent::ButtonPress(press) => {
                    let click = &mut node.click;
                    let double = click.button == Some(press.button)
                        && click.time != CURRENT_TIME
                        && press.pointer.time.wrapping_sub(click.time) < threshold;
                    click.button = Some(press.button);
                    click.time = if double { CURRENT_TIME } else { press.pointer.time };
                    if double {
                        WidgetEvent::ButtonDoubleClick(press)
                    } else {
                        WidgetEvent::ButtonPress(press)
                    }
                }
                other => other,
            };
            (node.handler(), event)
        };
        handler::deliver(handler.as_ref(), self, widget, &event)
    }
}

impl DisplayState {
    /// Turn a protocol event into deliveries
    pub(crate) fn resolve(&mut self, event: ProtocolEvent) -> Result<Vec<Delivery>> {
        if let EventKind::ClientMessage { message_type, data } = &event.kind {
            if *message_type == self.invoke_atom {
                return Ok(self.take_invoke(data[0]).into_iter().collect());
            }
        }

        let Some(widget) = self.tree.lookup(event.window) else {
            trace!("Event for unknown window 0x{:x} dropped", event.window);
            return Ok(Vec::new());
        };
        let node = self.tree.get(widget)?;
        if node.capabilities.contains(Capabilities::GRAB_CATCHER) {
            let screen = node.screen;
            return self.resolve_grabbed(screen, event);
        }

        let deliveries = match event.kind {
            EventKind::KeyPress(key) => self.route_key(widget, WidgetEvent::KeyPress(key))?,
            EventKind::KeyRelease(key) => self.route_key(widget, WidgetEvent::KeyRelease(key))?,
            EventKind::ButtonPress(button) if button.button.is_wheel() => {
                let top = self.tree.child_of_root(widget)?;
                if self.is_top_level(top)? {
                    // Wheel notches are handled on release
                    Vec::new()
                } else {
                    vec![Delivery::Event(top, self.relocate(top, WidgetEvent::ButtonPress(button))?)]
                }
            }
            EventKind::ButtonRelease(button) if button.button.is_wheel() => {
                self.route_wheel(widget, button)?
            }
            EventKind::ButtonPress(button) => {
                vec![Delivery::Event(widget, WidgetEvent::ButtonPress(button))]
            }
            EventKind::ButtonRelease(button) => {
                vec![Delivery::Event(widget, WidgetEvent::ButtonRelease(button))]
            }
            EventKind::Motion(pointer) => vec![Delivery::Event(widget, WidgetEvent::Motion(pointer))],
            EventKind::Enter(crossing) => {
                let child = crossing.subwindow.and_then(|w| self.tree.lookup(w));
                vec![Delivery::Event(
                    widget,
                    WidgetEvent::Enter {
                        child,
                        event: crossing,
                    },
                )]
            }
            EventKind::Leave(crossing) => {
                let child = crossing.subwindow.and_then(|w| self.tree.lookup(w));
                vec![Delivery::Event(
                    widget,
                    WidgetEvent::Leave {
                        child,
                        event: crossing,
                    },
                )]
            }
            EventKind::FocusIn => {
                if self.is_top_level(widget)? {
                    self.primary_focus_in(widget)?
                } else {
                    Vec::new()
                }
            }
            EventKind::FocusOut => self.primary_focus_out(widget)?,
            EventKind::Expose(rect) => {
                self.damage.expose(&mut self.tree, widget, rect)?;
                Vec::new()
            }
            EventKind::Configure(bounds) => {
                let node = self.tree.get_mut(widget)?;
                if node.is_root() || node.bounds == bounds {
                    Vec::new()
                } else {
                    node.bounds = bounds;
                    vec![Delivery::Event(widget, WidgetEvent::MoveResize(bounds))]
                }
            }
            EventKind::ClientMessage { .. }
            | EventKind::Property { .. }
            | EventKind::Selection { .. }
            | EventKind::Other => Vec::new(),
        };
        Ok(deliveries)
    }

    fn take_invoke(&mut self, id: u32) -> Option<Delivery> {
        let (widget, callback) = self.invokes.remove(&id)?;
        if !self.tree.contains(widget) {
            trace!("Invoke {} dropped, widget {} is gone", id, widget);
            return None;
        }
        Some(Delivery::Invoke(callback))
    }

    pub(crate) fn is_top_level(&self, widget: WidgetId) -> Result<bool> {
        Ok(self
            .tree
            .get(widget)?
            .capabilities
            .contains(Capabilities::TOP_LEVEL))
    }

    /// Keys go through the top-level, starting at its focus widget
    fn route_key(&self, widget: WidgetId, event: WidgetEvent) -> Result<Vec<Delivery>> {
        let top = self.tree.child_of_root(widget)?;
        if !self.is_top_level(top)? {
            return Ok(Vec::new());
        }
        let start = self.focus_start(top)?;
        Ok(vec![Delivery::Bubble(self.chain(start, top)?, event)])
    }

    /// Wheel notches bubble from the focus widget like keys. Outside a
    /// top-level the release is an ordinary button release.
    fn route_wheel(&self, widget: WidgetId, button: ButtonEvent) -> Result<Vec<Delivery>> {
        let top = self.tree.child_of_root(widget)?;
        if !self.is_top_level(top)? {
            let event = self.relocate(top, WidgetEvent::ButtonRelease(button))?;
            return Ok(vec![Delivery::Event(top, event)]);
        }
        let delta = if button.button == Button::WHEEL_UP {
            WHEEL_DELTA
        } else {
            -WHEEL_DELTA
        };
        let local = self
            .tree
            .from_root(top, Point::new(button.pointer.root_x, button.pointer.root_y))?;
        let mut event = button;
        event.pointer.x = local.x;
        event.pointer.y = local.y;
        let start = self.focus_start(top)?;
        Ok(vec![Delivery::Bubble(
            self.chain(start, top)?,
            WidgetEvent::Wheel { event, delta },
        )])
    }

    /// Focus widget of a scope, or the scope itself
    fn focus_start(&self, scope: WidgetId) -> Result<WidgetId> {
        let focus = self.tree.get(scope)?.focus;
        Ok(focus
            .and_then(|f| f.focus_widget)
            .filter(|w| self.tree.contains(*w))
            .unwrap_or(scope))
    }

    /// `start` and its ancestors up to and including `stop`
    pub(crate) fn chain(&self, start: WidgetId, stop: WidgetId) -> Result<Vec<WidgetId>> {
        let mut out = vec![start];
        let mut cur = start;
        while cur != stop {
            match self.tree.parent(cur)? {
                Some(parent) => {
                    out.push(parent);
                    cur = parent;
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Re-express a pointer event relative to another widget
    fn relocate(&self, widget: WidgetId, event: WidgetEvent) -> Result<WidgetEvent> {
        let root = match &event {
            WidgetEvent::ButtonPress(e) | WidgetEvent::ButtonRelease(e) => {
                Point::new(e.pointer.root_x, e.pointer.root_y)
            }
            _ => return Ok(event),
        };
        let local = self.tree.from_root(widget, root)?;
        Ok(event.at(local.x, local.y))
    }

    // Focus

    /// The server gave a top-level the input focus
    pub(crate) fn primary_focus_in(&mut self, scope: WidgetId) -> Result<Vec<Delivery>> {
        let node = self.tree.get_mut(scope)?;
        let Some(focus) = node.focus.as_mut() else {
            return Ok(Vec::new());
        };
        if focus.primary {
            return Ok(Vec::new());
        }
        focus.primary = true;
        if let Some(default) = focus.default_focus {
            focus.focus_widget = Some(default);
        }
        let target = focus.focus_widget;
        trace!("Scope {} gained primary focus", scope);
        Ok(target
            .map(|w| Delivery::Event(w, WidgetEvent::FocusIn(None)))
            .into_iter()
            .collect())
    }

    fn primary_focus_out(&mut self, scope: WidgetId) -> Result<Vec<Delivery>> {
        let node = self.tree.get_mut(scope)?;
        let Some(focus) = node.focus.as_mut() else {
            return Ok(Vec::new());
        };
        if !focus.primary {
            return Ok(Vec::new());
        }
        focus.primary = false;
        trace!("Scope {} lost primary focus", scope);
        Ok(focus
            .focus_widget
            .map(|w| Delivery::Event(w, WidgetEvent::FocusOut(None)))
            .into_iter()
            .collect())
    }

    /// Move a scope's focus widget. Without primary focus this also claims
    /// it; with primary focus the old widget gets `FocusOut` first.
    pub(crate) fn set_focus(&mut self, widget: WidgetId) -> Result<Vec<Delivery>> {
        if !self.tree.get(widget)?.focusable {
            return Ok(Vec::new());
        }
        let Some(scope) = self.tree.focus_scope(widget)? else {
            return Ok(Vec::new());
        };
        let node = self.tree.get_mut(scope)?;
        let focus = node.focus.get_or_insert_with(Default::default);
        if !focus.primary {
            focus.focus_widget = Some(widget);
            return self.primary_focus_in(scope);
        }
        if focus.focus_widget == Some(widget) {
            return Ok(Vec::new());
        }
        let previous = focus.focus_widget.replace(widget);
        let mut deliveries = Vec::new();
        if let Some(previous) = previous {
            deliveries.push(Delivery::Event(previous, WidgetEvent::FocusOut(Some(widget))));
        }
        deliveries.push(Delivery::FocusIn {
            scope,
            widget,
            previous,
        });
        Ok(deliveries)
    }

    // Grab

    /// Input arriving at a grab catcher goes through the screen's router
    fn resolve_grabbed(&mut self, screen: usize, event: ProtocolEvent) -> Result<Vec<Delivery>> {
        let Some(state) = self.screens.get_mut(screen) else {
            return Ok(Vec::new());
        };
        let tree = &self.tree;
        let actions = match &event.kind {
            EventKind::ButtonPress(button) => state.grab.button_press(tree, button),
            EventKind::ButtonRelease(button) => state.grab.button_release(tree, button),
            EventKind::Motion(pointer) => state.grab.motion(tree, pointer),
            EventKind::KeyPress(key) => state.grab.key_press(tree, key).into_iter().collect(),
            EventKind::KeyRelease(key) => state.grab.key_release(tree, key).into_iter().collect(),
            _ => Vec::new(),
        };
        self.apply_grab_actions(screen, actions)
    }

    /// Execute router output: grab requests go to the transport now,
    /// notifications become deliveries
    pub(crate) fn apply_grab_actions(
        &mut self,
        screen: usize,
        actions: Vec<GrabAction>,
    ) -> Result<Vec<Delivery>> {
        let mut deliveries = Vec::new();
        for action in actions {
            match action {
                GrabAction::Grab => self.grab_input(screen)?,
                GrabAction::Ungrab => self.ungrab_input()?,
                GrabAction::Enter(widget) => {
                    deliveries.push(Delivery::Event(widget, WidgetEvent::synthetic_enter()))
                }
                GrabAction::Leave(widget) => {
                    deliveries.push(Delivery::Event(widget, WidgetEvent::synthetic_leave()))
                }
                GrabAction::Deliver { target, event } => match event {
                    WidgetEvent::KeyPress(_) | WidgetEvent::KeyRelease(_) => {
                        let scope = self.tree.focus_scope(target)?.unwrap_or(target);
                        deliveries.push(Delivery::Bubble(self.chain(target, scope)?, event));
                    }
                    event => deliveries.push(Delivery::Event(target, event)),
                },
            }
        }
        Ok(deliveries)
    }

    fn grab_input(&mut self, screen: usize) -> Result<()> {
        let catcher = self.grab_catcher(screen)?;
        let window = self.tree.get(catcher)?.handle;
        let time = self.known_event_time;
        self.transport.grab_pointer(window, GRAB_POINTER_MASK, time)?;
        self.transport.grab_keyboard(window, time)?;
        trace!("Input grabbed on catcher 0x{:x}", window);
        Ok(())
    }

    fn ungrab_input(&mut self) -> Result<()> {
        let time = self.known_event_time;
        self.transport.ungrab_pointer(time)?;
        self.transport.ungrab_keyboard(time)?;
        trace!("Input grab released");
        Ok(())
    }
}
