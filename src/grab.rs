//! Popup Grab Router
//!
//! While any popup is active, one off-screen catcher window per screen holds
//! the pointer and keyboard grab, and every input event arrives there. The
//! router decides which popup (and which direct child of it) should see each
//! event, pins that choice for a press-drag-release sequence, and synthesizes
//! enter/leave as the pointer moves between popups.
//!
//! The router never talks to the transport. It reads geometry through
//! [`PopupTopology`] and answers with [`GrabAction`]s the display executes.

use tracing::debug;

use crate::geometry::{Point, Rect};
use crate::transport::{ButtonEvent, KeyEvent, ModifierMask, PointerEvent};
use crate::widget::{WidgetEvent, WidgetId, WidgetTree};

/// Geometry queries the router needs
pub trait PopupTopology {
    /// Popup rectangle in root coordinates
    fn popup_bounds(&self, popup: WidgetId) -> Option<Rect>;
    /// Topmost mapped direct child of `popup` containing the popup-relative point
    fn child_at(&self, popup: WidgetId, point: Point) -> Option<WidgetId>;
    /// Parent-relative rectangle of a popup child
    fn child_bounds(&self, child: WidgetId) -> Option<Rect>;
    /// Widget inside `popup` holding its keyboard focus, if not the popup itself
    fn focused_descendant(&self, popup: WidgetId) -> Option<WidgetId>;
}

/// Request produced by the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabAction {
    /// Install the pointer and keyboard grab on the catcher
    Grab,
    /// Release both grabs
    Ungrab,
    /// Synthesized enter notification
    Enter(WidgetId),
    /// Synthesized leave notification
    Leave(WidgetId),
    /// Re-targeted input event, coordinates already relative to `target`
    Deliver { target: WidgetId, event: WidgetEvent },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrabState {
    /// No popup is active, no grab is held
    #[default]
    Idle,
    /// Popups are active; pointer events go to whatever popup is under the pointer
    Tracking,
    /// A button went down inside `popup`; everything goes there until all buttons are up
    ButtonPinned {
        popup: WidgetId,
        child: Option<WidgetId>,
    },
}

/// Per-screen popup list and pointer ownership
#[derive(Debug, Default)]
pub struct GrabRouter {
    /// Active popups, bottom to top
    popups: Vec<WidgetId>,
    state: GrabState,
    entered: Option<WidgetId>,
    entered_child: Option<WidgetId>,
}

impl GrabRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GrabState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !self.popups.is_empty()
    }

    /// Active popups, bottom to top
    pub fn popups(&self) -> &[WidgetId] {
        &self.popups
    }

    pub fn topmost(&self) -> Option<WidgetId> {
        self.popups.last().copied()
    }

    pub fn contains(&self, popup: WidgetId) -> bool {
        self.popups.contains(&popup)
    }

    /// Put `popup` on top of the list, adding it if needed. The first popup
    /// starts the grab.
    pub fn add(&mut self, popup: WidgetId) -> Vec<GrabAction> {
        if let Some(index) = self.popups.iter().position(|p| *p == popup) {
            self.popups.remove(index);
            self.popups.push(popup);
            return Vec::new();
        }
        self.popups.push(popup);
        if self.popups.len() == 1 {
            self.state = GrabState::Tracking;
            debug!("Popup {} activated, grabbing input", popup);
            return vec![GrabAction::Grab];
        }
        Vec::new()
    }

    /// Take `popup` off the list. Leaves are synthesized if the pointer was
    /// inside it; the last popup out ends the grab.
    pub fn remove(&mut self, popup: WidgetId) -> Vec<GrabAction> {
        let Some(index) = self.popups.iter().position(|p| *p == popup) else {
            return Vec::new();
        };
        self.popups.remove(index);

        let mut actions = Vec::new();
        if self.entered == Some(popup) {
            if let Some(child) = self.entered_child.take() {
                actions.push(GrabAction::Leave(child));
            }
            self.entered = None;
            actions.push(GrabAction::Leave(popup));
        }
        if let GrabState::ButtonPinned { popup: pinned, .. } = self.state {
            if pinned == popup {
                self.state = GrabState::Tracking;
            }
        }
        if self.popups.is_empty() {
            self.state = GrabState::Idle;
            debug!("Last popup {} deactivated, releasing grab", popup);
            actions.push(GrabAction::Ungrab);
        }
        actions
    }

    /// Move an active popup to the bottom of the list
    pub fn lower(&mut self, popup: WidgetId) -> bool {
        let Some(index) = self.popups.iter().position(|p| *p == popup) else {
            return false;
        };
        self.popups.remove(index);
        self.popups.insert(0, popup);
        true
    }

    /// Drop references to a destroyed widget that is not itself a popup
    pub fn forget(&mut self, widget: WidgetId) {
        if self.entered_child == Some(widget) {
            self.entered_child = None;
        }
        if let GrabState::ButtonPinned { popup, child } = self.state {
            if child == Some(widget) {
                self.state = GrabState::ButtonPinned { popup, child: None };
            }
        }
    }

    pub fn button_press(
        &mut self,
        topology: &impl PopupTopology,
        event: &ButtonEvent,
    ) -> Vec<GrabAction> {
        let root = Point::new(event.pointer.root_x, event.pointer.root_y);
        let (popup, child) = match self.state {
            GrabState::ButtonPinned { popup, child } => (Some(popup), child),
            _ => self.resolve(topology, root, true),
        };
        if let Some(popup) = popup {
            self.state = GrabState::ButtonPinned { popup, child };
        }
        self.route(topology, popup, child, root, WidgetEvent::ButtonPress(*event))
    }

    /// A release with no pinned popup belongs to a press made before the
    /// grab started; it is dropped and the pointer leaves whatever it was in.
    pub fn button_release(
        &mut self,
        topology: &impl PopupTopology,
        event: &ButtonEvent,
    ) -> Vec<GrabAction> {
        let root = Point::new(event.pointer.root_x, event.pointer.root_y);
        let (popup, child) = match self.state {
            GrabState::ButtonPinned { popup, child } => {
                let still_held = event.pointer.state & ModifierMask::ALL_BUTTONS
                    & !event.button.mask();
                if still_held.is_empty() {
                    self.state = GrabState::Tracking;
                }
                (Some(popup), child)
            }
            _ => (None, None),
        };
        self.route(topology, popup, child, root, WidgetEvent::ButtonRelease(*event))
    }

    pub fn motion(&mut self, topology: &impl PopupTopology, event: &PointerEvent) -> Vec<GrabAction> {
        let root = Point::new(event.root_x, event.root_y);
        let (popup, child) = match self.state {
            GrabState::ButtonPinned { popup, child } => (Some(popup), child),
            _ => self.resolve(topology, root, false),
        };
        self.route(topology, popup, child, root, WidgetEvent::Motion(*event))
    }

    /// Key events go to the topmost popup, or the widget focused inside it
    pub fn key(&self, topology: &impl PopupTopology, event: WidgetEvent) -> Option<GrabAction> {
        let popup = self.topmost()?;
        let target = topology.focused_descendant(popup).unwrap_or(popup);
        Some(GrabAction::Deliver { target, event })
    }

    pub fn key_press(&self, topology: &impl PopupTopology, event: &KeyEvent) -> Option<GrabAction> {
        self.key(topology, WidgetEvent::KeyPress(event.clone()))
    }

    pub fn key_release(&self, topology: &impl PopupTopology, event: &KeyEvent) -> Option<GrabAction> {
        self.key(topology, WidgetEvent::KeyRelease(event.clone()))
    }

    /// Popups are searched bottom to top and the first hit wins. With
    /// `default_top` the topmost popup takes events outside every popup.
    fn find(&self, topology: &impl PopupTopology, root: Point, default_top: bool) -> Option<WidgetId> {
        let hit = self.popups.iter().copied().find(|popup| {
            topology
                .popup_bounds(*popup)
                .is_some_and(|b| b.contains_point(root.x, root.y))
        });
        match hit {
            Some(popup) => Some(popup),
            None if default_top => self.topmost(),
            None => None,
        }
    }

    fn resolve(
        &self,
        topology: &impl PopupTopology,
        root: Point,
        default_top: bool,
    ) -> (Option<WidgetId>, Option<WidgetId>) {
        let Some(popup) = self.find(topology, root, default_top) else {
            return (None, None);
        };
        let child = topology.popup_bounds(popup).and_then(|bounds| {
            topology.child_at(popup, Point::new(root.x - bounds.x, root.y - bounds.y))
        });
        (Some(popup), child)
    }

    /// Leave the old pair, then enter the new one
    fn change_entered(&mut self, popup: Option<WidgetId>, child: Option<WidgetId>) -> Vec<GrabAction> {
        let mut actions = Vec::new();
        if self.entered != popup {
            if let Some(old) = self.entered {
                if let Some(old_child) = self.entered_child {
                    actions.push(GrabAction::Leave(old_child));
                }
                actions.push(GrabAction::Leave(old));
            }
            if let Some(new) = popup {
                actions.push(GrabAction::Enter(new));
                if let Some(new_child) = child {
                    actions.push(GrabAction::Enter(new_child));
                }
            }
        } else if self.entered_child != child {
            if let Some(old_child) = self.entered_child {
                actions.push(GrabAction::Leave(old_child));
            }
            if let Some(new_child) = child {
                actions.push(GrabAction::Enter(new_child));
            }
        }
        self.entered = popup;
        self.entered_child = child;
        actions
    }

    /// Synthesize crossings, then hand the event to the popup and its child
    /// with coordinates translated to each.
    fn route(
        &mut self,
        topology: &impl PopupTopology,
        popup: Option<WidgetId>,
        child: Option<WidgetId>,
        root: Point,
        event: WidgetEvent,
    ) -> Vec<GrabAction> {
        let mut actions = self.change_entered(popup, child);
        let Some(popup) = popup else {
            return actions;
        };
        let Some(bounds) = topology.popup_bounds(popup) else {
            return actions;
        };
        let x = root.x - bounds.x;
        let y = root.y - bounds.y;
        actions.push(GrabAction::Deliver {
            target: popup,
            event: event.at(x, y),
        });
        if let Some(child) = child {
            if let Some(cb) = topology.child_bounds(child) {
                actions.push(GrabAction::Deliver {
                    target: child,
                    event: event.at(x - cb.x, y - cb.y),
                });
            }
        }
        actions
    }
}

impl PopupTopology for WidgetTree {
    fn popup_bounds(&self, popup: WidgetId) -> Option<Rect> {
        self.root_bounds(popup).ok()
    }

    fn child_at(&self, popup: WidgetId, point: Point) -> Option<WidgetId> {
        self.children(popup).ok()?.into_iter().find(|child| {
            self.get(*child)
                .is_ok_and(|node| node.is_mapped() && node.bounds().contains_point(point.x, point.y))
        })
    }

    fn child_bounds(&self, child: WidgetId) -> Option<Rect> {
        self.get(child).ok().map(|node| node.bounds())
    }

    fn focused_descendant(&self, popup: WidgetId) -> Option<WidgetId> {
        let focus = self.get(popup).ok()?.focus?;
        focus
            .focus_widget
            .filter(|widget| *widget != popup && self.is_ancestor(popup, *widget).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::transport::Button;

    #[derive(Default)]
    struct MockTopology {
        popups: HashMap<WidgetId, Rect>,
        children: HashMap<WidgetId, Vec<(WidgetId, Rect)>>,
        focus: HashMap<WidgetId, WidgetId>,
    }

    impl PopupTopology for MockTopology {
        fn popup_bounds(&self, popup: WidgetId) -> Option<Rect> {
            self.popups.get(&popup).copied()
        }

        fn child_at(&self, popup: WidgetId, point: Point) -> Option<WidgetId> {
            self.children
                .get(&popup)?
                .iter()
                .find(|(_, r)| r.contains_point(point.x, point.y))
                .map(|(id, _)| *id)
        }

        fn child_bounds(&self, child: WidgetId) -> Option<Rect> {
            self.children
                .values()
                .flatten()
                .find(|(id, _)| *id == child)
                .map(|(_, r)| *r)
        }

        fn focused_descendant(&self, popup: WidgetId) -> Option<WidgetId> {
            self.focus.get(&popup).copied()
        }
    }

    fn id(n: u32) -> WidgetId {
        WidgetId::new(n, 0)
    }

    fn pointer(root_x: i32, root_y: i32, state: ModifierMask) -> PointerEvent {
        PointerEvent {
            x: 0,
            y: 0,
            root_x,
            root_y,
            state,
            time: 1,
        }
    }

    fn press(root_x: i32, root_y: i32) -> ButtonEvent {
        ButtonEvent {
            button: Button::LEFT,
            pointer: pointer(root_x, root_y, ModifierMask::empty()),
        }
    }

    fn release(root_x: i32, root_y: i32, state: ModifierMask) -> ButtonEvent {
        ButtonEvent {
            button: Button::LEFT,
            pointer: pointer(root_x, root_y, state),
        }
    }

    fn targets(actions: &[GrabAction]) -> Vec<(WidgetId, i32, i32)> {
        actions
            .iter()
            .filter_map(|a| match a {
                GrabAction::Deliver {
                    target,
                    event: WidgetEvent::ButtonPress(e) | WidgetEvent::ButtonRelease(e),
                } => Some((*target, e.pointer.x, e.pointer.y)),
                GrabAction::Deliver {
                    target,
                    event: WidgetEvent::Motion(p),
                } => Some((*target, p.x, p.y)),
                _ => None,
            })
            .collect()
    }

    /// P1 at the left, P2 to the right, not overlapping
    fn two_popups() -> (GrabRouter, MockTopology, WidgetId, WidgetId) {
        let (p1, p2) = (id(1), id(2));
        let mut topology = MockTopology::default();
        topology.popups.insert(p1, Rect::new(0, 0, 100, 100));
        topology.popups.insert(p2, Rect::new(200, 0, 100, 100));
        let mut router = GrabRouter::new();
        assert_eq!(router.add(p1), vec![GrabAction::Grab]);
        assert_eq!(router.add(p2), vec![]);
        (router, topology, p1, p2)
    }

    #[test]
    fn test_press_routes_to_popup_under_pointer_and_pins() {
        let (mut router, topology, p1, p2) = two_popups();
        let actions = router.button_press(&topology, &press(50, 40));
        assert_eq!(targets(&actions), vec![(p1, 50, 40)]);
        assert_eq!(
            router.state(),
            GrabState::ButtonPinned {
                popup: p1,
                child: None
            }
        );

        // Dragging over P2 still goes to P1, in P1's coordinates
        let actions = router.motion(&topology, &pointer(250, 10, ModifierMask::BUTTON1));
        assert_eq!(targets(&actions), vec![(p1, 250, 10)]);
        assert!(!actions.contains(&GrabAction::Enter(p2)));

        let actions = router.button_release(&topology, &release(250, 10, ModifierMask::BUTTON1));
        assert_eq!(targets(&actions), vec![(p1, 250, 10)]);
        assert_eq!(router.state(), GrabState::Tracking);

        // Unpinned: motion now finds P2
        let actions = router.motion(&topology, &pointer(250, 10, ModifierMask::empty()));
        assert_eq!(
            actions[..2],
            [GrabAction::Leave(p1), GrabAction::Enter(p2)]
        );
        assert_eq!(targets(&actions), vec![(p2, 50, 10)]);
    }

    #[test]
    fn test_release_keeps_pin_while_other_buttons_held() {
        let (mut router, topology, p1, _) = two_popups();
        router.button_press(&topology, &press(10, 10));
        let held = ModifierMask::BUTTON1 | ModifierMask::BUTTON3;
        router.button_release(&topology, &release(10, 10, held));
        assert!(matches!(router.state(), GrabState::ButtonPinned { popup, .. } if popup == p1));
    }

    #[test]
    fn test_release_without_press_is_dropped() {
        let (mut router, topology, p1, _) = two_popups();
        router.motion(&topology, &pointer(5, 5, ModifierMask::empty()));
        let actions = router.button_release(&topology, &release(5, 5, ModifierMask::BUTTON1));
        assert_eq!(actions, vec![GrabAction::Leave(p1)]);
        assert_eq!(router.state(), GrabState::Tracking);
    }

    #[test]
    fn test_press_outside_all_popups_goes_to_topmost() {
        let (mut router, topology, _, p2) = two_popups();
        let actions = router.button_press(&topology, &press(500, 500));
        assert_eq!(targets(&actions), vec![(p2, 300, 500)]);
    }

    #[test]
    fn test_motion_outside_all_popups_leaves() {
        let (mut router, topology, p1, _) = two_popups();
        router.motion(&topology, &pointer(5, 5, ModifierMask::empty()));
        let actions = router.motion(&topology, &pointer(150, 5, ModifierMask::empty()));
        assert_eq!(actions, vec![GrabAction::Leave(p1)]);
    }

    #[test]
    fn test_child_crossings_within_one_popup() {
        let (mut router, mut topology, p1, _) = two_popups();
        let (c1, c2) = (id(11), id(12));
        topology.children.insert(
            p1,
            vec![(c1, Rect::new(0, 0, 100, 50)), (c2, Rect::new(0, 50, 100, 50))],
        );

        let actions = router.motion(&topology, &pointer(10, 10, ModifierMask::empty()));
        assert_eq!(
            actions[..2],
            [GrabAction::Enter(p1), GrabAction::Enter(c1)]
        );
        assert_eq!(targets(&actions), vec![(p1, 10, 10), (c1, 10, 10)]);

        let actions = router.motion(&topology, &pointer(10, 60, ModifierMask::empty()));
        assert_eq!(
            actions[..2],
            [GrabAction::Leave(c1), GrabAction::Enter(c2)]
        );
        assert_eq!(targets(&actions), vec![(p1, 10, 60), (c2, 10, 10)]);
    }

    #[test]
    fn test_remove_synthesizes_leave_and_ungrabs() {
        let (mut router, mut topology, p1, p2) = two_popups();
        let child = id(11);
        topology.children.insert(p1, vec![(child, Rect::new(0, 0, 50, 50))]);
        router.button_press(&topology, &press(10, 10));

        assert_eq!(
            router.remove(p1),
            vec![GrabAction::Leave(child), GrabAction::Leave(p1)]
        );
        assert_eq!(router.state(), GrabState::Tracking);
        assert_eq!(router.remove(p2), vec![GrabAction::Ungrab]);
        assert_eq!(router.state(), GrabState::Idle);
        assert!(router.remove(p2).is_empty());
    }

    #[test]
    fn test_add_existing_moves_to_top_and_lower_moves_to_bottom() {
        let (mut router, _, p1, p2) = two_popups();
        assert!(router.add(p1).is_empty());
        assert_eq!(router.popups(), &[p2, p1]);
        assert!(router.lower(p1));
        assert_eq!(router.popups(), &[p1, p2]);
        assert!(!router.lower(id(9)));
    }

    #[test]
    fn test_keys_go_to_focused_descendant_of_topmost() {
        let (router, mut topology, _, p2) = two_popups();
        let key = KeyEvent::default();
        assert_eq!(
            router.key_press(&topology, &key),
            Some(GrabAction::Deliver {
                target: p2,
                event: WidgetEvent::KeyPress(key.clone())
            })
        );
        topology.focus.insert(p2, id(21));
        assert!(matches!(
            router.key_release(&topology, &key),
            Some(GrabAction::Deliver { target, .. }) if target == id(21)
        ));
    }
}
