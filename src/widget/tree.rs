//! Widget arena with layered sibling stacking
//!
//! Each parent keeps its children in a doubly linked list, topmost first,
//! sorted by descending layer. Within one layer the order is creation and
//! raise/lower history. Every stacking change that moves a widget relative to
//! a sibling returns a [`Restack`] the display forwards to the server.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{Result, ToolkitError};
use crate::geometry::{Point, Rect};
use crate::transport::{StackMode, WindowHandle};

use super::{Capabilities, WidgetId, WidgetNode};

/// Server-side stacking change: put `widget` directly above or below `sibling`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restack {
    pub widget: WidgetId,
    pub sibling: WidgetId,
    pub mode: StackMode,
}

struct Slot {
    generation: u32,
    node: Option<WidgetNode>,
}

/// Widget arena plus the handle table
#[derive(Default)]
pub struct WidgetTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    handles: HashMap<WindowHandle, WidgetId>,
}

impl WidgetTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live widgets
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, id: WidgetId) -> bool {
        self.get(id).is_ok()
    }

    pub fn get(&self, id: WidgetId) -> Result<&WidgetNode> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_ref())
            .ok_or(ToolkitError::WidgetDestroyed(id))
    }

    pub fn get_mut(&mut self, id: WidgetId) -> Result<&mut WidgetNode> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.node.as_mut())
            .ok_or(ToolkitError::WidgetDestroyed(id))
    }

    /// Handle table lookup
    pub fn lookup(&self, handle: WindowHandle) -> Option<WidgetId> {
        self.handles.get(&handle).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = WidgetId> + '_ {
        self.handles.values().copied()
    }

    /// Add a widget. A child goes on top of its parent's stack with the
    /// maximal layer and then sinks to its own layer, which lands it on top
    /// of the widgets already sharing that layer.
    pub fn insert(
        &mut self,
        mut node: WidgetNode,
        parent: Option<WidgetId>,
    ) -> Result<(WidgetId, Option<Restack>)> {
        let layer = node.layer;
        if let Some(parent) = parent {
            node.ancestor_sensitive = self.get(parent)?.is_fully_sensitive();
            node.layer = i32::MAX;
        }
        if self.handles.contains_key(&node.handle) {
            return Err(ToolkitError::invalid_operation(format!(
                "window {} is already associated with a widget",
                node.handle
            )));
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let id = WidgetId::new(index, slot.generation);
        node.id = id;
        let handle = node.handle;
        slot.node = Some(node);
        self.handles.insert(handle, id);

        let restack = match parent {
            Some(parent) => {
                self.link_top(id, parent)?;
                self.set_layer(id, layer)?
            }
            None => None,
        };
        trace!("Widget {} inserted for window {}", id, handle);
        Ok((id, restack))
    }

    /// Detach a widget and drop it together with all descendants.
    ///
    /// Descendants are disassociated first, deepest first, so the returned
    /// list ends with `id` itself.
    pub fn remove(&mut self, id: WidgetId) -> Result<Vec<WidgetNode>> {
        let order = self.subtree(id)?;
        self.unlink(id)?;
        let mut removed = Vec::with_capacity(order.len());
        for cur in order {
            let slot = &mut self.slots[cur.index()];
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(cur.index() as u32);
                self.handles.remove(&node.handle);
                removed.push(node);
            }
        }
        Ok(removed)
    }

    /// `id` and every descendant, children before their parents
    pub fn subtree(&self, id: WidgetId) -> Result<Vec<WidgetId>> {
        self.get(id)?;
        let mut out = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((cur, expanded)) = stack.pop() {
            if expanded {
                out.push(cur);
                continue;
            }
            stack.push((cur, true));
            for child in self.children(cur)? {
                stack.push((child, false));
            }
        }
        Ok(out)
    }

    /// Children, topmost first
    pub fn children(&self, id: WidgetId) -> Result<Vec<WidgetId>> {
        let mut out = Vec::new();
        let mut cur = self.get(id)?.top_child;
        while let Some(child) = cur {
            out.push(child);
            cur = self.get(child)?.next_below;
        }
        Ok(out)
    }

    pub fn child_count(&self, id: WidgetId) -> Result<usize> {
        Ok(self.children(id)?.len())
    }

    pub fn parent(&self, id: WidgetId) -> Result<Option<WidgetId>> {
        Ok(self.get(id)?.parent)
    }

    pub fn next_above(&self, id: WidgetId) -> Result<Option<WidgetId>> {
        Ok(self.get(id)?.next_above)
    }

    pub fn next_below(&self, id: WidgetId) -> Result<Option<WidgetId>> {
        Ok(self.get(id)?.next_below)
    }

    /// True when `ancestor` is a strict ancestor of `id`
    pub fn is_ancestor(&self, ancestor: WidgetId, id: WidgetId) -> Result<bool> {
        let mut cur = self.get(id)?.parent;
        while let Some(p) = cur {
            if p == ancestor {
                return Ok(true);
            }
            cur = self.get(p)?.parent;
        }
        Ok(false)
    }

    /// Nearest widget (self included) whose capabilities match
    pub fn find_ancestor(&self, id: WidgetId, caps: Capabilities) -> Result<Option<WidgetId>> {
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.get(c)?;
            if node.capabilities.intersects(caps) {
                return Ok(Some(c));
            }
            cur = node.parent;
        }
        Ok(None)
    }

    pub fn top_level(&self, id: WidgetId) -> Result<Option<WidgetId>> {
        self.find_ancestor(id, Capabilities::TOP_LEVEL)
    }

    /// Top-level or popup owning the keyboard focus for `id`
    pub fn focus_scope(&self, id: WidgetId) -> Result<Option<WidgetId>> {
        self.find_ancestor(id, Capabilities::TOP_LEVEL | Capabilities::POPUP)
    }

    /// Ancestor (or self) that is a direct child of a root widget
    pub fn child_of_root(&self, id: WidgetId) -> Result<WidgetId> {
        let mut cur = id;
        loop {
            let node = self.get(cur)?;
            match node.parent {
                Some(parent) if !self.get(parent)?.is_root() => cur = parent,
                _ => return Ok(cur),
            }
        }
    }

    /// Every ancestor is mapped (roots always are)
    pub fn ancestors_mapped(&self, id: WidgetId) -> Result<bool> {
        let mut cur = self.get(id)?.parent;
        while let Some(p) = cur {
            let node = self.get(p)?;
            if !node.mapped {
                return Ok(false);
            }
            cur = node.parent;
        }
        Ok(true)
    }

    /// Mapped and every ancestor mapped
    pub fn is_viewable(&self, id: WidgetId) -> Result<bool> {
        Ok(self.get(id)?.mapped && self.ancestors_mapped(id)?)
    }

    /// Bounds of the mapped children, in the parent's coordinates
    pub fn mapped_child_bounds(&self, id: WidgetId) -> Result<Vec<Rect>> {
        let mut out = Vec::new();
        for child in self.children(id)? {
            let node = self.get(child)?;
            if node.mapped {
                out.push(node.bounds);
            }
        }
        Ok(out)
    }

    /// Returns whether the flag changed
    pub fn set_mapped(&mut self, id: WidgetId, mapped: bool) -> Result<bool> {
        let node = self.get_mut(id)?;
        let changed = node.mapped != mapped;
        node.mapped = mapped;
        Ok(changed)
    }

    // Coordinate transforms

    /// Widget coordinates to root coordinates
    pub fn to_root(&self, id: WidgetId, point: Point) -> Result<Point> {
        let mut out = point;
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = self.get(c)?;
            if node.is_root() {
                break;
            }
            out.x += node.bounds.x;
            out.y += node.bounds.y;
            cur = node.parent;
        }
        Ok(out)
    }

    /// Root coordinates to widget coordinates
    pub fn from_root(&self, id: WidgetId, point: Point) -> Result<Point> {
        let origin = self.to_root(id, Point::default())?;
        Ok(Point::new(point.x - origin.x, point.y - origin.y))
    }

    /// Widget rectangle in root coordinates
    pub fn root_bounds(&self, id: WidgetId) -> Result<Rect> {
        let node = self.get(id)?;
        let origin = self.to_root(id, Point::default())?;
        Ok(Rect::new(
            origin.x,
            origin.y,
            node.bounds.width,
            node.bounds.height,
        ))
    }

    // Stacking

    /// Move to the top of the widget's own layer
    pub fn raise(&mut self, id: WidgetId) -> Result<Option<Restack>> {
        let node = self.get(id)?;
        let layer = node.layer;
        let mut last = id;
        let mut cur = node.next_above;
        while let Some(sibling) = cur {
            let sib = self.get(sibling)?;
            if sib.layer != layer {
                break;
            }
            last = sibling;
            cur = sib.next_above;
        }
        if last == id {
            return Ok(None);
        }
        self.reposition_above(id, last).map(Some)
    }

    /// Move to the bottom of the widget's own layer
    pub fn lower(&mut self, id: WidgetId) -> Result<Option<Restack>> {
        let node = self.get(id)?;
        let layer = node.layer;
        let mut last = id;
        let mut cur = node.next_below;
        while let Some(sibling) = cur {
            let sib = self.get(sibling)?;
            if sib.layer != layer {
                break;
            }
            last = sibling;
            cur = sib.next_below;
        }
        if last == id {
            return Ok(None);
        }
        self.reposition_below(id, last).map(Some)
    }

    /// Place directly above `sibling`; ignored when the layers differ
    pub fn move_to_above(&mut self, id: WidgetId, sibling: WidgetId) -> Result<Option<Restack>> {
        if !self.same_layer_siblings(id, sibling)? {
            return Ok(None);
        }
        if self.get(id)?.next_below == Some(sibling) {
            return Ok(None);
        }
        self.reposition_above(id, sibling).map(Some)
    }

    /// Place directly below `sibling`; ignored when the layers differ
    pub fn move_to_below(&mut self, id: WidgetId, sibling: WidgetId) -> Result<Option<Restack>> {
        if !self.same_layer_siblings(id, sibling)? {
            return Ok(None);
        }
        if self.get(id)?.next_above == Some(sibling) {
            return Ok(None);
        }
        self.reposition_below(id, sibling).map(Some)
    }

    /// Change the layer and re-splice next to the first sibling of the
    /// new layer range. Raising the layer leaves the widget below siblings
    /// already at that layer; lowering it leaves the widget above them.
    pub fn set_layer(&mut self, id: WidgetId, layer: i32) -> Result<Option<Restack>> {
        let node = self.get_mut(id)?;
        let old = node.layer;
        node.layer = layer;
        if node.parent.is_none() || layer == old {
            return Ok(None);
        }

        let mut target = None;
        if layer > old {
            let mut cur = self.get(id)?.next_above;
            while let Some(sibling) = cur {
                let sib = self.get(sibling)?;
                if sib.layer >= layer {
                    break;
                }
                target = Some(sibling);
                cur = sib.next_above;
            }
            match target {
                Some(sibling) => self.reposition_above(id, sibling).map(Some),
                None => Ok(None),
            }
        } else {
            let mut cur = self.get(id)?.next_below;
            while let Some(sibling) = cur {
                let sib = self.get(sibling)?;
                if sib.layer <= layer {
                    break;
                }
                target = Some(sibling);
                cur = sib.next_below;
            }
            match target {
                Some(sibling) => self.reposition_below(id, sibling).map(Some),
                None => Ok(None),
            }
        }
    }

    /// Move under a new parent at `(x, y)`, keeping the layer.
    ///
    /// The widget is attached on top with the maximal layer (where the server
    /// puts a freshly reparented window) and then sunk back to its layer.
    pub fn reparent(
        &mut self,
        id: WidgetId,
        new_parent: WidgetId,
        x: i32,
        y: i32,
    ) -> Result<Option<Restack>> {
        let node = self.get(id)?;
        if node.parent.is_none() {
            return Err(ToolkitError::invalid_operation("cannot reparent a root widget"));
        }
        if id == new_parent || self.is_ancestor(id, new_parent)? {
            return Err(ToolkitError::invalid_operation(
                "cannot reparent a widget into its own subtree",
            ));
        }
        if node.screen != self.get(new_parent)?.screen {
            return Err(ToolkitError::invalid_operation(
                "cannot reparent a widget to another screen",
            ));
        }

        let layer = node.layer;
        self.unlink(id)?;
        {
            let node = self.get_mut(id)?;
            node.layer = i32::MAX;
            node.bounds.x = x;
            node.bounds.y = y;
        }
        self.link_top(id, new_parent)?;
        self.set_layer(id, layer)
    }

    fn same_layer_siblings(&self, id: WidgetId, sibling: WidgetId) -> Result<bool> {
        if id == sibling {
            return Ok(false);
        }
        let a = self.get(id)?;
        let b = self.get(sibling)?;
        if a.parent.is_none() || a.parent != b.parent {
            return Err(ToolkitError::invalid_operation(format!(
                "widget {} is not a sibling of {}",
                sibling, id
            )));
        }
        Ok(a.layer == b.layer)
    }

    fn reposition_above(&mut self, id: WidgetId, sibling: WidgetId) -> Result<Restack> {
        self.unlink(id)?;
        self.link_above(id, sibling)?;
        Ok(Restack {
            widget: id,
            sibling,
            mode: StackMode::Above,
        })
    }

    fn reposition_below(&mut self, id: WidgetId, sibling: WidgetId) -> Result<Restack> {
        self.unlink(id)?;
        self.link_below(id, sibling)?;
        Ok(Restack {
            widget: id,
            sibling,
            mode: StackMode::Below,
        })
    }

    fn unlink(&mut self, id: WidgetId) -> Result<()> {
        let node = self.get(id)?;
        let (parent, above, below) = (node.parent, node.next_above, node.next_below);
        match above {
            Some(above) => self.get_mut(above)?.next_below = below,
            None => {
                if let Some(parent) = parent {
                    let parent = self.get_mut(parent)?;
                    if parent.top_child == Some(id) {
                        parent.top_child = below;
                    }
                }
            }
        }
        if let Some(below) = below {
            self.get_mut(below)?.next_above = above;
        }
        let node = self.get_mut(id)?;
        node.next_above = None;
        node.next_below = None;
        Ok(())
    }

    fn link_top(&mut self, id: WidgetId, parent: WidgetId) -> Result<()> {
        let top = self.get(parent)?.top_child;
        {
            let node = self.get_mut(id)?;
            node.parent = Some(parent);
            node.next_above = None;
            node.next_below = top;
        }
        if let Some(top) = top {
            self.get_mut(top)?.next_above = Some(id);
        }
        self.get_mut(parent)?.top_child = Some(id);
        Ok(())
    }

    fn link_above(&mut self, id: WidgetId, sibling: WidgetId) -> Result<()> {
        let sib = self.get(sibling)?;
        let (parent, above) = (sib.parent, sib.next_above);
        {
            let node = self.get_mut(id)?;
            node.parent = parent;
            node.next_above = above;
            node.next_below = Some(sibling);
        }
        match above {
            Some(above) => self.get_mut(above)?.next_below = Some(id),
            None => {
                if let Some(parent) = parent {
                    self.get_mut(parent)?.top_child = Some(id);
                }
            }
        }
        self.get_mut(sibling)?.next_above = Some(id);
        Ok(())
    }

    fn link_below(&mut self, id: WidgetId, sibling: WidgetId) -> Result<()> {
        let sib = self.get(sibling)?;
        let (parent, below) = (sib.parent, sib.next_below);
        {
            let node = self.get_mut(id)?;
            node.parent = parent;
            node.next_above = Some(sibling);
            node.next_below = below;
        }
        if let Some(below) = below {
            self.get_mut(below)?.next_above = Some(id);
        }
        self.get_mut(sibling)?.next_below = Some(id);
        Ok(())
    }

    // Sensitivity

    /// Change a widget's own sensitivity. Returns every widget whose
    /// effective sensitivity changed, with its new value, parents first.
    pub fn set_sensitive(&mut self, id: WidgetId, sensitive: bool) -> Result<Vec<(WidgetId, bool)>> {
        let node = self.get_mut(id)?;
        if node.sensitive == sensitive {
            return Ok(Vec::new());
        }
        let before = node.is_fully_sensitive();
        node.sensitive = sensitive;
        let after = node.is_fully_sensitive();
        let mut changes = Vec::new();
        if before != after {
            changes.push((id, after));
            self.propagate_sensitivity(id, after, &mut changes)?;
        }
        Ok(changes)
    }

    /// Recompute inherited sensitivity after a reparent
    pub fn refresh_sensitivity(&mut self, id: WidgetId) -> Result<Vec<(WidgetId, bool)>> {
        let inherited = match self.get(id)?.parent {
            Some(parent) => self.get(parent)?.is_fully_sensitive(),
            None => true,
        };
        let node = self.get_mut(id)?;
        let before = node.is_fully_sensitive();
        node.ancestor_sensitive = inherited;
        let after = node.is_fully_sensitive();
        let mut changes = Vec::new();
        if before != after {
            changes.push((id, after));
            self.propagate_sensitivity(id, after, &mut changes)?;
        }
        Ok(changes)
    }

    fn propagate_sensitivity(
        &mut self,
        id: WidgetId,
        effective: bool,
        changes: &mut Vec<(WidgetId, bool)>,
    ) -> Result<()> {
        let mut stack = vec![(id, effective)];
        while let Some((cur, effective)) = stack.pop() {
            for child in self.children(cur)? {
                let node = self.get_mut(child)?;
                let before = node.is_fully_sensitive();
                node.ancestor_sensitive = effective;
                let after = node.is_fully_sensitive();
                if before != after {
                    changes.push((child, after));
                    stack.push((child, after));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::widget::{NullHandler, WidgetOptions};

    struct Fixture {
        tree: WidgetTree,
        root: WidgetId,
        next_handle: WindowHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let mut tree = WidgetTree::new();
            let options = WidgetOptions::new(Rect::sized(1000, 1000))
                .with_capabilities(Capabilities::ROOT);
            let mut node = WidgetNode::new(1, 0, &options, Arc::new(NullHandler));
            node.mapped = true;
            let (root, _) = tree.insert(node, None).unwrap();
            Self {
                tree,
                root,
                next_handle: 100,
            }
        }

        fn add(&mut self, parent: WidgetId, bounds: Rect, layer: i32) -> WidgetId {
            self.next_handle += 1;
            let options = WidgetOptions::new(bounds).with_layer(layer);
            let node = WidgetNode::new(self.next_handle, 0, &options, Arc::new(NullHandler));
            let (id, _) = self.tree.insert(node, Some(parent)).unwrap();
            self.tree.set_mapped(id, true).unwrap();
            id
        }

        fn order(&self) -> Vec<WidgetId> {
            self.tree.children(self.root).unwrap()
        }

        fn assert_links(&self, parent: WidgetId) {
            let children = self.tree.children(parent).unwrap();
            for pair in children.windows(2) {
                assert_eq!(self.tree.next_below(pair[0]).unwrap(), Some(pair[1]));
                assert_eq!(self.tree.next_above(pair[1]).unwrap(), Some(pair[0]));
                let (upper, lower) = (
                    self.tree.get(pair[0]).unwrap().layer,
                    self.tree.get(pair[1]).unwrap().layer,
                );
                assert!(upper >= lower, "layers out of order: {} above {}", upper, lower);
            }
            if let Some(first) = children.first() {
                assert_eq!(self.tree.next_above(*first).unwrap(), None);
            }
        }
    }

    #[test]
    fn test_raise_then_layer_change() {
        let mut f = Fixture::new();
        let a = f.add(f.root, Rect::new(0, 0, 10, 10), 0);
        let b = f.add(f.root, Rect::new(0, 0, 10, 10), 0);
        f.tree.raise(b).unwrap();
        assert_eq!(f.order(), vec![b, a]);

        let restack = f.tree.set_layer(a, 5).unwrap();
        assert_eq!(f.order(), vec![a, b]);
        assert_eq!(
            restack,
            Some(Restack {
                widget: a,
                sibling: b,
                mode: StackMode::Above
            })
        );
        f.assert_links(f.root);
    }

    #[test]
    fn test_new_widget_lands_on_top_of_its_layer() {
        let mut f = Fixture::new();
        let high = f.add(f.root, Rect::sized(5, 5), 3);
        let low = f.add(f.root, Rect::sized(5, 5), -2);
        let a = f.add(f.root, Rect::sized(5, 5), 0);
        let b = f.add(f.root, Rect::sized(5, 5), 0);
        assert_eq!(f.order(), vec![high, b, a, low]);
        f.assert_links(f.root);
    }

    #[test]
    fn test_raise_and_lower_stay_within_layer() {
        let mut f = Fixture::new();
        let high = f.add(f.root, Rect::sized(5, 5), 1);
        let a = f.add(f.root, Rect::sized(5, 5), 0);
        let b = f.add(f.root, Rect::sized(5, 5), 0);
        let c = f.add(f.root, Rect::sized(5, 5), 0);
        let low = f.add(f.root, Rect::sized(5, 5), -1);
        assert_eq!(f.order(), vec![high, c, b, a, low]);

        f.tree.raise(a).unwrap();
        assert_eq!(f.order(), vec![high, a, c, b, low]);
        f.tree.lower(a).unwrap();
        assert_eq!(f.order(), vec![high, c, b, a, low]);

        // Already at the extreme of its layer
        assert_eq!(f.tree.lower(a).unwrap(), None);
        assert_eq!(f.tree.raise(high).unwrap(), None);
        f.assert_links(f.root);
    }

    #[test]
    fn test_move_to_above_requires_shared_layer() {
        let mut f = Fixture::new();
        let a = f.add(f.root, Rect::sized(5, 5), 0);
        let b = f.add(f.root, Rect::sized(5, 5), 0);
        let c = f.add(f.root, Rect::sized(5, 5), 2);
        assert_eq!(f.order(), vec![c, b, a]);

        assert_eq!(f.tree.move_to_above(a, c).unwrap(), None);
        assert_eq!(f.order(), vec![c, b, a]);

        let restack = f.tree.move_to_above(a, b).unwrap().unwrap();
        assert_eq!(restack.sibling, b);
        assert_eq!(f.order(), vec![c, a, b]);

        f.tree.move_to_below(a, b).unwrap();
        assert_eq!(f.order(), vec![c, b, a]);
        f.assert_links(f.root);
    }

    #[test]
    fn test_move_to_above_rejects_non_siblings() {
        let mut f = Fixture::new();
        let a = f.add(f.root, Rect::sized(5, 5), 0);
        let inner = f.add(a, Rect::sized(2, 2), 0);
        let b = f.add(f.root, Rect::sized(5, 5), 0);
        assert!(matches!(
            f.tree.move_to_above(inner, b),
            Err(ToolkitError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_lowering_layer_sinks_past_higher_siblings() {
        let mut f = Fixture::new();
        let a = f.add(f.root, Rect::sized(5, 5), 0);
        let b = f.add(f.root, Rect::sized(5, 5), 0);
        let low = f.add(f.root, Rect::sized(5, 5), -3);
        assert_eq!(f.order(), vec![b, a, low]);

        f.tree.set_layer(b, -3).unwrap();
        assert_eq!(f.order(), vec![a, b, low]);
        f.tree.set_layer(b, -5).unwrap();
        assert_eq!(f.order(), vec![a, low, b]);
        f.assert_links(f.root);
    }

    #[test]
    fn test_reparent_keeps_layer_and_moves_under_new_parent() {
        let mut f = Fixture::new();
        let left = f.add(f.root, Rect::new(0, 0, 100, 100), 0);
        let right = f.add(f.root, Rect::new(100, 0, 100, 100), 0);
        let r1 = f.add(right, Rect::sized(5, 5), 1);
        let r0 = f.add(right, Rect::sized(5, 5), 0);
        let child = f.add(left, Rect::sized(5, 5), 0);

        f.tree.reparent(child, right, 7, 8).unwrap();
        assert_eq!(f.tree.children(left).unwrap(), vec![]);
        assert_eq!(f.tree.children(right).unwrap(), vec![r1, child, r0]);
        assert_eq!(f.tree.parent(child).unwrap(), Some(right));
        assert_eq!(f.tree.get(child).unwrap().layer, 0);
        assert_eq!(
            f.tree.to_root(child, Point::new(1, 1)).unwrap(),
            Point::new(108, 9)
        );
        f.assert_links(right);
    }

    #[test]
    fn test_reparent_rejects_cycles_and_roots() {
        let mut f = Fixture::new();
        let a = f.add(f.root, Rect::sized(50, 50), 0);
        let b = f.add(a, Rect::sized(10, 10), 0);
        assert!(f.tree.reparent(a, b, 0, 0).is_err());
        assert!(f.tree.reparent(a, a, 0, 0).is_err());
        assert!(f.tree.reparent(f.root, a, 0, 0).is_err());
    }

    #[test]
    fn test_remove_drops_subtree_and_handles() {
        let mut f = Fixture::new();
        let a = f.add(f.root, Rect::sized(50, 50), 0);
        let b = f.add(a, Rect::sized(10, 10), 0);
        let c = f.add(b, Rect::sized(5, 5), 0);
        let sibling = f.add(f.root, Rect::sized(50, 50), 0);
        let handle_c = f.tree.get(c).unwrap().handle;

        let removed = f.tree.remove(a).unwrap();
        let ids: Vec<_> = removed.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![c, b, a]);
        assert!(!f.tree.contains(a));
        assert!(!f.tree.contains(c));
        assert_eq!(f.tree.lookup(handle_c), None);
        assert_eq!(f.order(), vec![sibling]);
        assert_eq!(f.tree.get(b).unwrap_err(), ToolkitError::WidgetDestroyed(b));
    }

    #[test]
    fn test_stale_id_does_not_alias_reused_slot() {
        let mut f = Fixture::new();
        let a = f.add(f.root, Rect::sized(5, 5), 0);
        f.tree.remove(a).unwrap();
        let b = f.add(f.root, Rect::sized(5, 5), 0);
        assert_eq!(a.index(), b.index());
        assert!(!f.tree.contains(a));
        assert!(f.tree.contains(b));
    }

    #[test]
    fn test_sensitivity_propagates_to_descendants() {
        let mut f = Fixture::new();
        let a = f.add(f.root, Rect::sized(50, 50), 0);
        let b = f.add(a, Rect::sized(10, 10), 0);
        let c = f.add(b, Rect::sized(5, 5), 0);
        f.tree.set_sensitive(c, false).unwrap();

        let changes = f.tree.set_sensitive(a, false).unwrap();
        // `c` was already insensitive on its own
        assert_eq!(changes, vec![(a, false), (b, false)]);

        let changes = f.tree.set_sensitive(a, true).unwrap();
        assert_eq!(changes, vec![(a, true), (b, true)]);
        assert!(!f.tree.get(c).unwrap().is_fully_sensitive());
        assert!(f.tree.get(c).unwrap().ancestor_sensitive);
    }

    #[test]
    fn test_coordinate_round_trip_through_deep_nesting() {
        let mut f = Fixture::new();
        let mut cur = f.root;
        for _ in 0..200 {
            cur = f.add(cur, Rect::new(1, 2, 500, 500), 0);
        }
        let root_point = f.tree.to_root(cur, Point::new(3, 4)).unwrap();
        assert_eq!(root_point, Point::new(203, 404));
        assert_eq!(f.tree.from_root(cur, root_point).unwrap(), Point::new(3, 4));
        assert_eq!(f.tree.subtree(f.root).unwrap().len(), 201);
    }

    #[test]
    fn test_child_of_root_and_mapped_ancestors() {
        let mut f = Fixture::new();
        let top = f.add(f.root, Rect::sized(50, 50), 0);
        let mid = f.add(top, Rect::sized(20, 20), 0);
        let leaf = f.add(mid, Rect::sized(5, 5), 0);
        assert_eq!(f.tree.child_of_root(leaf).unwrap(), top);
        assert_eq!(f.tree.child_of_root(top).unwrap(), top);
        assert!(f.tree.ancestors_mapped(leaf).unwrap());
        f.tree.set_mapped(mid, false).unwrap();
        assert!(!f.tree.ancestors_mapped(leaf).unwrap());
        assert!(!f.tree.is_viewable(mid).unwrap());
    }
}
