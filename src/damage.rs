//! Damage Engine
//!
//! Two pending lists feed repaints:
//!
//! * the **expose** list holds damage reported by the server; the event loop
//!   drains it when no protocol event is waiting, painting each widget once
//!   with its accumulated region as the clip;
//! * the **invalidate** list holds damage requested by the program; it is
//!   flushed at the top of every loop iteration, so requests made by several
//!   handlers coalesce before anything is cleared or painted.
//!
//! A widget sits on at most one of the lists. Its pending region lives in
//! its [`DamageState`], and the state variant records which list it is on.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::Result;
use crate::geometry::Rect;
use crate::region::Region;
use crate::transport::WindowHandle;
use crate::widget::{WidgetId, WidgetTree};

/// Pending damage of one widget
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DamageState {
    #[default]
    Idle,
    /// On the expose list
    Exposed(Region),
    /// On the invalidate list
    Invalidated(Region),
}

impl DamageState {
    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn region(&self) -> Option<&Region> {
        match self {
            Self::Idle => None,
            Self::Exposed(region) | Self::Invalidated(region) => Some(region),
        }
    }
}

/// Server clear requested by an invalidate flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundClear {
    pub widget: WidgetId,
    pub window: WindowHandle,
    pub rects: Vec<Rect>,
}

/// Connection-wide pending lists
#[derive(Debug, Default)]
pub struct DamageQueues {
    expose: VecDeque<WidgetId>,
    invalidate: VecDeque<WidgetId>,
}

/// Restrict `region` to the widget's own area minus its mapped children.
///
/// Anything cleared or painted for a widget goes through here first, so an
/// ancestor's background never wipes a child.
pub fn clip_to_widget(tree: &WidgetTree, id: WidgetId, region: &Region) -> Result<Region> {
    let node = tree.get(id)?;
    let mut clipped = region.clone();
    clipped.intersect_rect(Rect::sized(node.bounds.width, node.bounds.height));
    for child in tree.mapped_child_bounds(id)? {
        clipped.subtract_rect(child);
    }
    Ok(clipped)
}

impl DamageQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate server-reported damage. Returns true when the widget was
    /// newly registered on a list.
    pub fn expose(&mut self, tree: &mut WidgetTree, id: WidgetId, rect: Rect) -> Result<bool> {
        let node = tree.get_mut(id)?;
        if !node.is_paintable() || rect.is_empty() {
            return Ok(false);
        }
        if let DamageState::Exposed(pending) | DamageState::Invalidated(pending) = &mut node.damage {
            pending.union_rect(rect);
            return Ok(false);
        }
        node.damage = DamageState::Exposed(Region::from_rect(rect));
        self.expose.push_back(id);
        trace!("Widget {} registered for expose", id);
        Ok(true)
    }

    /// Accumulate program-requested damage. Widgets that cannot show
    /// anything (unmapped, or an ancestor unmapped) are skipped.
    pub fn invalidate(
        &mut self,
        tree: &mut WidgetTree,
        id: WidgetId,
        region: &Region,
    ) -> Result<bool> {
        if region.is_empty() || !tree.is_viewable(id)? {
            return Ok(false);
        }
        let node = tree.get_mut(id)?;
        if !node.is_paintable() {
            return Ok(false);
        }
        if let DamageState::Exposed(pending) | DamageState::Invalidated(pending) = &mut node.damage {
            pending.union(region);
            return Ok(false);
        }
        node.damage = DamageState::Invalidated(region.clone());
        self.invalidate.push_back(id);
        trace!("Widget {} registered for invalidate", id);
        Ok(true)
    }

    /// Empty the invalidate list.
    ///
    /// Widgets that draw their background get a server clear (which comes
    /// back as exposes); the others move their clipped region straight onto
    /// the expose list.
    pub fn flush_invalidates(&mut self, tree: &mut WidgetTree) -> Result<Vec<BackgroundClear>> {
        let mut clears = Vec::new();
        while let Some(id) = self.invalidate.pop_front() {
            let Ok(node) = tree.get_mut(id) else {
                continue;
            };
            let DamageState::Invalidated(region) = std::mem::take(&mut node.damage) else {
                continue;
            };
            let draw_background = node.draw_background;
            let window = node.handle;
            let clipped = clip_to_widget(tree, id, &region)?;
            if clipped.is_empty() {
                continue;
            }
            if draw_background {
                clears.push(BackgroundClear {
                    widget: id,
                    window,
                    rects: clipped.into_rectangles(),
                });
            } else {
                tree.get_mut(id)?.damage = DamageState::Exposed(clipped);
                self.expose.push_back(id);
            }
        }
        Ok(clears)
    }

    /// Detach the next widget from the expose list with its clipped region.
    /// Destroyed widgets and widgets whose damage was dropped are skipped.
    pub fn next_expose(&mut self, tree: &mut WidgetTree) -> Result<Option<(WidgetId, Region)>> {
        while let Some(id) = self.expose.pop_front() {
            let Ok(node) = tree.get_mut(id) else {
                continue;
            };
            let DamageState::Exposed(region) = std::mem::take(&mut node.damage) else {
                continue;
            };
            let clipped = clip_to_widget(tree, id, &region)?;
            if !clipped.is_empty() {
                return Ok(Some((id, clipped)));
            }
        }
        Ok(None)
    }

    /// Take whatever damage is pending for one widget, off either list
    pub fn take_pending(&mut self, tree: &mut WidgetTree, id: WidgetId) -> Result<Option<Region>> {
        let node = tree.get_mut(id)?;
        let region = match std::mem::take(&mut node.damage) {
            DamageState::Idle => return Ok(None),
            DamageState::Exposed(region) | DamageState::Invalidated(region) => region,
        };
        self.expose.retain(|other| *other != id);
        self.invalidate.retain(|other| *other != id);
        Ok(Some(region))
    }

    /// Drop pending damage of the given widgets (unmap, destroy)
    pub fn forget(&mut self, tree: &mut WidgetTree, ids: &[WidgetId]) {
        for id in ids {
            if let Ok(node) = tree.get_mut(*id) {
                node.damage = DamageState::Idle;
            }
        }
        self.expose.retain(|id| !ids.contains(id));
        self.invalidate.retain(|id| !ids.contains(id));
    }

    pub fn has_exposes(&self) -> bool {
        !self.expose.is_empty()
    }

    pub fn has_invalidates(&self) -> bool {
        !self.invalidate.is_empty()
    }

    pub fn is_registered(&self, id: WidgetId) -> bool {
        self.expose.contains(&id) || self.invalidate.contains(&id)
    }

    /// Registrations on the expose list
    pub fn expose_len(&self) -> usize {
        self.expose.len()
    }

    /// Registrations on the invalidate list
    pub fn invalidate_len(&self) -> usize {
        self.invalidate.len()
    }
}
