//! Popup activation and the per-screen grab catcher

use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, ToolkitError};
use crate::geometry::Rect;
use crate::transport::{Background, EventMask, WindowClass, WindowSpec};
use crate::widget::{Capabilities, NullHandler, WidgetId, WidgetNode, WidgetOptions};

use super::dispatch::GRAB_POINTER_MASK;
use super::{Delivery, Display, DisplayState};

impl Display {
    /// Move an active popup to the bottom of its screen's grab list, so
    /// overlapping popups above it win pointer hit tests.
    pub fn lower_popup(&self, popup: WidgetId) -> Result<bool> {
        let mut state = self.lock()?;
        let screen = state.tree.get(popup)?.screen;
        Ok(state.screens[screen].grab.lower(popup))
    }

    /// Popups currently holding the grab on a screen, bottom to top
    pub fn active_popups(&self, screen: usize) -> Result<Vec<WidgetId>> {
        Ok(self.lock()?.screen(screen)?.grab.popups().to_vec())
    }
}

impl DisplayState {
    /// Catcher window of a screen, created on first use: a 1x1 input-only
    /// window just off the top-left corner that stays mapped for the life
    /// of the connection.
    pub(crate) fn grab_catcher(&mut self, screen: usize) -> Result<WidgetId> {
        let (root, existing) = {
            let state = self.screen(screen)?;
            (state.root, state.catcher)
        };
        if let Some(catcher) = existing {
            return Ok(catcher);
        }

        let bounds = Rect::new(-1, -1, 1, 1);
        let root_window = self.tree.get(root)?.handle;
        let window = self.transport.create_window(&WindowSpec {
            parent: root_window,
            bounds,
            class: WindowClass::InputOnly,
            background: Background::ParentRelative,
            override_redirect: true,
        })?;
        self.transport.select_input(
            window,
            GRAB_POINTER_MASK | EventMask::KEY_PRESS | EventMask::KEY_RELEASE,
        )?;
        self.transport.map_window(window)?;

        let options = WidgetOptions::new(bounds)
            .with_capabilities(Capabilities::GRAB_CATCHER | Capabilities::OVERRIDE_REDIRECT)
            .with_focusable(false);
        let mut node = WidgetNode::new(window, screen, &options, Arc::new(NullHandler));
        node.mapped = true;
        let (catcher, restack) = self.tree.insert(node, Some(root))?;
        self.apply_restack(restack)?;
        self.screens[screen].catcher = Some(catcher);
        debug!("Grab catcher 0x{:x} created on screen {}", window, screen);
        Ok(catcher)
    }

    /// Put a mapped popup on top of its screen's grab list
    pub(crate) fn add_popup(&mut self, popup: WidgetId) -> Result<Vec<Delivery>> {
        let node = self.tree.get(popup)?;
        if !node.capabilities.contains(Capabilities::POPUP) {
            return Err(ToolkitError::invalid_operation(format!(
                "widget {} is not a popup",
                popup
            )));
        }
        let screen = node.screen;
        let actions = self.screens[screen].grab.add(popup);
        self.apply_grab_actions(screen, actions)
    }

    /// Take a popup off its screen's grab list
    pub(crate) fn remove_popup(&mut self, popup: WidgetId) -> Result<Vec<Delivery>> {
        let screen = self.tree.get(popup)?.screen;
        let actions = self.screens[screen].grab.remove(popup);
        self.apply_grab_actions(screen, actions)
    }
}
