//! Clipped drawing
//!
//! A [`Painter`] is what a paint handler draws with. Everything it draws is
//! intersected with its clip region, which starts out as the damage being
//! repaired, so a handler can simply paint its whole widget and only the
//! damaged part reaches the server.

use crate::display::Display;
use crate::error::Result;
use crate::geometry::Rect;
use crate::region::Region;
use crate::transport::{Background, WindowHandle};
use crate::widget::WidgetId;

pub struct Painter<'a> {
    display: &'a Display,
    widget: WidgetId,
    window: WindowHandle,
    clip: Region,
}

impl<'a> Painter<'a> {
    pub(crate) fn new(display: &'a Display, widget: WidgetId, window: WindowHandle, clip: Region) -> Self {
        Self {
            display,
            widget,
            window,
            clip,
        }
    }

    pub fn display(&self) -> &'a Display {
        self.display
    }

    pub fn widget(&self) -> WidgetId {
        self.widget
    }

    /// Area being repainted, in widget coordinates
    pub fn clip(&self) -> &Region {
        &self.clip
    }

    /// Narrow the clip further
    pub fn restrict_clip(&mut self, region: &Region) {
        self.clip.intersect(region);
    }

    /// Current widget size at the origin
    pub fn bounds(&self) -> Result<Rect> {
        let bounds = self.display.bounds(self.widget)?;
        Ok(Rect::sized(bounds.width, bounds.height))
    }

    pub fn foreground(&self) -> Result<u32> {
        self.display.foreground(self.widget)
    }

    pub fn background(&self) -> Result<Background> {
        self.display.background(self.widget)
    }

    pub fn fill_rectangle(&mut self, rect: Rect, pixel: u32) -> Result<()> {
        self.fill_region(&Region::from_rect(rect), pixel)
    }

    /// Fill the clipped part of `region` with a solid pixel value
    pub fn fill_region(&mut self, region: &Region, pixel: u32) -> Result<()> {
        let mut clipped = region.clone();
        clipped.intersect(&self.clip);
        if clipped.is_empty() {
            return Ok(());
        }
        let mut state = self.display.lock()?;
        state.tree.get(self.widget)?;
        state
            .transport
            .fill_rectangles(self.window, pixel, clipped.rectangles())
    }

    /// Fill the whole clip with the foreground pixel
    pub fn fill_clip(&mut self) -> Result<()> {
        let pixel = self.foreground()?;
        let clip = self.clip.clone();
        self.fill_region(&clip, pixel)
    }

    /// Reset the clipped part of `rect` to the window background
    pub fn clear(&mut self, rect: Rect) -> Result<()> {
        let mut clipped = self.clip.clone();
        clipped.intersect_rect(rect);
        if clipped.is_empty() {
            return Ok(());
        }
        let mut state = self.display.lock()?;
        state.tree.get(self.widget)?;
        for rect in clipped.rectangles() {
            state.transport.clear_area(self.window, *rect, false)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::display::DisplayOptions;
    use crate::transport::recording::{RecordingTransport, Request};
    use crate::widget::{NullHandler, WidgetOptions};

    #[test]
    fn test_drawing_stays_inside_clip() {
        let (transport, handle) = RecordingTransport::new();
        let display = Display::open(Box::new(transport), DisplayOptions::default()).unwrap();
        let root = display.default_root().unwrap();
        let widget = display
            .create_widget(
                root,
                WidgetOptions::paintable(Rect::new(0, 0, 100, 100)),
                Arc::new(NullHandler),
            )
            .unwrap();
        let window = display.window_handle(widget).unwrap();
        handle.take_requests();

        let mut painter = Painter::new(
            &display,
            widget,
            window,
            Region::from_rect(Rect::new(0, 0, 10, 10)),
        );
        painter.fill_rectangle(Rect::new(5, 5, 50, 50), 7).unwrap();
        painter.fill_rectangle(Rect::new(50, 50, 5, 5), 7).unwrap();
        painter.clear(Rect::new(0, 0, 3, 3)).unwrap();

        assert_eq!(
            handle.requests(),
            vec![
                Request::FillRectangles {
                    window,
                    pixel: 7,
                    rects: vec![Rect::new(5, 5, 5, 5)],
                },
                Request::ClearArea {
                    window,
                    rect: Rect::new(0, 0, 3, 3),
                    exposures: false,
                },
            ]
        );
    }

    #[test]
    fn test_painting_destroyed_widget_fails() {
        let (transport, _) = RecordingTransport::new();
        let display = Display::open(Box::new(transport), DisplayOptions::default()).unwrap();
        let root = display.default_root().unwrap();
        let widget = display
            .create_widget(
                root,
                WidgetOptions::paintable(Rect::new(0, 0, 10, 10)),
                Arc::new(NullHandler),
            )
            .unwrap();
        let window = display.window_handle(widget).unwrap();
        display.destroy(widget).unwrap();

        let mut painter = Painter::new(&display, widget, window, Region::from_rect(Rect::sized(10, 10)));
        assert!(matches!(
            painter.fill_rectangle(Rect::sized(5, 5), 1),
            Err(crate::error::ToolkitError::WidgetDestroyed(_))
        ));
    }
}
