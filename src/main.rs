//! area-toolkit demo
//!
//! Opens a top-level window with a blinking swatch and a button that drops
//! down a popup menu. Escape or the menu's last entry quits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use area_toolkit::config::Config;
use area_toolkit::{
    Background, ButtonEvent, CrossingEvent, Display, KeyEvent, Painter, Point, PointerEvent, Rect,
    WidgetHandler, WidgetId, WidgetOptions,
};

const XK_ESCAPE: u32 = 0xff1b;

const SWATCH_COLORS: [u32; 4] = [0xcc3333, 0x33cc33, 0x3333cc, 0xcccc33];
const MENU_ITEMS: [&str; 3] = ["Red", "Green", "Quit"];
const MENU_ITEM_HEIGHT: i32 = 24;
const MENU_WIDTH: i32 = 120;

/// Top-level window: Escape quits
struct MainWindow;

impl WidgetHandler for MainWindow {
    fn on_key_press(&self, display: &Display, _widget: WidgetId, event: &KeyEvent) -> area_toolkit::Result<bool> {
        if event.keysym == XK_ESCAPE {
            info!("Escape pressed, quitting");
            display.quit()?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Square that paints itself in its foreground color
struct Swatch;

impl WidgetHandler for Swatch {
    fn on_paint(&self, painter: &mut Painter<'_>) -> area_toolkit::Result<()> {
        painter.fill_clip()
    }
}

/// Button that opens the menu popup below itself
struct MenuButton {
    popup: Mutex<Option<WidgetId>>,
}

impl WidgetHandler for MenuButton {
    fn on_paint(&self, painter: &mut Painter<'_>) -> area_toolkit::Result<()> {
        let bounds = painter.bounds()?;
        let pixel = painter.foreground()?;
        // Three-line glyph
        for row in 0..3 {
            let y = bounds.height / 4 * (row + 1) - 1;
            painter.fill_rectangle(Rect::new(4, y, bounds.width - 8, 2), pixel)?;
        }
        Ok(())
    }

    fn on_button_press(&self, display: &Display, widget: WidgetId, event: &ButtonEvent) -> area_toolkit::Result<()> {
        if !display.is_select(event.button) {
            return Ok(());
        }
        let Some(popup) = self.popup.lock().ok().and_then(|slot| *slot) else {
            return Ok(());
        };
        if display.is_mapped(popup)? {
            return display.unmap(popup);
        }
        let height = display.bounds(widget)?.height;
        let origin = display.to_root(widget, Point::new(0, height))?;
        display.move_to(popup, origin.x, origin.y)?;
        display.map(popup)
    }
}

/// Popup menu; a press outside closes it
struct Menu {
    swatch: WidgetId,
    highlighted: Mutex<Option<usize>>,
}

impl Menu {
    fn item_at(y: i32) -> Option<usize> {
        (y >= 0)
            .then(|| (y / MENU_ITEM_HEIGHT) as usize)
            .filter(|&index| index < MENU_ITEMS.len())
    }

    fn activate(&self, display: &Display, item: usize) -> area_toolkit::Result<()> {
        debug!("Menu item '{}' activated", MENU_ITEMS[item]);
        match item {
            0 => display.set_foreground(self.swatch, SWATCH_COLORS[0])?,
            1 => display.set_foreground(self.swatch, SWATCH_COLORS[1])?,
            _ => return display.quit(),
        }
        display.repaint(self.swatch)
    }

    fn highlighted(&self) -> Option<usize> {
        self.highlighted.lock().ok().and_then(|guard| *guard)
    }

    fn set_highlighted(&self, display: &Display, widget: WidgetId, item: Option<usize>) -> area_toolkit::Result<()> {
        let Ok(mut guard) = self.highlighted.lock() else {
            return Ok(());
        };
        if *guard != item {
            *guard = item;
            drop(guard);
            display.repaint(widget)?;
        }
        Ok(())
    }
}

impl WidgetHandler for Menu {
    fn on_paint(&self, painter: &mut Painter<'_>) -> area_toolkit::Result<()> {
        let bounds = painter.bounds()?;
        let pixel = painter.foreground()?;
        painter.clear(bounds)?;
        for (index, _) in MENU_ITEMS.iter().enumerate() {
            let top = index as i32 * MENU_ITEM_HEIGHT;
            if Some(index) == self.highlighted() {
                painter.fill_rectangle(Rect::new(0, top, bounds.width, MENU_ITEM_HEIGHT), pixel)?;
            } else {
                painter.fill_rectangle(Rect::new(4, top + MENU_ITEM_HEIGHT - 1, bounds.width - 8, 1), pixel)?;
            }
        }
        Ok(())
    }

    fn on_pointer_motion(&self, display: &Display, widget: WidgetId, event: &PointerEvent) -> area_toolkit::Result<()> {
        let width = display.bounds(widget)?.width;
        let item = (event.x >= 0 && event.x < width)
            .then(|| Self::item_at(event.y))
            .flatten();
        self.set_highlighted(display, widget, item)
    }

    fn on_leave(
        &self,
        display: &Display,
        widget: WidgetId,
        _child: Option<WidgetId>,
        _event: &CrossingEvent,
    ) -> area_toolkit::Result<()> {
        self.set_highlighted(display, widget, None)
    }

    fn on_button_press(&self, display: &Display, widget: WidgetId, event: &ButtonEvent) -> area_toolkit::Result<()> {
        let bounds = display.bounds(widget)?;
        let inside = Rect::sized(bounds.width, bounds.height);
        if !inside.contains_point(event.pointer.x, event.pointer.y) {
            debug!("Press outside menu, closing");
            return display.unmap(widget);
        }
        Ok(())
    }

    fn on_button_release(&self, display: &Display, widget: WidgetId, event: &ButtonEvent) -> area_toolkit::Result<()> {
        let Some(item) = Self::item_at(event.pointer.y) else {
            return Ok(());
        };
        display.unmap(widget)?;
        self.activate(display, item)
    }

    fn on_key_press(&self, display: &Display, widget: WidgetId, event: &KeyEvent) -> area_toolkit::Result<bool> {
        if event.keysym == XK_ESCAPE {
            display.unmap(widget)?;
            return Ok(true);
        }
        Ok(false)
    }
}

fn build_ui(display: &Display, config: &Config) -> Result<()> {
    let root = display.default_root()?;
    let window = &config.window;

    let top = display.create_widget(
        root,
        WidgetOptions::top_level(
            Rect::new(window.x, window.y, window.width, window.height),
            window.title.clone(),
        )
        .with_background(Background::Pixel(0xdddddd)),
        Arc::new(MainWindow),
    )?;

    let swatch = display.create_widget(
        top,
        WidgetOptions::paintable(Rect::new(20, 60, 80, 80))
            .with_background(Background::Pixel(0xffffff))
            .with_foreground(SWATCH_COLORS[0]),
        Arc::new(Swatch),
    )?;

    let menu_handler = Arc::new(MenuButton {
        popup: Mutex::new(None),
    });
    let button = display.create_widget(
        top,
        WidgetOptions::paintable(Rect::new(20, 20, 32, 24))
            .with_background(Background::Pixel(0xbbbbbb))
            .with_foreground(0x333333),
        menu_handler.clone(),
    )?;

    let popup = display.create_widget(
        root,
        WidgetOptions::popup(Rect::new(
            0,
            0,
            MENU_WIDTH,
            MENU_ITEM_HEIGHT * MENU_ITEMS.len() as i32,
        ))
        .with_background(Background::Pixel(0xf4f4f4))
        .with_foreground(0x6688cc),
        Arc::new(Menu {
            swatch,
            highlighted: Mutex::new(None),
        }),
    )?;
    if let Ok(mut slot) = menu_handler.popup.lock() {
        *slot = Some(popup);
    }
    display.set_default_focus(button)?;

    let step = Arc::new(AtomicUsize::new(0));
    display.add_timer(
        Duration::from_millis(750),
        Some(Duration::from_millis(750)),
        move |display| {
            let next = step.fetch_add(1, Ordering::Relaxed) + 1;
            display.set_foreground(swatch, SWATCH_COLORS[next % SWATCH_COLORS.len()])?;
            display.repaint(swatch)
        },
    )?;

    display.map(top)?;
    info!("Demo window mapped ({}x{})", window.width, window.height);
    Ok(())
}

fn main() -> Result<()> {
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {:#}", e);
        Config::default()
    });
    config
        .apply_args(std::env::args().skip(1))
        .context("Invalid command line")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting area-toolkit demo");

    let display = Display::connect(config.display.name.as_deref(), config.display_options())
        .context("Failed to open display")?;
    build_ui(&display, &config)?;
    display.run()?;
    display.close()?;

    info!("Goodbye");
    Ok(())
}
