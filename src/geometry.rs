//! Geometry primitives shared by the region engine and the widget tree.

use crate::error::{Result, ToolkitError};

/// Smallest coordinate the core protocol can carry (INT16)
pub const MIN_COORD: i32 = -32768;
/// Largest coordinate the core protocol can carry (INT16)
pub const MAX_COORD: i32 = 32767;
/// Largest window dimension accepted by the toolkit
pub const MAX_SIZE: i32 = 32767;
/// Regions keep every edge within `-REGION_LIMIT..=REGION_LIMIT` so span
/// widths always fit in an `i32`
pub const REGION_LIMIT: i32 = 1 << 29;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle; `x`/`y` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at the origin with the given size
    pub const fn sized(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Zero or negative area
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        !other.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    /// Overlapping area, `None` when the rectangles are disjoint or either is empty
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if self.is_empty() || other.is_empty() {
            return None;
        }
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 > x1 && y2 > y1 {
            Some(Rect::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1)))
        } else {
            None
        }
    }

    /// Smallest rectangle covering both; empty operands are ignored
    pub fn bounding_union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        Rect::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Clip to the region coordinate limit; the result may be empty
    pub(crate) fn clamped(&self) -> Rect {
        if self.is_empty() {
            return *self;
        }
        Rect::clamped_edges(
            i64::from(self.x),
            i64::from(self.y),
            i64::from(self.x) + i64::from(self.width),
            i64::from(self.y) + i64::from(self.height),
        )
    }

    /// Rectangle from wide edges clipped to the region coordinate limit
    pub(crate) fn clamped_edges(x1: i64, y1: i64, x2: i64, y2: i64) -> Rect {
        let limit = i64::from(REGION_LIMIT);
        let clamp = |v: i64| v.clamp(-limit, limit) as i32;
        let (x1, y1, x2, y2) = (clamp(x1), clamp(y1), clamp(x2), clamp(y2));
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Swap the axes (used by the region engine for vertical operations)
    pub(crate) fn transposed(&self) -> Rect {
        Rect::new(self.y, self.x, self.height, self.width)
    }
}

/// Reject coordinates the protocol cannot represent
pub fn validate_position(x: i32, y: i32) -> Result<()> {
    if !(MIN_COORD..=MAX_COORD).contains(&x) || !(MIN_COORD..=MAX_COORD).contains(&y) {
        return Err(ToolkitError::InvalidPosition { x, y });
    }
    Ok(())
}

/// Reject sizes outside `1..=MAX_SIZE`
pub fn validate_size(width: i32, height: i32) -> Result<()> {
    if !(1..=MAX_SIZE).contains(&width) || !(1..=MAX_SIZE).contains(&height) {
        return Err(ToolkitError::InvalidSize { width, height });
    }
    Ok(())
}

/// Position and size checks for a full widget rectangle
pub fn validate_bounds(bounds: &Rect) -> Result<()> {
    validate_position(bounds.x, bounds.y)?;
    validate_size(bounds.width, bounds.height)
}
