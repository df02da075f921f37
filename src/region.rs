//! Region engine
//!
//! A region is a set of non-overlapping rectangles kept in y-x banded form:
//! rectangles are sorted by `y` then `x`, every rectangle in a band shares the
//! same top and bottom, spans inside a band never touch, and vertically
//! adjacent bands with identical spans are merged. That form is canonical, so
//! two regions covering the same pixels compare equal.
//!
//! All operations are total. An empty operand behaves as the empty set and
//! zero-area rectangles are ignored. Operands are clipped to
//! [`REGION_LIMIT`](crate::geometry::REGION_LIMIT) on entry.

use crate::geometry::{Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Union,
    Intersect,
    Subtract,
    Xor,
}

impl SetOp {
    fn keep(self, in_a: bool, in_b: bool) -> bool {
        match self {
            SetOp::Union => in_a || in_b,
            SetOp::Intersect => in_a && in_b,
            SetOp::Subtract => in_a && !in_b,
            SetOp::Xor => in_a != in_b,
        }
    }
}

/// Normalized set of rectangles
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    /// Empty region
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.clamped();
        if rect.is_empty() {
            Self::new()
        } else {
            Self { rects: vec![rect] }
        }
    }

    /// Union of arbitrary (possibly overlapping) rectangles
    pub fn from_rects<I: IntoIterator<Item = Rect>>(rects: I) -> Self {
        let input: Vec<Rect> = rects
            .into_iter()
            .map(|r| r.clamped())
            .filter(|r| !r.is_empty())
            .collect();
        Self {
            rects: combine(&input, &[], SetOp::Union),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Rectangles in banded order
    pub fn rectangles(&self) -> &[Rect] {
        &self.rects
    }

    pub fn into_rectangles(self) -> Vec<Rect> {
        self.rects
    }

    pub fn set_empty(&mut self) {
        self.rects.clear();
    }

    pub fn union_rect(&mut self, rect: Rect) {
        let rect = rect.clamped();
        if rect.is_empty() {
            return;
        }
        self.apply(&[rect], SetOp::Union);
    }

    pub fn union(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.rects = other.rects.clone();
            return;
        }
        self.apply(&other.rects, SetOp::Union);
    }

    pub fn intersect_rect(&mut self, rect: Rect) {
        let rect = rect.clamped();
        if rect.is_empty() {
            self.set_empty();
            return;
        }
        self.apply(&[rect], SetOp::Intersect);
    }

    pub fn intersect(&mut self, other: &Region) {
        if other.is_empty() {
            self.set_empty();
            return;
        }
        self.apply(&other.rects, SetOp::Intersect);
    }

    pub fn subtract_rect(&mut self, rect: Rect) {
        let rect = rect.clamped();
        if rect.is_empty() {
            return;
        }
        self.apply(&[rect], SetOp::Subtract);
    }

    pub fn subtract(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        self.apply(&other.rects, SetOp::Subtract);
    }

    pub fn xor_rect(&mut self, rect: Rect) {
        let rect = rect.clamped();
        if rect.is_empty() {
            return;
        }
        self.apply(&[rect], SetOp::Xor);
    }

    pub fn xor(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        self.apply(&other.rects, SetOp::Xor);
    }

    /// Translate every rectangle
    pub fn offset(&mut self, dx: i32, dy: i32) {
        let moved: Vec<Rect> = self.rects.iter().map(|r| r.offset(dx, dy)).collect();
        if moved.iter().all(|r| r.clamped() == *r) {
            self.rects = moved;
        } else {
            // Clipped at the limit; renormalize
            self.rects = Region::from_rects(moved).rects;
        }
    }

    /// Move every edge inwards by `dx` horizontally and `dy` vertically.
    /// Negative amounts grow the region.
    pub fn shrink(&mut self, dx: i32, dy: i32) {
        if dx != 0 {
            self.rects = erode_horizontal(&self.rects, dx);
        }
        if dy != 0 {
            let transposed = Region::from_rects(self.rects.iter().map(Rect::transposed));
            let eroded = erode_horizontal(&transposed.rects, dy);
            self.rects = Region::from_rects(eroded.iter().map(Rect::transposed)).rects;
        }
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|r| r.contains_point(x, y))
    }

    pub fn contains(&self, point: Point) -> bool {
        self.contains_point(point.x, point.y)
    }

    /// Every pixel of `rect` is inside the region (false for empty rectangles)
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        if rect.is_empty() || self.is_empty() || rect.clamped() != *rect {
            return false;
        }
        combine(&[*rect], &self.rects, SetOp::Subtract).is_empty()
    }

    /// `other` is a subset of this region; the empty region is a subset of anything
    pub fn contains_region(&self, other: &Region) -> bool {
        combine(&other.rects, &self.rects, SetOp::Subtract).is_empty()
    }

    pub fn overlaps_rect(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|r| r.intersects(rect))
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.rects
            .iter()
            .any(|a| other.rects.iter().any(|b| a.intersects(b)))
    }

    /// Bounding rectangle; the default (empty) rectangle for an empty region
    pub fn clip_box(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::default(), |acc, r| acc.bounding_union(r))
    }

    fn apply(&mut self, other: &[Rect], op: SetOp) {
        self.rects = combine(&self.rects, other, op);
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

struct Band {
    bottom: i32,
    spans: Vec<(i32, i32)>,
    start: usize,
}

/// Band sweep shared by every boolean operation. Each pair of consecutive
/// y edges forms a band; since every input edge is a band boundary, an input
/// rectangle either covers a whole band or misses it.
fn combine(a: &[Rect], b: &[Rect], op: SetOp) -> Vec<Rect> {
    let mut edges: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|r| [r.y, r.bottom()])
        .collect();
    edges.sort_unstable();
    edges.dedup();

    let mut out: Vec<Rect> = Vec::new();
    let mut prev: Option<Band> = None;

    for pair in edges.windows(2) {
        let (top, bottom) = (pair[0], pair[1]);
        let spans = combine_spans(&band_spans(a, top, bottom), &band_spans(b, top, bottom), op);
        if spans.is_empty() {
            prev = None;
            continue;
        }

        if let Some(band) = prev.as_mut() {
            if band.bottom == top && band.spans == spans {
                for rect in &mut out[band.start..] {
                    rect.height = bottom - rect.y;
                }
                band.bottom = bottom;
                continue;
            }
        }

        let start = out.len();
        out.extend(
            spans
                .iter()
                .map(|&(x1, x2)| Rect::new(x1, top, x2 - x1, bottom - top)),
        );
        prev = Some(Band { bottom, spans, start });
    }

    out
}

/// Horizontal spans of `rects` covering the band `[top, bottom)`, merged
fn band_spans(rects: &[Rect], top: i32, bottom: i32) -> Vec<(i32, i32)> {
    let mut spans: Vec<(i32, i32)> = rects
        .iter()
        .filter(|r| r.y <= top && r.bottom() >= bottom)
        .map(|r| (r.x, r.right()))
        .collect();
    spans.sort_unstable();

    let mut merged: Vec<(i32, i32)> = Vec::with_capacity(spans.len());
    for (x1, x2) in spans {
        match merged.last_mut() {
            Some(last) if x1 <= last.1 => last.1 = last.1.max(x2),
            _ => merged.push((x1, x2)),
        }
    }
    merged
}

fn covers(spans: &[(i32, i32)], x1: i32, x2: i32) -> bool {
    spans.iter().any(|&(s, e)| s <= x1 && e >= x2)
}

fn combine_spans(a: &[(i32, i32)], b: &[(i32, i32)], op: SetOp) -> Vec<(i32, i32)> {
    let mut edges: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|&(s, e)| [s, e])
        .collect();
    edges.sort_unstable();
    edges.dedup();

    let mut out: Vec<(i32, i32)> = Vec::new();
    for pair in edges.windows(2) {
        let (x1, x2) = (pair[0], pair[1]);
        if !op.keep(covers(a, x1, x2), covers(b, x1, x2)) {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.1 == x1 => last.1 = x2,
            _ => out.push((x1, x2)),
        }
    }
    out
}

/// Shrink every span by `d` on both sides (grow when negative), renormalized.
/// Spans of a normalized region are maximal, so this is an exact erosion.
fn erode_horizontal(rects: &[Rect], d: i32) -> Vec<Rect> {
    let adjusted = rects
        .iter()
        .map(|r| {
            let (d, x, y) = (i64::from(d), i64::from(r.x), i64::from(r.y));
            Rect::clamped_edges(x + d, y, x + i64::from(r.width) - d, y + i64::from(r.height))
        })
        .filter(|r| !r.is_empty());
    Region::from_rects(adjusted).rects
}
