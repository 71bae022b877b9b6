// ============================================================================
// GEOMETRY PRIMITIVES - Rect and Color value types
// ============================================================================

use image::Rgba;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel or pointer space.
///
/// Width and height may be negative while a drag is in progress; call
/// [`Rect::normalize`] before using it as a region.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const EMPTY: Rect = Rect { x: 0.0, y: 0.0, width: 0.0, height: 0.0 };

    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_min_max(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Rect spanning two drag corners, in any order.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self::new(a.0, a.1, b.0 - a.0, b.1 - a.1).normalize()
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Flip negative width/height so the origin is the top-left corner.
    pub fn normalize(&self) -> Rect {
        let mut r = *self;
        if r.width < 0.0 {
            r.x += r.width;
            r.width = -r.width;
        }
        if r.height < 0.0 {
            r.y += r.height;
            r.height = -r.height;
        }
        r
    }

    /// Overlap of two rects. Disjoint rects yield [`Rect::EMPTY`].
    pub fn intersect(&self, other: &Rect) -> Rect {
        let a = self.normalize();
        let b = other.normalize();
        let min_x = a.x.max(b.x);
        let min_y = a.y.max(b.y);
        let max_x = a.right().min(b.right());
        let max_y = a.bottom().min(b.bottom());
        if max_x <= min_x || max_y <= min_y {
            return Rect::EMPTY;
        }
        Rect::from_min_max(min_x, min_y, max_x, max_y)
    }

    /// Smallest rect containing both. An empty operand is ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return other.normalize();
        }
        if other.is_empty() {
            return self.normalize();
        }
        let a = self.normalize();
        let b = other.normalize();
        Rect::from_min_max(
            a.x.min(b.x),
            a.y.min(b.y),
            a.right().max(b.right()),
            a.bottom().max(b.bottom()),
        )
    }

    /// Grow by `amount` on every side.
    pub fn expand(&self, amount: f32) -> Rect {
        Rect::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }

    pub fn scale(&self, factor: f32) -> Rect {
        Rect::new(self.x * factor, self.y * factor, self.width * factor, self.height * factor)
    }

    /// Floor every component.
    pub fn floor(&self) -> Rect {
        Rect::new(self.x.floor(), self.y.floor(), self.width.floor(), self.height.floor())
    }

    /// Smallest integer-aligned rect covering this one.
    pub fn round_out(&self) -> Rect {
        let r = self.normalize();
        Rect::from_min_max(r.x.floor(), r.y.floor(), r.right().ceil(), r.bottom().ceil())
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        let r = self.normalize();
        x >= r.x && x < r.right() && y >= r.y && y < r.bottom()
    }

    /// Integer pixel bounds `(x, y, w, h)` clamped to a `width`×`height`
    /// surface, or `None` when nothing remains.
    pub fn pixel_bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let r = self
            .round_out()
            .intersect(&Rect::new(0.0, 0.0, width as f32, height as f32));
        if r.is_empty() {
            return None;
        }
        Some((r.x as u32, r.y as u32, r.width as u32, r.height as u32))
    }
}

/// An RGBA color: 8-bit channels plus a unit-interval alpha.
///
/// `Color` is a plain value type; holders that should not mutate it simply
/// receive a copy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0.0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a: a.clamp(0.0, 1.0) }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self::rgba(self.r, self.g, self.b, a)
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, (self.a.clamp(0.0, 1.0) * 255.0).round() as u8])
    }

    pub fn from_rgba(p: Rgba<u8>) -> Self {
        Self { r: p[0], g: p[1], b: p[2], a: p[3] as f32 / 255.0 }
    }

    /// Squared RGB distance, used by the fill tolerance test.
    pub fn distance_sq(self, other: Color) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_flips_negative_extent() {
        let r = Rect::new(10.0, 10.0, -4.0, -6.0).normalize();
        assert_eq!(r, Rect::new(6.0, 4.0, 4.0, 6.0));
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = Rect::new(0.0, 0.0, 5.0, 5.0);
        let b = Rect::new(10.0, 10.0, 5.0, 5.0);
        assert!(a.intersect(&b).is_empty());
        assert_eq!(a.intersect(&Rect::new(3.0, 3.0, 5.0, 5.0)), Rect::new(3.0, 3.0, 2.0, 2.0));
    }

    #[test]
    fn empty_iff_non_positive_extent() {
        assert!(Rect::new(1.0, 1.0, 0.0, 3.0).is_empty());
        assert!(Rect::new(1.0, 1.0, 3.0, -1.0).is_empty());
        assert!(!Rect::new(1.0, 1.0, 0.5, 0.5).is_empty());
    }

    #[test]
    fn pixel_bounds_round_out_and_clamp() {
        let r = Rect::new(-2.5, 1.2, 5.0, 3.0);
        assert_eq!(r.pixel_bounds(10, 10), Some((0, 1, 3, 4)));
        assert_eq!(Rect::new(20.0, 20.0, 4.0, 4.0).pixel_bounds(10, 10), None);
    }

    #[test]
    fn color_alpha_round_trips_through_rgba() {
        let c = Color::rgba(12, 34, 56, 1.0);
        assert_eq!(Color::from_rgba(c.to_rgba()), c);
        assert_eq!(Color::rgba(0, 0, 0, 3.0).a, 1.0);
    }

    #[test]
    fn color_serializes_as_object() {
        let json = serde_json::to_value(Color::rgb(1, 2, 3)).unwrap();
        assert_eq!(json, serde_json::json!({"r": 1, "g": 2, "b": 3, "a": 1.0}));
    }
}
