// ============================================================================
// BRUSH - round stroke rasterisation into a coverage mask
// ============================================================================

use crate::canvas::{Offscreen, blend_over};
use crate::geometry::{Color, Rect};

/// Whether a stroke deposits color or removes alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrushMode {
    Paint,
    Erase,
}

/// Brush settings latched for the lifetime of one stroke.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Brush {
    pub mode: BrushMode,
    /// Diameter in document pixels.
    pub size: f32,
    pub color: Color,
    pub opacity: f32,
}

impl Brush {
    pub fn radius(&self) -> f32 {
        self.size * 0.5
    }
}

/// Per-pixel stroke coverage for one layer-sized area.
///
/// Stamps combine by maximum, so overlapping segments of the same stroke
/// never build up past a single pass.
#[derive(Clone, Debug)]
pub struct StrokeMask {
    width: u32,
    height: u32,
    coverage: Vec<u8>,
}

impl StrokeMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, coverage: vec![0; (width * height) as usize] }
    }

    pub fn coverage_at(&self, x: u32, y: u32) -> u8 {
        self.coverage[(y * self.width + x) as usize]
    }

    pub fn is_blank(&self) -> bool {
        self.coverage.iter().all(|&c| c == 0)
    }

    /// Stamp one antialiased disc. Returns the touched pixel rect.
    pub fn stamp(&mut self, cx: f32, cy: f32, radius: f32) -> Rect {
        let radius = radius.max(0.5);
        let area = Rect::new(cx - radius - 1.0, cy - radius - 1.0, radius * 2.0 + 2.0, radius * 2.0 + 2.0);
        let Some((x0, y0, w, h)) = area.pixel_bounds(self.width, self.height) else {
            return Rect::EMPTY;
        };
        for y in y0..y0 + h {
            let py = y as f32 + 0.5 - cy;
            for x in x0..x0 + w {
                let px = x as f32 + 0.5 - cx;
                let d = (px * px + py * py).sqrt();
                let c = (radius + 0.5 - d).clamp(0.0, 1.0);
                if c > 0.0 {
                    let v = (c * 255.0).round() as u8;
                    let slot = &mut self.coverage[(y * self.width + x) as usize];
                    *slot = (*slot).max(v);
                }
            }
        }
        Rect::new(x0 as f32, y0 as f32, w as f32, h as f32)
    }

    /// Stamp along `start`→`end` at one-pixel spacing. A zero-length
    /// segment stamps a single dot.
    pub fn segment(&mut self, start: (f32, f32), end: (f32, f32), radius: f32) -> Rect {
        let dx = end.0 - start.0;
        let dy = end.1 - start.1;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < 0.1 {
            return self.stamp(start.0, start.1, radius);
        }
        let steps = distance.ceil() as usize;
        let mut dirty = Rect::EMPTY;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            dirty = dirty.union(&self.stamp(start.0 + dx * t, start.1 + dy * t, radius));
        }
        dirty
    }

    /// Rasterise a whole path: segments between consecutive points, or a
    /// dot for a one-point path.
    pub fn path(&mut self, points: &[(f32, f32)], radius: f32) -> Rect {
        match points {
            [] => Rect::EMPTY,
            [p] => self.segment(*p, *p, radius),
            _ => points
                .windows(2)
                .fold(Rect::EMPTY, |dirty, w| dirty.union(&self.segment(w[0], w[1], radius))),
        }
    }
}

/// Recompute `out` over `rect` as `base` with the stroke in `mask` applied.
///
/// `base`, `mask` and `out` share dimensions. Pixels outside `rect` are
/// left untouched.
pub fn apply_stroke(base: &Offscreen, mask: &StrokeMask, brush: &Brush, out: &mut Offscreen, rect: Rect) {
    let Some((x0, y0, w, h)) = rect.pixel_bounds(base.width(), base.height()) else {
        return;
    };
    let width = base.width() as usize;
    let paint = brush.color.to_rgba().0;
    let opacity = brush.opacity.clamp(0.0, 1.0);
    let src = base.pixels();
    let dst = out.pixels_mut();

    for y in y0..y0 + h {
        for x in x0..x0 + w {
            let i = y as usize * width + x as usize;
            let c = mask.coverage[i];
            dst[i] = if c == 0 {
                src[i]
            } else {
                match brush.mode {
                    BrushMode::Paint => {
                        let a = (paint[3] as u32 * c as u32 + 127) / 255;
                        blend_over(src[i], [paint[0], paint[1], paint[2], a as u8], opacity)
                    }
                    BrushMode::Erase => {
                        let keep = 1.0 - (c as f32 / 255.0) * opacity;
                        let mut p = src[i];
                        p[3] = (p[3] as f32 * keep).round() as u8;
                        if p[3] == 0 {
                            p = [0; 4];
                        }
                        p
                    }
                }
            };
        }
    }
}
