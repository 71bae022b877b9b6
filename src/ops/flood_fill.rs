// ============================================================================
// FLOOD FILL - tolerance mask + scanline fill + gap closing / expansion
// ============================================================================

use image::Rgba;
use rayon::prelude::*;

use crate::canvas::Offscreen;
use crate::components::tools::{BucketParams, MAX_TOLERANCE};
use crate::geometry::{Color, Rect};
use crate::ops::filters;

/// Region-shaping parameters of a fill.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct FillParams {
    /// 0 ..= 200; squared to give the RGB distance cutoff.
    pub tolerance: f32,
    /// Radius used to seal thin gaps in the boundary before filling.
    pub close_gap: f32,
    /// Radius the filled region grows by afterwards.
    pub expand: f32,
}

impl From<&BucketParams> for FillParams {
    fn from(p: &BucketParams) -> Self {
        Self { tolerance: p.tolerance(), close_gap: p.close_gap(), expand: p.expand() }
    }
}

/// Squared RGB distance at or below which a pixel matches the seed.
pub fn tolerance_cutoff(tolerance: f32) -> u32 {
    let t = tolerance.clamp(0.0, MAX_TOLERANCE);
    (t * t).round() as u32
}

/// Result of a fill: per-pixel coverage over a canvas-clipped rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct FillRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Row-major coverage, `width * height` bytes, 0 = untouched.
    pub coverage: Vec<u8>,
}

impl FillRegion {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x as f32, self.y as f32, self.width as f32, self.height as f32)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels with any coverage.
    pub fn pixel_count(&self) -> usize {
        self.coverage.iter().filter(|&&c| c > 0).count()
    }

    /// Coverage at canvas coordinates, 0 outside the region.
    pub fn coverage_at(&self, x: u32, y: u32) -> u8 {
        if x < self.x || y < self.y || x >= self.x + self.width || y >= self.y + self.height {
            return 0;
        }
        self.coverage[((y - self.y) * self.width + (x - self.x)) as usize]
    }

    /// Region-sized surface of `color` with coverage folded into alpha.
    pub fn to_image(&self, color: Color) -> Offscreen {
        let base = color.to_rgba();
        let mut out = Offscreen::new(self.width, self.height);
        for (px, &c) in out.pixels_mut().iter_mut().zip(&self.coverage) {
            if c > 0 {
                let a = (base[3] as u32 * c as u32 + 127) / 255;
                *px = [base[0], base[1], base[2], a as u8];
            }
        }
        out
    }
}

/// Which pixels of `image` are within `cutoff` of `seed` (RGB only).
pub fn match_mask(image: &Offscreen, seed: Rgba<u8>, cutoff: u32) -> Vec<bool> {
    let seed = Color::from_rgba(seed);
    image
        .pixels()
        .par_iter()
        .map(|p| Color::from_rgba(Rgba(*p)).distance_sq(seed) <= cutoff)
        .collect()
}

/// Bounding box of a fill, inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Bounds {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl Bounds {
    fn grow(self, r: usize, width: usize, height: usize) -> Bounds {
        Bounds {
            min_x: self.min_x.saturating_sub(r),
            min_y: self.min_y.saturating_sub(r),
            max_x: (self.max_x + r).min(width - 1),
            max_y: (self.max_y + r).min(height - 1),
        }
    }
}

/// 4-connected scanline fill over `mask` from (`sx`, `sy`).
///
/// Iterative with an explicit seed stack. Each popped seed fills its whole
/// horizontal run, then seeds the rows above and below once per open span.
fn scanline_fill(mask: &[bool], width: usize, height: usize, sx: usize, sy: usize) -> (Vec<u8>, Option<Bounds>) {
    let mut filled = vec![0u8; width * height];
    if !mask[sy * width + sx] {
        return (filled, None);
    }

    #[inline(always)]
    fn open(mask: &[bool], filled: &[u8], i: usize) -> bool {
        mask[i] && filled[i] == 0
    }

    let mut bounds = Bounds { min_x: sx, min_y: sy, max_x: sx, max_y: sy };
    let mut stack: Vec<(usize, usize)> = Vec::with_capacity(1024);
    stack.push((sx, sy));

    while let Some((x, y)) = stack.pop() {
        let row = y * width;
        if !open(mask, &filled, row + x) {
            continue;
        }
        let mut lx = x;
        while lx > 0 && open(mask, &filled, row + lx - 1) {
            lx -= 1;
        }
        let mut rx = x;
        while rx + 1 < width && open(mask, &filled, row + rx + 1) {
            rx += 1;
        }
        filled[row + lx..=row + rx].fill(255);

        bounds.min_x = bounds.min_x.min(lx);
        bounds.max_x = bounds.max_x.max(rx);
        bounds.min_y = bounds.min_y.min(y);
        bounds.max_y = bounds.max_y.max(y);

        let above = y.checked_sub(1);
        let below = (y + 1 < height).then_some(y + 1);
        for ny in [above, below].into_iter().flatten() {
            let nrow = ny * width;
            let mut in_span = false;
            for nx in lx..=rx {
                if open(mask, &filled, nrow + nx) {
                    if !in_span {
                        stack.push((nx, ny));
                        in_span = true;
                    }
                } else {
                    in_span = false;
                }
            }
        }
    }

    (filled, Some(bounds))
}

/// Compute the region a fill seeded at (`x`, `y`) on `image` would cover.
///
/// `None` when the seed is outside the image. The returned region is
/// already grown by the expand radius and clipped to the image.
pub fn flood_fill(image: &Offscreen, x: i64, y: i64, params: &FillParams) -> Option<FillRegion> {
    let seed = image.sample(x, y)?;
    let (w, h) = (image.width() as usize, image.height() as usize);
    let (sx, sy) = (x as usize, y as usize);

    let matching = match_mask(image, seed, tolerance_cutoff(params.tolerance));

    let gap = params.close_gap.max(0.0).ceil() as usize;
    let (mut filled, mut bounds) = if gap == 0 {
        let (filled, bounds) = scanline_fill(&matching, w, h, sx, sy);
        (filled, bounds?)
    } else {
        // Fill the sealed mask, then walk back out through matching pixels
        // for `gap` steps to recover the margin sealing took away. A seed
        // inside that margin still fills around itself.
        let sealed = filters::close_gaps(&matching, w, h, gap);
        let (mut core, bounds) = scanline_fill(&sealed, w, h, sx, sy);
        core[sy * w + sx] = 255;
        let bounds = bounds.unwrap_or(Bounds { min_x: sx, min_y: sy, max_x: sx, max_y: sy });
        (filters::regrow_within(&core, &matching, w, h, gap), bounds.grow(gap, w, h))
    };

    let expand = params.expand.max(0.0).ceil() as usize;
    if expand > 0 {
        filled = filters::dilate(&filled, w, h, expand);
        bounds = bounds.grow(expand, w, h);
    }

    let rw = bounds.max_x - bounds.min_x + 1;
    let rh = bounds.max_y - bounds.min_y + 1;
    let mut coverage = Vec::with_capacity(rw * rh);
    for row in bounds.min_y..=bounds.max_y {
        let start = row * w + bounds.min_x;
        coverage.extend_from_slice(&filled[start..start + rw]);
    }

    tracing::debug!(
        x, y,
        rect_w = rw,
        rect_h = rh,
        tolerance = params.tolerance,
        "flood fill"
    );

    Some(FillRegion {
        x: bounds.min_x as u32,
        y: bounds.min_y as u32,
        width: rw as u32,
        height: rh as u32,
        coverage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn bordered(size: u32) -> Offscreen {
        let mut img = Offscreen::new_filled(size, size, WHITE);
        for i in 0..size {
            img.put_pixel(i, 0, BLACK);
            img.put_pixel(i, size - 1, BLACK);
            img.put_pixel(0, i, BLACK);
            img.put_pixel(size - 1, i, BLACK);
        }
        img
    }

    #[test]
    fn uniform_image_fills_everything() {
        let img = Offscreen::new_filled(100, 100, WHITE);
        let region = flood_fill(&img, 50, 50, &FillParams::default()).unwrap();
        assert_eq!(region.rect(), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(region.pixel_count(), 100 * 100);
    }

    #[test]
    fn exact_match_stops_at_border() {
        let img = bordered(100);
        let region = flood_fill(&img, 50, 50, &FillParams::default()).unwrap();
        assert_eq!(region.rect(), Rect::new(1.0, 1.0, 98.0, 98.0));
        assert_eq!(region.coverage_at(0, 50), 0);
    }

    #[test]
    fn seed_outside_image_is_no_result() {
        let img = Offscreen::new_filled(10, 10, WHITE);
        assert!(flood_fill(&img, -1, 3, &FillParams::default()).is_none());
        assert!(flood_fill(&img, 3, 10, &FillParams::default()).is_none());
    }

    #[test]
    fn tolerance_admits_near_colors() {
        let mut img = Offscreen::new_filled(10, 1, WHITE);
        img.put_pixel(5, 0, Rgba([250, 250, 250, 255]));
        let exact = flood_fill(&img, 0, 0, &FillParams::default()).unwrap();
        assert_eq!(exact.width, 5);
        let loose = FillParams { tolerance: 10.0, ..Default::default() };
        assert_eq!(flood_fill(&img, 0, 0, &loose).unwrap().width, 10);
    }

    #[test]
    fn scanline_handles_concave_shapes() {
        // U shape: the fill must come back up the right arm.
        let mut img = Offscreen::new_filled(5, 4, WHITE);
        for y in 0..3 {
            img.put_pixel(2, y, BLACK);
        }
        let region = flood_fill(&img, 0, 0, &FillParams::default()).unwrap();
        assert_eq!(region.pixel_count(), 20 - 3);
        assert_eq!(region.coverage_at(4, 0), 255);
    }

    #[test]
    fn close_gap_stops_leak_through_thin_opening() {
        let mut img = Offscreen::new_filled(20, 10, WHITE);
        for y in 0..10 {
            if y != 5 {
                img.put_pixel(10, y, BLACK);
            }
        }
        let leaky = flood_fill(&img, 2, 5, &FillParams::default()).unwrap();
        assert_eq!(leaky.pixel_count(), 200 - 9);

        let sealed = FillParams { close_gap: 1.0, ..Default::default() };
        let region = flood_fill(&img, 2, 5, &sealed).unwrap();
        assert_eq!(region.rect(), Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(region.pixel_count(), 100);
    }

    #[test]
    fn expand_grows_region_and_rect() {
        let img = bordered(10);
        let params = FillParams { expand: 1.0, ..Default::default() };
        let region = flood_fill(&img, 5, 5, &params).unwrap();
        assert_eq!(region.rect(), Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(region.coverage_at(0, 0), 255);
    }

    #[test]
    fn fill_image_carries_coverage_in_alpha() {
        let region = FillRegion { x: 0, y: 0, width: 2, height: 1, coverage: vec![255, 0] };
        let img = region.to_image(Color::rgba(10, 20, 30, 0.5));
        assert_eq!(img.get_pixel(0, 0), Rgba([10, 20, 30, 128]));
        assert_eq!(img.get_pixel(1, 0)[3], 0);
    }

    #[test]
    fn close_gap_keeps_larger_tolerance_from_filling_less() {
        // A 1px red line on row 3 with near-red cells in columns 0..7 of
        // every other row. Tolerance 10 lets those cells join the line.
        let red = Rgba([255, 0, 0, 255]);
        let near_red = Rgba([250, 0, 0, 255]);
        let mut img = Offscreen::new_filled(100, 7, WHITE);
        for x in 0..100 {
            img.put_pixel(x, 3, red);
        }
        for y in [0, 2, 4, 6] {
            for x in 0..7 {
                img.put_pixel(x, y, near_red);
            }
        }
        let count = |tolerance: f32| {
            let params = FillParams { tolerance, close_gap: 1.0, expand: 0.0 };
            flood_fill(&img, 3, 3, &params).unwrap().pixel_count()
        };
        // The bare line seals away entirely: only the seed's neighborhood fills.
        assert_eq!(count(0.0), 3);
        // Rows 2..=4, columns 0..=6.
        assert_eq!(count(10.0), 21);
        assert!(count(0.0) <= count(10.0));
    }
}
