// ============================================================================
// MORPHOLOGY - CPU dilation passes used by flood fill
// ============================================================================

use rayon::prelude::*;

/// Dilate a `width`×`height` coverage mask by `radius` with a square kernel.
///
/// Separable: a horizontal max pass followed by a vertical one, each
/// window spanning `2 * radius + 1` pixels.
pub fn dilate(mask: &[u8], width: usize, height: usize, radius: usize) -> Vec<u8> {
    if radius == 0 || width == 0 || height == 0 {
        return mask.to_vec();
    }

    // Horizontal pass
    let mut tmp = vec![0u8; mask.len()];
    tmp.par_chunks_mut(width)
        .zip(mask.par_chunks(width))
        .for_each(|(dst, src)| {
            for x in 0..width {
                let x0 = x.saturating_sub(radius);
                let x1 = (x + radius).min(width - 1);
                dst[x] = src[x0..=x1].iter().copied().max().unwrap_or(0);
            }
        });

    // Vertical pass
    let mut out = vec![0u8; mask.len()];
    out.par_chunks_mut(width).enumerate().for_each(|(y, dst)| {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius).min(height - 1);
        for (x, d) in dst.iter_mut().enumerate() {
            let mut m = 0u8;
            for yy in y0..=y1 {
                m = m.max(tmp[yy * width + x]);
                if m == 255 {
                    break;
                }
            }
            *d = m;
        }
    });
    out
}

/// Grow the non-matching boundary of a boolean match mask by `radius` and
/// return the shrunken match mask, so thin gaps in a boundary stop leaking.
pub fn close_gaps(matching: &[bool], width: usize, height: usize, radius: usize) -> Vec<bool> {
    if radius == 0 {
        return matching.to_vec();
    }
    let barrier: Vec<u8> = matching.iter().map(|&m| if m { 0 } else { 255 }).collect();
    let grown = dilate(&barrier, width, height, radius);
    matching
        .iter()
        .zip(&grown)
        .map(|(&m, &b)| m && b == 0)
        .collect()
}

/// Grow `region` one pixel (8-connected) at a time for `steps` steps,
/// never stepping onto a pixel that is not `matching`.
///
/// Growth follows paths through matching pixels, so it cannot jump across
/// a barrier the way a plain dilation would.
pub fn regrow_within(region: &[u8], matching: &[bool], width: usize, height: usize, steps: usize) -> Vec<u8> {
    let mut current = region.to_vec();
    for _ in 0..steps {
        let grown = dilate(&current, width, height, 1);
        let mut changed = false;
        for ((c, g), &m) in current.iter_mut().zip(&grown).zip(matching) {
            if m && *c == 0 && *g > 0 {
                *c = 255;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_pixel_grows_into_square() {
        let (w, h) = (7, 7);
        let mut mask = vec![0u8; w * h];
        mask[3 * w + 3] = 255;
        let out = dilate(&mask, w, h, 2);
        assert_eq!(out.iter().filter(|&&v| v == 255).count(), 25);
        assert_eq!(out[w + 1], 255);
        assert_eq!(out[0], 0);
    }

    #[test]
    fn dilation_keeps_partial_coverage_values() {
        let mask = vec![0, 128, 0, 0];
        assert_eq!(dilate(&mask, 4, 1, 1), vec![128, 128, 128, 0]);
    }

    #[test]
    fn close_gaps_shrinks_matching_area_near_barriers() {
        // A one-pixel barrier column at x = 2 in a 5-wide row.
        let matching = vec![true, true, false, true, true];
        let closed = close_gaps(&matching, 5, 1, 1);
        assert_eq!(closed, vec![true, false, false, false, true]);
    }

    #[test]
    fn regrow_follows_matching_paths_only() {
        // Seed at x = 0; x = 2 is a barrier, x = 3 matches but is behind it.
        let matching = vec![true, true, false, true, true];
        let region = vec![255, 0, 0, 0, 0];
        assert_eq!(regrow_within(&region, &matching, 5, 1, 4), vec![255, 255, 0, 0, 0]);
        assert_eq!(regrow_within(&region, &[true; 5], 5, 1, 2), vec![255, 255, 255, 0, 0]);
    }
}
