// ============================================================================
// RENDERER - internal-resolution composite, scaled to the display surface
// ============================================================================

use image::imageops::{self, FilterType};

use crate::canvas::{Document, Offscreen};

/// Composites a document at its own resolution, then scales the result to
/// the display surface.
///
/// Requests are coalesced: any number of [`Renderer::request`] calls
/// between two [`Renderer::flush`] calls produce a single render.
#[derive(Debug)]
pub struct Renderer {
    /// Document-resolution composite.
    internal: Offscreen,
    /// What the host shows, sized by `display_scale`.
    display: Offscreen,
    /// Display pixels per document pixel.
    display_scale: f32,
    pending: bool,
    frames: u64,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            internal: Offscreen::new(0, 0),
            display: Offscreen::new(0, 0),
            display_scale: 1.0,
            pending: true,
            frames: 0,
        }
    }

    /// Mark a frame as needed.
    pub fn request(&mut self) {
        self.pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Number of renders performed so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn display_scale(&self) -> f32 {
        self.display_scale
    }

    /// Callers validate `scale` beforehand.
    pub(crate) fn set_display_scale(&mut self, scale: f32) {
        self.display_scale = scale;
        self.pending = true;
    }

    /// Display surface size for `doc` at the current scale.
    pub fn display_size(&self, doc: &Document) -> (u32, u32) {
        let w = (doc.width() as f32 * self.display_scale).round().max(1.0) as u32;
        let h = (doc.height() as f32 * self.display_scale).round().max(1.0) as u32;
        (w, h)
    }

    /// Render if a frame is pending. Returns whether a render happened.
    pub fn flush(&mut self, doc: &Document, live: Option<(usize, &Offscreen)>) -> bool {
        if !self.pending {
            return false;
        }
        self.render(doc, live);
        true
    }

    /// Composite `doc` and refresh the display surface. `live` substitutes
    /// a preview surface for one layer (an in-progress stroke or grab).
    pub fn render(&mut self, doc: &Document, live: Option<(usize, &Offscreen)>) {
        doc.composite_into(&mut self.internal, live);

        let (dw, dh) = self.display_size(doc);
        if (dw, dh) == self.internal.dimensions() {
            self.display.copy_from(&self.internal);
        } else {
            // Nearest when magnifying keeps pixels crisp.
            let filter = if dw > self.internal.width() { FilterType::Nearest } else { FilterType::Triangle };
            let scaled = imageops::resize(self.internal.image(), dw, dh, filter);
            self.display = Offscreen::from_image(scaled);
        }

        self.pending = false;
        self.frames += 1;
        tracing::trace!(frame = self.frames, dw, dh, "rendered");
    }

    pub fn display(&self) -> &Offscreen {
        &self.display
    }

    pub fn internal(&self) -> &Offscreen {
        &self.internal
    }
}
