use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use uuid::Uuid;

use crate::error::{CanvasError, CanvasResult};
use crate::geometry::{Color, Rect};

/// Largest accepted edge length for a document, per axis.
pub const MAX_CANVAS_DIM: u32 = 16_384;

// ============================================================================
// OFFSCREEN - owned RGBA pixel buffer
// ============================================================================

/// An owned `width`×`height` RGBA surface (straight, non-premultiplied alpha).
#[derive(Clone, Debug, PartialEq)]
pub struct Offscreen {
    pixels: RgbaImage,
}

impl Offscreen {
    /// Fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self { pixels: RgbaImage::new(width, height) }
    }

    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self { pixels: RgbaImage::from_pixel(width, height, color) }
    }

    pub fn from_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Pixel view of the raw buffer.
    pub fn pixels(&self) -> &[[u8; 4]] {
        bytemuck::cast_slice(self.pixels.as_raw().as_slice())
    }

    pub fn pixels_mut(&mut self) -> &mut [[u8; 4]] {
        let raw: &mut [u8] = &mut self.pixels;
        bytemuck::cast_slice_mut(raw)
    }

    /// Reallocate at a new size. Content is not preserved.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.dimensions() == (width, height) {
            self.clear();
        } else {
            self.pixels = RgbaImage::new(width, height);
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        for p in self.pixels_mut() {
            *p = color.0;
        }
    }

    /// Become an exact copy of `other`, resizing to match.
    pub fn copy_from(&mut self, other: &Offscreen) {
        if self.dimensions() != other.dimensions() {
            self.pixels = other.pixels.clone();
        } else {
            self.pixels.copy_from_slice(other.pixels.as_raw());
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Pixel at signed coordinates, `None` outside the surface.
    pub fn sample(&self, x: i64, y: i64) -> Option<Rgba<u8>> {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return None;
        }
        Some(self.get_pixel(x as u32, y as u32))
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) {
        self.pixels.put_pixel(x, y, pixel);
    }

    /// Copy out a sub-rectangle. Areas outside the surface read as transparent.
    pub fn extract_region(&self, x: u32, y: u32, width: u32, height: u32) -> Offscreen {
        let mut out = Offscreen::new(width, height);
        out.copy_region_from(self, x, y);
        out
    }

    /// Fill this surface with `src`'s pixels starting at (`src_x`, `src_y`).
    /// Reused scratch buffers take this path to avoid reallocating.
    pub fn copy_region_from(&mut self, src: &Offscreen, src_x: u32, src_y: u32) {
        let (w, h) = self.dimensions();
        let (sw, sh) = src.dimensions();
        let row_w = w.min(sw.saturating_sub(src_x)) as usize;
        for row in 0..h {
            let dst_start = (row * w) as usize;
            let dst_row = &mut self.pixels_mut()[dst_start..dst_start + w as usize];
            let sy = src_y + row;
            if sy >= sh || row_w == 0 {
                dst_row.fill([0; 4]);
                continue;
            }
            let src_start = (sy * sw + src_x) as usize;
            dst_row[..row_w].copy_from_slice(&src.pixels()[src_start..src_start + row_w]);
            dst_row[row_w..].fill([0; 4]);
        }
    }

    /// Overwrite pixels at (`x`, `y`) with `src`, clipping to this surface.
    pub fn put_region(&mut self, src: &Offscreen, x: i64, y: i64) {
        self.blit(src, x, y, |_, top| top);
    }

    /// Source-over composite `src` at (`x`, `y`) with extra `opacity`.
    pub fn draw_over(&mut self, src: &Offscreen, x: i64, y: i64, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        self.blit(src, x, y, |base, top| blend_over(base, top, opacity));
    }

    fn blit(&mut self, src: &Offscreen, x: i64, y: i64, op: impl Fn([u8; 4], [u8; 4]) -> [u8; 4]) {
        let (w, h) = (self.width() as i64, self.height() as i64);
        let (sw, sh) = (src.width() as i64, src.height() as i64);
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + sw).min(w);
        let y1 = (y + sh).min(h);
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let src_px = src.pixels();
        let dst_px = self.pixels_mut();
        for dy in y0..y1 {
            let sy = dy - y;
            for dx in x0..x1 {
                let sx = dx - x;
                let di = (dy * w + dx) as usize;
                dst_px[di] = op(dst_px[di], src_px[(sy * sw + sx) as usize]);
            }
        }
    }

    /// Mirror left-to-right in place.
    pub fn flip_horizontal(&mut self) {
        let w = self.width() as usize;
        if w == 0 {
            return;
        }
        for row in self.pixels_mut().chunks_exact_mut(w) {
            row.reverse();
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

/// Straight-alpha source-over of `top` (scaled by `opacity`) onto `base`.
pub fn blend_over(base: [u8; 4], top: [u8; 4], opacity: f32) -> [u8; 4] {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }
    let ta = top[3] as f32 / 255.0 * opacity;
    let ba = base[3] as f32 / 255.0;
    let out_a = ta + ba * (1.0 - ta);
    if out_a <= 0.0 {
        return [0, 0, 0, 0];
    }
    let mix = |t: u8, b: u8| -> u8 {
        ((t as f32 * ta + b as f32 * ba * (1.0 - ta)) / out_a).round().clamp(0.0, 255.0) as u8
    };
    [
        mix(top[0], base[0]),
        mix(top[1], base[1]),
        mix(top[2], base[2]),
        (out_a * 255.0).round() as u8,
    ]
}

// ============================================================================
// LAYER
// ============================================================================

/// A paintable surface with opacity and visibility, owned by one [`Document`].
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: Uuid,
    pub surface: Offscreen,
    opacity: f32,
    visible: bool,
}

impl Layer {
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_surface(Offscreen::new(width, height))
    }

    pub fn from_surface(surface: Offscreen) -> Self {
        Self { id: Uuid::new_v4(), surface, opacity: 1.0, visible: true }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub(crate) fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Same pixels and properties, fresh identity.
    pub fn duplicate(&self) -> Layer {
        Layer { id: Uuid::new_v4(), ..self.clone() }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Change notifications queued by the document and drained by the controller.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentEvent {
    LayerAdded { index: usize },
    LayerDeleted { index: usize },
    LayerMoved { from: usize, to: usize },
    /// Opacity or visibility of a layer changed.
    LayerChanged { index: usize },
    /// Pixel content of a layer changed.
    LayerPainted { index: usize },
    CurrentLayerChanged { index: usize },
    SizeChanged { width: u32, height: u32 },
    /// The whole document was swapped (load / reset).
    Replaced,
}

/// Canvas size, background and an ordered, never-empty layer stack
/// (index 0 paints first).
#[derive(Clone, Debug)]
pub struct Document {
    pub title: String,
    width: u32,
    height: u32,
    background: Color,
    layers: Vec<Layer>,
    current_layer: usize,
    events: Vec<DocumentEvent>,
}

impl Document {
    /// A document with one empty layer on a white background.
    pub fn new(width: u32, height: u32) -> CanvasResult<Self> {
        validate_size(width as i64, height as i64)?;
        Self::from_parts(String::new(), width, height, Color::WHITE, vec![Layer::new(width, height)])
    }

    pub fn from_parts(
        title: String,
        width: u32,
        height: u32,
        background: Color,
        layers: Vec<Layer>,
    ) -> CanvasResult<Self> {
        validate_size(width as i64, height as i64)?;
        if layers.is_empty() {
            return Err(CanvasError::NoLayers);
        }
        Ok(Self {
            title,
            width,
            height,
            background,
            layers,
            current_layer: 0,
            events: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f32, self.height as f32)
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn current_layer_index(&self) -> usize {
        self.current_layer
    }

    pub fn current_layer(&self) -> &Layer {
        &self.layers[self.current_layer]
    }

    pub fn check_index(&self, index: usize) -> CanvasResult<()> {
        if index < self.layers.len() {
            Ok(())
        } else {
            Err(CanvasError::LayerIndexOutOfRange { index, len: self.layers.len() })
        }
    }

    /// Queue an event for the controller to dispatch.
    pub(crate) fn notify(&mut self, event: DocumentEvent) {
        self.events.push(event);
    }

    /// Drain queued change notifications.
    pub fn take_events(&mut self) -> Vec<DocumentEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_current_layer(&mut self, index: usize) -> CanvasResult<()> {
        self.check_index(index)?;
        if self.current_layer != index {
            self.current_layer = index;
            self.notify(DocumentEvent::CurrentLayerChanged { index });
        }
        Ok(())
    }

    /// Insert at `index` (clamped to the stack length) and make it current.
    pub(crate) fn insert_layer(&mut self, index: usize, layer: Layer) -> usize {
        let index = index.min(self.layers.len());
        self.layers.insert(index, layer);
        self.notify(DocumentEvent::LayerAdded { index });
        self.current_layer = index;
        self.notify(DocumentEvent::CurrentLayerChanged { index });
        index
    }

    /// Remove a layer. Removing the last remaining layer is a no-op.
    pub(crate) fn remove_layer(&mut self, index: usize) -> Option<Layer> {
        if self.layers.len() <= 1 || index >= self.layers.len() {
            return None;
        }
        let removed = self.layers.remove(index);
        self.notify(DocumentEvent::LayerDeleted { index });
        if self.current_layer >= index && self.current_layer > 0 {
            self.current_layer -= 1;
        }
        let current = self.current_layer;
        self.notify(DocumentEvent::CurrentLayerChanged { index: current });
        Some(removed)
    }

    pub(crate) fn move_layer(&mut self, from: usize, to: usize) -> bool {
        if from >= self.layers.len() || to >= self.layers.len() || from == to {
            return false;
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        self.notify(DocumentEvent::LayerMoved { from, to });
        if self.current_layer == from {
            self.current_layer = to;
        } else if from < self.current_layer && to >= self.current_layer {
            self.current_layer -= 1;
        } else if from > self.current_layer && to <= self.current_layer {
            self.current_layer += 1;
        }
        true
    }

    pub(crate) fn set_layer_opacity(&mut self, index: usize, opacity: f32) {
        if let Some(layer) = self.layers.get_mut(index) {
            layer.set_opacity(opacity);
            self.notify(DocumentEvent::LayerChanged { index });
        }
    }

    pub(crate) fn set_layer_visible(&mut self, index: usize, visible: bool) {
        if let Some(layer) = self.layers.get_mut(index) {
            layer.set_visible(visible);
            self.notify(DocumentEvent::LayerChanged { index });
        }
    }

    pub(crate) fn mark_painted(&mut self, index: usize) {
        self.notify(DocumentEvent::LayerPainted { index });
    }

    /// Change canvas size, anchoring content at the top-left.
    /// Shrinking crops; growing pads with transparency.
    pub(crate) fn resize_canvas(&mut self, width: u32, height: u32) {
        for layer in &mut self.layers {
            let old = std::mem::replace(&mut layer.surface, Offscreen::new(width, height));
            layer.surface.put_region(&old, 0, 0);
        }
        self.width = width;
        self.height = height;
        self.notify(DocumentEvent::SizeChanged { width, height });
    }

    /// Replace the size and every layer surface with exact prior copies.
    pub(crate) fn restore_surfaces(&mut self, width: u32, height: u32, surfaces: &[Offscreen]) {
        for (layer, surface) in self.layers.iter_mut().zip(surfaces) {
            layer.surface.copy_from(surface);
        }
        self.width = width;
        self.height = height;
        self.notify(DocumentEvent::SizeChanged { width, height });
    }

    pub(crate) fn flip_horizontal(&mut self) {
        for (index, layer) in self.layers.iter_mut().enumerate() {
            layer.surface.flip_horizontal();
            self.events.push(DocumentEvent::LayerPainted { index });
        }
    }

    /// Swap in another document's contents, keeping the pending event queue.
    pub(crate) fn replace_with(&mut self, other: &Document) {
        let size_changed = (self.width, self.height) != (other.width, other.height);
        self.title = other.title.clone();
        self.width = other.width;
        self.height = other.height;
        self.background = other.background;
        self.layers = other.layers.clone();
        self.current_layer = other.current_layer.min(self.layers.len() - 1);
        self.notify(DocumentEvent::Replaced);
        if size_changed {
            self.notify(DocumentEvent::SizeChanged { width: self.width, height: self.height });
        }
    }

    /// Flattened image: background, then visible layers bottom-to-top.
    pub fn composite(&self) -> Offscreen {
        let mut out = Offscreen::new(self.width, self.height);
        self.composite_into(&mut out, None);
        out
    }

    /// Composite into `target` (resized to the document). When `substitute`
    /// is given, that surface is painted in place of the layer at its index.
    pub fn composite_into(&self, target: &mut Offscreen, substitute: Option<(usize, &Offscreen)>) {
        if target.dimensions() != (self.width, self.height) {
            target.resize(self.width, self.height);
        }
        target.fill(self.background.to_rgba());

        let sources: Vec<(&Offscreen, f32)> = self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.visible && l.opacity > 0.0)
            .map(|(i, l)| match substitute {
                Some((si, surface)) if si == i => (surface, l.opacity),
                _ => (&l.surface, l.opacity),
            })
            .collect();

        let w = self.width as usize;
        target
            .pixels_mut()
            .par_chunks_mut(w.max(1))
            .enumerate()
            .for_each(|(y, row)| {
                for (surface, opacity) in &sources {
                    let start = y * w;
                    let src = &surface.pixels()[start..start + w];
                    for (dst, top) in row.iter_mut().zip(src) {
                        *dst = blend_over(*dst, *top, *opacity);
                    }
                }
            });
    }

    /// Composited color at a document pixel, `None` outside the canvas.
    pub fn sample_color(&self, x: i64, y: i64) -> Option<Color> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        let mut px = self.background.to_rgba().0;
        for layer in self.layers.iter().filter(|l| l.visible) {
            px = blend_over(px, layer.surface.get_pixel(x as u32, y as u32).0, layer.opacity);
        }
        Some(Color::from_rgba(Rgba(px)))
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.surface.memory_bytes()).sum()
    }
}

pub fn validate_size(width: i64, height: i64) -> CanvasResult<()> {
    if width <= 0 || height <= 0 || width > MAX_CANVAS_DIM as i64 || height > MAX_CANVAS_DIM as i64 {
        return Err(CanvasError::InvalidSize { width, height });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn copy_from_resizes_destination() {
        let src = Offscreen::new_filled(3, 2, RED);
        let mut dst = Offscreen::new(10, 10);
        dst.copy_from(&src);
        assert_eq!(dst, src);
    }

    #[test]
    fn resize_discards_content() {
        let mut s = Offscreen::new_filled(4, 4, RED);
        s.resize(4, 4);
        assert!(s.pixels().iter().all(|p| p[3] == 0));
        s.resize(2, 8);
        assert_eq!(s.dimensions(), (2, 8));
    }

    #[test]
    fn extract_and_put_region_clip_to_bounds() {
        let mut s = Offscreen::new(4, 4);
        s.put_pixel(3, 3, RED);
        let region = s.extract_region(2, 2, 4, 4);
        assert_eq!(region.get_pixel(1, 1), RED);
        assert_eq!(region.get_pixel(3, 3), Rgba([0, 0, 0, 0]));

        let mut dst = Offscreen::new(4, 4);
        dst.put_region(&Offscreen::new_filled(2, 2, RED), -1, 3);
        assert_eq!(dst.get_pixel(0, 3), RED);
        assert_eq!(dst.get_pixel(1, 3), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn blend_over_half_opacity_on_white() {
        let out = blend_over([255, 255, 255, 255], [0, 0, 0, 255], 0.5);
        assert_eq!(out[3], 255);
        assert!((126..=129).contains(&out[0]));
    }

    #[test]
    fn deleting_last_layer_is_noop() {
        let mut doc = Document::new(8, 8).unwrap();
        assert!(doc.remove_layer(0).is_none());
        assert_eq!(doc.layer_count(), 1);
    }

    #[test]
    fn move_layer_tracks_current() {
        let mut doc = Document::new(4, 4).unwrap();
        doc.insert_layer(1, Layer::new(4, 4));
        doc.insert_layer(2, Layer::new(4, 4));
        doc.set_current_layer(0).unwrap();
        let id = doc.current_layer().id;
        assert!(doc.move_layer(0, 2));
        assert_eq!(doc.current_layer_index(), 2);
        assert_eq!(doc.current_layer().id, id);
    }

    #[test]
    fn composite_skips_hidden_layers() {
        let mut doc = Document::new(2, 2).unwrap();
        doc.layer_mut(0).unwrap().surface.fill(RED);
        assert_eq!(doc.composite().get_pixel(0, 0), RED);
        doc.set_layer_visible(0, false);
        assert_eq!(doc.composite().get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(doc.sample_color(0, 0), Some(Color::WHITE));
        assert_eq!(doc.sample_color(2, 0), None);
    }

    #[test]
    fn resize_canvas_crops_and_pads() {
        let mut doc = Document::new(4, 4).unwrap();
        doc.layer_mut(0).unwrap().surface.fill(RED);
        doc.resize_canvas(2, 6);
        let s = &doc.layer(0).unwrap().surface;
        assert_eq!(s.dimensions(), (2, 6));
        assert_eq!(s.get_pixel(1, 3), RED);
        assert_eq!(s.get_pixel(1, 5)[3], 0);
        assert!(doc.take_events().contains(&DocumentEvent::SizeChanged { width: 2, height: 6 }));
    }
}
