// ============================================================================
// CANVAS CONTROLLER - pointer gestures, tools, history and rendering
// ============================================================================

use std::time::Instant;

use crate::canvas::{Document, DocumentEvent, Offscreen};
use crate::components::history::{HistoryManager, HistoryNode};
use crate::components::stabilizer::Stabilizer;
use crate::components::tools::{Tool, ToolSettings};
use crate::error::{CanvasError, CanvasResult, DocumentError};
use crate::events::{EventHub, Topical};
use crate::geometry::{Color, Rect};
use crate::io;
use crate::ops::brush::{Brush, BrushMode, StrokeMask, apply_stroke};
use crate::ops::canvas_ops;
use crate::ops::flood_fill::{FillParams, flood_fill};
use crate::pool::{OffscreenPool, PooledOffscreen};
use crate::render::Renderer;
use crate::settings::Settings;

/// Identifier of a pointer (mouse, pen or touch contact).
pub type PointerId = u32;

// ============================================================================
// EVENTS
// ============================================================================

/// Everything the controller tells the outside world.
#[derive(Clone, Debug, PartialEq)]
pub enum CanvasEvent {
    /// Layer stack or current-layer changes.
    Document(DocumentEvent),
    /// Fired after every push, undo, redo and capacity change.
    UpdateHistory { undo_count: usize, redo_count: usize },
    ChangeSize { width: u32, height: u32 },
    /// Color sampled by the picker.
    Spoit(Color),
    ChangeScale(f32),
    ToolChanged(Tool),
    /// Any tool parameter or the drawing color changed.
    ToolSettingsChanged(ToolSettings),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CanvasTopic {
    Document,
    History,
    Size,
    Spoit,
    Scale,
    Tool,
}

impl Topical for CanvasEvent {
    type Topic = CanvasTopic;

    fn topic(&self) -> CanvasTopic {
        match self {
            CanvasEvent::Document(_) => CanvasTopic::Document,
            CanvasEvent::UpdateHistory { .. } => CanvasTopic::History,
            CanvasEvent::ChangeSize { .. } => CanvasTopic::Size,
            CanvasEvent::Spoit(_) => CanvasTopic::Spoit,
            CanvasEvent::ChangeScale(_) => CanvasTopic::Scale,
            CanvasEvent::ToolChanged(_) | CanvasEvent::ToolSettingsChanged(_) => CanvasTopic::Tool,
        }
    }
}

// ============================================================================
// GESTURE STATE
// ============================================================================

/// A brush or eraser stroke in progress.
struct StrokeGesture {
    pointer: PointerId,
    layer: usize,
    /// Tool latched at pointer-down.
    tool: Tool,
    brush: Brush,
    stabilizer: Stabilizer,
    mask: StrokeMask,
    /// Layer content with the uncommitted stroke applied.
    preview: PooledOffscreen,
    /// Path points already rasterised into `mask`.
    drawn: usize,
}

impl StrokeGesture {
    /// Rasterise path points added since the last call and refresh the
    /// preview around them.
    fn rasterize_pending(&mut self, base: &Offscreen) -> bool {
        let path = self.stabilizer.path();
        if self.drawn >= path.len() {
            return false;
        }
        let points: Vec<(f32, f32)> = path[self.drawn.saturating_sub(1)..]
            .iter()
            .map(|p| p.position())
            .collect();
        self.drawn = path.len();
        let dirty = self.mask.path(&points, self.brush.radius());
        apply_stroke(base, &self.mask, &self.brush, &mut self.preview, dirty);
        true
    }
}

/// Selected pixels being dragged.
struct GrabGesture {
    pointer: PointerId,
    layer: usize,
    /// Pixel rect the content was lifted from.
    source: (u32, u32, u32, u32),
    anchor: (f32, f32),
    offset: (i64, i64),
    /// The lifted pixels.
    content: PooledOffscreen,
    /// Layer with the source rect cleared.
    base: PooledOffscreen,
    /// `base` with `content` drawn at the current offset.
    preview: PooledOffscreen,
}

impl GrabGesture {
    fn moved_to(&mut self, x: f32, y: f32) {
        let offset = ((x - self.anchor.0).round() as i64, (y - self.anchor.1).round() as i64);
        if offset == self.offset {
            return;
        }
        self.offset = offset;
        self.preview.copy_from(&self.base);
        let (sx, sy, _, _) = self.source;
        self.preview.draw_over(&self.content, sx as i64 + offset.0, sy as i64 + offset.1, 1.0);
    }

    fn destination(&self) -> Rect {
        let (sx, sy, w, h) = self.source;
        Rect::new(
            (sx as i64 + self.offset.0) as f32,
            (sy as i64 + self.offset.1) as f32,
            w as f32,
            h as f32,
        )
    }
}

enum Gesture {
    Idle,
    Stroke(Box<StrokeGesture>),
    Select { pointer: PointerId, start: (f32, f32) },
    Grab(Box<GrabGesture>),
    Spoit { pointer: PointerId },
    Scroll { pointer: PointerId, last: (f32, f32) },
}

impl Gesture {
    fn pointer(&self) -> Option<PointerId> {
        match self {
            Gesture::Idle => None,
            Gesture::Stroke(s) => Some(s.pointer),
            Gesture::Grab(g) => Some(g.pointer),
            Gesture::Select { pointer, .. }
            | Gesture::Spoit { pointer }
            | Gesture::Scroll { pointer, .. } => Some(*pointer),
        }
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// Owns a document and its history, turns pointer input into actions and
/// keeps the display surface up to date.
///
/// Pointer coordinates are display pixels. They map to document pixels
/// through the pan offset and `scale / inner_scale`.
pub struct CanvasController {
    doc: Document,
    history: HistoryManager,
    renderer: Renderer,
    pool: OffscreenPool,
    events: EventHub<CanvasEvent>,
    tool: Tool,
    tools: ToolSettings,
    gesture: Gesture,
    selection: Option<Rect>,
    /// View zoom.
    scale: f32,
    /// Document pixels per display pixel at zoom 1.
    inner_scale: f32,
    /// View offset in display pixels.
    pan: (f32, f32),
}

impl CanvasController {
    pub fn new(width: u32, height: u32) -> CanvasResult<Self> {
        Ok(Self::with_document(Document::new(width, height)?))
    }

    pub fn with_document(mut doc: Document) -> Self {
        doc.take_events();
        let settings = Settings::default();
        Self {
            doc,
            history: HistoryManager::new(settings.undo_max, settings.stroke_merge_time),
            renderer: Renderer::new(),
            pool: OffscreenPool::new(),
            events: EventHub::new(),
            tool: Tool::default(),
            tools: ToolSettings::default(),
            gesture: Gesture::Idle,
            selection: None,
            scale: 1.0,
            inner_scale: 1.0,
            pan: (0.0, 0.0),
        }
    }

    // -- accessors -------------------------------------------------------

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn pool(&self) -> &OffscreenPool {
        &self.pool
    }

    /// Subscribe / unsubscribe here.
    pub fn events(&mut self) -> &mut EventHub<CanvasEvent> {
        &mut self.events
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switch tools. A gesture already in progress keeps its latched tool.
    pub fn set_tool(&mut self, tool: Tool) {
        if tool != self.tool {
            self.tool = tool;
            self.events.emit(&CanvasEvent::ToolChanged(tool));
        }
    }

    pub fn tool_settings(&self) -> &ToolSettings {
        &self.tools
    }

    /// Edit tool parameters. Observers on [`CanvasTopic::Tool`] hear about
    /// it when something actually changed. Parameters are read at
    /// pointer-down, so a gesture in progress is unaffected.
    pub fn update_tool_settings(&mut self, edit: impl FnOnce(&mut ToolSettings)) {
        let before = self.tools.clone();
        edit(&mut self.tools);
        if self.tools != before {
            tracing::debug!(settings = ?self.tools, "tool settings changed");
            self.events.emit(&CanvasEvent::ToolSettingsChanged(self.tools.clone()));
        }
    }

    pub fn set_color(&mut self, color: Color) {
        self.update_tool_settings(|t| t.color = color);
    }

    pub fn selection(&self) -> Option<Rect> {
        self.selection
    }

    pub fn set_selection(&mut self, rect: Option<Rect>) {
        self.selection = rect.and_then(|r| clip_selection(&self.doc, r));
        self.renderer.request();
    }

    pub fn is_gesture_active(&self) -> bool {
        !matches!(self.gesture, Gesture::Idle)
    }

    /// Tool latched by the stroke in progress, if any.
    pub fn stroke_tool(&self) -> Option<Tool> {
        match &self.gesture {
            Gesture::Stroke(s) => Some(s.tool),
            _ => None,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn inner_scale(&self) -> f32 {
        self.inner_scale
    }

    pub fn pan(&self) -> (f32, f32) {
        self.pan
    }

    // -- view ------------------------------------------------------------

    pub fn set_scale(&mut self, scale: f32) -> CanvasResult<()> {
        check_scale(scale)?;
        if scale != self.scale {
            self.scale = scale;
            self.renderer.set_display_scale(self.display_scale());
            self.events.emit(&CanvasEvent::ChangeScale(scale));
        }
        Ok(())
    }

    pub fn set_inner_scale(&mut self, inner_scale: f32) -> CanvasResult<()> {
        check_scale(inner_scale)?;
        self.inner_scale = inner_scale;
        self.renderer.set_display_scale(self.display_scale());
        Ok(())
    }

    fn display_scale(&self) -> f32 {
        self.scale / self.inner_scale
    }

    /// Display coordinates to document coordinates.
    pub fn to_document(&self, x: f32, y: f32) -> (f32, f32) {
        let s = self.display_scale();
        ((x - self.pan.0) / s, (y - self.pan.1) / s)
    }

    // -- settings --------------------------------------------------------

    /// Rebind history capacity and merge window. Shrinking the capacity
    /// evicts the oldest entries immediately.
    pub fn apply_settings(&mut self, settings: &Settings) {
        let settings = settings.clamped();
        self.history.set_max_undo(settings.undo_max);
        self.history.set_merge_window(settings.stroke_merge_time);
        self.emit_history();
    }

    // -- pointer input -----------------------------------------------------

    pub fn pointer_down(&mut self, pointer: PointerId, x: f32, y: f32, now: Instant) {
        if self.is_gesture_active() {
            tracing::debug!(pointer, "new pointer while a gesture is active, finishing it");
            self.finish_gesture(now, true);
        }

        let tool = self.tool;
        if !self.doc.current_layer().is_visible() && !tool.caps().enabled_for_hidden_layer {
            tracing::debug!(?tool, "ignoring pointer on hidden layer");
            return;
        }

        let (dx, dy) = self.to_document(x, y);
        match tool {
            Tool::Brush | Tool::Eraser => self.start_stroke(pointer, tool, dx, dy, now),
            Tool::Bucket => self.bucket_fill(dx, dy),
            Tool::Spoit => {
                self.gesture = Gesture::Spoit { pointer };
                emit_spoit(&self.doc, &mut self.events, dx, dy);
            }
            Tool::Select => {
                let inside = self.selection.is_some_and(|s| s.contains(dx, dy));
                if !(inside && self.start_grab(pointer, dx, dy)) {
                    self.selection = None;
                    self.gesture = Gesture::Select { pointer, start: (dx, dy) };
                }
                self.renderer.request();
            }
            Tool::Scroll => self.gesture = Gesture::Scroll { pointer, last: (x, y) },
            Tool::None => {}
        }
    }

    pub fn pointer_move(&mut self, pointer: PointerId, x: f32, y: f32) {
        if self.gesture.pointer() != Some(pointer) {
            return;
        }
        let (dx, dy) = self.to_document(x, y);
        match &mut self.gesture {
            Gesture::Idle => {}
            Gesture::Stroke(s) => s.stabilizer.move_to(dx, dy),
            Gesture::Spoit { .. } => emit_spoit(&self.doc, &mut self.events, dx, dy),
            Gesture::Select { start, .. } => {
                self.selection = clip_selection(&self.doc, Rect::from_corners(*start, (dx, dy)));
                self.renderer.request();
            }
            Gesture::Grab(g) => {
                g.moved_to(dx, dy);
                self.renderer.request();
            }
            Gesture::Scroll { last, .. } => {
                self.pan.0 += x - last.0;
                self.pan.1 += y - last.1;
                *last = (x, y);
                self.renderer.request();
            }
        }
    }

    pub fn pointer_up(&mut self, pointer: PointerId, x: f32, y: f32, now: Instant) {
        if self.gesture.pointer() != Some(pointer) {
            return;
        }
        self.pointer_move(pointer, x, y);
        self.finish_gesture(now, true);
    }

    /// Abort the gesture of `pointer`. Strokes still commit what was drawn;
    /// a grab is put back.
    pub fn pointer_cancel(&mut self, pointer: PointerId, now: Instant) {
        if self.gesture.pointer() != Some(pointer) {
            return;
        }
        self.finish_gesture(now, false);
    }

    /// Window lost focus: settle whatever is in progress.
    pub fn blur(&mut self, now: Instant) {
        self.finish_gesture(now, false);
    }

    /// Drive the stroke sampler. Call at least once per frame.
    pub fn tick(&mut self, now: Instant) {
        if let Gesture::Stroke(s) = &mut self.gesture
            && s.stabilizer.advance(now) > 0
            && let Some(layer) = self.doc.layer(s.layer)
            && s.rasterize_pending(&layer.surface)
        {
            self.renderer.request();
        }
    }

    fn finish_gesture(&mut self, now: Instant, commit: bool) {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Idle => return,
            Gesture::Stroke(s) => self.commit_stroke(*s, now),
            Gesture::Grab(g) => {
                if commit {
                    self.commit_grab(*g);
                } else {
                    tracing::debug!("grab cancelled, restoring");
                    self.selection = clip_selection(&self.doc, Rect::from_min_max(
                        g.source.0 as f32,
                        g.source.1 as f32,
                        (g.source.0 + g.source.2) as f32,
                        (g.source.1 + g.source.3) as f32,
                    ));
                }
            }
            Gesture::Select { .. } | Gesture::Spoit { .. } | Gesture::Scroll { .. } => {}
        }
        self.renderer.request();
    }

    // -- brush / eraser ----------------------------------------------------

    fn start_stroke(&mut self, pointer: PointerId, tool: Tool, x: f32, y: f32, now: Instant) {
        let Some(params) = self.tools.stroke(tool).copied() else { return };
        let layer = self.doc.current_layer_index();
        let (w, h) = (self.doc.width(), self.doc.height());
        let brush = Brush {
            mode: if tool == Tool::Eraser { BrushMode::Erase } else { BrushMode::Paint },
            size: params.size(),
            color: self.tools.color,
            opacity: params.opacity(),
        };

        let mut preview = self.pool.acquire(w, h);
        let surface = &self.doc.current_layer().surface;
        preview.copy_from(surface);

        let mut stabilizer = Stabilizer::new();
        stabilizer.start(x, y, now);
        let mut stroke = StrokeGesture {
            pointer,
            layer,
            tool,
            brush,
            stabilizer,
            mask: StrokeMask::new(w, h),
            preview,
            drawn: 0,
        };
        stroke.rasterize_pending(surface);
        tracing::debug!(?tool, layer, x, y, "stroke start");
        self.gesture = Gesture::Stroke(Box::new(stroke));
        self.renderer.request();
    }

    fn commit_stroke(&mut self, mut stroke: StrokeGesture, now: Instant) {
        stroke.stabilizer.finish(now);
        let Some(layer) = self.doc.layer(stroke.layer) else {
            tracing::warn!(layer = stroke.layer, "stroke target layer vanished");
            return;
        };
        stroke.rasterize_pending(&layer.surface);

        let bounds = stroke.stabilizer.bounds(stroke.brush.size);
        let image = match bounds.pixel_bounds(self.doc.width(), self.doc.height()) {
            Some((x, y, w, h)) => (x, y, stroke.preview.extract_region(x, y, w, h)),
            None => (0, 0, Offscreen::new(0, 0)),
        };
        let label = if stroke.tool == Tool::Eraser { "Eraser Stroke" } else { "Brush Stroke" };
        tracing::debug!(points = stroke.stabilizer.path().len(), ?bounds, "stroke commit");
        match canvas_ops::draw_region(&self.doc, stroke.layer, image.0, image.1, image.2) {
            Ok(node) => self.push(node.described(label)),
            Err(e) => tracing::warn!(error = %e, "stroke commit rejected"),
        }
    }

    // -- bucket ------------------------------------------------------------

    fn bucket_fill(&mut self, x: f32, y: f32) {
        let (w, h) = (self.doc.width(), self.doc.height());
        let layer = self.doc.current_layer_index();
        let bucket = self.tools.bucket;
        let params = FillParams::from(&bucket);

        let region = {
            let mut composite = self.pool.acquire(w, h);
            self.doc.composite_into(&mut composite, None);
            flood_fill(&composite, x.floor() as i64, y.floor() as i64, &params)
        };
        let Some(region) = region.filter(|r| !r.is_empty()) else {
            tracing::debug!(x, y, "bucket fill found nothing");
            return;
        };

        let fill = region.to_image(self.tools.color);
        let mut after = self.doc.current_layer().surface.extract_region(region.x, region.y, region.width, region.height);
        after.draw_over(&fill, 0, 0, bucket.opacity());
        match canvas_ops::draw_region(&self.doc, layer, region.x, region.y, after) {
            Ok(node) => self.push(node.described("Bucket Fill")),
            Err(e) => tracing::warn!(error = %e, "bucket fill rejected"),
        }
    }

    // -- selection / grab ------------------------------------------------

    fn start_grab(&mut self, pointer: PointerId, x: f32, y: f32) -> bool {
        let Some(source) = self
            .selection
            .and_then(|s| s.pixel_bounds(self.doc.width(), self.doc.height()))
        else {
            return false;
        };
        let (sx, sy, sw, sh) = source;
        let (w, h) = (self.doc.width(), self.doc.height());
        let layer = self.doc.current_layer_index();
        let surface = &self.doc.current_layer().surface;

        let mut content = self.pool.acquire(sw, sh);
        content.copy_region_from(surface, sx, sy);
        let mut base = self.pool.acquire(w, h);
        base.copy_from(surface);
        {
            let hole = self.pool.acquire(sw, sh);
            base.put_region(&hole, sx as i64, sy as i64);
        }
        let mut preview = self.pool.acquire(w, h);
        preview.copy_from(surface);

        tracing::debug!(layer, ?source, "grab start");
        self.gesture = Gesture::Grab(Box::new(GrabGesture {
            pointer,
            layer,
            source,
            anchor: (x, y),
            offset: (0, 0),
            content,
            base,
            preview,
        }));
        true
    }

    fn commit_grab(&mut self, grab: GrabGesture) {
        let dest = grab.destination();
        self.selection = clip_selection(&self.doc, dest);
        if grab.offset == (0, 0) {
            return;
        }
        let (sx, sy, sw, sh) = grab.source;
        let source = Rect::new(sx as f32, sy as f32, sw as f32, sh as f32);
        let Some((x, y, w, h)) = source.union(&dest).pixel_bounds(self.doc.width(), self.doc.height()) else {
            return;
        };
        let after = grab.preview.extract_region(x, y, w, h);
        match canvas_ops::draw_region(&self.doc, grab.layer, x, y, after) {
            Ok(node) => self.push(node.described("Move Selection")),
            Err(e) => tracing::warn!(error = %e, "grab commit rejected"),
        }
    }

    // -- history -------------------------------------------------------------

    fn push(&mut self, node: HistoryNode) {
        self.history.push_action(&mut self.doc, node);
        self.after_change();
    }

    fn after_change(&mut self) {
        self.dispatch_document_events();
        self.emit_history();
        self.renderer.request();
    }

    fn dispatch_document_events(&mut self) {
        for event in self.doc.take_events() {
            let out = match event {
                DocumentEvent::SizeChanged { width, height } => {
                    self.selection = self.selection.and_then(|s| clip_selection(&self.doc, s));
                    CanvasEvent::ChangeSize { width, height }
                }
                other => CanvasEvent::Document(other),
            };
            self.events.emit(&out);
        }
    }

    fn emit_history(&mut self) {
        self.events.emit(&CanvasEvent::UpdateHistory {
            undo_count: self.history.undo_count(),
            redo_count: self.history.redo_count(),
        });
    }

    /// Returns `false` when there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.finish_gesture(Instant::now(), true);
        let done = self.history.undo(&mut self.doc).is_some();
        if done {
            self.after_change();
        }
        done
    }

    pub fn redo(&mut self) -> bool {
        self.finish_gesture(Instant::now(), true);
        let done = self.history.redo(&mut self.doc).is_some();
        if done {
            self.after_change();
        }
        done
    }

    // -- document operations -----------------------------------------------

    fn settle(&mut self) {
        self.finish_gesture(Instant::now(), true);
    }

    pub fn set_current_layer(&mut self, index: usize) -> CanvasResult<()> {
        self.settle();
        self.doc.set_current_layer(index)?;
        self.dispatch_document_events();
        Ok(())
    }

    /// New blank layer directly above the current one.
    pub fn add_layer(&mut self) -> CanvasResult<()> {
        self.add_layer_at(self.doc.current_layer_index() + 1)
    }

    pub fn add_layer_at(&mut self, index: usize) -> CanvasResult<()> {
        self.settle();
        let node = canvas_ops::add_layer(&self.doc, index)?;
        self.push(node);
        Ok(())
    }

    pub fn duplicate_layer(&mut self, index: usize) -> CanvasResult<()> {
        self.settle();
        let node = canvas_ops::duplicate_layer(&self.doc, index)?;
        self.push(node);
        Ok(())
    }

    pub fn delete_layer(&mut self, index: usize) -> CanvasResult<()> {
        self.settle();
        if let Some(node) = canvas_ops::delete_layer(&self.doc, index)? {
            self.push(node);
        }
        Ok(())
    }

    pub fn move_layer(&mut self, from: usize, to: usize) -> CanvasResult<()> {
        self.settle();
        if let Some(node) = canvas_ops::move_layer(&self.doc, from, to)? {
            self.push(node);
        }
        Ok(())
    }

    pub fn set_layer_opacity(&mut self, index: usize, opacity: f32) -> CanvasResult<()> {
        self.settle();
        let node = canvas_ops::set_layer_opacity(&self.doc, index, opacity)?;
        self.push(node);
        Ok(())
    }

    pub fn set_layer_visibility(&mut self, index: usize, visible: bool) -> CanvasResult<()> {
        self.settle();
        if let Some(node) = canvas_ops::set_layer_visibility(&self.doc, index, visible)? {
            self.push(node);
        }
        Ok(())
    }

    pub fn resize(&mut self, width: i64, height: i64) -> CanvasResult<()> {
        self.settle();
        if let Some(node) = canvas_ops::resize_canvas(&self.doc, width, height)? {
            self.push(node);
        }
        Ok(())
    }

    pub fn flip_horizontal(&mut self) {
        self.settle();
        self.push(canvas_ops::flip_horizontal());
    }

    /// Fill the current layer with the tool color.
    pub fn fill(&mut self) {
        self.settle();
        let index = self.doc.current_layer_index();
        match canvas_ops::fill_layer(&self.doc, index, self.tools.color) {
            Ok(node) => self.push(node),
            Err(e) => tracing::warn!(error = %e, "fill rejected"),
        }
    }

    pub fn clear_layer(&mut self) {
        self.settle();
        let index = self.doc.current_layer_index();
        match canvas_ops::clear_layer(&self.doc, index) {
            Ok(node) => self.push(node),
            Err(e) => tracing::warn!(error = %e, "clear rejected"),
        }
    }

    /// Swap in `doc` as an undoable step.
    pub fn load_document(&mut self, doc: Document) {
        self.settle();
        self.selection = None;
        let node = canvas_ops::change_document(&self.doc, doc);
        self.push(node);
    }

    /// Replace the document with a blank one of the given size.
    pub fn reset(&mut self, width: i64, height: i64) -> CanvasResult<()> {
        crate::canvas::validate_size(width, height)?;
        let doc = Document::new(width as u32, height as u32)?;
        self.load_document(doc);
        Ok(())
    }

    pub fn serialize(&self) -> Result<String, DocumentError> {
        io::serialize(&self.doc)
    }

    /// Decode a persisted document and load it. On failure nothing changes.
    pub async fn load_serialized(&mut self, data: &str) -> Result<(), DocumentError> {
        let doc = io::deserialize(data).await?;
        self.load_document(doc);
        Ok(())
    }

    // -- rendering -------------------------------------------------------

    pub fn request_render(&mut self) {
        self.renderer.request();
    }

    /// Render once if anything changed since the last frame.
    pub fn flush_frame(&mut self) -> bool {
        let live = live_surface(&self.gesture);
        self.renderer.flush(&self.doc, live)
    }

    /// Render unconditionally.
    pub fn render(&mut self) {
        let live = live_surface(&self.gesture);
        self.renderer.render(&self.doc, live);
    }
}

fn live_surface(gesture: &Gesture) -> Option<(usize, &Offscreen)> {
    match gesture {
        Gesture::Stroke(s) => Some((s.layer, &*s.preview)),
        Gesture::Grab(g) => Some((g.layer, &*g.preview)),
        _ => None,
    }
}

/// Snap a selection to whole pixels inside the canvas.
fn clip_selection(doc: &Document, rect: Rect) -> Option<Rect> {
    let r = rect.round_out().intersect(&doc.bounds());
    (!r.is_empty()).then_some(r)
}

/// Color picker: report the composited color under the pointer.
fn emit_spoit(doc: &Document, events: &mut EventHub<CanvasEvent>, x: f32, y: f32) {
    if let Some(color) = doc.sample_color(x.floor() as i64, y.floor() as i64) {
        events.emit(&CanvasEvent::Spoit(color));
    }
}

fn check_scale(scale: f32) -> CanvasResult<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(CanvasError::InvalidScale(scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ObserverId;
    use image::Rgba;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn layer_pixels(c: &CanvasController, index: usize) -> Offscreen {
        c.document().layers()[index].surface.clone()
    }

    fn record(c: &mut CanvasController, topic: CanvasTopic) -> Rc<RefCell<Vec<CanvasEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        c.events().subscribe(ObserverId::new(), topic, move |e| sink.borrow_mut().push(e.clone()));
        seen
    }

    #[test]
    fn stroke_previews_then_commits_on_release() {
        let mut c = CanvasController::new(40, 40).unwrap();
        let t0 = Instant::now();
        c.pointer_down(1, 5.0, 5.0, t0);
        c.pointer_move(1, 30.0, 5.0);
        c.tick(t0 + Duration::from_millis(100));
        assert_eq!(layer_pixels(&c, 0).get_pixel(5, 5)[3], 0, "not committed mid-stroke");
        c.flush_frame();
        assert_eq!(c.renderer().display().get_pixel(5, 5), Rgba([0, 0, 0, 255]));

        c.pointer_up(1, 30.0, 5.0, t0 + Duration::from_millis(120));
        assert!(!c.is_gesture_active());
        assert_eq!(layer_pixels(&c, 0).get_pixel(30, 5)[3], 255);
        assert_eq!(c.history().undo_count(), 1);
        assert_eq!(c.pool().outstanding(), 0);
    }

    #[test]
    fn tool_switch_mid_stroke_keeps_latched_tool() {
        let mut c = CanvasController::new(20, 20).unwrap();
        let t0 = Instant::now();
        c.pointer_down(1, 10.0, 10.0, t0);
        c.set_tool(Tool::Eraser);
        assert_eq!(c.stroke_tool(), Some(Tool::Brush));
        c.pointer_up(1, 10.0, 10.0, t0);
        assert_eq!(layer_pixels(&c, 0).get_pixel(10, 10)[3], 255);
    }

    #[test]
    fn new_primary_pointer_force_finishes_previous() {
        let mut c = CanvasController::new(20, 20).unwrap();
        let t0 = Instant::now();
        c.pointer_down(1, 3.0, 3.0, t0);
        c.pointer_down(2, 15.0, 15.0, t0);
        assert_eq!(c.history().undo_count(), 1);
        c.pointer_move(1, 0.0, 0.0);
        c.pointer_up(2, 15.0, 15.0, t0);
        assert_eq!(c.history().undo_count(), 2);
    }

    #[test]
    fn hidden_layer_rejects_painting() {
        let mut c = CanvasController::new(10, 10).unwrap();
        c.set_layer_visibility(0, false).unwrap();
        let before = c.history().undo_count();
        c.pointer_down(1, 5.0, 5.0, Instant::now());
        assert!(!c.is_gesture_active());
        c.set_tool(Tool::Bucket);
        c.pointer_down(1, 5.0, 5.0, Instant::now());
        assert_eq!(c.history().undo_count(), before);
    }

    #[test]
    fn bucket_fills_and_outside_click_is_noop() {
        let mut c = CanvasController::new(10, 10).unwrap();
        c.set_tool(Tool::Bucket);
        c.set_color(Color::rgb(0, 200, 0));
        c.pointer_down(1, -4.0, 2.0, Instant::now());
        assert_eq!(c.history().undo_count(), 0);
        c.pointer_down(1, 4.0, 2.0, Instant::now());
        assert_eq!(c.history().undo_count(), 1);
        assert_eq!(layer_pixels(&c, 0).get_pixel(9, 9), Rgba([0, 200, 0, 255]));
    }

    #[test]
    fn spoit_emits_sample_without_history() {
        let mut c = CanvasController::new(4, 4).unwrap();
        let seen = record(&mut c, CanvasTopic::Spoit);
        c.set_tool(Tool::Spoit);
        c.pointer_down(1, 1.0, 1.0, Instant::now());
        c.pointer_move(1, 9.0, 9.0);
        assert_eq!(*seen.borrow(), vec![CanvasEvent::Spoit(Color::WHITE)]);
        assert_eq!(c.history().undo_count(), 0);
    }

    #[test]
    fn grab_moves_pixels_and_cancel_restores() {
        let red = Rgba([255, 0, 0, 255]);
        let mut c = CanvasController::new(10, 10).unwrap();
        c.set_color(Color::rgb(255, 0, 0));
        c.fill();
        let original = layer_pixels(&c, 0);
        c.set_tool(Tool::Select);
        let t0 = Instant::now();

        c.pointer_down(1, 0.0, 0.0, t0);
        c.pointer_move(1, 3.0, 3.0);
        c.pointer_up(1, 3.0, 3.0, t0);
        assert_eq!(c.selection(), Some(Rect::new(0.0, 0.0, 3.0, 3.0)));

        c.pointer_down(1, 1.0, 1.0, t0);
        c.pointer_move(1, 6.0, 6.0);
        c.pointer_cancel(1, t0);
        assert_eq!(layer_pixels(&c, 0), original);
        assert_eq!(c.pool().outstanding(), 0);

        c.pointer_down(1, 1.0, 1.0, t0);
        c.pointer_move(1, 6.0, 6.0);
        c.pointer_up(1, 6.0, 6.0, t0);
        let moved = layer_pixels(&c, 0);
        assert_eq!(moved.get_pixel(0, 0)[3], 0);
        assert_eq!(moved.get_pixel(7, 7), red);
        assert_eq!(c.selection(), Some(Rect::new(5.0, 5.0, 3.0, 3.0)));

        c.undo();
        assert_eq!(layer_pixels(&c, 0), original);
    }

    #[test]
    fn blur_settles_active_stroke() {
        let mut c = CanvasController::new(10, 10).unwrap();
        c.pointer_down(1, 5.0, 5.0, Instant::now());
        c.blur(Instant::now());
        assert!(!c.is_gesture_active());
        assert_eq!(c.history().undo_count(), 1);
        assert_eq!(c.pool().outstanding(), 0);
    }

    #[test]
    fn invalid_scale_is_rejected_and_valid_emits() {
        let mut c = CanvasController::new(10, 10).unwrap();
        let seen = record(&mut c, CanvasTopic::Scale);
        assert_eq!(c.set_scale(0.0), Err(CanvasError::InvalidScale(0.0)));
        assert!(c.set_scale(f32::NAN).is_err());
        c.set_scale(2.0).unwrap();
        assert_eq!(*seen.borrow(), vec![CanvasEvent::ChangeScale(2.0)]);
        assert_eq!(c.to_document(8.0, 4.0), (4.0, 2.0));
        c.render();
        assert_eq!(c.renderer().display().dimensions(), (20, 20));
    }

    #[test]
    fn history_and_layer_events_fire() {
        let mut c = CanvasController::new(4, 4).unwrap();
        let history = record(&mut c, CanvasTopic::History);
        let layers = record(&mut c, CanvasTopic::Document);
        c.add_layer().unwrap();
        c.undo();
        assert_eq!(
            *history.borrow(),
            vec![
                CanvasEvent::UpdateHistory { undo_count: 1, redo_count: 0 },
                CanvasEvent::UpdateHistory { undo_count: 0, redo_count: 1 },
            ]
        );
        assert!(layers.borrow().contains(&CanvasEvent::Document(DocumentEvent::LayerAdded { index: 1 })));
        assert!(layers.borrow().contains(&CanvasEvent::Document(DocumentEvent::LayerDeleted { index: 1 })));
    }

    #[test]
    fn structural_errors_leave_history_alone() {
        let mut c = CanvasController::new(4, 4).unwrap();
        assert!(c.delete_layer(5).is_err());
        assert!(c.resize(-1, 4).is_err());
        assert!(c.set_layer_opacity(0, 2.0).is_err());
        assert_eq!(c.history().undo_count(), 0);
    }

    #[test]
    fn scroll_pans_view_only() {
        let mut c = CanvasController::new(4, 4).unwrap();
        c.set_tool(Tool::Scroll);
        c.pointer_down(1, 10.0, 10.0, Instant::now());
        c.pointer_move(1, 13.0, 8.0);
        c.pointer_up(1, 13.0, 8.0, Instant::now());
        assert_eq!(c.pan(), (3.0, -2.0));
        assert_eq!(c.history().undo_count(), 0);
    }

    #[test]
    fn shrinking_settings_evicts_history() {
        let mut c = CanvasController::new(4, 4).unwrap();
        for _ in 0..5 {
            c.flip_horizontal();
        }
        c.apply_settings(&Settings { undo_max: 2, stroke_merge_time: Duration::ZERO });
        assert_eq!(c.history().undo_count(), 2);
        assert_eq!(c.history().merge_window(), Duration::ZERO);
    }

    #[test]
    fn tool_and_parameter_changes_are_observable() {
        let mut c = CanvasController::new(10, 1).unwrap();
        let seen = record(&mut c, CanvasTopic::Tool);
        c.set_tool(Tool::Bucket);
        c.set_tool(Tool::Bucket);
        c.update_tool_settings(|t| t.bucket.set_tolerance(10.0));
        c.update_tool_settings(|t| t.bucket.set_tolerance(10.0));

        let events = seen.borrow();
        assert_eq!(events.len(), 2, "unchanged values stay quiet");
        assert_eq!(events[0], CanvasEvent::ToolChanged(Tool::Bucket));
        match &events[1] {
            CanvasEvent::ToolSettingsChanged(settings) => assert_eq!(settings.bucket.tolerance(), 10.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bucket_tolerance_applies_from_next_pointer_down() {
        let mut c = CanvasController::new(10, 1).unwrap();
        c.update_tool_settings(|t| {
            t.brush.set_size(1.0);
            t.color = Color::rgb(250, 250, 250);
        });
        c.pointer_down(1, 5.5, 0.5, Instant::now());
        c.pointer_up(1, 5.5, 0.5, Instant::now());
        let near_white = layer_pixels(&c, 0).get_pixel(5, 0);

        c.set_tool(Tool::Bucket);
        c.set_color(Color::rgb(0, 0, 255));
        c.pointer_down(1, 0.0, 0.0, Instant::now());
        assert_eq!(layer_pixels(&c, 0).get_pixel(5, 0), near_white, "exact match stops at the dot");

        c.undo();
        c.update_tool_settings(|t| t.bucket.set_tolerance(10.0));
        c.pointer_down(1, 0.0, 0.0, Instant::now());
        assert_eq!(layer_pixels(&c, 0).get_pixel(5, 0), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn brush_size_change_mid_stroke_waits_for_next_stroke() {
        let mut c = CanvasController::new(30, 30).unwrap();
        let t0 = Instant::now();
        c.pointer_down(1, 10.0, 10.0, t0);
        c.update_tool_settings(|t| t.brush.set_size(20.0));
        c.pointer_up(1, 10.0, 10.0, t0);
        assert_eq!(layer_pixels(&c, 0).get_pixel(10, 18)[3], 0, "stroke kept the size it started with");

        c.pointer_down(1, 10.0, 10.0, t0);
        c.pointer_up(1, 10.0, 10.0, t0);
        assert_eq!(layer_pixels(&c, 0).get_pixel(10, 18)[3], 255);
    }
}
