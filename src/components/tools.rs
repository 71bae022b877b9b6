use crate::geometry::Color;

/// The closed set of canvas tools. Exactly one is current at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    /// Color picker: samples the composited image.
    Spoit,
    Bucket,
    Select,
    Scroll,
    None,
}

/// Static behavior flags of a [`Tool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolCaps {
    /// Exposes a size slider.
    pub resizeable: bool,
    /// Produces a stabilized stroke.
    pub has_stroke: bool,
    /// Shows a live, uncommitted preview while in use.
    pub has_preview: bool,
    /// Draws an overlay (brush outline, selection marquee) over the canvas.
    pub has_overlay: bool,
    /// Usable while the current layer is hidden.
    pub enabled_for_hidden_layer: bool,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::Brush,
        Tool::Eraser,
        Tool::Spoit,
        Tool::Bucket,
        Tool::Select,
        Tool::Scroll,
        Tool::None,
    ];

    pub const fn caps(self) -> ToolCaps {
        let (resizeable, has_stroke, has_preview, has_overlay, enabled_for_hidden_layer) = match self {
            Tool::Brush | Tool::Eraser => (true, true, true, true, false),
            Tool::Bucket => (false, false, false, false, false),
            Tool::Select => (false, false, true, true, false),
            Tool::Spoit => (false, false, false, false, true),
            Tool::Scroll => (false, false, false, false, true),
            Tool::None => (false, false, false, false, true),
        };
        ToolCaps { resizeable, has_stroke, has_preview, has_overlay, enabled_for_hidden_layer }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tool::Brush => "Brush",
            Tool::Eraser => "Eraser",
            Tool::Spoit => "Color Picker",
            Tool::Bucket => "Bucket",
            Tool::Select => "Select",
            Tool::Scroll => "Scroll",
            Tool::None => "None",
        }
    }

    /// CSS-style cursor name for hosts that show one.
    pub fn cursor(self) -> &'static str {
        match self {
            Tool::Brush | Tool::Eraser => "none",
            Tool::Spoit | Tool::Bucket => "crosshair",
            Tool::Select => "default",
            Tool::Scroll => "grab",
            Tool::None => "not-allowed",
        }
    }
}

// ============================================================================
// TOOL PARAMETERS
// ============================================================================

pub const MIN_BRUSH_SIZE: f32 = 1.0;
pub const MAX_BRUSH_SIZE: f32 = 200.0;
pub const MAX_TOLERANCE: f32 = 200.0;
pub const MAX_CLOSE_GAP: f32 = 20.0;
pub const MAX_EXPAND: f32 = 20.0;

/// Size and opacity of a stroke tool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeParams {
    size: f32,
    opacity: f32,
}

impl StrokeParams {
    pub fn new(size: f32, opacity: f32) -> Self {
        let mut p = Self { size: 0.0, opacity: 0.0 };
        p.set_size(size);
        p.set_opacity(opacity);
        p
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_size(&mut self, size: f32) {
        self.size = size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }
}

/// Flood-fill parameters of the bucket tool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BucketParams {
    /// Color distance threshold, 0 (exact) ..= 200.
    tolerance: f32,
    /// Gap-closing radius in pixels.
    close_gap: f32,
    /// Post-fill growth radius in pixels.
    expand: f32,
    opacity: f32,
}

impl Default for BucketParams {
    fn default() -> Self {
        Self { tolerance: 0.0, close_gap: 0.0, expand: 0.0, opacity: 1.0 }
    }
}

impl BucketParams {
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn close_gap(&self) -> f32 {
        self.close_gap
    }

    pub fn expand(&self) -> f32 {
        self.expand
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_tolerance(&mut self, tolerance: f32) {
        self.tolerance = tolerance.clamp(0.0, MAX_TOLERANCE);
    }

    pub fn set_close_gap(&mut self, close_gap: f32) {
        self.close_gap = close_gap.clamp(0.0, MAX_CLOSE_GAP);
    }

    pub fn set_expand(&mut self, expand: f32) {
        self.expand = expand.clamp(0.0, MAX_EXPAND);
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }
}

/// Every tool's parameters plus the shared drawing color.
///
/// The controller copies what it needs at pointer-down, so edits here only
/// affect the next gesture.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSettings {
    pub color: Color,
    pub brush: StrokeParams,
    pub eraser: StrokeParams,
    pub bucket: BucketParams,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            brush: StrokeParams::new(4.0, 1.0),
            eraser: StrokeParams::new(16.0, 1.0),
            bucket: BucketParams::default(),
        }
    }
}

impl ToolSettings {
    /// Stroke parameters for a stroke tool, `None` for the rest.
    pub fn stroke(&self, tool: Tool) -> Option<&StrokeParams> {
        match tool {
            Tool::Brush => Some(&self.brush),
            Tool::Eraser => Some(&self.eraser),
            _ => None,
        }
    }

    pub fn stroke_mut(&mut self, tool: Tool) -> Option<&mut StrokeParams> {
        match tool {
            Tool::Brush => Some(&mut self.brush),
            Tool::Eraser => Some(&mut self.eraser),
            _ => None,
        }
    }
}
