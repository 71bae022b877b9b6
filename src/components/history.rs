use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::canvas::{Document, Layer, Offscreen};
use crate::geometry::Color;

/// Default number of undo steps kept.
pub const DEFAULT_UNDO_MAX: usize = 20;

/// Default window within which compatible edits collapse into one step.
pub const DEFAULT_MERGE_WINDOW: Duration = Duration::from_secs(1);

// ============================================================================
// ACTIONS
// ============================================================================

/// A single reversible document mutation.
///
/// Actions are applied directly to a [`Document`]; the inverse of each one
/// is another `Action` built before the mutation happens.
#[derive(Clone, Debug)]
pub enum Action {
    /// Placeholder inverse for a forward action with nothing to undo.
    NoOp,
    /// Insert a copy of `layer` at `index` and make it current.
    AddLayer { index: usize, layer: Layer },
    DeleteLayer { index: usize },
    MoveLayer { from: usize, to: usize },
    ChangeLayerOpacity { index: usize, opacity: f32 },
    ChangeLayerVisibility { index: usize, visible: bool },
    /// Overwrite a rectangle of a layer with `image`.
    DrawImageRegion { index: usize, x: u32, y: u32, image: Offscreen },
    /// Resize every layer, anchored top-left.
    ResizeCanvas { width: u32, height: u32 },
    /// Restore exact per-layer surfaces and size (inverse of a shrinking resize).
    RestoreCanvas { width: u32, height: u32, surfaces: Vec<Offscreen> },
    FlipHorizontal,
    FillSolid { index: usize, color: Color },
    ClearLayer { index: usize },
    /// Swap the whole document (load / reset).
    ChangeDocument { document: Box<Document> },
}

/// Broad category of an action, used for merge compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    NoOp,
    AddLayer,
    DeleteLayer,
    MoveLayer,
    LayerOpacity,
    LayerVisibility,
    DrawImageRegion,
    Resize,
    FlipHorizontal,
    FillSolid,
    ClearLayer,
    ChangeDocument,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::NoOp => ActionKind::NoOp,
            Action::AddLayer { .. } => ActionKind::AddLayer,
            Action::DeleteLayer { .. } => ActionKind::DeleteLayer,
            Action::MoveLayer { .. } => ActionKind::MoveLayer,
            Action::ChangeLayerOpacity { .. } => ActionKind::LayerOpacity,
            Action::ChangeLayerVisibility { .. } => ActionKind::LayerVisibility,
            Action::DrawImageRegion { .. } => ActionKind::DrawImageRegion,
            Action::ResizeCanvas { .. } | Action::RestoreCanvas { .. } => ActionKind::Resize,
            Action::FlipHorizontal => ActionKind::FlipHorizontal,
            Action::FillSolid { .. } => ActionKind::FillSolid,
            Action::ClearLayer { .. } => ActionKind::ClearLayer,
            Action::ChangeDocument { .. } => ActionKind::ChangeDocument,
        }
    }

    /// Layer the action targets, if it targets exactly one.
    pub fn target_layer(&self) -> Option<usize> {
        match self {
            Action::AddLayer { index, .. }
            | Action::DeleteLayer { index }
            | Action::ChangeLayerOpacity { index, .. }
            | Action::ChangeLayerVisibility { index, .. }
            | Action::DrawImageRegion { index, .. }
            | Action::FillSolid { index, .. }
            | Action::ClearLayer { index } => Some(*index),
            _ => None,
        }
    }

    /// Apply to `doc`. Targets that no longer exist are skipped with a warning.
    pub fn apply(&self, doc: &mut Document) {
        match self {
            Action::NoOp => {}
            Action::AddLayer { index, layer } => {
                doc.insert_layer(*index, layer.clone());
            }
            Action::DeleteLayer { index } => {
                if doc.remove_layer(*index).is_none() {
                    tracing::warn!(index, "delete-layer skipped: last layer or out of range");
                }
            }
            Action::MoveLayer { from, to } => {
                if !doc.move_layer(*from, *to) {
                    tracing::warn!(from, to, "move-layer skipped");
                }
            }
            Action::ChangeLayerOpacity { index, opacity } => {
                if doc.check_index(*index).is_ok() {
                    doc.set_layer_opacity(*index, *opacity);
                } else {
                    tracing::warn!(index, "opacity change on missing layer");
                }
            }
            Action::ChangeLayerVisibility { index, visible } => {
                if doc.check_index(*index).is_ok() {
                    doc.set_layer_visible(*index, *visible);
                } else {
                    tracing::warn!(index, "visibility change on missing layer");
                }
            }
            Action::DrawImageRegion { index, x, y, image } => match doc.layer_mut(*index) {
                Some(layer) => {
                    layer.surface.put_region(image, *x as i64, *y as i64);
                    doc.mark_painted(*index);
                }
                None => tracing::warn!(index, "draw-image-region on missing layer"),
            },
            Action::ResizeCanvas { width, height } => doc.resize_canvas(*width, *height),
            Action::RestoreCanvas { width, height, surfaces } => {
                doc.restore_surfaces(*width, *height, surfaces)
            }
            Action::FlipHorizontal => doc.flip_horizontal(),
            Action::FillSolid { index, color } => match doc.layer_mut(*index) {
                Some(layer) => {
                    layer.surface.fill(color.to_rgba());
                    doc.mark_painted(*index);
                }
                None => tracing::warn!(index, "fill on missing layer"),
            },
            Action::ClearLayer { index } => match doc.layer_mut(*index) {
                Some(layer) => {
                    layer.surface.clear();
                    doc.mark_painted(*index);
                }
                None => tracing::warn!(index, "clear on missing layer"),
            },
            Action::ChangeDocument { document } => doc.replace_with(document),
        }
    }

    /// Approximate pixel memory held by this action.
    pub fn memory_size(&self) -> usize {
        match self {
            Action::AddLayer { layer, .. } => layer.surface.memory_bytes(),
            Action::DrawImageRegion { image, .. } => image.memory_bytes(),
            Action::RestoreCanvas { surfaces, .. } => surfaces.iter().map(|s| s.memory_bytes()).sum(),
            Action::ChangeDocument { document } => document.memory_bytes(),
            _ => 0,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Action::NoOp => "Nothing".to_string(),
            Action::AddLayer { index, .. } => format!("Add Layer {}", index),
            Action::DeleteLayer { index } => format!("Delete Layer {}", index),
            Action::MoveLayer { from, to } => format!("Move Layer {} → {}", from, to),
            Action::ChangeLayerOpacity { index, opacity } => {
                format!("Layer {} Opacity: {:.0}%", index, opacity * 100.0)
            }
            Action::ChangeLayerVisibility { index, visible } => {
                if *visible {
                    format!("Show Layer {}", index)
                } else {
                    format!("Hide Layer {}", index)
                }
            }
            Action::DrawImageRegion { index, .. } => format!("Draw on Layer {}", index),
            Action::ResizeCanvas { width, height } => format!("Resize to {}×{}", width, height),
            Action::RestoreCanvas { width, height, .. } => format!("Restore {}×{}", width, height),
            Action::FlipHorizontal => "Flip Horizontal".to_string(),
            Action::FillSolid { index, .. } => format!("Fill Layer {}", index),
            Action::ClearLayer { index } => format!("Clear Layer {}", index),
            Action::ChangeDocument { .. } => "Change Document".to_string(),
        }
    }
}

// ============================================================================
// HISTORY NODE
// ============================================================================

/// A forward action, its inverse, and when the pair was created.
#[derive(Clone, Debug)]
pub struct HistoryNode {
    pub do_action: Action,
    pub undo_action: Action,
    created_at: Instant,
    description: String,
}

impl HistoryNode {
    pub fn new(do_action: Action, undo_action: Action) -> Self {
        Self::with_timestamp(do_action, undo_action, Instant::now())
    }

    pub fn with_timestamp(do_action: Action, undo_action: Action, created_at: Instant) -> Self {
        let description = do_action.description();
        Self { do_action, undo_action, created_at, description }
    }

    /// Override the label shown in history listings.
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn memory_size(&self) -> usize {
        self.do_action.memory_size() + self.undo_action.memory_size()
    }

    /// Collapse `self` followed by `next` into one node spanning
    /// `self`'s prior state to `next`'s result, when the two are compatible.
    ///
    /// Only opacity edits on the same layer merge.
    pub fn merge(&self, next: &HistoryNode) -> Option<HistoryNode> {
        match (&self.do_action, &self.undo_action, &next.do_action) {
            (
                Action::ChangeLayerOpacity { index: a, .. },
                Action::ChangeLayerOpacity { index: undo_index, .. },
                Action::ChangeLayerOpacity { index: b, .. },
            ) if a == b && a == undo_index => Some(HistoryNode {
                do_action: next.do_action.clone(),
                undo_action: self.undo_action.clone(),
                created_at: next.created_at,
                description: next.description.clone(),
            }),
            _ => None,
        }
    }
}

// ============================================================================
// HISTORY MANAGER - bounded undo stack + redo stack
// ============================================================================

/// Undo/redo stacks over a [`Document`].
///
/// Nodes leave the manager only through [`HistoryManager::dispose`], which
/// keeps memory accounting exact across eviction, redo clearing and merges.
pub struct HistoryManager {
    undo_stack: VecDeque<HistoryNode>,
    redo_stack: Vec<HistoryNode>,
    max_undo: usize,
    merge_window: Duration,
    /// Running memory total across both stacks.
    total_memory: usize,
    /// Nodes released so far.
    disposed: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_MAX, DEFAULT_MERGE_WINDOW)
    }
}

impl HistoryManager {
    pub fn new(max_undo: usize, merge_window: Duration) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_undo,
            merge_window,
            total_memory: 0,
            disposed: 0,
        }
    }

    /// Execute `node.do_action` and record the node.
    pub fn push_action(&mut self, doc: &mut Document, node: HistoryNode) {
        node.do_action.apply(doc);

        let mut node = node;
        if self.redo_stack.is_empty()
            && let Some(top) = self.undo_stack.back()
            && node.created_at.saturating_duration_since(top.created_at) <= self.merge_window
            && let Some(merged) = top.merge(&node)
        {
            tracing::debug!(description = merged.description(), "merging history node");
            if let Some(replaced) = self.undo_stack.pop_back() {
                self.dispose(replaced);
            }
            self.dispose(node);
            node = merged;
        }

        self.total_memory += node.memory_size();
        self.undo_stack.push_back(node);
        self.prune();

        for stale in std::mem::take(&mut self.redo_stack) {
            self.dispose(stale);
        }
    }

    /// Revert the most recent node. Returns its description, or `None` when
    /// there is nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> Option<String> {
        let node = self.undo_stack.pop_back()?;
        node.undo_action.apply(doc);
        let description = node.description.clone();
        self.redo_stack.push(node);
        Some(description)
    }

    pub fn redo(&mut self, doc: &mut Document) -> Option<String> {
        let node = self.redo_stack.pop()?;
        node.do_action.apply(doc);
        let description = node.description.clone();
        self.undo_stack.push_back(node);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|n| n.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|n| n.description())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|n| n.description.clone()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn disposed_count(&self) -> usize {
        self.disposed
    }

    pub fn max_undo(&self) -> usize {
        self.max_undo
    }

    pub fn merge_window(&self) -> Duration {
        self.merge_window
    }

    /// Change the undo capacity, evicting the oldest nodes if it shrank.
    pub fn set_max_undo(&mut self, max_undo: usize) {
        self.max_undo = max_undo;
        self.prune();
    }

    pub fn set_merge_window(&mut self, window: Duration) {
        self.merge_window = window;
    }

    pub fn clear(&mut self) {
        while let Some(node) = self.undo_stack.pop_front() {
            self.dispose(node);
        }
        for node in std::mem::take(&mut self.redo_stack) {
            self.dispose(node);
        }
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_undo {
            if let Some(evicted) = self.undo_stack.pop_front() {
                tracing::debug!(description = evicted.description(), "evicting oldest history node");
                self.dispose(evicted);
            }
        }
    }

    /// Release a node that is leaving the history for good.
    fn dispose(&mut self, node: HistoryNode) {
        self.total_memory = self.total_memory.saturating_sub(node.memory_size());
        self.disposed += 1;
    }
}
