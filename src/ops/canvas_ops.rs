// ============================================================================
// CANVAS-LEVEL OPERATIONS - build (do, undo) action pairs
// ============================================================================
//
// Every builder validates its arguments against the current document and
// captures the state its inverse needs *before* anything is mutated. The
// returned node is handed to `HistoryManager::push_action`, which executes it.
// `Ok(None)` means the request is valid but changes nothing.

use crate::canvas::{Document, Layer, Offscreen, validate_size};
use crate::components::history::{Action, HistoryNode};
use crate::error::{CanvasError, CanvasResult};
use crate::geometry::Color;

/// Insert a blank layer at `index` (0 ..= layer count).
pub fn add_layer(doc: &Document, index: usize) -> CanvasResult<HistoryNode> {
    if index > doc.layer_count() {
        return Err(CanvasError::LayerIndexOutOfRange { index, len: doc.layer_count() });
    }
    let layer = Layer::new(doc.width(), doc.height());
    Ok(HistoryNode::new(
        Action::AddLayer { index, layer },
        Action::DeleteLayer { index },
    ))
}

/// Delete the layer at `index`. The last remaining layer cannot be deleted.
pub fn delete_layer(doc: &Document, index: usize) -> CanvasResult<Option<HistoryNode>> {
    doc.check_index(index)?;
    if doc.layer_count() <= 1 {
        tracing::debug!("refusing to delete the only layer");
        return Ok(None);
    }
    let layer = doc.layers()[index].clone();
    Ok(Some(HistoryNode::new(
        Action::DeleteLayer { index },
        Action::AddLayer { index, layer },
    )))
}

/// Duplicate the layer at `index` directly above it.
pub fn duplicate_layer(doc: &Document, index: usize) -> CanvasResult<HistoryNode> {
    doc.check_index(index)?;
    let copy = doc.layers()[index].duplicate();
    Ok(HistoryNode::new(
        Action::AddLayer { index: index + 1, layer: copy },
        Action::DeleteLayer { index: index + 1 },
    )
    .described(format!("Duplicate Layer {}", index)))
}

pub fn move_layer(doc: &Document, from: usize, to: usize) -> CanvasResult<Option<HistoryNode>> {
    doc.check_index(from)?;
    doc.check_index(to)?;
    if from == to {
        return Ok(None);
    }
    Ok(Some(HistoryNode::new(
        Action::MoveLayer { from, to },
        Action::MoveLayer { from: to, to: from },
    )))
}

pub fn set_layer_opacity(doc: &Document, index: usize, opacity: f32) -> CanvasResult<HistoryNode> {
    doc.check_index(index)?;
    if !(0.0..=1.0).contains(&opacity) {
        return Err(CanvasError::InvalidOpacity(opacity));
    }
    let previous = doc.layers()[index].opacity();
    Ok(HistoryNode::new(
        Action::ChangeLayerOpacity { index, opacity },
        Action::ChangeLayerOpacity { index, opacity: previous },
    ))
}

pub fn set_layer_visibility(doc: &Document, index: usize, visible: bool) -> CanvasResult<Option<HistoryNode>> {
    doc.check_index(index)?;
    let previous = doc.layers()[index].is_visible();
    if previous == visible {
        return Ok(None);
    }
    Ok(Some(HistoryNode::new(
        Action::ChangeLayerVisibility { index, visible },
        Action::ChangeLayerVisibility { index, visible: previous },
    )))
}

/// Resize the canvas, anchored top-left.
///
/// Shrinking on either axis loses pixels, so the inverse keeps a full copy
/// of every layer. Pure growth is undone by resizing back.
pub fn resize_canvas(doc: &Document, width: i64, height: i64) -> CanvasResult<Option<HistoryNode>> {
    validate_size(width, height)?;
    let (width, height) = (width as u32, height as u32);
    let (old_w, old_h) = (doc.width(), doc.height());
    if (width, height) == (old_w, old_h) {
        return Ok(None);
    }

    let undo = if width < old_w || height < old_h {
        let surfaces: Vec<Offscreen> = doc.layers().iter().map(|l| l.surface.clone()).collect();
        Action::RestoreCanvas { width: old_w, height: old_h, surfaces }
    } else {
        Action::ResizeCanvas { width: old_w, height: old_h }
    };
    Ok(Some(HistoryNode::new(Action::ResizeCanvas { width, height }, undo)))
}

pub fn flip_horizontal() -> HistoryNode {
    HistoryNode::new(Action::FlipHorizontal, Action::FlipHorizontal)
}

fn full_snapshot(doc: &Document, index: usize) -> Action {
    Action::DrawImageRegion {
        index,
        x: 0,
        y: 0,
        image: doc.layers()[index].surface.clone(),
    }
}

pub fn fill_layer(doc: &Document, index: usize, color: Color) -> CanvasResult<HistoryNode> {
    doc.check_index(index)?;
    Ok(HistoryNode::new(Action::FillSolid { index, color }, full_snapshot(doc, index)))
}

pub fn clear_layer(doc: &Document, index: usize) -> CanvasResult<HistoryNode> {
    doc.check_index(index)?;
    Ok(HistoryNode::new(Action::ClearLayer { index }, full_snapshot(doc, index)))
}

/// Replace the layer pixels at (`x`, `y`) with `image`.
///
/// The inverse restores just that rectangle. An empty `image` gets a
/// no-op inverse.
pub fn draw_region(doc: &Document, index: usize, x: u32, y: u32, image: Offscreen) -> CanvasResult<HistoryNode> {
    doc.check_index(index)?;
    let undo = if image.width() == 0 || image.height() == 0 {
        Action::NoOp
    } else {
        let before = doc.layers()[index].surface.extract_region(x, y, image.width(), image.height());
        Action::DrawImageRegion { index, x, y, image: before }
    };
    Ok(HistoryNode::new(Action::DrawImageRegion { index, x, y, image }, undo))
}

/// Swap the whole document for `next`.
pub fn change_document(doc: &Document, next: Document) -> HistoryNode {
    HistoryNode::new(
        Action::ChangeDocument { document: Box::new(next) },
        Action::ChangeDocument { document: Box::new(doc.clone()) },
    )
}
