//! End-to-end editing scenarios against the public controller API.

use std::time::{Duration, Instant};

use image::Rgba;
use sketchpad::canvas::{Document, Offscreen};
use sketchpad::components::tools::Tool;
use sketchpad::controller::CanvasController;
use sketchpad::geometry::{Color, Rect};
use sketchpad::ops::flood_fill::{FillParams, flood_fill};
use sketchpad::settings::Settings;

fn surfaces(c: &CanvasController) -> Vec<Offscreen> {
    c.document().layers().iter().map(|l| l.surface.clone()).collect()
}

const EXACT: FillParams = FillParams { tolerance: 0.0, close_gap: 0.0, expand: 0.0 };

#[test]
fn tap_stroke_then_undo_restores_layer() {
    let mut c = CanvasController::new(344, 135).unwrap();
    c.update_tool_settings(|t| t.brush.set_size(4.0));
    let before = surfaces(&c);

    let t0 = Instant::now();
    c.pointer_down(1, 10.0, 10.0, t0);
    c.pointer_up(1, 10.0, 10.0, t0);
    assert_ne!(surfaces(&c), before, "tap draws a dot");
    assert_eq!(c.document().layers()[0].surface.get_pixel(10, 10)[3], 255);

    assert!(c.undo());
    assert_eq!(surfaces(&c), before);
}

#[test]
fn bucket_on_uniform_layer_covers_canvas() {
    let doc = Document::new(100, 100).unwrap();
    let region = flood_fill(&doc.composite(), 50, 50, &EXACT).unwrap();
    assert_eq!(region.rect(), Rect::new(0.0, 0.0, 100.0, 100.0));
    assert_eq!(region.pixel_count(), 100 * 100);
}

#[test]
fn bucket_stops_at_one_pixel_border() {
    let mut doc = Document::new(100, 100).unwrap();
    let layer = doc.layer_mut(0).unwrap();
    for i in 0..100 {
        for (x, y) in [(i, 0), (i, 99), (0, i), (99, i)] {
            layer.surface.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
    let region = flood_fill(&doc.composite(), 50, 50, &EXACT).unwrap();
    assert_eq!(region.rect(), Rect::new(1.0, 1.0, 98.0, 98.0));
    assert_eq!(region.pixel_count(), 98 * 98);
}

#[test]
fn controller_bucket_recolors_connected_region() {
    let mut c = CanvasController::new(20, 20).unwrap();
    c.set_color(Color::BLACK);
    c.fill();
    c.set_tool(Tool::Bucket);
    c.set_color(Color::rgb(0, 0, 255));
    c.pointer_down(1, 3.0, 3.0, Instant::now());
    assert_eq!(c.document().layers()[0].surface.get_pixel(19, 19), Rgba([0, 0, 255, 255]));
    assert_eq!(c.history().undo_count(), 2);

    assert!(c.undo());
    assert_eq!(c.document().layers()[0].surface.get_pixel(19, 19), Rgba([0, 0, 0, 255]));
}

#[test]
fn history_is_bounded_by_undo_max() {
    let mut c = CanvasController::new(8, 8).unwrap();
    c.apply_settings(&Settings { undo_max: 20, stroke_merge_time: Duration::ZERO });

    let mut after_each = Vec::new();
    for i in 0..25u8 {
        c.set_color(Color::rgb(i * 10, 0, 0));
        c.fill();
        after_each.push(surfaces(&c));
    }
    assert_eq!(c.history().undo_count(), 20);

    for _ in 0..20 {
        assert!(c.undo());
    }
    assert!(!c.undo(), "evicted entries are gone");
    assert_eq!(c.history().redo_count(), 20);
    // Oldest reachable state: after the five evicted fills.
    assert_eq!(surfaces(&c), after_each[4]);

    for _ in 0..20 {
        assert!(c.redo());
    }
    assert_eq!(surfaces(&c), after_each[24]);
}

#[test]
fn shrink_resize_undo_restores_cropped_pixels() {
    let mut c = CanvasController::new(344, 135).unwrap();
    c.set_color(Color::rgb(200, 30, 30));
    c.fill();
    let t0 = Instant::now();
    c.set_color(Color::rgb(0, 0, 0));
    c.pointer_down(1, 300.0, 120.0, t0);
    c.pointer_up(1, 330.0, 125.0, t0);
    let before = surfaces(&c);

    c.resize(100, 100).unwrap();
    assert_eq!((c.document().width(), c.document().height()), (100, 100));

    assert!(c.undo());
    assert_eq!((c.document().width(), c.document().height()), (344, 135));
    assert_eq!(surfaces(&c), before);

    assert!(c.redo());
    assert_eq!(c.document().layers()[0].surface.dimensions(), (100, 100));
}

#[test]
fn opacity_edits_merge_into_one_step() {
    let mut c = CanvasController::new(8, 8).unwrap();
    c.apply_settings(&Settings { undo_max: 20, stroke_merge_time: Duration::from_millis(500) });
    c.set_layer_opacity(0, 0.5).unwrap();
    c.set_layer_opacity(0, 0.2).unwrap();
    assert_eq!(c.history().undo_count(), 1);
    assert_eq!(c.document().layers()[0].opacity(), 0.2);

    assert!(c.undo());
    assert_eq!(c.document().layers()[0].opacity(), 1.0);
    assert!(!c.history().can_undo());
}

#[test]
fn new_action_after_undo_clears_redo() {
    let mut c = CanvasController::new(8, 8).unwrap();
    c.add_layer().unwrap();
    c.flip_horizontal();
    assert!(c.undo());
    assert!(c.history().can_redo());
    c.clear_layer();
    assert!(!c.history().can_redo());
    assert_eq!(c.history().redo_count(), 0);
}

#[test]
fn serialized_document_survives_reload() {
    let mut c = CanvasController::new(30, 20).unwrap();
    c.add_layer().unwrap();
    c.set_color(Color::rgb(10, 120, 240));
    c.pointer_down(1, 5.0, 5.0, Instant::now());
    c.pointer_up(1, 25.0, 15.0, Instant::now());
    c.set_layer_visibility(0, false).unwrap();
    let json = c.serialize().unwrap();

    let mut reloaded = CanvasController::new(1, 1).unwrap();
    pollster::block_on(reloaded.load_serialized(&json)).unwrap();
    assert_eq!(surfaces(&reloaded), surfaces(&c));
    assert!(!reloaded.document().layers()[0].is_visible());
    assert_eq!(reloaded.document().width(), 30);
}
