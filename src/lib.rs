//! Pixel canvas editing engine: layered documents, brush and bucket tools,
//! selection grab, bounded undo/redo history and JSON persistence.
//!
//! [`controller::CanvasController`] is the entry point for interactive use;
//! [`io`] handles persistence and export.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::large_enum_variant)]

pub mod canvas;
pub mod cli;
pub mod components;
pub mod controller;
pub mod error;
pub mod events;
pub mod geometry;
pub mod io;
pub mod logger;
pub mod ops;
pub mod pool;
pub mod project;
pub mod render;
pub mod settings;

pub use canvas::{Document, Layer, Offscreen};
pub use controller::CanvasController;
pub use error::{CanvasError, CanvasResult, DocumentError};
pub use geometry::{Color, Rect};
