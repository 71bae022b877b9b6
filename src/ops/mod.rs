pub mod brush;
pub mod canvas_ops;
pub mod filters;
pub mod flood_fill;
