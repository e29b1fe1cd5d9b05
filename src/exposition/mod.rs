//! Prometheus text exposition.

mod render;

pub use render::{CONTENT_TYPE, render, render_into};
