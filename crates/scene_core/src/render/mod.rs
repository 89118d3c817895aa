//! Render-facing math
//!
//! Camera projection and view matrices consumed by renderers.

pub mod camera;
pub mod view;

pub use camera::{Camera, CameraMode, Exposure, ProjectionType};
pub use view::View;
