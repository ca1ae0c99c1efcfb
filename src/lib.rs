#[cfg(feature = "winit")]
pub mod app;
pub mod core;
pub mod error;

pub use crate::core::bridge::SurfaceBridge;
pub use crate::core::input::{InputHandle, InputState};
pub use crate::core::render_loop::RenderLoop;
pub use crate::error::{AppError, Result};
