use std::{error::Error as StdError, fmt};

use crate::core::host::widget::Widget;

/// Pixel-format request made when a surface's context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceAttributes {
    pub double_buffer: bool,
}

impl Default for SurfaceAttributes {
    fn default() -> Self {
        Self {
            double_buffer: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    SurfaceDisposed,
    CreationFailed(String),
    /// A drawing call was made with no context bound.
    NotCurrent,
    Lost(String),
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SurfaceDisposed => write!(f, "surface is disposed"),
            Self::CreationFailed(why) => write!(f, "context creation failed: {why}"),
            Self::NotCurrent => write!(f, "no context is current"),
            Self::Lost(why) => write!(f, "context lost: {why}"),
        }
    }
}

impl StdError for ContextError {}

/// What a bridge needs from the graphics API.
///
/// The "current" binding is global to the thread: binding one context
/// unbinds any other, and nothing guarantees a binding survives a return
/// to the event loop.
pub trait GraphicsApi {
    type Context;

    /// Create a context rendering into `surface`.
    fn create_context(
        &mut self,
        surface: &Widget,
        attrs: &SurfaceAttributes,
    ) -> Result<Self::Context, ContextError>;

    /// Bind `ctx` as the thread's current context.
    ///
    /// Must keep working while the surface is being disposed, so that
    /// resources can be released with the context current.
    fn make_current(&mut self, ctx: &Self::Context) -> Result<(), ContextError>;

    /// Present the frame drawn into `ctx`.
    fn swap_buffers(&mut self, ctx: &Self::Context) -> Result<(), ContextError>;

    /// Set the viewport of the current context.
    fn set_viewport(&mut self, viewport: Viewport) -> Result<(), ContextError>;
}
