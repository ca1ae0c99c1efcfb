use std::{error::Error as StdError, fmt};

#[cfg(feature = "winit")]
use softbuffer::SoftBufferError;
#[cfg(feature = "winit")]
use winit::error::{EventLoopError, OsError};

use crate::core::graphics::api::ContextError;

#[derive(Debug)]
pub enum AppError {
    Context(ContextError, &'static str), // graphics context failure + step that failed
    Renderer(Box<dyn StdError>),         // raised by a RenderLoop hook
    Disposed,                            // widget already torn down
    InvalidState(&'static str),          // lifecycle misuse
    #[cfg(feature = "winit")]
    Winit(EventLoopError),               // winit's EventLoopError
    #[cfg(feature = "winit")]
    Window(OsError),                     // native window creation
    #[cfg(feature = "winit")]
    SoftBuffer(SoftBufferError),         // presenting to the native window
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context(e, ctx) => write!(f, "graphics context error: {e} (context: {ctx})"),
            Self::Renderer(e) => write!(f, "renderer: {e}"),
            Self::Disposed => write!(f, "widget is disposed"),
            Self::InvalidState(what) => write!(f, "invalid state: {what}"),
            #[cfg(feature = "winit")]
            Self::Winit(e) => write!(f, "winit: {e}"),
            #[cfg(feature = "winit")]
            Self::Window(e) => write!(f, "window: {e}"),
            #[cfg(feature = "winit")]
            Self::SoftBuffer(e) => write!(f, "softbuffer: {e}"),
        }
    }
}

impl StdError for AppError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Context(e, _) => Some(e),
            Self::Renderer(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// `?` conversions
impl From<ContextError> for AppError {
    fn from(e: ContextError) -> Self {
        Self::Context(e, "unspecified") // fallback context
    }
}
impl From<Box<dyn StdError>> for AppError {
    fn from(e: Box<dyn StdError>) -> Self {
        Self::Renderer(e)
    }
}
impl From<String> for AppError {
    fn from(msg: String) -> Self {
        Self::Renderer(msg.into())
    }
}
impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        Self::Renderer(msg.into())
    }
}
#[cfg(feature = "winit")]
impl From<EventLoopError> for AppError {
    fn from(e: EventLoopError) -> Self {
        Self::Winit(e)
    }
}
#[cfg(feature = "winit")]
impl From<OsError> for AppError {
    fn from(e: OsError) -> Self {
        Self::Window(e)
    }
}
#[cfg(feature = "winit")]
impl From<SoftBufferError> for AppError {
    fn from(e: SoftBufferError) -> Self {
        Self::SoftBuffer(e)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

pub trait ContextResultExt<T> {
    fn context_step(self, step: &'static str) -> Result<T>;
}

impl<T> ContextResultExt<T> for std::result::Result<T, ContextError> {
    fn context_step(self, step: &'static str) -> Result<T> {
        self.map_err(|e| AppError::Context(e, step))
    }
}
