use crate::core::input::InputHandle;
use crate::error::Result;

/// Per-surface rendering behaviour driven by a [`SurfaceBridge`].
///
/// Every hook runs on the event-loop thread with this surface's graphics
/// context already current. No time step is passed to [`frame`]; sample
/// your own clock if you need one.
///
/// [`SurfaceBridge`]: crate::core::bridge::SurfaceBridge
/// [`frame`]: RenderLoop::frame
pub trait RenderLoop {
    /// Allocate graphics resources. Called once, before the first frame.
    fn init(&mut self) -> Result<()>;

    /// Draw one frame. Input has been refreshed for this iteration.
    fn frame(&mut self) -> Result<()>;

    /// Release everything created in `init`. Called once, on disposal.
    fn shutdown(&mut self) -> Result<()>;

    /// The input state bound to this loop for its whole lifetime.
    fn input_state(&self) -> &InputHandle;
}
