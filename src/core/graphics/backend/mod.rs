// src/core/graphics/backend/mod.rs
#[cfg(feature = "software")]
pub mod software;

// Re-export the selected backend under a common name:
#[cfg(feature = "software")]
pub use software::SoftwareGraphics as SelectedGraphics;
