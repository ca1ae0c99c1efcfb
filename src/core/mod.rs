pub mod bridge;
pub mod graphics;
pub mod host;
pub mod input;
pub mod render_loop;
