pub mod event;
pub mod idle;
pub mod widget;

pub use event::{KeyEvent, PointerEvent, SurfaceEvent};
pub use idle::{IdleQueue, Scheduler, Task};
pub use widget::{Layout, Orientation, Rect, Style, Widget};
