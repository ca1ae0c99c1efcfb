// src/core/host/event.rs

/// Modifier bits carried in [`KeyEvent::state_mask`].
pub const MOD_ALT: u32 = 1 << 16;
pub const MOD_SHIFT: u32 = 1 << 17;
pub const MOD_CTRL: u32 = 1 << 18;
pub const MOD_COMMAND: u32 = 1 << 22;

/// Mouse buttons are numbered from 1. Extra buttons follow `BUTTON_FORWARD`.
pub const BUTTON_LEFT: u32 = 1;
pub const BUTTON_MIDDLE: u32 = 2;
pub const BUTTON_RIGHT: u32 = 3;
pub const BUTTON_BACK: u32 = 4;
pub const BUTTON_FORWARD: u32 = 5;

/// Key codes for keys without a printable form live above this bit.
pub const KEYCODE_BIT: u32 = 1 << 24;
pub const KEY_ARROW_UP: u32 = KEYCODE_BIT + 1;
pub const KEY_ARROW_DOWN: u32 = KEYCODE_BIT + 2;
pub const KEY_ARROW_LEFT: u32 = KEYCODE_BIT + 3;
pub const KEY_ARROW_RIGHT: u32 = KEYCODE_BIT + 4;
pub const KEY_PAGE_UP: u32 = KEYCODE_BIT + 5;
pub const KEY_PAGE_DOWN: u32 = KEYCODE_BIT + 6;
pub const KEY_HOME: u32 = KEYCODE_BIT + 7;
pub const KEY_END: u32 = KEYCODE_BIT + 8;
pub const KEY_INSERT: u32 = KEYCODE_BIT + 9;
/// F1 is `KEY_F1`, F2 is `KEY_F1 + 1`, up to F12.
pub const KEY_F1: u32 = KEYCODE_BIT + 10;
pub const KEY_SHIFT: u32 = MOD_SHIFT;
pub const KEY_CTRL: u32 = MOD_CTRL;
pub const KEY_ALT: u32 = MOD_ALT;
pub const KEY_COMMAND: u32 = MOD_COMMAND;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Printable character, `'\0'` when the key has none.
    pub character: char,
    pub key_code: u32,
    /// Modifier bits held when the event was generated.
    pub state_mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    /// 0 for plain moves.
    pub button: u32,
    /// Surface-relative position.
    pub x: i32,
    pub y: i32,
}

impl PointerEvent {
    pub fn at(x: i32, y: i32) -> Self {
        Self { button: 0, x, y }
    }

    pub fn button(button: u32, x: i32, y: i32) -> Self {
        Self { button, x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    MouseMove(PointerEvent),
    MouseDown(PointerEvent),
    MouseUp(PointerEvent),
    /// Signed number of wheel steps, positive away from the user.
    MouseWheel { count: i32 },
    /// Widget bounds changed; read the new size from the widget.
    Resize,
    Paint,
    Dispose,
}

impl SurfaceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeyDown(_) => "KeyDown",
            Self::KeyUp(_) => "KeyUp",
            Self::MouseMove(_) => "MouseMove",
            Self::MouseDown(_) => "MouseDown",
            Self::MouseUp(_) => "MouseUp",
            Self::MouseWheel { .. } => "MouseWheel",
            Self::Resize => "Resize",
            Self::Paint => "Paint",
            Self::Dispose => "Dispose",
        }
    }
}
