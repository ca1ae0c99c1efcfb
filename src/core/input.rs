use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

/// Level-state snapshot of keyboard and mouse input.
///
/// Anything never written reads as released / zero. Writes are
/// last-write-wins and no release is ever inferred: the host may drop a key
/// release while several keys are held, so such a key keeps reading `true`.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    keys_by_char: HashMap<char, bool>,
    keys_by_code: HashMap<u32, bool>,
    modifiers: HashMap<u32, bool>,
    mouse_buttons: HashMap<u32, bool>,
    mouse_x: i32,
    mouse_y: i32,
    scroll_delta: i32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pressed state of a key by its printable character.
    pub fn key(&self, key: char) -> bool {
        self.keys_by_char.get(&key).copied().unwrap_or(false)
    }

    /// Pressed state of a key by its physical key code.
    pub fn key_code(&self, code: u32) -> bool {
        self.keys_by_code.get(&code).copied().unwrap_or(false)
    }

    /// Pressed state of a modifier mask, as reported with key events.
    pub fn modifier(&self, mask: u32) -> bool {
        self.modifiers.get(&mask).copied().unwrap_or(false)
    }

    /// Pressed state of a mouse button, numbered from 1.
    pub fn mouse_button(&self, button: u32) -> bool {
        self.mouse_buttons.get(&button).copied().unwrap_or(false)
    }

    /// Last known pointer X within the surface.
    pub fn mouse_x(&self) -> i32 {
        self.mouse_x
    }

    /// Last known pointer Y within the surface.
    pub fn mouse_y(&self) -> i32 {
        self.mouse_y
    }

    /// Wheel delta reported since the previous frame, 0 when none.
    pub fn scroll_delta(&self) -> i32 {
        self.scroll_delta
    }

    pub(crate) fn set_key(&mut self, key: char, pressed: bool) {
        self.keys_by_char.insert(key, pressed);
    }

    pub(crate) fn set_key_code(&mut self, code: u32, pressed: bool) {
        self.keys_by_code.insert(code, pressed);
    }

    pub(crate) fn set_modifier(&mut self, mask: u32, pressed: bool) {
        self.modifiers.insert(mask, pressed);
    }

    pub(crate) fn set_mouse_button(&mut self, button: u32, pressed: bool) {
        self.mouse_buttons.insert(button, pressed);
    }

    pub(crate) fn set_mouse_pos(&mut self, x: i32, y: i32) {
        self.mouse_x = x;
        self.mouse_y = y;
    }

    pub(crate) fn set_scroll_delta(&mut self, delta: i32) {
        self.scroll_delta = delta;
    }
}

/// Shared handle to the [`InputState`] bound to one render loop.
///
/// Cloning yields another handle to the same state. Readers get a shared
/// borrow; only the crate's event translation can write.
#[derive(Debug, Default, Clone)]
pub struct InputHandle(Rc<RefCell<InputState>>);

impl InputHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the current snapshot.
    ///
    /// Panics if held across a point where the bridge writes input, i.e.
    /// across a return to the event loop.
    pub fn get(&self) -> Ref<'_, InputState> {
        self.0.borrow()
    }

    pub(crate) fn get_mut(&self) -> RefMut<'_, InputState> {
        self.0.borrow_mut()
    }
}
