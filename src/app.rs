// src/app.rs

use std::cell::RefCell;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::Arc;

use log::{error, info, warn};
use softbuffer::{Context, Surface};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, Modifiers, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, OwnedDisplayHandle},
    keyboard::{Key, KeyCode, NamedKey, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::core::bridge::SurfaceBridge;
use crate::core::graphics::backend::SelectedGraphics;
use crate::core::host::event::*;
use crate::core::host::{IdleQueue, Layout, Orientation, Rect, Style, Widget};
use crate::core::render_loop::RenderLoop;
use crate::error::{AppError, Result};

// Shows through as the border around each surface.
const BACKGROUND: u32 = 0x0030_3030;

/// One native window hosting any number of bridged surfaces side by side.
pub struct App {
    title: String,
    size: PhysicalSize<u32>,
    pending: Vec<Rc<RefCell<dyn RenderLoop>>>,
    idle: IdleQueue,
    window: Option<Arc<Window>>,
    // Declared before `context`: the surface must go first.
    presenter: Option<Surface<OwnedDisplayHandle, Arc<Window>>>,
    context: Option<Context<OwnedDisplayHandle>>,
    root: Option<Widget>,
    bridges: Vec<SurfaceBridge<SelectedGraphics>>,
    focus: Option<Widget>,
    cursor: (i32, i32),
    modifiers: u32,
    error: Option<AppError>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.open(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let result = match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                let result = self.teardown();
                event_loop.exit();
                result
            }
            WindowEvent::Resized(size) => match &self.root {
                Some(root) => root.set_bounds(Rect::new(0, 0, size.width as i32, size.height as i32)),
                None => Ok(()),
            },
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifier_mask(&modifiers);
                Ok(())
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as i32, position.y as i32);
                self.pointer(|x, y| SurfaceEvent::MouseMove(PointerEvent::at(x, y)))
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = button_number(button);
                match state {
                    ElementState::Pressed => {
                        self.focus = click_focus(self.focus.take(), self.under_cursor());
                        self.pointer(|x, y| SurfaceEvent::MouseDown(PointerEvent::button(button, x, y)))
                    }
                    ElementState::Released => {
                        self.pointer(|x, y| SurfaceEvent::MouseUp(PointerEvent::button(button, x, y)))
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let count = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y.round() as i32,
                    MouseScrollDelta::PixelDelta(p) => (p.y / 40.0).round() as i32,
                };
                if count == 0 {
                    Ok(())
                } else {
                    self.pointer(|_, _| SurfaceEvent::MouseWheel { count })
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let character = key_character(&event.logical_key);
                let key = KeyEvent {
                    character,
                    key_code: key_code(event.physical_key, character),
                    state_mask: self.modifiers,
                };
                let event = match event.state {
                    ElementState::Pressed => SurfaceEvent::KeyDown(key),
                    ElementState::Released => SurfaceEvent::KeyUp(key),
                };
                match &self.focus {
                    Some(target) => target.dispatch(&event),
                    None => Ok(()),
                }
            }
            WindowEvent::RedrawRequested => self.bridges.iter().try_for_each(|bridge| {
                bridge.canvas().map_or(Ok(()), |canvas| canvas.dispatch(&SurfaceEvent::Paint))
            }),
            _ => Ok(()),
        };
        if let Err(e) = result {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // One idle period: every surface runs at most one frame.
        if let Err(e) = self.idle.run_pending() {
            self.fail(event_loop, e);
            return;
        }
        if let Err(e) = self.present() {
            self.fail(event_loop, e);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Err(e) = self.teardown() {
            warn!("teardown on exit: {e}");
        }
    }
}

impl App {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            size: PhysicalSize::new(900, 450),
            pending: Vec::new(),
            idle: IdleQueue::new(),
            window: None,
            presenter: None,
            context: None,
            root: None,
            bridges: Vec::new(),
            focus: None,
            cursor: (0, 0),
            modifiers: 0,
            error: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = PhysicalSize::new(width, height);
        self
    }

    /// Embed another surface; surfaces are laid out left to right.
    pub fn with_surface(mut self, render_loop: Rc<RefCell<dyn RenderLoop>>) -> Self {
        self.pending.push(render_loop);
        self
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = WindowAttributes::default()
            .with_title(self.title.clone())
            .with_inner_size(self.size);
        let window = Arc::new(event_loop.create_window(attrs)?);

        let context = Context::new(event_loop.owned_display_handle())?;
        let presenter = Surface::new(&context, window.clone())?;

        let size = window.inner_size();
        let root = Widget::root(
            Rect::new(0, 0, size.width as i32, size.height as i32),
            Style::NO_FOCUS,
            Layout::Fill(Orientation::Horizontal),
        );
        let scheduler = Rc::new(self.idle.clone());
        for render_loop in self.pending.drain(..) {
            let bridge = SurfaceBridge::new(&root, Style::BORDER | Style::NO_FOCUS, render_loop, SelectedGraphics, scheduler.clone())?;
            bridge.activate()?;
            self.bridges.push(bridge);
        }
        self.focus = self.bridges.first().and_then(SurfaceBridge::canvas);
        info!("window open with {} surface(s)", self.bridges.len());

        self.window = Some(window);
        self.context = Some(context);
        self.presenter = Some(presenter);
        self.root = Some(root);
        Ok(())
    }

    /// Dispose every surface; each render loop shuts down exactly once.
    fn teardown(&mut self) -> Result<()> {
        self.focus = None;
        self.bridges.clear();
        match self.root.take() {
            Some(root) => root.dispose(),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: AppError) {
        error!("{e}");
        if self.error.is_none() {
            self.error = Some(e);
        }
        event_loop.exit();
    }

    fn under_cursor(&self) -> Option<Widget> {
        let (x, y) = self.cursor;
        self.root.as_ref()?.hit_test(x, y)
    }

    /// Send a pointer event, in surface coordinates, to whatever is under
    /// the cursor.
    fn pointer(&self, make: impl FnOnce(i32, i32) -> SurfaceEvent) -> Result<()> {
        let Some(target) = self.under_cursor() else {
            return Ok(());
        };
        let origin = target.bounds();
        let (x, y) = self.cursor;
        target.dispatch(&make(x - origin.x, y - origin.y))
    }

    /// Copy every surface's presented pixels into the window.
    fn present(&mut self) -> Result<()> {
        let (Some(window), Some(presenter)) = (&self.window, self.presenter.as_mut()) else {
            return Ok(());
        };
        let size = window.inner_size();
        let (Some(width), Some(height)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height)) else {
            return Ok(());
        };
        presenter.resize(width, height)?;

        let mut buffer = presenter.buffer_mut()?;
        let window_area = Rect::new(0, 0, size.width as i32, size.height as i32);
        if let Some(root) = &self.root {
            erase(&mut buffer, window_area, root);
        }
        for bridge in &self.bridges {
            let Some(canvas) = bridge.canvas().filter(|c| !c.is_disposed()) else {
                continue;
            };
            let origin = canvas.bounds();
            bridge.with_context(|ctx| {
                ctx.read_front(|pixels, w, h| blit(&mut buffer, window_area, origin, pixels, w, h))
            });
        }
        buffer.present()?;
        Ok(())
    }
}

/// A click moves focus to the clicked widget unless it refuses focus.
fn click_focus(current: Option<Widget>, clicked: Option<Widget>) -> Option<Widget> {
    match clicked {
        Some(widget) if widget.accepts_focus() => Some(widget),
        _ => current,
    }
}

/// Paint the background everywhere except under `NO_BACKGROUND` widgets,
/// which their own content covers.
fn erase(dst: &mut [u32], dst_area: Rect, root: &Widget) {
    let mut keep = Vec::new();
    let mut pending = vec![root.clone()];
    while let Some(widget) = pending.pop() {
        if widget.style().contains(Style::NO_BACKGROUND) {
            keep.push(widget.bounds());
        } else {
            pending.extend(widget.children());
        }
    }
    let stride = dst_area.width.max(1) as usize;
    for (i, pixel) in dst.iter_mut().enumerate() {
        let (x, y) = ((i % stride) as i32, (i / stride) as i32);
        if !keep.iter().any(|r| r.contains(x, y)) {
            *pixel = BACKGROUND;
        }
    }
}

fn blit(dst: &mut [u32], dst_area: Rect, origin: Rect, src: &[u32], width: usize, height: usize) {
    let stride = dst_area.width as usize;
    for row in 0..height {
        let y = origin.y + row as i32;
        if y < 0 || y >= dst_area.height {
            continue;
        }
        let x0 = origin.x.max(0);
        let x1 = (origin.x + width as i32).min(dst_area.width);
        if x0 >= x1 {
            return;
        }
        let skip = (x0 - origin.x) as usize;
        let count = (x1 - x0) as usize;
        let line = &src[row * width + skip..row * width + skip + count];
        let at = y as usize * stride + x0 as usize;
        dst[at..at + count].copy_from_slice(line);
    }
}

fn modifier_mask(modifiers: &Modifiers) -> u32 {
    let state = modifiers.state();
    let mut mask = 0;
    if state.shift_key() {
        mask |= MOD_SHIFT;
    }
    if state.control_key() {
        mask |= MOD_CTRL;
    }
    if state.alt_key() {
        mask |= MOD_ALT;
    }
    if state.super_key() {
        mask |= MOD_COMMAND;
    }
    mask
}

fn button_number(button: MouseButton) -> u32 {
    match button {
        MouseButton::Left => BUTTON_LEFT,
        MouseButton::Middle => BUTTON_MIDDLE,
        MouseButton::Right => BUTTON_RIGHT,
        MouseButton::Back => BUTTON_BACK,
        MouseButton::Forward => BUTTON_FORWARD,
        MouseButton::Other(n) => BUTTON_FORWARD + 1 + n as u32,
    }
}

fn key_character(key: &Key) -> char {
    match key {
        Key::Character(text) => text.chars().next().unwrap_or('\0'),
        Key::Named(NamedKey::Space) => ' ',
        Key::Named(NamedKey::Enter) => '\r',
        Key::Named(NamedKey::Tab) => '\t',
        Key::Named(NamedKey::Backspace) => '\u{8}',
        Key::Named(NamedKey::Escape) => '\u{1b}',
        Key::Named(NamedKey::Delete) => '\u{7f}',
        _ => '\0',
    }
}

/// Printable keys use their lowercase character; the rest get fixed codes.
fn key_code(key: PhysicalKey, character: char) -> u32 {
    let PhysicalKey::Code(code) = key else {
        return character.to_ascii_lowercase() as u32;
    };
    match code {
        KeyCode::ArrowUp => KEY_ARROW_UP,
        KeyCode::ArrowDown => KEY_ARROW_DOWN,
        KeyCode::ArrowLeft => KEY_ARROW_LEFT,
        KeyCode::ArrowRight => KEY_ARROW_RIGHT,
        KeyCode::PageUp => KEY_PAGE_UP,
        KeyCode::PageDown => KEY_PAGE_DOWN,
        KeyCode::Home => KEY_HOME,
        KeyCode::End => KEY_END,
        KeyCode::Insert => KEY_INSERT,
        KeyCode::ShiftLeft | KeyCode::ShiftRight => KEY_SHIFT,
        KeyCode::ControlLeft | KeyCode::ControlRight => KEY_CTRL,
        KeyCode::AltLeft | KeyCode::AltRight => KEY_ALT,
        KeyCode::SuperLeft | KeyCode::SuperRight => KEY_COMMAND,
        KeyCode::F1 => KEY_F1,
        KeyCode::F2 => KEY_F1 + 1,
        KeyCode::F3 => KEY_F1 + 2,
        KeyCode::F4 => KEY_F1 + 3,
        KeyCode::F5 => KEY_F1 + 4,
        KeyCode::F6 => KEY_F1 + 5,
        KeyCode::F7 => KEY_F1 + 6,
        KeyCode::F8 => KEY_F1 + 7,
        KeyCode::F9 => KEY_F1 + 8,
        KeyCode::F10 => KEY_F1 + 9,
        KeyCode::F11 => KEY_F1 + 10,
        KeyCode::F12 => KEY_F1 + 11,
        _ => character.to_ascii_lowercase() as u32,
    }
}
