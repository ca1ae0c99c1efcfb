// src/core/bridge.rs

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, error, info, trace, warn};

use crate::core::graphics::api::{GraphicsApi, SurfaceAttributes, Viewport};
use crate::core::host::event::{KeyEvent, PointerEvent, SurfaceEvent};
use crate::core::host::idle::Scheduler;
use crate::core::host::widget::{Layout, Orientation, Style, Widget, WidgetId, keep_first_error};
use crate::core::input::{InputHandle, InputState};
use crate::core::render_loop::RenderLoop;
use crate::error::{AppError, ContextResultExt, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Constructed,
    Running,
    Disposed,
}

struct Inner<G: GraphicsApi> {
    composite: Widget,
    canvas: Option<Widget>,
    graphics: G,
    attrs: SurfaceAttributes,
    context: Option<G::Context>,
    render_loop: Rc<RefCell<dyn RenderLoop>>,
    input: InputHandle,
    scheduler: Rc<dyn Scheduler>,
    phase: Phase,
    initialized: bool,
    shut_down: bool,
    scroll_active: bool, // wheel seen since the previous iteration
    frame_pending: bool,
    bind_failing: bool,
    frames: u64,
}

impl<G: GraphicsApi> Inner<G> {
    fn id(&self) -> WidgetId {
        self.composite.id()
    }

    /// Create the context if needed and make it current.
    ///
    /// Failures are reported here and never returned; the caller skips its
    /// graphics work and the next iteration tries again.
    fn bind(&mut self) -> bool {
        let Some(canvas) = self.canvas.clone() else {
            return false;
        };
        if self.context.is_none() {
            match self.graphics.create_context(&canvas, &self.attrs).context_step("create context") {
                Ok(ctx) => self.context = Some(ctx),
                Err(e) => {
                    self.report(e);
                    return false;
                }
            }
        }
        let Some(ctx) = self.context.as_ref() else {
            return false;
        };
        match self.graphics.make_current(ctx).context_step("make current") {
            Ok(()) => {
                if self.bind_failing {
                    warn!("surface {}: context bound again", self.id());
                    self.bind_failing = false;
                }
                true
            }
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    /// Make the existing context current for `shutdown`. Never creates one.
    /// The surface is going away, so a refusal is expected and not reported.
    fn bind_for_shutdown(&mut self) {
        let Some(ctx) = self.context.as_ref() else {
            return;
        };
        if let Err(e) = self.graphics.make_current(ctx) {
            debug!("surface {}: shutting down without a current context: {e}", self.id());
        }
    }

    fn report(&mut self, err: AppError) {
        if self.bind_failing {
            debug!("surface {}: {err}", self.id());
        } else {
            error!("surface {}: {err}", self.id());
            self.bind_failing = true;
        }
    }
}

/// Bridge between a host widget tree and a [`RenderLoop`].
///
/// Construct it like any widget, then call [`activate`](Self::activate).
/// Once activated the widget tree keeps the bridge alive until the surface
/// is disposed; dropping this handle does not stop rendering.
pub struct SurfaceBridge<G: GraphicsApi> {
    inner: Rc<RefCell<Inner<G>>>,
}

impl<G> SurfaceBridge<G>
where
    G: GraphicsApi + 'static,
    G::Context: 'static,
{
    /// Create the embeddable composite under `parent`.
    ///
    /// Binds the render loop's input state to this bridge. Nothing is drawn
    /// before activation.
    pub fn new(
        parent: &Widget,
        style: Style,
        render_loop: Rc<RefCell<dyn RenderLoop>>,
        graphics: G,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self> {
        let composite = Widget::new(parent, style)?;
        composite.set_layout(Layout::Fill(Orientation::Horizontal))?;
        let input = render_loop.borrow().input_state().clone();
        debug!("surface {}: constructed", composite.id());

        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                composite,
                canvas: None,
                graphics,
                attrs: SurfaceAttributes::default(),
                context: None,
                render_loop,
                input,
                scheduler,
                phase: Phase::Constructed,
                initialized: false,
                shut_down: false,
                scroll_active: false,
                frame_pending: false,
                bind_failing: false,
                frames: 0,
            })),
        })
    }

    /// Pixel-format request for the drawable; only before activation.
    pub fn set_attributes(&self, attrs: SurfaceAttributes) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        if state.phase != Phase::Constructed {
            return Err(AppError::InvalidState("attributes are fixed once activated"));
        }
        state.attrs = attrs;
        Ok(())
    }

    /// Create the drawable, bind its context, run `init` and start the
    /// frame schedule.
    ///
    /// A context that cannot be created or bound yet is reported and
    /// retried by the schedule; `init` then runs before the first frame.
    pub fn activate(&self) -> Result<()> {
        let composite = {
            let state = self.inner.borrow();
            match state.phase {
                Phase::Constructed => state.composite.clone(),
                Phase::Running => return Err(AppError::InvalidState("bridge already activated")),
                Phase::Disposed => return Err(AppError::Disposed),
            }
        };

        let canvas = Widget::new(&composite, Style::NO_BACKGROUND)?;
        {
            let mut state = self.inner.borrow_mut();
            state.canvas = Some(canvas.clone());
            state.phase = Phase::Running;
        }
        info!("surface {}: activated, canvas {}", composite.id(), canvas.id());

        let inner = self.inner.clone();
        canvas.set_handler(Box::new(move |event: &SurfaceEvent| Self::handle_event(&inner, event)));

        // A failing `init` leaves the schedule stopped; a Paint retries it.
        Self::prepare(&self.inner)?;
        Self::schedule(&self.inner);
        Ok(())
    }

    pub fn composite(&self) -> Widget {
        self.inner.borrow().composite.clone()
    }

    /// The drawable surface, once activated.
    pub fn canvas(&self) -> Option<Widget> {
        self.inner.borrow().canvas.clone()
    }

    pub fn input(&self) -> InputHandle {
        self.inner.borrow().input.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().phase == Phase::Running
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().phase == Phase::Disposed
    }

    /// Frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.inner.borrow().frames
    }

    pub fn with_context<R>(&self, f: impl FnOnce(&G::Context) -> R) -> Option<R> {
        self.inner.borrow().context.as_ref().map(f)
    }

    fn handle_event(inner: &Rc<RefCell<Inner<G>>>, event: &SurfaceEvent) -> Result<()> {
        trace!("surface {}: {}", inner.borrow().id(), event.name());
        match event {
            SurfaceEvent::KeyDown(key) => translate_key(&mut inner.borrow().input.get_mut(), key, true),
            SurfaceEvent::KeyUp(key) => translate_key(&mut inner.borrow().input.get_mut(), key, false),
            SurfaceEvent::MouseMove(_) | SurfaceEvent::MouseDown(_) | SurfaceEvent::MouseUp(_) => {
                translate_pointer(&mut inner.borrow().input.get_mut(), event)
            }
            SurfaceEvent::MouseWheel { count } => {
                let mut state = inner.borrow_mut();
                let accumulate = state.scroll_active;
                translate_wheel(&mut state.input.get_mut(), *count, accumulate);
                state.scroll_active = true;
            }
            SurfaceEvent::Resize => Self::on_resize(inner),
            SurfaceEvent::Paint => Self::schedule(inner),
            SurfaceEvent::Dispose => return Self::on_dispose(inner),
        }
        Ok(())
    }

    fn on_resize(inner: &Rc<RefCell<Inner<G>>>) {
        let mut state = inner.borrow_mut();
        if state.phase != Phase::Running {
            return;
        }
        let Some(bounds) = state.canvas.as_ref().map(Widget::bounds) else {
            return;
        };
        if !state.bind() {
            return;
        }
        let viewport = Viewport {
            x: 0,
            y: 0,
            width: bounds.width,
            height: bounds.height,
        };
        debug!("surface {}: viewport {}x{}", state.id(), viewport.width, viewport.height);
        if let Err(e) = state.graphics.set_viewport(viewport).context_step("set viewport") {
            state.report(e);
        }
    }

    fn on_dispose(inner: &Rc<RefCell<Inner<G>>>) -> Result<()> {
        {
            let mut state = inner.borrow_mut();
            if state.phase == Phase::Disposed {
                return Ok(());
            }
            info!("surface {}: disposed after {} frame(s)", state.id(), state.frames);
            state.phase = Phase::Disposed;
        }
        Self::shutdown_once(inner)
    }

    /// Run `shutdown` if it is owed and release the context.
    ///
    /// When a hook of the render loop is still on the stack this does
    /// nothing; it is called again once that hook returns.
    fn shutdown_once(inner: &Rc<RefCell<Inner<G>>>) -> Result<()> {
        let render_loop = {
            let state = inner.borrow();
            if state.phase != Phase::Disposed {
                return Ok(());
            }
            state.render_loop.clone()
        };
        let Ok(mut hooks) = render_loop.try_borrow_mut() else {
            debug!("surface {}: render loop busy, shutdown deferred", inner.borrow().id());
            return Ok(());
        };

        let owed = {
            let mut state = inner.borrow_mut();
            let owed = state.initialized && !state.shut_down;
            if owed {
                state.shut_down = true;
                state.bind_for_shutdown();
                info!("surface {}: shutting down render loop", state.id());
            }
            owed
        };
        let result = if owed { hooks.shutdown() } else { Ok(()) };
        drop(hooks);

        let context = inner.borrow_mut().context.take();
        drop(context);
        result
    }

    /// Bind, creating the context and running `init` when still owed.
    /// Returns whether this iteration may draw.
    fn prepare(inner: &Rc<RefCell<Inner<G>>>) -> Result<bool> {
        let render_loop = {
            let mut state = inner.borrow_mut();
            if !state.bind() {
                return Ok(false);
            }
            if state.initialized {
                return Ok(true);
            }
            state.render_loop.clone()
        };

        let mut result = render_loop.borrow_mut().init();
        if result.is_ok() {
            let mut state = inner.borrow_mut();
            state.initialized = true;
            info!("surface {}: render loop initialized", state.id());
        }
        keep_first_error(&mut result, Self::shutdown_once(inner));
        result?;
        Ok(inner.borrow().phase == Phase::Running)
    }

    /// Queue the next iteration unless one is already queued.
    fn schedule(inner: &Rc<RefCell<Inner<G>>>) {
        let scheduler = {
            let mut state = inner.borrow_mut();
            if state.frame_pending || state.phase != Phase::Running {
                return;
            }
            state.frame_pending = true;
            state.scheduler.clone()
        };
        let weak = Rc::downgrade(inner);
        scheduler.async_exec(Box::new(move || match weak.upgrade() {
            Some(inner) => Self::iterate(&inner),
            None => Ok(()),
        }));
    }

    /// One frame iteration.
    fn iterate(inner: &Rc<RefCell<Inner<G>>>) -> Result<()> {
        {
            let mut state = inner.borrow_mut();
            state.frame_pending = false;
            let live = state.phase == Phase::Running
                && state.canvas.as_ref().is_some_and(|canvas| !canvas.is_disposed());
            if !live {
                trace!("surface {}: iteration after disposal, stopping", state.id());
                drop(state);
                return Self::shutdown_once(inner);
            }
        }

        if !Self::prepare(inner)? {
            Self::schedule(inner);
            return Ok(());
        }

        let render_loop = {
            let mut state = inner.borrow_mut();
            if state.scroll_active {
                state.scroll_active = false;
            } else {
                state.input.get_mut().set_scroll_delta(0);
            }
            state.render_loop.clone()
        };

        let mut result = render_loop.borrow_mut().frame();
        keep_first_error(&mut result, Self::shutdown_once(inner));
        result?;

        {
            let mut guard = inner.borrow_mut();
            let state = &mut *guard;
            if state.phase != Phase::Running {
                return Ok(());
            }
            if let Some(ctx) = state.context.as_ref() {
                match state.graphics.swap_buffers(ctx).context_step("swap buffers") {
                    Ok(()) => state.frames += 1,
                    Err(e) => state.report(e),
                }
            }
        }

        Self::schedule(inner);
        Ok(())
    }
}

/// Key down/up: character, key code and modifier mask entries all follow.
pub(crate) fn translate_key(input: &mut InputState, key: &KeyEvent, pressed: bool) {
    input.set_key(key.character, pressed);
    input.set_key_code(key.key_code, pressed);
    input.set_modifier(key.state_mask, pressed);
}

/// Pointer events always move the cursor; down/up also set their button.
pub(crate) fn translate_pointer(input: &mut InputState, event: &SurfaceEvent) {
    let (pointer, pressed): (&PointerEvent, Option<bool>) = match event {
        SurfaceEvent::MouseMove(p) => (p, None),
        SurfaceEvent::MouseDown(p) => (p, Some(true)),
        SurfaceEvent::MouseUp(p) => (p, Some(false)),
        _ => return,
    };
    input.set_mouse_pos(pointer.x, pointer.y);
    if let Some(pressed) = pressed {
        input.set_mouse_button(pointer.button, pressed);
    }
}

/// Wheel steps add up within one idle period; the first one replaces
/// whatever the previous frame saw.
pub(crate) fn translate_wheel(input: &mut InputState, count: i32, accumulate: bool) {
    let delta = if accumulate {
        input.scroll_delta().saturating_add(count)
    } else {
        count
    };
    input.set_scroll_delta(delta);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::event::{BUTTON_LEFT, BUTTON_RIGHT, KEY_ARROW_UP, MOD_SHIFT};

    fn key(character: char, key_code: u32, state_mask: u32) -> KeyEvent {
        KeyEvent {
            character,
            key_code,
            state_mask,
        }
    }

    #[test]
    fn key_events_update_all_three_maps() {
        let mut input = InputState::new();
        translate_key(&mut input, &key('A', 'a' as u32, MOD_SHIFT), true);
        assert!(input.key('A'));
        assert!(input.key_code('a' as u32));
        assert!(input.modifier(MOD_SHIFT));

        translate_key(&mut input, &key('A', 'a' as u32, MOD_SHIFT), false);
        assert!(!input.key('A'));
        assert!(!input.key_code('a' as u32));
        assert!(!input.modifier(MOD_SHIFT));
    }

    #[test]
    fn non_printable_key_uses_nul_character() {
        let mut input = InputState::new();
        translate_key(&mut input, &key('\0', KEY_ARROW_UP, 0), true);
        assert!(input.key_code(KEY_ARROW_UP));
        assert!(!input.key('a'));
    }

    #[test]
    fn pointer_position_follows_every_event() {
        let mut input = InputState::new();
        translate_pointer(&mut input, &SurfaceEvent::MouseMove(PointerEvent::at(10, 20)));
        translate_pointer(&mut input, &SurfaceEvent::MouseDown(PointerEvent::button(BUTTON_LEFT, 10, 20)));
        translate_pointer(&mut input, &SurfaceEvent::MouseMove(PointerEvent::at(15, 25)));

        assert_eq!((input.mouse_x(), input.mouse_y()), (15, 25));
        assert!(input.mouse_button(BUTTON_LEFT));
        assert!(!input.mouse_button(BUTTON_RIGHT));

        translate_pointer(&mut input, &SurfaceEvent::MouseUp(PointerEvent::button(BUTTON_LEFT, 3, 4)));
        assert!(!input.mouse_button(BUTTON_LEFT));
        assert_eq!((input.mouse_x(), input.mouse_y()), (3, 4));
    }

    #[test]
    fn wheel_accumulates_only_within_a_period() {
        let mut input = InputState::new();
        translate_wheel(&mut input, 3, false);
        translate_wheel(&mut input, 2, true);
        assert_eq!(input.scroll_delta(), 5);
        translate_wheel(&mut input, -1, false);
        assert_eq!(input.scroll_delta(), -1);
    }
}
