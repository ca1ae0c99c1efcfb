use std::cell::{Cell, RefCell};
use std::rc::Rc;

use surface_bridge::core::graphics::api::{ContextError, GraphicsApi, SurfaceAttributes, Viewport};
use surface_bridge::core::graphics::backend::software::{
    self, ContextId, SoftwareContext, SoftwareGraphics, rgb,
};
use surface_bridge::core::host::event::{BUTTON_LEFT, KeyEvent, MOD_CTRL, PointerEvent, SurfaceEvent};
use surface_bridge::core::host::{IdleQueue, Layout, Orientation, Rect, Style, Widget};
use surface_bridge::{AppError, InputHandle, RenderLoop, Result, SurfaceBridge};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Init(Option<ContextId>),
    Frame {
        context: Option<ContextId>,
        scroll: i32,
        viewport: Option<Viewport>,
    },
    Shutdown(Option<ContextId>),
}

#[derive(Default)]
struct Recorder {
    input: InputHandle,
    calls: Vec<Call>,
    fail_init: u32,
    fail_frames: u32,
    dispose_in_frame: Option<Widget>,
}

impl Recorder {
    fn shared() -> Rc<RefCell<Recorder>> {
        Rc::new(RefCell::new(Recorder::default()))
    }
}

impl RenderLoop for Recorder {
    fn init(&mut self) -> Result<()> {
        if self.fail_init > 0 {
            self.fail_init -= 1;
            return Err("no shaders".into());
        }
        software::clear_color(rgb(255, 0, 0))?;
        self.calls.push(Call::Init(software::current_context()));
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        if self.fail_frames > 0 {
            self.fail_frames -= 1;
            return Err("frame failed".into());
        }
        software::clear()?;
        self.calls.push(Call::Frame {
            context: software::current_context(),
            scroll: self.input.get().scroll_delta(),
            viewport: software::viewport().ok(),
        });
        if let Some(widget) = self.dispose_in_frame.take() {
            widget.dispose()?;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.calls.push(Call::Shutdown(software::current_context()));
        Ok(())
    }

    fn input_state(&self) -> &InputHandle {
        &self.input
    }
}

/// Software graphics that can be told to fail the next N creations/binds.
#[derive(Clone, Default)]
struct Flaky {
    inner: SoftwareGraphics,
    fail_creates: Rc<Cell<u32>>,
    fail_binds: Rc<Cell<u32>>,
}

fn take(counter: &Cell<u32>) -> bool {
    let left = counter.get();
    if left > 0 {
        counter.set(left - 1);
    }
    left > 0
}

impl GraphicsApi for Flaky {
    type Context = SoftwareContext;

    fn create_context(
        &mut self,
        surface: &Widget,
        attrs: &SurfaceAttributes,
    ) -> std::result::Result<SoftwareContext, ContextError> {
        if take(&self.fail_creates) {
            return Err(ContextError::CreationFailed("no pixel format".into()));
        }
        self.inner.create_context(surface, attrs)
    }

    fn make_current(&mut self, ctx: &SoftwareContext) -> std::result::Result<(), ContextError> {
        if take(&self.fail_binds) {
            return Err(ContextError::Lost("driver reset".into()));
        }
        self.inner.make_current(ctx)
    }

    fn swap_buffers(&mut self, ctx: &SoftwareContext) -> std::result::Result<(), ContextError> {
        self.inner.swap_buffers(ctx)
    }

    fn set_viewport(&mut self, viewport: Viewport) -> std::result::Result<(), ContextError> {
        self.inner.set_viewport(viewport)
    }
}

fn setup() -> (Widget, IdleQueue) {
    let _ = env_logger::builder().is_test(true).try_init();
    let root = Widget::root(
        Rect::new(0, 0, 200, 100),
        Style::empty(),
        Layout::Fill(Orientation::Horizontal),
    );
    (root, IdleQueue::new())
}

fn bridge<G>(root: &Widget, idle: &IdleQueue, recorder: &Rc<RefCell<Recorder>>, graphics: G) -> SurfaceBridge<G>
where
    G: GraphicsApi + 'static,
    G::Context: 'static,
{
    SurfaceBridge::new(root, Style::empty(), recorder.clone(), graphics, Rc::new(idle.clone())).unwrap()
}

fn frames(recorder: &Rc<RefCell<Recorder>>) -> Vec<Call> {
    recorder
        .borrow()
        .calls
        .iter()
        .filter(|c| matches!(c, Call::Frame { .. }))
        .cloned()
        .collect()
}

fn count(recorder: &Rc<RefCell<Recorder>>, wanted: fn(&Call) -> bool) -> usize {
    recorder.borrow().calls.iter().filter(|c| wanted(c)).count()
}

fn scrolls(recorder: &Rc<RefCell<Recorder>>) -> Vec<i32> {
    frames(recorder)
        .into_iter()
        .map(|c| match c {
            Call::Frame { scroll, .. } => scroll,
            _ => unreachable!(),
        })
        .collect()
}

#[test]
fn nothing_renders_before_activation() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);

    assert!(surface.canvas().is_none());
    assert!(!surface.is_running());
    assert!(idle.is_empty());
    assert!(recorder.borrow().calls.is_empty());

    root.dispose().unwrap();
    assert!(recorder.borrow().calls.is_empty());
}

#[test]
fn init_runs_once_before_first_frame_with_context_bound() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();

    let context = surface.with_context(SoftwareContext::id);
    assert!(context.is_some());
    assert_eq!(recorder.borrow().calls, vec![Call::Init(context)]);
    assert_eq!(idle.len(), 1);

    for _ in 0..3 {
        assert_eq!(idle.run_pending().unwrap(), 1);
    }
    let calls = recorder.borrow().calls.clone();
    assert_eq!(calls.len(), 4);
    assert!(matches!(calls[0], Call::Init(_)));
    assert!(calls[1..].iter().all(|c| matches!(c, Call::Frame { context: ctx, .. } if *ctx == context)));
    assert_eq!(surface.frame_count(), 3);
}

#[test]
fn frames_are_presented() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();
    idle.run_pending().unwrap();

    let presented = surface
        .with_context(|ctx| ctx.read_front(|pixels, w, h| (w, h, pixels.iter().all(|&p| p == 0xff0000))))
        .unwrap();
    assert_eq!(presented, (200, 100, true));
}

#[test]
fn activation_is_one_shot() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();

    assert!(matches!(surface.activate(), Err(AppError::InvalidState(_))));
    assert!(surface.set_attributes(SurfaceAttributes { double_buffer: false }).is_err());
    assert_eq!(count(&recorder, |c| matches!(c, Call::Init(_))), 1);

    surface.composite().dispose().unwrap();
    assert!(matches!(surface.activate(), Err(AppError::Disposed)));
}

#[test]
fn single_buffered_surface_shows_drawing_immediately() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.set_attributes(SurfaceAttributes { double_buffer: false }).unwrap();
    surface.activate().unwrap();
    idle.run_pending().unwrap();

    let red = surface
        .with_context(|ctx| ctx.read_front(|pixels, _, _| pixels.iter().all(|&p| p == 0xff0000)))
        .unwrap();
    assert!(red);
}

#[test]
fn wheel_delta_lasts_one_iteration() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();
    let canvas = surface.canvas().unwrap();

    idle.run_pending().unwrap();
    canvas.dispatch(&SurfaceEvent::MouseWheel { count: 3 }).unwrap();
    idle.run_pending().unwrap();
    idle.run_pending().unwrap();
    assert_eq!(scrolls(&recorder), vec![0, 3, 0]);
}

#[test]
fn wheel_steps_in_one_idle_period_add_up() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();
    let canvas = surface.canvas().unwrap();

    canvas.dispatch(&SurfaceEvent::MouseWheel { count: 3 }).unwrap();
    canvas.dispatch(&SurfaceEvent::MouseWheel { count: 2 }).unwrap();
    idle.run_pending().unwrap();
    canvas.dispatch(&SurfaceEvent::MouseWheel { count: -1 }).unwrap();
    idle.run_pending().unwrap();
    idle.run_pending().unwrap();
    assert_eq!(scrolls(&recorder), vec![5, -1, 0]);
}

#[test]
fn pointer_and_key_events_reach_the_input_state() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();
    let canvas = surface.canvas().unwrap();

    canvas.dispatch(&SurfaceEvent::MouseMove(PointerEvent::at(10, 20))).unwrap();
    canvas.dispatch(&SurfaceEvent::MouseDown(PointerEvent::button(BUTTON_LEFT, 10, 20))).unwrap();
    canvas.dispatch(&SurfaceEvent::MouseMove(PointerEvent::at(15, 25))).unwrap();
    let key = KeyEvent {
        character: 'x',
        key_code: 'x' as u32,
        state_mask: MOD_CTRL,
    };
    canvas.dispatch(&SurfaceEvent::KeyDown(key)).unwrap();

    let input = surface.input();
    assert!(input.get().mouse_button(BUTTON_LEFT));
    assert_eq!((input.get().mouse_x(), input.get().mouse_y()), (15, 25));
    assert!(input.get().key('x'));
    assert!(input.get().modifier(MOD_CTRL));

    canvas.dispatch(&SurfaceEvent::KeyUp(key)).unwrap();
    assert!(!input.get().key('x'));
    assert!(!input.get().key_code('x' as u32));

    // The render loop reads the very same state.
    assert!(!recorder.borrow().input.get().key('x'));
    assert!(recorder.borrow().input.get().mouse_button(BUTTON_LEFT));
}

#[test]
fn dispose_between_iterations_shuts_down_once() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();
    idle.run_pending().unwrap();
    assert_eq!(idle.len(), 1);
    let context = surface.with_context(SoftwareContext::id);

    surface.composite().dispose().unwrap();
    assert!(surface.is_disposed());
    assert_eq!(count(&recorder, |c| matches!(c, Call::Shutdown(_))), 1);

    // The queued iteration sees the disposal and stops.
    idle.run_pending().unwrap();
    assert!(idle.is_empty());
    root.dispose().unwrap();

    let calls = recorder.borrow().calls.clone();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls.last(), Some(&Call::Shutdown(context)));
    assert!(surface.with_context(|_| ()).is_none());
}

#[test]
fn dispose_from_inside_frame_shuts_down_after_it() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();
    let context = surface.with_context(SoftwareContext::id);
    recorder.borrow_mut().dispose_in_frame = Some(surface.composite());

    idle.run_pending().unwrap();
    idle.run_pending().unwrap();

    let calls = recorder.borrow().calls.clone();
    assert!(matches!(calls.as_slice(), [Call::Init(_), Call::Frame { .. }, Call::Shutdown(_)]));
    assert_eq!(calls[2], Call::Shutdown(context));
    assert!(idle.is_empty());
    assert_eq!(surface.frame_count(), 0);
}

#[test]
fn deferred_shutdown_binds_its_own_context_after_a_sibling_is_released() {
    let (root, idle) = setup();
    let (first, second) = (Recorder::shared(), Recorder::shared());
    let a = bridge(&root, &idle, &first, SoftwareGraphics);
    let b = bridge(&root, &idle, &second, SoftwareGraphics);
    a.activate().unwrap();
    b.activate().unwrap();
    let (ctx_a, ctx_b) = (a.with_context(SoftwareContext::id), b.with_context(SoftwareContext::id));
    assert_ne!(ctx_a, ctx_b);

    // Tearing the whole tree down from inside a's frame shuts b down first,
    // releasing b's context and leaving nothing bound.
    first.borrow_mut().dispose_in_frame = Some(root.clone());
    idle.run_pending().unwrap();

    let shutdowns = |recorder: &Rc<RefCell<Recorder>>| -> Vec<Call> {
        recorder
            .borrow()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Shutdown(_)))
            .cloned()
            .collect()
    };
    assert_eq!(shutdowns(&first), vec![Call::Shutdown(ctx_a)]);
    assert_eq!(shutdowns(&second), vec![Call::Shutdown(ctx_b)]);
    assert!(frames(&second).is_empty());
    assert!(idle.is_empty());
    assert!(a.with_context(|_| ()).is_none());
    assert!(b.with_context(|_| ()).is_none());
}

#[test]
fn widget_tree_keeps_an_activated_bridge_alive() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    bridge(&root, &idle, &recorder, SoftwareGraphics).activate().unwrap();

    idle.run_pending().unwrap();
    idle.run_pending().unwrap();
    assert_eq!(frames(&recorder).len(), 2);

    root.dispose().unwrap();
    idle.run_pending().unwrap();
    assert_eq!(count(&recorder, |c| matches!(c, Call::Shutdown(_))), 1);
    assert!(idle.is_empty());
}

#[test]
fn interleaved_bridges_each_draw_into_their_own_context() {
    let (root, idle) = setup();
    let (first, second) = (Recorder::shared(), Recorder::shared());
    let a = bridge(&root, &idle, &first, SoftwareGraphics);
    let b = bridge(&root, &idle, &second, SoftwareGraphics);
    a.activate().unwrap();
    b.activate().unwrap();

    let ctx_a = a.with_context(SoftwareContext::id).unwrap();
    let ctx_b = b.with_context(SoftwareContext::id).unwrap();
    assert_ne!(ctx_a, ctx_b);

    for _ in 0..5 {
        assert_eq!(idle.run_pending().unwrap(), 2);
    }
    for (recorder, ctx) in [(&first, ctx_a), (&second, ctx_b)] {
        let calls = recorder.borrow().calls.clone();
        assert_eq!(calls[0], Call::Init(Some(ctx)));
        let seen = frames(recorder);
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|c| matches!(c, Call::Frame { context, .. } if *context == Some(ctx))));
    }

    // Disposing one leaves the other running.
    a.composite().dispose().unwrap();
    idle.run_pending().unwrap();
    idle.run_pending().unwrap();
    assert_eq!(frames(&first).len(), 5);
    assert_eq!(frames(&second).len(), 7);
}

#[test]
fn resize_updates_viewport_without_breaking_schedule() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();
    idle.run_pending().unwrap();

    root.set_bounds(Rect::new(0, 0, 320, 120)).unwrap();
    assert_eq!(idle.len(), 1);
    idle.run_pending().unwrap();

    let seen = frames(&recorder);
    let viewports: Vec<Option<Viewport>> = seen
        .iter()
        .map(|c| match c {
            Call::Frame { viewport, .. } => *viewport,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(
        viewports,
        vec![
            Some(Viewport { x: 0, y: 0, width: 200, height: 100 }),
            Some(Viewport { x: 0, y: 0, width: 320, height: 120 }),
        ]
    );
    assert_eq!(surface.with_context(SoftwareContext::size), Some((320, 120)));
    assert_eq!(surface.frame_count(), 2);
}

#[test]
fn paint_never_starts_a_second_schedule() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();
    let canvas = surface.canvas().unwrap();

    canvas.dispatch(&SurfaceEvent::Paint).unwrap();
    canvas.dispatch(&SurfaceEvent::Paint).unwrap();
    assert_eq!(idle.len(), 1);
    idle.run_pending().unwrap();
    assert_eq!(idle.len(), 1);
}

#[test]
fn renderer_error_propagates_and_paint_restarts() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    recorder.borrow_mut().fail_frames = 1;
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);
    surface.activate().unwrap();

    assert!(matches!(idle.run_pending(), Err(AppError::Renderer(_))));
    assert!(idle.is_empty());
    assert!(surface.is_running());

    surface.canvas().unwrap().dispatch(&SurfaceEvent::Paint).unwrap();
    idle.run_pending().unwrap();
    assert_eq!(frames(&recorder).len(), 1);
    assert_eq!(idle.len(), 1);
}

#[test]
fn failed_init_is_reported_and_retried_on_paint() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    recorder.borrow_mut().fail_init = 1;
    let surface = bridge(&root, &idle, &recorder, SoftwareGraphics);

    assert!(matches!(surface.activate(), Err(AppError::Renderer(_))));
    assert!(idle.is_empty());

    surface.canvas().unwrap().dispatch(&SurfaceEvent::Paint).unwrap();
    idle.run_pending().unwrap();
    let calls = recorder.borrow().calls.clone();
    assert!(matches!(calls.as_slice(), [Call::Init(Some(_)), Call::Frame { .. }]));

    // Shutdown is owed once, for the init that succeeded.
    root.dispose().unwrap();
    assert_eq!(count(&recorder, |c| matches!(c, Call::Shutdown(_))), 1);
}

#[test]
fn bind_failures_skip_frames_but_keep_the_schedule() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let graphics = Flaky::default();
    graphics.fail_binds.set(2);
    let surface = bridge(&root, &idle, &recorder, graphics.clone());

    surface.activate().unwrap();
    assert!(recorder.borrow().calls.is_empty());
    idle.run_pending().unwrap();
    assert!(recorder.borrow().calls.is_empty());
    assert_eq!(idle.len(), 1);

    idle.run_pending().unwrap();
    idle.run_pending().unwrap();
    let calls = recorder.borrow().calls.clone();
    let ctx = surface.with_context(SoftwareContext::id);
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], Call::Init(ctx));
    assert_eq!(surface.frame_count(), 2);
}

#[test]
fn context_creation_failure_is_retried() {
    let (root, idle) = setup();
    let recorder = Recorder::shared();
    let graphics = Flaky::default();
    graphics.fail_creates.set(1);
    let surface = bridge(&root, &idle, &recorder, graphics);

    surface.activate().unwrap();
    assert!(surface.with_context(|_| ()).is_none());
    idle.run_pending().unwrap();

    assert!(surface.with_context(|_| ()).is_some());
    assert_eq!(count(&recorder, |c| matches!(c, Call::Init(_))), 1);
    assert_eq!(frames(&recorder).len(), 1);
}

#[test]
fn binding_failure_in_one_surface_leaves_others_alone() {
    let (root, idle) = setup();
    let (first, second) = (Recorder::shared(), Recorder::shared());
    let flaky = Flaky::default();
    let a = bridge(&root, &idle, &first, flaky.clone());
    let b = bridge(&root, &idle, &second, SoftwareGraphics);
    a.activate().unwrap();
    b.activate().unwrap();

    flaky.fail_binds.set(3);
    for _ in 0..3 {
        idle.run_pending().unwrap();
    }
    assert_eq!(frames(&first).len(), 0);
    assert_eq!(frames(&second).len(), 3);

    idle.run_pending().unwrap();
    assert_eq!(frames(&first).len(), 1);
    assert!(a.is_running());
}
