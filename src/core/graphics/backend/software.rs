use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::core::graphics::api::{ContextError, GraphicsApi, SurfaceAttributes, Viewport};
use crate::core::host::widget::Widget;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

pub type ContextId = u64;

thread_local! {
    // The one binding point every software context on this thread competes for.
    static CURRENT: RefCell<Option<Rc<RefCell<ContextState>>>> = const { RefCell::new(None) };
}

/// Pack an opaque `0x00RRGGBB` pixel.
pub const fn rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

struct ContextState {
    id: ContextId,
    surface: Widget,
    double_buffer: bool,
    width: usize,
    height: usize,
    back: Vec<u32>,  // draw target when double buffered
    front: Vec<u32>, // what the host shows
    viewport: Viewport,
    clear_color: u32,
}

impl ContextState {
    fn target(&mut self) -> &mut [u32] {
        if self.double_buffer {
            &mut self.back
        } else {
            &mut self.front
        }
    }

    /// Follow the surface size; pixel contents are undefined afterwards.
    fn sync_size(&mut self) {
        let area = self.surface.client_area();
        let (width, height) = (area.width.max(0) as usize, area.height.max(0) as usize);
        if (width, height) == (self.width, self.height) {
            return;
        }
        debug!("context {}: storage {}x{} -> {width}x{height}", self.id, self.width, self.height);
        self.width = width;
        self.height = height;
        self.front = vec![0; width * height];
        self.back = if self.double_buffer {
            vec![0; width * height]
        } else {
            Vec::new()
        };
    }
}

/// Software context bound to one surface widget.
pub struct SoftwareContext {
    state: Rc<RefCell<ContextState>>,
}

impl SoftwareContext {
    pub fn id(&self) -> ContextId {
        self.state.borrow().id
    }

    pub fn size(&self) -> (usize, usize) {
        let state = self.state.borrow();
        (state.width, state.height)
    }

    /// Read the presented pixels as `(pixels, width, height)`.
    pub fn read_front<R>(&self, f: impl FnOnce(&[u32], usize, usize) -> R) -> R {
        let state = self.state.borrow();
        f(&state.front, state.width, state.height)
    }
}

impl Drop for SoftwareContext {
    fn drop(&mut self) {
        // Destroying the current context leaves nothing bound.
        let _ = CURRENT.try_with(|current| {
            let mut current = current.borrow_mut();
            if current.as_ref().is_some_and(|bound| Rc::ptr_eq(bound, &self.state)) {
                *current = None;
            }
        });
    }
}

/// CPU rasteriser. Drawing calls act on whichever context is current on
/// this thread, like immediate GL calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareGraphics;

impl GraphicsApi for SoftwareGraphics {
    type Context = SoftwareContext;

    fn create_context(
        &mut self,
        surface: &Widget,
        attrs: &SurfaceAttributes,
    ) -> Result<SoftwareContext, ContextError> {
        if surface.is_disposed() {
            return Err(ContextError::SurfaceDisposed);
        }
        let mut state = ContextState {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            surface: surface.clone(),
            double_buffer: attrs.double_buffer,
            width: 0,
            height: 0,
            back: Vec::new(),
            front: Vec::new(),
            viewport: Viewport::default(),
            clear_color: 0,
        };
        state.sync_size();
        state.viewport = Viewport {
            x: 0,
            y: 0,
            width: state.width as i32,
            height: state.height as i32,
        };
        debug!("context {} created for widget {}", state.id, surface.id());
        Ok(SoftwareContext {
            state: Rc::new(RefCell::new(state)),
        })
    }

    // A context stays bindable until it is dropped, even once its surface
    // is disposed; only presenting needs a live surface.
    fn make_current(&mut self, ctx: &SoftwareContext) -> Result<(), ContextError> {
        {
            let mut state = ctx.state.borrow_mut();
            if !state.surface.is_disposed() {
                state.sync_size();
            }
        }
        CURRENT.with(|current| *current.borrow_mut() = Some(ctx.state.clone()));
        Ok(())
    }

    fn swap_buffers(&mut self, ctx: &SoftwareContext) -> Result<(), ContextError> {
        let mut state = ctx.state.borrow_mut();
        if state.surface.is_disposed() {
            return Err(ContextError::SurfaceDisposed);
        }
        if state.double_buffer {
            let state = &mut *state;
            std::mem::swap(&mut state.back, &mut state.front);
        }
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<(), ContextError> {
        with_current(|state| state.viewport = viewport)
    }
}

fn with_current<R>(f: impl FnOnce(&mut ContextState) -> R) -> Result<R, ContextError> {
    CURRENT.with(|current| {
        let current = current.borrow();
        let bound = current.as_ref().ok_or(ContextError::NotCurrent)?;
        let mut state = bound.borrow_mut();
        Ok(f(&mut state))
    })
}

/// Id of the context bound to this thread, if any.
pub fn current_context() -> Option<ContextId> {
    CURRENT.with(|current| current.borrow().as_ref().map(|bound| bound.borrow().id))
}

pub fn viewport() -> Result<Viewport, ContextError> {
    with_current(|state| state.viewport)
}

pub fn clear_color(color: u32) -> Result<(), ContextError> {
    with_current(|state| state.clear_color = color)
}

/// Fill the whole draw buffer with the clear colour.
pub fn clear() -> Result<(), ContextError> {
    with_current(|state| {
        let color = state.clear_color;
        state.target().fill(color);
    })
}

/// Fill a viewport-relative rectangle, clipped to the viewport.
pub fn fill_rect(x: i32, y: i32, width: i32, height: i32, color: u32) -> Result<(), ContextError> {
    with_current(|state| {
        let vp = state.viewport;
        let x0 = (vp.x + x.max(0)).max(0);
        let y0 = (vp.y + y.max(0)).max(0);
        let x1 = (vp.x + (x + width).min(vp.width)).min(state.width as i32);
        let y1 = (vp.y + (y + height).min(vp.height)).min(state.height as i32);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let stride = state.width;
        let target = state.target();
        for row in y0 as usize..y1 as usize {
            target[row * stride + x0 as usize..row * stride + x1 as usize].fill(color);
        }
    })
}
