// src/core/host/widget.rs

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use log::debug;
use smallvec::SmallVec;

use crate::core::host::event::SurfaceEvent;
use crate::error::{AppError, Result};

static NEXT_WIDGET_ID: AtomicU64 = AtomicU64::new(1);

pub type WidgetId = u64;

pub type EventHandler = Box<dyn FnMut(&SurfaceEvent) -> Result<()>>;

/// Rectangle in window coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    pub fn inset(&self, by: i32) -> Rect {
        Rect {
            x: self.x + by,
            y: self.y + by,
            width: (self.width - 2 * by).max(0),
            height: (self.height - 2 * by).max(0),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Style: u32 {
        /// One pixel border around the client area.
        const BORDER        = 1 << 0;
        /// The host does not erase behind this widget; its content covers it.
        const NO_BACKGROUND = 1 << 1;
        /// Never receives keyboard focus.
        const NO_FOCUS      = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    /// Children keep whatever bounds they are given.
    #[default]
    None,
    /// Children share the client area evenly.
    Fill(Orientation),
}

struct Node {
    id: WidgetId,
    style: Style,
    layout: Cell<Layout>,
    bounds: Cell<Rect>,
    disposing: Cell<bool>,
    disposed: Cell<bool>,
    parent: Weak<Node>,
    children: RefCell<SmallVec<[Widget; 4]>>,
    handler: RefCell<Option<EventHandler>>,
    dispatching: Cell<bool>,
    deferred: RefCell<VecDeque<SurfaceEvent>>,
}

/// Shared handle to a widget node.
#[derive(Clone)]
pub struct Widget(Rc<Node>);

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("id", &self.0.id)
            .field("style", &self.0.style)
            .field("bounds", &self.0.bounds.get())
            .field("disposed", &self.0.disposed.get())
            .finish()
    }
}

impl PartialEq for Widget {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Widget {}

impl Widget {
    fn with_parent(parent: Weak<Node>, style: Style, layout: Layout, bounds: Rect) -> Self {
        Self(Rc::new(Node {
            id: NEXT_WIDGET_ID.fetch_add(1, Ordering::Relaxed),
            style,
            layout: Cell::new(layout),
            bounds: Cell::new(bounds),
            disposing: Cell::new(false),
            disposed: Cell::new(false),
            parent,
            children: RefCell::new(SmallVec::new()),
            handler: RefCell::new(None),
            dispatching: Cell::new(false),
            deferred: RefCell::new(VecDeque::new()),
        }))
    }

    /// Top-level widget, typically backing a native window.
    pub fn root(bounds: Rect, style: Style, layout: Layout) -> Self {
        Self::with_parent(Weak::new(), style, layout, bounds)
    }

    /// Create a child of `parent` and re-lay-out the parent.
    pub fn new(parent: &Widget, style: Style) -> Result<Self> {
        if parent.is_disposed() {
            return Err(AppError::Disposed);
        }
        let child = Self::with_parent(Rc::downgrade(&parent.0), style, Layout::None, Rect::default());
        parent.0.children.borrow_mut().push(child.clone());
        parent.layout()?;
        Ok(child)
    }

    pub fn id(&self) -> WidgetId {
        self.0.id
    }

    pub fn style(&self) -> Style {
        self.0.style
    }

    pub fn bounds(&self) -> Rect {
        self.0.bounds.get()
    }

    /// Bounds minus the border, if any.
    pub fn client_area(&self) -> Rect {
        let bounds = self.bounds();
        if self.0.style.contains(Style::BORDER) {
            bounds.inset(1)
        } else {
            bounds
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    pub fn accepts_focus(&self) -> bool {
        !self.is_disposed() && !self.0.style.contains(Style::NO_FOCUS)
    }

    pub fn parent(&self) -> Option<Widget> {
        self.0.parent.upgrade().map(Widget)
    }

    pub fn children(&self) -> Vec<Widget> {
        self.0.children.borrow().to_vec()
    }

    /// Install the single event handler, replacing any previous one.
    pub fn set_handler(&self, handler: EventHandler) {
        *self.0.handler.borrow_mut() = Some(handler);
    }

    pub fn set_layout(&self, layout: Layout) -> Result<()> {
        self.0.layout.set(layout);
        self.layout()
    }

    /// Move or resize. Fires `Resize` when the size changed and lays out
    /// the children again.
    pub fn set_bounds(&self, bounds: Rect) -> Result<()> {
        if self.is_disposed() {
            return Err(AppError::Disposed);
        }
        let old = self.0.bounds.replace(bounds);
        let mut result = Ok(());
        if (old.width, old.height) != (bounds.width, bounds.height) {
            result = self.dispatch(&SurfaceEvent::Resize);
        }
        keep_first_error(&mut result, self.layout());
        result
    }

    /// Apply the layout to the children.
    pub fn layout(&self) -> Result<()> {
        let Layout::Fill(orientation) = self.0.layout.get() else {
            return Ok(());
        };
        let children: SmallVec<[Widget; 4]> = self.0.children.borrow().clone();
        if children.is_empty() {
            return Ok(());
        }

        let area = self.client_area();
        let count = children.len() as i32;
        let mut result = Ok(());
        for (index, child) in children.iter().enumerate() {
            let index = index as i32;
            let last = index == count - 1;
            let rect = match orientation {
                Orientation::Horizontal => {
                    let step = area.width / count;
                    let width = if last { area.width - step * index } else { step };
                    Rect::new(area.x + step * index, area.y, width, area.height)
                }
                Orientation::Vertical => {
                    let step = area.height / count;
                    let height = if last { area.height - step * index } else { step };
                    Rect::new(area.x, area.y + step * index, area.width, height)
                }
            };
            keep_first_error(&mut result, child.set_bounds(rect));
        }
        result
    }

    /// Deliver `event` to the handler.
    ///
    /// Events raised while the handler is already running for this widget
    /// are queued and delivered once it returns. Disposed widgets only
    /// ever see their `Dispose` event.
    pub fn dispatch(&self, event: &SurfaceEvent) -> Result<()> {
        if self.is_disposed() && *event != SurfaceEvent::Dispose {
            return Ok(());
        }
        if self.0.dispatching.get() {
            debug!("widget {}: deferring re-entrant {}", self.0.id, event.name());
            self.0.deferred.borrow_mut().push_back(*event);
            return Ok(());
        }
        let Some(mut handler) = self.0.handler.borrow_mut().take() else {
            return Ok(());
        };

        self.0.dispatching.set(true);
        let mut result = handler(event);
        loop {
            let Some(next) = self.0.deferred.borrow_mut().pop_front() else {
                break;
            };
            if self.is_disposed() && next != SurfaceEvent::Dispose {
                continue;
            }
            keep_first_error(&mut result, handler(&next));
        }
        self.0.dispatching.set(false);

        // Disposed widgets drop their handler, and with it whatever it owns.
        if !self.is_disposed() {
            let mut slot = self.0.handler.borrow_mut();
            if slot.is_none() {
                *slot = Some(handler);
            }
        }
        result
    }

    /// Dispose children first, then this widget. Idempotent.
    ///
    /// The `Dispose` event is delivered while the widget is still usable,
    /// so handlers can release resources tied to it. Teardown always
    /// completes; the first handler error is returned.
    pub fn dispose(&self) -> Result<()> {
        if self.is_disposed() || self.0.disposing.replace(true) {
            return Ok(());
        }
        let children: SmallVec<[Widget; 4]> = self.0.children.borrow().clone();
        let mut result = Ok(());
        for child in &children {
            keep_first_error(&mut result, child.dispose());
        }

        keep_first_error(&mut result, self.dispatch(&SurfaceEvent::Dispose));
        self.0.disposed.set(true);
        debug!("widget {} disposed", self.0.id);

        // Dropping the handler releases whatever it captured.
        let handler = self.0.handler.borrow_mut().take();
        drop(handler);

        if let Some(parent) = self.0.parent.upgrade() {
            parent.children.borrow_mut().retain(|c| !Rc::ptr_eq(&c.0, &self.0));
        }
        result
    }

    /// Deepest live widget containing the point.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<Widget> {
        if self.is_disposed() || !self.bounds().contains(x, y) {
            return None;
        }
        let children: SmallVec<[Widget; 4]> = self.0.children.borrow().clone();
        children
            .iter()
            .find_map(|child| child.hit_test(x, y))
            .or_else(|| Some(self.clone()))
    }
}

pub(crate) fn keep_first_error(result: &mut Result<()>, next: Result<()>) {
    if result.is_ok() {
        *result = next;
    }
}
