use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use log::trace;

use crate::error::Result;

pub type Task = Box<dyn FnOnce() -> Result<()>>;

/// Asynchronous re-invocation primitive of a host event loop.
pub trait Scheduler {
    /// Queue `task` to run after currently pending events are handled.
    fn async_exec(&self, task: Task);
}

/// Single-threaded FIFO of idle tasks.
///
/// Clones share the same queue.
#[derive(Default, Clone)]
pub struct IdleQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Run one idle period: the tasks queued before this call.
    ///
    /// Tasks queued while running wait for the next call. On the first
    /// failing task the error is returned and the rest stay queued.
    pub fn run_pending(&self) -> Result<usize> {
        let period = self.len();
        for ran in 0..period {
            let Some(task) = self.tasks.borrow_mut().pop_front() else {
                return Ok(ran);
            };
            task()?;
        }
        if period > 0 {
            trace!("idle period ran {period} task(s), {} queued", self.len());
        }
        Ok(period)
    }
}

impl Scheduler for IdleQueue {
    fn async_exec(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}
