// task.rs — single-threaded completion signal for animations and panorama loads

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Default)]
struct Shared {
    outcome: Option<TaskOutcome>,
    cancel_requested: bool,
    waker: Option<Waker>,
}

/// Awaitable handle. The owner keeps a clone and resolves it exactly once; the caller may
/// poll `outcome()`, `.await` it, or ask for cancellation.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    shared: Rc<RefCell<Shared>>,
}

impl TaskHandle {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            shared: Rc::new(RefCell::new(Shared::default())),
        }
    }

    /// A handle that is already finished, for operations that apply synchronously.
    pub fn resolved(id: u64, outcome: TaskOutcome) -> Self {
        let handle = Self::new(id);
        handle.resolve(outcome);
        handle
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.shared.borrow().outcome.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.borrow().outcome.is_some()
    }

    /// Ask the owner to cancel on its next tick. No effect once finished.
    pub fn cancel(&self) {
        let mut s = self.shared.borrow_mut();
        if s.outcome.is_none() {
            s.cancel_requested = true;
        }
    }

    pub fn cancel_requested(&self) -> bool {
        self.shared.borrow().cancel_requested
    }

    /// First resolution wins. Returns whether this call resolved the handle.
    pub fn resolve(&self, outcome: TaskOutcome) -> bool {
        let waker = {
            let mut s = self.shared.borrow_mut();
            if s.outcome.is_some() {
                return false;
            }
            s.outcome = Some(outcome);
            s.waker.take()
        };
        if let Some(w) = waker {
            w.wake();
        }
        true
    }
}

impl Future for TaskHandle {
    type Output = TaskOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut s = self.shared.borrow_mut();
        match &s.outcome {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => {
                s.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
