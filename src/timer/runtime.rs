use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::{Rc, Weak},
    time::Duration,
};
use tokio::task::AbortHandle;

use super::{Callback, TimerId, TimerService};
use crate::log::trace;

/// Timers backed by tokio.
///
/// Each armed timer is a local task sleeping for the delay, so arming requires a running
/// [`LocalSet`][tokio::task::LocalSet]. Cancelling aborts the task, an aborted task is never
/// polled again and its callback is dropped without running.
#[derive(Debug, Clone, Default)]
pub struct TokioTimers {
    shared: Rc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    next_id: Cell<u64>,
    tasks: RefCell<HashMap<TimerId, AbortHandle>>,
}

impl TokioTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of armed timers.
    pub fn pending(&self) -> usize {
        self.shared.tasks.borrow().len()
    }
}

impl TimerService for TokioTimers {
    /// # Panics
    ///
    /// Panics if called outside of a `LocalSet`.
    fn arm(&self, delay: Duration, callback: Callback) -> TimerId {
        let id = TimerId::from_raw(self.shared.next_id.get());
        self.shared.next_id.set(id.into_raw() + 1);

        let shared: Weak<Shared> = Rc::downgrade(&self.shared);
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.tasks.borrow_mut().remove(&id);
            }
            trace!("timer {} fired", id.into_raw());
            callback();
        });

        // the task cannot run before this insert, `spawn_local` only schedules it
        self.shared.tasks.borrow_mut().insert(id, task.abort_handle());
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let task = self.shared.tasks.borrow_mut().remove(&id);
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}
