//! Single threaded one shot timers.
//!
//! A [`TimerService`] arms a callback to run once after a delay and can cancel it before it
//! runs. Callbacks run one at a time on the thread that armed them, never concurrently.
//!
//! - [`ManualTimers`] is driven by hand over a virtual clock
//! - [`TokioTimers`] spawns on the current tokio `LocalSet`
use std::{rc::Rc, time::Duration};

mod manual;
mod runtime;

pub use manual::ManualTimers;
pub use runtime::TokioTimers;

/// Callback invoked when a timer fires.
pub type Callback = Box<dyn FnOnce() + 'static>;

/// Identity of one armed timer.
///
/// An id is never reused by the service that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    #[inline]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

/// Host timer scheduler.
pub trait TimerService {
    /// Arm `callback` to run once after `delay`.
    fn arm(&self, delay: Duration, callback: Callback) -> TimerId;

    /// Cancel an armed timer, returns `false` if it already fired or was cancelled.
    ///
    /// After this returns, the callback of `id` is dropped without running.
    fn cancel(&self, id: TimerId) -> bool;
}

impl<T: TimerService + ?Sized> TimerService for Rc<T> {
    #[inline]
    fn arm(&self, delay: Duration, callback: Callback) -> TimerId {
        T::arm(self, delay, callback)
    }

    #[inline]
    fn cancel(&self, id: TimerId) -> bool {
        T::cancel(self, id)
    }
}
