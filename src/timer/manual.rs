use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use super::{Callback, TimerId, TimerService};
use crate::log::trace;

/// Timers over a virtual clock.
///
/// Nothing fires until [`advance`][ManualTimers::advance] or
/// [`fire_next`][ManualTimers::fire_next] is called. Timers with the same deadline fire in the
/// order they were armed.
#[derive(Default)]
pub struct ManualTimers {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    cancels: Cell<usize>,
    queue: RefCell<Queue>,
}

#[derive(Default)]
struct Queue {
    deadlines: BTreeMap<(Duration, TimerId), Callback>,
    armed: HashMap<TimerId, Duration>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the virtual time elapsed since creation.
    #[inline]
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Returns the number of armed timers.
    pub fn pending(&self) -> usize {
        self.queue.borrow().armed.len()
    }

    /// Returns `true` if `id` is armed.
    pub fn is_armed(&self, id: TimerId) -> bool {
        self.queue.borrow().armed.contains_key(&id)
    }

    /// Returns the deadline of the earliest armed timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.borrow().deadlines.first_key_value().map(|((at, _), _)| *at)
    }

    /// Returns how many times [`cancel`][TimerService::cancel] was called, whether or not the
    /// timer was still armed.
    #[inline]
    pub fn cancel_count(&self) -> usize {
        self.cancels.get()
    }

    /// Move the clock forward by `by`, firing every timer due on the way.
    ///
    /// Timers armed by a callback fire in the same call if they fall due before the new time.
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let until = self.now.get() + by;
        let mut fired = 0;

        while let Some((at, callback)) = self.pop_due(Some(until)) {
            self.now.set(at);
            callback();
            fired += 1;
        }

        self.now.set(until);
        fired
    }

    /// Jump to the earliest deadline and fire that timer, returns `false` if none is armed.
    pub fn fire_next(&self) -> bool {
        match self.pop_due(None) {
            Some((at, callback)) => {
                self.now.set(self.now.get().max(at));
                callback();
                true
            }
            None => false,
        }
    }

    /// Fire timers until none is armed, returns the number of callbacks run.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        while self.fire_next() {
            fired += 1;
        }
        fired
    }

    // the queue borrow is released before the callback runs, so callbacks may arm or cancel
    fn pop_due(&self, until: Option<Duration>) -> Option<(Duration, Callback)> {
        let mut queue = self.queue.borrow_mut();
        let (&(at, id), _) = queue.deadlines.first_key_value()?;
        if until.is_some_and(|until| at > until) {
            return None;
        }
        let ((at, id), callback) = queue.deadlines.remove_entry(&(at, id))?;
        queue.armed.remove(&id);
        trace!("timer {} fired at {at:?}", id.into_raw());
        Some((at, callback))
    }
}

impl TimerService for ManualTimers {
    fn arm(&self, delay: Duration, callback: Callback) -> TimerId {
        let id = TimerId::from_raw(self.next_id.get());
        self.next_id.set(id.into_raw() + 1);

        let at = self.now.get() + delay;
        let mut queue = self.queue.borrow_mut();
        queue.deadlines.insert((at, id), callback);
        queue.armed.insert(id, at);
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.cancels.set(self.cancels.get() + 1);

        let mut queue = self.queue.borrow_mut();
        let Some(at) = queue.armed.remove(&id) else {
            return false;
        };
        // dropped outside the borrow, a callback may own something that touches the queue on drop
        let callback = queue.deadlines.remove(&(at, id));
        drop(queue);
        drop(callback);
        true
    }
}

impl std::fmt::Debug for ManualTimers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTimers")
            .field("now", &self.now.get())
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = Rc::clone(&log);
        (log, move |name| {
            let log = Rc::clone(&log2);
            Box::new(move || log.borrow_mut().push(name))
        })
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let timers = ManualTimers::new();
        let (log, cb) = recorder();

        timers.arm(Duration::from_millis(300), cb("c"));
        timers.arm(Duration::from_millis(100), cb("a"));
        timers.arm(Duration::from_millis(100), cb("b"));
        assert_eq!(timers.pending(), 3);
        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(100)));

        assert_eq!(timers.advance(Duration::from_millis(150)), 2);
        assert_eq!(*log.borrow(), ["a", "b"]);
        assert_eq!(timers.now(), Duration::from_millis(150));

        assert_eq!(timers.advance(Duration::from_millis(150)), 1);
        assert_eq!(*log.borrow(), ["a", "b", "c"]);
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn test_cancel() {
        let timers = ManualTimers::new();
        let (log, cb) = recorder();

        let id = timers.arm(Duration::from_millis(10), cb("a"));
        assert!(timers.is_armed(id));
        assert!(timers.cancel(id));
        assert!(!timers.is_armed(id));
        assert!(!timers.cancel(id));
        assert_eq!(timers.cancel_count(), 2);

        assert!(!timers.fire_next());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_callback_rearms() {
        let timers = Rc::new(ManualTimers::new());
        let count = Rc::new(Cell::new(0));

        fn tick(timers: Rc<ManualTimers>, count: Rc<Cell<u32>>) {
            count.set(count.get() + 1);
            if count.get() < 3 {
                let t = Rc::clone(&timers);
                timers.arm(Duration::from_secs(1), Box::new(move || tick(t, count)));
            }
        }

        let (t, c) = (Rc::clone(&timers), Rc::clone(&count));
        timers.arm(Duration::from_secs(1), Box::new(move || tick(t, c)));

        assert_eq!(timers.advance(Duration::from_secs(10)), 3);
        assert_eq!(count.get(), 3);
        assert_eq!(timers.now(), Duration::from_secs(10));
    }

    #[test]
    fn test_run_until_idle() {
        let timers = ManualTimers::new();
        let (log, cb) = recorder();

        timers.arm(Duration::from_secs(5), cb("b"));
        timers.arm(Duration::from_secs(2), cb("a"));

        assert_eq!(timers.run_until_idle(), 2);
        assert_eq!(*log.borrow(), ["a", "b"]);
        assert_eq!(timers.now(), Duration::from_secs(5));
    }
}
