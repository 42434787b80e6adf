//! Teardown hook of a streaming session.
use std::rc::Rc;

use crate::{
    Error,
    log::debug,
    request::{Request, Transport},
    session::SessionHandle,
};

/// Cancels the pending tick of a session when its request is torn down.
///
/// The guard owns the session, and the request owns the guard through its cleanup hooks, so the
/// session is released together with the request.
pub struct LifecycleGuard<T> {
    session: SessionHandle<T>,
}

impl<T: Transport + 'static> LifecycleGuard<T> {
    #[inline]
    pub fn new(session: SessionHandle<T>) -> Self {
        Self { session }
    }

    /// Register the guard as a cleanup hook of `request`.
    pub fn register(self, request: &Request<T>) -> Result<(), Error> {
        request.add_cleanup(move || {
            self.run();
        })
    }

    /// Cancel the armed timer, if any.
    ///
    /// Running on a finished session, or running twice, does nothing. Returns `true` if a timer
    /// was cancelled.
    pub fn run(&self) -> bool {
        let Ok(mut session) = self.session.try_borrow_mut() else {
            // the last request handle dropped inside a tick, the tick disarms once it sees
            // the request released
            debug!("session is busy during teardown");
            return false;
        };

        let cancelled = session.cancel();
        if cancelled {
            debug!("cancelled pending tick, state: {:?}", session.state());
        }
        cancelled
    }
}

impl<T> Clone for LifecycleGuard<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self { session: Rc::clone(&self.session) }
    }
}

impl<T> std::fmt::Debug for LifecycleGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleGuard")
            .field("session", &self.session)
            .finish()
    }
}
