//! Handler entry point.
use std::rc::Rc;

use crate::{
    config::StreamConfig,
    guard::LifecycleGuard,
    http::StatusCode,
    log::{debug, error},
    request::{Request, Transport},
    session::StreamingSession,
    timer::TimerService,
};

/// What the handler did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    /// Response is fully produced.
    Complete,
    /// Response is produced later, wait for [`Request::finished`].
    Pending,
    /// Handler failed before writing anything, respond with the status.
    Error(StatusCode),
}

/// Request handler routed by the host.
pub trait Handler<T> {
    fn handle(&self, request: &Request<T>) -> HandlerStatus;
}

/// Answers a request with a timer paced stream of the configured payload.
pub struct StreamHandler {
    config: StreamConfig,
    timers: Rc<dyn TimerService>,
}

impl StreamHandler {
    pub fn new(config: StreamConfig, timers: Rc<dyn TimerService>) -> Self {
        Self { config, timers }
    }

    #[inline]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

impl<T: Transport + 'static> Handler<T> for StreamHandler {
    fn handle(&self, request: &Request<T>) -> HandlerStatus {
        request.discard_body();

        let session = StreamingSession::new(
            request.downgrade(),
            self.config.clone(),
            Rc::clone(&self.timers),
        );

        if let Err(err) = LifecycleGuard::new(Rc::clone(&session)).register(request) {
            error!("failed to register session cleanup: {err}");
            return HandlerStatus::Error(StatusCode::INTERNAL_SERVER_ERROR);
        }

        session.borrow_mut().arm();
        request.hold();

        debug!(
            "streaming {} chunks every {:?} to {}",
            self.config.chunks(),
            self.config.interval(),
            request.head().path,
        );
        HandlerStatus::Pending
    }
}

impl std::fmt::Debug for StreamHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
