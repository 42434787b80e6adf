//! Streaming session state machine.
//!
//! ```text
//! Init ──tick──▶ Streaming ──tick──▶ Streaming ... ──last tick / write error──▶ Done
//!   │                │
//!   └────guard───────┴──────────────────────────────────────────────────────▶ Cancelled
//! ```
//!
//! Every tick emits exactly one chunk. The first tick also sends the response head, with a
//! `Content-Length` covering every chunk the session will ever send. A tick that leaves chunks
//! to send arms the next one, otherwise the session finalizes the request.
use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use crate::{
    config::StreamConfig,
    http::StatusCode,
    log::{debug, warning},
    payload,
    request::{Completion, Request, RequestRef, Transport},
    response::ResponseHead,
    timer::{TimerId, TimerService},
};


/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created, no tick yet.
    Init,
    /// Head sent, more chunks to go.
    Streaming,
    /// Finalized, either every chunk was sent or the transport failed.
    Done,
    /// Request torn down before the session finished.
    Cancelled,
}

impl State {
    /// Returns `true` for `Done` and `Cancelled`.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

/// Shared handle to a session, the timer callback only keeps a [`Weak`] one.
pub type SessionHandle<T> = Rc<RefCell<StreamingSession<T>>>;

/// Per request streaming state.
pub struct StreamingSession<T> {
    state: State,
    remaining: u32,
    headers_sent: bool,
    timer: Option<TimerId>,
    config: StreamConfig,
    request: RequestRef<T>,
    timers: Rc<dyn TimerService>,
    this: Weak<RefCell<Self>>,
}

impl<T: Transport + 'static> StreamingSession<T> {
    /// Create a session for `request`, no timer is armed yet.
    pub fn new(
        request: RequestRef<T>,
        config: StreamConfig,
        timers: Rc<dyn TimerService>,
    ) -> SessionHandle<T> {
        Rc::new_cyclic(|this| {
            RefCell::new(Self {
                state: State::Init,
                remaining: config.chunks().get(),
                headers_sent: false,
                timer: None,
                config,
                request,
                timers,
                this: Weak::clone(this),
            })
        })
    }

    /// Arm the next tick.
    ///
    /// A timer that is still armed is cancelled first, a session never has two.
    pub fn arm(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        self.disarm();

        let this = Weak::clone(&self.this);
        let id = self.timers.arm(self.config.interval(), Box::new(move || tick(&this)));
        self.timer = Some(id);
    }

    /// Cancel the armed timer, returns `false` if none was armed.
    pub fn disarm(&mut self) -> bool {
        match self.timer.take() {
            Some(id) => {
                self.timers.cancel(id);
                true
            }
            None => false,
        }
    }

    /// Disarm and move to `Cancelled` unless already finished.
    ///
    /// Returns `true` if an armed timer was cancelled.
    pub fn cancel(&mut self) -> bool {
        let disarmed = self.disarm();
        if !self.state.is_terminal() {
            debug!("session cancelled with {} chunks left", self.remaining);
            self.state = State::Cancelled;
        }
        disarmed
    }

    /// Run one tick.
    ///
    /// Does nothing once the session is `Done` or `Cancelled`.
    pub fn step(&mut self) {
        if self.state.is_terminal() {
            warning!("tick on a finished session: {:?}", self.state);
            return;
        }

        let Some(request) = self.request.upgrade() else {
            // released without teardown hooks reaching us, nothing left to write to
            self.state = State::Cancelled;
            return;
        };

        if request.is_torn_down() {
            self.state = State::Cancelled;
            return;
        }

        debug!("tick, chunks to send: {}", self.remaining);

        if !self.headers_sent {
            let head = ResponseHead::new(StatusCode::OK)
                .with_content_type(self.config.content_type())
                .with_content_length(self.config.content_length());

            let sent = request.send_header(head);
            self.headers_sent = true;
            self.state = State::Streaming;

            if let Err(err) = sent {
                warning!("failed to send header: {err}");
                self.finish(&request, Completion::WriteError);
                return;
            }
        }

        // non terminal state always has a chunk left
        self.remaining -= 1;

        let chunk = payload::emit(self.config.payload(), self.remaining == 0);
        let written = match request.send_chunk(chunk) {
            Ok(()) => !request.is_write_error(),
            Err(err) => {
                warning!("failed to send chunk: {err}");
                false
            }
        };

        match (self.remaining, written) {
            (1.., true) => {
                debug!("arming next tick");
                self.arm();
            }
            (0, true) => self.finish(&request, Completion::Done),
            (_, false) => self.finish(&request, Completion::WriteError),
        }
    }

    fn finish(&mut self, request: &Request<T>, completion: Completion) {
        self.disarm();
        self.state = State::Done;
        if let Err(err) = request.finalize(completion) {
            warning!("failed to finalize request: {err}");
        }
    }
}

impl<T> StreamingSession<T> {
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns the number of chunks not yet emitted.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[inline]
    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Returns the armed timer.
    #[inline]
    pub fn timer(&self) -> Option<TimerId> {
        self.timer
    }

    #[inline]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

/// Timer callback.
///
/// The armed timer is the one firing, so it is forgotten before stepping. A request released
/// by the step itself leaves no timer behind.
fn tick<T: Transport + 'static>(this: &Weak<RefCell<StreamingSession<T>>>) {
    let Some(session) = this.upgrade() else {
        debug!("tick on a released session");
        return;
    };
    let mut session = session.borrow_mut();
    session.timer = None;
    session.step();

    // a teardown during the step found the session borrowed
    let released = session.request.upgrade().is_none_or(|request| request.is_torn_down());
    if released && session.cancel() {
        debug!("request released during tick, next tick disarmed");
    }
}

impl<T> std::fmt::Debug for StreamingSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("state", &self.state)
            .field("remaining", &self.remaining)
            .field("headers_sent", &self.headers_sent)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}
