//! Host request object.
//!
//! A [`Request`] is owned by the host for the duration of one exchange. Handlers reach it
//! through a cheap clone or a [`RequestRef`], which does not keep it alive.
//!
//! The host relies on three pieces of state here:
//!
//! - the outstanding work counter, raised with [`Request::hold`] and lowered by
//!   [`Request::finalize`], the host waits for it to reach zero before completing
//! - cleanup hooks, run exactly once by [`Request::teardown`], or when the last handle drops
//! - the header/body emission order, header once, then body chunks up to the final one
use std::{
    cell::{Cell, RefCell},
    future::poll_fn,
    io,
    rc::{Rc, Weak},
    task::{Poll, Waker},
};

use crate::{
    Error,
    log::{debug, trace},
    payload::Chunk,
    response::ResponseHead,
};

/// Destination of the response bytes.
pub trait Transport {
    /// Queue the response head.
    fn send_header(&mut self, head: &ResponseHead) -> io::Result<()>;

    /// Queue one body chunk.
    fn send_chunk(&mut self, chunk: Chunk) -> io::Result<()>;

    /// Returns `true` once the underlying connection failed a write.
    fn is_errored(&self) -> bool {
        false
    }
}

/// Parsed request line and the headers the host cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    /// Minor version of HTTP/1.x.
    pub version: u8,
    pub keep_alive: bool,
    /// Request announces a body with `Content-Length` or `Transfer-Encoding`.
    pub has_body: bool,
}

impl RequestHead {
    /// `GET` request on HTTP/1.1 without a body.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            path: path.into(),
            version: 1,
            keep_alive: true,
            has_body: false,
        }
    }

    /// Returns the path without query.
    pub fn path_only(&self) -> &str {
        match self.path.split_once('?') {
            Some((path, _)) => path,
            None => &self.path,
        }
    }
}

/// How the asynchronous work of a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every byte of the response was handed to the transport.
    Done,
    /// The transport failed mid response, the body is truncated.
    WriteError,
}

/// Shared handle to a host request.
pub struct Request<T> {
    shared: Rc<Shared<T>>,
}

/// Non-owning handle to a host request.
pub struct RequestRef<T> {
    shared: Weak<Shared<T>>,
}

type Cleanup = Box<dyn FnOnce() + 'static>;

struct Shared<T> {
    head: RequestHead,
    transport: RefCell<T>,
    header_sent: Cell<bool>,
    body_finished: Cell<bool>,
    body_buffering: Cell<bool>,
    count: Cell<usize>,
    completion: Cell<Option<Completion>>,
    torn_down: Cell<bool>,
    cleanup: RefCell<Vec<Cleanup>>,
    waker: RefCell<Option<Waker>>,
}

impl<T: Transport> Request<T> {
    pub fn new(head: RequestHead, transport: T) -> Self {
        Self {
            shared: Rc::new(Shared {
                head,
                transport: RefCell::new(transport),
                header_sent: Cell::new(false),
                body_finished: Cell::new(false),
                body_buffering: Cell::new(true),
                count: Cell::new(0),
                completion: Cell::new(None),
                torn_down: Cell::new(false),
                cleanup: RefCell::new(Vec::new()),
                waker: RefCell::new(None),
            }),
        }
    }

    #[inline]
    pub fn head(&self) -> &RequestHead {
        &self.shared.head
    }

    /// Create a handle that does not keep the request alive.
    #[inline]
    pub fn downgrade(&self) -> RequestRef<T> {
        RequestRef { shared: Rc::downgrade(&self.shared) }
    }

    /// Run `f` with the transport.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a [`Transport`] method of the same request.
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.shared.transport.borrow_mut())
    }

    // ===== Body =====

    /// Tell the host the handler never reads the request body.
    #[inline]
    pub fn discard_body(&self) {
        self.shared.body_buffering.set(false);
    }

    /// Returns `false` if the handler asked for the request body to be discarded.
    #[inline]
    pub fn is_body_buffered(&self) -> bool {
        self.shared.body_buffering.get()
    }

    // ===== Emission =====

    /// Returns `true` if the response head was sent.
    #[inline]
    pub fn is_header_sent(&self) -> bool {
        self.shared.header_sent.get()
    }

    /// Returns `true` if the final body chunk was sent.
    #[inline]
    pub fn is_body_finished(&self) -> bool {
        self.shared.body_finished.get()
    }

    /// Send the response head, at most once per request.
    ///
    /// The head counts as sent even if the transport fails.
    pub fn send_header(&self, head: ResponseHead) -> Result<(), Error> {
        self.check_alive()?;
        if self.shared.header_sent.replace(true) {
            return Err(Error::HeaderSent);
        }
        debug!("sending header: {}", head.status());
        self.shared.transport.borrow_mut().send_header(&head)?;
        Ok(())
    }

    /// Send one body chunk, after the head and up to the chunk marked final.
    pub fn send_chunk(&self, chunk: Chunk) -> Result<(), Error> {
        self.check_alive()?;
        if !self.shared.header_sent.get() {
            return Err(Error::HeaderNotSent);
        }
        if self.shared.body_finished.get() {
            return Err(Error::BodyFinished);
        }
        if chunk.is_last() {
            self.shared.body_finished.set(true);
        }
        trace!("sending chunk of {} bytes, last: {}", chunk.len(), chunk.is_last());
        self.shared.transport.borrow_mut().send_chunk(chunk)?;
        Ok(())
    }

    /// Returns `true` once the transport failed a write.
    #[inline]
    pub fn is_write_error(&self) -> bool {
        self.shared.transport.borrow().is_errored()
    }

    // ===== Lifetime =====

    /// Register a hook to run at teardown.
    ///
    /// Hooks run exactly once, most recently registered first, before the request is released.
    pub fn add_cleanup(&self, hook: impl FnOnce() + 'static) -> Result<(), Error> {
        if self.shared.torn_down.get() {
            return Err(Error::TornDown);
        }
        self.shared.cleanup.borrow_mut().push(Box::new(hook));
        Ok(())
    }

    /// Mark asynchronous work as outstanding.
    #[inline]
    pub fn hold(&self) {
        self.shared.count.set(self.shared.count.get() + 1);
    }

    /// Returns the number of outstanding asynchronous work.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.shared.count.get()
    }

    /// Finish one outstanding asynchronous work with `completion`.
    ///
    /// Returns [`Error::Finalized`] if there is no outstanding work left.
    pub fn finalize(&self, completion: Completion) -> Result<(), Error> {
        self.check_alive()?;
        let count = self.shared.count.get();
        if count == 0 {
            return Err(Error::Finalized);
        }
        self.shared.count.set(count - 1);

        // a write error sticks even if later work finishes cleanly
        if self.shared.completion.get() != Some(Completion::WriteError) {
            self.shared.completion.set(Some(completion));
        }

        if count == 1 {
            debug!("request finalized: {completion:?}");
            if let Some(waker) = self.shared.waker.borrow_mut().take() {
                waker.wake();
            }
        }
        Ok(())
    }

    /// Returns the completion once no asynchronous work is outstanding.
    pub fn completion(&self) -> Option<Completion> {
        match self.shared.count.get() {
            0 => self.shared.completion.get(),
            _ => None,
        }
    }

    /// Poll for the completion of all outstanding work.
    pub fn poll_finished(&self, cx: &mut std::task::Context) -> Poll<Completion> {
        match self.completion() {
            Some(completion) => Poll::Ready(completion),
            None => {
                *self.shared.waker.borrow_mut() = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    /// Wait for the completion of all outstanding work.
    #[inline]
    pub fn finished(&self) -> impl Future<Output = Completion> {
        poll_fn(|cx| self.poll_finished(cx))
    }

    /// Returns `true` once the request is torn down.
    #[inline]
    pub fn is_torn_down(&self) -> bool {
        self.shared.torn_down.get()
    }

    /// Run cleanup hooks and refuse further use of the request.
    ///
    /// Only the first call does anything.
    pub fn teardown(&self) {
        if self.shared.torn_down.replace(true) {
            return;
        }
        debug!("tearing down request: {}", self.shared.head.path);
        self.shared.run_cleanup();
    }

    fn check_alive(&self) -> Result<(), Error> {
        match self.shared.torn_down.get() {
            true => Err(Error::TornDown),
            false => Ok(()),
        }
    }
}

impl<T> Shared<T> {
    fn run_cleanup(&self) {
        // taken out first, a hook may touch the request
        let hooks = std::mem::take(&mut *self.cleanup.borrow_mut());
        for hook in hooks.into_iter().rev() {
            hook();
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if !self.torn_down.replace(true) {
            self.run_cleanup();
        }
    }
}

impl<T> RequestRef<T> {
    /// Returns the request if it has not been released.
    #[inline]
    pub fn upgrade(&self) -> Option<Request<T>> {
        self.shared.upgrade().map(|shared| Request { shared })
    }
}

impl<T> Clone for Request<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self { shared: Rc::clone(&self.shared) }
    }
}

impl<T> Clone for RequestRef<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self { shared: Weak::clone(&self.shared) }
    }
}

impl<T> std::fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("head", &self.shared.head)
            .field("header_sent", &self.shared.header_sent.get())
            .field("count", &self.shared.count.get())
            .field("torn_down", &self.shared.torn_down.get())
            .finish_non_exhaustive()
    }
}

impl<T> std::fmt::Debug for RequestRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRef")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
