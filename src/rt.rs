//! Minimal single threaded HTTP/1.1 host.
//!
//! Everything here runs on one thread, [`serve`] must be polled inside a tokio
//! [`LocalSet`][tokio::task::LocalSet]. Each connection reads a request head, routes it, hands
//! the request to the handler, then keeps writing whatever the handler emits until the request
//! completes or the client goes away. A client going away tears the request down, which runs its
//! cleanup hooks.
use bytes::{Buf, Bytes, BytesMut};
use std::{
    cell::RefCell,
    collections::VecDeque,
    future::poll_fn,
    io,
    net::SocketAddr,
    pin::Pin,
    rc::Rc,
    task::{Poll, Waker, ready},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::{
    handler::{Handler, HandlerStatus},
    http::StatusCode,
    log::{debug, info, warning},
    payload::Chunk,
    request::{Completion, Request, RequestHead, Transport},
    response::ResponseHead,
};

#[cfg(test)]
mod test;

const MAX_HEADERS: usize = 64;
const MAX_HEAD_SIZE: usize = 8 * 1024;
const DEFAULT_BUFFER_CAP: usize = 1024;

// ===== Listener =====

pub trait Listener {
    type Stream: AsyncRead + AsyncWrite + Unpin + 'static;

    type Addr: std::fmt::Debug;

    fn poll_accept(
        &self,
        cx: &mut std::task::Context,
    ) -> Poll<io::Result<(Self::Stream, Self::Addr)>>;
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    type Addr = SocketAddr;

    #[inline]
    fn poll_accept(
        &self,
        cx: &mut std::task::Context,
    ) -> Poll<io::Result<(Self::Stream, Self::Addr)>> {
        TcpListener::poll_accept(self, cx)
    }
}

#[cfg(unix)]
impl Listener for UnixListener {
    type Stream = UnixStream;

    type Addr = tokio::net::unix::SocketAddr;

    #[inline]
    fn poll_accept(
        &self,
        cx: &mut std::task::Context,
    ) -> Poll<io::Result<(Self::Stream, Self::Addr)>> {
        UnixListener::poll_accept(self, cx)
    }
}

// ===== Route =====

/// Location prefix served by a handler.
#[derive(Debug)]
pub struct Route<H> {
    location: String,
    handler: H,
}

impl<H> Route<H> {
    pub fn new(location: impl Into<String>, handler: H) -> Self {
        Self { location: location.into(), handler }
    }

    /// Returns `true` if `path` falls under the location.
    #[inline]
    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.location)
    }
}

// ===== Serve =====

/// Serve `handler` at `location`, every other path gets `404 Not Found`.
pub fn serve<L, H>(listener: L, location: impl Into<String>, handler: H) -> Serve<L, H> {
    Serve { listener, route: Rc::new(Route::new(location, handler)) }
}

#[derive(Debug)]
pub struct Serve<L, H> {
    listener: L,
    route: Rc<Route<H>>,
}

impl<L, H> Future for Serve<L, H>
where
    L: Listener,
    H: Handler<Outbound> + 'static,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        loop {
            match ready!(self.listener.poll_accept(cx)) {
                Ok((io, addr)) => {
                    debug!("accepted {addr:?}");
                    tokio::task::spawn_local(connection(io, Rc::clone(&self.route)));
                }
                Err(err) => {
                    warning!("failed to accept peer: {err}");
                }
            }
        }
    }
}

// ===== Outbound =====

/// Transport that queues response bytes for the connection task.
///
/// Writes never block the handler, the connection drains the queue as the socket accepts it.
#[derive(Debug, Clone)]
pub struct Outbound {
    shared: Rc<RefCell<OutboundState>>,
}

#[derive(Debug)]
struct OutboundState {
    queue: VecDeque<Bytes>,
    keep_alive: bool,
    last: bool,
    error: Option<io::ErrorKind>,
    waker: Option<Waker>,
}

impl Outbound {
    fn new(keep_alive: bool) -> Self {
        Self {
            shared: Rc::new(RefCell::new(OutboundState {
                queue: VecDeque::new(),
                keep_alive,
                last: false,
                error: None,
                waker: None,
            })),
        }
    }

    fn push(&self, data: Bytes) {
        let mut state = self.shared.borrow_mut();
        state.queue.push_back(data);
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }

    fn check(&self) -> io::Result<()> {
        match self.shared.borrow().error {
            Some(kind) => Err(kind.into()),
            None => Ok(()),
        }
    }

    fn try_next(&self) -> Option<Bytes> {
        self.shared.borrow_mut().queue.pop_front()
    }

    fn poll_next(&self, cx: &mut std::task::Context) -> Poll<Bytes> {
        let mut state = self.shared.borrow_mut();
        match state.queue.pop_front() {
            Some(data) => Poll::Ready(data),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }

    fn next(&self) -> impl Future<Output = Bytes> {
        poll_fn(|cx| self.poll_next(cx))
    }

    /// Record a socket failure, anything still queued is discarded.
    fn fail(&self, kind: io::ErrorKind) {
        let mut state = self.shared.borrow_mut();
        state.error.get_or_insert(kind);
        state.queue.clear();
    }

    /// Returns `true` if the final chunk was queued and no write failed.
    pub fn is_complete(&self) -> bool {
        let state = self.shared.borrow();
        state.last && state.error.is_none()
    }
}

impl Transport for Outbound {
    fn send_header(&mut self, head: &ResponseHead) -> io::Result<()> {
        self.check()?;
        let mut buf = BytesMut::with_capacity(128);
        head.write(&mut buf, self.shared.borrow().keep_alive);
        self.push(buf.freeze());
        Ok(())
    }

    fn send_chunk(&mut self, chunk: Chunk) -> io::Result<()> {
        self.check()?;
        if chunk.is_last() {
            self.shared.borrow_mut().last = true;
        }
        if !chunk.is_empty() {
            self.push(chunk.into_data());
        }
        Ok(())
    }

    fn is_errored(&self) -> bool {
        self.shared.borrow().error.is_some()
    }
}

// ===== Connection =====

/// How one request/response exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exchange {
    /// Whole response written.
    Delivered,
    /// Response truncated or never produced, the connection cannot be reused.
    Aborted,
    /// Client closed the connection.
    Disconnected,
}

enum ReadError {
    Status(StatusCode),
    Io(io::Error),
}

async fn connection<IO, H>(io: IO, route: Rc<Route<H>>)
where
    IO: AsyncRead + AsyncWrite + Unpin,
    H: Handler<Outbound>,
{
    if let Err(err) = serve_connection(io, &route).await {
        warning!("failed to serve http: {err}");
    }
}

async fn serve_connection<IO, H>(io: IO, route: &Route<H>) -> io::Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
    H: Handler<Outbound>,
{
    let (mut reader, mut writer) = tokio::io::split(io);
    let mut buffer = BytesMut::with_capacity(DEFAULT_BUFFER_CAP);

    loop {
        let head = match read_head(&mut reader, &mut buffer).await {
            Ok(Some(head)) => head,
            Ok(None) => return Ok(()),
            Err(ReadError::Status(status)) => {
                debug!("rejecting request: {status}");
                return write_status(&mut writer, status, false).await;
            }
            Err(ReadError::Io(err)) => return Err(err),
        };

        debug!("> {} {} HTTP/1.{}", head.method, head.path, head.version);

        // request bodies are never read, a connection carrying one is not reused
        let keep_alive = head.keep_alive && !head.has_body;

        if !route.matches(head.path_only()) {
            write_status(&mut writer, StatusCode::NOT_FOUND, keep_alive).await?;
            match keep_alive {
                true => continue,
                false => return Ok(()),
            }
        }

        let outbound = Outbound::new(keep_alive);
        let request = Request::new(head, outbound.clone());

        let exchange = match route.handler.handle(&request) {
            HandlerStatus::Complete => finish(&mut writer, &outbound, Completion::Done).await,
            HandlerStatus::Pending => {
                drive(&mut reader, &mut writer, &mut buffer, &request, &outbound).await
            }
            HandlerStatus::Error(status) => {
                if !request.is_header_sent() {
                    write_status(&mut writer, status, false).await?;
                }
                Exchange::Aborted
            }
        };

        request.teardown();

        match exchange {
            Exchange::Delivered if keep_alive => {}
            Exchange::Delivered | Exchange::Aborted => {
                let _ = writer.shutdown().await;
                return Ok(());
            }
            Exchange::Disconnected => return Ok(()),
        }
    }
}

/// Read and parse one request head, returns `None` on a clean close between requests.
async fn read_head<R>(reader: &mut R, buffer: &mut BytesMut) -> Result<Option<RequestHead>, ReadError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if !buffer.is_empty() {
            if let Some((head, len)) = parse_head(buffer)? {
                buffer.advance(len);
                return Ok(Some(head));
            }
        }

        if buffer.len() >= MAX_HEAD_SIZE {
            return Err(ReadError::Status(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE));
        }

        let read = reader.read_buf(buffer).await.map_err(ReadError::Io)?;
        if read == 0 {
            return match buffer.is_empty() {
                true => Ok(None),
                false => Err(ReadError::Io(io::ErrorKind::UnexpectedEof.into())),
            };
        }
    }
}

fn parse_head(buf: &[u8]) -> Result<Option<(RequestHead, usize)>, ReadError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(_) => return Err(ReadError::Status(StatusCode::BAD_REQUEST)),
    };

    let version = req.version.unwrap_or(1);
    let mut keep_alive = version == 1;
    let mut has_body = false;

    for header in req.headers.iter() {
        if header.name.eq_ignore_ascii_case("connection") {
            if has_token(header.value, "close") {
                keep_alive = false;
            } else if has_token(header.value, "keep-alive") {
                keep_alive = true;
            }
        } else if header.name.eq_ignore_ascii_case("content-length") {
            let len = str::from_utf8(header.value)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or(ReadError::Status(StatusCode::BAD_REQUEST))?;
            has_body |= len > 0;
        } else if header.name.eq_ignore_ascii_case("transfer-encoding") {
            has_body = true;
        }
    }

    let head = RequestHead {
        method: req.method.unwrap_or_default().to_owned(),
        path: req.path.unwrap_or("/").to_owned(),
        version,
        keep_alive,
        has_body,
    };

    Ok(Some((head, len)))
}

fn has_token(value: &[u8], token: &str) -> bool {
    value
        .split(|b| *b == b',')
        .any(|v| v.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
}

/// Write queued bytes as they come, until the request completes, a write fails, or the client
/// leaves.
async fn drive<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut BytesMut,
    request: &Request<Outbound>,
    outbound: &Outbound,
) -> Exchange
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            data = outbound.next() => {
                // the teardown that follows cancels the pending tick
                if let Err(err) = write(writer, &data).await {
                    warning!("failed to write response: {err}");
                    outbound.fail(err.kind());
                    return Exchange::Aborted;
                }
            }
            completion = request.finished() => {
                return finish(writer, outbound, completion).await;
            }
            // pipelined requests wait in the buffer, a closed read side is a disconnect
            read = reader.read_buf(buffer), if buffer.len() < MAX_HEAD_SIZE => {
                match read {
                    Ok(0) => {
                        info!("client disconnected mid response");
                        return Exchange::Disconnected;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warning!("failed to read from client: {err}");
                        return Exchange::Disconnected;
                    }
                }
            }
        }
    }
}

/// Drain what the handler queued before completing.
async fn finish<W>(writer: &mut W, outbound: &Outbound, completion: Completion) -> Exchange
where
    W: AsyncWrite + Unpin,
{
    while let Some(data) = outbound.try_next() {
        if let Err(err) = write(writer, &data).await {
            warning!("failed to write response: {err}");
            outbound.fail(err.kind());
            return Exchange::Aborted;
        }
    }

    match completion {
        Completion::Done if outbound.is_complete() => Exchange::Delivered,
        _ => Exchange::Aborted,
    }
}

async fn write<W>(writer: &mut W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(data).await?;
    writer.flush().await
}

async fn write_status<W>(writer: &mut W, status: StatusCode, keep_alive: bool) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(128);
    ResponseHead::new(status)
        .with_content_length(0)
        .write(&mut buf, keep_alive);
    write(writer, &buf).await
}
