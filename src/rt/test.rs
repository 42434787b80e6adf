use std::{
    cell::Cell,
    io,
    num::NonZeroU32,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, duplex},
    task::LocalSet,
    time::Instant,
};

use super::{Route, connection};
use crate::{config::StreamConfig, handler::StreamHandler, timer::TokioTimers};

const PAYLOAD: &[u8] = b"hello world\n";

fn route(chunks: u32, timers: &TokioTimers) -> Rc<Route<StreamHandler>> {
    let config = StreamConfig::default().with_chunks(NonZeroU32::new(chunks).unwrap());
    Rc::new(Route::new("/hello", StreamHandler::new(config, Rc::new(timers.clone()))))
}

async fn read_to_string(client: &mut DuplexStream) -> String {
    let mut buf = Vec::new();
    client.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

fn count_payload(buf: &[u8]) -> usize {
    buf.windows(PAYLOAD.len()).filter(|w| *w == PAYLOAD).count()
}

/// Delivers one request, accepts the response head, then fails every write with a broken pipe.
///
/// The read side never closes, so the connection cannot tell a disconnect from reading.
struct BrokenAfterHead {
    request: &'static [u8],
    head_written: bool,
    writes: Rc<Cell<usize>>,
}

impl AsyncRead for BrokenAfterHead {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.request.is_empty() {
            return Poll::Pending;
        }
        let len = self.request.len().min(buf.remaining());
        buf.put_slice(&self.request[..len]);
        self.request = &self.request[len..];
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for BrokenAfterHead {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.writes.set(self.writes.get() + 1);
        match std::mem::replace(&mut self.head_written, true) {
            false => Poll::Ready(Ok(buf.len())),
            true => Poll::Ready(Err(io::ErrorKind::BrokenPipe.into())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_streams_full_body() {
    LocalSet::new()
        .run_until(async {
            let timers = TokioTimers::new();
            let (mut client, server) = duplex(4096);
            let task = tokio::task::spawn_local(connection(server, route(10, &timers)));
            let start = Instant::now();

            client
                .write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();

            let response = read_to_string(&mut client).await;
            task.await.unwrap();

            assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
            assert!(response.contains("\r\nContent-Type: text/plain\r\n"));
            assert!(response.contains("\r\nContent-Length: 120\r\n"));
            assert!(response.contains("\r\nConnection: close\r\n"));

            let (_, body) = response.split_once("\r\n\r\n").unwrap();
            assert_eq!(body, "hello world\n".repeat(10));

            assert!(start.elapsed() >= Duration::from_secs(10));
            assert_eq!(timers.pending(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_stream() {
    LocalSet::new()
        .run_until(async {
            let timers = TokioTimers::new();
            let (mut client, server) = duplex(4096);
            let task = tokio::task::spawn_local(connection(server, route(10, &timers)));

            client.write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();

            let mut received = Vec::new();
            while count_payload(&received) < 3 {
                assert_ne!(client.read_buf(&mut received).await.unwrap(), 0);
            }
            assert_eq!(count_payload(&received), 3);
            assert_eq!(timers.pending(), 1);

            drop(client);
            task.await.unwrap();

            assert_eq!(timers.pending(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_pipelined() {
    LocalSet::new()
        .run_until(async {
            let timers = TokioTimers::new();
            let (mut client, server) = duplex(4096);
            let task = tokio::task::spawn_local(connection(server, route(2, &timers)));

            client
                .write_all(concat!(
                    "GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n",
                    "GET /hello?again HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
                ).as_bytes())
                .await
                .unwrap();

            let response = read_to_string(&mut client).await;
            task.await.unwrap();

            assert_eq!(response.matches("HTTP/1.1 200 OK\r\n").count(), 2);
            assert_eq!(response.matches("Content-Length: 24\r\n").count(), 2);
            assert_eq!(count_payload(response.as_bytes()), 4);
            assert_eq!(timers.pending(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_unknown_location() {
    LocalSet::new()
        .run_until(async {
            let timers = TokioTimers::new();
            let (mut client, server) = duplex(4096);
            let task = tokio::task::spawn_local(connection(server, route(10, &timers)));

            client
                .write_all(b"GET /other HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();

            let response = read_to_string(&mut client).await;
            task.await.unwrap();

            assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
            assert!(response.ends_with("Content-Length: 0\r\nConnection: close\r\n\r\n"));
            assert_eq!(timers.pending(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_request() {
    LocalSet::new()
        .run_until(async {
            let timers = TokioTimers::new();
            let (mut client, server) = duplex(4096);
            let task = tokio::task::spawn_local(connection(server, route(10, &timers)));

            client.write_all(b"GET /hello FTP/1.1\r\n\r\n").await.unwrap();

            let response = read_to_string(&mut client).await;
            task.await.unwrap();

            assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_write_error_aborts_at_once() {
    LocalSet::new()
        .run_until(async {
            let timers = TokioTimers::new();
            let writes = Rc::new(Cell::new(0));
            let io = BrokenAfterHead {
                request: b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n",
                head_written: false,
                writes: Rc::clone(&writes),
            };
            let start = Instant::now();

            tokio::task::spawn_local(connection(io, route(10, &timers))).await.unwrap();

            // the first chunk fails on the first tick, no second tick is waited for
            assert!(start.elapsed() >= Duration::from_secs(1));
            assert!(start.elapsed() < Duration::from_secs(2));
            assert_eq!(writes.get(), 2);
            assert_eq!(timers.pending(), 0);
        })
        .await;
}
