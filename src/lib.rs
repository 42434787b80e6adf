//! Timer paced streaming responses.
//!
//! A [`StreamHandler`] answers a request by writing a fixed payload in chunks, one chunk per
//! timer tick, instead of producing the whole body at once. The handler only talks to the host
//! through a few seams:
//!
//! - [`Request`], the host owned request with header and body emission, cleanup hooks, and the
//!   outstanding work counter
//! - [`Transport`], where emitted bytes go
//! - [`TimerService`], a single threaded one shot scheduler
//!
//! [`rt`] contains a minimal HTTP/1.1 host that drives all of the above on a tokio `LocalSet`.
#![warn(missing_debug_implementations)]

mod log;
mod error;

pub mod http;
pub mod config;
pub mod payload;
pub mod timer;
pub mod request;
pub mod response;
pub mod session;
pub mod guard;
pub mod handler;
pub mod rt;

pub use config::{ServerConfig, StreamConfig};
pub use error::Error;
pub use guard::LifecycleGuard;
pub use handler::{Handler, HandlerStatus, StreamHandler};
pub use payload::{Chunk, PAYLOAD};
pub use request::{Completion, Request, RequestHead, RequestRef, Transport};
pub use response::ResponseHead;
pub use session::{State, StreamingSession};
pub use timer::{ManualTimers, TimerId, TimerService, TokioTimers};
