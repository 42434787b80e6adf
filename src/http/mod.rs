//! HTTP primitives used by the response writer.
mod date;
mod status;

pub use date::{httpdate, httpdate_now};
pub use status::StatusCode;
