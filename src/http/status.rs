use std::num::NonZeroU16;

/// HTTP [Status Code][rfc] used by the streaming host.
///
/// [rfc]: <https://datatracker.ietf.org/doc/html/rfc9110#name-status-codes>
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(NonZeroU16);

macro_rules! status_codes {
    (
        $(
            $(#[$doc:meta])*
            $int:literal $id:ident $msg:literal;
        )*
    ) => {
        impl StatusCode {
            $(
                $(#[$doc])*
                pub const $id: Self = Self(NonZeroU16::new($int).unwrap());
            )*

            /// Returns status line text, e.g: `"200 OK"`.
            pub const fn as_str(&self) -> &'static str {
                match self.0.get() {
                    $($int => concat!(stringify!($int), " ", $msg),)*
                    // SAFETY: StatusCode is only constructed from the constants above
                    _ => unsafe { std::hint::unreachable_unchecked() },
                }
            }
        }
    };
}

status_codes! {
    /// `200`. The request succeeded.
    200 OK "OK";
    /// `400`. The request could not be parsed.
    400 BAD_REQUEST "Bad Request";
    /// `404`. No handler is routed to the request path.
    404 NOT_FOUND "Not Found";
    /// `431`. The request head exceeds the read buffer limit.
    431 REQUEST_HEADER_FIELDS_TOO_LARGE "Request Header Fields Too Large";
    /// `500`. The handler failed before producing a response.
    500 INTERNAL_SERVER_ERROR "Internal Server Error";
}

impl StatusCode {
    /// Returns status code value, e.g: `200`.
    #[inline]
    pub const fn status(&self) -> u16 {
        self.0.get()
    }
}

impl Default for StatusCode {
    #[inline]
    fn default() -> Self {
        Self::OK
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("StatusCode").field(&self.status()).finish()
    }
}
