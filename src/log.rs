// Without the `log` feature every macro still type checks its arguments, then discards them.

macro_rules! trace {
    ($($tt:tt)*) => {
        #[cfg(feature = "log")]
        ::log::trace!($($tt)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($tt)*); }
    };
}

macro_rules! debug {
    ($($tt:tt)*) => {
        #[cfg(feature = "log")]
        ::log::debug!($($tt)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($tt)*); }
    };
}

macro_rules! info {
    ($($tt:tt)*) => {
        #[cfg(feature = "log")]
        ::log::info!($($tt)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($tt)*); }
    };
}

macro_rules! warning {
    ($($tt:tt)*) => {
        #[cfg(feature = "log")]
        ::log::warn!($($tt)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($tt)*); }
    };
}

macro_rules! error {
    ($($tt:tt)*) => {
        #[cfg(feature = "log")]
        ::log::error!($($tt)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($tt)*); }
    };
}

#[allow(unused_imports)]
pub(crate) use {trace, debug, info, warning, error};
