//! Unified logging support for nos-xdp
//!
//! Wraps the `log` crate so call sites do not need a `#[cfg]` per message.
//! With the `log` feature disabled the arguments are still evaluated, which
//! keeps variables that are only used for diagnostics from tripping lints.

/// Trace-level logging
macro_rules! xdp_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($arg)*); }
    }
}

/// Debug-level logging
macro_rules! xdp_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::debug!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($arg)*); }
    }
}

/// Info-level logging
#[allow(unused_macros)]
macro_rules! xdp_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::info!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($arg)*); }
    }
}

/// Warn-level logging
///
/// Used for driver mistakes the registry can recover from on its own.
macro_rules! xdp_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::warn!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($arg)*); }
    }
}

/// Error-level logging
macro_rules! xdp_error {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::error!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = format_args!($($arg)*); }
    }
}

/// Report a broken caller contract and stop.
///
/// There is no safe way to continue after one of these, so the message is
/// logged and then raised as a panic.
macro_rules! contract_violation {
    ($($arg:tt)*) => {{
        xdp_error!($($arg)*);
        panic!($($arg)*)
    }}
}
