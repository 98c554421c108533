//! Error handling module for the XDP memory-model registry

use core::fmt;

/// Errors reported to the driver that owns a receive queue.
///
/// Broken caller contracts are not represented here; those are fatal and
/// reported through `contract_violation!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Every memory model id is live, even after one wraparound
    Exhausted,
    /// The registry could not create an entry for the allocator
    AllocationFailed(&'static str),
    /// Memory type unknown or not compiled into this build
    UnsupportedType(u32),
    /// Invalid argument
    InvalidArgument(&'static str),
    /// Memory model registration on a queue that is not registered
    NotRegistered,
    /// A program is attached with different mode flags
    FlagsMismatch(&'static str),
    /// Rejected registry configuration
    InvalidConfig(&'static str),
}

/// Kernel errno values returned by [`Error::errno`].
pub mod errno {
    /// Bad address
    pub const EFAULT: i32 = 14;
    /// Out of memory
    pub const ENOMEM: i32 = 12;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// No space left
    pub const ENOSPC: i32 = 28;
    /// Operation not supported
    pub const EOPNOTSUPP: i32 = 95;
}

impl Error {
    /// Negative errno equivalent, for callers that speak the kernel ABI.
    pub fn errno(&self) -> i32 {
        match self {
            Error::Exhausted => -errno::ENOSPC,
            Error::AllocationFailed(_) => -errno::ENOMEM,
            Error::UnsupportedType(_) => -errno::EOPNOTSUPP,
            Error::InvalidArgument(_) | Error::FlagsMismatch(_) | Error::InvalidConfig(_) => {
                -errno::EINVAL
            }
            Error::NotRegistered => -errno::EFAULT,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Exhausted => write!(f, "Memory model id space exhausted"),
            Error::AllocationFailed(msg) => write!(f, "Allocation failed: {}", msg),
            Error::UnsupportedType(ty) => write!(f, "Unsupported memory type: {}", ty),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotRegistered => write!(f, "Receive queue is not registered"),
            Error::FlagsMismatch(msg) => write!(f, "Flags mismatch: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Result type for registry operations
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(Error::Exhausted.errno(), -28);
        assert_eq!(Error::AllocationFailed("id").errno(), -12);
        assert_eq!(Error::UnsupportedType(9).errno(), -95);
        assert_eq!(Error::InvalidArgument("handle").errno(), -22);
        assert_eq!(Error::NotRegistered.errno(), -14);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::UnsupportedType(4).to_string(),
            "Unsupported memory type: 4"
        );
        assert_eq!(
            Error::InvalidArgument("page pool handle required").to_string(),
            "Invalid argument: page pool handle required"
        );
    }
}
