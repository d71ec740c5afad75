//! Failure taxonomy.
//!
//! [`Failure`] is what a wrapped operation raises to its caller. Would-block
//! is deliberately absent: it is a [`Progress`](crate::Progress) value, not an
//! error. [`PlatformError`] is the process-fatal bootstrap error raised while
//! building a [`Platform`](crate::Platform).

use thiserror::Error;

use crate::interpret::Op;

/// A classified failure of a single native operation.
///
/// `ConnectionReset` and `ClosedResource` carry no heap data and are built
/// on the hot path for free; only `Io` owns the platform message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// The peer went away mid-transfer (`EPIPE`). The connection must be torn down.
    ///
    /// `Display` uses the Linux text. [`Platform::failure_message`](crate::Platform::failure_message)
    /// renders it from the host catalog instead.
    #[error("Error while {op}(...): Broken pipe")]
    ConnectionReset { op: Op },
    /// The descriptor is no longer open (`EBADF`).
    #[error("descriptor closed")]
    ClosedResource,
    /// Any other negative result, with the platform's message text.
    #[error("Error while {op}(...): {message}")]
    Io { op: Op, code: i32, message: String },
}

/// Coarse category of a [`Failure`], for consumers that only branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    ConnectionReset,
    ClosedResource,
    Generic,
}

impl Failure {
    /// The shared reset failure for `op`.
    #[inline]
    #[must_use]
    pub const fn reset(op: Op) -> Self {
        Self::ConnectionReset { op }
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::ConnectionReset { .. } => FailureKind::ConnectionReset,
            Self::ClosedResource => FailureKind::ClosedResource,
            Self::Io { .. } => FailureKind::Generic,
        }
    }

    /// Operation label that raised the failure, when one is attached.
    #[must_use]
    pub const fn op(&self) -> Option<Op> {
        match self {
            Self::ConnectionReset { op } | Self::Io { op, .. } => Some(*op),
            Self::ClosedResource => None,
        }
    }

    /// Positive errno carried by a generic failure.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Io { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if the owning connection must be torn down.
    #[must_use]
    pub const fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Self::ConnectionReset { .. } | Self::ClosedResource)
    }
}

/// Bootstrap failure. No I/O can be classified once one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("only supported on {required}, running on {os}")]
    UnsupportedPlatform { os: String, required: String },
    #[error("platform did not resolve errno constant {name}")]
    UnresolvedErrno { name: &'static str },
    #[error("errno catalog of {size} entries cannot hold code {required}")]
    CatalogTooSmall { size: usize, required: i32 },
}
