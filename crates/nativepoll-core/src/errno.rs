//! Error number catalog.
//!
//! Holds the Linux errno constants this crate reasons about, the cached
//! negated codes that receive special treatment ([`SpecialCodes`]) and the
//! code → message table built once at start-up ([`ErrnoCatalog`]).

use std::borrow::Cow;

use crate::error::PlatformError;

// ---------------------------------------------------------------------------
// Linux errno values
// ---------------------------------------------------------------------------

pub const EPERM: i32 = 1;
pub const ENOENT: i32 = 2;
pub const EINTR: i32 = 4;
pub const EIO: i32 = 5;
pub const EBADF: i32 = 9;
pub const EAGAIN: i32 = 11;
pub const ENOMEM: i32 = 12;
pub const EACCES: i32 = 13;
pub const EFAULT: i32 = 14;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;
pub const EMFILE: i32 = 24;
pub const EPIPE: i32 = 32;
pub const ENOSYS: i32 = 38;
/// Alias of `EAGAIN` on Linux.
pub const EWOULDBLOCK: i32 = EAGAIN;
pub const ENOTSOCK: i32 = 88;
pub const EAFNOSUPPORT: i32 = 97;
pub const EADDRINUSE: i32 = 98;
pub const EADDRNOTAVAIL: i32 = 99;
pub const ENETUNREACH: i32 = 101;
pub const ECONNABORTED: i32 = 103;
pub const ECONNRESET: i32 = 104;
pub const ENOBUFS: i32 = 105;
pub const EISCONN: i32 = 106;
pub const ENOTCONN: i32 = 107;
pub const ETIMEDOUT: i32 = 110;
pub const ECONNREFUSED: i32 = 111;
pub const EHOSTUNREACH: i32 = 113;
pub const EALREADY: i32 = 114;
pub const EINPROGRESS: i32 = 115;

/// Default catalog size. errno.h defines fewer than 200 codes.
pub const DEFAULT_CATALOG_SIZE: usize = 1024;

/// glibc's message for the codes above, used by the scripted adapter and as
/// a fallback when a platform hands back an empty string.
#[must_use]
pub fn linux_message(code: i32) -> Option<&'static str> {
    Some(match code {
        0 => "Success",
        EPERM => "Operation not permitted",
        ENOENT => "No such file or directory",
        EINTR => "Interrupted system call",
        EIO => "Input/output error",
        EBADF => "Bad file descriptor",
        EAGAIN => "Resource temporarily unavailable",
        ENOMEM => "Cannot allocate memory",
        EACCES => "Permission denied",
        EFAULT => "Bad address",
        EEXIST => "File exists",
        EINVAL => "Invalid argument",
        EMFILE => "Too many open files",
        EPIPE => "Broken pipe",
        ENOSYS => "Function not implemented",
        ENOTSOCK => "Socket operation on non-socket",
        EAFNOSUPPORT => "Address family not supported by protocol",
        EADDRINUSE => "Address already in use",
        EADDRNOTAVAIL => "Cannot assign requested address",
        ENETUNREACH => "Network is unreachable",
        ECONNABORTED => "Software caused connection abort",
        ECONNRESET => "Connection reset by peer",
        ENOBUFS => "No buffer space available",
        EISCONN => "Transport endpoint is already connected",
        ENOTCONN => "Transport endpoint is not connected",
        ETIMEDOUT => "Connection timed out",
        ECONNREFUSED => "Connection refused",
        EHOSTUNREACH => "No route to host",
        EALREADY => "Operation already in progress",
        EINPROGRESS => "Operation now in progress",
        _ => return None,
    })
}

/// Placeholder text for a code the platform does not describe.
#[must_use]
pub fn unknown_message(code: i32) -> String {
    format!("Unknown error {code}")
}

// ---------------------------------------------------------------------------
// Special codes
// ---------------------------------------------------------------------------

/// Error conditions that the interpreter and the connect handshake treat
/// specially. Each must be resolved by the platform before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrnoName {
    BadDescriptor,
    BrokenPipe,
    Again,
    WouldBlock,
    InProgress,
    Interrupted,
    NoEntry,
}

impl ErrnoName {
    pub const ALL: [ErrnoName; 7] = [
        Self::BadDescriptor,
        Self::BrokenPipe,
        Self::Again,
        Self::WouldBlock,
        Self::InProgress,
        Self::Interrupted,
        Self::NoEntry,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadDescriptor => "EBADF",
            Self::BrokenPipe => "EPIPE",
            Self::Again => "EAGAIN",
            Self::WouldBlock => "EWOULDBLOCK",
            Self::InProgress => "EINPROGRESS",
            Self::Interrupted => "EINTR",
            Self::NoEntry => "ENOENT",
        }
    }

    /// The Linux value of this code.
    #[must_use]
    pub const fn linux_value(self) -> i32 {
        match self {
            Self::BadDescriptor => EBADF,
            Self::BrokenPipe => EPIPE,
            Self::Again => EAGAIN,
            Self::WouldBlock => EWOULDBLOCK,
            Self::InProgress => EINPROGRESS,
            Self::Interrupted => EINTR,
            Self::NoEntry => ENOENT,
        }
    }
}

/// Resolved special codes, stored negated: every comparison happens against
/// raw `-errno` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialCodes {
    bad_descriptor: isize,
    broken_pipe: isize,
    again: isize,
    would_block: isize,
    in_progress: isize,
    interrupted: isize,
    no_entry: isize,
}

impl SpecialCodes {
    /// Resolve every [`ErrnoName`] through `lookup`. A missing or
    /// non-positive code is a process-fatal configuration error.
    pub fn resolve<F>(lookup: F) -> Result<Self, PlatformError>
    where
        F: Fn(ErrnoName) -> Option<i32>,
    {
        let negated = |name: ErrnoName| -> Result<isize, PlatformError> {
            lookup(name)
                .filter(|code| *code > 0)
                .map(|code| -(code as isize))
                .ok_or(PlatformError::UnresolvedErrno {
                    name: name.as_str(),
                })
        };
        Ok(Self {
            bad_descriptor: negated(ErrnoName::BadDescriptor)?,
            broken_pipe: negated(ErrnoName::BrokenPipe)?,
            again: negated(ErrnoName::Again)?,
            would_block: negated(ErrnoName::WouldBlock)?,
            in_progress: negated(ErrnoName::InProgress)?,
            interrupted: negated(ErrnoName::Interrupted)?,
            no_entry: negated(ErrnoName::NoEntry)?,
        })
    }

    /// The Linux values, without consulting a platform.
    #[must_use]
    pub const fn linux() -> Self {
        Self {
            bad_descriptor: -(EBADF as isize),
            broken_pipe: -(EPIPE as isize),
            again: -(EAGAIN as isize),
            would_block: -(EWOULDBLOCK as isize),
            in_progress: -(EINPROGRESS as isize),
            interrupted: -(EINTR as isize),
            no_entry: -(ENOENT as isize),
        }
    }

    /// Either would-block variant (they may alias).
    #[inline]
    #[must_use]
    pub const fn is_would_block(&self, raw: isize) -> bool {
        raw == self.again || raw == self.would_block
    }

    #[inline]
    #[must_use]
    pub const fn is_broken_pipe(&self, raw: isize) -> bool {
        raw == self.broken_pipe
    }

    #[inline]
    #[must_use]
    pub const fn is_bad_descriptor(&self, raw: isize) -> bool {
        raw == self.bad_descriptor
    }

    #[inline]
    #[must_use]
    pub const fn is_in_progress(&self, raw: isize) -> bool {
        raw == self.in_progress
    }

    #[inline]
    #[must_use]
    pub const fn is_interrupted(&self, raw: isize) -> bool {
        raw == self.interrupted
    }

    #[inline]
    #[must_use]
    pub const fn is_no_entry(&self, raw: isize) -> bool {
        raw == self.no_entry
    }

    /// Positive broken-pipe code.
    #[must_use]
    pub const fn broken_pipe_code(&self) -> i32 {
        -self.broken_pipe as i32
    }

    /// Largest positive code among the resolved set.
    #[must_use]
    pub fn max_code(&self) -> i32 {
        [
            self.bad_descriptor,
            self.broken_pipe,
            self.again,
            self.would_block,
            self.in_progress,
            self.interrupted,
            self.no_entry,
        ]
        .into_iter()
        .map(|neg| -neg)
        .max()
        .unwrap_or(0) as i32
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable code → message table covering `[0, len)`.
#[derive(Debug, Clone)]
pub struct ErrnoCatalog {
    messages: Box<[String]>,
}

impl ErrnoCatalog {
    /// Build a table of `size` entries by asking `describe` for each code.
    /// Empty descriptions are replaced with the `Unknown error N` placeholder.
    pub fn build<F>(size: usize, mut describe: F) -> Self
    where
        F: FnMut(i32) -> String,
    {
        let messages = (0..size)
            .map(|i| {
                let code = i as i32;
                let msg = describe(code);
                if msg.trim().is_empty() {
                    unknown_message(code)
                } else {
                    msg
                }
            })
            .collect();
        Self { messages }
    }

    /// Message for `code`. Codes outside the table get the placeholder text.
    #[must_use]
    pub fn lookup(&self, code: i32) -> Cow<'_, str> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.messages.get(i))
            .map_or_else(|| Cow::Owned(unknown_message(code)), |m| Cow::Borrowed(m.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.messages
            .iter()
            .enumerate()
            .map(|(i, m)| (i as i32, m.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
