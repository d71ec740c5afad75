//! Syscall result interpretation.
//!
//! Every native call returns `isize`: non-negative means success (usually a
//! byte count), negative means `-errno`. The [`Interpreter`] classifies such
//! a value exactly once:
//!
//! | raw result                    | outcome                              |
//! |-------------------------------|--------------------------------------|
//! | `>= 0`                        | `Progress::Done(raw)`                |
//! | `-EAGAIN` / `-EWOULDBLOCK`    | `Progress::WouldBlock`               |
//! | `-EPIPE` (data-transfer op)   | `Failure::ConnectionReset { op }`    |
//! | `-EBADF`                      | `Failure::ClosedResource`            |
//! | anything else                 | `Failure::Io { op, code, message }`  |
//!
//! Reads additionally map a raw `0` to [`Progress::Eof`].

use std::fmt;

use crate::errno::{ErrnoCatalog, SpecialCodes};
use crate::error::Failure;

/// Label of the native operation a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Read,
    Write,
    Writev,
    Sendfile,
    SendTo,
    SendMsg,
    SendMmsg,
    RecvFrom,
    Socket,
    Bind,
    Listen,
    Connect,
    /// Completion check of a pending connect, reported as `getsockopt`.
    FinishConnect,
    Accept,
    Shutdown,
    Close,
    GetSockName,
    GetPeerName,
    GetSockOpt,
    SetSockOpt,
    EpollCreate,
    EpollCtl,
    EpollWait,
    EventFd,
    EventFdWrite,
    EventFdRead,
}

impl Op {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Writev => "writev",
            Self::Sendfile => "sendfile",
            Self::SendTo => "sendto",
            Self::SendMsg => "sendmsg",
            Self::SendMmsg => "sendmmsg",
            Self::RecvFrom => "recvfrom",
            Self::Socket => "socket",
            Self::Bind => "bind",
            Self::Listen => "listen",
            Self::Connect => "connect",
            Self::FinishConnect | Self::GetSockOpt => "getsockopt",
            Self::Accept => "accept",
            Self::Shutdown => "shutdown",
            Self::Close => "close",
            Self::GetSockName => "getsockname",
            Self::GetPeerName => "getpeername",
            Self::SetSockOpt => "setsockopt",
            Self::EpollCreate => "epoll_create",
            Self::EpollCtl => "epoll_ctl",
            Self::EpollWait => "epoll_wait",
            Self::EventFd => "eventfd",
            Self::EventFdWrite => "eventfd_write",
            Self::EventFdRead => "eventfd_read",
        }
    }

    /// Data-transfer operations that report `EPIPE` as a connection reset.
    #[must_use]
    pub const fn resets_connection(self) -> bool {
        matches!(
            self,
            Self::Read
                | Self::Write
                | Self::Writev
                | Self::Sendfile
                | Self::SendTo
                | Self::SendMsg
                | Self::SendMmsg
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Successful outcome of a data-transfer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The call moved this many units (bytes, or packets for `sendmmsg`).
    Done(usize),
    /// Nothing could be moved now; retry after the next readiness event.
    WouldBlock,
    /// The peer closed its side (reads only).
    Eof,
}

impl Progress {
    /// Units moved, with would-block and end-of-stream counting as zero.
    #[inline]
    #[must_use]
    pub const fn units(self) -> usize {
        match self {
            Self::Done(n) => n,
            Self::WouldBlock | Self::Eof => 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_would_block(self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    #[inline]
    #[must_use]
    pub const fn is_eof(self) -> bool {
        matches!(self, Self::Eof)
    }
}

/// Classifies raw results using the resolved special codes and the catalog.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'a> {
    codes: &'a SpecialCodes,
    catalog: &'a ErrnoCatalog,
}

impl<'a> Interpreter<'a> {
    #[must_use]
    pub const fn new(codes: &'a SpecialCodes, catalog: &'a ErrnoCatalog) -> Self {
        Self { codes, catalog }
    }

    #[must_use]
    pub const fn codes(&self) -> &'a SpecialCodes {
        self.codes
    }

    /// Full data-transfer classification.
    pub fn io(&self, op: Op, raw: isize) -> Result<Progress, Failure> {
        if raw >= 0 {
            return Ok(Progress::Done(raw as usize));
        }
        // network stack saturated, try again later
        if self.codes.is_would_block(raw) {
            return Ok(Progress::WouldBlock);
        }
        if self.codes.is_broken_pipe(raw) && op.resets_connection() {
            return Err(Failure::reset(op));
        }
        if self.codes.is_bad_descriptor(raw) {
            return Err(Failure::ClosedResource);
        }
        Err(self.generic(op, raw))
    }

    /// Like [`Interpreter::io`], but a raw `0` means the peer closed.
    pub fn read(&self, op: Op, raw: isize) -> Result<Progress, Failure> {
        if raw == 0 {
            return Ok(Progress::Eof);
        }
        self.io(op, raw)
    }

    /// Classification for calls that are not expected to would-block
    /// (socket lifecycle, registration). Only `EBADF` is special.
    pub fn structural(&self, op: Op, raw: isize) -> Result<usize, Failure> {
        if raw >= 0 {
            return Ok(raw as usize);
        }
        if self.codes.is_bad_descriptor(raw) {
            return Err(Failure::ClosedResource);
        }
        Err(self.generic(op, raw))
    }

    /// Generic failure for a negative raw result.
    #[must_use]
    pub fn generic(&self, op: Op, raw: isize) -> Failure {
        let code = raw
            .checked_neg()
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(i32::MAX);
        self.failure_for_code(op, code)
    }

    /// Generic failure for a positive errno detected before any native call.
    #[must_use]
    pub fn failure_for_code(&self, op: Op, code: i32) -> Failure {
        Failure::Io {
            op,
            code,
            message: self.catalog.lookup(code).into_owned(),
        }
    }
}
