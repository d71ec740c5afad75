//! Non-blocking connect handshake.
//!
//! `connect` either completes synchronously (loopback targets) or reports
//! that write-readiness must be awaited, after which `finish_connect` is
//! polled. Only `EINPROGRESS` is special here: any other negative result is
//! a generic failure labelled `connect` or `getsockopt`.
//!
//! The socket must not carry data between a pending `connect` and a
//! successful `finish_connect`. [`ConnectAttempt`] tracks that on the
//! caller's side; the platform calls themselves do not enforce it.

use std::net::SocketAddr;

use crate::addr::normalize;
use crate::errno::{EALREADY, EISCONN, ENOTCONN};
use crate::error::Failure;
use crate::interpret::Op;
use crate::platform::Platform;
use crate::poll::Readiness;
use crate::sys::{RawFd, Syscall};

impl<S: Syscall> Platform<S> {
    /// Start connecting `fd` to `remote`. Returns `true` if the connection
    /// completed synchronously, `false` if it is in progress.
    pub fn connect(&self, fd: RawFd, remote: &SocketAddr) -> Result<bool, Failure> {
        let raw = self.sys().connect(fd, &normalize(remote));
        self.handshake(Op::Connect, fd, raw)
    }

    /// Poll a pending connect once `fd` is writable. Returns `true` once
    /// connected, `false` while still pending.
    pub fn finish_connect(&self, fd: RawFd) -> Result<bool, Failure> {
        let raw = self.sys().finish_connect(fd);
        self.handshake(Op::FinishConnect, fd, raw)
    }

    fn handshake(&self, op: Op, fd: RawFd, raw: isize) -> Result<bool, Failure> {
        if raw >= 0 {
            return Ok(true);
        }
        if self.codes().is_in_progress(raw) {
            return Ok(false);
        }
        Err(self.generic(op, fd, raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectState {
    Idle,
    Pending,
    Connected,
}

/// Caller-side record of one connect handshake on one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectAttempt {
    fd: RawFd,
    state: ConnectState,
}

impl ConnectAttempt {
    #[must_use]
    pub const fn new(fd: RawFd) -> Self {
        Self {
            fd,
            state: ConnectState::Idle,
        }
    }

    #[must_use]
    pub const fn fd(&self) -> RawFd {
        self.fd
    }

    #[must_use]
    pub const fn state(&self) -> ConnectState {
        self.state
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.state, ConnectState::Connected)
    }

    /// Interest to register while the handshake is outstanding.
    #[must_use]
    pub const fn interest(&self) -> Option<Readiness> {
        match self.state {
            ConnectState::Pending => Some(Readiness::WRITABLE),
            ConnectState::Idle | ConnectState::Connected => None,
        }
    }

    /// Issue the connect. Only valid from `Idle`.
    pub fn start<S: Syscall>(
        &mut self,
        platform: &Platform<S>,
        remote: &SocketAddr,
    ) -> Result<ConnectState, Failure> {
        match self.state {
            ConnectState::Idle => {}
            ConnectState::Pending => {
                return Err(platform.failure_for_code(Op::Connect, self.fd, EALREADY));
            }
            ConnectState::Connected => {
                return Err(platform.failure_for_code(Op::Connect, self.fd, EISCONN));
            }
        }
        self.state = if platform.connect(self.fd, remote)? {
            ConnectState::Connected
        } else {
            ConnectState::Pending
        };
        Ok(self.state)
    }

    /// Check a pending handshake after write-readiness fired. Polling an
    /// already connected attempt is a no-op.
    pub fn poll<S: Syscall>(&mut self, platform: &Platform<S>) -> Result<ConnectState, Failure> {
        match self.state {
            ConnectState::Idle => Err(platform.failure_for_code(Op::FinishConnect, self.fd, ENOTCONN)),
            ConnectState::Connected => Ok(ConnectState::Connected),
            ConnectState::Pending => {
                if platform.finish_connect(self.fd)? {
                    self.state = ConnectState::Connected;
                }
                Ok(self.state)
            }
        }
    }
}
