//! Socket lifecycle and data transfer.
//!
//! Data-transfer calls go through the full result interpreter and report
//! [`Progress`]. Lifecycle calls are classified structurally: `EBADF`
//! becomes `ClosedResource`, anything else a generic failure.

use std::io::IoSlice;
use std::net::SocketAddr;

use crate::addr::{Endpoint, normalize};
use crate::errno::EINVAL;
use crate::error::Failure;
use crate::interpret::{Op, Progress};
use crate::platform::Platform;
use crate::sys::{DatagramPacket, RawFd, Syscall};

// ---------------------------------------------------------------------------
// Shutdown modes
// ---------------------------------------------------------------------------

/// Shut down the reading side.
pub const SHUT_RD: i32 = 0;
/// Shut down the writing side.
pub const SHUT_WR: i32 = 1;
/// Shut down both reading and writing.
pub const SHUT_RDWR: i32 = 2;

/// Maximum listen backlog.
pub const SOMAXCONN: i32 = 4096;

/// The `how` argument for a half-close, or `None` when neither side closes.
#[inline]
#[must_use]
pub const fn shutdown_how(read: bool, write: bool) -> Option<i32> {
    match (read, write) {
        (true, true) => Some(SHUT_RDWR),
        (true, false) => Some(SHUT_RD),
        (false, true) => Some(SHUT_WR),
        (false, false) => None,
    }
}

/// Clamps `backlog` into the range `[0, SOMAXCONN]`.
#[inline]
#[must_use]
pub fn valid_backlog(backlog: i32) -> i32 {
    backlog.clamp(0, SOMAXCONN)
}

/// A received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram {
    pub len: usize,
    pub sender: SocketAddr,
}

impl<S: Syscall> Platform<S> {
    // -- lifecycle ------------------------------------------------------------

    /// Non-blocking dual-stack stream socket.
    pub fn socket_stream(&self) -> Result<RawFd, Failure> {
        let raw = self.sys().socket_stream();
        self.structural(Op::Socket, -1, raw).map(|fd| fd as RawFd)
    }

    /// Non-blocking dual-stack datagram socket.
    pub fn socket_dgram(&self) -> Result<RawFd, Failure> {
        let raw = self.sys().socket_dgram();
        self.structural(Op::Socket, -1, raw).map(|fd| fd as RawFd)
    }

    pub fn bind(&self, fd: RawFd, local: &SocketAddr) -> Result<(), Failure> {
        let raw = self.sys().bind(fd, &normalize(local));
        self.structural(Op::Bind, fd, raw).map(|_| ())
    }

    /// Listen with `backlog` clamped to `[0, SOMAXCONN]`.
    pub fn listen(&self, fd: RawFd, backlog: i32) -> Result<(), Failure> {
        let raw = self.sys().listen(fd, valid_backlog(backlog));
        self.structural(Op::Listen, fd, raw).map(|_| ())
    }

    /// Accept one pending connection. `None` means no connection is waiting,
    /// which is the listener's normal quiescent state.
    pub fn accept(&self, fd: RawFd) -> Result<Option<RawFd>, Failure> {
        let raw = self.sys().accept(fd);
        if self.codes().is_would_block(raw) {
            return Ok(None);
        }
        self.structural(Op::Accept, fd, raw)
            .map(|child| Some(child as RawFd))
    }

    /// Half-close. Closing neither side issues no call.
    pub fn shutdown(&self, fd: RawFd, read: bool, write: bool) -> Result<(), Failure> {
        if shutdown_how(read, write).is_none() {
            return Ok(());
        }
        let raw = self.sys().shutdown(fd, read, write);
        self.structural(Op::Shutdown, fd, raw).map(|_| ())
    }

    /// Close `fd`. Closing it again surfaces `ClosedResource`.
    pub fn close(&self, fd: RawFd) -> Result<(), Failure> {
        if fd < 0 {
            return Err(self.closed(Op::Close, fd));
        }
        let raw = self.sys().close(fd);
        self.structural(Op::Close, fd, raw).map(|_| ())
    }

    /// Bound address, or `None` if the socket is unbound.
    pub fn local_address(&self, fd: RawFd) -> Result<Option<SocketAddr>, Failure> {
        let mut out = Endpoint::default();
        let raw = self.sys().local_address(fd, &mut out);
        let filled = self.structural(Op::GetSockName, fd, raw)?;
        Ok((filled > 0).then(|| out.to_socket_addr()))
    }

    /// Peer address, or `None` if the socket is not connected.
    pub fn remote_address(&self, fd: RawFd) -> Result<Option<SocketAddr>, Failure> {
        let mut out = Endpoint::default();
        let raw = self.sys().remote_address(fd, &mut out);
        let filled = self.structural(Op::GetPeerName, fd, raw)?;
        Ok((filled > 0).then(|| out.to_socket_addr()))
    }

    // -- data transfer --------------------------------------------------------

    /// Read into `buf`. A zero-byte result means the peer closed its side.
    pub fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<Progress, Failure> {
        let raw = self.sys().read(fd, buf);
        self.read_progress(Op::Read, fd, raw)
    }

    pub fn write(&self, fd: RawFd, buf: &[u8]) -> Result<Progress, Failure> {
        let raw = self.sys().write(fd, buf);
        self.io(Op::Write, fd, raw)
    }

    /// Gathering write of at most `IOV_MAX` slices; excess slices are left
    /// for the next call and the reported progress covers only what was sent.
    pub fn writev(&self, fd: RawFd, bufs: &[IoSlice<'_>]) -> Result<Progress, Failure> {
        let bufs = &bufs[..bufs.len().min(self.info().iov_max)];
        let raw = self.sys().writev(fd, bufs);
        self.io(Op::Writev, fd, raw)
    }

    /// Send `len` bytes of `file_fd` starting at `base_offset + offset`.
    pub fn sendfile(
        &self,
        out_fd: RawFd,
        file_fd: RawFd,
        base_offset: i64,
        offset: i64,
        len: usize,
    ) -> Result<Progress, Failure> {
        let Some(position) = base_offset.checked_add(offset).filter(|p| *p >= 0) else {
            return Err(self.failure_for_code(Op::Sendfile, out_fd, EINVAL));
        };
        let raw = self.sys().sendfile(out_fd, file_fd, position, len);
        self.io(Op::Sendfile, out_fd, raw)
    }

    pub fn sendto(&self, fd: RawFd, buf: &[u8], remote: &SocketAddr) -> Result<Progress, Failure> {
        let raw = self.sys().sendto(fd, buf, &normalize(remote));
        self.io(Op::SendTo, fd, raw)
    }

    /// One datagram gathered from `bufs`, sent to `remote`.
    pub fn sendmsg(
        &self,
        fd: RawFd,
        bufs: &[IoSlice<'_>],
        remote: &SocketAddr,
    ) -> Result<Progress, Failure> {
        let bufs = &bufs[..bufs.len().min(self.info().iov_max)];
        let raw = self.sys().sendmsg(fd, bufs, &normalize(remote));
        self.io(Op::SendMsg, fd, raw)
    }

    /// Batched datagram send. Progress counts packets, not bytes.
    pub fn sendmmsg(&self, fd: RawFd, packets: &[DatagramPacket<'_>]) -> Result<Progress, Failure> {
        if packets.is_empty() {
            return Ok(Progress::Done(0));
        }
        let packets = &packets[..packets.len().min(self.info().uio_max_iov)];
        let raw = self.sys().sendmmsg(fd, packets);
        self.io(Op::SendMmsg, fd, raw)
    }

    /// Receive one datagram into `buf`. `None` when nothing is queued.
    pub fn recvfrom(&self, fd: RawFd, buf: &mut [u8]) -> Result<Option<Datagram>, Failure> {
        let mut sender = Endpoint::default();
        let raw = self.sys().recvfrom(fd, buf, &mut sender);
        match self.io(Op::RecvFrom, fd, raw)? {
            Progress::Done(len) => Ok(Some(Datagram {
                len,
                sender: sender.to_socket_addr(),
            })),
            Progress::WouldBlock | Progress::Eof => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
