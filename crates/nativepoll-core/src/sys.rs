//! The native capability boundary.
//!
//! [`Syscall`] has one method per native operation. Unless a method says
//! otherwise it returns the raw signed convention: non-negative on success,
//! `-errno` on failure. Implementations never classify; that is the job of
//! [`Interpreter`](crate::Interpreter).
//!
//! Descriptors are created non-blocking and close-on-exec. Stream and
//! datagram sockets are dual-stack IPv6 sockets, so every address travels as
//! a normalized [`Endpoint`].

use std::io::IoSlice;

use crate::addr::Endpoint;
use crate::errno::ErrnoName;
use crate::poll::{RawEvent, Readiness};
use crate::sockopt::SocketOption;

/// Raw descriptor number.
pub type RawFd = i32;

/// Kind of registration change passed to `epoll_ctl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CtlOp {
    Add,
    Modify,
    Delete,
}

/// One datagram of a batched send.
#[derive(Debug, Clone, Copy)]
pub struct DatagramPacket<'a> {
    pub data: &'a [u8],
    pub recipient: Endpoint,
}

pub trait Syscall: Send + Sync {
    // -- process facts --------------------------------------------------------

    /// Name of the host operating system, e.g. `linux`.
    fn os_name(&self) -> String;

    /// Platform value of a special errno, or `None` if it cannot be resolved.
    fn errno_value(&self, name: ErrnoName) -> Option<i32>;

    /// Canonical short description of `code`. Undefined codes yield the
    /// platform's placeholder text.
    fn strerror(&self, code: i32) -> String;

    fn kernel_version(&self) -> String;

    /// `IOV_MAX`, or a non-positive value if the platform does not say.
    fn iov_max(&self) -> isize;

    /// `UIO_MAXIOV`, the kernel's per-call vector limit.
    fn uio_max_iov(&self) -> isize;

    fn supports_sendmmsg(&self) -> bool;

    // -- readiness ------------------------------------------------------------

    fn epoll_create(&self) -> isize;

    /// Fills `events` and returns how many are ready. `timeout_ms` is -1 to
    /// block indefinitely, 0 to poll.
    fn epoll_wait(&self, epfd: RawFd, events: &mut [RawEvent], timeout_ms: i32) -> isize;

    /// Registration change. `interest` and `data` are ignored for `Delete`.
    fn epoll_ctl(&self, epfd: RawFd, op: CtlOp, fd: RawFd, interest: Readiness, data: u64)
    -> isize;

    fn eventfd(&self) -> isize;

    fn eventfd_write(&self, fd: RawFd, value: u64) -> isize;

    /// Drains the counter into `value`.
    fn eventfd_read(&self, fd: RawFd, value: &mut u64) -> isize;

    // -- socket lifecycle -----------------------------------------------------

    fn socket_stream(&self) -> isize;

    fn socket_dgram(&self) -> isize;

    fn bind(&self, fd: RawFd, local: &Endpoint) -> isize;

    fn listen(&self, fd: RawFd, backlog: i32) -> isize;

    fn connect(&self, fd: RawFd, remote: &Endpoint) -> isize;

    /// Completion check of a pending connect: `0` once connected,
    /// `-EINPROGRESS` while pending, the socket's pending error otherwise.
    fn finish_connect(&self, fd: RawFd) -> isize;

    fn accept(&self, fd: RawFd) -> isize;

    fn shutdown(&self, fd: RawFd, read: bool, write: bool) -> isize;

    fn close(&self, fd: RawFd) -> isize;

    /// `1` when `out` was filled, `0` when the socket has no local address.
    fn local_address(&self, fd: RawFd, out: &mut Endpoint) -> isize;

    /// `1` when `out` was filled, `0` when the socket is not connected.
    fn remote_address(&self, fd: RawFd, out: &mut Endpoint) -> isize;

    // -- data transfer --------------------------------------------------------

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> isize;

    fn write(&self, fd: RawFd, buf: &[u8]) -> isize;

    fn writev(&self, fd: RawFd, bufs: &[IoSlice<'_>]) -> isize;

    fn sendfile(&self, out_fd: RawFd, in_fd: RawFd, offset: i64, len: usize) -> isize;

    fn sendto(&self, fd: RawFd, buf: &[u8], remote: &Endpoint) -> isize;

    /// Vectored send of one datagram to `remote`.
    fn sendmsg(&self, fd: RawFd, bufs: &[IoSlice<'_>], remote: &Endpoint) -> isize;

    /// Batched send; returns the number of packets sent.
    fn sendmmsg(&self, fd: RawFd, packets: &[DatagramPacket<'_>]) -> isize;

    fn recvfrom(&self, fd: RawFd, buf: &mut [u8], sender: &mut Endpoint) -> isize;

    // -- options --------------------------------------------------------------

    fn get_option(&self, fd: RawFd, option: SocketOption, value: &mut i32) -> isize;

    fn set_option(&self, fd: RawFd, option: SocketOption, value: i32) -> isize;
}
