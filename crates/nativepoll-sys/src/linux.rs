//! `libc`-backed [`Syscall`] implementation.

use std::cell::RefCell;
use std::ffi::{CStr, c_int, c_void};
use std::io::IoSlice;
use std::mem;
use std::ptr;

use nativepoll_core::socket::shutdown_how;
use nativepoll_core::{
    CtlOp, DatagramPacket, Endpoint, ErrnoName, RawEvent, RawFd, Readiness, SocketOption, Syscall,
};

use crate::sockaddr::{SOCKADDR_IN6_LEN, SOCKADDR_STORAGE_LEN, from_storage, to_sockaddr_in6, zeroed_storage};

/// Kernel per-call vector limit (`UIO_MAXIOV` in `linux/uio.h`).
const UIO_MAXIOV: isize = 1024;

thread_local! {
    // Reused across waits so a busy loop does not allocate per call.
    static EVENT_SCRATCH: RefCell<Vec<libc::epoll_event>> = const { RefCell::new(Vec::new()) };
}

#[inline]
fn last_host_errno() -> c_int {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EINVAL)
}

/// `-errno` on a `-1` return, the value otherwise.
#[inline]
fn cvt(rc: c_int) -> isize {
    if rc < 0 {
        -(last_host_errno() as isize)
    } else {
        rc as isize
    }
}

#[inline]
fn cvt_size(rc: libc::ssize_t) -> isize {
    if rc < 0 {
        -(last_host_errno() as isize)
    } else {
        rc
    }
}

fn uname() -> Option<libc::utsname> {
    // SAFETY: utsname is plain old data; uname only writes into it.
    let mut uts: libc::utsname = unsafe { mem::zeroed() };
    // SAFETY: `uts` is a valid, writable utsname.
    if unsafe { libc::uname(&mut uts) } != 0 {
        return None;
    }
    Some(uts)
}

fn field(raw: &[libc::c_char]) -> String {
    // SAFETY: uname NUL-terminates every field within its array.
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// `(level, name)` for every option except linger, which has its own layout.
fn option_key(option: SocketOption) -> (c_int, c_int) {
    match option {
        SocketOption::ReceiveBufferSize => (libc::SOL_SOCKET, libc::SO_RCVBUF),
        SocketOption::SendBufferSize => (libc::SOL_SOCKET, libc::SO_SNDBUF),
        SocketOption::KeepAlive => (libc::SOL_SOCKET, libc::SO_KEEPALIVE),
        SocketOption::ReuseAddress => (libc::SOL_SOCKET, libc::SO_REUSEADDR),
        SocketOption::ReusePort => (libc::SOL_SOCKET, libc::SO_REUSEPORT),
        SocketOption::Broadcast => (libc::SOL_SOCKET, libc::SO_BROADCAST),
        SocketOption::Linger => (libc::SOL_SOCKET, libc::SO_LINGER),
        SocketOption::TcpNoDelay => (libc::IPPROTO_TCP, libc::TCP_NODELAY),
        SocketOption::TcpCork => (libc::IPPROTO_TCP, libc::TCP_CORK),
        SocketOption::TcpKeepIdle => (libc::IPPROTO_TCP, libc::TCP_KEEPIDLE),
        SocketOption::TcpKeepInterval => (libc::IPPROTO_TCP, libc::TCP_KEEPINTVL),
        SocketOption::TcpKeepCount => (libc::IPPROTO_TCP, libc::TCP_KEEPCNT),
        // IPv4 peers of a dual-stack socket only honour IP_TOS
        SocketOption::TrafficClass => (libc::IPPROTO_IP, libc::IP_TOS),
    }
}

fn getsockopt_raw<T>(fd: RawFd, level: c_int, name: c_int, value: &mut T) -> isize {
    let mut len = mem::size_of::<T>() as libc::socklen_t;
    // SAFETY: `value` is a valid, writable T and `len` is its size.
    cvt(unsafe { libc::getsockopt(fd, level, name, (value as *mut T).cast::<c_void>(), &mut len) })
}

fn setsockopt_raw<T>(fd: RawFd, level: c_int, name: c_int, value: &T) -> isize {
    let len = mem::size_of::<T>() as libc::socklen_t;
    // SAFETY: `value` is a valid T and `len` is its size.
    cvt(unsafe { libc::setsockopt(fd, level, name, (value as *const T).cast::<c_void>(), len) })
}

/// The host kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxSyscalls;

impl LinuxSyscalls {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn open_socket(&self, kind: c_int) -> isize {
        // SAFETY: plain syscall with constant arguments.
        let fd = cvt(unsafe {
            libc::socket(libc::AF_INET6, kind | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0)
        });
        if fd < 0 {
            return fd;
        }
        let fd = fd as RawFd;
        let dual_stack: c_int = 0;
        let rc = setsockopt_raw(fd, libc::IPPROTO_IPV6, libc::IPV6_V6ONLY, &dual_stack);
        if rc < 0 {
            // SAFETY: `fd` was just opened and is owned here.
            unsafe { libc::close(fd) };
            return rc;
        }
        fd as isize
    }

    fn address(&self, fd: RawFd, out: &mut Endpoint, peer: bool) -> isize {
        let mut storage = zeroed_storage();
        let mut len = SOCKADDR_STORAGE_LEN;
        let addr = (&mut storage as *mut libc::sockaddr_storage).cast::<libc::sockaddr>();
        // SAFETY: `storage` is writable for `len` bytes.
        let rc = cvt(unsafe {
            if peer {
                libc::getpeername(fd, addr, &mut len)
            } else {
                libc::getsockname(fd, addr, &mut len)
            }
        });
        if rc == -(libc::ENOTCONN as isize) {
            return 0;
        }
        if rc < 0 {
            return rc;
        }
        match from_storage(&storage) {
            // an unbound socket reports the wildcard with port 0
            Some(ep) if ep.port == 0 && ep.address == [0u8; 16] => 0,
            Some(ep) => {
                *out = ep;
                1
            }
            None => 0,
        }
    }
}

impl Syscall for LinuxSyscalls {
    fn os_name(&self) -> String {
        uname().map_or_else(String::new, |u| field(&u.sysname))
    }

    fn errno_value(&self, name: ErrnoName) -> Option<i32> {
        Some(match name {
            ErrnoName::BadDescriptor => libc::EBADF,
            ErrnoName::BrokenPipe => libc::EPIPE,
            ErrnoName::Again => libc::EAGAIN,
            ErrnoName::WouldBlock => libc::EWOULDBLOCK,
            ErrnoName::InProgress => libc::EINPROGRESS,
            ErrnoName::Interrupted => libc::EINTR,
            ErrnoName::NoEntry => libc::ENOENT,
        })
    }

    fn strerror(&self, code: i32) -> String {
        let text = std::io::Error::from_raw_os_error(code).to_string();
        let suffix = format!(" (os error {code})");
        match text.strip_suffix(&suffix) {
            Some(message) => message.to_string(),
            None => text,
        }
    }

    fn kernel_version(&self) -> String {
        uname().map_or_else(String::new, |u| field(&u.release))
    }

    fn iov_max(&self) -> isize {
        // SAFETY: sysconf has no memory-safety preconditions.
        unsafe { libc::sysconf(libc::_SC_IOV_MAX) as isize }
    }

    fn uio_max_iov(&self) -> isize {
        UIO_MAXIOV
    }

    fn supports_sendmmsg(&self) -> bool {
        // SAFETY: an empty batch on an invalid descriptor touches no memory.
        let rc = unsafe { libc::sendmmsg(-1, ptr::null_mut(), 0, 0) };
        !(rc < 0 && last_host_errno() == libc::ENOSYS)
    }

    fn epoll_create(&self) -> isize {
        // SAFETY: plain syscall with constant arguments.
        cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })
    }

    fn epoll_wait(&self, epfd: RawFd, events: &mut [RawEvent], timeout_ms: i32) -> isize {
        EVENT_SCRATCH.with(|scratch| {
            let mut scratch = scratch.borrow_mut();
            scratch.resize(events.len(), libc::epoll_event { events: 0, u64: 0 });
            let max = c_int::try_from(scratch.len()).unwrap_or(c_int::MAX);
            // SAFETY: `scratch` holds at least `max` writable epoll_event slots.
            let n = cvt(unsafe { libc::epoll_wait(epfd, scratch.as_mut_ptr(), max, timeout_ms) });
            if n > 0 {
                for (slot, ev) in events.iter_mut().zip(scratch.iter().take(n as usize)) {
                    // copy out of the packed struct before use
                    let (mask, data) = (ev.events, ev.u64);
                    *slot = RawEvent { events: mask, data };
                }
            }
            n
        })
    }

    fn epoll_ctl(&self, epfd: RawFd, op: CtlOp, fd: RawFd, interest: Readiness, data: u64) -> isize {
        let op = match op {
            CtlOp::Add => libc::EPOLL_CTL_ADD,
            CtlOp::Modify => libc::EPOLL_CTL_MOD,
            CtlOp::Delete => libc::EPOLL_CTL_DEL,
        };
        let mut event = libc::epoll_event {
            events: interest.to_epoll(),
            u64: data,
        };
        // SAFETY: `event` is a valid epoll_event; kernels before 2.6.9 need
        // it even for delete.
        cvt(unsafe { libc::epoll_ctl(epfd, op, fd, &mut event) })
    }

    fn eventfd(&self) -> isize {
        // SAFETY: plain syscall with constant arguments.
        cvt(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) })
    }

    fn eventfd_write(&self, fd: RawFd, value: u64) -> isize {
        // SAFETY: writes exactly the 8 bytes of `value`.
        cvt_size(unsafe { libc::write(fd, (&value as *const u64).cast::<c_void>(), 8) })
    }

    fn eventfd_read(&self, fd: RawFd, value: &mut u64) -> isize {
        // SAFETY: reads at most 8 bytes into `value`.
        cvt_size(unsafe { libc::read(fd, (value as *mut u64).cast::<c_void>(), 8) })
    }

    fn socket_stream(&self) -> isize {
        self.open_socket(libc::SOCK_STREAM)
    }

    fn socket_dgram(&self) -> isize {
        self.open_socket(libc::SOCK_DGRAM)
    }

    fn bind(&self, fd: RawFd, local: &Endpoint) -> isize {
        let sa = to_sockaddr_in6(local);
        // SAFETY: `sa` is a valid sockaddr_in6 of the stated length.
        cvt(unsafe {
            libc::bind(fd, (&sa as *const libc::sockaddr_in6).cast(), SOCKADDR_IN6_LEN)
        })
    }

    fn listen(&self, fd: RawFd, backlog: i32) -> isize {
        // SAFETY: plain syscall.
        cvt(unsafe { libc::listen(fd, backlog) })
    }

    fn connect(&self, fd: RawFd, remote: &Endpoint) -> isize {
        let sa = to_sockaddr_in6(remote);
        // SAFETY: `sa` is a valid sockaddr_in6 of the stated length.
        cvt(unsafe {
            libc::connect(fd, (&sa as *const libc::sockaddr_in6).cast(), SOCKADDR_IN6_LEN)
        })
    }

    fn finish_connect(&self, fd: RawFd) -> isize {
        let mut pending: c_int = 0;
        let rc = getsockopt_raw(fd, libc::SOL_SOCKET, libc::SO_ERROR, &mut pending);
        if rc < 0 {
            return rc;
        }
        if pending != 0 {
            return -(pending as isize);
        }
        let mut storage = zeroed_storage();
        let mut len = SOCKADDR_STORAGE_LEN;
        // SAFETY: `storage` is writable for `len` bytes.
        let rc = cvt(unsafe {
            libc::getpeername(
                fd,
                (&mut storage as *mut libc::sockaddr_storage).cast(),
                &mut len,
            )
        });
        if rc == -(libc::ENOTCONN as isize) {
            return -(libc::EINPROGRESS as isize);
        }
        rc.min(0)
    }

    fn accept(&self, fd: RawFd) -> isize {
        // SAFETY: null address pointers are allowed when the peer is not wanted.
        cvt(unsafe {
            libc::accept4(
                fd,
                ptr::null_mut(),
                ptr::null_mut(),
                libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            )
        })
    }

    fn shutdown(&self, fd: RawFd, read: bool, write: bool) -> isize {
        let Some(how) = shutdown_how(read, write) else {
            return 0;
        };
        // SAFETY: plain syscall.
        cvt(unsafe { libc::shutdown(fd, how) })
    }

    fn close(&self, fd: RawFd) -> isize {
        // SAFETY: closing an arbitrary descriptor number is memory-safe.
        cvt(unsafe { libc::close(fd) })
    }

    fn local_address(&self, fd: RawFd, out: &mut Endpoint) -> isize {
        self.address(fd, out, false)
    }

    fn remote_address(&self, fd: RawFd, out: &mut Endpoint) -> isize {
        self.address(fd, out, true)
    }

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> isize {
        // SAFETY: `buf` is writable for its length.
        cvt_size(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn write(&self, fd: RawFd, buf: &[u8]) -> isize {
        // SAFETY: `buf` is readable for its length.
        cvt_size(unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) })
    }

    fn writev(&self, fd: RawFd, bufs: &[IoSlice<'_>]) -> isize {
        let count = c_int::try_from(bufs.len()).unwrap_or(c_int::MAX);
        // SAFETY: IoSlice is ABI-compatible with iovec on Unix.
        cvt_size(unsafe { libc::writev(fd, bufs.as_ptr().cast::<libc::iovec>(), count) })
    }

    fn sendfile(&self, out_fd: RawFd, in_fd: RawFd, offset: i64, len: usize) -> isize {
        let mut off = offset as libc::off_t;
        // SAFETY: `off` is a valid, writable offset.
        cvt_size(unsafe { libc::sendfile(out_fd, in_fd, &mut off, len) })
    }

    fn sendto(&self, fd: RawFd, buf: &[u8], remote: &Endpoint) -> isize {
        let sa = to_sockaddr_in6(remote);
        // SAFETY: `buf` and `sa` are valid for their stated lengths.
        cvt_size(unsafe {
            libc::sendto(
                fd,
                buf.as_ptr().cast(),
                buf.len(),
                0,
                (&sa as *const libc::sockaddr_in6).cast(),
                SOCKADDR_IN6_LEN,
            )
        })
    }

    fn sendmsg(&self, fd: RawFd, bufs: &[IoSlice<'_>], remote: &Endpoint) -> isize {
        let mut sa = to_sockaddr_in6(remote);
        // SAFETY: msghdr is plain old data; all-zero is a valid value.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_name = (&mut sa as *mut libc::sockaddr_in6).cast();
        msg.msg_namelen = SOCKADDR_IN6_LEN;
        msg.msg_iov = bufs.as_ptr().cast::<libc::iovec>().cast_mut();
        msg.msg_iovlen = bufs.len() as _;
        // SAFETY: every pointer in `msg` outlives the call; the kernel does
        // not write through msg_iov on send.
        cvt_size(unsafe { libc::sendmsg(fd, &msg, 0) })
    }

    fn sendmmsg(&self, fd: RawFd, packets: &[DatagramPacket<'_>]) -> isize {
        let mut names: Vec<libc::sockaddr_in6> =
            packets.iter().map(|p| to_sockaddr_in6(&p.recipient)).collect();
        let mut iovs: Vec<libc::iovec> = packets
            .iter()
            .map(|p| libc::iovec {
                iov_base: p.data.as_ptr().cast_mut().cast(),
                iov_len: p.data.len(),
            })
            .collect();
        let mut msgs: Vec<libc::mmsghdr> = names
            .iter_mut()
            .zip(iovs.iter_mut())
            .map(|(name, iov)| {
                // SAFETY: mmsghdr is plain old data; all-zero is a valid value.
                let mut m: libc::mmsghdr = unsafe { mem::zeroed() };
                m.msg_hdr.msg_name = (name as *mut libc::sockaddr_in6).cast();
                m.msg_hdr.msg_namelen = SOCKADDR_IN6_LEN;
                m.msg_hdr.msg_iov = iov;
                m.msg_hdr.msg_iovlen = 1;
                m
            })
            .collect();
        let vlen = libc::c_uint::try_from(msgs.len()).unwrap_or(libc::c_uint::MAX);
        // SAFETY: `msgs` points into `names` and `iovs`, which outlive the call.
        cvt(unsafe { libc::sendmmsg(fd, msgs.as_mut_ptr(), vlen, 0) })
    }

    fn recvfrom(&self, fd: RawFd, buf: &mut [u8], sender: &mut Endpoint) -> isize {
        let mut storage = zeroed_storage();
        let mut len = SOCKADDR_STORAGE_LEN;
        // SAFETY: `buf` and `storage` are writable for their stated lengths.
        let n = cvt_size(unsafe {
            libc::recvfrom(
                fd,
                buf.as_mut_ptr().cast(),
                buf.len(),
                0,
                (&mut storage as *mut libc::sockaddr_storage).cast(),
                &mut len,
            )
        });
        if n >= 0 {
            if let Some(ep) = from_storage(&storage) {
                *sender = ep;
            }
        }
        n
    }

    fn get_option(&self, fd: RawFd, option: SocketOption, value: &mut i32) -> isize {
        let (level, name) = option_key(option);
        if option == SocketOption::Linger {
            let mut linger = libc::linger {
                l_onoff: 0,
                l_linger: 0,
            };
            let rc = getsockopt_raw(fd, level, name, &mut linger);
            if rc >= 0 {
                *value = if linger.l_onoff == 0 { -1 } else { linger.l_linger };
            }
            return rc;
        }
        let mut raw: c_int = 0;
        let rc = getsockopt_raw(fd, level, name, &mut raw);
        if rc >= 0 {
            *value = raw;
        }
        rc
    }

    fn set_option(&self, fd: RawFd, option: SocketOption, value: i32) -> isize {
        let (level, name) = option_key(option);
        if option == SocketOption::Linger {
            let linger = libc::linger {
                l_onoff: c_int::from(value >= 0),
                l_linger: value.max(0),
            };
            return setsockopt_raw(fd, level, name, &linger);
        }
        let rc = setsockopt_raw(fd, level, name, &value);
        if rc >= 0 && option == SocketOption::TrafficClass {
            // native IPv6 peers read IPV6_TCLASS
            let _ = setsockopt_raw(fd, libc::IPPROTO_IPV6, libc::IPV6_TCLASS, &value);
        }
        rc
    }
}
