//! Scripted [`Syscall`] adapter for deterministic tests.
//!
//! Each operation pops the next raw result queued for its [`Op`] with
//! [`MockSyscalls::script`]. When nothing is queued it falls back to a small
//! in-memory model of a Linux host: descriptors are handed out from 3 up,
//! closing a descriptor twice yields `-EBADF`, epoll registrations are
//! tracked per instance, and eventfd keeps a counter. Calls are recorded
//! unless [`MockSyscalls::without_recording`] is set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::IoSlice;

use parking_lot::Mutex;

use crate::addr::Endpoint;
use crate::errno::{EAGAIN, EBADF, EEXIST, ENOENT, ErrnoName, linux_message, unknown_message};
use crate::interpret::Op;
use crate::poll::{RawEvent, Readiness};
use crate::sockopt::SocketOption;
use crate::sys::{CtlOp, DatagramPacket, RawFd, Syscall};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub fd: RawFd,
    /// Operation-specific argument: byte length, slice or packet count,
    /// backlog, timeout, registration id or file offset.
    pub arg: i64,
    pub endpoint: Option<Endpoint>,
}

#[derive(Debug, Default)]
struct State {
    quiet: bool,
    scripts: HashMap<Op, VecDeque<isize>>,
    calls: Vec<Call>,
    next_fd: RawFd,
    closed: HashSet<RawFd>,
    registrations: HashSet<(RawFd, RawFd)>,
    events: VecDeque<RawEvent>,
    endpoints: VecDeque<Endpoint>,
    options: HashMap<SocketOption, i32>,
    counters: HashMap<RawFd, u64>,
}

impl State {
    fn take(&mut self, op: Op) -> Option<isize> {
        self.scripts.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn record(&mut self, op: Op, fd: RawFd, arg: i64, endpoint: Option<Endpoint>) {
        if self.quiet {
            return;
        }
        self.calls.push(Call {
            op,
            fd,
            arg,
            endpoint,
        });
    }

    fn open(&mut self) -> isize {
        let fd = self.next_fd;
        self.next_fd += 1;
        fd as isize
    }

    fn is_closed(&self, fd: RawFd) -> bool {
        fd < 0 || self.closed.contains(&fd)
    }
}

fn neg(code: i32) -> isize {
    -(code as isize)
}

fn len_arg(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

#[derive(Debug)]
pub struct MockSyscalls {
    os_name: String,
    kernel_version: String,
    errno: HashMap<ErrnoName, Option<i32>>,
    iov_max: isize,
    uio_max_iov: isize,
    sendmmsg: bool,
    state: Mutex<State>,
}

impl Default for MockSyscalls {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSyscalls {
    /// A Linux host with the standard errno values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            os_name: "Linux".to_string(),
            kernel_version: "6.1.0-mock".to_string(),
            errno: HashMap::new(),
            iov_max: 1024,
            uio_max_iov: 1024,
            sendmmsg: true,
            state: Mutex::new(State {
                next_fd: 3,
                ..State::default()
            }),
        }
    }

    #[must_use]
    pub fn with_os(mut self, name: &str) -> Self {
        self.os_name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_kernel_version(mut self, version: &str) -> Self {
        self.kernel_version = version.to_string();
        self
    }

    /// Report `value` for `name` instead of the Linux value.
    #[must_use]
    pub fn with_errno(mut self, name: ErrnoName, value: i32) -> Self {
        self.errno.insert(name, Some(value));
        self
    }

    /// Make `name` unresolvable.
    #[must_use]
    pub fn without_errno(mut self, name: ErrnoName) -> Self {
        self.errno.insert(name, None);
        self
    }

    #[must_use]
    pub fn with_iov_max(mut self, n: isize) -> Self {
        self.iov_max = n;
        self
    }

    #[must_use]
    pub fn with_sendmmsg(mut self, supported: bool) -> Self {
        self.sendmmsg = supported;
        self
    }

    /// Stop recording calls, for long-running loops.
    #[must_use]
    pub fn without_recording(self) -> Self {
        self.state.lock().quiet = true;
        self
    }

    /// Queue raw results for `op`, consumed in order.
    pub fn script<I: IntoIterator<Item = isize>>(&self, op: Op, results: I) {
        self.state
            .lock()
            .scripts
            .entry(op)
            .or_default()
            .extend(results);
    }

    /// Queue an event for the next `epoll_wait`.
    pub fn push_event(&self, event: RawEvent) {
        self.state.lock().events.push_back(event);
    }

    /// Queue an address for the next `recvfrom`, `local_address` or
    /// `remote_address`.
    pub fn push_endpoint(&self, endpoint: Endpoint) {
        self.state.lock().endpoints.push_back(endpoint);
    }

    pub fn set_option_value(&self, option: SocketOption, value: i32) {
        self.state.lock().options.insert(option, value);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    #[must_use]
    pub fn calls_for(&self, op: Op) -> Vec<Call> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Scripted result, else the model's answer for `fd`.
    fn simple(&self, op: Op, fd: RawFd, arg: i64, endpoint: Option<Endpoint>, ok: isize) -> isize {
        let mut state = self.state.lock();
        state.record(op, fd, arg, endpoint);
        if let Some(raw) = state.take(op) {
            return raw;
        }
        if state.is_closed(fd) { neg(EBADF) } else { ok }
    }

    fn create(&self, op: Op) -> isize {
        let mut state = self.state.lock();
        state.record(op, -1, 0, None);
        match state.take(op) {
            Some(raw) => raw,
            None => state.open(),
        }
    }
}

impl Syscall for MockSyscalls {
    fn os_name(&self) -> String {
        self.os_name.clone()
    }

    fn errno_value(&self, name: ErrnoName) -> Option<i32> {
        self.errno
            .get(&name)
            .copied()
            .unwrap_or(Some(name.linux_value()))
    }

    fn strerror(&self, code: i32) -> String {
        linux_message(code).map_or_else(|| unknown_message(code), str::to_string)
    }

    fn kernel_version(&self) -> String {
        self.kernel_version.clone()
    }

    fn iov_max(&self) -> isize {
        self.iov_max
    }

    fn uio_max_iov(&self) -> isize {
        self.uio_max_iov
    }

    fn supports_sendmmsg(&self) -> bool {
        self.sendmmsg
    }

    fn epoll_create(&self) -> isize {
        self.create(Op::EpollCreate)
    }

    fn epoll_wait(&self, epfd: RawFd, events: &mut [RawEvent], timeout_ms: i32) -> isize {
        let mut state = self.state.lock();
        state.record(Op::EpollWait, epfd, i64::from(timeout_ms), None);
        // A scripted count is returned as-is and leaves `events` untouched.
        if let Some(raw) = state.take(Op::EpollWait) {
            return raw;
        }
        if state.is_closed(epfd) {
            return neg(EBADF);
        }
        let mut n = 0;
        for slot in events.iter_mut() {
            let Some(event) = state.events.pop_front() else {
                break;
            };
            *slot = event;
            n += 1;
        }
        n as isize
    }

    fn epoll_ctl(
        &self,
        epfd: RawFd,
        op: CtlOp,
        fd: RawFd,
        _interest: Readiness,
        data: u64,
    ) -> isize {
        let mut state = self.state.lock();
        state.record(Op::EpollCtl, fd, i64::try_from(data).unwrap_or(i64::MAX), None);
        if let Some(raw) = state.take(Op::EpollCtl) {
            return raw;
        }
        if state.is_closed(epfd) || state.is_closed(fd) {
            return neg(EBADF);
        }
        let key = (epfd, fd);
        let present = state.registrations.contains(&key);
        match op {
            CtlOp::Add if present => neg(EEXIST),
            CtlOp::Add => {
                state.registrations.insert(key);
                0
            }
            CtlOp::Modify if present => 0,
            CtlOp::Modify => neg(ENOENT),
            CtlOp::Delete => {
                if state.registrations.remove(&key) {
                    0
                } else {
                    neg(ENOENT)
                }
            }
        }
    }

    fn eventfd(&self) -> isize {
        self.create(Op::EventFd)
    }

    fn eventfd_write(&self, fd: RawFd, value: u64) -> isize {
        let mut state = self.state.lock();
        state.record(Op::EventFdWrite, fd, i64::try_from(value).unwrap_or(i64::MAX), None);
        if let Some(raw) = state.take(Op::EventFdWrite) {
            return raw;
        }
        if state.is_closed(fd) {
            return neg(EBADF);
        }
        let counter = state.counters.entry(fd).or_default();
        *counter = counter.saturating_add(value);
        8
    }

    fn eventfd_read(&self, fd: RawFd, value: &mut u64) -> isize {
        let mut state = self.state.lock();
        state.record(Op::EventFdRead, fd, 0, None);
        if let Some(raw) = state.take(Op::EventFdRead) {
            return raw;
        }
        if state.is_closed(fd) {
            return neg(EBADF);
        }
        match state.counters.remove(&fd) {
            Some(n) if n > 0 => {
                *value = n;
                8
            }
            _ => neg(EAGAIN),
        }
    }

    fn socket_stream(&self) -> isize {
        self.create(Op::Socket)
    }

    fn socket_dgram(&self) -> isize {
        self.create(Op::Socket)
    }

    fn bind(&self, fd: RawFd, local: &Endpoint) -> isize {
        self.simple(Op::Bind, fd, 0, Some(*local), 0)
    }

    fn listen(&self, fd: RawFd, backlog: i32) -> isize {
        self.simple(Op::Listen, fd, i64::from(backlog), None, 0)
    }

    fn connect(&self, fd: RawFd, remote: &Endpoint) -> isize {
        self.simple(Op::Connect, fd, 0, Some(*remote), 0)
    }

    fn finish_connect(&self, fd: RawFd) -> isize {
        self.simple(Op::FinishConnect, fd, 0, None, 0)
    }

    fn accept(&self, fd: RawFd) -> isize {
        let mut state = self.state.lock();
        state.record(Op::Accept, fd, 0, None);
        if let Some(raw) = state.take(Op::Accept) {
            return raw;
        }
        if state.is_closed(fd) {
            return neg(EBADF);
        }
        state.open()
    }

    fn shutdown(&self, fd: RawFd, read: bool, write: bool) -> isize {
        let how = i64::from(read) | (i64::from(write) << 1);
        self.simple(Op::Shutdown, fd, how, None, 0)
    }

    fn close(&self, fd: RawFd) -> isize {
        let mut state = self.state.lock();
        state.record(Op::Close, fd, 0, None);
        if let Some(raw) = state.take(Op::Close) {
            return raw;
        }
        if !state.closed.insert(fd) {
            return neg(EBADF);
        }
        state.registrations.retain(|(epfd, reg)| *epfd != fd && *reg != fd);
        state.counters.remove(&fd);
        0
    }

    fn local_address(&self, fd: RawFd, out: &mut Endpoint) -> isize {
        self.address(Op::GetSockName, fd, out)
    }

    fn remote_address(&self, fd: RawFd, out: &mut Endpoint) -> isize {
        self.address(Op::GetPeerName, fd, out)
    }

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> isize {
        self.simple(Op::Read, fd, len_arg(buf.len()), None, 0)
    }

    fn write(&self, fd: RawFd, buf: &[u8]) -> isize {
        self.simple(Op::Write, fd, len_arg(buf.len()), None, buf.len() as isize)
    }

    fn writev(&self, fd: RawFd, bufs: &[IoSlice<'_>]) -> isize {
        let total: usize = bufs.iter().map(|b| b.len()).sum();
        self.simple(Op::Writev, fd, len_arg(bufs.len()), None, total as isize)
    }

    fn sendfile(&self, out_fd: RawFd, _in_fd: RawFd, offset: i64, len: usize) -> isize {
        self.simple(Op::Sendfile, out_fd, offset, None, len as isize)
    }

    fn sendto(&self, fd: RawFd, buf: &[u8], remote: &Endpoint) -> isize {
        self.simple(Op::SendTo, fd, len_arg(buf.len()), Some(*remote), buf.len() as isize)
    }

    fn sendmsg(&self, fd: RawFd, bufs: &[IoSlice<'_>], remote: &Endpoint) -> isize {
        let total: usize = bufs.iter().map(|b| b.len()).sum();
        self.simple(Op::SendMsg, fd, len_arg(bufs.len()), Some(*remote), total as isize)
    }

    fn sendmmsg(&self, fd: RawFd, packets: &[DatagramPacket<'_>]) -> isize {
        let first = packets.first().map(|p| p.recipient);
        self.simple(Op::SendMmsg, fd, len_arg(packets.len()), first, packets.len() as isize)
    }

    fn recvfrom(&self, fd: RawFd, buf: &mut [u8], sender: &mut Endpoint) -> isize {
        let mut state = self.state.lock();
        state.record(Op::RecvFrom, fd, len_arg(buf.len()), None);
        let scripted = state.take(Op::RecvFrom);
        if let Some(raw) = scripted.filter(|raw| *raw < 0) {
            return raw;
        }
        if state.is_closed(fd) {
            return neg(EBADF);
        }
        match (scripted, state.endpoints.pop_front()) {
            (Some(raw), Some(from)) => {
                *sender = from;
                raw
            }
            (None, Some(from)) => {
                *sender = from;
                0
            }
            (_, None) => neg(EAGAIN),
        }
    }

    fn get_option(&self, fd: RawFd, option: SocketOption, value: &mut i32) -> isize {
        let mut state = self.state.lock();
        state.record(Op::GetSockOpt, fd, 0, None);
        if let Some(raw) = state.take(Op::GetSockOpt) {
            return raw;
        }
        if state.is_closed(fd) {
            return neg(EBADF);
        }
        *value = state.options.get(&option).copied().unwrap_or(0);
        0
    }

    fn set_option(&self, fd: RawFd, option: SocketOption, value: i32) -> isize {
        let mut state = self.state.lock();
        state.record(Op::SetSockOpt, fd, i64::from(value), None);
        if let Some(raw) = state.take(Op::SetSockOpt) {
            return raw;
        }
        if state.is_closed(fd) {
            return neg(EBADF);
        }
        state.options.insert(option, value);
        0
    }
}

impl MockSyscalls {
    fn address(&self, op: Op, fd: RawFd, out: &mut Endpoint) -> isize {
        let mut state = self.state.lock();
        state.record(op, fd, 0, None);
        if let Some(raw) = state.take(op) {
            return raw;
        }
        if state.is_closed(fd) {
            return neg(EBADF);
        }
        match state.endpoints.pop_front() {
            Some(ep) => {
                *out = ep;
                1
            }
            None => 0,
        }
    }
}
