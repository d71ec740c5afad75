//! Readiness registration surface.
//!
//! Edge-triggered epoll registrations keyed by a caller-chosen
//! [`RegistrationId`], plus the eventfd wake descriptor used to interrupt a
//! blocked wait. Registration calls only fail on programmer error, so their
//! failures surface immediately and are never retried.

use std::time::Duration;

use bitflags::bitflags;

use crate::error::Failure;
use crate::interpret::{Op, Progress};
use crate::platform::Platform;
use crate::sys::{CtlOp, RawFd, Syscall};

// ---------------------------------------------------------------------------
// epoll event bits (Linux values)
// ---------------------------------------------------------------------------

pub const EPOLLIN: u32 = 0x001;
pub const EPOLLPRI: u32 = 0x002;
pub const EPOLLOUT: u32 = 0x004;
pub const EPOLLERR: u32 = 0x008;
pub const EPOLLHUP: u32 = 0x010;
pub const EPOLLRDHUP: u32 = 0x2000;
pub const EPOLLET: u32 = 1 << 31;

bitflags! {
    /// Interest / readiness set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Readiness: u32 {
        const READABLE = 0x01;
        const WRITABLE = 0x02;
        /// Readable, specialized to listening sockets.
        const ACCEPTABLE = 0x04;
        /// The peer shut down its write half.
        const PEER_CLOSED = 0x08;
    }
}

impl Readiness {
    /// Edge-triggered epoll mask for this interest set.
    #[must_use]
    pub const fn to_epoll(self) -> u32 {
        let mut mask = EPOLLET;
        if self.intersects(Self::READABLE.union(Self::ACCEPTABLE)) {
            mask |= EPOLLIN;
        }
        if self.contains(Self::WRITABLE) {
            mask |= EPOLLOUT;
        }
        if self.contains(Self::PEER_CLOSED) {
            mask |= EPOLLRDHUP;
        }
        mask
    }

    /// Readiness reported by a delivered epoll mask.
    ///
    /// `EPOLLIN` cannot tell a listener from a connected socket, so it sets
    /// both `READABLE` and `ACCEPTABLE`. Hang-up and error wake every waiter
    /// so the next call observes the failure.
    #[must_use]
    pub const fn from_epoll(events: u32) -> Self {
        let mut ready = Self::empty();
        if events & (EPOLLIN | EPOLLPRI) != 0 {
            ready = ready.union(Self::READABLE).union(Self::ACCEPTABLE);
        }
        if events & EPOLLOUT != 0 {
            ready = ready.union(Self::WRITABLE);
        }
        if events & EPOLLRDHUP != 0 {
            ready = ready.union(Self::PEER_CLOSED);
        }
        if events & EPOLLHUP != 0 {
            ready = ready.union(Self::READABLE).union(Self::PEER_CLOSED);
        }
        if events & EPOLLERR != 0 {
            ready = ready.union(Self::READABLE).union(Self::WRITABLE);
        }
        ready
    }
}

/// Opaque id round-tripped through a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u32);

impl From<RegistrationId> for u64 {
    fn from(id: RegistrationId) -> Self {
        u64::from(id.0)
    }
}

/// How long a wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately.
    Poll,
    Millis(u32),
    /// Block until an event arrives.
    Infinite,
}

impl Timeout {
    /// Native encoding: 0 polls, -1 blocks indefinitely.
    #[must_use]
    pub fn as_millis(self) -> i32 {
        match self {
            Self::Poll => 0,
            Self::Millis(ms) => i32::try_from(ms).unwrap_or(i32::MAX),
            Self::Infinite => -1,
        }
    }
}

impl From<Option<Duration>> for Timeout {
    /// `None` blocks; sub-millisecond durations round up so they still block.
    fn from(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Self::Infinite,
            Some(d) if d.is_zero() => Self::Poll,
            Some(d) => {
                let ms = d.as_nanos().div_ceil(1_000_000);
                Self::Millis(u32::try_from(ms).unwrap_or(u32::MAX))
            }
        }
    }
}

/// One event as the kernel delivers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawEvent {
    pub events: u32,
    pub data: u64,
}

/// A delivered event, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub id: RegistrationId,
    pub readiness: Readiness,
}

impl From<RawEvent> for ReadyEvent {
    fn from(raw: RawEvent) -> Self {
        Self {
            // ids are registered as u32; the upper half is never set
            id: RegistrationId(raw.data as u32),
            readiness: Readiness::from_epoll(raw.events),
        }
    }
}

/// Reusable storage for [`Platform::epoll_wait`].
#[derive(Debug, Clone)]
pub struct EventBuffer {
    raw: Vec<RawEvent>,
    len: usize,
}

impl EventBuffer {
    /// Buffer for up to `capacity` events per wait (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: vec![RawEvent::default(); capacity.max(1)],
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.raw.len()
    }

    /// Events delivered by the last wait.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = ReadyEvent> + '_ {
        self.raw[..self.len].iter().copied().map(ReadyEvent::from)
    }
}

impl<S: Syscall> Platform<S> {
    /// New epoll instance.
    pub fn epoll_create(&self) -> Result<RawFd, Failure> {
        let raw = self.sys().epoll_create();
        self.structural(Op::EpollCreate, -1, raw).map(|fd| fd as RawFd)
    }

    pub fn epoll_add(
        &self,
        epfd: RawFd,
        fd: RawFd,
        interest: Readiness,
        id: RegistrationId,
    ) -> Result<(), Failure> {
        self.ctl(epfd, CtlOp::Add, fd, interest, id)
    }

    pub fn epoll_modify(
        &self,
        epfd: RawFd,
        fd: RawFd,
        interest: Readiness,
        id: RegistrationId,
    ) -> Result<(), Failure> {
        self.ctl(epfd, CtlOp::Modify, fd, interest, id)
    }

    /// Remove `fd` from `epfd`. Deleting a registration that is already gone,
    /// or one whose descriptor was closed, surfaces `ClosedResource`.
    pub fn epoll_delete(&self, epfd: RawFd, fd: RawFd) -> Result<(), Failure> {
        if epfd < 0 || fd < 0 {
            return Err(self.closed(Op::EpollCtl, fd));
        }
        let raw = self
            .sys()
            .epoll_ctl(epfd, CtlOp::Delete, fd, Readiness::empty(), 0);
        if self.codes().is_no_entry(raw) {
            return Err(self.closed(Op::EpollCtl, fd));
        }
        self.structural(Op::EpollCtl, fd, raw).map(|_| ())
    }

    fn ctl(
        &self,
        epfd: RawFd,
        op: CtlOp,
        fd: RawFd,
        interest: Readiness,
        id: RegistrationId,
    ) -> Result<(), Failure> {
        if epfd < 0 || fd < 0 {
            return Err(self.closed(Op::EpollCtl, fd));
        }
        let raw = self.sys().epoll_ctl(epfd, op, fd, interest, id.into());
        self.structural(Op::EpollCtl, fd, raw).map(|_| ())
    }

    /// Wait for events into `events`, returning how many arrived. A wait
    /// interrupted by a signal reports zero events.
    pub fn epoll_wait(
        &self,
        epfd: RawFd,
        events: &mut EventBuffer,
        timeout: Timeout,
    ) -> Result<usize, Failure> {
        events.clear();
        let raw = self
            .sys()
            .epoll_wait(epfd, &mut events.raw, timeout.as_millis());
        if self.codes().is_interrupted(raw) {
            return Ok(0);
        }
        let n = self.structural(Op::EpollWait, epfd, raw)?;
        events.len = n.min(events.capacity());
        Ok(events.len)
    }

    // -- wake descriptor ------------------------------------------------------

    pub fn eventfd(&self) -> Result<RawFd, Failure> {
        let raw = self.sys().eventfd();
        self.structural(Op::EventFd, -1, raw).map(|fd| fd as RawFd)
    }

    /// Add `value` to the counter. A saturated counter already guarantees a
    /// pending wake-up, so would-block is success.
    pub fn eventfd_write(&self, fd: RawFd, value: u64) -> Result<(), Failure> {
        let raw = self.sys().eventfd_write(fd, value);
        self.io(Op::EventFdWrite, fd, raw).map(|_| ())
    }

    /// Drain the counter. Returns 0 when no wake-up was pending.
    pub fn eventfd_read(&self, fd: RawFd) -> Result<u64, Failure> {
        let mut value = 0u64;
        let raw = self.sys().eventfd_read(fd, &mut value);
        match self.io(Op::EventFdRead, fd, raw)? {
            Progress::Done(_) => Ok(value),
            Progress::WouldBlock | Progress::Eof => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_maps_to_edge_triggered_mask() {
        assert_eq!(Readiness::READABLE.to_epoll(), EPOLLIN | EPOLLET);
        assert_eq!(Readiness::ACCEPTABLE.to_epoll(), EPOLLIN | EPOLLET);
        assert_eq!(Readiness::WRITABLE.to_epoll(), EPOLLOUT | EPOLLET);
        assert_eq!(
            (Readiness::READABLE | Readiness::PEER_CLOSED).to_epoll(),
            EPOLLIN | EPOLLRDHUP | EPOLLET
        );
        assert_eq!(Readiness::empty().to_epoll(), EPOLLET);
    }

    #[test]
    fn delivered_mask_decodes() {
        assert_eq!(
            Readiness::from_epoll(EPOLLIN),
            Readiness::READABLE | Readiness::ACCEPTABLE
        );
        assert_eq!(Readiness::from_epoll(EPOLLOUT), Readiness::WRITABLE);
        assert!(Readiness::from_epoll(EPOLLRDHUP).contains(Readiness::PEER_CLOSED));
        assert!(Readiness::from_epoll(EPOLLHUP).contains(Readiness::READABLE));
        assert!(Readiness::from_epoll(EPOLLERR).contains(Readiness::WRITABLE));
    }

    #[test]
    fn timeout_encoding() {
        assert_eq!(Timeout::Poll.as_millis(), 0);
        assert_eq!(Timeout::Infinite.as_millis(), -1);
        assert_eq!(Timeout::Millis(250).as_millis(), 250);
        assert_eq!(Timeout::Millis(u32::MAX).as_millis(), i32::MAX);
    }

    #[test]
    fn timeout_from_duration_rounds_up() {
        assert_eq!(Timeout::from(None), Timeout::Infinite);
        assert_eq!(Timeout::from(Some(Duration::ZERO)), Timeout::Poll);
        assert_eq!(
            Timeout::from(Some(Duration::from_micros(10))),
            Timeout::Millis(1)
        );
        assert_eq!(
            Timeout::from(Some(Duration::from_millis(1500))),
            Timeout::Millis(1500)
        );
    }

    #[test]
    fn event_buffer_has_minimum_capacity() {
        let buf = EventBuffer::with_capacity(0);
        assert_eq!(buf.capacity(), 1);
        assert!(buf.is_empty());
        assert_eq!(buf.iter().count(), 0);
    }

    #[test]
    fn raw_event_decodes_id() {
        let ev = ReadyEvent::from(RawEvent {
            events: EPOLLOUT,
            data: 42,
        });
        assert_eq!(ev.id, RegistrationId(42));
        assert_eq!(ev.readiness, Readiness::WRITABLE);
    }
}
