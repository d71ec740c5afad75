//! Integration test: socket lifecycle, connect handshake and readiness
//! registration against the scripted adapter.
//!
//! Run: cargo test -p nativepoll-core --test lifecycle_test

use std::io::IoSlice;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

use nativepoll_core::errno::{EAGAIN, EBADF, ECONNREFUSED, EINPROGRESS, EINTR, EINVAL, ETIMEDOUT};
use nativepoll_core::mock::MockSyscalls;
use nativepoll_core::poll::{EPOLLIN, EPOLLOUT, EPOLLRDHUP};
use nativepoll_core::{
    Config, Datagram, Endpoint, EventBuffer, Failure, FailureKind, Op, Platform, Progress,
    RawEvent, Readiness, ReadyEvent, RegistrationId, Timeout,
};

fn platform() -> Platform<MockSyscalls> {
    Platform::init(MockSyscalls::new(), &Config::default()).expect("mock platform bootstraps")
}

fn neg(code: i32) -> isize {
    -(code as isize)
}

fn v4(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

// ---------------------------------------------------------------------------
// Connect handshake
// ---------------------------------------------------------------------------

#[test]
fn connect_in_progress_then_finish() {
    let p = platform();
    let fd = p.socket_stream().unwrap();
    p.sys().script(Op::Connect, [neg(EINPROGRESS)]);
    p.sys().script(Op::FinishConnect, [neg(EINPROGRESS), 0]);

    assert_eq!(p.connect(fd, &v4("192.0.2.1:80")), Ok(false));
    assert_eq!(p.finish_connect(fd), Ok(false));
    assert_eq!(p.finish_connect(fd), Ok(true));

    let call = &p.sys().calls_for(Op::Connect)[0];
    let ep = call.endpoint.expect("connect records its endpoint");
    assert_eq!(
        ep.address,
        [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xc0, 0x00, 0x02, 0x01]
    );
    assert_eq!(ep.scope_id, 0);
    assert_eq!(ep.port, 80);
}

#[test]
fn connect_synchronous_success() {
    let p = platform();
    let fd = p.socket_stream().unwrap();
    assert_eq!(p.connect(fd, &v4("127.0.0.1:8080")), Ok(true));
}

#[test]
fn connect_failures_are_generic_with_labels() {
    let p = platform();
    p.sys().script(Op::Connect, [neg(ECONNREFUSED), neg(EBADF)]);
    let err = p.connect(3, &v4("127.0.0.1:1")).unwrap_err();
    assert_eq!(err.op(), Some(Op::Connect));
    assert_eq!(err.code(), Some(ECONNREFUSED));
    assert_eq!(err.to_string(), "Error while connect(...): Connection refused");
    let err = p.connect(3, &v4("127.0.0.1:1")).unwrap_err();
    assert_eq!(err.kind(), FailureKind::Generic);

    p.sys().script(Op::FinishConnect, [neg(ETIMEDOUT)]);
    let err = p.finish_connect(3).unwrap_err();
    assert_eq!(err.to_string(), "Error while getsockopt(...): Connection timed out");
}

#[test]
fn ipv6_connect_keeps_scope() {
    let p = platform();
    let addr = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 443, 0, 5));
    p.connect(3, &addr).unwrap();
    let ep = p.sys().calls_for(Op::Connect)[0].endpoint.unwrap();
    assert_eq!(ep.address, Ipv6Addr::LOCALHOST.octets());
    assert_eq!(ep.scope_id, 5);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn second_close_is_closed_resource() {
    let p = platform();
    let fd = p.socket_stream().unwrap();
    assert_eq!(p.close(fd), Ok(()));
    assert_eq!(p.close(fd), Err(Failure::ClosedResource));
    assert_eq!(p.close(-1), Err(Failure::ClosedResource));
}

#[test]
fn io_after_close_is_closed_resource() {
    let p = platform();
    let fd = p.socket_stream().unwrap();
    p.close(fd).unwrap();
    assert_eq!(p.write(fd, b"late"), Err(Failure::ClosedResource));
    assert_eq!(p.read(fd, &mut [0u8; 4]), Err(Failure::ClosedResource));
}

#[test]
fn accept_would_block_is_none() {
    let p = platform();
    let listener = p.socket_stream().unwrap();
    p.bind(listener, &v4("0.0.0.0:0")).unwrap();
    p.listen(listener, 100_000).unwrap();
    assert_eq!(p.sys().calls_for(Op::Listen)[0].arg, 4096);

    p.sys().script(Op::Accept, [neg(EAGAIN)]);
    assert_eq!(p.accept(listener), Ok(None));
    let child = p.accept(listener).unwrap().expect("model hands out a descriptor");
    assert!(child > listener);
}

#[test]
fn shutdown_of_neither_side_issues_no_call() {
    let p = platform();
    p.shutdown(3, false, false).unwrap();
    assert!(p.sys().calls_for(Op::Shutdown).is_empty());
    p.shutdown(3, false, true).unwrap();
    assert_eq!(p.sys().calls_for(Op::Shutdown)[0].arg, 0b10);
}

#[test]
fn addresses_demap_ipv4() {
    let p = platform();
    assert_eq!(p.local_address(3), Ok(None));
    p.sys().push_endpoint(Endpoint::from(v4("10.0.0.2:7000")));
    assert_eq!(p.remote_address(3), Ok(Some(v4("10.0.0.2:7000"))));
}

// ---------------------------------------------------------------------------
// Data transfer details
// ---------------------------------------------------------------------------

#[test]
fn writev_is_truncated_to_iov_max() {
    let sys = MockSyscalls::new().with_iov_max(2);
    let p = Platform::init(sys, &Config::default()).unwrap();
    let chunk = [1u8; 10];
    let slices = [IoSlice::new(&chunk), IoSlice::new(&chunk), IoSlice::new(&chunk)];
    assert_eq!(p.writev(3, &slices), Ok(Progress::Done(20)));
    assert_eq!(p.sys().calls_for(Op::Writev)[0].arg, 2);
}

#[test]
fn sendfile_adds_base_offset() {
    let p = platform();
    assert_eq!(p.sendfile(3, 9, 4096, 100, 50), Ok(Progress::Done(50)));
    assert_eq!(p.sys().calls_for(Op::Sendfile)[0].arg, 4196);

    let err = p.sendfile(3, 9, i64::MAX, 1, 50).unwrap_err();
    assert_eq!(err.code(), Some(EINVAL));
    assert_eq!(err.op(), Some(Op::Sendfile));
    assert_eq!(p.sys().calls_for(Op::Sendfile).len(), 1);
}

#[test]
fn recvfrom_reports_sender() {
    let p = platform();
    let fd = p.socket_dgram().unwrap();
    assert_eq!(p.recvfrom(fd, &mut [0u8; 64]), Ok(None));

    p.sys().script(Op::RecvFrom, [12]);
    p.sys().push_endpoint(Endpoint::from(v4("203.0.113.9:53")));
    assert_eq!(
        p.recvfrom(fd, &mut [0u8; 64]),
        Ok(Some(Datagram {
            len: 12,
            sender: v4("203.0.113.9:53"),
        }))
    );
}

#[test]
fn empty_sendmmsg_is_no_op() {
    let p = platform();
    assert_eq!(p.sendmmsg(3, &[]), Ok(Progress::Done(0)));
    assert!(p.sys().calls_for(Op::SendMmsg).is_empty());
}

// ---------------------------------------------------------------------------
// Readiness registration
// ---------------------------------------------------------------------------

#[test]
fn repeated_delete_is_closed_resource() {
    let p = platform();
    let ep = p.epoll_create().unwrap();
    let fd = p.socket_stream().unwrap();
    p.epoll_add(ep, fd, Readiness::READABLE, RegistrationId(1)).unwrap();
    assert_eq!(p.epoll_delete(ep, fd), Ok(()));
    assert_eq!(p.epoll_delete(ep, fd), Err(Failure::ClosedResource));

    p.close(fd).unwrap();
    assert_eq!(p.epoll_delete(ep, fd), Err(Failure::ClosedResource));
}

#[test]
fn duplicate_add_is_generic() {
    let p = platform();
    let ep = p.epoll_create().unwrap();
    let fd = p.socket_stream().unwrap();
    p.epoll_add(ep, fd, Readiness::READABLE, RegistrationId(1)).unwrap();
    let err = p
        .epoll_add(ep, fd, Readiness::READABLE, RegistrationId(1))
        .unwrap_err();
    assert_eq!(err.to_string(), "Error while epoll_ctl(...): File exists");
}

#[test]
fn modify_round_trips_id() {
    let p = platform();
    let ep = p.epoll_create().unwrap();
    let fd = p.socket_stream().unwrap();
    p.epoll_add(ep, fd, Readiness::WRITABLE, RegistrationId(7)).unwrap();
    p.epoll_modify(ep, fd, Readiness::READABLE | Readiness::PEER_CLOSED, RegistrationId(9))
        .unwrap();
    let ids: Vec<i64> = p.sys().calls_for(Op::EpollCtl).iter().map(|c| c.arg).collect();
    assert_eq!(ids, [7, 9]);
}

#[test]
fn wait_decodes_events() {
    let p = platform();
    let ep = p.epoll_create().unwrap();
    p.sys().push_event(RawEvent {
        events: EPOLLIN | EPOLLRDHUP,
        data: 1,
    });
    p.sys().push_event(RawEvent {
        events: EPOLLOUT,
        data: 2,
    });
    let mut events = EventBuffer::with_capacity(8);
    assert_eq!(p.epoll_wait(ep, &mut events, Timeout::Millis(10)), Ok(2));
    let ready: Vec<ReadyEvent> = events.iter().collect();
    assert_eq!(ready[0].id, RegistrationId(1));
    assert!(ready[0].readiness.contains(Readiness::READABLE | Readiness::PEER_CLOSED));
    assert_eq!(ready[1].readiness, Readiness::WRITABLE);
    assert_eq!(p.sys().calls_for(Op::EpollWait)[0].arg, 10);
}

#[test]
fn wait_respects_buffer_capacity() {
    let p = platform();
    let ep = p.epoll_create().unwrap();
    for id in 0..3 {
        p.sys().push_event(RawEvent { events: EPOLLIN, data: id });
    }
    let mut events = EventBuffer::with_capacity(2);
    assert_eq!(p.epoll_wait(ep, &mut events, Timeout::Poll), Ok(2));
    assert_eq!(p.epoll_wait(ep, &mut events, Timeout::Poll), Ok(1));
    assert_eq!(p.epoll_wait(ep, &mut events, Timeout::Poll), Ok(0));
    assert!(events.is_empty());
}

#[test]
fn scripted_wait_count_is_clamped_to_capacity() {
    let p = platform();
    let ep = p.epoll_create().unwrap();
    p.sys().script(Op::EpollWait, [100, 0]);
    let mut events = EventBuffer::with_capacity(4);
    assert_eq!(p.epoll_wait(ep, &mut events, Timeout::Poll), Ok(4));
    assert_eq!(events.len(), 4);
    assert_eq!(p.epoll_wait(ep, &mut events, Timeout::Poll), Ok(0));
    assert!(events.is_empty());
}

#[test]
fn interrupted_wait_reports_no_events() {
    let p = platform();
    let ep = p.epoll_create().unwrap();
    p.sys().push_event(RawEvent { events: EPOLLIN, data: 1 });
    let mut events = EventBuffer::with_capacity(4);
    p.epoll_wait(ep, &mut events, Timeout::Poll).unwrap();
    assert_eq!(events.len(), 1);

    p.sys().script(Op::EpollWait, [neg(EINTR)]);
    assert_eq!(p.epoll_wait(ep, &mut events, Timeout::Infinite), Ok(0));
    assert!(events.is_empty());
    assert_eq!(p.sys().calls_for(Op::EpollWait)[1].arg, -1);
}

#[test]
fn wait_on_closed_poller_fails() {
    let p = platform();
    let ep = p.epoll_create().unwrap();
    p.close(ep).unwrap();
    let mut events = EventBuffer::with_capacity(1);
    assert_eq!(
        p.epoll_wait(ep, &mut events, Timeout::Poll),
        Err(Failure::ClosedResource)
    );
}

#[test]
fn eventfd_wakes_and_drains() {
    let p = platform();
    let wake = p.eventfd().unwrap();
    assert_eq!(p.eventfd_read(wake), Ok(0));
    p.eventfd_write(wake, 1).unwrap();
    p.eventfd_write(wake, 1).unwrap();
    assert_eq!(p.eventfd_read(wake), Ok(2));
    assert_eq!(p.eventfd_read(wake), Ok(0));

    p.sys().script(Op::EventFdWrite, [neg(EAGAIN)]);
    assert_eq!(p.eventfd_write(wake, 1), Ok(()));
}
