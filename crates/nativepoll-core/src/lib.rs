//! # nativepoll-core
//!
//! The classification core that sits between an event loop and the raw,
//! non-blocking socket/epoll interface of the host kernel.
//!
//! Every native operation returns a signed integer: non-negative on success,
//! `-errno` on failure. This crate turns that convention into a small set of
//! outcomes ([`Progress`] values and [`Failure`] variants) so callers never
//! re-derive OS semantics at the call site.
//!
//! The host kernel is reached only through the [`Syscall`] capability trait.
//! `nativepoll-sys` provides the Linux adapter; [`mock::MockSyscalls`]
//! provides a scripted one for deterministic tests. No `unsafe` code is
//! permitted at the crate level.

#![deny(unsafe_code)]

pub mod addr;
pub mod config;
pub mod connect;
pub mod errno;
pub mod error;
pub mod interpret;
pub mod log;
pub mod mock;
pub mod platform;
pub mod poll;
pub mod socket;
pub mod sockopt;
pub mod sys;

pub use addr::{Endpoint, normalize};
pub use config::Config;
pub use connect::{ConnectAttempt, ConnectState};
pub use errno::{ErrnoCatalog, ErrnoName, SpecialCodes};
pub use error::{Failure, FailureKind, PlatformError};
pub use interpret::{Interpreter, Op, Progress};
pub use platform::{Platform, PlatformInfo};
pub use poll::{EventBuffer, RawEvent, Readiness, ReadyEvent, RegistrationId, Timeout};
pub use socket::Datagram;
pub use sockopt::SocketOption;
pub use sys::{CtlOp, DatagramPacket, RawFd, Syscall};
