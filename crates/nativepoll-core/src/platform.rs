//! The process-wide platform context.
//!
//! A [`Platform`] is built once at start-up. It holds the resolved special
//! codes, the errno catalog and the host facts, and is read-only afterwards,
//! so it can be shared by reference across threads. Every wrapped operation
//! (see `socket`, `connect`, `poll`, `sockopt`) is a method on it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errno::{ErrnoCatalog, SpecialCodes};
use crate::error::{Failure, PlatformError};
use crate::interpret::{Interpreter, Op, Progress};
use crate::log::{LogEmitter, LogEntry, LogLevel};
use crate::sys::{RawFd, Syscall};

/// Kernel per-call vector limit used when the platform reports none.
pub const UIO_MAXIOV: usize = 1024;

/// Host facts captured during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub kernel_version: String,
    pub iov_max: usize,
    pub uio_max_iov: usize,
    pub supports_sendmmsg: bool,
    pub errno_table_size: usize,
}

pub struct Platform<S: Syscall> {
    sys: S,
    codes: SpecialCodes,
    catalog: ErrnoCatalog,
    info: PlatformInfo,
    /// Copy of the emitter threshold, checked before taking the lock.
    log_threshold: LogLevel,
    logger: Option<Mutex<LogEmitter>>,
}

impl<S: Syscall> std::fmt::Debug for Platform<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("codes", &self.codes)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

fn vector_limit(reported: isize) -> usize {
    usize::try_from(reported)
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(UIO_MAXIOV)
}

impl<S: Syscall> Platform<S> {
    /// Bootstrap against `sys`.
    ///
    /// Fails if the host is not the configured OS, if a special errno cannot
    /// be resolved, or if the configured catalog cannot hold every special
    /// code. Logs to stderr at the configured threshold.
    pub fn init(sys: S, config: &Config) -> Result<Self, PlatformError> {
        let emitter = (config.log_level != LogLevel::Off)
            .then(|| LogEmitter::to_stderr(config.log_level));
        Self::init_with_logger(sys, config, emitter)
    }

    /// Like [`Platform::init`], with an explicit log sink (or none).
    pub fn init_with_logger(
        sys: S,
        config: &Config,
        logger: Option<LogEmitter>,
    ) -> Result<Self, PlatformError> {
        let os = sys.os_name().trim().to_ascii_lowercase();
        if !os.starts_with(&config.required_os) {
            return Err(PlatformError::UnsupportedPlatform {
                os,
                required: config.required_os.clone(),
            });
        }

        let codes = SpecialCodes::resolve(|name| sys.errno_value(name))?;
        let required = codes.max_code();
        if usize::try_from(required).map_or(true, |c| c >= config.errno_table_size) {
            return Err(PlatformError::CatalogTooSmall {
                size: config.errno_table_size,
                required,
            });
        }
        let catalog = ErrnoCatalog::build(config.errno_table_size, |code| sys.strerror(code));

        let info = PlatformInfo {
            os,
            kernel_version: sys.kernel_version(),
            iov_max: vector_limit(sys.iov_max()),
            uio_max_iov: vector_limit(sys.uio_max_iov()),
            supports_sendmmsg: sys.supports_sendmmsg(),
            errno_table_size: catalog.len(),
        };

        let platform = Self {
            sys,
            codes,
            catalog,
            info,
            log_threshold: logger.as_ref().map_or(LogLevel::Off, LogEmitter::threshold),
            logger: logger.map(Mutex::new),
        };
        platform.log_with(LogLevel::Info, || {
            LogEntry::new(LogLevel::Info, "platform_init")
                .with_details(serde_json::to_value(&platform.info).unwrap_or_default())
        });
        Ok(platform)
    }

    #[must_use]
    pub fn sys(&self) -> &S {
        &self.sys
    }

    #[must_use]
    pub fn info(&self) -> &PlatformInfo {
        &self.info
    }

    #[must_use]
    pub fn codes(&self) -> &SpecialCodes {
        &self.codes
    }

    #[must_use]
    pub fn catalog(&self) -> &ErrnoCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn interpreter(&self) -> Interpreter<'_> {
        Interpreter::new(&self.codes, &self.catalog)
    }

    /// Catalog message for `code`.
    #[must_use]
    pub fn describe(&self, code: i32) -> String {
        self.catalog.lookup(code).into_owned()
    }

    /// Caller-facing text of `failure`, with the reset message taken from
    /// the host catalog.
    #[must_use]
    pub fn failure_message(&self, failure: &Failure) -> String {
        match failure {
            Failure::ConnectionReset { op } => format!(
                "Error while {op}(...): {}",
                self.catalog.lookup(self.codes.broken_pipe_code())
            ),
            other => other.to_string(),
        }
    }

    pub fn flush_log(&self) -> std::io::Result<()> {
        match &self.logger {
            Some(logger) => logger.lock().flush(),
            None => Ok(()),
        }
    }

    // -- classification with logging ------------------------------------------

    pub(crate) fn io(&self, op: Op, fd: RawFd, raw: isize) -> Result<Progress, Failure> {
        self.interpreter().io(op, raw).inspect_err(|f| self.log_failure(fd, f))
    }

    pub(crate) fn read_progress(&self, op: Op, fd: RawFd, raw: isize) -> Result<Progress, Failure> {
        self.interpreter().read(op, raw).inspect_err(|f| self.log_failure(fd, f))
    }

    pub(crate) fn structural(&self, op: Op, fd: RawFd, raw: isize) -> Result<usize, Failure> {
        self.interpreter()
            .structural(op, raw)
            .inspect_err(|f| self.log_failure(fd, f))
    }

    pub(crate) fn generic(&self, op: Op, fd: RawFd, raw: isize) -> Failure {
        let failure = self.interpreter().generic(op, raw);
        self.log_failure(fd, &failure);
        failure
    }

    pub(crate) fn failure_for_code(&self, op: Op, fd: RawFd, code: i32) -> Failure {
        let failure = self.interpreter().failure_for_code(op, code);
        self.log_failure(fd, &failure);
        failure
    }

    pub(crate) fn closed(&self, op: Op, fd: RawFd) -> Failure {
        self.log_with(LogLevel::Trace, || {
            LogEntry::new(LogLevel::Trace, "closed_resource")
                .with_op(op.label())
                .with_fd(fd)
        });
        Failure::ClosedResource
    }

    fn log_failure(&self, fd: RawFd, failure: &Failure) {
        let level = match failure {
            Failure::Io { .. } => LogLevel::Debug,
            Failure::ConnectionReset { .. } | Failure::ClosedResource => LogLevel::Trace,
        };
        self.log_with(level, || {
            let event = match failure {
                Failure::Io { .. } => "io_failure",
                Failure::ConnectionReset { .. } => "connection_reset",
                Failure::ClosedResource => "closed_resource",
            };
            let mut entry = LogEntry::new(level, event).with_fd(fd);
            if let Some(op) = failure.op() {
                entry = entry.with_op(op.label());
            }
            if let Some(code) = failure.code() {
                entry = entry.with_errno(code);
            }
            entry
        });
    }

    /// Builds the entry only when `level` clears the threshold.
    /// Below-threshold levels return without touching the lock.
    fn log_with<F: FnOnce() -> LogEntry>(&self, level: LogLevel, build: F) {
        if level == LogLevel::Off || level < self.log_threshold {
            return;
        }
        let Some(logger) = &self.logger else {
            return;
        };
        let mut logger = logger.lock();
        // A broken log sink never fails the I/O path.
        let _ = logger.emit(build());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno::{EAGAIN, EBADF, EPIPE, ErrnoName};
    use crate::log::SharedBuffer;
    use crate::mock::MockSyscalls;

    #[test]
    fn init_captures_host_facts() {
        let sys = MockSyscalls::new().with_iov_max(0).with_kernel_version("6.8.0");
        let p = Platform::init(sys, &Config::default()).unwrap();
        let info = p.info();
        assert_eq!(info.os, "linux");
        assert_eq!(info.kernel_version, "6.8.0");
        assert_eq!(info.iov_max, UIO_MAXIOV);
        assert_eq!(info.errno_table_size, 1024);
        assert_eq!(p.catalog().len(), 1024);
    }

    #[test]
    fn rejects_foreign_os() {
        let sys = MockSyscalls::new().with_os("Darwin");
        let err = Platform::init(sys, &Config::default()).unwrap_err();
        assert_eq!(
            err,
            PlatformError::UnsupportedPlatform {
                os: "darwin".to_string(),
                required: "linux".to_string(),
            }
        );
    }

    #[test]
    fn unresolved_special_code_is_fatal() {
        let sys = MockSyscalls::new().without_errno(ErrnoName::InProgress);
        let err = Platform::init(sys, &Config::default()).unwrap_err();
        assert_eq!(err, PlatformError::UnresolvedErrno { name: "EINPROGRESS" });
    }

    #[test]
    fn catalog_must_cover_special_codes() {
        let sys = MockSyscalls::new().with_errno(ErrnoName::InProgress, 300);
        let config = Config {
            errno_table_size: 256,
            ..Config::default()
        };
        let err = Platform::init(sys, &config).unwrap_err();
        assert_eq!(
            err,
            PlatformError::CatalogTooSmall {
                size: 256,
                required: 300,
            }
        );
    }

    #[test]
    fn logs_init_and_generic_failures() {
        let buffer = SharedBuffer::new();
        let emitter = LogEmitter::to_shared(buffer.clone(), LogLevel::Debug);
        let p = Platform::init_with_logger(MockSyscalls::new(), &Config::default(), Some(emitter))
            .unwrap();

        assert!(p.io(Op::Write, 4, -(EAGAIN as isize)).is_ok());
        assert!(p.io(Op::Write, 4, -(EBADF as isize)).is_err());
        assert!(p.io(Op::Write, 4, -104).is_err());

        let entries = buffer.entries();
        let events: Vec<_> = entries.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(events, ["platform_init", "io_failure"]);
        assert_eq!(entries[1].op.as_deref(), Some("write"));
        assert_eq!(entries[1].fd, Some(4));
        assert_eq!(entries[1].errno, Some(104));
        assert_eq!(
            entries[0].details.as_ref().unwrap()["os"],
            serde_json::json!("linux")
        );
    }

    #[test]
    fn quiet_levels_skip_the_log_lock() {
        use std::sync::mpsc;
        use std::time::Duration;

        let emitter = LogEmitter::to_shared(SharedBuffer::new(), LogLevel::Warn);
        let p = Platform::init_with_logger(MockSyscalls::new(), &Config::default(), Some(emitter))
            .unwrap();
        let held = p.logger.as_ref().unwrap().lock();
        let (tx, rx) = mpsc::channel();
        std::thread::scope(|s| {
            s.spawn(|| {
                let closed = p.io(Op::Write, 3, -(EBADF as isize));
                let reset = p.io(Op::Write, 3, -(EPIPE as isize));
                let generic = p.io(Op::Write, 3, -104);
                tx.send((closed, reset, generic)).unwrap();
            });
            let outcome = rx.recv_timeout(Duration::from_secs(5));
            drop(held);
            let (closed, reset, generic) = outcome.unwrap();
            assert_eq!(closed, Err(Failure::ClosedResource));
            assert_eq!(reset, Err(Failure::reset(Op::Write)));
            assert!(generic.is_err());
        });
    }

    #[test]
    fn enabled_levels_still_log() {
        let buffer = SharedBuffer::new();
        let emitter = LogEmitter::to_shared(buffer.clone(), LogLevel::Trace);
        let p = Platform::init_with_logger(MockSyscalls::new(), &Config::default(), Some(emitter))
            .unwrap();
        assert!(p.io(Op::Write, 5, -(EBADF as isize)).is_err());
        let events: Vec<_> = buffer.entries().into_iter().map(|e| e.event).collect();
        assert_eq!(events, ["platform_init", "closed_resource"]);
    }

    #[test]
    fn reset_message_comes_from_catalog() {
        let p = Platform::init(MockSyscalls::new(), &Config::default()).unwrap();
        assert_eq!(
            p.failure_message(&Failure::reset(Op::Sendfile)),
            "Error while sendfile(...): Broken pipe"
        );

        // a host whose broken-pipe code has no Linux text
        let sys = MockSyscalls::new().with_errno(ErrnoName::BrokenPipe, 300);
        let p = Platform::init(sys, &Config::default()).unwrap();
        assert_eq!(
            p.failure_message(&Failure::reset(Op::Write)),
            "Error while write(...): Unknown error 300"
        );
        assert_eq!(
            p.failure_message(&Failure::ClosedResource),
            Failure::ClosedResource.to_string()
        );
    }

    #[test]
    fn platform_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Platform<MockSyscalls>>();
    }
}
