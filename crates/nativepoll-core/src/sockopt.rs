//! Socket option accessors.
//!
//! Thin get/set wrappers over the thirteen options the event loop tunes.
//! Failures are classified structurally under the `getsockopt` /
//! `setsockopt` labels.

use crate::error::Failure;
use crate::interpret::Op;
use crate::platform::Platform;
use crate::sys::{RawFd, Syscall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketOption {
    /// `SO_RCVBUF`
    ReceiveBufferSize,
    /// `SO_SNDBUF`
    SendBufferSize,
    /// `SO_KEEPALIVE`
    KeepAlive,
    /// `SO_REUSEADDR`
    ReuseAddress,
    /// `SO_REUSEPORT`
    ReusePort,
    /// `TCP_NODELAY`
    TcpNoDelay,
    /// `TCP_CORK`
    TcpCork,
    /// `SO_LINGER`, in seconds; `-1` when disabled.
    Linger,
    /// `IP_TOS`, mirrored to `IPV6_TCLASS` on set
    TrafficClass,
    /// `SO_BROADCAST`
    Broadcast,
    /// `TCP_KEEPIDLE`, in seconds.
    TcpKeepIdle,
    /// `TCP_KEEPINTVL`, in seconds.
    TcpKeepInterval,
    /// `TCP_KEEPCNT`
    TcpKeepCount,
}

impl SocketOption {
    pub const ALL: [SocketOption; 13] = [
        Self::ReceiveBufferSize,
        Self::SendBufferSize,
        Self::KeepAlive,
        Self::ReuseAddress,
        Self::ReusePort,
        Self::TcpNoDelay,
        Self::TcpCork,
        Self::Linger,
        Self::TrafficClass,
        Self::Broadcast,
        Self::TcpKeepIdle,
        Self::TcpKeepInterval,
        Self::TcpKeepCount,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ReceiveBufferSize => "SO_RCVBUF",
            Self::SendBufferSize => "SO_SNDBUF",
            Self::KeepAlive => "SO_KEEPALIVE",
            Self::ReuseAddress => "SO_REUSEADDR",
            Self::ReusePort => "SO_REUSEPORT",
            Self::TcpNoDelay => "TCP_NODELAY",
            Self::TcpCork => "TCP_CORK",
            Self::Linger => "SO_LINGER",
            Self::TrafficClass => "IP_TOS",
            Self::Broadcast => "SO_BROADCAST",
            Self::TcpKeepIdle => "TCP_KEEPIDLE",
            Self::TcpKeepInterval => "TCP_KEEPINTVL",
            Self::TcpKeepCount => "TCP_KEEPCNT",
        }
    }

    /// Returns true if the option is an on/off flag.
    #[must_use]
    pub const fn is_flag(self) -> bool {
        matches!(
            self,
            Self::KeepAlive
                | Self::ReuseAddress
                | Self::ReusePort
                | Self::TcpNoDelay
                | Self::TcpCork
                | Self::Broadcast
        )
    }
}

macro_rules! flag_option {
    ($get:ident, $set:ident, $opt:ident) => {
        pub fn $get(&self, fd: RawFd) -> Result<bool, Failure> {
            self.get_option(fd, SocketOption::$opt).map(|v| v != 0)
        }

        pub fn $set(&self, fd: RawFd, on: bool) -> Result<(), Failure> {
            self.set_option(fd, SocketOption::$opt, i32::from(on))
        }
    };
}

macro_rules! int_option {
    ($get:ident, $set:ident, $opt:ident) => {
        pub fn $get(&self, fd: RawFd) -> Result<i32, Failure> {
            self.get_option(fd, SocketOption::$opt)
        }

        pub fn $set(&self, fd: RawFd, value: i32) -> Result<(), Failure> {
            self.set_option(fd, SocketOption::$opt, value)
        }
    };
}

impl<S: Syscall> Platform<S> {
    pub fn get_option(&self, fd: RawFd, option: SocketOption) -> Result<i32, Failure> {
        let mut value = 0i32;
        let raw = self.sys().get_option(fd, option, &mut value);
        self.structural(Op::GetSockOpt, fd, raw)?;
        Ok(value)
    }

    pub fn set_option(&self, fd: RawFd, option: SocketOption, value: i32) -> Result<(), Failure> {
        let raw = self.sys().set_option(fd, option, value);
        self.structural(Op::SetSockOpt, fd, raw).map(|_| ())
    }

    flag_option!(is_keep_alive, set_keep_alive, KeepAlive);
    flag_option!(is_reuse_address, set_reuse_address, ReuseAddress);
    flag_option!(is_reuse_port, set_reuse_port, ReusePort);
    flag_option!(is_tcp_no_delay, set_tcp_no_delay, TcpNoDelay);
    flag_option!(is_tcp_cork, set_tcp_cork, TcpCork);
    flag_option!(is_broadcast, set_broadcast, Broadcast);

    int_option!(receive_buffer_size, set_receive_buffer_size, ReceiveBufferSize);
    int_option!(send_buffer_size, set_send_buffer_size, SendBufferSize);
    int_option!(traffic_class, set_traffic_class, TrafficClass);
    int_option!(tcp_keep_idle, set_tcp_keep_idle, TcpKeepIdle);
    int_option!(tcp_keep_interval, set_tcp_keep_interval, TcpKeepInterval);
    int_option!(tcp_keep_count, set_tcp_keep_count, TcpKeepCount);

    /// Linger timeout in seconds, `None` when lingering is disabled.
    pub fn so_linger(&self, fd: RawFd) -> Result<Option<u32>, Failure> {
        let value = self.get_option(fd, SocketOption::Linger)?;
        Ok(u32::try_from(value).ok())
    }

    pub fn set_so_linger(&self, fd: RawFd, seconds: Option<u32>) -> Result<(), Failure> {
        let value = seconds.map_or(-1, |s| i32::try_from(s).unwrap_or(i32::MAX));
        self.set_option(fd, SocketOption::Linger, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mock::MockSyscalls;

    fn platform() -> Platform<MockSyscalls> {
        Platform::init(MockSyscalls::new(), &Config::default()).unwrap()
    }

    #[test]
    fn flag_getters_map_nonzero_to_true() {
        let p = platform();
        p.sys().set_option_value(SocketOption::TcpNoDelay, 1);
        assert!(p.is_tcp_no_delay(3).unwrap());
        p.sys().set_option_value(SocketOption::KeepAlive, 0);
        assert!(!p.is_keep_alive(3).unwrap());
    }

    #[test]
    fn setters_pass_values_through() {
        let p = platform();
        p.set_receive_buffer_size(3, 65_536).unwrap();
        p.set_tcp_cork(3, true).unwrap();
        assert_eq!(p.receive_buffer_size(3).unwrap(), 65_536);
        assert!(p.is_tcp_cork(3).unwrap());
    }

    #[test]
    fn linger_disabled_is_none() {
        let p = platform();
        p.set_so_linger(3, None).unwrap();
        assert_eq!(p.so_linger(3).unwrap(), None);
        p.set_so_linger(3, Some(5)).unwrap();
        assert_eq!(p.so_linger(3).unwrap(), Some(5));
    }

    #[test]
    fn failures_use_sockopt_labels() {
        let p = platform();
        p.sys().script(Op::GetSockOpt, [-22]);
        let err = p.traffic_class(3).unwrap_err();
        assert_eq!(err.op(), Some(Op::GetSockOpt));
        assert_eq!(err.to_string(), "Error while getsockopt(...): Invalid argument");

        p.sys().script(Op::SetSockOpt, [-9]);
        assert_eq!(p.set_broadcast(3, true), Err(Failure::ClosedResource));
    }

    #[test]
    fn option_table_is_complete() {
        assert_eq!(SocketOption::ALL.len(), 13);
        assert_eq!(SocketOption::ALL.iter().filter(|o| o.is_flag()).count(), 6);
        assert_eq!(SocketOption::TcpKeepInterval.name(), "TCP_KEEPINTVL");
    }
}
