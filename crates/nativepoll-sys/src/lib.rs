//! # nativepoll-sys
//!
//! The Linux implementation of [`nativepoll_core::Syscall`], built directly
//! on `libc`. Every call returns the raw `-errno` convention and leaves
//! classification to the core.
//!
//! Sockets are opened as non-blocking, close-on-exec, dual-stack `AF_INET6`
//! sockets, so IPv4 peers appear as IPv4-mapped addresses.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
mod sockaddr;

#[cfg(target_os = "linux")]
pub use linux::LinuxSyscalls;

#[cfg(target_os = "linux")]
use nativepoll_core::{Config, Platform, PlatformError};

/// Bootstrap a platform over the host kernel with `config`.
#[cfg(target_os = "linux")]
pub fn platform(config: &Config) -> Result<Platform<LinuxSyscalls>, PlatformError> {
    Platform::init(LinuxSyscalls::new(), config)
}

/// Bootstrap a platform configured from the environment.
#[cfg(target_os = "linux")]
pub fn platform_from_env() -> Result<Platform<LinuxSyscalls>, PlatformError> {
    platform(&Config::from_env())
}
