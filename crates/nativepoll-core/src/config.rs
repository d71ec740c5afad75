//! Runtime configuration.
//!
//! Read from environment variables:
//! - `NATIVEPOLL_LOG`: log threshold, `trace|debug|info|warn|error|off`
//!   (default `warn`). Cached process-wide on first read.
//! - `NATIVEPOLL_ERRNO_TABLE`: errno catalog size, clamped to
//!   `[MIN_CATALOG_SIZE, MAX_CATALOG_SIZE]` (default 1024).
//! - `NATIVEPOLL_REQUIRED_OS`: OS name prefix the native adapter was built
//!   for (default `linux`).

use std::sync::atomic::{AtomicU8, Ordering};

use crate::errno::DEFAULT_CATALOG_SIZE;
use crate::log::LogLevel;

pub const ENV_LOG: &str = "NATIVEPOLL_LOG";
pub const ENV_ERRNO_TABLE: &str = "NATIVEPOLL_ERRNO_TABLE";
pub const ENV_REQUIRED_OS: &str = "NATIVEPOLL_REQUIRED_OS";

pub const MIN_CATALOG_SIZE: usize = 256;
pub const MAX_CATALOG_SIZE: usize = 4096;

const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Warn;
const DEFAULT_REQUIRED_OS: &str = "linux";

/// Settings consumed by [`Platform::init`](crate::Platform::init).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub errno_table_size: usize,
    pub required_os: String,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            errno_table_size: DEFAULT_CATALOG_SIZE,
            required_os: DEFAULT_REQUIRED_OS.to_string(),
            log_level: DEFAULT_LOG_LEVEL,
        }
    }
}

impl Config {
    /// Configuration from the process environment. The log level goes
    /// through the process-wide cache.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        config.log_level = log_level();
        config
    }

    /// Configuration from an arbitrary key lookup. Invalid values fall back
    /// to defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let errno_table_size = lookup(ENV_ERRNO_TABLE)
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .map_or(defaults.errno_table_size, |n| {
                n.clamp(MIN_CATALOG_SIZE, MAX_CATALOG_SIZE)
            });
        let required_os = lookup(ENV_REQUIRED_OS)
            .map(|raw| raw.trim().to_ascii_lowercase())
            .filter(|raw| !raw.is_empty())
            .unwrap_or(defaults.required_os);
        let log_level = lookup(ENV_LOG)
            .and_then(|raw| LogLevel::parse(&raw))
            .unwrap_or(defaults.log_level);
        Self {
            errno_table_size,
            required_os,
            log_level,
        }
    }
}

// Atomic cache: 0=unresolved, otherwise level index + 1.
static CACHED_LEVEL: AtomicU8 = AtomicU8::new(0);

const LEVEL_UNRESOLVED: u8 = 0;

fn level_to_u8(level: LogLevel) -> u8 {
    match level {
        LogLevel::Trace => 1,
        LogLevel::Debug => 2,
        LogLevel::Info => 3,
        LogLevel::Warn => 4,
        LogLevel::Error => 5,
        LogLevel::Off => 6,
    }
}

fn u8_to_level(v: u8) -> LogLevel {
    match v {
        1 => LogLevel::Trace,
        2 => LogLevel::Debug,
        3 => LogLevel::Info,
        5 => LogLevel::Error,
        6 => LogLevel::Off,
        _ => LogLevel::Warn,
    }
}

/// The configured log threshold (reads `NATIVEPOLL_LOG` on first call,
/// caches thereafter).
#[must_use]
pub fn log_level() -> LogLevel {
    let cached = CACHED_LEVEL.load(Ordering::Acquire);
    if cached != LEVEL_UNRESOLVED {
        return u8_to_level(cached);
    }
    let level = std::env::var(ENV_LOG)
        .ok()
        .and_then(|raw| LogLevel::parse(&raw))
        .unwrap_or(DEFAULT_LOG_LEVEL);
    // A racing thread read the same environment; either store wins.
    CACHED_LEVEL.store(level_to_u8(level), Ordering::Release);
    level
}
