//! Structured JSONL logging.
//!
//! - [`LogEntry`]: one log record with required + optional fields.
//! - [`LogEmitter`]: writes entries as JSON lines to stderr, a file or a
//!   shared in-memory buffer, dropping anything below its threshold.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Severity level. `Off` is only meaningful as a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Parse from string (case-insensitive). Unknown values yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "off" | "none" | "disabled" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Structured log record.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fd: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    #[must_use]
    pub fn new(level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: String::new(),
            level,
            event: event.into(),
            op: None,
            fd: None,
            errno: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    #[must_use]
    pub fn with_fd(mut self, fd: i32) -> Self {
        self.fd = Some(fd);
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// In-memory sink that stays readable after being handed to an emitter.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Parsed entries, skipping lines that are not valid records.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.contents()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes structured JSONL entries to a sink.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    threshold: LogLevel,
    run_id: String,
    seq: u64,
}

impl std::fmt::Debug for LogEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEmitter")
            .field("threshold", &self.threshold)
            .field("run_id", &self.run_id)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl LogEmitter {
    #[must_use]
    pub fn to_stderr(threshold: LogLevel) -> Self {
        Self::to_writer(Box::new(std::io::stderr()), threshold)
    }

    pub fn to_file(path: &Path, threshold: LogLevel) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::to_writer(
            Box::new(std::io::LineWriter::new(file)),
            threshold,
        ))
    }

    #[must_use]
    pub fn to_shared(buffer: SharedBuffer, threshold: LogLevel) -> Self {
        Self::to_writer(Box::new(buffer), threshold)
    }

    #[must_use]
    pub fn to_writer(writer: Box<dyn Write + Send>, threshold: LogLevel) -> Self {
        Self {
            writer,
            threshold,
            run_id: format!("nativepoll-{}", std::process::id()),
            seq: 0,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> LogLevel {
        self.threshold
    }

    /// Returns true if an entry at `level` would be written.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level >= self.threshold
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{:06}", self.run_id, self.seq)
    }

    /// Emit an entry if it clears the threshold. Returns whether it was written.
    pub fn emit(&mut self, mut entry: LogEntry) -> std::io::Result<bool> {
        if !self.enabled(entry.level) {
            return Ok(false);
        }
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        Ok(true)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// RFC 3339 UTC timestamp with millisecond precision.
fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        duration.subsec_millis(),
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_required_fields_only() {
        let entry = LogEntry::new(LogLevel::Info, "platform_init");
        let parsed: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "platform_init");
        assert!(parsed.get("op").is_none());
        assert!(parsed.get("errno").is_none());
    }

    #[test]
    fn emitter_filters_below_threshold() {
        let buffer = SharedBuffer::new();
        let mut emitter = LogEmitter::to_shared(buffer.clone(), LogLevel::Info);
        assert!(!emitter.emit(LogEntry::new(LogLevel::Debug, "dropped")).unwrap());
        assert!(emitter.emit(LogEntry::new(LogLevel::Warn, "kept")).unwrap());
        let entries = buffer.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "kept");
        assert!(entries[0].trace_id.ends_with("::000001"));
    }

    #[test]
    fn off_threshold_drops_everything() {
        let buffer = SharedBuffer::new();
        let mut emitter = LogEmitter::to_shared(buffer.clone(), LogLevel::Off);
        assert!(!emitter.emit(LogEntry::new(LogLevel::Error, "x")).unwrap());
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn optional_fields_round_trip() {
        let buffer = SharedBuffer::new();
        let mut emitter = LogEmitter::to_shared(buffer.clone(), LogLevel::Trace);
        emitter
            .emit(
                LogEntry::new(LogLevel::Debug, "io_failure")
                    .with_op("write")
                    .with_fd(7)
                    .with_errno(104),
            )
            .unwrap();
        let entry = &buffer.entries()[0];
        assert_eq!(entry.op.as_deref(), Some("write"));
        assert_eq!(entry.fd, Some(7));
        assert_eq!(entry.errno, Some(104));
    }

    #[test]
    fn level_parse_and_order() {
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse(" debug "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("none"), Some(LogLevel::Off));
        assert_eq!(LogLevel::parse("loud"), None);
        assert!(LogLevel::Trace < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Off);
    }

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }
}
