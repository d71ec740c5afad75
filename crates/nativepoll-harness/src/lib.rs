//! Reports produced by `nativepoll-probe`.
//!
//! Kept separate from the binary so the rendering can be tested against the
//! scripted adapter.

use std::io::Write;

use nativepoll_core::{Platform, PlatformError, Syscall};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("platform bootstrap failed: {0}")]
    Platform(#[from] PlatformError),
    #[error("errno {code} is outside the catalog (0..{size})")]
    OutOfRange { code: i32, size: usize },
    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: i32,
    pub message: String,
}

/// The catalog entry for `code`.
pub fn errno_entry<S: Syscall>(platform: &Platform<S>, code: i32) -> Result<CatalogEntry, ProbeError> {
    let size = platform.catalog().len();
    if usize::try_from(code).map_or(true, |c| c >= size) {
        return Err(ProbeError::OutOfRange { code, size });
    }
    Ok(CatalogEntry {
        code,
        message: platform.describe(code),
    })
}

/// The first `limit` catalog entries (all of them when `None`).
pub fn catalog_entries<S: Syscall>(platform: &Platform<S>, limit: Option<usize>) -> Vec<CatalogEntry> {
    platform
        .catalog()
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(code, message)| CatalogEntry {
            code,
            message: message.to_string(),
        })
        .collect()
}

/// Host facts as pretty JSON.
pub fn info_json<S: Syscall>(platform: &Platform<S>) -> Result<String, ProbeError> {
    Ok(serde_json::to_string_pretty(platform.info())?)
}

/// One JSON object per line.
pub fn write_jsonl<W: Write>(entries: &[CatalogEntry], out: &mut W) -> Result<(), ProbeError> {
    for entry in entries {
        serde_json::to_writer(&mut *out, entry)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nativepoll_core::Config;
    use nativepoll_core::mock::MockSyscalls;

    fn platform() -> Platform<MockSyscalls> {
        Platform::init(MockSyscalls::new(), &Config::default()).unwrap()
    }

    #[test]
    fn errno_entry_looks_up_message() {
        let p = platform();
        assert_eq!(
            errno_entry(&p, 32).unwrap(),
            CatalogEntry {
                code: 32,
                message: "Broken pipe".to_string(),
            }
        );
        assert!(matches!(
            errno_entry(&p, 5000),
            Err(ProbeError::OutOfRange { code: 5000, size: 1024 })
        ));
        assert!(errno_entry(&p, -1).is_err());
    }

    #[test]
    fn catalog_respects_limit() {
        let p = platform();
        let entries = catalog_entries(&p, Some(3));
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "Success");
        assert_eq!(catalog_entries(&p, None).len(), 1024);
    }

    #[test]
    fn jsonl_has_one_object_per_line() {
        let p = platform();
        let mut out = Vec::new();
        write_jsonl(&catalog_entries(&p, Some(4)), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        let parsed: CatalogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.message, "Operation not permitted");
    }

    #[test]
    fn info_is_json() {
        let p = platform();
        let value: serde_json::Value = serde_json::from_str(&info_json(&p).unwrap()).unwrap();
        assert_eq!(value["os"], "linux");
        assert_eq!(value["supports_sendmmsg"], true);
    }
}
