//! Sync checkpoint persistence.
//!
//! A single small text file holds the timestamp of the last successful
//! synchronization, in the feed's own textual format. Absence is a valid
//! state (first run) and maps to a default look-back window. One writer at
//! a time is assumed; there is no locking.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

/// Textual timestamp format shared by the checkpoint file and the feed's
/// date-window query parameters.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000";

/// Look-back window applied when no checkpoint has been persisted yet.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;

/// Render a UTC instant in the feed timestamp format.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// The current instant in the feed timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// File-backed watermark bounding the next incremental sync window.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted timestamp, or the default look-back start when no
    /// checkpoint exists yet.
    pub fn load(&self) -> Result<String> {
        if self.path.exists() {
            let raw = std::fs::read_to_string(&self.path).with_context(|| {
                format!("Failed to read checkpoint file: {}", self.path.display())
            })?;
            return Ok(raw.trim().to_string());
        }

        Ok(format_timestamp(
            Utc::now() - Duration::days(DEFAULT_LOOKBACK_DAYS),
        ))
    }

    /// Overwrite the persisted timestamp. Called only after a sync attempt
    /// completes; an interrupted sync leaves the previous value in place.
    pub fn save(&self, timestamp: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, timestamp).with_context(|| {
            format!("Failed to write checkpoint file: {}", self.path.display())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    fn parse(ts: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).expect("timestamp format")
    }

    #[test]
    fn test_default_lookback_when_absent() {
        let tmp = TempDir::new().unwrap();
        let cp = Checkpoint::new(tmp.path().join("last_update.txt"));

        let loaded = parse(&cp.load().unwrap());
        let expected = (Utc::now() - Duration::days(DEFAULT_LOOKBACK_DAYS)).naive_utc();
        let drift = (expected - loaded).num_seconds().abs();
        assert!(drift <= 5, "default lookback drifted by {}s", drift);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let cp = Checkpoint::new(tmp.path().join("last_update.txt"));

        cp.save("2024-06-01T12:00:00.000").unwrap();
        assert_eq!(cp.load().unwrap(), "2024-06-01T12:00:00.000");
    }

    #[test]
    fn test_save_overwrites() {
        let tmp = TempDir::new().unwrap();
        let cp = Checkpoint::new(tmp.path().join("last_update.txt"));

        cp.save("2024-06-01T12:00:00.000").unwrap();
        cp.save("2024-06-02T12:00:00.000").unwrap();
        assert_eq!(cp.load().unwrap(), "2024-06-02T12:00:00.000");
    }

    #[test]
    fn test_monotonic_after_sync() {
        let tmp = TempDir::new().unwrap();
        let cp = Checkpoint::new(tmp.path().join("last_update.txt"));

        let now = now_timestamp();
        cp.save(&now).unwrap();
        assert!(parse(&cp.load().unwrap()) >= parse(&now));
    }

    #[test]
    fn test_load_trims_whitespace() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("last_update.txt");
        std::fs::write(&path, "2024-06-01T12:00:00.000\n").unwrap();

        let cp = Checkpoint::new(path);
        assert_eq!(cp.load().unwrap(), "2024-06-01T12:00:00.000");
    }
}
