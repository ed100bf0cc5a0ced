//! Append-only activity log shared by every unit in a run
//!
//! Each action becomes one JSON object per line as it happens:
//! `{"timestamp": ..., "agent": ..., "action": ..., "details": ...}`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A single recorded action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub action: String,
    pub details: Option<String>,
}

/// Line-oriented activity log
#[derive(Debug)]
pub struct ActivityLog {
    path: Option<PathBuf>,
    // Serializes appends so lines from different units never interleave.
    guard: Mutex<()>,
}

impl ActivityLog {
    /// Log appending to `path`; parent directories are created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            guard: Mutex::new(()),
        }
    }

    /// Log that only emits tracing events
    pub fn disabled() -> Self {
        Self {
            path: None,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record an action. Failures to write are reported and otherwise ignored.
    pub fn record(&self, agent: &str, action: &str, details: Option<&str>) -> ActivityEntry {
        let entry = ActivityEntry {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            action: action.to_string(),
            details: details.map(str::to_string),
        };

        info!(agent, action, details = details.unwrap_or(""), "activity");

        if let Some(path) = &self.path {
            let _lock = self.guard.lock();
            if let Err(e) = append_line(path, &entry) {
                warn!(path = %path.display(), error = %e, "Failed to append activity log");
            }
        }
        entry
    }

    /// Read back every entry recorded at `path`
    pub fn read_entries(path: &Path) -> std::io::Result<Vec<ActivityEntry>> {
        let content = fs::read_to_string(path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })
            .collect()
    }
}

fn append_line(path: &Path, entry: &ActivityEntry) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(entry)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_appended_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/session.log");
        let log = ActivityLog::new(&path);

        log.record("Manager", "objective received", Some("analyse app.log"));
        log.record("Worker_1", "task completed", None);

        let entries = ActivityLog::read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].agent, "Manager");
        assert_eq!(entries[0].details.as_deref(), Some("analyse app.log"));
        assert_eq!(entries[1].action, "task completed");
        assert!(entries[1].details.is_none());
    }

    #[test]
    fn test_line_format_has_expected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.log");
        ActivityLog::new(&path).record("A", "act", Some("d"));

        let line = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        for key in ["timestamp", "agent", "action", "details"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let log = ActivityLog::disabled();
        let entry = log.record("A", "act", None);
        assert_eq!(entry.agent, "A");
        assert!(log.path().is_none());
    }
}
