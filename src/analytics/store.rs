//! Whole-file JSON persistence for key counts
//!
//! The analytics file is an array of `{"key", "count"}` records sorted by
//! count descending, rewritten in full on every save. There is no
//! locking or schema versioning; the daemon is the only writer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::KeyCountEntry;

/// Reads and writes the analytics file.
#[derive(Debug, Clone)]
pub struct AnalyticsStore {
    path: PathBuf,
}

impl AnalyticsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved counts. A missing or unreadable file is an empty start,
    /// never an error.
    pub fn load(&self) -> Vec<KeyCountEntry> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no analytics file yet");
                return Vec::new();
            }
            Err(e) => {
                warn!(?e, path = %self.path.display(), "failed to read analytics file");
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(?e, path = %self.path.display(), "analytics file is corrupt, starting fresh");
                Vec::new()
            }
        }
    }

    /// Write the full entry list, pretty-printed.
    pub fn save(&self, entries: &[KeyCountEntry]) -> Result<()> {
        let json =
            serde_json::to_string_pretty(entries).context("failed to serialize analytics")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> AnalyticsStore {
        let path = std::env::temp_dir().join(format!(
            "keyscope-store-test-{}-{name}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        AnalyticsStore::new(path)
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let store = temp_store("round-trip");
        let entries = vec![
            KeyCountEntry { key: "Space".into(), count: 31 },
            KeyCountEntry { key: "KeyE".into(), count: 12 },
        ];

        store.save(&entries).unwrap();
        assert_eq!(store.load(), entries);

        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let store = temp_store("missing");
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let store = temp_store("corrupt");
        std::fs::write(store.path(), b"not json at all").unwrap();

        assert!(store.load().is_empty());

        let _ = std::fs::remove_file(store.path());
    }

    #[test]
    fn test_saved_file_is_a_sorted_array() {
        let store = temp_store("shape");
        store
            .save(&[
                KeyCountEntry { key: "KeyA".into(), count: 9 },
                KeyCountEntry { key: "KeyB".into(), count: 3 },
            ])
            .unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.trim_start().starts_with('['));
        assert!(text.contains("\"key\": \"KeyA\""));
        assert!(text.contains("\"count\": 9"));

        let _ = std::fs::remove_file(store.path());
    }
}
