//! `count()` storage that survives restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use botscript_core::CounterProvider;

use crate::error::CliError;

/// Channel → command → count.
type Counts = BTreeMap<String, BTreeMap<String, i64>>;

/// Counter provider backed by a JSON file, rewritten after every increment.
///
/// The mutex is held across the write, so concurrent increments are
/// serialized. A failed write does not fail the increment; it marks the
/// counter unsaved until a later write or [`flush`](Self::flush) succeeds.
pub struct FileCounter {
    path: PathBuf,
    counts: Mutex<Counts>,
    unsaved: AtomicBool,
}

impl FileCounter {
    /// Opens the counter file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CliError> {
        let path = path.into();
        let counts = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                CliError::Config(format!("invalid counter file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Counts::new(),
            Err(e) => return Err(CliError::Io(e)),
        };
        Ok(Self {
            path,
            counts: Mutex::new(counts),
            unsaved: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, channel: &str, command: &str) -> i64 {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts
            .get(channel)
            .and_then(|commands| commands.get(command))
            .copied()
            .unwrap_or(0)
    }

    /// False when the file is behind the in-memory counts.
    pub fn is_saved(&self) -> bool {
        !self.unsaved.load(Ordering::SeqCst)
    }

    /// Writes the current counts.
    pub fn flush(&self) -> Result<(), CliError> {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        self.persist(&counts)?;
        self.unsaved.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn persist(&self, counts: &Counts) -> Result<(), CliError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(counts)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl CounterProvider for FileCounter {
    fn increment(&self, channel: &str, command: &str) -> i64 {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts
            .entry(channel.to_string())
            .or_default()
            .entry(command.to_string())
            .or_insert(0);
        *count += 1;
        let value = *count;

        match self.persist(&counts) {
            Ok(()) => {
                self.unsaved.store(false, Ordering::SeqCst);
                debug!(channel, command, value, "counter saved");
            }
            Err(e) => {
                self.unsaved.store(true, Ordering::SeqCst);
                warn!(path = %self.path.display(), error = %e, "failed to save counters");
            }
        }
        value
    }
}
