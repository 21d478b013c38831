//! Most-recently-used list of committed search patterns.
//!
//! The list is bounded to [`HISTORY_LIMIT`] entries, most recent first, with
//! no duplicates. Storage is pluggable: [`SessionStorage`] lives as long as
//! the console session, [`FileStorage`] survives restarts.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::Result;

pub const HISTORY_LIMIT: usize = 10;

/// Storage key the history is persisted under
pub const HISTORY_STORAGE_KEY: &str = "keyscope.searchHistory";

/// String key-value storage the history is written through.
pub trait HistoryStorage: Send {
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-memory storage scoped to one console session.
#[derive(Debug, Default, Clone)]
pub struct SessionStorage {
    entries: HashMap<String, String>,
}

impl SessionStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStorage for SessionStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per storage key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl HistoryStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

/// Bounded MRU list of search patterns.
pub struct SearchHistory {
    entries: Vec<String>,
    storage: Box<dyn HistoryStorage>,
}

impl std::fmt::Debug for SearchHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchHistory")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl SearchHistory {
    /// Load history from storage. Missing or malformed data yields an empty
    /// list.
    #[must_use]
    pub fn load(storage: Box<dyn HistoryStorage>) -> Self {
        let entries = match storage.read(HISTORY_STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(list) => sanitize(list),
                Err(e) => {
                    warn!("Ignoring malformed search history: {e}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read search history: {e}");
                Vec::new()
            }
        };

        debug!("Loaded {} search history entries", entries.len());
        Self { entries, storage }
    }

    /// History backed by a fresh [`SessionStorage`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::load(Box::new(SessionStorage::new()))
    }

    /// Record a committed pattern. Blank patterns are ignored. Returns whether
    /// the list changed.
    pub fn record(&mut self, pattern: &str) -> bool {
        let Some(next) = recorded(&self.entries, pattern) else {
            return false;
        };
        if next == self.entries {
            return false;
        }
        self.entries = next;
        self.persist();
        true
    }

    /// Move a previously searched pattern back to the top. Same rules as
    /// [`record`](Self::record).
    pub fn promote(&mut self, pattern: &str) -> bool {
        self.record(pattern)
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.clear();
        self.persist();
    }

    fn persist(&mut self) {
        let raw = match serde_json::to_string(&self.entries) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize search history: {e}");
                return;
            }
        };
        if let Err(e) = self.storage.write(HISTORY_STORAGE_KEY, &raw) {
            warn!("Failed to persist search history: {e}");
        }
    }
}

/// The list that results from recording `pattern` on top of `entries`, or
/// `None` when the pattern is blank.
pub(crate) fn recorded(entries: &[String], pattern: &str) -> Option<Vec<String>> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return None;
    }

    let mut next = Vec::with_capacity(HISTORY_LIMIT);
    next.push(pattern.to_string());
    next.extend(entries.iter().filter(|e| *e != pattern).cloned());
    next.truncate(HISTORY_LIMIT);
    Some(next)
}

/// Drop blanks and duplicates (keeping the first occurrence) and enforce the
/// size bound on a list read from storage.
fn sanitize(list: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(HISTORY_LIMIT);
    for entry in list {
        let entry = entry.trim();
        if entry.is_empty() || out.iter().any(|e| e == entry) {
            continue;
        }
        out.push(entry.to_string());
        if out.len() == HISTORY_LIMIT {
            break;
        }
    }
    out
}
