use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use schemat_types::{IdRange, ItemId};

use crate::error::{DbError, DbResult};
use crate::index::IndexDescriptor;

/// Default delay between a write and the flush it schedules.
pub const DEFAULT_FLUSH_DELAY_MS: u64 = 1000;

/// Describes one ring of the stack.
///
/// A ring is backed by a JSON-lines file (`file`), by the descriptor stored
/// in an existing record of a lower ring (`item`), or, with neither, by
/// memory only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingDescriptor {
    /// Path of the block file.
    pub file: Option<PathBuf>,
    /// Id of a record in a lower ring whose data is a ring descriptor.
    pub item: Option<ItemId>,
    /// Human-readable name used by admin operations.
    pub name: Option<String>,
    /// Reject every write.
    pub readonly: bool,
    /// First id (inclusive) the ring accepts.
    pub start_id: ItemId,
    /// Upper id bound (exclusive); `None` is unbounded.
    pub stop_id: Option<ItemId>,
    /// Secondary indexes maintained over the ring's records.
    pub indexes: Vec<IndexDescriptor>,
}

impl RingDescriptor {
    /// A writable in-memory ring covering `[start, stop)`.
    pub fn memory(start: u64, stop: Option<u64>) -> Self {
        Self {
            start_id: ItemId::new(start),
            stop_id: stop.map(ItemId::new),
            ..Default::default()
        }
    }

    /// A writable file-backed ring covering `[start, stop)`.
    pub fn file(path: impl Into<PathBuf>, start: u64, stop: Option<u64>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::memory(start, stop)
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn range(&self) -> IdRange {
        IdRange {
            start: Some(self.start_id),
            stop: self.stop_id,
        }
    }

    /// Check the id range and the backing choice.
    pub fn validate(&self) -> DbResult<()> {
        if let Some(stop) = self.stop_id {
            if stop <= self.start_id {
                return Err(DbError::Config(format!(
                    "ring {}: stop_id {stop} must exceed start_id {}",
                    self.label(),
                    self.start_id
                )));
            }
        }
        if self.file.is_some() && self.item.is_some() {
            return Err(DbError::Config(format!(
                "ring {}: `file` and `item` are mutually exclusive",
                self.label()
            )));
        }
        Ok(())
    }

    /// Combine with the descriptor stored in an `item` record.
    ///
    /// Fields set here take precedence; `readonly` is sticky and index lists
    /// are concatenated.
    pub fn merge_stored(&self, stored: RingDescriptor) -> DbResult<RingDescriptor> {
        if stored.item.is_some() {
            return Err(DbError::Config(format!(
                "ring {}: stored descriptor may not itself reference an item",
                self.label()
            )));
        }
        let mut indexes = self.indexes.clone();
        indexes.extend(stored.indexes);
        Ok(RingDescriptor {
            file: stored.file,
            item: None,
            name: self.name.clone().or(stored.name),
            readonly: self.readonly || stored.readonly,
            start_id: if self.start_id.get() > 0 {
                self.start_id
            } else {
                stored.start_id
            },
            stop_id: self.stop_id.or(stored.stop_id),
            indexes,
        })
    }

    pub(crate) fn label(&self) -> String {
        match (&self.name, &self.file) {
            (Some(name), _) => name.clone(),
            (None, Some(file)) => file.display().to_string(),
            (None, None) => format!("@{}", self.start_id),
        }
    }
}

/// Top-level database configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Debounce delay for block flushes.
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
    /// Rings from innermost (bottom) to outermost (top).
    #[serde(default, rename = "ring")]
    pub rings: Vec<RingDescriptor>,
}

fn default_flush_delay_ms() -> u64 {
    DEFAULT_FLUSH_DELAY_MS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            rings: Vec::new(),
            flush_delay_ms: DEFAULT_FLUSH_DELAY_MS,
        }
    }
}

impl DatabaseConfig {
    pub fn new(rings: Vec<RingDescriptor>) -> Self {
        Self {
            rings,
            ..Default::default()
        }
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn from_toml_str(text: &str) -> DbResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| DbError::Config(e.to_string()))?;
        for ring in &config.rings {
            ring.validate()?;
        }
        Ok(config)
    }

    /// Load from a TOML file. Relative ring file paths are resolved against
    /// the config file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            for ring in &mut config.rings {
                if let Some(file) = ring.file.as_mut() {
                    if file.is_relative() {
                        *file = base.join(&*file);
                    }
                }
            }
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> DbResult<String> {
        toml::to_string(self).map_err(|e| DbError::Config(e.to_string()))
    }
}
