//! Engine configuration.

use crate::error::{StoreError, StoreResult};
use crate::model::MAX_DETAIL;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for opening an engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database file path.
    pub path: PathBuf,

    /// Number of writer sessions.
    pub writers: usize,

    /// Number of reader sessions.
    pub readers: usize,

    /// Whether to delete the database file (and its WAL companions) before opening.
    pub purge_on_open: bool,

    /// Detail level used for untagged fields.
    pub default_detail: u8,

    /// Capacity of each watch's event queue.
    pub watch_queue_size: usize,

    /// How long a session waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("inventory.db"),
            writers: 1,
            readers: 4,
            purge_on_open: false,
            default_detail: 0,
            watch_queue_size: 10_000,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the database file path.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the number of writer sessions.
    #[must_use]
    pub const fn writers(mut self, writers: usize) -> Self {
        self.writers = writers;
        self
    }

    /// Sets the number of reader sessions.
    #[must_use]
    pub const fn readers(mut self, readers: usize) -> Self {
        self.readers = readers;
        self
    }

    /// Sets whether the database file is deleted before opening.
    #[must_use]
    pub const fn purge_on_open(mut self, value: bool) -> Self {
        self.purge_on_open = value;
        self
    }

    /// Sets the default detail level.
    #[must_use]
    pub const fn default_detail(mut self, detail: u8) -> Self {
        self.default_detail = detail;
        self
    }

    /// Sets the per-watch queue capacity.
    #[must_use]
    pub const fn watch_queue_size(mut self, size: usize) -> Self {
        self.watch_queue_size = size;
        self
    }

    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.writers == 0 {
            return Err(StoreError::invalid_operation("writers must be at least 1"));
        }
        if self.readers == 0 {
            return Err(StoreError::invalid_operation("readers must be at least 1"));
        }
        if self.default_detail > MAX_DETAIL {
            return Err(StoreError::DetailOutOfRange {
                detail: u32::from(self.default_detail),
            });
        }
        if self.watch_queue_size == 0 {
            return Err(StoreError::invalid_operation(
                "watch_queue_size must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.writers, 1);
        assert_eq!(config.readers, 4);
        assert!(!config.purge_on_open);
        assert_eq!(config.default_detail, 0);
        assert_eq!(config.watch_queue_size, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .path("/tmp/inv.db")
            .readers(2)
            .purge_on_open(true)
            .watch_queue_size(16);

        assert_eq!(config.path, PathBuf::from("/tmp/inv.db"));
        assert_eq!(config.readers, 2);
        assert!(config.purge_on_open);
        assert_eq!(config.watch_queue_size, 16);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(Config::new().writers(0).validate().is_err());
        assert!(Config::new().readers(0).validate().is_err());
        assert!(Config::new().watch_queue_size(0).validate().is_err());
        assert!(matches!(
            Config::new().default_detail(10).validate(),
            Err(StoreError::DetailOutOfRange { detail: 10 })
        ));
    }
}
