//! Store configuration
//!
//! Configuration is plain serde data, so it can be written inline or loaded
//! from RON alongside record type declarations.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `begin` does when another transaction holds the writer slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriterWait {
    /// Fail immediately with `WriteInProgress`
    #[default]
    FailFast,
    /// Wait until the slot is released
    Block,
    /// Wait up to the given number of milliseconds
    Timeout(u64),
}

impl WriterWait {
    /// Timeout as a duration, if this is `Timeout`
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            WriterWait::Timeout(ms) => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// Configuration for a [`Store`](crate::Store)
///
/// # Example
///
/// ```
/// use trove_store::{StoreConfig, WriterWait};
///
/// let config = StoreConfig::from_ron_str("(name: \"garage\", writer_wait: Timeout(50))").unwrap();
/// assert_eq!(config.name(), "garage");
/// assert_eq!(config.writer_wait(), WriterWait::Timeout(50));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Identifier used in logs and errors
    #[serde(default = "default_name")]
    name: String,
    /// Writer-slot contention behaviour
    #[serde(default)]
    writer_wait: WriterWait,
}

fn default_name() -> String {
    "default".to_string()
}

impl StoreConfig {
    /// Create a configuration with the given store name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            writer_wait: WriterWait::default(),
        }
    }

    /// Alias for [`StoreConfig::new`]; every store lives in memory
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name)
    }

    /// Set the writer-slot contention behaviour
    pub fn with_writer_wait(mut self, wait: WriterWait) -> Self {
        self.writer_wait = wait;
        self
    }

    /// Parse a configuration from RON
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writer-slot contention behaviour
    pub fn writer_wait(&self) -> WriterWait {
        self.writer_wait
    }

    /// Change the writer-slot contention behaviour
    pub fn set_writer_wait(&mut self, wait: WriterWait) {
        self.writer_wait = wait;
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(default_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.name(), "default");
        assert_eq!(config.writer_wait(), WriterWait::FailFast);
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::in_memory("cars").with_writer_wait(WriterWait::Block);
        assert_eq!(config.name(), "cars");
        assert_eq!(config.writer_wait(), WriterWait::Block);
        assert_eq!(config.writer_wait().timeout(), None);
    }

    #[test]
    fn test_from_ron_defaults_missing_fields() {
        let config = StoreConfig::from_ron_str("()").unwrap();
        assert_eq!(config, StoreConfig::default());

        let config = StoreConfig::from_ron_str("(writer_wait: Timeout(250))").unwrap();
        assert_eq!(
            config.writer_wait().timeout(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_from_ron_invalid() {
        assert!(matches!(
            StoreConfig::from_ron_str("(writer_wait: Sometimes)"),
            Err(Error::InvalidConfig(_))
        ));
    }
}
