//! Bus configuration.
//!
//! All fields have defaults, so an empty TOML table yields
//! [`BusConfig::default()`]:
//!
//! ```toml
//! catch_panics = true
//! warn_on_unhandled = false
//! default_priority = 0
//! ```

use crate::error::EventError;
use crate::events::EventPriority;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_catch_panics() -> bool {
    true
}

fn default_priority() -> i32 {
    EventPriority::NORMAL
}

/// Runtime settings for an [`EventBus`](crate::EventBus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Convert panics in inline handlers into `EventError::HandlerPanicked`
    /// instead of unwinding through `publish`
    #[serde(default = "default_catch_panics")]
    pub catch_panics: bool,
    /// Log at `warn` (instead of `trace`) when an event has no handlers
    #[serde(default)]
    pub warn_on_unhandled: bool,
    /// Priority given to handlers registered without an explicit one
    #[serde(default = "default_priority")]
    pub default_priority: i32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            catch_panics: default_catch_panics(),
            warn_on_unhandled: false,
            default_priority: default_priority(),
        }
    }
}

impl BusConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, EventError> {
        toml::from_str(content).map_err(|e| EventError::Config(e.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EventError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EventError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, EventError> {
        toml::to_string_pretty(self).map_err(|e| EventError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_document_yields_defaults() {
        let config = BusConfig::from_toml("").unwrap();
        assert_eq!(config, BusConfig::default());
        assert!(config.catch_panics);
        assert!(!config.warn_on_unhandled);
        assert_eq!(config.default_priority, EventPriority::NORMAL);
    }

    #[test]
    fn partial_documents_keep_other_defaults() {
        let config = BusConfig::from_toml("default_priority = 100\n").unwrap();
        assert_eq!(config.default_priority, 100);
        assert!(config.catch_panics);
    }

    #[test]
    fn invalid_documents_are_config_errors() {
        let err = BusConfig::from_toml("catch_panics = \"sometimes\"").unwrap_err();
        assert!(matches!(err, EventError::Config(_)));
    }

    #[test]
    fn round_trips_through_a_file() {
        let config = BusConfig {
            catch_panics: false,
            warn_on_unhandled: true,
            default_priority: -100,
        };
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        let loaded = BusConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = BusConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("not/here.toml"));
    }
}
