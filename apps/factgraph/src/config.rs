//! # Configuration
//!
//! Settings come from three layers, highest precedence first:
//! 1. Command-line flags
//! 2. Environment variables (`FACTGRAPH_*`)
//! 3. A `factgraph.toml` file, found by walking up from the working
//!    directory and then up from the home directory
//!
//! ```toml
//! [store]
//! location = "/path/to/project"   # or ":memory:"
//! backend = "redb"                # or "memory"
//!
//! [log]
//! format = "json"                 # or "text"
//! filter = "factgraph=debug"
//! ```

use factgraph_core::FactGraphError;
use factgraph_core::repository::search_path;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the config file searched for.
pub const CONFIG_FILE: &str = "factgraph.toml";

/// Section used for keys given without one.
const DEFAULT_SECTION: &str = "settings";

// =============================================================================
// FILE CONFIG
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    store: StoreSection,
    log: LogSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct StoreSection {
    location: Option<String>,
    backend: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LogSection {
    format: Option<String>,
    filter: Option<String>,
}

/// A parsed config file.
#[derive(Debug, Clone, Default)]
pub struct Config {
    path: Option<PathBuf>,
    table: toml::Table,
    file: FileConfig,
}

impl Config {
    /// Find and parse the nearest config file; no file gives an empty config.
    pub fn load(start: &Path) -> Result<Self, FactGraphError> {
        match locate_config_file(start) {
            Some(path) => Self::read(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a config file.
    pub fn read(path: &Path) -> Result<Self, FactGraphError> {
        tracing::debug!(path = %path.display(), "reading config");
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&text)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config text.
    pub fn parse(text: &str) -> Result<Self, FactGraphError> {
        let config_error = |e: toml::de::Error| FactGraphError::Config(e.to_string());
        Ok(Self {
            path: None,
            table: toml::from_str(text).map_err(config_error)?,
            file: toml::from_str(text).map_err(config_error)?,
        })
    }

    /// The file this config was read from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up `section.option` in the file. A key without a dot is read
    /// from the `[settings]` section.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let (section, option) = key.split_once('.').unwrap_or((DEFAULT_SECTION, key));
        match self.table.get(section)?.as_table()?.get(option)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(x) => Some(x.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            toml::Value::Datetime(dt) => Some(dt.to_string()),
            toml::Value::Array(_) | toml::Value::Table(_) => None,
        }
    }

    /// Look up a key in the environment, then in the file.
    ///
    /// Keys containing `SECRET` are required.
    pub fn get(&self, key: &str) -> Result<Option<String>, FactGraphError> {
        self.get_from(key, |name| std::env::var(name).ok())
    }

    /// `get` with an explicit environment.
    pub fn get_from(
        &self,
        key: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<String>, FactGraphError> {
        let value = env(key).or_else(|| self.lookup(key));
        if value.is_none() && key.contains("SECRET") {
            return Err(FactGraphError::Config(format!(
                "required config definition {key} missing"
            )));
        }
        Ok(value)
    }

    /// Resolve the effective settings against an environment.
    pub fn settings(&self, env: impl Fn(&str) -> Option<String>) -> Settings {
        Settings {
            location: env("FACTGRAPH_LOCATION").or_else(|| self.file.store.location.clone()),
            backend: env("FACTGRAPH_BACKEND").or_else(|| self.file.store.backend.clone()),
            log_format: env("FACTGRAPH_LOG_FORMAT").or_else(|| self.file.log.format.clone()),
            log_filter: env("FACTGRAPH_LOG").or_else(|| self.file.log.filter.clone()),
        }
    }
}

/// Find the nearest `factgraph.toml`.
pub fn locate_config_file(start: &Path) -> Option<PathBuf> {
    search_path(start)
        .into_iter()
        .map(|dir| dir.join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Effective settings after the environment and file are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub location: Option<String>,
    pub backend: Option<String>,
    pub log_format: Option<String>,
    pub log_filter: Option<String>,
}

impl Settings {
    /// Whether logs should be JSON.
    pub fn json_logs(&self) -> bool {
        self.log_format.as_deref() == Some("json")
    }
}
