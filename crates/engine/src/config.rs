//! Provider configuration via `arbor.toml`
//!
//! Everything except `connection` has a default, so the smallest valid file
//! is a single `connection = "..."` line.

use arbor_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "arbor.toml";

/// Provider configuration loaded from `arbor.toml`.
///
/// # Example
///
/// ```toml
/// connection = "Database=orders;"
/// schema = "orders"
/// current_user = "batch-import"
/// save_batch_size = 500
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    /// Raw connection string; normalized before use.
    pub connection: String,
    /// Schema name; providers with the same schema and entity set share one model.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Actor recorded by audit stamping until `set_current_user` replaces it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<String>,
    /// Worker threads executing fire-and-forget commits.
    #[serde(default = "default_dispatcher_workers")]
    pub dispatcher_workers: usize,
    /// Queued fire-and-forget commits beyond which new ones run inline.
    #[serde(default = "default_dispatcher_queue_depth")]
    pub dispatcher_queue_depth: usize,
    /// Entities per commit in `save_all`.
    #[serde(default = "default_save_batch_size")]
    pub save_batch_size: usize,
    /// Emit every store statement at debug level under `arbor::provider`.
    #[serde(default)]
    pub log_statements: bool,
}

fn default_schema() -> String {
    "default".to_string()
}

fn default_dispatcher_workers() -> usize {
    2
}

fn default_dispatcher_queue_depth() -> usize {
    4096
}

fn default_save_batch_size() -> usize {
    1000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            connection: String::new(),
            schema: default_schema(),
            current_user: None,
            dispatcher_workers: default_dispatcher_workers(),
            dispatcher_queue_depth: default_dispatcher_queue_depth(),
            save_batch_size: default_save_batch_size(),
            log_statements: false,
        }
    }
}

impl ProviderConfig {
    /// Defaults for the given connection string
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            ..Self::default()
        }
    }

    /// Check values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an empty connection string or a zero
    /// worker count, queue depth, or batch size.
    pub fn validate(&self) -> Result<()> {
        if self.connection.trim().is_empty() {
            return Err(Error::Config("connection must not be empty".to_string()));
        }
        for (name, value) in [
            ("dispatcher_workers", self.dispatcher_workers),
            ("dispatcher_queue_depth", self.dispatcher_queue_depth),
            ("save_batch_size", self.save_batch_size),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Arbor provider configuration
#
# Connection string (required). MultipleActiveResultSets=true; is appended
# when absent.
connection = "Database=default;"

# Schema name. Providers sharing a schema and entity set share one model.
schema = "default"

# Actor recorded in created_by / modified_by (optional)
# current_user = "system"

# Fire-and-forget commit workers and their queue bound
dispatcher_workers = 2
dispatcher_queue_depth = 4096

# Entities per commit when saving a batch
save_batch_size = 1000

# Log every store statement at debug level
log_statements = false
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or fails [`validate`](Self::validate).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ProviderConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
