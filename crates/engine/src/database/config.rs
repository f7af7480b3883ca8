//! Database configuration via `tidepool.toml`
//!
//! Every section is optional; missing keys fall back to defaults. Use
//! [`DatabaseConfig::write_default_if_missing`] to seed a commented file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tidepool_core::{Error, Result, SpaceId};
use tidepool_schema::{SchemaLocation, SchemaRegistryOptions};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "tidepool.toml";

/// `[schema]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Keep a standing query over stored schemas while the database is open
    pub reactive_query: bool,
    /// Register every stored schema when the database opens
    pub preload_on_open: bool,
    /// Schema queries search static definitions unless told otherwise
    pub include_runtime_by_default: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            reactive_query: true,
            preload_on_open: true,
            include_runtime_by_default: true,
        }
    }
}

impl SchemaConfig {
    /// Registry options for this section
    pub fn registry_options(&self) -> SchemaRegistryOptions {
        let mut default_locations = Vec::new();
        if self.include_runtime_by_default {
            default_locations.push(SchemaLocation::Runtime);
        }
        default_locations.push(SchemaLocation::Database);
        SchemaRegistryOptions {
            reactive_query: self.reactive_query,
            preload_on_open: self.preload_on_open,
            default_locations,
        }
    }
}

/// `[migration]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Flush the store after a migration run
    pub flush_after_run: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            flush_after_run: true,
        }
    }
}

/// Database configuration loaded from `tidepool.toml`.
///
/// # Example
///
/// ```toml
/// namespace = "B7F0C2D4E6A81357"
///
/// [schema]
/// reactive_query = true
/// preload_on_open = true
/// include_runtime_by_default = true
///
/// [migration]
/// flush_after_run = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Namespace (space id); random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Schema registry settings
    #[serde(default)]
    pub schema: SchemaConfig,
    /// Migration settings
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl DatabaseConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tidepool database configuration
#
# Namespace (space id) of the database. A random one is generated when unset.
# namespace = "B7F0C2D4E6A81357"

[schema]
# Keep a standing query over stored schemas while the database is open
reactive_query = true
# Register every stored schema when the database opens
preload_on_open = true
# Schema queries search static definitions unless a location is given
include_runtime_by_default = true

[migration]
# Flush pending writes after run_migrations completes
flush_after_run = true
"#
    }

    /// Parse config from a TOML string.
    ///
    /// # Errors
    ///
    /// `Error::Config` if the text is not valid config TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Configured namespace, or a fresh random one
    pub fn namespace_or_random(&self) -> SpaceId {
        self.namespace
            .as_deref()
            .map(SpaceId::from)
            .unwrap_or_else(SpaceId::random)
    }
}
