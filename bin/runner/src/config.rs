//! Runner configuration.
//!
//! Loaded via the `config` crate from an optional file and `WEFT_*`
//! environment variables. Nested fields use `__`, e.g.
//! `WEFT_WALKER__MAX_NODE_RUNS=20`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use weft_processed_data::ProcessedDataConfig;
use weft_workflow::WalkerConfig;

/// Selects the in-memory processed-data backend.
pub const MEMORY_DATABASE_URL: &str = "memory";

/// Runner configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Processed-data backend: `memory`, a `sqlite:` URL or a `postgres:` URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Forces the insert classification strategy. Unset picks the best
    /// strategy the backend supports.
    #[serde(default)]
    pub bulk_insert_returning: Option<bool>,

    /// Workflow definition to run, as JSON.
    pub workflow_path: PathBuf,

    /// Optional JSON array of items injected as the start node's output.
    #[serde(default)]
    pub input_path: Option<PathBuf>,

    /// Name of the node receiving the input items.
    #[serde(default)]
    pub start_node: Option<String>,

    #[serde(default)]
    pub walker: WalkerConfig,
}

fn default_database_url() -> String {
    MEMORY_DATABASE_URL.to_string()
}

impl RunnerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Loads configuration from `file`, if given, overridden by the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or required configuration
    /// is missing or invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file));
        }
        builder
            .add_source(
                config::Environment::with_prefix("WEFT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Processed-data settings for a backend. Postgres defaults to bulk
    /// classification; other backends classify row by row.
    #[must_use]
    pub fn processed_data(&self) -> ProcessedDataConfig {
        let supports_bulk = self.database_url.starts_with("postgres");
        ProcessedDataConfig {
            bulk_insert_returning: self.bulk_insert_returning.unwrap_or(supports_bulk),
        }
    }
}
