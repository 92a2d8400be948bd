//! Engine configuration

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment prefix for configuration overrides, e.g. `CLOUDSTORE_PART_WORKERS=4`
pub const ENV_PREFIX: &str = "CLOUDSTORE";

/// Environment variable naming the default key directory
pub const KEY_DIR_ENV: &str = "CLOUDSTORE_KEYDIR";

/// Key directory used when neither the config nor the environment names one
pub const DEFAULT_KEY_DIR: &str = ".cloudstore-keys";

/// Transfer engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Part size for transfers; derived from the file size when unset
    pub chunk_size: Option<u64>,
    /// Concurrent part transfers per object
    pub part_workers: usize,
    /// Concurrent objects in recursive operations
    pub object_workers: usize,
    /// Attempts per store call, including the first
    pub retry_count: u32,
    /// Delay before the first retry (milliseconds)
    pub initial_backoff_ms: u64,
    /// Cap on the delay between retries (milliseconds)
    pub max_backoff_ms: u64,
    /// Directories searched for `<name>.pem` key files
    pub key_dirs: Vec<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: None,
            part_workers: 10,
            object_workers: 10,
            retry_count: 10,
            initial_backoff_ms: 300,
            max_backoff_ms: 20_000,
            key_dirs: vec![default_key_dir()],
        }
    }
}

impl EngineConfig {
    /// Load from an optional config file (any format the extension names),
    /// then apply `CLOUDSTORE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(":")
                    .with_list_parse_key("key_dirs"),
            )
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == Some(0) {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        if self.part_workers == 0 || self.object_workers == 0 {
            return Err(Error::Config("worker counts must be positive".to_string()));
        }
        if self.retry_count == 0 {
            return Err(Error::Config("retry_count must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Retry policy described by this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count).with_backoff(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// `$CLOUDSTORE_KEYDIR`, else `~/.cloudstore-keys`
pub fn default_key_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(KEY_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_default();
    home.join(DEFAULT_KEY_DIR)
}
