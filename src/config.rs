//! Configuration for buffers, indexes and the worker pool
//!
//! Every section has defaults, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! [buffer]
//! initial_capacity = 1048576
//! growth = "fixed"
//!
//! [index]
//! backing = "mmap"
//! path = "/var/lib/mapbuf/locations.idx"
//!
//! [pool]
//! thread_count = -1
//! max_queue_size = 64
//! ```

use crate::core::buffer::GrowthPolicy;
use crate::core::error::{MapbufError, Result};
use crate::core::index::IndexBacking;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding [`PoolConfig::thread_count`]
pub const POOL_THREADS_ENV: &str = "MAPBUF_POOL_THREADS";

/// Environment variable overriding [`PoolConfig::max_queue_size`]
pub const MAX_QUEUE_SIZE_ENV: &str = "MAPBUF_MAX_QUEUE_SIZE";

/// Upper bound on worker threads
pub const MAX_POOL_THREADS: usize = 256;

/// Smallest accepted task queue
pub const MIN_QUEUE_SIZE: usize = 2;

/// Task queue bound when none is configured
pub const DEFAULT_QUEUE_SIZE: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub buffer: BufferConfig,
    pub index: IndexConfig,
    pub pool: PoolConfig,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Pretty JSON rendering for diagnostics
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.index.validate()
    }
}

/// Settings for [`Buffer::with_config`](crate::core::buffer::Buffer::with_config)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Bytes allocated up front
    pub initial_capacity: usize,
    pub growth: GrowthPolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            initial_capacity: 64 * 1024,
            growth: GrowthPolicy::Auto,
        }
    }
}

/// Settings for [`create_index`](crate::core::index::create_index)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backing: IndexBacking,
    /// Backing file; required for `file`, optional for `mmap`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Slots reserved up front
    pub initial_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            backing: IndexBacking::Memory,
            path: None,
            initial_capacity: 1024,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backing == IndexBacking::File && self.path.is_none() {
            return Err(MapbufError::Config(
                "index backing \"file\" requires a path".into(),
            ));
        }
        Ok(())
    }
}

/// Sizing for [`Pool`](crate::pool::Pool)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker threads: 0 picks "hardware concurrency minus two", a negative
    /// value is added to the hardware concurrency. Always clamped to 1..=256.
    pub thread_count: i32,
    /// Bound on queued tasks; values below 2 are raised to 2
    pub max_queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            thread_count: 0,
            max_queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by `MAPBUF_POOL_THREADS` and `MAPBUF_MAX_QUEUE_SIZE`
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up through `var`
    pub fn with_env_overrides<F>(mut self, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = var(POOL_THREADS_ENV) {
            self.thread_count = value.trim().parse().map_err(|_| {
                MapbufError::Config(format!("{} must be an integer, got {:?}", POOL_THREADS_ENV, value))
            })?;
        }
        if let Some(value) = var(MAX_QUEUE_SIZE_ENV) {
            self.max_queue_size = value.trim().parse().map_err(|_| {
                MapbufError::Config(format!(
                    "{} must be a non-negative integer, got {:?}",
                    MAX_QUEUE_SIZE_ENV, value
                ))
            })?;
        }
        Ok(self)
    }

    /// Number of workers to start on a machine with `hardware` cores
    pub fn resolve_threads(&self, hardware: usize) -> usize {
        let requested = if self.thread_count == 0 {
            -2
        } else {
            self.thread_count as i64
        };
        let threads = if requested < 0 {
            hardware as i64 + requested
        } else {
            requested
        };
        threads.clamp(1, MAX_POOL_THREADS as i64) as usize
    }

    pub fn resolve_queue_size(&self) -> usize {
        self.max_queue_size.max(MIN_QUEUE_SIZE)
    }
}
