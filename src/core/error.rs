use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapbufError {
    #[error("Buffer capacity exceeded: requested {requested} bytes, {available} available")]
    Capacity { requested: usize, available: usize },

    #[error("Id not found in index: {0}")]
    NotFound(u64),

    #[error("Offset {offset} is outside the committed region (committed: {committed})")]
    InvalidOffset { offset: usize, committed: usize },

    #[error("Invalid item type tag: {0:#06x}")]
    InvalidItemType(u16),

    #[error("Unexpected item type: expected {expected:?}, found {found:?}")]
    UnexpectedItemType {
        expected: crate::core::item::ItemType,
        found: crate::core::item::ItemType,
    },

    #[error("Corrupted record: {0}")]
    Corrupted(String),

    #[error("Record too large: {0} bytes")]
    RecordTooLarge(usize),

    #[error("Refusing to store the sentinel value for id {0}")]
    SentinelValue(u64),

    #[error("String contains an embedded NUL byte: {0:?}")]
    EmbeddedNul(String),

    #[error("Id {0} cannot be addressed by a dense index on this platform")]
    IdOutOfRange(u64),

    #[error("Geometry construction failed: {0}")]
    Geometry(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Worker pool has been shut down")]
    PoolShutdown,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MapbufError {
    /// True for lookups that simply found nothing stored
    pub fn is_not_found(&self) -> bool {
        matches!(self, MapbufError::NotFound(_))
    }

    /// Wrap a failure reported by a geometry back end
    pub fn geometry<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        MapbufError::Geometry(err.into())
    }
}

pub type Result<T> = std::result::Result<T, MapbufError>;
