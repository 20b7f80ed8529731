//! Dense id-addressed lookup arrays
//!
//! A dense index maps a non-negative integer id straight to a fixed-size slot
//! at byte offset `id * V::SIZE`. Slots that were never set hold the value
//! type's sentinel and read back as [`MapbufError::NotFound`]. The array image
//! has no header: dumping it writes the slots verbatim, sentinels included, so
//! any backing can reopen the file directly.
//!
//! Three backings implement [`DenseIndex`]:
//!
//! - [`DenseMemArray`]: a heap vector
//! - [`DenseMmapArray`]: an anonymous or file-backed memory map
//! - [`DenseFileArray`]: positioned reads and writes on a file

mod file;
mod memory;
mod mmap;
mod value;

pub use file::DenseFileArray;
pub use memory::DenseMemArray;
pub use mmap::DenseMmapArray;
pub use value::IndexValue;

use crate::config::IndexConfig;
use crate::core::error::{MapbufError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Common interface of the dense array backings
pub trait DenseIndex<V: IndexValue>: Send {
    /// Store `value` under `id`, growing the array if needed
    ///
    /// Fails with [`MapbufError::SentinelValue`] if `value` is the sentinel.
    fn set(&mut self, id: u64, value: V) -> Result<()>;

    /// Value stored under `id`, or [`MapbufError::NotFound`]
    fn get(&self, id: u64) -> Result<V>;

    /// Like [`DenseIndex::get`] with "not set" as `None`
    fn lookup(&self, id: u64) -> Result<Option<V>> {
        match self.get(id) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of slots in the array image (highest id ever set, plus one)
    fn size(&self) -> u64;

    /// Bytes of memory held by this index
    fn used_memory(&self) -> usize;

    /// Reset every slot to unset
    fn clear(&mut self) -> Result<()>;

    /// Write the array image, `size()` slots, to `out`
    fn dump_as_array(&self, out: &mut dyn Write) -> Result<()>;

    /// Write the array image to a new file at `path`
    fn dump_to_path(&self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.dump_as_array(&mut out)?;
        out.flush()?;

        info!("Dumped dense index: {} slots to {}", self.size(), path.display());
        Ok(())
    }
}

/// Storage used for an index built from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBacking {
    #[default]
    Memory,
    Mmap,
    File,
}

/// Create an empty index with the configured backing
///
/// `mmap` without a path maps anonymous memory; `file` requires a path.
pub fn create_index<V: IndexValue>(config: &IndexConfig) -> Result<Box<dyn DenseIndex<V>>> {
    let index: Box<dyn DenseIndex<V>> = match (config.backing, config.path.as_deref()) {
        (IndexBacking::Memory, _) => Box::new(DenseMemArray::with_capacity(config.initial_capacity)),
        (IndexBacking::Mmap, None) => Box::new(DenseMmapArray::with_capacity(config.initial_capacity)?),
        (IndexBacking::Mmap, Some(path)) => {
            Box::new(DenseMmapArray::create(path, config.initial_capacity)?)
        }
        (IndexBacking::File, Some(path)) => Box::new(DenseFileArray::create(path)?),
        (IndexBacking::File, None) => {
            return Err(MapbufError::Config(
                "file-backed index requires a path".into(),
            ))
        }
    };
    Ok(index)
}

/// Open a previously dumped array image with the configured backing
pub fn open_index<V: IndexValue>(config: &IndexConfig) -> Result<Box<dyn DenseIndex<V>>> {
    let path = config
        .path
        .as_deref()
        .ok_or_else(|| MapbufError::Config("opening an index requires a path".into()))?;

    let index: Box<dyn DenseIndex<V>> = match config.backing {
        IndexBacking::Memory => Box::new(DenseMemArray::load(path)?),
        IndexBacking::Mmap => Box::new(DenseMmapArray::open(path)?),
        IndexBacking::File => Box::new(DenseFileArray::open(path)?),
    };
    Ok(index)
}
