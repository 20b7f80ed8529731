use super::value::{check_storable, fill_sentinel, slot_range, slots_for, slots_in_image};
use super::{DenseIndex, IndexValue};
use crate::core::error::{MapbufError, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Slots mapped up front when no capacity is configured
pub const DEFAULT_CAPACITY: usize = 1 << 16;

/// Dense index in a memory map
///
/// The map holds `capacity` slots, all sentinel until set; the logical size
/// is the highest id set plus one. Growth at least doubles the mapping and
/// copies (anonymous) or remaps (file-backed) the existing slots. Dropping a
/// file-backed index trims the file to its logical size, so the file is a
/// valid dump afterwards.
pub struct DenseMmapArray<V: IndexValue> {
    map: MmapMut,
    file: Option<(File, PathBuf)>,
    capacity: usize,
    size: usize,
    _value: PhantomData<V>,
}

impl<V: IndexValue> DenseMmapArray<V> {
    /// Anonymous map with the default capacity
    pub fn new() -> Result<Self> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Anonymous map with room for `capacity` slots
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let mut map = MmapMut::map_anon(byte_len::<V>(capacity)?)?;
        fill_sentinel::<V>(&mut map);

        Ok(DenseMmapArray {
            map,
            file: None,
            capacity,
            size: 0,
            _value: PhantomData,
        })
    }

    /// Create (or truncate) `path` and map it with room for `capacity` slots
    pub fn create(path: &Path, capacity: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let capacity = capacity.max(1);
        file.set_len(byte_len::<V>(capacity)? as u64)?;
        let mut map = map_file(&file, byte_len::<V>(capacity)?)?;
        fill_sentinel::<V>(&mut map);

        Ok(DenseMmapArray {
            map,
            file: Some((file, path.to_path_buf())),
            capacity,
            size: 0,
            _value: PhantomData,
        })
    }

    /// Map an existing array image for reading and further writes
    ///
    /// The file is left as is until the first `set` beyond its end.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let slots = slots_in_image::<V>(file.metadata()?.len())?;
        let size = usize::try_from(slots).map_err(|_| MapbufError::IdOutOfRange(slots))?;

        // An empty file cannot be mapped; hold a placeholder with no usable
        // slots until the first set grows into the file.
        let (map, capacity) = if size == 0 {
            (MmapMut::map_anon(V::SIZE)?, 0)
        } else {
            (map_file(&file, byte_len::<V>(size)?)?, size)
        };

        info!("Opened dense index: {} slots from {}", size, path.display());

        Ok(DenseMmapArray {
            map,
            file: Some((file, path.to_path_buf())),
            capacity,
            size,
            _value: PhantomData,
        })
    }

    /// Slots mapped
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Backing file, if not anonymous
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(_, path)| path.as_path())
    }

    /// Write dirty pages of a file-backed map to disk
    pub fn flush(&self) -> Result<()> {
        if self.capacity > 0 {
            self.map.flush()?;
        }
        Ok(())
    }

    /// Unmap and shrink the backing file to the logical size
    fn trim_file(&mut self) -> Result<()> {
        let Some((file, path)) = &self.file else {
            return Ok(());
        };

        if self.capacity > 0 {
            self.map.flush()?;
        }
        let len = byte_len::<V>(self.size)? as u64;
        if len < file.metadata()?.len() {
            let placeholder = MmapMut::map_anon(V::SIZE)?;
            drop(std::mem::replace(&mut self.map, placeholder));
            file.set_len(len)?;
            debug!(
                "Trimmed dense index file {} to {} slots",
                path.display(),
                self.size
            );
        }
        Ok(())
    }

    fn grow(&mut self, needed: usize) -> Result<()> {
        let new_capacity = needed.max(self.capacity.saturating_mul(2));
        let old_len = byte_len::<V>(self.capacity)?;
        let new_len = byte_len::<V>(new_capacity)?;

        debug!(
            "Growing dense index: {} -> {} slots",
            self.capacity, new_capacity
        );

        let mut map = match &self.file {
            Some((file, _)) => {
                if self.capacity > 0 {
                    self.map.flush()?;
                }
                file.set_len(new_len as u64)?;
                map_file(file, new_len)?
            }
            None => {
                let mut map = MmapMut::map_anon(new_len)?;
                map[..old_len].copy_from_slice(&self.map[..old_len]);
                map
            }
        };
        fill_sentinel::<V>(&mut map[old_len..]);

        self.map = map;
        self.capacity = new_capacity;
        Ok(())
    }
}

impl<V: IndexValue> DenseIndex<V> for DenseMmapArray<V> {
    fn set(&mut self, id: u64, value: V) -> Result<()> {
        check_storable(id, &value)?;
        let needed = slots_for(id)?;
        let range = slot_range::<V>(id)?;

        if needed > self.capacity {
            self.grow(needed)?;
        }
        value.encode(&mut self.map[range]);
        self.size = self.size.max(needed);
        Ok(())
    }

    fn get(&self, id: u64) -> Result<V> {
        let in_range = usize::try_from(id).map_or(false, |i| i < self.size);
        if !in_range {
            return Err(MapbufError::NotFound(id));
        }

        let value = V::decode(&self.map[slot_range::<V>(id)?])?;
        if value.is_sentinel() {
            return Err(MapbufError::NotFound(id));
        }
        Ok(value)
    }

    fn size(&self) -> u64 {
        self.size as u64
    }

    fn used_memory(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) -> Result<()> {
        fill_sentinel::<V>(&mut self.map);
        self.size = 0;
        Ok(())
    }

    fn dump_as_array(&self, out: &mut dyn Write) -> Result<()> {
        out.write_all(&self.map[..byte_len::<V>(self.size)?])?;
        Ok(())
    }
}

fn byte_len<V: IndexValue>(slots: usize) -> Result<usize> {
    slots
        .checked_mul(V::SIZE)
        .ok_or(MapbufError::IdOutOfRange(slots as u64))
}

fn map_file(file: &File, len: usize) -> Result<MmapMut> {
    // SAFETY: the file is owned by the index and only grows while mapped;
    // every access goes through the returned map.
    let map = unsafe { MmapOptions::new().len(len).map_mut(file)? };
    Ok(map)
}

impl<V: IndexValue> Drop for DenseMmapArray<V> {
    fn drop(&mut self) {
        if let Err(e) = self.trim_file() {
            warn!("Failed to trim dense index file: {}", e);
        }
    }
}

impl<V: IndexValue> std::fmt::Debug for DenseMmapArray<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseMmapArray")
            .field("path", &self.path())
            .field("capacity", &self.capacity)
            .field("size", &self.size)
            .finish()
    }
}
