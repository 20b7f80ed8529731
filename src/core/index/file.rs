use super::value::{check_storable, fill_sentinel, slot_range, slots_in_image};
use super::{DenseIndex, IndexValue};
use crate::core::error::{MapbufError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Slots written per call when filling a gap with sentinels
const FILL_CHUNK_SLOTS: usize = 4096;

/// Dense index kept in a file and accessed with positioned reads and writes
///
/// Nothing is cached in memory. Gaps left by setting a high id are filled
/// with sentinel slots, so the file is always a valid array image.
pub struct DenseFileArray<V: IndexValue> {
    file: Mutex<File>,
    path: Option<PathBuf>,
    size: u64,
    _value: PhantomData<V>,
}

impl<V: IndexValue> DenseFileArray<V> {
    /// Create (or truncate) an empty index file
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(DenseFileArray {
            file: Mutex::new(file),
            path: Some(path.to_path_buf()),
            size: 0,
            _value: PhantomData,
        })
    }

    /// Open an existing array image
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut index = Self::from_file(file)?;
        index.path = Some(path.to_path_buf());

        info!("Opened dense index: {} slots from {}", index.size, path.display());
        Ok(index)
    }

    /// Use an already open read/write handle holding an array image
    pub fn from_file(file: File) -> Result<Self> {
        let size = slots_in_image::<V>(file.metadata()?.len())?;
        Ok(DenseFileArray {
            file: Mutex::new(file),
            path: None,
            size,
            _value: PhantomData,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush file contents to disk
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    /// Write sentinel slots `from..to`
    fn fill_gap(file: &mut File, from: u64, to: u64) -> Result<()> {
        let mut chunk = vec![0u8; FILL_CHUNK_SLOTS * V::SIZE];
        fill_sentinel::<V>(&mut chunk);

        file.seek(SeekFrom::Start(byte_offset::<V>(from)?))?;
        let mut remaining = to - from;
        while remaining > 0 {
            let slots = remaining.min(FILL_CHUNK_SLOTS as u64) as usize;
            file.write_all(&chunk[..slots * V::SIZE])?;
            remaining -= slots as u64;
        }
        Ok(())
    }
}

impl<V: IndexValue> DenseIndex<V> for DenseFileArray<V> {
    fn set(&mut self, id: u64, value: V) -> Result<()> {
        check_storable(id, &value)?;
        let range = slot_range::<V>(id)?;

        let mut slot = vec![0u8; V::SIZE];
        value.encode(&mut slot);

        let file = self.file.get_mut();
        if id > self.size {
            debug!("Growing dense index: {} -> {} slots", self.size, id + 1);
            Self::fill_gap(file, self.size, id)?;
        }
        file.seek(SeekFrom::Start(range.start as u64))?;
        file.write_all(&slot)?;

        self.size = self.size.max(id + 1);
        Ok(())
    }

    fn get(&self, id: u64) -> Result<V> {
        if id >= self.size {
            return Err(MapbufError::NotFound(id));
        }

        let mut slot = vec![0u8; V::SIZE];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(byte_offset::<V>(id)?))?;
            file.read_exact(&mut slot)?;
        }

        let value = V::decode(&slot)?;
        if value.is_sentinel() {
            return Err(MapbufError::NotFound(id));
        }
        Ok(value)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn used_memory(&self) -> usize {
        0
    }

    fn clear(&mut self) -> Result<()> {
        let file = self.file.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        self.size = 0;
        Ok(())
    }

    fn dump_as_array(&self, out: &mut dyn Write) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;

        let len = byte_offset::<V>(self.size)?;
        let copied = io::copy(&mut (&mut *file).take(len), out)?;
        if copied != len {
            return Err(MapbufError::Corrupted(format!(
                "index file holds {} of {} expected bytes",
                copied, len
            )));
        }
        Ok(())
    }
}

fn byte_offset<V: IndexValue>(slots: u64) -> Result<u64> {
    slots
        .checked_mul(V::SIZE as u64)
        .ok_or(MapbufError::IdOutOfRange(slots))
}

impl<V: IndexValue> std::fmt::Debug for DenseFileArray<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseFileArray")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish()
    }
}
