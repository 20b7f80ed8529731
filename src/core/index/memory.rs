use super::value::{check_storable, slots_for, slots_in_image};
use super::{DenseIndex, IndexValue};
use crate::core::error::{MapbufError, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Dense index held in a heap vector
#[derive(Debug, Clone, Default)]
pub struct DenseMemArray<V: IndexValue> {
    slots: Vec<V>,
}

impl<V: IndexValue> DenseMemArray<V> {
    pub fn new() -> Self {
        DenseMemArray { slots: Vec::new() }
    }

    /// Empty index with room for `capacity` slots before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        DenseMemArray {
            slots: Vec::with_capacity(capacity),
        }
    }

    /// Read a dumped array image into memory
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        slots_in_image::<V>(bytes.len() as u64)?;

        let slots = bytes
            .chunks_exact(V::SIZE)
            .map(V::decode)
            .collect::<Result<Vec<_>>>()?;

        info!("Loaded dense index: {} slots from {}", slots.len(), path.display());
        Ok(DenseMemArray { slots })
    }

    /// Stored values in id order, sentinels included
    pub fn as_slice(&self) -> &[V] {
        &self.slots
    }
}

impl<V: IndexValue> DenseIndex<V> for DenseMemArray<V> {
    fn set(&mut self, id: u64, value: V) -> Result<()> {
        check_storable(id, &value)?;
        let needed = slots_for(id)?;

        if needed > self.slots.len() {
            if needed > self.slots.capacity() {
                debug!(
                    "Growing dense index: {} -> {} slots",
                    self.slots.capacity(),
                    needed
                );
            }
            self.slots
                .try_reserve(needed - self.slots.len())
                .map_err(|_| MapbufError::IdOutOfRange(id))?;
            self.slots.resize(needed, V::SENTINEL);
        }
        self.slots[needed - 1] = value;
        Ok(())
    }

    fn get(&self, id: u64) -> Result<V> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.slots.get(i))
            .filter(|value| !value.is_sentinel())
            .copied()
            .ok_or(MapbufError::NotFound(id))
    }

    fn size(&self) -> u64 {
        self.slots.len() as u64
    }

    fn used_memory(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<V>()
    }

    fn clear(&mut self) -> Result<()> {
        self.slots.clear();
        Ok(())
    }

    fn dump_as_array(&self, out: &mut dyn Write) -> Result<()> {
        let mut chunk = vec![0u8; V::SIZE * 1024];
        for values in self.slots.chunks(1024) {
            let len = values.len() * V::SIZE;
            for (value, slot) in values.iter().zip(chunk.chunks_exact_mut(V::SIZE)) {
                value.encode(slot);
            }
            out.write_all(&chunk[..len])?;
        }
        Ok(())
    }
}
