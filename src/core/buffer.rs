//! Growable, append-only record buffer
//!
//! A [`Buffer`] owns one contiguous byte region and two cursors:
//!
//! ```text
//! 0                 committed            written           capacity
//! ├─────────────────────┼───────────────────┼──────────────────┤
//! │ finished records    │ record under      │ free             │
//! │ (visible to get())  │ construction      │                  │
//! └─────────────────────┴───────────────────┴──────────────────┘
//! ```
//!
//! All positions handed out by the buffer are byte offsets. Growth reallocates
//! the region, so callers keep offsets and re-derive views after every write.

use crate::config::BufferConfig;
use crate::core::entity::{MemberList, NodeRefList, Path, Point, Relation, TagList};
use crate::core::error::{MapbufError, Result};
use crate::core::item::{
    checked_padded_length, padded_length, Item, ItemHeader, ItemIter, Record, ALIGN_BYTES,
};
use memmap2::MmapMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace, warn};

/// Smallest capacity a growing buffer jumps to
const MIN_GROWTH_CAPACITY: usize = 64;

/// What happens when a write does not fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPolicy {
    /// Reallocate to a larger region (capacity doubles until the write fits)
    #[default]
    Auto,
    /// Fail with [`MapbufError::Capacity`]
    Fixed,
}

enum Storage {
    Heap(Vec<u8>),
    Mapped(MmapMut),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Heap(data) => data,
            Storage::Mapped(map) => map,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Storage::Heap(data) => data,
            Storage::Mapped(map) => map,
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// Append-only buffer of self-describing records
pub struct Buffer {
    storage: Storage,
    written: usize,
    committed: usize,
    growth: GrowthPolicy,
}

impl Buffer {
    /// Create a heap-backed buffer
    ///
    /// Capacity is rounded up to the record alignment.
    ///
    /// A capacity that cannot be allocated leaves the buffer empty; it then
    /// grows on demand or, with [`GrowthPolicy::Fixed`], rejects every write.
    pub fn new(capacity: usize, growth: GrowthPolicy) -> Self {
        let mut data = Vec::new();
        let reserved = checked_padded_length(capacity)
            .filter(|&len| data.try_reserve_exact(len).is_ok());
        match reserved {
            Some(len) => data.resize(len, 0),
            None => warn!("Cannot preallocate {} bytes; buffer starts empty", capacity),
        }

        Buffer {
            storage: Storage::Heap(data),
            written: 0,
            committed: 0,
            growth,
        }
    }

    pub fn with_config(config: &BufferConfig) -> Self {
        Self::new(config.initial_capacity, config.growth)
    }

    /// Create a fixed-capacity buffer over an anonymous memory map
    ///
    /// Mapped buffers never grow; writes past the end fail with
    /// [`MapbufError::Capacity`].
    pub fn map_anon(capacity: usize) -> Result<Self> {
        let capacity = checked_padded_length(capacity.max(ALIGN_BYTES)).ok_or(
            MapbufError::Capacity {
                requested: capacity,
                available: 0,
            },
        )?;
        let map = MmapMut::map_anon(capacity)?;

        Ok(Buffer {
            storage: Storage::Mapped(map),
            written: 0,
            committed: 0,
            growth: GrowthPolicy::Fixed,
        })
    }

    /// Wrap a finished record image, e.g. one read back from disk
    ///
    /// Every record in `data` is validated and the whole image is committed.
    pub fn from_committed(data: Vec<u8>) -> Result<Self> {
        if data.len() % ALIGN_BYTES != 0 {
            return Err(MapbufError::Corrupted(format!(
                "buffer image length {} is not a multiple of {}",
                data.len(),
                ALIGN_BYTES
            )));
        }
        for record in ItemIter::new(&data) {
            record?;
        }

        let length = data.len();
        Ok(Buffer {
            storage: Storage::Heap(data),
            written: length,
            committed: length,
            growth: GrowthPolicy::Auto,
        })
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Offset of the next byte to be written
    pub fn written(&self) -> usize {
        self.written
    }

    /// End of the region visible to readers
    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn growth_policy(&self) -> GrowthPolicy {
        self.growth
    }

    pub fn is_aligned(&self) -> bool {
        self.written % ALIGN_BYTES == 0 && self.committed % ALIGN_BYTES == 0
    }

    /// Make sure `additional` more bytes fit, growing if allowed
    ///
    /// On failure nothing is changed.
    pub fn reserve_capacity(&mut self, additional: usize) -> Result<()> {
        let capacity = self.capacity();
        let needed = self
            .written
            .checked_add(additional)
            .ok_or(MapbufError::RecordTooLarge(additional))?;

        if needed <= capacity {
            return Ok(());
        }

        let data = match (&mut self.storage, self.growth) {
            (Storage::Heap(data), GrowthPolicy::Auto) => data,
            _ => {
                return Err(MapbufError::Capacity {
                    requested: additional,
                    available: capacity - self.written,
                })
            }
        };

        let mut new_capacity = capacity.max(MIN_GROWTH_CAPACITY);
        while new_capacity < needed {
            new_capacity = new_capacity
                .checked_mul(2)
                .ok_or(MapbufError::RecordTooLarge(needed))?;
        }

        debug!(
            "Growing buffer: {} -> {} bytes ({} committed)",
            capacity, new_capacity, self.committed
        );
        data.try_reserve_exact(new_capacity - data.len())
            .map_err(|_| MapbufError::Capacity {
                requested: additional,
                available: capacity - self.written,
            })?;
        data.resize(new_capacity, 0);

        Ok(())
    }

    /// Reserve `len` zero-filled bytes and return their offset
    pub fn reserve_space(&mut self, len: usize) -> Result<usize> {
        self.reserve_capacity(len)?;

        let offset = self.written;
        self.storage.as_mut_slice()[offset..offset + len].fill(0);
        self.written += len;

        Ok(offset)
    }

    /// Copy `bytes` to the write position
    ///
    /// No padding is added; records are padded once when their builder
    /// finishes. Returns the number of bytes written.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        self.reserve_capacity(bytes.len())?;

        let offset = self.written;
        self.storage.as_mut_slice()[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.written += bytes.len();

        Ok(bytes.len())
    }

    /// Copy a string plus its NUL terminator
    ///
    /// Returns the number of bytes written (string length + 1).
    pub fn append_str(&mut self, s: &str) -> Result<usize> {
        if s.as_bytes().contains(&0) {
            return Err(MapbufError::EmbeddedNul(s.to_string()));
        }

        self.reserve_capacity(s.len() + 1)?;
        self.append(s.as_bytes())?;
        self.append(&[0])?;

        Ok(s.len() + 1)
    }

    /// Reserve room for a `T` and construct it in place
    ///
    /// Returns the offset of the encoded value.
    pub fn emplace<T: Record>(&mut self, value: &T) -> Result<usize> {
        let offset = self.reserve_space(T::SIZE)?;
        value.write_to(&mut self.storage.as_mut_slice()[offset..offset + T::SIZE]);
        Ok(offset)
    }

    /// Zero-pad the write position up to the next alignment boundary
    ///
    /// Returns the number of padding bytes added.
    pub fn pad_to_alignment(&mut self) -> Result<usize> {
        let padding = padded_length(self.written) - self.written;
        if padding > 0 {
            self.reserve_space(padding)?;
        }
        Ok(padding)
    }

    /// Make everything written so far visible to readers
    ///
    /// Returns the offset where the newly committed region starts.
    pub fn commit(&mut self) -> usize {
        debug_assert!(
            self.written % ALIGN_BYTES == 0,
            "commit with an unfinished record at offset {}",
            self.written
        );

        let start = self.committed;
        self.committed = self.written;
        trace!("Committed {} bytes at offset {}", self.committed - start, start);
        start
    }

    /// Drop everything written since the last commit
    pub fn rollback(&mut self) {
        self.written = self.committed;
    }

    /// Drop uncommitted bytes written at or after `pos`
    pub(crate) fn truncate_to(&mut self, pos: usize) {
        debug_assert!(pos >= self.committed && pos <= self.written);
        self.written = pos.clamp(self.committed, self.written);
    }

    /// Forget all records, keeping the allocated capacity
    pub fn clear(&mut self) {
        self.written = 0;
        self.committed = 0;
    }

    /// The finished records
    pub fn committed_bytes(&self) -> &[u8] {
        &self.storage.as_slice()[..self.committed]
    }

    /// Scan the committed top-level records in order
    pub fn items(&self) -> ItemIter<'_> {
        ItemIter::new(self.committed_bytes())
    }

    /// View the committed record starting at `offset`
    pub fn get(&self, offset: usize) -> Result<Item<'_>> {
        if offset % ALIGN_BYTES != 0
            || offset
                .checked_add(ItemHeader::SIZE)
                .map_or(true, |end| end > self.committed)
        {
            return Err(MapbufError::InvalidOffset {
                offset,
                committed: self.committed,
            });
        }

        Item::parse(&self.committed_bytes()[offset..])
    }

    pub fn get_point(&self, offset: usize) -> Result<Point<'_>> {
        Point::from_item(self.get(offset)?)
    }

    pub fn get_path(&self, offset: usize) -> Result<Path<'_>> {
        Path::from_item(self.get(offset)?)
    }

    pub fn get_relation(&self, offset: usize) -> Result<Relation<'_>> {
        Relation::from_item(self.get(offset)?)
    }

    pub fn get_tag_list(&self, offset: usize) -> Result<TagList<'_>> {
        TagList::from_item(self.get(offset)?)
    }

    pub fn get_node_ref_list(&self, offset: usize) -> Result<NodeRefList<'_>> {
        NodeRefList::from_item(self.get(offset)?)
    }

    pub fn get_member_list(&self, offset: usize) -> Result<MemberList<'_>> {
        MemberList::from_item(self.get(offset)?)
    }

    /// Read a header anywhere in the written region (builders only)
    pub(crate) fn header_at(&self, offset: usize) -> Result<ItemHeader> {
        let written = &self.storage.as_slice()[..self.written];
        written
            .get(offset..)
            .ok_or(MapbufError::InvalidOffset {
                offset,
                committed: self.committed,
            })
            .and_then(ItemHeader::from_bytes)
    }

    /// Overwrite already-written bytes (builders only)
    pub(crate) fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        debug_assert!(offset + bytes.len() <= self.written);
        self.storage.as_mut_slice()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match self.storage {
            Storage::Heap(_) => "heap",
            Storage::Mapped(_) => "mmap",
        };
        f.debug_struct("Buffer")
            .field("backing", &backing)
            .field("capacity", &self.capacity())
            .field("written", &self.written)
            .field("committed", &self.committed)
            .field("growth", &self.growth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item::ItemType;

    fn push_record(buffer: &mut Buffer, item_type: ItemType, payload: &[u8]) -> usize {
        let offset = buffer.reserve_space(ItemHeader::SIZE).unwrap();
        buffer.append(payload).unwrap();
        let padding = buffer.pad_to_alignment().unwrap();

        let mut header = ItemHeader::new(item_type);
        header.byte_length = (buffer.written() - offset) as u32;
        header.padding = padding as u8;
        buffer.write_at(offset, &header.to_bytes());
        offset
    }

    #[test]
    fn test_buffer_creation() {
        let buffer = Buffer::new(100, GrowthPolicy::Auto);
        assert_eq!(buffer.capacity(), 104);
        assert_eq!(buffer.written(), 0);
        assert_eq!(buffer.committed(), 0);
        assert!(buffer.is_aligned());
    }

    #[test]
    fn test_unallocatable_capacity_starts_empty() {
        let mut fixed = Buffer::new(usize::MAX, GrowthPolicy::Fixed);
        assert_eq!(fixed.capacity(), 0);
        assert!(matches!(
            fixed.append(b"a"),
            Err(MapbufError::Capacity { requested: 1, available: 0 })
        ));

        let mut growing = Buffer::new(usize::MAX - 3, GrowthPolicy::Auto);
        assert_eq!(growing.capacity(), 0);
        assert_eq!(growing.append(b"abc").unwrap(), 3);
        assert!(growing.capacity() >= MIN_GROWTH_CAPACITY);

        assert!(matches!(
            Buffer::map_anon(usize::MAX),
            Err(MapbufError::Capacity { .. })
        ));
    }

    #[test]
    fn test_append_returns_unpadded_length() {
        let mut buffer = Buffer::new(64, GrowthPolicy::Auto);
        assert_eq!(buffer.append(b"abc").unwrap(), 3);
        assert_eq!(buffer.append_str("key").unwrap(), 4);
        assert_eq!(buffer.written(), 7);
        assert_eq!(buffer.pad_to_alignment().unwrap(), 1);
        assert_eq!(buffer.written(), 8);
    }

    #[test]
    fn test_append_str_rejects_nul() {
        let mut buffer = Buffer::new(64, GrowthPolicy::Auto);
        assert!(matches!(
            buffer.append_str("a\0b"),
            Err(MapbufError::EmbeddedNul(_))
        ));
        assert_eq!(buffer.written(), 0);
    }

    #[test]
    fn test_commit_visibility() {
        let mut buffer = Buffer::new(64, GrowthPolicy::Auto);
        let offset = push_record(&mut buffer, ItemType::TagList, b"a\0b\0");

        assert!(matches!(
            buffer.get(offset),
            Err(MapbufError::InvalidOffset { .. })
        ));

        assert_eq!(buffer.commit(), 0);
        let item = buffer.get(offset).unwrap();
        assert_eq!(item.item_type(), ItemType::TagList);
        assert_eq!(item.content(), b"a\0b\0");
    }

    #[test]
    fn test_get_rejects_unaligned_offset() {
        let mut buffer = Buffer::new(64, GrowthPolicy::Auto);
        push_record(&mut buffer, ItemType::TagList, b"a\0b\0");
        buffer.commit();

        assert!(matches!(
            buffer.get(3),
            Err(MapbufError::InvalidOffset { offset: 3, .. })
        ));
    }

    #[test]
    fn test_growth_preserves_committed_records() {
        let mut buffer = Buffer::new(16, GrowthPolicy::Auto);
        let mut offsets = Vec::new();

        for i in 0..50u8 {
            offsets.push(push_record(&mut buffer, ItemType::TagList, &[i; 5]));
            buffer.commit();
        }

        assert!(buffer.capacity() > 16);
        for (i, offset) in offsets.iter().enumerate() {
            let item = buffer.get(*offset).unwrap();
            assert_eq!(item.content(), &[i as u8; 5]);
        }
        assert_eq!(buffer.items().count(), 50);
    }

    #[test]
    fn test_fixed_capacity_rejection() {
        let mut buffer = Buffer::new(16, GrowthPolicy::Fixed);
        push_record(&mut buffer, ItemType::TagList, b"ab\0");
        buffer.commit();
        let before = buffer.committed_bytes().to_vec();

        let err = buffer.append(&[1u8; 9]).unwrap_err();
        assert!(matches!(
            err,
            MapbufError::Capacity {
                requested: 9,
                available: 0
            }
        ));
        assert_eq!(buffer.written(), 16);
        assert_eq!(buffer.committed_bytes(), &before[..]);
    }

    #[test]
    fn test_mapped_buffer_is_fixed() {
        let mut buffer = Buffer::map_anon(32).unwrap();
        assert_eq!(buffer.growth_policy(), GrowthPolicy::Fixed);

        let offset = push_record(&mut buffer, ItemType::NodeRefList, &[7u8; 16]);
        buffer.commit();
        assert_eq!(buffer.get(offset).unwrap().content(), &[7u8; 16]);

        assert!(matches!(
            buffer.reserve_space(16),
            Err(MapbufError::Capacity { .. })
        ));
    }

    #[test]
    fn test_rollback_discards_uncommitted() {
        let mut buffer = Buffer::new(64, GrowthPolicy::Auto);
        push_record(&mut buffer, ItemType::TagList, b"a\0b\0");
        buffer.commit();

        push_record(&mut buffer, ItemType::TagList, b"c\0d\0");
        buffer.rollback();

        assert_eq!(buffer.written(), buffer.committed());
        assert_eq!(buffer.items().count(), 1);
    }

    #[test]
    fn test_from_committed_validates_records() {
        let mut buffer = Buffer::new(64, GrowthPolicy::Auto);
        push_record(&mut buffer, ItemType::TagList, b"a\0b\0");
        buffer.commit();

        let image = buffer.committed_bytes().to_vec();
        let reloaded = Buffer::from_committed(image.clone()).unwrap();
        assert_eq!(reloaded.committed(), image.len());
        assert_eq!(reloaded.items().count(), 1);

        let mut broken = image;
        broken[4] = 0x77;
        assert!(Buffer::from_committed(broken).is_err());
    }

    #[test]
    fn test_emplace_writes_record() {
        use crate::core::entity::NodeRef;
        use crate::core::entity::Location;

        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let node = NodeRef::new(42, Location::new(1.5, 2.5));
        let offset = buffer.emplace(&node).unwrap();

        let bytes = &buffer.storage.as_slice()[offset..offset + NodeRef::SIZE];
        assert_eq!(NodeRef::read_from(bytes).unwrap(), node);
    }
}
