//! Incremental record construction
//!
//! A [`Builder`] writes a record header at the buffer's write position and
//! keeps that header's `byte_length` equal to everything written since. A
//! nested builder mutably borrows its parent, so builder lifetimes always nest
//! like a call stack and two chains can never interleave on one buffer.
//!
//! Sizes propagate eagerly: every payload write adds its length to the
//! record's own header and to the header of every enclosing record. Headers
//! are addressed by offset, so buffer growth in the middle of a record is
//! harmless.
//!
//! ```rust
//! use mapbuf::core::buffer::{Buffer, GrowthPolicy};
//! use mapbuf::core::builder::PathBuilder;
//!
//! # fn main() -> mapbuf::Result<()> {
//! let mut buffer = Buffer::new(1024, GrowthPolicy::Auto);
//! let mut path = PathBuilder::new(&mut buffer, 42)?;
//! path.add_tags([("highway", "residential")])?;
//! {
//!     let mut nodes = path.nodes()?;
//!     nodes.add_node(1)?;
//!     nodes.add_node(2)?;
//!     nodes.finish()?;
//! }
//! let offset = path.finish()?;
//! buffer.commit();
//!
//! let path = buffer.get_path(offset)?;
//! assert_eq!(path.nodes().len(), 2);
//! # Ok(())
//! # }
//! ```

mod entity;
mod helpers;
mod list;

pub use entity::{PathBuilder, PointBuilder, RelationBuilder};
pub use helpers::{build_node_ref_list, build_tag_list, build_tag_list_with};
pub use list::{MemberListBuilder, NodeRefListBuilder, TagListBuilder};

use crate::core::buffer::Buffer;
use crate::core::error::{MapbufError, Result};
use crate::core::item::{padded_length, Item, ItemHeader, ItemType, Record, ALIGN_BYTES};
use tracing::warn;

/// Writes one record and keeps its size, and its ancestors' sizes, current
pub struct Builder<'a> {
    buffer: &'a mut Buffer,
    /// Header offsets of the enclosing records, outermost first
    parents: Vec<usize>,
    offset: usize,
    finished: bool,
}

impl<'a> Builder<'a> {
    /// Start a top-level record with a `fixed_size`-byte leading part
    ///
    /// `fixed_size` includes the header; bytes after the header are zeroed
    /// and can be filled with [`Builder::write_fixed`].
    pub fn new(buffer: &'a mut Buffer, item_type: ItemType, fixed_size: usize) -> Result<Self> {
        Self::open(buffer, Vec::new(), item_type, fixed_size)
    }

    fn open(
        buffer: &'a mut Buffer,
        parents: Vec<usize>,
        item_type: ItemType,
        fixed_size: usize,
    ) -> Result<Self> {
        debug_assert!(fixed_size >= ItemHeader::SIZE);
        debug_assert!(buffer.written() % ALIGN_BYTES == 0);

        if let Some(&outermost) = parents.first() {
            check_growth(buffer, outermost, fixed_size)?;
        }

        let offset = buffer.reserve_space(fixed_size)?;
        buffer.write_at(offset, &ItemHeader::new(item_type).to_bytes());

        let mut builder = Builder {
            buffer,
            parents,
            offset,
            finished: false,
        };
        builder.add_size(fixed_size)?;

        Ok(builder)
    }

    /// Start a child record inside this one
    pub fn nested(&mut self, item_type: ItemType, fixed_size: usize) -> Result<Builder<'_>> {
        self.align()?;

        let mut parents = Vec::with_capacity(self.parents.len() + 1);
        parents.extend_from_slice(&self.parents);
        parents.push(self.offset);

        Builder::open(&mut *self.buffer, parents, item_type, fixed_size)
    }

    /// Offset of this record's header
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Nesting depth, 0 for a top-level record
    pub fn depth(&self) -> usize {
        self.parents.len()
    }

    /// Current `byte_length` of this record
    pub fn size(&self) -> Result<usize> {
        Ok(self.buffer.header_at(self.offset)?.byte_length as usize)
    }

    pub fn buffer(&self) -> &Buffer {
        &*self.buffer
    }

    /// Add `n` bytes to this record's length and to every ancestor's length
    pub fn add_size(&mut self, n: usize) -> Result<()> {
        let n = u32::try_from(n).map_err(|_| MapbufError::RecordTooLarge(n))?;

        for &offset in self.parents.iter().chain(std::iter::once(&self.offset)) {
            let mut header = self.buffer.header_at(offset)?;
            header.byte_length = header
                .byte_length
                .checked_add(n)
                .ok_or(MapbufError::RecordTooLarge(header.byte_length as usize))?;
            self.buffer.write_at(offset, &header.byte_length.to_le_bytes());
        }

        Ok(())
    }

    /// Make sure `additional` bytes can be added without partial writes
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<()> {
        let outermost = self.parents.first().copied().unwrap_or(self.offset);
        check_growth(self.buffer, outermost, additional)?;
        self.buffer.reserve_capacity(additional)
    }

    /// Overwrite bytes inside this record's fixed part
    pub fn write_fixed(&mut self, at: usize, bytes: &[u8]) {
        self.buffer.write_at(self.offset + at, bytes);
    }

    /// Append raw payload bytes
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        self.reserve(bytes.len())?;
        let written = self.buffer.append(bytes)?;
        self.add_size(written)?;
        Ok(written)
    }

    /// Append a NUL-terminated string
    pub fn append_str(&mut self, s: &str) -> Result<usize> {
        self.reserve(s.len() + 1)?;
        let written = self.buffer.append_str(s)?;
        self.add_size(written)?;
        Ok(written)
    }

    /// Construct a fixed-size value in place
    pub fn add_record<T: Record>(&mut self, value: &T) -> Result<()> {
        self.reserve(T::SIZE)?;
        self.buffer.emplace(value)?;
        self.add_size(T::SIZE)
    }

    /// Copy a complete record into this one
    pub fn add_item(&mut self, item: &Item<'_>) -> Result<()> {
        self.align()?;
        self.append(item.as_bytes())?;
        Ok(())
    }

    /// Pad the payload to the alignment boundary, counting the padding
    pub(crate) fn align(&mut self) -> Result<usize> {
        let padding = padded_length(self.buffer.written()) - self.buffer.written();
        if padding > 0 {
            self.reserve(padding)?;
            self.buffer.pad_to_alignment()?;
            self.add_size(padding)?;
        }
        Ok(padding)
    }

    /// Complete the record and return its header offset
    ///
    /// Pads the record to the alignment boundary and notes the padding in
    /// its header. Ancestors stay open; the caller commits the buffer once
    /// the outermost record is finished.
    pub fn finish(mut self) -> Result<usize> {
        self.close()
    }

    fn close(&mut self) -> Result<usize> {
        if self.finished {
            return Ok(self.offset);
        }
        self.finished = true;

        let padding = self.align()?;
        if padding > 0 {
            let mut header = self.buffer.header_at(self.offset)?;
            header.padding = padding as u8;
            self.buffer.write_at(self.offset, &header.to_bytes());
        }

        Ok(self.offset)
    }
}

impl Drop for Builder<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.close() {
            warn!(
                "Record at offset {} dropped without finish and could not be completed: {}",
                self.offset, e
            );
        }
    }
}

/// Fail if growing the outermost open record by `additional` overflows its length
fn check_growth(buffer: &Buffer, outermost: usize, additional: usize) -> Result<()> {
    let current = buffer.header_at(outermost)?.byte_length as usize;
    match current.checked_add(additional) {
        Some(total) if total <= u32::MAX as usize => Ok(()),
        _ => Err(MapbufError::RecordTooLarge(current.saturating_add(additional))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::buffer::GrowthPolicy;

    #[test]
    fn test_empty_record() {
        let mut buffer = Buffer::new(64, GrowthPolicy::Auto);
        let offset = Builder::new(&mut buffer, ItemType::TagList, ItemHeader::SIZE)
            .unwrap()
            .finish()
            .unwrap();
        buffer.commit();

        let item = buffer.get(offset).unwrap();
        assert_eq!(item.byte_length(), ItemHeader::SIZE);
        assert_eq!(item.header().padding, 0);
    }

    #[test]
    fn test_size_propagates_to_ancestors() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut outer = Builder::new(&mut buffer, ItemType::Path, 16).unwrap();
        {
            let mut middle = outer.nested(ItemType::TagList, ItemHeader::SIZE).unwrap();
            middle.append_str("abc").unwrap();
            assert_eq!(middle.size().unwrap(), 12);
            assert_eq!(middle.depth(), 1);
            middle.finish().unwrap();
        }
        assert_eq!(outer.size().unwrap(), 16 + 16);
        let offset = outer.finish().unwrap();
        buffer.commit();

        let item = buffer.get(offset).unwrap();
        assert_eq!(item.byte_length(), buffer.committed());
    }

    #[test]
    fn test_padding_recorded_in_header() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        let mut builder = Builder::new(&mut buffer, ItemType::TagList, ItemHeader::SIZE).unwrap();
        builder.append_str("k").unwrap();
        builder.append_str("v").unwrap();
        let offset = builder.finish().unwrap();
        buffer.commit();

        let item = buffer.get(offset).unwrap();
        assert_eq!(item.byte_length(), 16);
        assert_eq!(item.header().padding, 4);
        assert_eq!(item.content(), b"k\0v\0");
    }

    #[test]
    fn test_drop_completes_record() {
        let mut buffer = Buffer::new(0, GrowthPolicy::Auto);
        {
            let mut builder =
                Builder::new(&mut buffer, ItemType::TagList, ItemHeader::SIZE).unwrap();
            builder.append_str("x").unwrap();
            builder.append_str("y").unwrap();
        }
        assert!(buffer.is_aligned());
        buffer.commit();

        let item = buffer.get(0).unwrap();
        assert_eq!(item.byte_length(), 16);
    }

    #[test]
    fn test_failed_write_leaves_record_consistent() {
        let mut buffer = Buffer::new(24, GrowthPolicy::Fixed);
        let mut builder = Builder::new(&mut buffer, ItemType::TagList, ItemHeader::SIZE).unwrap();
        builder.append_str("key").unwrap();

        assert!(matches!(
            builder.append(&[1u8; 32]),
            Err(MapbufError::Capacity { .. })
        ));
        assert_eq!(builder.size().unwrap(), 12);
        assert_eq!(builder.buffer().written(), 12);
    }

    #[test]
    fn test_add_item_copies_record() {
        let mut source = Buffer::new(0, GrowthPolicy::Auto);
        let mut tags = Builder::new(&mut source, ItemType::TagList, ItemHeader::SIZE).unwrap();
        tags.append_str("a").unwrap();
        tags.append_str("b").unwrap();
        let source_offset = tags.finish().unwrap();
        source.commit();
        let item = source.get(source_offset).unwrap();

        let mut target = Buffer::new(0, GrowthPolicy::Auto);
        let mut outer = Builder::new(&mut target, ItemType::Relation, 16).unwrap();
        outer.add_item(&item).unwrap();
        let offset = outer.finish().unwrap();
        target.commit();

        let copy = target.get(offset).unwrap();
        assert_eq!(copy.byte_length(), 16 + item.byte_length());
        assert_eq!(&copy.as_bytes()[16..], item.as_bytes());
    }
}
