//! Self-describing record headers and checked views over record bytes
//!
//! Every record stored in a [`Buffer`](crate::core::buffer::Buffer) starts with
//! an 8-byte [`ItemHeader`]:
//!
//! ```text
//! ┌──────────────────┬────────────────┬─────────────┬───────────┐
//! │ byte_length: u32 │ type_tag: u16  │ padding: u8 │ flags: u8 │
//! └──────────────────┴────────────────┴─────────────┴───────────┘
//! ```
//!
//! `byte_length` covers the header, all payload, all nested records and the
//! trailing alignment padding, so a scanner can hop from record to record
//! without any external index.

use crate::core::error::{MapbufError, Result};

/// Every record starts and ends on this boundary
pub const ALIGN_BYTES: usize = 8;

/// Round `len` up to the next multiple of [`ALIGN_BYTES`]
///
/// `len` must leave room for the padding; sizes that come from outside use
/// [`checked_padded_length`].
pub const fn padded_length(len: usize) -> usize {
    (len + ALIGN_BYTES - 1) & !(ALIGN_BYTES - 1)
}

/// [`padded_length`], or `None` if the result does not fit in `usize`
pub const fn checked_padded_length(len: usize) -> Option<usize> {
    match len.checked_add(ALIGN_BYTES - 1) {
        Some(end) => Some(end & !(ALIGN_BYTES - 1)),
        None => None,
    }
}

/// Record type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ItemType {
    /// A located map point
    Point = 0x01,
    /// An ordered sequence of point references
    Path = 0x02,
    /// A group of member entities with roles
    Relation = 0x03,
    /// Key/value string pairs
    TagList = 0x11,
    /// Point references of a path
    NodeRefList = 0x12,
    /// Members of a relation
    MemberList = 0x13,
}

impl ItemType {
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0x01 => Ok(ItemType::Point),
            0x02 => Ok(ItemType::Path),
            0x03 => Ok(ItemType::Relation),
            0x11 => Ok(ItemType::TagList),
            0x12 => Ok(ItemType::NodeRefList),
            0x13 => Ok(ItemType::MemberList),
            _ => Err(MapbufError::InvalidItemType(value)),
        }
    }

    /// Points, paths and relations are entities; everything else is a sub-list
    pub fn is_entity(self) -> bool {
        matches!(self, ItemType::Point | ItemType::Path | ItemType::Relation)
    }
}

/// Fixed-size value that can be constructed in place over reserved buffer bytes
pub trait Record: Sized {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Encode into `out`, which is exactly `SIZE` bytes long
    fn write_to(&self, out: &mut [u8]);

    /// Decode from `bytes`, which must hold at least `SIZE` bytes
    fn read_from(bytes: &[u8]) -> Result<Self>;
}

fn truncated(at: usize, wanted: usize, len: usize) -> MapbufError {
    MapbufError::Corrupted(format!(
        "need {} bytes at offset {}, only {} available",
        wanted, at, len
    ))
}

pub(crate) fn read_u16(bytes: &[u8], at: usize) -> Result<u16> {
    bytes
        .get(at..at + 2)
        .and_then(|s| s.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or_else(|| truncated(at, 2, bytes.len()))
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| truncated(at, 4, bytes.len()))
}

pub(crate) fn read_i32(bytes: &[u8], at: usize) -> Result<i32> {
    bytes
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .map(i32::from_le_bytes)
        .ok_or_else(|| truncated(at, 4, bytes.len()))
}

pub(crate) fn read_i64(bytes: &[u8], at: usize) -> Result<i64> {
    bytes
        .get(at..at + 8)
        .and_then(|s| s.try_into().ok())
        .map(i64::from_le_bytes)
        .ok_or_else(|| truncated(at, 8, bytes.len()))
}

/// Record header (8 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    /// Total record length including header, children and padding
    pub byte_length: u32,

    /// What kind of record follows
    pub item_type: ItemType,

    /// Zero bytes appended by the record's own builder to reach alignment
    pub padding: u8,

    /// Reserved, always zero
    pub flags: u8,
}

impl ItemHeader {
    pub const SIZE: usize = 8;

    pub fn new(item_type: ItemType) -> Self {
        ItemHeader {
            byte_length: 0,
            item_type,
            padding: 0,
            flags: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.byte_length.to_le_bytes());
        bytes[4..6].copy_from_slice(&(self.item_type as u16).to_le_bytes());
        bytes[6] = self.padding;
        bytes[7] = self.flags;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(truncated(0, Self::SIZE, bytes.len()));
        }

        Ok(ItemHeader {
            byte_length: read_u32(bytes, 0)?,
            item_type: ItemType::from_u16(read_u16(bytes, 4)?)?,
            padding: bytes[6],
            flags: bytes[7],
        })
    }

    /// Length without the trailing alignment padding
    pub fn content_end(&self) -> usize {
        (self.byte_length as usize).saturating_sub(self.padding as usize)
    }
}

/// Checked, zero-copy view over one complete record
#[derive(Debug, Clone, Copy)]
pub struct Item<'a> {
    header: ItemHeader,
    bytes: &'a [u8],
}

impl<'a> Item<'a> {
    /// Parse the record starting at `bytes[0]`
    ///
    /// Validates the header and that the whole record lies within `bytes`.
    /// Trailing bytes after the record are ignored.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let header = ItemHeader::from_bytes(bytes)?;
        let length = header.byte_length as usize;

        if length < ItemHeader::SIZE || length % ALIGN_BYTES != 0 {
            return Err(MapbufError::Corrupted(format!(
                "{:?} record has invalid length {}",
                header.item_type, length
            )));
        }
        if length > bytes.len() {
            return Err(truncated(0, length, bytes.len()));
        }
        if header.padding as usize >= ALIGN_BYTES
            || header.padding as usize > length - ItemHeader::SIZE
        {
            return Err(MapbufError::Corrupted(format!(
                "{:?} record has invalid padding {}",
                header.item_type, header.padding
            )));
        }

        Ok(Item {
            header,
            bytes: &bytes[..length],
        })
    }

    pub fn header(&self) -> ItemHeader {
        self.header
    }

    pub fn item_type(&self) -> ItemType {
        self.header.item_type
    }

    /// Padded length of the whole record
    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }

    /// All bytes of the record, header and padding included
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Bytes after the header, without trailing padding
    pub fn content(&self) -> &'a [u8] {
        &self.bytes[ItemHeader::SIZE..self.header.content_end()]
    }

    /// Fail unless this record has the given type
    pub fn expect_type(self, expected: ItemType) -> Result<Self> {
        if self.item_type() == expected {
            Ok(self)
        } else {
            Err(MapbufError::UnexpectedItemType {
                expected,
                found: self.item_type(),
            })
        }
    }
}

/// Sequential scanner over back-to-back records
///
/// Yields each record with its offset relative to the scanned slice. Stops
/// after the first malformed record.
#[derive(Debug, Clone)]
pub struct ItemIter<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ItemIter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ItemIter { bytes, pos: 0 }
    }
}

impl<'a> Iterator for ItemIter<'a> {
    type Item = Result<(usize, Item<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() {
            return None;
        }

        let offset = self.pos;
        match Item::parse(&self.bytes[offset..]) {
            Ok(item) => {
                self.pos += item.byte_length();
                Some(Ok((offset, item)))
            }
            Err(e) => {
                self.pos = self.bytes.len();
                Some(Err(e))
            }
        }
    }
}
