//! Fixed-size values storable in a dense index

use crate::core::entity::Location;
use crate::core::error::{MapbufError, Result};
use crate::core::item::Record;
use std::fmt;
use std::ops::Range;

/// A value with a fixed byte encoding and a reserved "unset" pattern
///
/// No value passed to `set` may encode to the sentinel; indexes reject it.
pub trait IndexValue: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Encoded size in bytes, the stride of the array image
    const SIZE: usize;

    /// Value of every slot that was never set
    const SENTINEL: Self;

    fn encode(&self, out: &mut [u8]);

    fn decode(bytes: &[u8]) -> Result<Self>;

    fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

impl IndexValue for Location {
    const SIZE: usize = <Location as Record>::SIZE;
    const SENTINEL: Self = Location::undefined();

    fn encode(&self, out: &mut [u8]) {
        self.write_to(out);
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Location::read_from(bytes)
    }
}

/// Buffer offsets and similar positions; `u64::MAX` means unset
impl IndexValue for u64 {
    const SIZE: usize = 8;
    const SENTINEL: Self = u64::MAX;

    fn encode(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; 8] = bytes
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| MapbufError::Corrupted("truncated u64 slot".into()))?;
        Ok(u64::from_le_bytes(raw))
    }
}

/// Overwrite every slot in `bytes` with the sentinel encoding
pub(crate) fn fill_sentinel<V: IndexValue>(bytes: &mut [u8]) {
    let mut pattern = vec![0u8; V::SIZE];
    V::SENTINEL.encode(&mut pattern);
    for slot in bytes.chunks_exact_mut(V::SIZE) {
        slot.copy_from_slice(&pattern);
    }
}

/// Number of slots needed to hold `id`
pub(crate) fn slots_for(id: u64) -> Result<usize> {
    id.checked_add(1)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or(MapbufError::IdOutOfRange(id))
}

/// Byte range of slot `id`
pub(crate) fn slot_range<V: IndexValue>(id: u64) -> Result<Range<usize>> {
    let start = usize::try_from(id)
        .ok()
        .and_then(|i| i.checked_mul(V::SIZE))
        .ok_or(MapbufError::IdOutOfRange(id))?;
    let end = start
        .checked_add(V::SIZE)
        .ok_or(MapbufError::IdOutOfRange(id))?;
    Ok(start..end)
}

/// Check a value before storing it under `id`
pub(crate) fn check_storable<V: IndexValue>(id: u64, value: &V) -> Result<()> {
    if value.is_sentinel() {
        return Err(MapbufError::SentinelValue(id));
    }
    Ok(())
}

/// Number of whole slots in an image of `len` bytes
pub(crate) fn slots_in_image<V: IndexValue>(len: u64) -> Result<u64> {
    if len % V::SIZE as u64 != 0 {
        return Err(MapbufError::Corrupted(format!(
            "array image of {} bytes is not a multiple of the {}-byte stride",
            len,
            V::SIZE
        )));
    }
    Ok(len / V::SIZE as u64)
}
