//! Slot-state directory: two bits of state per slot.
//!
//! Layout: slot `i` occupies bits `2*(i%4)..2*(i%4)+2` of byte `i/4`.

use crate::error::{Error, Result};

/// State of one slot.
///
/// In a [`ChainedMap`](crate::ChainedMap) the same tags describe sub-table
/// lifecycle: `Used` is an active sub-table, `Deleted` a warm reserve, and
/// `Empty` either a freshly allocated sub-table or a cold reserve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotTag {
    Empty = 0b00,
    Deleted = 0b01,
    Used = 0b10,
}

impl SlotTag {
    #[inline]
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => SlotTag::Deleted,
            0b10 => SlotTag::Used,
            _ => SlotTag::Empty,
        }
    }
}

#[inline]
fn byte_len(len: usize) -> usize {
    (len * 2).div_ceil(8)
}

/// Bit-packed array of [`SlotTag`]s, all `Empty` on creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotTags {
    bits: Box<[u8]>,
    len: usize,
}

impl SlotTags {
    pub fn new() -> Self {
        Self {
            bits: Box::default(),
            len: 0,
        }
    }

    /// Zeroed directory for `len` slots.
    pub fn with_len(len: usize) -> Self {
        Self {
            bits: vec![0u8; byte_len(len)].into_boxed_slice(),
            len,
        }
    }

    /// Like [`with_len`](Self::with_len), reporting allocator refusal.
    pub fn try_with_len(len: usize) -> Result<Self> {
        let bytes = byte_len(len);
        let mut bits = Vec::new();
        bits.try_reserve_exact(bytes)
            .map_err(|_| Error::AllocationFailure)?;
        bits.resize(bytes, 0u8);
        Ok(Self {
            bits: bits.into_boxed_slice(),
            len,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of packed storage.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.bits.len()
    }

    /// Tag of slot `index`. Out-of-range slots read as `Empty`.
    #[inline]
    pub fn get(&self, index: usize) -> SlotTag {
        if index >= self.len {
            return SlotTag::Empty;
        }
        let shift = (index % 4) * 2;
        SlotTag::from_bits(self.bits[index / 4] >> shift)
    }

    /// Set slot `index`. Out-of-range writes are ignored.
    #[inline]
    pub fn set(&mut self, index: usize, tag: SlotTag) {
        if index >= self.len {
            return;
        }
        let shift = (index % 4) * 2;
        let byte = &mut self.bits[index / 4];
        *byte = (*byte & !(0b11 << shift)) | ((tag as u8) << shift);
    }

    /// Mark every slot `Empty`.
    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    /// Replace the directory with a zeroed one of `len` slots.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        *self = Self::try_with_len(len)?;
        Ok(())
    }

    /// Number of slots currently carrying `tag`.
    pub fn count(&self, tag: SlotTag) -> usize {
        (0..self.len).filter(|&i| self.get(i) == tag).count()
    }
}

impl Default for SlotTags {
    fn default() -> Self {
        Self::new()
    }
}
