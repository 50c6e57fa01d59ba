//! Hardware word bitset and raw sample cursor.

/// One 32-bit raw sample as produced or consumed by a board.
///
/// Bit `n` carries logical channel `n` on digital boards. Words travel
/// little-endian in acquisition buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HardwareWord(u32);

impl HardwareWord {
    /// Number of addressable bits.
    pub const BITS: u32 = 32;

    /// Size of one word in an acquisition buffer.
    pub const SIZE: usize = 4;

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// State of bit `index`; indices past [`BITS`](Self::BITS) read as clear.
    pub fn bit(self, index: u32) -> bool {
        index < Self::BITS && (self.0 >> index) & 1 == 1
    }

    /// Set or clear bit `index`. Out-of-range indices are ignored.
    pub fn set_bit(&mut self, index: u32, value: bool) {
        if index >= Self::BITS {
            return;
        }
        if value {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    /// Copy with bit `index` set to `value`.
    pub fn with_bit(mut self, index: u32, value: bool) -> Self {
        self.set_bit(index, value);
        self
    }

    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Decode the word starting at `bytes[0]`, `None` if fewer than four bytes.
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        let chunk: [u8; 4] = bytes.get(..Self::SIZE)?.try_into().ok()?;
        Some(Self::from_le_bytes(chunk))
    }

    /// Encode the word into `bytes[..4]`; returns `false` if the slice is short.
    pub fn write_to(self, bytes: &mut [u8]) -> bool {
        match bytes.get_mut(..Self::SIZE) {
            Some(slot) => {
                slot.copy_from_slice(&self.to_le_bytes());
                true
            }
            None => false,
        }
    }
}

impl From<u32> for HardwareWord {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Binary for HardwareWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Binary::fmt(&self.0, f)
    }
}

/// Forward cursor over raw acquisition memory.
///
/// Yields one [`HardwareWord`] per sample. `stride` is the distance in bytes
/// between consecutive samples of the same word, which is larger than four
/// when a scan holds several words.
#[derive(Debug, Clone)]
pub struct SampleCursor<'a> {
    bytes: &'a [u8],
    position: usize,
    stride: usize,
}

impl<'a> SampleCursor<'a> {
    /// Cursor over densely packed words.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_stride(bytes, 0, HardwareWord::SIZE)
    }

    /// Cursor starting at `offset`, advancing `stride` bytes per sample.
    pub fn with_stride(bytes: &'a [u8], offset: usize, stride: usize) -> Self {
        Self {
            bytes,
            position: offset,
            stride: stride.max(HardwareWord::SIZE),
        }
    }

    /// Samples left before the cursor runs off the end.
    pub fn remaining(&self) -> usize {
        let left = self.bytes.len().saturating_sub(self.position);
        if left < HardwareWord::SIZE {
            0
        } else {
            (left - HardwareWord::SIZE) / self.stride + 1
        }
    }

    /// Byte offset of the next sample.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Iterator for SampleCursor<'_> {
    type Item = HardwareWord;

    fn next(&mut self) -> Option<Self::Item> {
        let word = HardwareWord::read_from(self.bytes.get(self.position..)?)?;
        self.position += self.stride;
        Some(word)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}
