#![forbid(unsafe_code)]

/// "Is null" flags for one column, one bit per row.
///
/// Bits are stored little-endian within each `u64` word:
/// - bit 0 is the LSB of word 0
/// - bit 63 is the MSB of word 0
///
/// A set bit means the row is null.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct NullBitmap {
    words: Vec<u64>,
    len: usize,
    nulls: usize,
}

impl NullBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of rows flagged null.
    pub fn null_count(&self) -> usize {
        self.nulls
    }

    pub fn push(&mut self, is_null: bool) {
        let bit = self.len % 64;
        if bit == 0 {
            self.words.push(0);
        }

        if is_null {
            let word = self.len / 64;
            self.words[word] |= 1u64 << bit;
            self.nulls += 1;
        }

        self.len += 1;
    }

    pub fn is_null(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "NullBitmap index out of bounds");
        let word = self.words[index / 64];
        let bit = index % 64;
        ((word >> bit) & 1) == 1
    }

    pub fn heap_size_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }

    /// Serialize as `ceil(len / 8)` bytes, row 0 in the LSB of byte 0.
    pub fn to_bytes(&self) -> Vec<u8> {
        let byte_len = (self.len + 7) / 8;
        self.words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .take(byte_len)
            .collect()
    }

    /// Inverse of [`NullBitmap::to_bytes`]. Returns `None` when `bytes` is not exactly
    /// `ceil(len / 8)` long.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Option<Self> {
        if bytes.len() != (len + 7) / 8 {
            return None;
        }

        let mut words = Vec::with_capacity((len + 63) / 64);
        for chunk in bytes.chunks(8) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            words.push(u64::from_le_bytes(buf));
        }

        // Clear padding bits past `len` so equality and counts stay exact.
        let rem_bits = len % 64;
        if rem_bits != 0 {
            if let Some(last) = words.last_mut() {
                *last &= (1u64 << rem_bits) - 1;
            }
        }

        let nulls = words.iter().map(|w| w.count_ones() as usize).sum();
        Some(Self { words, len, nulls })
    }
}
