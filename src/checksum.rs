//! 64-bit file signatures: a rolling CRC word paired with a rotating byte
//! sum.
//!
//! The same hasher is used for three things: the 32 KiB prefix signature,
//! the full-content signature, and hashing path strings for the seen-path
//! set.

use std::fmt;

/// A 64-bit signature, compared lexicographically as `(crc, sum)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature {
    pub crc: u32,
    pub sum: u32,
}

impl Signature {
    /// Signature carrying a volume file id instead of content, so the
    /// index clusters by physical identity in list mode.
    pub fn from_file_id(id: u64) -> Self {
        Signature {
            crc: (id >> 32) as u32,
            sum: id as u32,
        }
    }

    pub fn as_u64(self) -> u64 {
        (self.crc as u64) << 32 | self.sum as u64
    }

    /// Fold the file size into the sum word. Separates files whose
    /// prefixes collide but whose lengths differ.
    pub fn with_size(mut self, size: u64) -> Self {
        self.sum = self.sum.wrapping_add(size as u32);
        self
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}{:08x}", self.crc, self.sum)
    }
}

/// Streaming checksum state. Feed chunks with [`update`](Hasher::update),
/// read the result with [`finish`](Hasher::finish).
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    crc: u32,
    sum: u32,
}

impl Hasher {
    pub fn new() -> Self {
        Hasher::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.crc;
        let mut sum = self.sum;
        for &b in data {
            crc ^= b as u32;
            sum = sum.wrapping_add(b as u32);
            crc = (crc >> 8) ^ ((crc & 0xff) << 24) ^ ((crc & 0xff) << 9);
            sum = sum.rotate_left(1);
        }
        self.crc = crc;
        self.sum = sum;
    }

    pub fn finish(&self) -> Signature {
        Signature {
            crc: self.crc,
            sum: self.sum,
        }
    }
}

/// One-shot signature of a byte slice.
pub fn signature_of(data: &[u8]) -> Signature {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finish()
}
