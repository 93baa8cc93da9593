//! CRC-32 module
//!
//! Implements the CRC-32 checksum mandated by the PNG specification for chunk integrity
//! (IEEE 802.3 / zlib, reflected polynomial 0xEDB88320). The lookup table is built at
//! compile time, so it is shared read-only by every caller.

/// Reflected CRC-32 polynomial used by PNG and zlib
pub const POLYNOMIAL: u32 = 0xEDB8_8320;

/// 256-entry lookup table, one entry per byte value
pub static CRC_TABLE: [u32; 256] = make_table();

const fn make_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { POLYNOMIAL ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// Incremental CRC-32 state.
///
/// Feeding the chunk type and then the chunk data gives the same result as checksumming
/// their concatenation in one call.
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    /// Create a hasher in the initial all-ones state.
    pub fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    /// Advance the checksum over `data`.
    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.state;
        for &byte in data {
            crc = CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
        }
        self.state = crc;
    }

    /// Final checksum value. The hasher can keep being updated afterwards.
    pub fn finalize(&self) -> u32 {
        self.state ^ 0xFFFF_FFFF
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-32 of a complete byte sequence.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(data);
    hasher.finalize()
}
