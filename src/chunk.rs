//! Chunk framing module
//!
//! PNG data is stored in chunks after an 8-byte signature:
//! a 4-byte big-endian data length, a 4-byte ASCII chunk type, the data itself, and a
//! CRC-32 over type + data. An IEND chunk marks the end of the stream.
//!
//! This module reads and writes that framing only. It knows nothing about pixel data.

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::crc::Crc32;

/// Fixed 8-byte PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Chunk type of uncompressed key/value text metadata
pub const TEXT_CHUNK: &[u8; 4] = b"tEXt";

/// Chunk type that terminates every PNG stream
pub const END_CHUNK: &[u8; 4] = b"IEND";

/// Length + type + CRC fields around the data of every chunk
pub const CHUNK_OVERHEAD: usize = 12;

/// Size of a complete IEND chunk (it carries no data)
pub const END_CHUNK_LEN: usize = CHUNK_OVERHEAD;

/// Largest data length a PNG chunk may declare (2^31 - 1)
pub const MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;

/// Errors in the chunk stream structure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Missing PNG signature")]
    Signature,
    #[error("Truncated chunk at offset {offset}: needs {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("Chunk at offset {offset} declares length {length}, limit is {limit}")]
    Oversized { offset: usize, length: u32, limit: u32 },
    #[error("CRC mismatch in {chunk_type} chunk at offset {offset}: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        chunk_type: String,
        offset: usize,
        stored: u32,
        computed: u32,
    },
    #[error("Chunk stream ended without IEND")]
    MissingEnd,
}

/// A borrowed view of one chunk inside a PNG byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    offset: usize,
    chunk_type: [u8; 4],
    data: &'a [u8],
    crc: u32,
}

impl<'a> Chunk<'a> {
    /// Offset of the chunk's length field within the stream
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn chunk_type(&self) -> &[u8; 4] {
        &self.chunk_type
    }

    /// Chunk type as text, for logs and listings
    pub fn type_name(&self) -> String {
        String::from_utf8_lossy(&self.chunk_type).into_owned()
    }

    pub fn is(&self, chunk_type: &[u8; 4]) -> bool {
        &self.chunk_type == chunk_type
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// CRC as stored in the stream
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// CRC recomputed over type + data
    pub fn computed_crc(&self) -> u32 {
        let mut hasher = Crc32::new();
        hasher.update(&self.chunk_type);
        hasher.update(self.data);
        hasher.finalize()
    }

    pub fn crc_matches(&self) -> bool {
        self.crc == self.computed_crc()
    }

    /// Fail with `CrcMismatch` unless the stored CRC verifies
    pub fn verify(&self) -> Result<(), ChunkError> {
        let computed = self.computed_crc();
        if computed != self.crc {
            return Err(ChunkError::CrcMismatch {
                chunk_type: self.type_name(),
                offset: self.offset,
                stored: self.crc,
                computed,
            });
        }
        Ok(())
    }

    /// Total bytes the chunk occupies, framing included
    pub fn total_len(&self) -> usize {
        CHUNK_OVERHEAD + self.data.len()
    }
}

/// Check the 8-byte signature at the start of `bytes`.
pub fn check_signature(bytes: &[u8]) -> Result<(), ChunkError> {
    match bytes.get(..PNG_SIGNATURE.len()) {
        Some(head) if head == PNG_SIGNATURE => Ok(()),
        _ => Err(ChunkError::Signature),
    }
}

/// Forward iterator over the chunks of a PNG byte stream.
///
/// Stops after yielding IEND, at the end of the input, or after the first framing error.
/// Stored CRCs are not checked here; callers use [`Chunk::verify`] when they care.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    bytes: &'a [u8],
    offset: usize,
    max_len: u32,
    done: bool,
}

impl<'a> Chunks<'a> {
    /// Start walking `bytes`, which must begin with the PNG signature.
    pub fn new(bytes: &'a [u8]) -> Result<Self, ChunkError> {
        check_signature(bytes)?;
        Ok(Self {
            bytes,
            offset: PNG_SIGNATURE.len(),
            max_len: MAX_CHUNK_LEN,
            done: false,
        })
    }

    /// Treat declared lengths above `max_len` as corruption.
    pub fn with_max_len(mut self, max_len: u32) -> Self {
        self.max_len = max_len;
        self
    }

    /// Offset of the next chunk to be read
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn fail(&mut self, err: ChunkError) -> Option<Result<Chunk<'a>, ChunkError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>, ChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.bytes.len() {
            return None;
        }

        let offset = self.offset;
        let mut rest = &self.bytes[offset..];
        let available = rest.len();
        if available < 8 {
            return self.fail(ChunkError::Truncated { offset, needed: 8, available });
        }

        let length = rest.get_u32();
        let mut chunk_type = [0u8; 4];
        rest.copy_to_slice(&mut chunk_type);

        if length > self.max_len {
            return self.fail(ChunkError::Oversized { offset, length, limit: self.max_len });
        }
        let needed = CHUNK_OVERHEAD + length as usize;
        if available < needed {
            return self.fail(ChunkError::Truncated { offset, needed, available });
        }

        let data = &rest[..length as usize];
        rest.advance(length as usize);
        let crc = rest.get_u32();

        self.offset += needed;
        if &chunk_type == END_CHUNK {
            self.done = true;
        }
        tracing::trace!(offset, length, chunk_type = %String::from_utf8_lossy(&chunk_type), "chunk");

        Some(Ok(Chunk { offset, chunk_type, data, crc }))
    }
}

/// Append one complete chunk (length, type, data, CRC) to `out`.
pub fn write_chunk<B: BufMut>(out: &mut B, chunk_type: &[u8; 4], data: &[u8]) {
    let mut hasher = Crc32::new();
    hasher.update(chunk_type);
    hasher.update(data);

    out.put_u32(data.len() as u32);
    out.put_slice(chunk_type);
    out.put_slice(data);
    out.put_u32(hasher.finalize());
}

/// Build a tEXt chunk holding `key`, a null separator, and `value`.
pub fn build_text_chunk(key: &str, value: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(key.len() + 1 + value.len());
    data.extend_from_slice(key.as_bytes());
    data.push(0);
    data.extend_from_slice(value.as_bytes());

    let mut chunk = Vec::with_capacity(CHUNK_OVERHEAD + data.len());
    write_chunk(&mut chunk, TEXT_CHUNK, &data);
    chunk
}

/// Key/value view of a tEXt chunk's data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunk<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> TextChunk<'a> {
    /// Split at the first null byte. Data without a null yields an empty key and
    /// everything after the first byte as the value.
    pub fn parse(data: &'a [u8]) -> Self {
        let split = data.iter().position(|&b| b == 0).unwrap_or(0);
        Self {
            key: &data[..split],
            value: data.get(split + 1..).unwrap_or(&[]),
        }
    }
}
