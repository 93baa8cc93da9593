//! mandarat-png — embed and recover Mandarat grid data in PNG `tEXt` chunks
//!
//! The payload travels inside the exported image itself, so a picture of a grid can be
//! re-imported later even after it has passed through other tools, as long as they keep
//! ancillary chunks.

pub mod chunk;
pub mod codec;
pub mod crc;
pub mod file;
pub mod testlib;

pub use chunk::{Chunk, ChunkError, Chunks, PNG_SIGNATURE};
pub use codec::{embed, extract, try_extract, Codec, CodecBuilder, CodecError, MandaratCell, MANDARAT_KEY};
pub use crc::crc32;

static CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate semantic version string.
pub fn version() -> &'static str { CRATE_VERSION }
