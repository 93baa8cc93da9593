//! Test utilities for mandarat-png
// Provides helpers for building small valid PNG streams and sample payloads

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::chunk::{write_chunk, ChunkError, Chunks, END_CHUNK, PNG_SIGNATURE};
use crate::codec::MandaratCell;

/// Create a minimal 8-bit RGB PNG: IHDR, one zlib IDAT, IEND.
///
/// Pixels follow a simple gradient so different sizes produce different image data.
pub fn minimal_png(width: u32, height: u32) -> std::io::Result<Vec<u8>> {
    // IHDR: width, height, bit depth 8, color type 2 (RGB), deflate, no filter, no interlace
    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);

    // Each scanline is a filter byte (0 = none) followed by RGB triples
    let mut raw = Vec::with_capacity(height as usize * (1 + width as usize * 3));
    for y in 0..height {
        raw.push(0);
        for x in 0..width {
            raw.extend_from_slice(&[(x * 40) as u8, (y * 40) as u8, 0x80]);
        }
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let idat = encoder.finish()?;

    let mut png = PNG_SIGNATURE.to_vec();
    write_chunk(&mut png, b"IHDR", &ihdr);
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, END_CHUNK, &[]);
    Ok(png)
}

/// Insert an arbitrary chunk right before the IEND chunk, found by walking the stream.
pub fn insert_before_end(png: &[u8], chunk_type: &[u8; 4], data: &[u8]) -> Result<Vec<u8>, ChunkError> {
    for chunk in Chunks::new(png)? {
        let chunk = chunk?;
        if chunk.is(END_CHUNK) {
            let at = chunk.offset();
            let mut out = png[..at].to_vec();
            write_chunk(&mut out, chunk_type, data);
            out.extend_from_slice(&png[at..]);
            return Ok(out);
        }
    }
    Err(ChunkError::MissingEnd)
}

/// Center block of a filled-in grid: the main goal, the eight sub-goals around it, and the
/// copies of those sub-goals at the centers of the outer blocks.
pub fn sample_cells() -> Vec<MandaratCell> {
    let sub_goals = [
        (30, 10, "건강"),
        (31, 13, "커리어/일"),
        (32, 16, "자기계발"),
        (39, 37, "재정 관리"),
        (41, 43, "관계"),
        (48, 64, "생활 습관"),
        (49, 67, "취미/즐거움"),
        (50, 70, "마인드셋"),
    ];

    let mut cells = vec![MandaratCell::new(40, "균형잡힌 한 해 만들기")];
    for (position, _, title) in sub_goals {
        cells.push(MandaratCell::new(position, title));
    }
    for (_, block_center, title) in sub_goals {
        cells.push(MandaratCell::new(block_center, title));
    }
    cells.push(MandaratCell::new(0, "주 3회 이상 운동"));
    cells.push(MandaratCell::new(80, "나 자신 존중"));
    cells
}
