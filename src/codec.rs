//! Mandarat payload codec
//!
//! Embeds a grid's cell records into a PNG as a `tEXt` chunk keyed `MandaratData`, and
//! recovers them from arbitrary bytes. The payload is a JSON array of
//! `{"position": <int>, "title": <string>}` objects.
//!
//! Embedding trusts its input: it assumes the last 12 bytes are the IEND chunk and splices
//! the new chunk in front of them. Extraction trusts nothing and reports every failure as
//! "no data".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunk::{
    build_text_chunk, Chunk, ChunkError, Chunks, TextChunk, END_CHUNK, END_CHUNK_LEN, MAX_CHUNK_LEN,
    TEXT_CHUNK,
};

/// tEXt keyword identifying this application's payload
pub const MANDARAT_KEY: &str = "MandaratData";

/// Errors surfaced by the detailed codec entry points
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),
    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Payload is not a valid cell list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One cell of the 9x9 grid as stored in the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandaratCell {
    /// Row-major index, 0-80 by convention (not checked here)
    pub position: i64,
    pub title: String,
}

impl MandaratCell {
    pub fn new(position: i64, title: impl Into<String>) -> Self {
        Self { position, title: title.into() }
    }
}

/// Builder configuration for [`Codec`]
#[derive(Debug, Clone)]
pub struct CodecBuilder {
    key: String,        // Default: "MandaratData"
    verify_crc: bool,   // Default: false
    max_chunk_len: u32, // Default: 2^31 - 1, Range: 0-2^31 - 1
}

impl Default for CodecBuilder {
    fn default() -> Self {
        Self {
            key: MANDARAT_KEY.to_string(),
            verify_crc: false,
            max_chunk_len: MAX_CHUNK_LEN,
        }
    }
}

impl CodecBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    /// tEXt keyword to write and to look for. Expected to be non-empty ASCII without nulls.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
    /// Reject chunks whose stored CRC does not verify while scanning
    pub fn verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }
    pub fn max_chunk_len(mut self, len: u32) -> Self {
        self.max_chunk_len = len.min(MAX_CHUNK_LEN);
        self
    }
    pub fn build(self) -> Codec {
        Codec {
            key: self.key,
            verify_crc: self.verify_crc,
            max_chunk_len: self.max_chunk_len,
        }
    }
}

/// Stateless embed/extract engine. Every operation is a pure function of its input.
#[derive(Debug, Clone)]
pub struct Codec {
    key: String,
    verify_crc: bool,
    max_chunk_len: u32,
}

impl Default for Codec {
    fn default() -> Self {
        CodecBuilder::default().build()
    }
}

impl Codec {
    pub fn builder() -> CodecBuilder {
        CodecBuilder::new()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn chunks<'a>(&self, bytes: &'a [u8]) -> Result<Chunks<'a>, ChunkError> {
        Ok(Chunks::new(bytes)?.with_max_len(self.max_chunk_len))
    }

    fn check(&self, chunk: &Chunk<'_>) -> Result<(), ChunkError> {
        if self.verify_crc {
            chunk.verify().inspect_err(|err| tracing::warn!(error = %err, "corrupt chunk"))?;
        }
        Ok(())
    }

    /// Serialize cells to the JSON text stored in the chunk.
    pub fn encode_payload(cells: &[MandaratCell]) -> String {
        serde_json::to_string(cells).unwrap() // string keys and plain values never fail
    }

    /// Insert the cells as a tEXt chunk in front of the trailing 12-byte IEND chunk.
    ///
    /// The IEND position is taken by offset, not found by walking the stream, so input that
    /// does not end in IEND produces an invalid PNG. Repeated calls append further chunks.
    pub fn embed(&self, png: &[u8], cells: &[MandaratCell]) -> Vec<u8> {
        let chunk = build_text_chunk(&self.key, &Self::encode_payload(cells));
        let end_start = png.len().saturating_sub(END_CHUNK_LEN);
        tracing::debug!(cells = cells.len(), chunk_len = chunk.len(), end_start, "embedding payload");
        splice(png, end_start, &chunk)
    }

    /// Like [`Codec::embed`], but walks the chunk stream to the real IEND first.
    ///
    /// Fails on a bad signature, broken framing, or a stream without IEND. Bytes that
    /// follow IEND are kept after it.
    pub fn try_embed(&self, png: &[u8], cells: &[MandaratCell]) -> Result<Vec<u8>, CodecError> {
        let end_start = self.find_end(png)?;
        let chunk = build_text_chunk(&self.key, &Self::encode_payload(cells));
        tracing::debug!(cells = cells.len(), chunk_len = chunk.len(), end_start, "embedding payload");
        Ok(splice(png, end_start, &chunk))
    }

    fn find_end(&self, png: &[u8]) -> Result<usize, CodecError> {
        for chunk in self.chunks(png)? {
            let chunk = chunk?;
            self.check(&chunk)?;
            if chunk.is(END_CHUNK) {
                return Ok(chunk.offset());
            }
        }
        Err(ChunkError::MissingEnd.into())
    }

    /// Recover the embedded cells, or `None` when the bytes carry no readable payload.
    ///
    /// Not a PNG, no matching chunk, broken framing, bad UTF-8 and bad JSON all end up as
    /// `None`. The first matching chunk in stream order wins.
    pub fn extract(&self, bytes: &[u8]) -> Option<Vec<MandaratCell>> {
        match self.try_extract(bytes) {
            Ok(Some(cells)) => Some(cells),
            Ok(None) => {
                tracing::debug!(key = %self.key, "no payload chunk before IEND");
                None
            }
            Err(err) => {
                tracing::debug!(error = %err, "payload unreadable");
                None
            }
        }
    }

    /// Detailed form of [`Codec::extract`].
    ///
    /// `Ok(None)` means the stream reached IEND without a matching chunk.
    pub fn try_extract(&self, bytes: &[u8]) -> Result<Option<Vec<MandaratCell>>, CodecError> {
        let value = match self.find_value(bytes)? {
            Some(value) => value,
            None => return Ok(None),
        };
        let json = std::str::from_utf8(value)?;
        Ok(Some(serde_json::from_str(json)?))
    }

    fn find_value<'a>(&self, bytes: &'a [u8]) -> Result<Option<&'a [u8]>, CodecError> {
        for chunk in self.chunks(bytes)? {
            let chunk = chunk?;
            self.check(&chunk)?;
            if chunk.is(TEXT_CHUNK) {
                let text = TextChunk::parse(chunk.data());
                if text.key == self.key.as_bytes() {
                    return Ok(Some(text.value));
                }
            }
            if chunk.is(END_CHUNK) {
                return Ok(None);
            }
        }
        Err(ChunkError::MissingEnd.into())
    }

    /// Every tEXt entry up to IEND, in stream order, decoded lossily.
    pub fn text_entries(&self, bytes: &[u8]) -> Result<Vec<(String, String)>, CodecError> {
        let mut entries = Vec::new();
        for chunk in self.chunks(bytes)? {
            let chunk = chunk?;
            self.check(&chunk)?;
            if chunk.is(TEXT_CHUNK) {
                let text = TextChunk::parse(chunk.data());
                entries.push((
                    String::from_utf8_lossy(text.key).into_owned(),
                    String::from_utf8_lossy(text.value).into_owned(),
                ));
            }
        }
        Ok(entries)
    }
}

fn splice(png: &[u8], at: usize, chunk: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(png.len() + chunk.len());
    out.extend_from_slice(&png[..at]);
    out.extend_from_slice(chunk);
    out.extend_from_slice(&png[at..]);
    out
}

/// Embed with the default codec. See [`Codec::embed`].
pub fn embed(png: &[u8], cells: &[MandaratCell]) -> Vec<u8> {
    Codec::default().embed(png, cells)
}

/// Extract with the default codec. See [`Codec::extract`].
pub fn extract(bytes: &[u8]) -> Option<Vec<MandaratCell>> {
    Codec::default().extract(bytes)
}

/// Detailed extract with the default codec. See [`Codec::try_extract`].
pub fn try_extract(bytes: &[u8]) -> Result<Option<Vec<MandaratCell>>, CodecError> {
    Codec::default().try_extract(bytes)
}

/// List tEXt entries with the default codec. See [`Codec::text_entries`].
pub fn text_entries(bytes: &[u8]) -> Result<Vec<(String, String)>, CodecError> {
    Codec::default().text_entries(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{write_chunk, PNG_SIGNATURE};
    use crate::testlib::{insert_before_end, minimal_png, sample_cells};
    use proptest::prelude::*;

    fn base_png() -> Vec<u8> {
        minimal_png(3, 2).unwrap()
    }

    fn payload_data(json: &str) -> Vec<u8> {
        [MANDARAT_KEY.as_bytes(), &[0u8][..], json.as_bytes()].concat()
    }

    #[test]
    fn test_embed_extract_roundtrip() {
        let cells = sample_cells();
        let embedded = embed(&base_png(), &cells);
        assert_eq!(extract(&embedded), Some(cells));
    }

    #[test]
    fn test_embed_places_chunk_before_iend() {
        let png = base_png();
        let cells = vec![MandaratCell::new(40, "goal")];
        let embedded = embed(&png, &cells);

        let chunk = build_text_chunk(MANDARAT_KEY, r#"[{"position":40,"title":"goal"}]"#);
        assert_eq!(embedded.len(), png.len() + chunk.len());
        assert_eq!(&embedded[..png.len() - 12], &png[..png.len() - 12]);
        assert_eq!(&embedded[png.len() - 12..embedded.len() - 12], &chunk[..]);
        assert_eq!(&embedded[embedded.len() - 12..], &png[png.len() - 12..]);
    }

    #[test]
    fn test_payload_json_shape() {
        let json = Codec::encode_payload(&[MandaratCell::new(0, "a"), MandaratCell::new(80, "b")]);
        assert_eq!(json, r#"[{"position":0,"title":"a"},{"position":80,"title":"b"}]"#);
        assert_eq!(Codec::encode_payload(&[]), "[]");
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let embedded = embed(&base_png(), &[]);
        assert_eq!(extract(&embedded), Some(vec![]));
    }

    #[test]
    fn test_first_embedded_payload_wins() {
        let first = vec![MandaratCell::new(40, "first")];
        let second = vec![MandaratCell::new(40, "second")];
        let once = embed(&base_png(), &first);
        let twice = embed(&once, &second);

        assert_eq!(extract(&twice), Some(first));
        let keys: Vec<_> = text_entries(&twice).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, [MANDARAT_KEY, MANDARAT_KEY]);
    }

    #[test]
    fn test_extract_is_repeatable() {
        let embedded = embed(&base_png(), &sample_cells());
        assert_eq!(extract(&embedded), extract(&embedded));
    }

    #[test]
    fn test_signature_rejection() {
        let embedded = embed(&base_png(), &sample_cells());
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        jpeg.extend_from_slice(&embedded[8..]);

        assert_eq!(extract(&jpeg), None);
        assert_eq!(extract(&[]), None);
        assert_eq!(extract(&[0x89, 0x50, 0x4E, 0x47]), None);
        assert!(matches!(try_extract(&[]), Err(CodecError::Chunk(ChunkError::Signature))));
    }

    #[test]
    fn test_png_without_payload() {
        assert_eq!(extract(&base_png()), None);
        assert!(matches!(try_extract(&base_png()), Ok(None)));
    }

    #[test]
    fn test_foreign_text_chunks_skipped() {
        let png = insert_before_end(&base_png(), TEXT_CHUNK, b"Software\0some editor").unwrap();
        assert_eq!(extract(&png), None);

        let cells = vec![MandaratCell::new(1, "x")];
        let embedded = embed(&png, &cells);
        assert_eq!(extract(&embedded), Some(cells));
    }

    #[test]
    fn test_key_must_match_exactly() {
        let png = insert_before_end(&base_png(), TEXT_CHUNK, b"MandaratDat\0[]").unwrap();
        assert_eq!(extract(&png), None);
        let png = insert_before_end(&base_png(), TEXT_CHUNK, b"mandaratdata\0[]").unwrap();
        assert_eq!(extract(&png), None);
        let png = insert_before_end(&base_png(), TEXT_CHUNK, b"MandaratData \0[]").unwrap();
        assert_eq!(extract(&png), None);
    }

    #[test]
    fn test_invalid_json_is_no_data() {
        let png = insert_before_end(&base_png(), TEXT_CHUNK, b"MandaratData\0{not json").unwrap();
        assert_eq!(extract(&png), None);
        assert!(matches!(try_extract(&png), Err(CodecError::Json(_))));

        let png = insert_before_end(&base_png(), TEXT_CHUNK, &payload_data(r#"[{"position":"4","title":"x"}]"#)).unwrap();
        assert_eq!(extract(&png), None);
    }

    #[test]
    fn test_invalid_utf8_is_no_data() {
        let png = insert_before_end(&base_png(), TEXT_CHUNK, b"MandaratData\0[\xFF\xFE]").unwrap();
        assert_eq!(extract(&png), None);
        assert!(matches!(try_extract(&png), Err(CodecError::Utf8(_))));
    }

    #[test]
    fn test_truncated_stream_is_no_data() {
        let embedded = embed(&base_png(), &sample_cells());
        // Cut inside the tEXt chunk
        let cut = &embedded[..embedded.len() - 40];
        assert_eq!(extract(cut), None);
        assert!(matches!(try_extract(cut), Err(CodecError::Chunk(ChunkError::Truncated { .. }))));
    }

    #[test]
    fn test_missing_iend_is_no_data() {
        let png = base_png();
        let without_end = &png[..png.len() - 12];
        assert_eq!(extract(without_end), None);
        assert!(matches!(try_extract(without_end), Err(CodecError::Chunk(ChunkError::MissingEnd))));
    }

    #[test]
    fn test_payload_after_iend_ignored() {
        let mut png = base_png();
        write_chunk(&mut png, TEXT_CHUNK, b"MandaratData\0[]");
        assert_eq!(extract(&png), None);
    }

    #[test]
    fn test_unicode_titles_survive() {
        let cells = vec![
            MandaratCell::new(40, "균형잡힌 한 해 만들기"),
            MandaratCell::new(30, "健康 🏃‍♀️ «santé»"),
            MandaratCell::new(31, "line\nbreak \"quoted\" \\ tab\t"),
        ];
        let embedded = embed(&base_png(), &cells);
        let restored = extract(&embedded).unwrap();
        for (a, b) in restored.iter().zip(&cells) {
            assert_eq!(a.title.as_bytes(), b.title.as_bytes());
        }
        assert_eq!(restored, cells);
    }

    #[test]
    fn test_extra_fields_tolerated() {
        let value = payload_data(r#"[{"id":"c1","position":40,"title":"goal"}]"#);
        let png = insert_before_end(&base_png(), TEXT_CHUNK, &value).unwrap();
        assert_eq!(extract(&png), Some(vec![MandaratCell::new(40, "goal")]));
    }

    #[test]
    fn test_position_range_not_enforced() {
        let cells = vec![
            MandaratCell::new(-1, "before the grid"),
            MandaratCell::new(200, "past the grid"),
            MandaratCell::new(5_000_000_000, "wide"),
        ];
        let embedded = embed(&base_png(), &cells);
        assert_eq!(extract(&embedded), Some(cells));

        let value = payload_data(r#"[{"position":-1,"title":"x"},{"position":5000000000,"title":"y"}]"#);
        let png = insert_before_end(&base_png(), TEXT_CHUNK, &value).unwrap();
        assert_eq!(
            extract(&png),
            Some(vec![MandaratCell::new(-1, "x"), MandaratCell::new(5_000_000_000, "y")])
        );

        // Still an integer field
        let value = payload_data(r#"[{"position":4.5,"title":"x"}]"#);
        let png = insert_before_end(&base_png(), TEXT_CHUNK, &value).unwrap();
        assert_eq!(extract(&png), None);
    }

    #[test]
    fn test_text_chunk_missing_crc_is_no_data() {
        // Matching tEXt chunk whose trailing CRC was cut off, followed by nothing
        let mut png = base_png();
        png.truncate(png.len() - 12);
        write_chunk(&mut png, TEXT_CHUNK, &payload_data(r#"[{"position":40,"title":"goal"}]"#));
        png.truncate(png.len() - 4);

        assert_eq!(extract(&png), None);
        assert!(matches!(
            try_extract(&png),
            Err(CodecError::Chunk(ChunkError::Truncated { needed, available, .. })) if needed == available + 4
        ));
    }

    #[test]
    fn test_embed_short_input_does_not_panic() {
        let out = embed(&[1, 2, 3], &[]);
        // Everything is treated as the trailing chunk
        assert_eq!(&out[out.len() - 3..], &[1u8, 2, 3]);
        assert_eq!(extract(&out), None);
    }

    #[test]
    fn test_try_embed_finds_real_iend() {
        let mut png = base_png();
        let original_len = png.len();
        png.extend_from_slice(b"padding after IEND");
        let cells = vec![MandaratCell::new(40, "goal")];

        // Fixed offset lands inside the padding
        assert_eq!(extract(&embed(&png, &cells)), None);

        let embedded = Codec::default().try_embed(&png, &cells).unwrap();
        assert_eq!(extract(&embedded), Some(cells));
        assert!(embedded.ends_with(b"padding after IEND"));
        assert_eq!(&embedded[..original_len - 12], &png[..original_len - 12]);
    }

    #[test]
    fn test_try_embed_matches_embed_on_clean_input() {
        let png = base_png();
        let cells = sample_cells();
        assert_eq!(Codec::default().try_embed(&png, &cells).unwrap(), embed(&png, &cells));
    }

    #[test]
    fn test_try_embed_errors() {
        let codec = Codec::default();
        assert!(matches!(codec.try_embed(b"GIF89a", &[]), Err(CodecError::Chunk(ChunkError::Signature))));
        let png = base_png();
        assert!(matches!(
            codec.try_embed(&png[..png.len() - 12], &[]),
            Err(CodecError::Chunk(ChunkError::MissingEnd))
        ));
    }

    #[test]
    fn test_verify_crc_option() {
        let mut embedded = embed(&base_png(), &[MandaratCell::new(4, "x")]);
        // Flip a byte in the tEXt chunk's CRC
        let crc_byte = embedded.len() - 12 - 1;
        embedded[crc_byte] ^= 0xFF;

        // Default scan does not look at CRCs
        assert!(extract(&embedded).is_some());

        let strict = Codec::builder().verify_crc(true).build();
        assert_eq!(strict.extract(&embedded), None);
        assert!(matches!(strict.try_extract(&embedded), Err(CodecError::Chunk(ChunkError::CrcMismatch { .. }))));
    }

    #[test]
    fn test_custom_key() {
        let codec = Codec::builder().key("OtherApp").build();
        let cells = vec![MandaratCell::new(0, "a")];
        let embedded = codec.embed(&base_png(), &cells);
        assert_eq!(codec.key(), "OtherApp");
        assert_eq!(codec.extract(&embedded), Some(cells));
        assert_eq!(extract(&embedded), None);
    }

    #[test]
    fn test_max_chunk_len_limit() {
        let embedded = embed(&base_png(), &sample_cells());
        let codec = Codec::builder().max_chunk_len(8).build();
        assert!(matches!(codec.try_extract(&embedded), Err(CodecError::Chunk(ChunkError::Oversized { .. }))));
    }

    #[test]
    fn test_signature_only() {
        assert_eq!(extract(&PNG_SIGNATURE), None);
        assert!(matches!(try_extract(&PNG_SIGNATURE), Err(CodecError::Chunk(ChunkError::MissingEnd))));
    }

    fn cell_strategy() -> impl Strategy<Value = MandaratCell> {
        (0i64..=80, any::<String>()).prop_map(|(position, title)| MandaratCell { position, title })
    }

    proptest! {
        #[test]
        fn fuzz_roundtrip(cells in proptest::collection::vec(cell_strategy(), 0..81)) {
            let embedded = embed(&base_png(), &cells);
            prop_assert_eq!(extract(&embedded), Some(cells));
        }

        #[test]
        fn fuzz_extract_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut bytes = PNG_SIGNATURE.to_vec();
            bytes.extend_from_slice(&data);
            let _ = extract(&bytes);
            let _ = extract(&data);
        }

        #[test]
        fn fuzz_truncation_never_panics(cut in 0usize..400) {
            let embedded = embed(&base_png(), &sample_cells());
            let cut = cut.min(embedded.len());
            let _ = extract(&embedded[..cut]);
        }
    }
}
