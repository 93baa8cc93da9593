// File boundary module
// Reading and writing image files is the only suspension point; decoding itself stays synchronous.

use std::path::Path;

use crate::codec::{Codec, CodecError, MandaratCell};

/// Read a file and extract its cells.
///
/// A file that cannot be read is reported the same way as one without a payload.
pub async fn read_cells(codec: &Codec, path: impl AsRef<Path>) -> Option<Vec<MandaratCell>> {
    let path = path.as_ref();
    match tokio::fs::read(path).await {
        Ok(bytes) => codec.extract(&bytes),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "could not read image");
            None
        }
    }
}

/// Like [`read_cells`], but keeps the reason a payload could not be recovered.
pub async fn try_read_cells(
    codec: &Codec,
    path: impl AsRef<Path>,
) -> Result<Option<Vec<MandaratCell>>, CodecError> {
    let bytes = tokio::fs::read(path).await?;
    codec.try_extract(&bytes)
}

/// Read `src`, embed `cells`, and write the result to `dst`.
///
/// With `traverse` the IEND chunk is located by walking the stream; otherwise the
/// trailing 12 bytes are assumed to be IEND.
pub async fn write_with_cells(
    codec: &Codec,
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    cells: &[MandaratCell],
    traverse: bool,
) -> Result<usize, CodecError> {
    let png = tokio::fs::read(src).await?;
    let out = if traverse {
        codec.try_embed(&png, cells)?
    } else {
        codec.embed(&png, cells)
    };
    tokio::fs::write(dst.as_ref(), &out).await?;
    tracing::info!(path = %dst.as_ref().display(), bytes = out.len(), cells = cells.len(), "wrote image");
    Ok(out.len())
}
