//! Raster image integrity checks
//!
//! A header read alone does not prove the pixel data is intact, and a full
//! decode is the slow path, so both run: the header pass rejects truncated or
//! foreign payloads early, the decode pass catches corrupt pixel data.

use crate::HarvestError;
use std::path::Path;
use tracing::debug;

/// Verify that the file at `path` decodes as a well-formed raster image.
/// Returns the image dimensions.
pub fn verify_image(path: &Path) -> Result<(u32, u32), HarvestError> {
    let reader = image::io::Reader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| HarvestError::InvalidImage(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| HarvestError::InvalidImage("unrecognized image format".to_string()))?;

    let dimensions = reader
        .into_dimensions()
        .map_err(|e| HarvestError::InvalidImage(format!("header: {e}")))?;

    if dimensions.0 == 0 || dimensions.1 == 0 {
        return Err(HarvestError::InvalidImage("empty image".to_string()));
    }

    let decoded = image::io::Reader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| HarvestError::InvalidImage(e.to_string()))?
        .decode()
        .map_err(|e| HarvestError::InvalidImage(format!("decode: {e}")))?;

    debug!(
        path = %path.display(),
        ?format,
        width = decoded.width(),
        height = decoded.height(),
        "Image verified"
    );

    Ok(dimensions)
}

pub fn is_valid_image(path: &Path) -> bool {
    verify_image(path).is_ok()
}
