//! PNG thumbnails for image history entries.

use std::io::Cursor;

use image::{GenericImageView, ImageFormat};

use crate::document::InputFile;

/// Longest edge of a generated thumbnail, in pixels.
pub const MAX_THUMBNAIL_EDGE: u32 = 256;

/// Decodes an image and encodes a PNG no larger than [`MAX_THUMBNAIL_EDGE`].
pub fn create_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let _span = tracing::info_span!("history.thumbnail").entered();

    let img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();
    let thumb = if width > MAX_THUMBNAIL_EDGE || height > MAX_THUMBNAIL_EDGE {
        img.thumbnail(MAX_THUMBNAIL_EDGE, MAX_THUMBNAIL_EDGE)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    thumb.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Thumbnail for an input file, generated on a blocking thread.
///
/// PDFs and files that fail to decode get `None`.
pub async fn thumbnail_for(file: &InputFile) -> Option<Vec<u8>> {
    if !file.is_image() {
        return None;
    }

    let source = file.clone();
    let result = tokio::task::spawn_blocking(move || create_thumbnail(source.bytes())).await;
    match result {
        Ok(Ok(png)) => Some(png),
        Ok(Err(e)) => {
            log::debug!("No thumbnail for '{}': {}", file.name, e);
            None
        }
        Err(e) => {
            log::warn!("Thumbnail task for '{}' failed: {}", file.name, e);
            None
        }
    }
}
