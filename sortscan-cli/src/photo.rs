//! Load image files as inline `data:` URIs

use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sortscan_common::Photo;

/// Read an image file and embed it as a base64 `data:` URI
///
/// The media type is sniffed from the file contents, not the extension.
pub fn load_photo(path: &Path) -> Result<Photo> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read photo {}", path.display()))?;
    photo_from_bytes(&bytes).with_context(|| format!("Unsupported photo {}", path.display()))
}

pub fn photo_from_bytes(bytes: &[u8]) -> Result<Photo> {
    let Some(kind) = infer::get(bytes) else {
        bail!("unrecognized file type");
    };
    if !infer::is_image(bytes) {
        bail!("{} is not an image type", kind.mime_type());
    }

    let mime = kind.mime_type();
    let data_url = format!("data:{};base64,{}", mime, STANDARD.encode(bytes));
    Ok(Photo::new(data_url, mime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_png_becomes_data_uri() {
        let photo = photo_from_bytes(&PNG_HEADER).unwrap();
        assert_eq!(photo.mime, "image/png");
        assert!(photo.data_url.starts_with("data:image/png;base64,"));
        assert!(photo.is_inline());
    }

    #[test]
    fn test_non_image_rejected() {
        assert!(photo_from_bytes(b"plain text, not an image").is_err());
        // PDF magic
        assert!(photo_from_bytes(b"%PDF-1.7\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("container.bin");
        std::fs::write(&path, PNG_HEADER).unwrap();
        assert_eq!(load_photo(&path).unwrap().mime, "image/png");
        assert!(load_photo(&temp_dir.path().join("missing.jpg")).is_err());
    }
}
