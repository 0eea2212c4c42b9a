use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

/// Opaque handle to a user-supplied or generated image.
///
/// A reference is either a path on disk (user uploads) or bytes already in
/// memory (backend results). Either form resolves on demand to the inline
/// base64 part the generation backend transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Path(PathBuf),
    Bytes { data: Vec<u8>, mime: String },
}

impl ImageRef {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn from_bytes(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self::Bytes {
            data,
            mime: mime.into(),
        }
    }

    /// Raw bytes plus mime type. Reads the file for the path form.
    pub fn read(&self) -> Result<(Vec<u8>, String)> {
        match self {
            Self::Path(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("failed reading {}", path.display()))?;
                let mime = mime_for_path(path).unwrap_or("image/png").to_string();
                Ok((bytes, mime))
            }
            Self::Bytes { data, mime } => Ok((data.clone(), mime.clone())),
        }
    }

    /// Inline-data part in the backend's wire shape.
    pub fn inline_part(&self) -> Result<Value> {
        let (bytes, mime) = self.read()?;
        Ok(json!({
            "inlineData": {
                "mimeType": mime,
                "data": BASE64.encode(bytes),
            }
        }))
    }

    pub fn mime_type(&self) -> Option<&str> {
        match self {
            Self::Path(path) => mime_for_path(path),
            Self::Bytes { mime, .. } => Some(mime.as_str()),
        }
    }
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// File extension for saving an image of the given mime type.
pub fn extension_for_mime(mime: Option<&str>) -> &'static str {
    match mime {
        Some("image/jpeg") => "jpg",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn inline_part_from_path_detects_mime() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let png_path = temp.path().join("face.png");
        let jpg_path = temp.path().join("pose.JPG");
        fs::write(&png_path, b"png-bytes")?;
        fs::write(&jpg_path, b"jpg-bytes")?;

        let png_part = ImageRef::from_path(&png_path).inline_part()?;
        let jpg_part = ImageRef::from_path(&jpg_path).inline_part()?;

        assert_eq!(png_part["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(
            png_part["inlineData"]["data"],
            json!(BASE64.encode(b"png-bytes"))
        );
        assert_eq!(jpg_part["inlineData"]["mimeType"], json!("image/jpeg"));
        Ok(())
    }

    #[test]
    fn inline_part_from_bytes_keeps_mime() -> anyhow::Result<()> {
        let part = ImageRef::from_bytes(vec![1, 2, 3], "image/webp").inline_part()?;
        assert_eq!(part["inlineData"]["mimeType"], json!("image/webp"));
        assert_eq!(part["inlineData"]["data"], json!(BASE64.encode([1, 2, 3])));
        Ok(())
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let missing = ImageRef::from_path("/nonexistent/visage/face.png");
        assert!(missing.inline_part().is_err());
        assert!(missing.read().is_err());
    }

    #[test]
    fn extension_follows_mime() {
        assert_eq!(extension_for_mime(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for_mime(Some("image/png")), "png");
        assert_eq!(extension_for_mime(None), "png");
    }
}
