use super::{AnyPayload, ArtifactKind, ArtifactPayload};
use crate::error::{EngineError, Result};
use serde::Serialize;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = &[0xff, 0xd8, 0xff];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ImageFormat {
    Png,
    Gif,
    Jpeg,
}

/// Encoded image as downloaded, with sniffed format and dimensions
///
/// Decoding to pixels is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureData {
    bytes: Vec<u8>,
    format: ImageFormat,
    width: Option<u32>,
    height: Option<u32>,
}

impl PictureData {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

impl ArtifactPayload for PictureData {
    const KIND: ArtifactKind = ArtifactKind::Picture;

    fn parse(bytes: &[u8]) -> Result<Self> {
        let (format, dims) = if bytes.starts_with(PNG_SIGNATURE) {
            // IHDR is always the first chunk: width and height big-endian at 16..24
            let dims = (bytes.len() >= 24).then(|| {
                (
                    u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
                    u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
                )
            });
            (ImageFormat::Png, dims)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            let dims = (bytes.len() >= 10).then(|| {
                (
                    u16::from_le_bytes([bytes[6], bytes[7]]) as u32,
                    u16::from_le_bytes([bytes[8], bytes[9]]) as u32,
                )
            });
            (ImageFormat::Gif, dims)
        } else if bytes.starts_with(JPEG_SIGNATURE) {
            (ImageFormat::Jpeg, None)
        } else {
            return Err(EngineError::MalformedPayload(format!(
                "unrecognized image data ({} bytes)",
                bytes.len()
            )));
        };

        Ok(PictureData {
            bytes: bytes.to_vec(),
            format,
            width: dims.map(|d| d.0),
            height: dims.map(|d| d.1),
        })
    }

    fn cost(&self) -> usize {
        (self.bytes.len() / 1024).max(1)
    }

    fn from_any(any: AnyPayload) -> Option<Self> {
        match any {
            AnyPayload::Picture(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32, extra: usize) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.resize(bytes.len() + extra, 0);
        bytes
    }

    #[test]
    fn test_png_dimensions() {
        let pic = PictureData::parse(&png(80, 60, 5)).unwrap();
        assert_eq!(pic.format(), ImageFormat::Png);
        assert_eq!(pic.dimensions(), Some((80, 60)));
        assert_eq!(pic.cost(), 1);
    }

    #[test]
    fn test_gif_and_jpeg() {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[0x40, 0x01, 0xf0, 0x00]);
        let pic = PictureData::parse(&gif).unwrap();
        assert_eq!(pic.format(), ImageFormat::Gif);
        assert_eq!(pic.dimensions(), Some((320, 240)));

        let pic = PictureData::parse(&[0xff, 0xd8, 0xff, 0xe0, 0, 0]).unwrap();
        assert_eq!(pic.format(), ImageFormat::Jpeg);
        assert_eq!(pic.dimensions(), None);
    }

    #[test]
    fn test_cost_scales_with_size() {
        let pic = PictureData::parse(&png(1, 1, 10 * 1024)).unwrap();
        assert_eq!(pic.cost(), 10);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            PictureData::parse(b"<html>not found</html>"),
            Err(EngineError::MalformedPayload(_))
        ));
        assert!(PictureData::parse(&[]).is_err());
    }
}
