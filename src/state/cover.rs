//! Cover art assembly and decoding.

use anyhow::{anyhow, Result};
use image::GenericImageView;
use serde::Serialize;

/// A decoded cover image. Keeps the encoded bytes for listeners that render it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cover {
    pub width: u32,
    pub height: u32,
    pub format: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl Cover {
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(anyhow!("Empty cover data"));
        }
        let format = image::guess_format(&bytes)?;
        let img = image::load_from_memory_with_format(&bytes, format)?;
        let (width, height) = img.dimensions();
        Ok(Self {
            width,
            height,
            format: format!("{:?}", format).to_lowercase(),
            bytes,
        })
    }
}

/// Accumulates `NJA` packets between a start and an end packet.
#[derive(Debug, Clone, Default)]
pub struct CoverBuffer {
    data: Vec<u8>,
    started: bool,
}

impl CoverBuffer {
    pub fn start(&mut self, chunk: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(chunk);
        self.started = true;
    }

    /// Appends a chunk; ignored when no start packet was seen.
    pub fn append(&mut self, chunk: &[u8]) -> bool {
        if !self.started {
            return false;
        }
        self.data.extend_from_slice(chunk);
        true
    }

    /// Appends the last chunk and hands out the assembled image bytes.
    pub fn finish(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        if !self.append(chunk) {
            return None;
        }
        self.started = false;
        Some(std::mem::take(&mut self.data))
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.started = false;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    pub(crate) fn tiny_png(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let cover = Cover::decode(tiny_png(4, 3)).unwrap();
        assert_eq!((cover.width, cover.height), (4, 3));
        assert_eq!(cover.format, "png");
    }

    #[test]
    fn test_decode_garbage() {
        assert!(Cover::decode(Vec::new()).is_err());
        assert!(Cover::decode(vec![1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_buffer_needs_start() {
        let mut buf = CoverBuffer::default();
        assert!(!buf.append(b"ab"));
        assert_eq!(buf.finish(b"cd"), None);

        buf.start(b"ab");
        assert!(buf.append(b"cd"));
        assert_eq!(buf.finish(b"ef").unwrap(), b"abcdef".to_vec());
        assert!(buf.is_empty());
        assert_eq!(buf.finish(b"gh"), None);
    }
}
