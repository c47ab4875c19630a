//! Frame type and decoding of browser-supplied `data:` URLs.

use base64::Engine;
use thiserror::Error;

/// A decoded grayscale video frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not a base64 data URL")]
    NotDataUrl,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid frame buffer: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl Frame {
    /// Wrap a raw grayscale buffer.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = (width * height) as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// Decode a `data:image/<fmt>;base64,<payload>` URL.
    ///
    /// The webcam preview in the browser is mirrored, so the decoded image is
    /// flipped horizontally to restore the camera's view before conversion to
    /// luma.
    pub fn from_data_url(url: &str) -> Result<Self, FrameError> {
        let payload = url
            .strip_prefix("data:image/")
            .and_then(|rest| rest.split_once(";base64,"))
            .map(|(_, payload)| payload)
            .ok_or(FrameError::NotDataUrl)?;

        let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
        let decoded = image::load_from_memory(&bytes)?;
        Ok(Self::from_image(&decoded.fliph()))
    }

    /// Convert any decoded image to a grayscale frame.
    pub fn from_image(img: &image::DynamicImage) -> Self {
        let gray = img.to_luma8();
        let (width, height) = gray.dimensions();
        Self {
            data: gray.into_raw(),
            width,
            height,
        }
    }

    pub fn to_image(&self) -> Option<image::GrayImage> {
        image::GrayImage::from_raw(self.width, self.height, self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_data_url(img: &image::GrayImage) -> String {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(buf.into_inner())
        )
    }

    #[test]
    fn test_from_gray_checks_length() {
        assert!(Frame::from_gray(vec![0; 6], 3, 2).is_ok());
        let result = Frame::from_gray(vec![0; 5], 3, 2);
        assert!(matches!(
            result,
            Err(FrameError::InvalidLength { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_data_url_roundtrip_is_mirrored() {
        // 2x1 image: left pixel dark, right pixel bright
        let img = image::GrayImage::from_raw(2, 1, vec![10, 250]).unwrap();
        let frame = Frame::from_data_url(&png_data_url(&img)).unwrap();
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.data, vec![250, 10]);
    }

    #[test]
    fn test_rejects_non_data_url() {
        assert!(matches!(
            Frame::from_data_url("http://example.com/a.jpg"),
            Err(FrameError::NotDataUrl)
        ));
    }

    #[test]
    fn test_rejects_bad_base64() {
        assert!(matches!(
            Frame::from_data_url("data:image/jpeg;base64,@@@"),
            Err(FrameError::Base64(_))
        ));
    }
}
