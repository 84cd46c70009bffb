//! Frame codec: base64 image payload → raster frame.
//!
//! Browsers capture a still from the camera with `canvas.toDataURL()` and send
//! it as a string:
//!
//! ```text
//! data:image/jpeg;base64,/9j/4AAQSkZJRgABAQEAYABgAAD...
//! ```
//!
//! Mobile clients sometimes send the bare base64 body without the
//! `data:...;base64,` prefix.  Both forms are accepted.  The decoded bytes
//! must be a JPEG or PNG still; anything else is rejected with a
//! [`FrameDecodeError`] rather than a panic, so one garbage frame can be
//! skipped without disturbing the connection.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use thiserror::Error;

/// Errors produced while turning a frame payload into pixels.
#[derive(Debug, Error, PartialEq)]
pub enum FrameDecodeError {
    /// The payload (or the part after the data URI comma) is empty.
    #[error("empty frame payload")]
    Empty,

    /// A `data:` URI that is not base64-encoded, or has no comma separator.
    #[error("unsupported data URI: {0}")]
    UnsupportedDataUri(String),

    /// The payload is not valid standard base64.
    #[error("invalid base64: {0}")]
    Base64(String),

    /// The bytes are not a decodable still image.
    #[error("invalid image: {0}")]
    Image(String),
}

/// A decoded RGB frame, the input to an [`crate::EmbeddingExtractor`].
#[derive(Debug, Clone, PartialEq)]
pub struct RasterFrame {
    image: RgbImage,
}

impl RasterFrame {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Interleaved RGB bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Decodes a data URI or bare base64 string into a [`RasterFrame`].
///
/// # Errors
///
/// Returns [`FrameDecodeError`] for an empty payload, a non-base64 data URI,
/// invalid base64, or bytes that are not a JPEG/PNG image.
pub fn decode_frame(payload: &str) -> Result<RasterFrame, FrameDecodeError> {
    let body = strip_data_uri(payload.trim())?;
    let bytes = decode_base64(body)?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| FrameDecodeError::Image(e.to_string()))?;
    Ok(RasterFrame::from_rgb(image.to_rgb8()))
}

/// Returns the base64 body of `payload`, stripping a `data:<mime>;base64,`
/// prefix when present.
fn strip_data_uri(payload: &str) -> Result<&str, FrameDecodeError> {
    if !payload.starts_with("data:") {
        return non_empty(payload);
    }

    let (header, body) = payload
        .split_once(',')
        .ok_or_else(|| FrameDecodeError::UnsupportedDataUri("missing ',' separator".to_string()))?;

    if !header.ends_with(";base64") {
        return Err(FrameDecodeError::UnsupportedDataUri(header.to_string()));
    }

    non_empty(body)
}

fn non_empty(body: &str) -> Result<&str, FrameDecodeError> {
    if body.is_empty() {
        Err(FrameDecodeError::Empty)
    } else {
        Ok(body)
    }
}

fn decode_base64(body: &str) -> Result<Vec<u8>, FrameDecodeError> {
    // Line-wrapped base64 is legal in data URIs; drop the whitespace first.
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(FrameDecodeError::Empty);
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| FrameDecodeError::Base64(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
