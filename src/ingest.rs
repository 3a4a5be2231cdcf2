//! Image ingestion: prove an upload really is an image, derive its MIME type
//! from the bytes, and produce the transportable data URI.
//!
//! The MIME declared by the client is advisory only; the sniffed magic bytes
//! decide. Anything that fails here never reaches the reasoning service.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{CoreError, CoreResult};

/// Uploads larger than this are rejected before any further work.
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// A validated in-memory image plus its sniffed MIME type.
///
/// Fields are private on purpose: the only way to obtain one is through the
/// ingest functions below, so holding an `ImageUpload` means validation ran.
#[derive(Clone, Debug)]
pub struct ImageUpload {
  bytes: Vec<u8>,
  mime: String,
}

impl ImageUpload {
  pub fn mime(&self) -> &str {
    &self.mime
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  /// Base64 data URI, the form the reasoning service accepts inline.
  pub fn to_data_uri(&self) -> String {
    format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
  }
}

/// Validate raw upload bytes as an image.
///
/// `declared_mime` is whatever the client claimed (file picker, camera); it
/// is only used to reject the obvious non-image case early. The format
/// sniffed from the bytes decides the stored MIME.
pub fn ingest_image(bytes: Vec<u8>, declared_mime: Option<&str>) -> CoreResult<ImageUpload> {
  if bytes.is_empty() {
    return Err(CoreError::invalid_input("empty upload"));
  }
  if bytes.len() > MAX_IMAGE_BYTES {
    return Err(CoreError::invalid_input(format!(
      "image exceeds the {} MB limit",
      MAX_IMAGE_BYTES / (1024 * 1024)
    )));
  }
  if let Some(mime) = declared_mime {
    let mime = mime.trim();
    if !mime.is_empty() && !mime.starts_with("image/") {
      return Err(CoreError::invalid_input(format!("'{mime}' is not an image type")));
    }
  }
  let format = image::guess_format(&bytes)
    .map_err(|_| CoreError::invalid_input("file is not a recognized image format"))?;
  Ok(ImageUpload { bytes, mime: format.to_mime_type().to_string() })
}

/// Decode a base64 image payload as received over the wire, then ingest it.
pub fn decode_base64_image(b64: &str, declared_mime: Option<&str>) -> CoreResult<ImageUpload> {
  let bytes = BASE64
    .decode(b64.trim())
    .map_err(|e| CoreError::invalid_input(format!("imageBase64 is not valid base64: {e}")))?;
  ingest_image(bytes, declared_mime)
}
