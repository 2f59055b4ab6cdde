//! Shared image handling for multimodal adapters (Anthropic, Gemini, Vertex).
//!
//! Normalized requests carry images as either a `data:` URL or a plain HTTP(S)
//! URL (see [`crate::models::ImageUrl`]). Providers that require inline,
//! base64-embedded bytes with an explicit MIME type go through [`resolve`],
//! which fetches remote URLs, decodes `data:` URLs, and sniffs the MIME type
//! from magic bytes when it isn't already known.

use crate::error::ProviderError;
use base64::Engine;
use std::time::Duration;

/// Maximum image size accepted by [`resolve`] and [`validate`], in bytes.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// An image resolved to raw bytes with a known MIME type, ready for
/// base64 inlining into a provider-specific content block.
pub struct ResolvedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ResolvedImage {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Resolves an image URL (either `data:` or `http(s)://`) to bytes + MIME
/// type, fetching remote URLs and sniffing the MIME type by magic bytes
/// when the source doesn't declare one.
pub async fn resolve(url: &str) -> Result<ResolvedImage, ProviderError> {
    if let Some(data_url) = parse_data_url(url) {
        validate(&data_url.1, MAX_IMAGE_BYTES)?;
        return Ok(ResolvedImage {
            mime_type: data_url.0,
            bytes: data_url.1,
        });
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        let bytes = download(url).await?;
        validate(&bytes, MAX_IMAGE_BYTES)?;
        let mime_type = sniff_mime(&bytes).ok_or_else(|| ProviderError::ValidationError {
            field: "image".to_string(),
            message: "unrecognized image format".to_string(),
        })?;
        return Ok(ResolvedImage { mime_type, bytes });
    }

    Err(ProviderError::ValidationError {
        field: "image_url".to_string(),
        message: "image url must be a data: URL or an http(s):// URL".to_string(),
    })
}

/// Rejects oversized payloads before they're base64-inlined into a request body.
pub fn validate(bytes: &[u8], max_size: usize) -> Result<(), ProviderError> {
    if bytes.is_empty() {
        return Err(ProviderError::ValidationError {
            field: "image".to_string(),
            message: "image payload is empty".to_string(),
        });
    }
    if bytes.len() > max_size {
        return Err(ProviderError::ValidationError {
            field: "image".to_string(),
            message: format!(
                "image is {} bytes, exceeds the {} byte limit",
                bytes.len(),
                max_size
            ),
        });
    }
    Ok(())
}

/// Sniffs an image's MIME type from its leading magic bytes. Recognizes
/// JPEG, PNG, GIF, WEBP, and BMP; returns `None` for anything else.
pub fn sniff_mime(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg".to_string());
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png".to_string());
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif".to_string());
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp".to_string());
    }
    if bytes.starts_with(&[0x42, 0x4D]) {
        return Some("image/bmp".to_string());
    }
    None
}

/// Fetches a remote image. Only `http`/`https` schemes are accepted.
async fn download(url: &str) -> Result<Vec<u8>, ProviderError> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| ProviderError::Configuration {
            message: format!("failed to build image fetch client: {e}"),
        })?;

    let resp = client.get(url).send().await.map_err(ProviderError::Http)?;
    if !resp.status().is_success() {
        return Err(ProviderError::Api {
            code: resp.status().as_u16(),
            message: format!("failed to fetch image url {url}"),
        });
    }
    Ok(resp.bytes().await.map_err(ProviderError::Http)?.to_vec())
}

/// Parses a `data:<mime>;base64,<payload>` URL into (mime, decoded bytes).
fn parse_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?.to_string();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .ok()?;
    Some((mime_type, bytes))
}

/// Builds a `data:<mime>;base64,<payload>` URL from raw bytes.
pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_known_formats() {
        assert_eq!(
            sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some("image/jpeg".to_string())
        );
        assert_eq!(
            sniff_mime(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00]),
            Some("image/png".to_string())
        );
        assert_eq!(sniff_mime(b"GIF89a...."), Some("image/gif".to_string()));
        assert_eq!(sniff_mime(&[0x42, 0x4D, 0x00]), Some("image/bmp".to_string()));
        assert_eq!(sniff_mime(b"not an image"), None);
    }

    #[test]
    fn sniffs_webp_with_riff_container() {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(b"WEBP");
        assert_eq!(sniff_mime(&bytes), Some("image/webp".to_string()));
    }

    #[test]
    fn round_trips_data_url() {
        let url = to_data_url("image/png", b"hello");
        let (mime, bytes) = parse_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn rejects_oversized_payload() {
        let bytes = vec![0u8; 10];
        assert!(validate(&bytes, 5).is_err());
        assert!(validate(&bytes, 20).is_ok());
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(validate(&[], MAX_IMAGE_BYTES).is_err());
    }
}
