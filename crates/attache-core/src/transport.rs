//! Data-URL style payload encoding used by upload requests.
//!
//! Single-shot uploads carry `<prefix>,<base64>`; a payload without a comma has empty content.
//! Chunks carry `<prefix>;base64,<base64>` and must include the separator and some data.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::AppError;

const CHUNK_SEPARATOR: &str = ";base64,";

/// Decode a single-shot upload payload.
pub fn decode_single_shot(payload: &str) -> Result<Vec<u8>, AppError> {
    let Some((_, data)) = payload.split_once(',') else {
        return Ok(Vec::new());
    };
    decode_base64(data)
}

/// Decode one chunk of a chunked upload.
pub fn decode_chunk(payload: &str) -> Result<Vec<u8>, AppError> {
    let Some((_, data)) = payload.split_once(CHUNK_SEPARATOR) else {
        return Err(AppError::BadRequest("Bad file data.".to_string()));
    };
    if data.trim().is_empty() {
        return Err(AppError::BadRequest("Bad file data.".to_string()));
    }
    decode_base64(data)
}

/// Encode bytes as `data:<content type>;base64,<data>`, accepted by both decoders.
pub fn encode_data_url(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{}{}{}", content_type, CHUNK_SEPARATOR, STANDARD.encode(bytes))
}

fn decode_base64(data: &str) -> Result<Vec<u8>, AppError> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid base64 content: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_shot_decodes_after_comma() {
        let bytes = decode_single_shot("data:text/plain;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_single_shot_without_separator_is_empty() {
        let bytes = decode_single_shot("aGVsbG8=").unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_single_shot_invalid_base64_is_bad_request() {
        let err = decode_single_shot("data:text/plain;base64,@@@").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_chunk_requires_separator() {
        let err = decode_chunk("data:text/plain,aGVsbG8=").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Bad file data."));
    }

    #[test]
    fn test_chunk_requires_data() {
        let err = decode_chunk("data:text/plain;base64,").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_chunk_decodes() {
        let bytes = decode_chunk("data:application/octet-stream;base64,AAEC").unwrap();
        assert_eq!(bytes, vec![0u8, 1, 2]);
    }

    #[test]
    fn test_encoded_data_url_is_accepted_by_chunk_decoder() {
        let encoded = encode_data_url("image/png", &[7u8; 10]);
        assert!(encoded.starts_with("data:image/png;base64,"));
        assert_eq!(decode_chunk(&encoded).unwrap(), vec![7u8; 10]);
    }
}
