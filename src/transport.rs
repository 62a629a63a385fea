//! Base64 framing for binary audio carried in JSON string fields

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::DecodeError;

/// Standard-alphabet, padded base64 without line wrapping
pub struct Base64Codec;

impl Base64Codec {
    pub fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
        STANDARD
            .decode(text)
            .map_err(|e| DecodeError::Base64(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(Base64Codec::encode(&[]), "");
        assert_eq!(Base64Codec::decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(Base64Codec::encode(b"f"), "Zg==");
        assert_eq!(Base64Codec::encode(b"fo"), "Zm8=");
        assert_eq!(Base64Codec::encode(b"foo"), "Zm9v");
        assert_eq!(Base64Codec::decode("Zm9vYmFy").unwrap(), b"foobar");
    }

    #[test]
    fn test_round_trip_all_byte_values() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(3 * 1024 + 1).collect();
        let text = Base64Codec::encode(&bytes);
        assert!(!text.contains('\n'));
        assert!(!text.contains(' '));
        assert_eq!(Base64Codec::decode(&text).unwrap(), bytes);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            Base64Codec::decode("not base64!"),
            Err(DecodeError::Base64(_))
        ));
    }
}
