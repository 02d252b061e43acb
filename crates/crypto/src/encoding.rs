//! Base64 transport encoding for binary values crossing the subsystem boundary.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CryptoError;

pub(crate) fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub(crate) fn decode(value: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::Serialization(format!("invalid base64: {e}")))
}

/// Decode a fixed-length field, rejecting any other length.
pub(crate) fn decode_array<const N: usize>(value: &str) -> Result<[u8; N], CryptoError> {
    let bytes = decode(value)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::Serialization(format!("expected {N} bytes, got {len}")))
}
