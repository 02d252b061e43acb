//! Symmetric content encryption under a room key.
//!
//! One AES-256-GCM primitive serves short message bodies and binary
//! attachments; they differ only in input/output encoding. Every call draws a
//! fresh random 96-bit nonce — never derived from content, never reused under
//! the same key.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use parley_shared::constants::{MAX_ATTACHMENT_SIZE_BYTES, MAX_MESSAGE_SIZE_BYTES};

use crate::encoding;
use crate::error::CryptoError;
use crate::room_key::RoomKey;

const NONCE_LEN: usize = 12;

/// Placeholder rendered in place of a single item that failed to decrypt.
pub const DECRYPT_PLACEHOLDER: &str = "[unable to decrypt]";

/// Transport form of one encrypted message body or attachment. Owned and
/// moved around by the storage collaborator, which never sees plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub iv: String,
}

/// Encrypt a message body.
pub fn encrypt_text(plaintext: &str, key: &RoomKey) -> Result<EncryptedPayload, CryptoError> {
    if plaintext.len() > MAX_MESSAGE_SIZE_BYTES {
        return Err(CryptoError::PayloadTooLarge {
            size: plaintext.len(),
            max: MAX_MESSAGE_SIZE_BYTES,
        });
    }
    seal(plaintext.as_bytes(), key)
}

/// Decrypt a message body. Failure is scoped to this one item.
pub fn decrypt_text(payload: &EncryptedPayload, key: &RoomKey) -> Result<String, CryptoError> {
    let bytes = open(payload, key)?;
    String::from_utf8(bytes)
        .map_err(|_| CryptoError::Serialization("decrypted body is not valid UTF-8".into()))
}

/// Decrypt a message body, substituting a visible placeholder on failure so
/// one undecryptable item never blocks the rest of a conversation.
pub fn decrypt_text_or_placeholder(payload: &EncryptedPayload, key: &RoomKey) -> String {
    match decrypt_text(payload, key) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            tracing::warn!(error = %e, "message body failed to decrypt; rendering placeholder");
            DECRYPT_PLACEHOLDER.to_string()
        }
    }
}

/// Encrypt an attachment blob.
pub fn encrypt_bytes(plaintext: &[u8], key: &RoomKey) -> Result<EncryptedPayload, CryptoError> {
    if plaintext.len() > MAX_ATTACHMENT_SIZE_BYTES {
        return Err(CryptoError::PayloadTooLarge {
            size: plaintext.len(),
            max: MAX_ATTACHMENT_SIZE_BYTES,
        });
    }
    seal(plaintext, key)
}

/// Decrypt an attachment blob.
pub fn decrypt_bytes(payload: &EncryptedPayload, key: &RoomKey) -> Result<Vec<u8>, CryptoError> {
    open(payload, key)
}

fn seal(plaintext: &[u8], key: &RoomKey) -> Result<EncryptedPayload, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::Content("seal failed".into()))?;

    Ok(EncryptedPayload {
        ciphertext: encoding::encode(&ciphertext),
        iv: encoding::encode(&nonce_bytes),
    })
}

fn open(payload: &EncryptedPayload, key: &RoomKey) -> Result<Vec<u8>, CryptoError> {
    let nonce_bytes: [u8; NONCE_LEN] = encoding::decode_array(&payload.iv)?;
    let ciphertext = encoding::decode(&payload.ciphertext)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptFailed)
}
