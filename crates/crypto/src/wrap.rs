//! Hybrid key wrapping (ECIES): transports a room key to one recipient using
//! only their long-lived public exchange key, with no pre-shared secret.
//!
//! Each wrap generates a single-use X25519 pair, runs Diffie-Hellman against
//! the recipient's static public key, derives a 256-bit KEK with HKDF-SHA256,
//! and seals the raw room key with AES-256-GCM under a fresh 96-bit nonce.
//! Compromising a sender's static exchange key therefore exposes no
//! previously wrapped room keys; only the wrap step itself is forward secret.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroizing;

use parley_shared::ids::{RoomId, UserId};

use crate::encoding;
use crate::error::CryptoError;
use crate::keys::{ExchangeKeyPair, ExchangePublicKey, KEY_LEN};
use crate::room_key::RoomKey;

const NONCE_LEN: usize = 12;
const KEK_INFO: &[u8] = b"parley-room-key-wrap-v1";

/// A room key encrypted for one member. Immutable once created; exactly one
/// record exists per (room, member), deleted only with the membership itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeyRecord {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub ephemeral_public_key: String,
    pub iv: String,
    pub ciphertext: String,
}

/// Encrypt `room_key` so that only the holder of the private half of
/// `recipient` can recover it.
pub fn wrap_room_key(
    room_key: &RoomKey,
    recipient: &ExchangePublicKey,
    room_id: RoomId,
    user_id: UserId,
) -> Result<WrappedKeyRecord, CryptoError> {
    // Single-use pair; the private half never leaves this scope.
    let mut seed = Zeroizing::new([0u8; KEY_LEN]);
    rand::rng().fill_bytes(seed.as_mut());
    let ephemeral = StaticSecret::from(*seed);
    let ephemeral_public = PublicKey::from(&ephemeral);

    let kek = derive_kek(ephemeral.diffie_hellman(recipient.inner()))?;
    let cipher =
        Aes256Gcm::new_from_slice(kek.as_ref()).map_err(|e| CryptoError::Wrap(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), room_key.as_bytes().as_slice())
        .map_err(|_| CryptoError::Wrap("room key seal failed".into()))?;

    Ok(WrappedKeyRecord {
        room_id,
        user_id,
        ephemeral_public_key: encoding::encode(ephemeral_public.as_bytes()),
        iv: encoding::encode(&nonce_bytes),
        ciphertext: encoding::encode(&ciphertext),
    })
}

/// Recover the room key from `record` with the recipient's exchange pair.
///
/// Fails closed: a tampered field or non-matching private key yields
/// `CryptoError::DecryptFailed`, never silently wrong key material. The
/// failure is permanent for that record — callers surface it as an unreadable
/// room and must not retry automatically.
pub fn unwrap_room_key(
    record: &WrappedKeyRecord,
    exchange: &ExchangeKeyPair,
) -> Result<RoomKey, CryptoError> {
    let ephemeral_bytes: [u8; KEY_LEN] = encoding::decode_array(&record.ephemeral_public_key)?;
    let nonce_bytes: [u8; NONCE_LEN] = encoding::decode_array(&record.iv)?;
    let ciphertext = encoding::decode(&record.ciphertext)?;

    let ephemeral_public = PublicKey::from(ephemeral_bytes);
    let kek = derive_kek(exchange.secret().diffie_hellman(&ephemeral_public))?;
    let cipher =
        Aes256Gcm::new_from_slice(kek.as_ref()).map_err(|e| CryptoError::Wrap(e.to_string()))?;

    let raw = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptFailed)?;
    let raw = Zeroizing::new(raw);
    RoomKey::from_bytes(&raw)
}

/// Derive the 256-bit key-encryption key from a DH shared secret. The KEK
/// only ever encrypts another key, never content.
fn derive_kek(shared: SharedSecret) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    // Reject the all-zero output produced by low-order peer points.
    if !shared.was_contributory() {
        return Err(CryptoError::Wrap("non-contributory key exchange".into()));
    }

    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut kek = Zeroizing::new([0u8; 32]);
    hk.expand(KEK_INFO, kek.as_mut())
        .map_err(|e| CryptoError::Wrap(e.to_string()))?;
    Ok(kek)
}
