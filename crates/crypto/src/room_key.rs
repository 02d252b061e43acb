//! Per-room symmetric content key.

use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Length in bytes of a room key (AES-256-GCM).
pub const ROOM_KEY_LEN: usize = 32;

/// Symmetric AEAD key shared by the members of one room.
///
/// Generated once at room creation, never rotated, and held only in volatile
/// memory after unwrapping; it crosses the subsystem boundary exclusively as a
/// `WrappedKeyRecord`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RoomKey {
    key: [u8; ROOM_KEY_LEN],
}

impl RoomKey {
    /// Generate a fresh 256-bit key from the system RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; ROOM_KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Re-import raw bytes recovered by the unwrap step.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; ROOM_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "room key must be {ROOM_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Raw export for the wrap step and the content cipher. Crate-scoped so
    /// the key cannot leave the subsystem in plaintext.
    pub(crate) fn as_bytes(&self) -> &[u8; ROOM_KEY_LEN] {
        &self.key
    }
}

impl PartialEq for RoomKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl Eq for RoomKey {}

impl std::fmt::Debug for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomKey").field("key", &"[REDACTED]").finish()
    }
}
