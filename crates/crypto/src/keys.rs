//! Long-lived identity and exchange key pairs.
//!
//! Each user holds one Ed25519 signing pair (identity) and one X25519
//! key-exchange pair. Both are generated together and replaced together; the
//! wrap protocol and the backup codec consume their raw forms. Neither pair
//! rotates during normal operation — only an explicit reset replaces them.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::encoding;
use crate::error::CryptoError;

/// Length in bytes of a raw private or public key on either curve.
pub const KEY_LEN: usize = 32;

/// Ed25519 signing pair identifying one user.
pub struct IdentityKeyPair {
    signing: SigningKey,
}

impl IdentityKeyPair {
    /// Generate a fresh pair from the system RNG.
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(seed.as_mut());
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Rebuild a pair from raw private key bytes (vault load, backup restore).
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "identity private key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// Raw private key bytes, for persistence and backup export only.
    pub fn private_bytes(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    pub fn public(&self) -> IdentityPublicKey {
        IdentityPublicKey(self.signing.verifying_key())
    }

    /// Sign a challenge with the identity private key (login flow).
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Public half of an identity pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityPublicKey(VerifyingKey);

impl IdentityPublicKey {
    /// Verify a signature produced by the matching private key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        self.0.verify(message, &sig).is_ok()
    }

    pub fn to_base64(&self) -> String {
        encoding::encode(self.0.as_bytes())
    }

    pub fn from_base64(value: &str) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LEN] = encoding::decode_array(value)?;
        VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

/// X25519 key-exchange pair. Static per user despite the directory's "prekey"
/// naming: it is never consumed per session.
pub struct ExchangeKeyPair {
    secret: StaticSecret,
}

impl ExchangeKeyPair {
    /// Generate a fresh pair from the system RNG.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(bytes.as_mut());
        Self {
            secret: StaticSecret::from(*bytes),
        }
    }

    /// Rebuild a pair from raw private key bytes (vault load, backup restore).
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "exchange private key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            secret: StaticSecret::from(raw),
        })
    }

    /// Raw private key bytes, for persistence and backup export only.
    pub fn private_bytes(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    pub fn public(&self) -> ExchangePublicKey {
        ExchangePublicKey(PublicKey::from(&self.secret))
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl std::fmt::Debug for ExchangeKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeKeyPair")
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Published public half of an exchange pair, as resolved by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangePublicKey(pub(crate) PublicKey);

impl ExchangePublicKey {
    pub fn to_base64(&self) -> String {
        encoding::encode(self.0.as_bytes())
    }

    pub fn from_base64(value: &str) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LEN] = encoding::decode_array(value)?;
        Ok(Self(PublicKey::from(bytes)))
    }

    pub(crate) fn inner(&self) -> &PublicKey {
        &self.0
    }
}

/// Both long-lived pairs, generated and replaced as one unit.
#[derive(Debug)]
pub struct LocalKeySet {
    pub identity: IdentityKeyPair,
    pub exchange: ExchangeKeyPair,
}

impl LocalKeySet {
    /// Generate a fresh identity pair and exchange pair together.
    pub fn generate() -> Self {
        Self {
            identity: IdentityKeyPair::generate(),
            exchange: ExchangeKeyPair::generate(),
        }
    }
}
