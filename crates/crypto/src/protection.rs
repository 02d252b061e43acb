//! Master-key layer protecting the local key vault.
//!
//! A 32-byte master key comes from the OS keychain (generated on first run)
//! or from a user passphrase via Argon2id. The vault's SQLCipher key is
//! derived from it with HKDF-SHA256, so neither source touches the database
//! layer directly.

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::encoding;
use crate::error::CryptoError;

const KEYCHAIN_SERVICE: &str = "io.parley.vault";
const KEYCHAIN_ACCOUNT: &str = "vault_master_key";
const VAULT_KEY_INFO: &[u8] = b"parley-vault-encryption-v1";

/// Salt length in bytes for passphrase derivation.
pub const SALT_LEN: usize = 16;

/// A 32-byte master key, securely wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; 32],
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl MasterKey {
    /// Fetch the master key from the OS keychain, generating and storing a
    /// fresh one on first run.
    pub fn from_keychain() -> Result<Self, CryptoError> {
        let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
            .map_err(|_| CryptoError::KeychainUnavailable)?;

        match entry.get_password() {
            Ok(mut encoded) => {
                let decoded = encoding::decode(&encoded);
                encoded.zeroize();
                let mut bytes = decoded.map_err(|_| {
                    CryptoError::Keychain("malformed master key in keychain".into())
                })?;
                if bytes.len() != 32 {
                    bytes.zeroize();
                    return Err(CryptoError::Keychain(
                        "malformed master key in keychain".into(),
                    ));
                }
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                bytes.zeroize();
                Ok(Self { key })
            }
            Err(keyring::Error::NoEntry) => {
                let mut key = [0u8; 32];
                rand::rng().fill_bytes(&mut key);
                let mut encoded = encoding::encode(&key);
                entry.set_password(&encoded).map_err(CryptoError::from)?;
                encoded.zeroize();
                Ok(Self { key })
            }
            Err(e) => Err(CryptoError::from(e)),
        }
    }

    /// Derive the master key from a user passphrase and salt via Argon2id.
    pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self, CryptoError> {
        if salt.len() < SALT_LEN {
            return Err(CryptoError::InvalidKey("salt too short".into()));
        }

        let params = argon2::Params::new(65536, 3, 4, Some(32))
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let argon2 =
            argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = [0u8; 32];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Random throwaway master key for in-memory vaults.
    pub(crate) fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    /// SQLCipher `PRAGMA key` literal derived from this master key.
    pub(crate) fn vault_pragma(&self) -> Result<Zeroizing<String>, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, &self.key);
        let mut okm = [0u8; 32];
        hk.expand(VAULT_KEY_INFO, &mut okm)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let pragma = Zeroizing::new(format!("x'{}'", hex(&okm)));
        okm.zeroize();
        Ok(pragma)
    }
}

/// Generate a random salt for passphrase derivation.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

// Not constant-time; the derived key only ever reaches the local PRAGMA.
fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}
