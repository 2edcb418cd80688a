//! Symmetric protection for secrets kept in the settings store (trusted channel
//! identities, the emergency number).
//!
//! ## Wire Format
//!
//! Each sealed value is the lowercase hex encoding of `[12-byte nonce][ciphertext+tag]`.
//! The nonce is randomly generated per seal via `OsRng`.
//!
//! ## Key
//!
//! The 32-byte key is read from `HFS_VAULT_KEY` (64 hex chars). If the variable is
//! absent or malformed the cipher stays **locked**: every seal/open returns
//! [`VaultError::Locked`], which callers treat as fail-closed.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use thiserror::Error;

/// AES-256-GCM nonce length (96 bits).
const NONCE_LEN: usize = 12;

/// Environment variable holding the 64-hex-char key.
pub const ENV_VAULT_KEY: &str = "HFS_VAULT_KEY";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("vault is locked (no key provided)")]
    Locked,
    #[error("vault encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("vault decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("vault: corrupt blob")]
    CorruptBlob,
}

/// Seals and opens short UTF-8 secrets. A hardware-backed keystore can stand in
/// for [`AesGcmCipher`] by implementing this.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, VaultError>;
    fn decrypt(&self, sealed: &str) -> Result<String, VaultError>;
}

/// AES-256-GCM cipher for values sealed at rest. Locked when no key was supplied.
pub struct AesGcmCipher {
    cipher: Option<Aes256Gcm>,
}

impl AesGcmCipher {
    /// Creates a cipher from a 32-byte key. `None` yields a locked cipher.
    pub fn new(key: Option<&[u8; 32]>) -> Self {
        let cipher = key.map(|k| Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(k)));
        Self { cipher }
    }

    /// Parses a 64-hex-char key. Whitespace is ignored.
    pub fn from_hex(hex_key: &str) -> Option<Self> {
        let cleaned: String = hex_key.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(cleaned).ok()?;
        let key: [u8; 32] = bytes.try_into().ok()?;
        Some(Self::new(Some(&key)))
    }

    /// Reads `HFS_VAULT_KEY`; locked when missing or malformed.
    pub fn from_env() -> Self {
        match std::env::var(ENV_VAULT_KEY) {
            Ok(raw) => match Self::from_hex(&raw) {
                Some(cipher) => {
                    tracing::info!(target: "hfs::vault", "vault key loaded; secrets are readable");
                    cipher
                }
                None => {
                    tracing::warn!(
                        target: "hfs::vault",
                        "HFS_VAULT_KEY must be 64 hex chars (32 bytes); vault will be LOCKED"
                    );
                    Self::new(None)
                }
            },
            Err(_) => {
                tracing::warn!(target: "hfs::vault", "HFS_VAULT_KEY not set; vault is LOCKED");
                Self::new(None)
            }
        }
    }

    #[inline]
    pub fn is_unlocked(&self) -> bool {
        self.cipher.is_some()
    }
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let cipher = self.cipher.as_ref().ok_or(VaultError::Locked)?;
        let nonce = Aes256Gcm::generate_nonce(OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    fn decrypt(&self, sealed: &str) -> Result<String, VaultError> {
        let cipher = self.cipher.as_ref().ok_or(VaultError::Locked)?;
        let blob = hex::decode(sealed.trim()).map_err(|_| VaultError::CorruptBlob)?;
        if blob.len() <= NONCE_LEN {
            return Err(VaultError::CorruptBlob);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|e| VaultError::DecryptionFailed(e.to_string()))
    }
}
