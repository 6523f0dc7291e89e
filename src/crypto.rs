//! Encryption at rest for stored credentials.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use thiserror::Error;

/// Length of the AES-GCM nonce stored alongside each ciphertext.
pub const IV_LEN: usize = 12;

/// Length of the AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("secret key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("secret key is not valid hex: {0}")]
    InvalidKeyHex(#[from] hex::FromHexError),
    #[error("encryption failed")]
    EncryptFailed,
}

/// A ciphertext together with the IV it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
}

/// Opaque encrypt/decrypt service keyed by a secret.
pub trait Cipher {
    fn encrypt(&self, plaintext: &str) -> Result<Sealed, CryptoError>;

    /// Returns `None` when the ciphertext does not authenticate under this key
    /// or does not decode as UTF-8.
    fn decrypt(&self, sealed: &Sealed) -> Option<String>;
}

/// AES-256-GCM with a fresh random nonce per encryption.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(key.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Builds a cipher from a 64 character hex string.
    pub fn from_hex(key: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key.trim())?;
        Self::new(&bytes)
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<Sealed, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptFailed)?;
        Ok(Sealed {
            ciphertext,
            iv: nonce.to_vec(),
        })
    }

    fn decrypt(&self, sealed: &Sealed) -> Option<String> {
        if sealed.iv.len() != IV_LEN {
            return None;
        }
        let nonce = Nonce::from_slice(&sealed.iv);
        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.ciphertext.as_slice())
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}
