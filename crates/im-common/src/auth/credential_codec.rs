//! Credential encryption
//!
//! Credentials are JSON-encoded, encrypted with AES in CBC mode (PKCS7 padding)
//! under a fresh random IV, and shipped as `base64(IV ∥ ciphertext)` using the
//! standard alphabet without padding.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use im_core::ClientAuthCredentials;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes192CbcEnc = cbc::Encryptor<Aes192>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes192CbcDec = cbc::Decryptor<Aes192>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size (also the IV length)
pub const BLOCK_SIZE: usize = 16;

/// Credential codec errors
///
/// Decryption failures are deliberately collapsed into one variant so callers
/// cannot tell which step rejected the input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid credential")]
    InvalidCredential,

    #[error("credential encryption failed: {0}")]
    Encryption(String),
}

/// Normalize a raw key to a supported AES key length
///
/// Keys up to 16, 24 or 32 bytes are zero-padded to that length; longer keys are
/// truncated to 32 bytes.
#[must_use]
pub fn normalize_key(raw: &[u8]) -> Vec<u8> {
    let target = match raw.len() {
        0..=16 => 16,
        17..=24 => 24,
        _ => 32,
    };
    let mut key = raw[..raw.len().min(target)].to_vec();
    key.resize(target, 0);
    key
}

/// Symmetric codec for [`ClientAuthCredentials`]
#[derive(Clone)]
pub struct CredentialCodec {
    key: Vec<u8>,
}

impl CredentialCodec {
    /// Create a codec from the gateway's configured secret
    ///
    /// The key is the SHA-512 digest of the secret, normalized to 32 bytes.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let digest = Sha512::digest(secret.as_bytes());
        Self::with_key(&digest)
    }

    /// Create a codec from raw key material
    #[must_use]
    pub fn with_key(raw: &[u8]) -> Self {
        Self {
            key: normalize_key(raw),
        }
    }

    /// Key length in bytes (16, 24 or 32)
    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// Encrypt credentials into their transport form
    pub fn encrypt(&self, credentials: &ClientAuthCredentials) -> Result<String, CredentialError> {
        let json = serde_json::to_vec(credentials)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        let mut iv = [0u8; BLOCK_SIZE];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        let body = self.encrypt_body(&iv, &json)?;

        let mut blob = Vec::with_capacity(BLOCK_SIZE + body.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&body);

        Ok(STANDARD_NO_PAD.encode(blob))
    }

    /// Decrypt credentials from their transport form
    pub fn decrypt(&self, encoded: &str) -> Result<ClientAuthCredentials, CredentialError> {
        let blob = STANDARD_NO_PAD
            .decode(encoded.trim().trim_end_matches('='))
            .map_err(|e| {
                tracing::debug!(error = %e, "Credential is not valid base64");
                CredentialError::InvalidCredential
            })?;

        if blob.len() < BLOCK_SIZE * 2 || blob.len() % BLOCK_SIZE != 0 {
            tracing::debug!(len = blob.len(), "Credential has a bad ciphertext length");
            return Err(CredentialError::InvalidCredential);
        }

        let (iv, body) = blob.split_at(BLOCK_SIZE);
        let json = self.decrypt_body(iv, body)?;

        serde_json::from_slice(&json).map_err(|e| {
            tracing::debug!(error = %e, "Decrypted credential is not valid JSON");
            CredentialError::InvalidCredential
        })
    }

    fn encrypt_body(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let ciphertext = match self.key.len() {
            16 => Aes128CbcEnc::new_from_slices(&self.key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
            24 => Aes192CbcEnc::new_from_slices(&self.key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
            _ => Aes256CbcEnc::new_from_slices(&self.key, iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        };
        ciphertext.map_err(|e| CredentialError::Encryption(e.to_string()))
    }

    fn decrypt_body(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let plaintext = match self.key.len() {
            16 => Aes128CbcDec::new_from_slices(&self.key, iv)
                .ok()
                .and_then(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).ok()),
            24 => Aes192CbcDec::new_from_slices(&self.key, iv)
                .ok()
                .and_then(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).ok()),
            _ => Aes256CbcDec::new_from_slices(&self.key, iv)
                .ok()
                .and_then(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext).ok()),
        };
        plaintext.ok_or(CredentialError::InvalidCredential)
    }
}

impl std::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}
