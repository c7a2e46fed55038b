use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encrypt: {0}")]
    Encrypt(String),

    #[error("base64 decode: {0}")]
    Encoding(String),

    #[error("ciphertext too short")]
    TooShort,

    #[error("decrypt: {0}")]
    Decrypt(String),
}

/// Derive the AES-256 key from the configured encryption secret.
pub fn key_from_secret(secret: &str) -> Key<Aes256Gcm> {
    let digest = Sha256::digest(secret.as_bytes());
    *Key::<Aes256Gcm>::from_slice(&digest)
}

/// Encrypt plaintext. Returns a base64 string containing nonce + ciphertext.
pub fn encrypt(key: &Key<Aes256Gcm>, plaintext: &str) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new(key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    let mut combined = nonce.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(B64.encode(&combined))
}

/// Decrypt a base64 string containing nonce + ciphertext.
pub fn decrypt(key: &Key<Aes256Gcm>, encoded: &str) -> Result<String, CryptoError> {
    let combined = B64
        .decode(encoded)
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;
    if combined.len() < NONCE_LEN {
        return Err(CryptoError::TooShort);
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CryptoError::Decrypt(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::Decrypt(format!("utf8: {e}")))
}
