// src/services/encryption.rs
//! AES-256-GCM sealing of provider tokens at rest.
//!
//! Stored format: `v1:` + base64(nonce || ciphertext || tag). Each value is
//! bound to a context string (account and provider) through the GCM associated
//! data, so a ciphertext copied onto another account's row fails to open.
//!
//! This file is also compiled into the `generate_encryption_key` binary and
//! must not depend on other crate modules.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const VERSION_PREFIX: &str = "v1:";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Invalid encryption key format (expected base64 of 32 bytes)")]
    InvalidKeyFormat,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Invalid encrypted data format")]
    InvalidDataFormat,
}

pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("cipher", &"<redacted>")
            .finish()
    }
}

impl TokenCipher {
    /// Build from a base64-encoded 32-byte key.
    pub fn from_key(key_str: &str) -> Result<Self, CipherError> {
        let key_bytes = BASE64
            .decode(key_str.trim().as_bytes())
            .map_err(|_| CipherError::InvalidKeyFormat)?;

        if key_bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyFormat);
        }

        let cipher =
            Aes256Gcm::new_from_slice(&key_bytes).map_err(|_| CipherError::InvalidKeyFormat)?;

        Ok(Self { cipher })
    }

    /// Generate a new random key (base64-encoded)
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Encrypt `plaintext` bound to `context`.
    pub fn seal(&self, plaintext: &str, context: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: context.as_bytes(),
                },
            )
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", VERSION_PREFIX, BASE64.encode(combined)))
    }

    /// Decrypt a value produced by [`TokenCipher::seal`] with the same context.
    pub fn open(&self, sealed: &str, context: &str) -> Result<String, CipherError> {
        let encoded = sealed
            .strip_prefix(VERSION_PREFIX)
            .ok_or(CipherError::InvalidDataFormat)?;

        let combined = BASE64
            .decode(encoded.as_bytes())
            .map_err(|_| CipherError::InvalidDataFormat)?;

        // nonce + 16-byte tag at minimum
        if combined.len() < NONCE_LEN + 16 {
            return Err(CipherError::InvalidDataFormat);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: context.as_bytes(),
                },
            )
            .map_err(|_| CipherError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::from_key(&TokenCipher::generate_key()).unwrap()
    }

    #[test]
    fn test_seal_and_open() {
        let cipher = cipher();
        let sealed = cipher.seal("access-token-123", "acct-1:jira").unwrap();

        assert!(sealed.starts_with("v1:"));
        assert!(!sealed.contains("access-token-123"));
        assert_eq!(cipher.open(&sealed, "acct-1:jira").unwrap(), "access-token-123");
    }

    #[test]
    fn test_seal_uses_fresh_nonce() {
        let cipher = cipher();
        let a = cipher.seal("same", "ctx").unwrap();
        let b = cipher.seal("same", "ctx").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_rejects_other_context() {
        let cipher = cipher();
        let sealed = cipher.seal("token", "acct-1:jira").unwrap();
        assert!(matches!(
            cipher.open(&sealed, "acct-2:jira"),
            Err(CipherError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_open_rejects_plain_base64() {
        let cipher = cipher();
        let encoded_only = BASE64.encode("token");
        assert!(cipher.open(&encoded_only, "ctx").is_err());
        assert!(cipher.open(&format!("v1:{}", encoded_only), "ctx").is_err());
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = cipher().seal("token", "ctx").unwrap();
        assert!(cipher().open(&sealed, "ctx").is_err());
    }

    #[test]
    fn test_invalid_key_format() {
        assert!(TokenCipher::from_key("invalid_key").is_err());
        assert!(TokenCipher::from_key(&BASE64.encode([0u8; 16])).is_err());
    }
}
