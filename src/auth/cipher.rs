//! AES-256-GCM encryption for tokens at rest.
//!
//! The key is the SHA-256 digest of a configured secret. Each call to
//! [`TokenCipher::encrypt`] draws a fresh 96-bit nonce; the stored form is
//! `base64(nonce || ciphertext || tag)`.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::error::{PortalError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Zeroize, ZeroizeOnDrop)]
struct KeyBytes([u8; 32]);

/// Symmetric cipher for short secrets such as bearer tokens.
pub struct TokenCipher {
    key: KeyBytes,
    rng: SystemRandom,
}

// Custom Debug impl that never prints key material
impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl TokenCipher {
    /// Derive the key from an arbitrary secret string.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self {
            key: KeyBytes(key),
            rng: SystemRandom::new(),
        }
    }

    fn sealing_key(&self) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key.0)
            .map_err(|_| PortalError::Crypto("Invalid AES-256 key".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let key = self.sealing_key()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| PortalError::Crypto("System RNG unavailable".to_string()))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| PortalError::Crypto("Encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(STANDARD.encode(sealed))
    }

    /// Fails on anything that was not produced by `encrypt` with the same
    /// secret: bad base64, truncated input, tag mismatch or non UTF-8 output.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let sealed = STANDARD
            .decode(encoded.trim())
            .map_err(|e| PortalError::Crypto(format!("Invalid base64: {}", e)))?;

        if sealed.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(PortalError::Crypto(format!(
                "Ciphertext too short: {} bytes",
                sealed.len()
            )));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| PortalError::Crypto("Invalid nonce".to_string()))?;

        let key = self.sealing_key()?;
        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| {
                PortalError::Crypto("Authentication tag verification failed".to_string())
            })?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| PortalError::Crypto("Decrypted token is not UTF-8".to_string()))
    }
}
