//! Encrypted session persistence.
//!
//! The `TokenStore` keeps the portal's bearer token, refresh token and
//! user profile in a [`KeyValueStore`]. Tokens are encrypted with
//! [`TokenCipher`] before they touch storage. Anything that fails to
//! decrypt or parse is treated as local corruption: the stored value is
//! deleted and the caller sees `None`, never an error.

// Author: kelexine (https://github.com/kelexine)

use super::cipher::TokenCipher;
use super::{jwt, UserProfile};
use crate::error::Result;
use crate::realtime::CredentialProvider;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Storage key of the encrypted access token.
pub const TOKEN_KEY: &str = "wagate_auth_token";
/// Storage key of the encrypted refresh token.
pub const REFRESH_TOKEN_KEY: &str = "wagate_refresh_token";
/// Storage key of the serialized user profile.
pub const USER_KEY: &str = "wagate_user";

/// Cheap-to-clone handle over the encrypted session entries.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    cipher: Arc<TokenCipher>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, cipher: TokenCipher) -> Self {
        Self {
            storage,
            cipher: Arc::new(cipher),
        }
    }

    pub fn set_token(&self, token: &str) -> Result<()> {
        self.write_encrypted(TOKEN_KEY, token)
    }

    pub fn get_token(&self) -> Option<String> {
        self.read_encrypted(TOKEN_KEY)
    }

    pub fn set_refresh_token(&self, token: &str) -> Result<()> {
        self.write_encrypted(REFRESH_TOKEN_KEY, token)
    }

    pub fn get_refresh_token(&self) -> Option<String> {
        self.read_encrypted(REFRESH_TOKEN_KEY)
    }

    pub fn set_user(&self, user: &UserProfile) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.storage.set(USER_KEY, &json)
    }

    /// Stored profile, or `None`. A profile that no longer parses is removed.
    pub fn get_user(&self) -> Option<UserProfile> {
        let raw = self.storage.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Stored user profile is malformed, discarding: {}", e);
                self.discard(USER_KEY);
                None
            }
        }
    }

    /// Logout: remove tokens and profile.
    pub fn clear(&self) -> Result<()> {
        self.storage.remove(TOKEN_KEY)?;
        self.storage.remove(REFRESH_TOKEN_KEY)?;
        self.storage.remove(USER_KEY)?;
        crate::metrics::record_token_operation("cleared");
        debug!("Session cleared");
        Ok(())
    }

    /// True iff a token is stored, decrypts, and its `exp` is in the future.
    pub fn is_logged_in(&self) -> bool {
        self.get_token()
            .map(|token| !jwt::is_expired(&token))
            .unwrap_or(false)
    }

    /// Expiry of the stored access token, if it has a readable one.
    pub fn token_expiration(&self) -> Option<DateTime<Utc>> {
        self.get_token().and_then(|token| jwt::expiration(&token))
    }

    fn write_encrypted(&self, key: &str, plaintext: &str) -> Result<()> {
        let sealed = self.cipher.encrypt(plaintext)?;
        self.storage.set(key, &sealed)?;
        crate::metrics::record_token_operation("write");
        Ok(())
    }

    fn read_encrypted(&self, key: &str) -> Option<String> {
        let sealed = self.storage.get(key)?;
        crate::metrics::record_token_operation("read");

        match self.cipher.decrypt(&sealed) {
            Ok(token) => Some(token),
            Err(e) => {
                error!("Stored value under {} failed to decrypt, removing it: {}", key, e);
                crate::metrics::record_token_operation("decrypt_failure");
                self.discard(key);
                None
            }
        }
    }

    fn discard(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            error!("Failed to remove corrupt entry {}: {}", key, e);
        }
    }
}

impl CredentialProvider for TokenStore {
    fn credential(&self) -> Option<String> {
        self.get_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_ciphertext_is_what_gets_stored() {
        let storage = Arc::new(MemoryStore::new());
        let store = TokenStore::new(storage.clone(), TokenCipher::from_secret("s"));

        store.set_token("plain-token").unwrap();

        let raw = storage.get(TOKEN_KEY).unwrap();
        assert_ne!(raw, "plain-token");
        assert_eq!(store.get_token().as_deref(), Some("plain-token"));
    }

    #[test]
    fn test_credential_provider_reads_access_token() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()), TokenCipher::from_secret("s"));
        assert_eq!(store.credential(), None);
        store.set_token("abc").unwrap();
        assert_eq!(store.credential().as_deref(), Some("abc"));
    }
}
