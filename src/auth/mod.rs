// Session credential module
// Author: kelexine (https://github.com/kelexine)

pub mod cipher;
pub mod jwt;
mod store;

pub use cipher::TokenCipher;
pub use store::{TokenStore, REFRESH_TOKEN_KEY, TOKEN_KEY, USER_KEY};

use serde::{Deserialize, Serialize};

/// Portal user profile, persisted as plain JSON next to the tokens.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}
