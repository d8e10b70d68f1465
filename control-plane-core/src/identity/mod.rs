//! Identity & session layer (§4.1–§4.3): host→app resolution, token
//! verification with key-rotation caching, and the authentication guard.

mod auth_guard;
mod host_resolver;
mod token_verify;

pub use auth_guard::{extract_credential, AuthGuard, Credential};
pub use host_resolver::{resolve_host, HostResolution};
pub use token_verify::{
    JwksKeyProvider, KeyProvider, SigningKey, StaticKeyProvider, TokenVerifier,
};

use serde::{Deserialize, Serialize};

/// The identity produced by successful token or session verification (§4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    /// Subject / user id from the verified credential.
    pub user_id: String,
    /// Email, normalized to lowercase.
    pub email: String,
    /// Role claim, if present.
    #[serde(default)]
    pub role: Option<String>,
}
