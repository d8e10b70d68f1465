//! Token Verification & Key Rotation (§4.2).
//!
//! The verifier calls `get_signing_key` on every verification — no
//! verifier-level cache. Each [`KeyProvider`] owns its own caching strategy;
//! [`JwksKeyProvider`] caches fetched keys for exactly 300 seconds (per §4.2),
//! configurable for tests via [`crate::config::KeyProviderConfig::Jwks`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{KeyProviderConfig, TokenConfig};
use crate::error::{Error, Result};
use crate::identity::AuthIdentity;

/// A resolved signing key plus the algorithm it must be verified with.
#[derive(Clone)]
pub struct SigningKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

/// Claims this crate enforces on every bearer credential (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: Option<String>,
    email: Option<String>,
    role: Option<String>,
    aud: Option<serde_json::Value>,
    exp: i64,
}

/// A source of signing keys. Invoked on every verification; implementations
/// own whatever caching strategy fits their backing store (§4.2, §9 "duck
/// interfaces" → explicit capability contract).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Resolve the key that should verify `token`.
    async fn get_signing_key(&self, token: &str) -> Result<SigningKey>;
}

/// A single static symmetric (HS256) key, read once at startup.
pub struct StaticKeyProvider {
    key: DecodingKey,
}

impl StaticKeyProvider {
    /// Build a provider from a raw HS256 secret.
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn get_signing_key(&self, _token: &str) -> Result<SigningKey> {
        Ok(SigningKey {
            key: self.key.clone(),
            algorithm: Algorithm::HS256,
        })
    }
}

/// JSON Web Key Set document, minimal shape needed for RS256 key material.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

struct JwksCache {
    fetched_at: DateTime<Utc>,
    keys: HashMap<String, DecodingKey>,
}

/// A rotating asymmetric key set fetched from a JWKS endpoint, cached for
/// exactly `cache_ttl_secs` (300s by default, per §4.2).
pub struct JwksKeyProvider {
    url: String,
    cache_ttl_secs: u64,
    fetch_timeout: std::time::Duration,
    http: reqwest::Client,
    cache: RwLock<Option<JwksCache>>,
}

impl JwksKeyProvider {
    pub fn new(url: impl Into<String>, cache_ttl_secs: u64, fetch_timeout: std::time::Duration) -> Self {
        Self {
            url: url.into(),
            cache_ttl_secs,
            fetch_timeout,
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    fn cache_is_fresh(fetched_at: DateTime<Utc>, ttl_secs: u64) -> bool {
        (Utc::now() - fetched_at).num_seconds() < ttl_secs as i64
    }

    async fn fetch(&self) -> Result<HashMap<String, DecodingKey>> {
        let response = self
            .http
            .get(&self.url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| Error::JwksFetchError(e.to_string()))?;

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| Error::JwksFetchError(e.to_string()))?;

        let mut keys = HashMap::with_capacity(document.keys.len());
        for jwk in document.keys {
            let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                .map_err(|e| Error::JwksFetchError(format!("invalid JWK for kid {}: {e}", jwk.kid)))?;
            keys.insert(jwk.kid, key);
        }
        Ok(keys)
    }
}

#[async_trait]
impl KeyProvider for JwksKeyProvider {
    async fn get_signing_key(&self, token: &str) -> Result<SigningKey> {
        let header = decode_header(token).map_err(|_| Error::InvalidSignature)?;
        let kid = header.kid.ok_or_else(|| Error::MissingClaim("kid".into()))?;

        {
            let guard = self.cache.read().await;
            if let Some(cached) = guard.as_ref() {
                if Self::cache_is_fresh(cached.fetched_at, self.cache_ttl_secs) {
                    if let Some(key) = cached.keys.get(&kid) {
                        return Ok(SigningKey {
                            key: key.clone(),
                            algorithm: Algorithm::RS256,
                        });
                    }
                }
            }
        }

        let keys = self.fetch().await?;
        let key = keys.get(&kid).cloned();
        {
            let mut guard = self.cache.write().await;
            *guard = Some(JwksCache {
                fetched_at: Utc::now(),
                keys,
            });
        }

        key.map(|key| SigningKey {
            key,
            algorithm: Algorithm::RS256,
        })
        .ok_or(Error::InvalidSignature)
    }
}

/// Verifies bearer credentials against a [`KeyProvider`] (§4.2).
pub struct TokenVerifier {
    provider: Arc<dyn KeyProvider>,
    audience: String,
    clock_skew_secs: u64,
}

impl TokenVerifier {
    pub fn new(provider: Arc<dyn KeyProvider>, config: &TokenConfig) -> Self {
        Self {
            provider,
            audience: config.audience.clone(),
            clock_skew_secs: config.clock_skew_secs,
        }
    }

    /// Build a provider from configuration, given the static secret (if configured
    /// as the `Static` key shape).
    pub fn provider_from_config(config: &TokenConfig, static_secret: Option<&str>) -> Result<Arc<dyn KeyProvider>> {
        match &config.provider {
            KeyProviderConfig::Static => {
                let secret = static_secret
                    .ok_or_else(|| Error::Config(Box::new(figment::Error::from("static key provider requires a secret"))))?;
                Ok(Arc::new(StaticKeyProvider::new(secret)))
            }
            KeyProviderConfig::Jwks { url, cache_ttl_secs } => Ok(Arc::new(JwksKeyProvider::new(
                url.clone(),
                *cache_ttl_secs,
                std::time::Duration::from_secs(config.jwks_fetch_timeout_secs),
            ))),
        }
    }

    /// Verify `token`, returning the canonical [`AuthIdentity`] on success.
    pub async fn verify(&self, token: &str) -> Result<AuthIdentity> {
        let signing_key = self.provider.get_signing_key(token).await?;

        let mut validation = Validation::new(signing_key.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.leeway = self.clock_skew_secs;

        let token_data = decode::<Claims>(token, &signing_key.key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::InvalidSignature => Error::InvalidSignature,
                ErrorKind::ExpiredSignature => Error::TokenExpired,
                ErrorKind::InvalidAudience => Error::InvalidAudience,
                _ => Error::InvalidSignature,
            }
        })?;

        let claims = token_data.claims;
        let sub = claims.sub.ok_or_else(|| Error::MissingClaim("sub".into()))?;
        let email = claims
            .email
            .ok_or_else(|| Error::MissingClaim("email".into()))?
            .to_lowercase();

        Ok(AuthIdentity {
            user_id: sub,
            email,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, aud: &str, exp_offset_secs: i64) -> String {
        let claims = serde_json::json!({
            "sub": "user_123",
            "email": "User@Example.com",
            "role": "admin",
            "aud": aud,
            "exp": (Utc::now().timestamp() + exp_offset_secs),
        });
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn verifier(secret: &str, audience: &str) -> TokenVerifier {
        let config = TokenConfig {
            provider: KeyProviderConfig::Static,
            audience: audience.to_string(),
            clock_skew_secs: 30,
            jwks_fetch_timeout_secs: 5,
        };
        TokenVerifier::new(Arc::new(StaticKeyProvider::new(secret)), &config)
    }

    #[tokio::test]
    async fn valid_token_yields_normalized_identity() {
        let token = make_token("shh-secret-shh-secret", "control-plane", 300);
        let identity = verifier("shh-secret-shh-secret", "control-plane").verify(&token).await.unwrap();
        assert_eq!(identity.user_id, "user_123");
        assert_eq!(identity.email, "user@example.com");
        assert_eq!(identity.role.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let token = make_token("shh-secret-shh-secret", "control-plane", -3600);
        let err = verifier("shh-secret-shh-secret", "control-plane").verify(&token).await.unwrap_err();
        assert!(matches!(err, Error::TokenExpired));
    }

    #[tokio::test]
    async fn wrong_audience_is_rejected() {
        let token = make_token("shh-secret-shh-secret", "some-other-audience", 300);
        let err = verifier("shh-secret-shh-secret", "control-plane").verify(&token).await.unwrap_err();
        assert!(matches!(err, Error::InvalidAudience));
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let token = make_token("shh-secret-shh-secret", "control-plane", 300);
        let err = verifier("a-different-secret-entirely", "control-plane").verify(&token).await.unwrap_err();
        assert!(matches!(err, Error::InvalidSignature));
    }
}
