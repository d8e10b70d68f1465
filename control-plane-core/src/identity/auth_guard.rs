//! Auth Guard & Session Transport (§4.3).
//!
//! Precedence for inbound credentials is `Bearer header > session cookie >
//! none`. The session cookie is backed by `tower_sessions::Session`
//! (rolling refresh comes for free from `Expiry::OnInactivity`, configured in
//! [`crate::session::create_memory_session_layer`]); session-fixation
//! protection is `Session::cycle_id` on the login callback.

use axum::http::HeaderMap;
use tower_sessions::Session;

use crate::error::{Error, Result};
use crate::identity::{AuthIdentity, TokenVerifier};

const SESSION_IDENTITY_KEY: &str = "_auth_identity";

/// Where a credential for the current request came from.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    /// A bearer token from the `Authorization` header.
    Bearer(&'a str),
    /// An established session cookie.
    Session,
}

/// Extracts a raw credential from request headers, honoring the
/// `Bearer header > session cookie > none` precedence. The session branch
/// only reports *presence*; verifying its contents requires the async
/// session lookup in [`AuthGuard::authenticate`].
pub fn extract_credential<'a>(headers: &'a HeaderMap, session_present: bool) -> Option<Credential<'a>> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(Credential::Bearer(token));
        }
    }
    if session_present {
        return Some(Credential::Session);
    }
    None
}

/// The authentication guard: resolves an inbound request's credential into
/// an [`AuthIdentity`], or a stable `no_credentials`/`invalid_*` failure.
pub struct AuthGuard {
    verifier: TokenVerifier,
}

impl AuthGuard {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// Authenticate a request given its headers and (if present) session.
    ///
    /// Bearer credentials are verified fresh on every call (§4.2 — no
    /// verifier-level cache). A valid session cookie's stored identity is
    /// trusted as-is; it was only ever written by [`Self::issue_session`]
    /// after a successful bearer/callback verification.
    pub async fn authenticate(&self, headers: &HeaderMap, session: Option<&Session>) -> Result<AuthIdentity> {
        match extract_credential(headers, session.is_some()) {
            Some(Credential::Bearer(token)) => self.verifier.verify(token).await,
            Some(Credential::Session) => {
                let session = session.expect("session presence checked by extract_credential");
                let stored: Option<AuthIdentity> = session
                    .get(SESSION_IDENTITY_KEY)
                    .await
                    .map_err(|e| Error::Session(e.to_string()))?;
                stored.ok_or(Error::InvalidSession)
            }
            None => Err(Error::NoCredentials),
        }
    }

    /// Issue a fresh session for `identity`, regenerating the session id
    /// first so a pre-authentication session id is never reused
    /// (session-fixation protection).
    pub async fn issue_session(session: &Session, identity: &AuthIdentity) -> Result<()> {
        session.cycle_id().await.map_err(|e| Error::Session(e.to_string()))?;
        session
            .insert(SESSION_IDENTITY_KEY, identity)
            .await
            .map_err(|e| Error::Session(e.to_string()))
    }

    /// Clear the session's stored identity (logout). The cookie itself is
    /// cleared by deleting the session (`Session::flush`) at the call site,
    /// which reuses the same cookie flags the session layer was configured
    /// with.
    pub async fn clear_session(session: &Session) -> Result<()> {
        session
            .remove::<AuthIdentity>(SESSION_IDENTITY_KEY)
            .await
            .map_err(|e| Error::Session(e.to_string()))?;
        Ok(())
    }
}

/// Paths that bypass the auth guard entirely (health checks, the login
/// callback, and public share access).
pub fn is_exempt_path(path: &str, exempt_prefixes: &[String]) -> bool {
    exempt_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_takes_precedence_over_session() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        match extract_credential(&headers, true) {
            Some(Credential::Bearer(tok)) => assert_eq!(tok, "abc.def.ghi"),
            other => panic!("expected bearer credential, got {other:?}"),
        }
    }

    #[test]
    fn session_used_when_no_bearer_present() {
        let headers = HeaderMap::new();
        assert_eq!(extract_credential(&headers, true), Some(Credential::Session));
    }

    #[test]
    fn none_when_neither_present() {
        let headers = HeaderMap::new();
        assert_eq!(extract_credential(&headers, false), None);
    }

    #[test]
    fn malformed_authorization_header_falls_through_to_session() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_credential(&headers, true), Some(Credential::Session));
    }

    #[test]
    fn exempt_paths_match_by_prefix() {
        let exempt = vec!["/health".to_string(), "/share/".to_string()];
        assert!(is_exempt_path("/health", &exempt));
        assert!(is_exempt_path("/share/abc123", &exempt));
        assert!(!is_exempt_path("/api/v1/workspaces", &exempt));
    }
}

impl std::fmt::Debug for Credential<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Bearer(_) => write!(f, "Credential::Bearer(<redacted>)"),
            Credential::Session => write!(f, "Credential::Session"),
        }
    }
}
