//! Share-link token model, path normalization, and resolution rules (§4.10).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

use super::model::{ShareAccess, ShareLink};

const TOKEN_BYTES: usize = 32;

/// Mints a fresh URL-safe random token. The plaintext is returned to the
/// caller exactly once; only [`hash_token`]'s output is ever persisted.
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Deterministic SHA-256 hash of a token, hex-encoded (64 chars).
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    use std::fmt::Write;
    for b in digest {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

/// Normalizes a share path: enforces a leading slash, collapses `.` and
/// repeated `/` segments, and rejects any `..` segment (literal or
/// percent-encoded) as traversal.
pub fn normalize_path(path: &str) -> Result<String> {
    let lower = path.to_ascii_lowercase();
    if lower.contains("%2e%2e") || lower.contains("%2e.") || lower.contains(".%2e") {
        return Err(Error::PathTraversal(path.to_string()));
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(Error::PathTraversal(path.to_string())),
            other => segments.push(other),
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

/// Resolves a share link against a requested path and access level,
/// applying the lifecycle table from §4.10 in order: missing record,
/// revoked, expired, path mismatch, then access-level mismatch.
pub fn resolve_access<'a>(
    link: Option<&'a ShareLink>,
    now: chrono::DateTime<chrono::Utc>,
    requested_path: &str,
    requested_access: ShareAccess,
) -> Result<&'a ShareLink> {
    let link = link.ok_or(Error::ShareNotFound)?;

    if link.revoked_at.is_some() {
        return Err(Error::ShareRevoked);
    }

    if link.expires_at <= now {
        return Err(Error::ShareExpired);
    }

    let normalized_request = normalize_path(requested_path)?;
    if normalized_request != link.path {
        return Err(Error::PathMismatch);
    }

    if requested_access > link.access {
        return Err(Error::Forbidden("requested access exceeds granted access".into()));
    }

    Ok(link)
}

/// Redacts token-shaped values to their first `prefix_len` characters
/// followed by a fixed marker, for inclusion in audit events (§4.10).
pub fn redact_token(token: &str, prefix_len: usize) -> String {
    let prefix: String = token.chars().take(prefix_len).collect();
    format!("{prefix}…[redacted]")
}

/// Scans `input` for base64url-alphabet runs of a token-plausible length and
/// replaces each with the redaction marker, so log lines and payloads never
/// carry a bare token even incidentally.
pub fn redact_tokens_in_text(input: &str, prefix_len: usize) -> String {
    const MIN_TOKEN_LEN: usize = 40;

    let is_token_char = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';

    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        let c = input[i..].chars().next().unwrap();
        if is_token_char(c) {
            let start = i;
            let mut end = i;
            for (idx, ch) in input[i..].char_indices() {
                if !is_token_char(ch) {
                    break;
                }
                end = i + idx + ch.len_utf8();
            }
            let run = &input[start..end];
            if run.chars().count() >= MIN_TOKEN_LEN {
                out.push_str(&redact_token(run, prefix_len));
            } else {
                out.push_str(run);
            }
            i = end;
        } else {
            out.push(c);
            i += c.len_utf8();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorkspaceId;

    #[test]
    fn token_hash_is_deterministic_and_64_hex_chars() {
        let token = generate_token();
        let hash_a = hash_token(&token);
        let hash_b = hash_token(&token);
        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.len(), 64);
        assert!(hash_a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn normalize_collapses_dot_segments_and_slashes() {
        assert_eq!(normalize_path("/docs//./README.md").unwrap(), "/docs/README.md");
        assert_eq!(normalize_path("docs/README.md").unwrap(), "/docs/README.md");
    }

    #[test]
    fn normalize_rejects_literal_traversal() {
        assert!(normalize_path("/docs/../../etc/passwd").is_err());
    }

    #[test]
    fn normalize_rejects_percent_encoded_traversal() {
        assert!(normalize_path("/docs/%2e%2e/etc/passwd").is_err());
    }

    fn link(path: &str, access: ShareAccess, expires_in_hours: i64) -> ShareLink {
        ShareLink::new(
            WorkspaceId::new(),
            path.to_string(),
            "hash".to_string(),
            access,
            "owner1".to_string(),
            chrono::Utc::now() + chrono::Duration::hours(expires_in_hours),
        )
    }

    #[test]
    fn missing_record_is_not_found() {
        let err = resolve_access(None, chrono::Utc::now(), "/docs/README.md", ShareAccess::Read)
            .unwrap_err();
        assert!(matches!(err, Error::ShareNotFound));
    }

    #[test]
    fn revoked_takes_precedence_over_expiry() {
        let mut l = link("/docs/README.md", ShareAccess::Read, -1);
        l.revoked_at = Some(chrono::Utc::now());
        let err =
            resolve_access(Some(&l), chrono::Utc::now(), "/docs/README.md", ShareAccess::Read)
                .unwrap_err();
        assert!(matches!(err, Error::ShareRevoked));
    }

    #[test]
    fn expired_link_is_gone_not_not_found() {
        let l = link("/docs/README.md", ShareAccess::Read, -1);
        let err =
            resolve_access(Some(&l), chrono::Utc::now(), "/docs/README.md", ShareAccess::Read)
                .unwrap_err();
        assert!(matches!(err, Error::ShareExpired));
    }

    #[test]
    fn path_mismatch_is_forbidden() {
        let l = link("/docs/README.md", ShareAccess::Read, 72);
        let err =
            resolve_access(Some(&l), chrono::Utc::now(), "/etc/passwd", ShareAccess::Read)
                .unwrap_err();
        assert!(matches!(err, Error::PathMismatch));
    }

    #[test]
    fn write_access_requested_on_read_link_is_forbidden() {
        let l = link("/docs/README.md", ShareAccess::Read, 72);
        let err = resolve_access(Some(&l), chrono::Utc::now(), "/docs/README.md", ShareAccess::Write)
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn valid_link_resolves() {
        let l = link("/docs/README.md", ShareAccess::Write, 72);
        let resolved =
            resolve_access(Some(&l), chrono::Utc::now(), "/docs/README.md", ShareAccess::Read)
                .unwrap();
        assert_eq!(resolved.id, l.id);
    }

    #[test]
    fn redact_token_keeps_only_prefix() {
        let token = "a".repeat(50);
        let redacted = redact_token(&token, 6);
        assert_eq!(redacted, "aaaaaa…[redacted]");
    }

    #[test]
    fn redact_tokens_in_text_replaces_long_runs_only() {
        let token = generate_token();
        let text = format!("share link created token={token} for path /docs/x");
        let redacted = redact_tokens_in_text(&text, 6);
        assert!(!redacted.contains(&token));
        assert!(redacted.contains("[redacted]"));
        assert!(redacted.contains("/docs/x"));
    }
}
