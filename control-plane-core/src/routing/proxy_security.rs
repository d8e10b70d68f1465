//! Workspace-proxy security boundary (§4.8).
//!
//! `HeaderMap` keys are case-insensitive by construction, so the deny-list
//! comparisons below are immune to case-folding tricks by design — no
//! explicit lowercasing dance is needed the way it would be with raw
//! `Vec<(String, String)>` pairs.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::ProxyConfig;

/// Headers stripped from every proxied request regardless of configuration.
const DEFAULT_DENY_LIST: &[&str] = &[
    "authorization",
    "cookie",
    "x-session-id",
    "x-sprite-bearer",
];

fn is_denied(name: &HeaderName, extra: &[String]) -> bool {
    let lower = name.as_str();
    if lower.starts_with("x-user-") {
        return true;
    }
    if DEFAULT_DENY_LIST.iter().any(|denied| *denied == lower) {
        return true;
    }
    extra.iter().any(|denied| denied.eq_ignore_ascii_case(lower))
}

/// Builds the outbound header set for a proxied request: strips every
/// credential-shaped inbound header, injects the server-managed upstream
/// bearer (if configured), and preserves `X-Request-ID`/`X-Workspace-ID`.
pub fn sanitize_proxy_headers(
    inbound: &HeaderMap,
    config: &ProxyConfig,
    upstream_bearer: Option<&str>,
) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len());

    for (name, value) in inbound.iter() {
        if is_denied(name, &config.extra_strip_headers) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }

    if let Some(bearer) = upstream_bearer {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(config.upstream_bearer_header.as_bytes()),
            HeaderValue::from_str(&format!("Bearer {bearer}")),
        ) {
            outbound.insert(header_name, header_value);
        }
    }

    outbound
}

/// Strips credential and `Set-Cookie`-like headers from an upstream response
/// before it reaches the browser.
pub fn redact_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream.iter() {
        let lower = name.as_str();
        if lower == "set-cookie" || lower == "authorization" || is_denied(name, &[]) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn config() -> ProxyConfig {
        ProxyConfig {
            upstream_bearer_header: "X-Upstream-Bearer".to_string(),
            extra_strip_headers: vec!["X-Extra-Secret".to_string()],
            stream_limit_per_workspace: 4,
            upstream_timeout_secs: 30,
        }
    }

    #[test]
    fn strips_deny_list_headers_case_insensitively() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::AUTHORIZATION, "Bearer user-jwt".parse().unwrap());
        inbound.insert("COOKIE", "session=abc".parse().unwrap());
        inbound.insert("X-Sprite-Bearer", "forged".parse().unwrap());
        inbound.insert("x-user-role", "admin".parse().unwrap());
        inbound.insert("X-Extra-Secret", "shh".parse().unwrap());
        inbound.insert("x-request-id", "req_abc".parse().unwrap());

        let outbound = sanitize_proxy_headers(&inbound, &config(), Some("server-token"));

        assert!(outbound.get(header::AUTHORIZATION).is_none());
        assert!(outbound.get("cookie").is_none());
        assert!(outbound.get("x-sprite-bearer").is_none());
        assert!(outbound.get("x-user-role").is_none());
        assert!(outbound.get("x-extra-secret").is_none());
        assert_eq!(outbound.get("x-request-id").unwrap(), "req_abc");
        assert_eq!(outbound.get("X-Upstream-Bearer").unwrap(), "Bearer server-token");
    }

    #[test]
    fn duplicate_authorization_headers_are_all_removed() {
        let mut inbound = HeaderMap::new();
        inbound.append(header::AUTHORIZATION, "Bearer one".parse().unwrap());
        inbound.append(header::AUTHORIZATION, "Bearer two".parse().unwrap());

        let outbound = sanitize_proxy_headers(&inbound, &config(), None);
        assert_eq!(outbound.get_all(header::AUTHORIZATION).iter().count(), 0);
    }

    #[test]
    fn response_redaction_strips_set_cookie() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::SET_COOKIE, "runtime_session=xyz".parse().unwrap());
        upstream.insert("content-type", "application/json".parse().unwrap());

        let redacted = redact_response_headers(&upstream);
        assert!(redacted.get(header::SET_COOKIE).is_none());
        assert_eq!(redacted.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn no_bearer_configured_means_no_injected_header() {
        let outbound = sanitize_proxy_headers(&HeaderMap::new(), &config(), None);
        assert!(outbound.get("X-Upstream-Bearer").is_none());
    }
}
