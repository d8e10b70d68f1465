//! Host→App Resolver (§4.1).

use crate::config::{AppConfigEntry, IdentityConfig};

/// Outcome of resolving a `Host` header to an `app_id` and its registered config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResolution {
    /// The resolved app id.
    pub app_id: String,
    /// The registered `AppConfig` for `app_id`, or `None` if nothing is registered.
    pub app_config: Option<AppConfigEntry>,
}

/// Strips a port suffix and IPv6 brackets, then lowercases the host.
fn normalize_host(host: &str) -> String {
    let host = host.trim();

    // `[::1]:8080` or bare `[::1]` — the address is everything between the brackets;
    // anything after the closing bracket (`:port`) is discarded.
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_ascii_lowercase();
        }
        return rest.to_ascii_lowercase();
    }

    // `host:port` has exactly one colon; a bare (unbracketed) IPv6 address has several
    // and is left untouched.
    let without_port = if host.matches(':').count() == 1 {
        host.split(':').next().unwrap_or(host)
    } else {
        host
    };
    without_port.to_ascii_lowercase()
}

/// Resolves an inbound `Host` header to an `app_id`, per §4.1's precedence:
/// exact host map match, then wildcard `*`, then configured default.
///
/// Returns `None` when nothing matches (`app_not_resolvable`).
pub fn resolve_host(host: &str, config: &IdentityConfig) -> Option<HostResolution> {
    let normalized = normalize_host(host);

    let app_id = config
        .host_map
        .get(&normalized)
        .cloned()
        .or_else(|| config.wildcard_app_id.clone())
        .or_else(|| config.default_app_id.clone())?;

    let app_config = config.apps.get(&app_id).cloned();
    Some(HostResolution { app_id, app_config })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(host_map: &[(&str, &str)], wildcard: Option<&str>, default: Option<&str>) -> IdentityConfig {
        IdentityConfig {
            host_map: host_map.iter().map(|(h, a)| (h.to_string(), a.to_string())).collect(),
            wildcard_app_id: wildcard.map(String::from),
            default_app_id: default.map(String::from),
            apps: HashMap::new(),
        }
    }

    #[test]
    fn exact_match_wins_over_wildcard_and_default() {
        let config = config_with(&[("boring-ui.example.com", "boring-ui")], Some("wild"), Some("def"));
        let resolved = resolve_host("Boring-UI.example.com", &config).unwrap();
        assert_eq!(resolved.app_id, "boring-ui");
    }

    #[test]
    fn port_and_case_are_ignored() {
        let config = config_with(&[("boring-ui.example.com", "boring-ui")], None, None);
        let resolved = resolve_host("BORING-UI.EXAMPLE.COM:8443", &config).unwrap();
        assert_eq!(resolved.app_id, "boring-ui");
    }

    #[test]
    fn ipv6_brackets_are_stripped() {
        let config = config_with(&[("::1", "local")], None, None);
        let resolved = resolve_host("[::1]:9000", &config).unwrap();
        assert_eq!(resolved.app_id, "local");
    }

    #[test]
    fn falls_back_to_wildcard_then_default() {
        let wildcard_only = config_with(&[], Some("wild"), Some("def"));
        assert_eq!(resolve_host("nowhere.example.com", &wildcard_only).unwrap().app_id, "wild");

        let default_only = config_with(&[], None, Some("def"));
        assert_eq!(resolve_host("nowhere.example.com", &default_only).unwrap().app_id, "def");
    }

    #[test]
    fn no_match_is_app_not_resolvable() {
        let config = config_with(&[], None, None);
        assert!(resolve_host("unknown.example.com", &config).is_none());
    }

    #[test]
    fn unregistered_app_id_yields_no_app_config() {
        let config = config_with(&[], None, Some("ghost"));
        let resolved = resolve_host("anything", &config).unwrap();
        assert_eq!(resolved.app_id, "ghost");
        assert!(resolved.app_config.is_none());
    }
}
