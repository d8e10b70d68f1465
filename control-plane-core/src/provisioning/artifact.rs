//! Release resolution and artifact checksum verification (§4.7).

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::WorkspaceId;

/// A resolved provisioning target: which release to deploy, into which
/// sandbox, with the digest it must verify against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningTarget {
    pub workspace_id: WorkspaceId,
    pub app_id: String,
    pub release_id: String,
    pub bundle_sha256: String,
    pub sandbox_name: String,
}

/// A published release's metadata, as served by the release registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseManifest {
    pub app_id: String,
    pub release_id: String,
    pub version: String,
    pub bundle_sha256: String,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Looks up release manifests for an app. Implemented by whatever backs the
/// release registry (static config, database, object-store index).
pub trait ReleaseResolver: Send + Sync {
    /// Resolve an explicit release id, or the app's default if `release_id`
    /// is `None`. Returns `None` if no manifest can be found — the caller
    /// maps that to `ReleaseUnavailable`.
    fn resolve(&self, app_id: &str, release_id: Option<&str>) -> Option<ReleaseManifest>;
}

/// Resolve `(app_id, explicit_release_id)` into a `ProvisioningTarget`.
/// Explicit release IDs take precedence over the app's configured default.
pub fn resolve_target(
    config: &Config,
    resolver: &dyn ReleaseResolver,
    workspace_id: WorkspaceId,
    app_id: &str,
    explicit_release_id: Option<&str>,
    env: &str,
) -> Result<ProvisioningTarget> {
    let default_release_id = config
        .identity
        .apps
        .get(app_id)
        .map(|entry| entry.default_release_id.as_str())
        .filter(|id| !id.is_empty());

    let release_id = explicit_release_id.or(default_release_id);

    let manifest = release_id
        .and_then(|id| resolver.resolve(app_id, Some(id)))
        .or_else(|| resolver.resolve(app_id, None))
        .ok_or(Error::ReleaseUnavailable)?;

    if manifest.bundle_sha256.is_empty() {
        return Err(Error::ReleaseUnavailable);
    }

    let sandbox_name = sandbox_name(app_id, &workspace_id.to_string(), env)?;

    Ok(ProvisioningTarget {
        workspace_id,
        app_id: app_id.to_string(),
        release_id: manifest.release_id,
        bundle_sha256: manifest.bundle_sha256,
        sandbox_name,
    })
}

/// Builds the sandbox name `sbx-{app_id}-{workspace_id}-{env}`, with each
/// token lowercased, stripped of non-slug characters, and collapsed.
pub fn sandbox_name(app_id: &str, workspace_id: &str, env: &str) -> Result<String> {
    let tokens = [slugify(app_id), slugify(workspace_id), slugify(env)];

    if tokens.iter().any(String::is_empty) {
        return Err(Error::Validation("sandbox name token is empty after normalization".into()));
    }

    let name = format!("sbx-{}-{}-{}", tokens[0], tokens[1], tokens[2]);

    const MAX_LEN: usize = 63;
    let name = if name.len() > MAX_LEN { name[..MAX_LEN].to_string() } else { name };

    Ok(name)
}

fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_dash = false;

    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }

    out.trim_end_matches('-').to_string()
}

/// Computes the SHA-256 digest of `bundle`, hex-encoded lowercase.
pub fn compute_sha256(bundle: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bundle);
    hex_encode(&hasher.finalize())
}

/// Parses a BSD-style checksum file (`"<hex>  <filename>"`) and extracts the
/// hex digest, ignoring the trailing filename.
pub fn parse_bsd_checksum(checksum_file: &str) -> Option<&str> {
    checksum_file.trim().split_whitespace().next()
}

/// Verifies `bundle` against a BSD-format checksum file's recorded digest.
pub fn verify_checksum(bundle: &[u8], checksum_file: &str) -> std::result::Result<(), (String, String)> {
    let expected = parse_bsd_checksum(checksum_file).unwrap_or("").to_lowercase();
    let observed = compute_sha256(bundle);

    if expected == observed {
        Ok(())
    } else {
        Err((expected, observed))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_name_strips_and_lowercases() {
        let name = sandbox_name("My App!", "ws_ABC123", "Prod").unwrap();
        assert_eq!(name, "sbx-my-app-ws-abc123-prod");
    }

    #[test]
    fn sandbox_name_rejects_empty_token() {
        assert!(sandbox_name("", "ws1", "prod").is_err());
    }

    #[test]
    fn checksum_matches_freshly_computed_digest() {
        let bundle = b"hello world";
        let digest = compute_sha256(bundle);
        let checksum_file = format!("{}  bundle.tar.gz\n", digest);
        assert!(verify_checksum(bundle, &checksum_file).is_ok());
    }

    #[test]
    fn mutated_bundle_fails_checksum() {
        let bundle = b"hello world";
        let digest = compute_sha256(bundle);
        let checksum_file = format!("{}  bundle.tar.gz\n", digest);

        let mutated = b"hello worle";
        let result = verify_checksum(mutated, &checksum_file);
        assert!(result.is_err());
    }

    struct FixedResolver(Option<ReleaseManifest>);

    impl ReleaseResolver for FixedResolver {
        fn resolve(&self, _app_id: &str, _release_id: Option<&str>) -> Option<ReleaseManifest> {
            self.0.clone()
        }
    }

    #[test]
    fn missing_manifest_is_release_unavailable() {
        let config = Config::default();
        let resolver = FixedResolver(None);
        let err = resolve_target(&config, &resolver, WorkspaceId::new(), "app1", None, "prod")
            .unwrap_err();
        assert!(matches!(err, Error::ReleaseUnavailable));
    }
}
