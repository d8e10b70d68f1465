//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `CPCORE_`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/control-plane-core/{service_name}/config.toml
//! 4. System directory: /etc/control-plane-core/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service-level configuration (port, log level, environment).
    pub service: ServiceConfig,

    /// Host→app resolution and per-app branding (§4.1, §3 `AppConfig`).
    pub identity: IdentityConfig,

    /// Session cookie transport and CSRF configuration (§4.3, §4.12).
    #[serde(default)]
    pub session: crate::session::SessionConfig,

    /// Token verification and key-rotation configuration (§4.2).
    pub token: TokenConfig,

    /// Provisioning step timeouts and sweeper cadence (§4.5, §4.6).
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Proxy header sanitization and stream limits (§4.8, §4.9).
    pub proxy: ProxyConfig,

    /// Share-link default/maximum expiry (§4.10).
    #[serde(default)]
    pub sharing: SharingConfig,

    /// Ambient HTTP middleware configuration.
    #[serde(default)]
    pub middleware: MiddlewareConfig,

    /// Durable-repository database configuration (optional; absent uses in-memory stores).
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// Redis configuration (session store / JWT revocation cache, optional).
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// OpenTelemetry configuration (optional).
    #[serde(default)]
    pub otlp: Option<OtlpConfig>,
}

/// Service-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, used for XDG config directory lookup.
    pub name: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production). Controls the session cookie `Secure` flag.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl ServiceConfig {
    /// True when `environment` is anything other than `"dev"`.
    pub fn is_production(&self) -> bool {
        self.environment != "dev"
    }
}

/// Per-application branding, keyed by `app_id` (§3 `AppConfig`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfigEntry {
    /// Stable app identifier.
    pub app_id: String,
    /// Display name shown on the login page.
    pub name: String,
    /// Logo asset path or URL.
    #[serde(default)]
    pub logo: String,
    /// Default release id used when provisioning doesn't specify one explicitly.
    pub default_release_id: String,
}

/// Host→app resolution configuration (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Exact host (lowercased, port stripped) → `app_id`.
    #[serde(default)]
    pub host_map: HashMap<String, String>,

    /// `app_id` used for the wildcard `*` host entry, if any.
    #[serde(default)]
    pub wildcard_app_id: Option<String>,

    /// `app_id` used when no host or wildcard entry matches.
    #[serde(default)]
    pub default_app_id: Option<String>,

    /// Registered branding per `app_id`.
    #[serde(default)]
    pub apps: HashMap<String, AppConfigEntry>,
}

/// Key-provider shape for token verification (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum KeyProviderConfig {
    /// A single static symmetric (HS256) key, read from the `StaticKey` secret.
    Static,
    /// A rotating asymmetric key set fetched from a JWKS endpoint.
    Jwks {
        /// JWKS document URL.
        url: String,
        /// Cache TTL in seconds. The source pins this at 300; kept configurable for tests.
        #[serde(default = "default_jwks_cache_ttl")]
        cache_ttl_secs: u64,
    },
}

/// Token verification configuration (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Which key-provider shape to use.
    pub provider: KeyProviderConfig,
    /// Expected `aud` claim.
    pub audience: String,
    /// Clock-skew tolerance applied to `exp` validation, in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,
    /// Bounded timeout for JWKS fetches; exceeding it yields `jwks_fetch_error`.
    #[serde(default = "default_jwks_fetch_timeout")]
    pub jwks_fetch_timeout_secs: u64,
}

impl TokenConfig {
    /// JWKS cache TTL in seconds, or the crate default (300s, per the source) for
    /// a static-key provider where the setting is meaningless.
    pub fn jwks_cache_ttl_secs(&self) -> u64 {
        match &self.provider {
            KeyProviderConfig::Jwks { cache_ttl_secs, .. } => *cache_ttl_secs,
            KeyProviderConfig::Static => default_jwks_cache_ttl(),
        }
    }
}

/// Per-state provisioning timeouts (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Timeout, in seconds, for each active (non-terminal) state.
    #[serde(default = "default_step_timeouts")]
    pub step_timeout_secs: HashMap<String, u64>,
    /// How often the stale-job sweeper runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl ProvisioningConfig {
    /// Timeout for a given state name, or the crate-wide default if unconfigured.
    pub fn timeout_for(&self, state: &str) -> Duration {
        let secs = self
            .step_timeout_secs
            .get(state)
            .copied()
            .unwrap_or(default_step_timeout_fallback());
        Duration::from_secs(secs)
    }

    /// Sweep cadence as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeouts(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Proxy security boundary configuration (§4.8, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Header name the server-managed bearer token is injected under.
    #[serde(default = "default_upstream_bearer_header")]
    pub upstream_bearer_header: String,
    /// Additional inbound headers to strip, beyond the built-in deny-list.
    #[serde(default)]
    pub extra_strip_headers: Vec<String>,
    /// Maximum concurrent SSE/WS streams per workspace.
    #[serde(default = "default_stream_limit")]
    pub stream_limit_per_workspace: usize,
    /// Upstream connect/request timeout.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
}

/// Share-link configuration (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharingConfig {
    /// Expiry applied when the caller doesn't specify one.
    #[serde(default = "default_share_expiry_hours")]
    pub default_expiry_hours: i64,
    /// Hard ceiling on requested expiry.
    #[serde(default = "default_share_max_expiry_hours")]
    pub max_expiry_hours: i64,
    /// Number of leading token characters kept in audit/log redaction.
    #[serde(default = "default_redact_prefix_len")]
    pub redact_prefix_len: usize,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            default_expiry_hours: default_share_expiry_hours(),
            max_expiry_hours: default_share_max_expiry_hours(),
            redact_prefix_len: default_redact_prefix_len(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (`redis://host:port` or cluster URLs).
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,
    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

/// OpenTelemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtlpConfig {
    /// OTLP endpoint URL.
    pub endpoint: String,
    /// Service name for tracing.
    #[serde(default)]
    pub service_name: Option<String>,
    /// Enable tracing export.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Ambient HTTP middleware configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Request tracking configuration (request IDs, header propagation).
    #[serde(default)]
    pub request_tracking: RequestTrackingConfig,
    /// HTTP metrics configuration (OpenTelemetry).
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
    /// Request body size limit in MB.
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
    /// Enable panic recovery middleware.
    #[serde(default = "default_true")]
    pub catch_panic: bool,
    /// Enable response compression.
    #[serde(default = "default_true")]
    pub compression: bool,
    /// CORS mode (`permissive` or `restrictive`).
    #[serde(default = "default_cors_mode")]
    pub cors_mode: String,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            request_tracking: RequestTrackingConfig::default(),
            metrics: None,
            body_limit_mb: default_body_limit_mb(),
            catch_panic: true,
            compression: true,
            cors_mode: default_cors_mode(),
        }
    }
}

/// Request tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrackingConfig {
    /// Enable request ID generation.
    #[serde(default = "default_true")]
    pub request_id_enabled: bool,
    /// Request ID header name.
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
    /// Enable header propagation to downstream/upstream hops.
    #[serde(default = "default_true")]
    pub propagate_headers: bool,
}

impl Default for RequestTrackingConfig {
    fn default() -> Self {
        Self {
            request_id_enabled: true,
            request_id_header: default_request_id_header(),
            propagate_headers: true,
        }
    }
}

/// HTTP metrics configuration (OpenTelemetry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics collection.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Histogram buckets for latency (in milliseconds).
    #[serde(default = "default_latency_buckets")]
    pub latency_buckets_ms: Vec<f64>,
}

impl MetricsConfig {
    /// Latency buckets converted to `Duration`.
    pub fn latency_buckets_as_duration(&self) -> Vec<Duration> {
        self.latency_buckets_ms
            .iter()
            .map(|&ms| Duration::from_millis(ms as u64))
            .collect()
    }
}

// ---- default value functions ----

fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_environment() -> String {
    "dev".to_string()
}
fn default_clock_skew() -> u64 {
    30
}
fn default_jwks_cache_ttl() -> u64 {
    300
}
fn default_jwks_fetch_timeout() -> u64 {
    5
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_upstream_bearer_header() -> String {
    "X-Sprite-Bearer".to_string()
}
fn default_stream_limit() -> usize {
    4
}
fn default_upstream_timeout() -> u64 {
    30
}
fn default_share_expiry_hours() -> i64 {
    72
}
fn default_share_max_expiry_hours() -> i64 {
    24 * 30
}
fn default_redact_prefix_len() -> usize {
    6
}
fn default_max_connections() -> u32 {
    50
}
fn default_min_connections() -> u32 {
    5
}
fn default_connection_timeout() -> u64 {
    10
}
fn default_redis_max_connections() -> usize {
    20
}
fn default_true() -> bool {
    true
}
fn default_body_limit_mb() -> usize {
    10
}
fn default_cors_mode() -> String {
    "permissive".to_string()
}
fn default_request_id_header() -> String {
    "x-request-id".to_string()
}
fn default_latency_buckets() -> Vec<f64> {
    vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
}

/// Default timeout, in seconds, for every state-machine state the provisioning
/// config doesn't name explicitly.
fn default_step_timeout_fallback() -> u64 {
    60
}

fn default_step_timeouts() -> HashMap<String, u64> {
    let mut map = HashMap::new();
    map.insert("resolving_release".to_string(), 30);
    map.insert("creating_sandbox".to_string(), 60);
    map.insert("uploading_artifact".to_string(), 120);
    map.insert("verifying_checksum".to_string(), 30);
    map.insert("starting_runtime".to_string(), 60);
    map
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Searches for config files in this order (first found wins, `ENV` always wins over all):
    /// 1. Current working directory: `./config.toml`
    /// 2. XDG config directory: `~/.config/control-plane-core/{service_name}/config.toml`
    /// 3. System directory: `/etc/control-plane-core/{service_name}/config.toml`
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "control-plane-core".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name.
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        let mut figment = Figment::new();

        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("CPCORE_").split("__"));

        let config: Config = figment.extract().map_err(|e| Error::Config(Box::new(e)))?;
        Ok(config)
    }

    /// Load configuration from a specific file, bypassing XDG directories.
    /// Useful for tests or non-standard deployments.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CPCORE_").split("__"))
            .extract()
            .map_err(|e| Error::Config(Box::new(e)))?;
        Ok(config)
    }

    /// Extend a base `Config` value with file/env overrides — handy in tests that start
    /// from a programmatically built default and only want to layer environment overrides.
    pub fn load_with_defaults(defaults: &Config) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(defaults))
            .merge(Env::prefixed("CPCORE_").split("__"))
            .extract()
            .map_err(|e| Error::Config(Box::new(e)))?;
        Ok(config)
    }

    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        paths.push(PathBuf::from("config.toml"));

        let xdg_dirs = xdg::BaseDirectories::with_prefix("control-plane-core");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/control-plane-core")
                .join(service_name)
                .join("config.toml"),
        );
        paths
    }

    /// Database URL, if a database backend is configured.
    pub fn database_url(&self) -> Option<&str> {
        self.database.as_ref().map(|db| db.url.as_str())
    }

    /// Redis URL, if a cache backend is configured.
    pub fn redis_url(&self) -> Option<&str> {
        self.redis.as_ref().map(|r| r.url.as_str())
    }
}

/// Minimum length enforced on secret values that double as cryptographic keys (§6, §9).
const MIN_SECRET_LEN: usize = 32;

/// A secret value. `Debug` and `Display` never print the contents — any accidental
/// string interpolation in a log line is safe by construction (§9 "Secrets").
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a raw string as a secret.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret's contents. Named loudly so call sites are greppable.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Number of bytes in the secret, for length validation without exposing content.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString(<redacted, {} bytes>)", self.0.len())
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

/// The secrets-loading surface (§9 "Secrets", grounded on
/// `security/secret_config.py::ModalSecretSpec`/`validate_secret_environment`).
///
/// Required fields that are missing at startup abort with one error enumerating
/// every missing name, never a single first-failure.
#[derive(Clone)]
pub struct Secrets {
    /// Session cookie signing secret.
    pub session_signing_key: SecretString,
    /// Per-upstream bearer token injected into proxied requests (§4.8).
    pub upstream_bearer_token: SecretString,
    /// Static HS256 verification key, required only when `TokenConfig::provider` is `Static`.
    pub jwt_static_key: Option<SecretString>,
}

struct SecretSpec {
    name: &'static str,
    env_var: &'static str,
    required: bool,
}

impl Secrets {
    const SPECS: &'static [SecretSpec] = &[
        SecretSpec { name: "session_signing_key", env_var: "CPCORE_SESSION_SIGNING_KEY", required: true },
        SecretSpec { name: "upstream_bearer_token", env_var: "CPCORE_UPSTREAM_BEARER_TOKEN", required: true },
        SecretSpec { name: "jwt_static_key", env_var: "CPCORE_JWT_STATIC_KEY", required: false },
    ];

    /// Load every secret from its environment variable, collecting every missing
    /// required name into one error rather than failing on the first.
    pub fn load_from_env() -> Result<Self> {
        let mut missing = Vec::new();
        let mut values: HashMap<&'static str, Option<String>> = HashMap::new();

        for spec in Self::SPECS {
            match std::env::var(spec.env_var) {
                Ok(v) if !v.is_empty() => {
                    values.insert(spec.name, Some(v));
                }
                _ if spec.required => missing.push(spec.name.to_string()),
                _ => {
                    values.insert(spec.name, None);
                }
            }
        }

        if !missing.is_empty() {
            return Err(Error::MissingSecrets(missing));
        }

        let session_signing_key = SecretString::new(values.remove("session_signing_key").flatten().unwrap());
        let upstream_bearer_token = SecretString::new(values.remove("upstream_bearer_token").flatten().unwrap());
        let jwt_static_key = values.remove("jwt_static_key").flatten().map(SecretString::new);

        let secrets = Self { session_signing_key, upstream_bearer_token, jwt_static_key };
        secrets.validate_lengths()?;
        Ok(secrets)
    }

    fn validate_lengths(&self) -> Result<()> {
        let mut invalid = Vec::new();
        if self.session_signing_key.len() < MIN_SECRET_LEN {
            invalid.push("session_signing_key".to_string());
        }
        if self.upstream_bearer_token.len() < MIN_SECRET_LEN {
            invalid.push("upstream_bearer_token".to_string());
        }
        if !invalid.is_empty() {
            return Err(Error::Validation(format!(
                "secrets shorter than {MIN_SECRET_LEN} bytes: {invalid:?}"
            )));
        }
        Ok(())
    }

    /// Scan an arbitrary string for the values of every configured secret.
    ///
    /// Grounded on `security/secret_config.py::check_no_secret_leakage`; used as a
    /// defense-in-depth double-check by the proxy boundary and share-link audit
    /// redaction paths, per §6's "known secret values must never appear in any
    /// outbound response or log line."
    pub fn leaked_in(&self, haystack: &str) -> Vec<&'static str> {
        let mut leaked = Vec::new();
        if !self.session_signing_key.is_empty() && haystack.contains(self.session_signing_key.expose_secret()) {
            leaked.push("session_signing_key");
        }
        if !self.upstream_bearer_token.is_empty() && haystack.contains(self.upstream_bearer_token.expose_secret()) {
            leaked.push("upstream_bearer_token");
        }
        if let Some(ref key) = self.jwt_static_key {
            if haystack.contains(key.expose_secret()) {
                leaked.push("jwt_static_key");
            }
        }
        leaked
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "control-plane-core".to_string(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
            },
            identity: IdentityConfig::default(),
            session: crate::session::SessionConfig::default(),
            token: TokenConfig {
                provider: KeyProviderConfig::Static,
                audience: "control-plane".to_string(),
                clock_skew_secs: default_clock_skew(),
                jwks_fetch_timeout_secs: default_jwks_fetch_timeout(),
            },
            provisioning: ProvisioningConfig::default(),
            proxy: ProxyConfig {
                upstream_bearer_header: default_upstream_bearer_header(),
                extra_strip_headers: Vec::new(),
                stream_limit_per_workspace: default_stream_limit(),
                upstream_timeout_secs: default_upstream_timeout(),
            },
            sharing: SharingConfig::default(),
            middleware: MiddlewareConfig::default(),
            database: None,
            redis: None,
            otlp: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_ports_and_timeouts() {
        let config = Config::default();
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.provisioning.sweep_interval_secs, 30);
        assert_eq!(config.token.jwks_cache_ttl_secs(), 300);
    }

    #[test]
    fn missing_required_secrets_are_all_reported_together() {
        std::env::remove_var("CPCORE_SESSION_SIGNING_KEY");
        std::env::remove_var("CPCORE_UPSTREAM_BEARER_TOKEN");
        let err = Secrets::load_from_env().unwrap_err();
        match err {
            Error::MissingSecrets(names) => {
                assert!(names.contains(&"session_signing_key".to_string()));
                assert!(names.contains(&"upstream_bearer_token".to_string()));
            }
            other => panic!("expected MissingSecrets, got {other:?}"),
        }
    }

    #[test]
    fn secret_debug_never_prints_value() {
        let secret = SecretString::new("super-secret-value");
        let debugged = format!("{secret:?}");
        assert!(!debugged.contains("super-secret-value"));
    }
}
