//! Application state shared across handlers.
//!
//! Unlike the ambient framework this crate started from, `Config` here is a
//! fixed domain type (no generic custom-config parameter) — every field
//! `AppState` needs is already named in [`crate::config::Config`].

use std::sync::Arc;

use dashmap::DashMap;
#[cfg(any(feature = "database", feature = "cache"))]
use tokio::sync::RwLock;

#[cfg(feature = "database")]
use sqlx::PgPool;

#[cfg(feature = "cache")]
use deadpool_redis::Pool as RedisPool;

use crate::audit::AuditEmitter;
use crate::config::{Config, Secrets};
use crate::error::Result;
use crate::ids::WorkspaceId;
use crate::identity::KeyProvider;
use crate::provisioning::ProvisioningJobRepository;
use crate::routing::StreamRegistry;
use crate::sharing::ShareLinkRepository;
use crate::workspaces::{MemberRepository, WorkspaceRepository};

/// Application state shared across handlers.
///
/// Repository fields are trait objects so a binary can wire either the
/// in-memory or the `sqlx` implementation at startup without the rest of
/// the crate caring which one is active.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    secrets: Arc<Secrets>,

    workspaces: Arc<dyn WorkspaceRepository>,
    members: Arc<dyn MemberRepository>,
    jobs: Arc<dyn ProvisioningJobRepository>,
    shares: Arc<dyn ShareLinkRepository>,
    audit: Arc<dyn AuditEmitter>,
    key_provider: Arc<dyn KeyProvider>,

    /// Per-workspace coarse locks backing the single-active-job invariant
    /// for the in-memory store, and a convenient place to hang other
    /// per-workspace serialization needs (§5, §9 "Concurrency primitives").
    workspace_locks: Arc<DashMap<WorkspaceId, Arc<tokio::sync::Mutex<()>>>>,

    streams: Arc<StreamRegistry>,

    #[cfg(feature = "database")]
    db_pool: Arc<RwLock<Option<PgPool>>>,

    #[cfg(feature = "cache")]
    redis_pool: Arc<RwLock<Option<RedisPool>>>,
}

impl AppState {
    /// Build state directly from already-constructed collaborators. Prefer
    /// [`AppStateBuilder`] in application code; this is the low-level
    /// constructor tests use to wire in-memory fakes.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        secrets: Secrets,
        workspaces: Arc<dyn WorkspaceRepository>,
        members: Arc<dyn MemberRepository>,
        jobs: Arc<dyn ProvisioningJobRepository>,
        shares: Arc<dyn ShareLinkRepository>,
        audit: Arc<dyn AuditEmitter>,
        key_provider: Arc<dyn KeyProvider>,
    ) -> Self {
        let stream_limit = config.proxy.stream_limit_per_workspace;
        Self {
            config: Arc::new(config),
            secrets: Arc::new(secrets),
            workspaces,
            members,
            jobs,
            shares,
            audit,
            key_provider,
            workspace_locks: Arc::new(DashMap::new()),
            streams: Arc::new(StreamRegistry::new(stream_limit)),
            #[cfg(feature = "database")]
            db_pool: Arc::new(RwLock::new(None)),
            #[cfg(feature = "cache")]
            redis_pool: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a builder.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// The loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The loaded secrets surface.
    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    /// Workspace repository.
    pub fn workspaces(&self) -> &Arc<dyn WorkspaceRepository> {
        &self.workspaces
    }

    /// Member repository.
    pub fn members(&self) -> &Arc<dyn MemberRepository> {
        &self.members
    }

    /// Provisioning job repository.
    pub fn jobs(&self) -> &Arc<dyn ProvisioningJobRepository> {
        &self.jobs
    }

    /// Share-link repository.
    pub fn shares(&self) -> &Arc<dyn ShareLinkRepository> {
        &self.shares
    }

    /// Audit event emitter.
    pub fn audit(&self) -> &Arc<dyn AuditEmitter> {
        &self.audit
    }

    /// Token-verification key provider.
    pub fn key_provider(&self) -> &Arc<dyn KeyProvider> {
        &self.key_provider
    }

    /// The per-workspace stream registry (§4.9).
    pub fn streams(&self) -> &Arc<StreamRegistry> {
        &self.streams
    }

    /// Acquire (creating if absent) the coarse per-workspace lock used to
    /// serialize provisioning mutations (§5, §9).
    pub fn workspace_lock(&self, workspace_id: &WorkspaceId) -> Arc<tokio::sync::Mutex<()>> {
        self.workspace_locks
            .entry(workspace_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// The database pool, if configured and connected.
    #[cfg(feature = "database")]
    pub async fn db(&self) -> Option<PgPool> {
        self.db_pool.read().await.clone()
    }

    /// The Redis pool, if configured and connected.
    #[cfg(feature = "cache")]
    pub async fn redis(&self) -> Option<RedisPool> {
        self.redis_pool.read().await.clone()
    }

    /// Pool health summary across configured backends.
    pub async fn pool_health(&self) -> crate::pool_health::PoolHealthSummary {
        let mut summary = crate::pool_health::PoolHealthSummary::new();

        #[cfg(feature = "database")]
        if let Some(pool) = self.db().await {
            if let Some(db_config) = &self.config.database {
                summary.database = Some(crate::pool_health::DatabasePoolHealth::from_pool(&pool, db_config));
            }
        }

        #[cfg(feature = "cache")]
        if let Some(pool) = self.redis().await {
            if let Some(redis_config) = &self.config.redis {
                summary.redis = Some(crate::pool_health::RedisPoolHealth::from_pool(&pool, redis_config));
            }
        }

        summary.healthy = summary.is_healthy();
        summary
    }
}

/// Builder for [`AppState`]. Connection pools are established eagerly; callers
/// that want lazy/background connection should construct the pool themselves
/// and pass it in via `db_pool`/`redis_pool`.
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Config>,
    secrets: Option<Secrets>,
    workspaces: Option<Arc<dyn WorkspaceRepository>>,
    members: Option<Arc<dyn MemberRepository>>,
    jobs: Option<Arc<dyn ProvisioningJobRepository>>,
    shares: Option<Arc<dyn ShareLinkRepository>>,
    audit: Option<Arc<dyn AuditEmitter>>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    #[cfg(feature = "database")]
    db_pool: Option<PgPool>,
    #[cfg(feature = "cache")]
    redis_pool: Option<RedisPool>,
}

impl AppStateBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the secrets surface.
    pub fn secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Set the workspace repository.
    pub fn workspaces(mut self, repo: Arc<dyn WorkspaceRepository>) -> Self {
        self.workspaces = Some(repo);
        self
    }

    /// Set the member repository.
    pub fn members(mut self, repo: Arc<dyn MemberRepository>) -> Self {
        self.members = Some(repo);
        self
    }

    /// Set the provisioning job repository.
    pub fn jobs(mut self, repo: Arc<dyn ProvisioningJobRepository>) -> Self {
        self.jobs = Some(repo);
        self
    }

    /// Set the share-link repository.
    pub fn shares(mut self, repo: Arc<dyn ShareLinkRepository>) -> Self {
        self.shares = Some(repo);
        self
    }

    /// Set the audit emitter.
    pub fn audit(mut self, emitter: Arc<dyn AuditEmitter>) -> Self {
        self.audit = Some(emitter);
        self
    }

    /// Set the token-verification key provider.
    pub fn key_provider(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    /// Set an already-connected database pool.
    #[cfg(feature = "database")]
    pub fn db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Set an already-connected Redis pool.
    #[cfg(feature = "cache")]
    pub fn redis_pool(mut self, pool: RedisPool) -> Self {
        self.redis_pool = Some(pool);
        self
    }

    /// Build the `AppState`. Every repository/emitter/provider field is
    /// required — there is no implicit in-memory fallback in production
    /// code; tests construct fakes explicitly via each module's
    /// `InMemory*` type.
    pub fn build(self) -> Result<AppState> {
        let config = self.config.unwrap_or_default();
        let stream_limit = config.proxy.stream_limit_per_workspace;

        let workspaces = self.workspaces.ok_or_else(|| {
            crate::error::Error::Internal("AppStateBuilder: workspaces repository not set".into())
        })?;
        let members = self.members.ok_or_else(|| {
            crate::error::Error::Internal("AppStateBuilder: members repository not set".into())
        })?;
        let jobs = self
            .jobs
            .ok_or_else(|| crate::error::Error::Internal("AppStateBuilder: jobs repository not set".into()))?;
        let shares = self.shares.ok_or_else(|| {
            crate::error::Error::Internal("AppStateBuilder: shares repository not set".into())
        })?;
        let audit = self
            .audit
            .ok_or_else(|| crate::error::Error::Internal("AppStateBuilder: audit emitter not set".into()))?;
        let key_provider = self.key_provider.ok_or_else(|| {
            crate::error::Error::Internal("AppStateBuilder: key provider not set".into())
        })?;
        let secrets = self
            .secrets
            .ok_or_else(|| crate::error::Error::Internal("AppStateBuilder: secrets not set".into()))?;

        Ok(AppState {
            config: Arc::new(config),
            secrets: Arc::new(secrets),
            workspaces,
            members,
            jobs,
            shares,
            audit,
            key_provider,
            workspace_locks: Arc::new(DashMap::new()),
            streams: Arc::new(StreamRegistry::new(stream_limit)),
            #[cfg(feature = "database")]
            db_pool: Arc::new(RwLock::new(self.db_pool)),
            #[cfg(feature = "cache")]
            redis_pool: Arc::new(RwLock::new(self.redis_pool)),
        })
    }
}
