//! # control-plane-core
//!
//! Multi-tenant workspace orchestration control plane: identity, provisioning,
//! sharing, and proxy security as a library. Authenticates users, manages
//! workspaces and memberships, drives per-workspace runtime provisioning
//! through a deterministic state machine, and secures browser traffic
//! proxied to per-workspace sandbox runtimes — while preserving strict
//! cross-tenant isolation.
//!
//! ## Example
//!
//! ```rust,no_run
//! use control_plane_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let app = Router::new()
//!         .route("/health", get(health))
//!         .route("/ready", get(readiness));
//!
//!     Server::new(config).serve(app).await?;
//!
//!     Ok(())
//! }
//! ```

// Ensure database and turso features are mutually exclusive
#[cfg(all(feature = "database", feature = "turso"))]
compile_error!(
    "Features `database` (PostgreSQL) and `turso` (libsql) are mutually exclusive. \
     Enable only one database backend."
);

pub mod config;
pub mod error;
pub mod ids;
pub mod middleware;
pub mod health;
pub mod pool_health;
pub mod responses;
pub mod server;
pub mod state;

// Identity & session layer (§4.1-§4.3), route dispatch / proxy security /
// stream registry (§4.4, §4.8, §4.9), audit logging (§4.10's redaction
// hooks), and the domain modules (§4.6, §4.7, §4.10, §4.11) are all part of
// the control plane's core and compiled unconditionally.
pub mod audit;
pub mod identity;
pub mod provisioning;
pub mod routing;
pub mod sharing;
pub mod workspaces;

#[cfg(feature = "database")]
pub mod database;

pub mod observability;

#[cfg(feature = "session")]
pub mod session;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, Secrets};

    pub use crate::error::{Error, Result};
    pub use crate::health::{health, pool_metrics, readiness};
    pub use crate::ids::{
        AuditEventId, JobId, MakeTypedRequestId, MemberId, RequestId, SessionId, ShareId,
        WorkspaceId,
    };
    pub use crate::pool_health::PoolHealthSummary;

    #[cfg(feature = "database")]
    pub use crate::pool_health::DatabasePoolHealth;

    #[cfg(feature = "cache")]
    pub use crate::pool_health::RedisPoolHealth;

    pub use crate::middleware::{
        normalize_path, request_id_layer, request_id_propagation_layer,
        request_id_scope_middleware, sensitive_headers_layer, Claims, CompiledRoutePatterns,
        RequestTrackingConfig, TokenValidator, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
    };

    pub use crate::server::Server;
    pub use crate::state::{AppState, AppStateBuilder};
    pub use crate::responses::{
        Accepted, Conflict, Created, FieldError, NoContent, Success, ValidationError,
    };

    #[cfg(feature = "otel-metrics")]
    pub use crate::middleware::{metric_labels, metric_names, MetricsConfig};

    pub use crate::observability::{current_request_id, with_request_id, REQUEST_ID};

    #[cfg(feature = "observability")]
    pub use crate::observability::init_tracing;

    // Identity & session layer
    pub use crate::identity::{
        extract_credential, resolve_host, AuthGuard, AuthIdentity, Credential, HostResolution,
        JwksKeyProvider, KeyProvider, SigningKey, StaticKeyProvider, TokenVerifier,
    };

    // Route dispatch, proxy security, stream registry
    pub use crate::routing::{
        enforce_app_context, redact_response_headers, sanitize_proxy_headers, workspace_context,
        Plane, RouteMatch, StreamRegistry, StreamSession, StreamState, WorkspaceContext,
        WorkspaceContextSource,
    };

    // Audit logging
    pub use crate::audit::{
        archive_events, verify_chain, AuditChain, AuditEmitter, AuditEvent, AuditEventKind,
        AuditSeverity, AuditSource, ChainVerificationError, ChainedAuditEmitter,
    };

    // Workspaces & membership
    pub use crate::workspaces::{
        InMemoryMemberRepository, InMemoryWorkspaceRepository, Member, MemberRepository,
        MemberRole, MemberStatus, Workspace, WorkspaceRepository, WorkspaceService,
        WorkspaceStatus,
    };

    #[cfg(feature = "database")]
    pub use crate::workspaces::{PgMemberRepository, PgWorkspaceRepository};

    // Provisioning
    pub use crate::provisioning::{
        compute_sha256, resolve_target, sandbox_name, verify_checksum, InMemoryProvisioningJobRepository,
        JobState, ProvisioningJob, ProvisioningJobRepository, ProvisioningJobService,
        ProvisioningTarget, ReleaseManifest, ReleaseResolver, StaleJobDetector, SweepReport,
        WorkspaceLocks,
    };

    #[cfg(feature = "database")]
    pub use crate::provisioning::PgProvisioningJobRepository;

    // Sharing
    pub use crate::sharing::{
        generate_token, hash_token, normalize_path as normalize_share_path, redact_token,
        redact_tokens_in_text, resolve_access, CreatedShareLink, InMemoryShareLinkRepository,
        ShareAccess, ShareLink, ShareLinkRepository, ShareLinkService,
    };

    #[cfg(feature = "database")]
    pub use crate::sharing::PgShareLinkRepository;

    #[cfg(feature = "session")]
    pub use crate::session::{
        csrf_middleware, CsrfConfig, CsrfLayer, CsrfMiddleware, CsrfToken, SessionAuth,
        SessionConfig, SessionData, SessionStorage, TypedSession,
    };

    #[cfg(feature = "session")]
    pub use tower_sessions::Session;

    // Re-export axum Html for non-templated HTML responses
    pub use axum::response::Html;

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Extension, Router,
    };

    pub use serde::{Deserialize, Serialize};

    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};

    pub use tokio;

    pub use async_trait::async_trait;

    pub use thiserror::Error;
    pub use anyhow::{self, Context as AnyhowContext};

    pub use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};

    pub use uuid::Uuid;

    pub use futures::{future, stream, Future, Stream, StreamExt, TryFutureExt, TryStreamExt};

    pub use http::{Method, Uri};
}
