//! Health check handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{error::Error, state::AppState};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Readiness check response with dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    pub dependencies: HashMap<String, DependencyStatus>,
}

/// Individual dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Simple health check (liveness probe). Always 200 if the process is running.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: state.config().service.name.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check with dependency validation (readiness probe). 503 if any
/// configured dependency (database, redis) is unreachable.
pub async fn readiness(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let mut dependencies = HashMap::new();
    #[allow(unused_mut)]
    let mut all_ready = true;

    #[cfg(feature = "database")]
    if state.config().database.is_some() {
        match state.db().await {
            Some(pool) => match sqlx::query("SELECT 1").fetch_one(&pool).await {
                Ok(_) => {
                    dependencies.insert(
                        "database".to_string(),
                        DependencyStatus { healthy: true, message: Some("connected".to_string()) },
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "database health check failed");
                    all_ready = false;
                    dependencies.insert(
                        "database".to_string(),
                        DependencyStatus { healthy: false, message: Some(format!("query failed: {e}")) },
                    );
                }
            },
            None => {
                all_ready = false;
                dependencies.insert(
                    "database".to_string(),
                    DependencyStatus { healthy: false, message: Some("not connected".to_string()) },
                );
            }
        }
    }

    #[cfg(feature = "cache")]
    if state.config().redis.is_some() {
        match state.redis().await {
            Some(pool) => match pool.get().await {
                Ok(mut conn) => {
                    use std::ops::DerefMut;
                    match redis::cmd("PING").query_async::<String>(conn.deref_mut()).await {
                        Ok(_) => {
                            dependencies.insert(
                                "redis".to_string(),
                                DependencyStatus { healthy: true, message: Some("connected".to_string()) },
                            );
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "redis ping failed");
                            all_ready = false;
                            dependencies.insert(
                                "redis".to_string(),
                                DependencyStatus { healthy: false, message: Some(format!("ping failed: {e}")) },
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to acquire redis connection");
                    all_ready = false;
                    dependencies.insert(
                        "redis".to_string(),
                        DependencyStatus { healthy: false, message: Some(format!("pool error: {e}")) },
                    );
                }
            },
            None => {
                all_ready = false;
                dependencies.insert(
                    "redis".to_string(),
                    DependencyStatus { healthy: false, message: Some("not connected".to_string()) },
                );
            }
        }
    }

    let response = ReadinessResponse {
        ready: all_ready,
        service: state.config().service.name.clone(),
        dependencies,
    };

    let status = if all_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok((status, Json(response)))
}

/// Pool health metrics endpoint: database/redis pool state, for monitoring
/// and capacity planning.
pub async fn pool_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.pool_health().await;
    let status = if health.is_healthy() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            service: "test-service".to_string(),
            version: Some("1.0.0".to_string()),
        };

        assert_eq!(response.status, "healthy");
        assert_eq!(response.service, "test-service");
    }

    #[test]
    fn test_dependency_status() {
        let status = DependencyStatus { healthy: true, message: Some("OK".to_string()) };
        assert!(status.healthy);
        assert_eq!(status.message, Some("OK".to_string()));
    }
}
