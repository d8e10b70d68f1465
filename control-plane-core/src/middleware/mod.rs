//! Middleware modules for request identity, tracking, and token validation.

// Token abstraction layer (always available)
pub mod token;

pub mod request_tracking;
pub mod route_matcher;

#[cfg(feature = "otel-metrics")]
pub mod metrics;

// Token abstraction exports (always available)
pub use token::{Claims, TokenValidator};

// Other middleware exports
pub use route_matcher::{normalize_path, CompiledRoutePatterns};
pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, request_id_scope_middleware,
    sensitive_headers_layer, RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};

#[cfg(feature = "otel-metrics")]
pub use metrics::{MetricsConfig, metric_labels, metric_names};
