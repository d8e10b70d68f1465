//! Route ownership & dispatch (§4.4), the proxy security boundary (§4.8),
//! and stream lifecycle tracking (§4.9).

mod app_context;
mod dispatcher;
mod proxy_security;
mod stream_registry;

pub use app_context::enforce_app_context;
pub use dispatcher::{workspace_context, Plane, RouteMatch, WorkspaceContext, WorkspaceContextSource};
pub use proxy_security::{redact_response_headers, sanitize_proxy_headers};
pub use stream_registry::{StreamRegistry, StreamSession, StreamState};
