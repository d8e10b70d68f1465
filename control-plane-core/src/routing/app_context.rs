//! App-context enforcement middleware logic (§4.4).

use crate::error::{Error, Result};

/// Compares the host-resolved `app_id` against a workspace's stored
/// `app_id`. A no-op when either side is absent (non-workspace route, or
/// an unresolved host).
pub fn enforce_app_context(host_app_id: Option<&str>, workspace_app_id: Option<&str>) -> Result<()> {
    match (host_app_id, workspace_app_id) {
        (Some(host), Some(workspace)) if host != workspace => Err(Error::AppContextMismatch {
            host_app_id: host.to_string(),
            workspace_app_id: workspace.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_app_ids_pass() {
        assert!(enforce_app_context(Some("boring-ui"), Some("boring-ui")).is_ok());
    }

    #[test]
    fn mismatched_app_ids_fail() {
        let err = enforce_app_context(Some("boring-ui"), Some("other-app")).unwrap_err();
        assert!(matches!(err, Error::AppContextMismatch { .. }));
    }

    #[test]
    fn absent_either_side_is_noop() {
        assert!(enforce_app_context(None, Some("boring-ui")).is_ok());
        assert!(enforce_app_context(Some("boring-ui"), None).is_ok());
        assert!(enforce_app_context(None, None).is_ok());
    }
}
