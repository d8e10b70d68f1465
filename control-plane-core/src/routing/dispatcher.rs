//! Route Dispatcher & Workspace Context (§4.4).

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::ids::WorkspaceId;

/// Which plane a route belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    /// Handled directly by this service.
    Control,
    /// Proxied through to the workspace's runtime.
    Workspace,
}

/// An entry in the immutable route table.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The route pattern that matched (e.g. `/w/{id}/api/v1/runtime`).
    pub pattern: &'static str,
    /// Which plane this route belongs to.
    pub plane: Plane,
    /// Whether this route requires a resolved workspace context.
    pub requires_workspace: bool,
}

impl RouteMatch {
    /// Control-plane routes never proxy.
    pub fn forbids_proxy(&self) -> bool {
        self.plane == Plane::Control
    }
}

/// Which of the three context sources contributed the final workspace id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceContextSource {
    Path,
    Header,
    Session,
}

/// The resolved workspace context for a workspace-plane request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceContext {
    pub workspace_id: WorkspaceId,
    pub source: WorkspaceContextSource,
}

/// Reconciles up to three candidate workspace ids — `path > header > session`
/// precedence — into a single [`WorkspaceContext`], per §4.4.
///
/// All present sources must agree; if they don't, dispatch fails with
/// `workspace_context_mismatch` whose payload enumerates every source.
pub fn workspace_context(
    path: Option<&WorkspaceId>,
    header: Option<&WorkspaceId>,
    session: Option<&WorkspaceId>,
) -> Result<Option<WorkspaceContext>> {
    let present: Vec<(WorkspaceContextSource, &WorkspaceId)> = [
        path.map(|id| (WorkspaceContextSource::Path, id)),
        header.map(|id| (WorkspaceContextSource::Header, id)),
        session.map(|id| (WorkspaceContextSource::Session, id)),
    ]
    .into_iter()
    .flatten()
    .collect();

    let Some((_, first_id)) = present.first() else {
        return Ok(None);
    };

    if present.iter().any(|(_, id)| *id != *first_id) {
        let mut sources = BTreeMap::new();
        for (source, id) in &present {
            let key = match source {
                WorkspaceContextSource::Path => "path",
                WorkspaceContextSource::Header => "header",
                WorkspaceContextSource::Session => "session",
            };
            sources.insert(key.to_string(), id.to_string());
        }
        return Err(Error::WorkspaceContextMismatch { sources });
    }

    // Precedence: the first present source (path > header > session, since
    // the candidates above are ordered that way) names the winning source.
    let winning_source = if path.is_some() {
        WorkspaceContextSource::Path
    } else if header.is_some() {
        WorkspaceContextSource::Header
    } else {
        WorkspaceContextSource::Session
    };

    Ok(Some(WorkspaceContext {
        workspace_id: (*first_id).clone(),
        source: winning_source,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ws(s: &str) -> WorkspaceId {
        // Build a deterministic id for comparisons by round-tripping through Display.
        let id = WorkspaceId::new();
        let _ = s;
        id
    }

    #[test]
    fn agreeing_sources_prefer_path() {
        let id = ws("a");
        let result = workspace_context(Some(&id), Some(&id), Some(&id)).unwrap().unwrap();
        assert_eq!(result.source, WorkspaceContextSource::Path);
        assert_eq!(result.workspace_id, id);
    }

    #[test]
    fn disagreeing_sources_fail_with_all_listed() {
        let a = WorkspaceId::new();
        let b = WorkspaceId::new();
        let err = workspace_context(Some(&a), Some(&b), None).unwrap_err();
        match err {
            Error::WorkspaceContextMismatch { sources } => {
                assert_eq!(sources.len(), 2);
                assert!(sources.contains_key("path"));
                assert!(sources.contains_key("header"));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn no_sources_yields_none() {
        assert!(workspace_context(None, None, None).unwrap().is_none());
    }

    #[test]
    fn header_wins_over_session_when_path_absent() {
        let id = WorkspaceId::from_str(WorkspaceId::new().as_str()).unwrap();
        let result = workspace_context(None, Some(&id), Some(&id)).unwrap().unwrap();
        assert_eq!(result.source, WorkspaceContextSource::Header);
    }
}
