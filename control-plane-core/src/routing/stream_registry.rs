//! Stream Lifecycle (§4.9): tracks SSE/WebSocket proxy sessions per
//! workspace and enforces a concurrent-stream cap.
//!
//! Grounded on the same `DashMap` + `CancellationToken` shape the teacher
//! uses to track background tasks (`agents::background_worker::TaskInfo`),
//! applied here to one entry per live proxy stream instead of one per
//! spawned task.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::ids::WorkspaceId;

/// Lifecycle state of a tracked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Registered,
    Active,
    Closing,
    Closed,
}

/// A single tracked proxy stream (SSE or WebSocket).
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub stream_id: String,
    pub workspace_id: WorkspaceId,
    state: Arc<std::sync::Mutex<StreamState>>,
    cancellation: CancellationToken,
}

impl StreamSession {
    pub fn state(&self) -> StreamState {
        *self.state.lock().expect("stream state mutex poisoned")
    }

    fn set_state(&self, state: StreamState) {
        *self.state.lock().expect("stream state mutex poisoned") = state;
    }

    /// Token a handler should select on to know when the stream has been
    /// asked to close (workspace lock contention, shutdown, or explicit close).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn mark_active(&self) {
        self.set_state(StreamState::Active);
    }
}

/// Tracks live proxy streams per workspace and rejects new registrations
/// once a workspace is at its concurrent-stream cap.
pub struct StreamRegistry {
    limit_per_workspace: usize,
    by_workspace: DashMap<WorkspaceId, Vec<StreamSession>>,
}

impl StreamRegistry {
    pub fn new(limit_per_workspace: usize) -> Self {
        Self {
            limit_per_workspace,
            by_workspace: DashMap::new(),
        }
    }

    /// Registers a new stream for `workspace_id`, or fails with
    /// `stream_limit_exceeded` if the workspace is already at capacity.
    /// Closed entries from prior streams are pruned first so the cap tracks
    /// genuinely live streams, not historical ones.
    pub fn register(&self, workspace_id: WorkspaceId, stream_id: impl Into<String>) -> Result<StreamSession> {
        let mut entry = self.by_workspace.entry(workspace_id.clone()).or_default();
        entry.retain(|s| s.state() != StreamState::Closed);

        if entry.len() >= self.limit_per_workspace {
            return Err(Error::StreamLimitExceeded);
        }

        let session = StreamSession {
            stream_id: stream_id.into(),
            workspace_id,
            state: Arc::new(std::sync::Mutex::new(StreamState::Registered)),
            cancellation: CancellationToken::new(),
        };
        entry.push(session.clone());
        Ok(session)
    }

    /// Marks a stream as closing and requests cancellation of its handler.
    pub fn begin_close(&self, workspace_id: &WorkspaceId, stream_id: &str) {
        if let Some(entry) = self.by_workspace.get(workspace_id) {
            if let Some(session) = entry.iter().find(|s| s.stream_id == stream_id) {
                session.set_state(StreamState::Closing);
                session.cancellation.cancel();
            }
        }
    }

    /// Marks a stream fully closed and prunes it from the registry.
    pub fn close(&self, workspace_id: &WorkspaceId, stream_id: &str) {
        if let Some(mut entry) = self.by_workspace.get_mut(workspace_id) {
            if let Some(session) = entry.iter().find(|s| s.stream_id == stream_id) {
                session.set_state(StreamState::Closed);
            }
            entry.retain(|s| s.state() != StreamState::Closed);
        }
    }

    /// Cancels every tracked stream for a workspace, used when a workspace
    /// is torn down or re-provisioned.
    pub fn cancel_all(&self, workspace_id: &WorkspaceId) {
        if let Some(entry) = self.by_workspace.get(workspace_id) {
            for session in entry.iter() {
                session.set_state(StreamState::Closing);
                session.cancellation.cancel();
            }
        }
    }

    pub fn active_count(&self, workspace_id: &WorkspaceId) -> usize {
        self.by_workspace
            .get(workspace_id)
            .map(|entry| entry.iter().filter(|s| s.state() != StreamState::Closed).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_up_to_the_limit_then_rejects() {
        let registry = StreamRegistry::new(2);
        let workspace_id = WorkspaceId::new();

        registry.register(workspace_id.clone(), "s1").unwrap();
        registry.register(workspace_id.clone(), "s2").unwrap();

        let err = registry.register(workspace_id.clone(), "s3").unwrap_err();
        assert!(matches!(err, Error::StreamLimitExceeded));
        assert_eq!(registry.active_count(&workspace_id), 2);
    }

    #[test]
    fn closed_streams_free_up_capacity() {
        let registry = StreamRegistry::new(1);
        let workspace_id = WorkspaceId::new();

        registry.register(workspace_id.clone(), "s1").unwrap();
        registry.close(&workspace_id, "s1");

        assert_eq!(registry.active_count(&workspace_id), 0);
        assert!(registry.register(workspace_id.clone(), "s2").is_ok());
    }

    #[test]
    fn begin_close_cancels_the_session_token() {
        let registry = StreamRegistry::new(4);
        let workspace_id = WorkspaceId::new();
        let session = registry.register(workspace_id.clone(), "s1").unwrap();
        let token = session.cancellation_token();

        assert!(!token.is_cancelled());
        registry.begin_close(&workspace_id, "s1");
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_all_cancels_every_stream_for_the_workspace() {
        let registry = StreamRegistry::new(4);
        let workspace_id = WorkspaceId::new();
        let a = registry.register(workspace_id.clone(), "a").unwrap();
        let b = registry.register(workspace_id.clone(), "b").unwrap();

        registry.cancel_all(&workspace_id);

        assert!(a.cancellation_token().is_cancelled());
        assert!(b.cancellation_token().is_cancelled());
    }

    #[test]
    fn workspaces_have_independent_caps() {
        let registry = StreamRegistry::new(1);
        let a = WorkspaceId::new();
        let b = WorkspaceId::new();

        registry.register(a, "s1").unwrap();
        assert!(registry.register(b, "s1").is_ok());
    }
}
