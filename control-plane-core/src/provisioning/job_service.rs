//! Provisioning job lifecycle, wrapping the state machine with the
//! durability and concurrency guarantees of §4.6.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ids::{JobId, WorkspaceId};

use super::repository::ProvisioningJobRepository;
use super::state_machine::ProvisioningJob;

/// Coarse per-workspace mutual exclusion, satisfied by
/// [`crate::state::AppState::workspace_lock`]. Kept as a trait so the
/// service can be unit tested without pulling in `AppState`.
#[async_trait::async_trait]
pub trait WorkspaceLocks: Send + Sync {
    async fn lock(&self, workspace_id: &WorkspaceId) -> Arc<tokio::sync::Mutex<()>>;
}

/// Provisioning job operations: idempotent creation, single-active-job
/// enforcement, and retry.
pub struct ProvisioningJobService {
    jobs: Arc<dyn ProvisioningJobRepository>,
    locks: Arc<dyn WorkspaceLocks>,
}

impl ProvisioningJobService {
    pub fn new(jobs: Arc<dyn ProvisioningJobRepository>, locks: Arc<dyn WorkspaceLocks>) -> Self {
        Self { jobs, locks }
    }

    /// Create a job for `workspace_id`. With an `idempotency_key`, repeated
    /// calls return the same persisted job (terminal or not). Without one,
    /// concurrent callers for the same workspace race for a single `queued`
    /// job; the losers get `ActiveJobConflict`.
    ///
    /// The per-workspace lock serializes the check-then-insert so that two
    /// concurrent callers can't both observe "no active job" and both
    /// create one (§5).
    pub async fn create_job(
        &self,
        workspace_id: &WorkspaceId,
        idempotency_key: Option<String>,
    ) -> Result<ProvisioningJob> {
        let lock = self.locks.lock(workspace_id).await;
        let _guard = lock.lock().await;

        if let Some(key) = &idempotency_key {
            if let Some(existing) = self.jobs.find_by_idempotency_key(workspace_id, key).await? {
                return Ok(existing);
            }
        }

        if let Some(active) = self.jobs.find_active_for_workspace(workspace_id).await? {
            // An idempotency key that doesn't match any existing job still
            // can't bypass the single-active-job invariant.
            let _ = &active;
            return Err(Error::ActiveJobConflict);
        }

        let job = ProvisioningJob::new(workspace_id.clone(), idempotency_key);
        self.jobs.create(job).await
    }

    pub async fn get(&self, id: &JobId) -> Result<ProvisioningJob> {
        self.jobs.get(id).await?.ok_or(Error::WorkspaceNotFound)
    }

    /// Advance a job one step along the canonical forward sequence.
    pub async fn advance(&self, id: &JobId) -> Result<ProvisioningJob> {
        let mut job = self.get(id).await?;
        job.advance()
            .map_err(|e| Error::Internal(format!("illegal provisioning transition: {e}")))?;
        self.jobs.save(job).await
    }

    /// Fail a job with a specific error code/detail (checksum mismatch,
    /// release unavailable, or a step-specific failure).
    pub async fn fail(&self, id: &JobId, code: &str, detail: &str) -> Result<ProvisioningJob> {
        let mut job = self.get(id).await?;
        job.fail(code, detail)
            .map_err(|e| Error::Internal(format!("illegal provisioning transition: {e}")))?;
        self.jobs.save(job).await
    }

    /// Retry a terminal-error job. Legal only when the current job for this
    /// workspace is in `Error`; generates a new attempt, not a new job id,
    /// respecting the idempotency contract already recorded on the job.
    pub async fn retry_from_error(&self, workspace_id: &WorkspaceId, id: &JobId) -> Result<ProvisioningJob> {
        let lock = self.locks.lock(workspace_id).await;
        let _guard = lock.lock().await;

        let mut job = self.get(id).await?;
        if &job.workspace_id != workspace_id {
            return Err(Error::WorkspaceNotFound);
        }

        job.retry_from_error()
            .map_err(|_| Error::Conflict("job is not in a retryable error state".into()))?;
        self.jobs.save(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::repository::InMemoryProvisioningJobRepository;
    use dashmap::DashMap;

    struct TestLocks {
        locks: DashMap<WorkspaceId, Arc<tokio::sync::Mutex<()>>>,
    }

    impl TestLocks {
        fn new() -> Self {
            Self { locks: DashMap::new() }
        }
    }

    #[async_trait::async_trait]
    impl WorkspaceLocks for TestLocks {
        async fn lock(&self, workspace_id: &WorkspaceId) -> Arc<tokio::sync::Mutex<()>> {
            self.locks
                .entry(workspace_id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        }
    }

    fn service() -> ProvisioningJobService {
        ProvisioningJobService::new(
            Arc::new(InMemoryProvisioningJobRepository::new()),
            Arc::new(TestLocks::new()),
        )
    }

    #[tokio::test]
    async fn idempotent_create_returns_same_job() {
        let svc = service();
        let ws = WorkspaceId::new();

        let first = svc.create_job(&ws, Some("key-1".into())).await.unwrap();
        let second = svc.create_job(&ws, Some("key-1".into())).await.unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn second_job_without_matching_key_is_active_job_conflict() {
        let svc = service();
        let ws = WorkspaceId::new();

        svc.create_job(&ws, None).await.unwrap();
        let err = svc.create_job(&ws, None).await.unwrap_err();
        assert!(matches!(err, Error::ActiveJobConflict));
    }

    #[tokio::test]
    async fn independent_workspaces_never_conflict() {
        let svc = service();
        let ws_a = WorkspaceId::new();
        let ws_b = WorkspaceId::new();

        svc.create_job(&ws_a, None).await.unwrap();
        let result = svc.create_job(&ws_b, None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn retry_allowed_only_from_error() {
        let svc = service();
        let ws = WorkspaceId::new();
        let job = svc.create_job(&ws, None).await.unwrap();

        let err = svc.retry_from_error(&ws, &job.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        svc.fail(&job.id, "RELEASE_UNAVAILABLE", "no release").await.unwrap();
        let retried = svc.retry_from_error(&ws, &job.id).await.unwrap();
        assert_eq!(retried.attempt, 2);

        // Retrying frees up the workspace for a fresh active job check.
        let active = svc.create_job(&ws, None).await.unwrap_err();
        assert!(matches!(active, Error::ActiveJobConflict));
    }
}
