//! Provisioning job persistence (§4.6).

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Error;
use crate::ids::{JobId, WorkspaceId};

use super::state_machine::ProvisioningJob;

/// Persistence for `ProvisioningJob` records.
#[async_trait]
pub trait ProvisioningJobRepository: Send + Sync {
    async fn create(&self, job: ProvisioningJob) -> Result<ProvisioningJob, Error>;

    async fn get(&self, id: &JobId) -> Result<Option<ProvisioningJob>, Error>;

    async fn find_by_idempotency_key(
        &self,
        workspace_id: &WorkspaceId,
        key: &str,
    ) -> Result<Option<ProvisioningJob>, Error>;

    /// The job for `workspace_id` currently in a non-terminal state, if any.
    /// At most one such job exists per workspace (§3 invariant).
    async fn find_active_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Option<ProvisioningJob>, Error>;

    async fn save(&self, job: ProvisioningJob) -> Result<ProvisioningJob, Error>;

    /// All jobs currently in a non-terminal state, across every workspace —
    /// the working set for the stale-job sweeper.
    async fn list_active(&self) -> Result<Vec<ProvisioningJob>, Error>;
}

/// In-memory `ProvisioningJobRepository`, keyed by job id.
#[derive(Debug, Default)]
pub struct InMemoryProvisioningJobRepository {
    jobs: DashMap<JobId, ProvisioningJob>,
}

impl InMemoryProvisioningJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProvisioningJobRepository for InMemoryProvisioningJobRepository {
    async fn create(&self, job: ProvisioningJob) -> Result<ProvisioningJob, Error> {
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> Result<Option<ProvisioningJob>, Error> {
        Ok(self.jobs.get(id).map(|e| e.value().clone()))
    }

    async fn find_by_idempotency_key(
        &self,
        workspace_id: &WorkspaceId,
        key: &str,
    ) -> Result<Option<ProvisioningJob>, Error> {
        Ok(self.jobs.iter().map(|e| e.value().clone()).find(|j| {
            &j.workspace_id == workspace_id && j.idempotency_key.as_deref() == Some(key)
        }))
    }

    async fn find_active_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<Option<ProvisioningJob>, Error> {
        Ok(self
            .jobs
            .iter()
            .map(|e| e.value().clone())
            .find(|j| &j.workspace_id == workspace_id && !j.state.is_terminal()))
    }

    async fn save(&self, job: ProvisioningJob) -> Result<ProvisioningJob, Error> {
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn list_active(&self) -> Result<Vec<ProvisioningJob>, Error> {
        Ok(self
            .jobs
            .iter()
            .map(|e| e.value().clone())
            .filter(|j| !j.state.is_terminal())
            .collect())
    }
}

#[cfg(feature = "database")]
pub mod pg {
    use sqlx::PgPool;

    use super::super::state_machine::JobState;
    use super::*;

    /// Durable `ProvisioningJobRepository` backed by PostgreSQL.
    pub struct PgProvisioningJobRepository {
        pool: PgPool,
    }

    impl PgProvisioningJobRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub async fn initialize(&self) -> Result<(), Error> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS provisioning_jobs (
                    id TEXT PRIMARY KEY,
                    workspace_id TEXT NOT NULL,
                    state TEXT NOT NULL,
                    attempt INTEGER NOT NULL,
                    step TEXT NOT NULL,
                    idempotency_key TEXT,
                    state_entered_at TIMESTAMPTZ NOT NULL,
                    started_at TIMESTAMPTZ NOT NULL,
                    finished_at TIMESTAMPTZ,
                    last_error_code TEXT,
                    last_error_detail TEXT
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create provisioning_jobs table: {}", e)))?;

            sqlx::query(
                "CREATE UNIQUE INDEX IF NOT EXISTS provisioning_jobs_idempotency_idx \
                 ON provisioning_jobs (workspace_id, idempotency_key) WHERE idempotency_key IS NOT NULL",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create idempotency index: {}", e)))?;

            Ok(())
        }
    }

    #[derive(sqlx::FromRow)]
    struct JobRow {
        id: String,
        workspace_id: String,
        state: String,
        attempt: i32,
        step: String,
        idempotency_key: Option<String>,
        state_entered_at: chrono::DateTime<chrono::Utc>,
        started_at: chrono::DateTime<chrono::Utc>,
        finished_at: Option<chrono::DateTime<chrono::Utc>>,
        last_error_code: Option<String>,
        last_error_detail: Option<String>,
    }

    fn state_str(state: JobState) -> &'static str {
        state.as_str()
    }

    fn parse_state(s: &str) -> Result<JobState, Error> {
        Ok(match s {
            "queued" => JobState::Queued,
            "resolving_release" => JobState::ResolvingRelease,
            "creating_sandbox" => JobState::CreatingSandbox,
            "uploading_artifact" => JobState::UploadingArtifact,
            "verifying_checksum" => JobState::VerifyingChecksum,
            "starting_runtime" => JobState::StartingRuntime,
            "ready" => JobState::Ready,
            "error" => JobState::Error,
            "cancelled" => JobState::Cancelled,
            other => return Err(Error::Internal(format!("unknown job state: {other}"))),
        })
    }

    impl TryFrom<JobRow> for ProvisioningJob {
        type Error = Error;

        fn try_from(row: JobRow) -> Result<Self, Error> {
            Ok(ProvisioningJob {
                workspace_id: row
                    .workspace_id
                    .parse()
                    .map_err(|_| Error::Internal("corrupt workspace id in storage".into()))?,
                id: row.id.parse().map_err(|_| Error::Internal("corrupt job id in storage".into()))?,
                state: parse_state(&row.state)?,
                attempt: row.attempt as u32,
                step: row.step,
                idempotency_key: row.idempotency_key,
                state_entered_at: row.state_entered_at,
                started_at: row.started_at,
                finished_at: row.finished_at,
                last_error_code: row.last_error_code,
                last_error_detail: row.last_error_detail,
            })
        }
    }

    #[async_trait]
    impl ProvisioningJobRepository for PgProvisioningJobRepository {
        async fn create(&self, job: ProvisioningJob) -> Result<ProvisioningJob, Error> {
            sqlx::query(
                r#"
                INSERT INTO provisioning_jobs
                    (id, workspace_id, state, attempt, step, idempotency_key,
                     state_entered_at, started_at, finished_at, last_error_code, last_error_detail)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(job.id.to_string())
            .bind(job.workspace_id.to_string())
            .bind(state_str(job.state))
            .bind(job.attempt as i32)
            .bind(&job.step)
            .bind(&job.idempotency_key)
            .bind(job.state_entered_at)
            .bind(job.started_at)
            .bind(job.finished_at)
            .bind(&job.last_error_code)
            .bind(&job.last_error_detail)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    Error::Conflict("a job with this idempotency key already exists".into())
                }
                other => Error::Internal(format!("Failed to create provisioning job: {}", other)),
            })?;

            Ok(job)
        }

        async fn get(&self, id: &JobId) -> Result<Option<ProvisioningJob>, Error> {
            let row = sqlx::query_as::<_, JobRow>("SELECT * FROM provisioning_jobs WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Internal(format!("Failed to fetch provisioning job: {}", e)))?;

            row.map(ProvisioningJob::try_from).transpose()
        }

        async fn find_by_idempotency_key(
            &self,
            workspace_id: &WorkspaceId,
            key: &str,
        ) -> Result<Option<ProvisioningJob>, Error> {
            let row = sqlx::query_as::<_, JobRow>(
                "SELECT * FROM provisioning_jobs WHERE workspace_id = $1 AND idempotency_key = $2",
            )
            .bind(workspace_id.to_string())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to query job by idempotency key: {}", e)))?;

            row.map(ProvisioningJob::try_from).transpose()
        }

        async fn find_active_for_workspace(
            &self,
            workspace_id: &WorkspaceId,
        ) -> Result<Option<ProvisioningJob>, Error> {
            let row = sqlx::query_as::<_, JobRow>(
                "SELECT * FROM provisioning_jobs \
                 WHERE workspace_id = $1 AND state NOT IN ('ready', 'error', 'cancelled') \
                 ORDER BY started_at DESC LIMIT 1",
            )
            .bind(workspace_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to query active job: {}", e)))?;

            row.map(ProvisioningJob::try_from).transpose()
        }

        async fn save(&self, job: ProvisioningJob) -> Result<ProvisioningJob, Error> {
            sqlx::query(
                r#"
                UPDATE provisioning_jobs SET
                    state = $1, attempt = $2, step = $3, state_entered_at = $4,
                    finished_at = $5, last_error_code = $6, last_error_detail = $7
                WHERE id = $8
                "#,
            )
            .bind(state_str(job.state))
            .bind(job.attempt as i32)
            .bind(&job.step)
            .bind(job.state_entered_at)
            .bind(job.finished_at)
            .bind(&job.last_error_code)
            .bind(&job.last_error_detail)
            .bind(job.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to save provisioning job: {}", e)))?;

            Ok(job)
        }

        async fn list_active(&self) -> Result<Vec<ProvisioningJob>, Error> {
            let rows = sqlx::query_as::<_, JobRow>(
                "SELECT * FROM provisioning_jobs WHERE state NOT IN ('ready', 'error', 'cancelled')",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to list active provisioning jobs: {}", e)))?;

            rows.into_iter().map(ProvisioningJob::try_from).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_active_ignores_terminal_jobs() {
        let repo = InMemoryProvisioningJobRepository::new();
        let ws_id = WorkspaceId::new();
        let mut job = ProvisioningJob::new(ws_id.clone(), None);
        job.fail("RELEASE_UNAVAILABLE", "no release").unwrap();
        repo.create(job).await.unwrap();

        assert!(repo.find_active_for_workspace(&ws_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_idempotency_key_is_scoped_to_workspace() {
        let repo = InMemoryProvisioningJobRepository::new();
        let ws_a = WorkspaceId::new();
        let ws_b = WorkspaceId::new();
        let job = ProvisioningJob::new(ws_a.clone(), Some("key-1".into()));
        repo.create(job).await.unwrap();

        assert!(repo.find_by_idempotency_key(&ws_a, "key-1").await.unwrap().is_some());
        assert!(repo.find_by_idempotency_key(&ws_b, "key-1").await.unwrap().is_none());
    }
}
