//! Periodic sweep for stuck provisioning jobs (§4.6).

use std::sync::Arc;

use chrono::Utc;

use crate::config::ProvisioningConfig;
use crate::error::Result;
use crate::ids::JobId;

use super::repository::ProvisioningJobRepository;

/// Outcome of a sweep: every active job bucketed by what the sweep did
/// (or would do) with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs whose step timeout was exceeded and were transitioned to `error`.
    pub stale: Vec<JobId>,
    /// Jobs still within their step timeout.
    pub healthy: Vec<JobId>,
    /// Jobs that could not be loaded/saved during the sweep (logged, not failed).
    pub skipped: Vec<JobId>,
}

/// Scans active provisioning jobs and applies the timeout transition to any
/// that have exceeded their configured step timeout.
pub struct StaleJobDetector {
    jobs: Arc<dyn ProvisioningJobRepository>,
    config: ProvisioningConfig,
}

impl StaleJobDetector {
    pub fn new(jobs: Arc<dyn ProvisioningJobRepository>, config: ProvisioningConfig) -> Self {
        Self { jobs, config }
    }

    /// Scan and persist timeout transitions for any stale job.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.scan(true).await
    }

    /// Scan without persisting anything — for dry-run monitoring/alerting.
    pub async fn detect_only(&self) -> Result<SweepReport> {
        self.scan(false).await
    }

    async fn scan(&self, apply: bool) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let now = Utc::now();

        for mut job in self.jobs.list_active().await? {
            let timeout = self.config.timeout_for(job.state.as_str());
            if job.check_timeout(now, timeout) {
                report.stale.push(job.id.clone());
                if apply {
                    if self.jobs.save(job).await.is_err() {
                        report.skipped.push(report.stale.pop().expect("just pushed"));
                    }
                }
            } else {
                report.healthy.push(job.id.clone());
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorkspaceId;
    use crate::provisioning::repository::InMemoryProvisioningJobRepository;
    use crate::provisioning::state_machine::ProvisioningJob;
    use std::collections::HashMap;

    fn config_with_timeout(state: &str, secs: u64) -> ProvisioningConfig {
        let mut step_timeout_secs = HashMap::new();
        step_timeout_secs.insert(state.to_string(), secs);
        ProvisioningConfig { step_timeout_secs, sweep_interval_secs: 30 }
    }

    #[tokio::test]
    async fn sweep_marks_expired_jobs_stale_and_persists_error() {
        let repo = Arc::new(InMemoryProvisioningJobRepository::new());
        let mut job = ProvisioningJob::new(WorkspaceId::new(), None);
        job.state_entered_at = Utc::now() - chrono::Duration::seconds(120);
        let id = job.id.clone();
        repo.create(job).await.unwrap();

        let detector = StaleJobDetector::new(repo.clone(), config_with_timeout("queued", 60));
        let report = detector.sweep().await.unwrap();

        assert_eq!(report.stale, vec![id.clone()]);
        let saved = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(saved.last_error_code.as_deref(), Some("STEP_TIMEOUT"));
    }

    #[tokio::test]
    async fn detect_only_does_not_persist() {
        let repo = Arc::new(InMemoryProvisioningJobRepository::new());
        let mut job = ProvisioningJob::new(WorkspaceId::new(), None);
        job.state_entered_at = Utc::now() - chrono::Duration::seconds(120);
        let id = job.id.clone();
        repo.create(job).await.unwrap();

        let detector = StaleJobDetector::new(repo.clone(), config_with_timeout("queued", 60));
        let report = detector.detect_only().await.unwrap();

        assert_eq!(report.stale, vec![id.clone()]);
        let unchanged = repo.get(&id).await.unwrap().unwrap();
        assert!(unchanged.last_error_code.is_none());
    }

    #[tokio::test]
    async fn healthy_jobs_are_untouched() {
        let repo = Arc::new(InMemoryProvisioningJobRepository::new());
        let job = ProvisioningJob::new(WorkspaceId::new(), None);
        let id = job.id.clone();
        repo.create(job).await.unwrap();

        let detector = StaleJobDetector::new(repo, config_with_timeout("queued", 600));
        let report = detector.sweep().await.unwrap();

        assert_eq!(report.healthy, vec![id]);
        assert!(report.stale.is_empty());
    }
}
