//! Provisioning job value type and the state-machine transitions (§3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::WorkspaceId;

/// States of the provisioning state machine. The forward sequence is the
/// canonical happy path; `Error` is reachable from any active state, and
/// `Cancelled` is a second terminal absorbing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    ResolvingRelease,
    CreatingSandbox,
    UploadingArtifact,
    VerifyingChecksum,
    StartingRuntime,
    Ready,
    Error,
    Cancelled,
}

impl JobState {
    /// `true` for `Ready`, `Error`, `Cancelled` — no further transitions apply.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Ready | JobState::Error | JobState::Cancelled)
    }

    /// The canonical forward-path successor, or `None` at `Ready` or a
    /// terminal state.
    fn next_in_sequence(self) -> Option<JobState> {
        use JobState::*;
        match self {
            Queued => Some(ResolvingRelease),
            ResolvingRelease => Some(CreatingSandbox),
            CreatingSandbox => Some(UploadingArtifact),
            UploadingArtifact => Some(VerifyingChecksum),
            VerifyingChecksum => Some(StartingRuntime),
            StartingRuntime => Some(Ready),
            Ready | Error | Cancelled => None,
        }
    }

    /// The wire name used for config lookups (`step_timeout_secs` keys) and
    /// error detail strings.
    pub fn as_str(self) -> &'static str {
        use JobState::*;
        match self {
            Queued => "queued",
            ResolvingRelease => "resolving_release",
            CreatingSandbox => "creating_sandbox",
            UploadingArtifact => "uploading_artifact",
            VerifyingChecksum => "verifying_checksum",
            StartingRuntime => "starting_runtime",
            Ready => "ready",
            Error => "error",
            Cancelled => "cancelled",
        }
    }
}

/// A provisioning job tracking a single workspace's runtime lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningJob {
    pub workspace_id: WorkspaceId,
    pub id: crate::ids::JobId,
    pub state: JobState,
    pub attempt: u32,
    pub step: String,
    pub idempotency_key: Option<String>,
    pub state_entered_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error_code: Option<String>,
    pub last_error_detail: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("illegal transition from {from:?} to {to:?}")]
pub struct IllegalTransition {
    pub from: JobState,
    pub to: JobState,
}

impl ProvisioningJob {
    /// A fresh job in `Queued`, attempt 1.
    pub fn new(workspace_id: WorkspaceId, idempotency_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            workspace_id,
            id: crate::ids::JobId::new(),
            state: JobState::Queued,
            attempt: 1,
            step: JobState::Queued.as_str().to_string(),
            idempotency_key,
            state_entered_at: now,
            started_at: now,
            finished_at: None,
            last_error_code: None,
            last_error_detail: None,
        }
    }

    /// Advance to the canonical next state. Fails if the job is already
    /// terminal or has no successor (i.e. is already `Ready`).
    pub fn advance(&mut self) -> Result<(), IllegalTransition> {
        let next = self.state.next_in_sequence().ok_or(IllegalTransition {
            from: self.state,
            to: self.state,
        })?;
        self.transition_to(next);
        Ok(())
    }

    /// Force a transition into `Error`, recording the error code/detail.
    /// Legal from any non-terminal state.
    pub fn fail(&mut self, code: impl Into<String>, detail: impl Into<String>) -> Result<(), IllegalTransition> {
        if self.state.is_terminal() {
            return Err(IllegalTransition { from: self.state, to: JobState::Error });
        }
        self.last_error_code = Some(code.into());
        self.last_error_detail = Some(detail.into());
        self.transition_to(JobState::Error);
        Ok(())
    }

    /// Check this job's current state against its configured step timeout
    /// and, if exceeded, fail it with `STEP_TIMEOUT`. No-op on terminal or
    /// unconfigured (non-timed) states.
    pub fn check_timeout(&mut self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let elapsed = now.signed_duration_since(self.state_entered_at);
        let Ok(elapsed_std) = elapsed.to_std() else { return false };
        if elapsed_std > timeout {
            let _ = self.fail(
                "STEP_TIMEOUT",
                format!("state={} elapsed_secs={}", self.state.as_str(), elapsed_std.as_secs()),
            );
            true
        } else {
            false
        }
    }

    /// Restart from a terminal `Error` state into a fresh active attempt.
    /// Only legal when the job is currently `Error`.
    pub fn retry_from_error(&mut self) -> Result<(), IllegalTransition> {
        if self.state != JobState::Error {
            return Err(IllegalTransition { from: self.state, to: JobState::Queued });
        }
        self.attempt += 1;
        self.last_error_code = None;
        self.last_error_detail = None;
        self.finished_at = None;
        self.transition_to(JobState::Queued);
        Ok(())
    }

    fn transition_to(&mut self, next: JobState) {
        self.state = next;
        self.step = next.as_str().to_string();
        self.state_entered_at = Utc::now();
        if next.is_terminal() {
            self.finished_at = Some(self.state_entered_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_sequence_reaches_ready() {
        let mut job = ProvisioningJob::new(WorkspaceId::new(), None);
        for _ in 0..6 {
            job.advance().unwrap();
        }
        assert_eq!(job.state, JobState::Ready);
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn advancing_past_ready_is_illegal() {
        let mut job = ProvisioningJob::new(WorkspaceId::new(), None);
        for _ in 0..6 {
            job.advance().unwrap();
        }
        assert!(job.advance().is_err());
    }

    #[test]
    fn fail_then_retry_resets_error_fields() {
        let mut job = ProvisioningJob::new(WorkspaceId::new(), None);
        job.advance().unwrap();
        job.fail("RELEASE_UNAVAILABLE", "no release resolvable").unwrap();
        assert_eq!(job.state, JobState::Error);
        assert_eq!(job.attempt, 1);

        job.retry_from_error().unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempt, 2);
        assert!(job.last_error_code.is_none());
    }

    #[test]
    fn retry_only_legal_from_error() {
        let mut job = ProvisioningJob::new(WorkspaceId::new(), None);
        assert!(job.retry_from_error().is_err());
    }

    #[test]
    fn step_timeout_produces_stable_code() {
        let mut job = ProvisioningJob::new(WorkspaceId::new(), None);
        let later = job.state_entered_at + chrono::Duration::seconds(120);
        let timed_out = job.check_timeout(later, std::time::Duration::from_secs(60));
        assert!(timed_out);
        assert_eq!(job.last_error_code.as_deref(), Some("STEP_TIMEOUT"));
        assert_eq!(job.state, JobState::Error);
    }

    #[test]
    fn timeout_is_noop_within_budget() {
        let mut job = ProvisioningJob::new(WorkspaceId::new(), None);
        let soon = job.state_entered_at + chrono::Duration::seconds(5);
        assert!(!job.check_timeout(soon, std::time::Duration::from_secs(60)));
        assert_eq!(job.state, JobState::Queued);
    }
}
