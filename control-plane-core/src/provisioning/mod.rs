//! Provisioning state machine, job service, release/artifact contract, and
//! stale-job detection (§3, §4.5, §4.6, §4.7).

mod artifact;
mod job_service;
mod repository;
mod stale_job_detector;
mod state_machine;

pub use artifact::{
    compute_sha256, parse_bsd_checksum, resolve_target, sandbox_name, verify_checksum,
    ProvisioningTarget, ReleaseManifest, ReleaseResolver,
};
pub use job_service::{ProvisioningJobService, WorkspaceLocks};
pub use repository::{InMemoryProvisioningJobRepository, ProvisioningJobRepository};
pub use stale_job_detector::{StaleJobDetector, SweepReport};
pub use state_machine::{IllegalTransition, JobState, ProvisioningJob};

#[cfg(feature = "database")]
pub use repository::pg::PgProvisioningJobRepository;
