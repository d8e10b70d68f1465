//! Workspace and membership domain (§3, §4.11).

mod model;
mod repository;
mod service;

pub use model::{Member, MemberRole, MemberStatus, Workspace, WorkspaceStatus};
pub use repository::{InMemoryMemberRepository, InMemoryWorkspaceRepository, MemberRepository, WorkspaceRepository};
pub use service::WorkspaceService;

#[cfg(feature = "database")]
pub use repository::pg::{PgMemberRepository, PgWorkspaceRepository};
