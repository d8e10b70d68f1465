//! Workspace and membership value types (§3 `Workspace`, `Member`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MemberId, WorkspaceId};

/// A tenant workspace. Belongs to exactly one `app_id` for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub app_id: String,
    pub owner_id: String,
    pub status: WorkspaceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(name: String, app_id: String, owner_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: WorkspaceId::new(),
            name,
            app_id,
            owner_id,
            status: WorkspaceStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Soft-removal status. Removed workspaces are retained, not deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Active,
    Removed,
}

/// A workspace membership record. At most one record per `(workspace_id,
/// email)` has status `pending` or `active` at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub workspace_id: WorkspaceId,
    pub user_id: Option<String>,
    pub email: String,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub invited_by: String,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// A fresh pending invite. `email` is normalized to lowercase.
    pub fn invite(workspace_id: WorkspaceId, email: &str, invited_by: String) -> Self {
        Self {
            id: MemberId::new(),
            workspace_id,
            user_id: None,
            email: email.trim().to_lowercase(),
            role: MemberRole::Admin,
            status: MemberStatus::Pending,
            invited_by,
            created_at: Utc::now(),
        }
    }

    /// Promote a pending invite to active, binding the authenticated user id.
    /// Idempotent: calling this on an already-active record with the same
    /// `user_id` is a no-op from the caller's point of view.
    pub fn accept(&mut self, user_id: String) {
        self.user_id = Some(user_id);
        self.status = MemberStatus::Active;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Pending,
    Active,
    Removed,
}
