//! Share-link value type (§3, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ShareId, WorkspaceId};

/// Access level granted by a share link. `Write` is a superset of `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareAccess {
    Read,
    Write,
}

/// A share link to a single exact path within a workspace. Only the SHA-256
/// hash of the token is ever stored — the plaintext is returned once, at
/// creation, and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: ShareId,
    pub workspace_id: WorkspaceId,
    pub path: String,
    pub token_hash: String,
    pub access: ShareAccess,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ShareLink {
    pub fn new(
        workspace_id: WorkspaceId,
        path: String,
        token_hash: String,
        access: ShareAccess,
        created_by: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ShareId::new(),
            workspace_id,
            path,
            token_hash,
            access,
            created_by,
            created_at: Utc::now(),
            expires_at,
            revoked_at: None,
        }
    }
}
