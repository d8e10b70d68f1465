//! Workspace and membership business logic (§4.11).
//!
//! Handler-facing operations that enforce the invariants the repository
//! layer alone cannot: per-owner name uniqueness, cross-tenant opacity
//! (reads for a workspace you don't own 404, never 403), and idempotent
//! invite acceptance.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ids::{MemberId, WorkspaceId};

use super::model::{Member, MemberStatus, Workspace, WorkspaceStatus};
use super::repository::{MemberRepository, WorkspaceRepository};

/// Workspace and membership operations, composed over the repository traits.
pub struct WorkspaceService {
    workspaces: Arc<dyn WorkspaceRepository>,
    members: Arc<dyn MemberRepository>,
}

impl WorkspaceService {
    pub fn new(workspaces: Arc<dyn WorkspaceRepository>, members: Arc<dyn MemberRepository>) -> Self {
        Self { workspaces, members }
    }

    /// Create a workspace. Names are unique per owner, not global — a
    /// collision yields `Error::Conflict`, never silently renaming.
    pub async fn create_workspace(
        &self,
        owner_id: &str,
        name: String,
        app_id: String,
    ) -> Result<Workspace> {
        if self
            .workspaces
            .find_by_owner_and_name(owner_id, &name)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(format!(
                "workspace '{name}' already exists for this owner"
            )));
        }

        let workspace = Workspace::new(name, app_id, owner_id.to_string());
        self.workspaces.create(workspace).await
    }

    /// Fetch a workspace, scoped to the caller's own workspaces. A workspace
    /// that exists but belongs to another owner is indistinguishable from
    /// one that doesn't exist at all — `WorkspaceNotFound`, never `Forbidden`.
    pub async fn get_owned_workspace(&self, owner_id: &str, id: &WorkspaceId) -> Result<Workspace> {
        let workspace = self.workspaces.get(id).await?.ok_or(Error::WorkspaceNotFound)?;

        if workspace.owner_id != owner_id {
            return Err(Error::WorkspaceNotFound);
        }

        Ok(workspace)
    }

    pub async fn list_workspaces(&self, owner_id: &str) -> Result<Vec<Workspace>> {
        self.workspaces.list_by_owner(owner_id).await
    }

    pub async fn remove_workspace(&self, owner_id: &str, id: &WorkspaceId) -> Result<()> {
        self.get_owned_workspace(owner_id, id).await?;
        self.workspaces.update_status(id, WorkspaceStatus::Removed).await
    }

    /// Invite a member by email. A duplicate invite for an email that's
    /// already pending or active in this workspace is a conflict, not a
    /// silent no-op — the caller needs to know the invite already exists.
    pub async fn invite_member(
        &self,
        workspace_id: &WorkspaceId,
        email: &str,
        invited_by: String,
    ) -> Result<Member> {
        if self
            .members
            .find_active_by_email(workspace_id, email)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(format!(
                "an invite already exists for {email} in this workspace"
            )));
        }

        let member = Member::invite(workspace_id.clone(), email, invited_by);
        self.members.invite(member).await
    }

    /// List members of a workspace, auto-accepting any pending invite for
    /// `viewer_user_id`/`viewer_email` in the process. This is how a pending
    /// invite becomes active: the invited user's next authenticated list
    /// call promotes their own record. Promotion is idempotent.
    pub async fn list_members_and_accept_invite(
        &self,
        workspace_id: &WorkspaceId,
        viewer_user_id: &str,
        viewer_email: &str,
    ) -> Result<Vec<Member>> {
        if let Some(mut member) = self.members.find_active_by_email(workspace_id, viewer_email).await? {
            if member.status == MemberStatus::Pending {
                member.accept(viewer_user_id.to_string());
                self.members.save(member).await?;
            }
        }

        self.members.list_by_workspace(workspace_id).await
    }

    pub async fn remove_member(&self, workspace_id: &WorkspaceId, member_id: &MemberId) -> Result<()> {
        let mut member = self.members.get(member_id).await?.ok_or(Error::WorkspaceNotFound)?;

        if &member.workspace_id != workspace_id {
            return Err(Error::WorkspaceNotFound);
        }

        member.status = MemberStatus::Removed;
        self.members.save(member).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspaces::repository::{InMemoryMemberRepository, InMemoryWorkspaceRepository};

    fn service() -> WorkspaceService {
        WorkspaceService::new(
            Arc::new(InMemoryWorkspaceRepository::new()),
            Arc::new(InMemoryMemberRepository::new()),
        )
    }

    #[tokio::test]
    async fn duplicate_name_for_same_owner_is_conflict() {
        let svc = service();
        svc.create_workspace("owner1", "acme".into(), "app1".into())
            .await
            .unwrap();

        let err = svc
            .create_workspace("owner1", "acme".into(), "app1".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn same_name_different_owner_is_allowed() {
        let svc = service();
        svc.create_workspace("owner1", "acme".into(), "app1".into())
            .await
            .unwrap();

        let ws = svc
            .create_workspace("owner2", "acme".into(), "app1".into())
            .await
            .unwrap();
        assert_eq!(ws.owner_id, "owner2");
    }

    #[tokio::test]
    async fn cross_tenant_read_is_not_found_not_forbidden() {
        let svc = service();
        let ws = svc
            .create_workspace("owner1", "acme".into(), "app1".into())
            .await
            .unwrap();

        let err = svc.get_owned_workspace("owner2", &ws.id).await.unwrap_err();
        assert!(matches!(err, Error::WorkspaceNotFound));
    }

    #[tokio::test]
    async fn duplicate_pending_invite_is_conflict() {
        let svc = service();
        let ws = svc
            .create_workspace("owner1", "acme".into(), "app1".into())
            .await
            .unwrap();

        svc.invite_member(&ws.id, "a@example.com", "owner1".into())
            .await
            .unwrap();

        let err = svc
            .invite_member(&ws.id, "A@Example.com", "owner1".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn listing_members_auto_accepts_invite_idempotently() {
        let svc = service();
        let ws = svc
            .create_workspace("owner1", "acme".into(), "app1".into())
            .await
            .unwrap();
        svc.invite_member(&ws.id, "a@example.com", "owner1".into())
            .await
            .unwrap();

        let members = svc
            .list_members_and_accept_invite(&ws.id, "user-1", "a@example.com")
            .await
            .unwrap();
        assert_eq!(members[0].status, MemberStatus::Active);

        // Second call is a no-op, not a duplicate accept.
        let members_again = svc
            .list_members_and_accept_invite(&ws.id, "user-1", "a@example.com")
            .await
            .unwrap();
        assert_eq!(members_again.len(), 1);
        assert_eq!(members_again[0].status, MemberStatus::Active);
    }
}
