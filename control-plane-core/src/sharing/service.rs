//! Share-link creation and access resolution, composed over the token model
//! and repository (§4.10).

use std::sync::Arc;

use crate::config::SharingConfig;
use crate::error::{Error, Result};
use crate::ids::{ShareId, WorkspaceId};

use super::access::{generate_token, hash_token, normalize_path, resolve_access};
use super::model::{ShareAccess, ShareLink};
use super::repository::ShareLinkRepository;

/// Share-link operations: creation (returning the one-time plaintext
/// token), revocation, and public-access resolution.
pub struct ShareLinkService {
    links: Arc<dyn ShareLinkRepository>,
    config: SharingConfig,
}

/// A freshly created share link and its one-time plaintext token. The token
/// is never retrievable again after this value is dropped.
pub struct CreatedShareLink {
    pub link: ShareLink,
    pub token: String,
}

impl ShareLinkService {
    pub fn new(links: Arc<dyn ShareLinkRepository>, config: SharingConfig) -> Self {
        Self { links, config }
    }

    /// Create a share link for `path` within `workspace_id`. `expires_in_hours`
    /// is clamped to `[1, max_expiry_hours]`, defaulting to
    /// `default_expiry_hours` when absent.
    pub async fn create(
        &self,
        workspace_id: &WorkspaceId,
        path: &str,
        access: ShareAccess,
        created_by: String,
        expires_in_hours: Option<i64>,
    ) -> Result<CreatedShareLink> {
        let normalized_path = normalize_path(path)?;

        let hours = expires_in_hours
            .unwrap_or(self.config.default_expiry_hours)
            .clamp(1, self.config.max_expiry_hours);

        let token = generate_token();
        let token_hash = hash_token(&token);
        let expires_at = chrono::Utc::now() + chrono::Duration::hours(hours);

        let link = ShareLink::new(
            workspace_id.clone(),
            normalized_path,
            token_hash,
            access,
            created_by,
            expires_at,
        );
        let link = self.links.create(link).await?;

        Ok(CreatedShareLink { link, token })
    }

    /// Resolve a plaintext token against a requested path and access level.
    /// Looks the token up by its hash; the plaintext itself is never stored
    /// or compared directly against anything persisted.
    pub async fn resolve(
        &self,
        token: &str,
        requested_path: &str,
        requested_access: ShareAccess,
    ) -> Result<ShareLink> {
        let token_hash = hash_token(token);
        let link = self.links.find_by_token_hash(&token_hash).await?;
        resolve_access(link.as_ref(), chrono::Utc::now(), requested_path, requested_access)
            .map(Clone::clone)
    }

    pub async fn revoke(&self, workspace_id: &WorkspaceId, id: &ShareId) -> Result<ShareLink> {
        let link = self.links.get(id).await?.ok_or(Error::ShareNotFound)?;
        if &link.workspace_id != workspace_id {
            return Err(Error::ShareNotFound);
        }
        self.links.revoke(id).await
    }

    pub async fn list(&self, workspace_id: &WorkspaceId) -> Result<Vec<ShareLink>> {
        self.links.list_by_workspace(workspace_id).await
    }

    pub fn redact_prefix_len(&self) -> usize {
        self.config.redact_prefix_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharing::repository::InMemoryShareLinkRepository;

    fn service() -> ShareLinkService {
        ShareLinkService::new(Arc::new(InMemoryShareLinkRepository::new()), SharingConfig::default())
    }

    #[tokio::test]
    async fn created_token_resolves_exactly_once_correctly() {
        let svc = service();
        let ws = WorkspaceId::new();
        let created = svc
            .create(&ws, "/docs/README.md", ShareAccess::Read, "owner1".into(), Some(72))
            .await
            .unwrap();

        let resolved = svc
            .resolve(&created.token, "/docs/README.md", ShareAccess::Read)
            .await
            .unwrap();
        assert_eq!(resolved.id, created.link.id);
    }

    #[tokio::test]
    async fn revoke_then_access_is_revoked_not_expired() {
        let svc = service();
        let ws = WorkspaceId::new();
        let created = svc
            .create(&ws, "/docs/README.md", ShareAccess::Read, "owner1".into(), Some(72))
            .await
            .unwrap();

        svc.revoke(&ws, &created.link.id).await.unwrap();

        let err = svc
            .resolve(&created.token, "/docs/README.md", ShareAccess::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ShareRevoked));
    }

    #[tokio::test]
    async fn expiry_is_clamped_to_configured_maximum() {
        let svc = service();
        let ws = WorkspaceId::new();
        let created = svc
            .create(&ws, "/docs/README.md", ShareAccess::Read, "owner1".into(), Some(999_999))
            .await
            .unwrap();

        let max_expiry = chrono::Utc::now() + chrono::Duration::hours(svc.config.max_expiry_hours);
        assert!(created.link.expires_at <= max_expiry + chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn path_traversal_is_rejected_at_creation() {
        let svc = service();
        let ws = WorkspaceId::new();
        let err = svc
            .create(&ws, "/docs/../../etc/passwd", ShareAccess::Read, "owner1".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PathTraversal(_)));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let svc = service();
        let err = svc.resolve("not-a-real-token", "/docs/README.md", ShareAccess::Read).await.unwrap_err();
        assert!(matches!(err, Error::ShareNotFound));
    }
}
