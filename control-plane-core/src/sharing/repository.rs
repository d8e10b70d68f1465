//! Share-link persistence (§4.10).

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Error;
use crate::ids::ShareId;

use super::model::ShareLink;

/// Persistence for `ShareLink` records. Lookups are by `token_hash`, never
/// by plaintext token — the plaintext never reaches storage.
#[async_trait]
pub trait ShareLinkRepository: Send + Sync {
    async fn create(&self, link: ShareLink) -> Result<ShareLink, Error>;

    async fn get(&self, id: &ShareId) -> Result<Option<ShareLink>, Error>;

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<ShareLink>, Error>;

    async fn list_by_workspace(&self, workspace_id: &crate::ids::WorkspaceId) -> Result<Vec<ShareLink>, Error>;

    /// Revoke a share link. Revocation is a new value (`revoked_at` set),
    /// not a mutation of the original record's other fields.
    async fn revoke(&self, id: &ShareId) -> Result<ShareLink, Error>;
}

/// In-memory `ShareLinkRepository`, keyed by share id with a secondary
/// token-hash index.
#[derive(Debug, Default)]
pub struct InMemoryShareLinkRepository {
    links: DashMap<ShareId, ShareLink>,
}

impl InMemoryShareLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShareLinkRepository for InMemoryShareLinkRepository {
    async fn create(&self, link: ShareLink) -> Result<ShareLink, Error> {
        self.links.insert(link.id.clone(), link.clone());
        Ok(link)
    }

    async fn get(&self, id: &ShareId) -> Result<Option<ShareLink>, Error> {
        Ok(self.links.get(id).map(|e| e.value().clone()))
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<ShareLink>, Error> {
        Ok(self
            .links
            .iter()
            .map(|e| e.value().clone())
            .find(|l| l.token_hash == token_hash))
    }

    async fn list_by_workspace(&self, workspace_id: &crate::ids::WorkspaceId) -> Result<Vec<ShareLink>, Error> {
        Ok(self
            .links
            .iter()
            .map(|e| e.value().clone())
            .filter(|l| &l.workspace_id == workspace_id)
            .collect())
    }

    async fn revoke(&self, id: &ShareId) -> Result<ShareLink, Error> {
        let mut entry = self.links.get_mut(id).ok_or(Error::ShareNotFound)?;
        entry.revoked_at = Some(chrono::Utc::now());
        Ok(entry.value().clone())
    }
}

#[cfg(feature = "database")]
pub mod pg {
    use sqlx::PgPool;

    use super::super::model::ShareAccess;
    use super::*;

    /// Durable `ShareLinkRepository` backed by PostgreSQL.
    pub struct PgShareLinkRepository {
        pool: PgPool,
    }

    impl PgShareLinkRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub async fn initialize(&self) -> Result<(), Error> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS share_links (
                    id TEXT PRIMARY KEY,
                    workspace_id TEXT NOT NULL,
                    path TEXT NOT NULL,
                    token_hash TEXT NOT NULL UNIQUE,
                    access TEXT NOT NULL,
                    created_by TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    expires_at TIMESTAMPTZ NOT NULL,
                    revoked_at TIMESTAMPTZ
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create share_links table: {}", e)))?;

            Ok(())
        }
    }

    #[derive(sqlx::FromRow)]
    struct ShareLinkRow {
        id: String,
        workspace_id: String,
        path: String,
        token_hash: String,
        access: String,
        created_by: String,
        created_at: chrono::DateTime<chrono::Utc>,
        expires_at: chrono::DateTime<chrono::Utc>,
        revoked_at: Option<chrono::DateTime<chrono::Utc>>,
    }

    fn access_str(access: ShareAccess) -> &'static str {
        match access {
            ShareAccess::Read => "read",
            ShareAccess::Write => "write",
        }
    }

    impl TryFrom<ShareLinkRow> for ShareLink {
        type Error = Error;

        fn try_from(row: ShareLinkRow) -> Result<Self, Error> {
            Ok(ShareLink {
                id: row.id.parse().map_err(|_| Error::Internal("corrupt share id in storage".into()))?,
                workspace_id: row
                    .workspace_id
                    .parse()
                    .map_err(|_| Error::Internal("corrupt workspace id in storage".into()))?,
                path: row.path,
                token_hash: row.token_hash,
                access: match row.access.as_str() {
                    "read" => ShareAccess::Read,
                    "write" => ShareAccess::Write,
                    other => return Err(Error::Internal(format!("unknown share access: {other}"))),
                },
                created_by: row.created_by,
                created_at: row.created_at,
                expires_at: row.expires_at,
                revoked_at: row.revoked_at,
            })
        }
    }

    #[async_trait]
    impl ShareLinkRepository for PgShareLinkRepository {
        async fn create(&self, link: ShareLink) -> Result<ShareLink, Error> {
            sqlx::query(
                r#"
                INSERT INTO share_links
                    (id, workspace_id, path, token_hash, access, created_by, created_at, expires_at, revoked_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(link.id.to_string())
            .bind(link.workspace_id.to_string())
            .bind(&link.path)
            .bind(&link.token_hash)
            .bind(access_str(link.access))
            .bind(&link.created_by)
            .bind(link.created_at)
            .bind(link.expires_at)
            .bind(link.revoked_at)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create share link: {}", e)))?;

            Ok(link)
        }

        async fn get(&self, id: &ShareId) -> Result<Option<ShareLink>, Error> {
            let row = sqlx::query_as::<_, ShareLinkRow>("SELECT * FROM share_links WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Internal(format!("Failed to fetch share link: {}", e)))?;

            row.map(ShareLink::try_from).transpose()
        }

        async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<ShareLink>, Error> {
            let row = sqlx::query_as::<_, ShareLinkRow>(
                "SELECT * FROM share_links WHERE token_hash = $1",
            )
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to query share link by token hash: {}", e)))?;

            row.map(ShareLink::try_from).transpose()
        }

        async fn list_by_workspace(
            &self,
            workspace_id: &crate::ids::WorkspaceId,
        ) -> Result<Vec<ShareLink>, Error> {
            let rows = sqlx::query_as::<_, ShareLinkRow>(
                "SELECT * FROM share_links WHERE workspace_id = $1 ORDER BY created_at ASC",
            )
            .bind(workspace_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to list share links: {}", e)))?;

            rows.into_iter().map(ShareLink::try_from).collect()
        }

        async fn revoke(&self, id: &ShareId) -> Result<ShareLink, Error> {
            let row = sqlx::query_as::<_, ShareLinkRow>(
                "UPDATE share_links SET revoked_at = $1 WHERE id = $2 RETURNING *",
            )
            .bind(chrono::Utc::now())
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to revoke share link: {}", e)))?
            .ok_or(Error::ShareNotFound)?;

            ShareLink::try_from(row)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorkspaceId;
    use crate::sharing::model::ShareAccess;

    fn link() -> ShareLink {
        ShareLink::new(
            WorkspaceId::new(),
            "/docs/README.md".into(),
            "hash".into(),
            ShareAccess::Read,
            "owner1".into(),
            chrono::Utc::now() + chrono::Duration::hours(72),
        )
    }

    #[tokio::test]
    async fn revoke_sets_revoked_at_without_touching_other_fields() {
        let repo = InMemoryShareLinkRepository::new();
        let l = repo.create(link()).await.unwrap();

        let revoked = repo.revoke(&l.id).await.unwrap();
        assert!(revoked.revoked_at.is_some());
        assert_eq!(revoked.path, l.path);
    }

    #[tokio::test]
    async fn revoke_unknown_id_is_not_found() {
        let repo = InMemoryShareLinkRepository::new();
        let err = repo.revoke(&ShareId::new()).await.unwrap_err();
        assert!(matches!(err, Error::ShareNotFound));
    }

    #[tokio::test]
    async fn find_by_token_hash_round_trips() {
        let repo = InMemoryShareLinkRepository::new();
        let l = repo.create(link()).await.unwrap();

        let found = repo.find_by_token_hash(&l.token_hash).await.unwrap().unwrap();
        assert_eq!(found.id, l.id);
    }
}
