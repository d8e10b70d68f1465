//! Workspace and membership persistence (§4.11).
//!
//! Mirrors the audit subsystem's storage split: a `Send + Sync` trait so
//! [`crate::state::AppState`] can hold a `dyn` repository, an in-memory
//! implementation backed by `dashmap` for tests and single-node deployments,
//! and an optional `database`-feature sqlx backend for durable storage.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Error;
use crate::ids::{MemberId, WorkspaceId};

use super::model::{Member, MemberStatus, Workspace, WorkspaceStatus};

/// Persistence for `Workspace` records.
#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    async fn create(&self, workspace: Workspace) -> Result<Workspace, Error>;

    async fn get(&self, id: &WorkspaceId) -> Result<Option<Workspace>, Error>;

    /// Name uniqueness is scoped per owner, not global (§4.11).
    async fn find_by_owner_and_name(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<Option<Workspace>, Error>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Workspace>, Error>;

    async fn update_status(&self, id: &WorkspaceId, status: WorkspaceStatus) -> Result<(), Error>;
}

/// Persistence for `Member` records.
#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn invite(&self, member: Member) -> Result<Member, Error>;

    async fn get(&self, id: &MemberId) -> Result<Option<Member>, Error>;

    /// At most one non-removed record exists per `(workspace_id, email)`;
    /// this is the lookup used to enforce that invariant.
    async fn find_active_by_email(
        &self,
        workspace_id: &WorkspaceId,
        email: &str,
    ) -> Result<Option<Member>, Error>;

    async fn list_by_workspace(&self, workspace_id: &WorkspaceId) -> Result<Vec<Member>, Error>;

    /// Persist an updated member record (role change, acceptance, removal).
    async fn save(&self, member: Member) -> Result<Member, Error>;
}

/// In-memory `WorkspaceRepository`, keyed by workspace id.
#[derive(Debug, Default)]
pub struct InMemoryWorkspaceRepository {
    workspaces: DashMap<WorkspaceId, Workspace>,
}

impl InMemoryWorkspaceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkspaceRepository for InMemoryWorkspaceRepository {
    async fn create(&self, workspace: Workspace) -> Result<Workspace, Error> {
        self.workspaces.insert(workspace.id.clone(), workspace.clone());
        Ok(workspace)
    }

    async fn get(&self, id: &WorkspaceId) -> Result<Option<Workspace>, Error> {
        Ok(self.workspaces.get(id).map(|e| e.value().clone()))
    }

    async fn find_by_owner_and_name(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<Option<Workspace>, Error> {
        Ok(self
            .workspaces
            .iter()
            .map(|e| e.value().clone())
            .find(|w| w.owner_id == owner_id && w.name == name && w.status == WorkspaceStatus::Active))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Workspace>, Error> {
        Ok(self
            .workspaces
            .iter()
            .map(|e| e.value().clone())
            .filter(|w| w.owner_id == owner_id)
            .collect())
    }

    async fn update_status(&self, id: &WorkspaceId, status: WorkspaceStatus) -> Result<(), Error> {
        match self.workspaces.get_mut(id) {
            Some(mut entry) => {
                entry.status = status;
                entry.updated_at = chrono::Utc::now();
                Ok(())
            }
            None => Err(Error::WorkspaceNotFound),
        }
    }
}

/// In-memory `MemberRepository`, keyed by member id.
#[derive(Debug, Default)]
pub struct InMemoryMemberRepository {
    members: DashMap<MemberId, Member>,
}

impl InMemoryMemberRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemberRepository for InMemoryMemberRepository {
    async fn invite(&self, member: Member) -> Result<Member, Error> {
        self.members.insert(member.id.clone(), member.clone());
        Ok(member)
    }

    async fn get(&self, id: &MemberId) -> Result<Option<Member>, Error> {
        Ok(self.members.get(id).map(|e| e.value().clone()))
    }

    async fn find_active_by_email(
        &self,
        workspace_id: &WorkspaceId,
        email: &str,
    ) -> Result<Option<Member>, Error> {
        let email = email.trim().to_lowercase();
        Ok(self.members.iter().map(|e| e.value().clone()).find(|m| {
            &m.workspace_id == workspace_id
                && m.email == email
                && m.status != MemberStatus::Removed
        }))
    }

    async fn list_by_workspace(&self, workspace_id: &WorkspaceId) -> Result<Vec<Member>, Error> {
        Ok(self
            .members
            .iter()
            .map(|e| e.value().clone())
            .filter(|m| &m.workspace_id == workspace_id)
            .collect())
    }

    async fn save(&self, member: Member) -> Result<Member, Error> {
        self.members.insert(member.id.clone(), member.clone());
        Ok(member)
    }
}

#[cfg(feature = "database")]
pub mod pg {
    use sqlx::PgPool;

    use super::*;

    /// Durable `WorkspaceRepository` backed by PostgreSQL.
    pub struct PgWorkspaceRepository {
        pool: PgPool,
    }

    impl PgWorkspaceRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub async fn initialize(&self) -> Result<(), Error> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS workspaces (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    app_id TEXT NOT NULL,
                    owner_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create workspaces table: {}", e)))?;

            sqlx::query(
                "CREATE UNIQUE INDEX IF NOT EXISTS workspaces_owner_name_active_idx \
                 ON workspaces (owner_id, name) WHERE status = 'active'",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create workspaces unique index: {}", e)))?;

            Ok(())
        }
    }

    #[derive(sqlx::FromRow)]
    struct WorkspaceRow {
        id: String,
        name: String,
        app_id: String,
        owner_id: String,
        status: String,
        created_at: chrono::DateTime<chrono::Utc>,
        updated_at: chrono::DateTime<chrono::Utc>,
    }

    impl TryFrom<WorkspaceRow> for Workspace {
        type Error = Error;

        fn try_from(row: WorkspaceRow) -> Result<Self, Error> {
            Ok(Workspace {
                id: row
                    .id
                    .parse()
                    .map_err(|_| Error::Internal("corrupt workspace id in storage".into()))?,
                name: row.name,
                app_id: row.app_id,
                owner_id: row.owner_id,
                status: match row.status.as_str() {
                    "active" => WorkspaceStatus::Active,
                    "removed" => WorkspaceStatus::Removed,
                    other => {
                        return Err(Error::Internal(format!("unknown workspace status: {other}")))
                    }
                },
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        }
    }

    fn status_str(status: WorkspaceStatus) -> &'static str {
        match status {
            WorkspaceStatus::Active => "active",
            WorkspaceStatus::Removed => "removed",
        }
    }

    #[async_trait]
    impl WorkspaceRepository for PgWorkspaceRepository {
        async fn create(&self, workspace: Workspace) -> Result<Workspace, Error> {
            sqlx::query(
                r#"
                INSERT INTO workspaces (id, name, app_id, owner_id, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(workspace.id.to_string())
            .bind(&workspace.name)
            .bind(&workspace.app_id)
            .bind(&workspace.owner_id)
            .bind(status_str(workspace.status))
            .bind(workspace.created_at)
            .bind(workspace.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    Error::Conflict("workspace name already exists for this owner".into())
                }
                other => Error::Internal(format!("Failed to create workspace: {}", other)),
            })?;

            Ok(workspace)
        }

        async fn get(&self, id: &WorkspaceId) -> Result<Option<Workspace>, Error> {
            let row = sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspaces WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Internal(format!("Failed to fetch workspace: {}", e)))?;

            row.map(Workspace::try_from).transpose()
        }

        async fn find_by_owner_and_name(
            &self,
            owner_id: &str,
            name: &str,
        ) -> Result<Option<Workspace>, Error> {
            let row = sqlx::query_as::<_, WorkspaceRow>(
                "SELECT * FROM workspaces WHERE owner_id = $1 AND name = $2 AND status = 'active'",
            )
            .bind(owner_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to query workspace by name: {}", e)))?;

            row.map(Workspace::try_from).transpose()
        }

        async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Workspace>, Error> {
            let rows = sqlx::query_as::<_, WorkspaceRow>(
                "SELECT * FROM workspaces WHERE owner_id = $1 ORDER BY created_at ASC",
            )
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to list workspaces: {}", e)))?;

            rows.into_iter().map(Workspace::try_from).collect()
        }

        async fn update_status(&self, id: &WorkspaceId, status: WorkspaceStatus) -> Result<(), Error> {
            let result = sqlx::query(
                "UPDATE workspaces SET status = $1, updated_at = $2 WHERE id = $3",
            )
            .bind(status_str(status))
            .bind(chrono::Utc::now())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to update workspace status: {}", e)))?;

            if result.rows_affected() == 0 {
                return Err(Error::WorkspaceNotFound);
            }

            Ok(())
        }
    }

    /// Durable `MemberRepository` backed by PostgreSQL.
    pub struct PgMemberRepository {
        pool: PgPool,
    }

    impl PgMemberRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub async fn initialize(&self) -> Result<(), Error> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS workspace_members (
                    id TEXT PRIMARY KEY,
                    workspace_id TEXT NOT NULL,
                    user_id TEXT,
                    email TEXT NOT NULL,
                    role TEXT NOT NULL,
                    status TEXT NOT NULL,
                    invited_by TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                )
                "#,
            )
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create workspace_members table: {}", e)))?;

            sqlx::query(
                "CREATE UNIQUE INDEX IF NOT EXISTS members_workspace_email_active_idx \
                 ON workspace_members (workspace_id, email) WHERE status IN ('pending', 'active')",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to create members unique index: {}", e)))?;

            Ok(())
        }
    }

    #[derive(sqlx::FromRow)]
    struct MemberRow {
        id: String,
        workspace_id: String,
        user_id: Option<String>,
        email: String,
        role: String,
        status: String,
        invited_by: String,
        created_at: chrono::DateTime<chrono::Utc>,
    }

    impl TryFrom<MemberRow> for Member {
        type Error = Error;

        fn try_from(row: MemberRow) -> Result<Self, Error> {
            use super::super::model::MemberRole;

            Ok(Member {
                id: row
                    .id
                    .parse()
                    .map_err(|_| Error::Internal("corrupt member id in storage".into()))?,
                workspace_id: row
                    .workspace_id
                    .parse()
                    .map_err(|_| Error::Internal("corrupt workspace id in storage".into()))?,
                user_id: row.user_id,
                email: row.email,
                role: match row.role.as_str() {
                    "admin" => MemberRole::Admin,
                    other => return Err(Error::Internal(format!("unknown member role: {other}"))),
                },
                status: match row.status.as_str() {
                    "pending" => MemberStatus::Pending,
                    "active" => MemberStatus::Active,
                    "removed" => MemberStatus::Removed,
                    other => {
                        return Err(Error::Internal(format!("unknown member status: {other}")))
                    }
                },
                invited_by: row.invited_by,
                created_at: row.created_at,
            })
        }
    }

    fn member_status_str(status: MemberStatus) -> &'static str {
        match status {
            MemberStatus::Pending => "pending",
            MemberStatus::Active => "active",
            MemberStatus::Removed => "removed",
        }
    }

    #[async_trait]
    impl MemberRepository for PgMemberRepository {
        async fn invite(&self, member: Member) -> Result<Member, Error> {
            sqlx::query(
                r#"
                INSERT INTO workspace_members
                    (id, workspace_id, user_id, email, role, status, invited_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(member.id.to_string())
            .bind(member.workspace_id.to_string())
            .bind(&member.user_id)
            .bind(&member.email)
            .bind("admin")
            .bind(member_status_str(member.status))
            .bind(&member.invited_by)
            .bind(member.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    Error::Conflict("a pending or active invite already exists for this email".into())
                }
                other => Error::Internal(format!("Failed to invite member: {}", other)),
            })?;

            Ok(member)
        }

        async fn get(&self, id: &MemberId) -> Result<Option<Member>, Error> {
            let row = sqlx::query_as::<_, MemberRow>("SELECT * FROM workspace_members WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Internal(format!("Failed to fetch member: {}", e)))?;

            row.map(Member::try_from).transpose()
        }

        async fn find_active_by_email(
            &self,
            workspace_id: &WorkspaceId,
            email: &str,
        ) -> Result<Option<Member>, Error> {
            let email = email.trim().to_lowercase();
            let row = sqlx::query_as::<_, MemberRow>(
                "SELECT * FROM workspace_members \
                 WHERE workspace_id = $1 AND email = $2 AND status != 'removed'",
            )
            .bind(workspace_id.to_string())
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to query member by email: {}", e)))?;

            row.map(Member::try_from).transpose()
        }

        async fn list_by_workspace(&self, workspace_id: &WorkspaceId) -> Result<Vec<Member>, Error> {
            let rows = sqlx::query_as::<_, MemberRow>(
                "SELECT * FROM workspace_members WHERE workspace_id = $1 ORDER BY created_at ASC",
            )
            .bind(workspace_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to list members: {}", e)))?;

            rows.into_iter().map(Member::try_from).collect()
        }

        async fn save(&self, member: Member) -> Result<Member, Error> {
            sqlx::query(
                "UPDATE workspace_members SET user_id = $1, status = $2 WHERE id = $3",
            )
            .bind(&member.user_id)
            .bind(member_status_str(member.status))
            .bind(member.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Failed to save member: {}", e)))?;

            Ok(member)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_by_owner_and_name_ignores_removed_workspaces() {
        let repo = InMemoryWorkspaceRepository::new();
        let mut ws = Workspace::new("acme".into(), "app1".into(), "owner1".into());
        ws.status = WorkspaceStatus::Removed;
        repo.create(ws).await.unwrap();

        assert!(repo
            .find_by_owner_and_name("owner1", "acme")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_by_owner_is_scoped_to_owner() {
        let repo = InMemoryWorkspaceRepository::new();
        repo.create(Workspace::new("a".into(), "app1".into(), "owner1".into()))
            .await
            .unwrap();
        repo.create(Workspace::new("b".into(), "app1".into(), "owner2".into()))
            .await
            .unwrap();

        let owned = repo.list_by_owner("owner1").await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name, "a");
    }

    #[tokio::test]
    async fn find_active_by_email_excludes_removed_members() {
        let repo = InMemoryMemberRepository::new();
        let ws_id = WorkspaceId::new();
        let mut member = Member::invite(ws_id.clone(), "Person@Example.com", "owner1".into());
        member.status = MemberStatus::Removed;
        repo.invite(member).await.unwrap();

        assert!(repo
            .find_active_by_email(&ws_id, "person@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn accept_is_idempotent() {
        let repo = InMemoryMemberRepository::new();
        let ws_id = WorkspaceId::new();
        let member = Member::invite(ws_id, "a@example.com", "owner1".into());
        let mut member = repo.invite(member).await.unwrap();

        member.accept("user-1".into());
        let saved = repo.save(member.clone()).await.unwrap();
        assert_eq!(saved.status, MemberStatus::Active);

        member.accept("user-1".into());
        let saved_again = repo.save(member).await.unwrap();
        assert_eq!(saved_again.status, MemberStatus::Active);
        assert_eq!(saved_again.user_id.as_deref(), Some("user-1"));
    }
}
