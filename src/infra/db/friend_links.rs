use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{FriendLinksRepo, NewFriendLink, RepoError},
    domain::{entities::FriendLinkRecord, types::FriendLinkStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const LINK_COLUMNS: &str =
    "id, name, url, avatar, description, email, status, reason, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FriendLinkRow {
    id: Uuid,
    name: String,
    url: String,
    avatar: Option<String>,
    description: Option<String>,
    email: String,
    status: FriendLinkStatus,
    reason: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<FriendLinkRow> for FriendLinkRecord {
    fn from(row: FriendLinkRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            url: row.url,
            avatar: row.avatar,
            description: row.description,
            email: row.email,
            status: row.status,
            reason: row.reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl FriendLinksRepo for PostgresRepositories {
    async fn create_link(&self, link: NewFriendLink) -> Result<FriendLinkRecord, RepoError> {
        let row = sqlx::query_as::<_, FriendLinkRow>(&format!(
            "INSERT INTO friend_links (id, name, url, avatar, description, email, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'applying', $7, $7) \
             RETURNING {LINK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(link.name)
        .bind(link.url)
        .bind(link.avatar)
        .bind(link.description)
        .bind(link.email)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_link(&self, id: Uuid) -> Result<Option<FriendLinkRecord>, RepoError> {
        let row = sqlx::query_as::<_, FriendLinkRow>(&format!(
            "SELECT {LINK_COLUMNS} FROM friend_links WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(FriendLinkRecord::from))
    }

    async fn list_links(
        &self,
        status: Option<FriendLinkStatus>,
    ) -> Result<Vec<FriendLinkRecord>, RepoError> {
        let rows = sqlx::query_as::<_, FriendLinkRow>(&format!(
            "SELECT {LINK_COLUMNS} FROM friend_links \
             WHERE ($1::friend_link_status IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(status)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FriendLinkRecord::from).collect())
    }

    async fn update_link_status(
        &self,
        id: Uuid,
        status: FriendLinkStatus,
        reason: Option<String>,
    ) -> Result<FriendLinkRecord, RepoError> {
        let row = sqlx::query_as::<_, FriendLinkRow>(&format!(
            "UPDATE friend_links SET status = $2, reason = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {LINK_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(reason)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(FriendLinkRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_links(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM friend_links WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
