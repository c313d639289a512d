use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, SystemConfigRepo},
    domain::entities::SystemConfigRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const CONFIG_COLUMNS: &str = "site_name, site_url, email_host, email_port, email_username, \
     email_password, owner_email, ai_enabled, updated_at";

#[derive(sqlx::FromRow)]
struct SystemConfigRow {
    site_name: String,
    site_url: Option<String>,
    email_host: Option<String>,
    email_port: Option<i32>,
    email_username: Option<String>,
    email_password: Option<String>,
    owner_email: Option<String>,
    ai_enabled: bool,
    updated_at: OffsetDateTime,
}

impl From<SystemConfigRow> for SystemConfigRecord {
    fn from(row: SystemConfigRow) -> Self {
        Self {
            site_name: row.site_name,
            site_url: row.site_url,
            email_host: row.email_host,
            email_port: row.email_port,
            email_username: row.email_username,
            email_password: row.email_password,
            owner_email: row.owner_email,
            ai_enabled: row.ai_enabled,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl SystemConfigRepo for PostgresRepositories {
    async fn load_config(&self) -> Result<Option<SystemConfigRecord>, RepoError> {
        let row = sqlx::query_as::<_, SystemConfigRow>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM system_config WHERE id = 1"
        ))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SystemConfigRecord::from))
    }

    async fn save_config(
        &self,
        record: SystemConfigRecord,
    ) -> Result<SystemConfigRecord, RepoError> {
        let row = sqlx::query_as::<_, SystemConfigRow>(&format!(
            "INSERT INTO system_config (id, site_name, site_url, email_host, email_port, \
                 email_username, email_password, owner_email, ai_enabled, updated_at) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
                 site_name = EXCLUDED.site_name, \
                 site_url = EXCLUDED.site_url, \
                 email_host = EXCLUDED.email_host, \
                 email_port = EXCLUDED.email_port, \
                 email_username = EXCLUDED.email_username, \
                 email_password = EXCLUDED.email_password, \
                 owner_email = EXCLUDED.owner_email, \
                 ai_enabled = EXCLUDED.ai_enabled, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {CONFIG_COLUMNS}"
        ))
        .bind(record.site_name)
        .bind(record.site_url)
        .bind(record.email_host)
        .bind(record.email_port)
        .bind(record.email_username)
        .bind(record.email_password)
        .bind(record.owner_email)
        .bind(record.ai_enabled)
        .bind(record.updated_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
