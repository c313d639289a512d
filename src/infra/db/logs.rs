use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{Page, PageRequest},
    application::repos::{AdminLogsRepo, ExceptionLogsRepo, LogQueryFilter, RepoError},
    domain::entities::{AdminLogRecord, ExceptionLogRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

const ADMIN_COLUMNS: &str = "id, username, request_method, request_uri, ip, ip_source, params, \
     operation, spend_ms, created_at";
const EXCEPTION_COLUMNS: &str = "id, username, request_method, request_uri, ip, ip_source, \
     params, operation, exception_message, created_at";

#[derive(sqlx::FromRow)]
struct AdminLogRow {
    id: Uuid,
    username: String,
    request_method: String,
    request_uri: String,
    ip: String,
    ip_source: String,
    params: Option<String>,
    operation: String,
    spend_ms: i64,
    created_at: OffsetDateTime,
}

impl From<AdminLogRow> for AdminLogRecord {
    fn from(row: AdminLogRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            request_method: row.request_method,
            request_uri: row.request_uri,
            ip: row.ip,
            ip_source: row.ip_source,
            params: row.params,
            operation: row.operation,
            spend_ms: row.spend_ms,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExceptionLogRow {
    id: Uuid,
    username: String,
    request_method: String,
    request_uri: String,
    ip: String,
    ip_source: String,
    params: Option<String>,
    operation: String,
    exception_message: String,
    created_at: OffsetDateTime,
}

impl From<ExceptionLogRow> for ExceptionLogRecord {
    fn from(row: ExceptionLogRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            request_method: row.request_method,
            request_uri: row.request_uri,
            ip: row.ip,
            ip_source: row.ip_source,
            params: row.params,
            operation: row.operation,
            exception_message: row.exception_message,
            created_at: row.created_at,
        }
    }
}

fn push_filters<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q LogQueryFilter) {
    if let Some(username) = filter.username.as_ref() {
        qb.push(" AND username ILIKE ");
        qb.push_bind(format!("%{username}%"));
    }
    if let Some(operation) = filter.operation.as_ref() {
        qb.push(" AND operation ILIKE ");
        qb.push_bind(format!("%{operation}%"));
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND created_at < ");
        qb.push_bind(to);
    }
}

impl PostgresRepositories {
    async fn count_logs(&self, table: &str, filter: &LogQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE 1=1 "));
        push_filters(&mut qb, filter);
        let total: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Self::convert_count(total)
    }

    fn page_query<'q>(
        table: &str,
        columns: &str,
        filter: &'q LogQueryFilter,
        page: PageRequest,
    ) -> QueryBuilder<'q, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM {table} WHERE 1=1 "));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());
        qb
    }
}

#[async_trait]
impl AdminLogsRepo for PostgresRepositories {
    async fn append_admin_log(&self, record: AdminLogRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO admin_logs (id, username, request_method, request_uri, ip, ip_source, \
                 params, operation, spend_ms, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(record.username)
        .bind(record.request_method)
        .bind(record.request_uri)
        .bind(record.ip)
        .bind(record.ip_source)
        .bind(record.params)
        .bind(record.operation)
        .bind(record.spend_ms)
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_admin_logs(
        &self,
        filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<AdminLogRecord>, RepoError> {
        let total = self.count_logs("admin_logs", filter).await?;
        let mut qb = Self::page_query("admin_logs", ADMIN_COLUMNS, filter, page);
        let rows: Vec<AdminLogRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Page::new(
            rows.into_iter().map(AdminLogRecord::from).collect(),
            total,
            page,
        ))
    }

    async fn delete_admin_logs(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM admin_logs WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn purge_admin_logs_before(&self, cutoff: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM admin_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ExceptionLogsRepo for PostgresRepositories {
    async fn append_exception_log(&self, record: ExceptionLogRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO exception_logs (id, username, request_method, request_uri, ip, \
                 ip_source, params, operation, exception_message, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(record.username)
        .bind(record.request_method)
        .bind(record.request_uri)
        .bind(record.ip)
        .bind(record.ip_source)
        .bind(record.params)
        .bind(record.operation)
        .bind(record.exception_message)
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_exception_logs(
        &self,
        filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<ExceptionLogRecord>, RepoError> {
        let total = self.count_logs("exception_logs", filter).await?;
        let mut qb = Self::page_query("exception_logs", EXCEPTION_COLUMNS, filter, page);
        let rows: Vec<ExceptionLogRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Page::new(
            rows.into_iter().map(ExceptionLogRecord::from).collect(),
            total,
            page,
        ))
    }

    async fn delete_exception_logs(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM exception_logs WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn purge_exception_logs_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM exception_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
