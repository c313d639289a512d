use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{Page, PageRequest},
    application::repos::{
        JobLogQueryFilter, JobLogsRepo, JobQueryFilter, JobsRepo, NewJob, RepoError,
        UpdateJobParams,
    },
    domain::{
        entities::{JobLogRecord, JobRecord},
        types::{JobRunStatus, JobStatus, MisfirePolicy},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const JOB_COLUMNS: &str = "id, job_name, job_group, invoke_target, cron_expression, \
     misfire_policy, concurrent, status, remark, created_by, updated_by, created_at, updated_at";
const JOB_LOG_COLUMNS: &str = "id, job_id, job_name, job_group, invoke_target, status, message, \
     exception_info, started_at, finished_at";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_name: String,
    job_group: String,
    invoke_target: String,
    cron_expression: String,
    misfire_policy: MisfirePolicy,
    concurrent: bool,
    status: JobStatus,
    remark: Option<String>,
    created_by: String,
    updated_by: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<JobRow> for JobRecord {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            job_name: row.job_name,
            job_group: row.job_group,
            invoke_target: row.invoke_target,
            cron_expression: row.cron_expression,
            misfire_policy: row.misfire_policy,
            concurrent: row.concurrent,
            status: row.status,
            remark: row.remark,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct JobLogRow {
    id: Uuid,
    job_id: Uuid,
    job_name: String,
    job_group: String,
    invoke_target: String,
    status: JobRunStatus,
    message: String,
    exception_info: Option<String>,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
}

impl From<JobLogRow> for JobLogRecord {
    fn from(row: JobLogRow) -> Self {
        Self {
            id: row.id,
            job_id: row.job_id,
            job_name: row.job_name,
            job_group: row.job_group,
            invoke_target: row.invoke_target,
            status: row.status,
            message: row.message,
            exception_info: row.exception_info,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

fn push_job_filters<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q JobQueryFilter) {
    if let Some(name) = filter.job_name.as_ref() {
        qb.push(" AND job_name ILIKE ");
        qb.push_bind(format!("%{name}%"));
    }
    if let Some(group) = filter.job_group.as_ref() {
        qb.push(" AND job_group = ");
        qb.push_bind(group);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
}

fn push_log_filters<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q JobLogQueryFilter) {
    if let Some(job_id) = filter.job_id {
        qb.push(" AND job_id = ");
        qb.push_bind(job_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
}

#[async_trait]
impl JobsRepo for PostgresRepositories {
    async fn list_jobs(
        &self,
        filter: &JobQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobRecord>, RepoError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM jobs WHERE 1=1 ");
        push_job_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE 1=1 "));
        push_job_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at ASC, id ASC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());
        let rows: Vec<JobRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Page::new(
            rows.into_iter().map(JobRecord::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, RepoError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = $1 ORDER BY created_at ASC"
        ))
        .bind(status)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(JobRecord::from).collect())
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<JobRecord>, RepoError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(JobRecord::from))
    }

    async fn create_job(&self, job: NewJob) -> Result<JobRecord, RepoError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO jobs (id, job_name, job_group, invoke_target, cron_expression, \
                 misfire_policy, concurrent, status, remark, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(job.job_name)
        .bind(job.job_group)
        .bind(job.invoke_target)
        .bind(job.cron_expression)
        .bind(job.misfire_policy)
        .bind(job.concurrent)
        .bind(job.status)
        .bind(job.remark)
        .bind(job.created_by)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_job(&self, params: UpdateJobParams) -> Result<JobRecord, RepoError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs SET job_name = $2, job_group = $3, invoke_target = $4, \
                 cron_expression = $5, misfire_policy = $6, concurrent = $7, status = $8, \
                 remark = $9, updated_by = $10, updated_at = $11 \
             WHERE id = $1 RETURNING {JOB_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.job_name)
        .bind(params.job_group)
        .bind(params.invoke_target)
        .bind(params.cron_expression)
        .bind(params.misfire_policy)
        .bind(params.concurrent)
        .bind(params.status)
        .bind(params.remark)
        .bind(params.updated_by)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRecord::from).ok_or(RepoError::NotFound)
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        updated_by: &str,
    ) -> Result<JobRecord, RepoError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs SET status = $2, updated_by = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(updated_by)
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_jobs(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl JobLogsRepo for PostgresRepositories {
    async fn append_job_log(&self, record: JobLogRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO job_logs (id, job_id, job_name, job_group, invoke_target, status, \
                 message, exception_info, started_at, finished_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(record.job_id)
        .bind(record.job_name)
        .bind(record.job_group)
        .bind(record.invoke_target)
        .bind(record.status)
        .bind(record.message)
        .bind(record.exception_info)
        .bind(record.started_at)
        .bind(record.finished_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_job_logs(
        &self,
        filter: &JobLogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobLogRecord>, RepoError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM job_logs WHERE 1=1 ");
        push_log_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb =
            QueryBuilder::new(format!("SELECT {JOB_LOG_COLUMNS} FROM job_logs WHERE 1=1 "));
        push_log_filters(&mut qb, filter);
        qb.push(" ORDER BY started_at DESC, id DESC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());
        let rows: Vec<JobLogRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Page::new(
            rows.into_iter().map(JobLogRecord::from).collect(),
            Self::convert_count(total)?,
            page,
        ))
    }

    async fn delete_job_logs(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM job_logs WHERE id = ANY($1)")
            .bind(ids)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn clear_job_logs(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM job_logs")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn purge_job_logs_before(&self, cutoff: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM job_logs WHERE started_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
