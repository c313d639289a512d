//! In-memory stores shared by the job tests.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    AdminLogsRepo, ExceptionLogsRepo, JobLogQueryFilter, JobLogsRepo, JobQueryFilter, JobsRepo,
    LogQueryFilter, NewJob, RepoError, UpdateJobParams,
};
use crate::domain::entities::{AdminLogRecord, ExceptionLogRecord, JobLogRecord, JobRecord};
use crate::domain::types::{JobRunStatus, JobStatus, MisfirePolicy};

#[derive(Default)]
pub struct MemoryJobLogs {
    logs: Mutex<Vec<JobLogRecord>>,
}

impl MemoryJobLogs {
    pub async fn push(&self, record: JobLogRecord) {
        self.logs.lock().await.push(record);
    }

    pub async fn len(&self) -> usize {
        self.logs.lock().await.len()
    }

    pub async fn all(&self) -> Vec<JobLogRecord> {
        self.logs.lock().await.clone()
    }

    /// Poll until `count` runs were recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<JobLogRecord> {
        for _ in 0..300 {
            if self.len().await >= count {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.all().await
    }
}

#[async_trait]
impl JobLogsRepo for MemoryJobLogs {
    async fn append_job_log(&self, record: JobLogRecord) -> Result<(), RepoError> {
        self.push(record).await;
        Ok(())
    }

    async fn list_job_logs(
        &self,
        filter: &JobLogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobLogRecord>, RepoError> {
        let items = self
            .all()
            .await
            .into_iter()
            .filter(|log| filter.job_id.is_none_or(|id| log.job_id == id))
            .filter(|log| filter.status.is_none_or(|status| log.status == status))
            .collect();
        Ok(Page::from_vec(items, page))
    }

    async fn delete_job_logs(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let mut logs = self.logs.lock().await;
        let before = logs.len();
        logs.retain(|log| !ids.contains(&log.id));
        Ok((before - logs.len()) as u64)
    }

    async fn clear_job_logs(&self) -> Result<u64, RepoError> {
        let mut logs = self.logs.lock().await;
        let removed = logs.len() as u64;
        logs.clear();
        Ok(removed)
    }

    async fn purge_job_logs_before(&self, cutoff: OffsetDateTime) -> Result<u64, RepoError> {
        let mut logs = self.logs.lock().await;
        let before = logs.len();
        logs.retain(|log| log.started_at >= cutoff);
        Ok((before - logs.len()) as u64)
    }
}

/// Admin and exception log store that keeps nothing.
pub struct NullLogs;

#[async_trait]
impl AdminLogsRepo for NullLogs {
    async fn append_admin_log(&self, _record: AdminLogRecord) -> Result<(), RepoError> {
        Ok(())
    }

    async fn list_admin_logs(
        &self,
        _filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<AdminLogRecord>, RepoError> {
        Ok(Page::from_vec(Vec::new(), page))
    }

    async fn delete_admin_logs(&self, _ids: &[Uuid]) -> Result<u64, RepoError> {
        Ok(0)
    }

    async fn purge_admin_logs_before(&self, _cutoff: OffsetDateTime) -> Result<u64, RepoError> {
        Ok(0)
    }
}

#[async_trait]
impl ExceptionLogsRepo for NullLogs {
    async fn append_exception_log(&self, _record: ExceptionLogRecord) -> Result<(), RepoError> {
        Ok(())
    }

    async fn list_exception_logs(
        &self,
        _filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<ExceptionLogRecord>, RepoError> {
        Ok(Page::from_vec(Vec::new(), page))
    }

    async fn delete_exception_logs(&self, _ids: &[Uuid]) -> Result<u64, RepoError> {
        Ok(0)
    }

    async fn purge_exception_logs_before(
        &self,
        _cutoff: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        Ok(0)
    }
}

#[derive(Default)]
pub struct MemoryJobs {
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
}

#[async_trait]
impl JobsRepo for MemoryJobs {
    async fn list_jobs(
        &self,
        filter: &JobQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobRecord>, RepoError> {
        let mut items: Vec<JobRecord> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| {
                filter
                    .job_name
                    .as_deref()
                    .is_none_or(|name| job.job_name.contains(name))
            })
            .filter(|job| filter.job_group.as_deref().is_none_or(|g| job.job_group == g))
            .filter(|job| filter.status.is_none_or(|s| job.status == s))
            .cloned()
            .collect();
        items.sort_by_key(|job| job.created_at);
        Ok(Page::from_vec(items, page))
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, RepoError> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.status == status)
            .cloned()
            .collect())
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<JobRecord>, RepoError> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn create_job(&self, job: NewJob) -> Result<JobRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = JobRecord {
            id: Uuid::new_v4(),
            job_name: job.job_name,
            job_group: job.job_group,
            invoke_target: job.invoke_target,
            cron_expression: job.cron_expression,
            misfire_policy: job.misfire_policy,
            concurrent: job.concurrent,
            status: job.status,
            remark: job.remark,
            created_by: job.created_by,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_job(&self, params: UpdateJobParams) -> Result<JobRecord, RepoError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        job.job_name = params.job_name;
        job.job_group = params.job_group;
        job.invoke_target = params.invoke_target;
        job.cron_expression = params.cron_expression;
        job.misfire_policy = params.misfire_policy;
        job.concurrent = params.concurrent;
        job.status = params.status;
        job.remark = params.remark;
        job.updated_by = Some(params.updated_by);
        job.updated_at = OffsetDateTime::now_utc();
        Ok(job.clone())
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        updated_by: &str,
    ) -> Result<JobRecord, RepoError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(RepoError::NotFound)?;
        job.status = status;
        job.updated_by = Some(updated_by.to_string());
        Ok(job.clone())
    }

    async fn delete_jobs(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let mut jobs = self.jobs.lock().await;
        Ok(ids.iter().filter(|id| jobs.remove(id).is_some()).count() as u64)
    }
}

pub fn log_entry(started_at: OffsetDateTime) -> JobLogRecord {
    JobLogRecord {
        id: Uuid::new_v4(),
        job_id: Uuid::new_v4(),
        job_name: "sweep".into(),
        job_group: "DEFAULT".into(),
        invoke_target: "maintenance.ping()".into(),
        status: JobRunStatus::Success,
        message: "sweep elapsed 1 ms".into(),
        exception_info: None,
        started_at,
        finished_at: started_at,
    }
}

pub fn job_record(invoke_target: &str, cron_expression: &str, concurrent: bool) -> JobRecord {
    let now = OffsetDateTime::now_utc();
    JobRecord {
        id: Uuid::new_v4(),
        job_name: "recorder".into(),
        job_group: "DEFAULT".into(),
        invoke_target: invoke_target.into(),
        cron_expression: cron_expression.into(),
        misfire_policy: MisfirePolicy::Default,
        concurrent,
        status: JobStatus::Normal,
        remark: None,
        created_by: "admin".into(),
        updated_by: None,
        created_at: now,
        updated_at: now,
    }
}
