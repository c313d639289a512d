//! CRUD over scheduled jobs, kept in step with the running scheduler.

use std::sync::Arc;

use driftwood_api_types::JobPayload;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::api_keys::ApiPrincipal;
use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    JobLogQueryFilter, JobLogsRepo, JobQueryFilter, JobsRepo, NewJob, RepoError, UpdateJobParams,
};
use crate::domain::entities::{JobLogRecord, JobRecord};
use crate::domain::error::DomainError;
use crate::domain::types::{JobStatus, MisfirePolicy};

use super::cron_expr::{self, CronError};
use super::invoke::InvokeError;
use super::scheduler::{JobScheduler, SchedulerError};

pub const DEFAULT_JOB_GROUP: &str = "DEFAULT";
const JOB_NAME_MAX_LEN: usize = 64;
const INVOKE_TARGET_MAX_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum JobServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("invalid cron expression")]
    InvalidCron(#[source] CronError),
    #[error("invalid invoke target")]
    InvalidTarget(#[source] InvokeError),
    #[error("job not found")]
    NotFound,
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobDetail {
    pub job: JobRecord,
    pub next_valid_time: Option<OffsetDateTime>,
}

/// Validated form of a [`JobPayload`].
#[derive(Debug, Clone)]
struct JobDraft {
    job_name: String,
    job_group: String,
    invoke_target: String,
    cron_expression: String,
    misfire_policy: MisfirePolicy,
    concurrent: bool,
    status: JobStatus,
    remark: Option<String>,
}

#[derive(Clone)]
pub struct JobService {
    repo: Arc<dyn JobsRepo>,
    logs: Arc<dyn JobLogsRepo>,
    scheduler: JobScheduler,
}

impl JobService {
    pub fn new(repo: Arc<dyn JobsRepo>, logs: Arc<dyn JobLogsRepo>, scheduler: JobScheduler) -> Self {
        Self {
            repo,
            logs,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Schedule every NORMAL job; jobs that fail to schedule are logged and skipped.
    pub async fn init(&self) -> Result<usize, JobServiceError> {
        let jobs = self.repo.list_jobs_by_status(JobStatus::Normal).await?;
        let mut scheduled = 0;
        for job in jobs {
            let id = job.id;
            match self.scheduler.schedule(job) {
                Ok(()) => scheduled += 1,
                Err(err) => {
                    warn!(target = "driftwood::jobs", job_id = %id, error = %err, "job not scheduled");
                }
            }
        }
        info!(target = "driftwood::jobs", scheduled, "job scheduler initialised");
        Ok(scheduled)
    }

    pub async fn list(
        &self,
        filter: &JobQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobRecord>, JobServiceError> {
        Ok(self.repo.list_jobs(filter, page).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<JobDetail, JobServiceError> {
        let job = self.find(id).await?;
        let next_valid_time =
            cron_expr::next_valid_time(&job.cron_expression, OffsetDateTime::now_utc());
        Ok(JobDetail {
            job,
            next_valid_time,
        })
    }

    pub async fn create(
        &self,
        actor: &ApiPrincipal,
        payload: JobPayload,
    ) -> Result<JobRecord, JobServiceError> {
        let draft = self.validate(payload)?;
        let job = self
            .repo
            .create_job(NewJob {
                job_name: draft.job_name,
                job_group: draft.job_group,
                invoke_target: draft.invoke_target,
                cron_expression: draft.cron_expression,
                misfire_policy: draft.misfire_policy,
                concurrent: draft.concurrent,
                status: draft.status,
                remark: draft.remark,
                created_by: actor.name.clone(),
            })
            .await?;

        info!(target = "driftwood::jobs", job_id = %job.id, actor = %actor.name, "job created");
        self.sync(&job)?;
        Ok(job)
    }

    pub async fn update(
        &self,
        actor: &ApiPrincipal,
        id: Uuid,
        payload: JobPayload,
    ) -> Result<JobRecord, JobServiceError> {
        let draft = self.validate(payload)?;
        self.find(id).await?;
        let job = self
            .repo
            .update_job(UpdateJobParams {
                id,
                job_name: draft.job_name,
                job_group: draft.job_group,
                invoke_target: draft.invoke_target,
                cron_expression: draft.cron_expression,
                misfire_policy: draft.misfire_policy,
                concurrent: draft.concurrent,
                status: draft.status,
                remark: draft.remark,
                updated_by: actor.name.clone(),
            })
            .await?;

        info!(target = "driftwood::jobs", job_id = %id, actor = %actor.name, "job updated");
        self.sync(&job)?;
        Ok(job)
    }

    pub async fn delete(&self, actor: &ApiPrincipal, id: Uuid) -> Result<(), JobServiceError> {
        self.scheduler.unschedule(id);
        if self.repo.delete_jobs(&[id]).await? == 0 {
            return Err(JobServiceError::NotFound);
        }
        info!(target = "driftwood::jobs", job_id = %id, actor = %actor.name, "job deleted");
        Ok(())
    }

    pub async fn delete_batch(
        &self,
        actor: &ApiPrincipal,
        ids: &[Uuid],
    ) -> Result<u64, JobServiceError> {
        if ids.is_empty() {
            return Ok(0);
        }
        for id in ids {
            self.scheduler.unschedule(*id);
        }
        let removed = self.repo.delete_jobs(ids).await?;
        info!(target = "driftwood::jobs", removed, actor = %actor.name, "jobs deleted");
        Ok(removed)
    }

    pub async fn change_status(
        &self,
        actor: &ApiPrincipal,
        id: Uuid,
        status: &str,
    ) -> Result<JobRecord, JobServiceError> {
        match status.parse::<JobStatus>()? {
            JobStatus::Normal => self.resume(actor, id).await,
            JobStatus::Pause => self.pause(actor, id).await,
        }
    }

    pub async fn pause(&self, actor: &ApiPrincipal, id: Uuid) -> Result<JobRecord, JobServiceError> {
        self.find(id).await?;
        let job = self
            .repo
            .update_job_status(id, JobStatus::Pause, &actor.name)
            .await?;
        self.scheduler.unschedule(id);
        Ok(job)
    }

    pub async fn resume(&self, actor: &ApiPrincipal, id: Uuid) -> Result<JobRecord, JobServiceError> {
        let current = self.find(id).await?;
        cron_expr::parse(&current.cron_expression).map_err(JobServiceError::InvalidCron)?;
        let job = self
            .repo
            .update_job_status(id, JobStatus::Normal, &actor.name)
            .await?;
        self.scheduler.schedule(job.clone())?;
        Ok(job)
    }

    /// Fire the job once on a detached task, whatever its status.
    pub async fn run_once(&self, id: Uuid) -> Result<(), JobServiceError> {
        let job = self.find(id).await?;
        info!(target = "driftwood::jobs", job_id = %id, "job triggered manually");
        drop(self.scheduler.run_once(job));
        Ok(())
    }

    pub async fn list_logs(
        &self,
        filter: &JobLogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobLogRecord>, JobServiceError> {
        Ok(self.logs.list_job_logs(filter, page).await?)
    }

    pub async fn delete_logs(&self, ids: &[Uuid]) -> Result<u64, JobServiceError> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.logs.delete_job_logs(ids).await?)
    }

    pub async fn clean_logs(&self) -> Result<u64, JobServiceError> {
        let removed = self.logs.clear_job_logs().await?;
        info!(target = "driftwood::jobs", removed, "job logs cleared");
        Ok(removed)
    }

    async fn find(&self, id: Uuid) -> Result<JobRecord, JobServiceError> {
        self.repo
            .find_job(id)
            .await?
            .ok_or(JobServiceError::NotFound)
    }

    fn sync(&self, job: &JobRecord) -> Result<(), JobServiceError> {
        match job.status {
            JobStatus::Normal => self.scheduler.schedule(job.clone())?,
            JobStatus::Pause => {
                self.scheduler.unschedule(job.id);
            }
        }
        Ok(())
    }

    fn validate(&self, payload: JobPayload) -> Result<JobDraft, JobServiceError> {
        let job_name = payload.job_name.trim().to_string();
        if job_name.is_empty() {
            return Err(DomainError::validation("job_name", "must not be empty").into());
        }
        if job_name.chars().count() > JOB_NAME_MAX_LEN {
            return Err(DomainError::validation(
                "job_name",
                format!("at most {JOB_NAME_MAX_LEN} characters"),
            )
            .into());
        }

        let invoke_target = payload.invoke_target.trim().to_string();
        if invoke_target.is_empty() {
            return Err(DomainError::validation("invoke_target", "must not be empty").into());
        }
        if invoke_target.len() > INVOKE_TARGET_MAX_LEN {
            return Err(DomainError::validation("invoke_target", "too long").into());
        }

        cron_expr::parse(&payload.cron_expression).map_err(JobServiceError::InvalidCron)?;
        let cron_expression = payload.cron_expression.trim().to_string();

        self.scheduler
            .registry()
            .resolve(&invoke_target)
            .map_err(JobServiceError::InvalidTarget)?;

        let misfire_policy = match payload.misfire_policy.as_deref().map(str::trim) {
            None | Some("") => MisfirePolicy::Default,
            Some(raw) => raw.parse()?,
        };
        let status = match payload.status.as_deref().map(str::trim) {
            None | Some("") => JobStatus::Normal,
            Some(raw) => raw.parse()?,
        };

        Ok(JobDraft {
            job_name,
            job_group: payload
                .job_group
                .map(|group| group.trim().to_string())
                .filter(|group| !group.is_empty())
                .unwrap_or_else(|| DEFAULT_JOB_GROUP.to_string()),
            invoke_target,
            cron_expression,
            misfire_policy,
            concurrent: payload.concurrent.unwrap_or(false),
            status,
            remark: payload
                .remark
                .map(|remark| remark.trim().to_string())
                .filter(|remark| !remark.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::application::jobs::targets::JobTargetRegistry;
    use crate::application::jobs::targets::testing::RecordingTarget;
    use crate::application::jobs::testing::{MemoryJobLogs, MemoryJobs};
    use crate::domain::api_keys::ApiRole;
    use crate::domain::types::JobRunStatus;

    fn admin() -> ApiPrincipal {
        ApiPrincipal {
            key_id: Uuid::new_v4(),
            name: "admin".into(),
            role: ApiRole::Admin,
        }
    }

    fn service() -> (JobService, Arc<MemoryJobLogs>) {
        let mut registry = JobTargetRegistry::new();
        registry.register(
            "recorder",
            Some("driftwood.jobs.Recorder"),
            Arc::new(RecordingTarget::default()),
        );
        let logs = Arc::new(MemoryJobLogs::default());
        let scheduler = JobScheduler::new(Arc::new(registry), logs.clone(), Duration::from_secs(5));
        (
            JobService::new(Arc::new(MemoryJobs::default()), logs.clone(), scheduler),
            logs,
        )
    }

    fn payload(cron: &str) -> JobPayload {
        JobPayload {
            job_name: " nightly ".into(),
            invoke_target: "recorder.run()".into(),
            cron_expression: cron.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_applies_defaults_and_schedules() {
        let (service, _) = service();
        let job = service
            .create(&admin(), payload("0 0 3 * * ?"))
            .await
            .expect("create");

        assert_eq!(job.job_name, "nightly");
        assert_eq!(job.job_group, DEFAULT_JOB_GROUP);
        assert_eq!(job.misfire_policy, MisfirePolicy::Default);
        assert_eq!(job.status, JobStatus::Normal);
        assert!(!job.concurrent);
        assert_eq!(job.created_by, "admin");
        assert!(service.scheduler().is_scheduled(job.id));

        let detail = service.get(job.id).await.expect("detail");
        assert!(detail.next_valid_time.is_some());
    }

    #[tokio::test]
    async fn invalid_cron_is_rejected_on_create_and_update() {
        let (service, _) = service();
        let err = service
            .create(&admin(), payload("not a cron"))
            .await
            .expect_err("create");
        assert!(matches!(err, JobServiceError::InvalidCron(_)));
        assert_eq!(err.to_string(), "invalid cron expression");

        let job = service
            .create(&admin(), payload("0 0 3 * * ?"))
            .await
            .expect("create");
        let err = service
            .update(&admin(), job.id, payload("0 0 25 * * ?"))
            .await
            .expect_err("update");
        assert!(matches!(err, JobServiceError::InvalidCron(_)));
    }

    #[tokio::test]
    async fn unknown_targets_and_blank_names_are_rejected() {
        let (service, _) = service();
        let mut bad_target = payload("0 0 3 * * ?");
        bad_target.invoke_target = "missing.run()".into();
        assert!(matches!(
            service.create(&admin(), bad_target).await,
            Err(JobServiceError::InvalidTarget(InvokeError::UnknownBean(_)))
        ));

        let mut blank = payload("0 0 3 * * ?");
        blank.job_name = "   ".into();
        assert!(matches!(
            service.create(&admin(), blank).await,
            Err(JobServiceError::Domain(_))
        ));
    }

    #[tokio::test]
    async fn pause_and_resume_follow_the_scheduler() {
        let (service, _) = service();
        let job = service
            .create(&admin(), payload("0 0 3 * * ?"))
            .await
            .expect("create");

        let paused = service
            .change_status(&admin(), job.id, "pause")
            .await
            .expect("pause");
        assert_eq!(paused.status, JobStatus::Pause);
        assert!(!service.scheduler().is_scheduled(job.id));

        let resumed = service.resume(&admin(), job.id).await.expect("resume");
        assert_eq!(resumed.status, JobStatus::Normal);
        assert!(service.scheduler().is_scheduled(job.id));

        assert!(service.change_status(&admin(), job.id, "sleeping").await.is_err());
    }

    #[tokio::test]
    async fn paused_update_unschedules() {
        let (service, _) = service();
        let job = service
            .create(&admin(), payload("0 0 3 * * ?"))
            .await
            .expect("create");
        let mut paused = payload("0 0 4 * * ?");
        paused.status = Some("pause".into());
        service.update(&admin(), job.id, paused).await.expect("update");
        assert!(!service.scheduler().is_scheduled(job.id));
    }

    #[tokio::test]
    async fn delete_unschedules_and_reports_missing() {
        let (service, _) = service();
        let first = service
            .create(&admin(), payload("0 0 3 * * ?"))
            .await
            .expect("first");
        let second = service
            .create(&admin(), payload("0 0 4 * * ?"))
            .await
            .expect("second");

        service.delete(&admin(), first.id).await.expect("delete");
        assert!(!service.scheduler().is_scheduled(first.id));
        assert!(matches!(
            service.delete(&admin(), first.id).await,
            Err(JobServiceError::NotFound)
        ));

        assert_eq!(
            service
                .delete_batch(&admin(), &[second.id, Uuid::new_v4()])
                .await
                .expect("batch"),
            1
        );
        assert_eq!(service.scheduler().scheduled_count(), 0);
    }

    #[tokio::test]
    async fn init_schedules_only_normal_jobs() {
        let (service, _) = service();
        let normal = service
            .create(&admin(), payload("0 0 3 * * ?"))
            .await
            .expect("normal");
        let mut paused = payload("0 0 3 * * ?");
        paused.status = Some("pause".into());
        let paused = service.create(&admin(), paused).await.expect("paused");

        service.scheduler().shutdown();
        assert_eq!(service.init().await.expect("init"), 1);
        assert!(service.scheduler().is_scheduled(normal.id));
        assert!(!service.scheduler().is_scheduled(paused.id));
    }

    #[tokio::test]
    async fn run_once_records_a_log_and_clean_removes_it() {
        let (service, logs) = service();
        let mut paused = payload("0 0 3 * * ?");
        paused.status = Some("pause".into());
        let job = service.create(&admin(), paused).await.expect("create");

        service.run_once(job.id).await.expect("run");
        let recorded = logs.wait_for(1).await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, JobRunStatus::Success);

        let page = service
            .list_logs(
                &JobLogQueryFilter {
                    job_id: Some(job.id),
                    ..Default::default()
                },
                PageRequest::default(),
            )
            .await
            .expect("logs");
        assert_eq!(page.total, 1);

        assert_eq!(service.clean_logs().await.expect("clean"), 1);
        assert!(matches!(
            service.run_once(Uuid::new_v4()).await,
            Err(JobServiceError::NotFound)
        ));
    }
}
