//! Tokio-driven cron scheduler for user-defined jobs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use cron::Schedule;
use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::repos::JobLogsRepo;
use crate::domain::entities::{JobLogRecord, JobRecord};
use crate::domain::types::{JobRunStatus, MisfirePolicy};

use super::cron_expr::{self, CronError};
use super::targets::JobTargetRegistry;

/// Upper bound on catch-up runs after a long stall.
pub const MAX_CATCH_UP_RUNS: usize = 10;

const EXCEPTION_INFO_LIMIT: usize = 2000;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression: {0}")]
    Cron(#[from] CronError),
}

/// How many runs to perform for `missed` overdue fire times.
pub fn misfire_runs(policy: MisfirePolicy, missed: usize) -> usize {
    if missed == 0 {
        return 0;
    }
    match policy {
        MisfirePolicy::Default | MisfirePolicy::FireAndProceed => 1,
        MisfirePolicy::IgnoreMisfires => missed.min(MAX_CATCH_UP_RUNS),
        MisfirePolicy::DoNothing => 0,
    }
}

#[derive(Clone)]
struct JobRunner {
    registry: Arc<JobTargetRegistry>,
    logs: Arc<dyn JobLogsRepo>,
}

impl JobRunner {
    async fn run(&self, job: &JobRecord) -> JobRunStatus {
        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();
        let outcome = self.registry.invoke_target(&job.invoke_target).await;
        let elapsed_ms = clock.elapsed().as_millis();

        let (status, exception_info) = match outcome {
            Ok(()) => (JobRunStatus::Success, None),
            Err(err) => {
                warn!(
                    target = "driftwood::jobs::scheduler",
                    job_id = %job.id,
                    job = %job.job_name,
                    error = %err,
                    "job run failed"
                );
                let info: String = err.to_string().chars().take(EXCEPTION_INFO_LIMIT).collect();
                (JobRunStatus::Failure, Some(info))
            }
        };

        counter!("driftwood_job_runs_total", "status" => status.as_str()).increment(1);
        histogram!("driftwood_job_run_ms").record(elapsed_ms as f64);

        let record = JobLogRecord {
            id: Uuid::new_v4(),
            job_id: job.id,
            job_name: job.job_name.clone(),
            job_group: job.job_group.clone(),
            invoke_target: job.invoke_target.clone(),
            status,
            message: format!("{} elapsed: {elapsed_ms} ms", job.job_name),
            exception_info,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
        };
        if let Err(err) = self.logs.append_job_log(record).await {
            warn!(target = "driftwood::jobs::scheduler", error = %err, "failed to store job log");
        }
        status
    }
}

/// One task per scheduled job, keyed by job id.
#[derive(Clone)]
pub struct JobScheduler {
    runner: JobRunner,
    misfire_threshold: Duration,
    tasks: Arc<DashMap<Uuid, JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(
        registry: Arc<JobTargetRegistry>,
        logs: Arc<dyn JobLogsRepo>,
        misfire_threshold: Duration,
    ) -> Self {
        Self {
            runner: JobRunner { registry, logs },
            misfire_threshold,
            tasks: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &JobTargetRegistry {
        &self.runner.registry
    }

    /// Start (or restart) the task for `job`.
    pub fn schedule(&self, job: JobRecord) -> Result<(), SchedulerError> {
        let schedule = cron_expr::parse(&job.cron_expression)?;
        let id = job.id;
        info!(
            target = "driftwood::jobs::scheduler",
            job_id = %id,
            job = %job.job_name,
            cron = %job.cron_expression,
            "job scheduled"
        );

        let handle = tokio::spawn(drive(
            self.runner.clone(),
            job,
            schedule,
            self.misfire_threshold,
        ));
        if let Some(previous) = self.tasks.insert(id, handle) {
            previous.abort();
        }
        self.publish_gauge();
        Ok(())
    }

    pub fn unschedule(&self, id: Uuid) -> bool {
        let removed = self.tasks.remove(&id).map(|(_, handle)| handle.abort());
        self.publish_gauge();
        removed.is_some()
    }

    pub fn is_scheduled(&self, id: Uuid) -> bool {
        self.tasks
            .get(&id)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn scheduled_count(&self) -> usize {
        self.tasks.len()
    }

    /// Run `job` once on a detached task, whatever its status.
    pub fn run_once(&self, job: JobRecord) -> JoinHandle<JobRunStatus> {
        let runner = self.runner.clone();
        tokio::spawn(async move { runner.run(&job).await })
    }

    pub fn shutdown(&self) {
        let count = self.tasks.len();
        self.tasks.retain(|_, handle| {
            handle.abort();
            false
        });
        self.publish_gauge();
        info!(target = "driftwood::jobs::scheduler", count, "scheduler stopped");
    }

    fn publish_gauge(&self) {
        gauge!("driftwood_jobs_scheduled").set(self.tasks.len() as f64);
    }
}

async fn drive(runner: JobRunner, job: JobRecord, schedule: Schedule, threshold: Duration) {
    let threshold = TimeDelta::from_std(threshold).unwrap_or_else(|_| TimeDelta::zero());
    let mut cursor = Utc::now();

    loop {
        let Some(next) = schedule.after(&cursor).next() else {
            debug!(target = "driftwood::jobs::scheduler", job_id = %job.id, "no further fire times");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let now = Utc::now().max(next);
        let due = schedule
            .after(&cursor)
            .take_while(|at| *at <= now)
            .take(MAX_CATCH_UP_RUNS + 1)
            .count()
            .max(1);
        cursor = now;

        let runs = if due == 1 && now - next <= threshold {
            1
        } else {
            let runs = misfire_runs(job.misfire_policy, due);
            warn!(
                target = "driftwood::jobs::scheduler",
                job_id = %job.id,
                missed = due,
                runs,
                policy = %job.misfire_policy,
                "job misfired"
            );
            runs
        };

        for _ in 0..runs {
            if job.concurrent {
                let runner = runner.clone();
                let job = job.clone();
                tokio::spawn(async move {
                    runner.run(&job).await;
                });
            } else {
                runner.run(&job).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::jobs::targets::testing::RecordingTarget;
    use crate::application::jobs::testing::{MemoryJobLogs, job_record};

    fn scheduler(fail: bool) -> (JobScheduler, Arc<RecordingTarget>, Arc<MemoryJobLogs>) {
        let target = Arc::new(RecordingTarget {
            fail,
            ..Default::default()
        });
        let mut registry = JobTargetRegistry::new();
        registry.register("recorder", None, target.clone());
        let logs = Arc::new(MemoryJobLogs::default());
        let scheduler = JobScheduler::new(Arc::new(registry), logs.clone(), Duration::from_secs(5));
        (scheduler, target, logs)
    }

    #[test]
    fn misfire_policy_table() {
        assert_eq!(misfire_runs(MisfirePolicy::Default, 4), 1);
        assert_eq!(misfire_runs(MisfirePolicy::IgnoreMisfires, 4), 4);
        assert_eq!(misfire_runs(MisfirePolicy::IgnoreMisfires, 50), MAX_CATCH_UP_RUNS);
        assert_eq!(misfire_runs(MisfirePolicy::FireAndProceed, 4), 1);
        assert_eq!(misfire_runs(MisfirePolicy::DoNothing, 4), 0);
        assert_eq!(misfire_runs(MisfirePolicy::IgnoreMisfires, 0), 0);
    }

    #[tokio::test]
    async fn scheduled_job_fires_and_logs() {
        let (scheduler, target, logs) = scheduler(false);
        let job = job_record("recorder.run()", "* * * * * ?", false);
        scheduler.schedule(job.clone()).expect("schedule");
        assert!(scheduler.is_scheduled(job.id));

        let recorded = logs.wait_for(1).await;
        assert!(!recorded.is_empty());
        assert_eq!(recorded[0].job_id, job.id);
        assert_eq!(recorded[0].status, JobRunStatus::Success);
        assert!(recorded[0].message.contains("elapsed"));
        assert!(!target.calls().is_empty());

        assert!(scheduler.unschedule(job.id));
        assert!(!scheduler.is_scheduled(job.id));
        assert!(!scheduler.unschedule(job.id));
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_task() {
        let (scheduler, _, _) = scheduler(false);
        let job = job_record("recorder.run()", "0 0 3 * * ?", false);
        scheduler.schedule(job.clone()).expect("first");
        scheduler.schedule(job.clone()).expect("second");
        assert_eq!(scheduler.scheduled_count(), 1);

        scheduler.shutdown();
        assert_eq!(scheduler.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn invalid_cron_is_not_scheduled() {
        let (scheduler, _, _) = scheduler(false);
        let job = job_record("recorder.run()", "every day", false);
        assert!(matches!(
            scheduler.schedule(job.clone()),
            Err(SchedulerError::Cron(_))
        ));
        assert!(!scheduler.is_scheduled(job.id));
    }

    #[tokio::test]
    async fn failed_run_keeps_exception_info() {
        let (scheduler, _, logs) = scheduler(true);
        let job = job_record("recorder.run()", "0 0 3 * * ?", false);
        let status = scheduler.run_once(job).await.expect("join");
        assert_eq!(status, JobRunStatus::Failure);

        let recorded = logs.all().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].exception_info.as_deref(),
            Some("job target failed: boom")
        );
    }

    #[tokio::test]
    async fn unknown_target_is_a_failed_run() {
        let (scheduler, _, logs) = scheduler(false);
        let job = job_record("missing.run()", "0 0 3 * * ?", false);
        assert_eq!(
            scheduler.run_once(job).await.expect("join"),
            JobRunStatus::Failure
        );
        assert_eq!(logs.len().await, 1);
    }
}
