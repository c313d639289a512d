//! Built-in housekeeping: the `maintenance` job target and the fixed cron worker.

use std::sync::Arc;

use apalis::prelude::*;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::api_keys::ApiKeyService;
use crate::application::email::EmailService;
use crate::application::logs::{AdminLogService, ExceptionLogService, retention_cutoff};
use crate::application::repos::JobLogsRepo;

use super::invoke::{InvokeArg, InvokeError};
use super::targets::JobTarget;

pub const MAINTENANCE_BEAN: &str = "maintenance";
pub const MAINTENANCE_ALIAS: &str = "driftwood.jobs.MaintenanceTarget";

const METHODS: &[&str] = &[
    "ping",
    "purgeAdminLogs",
    "purgeExceptionLogs",
    "purgeJobLogs",
    "purgeExpiredCodes",
];

/// Invokable from user-defined jobs, e.g. `maintenance.purgeAdminLogs(30L)`.
#[derive(Clone)]
pub struct MaintenanceTarget {
    admin_logs: AdminLogService,
    exception_logs: ExceptionLogService,
    job_logs: Arc<dyn JobLogsRepo>,
    email: EmailService,
}

impl MaintenanceTarget {
    pub fn new(
        admin_logs: AdminLogService,
        exception_logs: ExceptionLogService,
        job_logs: Arc<dyn JobLogsRepo>,
        email: EmailService,
    ) -> Self {
        Self {
            admin_logs,
            exception_logs,
            job_logs,
            email,
        }
    }
}

fn no_args(method: &str, args: &[InvokeArg]) -> Result<(), InvokeError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(InvokeError::InvalidArgument(format!(
            "{method} takes no arguments"
        )))
    }
}

fn days_arg(method: &str, args: &[InvokeArg]) -> Result<i64, InvokeError> {
    match args {
        [arg] => {
            let days = arg
                .as_i64()
                .ok_or_else(|| InvokeError::InvalidArgument(format!("{method}: {arg:?}")))?;
            retention_cutoff(days)
                .map_err(|err| InvokeError::InvalidArgument(format!("{method}: {err}")))?;
            Ok(days)
        }
        _ => Err(InvokeError::InvalidArgument(format!(
            "{method} takes one day count"
        ))),
    }
}

fn failed(err: impl std::fmt::Display) -> InvokeError {
    InvokeError::Failed(err.to_string())
}

#[async_trait]
impl JobTarget for MaintenanceTarget {
    fn methods(&self) -> &'static [&'static str] {
        METHODS
    }

    async fn invoke(&self, method: &str, args: &[InvokeArg]) -> Result<(), InvokeError> {
        match method {
            "ping" => {
                no_args(method, args)?;
                info!(target = "driftwood::jobs::maintenance", "ping");
            }
            "purgeAdminLogs" => {
                let days = days_arg(method, args)?;
                self.admin_logs.purge_older_than(days).await.map_err(failed)?;
            }
            "purgeExceptionLogs" => {
                let days = days_arg(method, args)?;
                self.exception_logs
                    .purge_older_than(days)
                    .await
                    .map_err(failed)?;
            }
            "purgeJobLogs" => {
                let days = days_arg(method, args)?;
                let cutoff = retention_cutoff(days)
                    .map_err(|err| InvokeError::InvalidArgument(format!("{method}: {err}")))?;
                let removed = self
                    .job_logs
                    .purge_job_logs_before(cutoff)
                    .await
                    .map_err(failed)?;
                info!(target = "driftwood::jobs::maintenance", removed, days, "job logs purged");
            }
            "purgeExpiredCodes" => {
                no_args(method, args)?;
                let removed = self.email.purge_expired_codes();
                info!(target = "driftwood::jobs::maintenance", removed, "verification codes purged");
            }
            other => {
                return Err(InvokeError::UnknownMethod {
                    bean: MAINTENANCE_BEAN.to_string(),
                    method: other.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Tick of the fixed housekeeping cron worker.
#[derive(Default, Debug, Clone)]
pub struct MaintenanceJob;

impl From<chrono::DateTime<chrono::Utc>> for MaintenanceJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct MaintenanceContext {
    pub api_keys: ApiKeyService,
    pub email: EmailService,
}

/// Drop expired verification codes and expired API keys. Failures are logged only.
pub async fn process_maintenance_job(
    _job: MaintenanceJob,
    ctx: Data<MaintenanceContext>,
) -> Result<(), Error> {
    let codes = ctx.email.purge_expired_codes();
    match ctx.api_keys.expire_keys().await {
        Ok(keys) if keys > 0 || codes > 0 => {
            info!(
                target = "driftwood::jobs::maintenance",
                expired_keys = keys,
                expired_codes = codes,
                "maintenance sweep"
            );
        }
        Ok(_) => {}
        Err(err) => {
            warn!(target = "driftwood::jobs::maintenance", error = %err, "failed to expire API keys");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::application::email::testing::ready_service;
    use crate::application::jobs::testing::{MemoryJobLogs, NullLogs, log_entry};

    async fn target() -> (MaintenanceTarget, Arc<MemoryJobLogs>) {
        let (email, _) = ready_service().await;
        let logs = Arc::new(NullLogs);
        let job_logs = Arc::new(MemoryJobLogs::default());
        let target = MaintenanceTarget::new(
            AdminLogService::new(logs.clone()),
            ExceptionLogService::new(logs),
            job_logs.clone(),
            email,
        );
        (target, job_logs)
    }

    #[tokio::test]
    async fn purge_job_logs_keeps_recent_entries() {
        let (target, job_logs) = target().await;
        job_logs
            .push(log_entry(OffsetDateTime::now_utc() - Duration::days(10)))
            .await;
        job_logs.push(log_entry(OffsetDateTime::now_utc())).await;

        target
            .invoke("purgeJobLogs", &[InvokeArg::Long(7)])
            .await
            .expect("purge");
        assert_eq!(job_logs.len().await, 1);
    }

    #[tokio::test]
    async fn argument_shapes_are_checked() {
        let (target, _) = target().await;
        target.invoke("ping", &[]).await.expect("ping");
        target.invoke("purgeExpiredCodes", &[]).await.expect("codes");
        target
            .invoke("purgeAdminLogs", &[InvokeArg::Integer(30)])
            .await
            .expect("integer days");

        for (method, args) in [
            ("ping", vec![InvokeArg::Bool(true)]),
            ("purgeAdminLogs", vec![]),
            ("purgeExceptionLogs", vec![InvokeArg::Str("30".into())]),
            ("purgeJobLogs", vec![InvokeArg::Long(-1)]),
            ("purgeJobLogs", vec![InvokeArg::Long(i64::MAX)]),
            ("purgeJobLogs", vec![InvokeArg::Long(5_000_000)]),
            ("purgeAdminLogs", vec![InvokeArg::Long(i64::MAX)]),
            ("purgeExceptionLogs", vec![InvokeArg::Long(5_000_000)]),
        ] {
            assert!(
                matches!(
                    target.invoke(method, &args).await,
                    Err(InvokeError::InvalidArgument(_))
                ),
                "{method}"
            );
        }
    }
}
