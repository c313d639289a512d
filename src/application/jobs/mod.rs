pub mod cron_expr;
pub mod invoke;
mod maintenance;
mod scheduler;
mod service;
pub mod targets;

#[cfg(test)]
pub(crate) mod testing;

pub use maintenance::{
    MAINTENANCE_ALIAS, MAINTENANCE_BEAN, MaintenanceContext, MaintenanceJob, MaintenanceTarget,
    process_maintenance_job,
};
pub use scheduler::{JobScheduler, MAX_CATCH_UP_RUNS, SchedulerError, misfire_runs};
pub use service::{DEFAULT_JOB_GROUP, JobDetail, JobService, JobServiceError};
pub use targets::{JobTarget, JobTargetRegistry};
