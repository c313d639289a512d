//! Admin operation logs and exception logs.

use std::sync::Arc;

use thiserror::Error;
use time::{Date, Duration, OffsetDateTime, macros::format_description};
use tracing::info;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{AdminLogsRepo, ExceptionLogsRepo, LogQueryFilter, RepoError};
use crate::domain::entities::{AdminLogRecord, ExceptionLogRecord};
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Build a filter from raw query values; dates are `YYYY-MM-DD`, both bounds inclusive.
pub fn log_filter(
    username: Option<String>,
    operation: Option<String>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<LogQueryFilter, DomainError> {
    let from = parse_day(from, "from")?.map(|day| day.midnight().assume_utc());
    let to = match parse_day(to, "to")? {
        Some(day) => Some(
            day.midnight()
                .assume_utc()
                .checked_add(Duration::DAY)
                .ok_or_else(|| DomainError::validation("to", "end date is out of range"))?,
        ),
        None => None,
    };
    if let (Some(from), Some(to)) = (from, to)
        && from >= to
    {
        return Err(DomainError::validation("from", "start date is after end date"));
    }

    Ok(LogQueryFilter {
        username: non_blank(username),
        operation: non_blank(operation),
        from,
        to,
    })
}

fn parse_day(raw: Option<&str>, field: &'static str) -> Result<Option<Date>, DomainError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(Some)
        .map_err(|err| DomainError::validation(field, format!("expected YYYY-MM-DD: {err}")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Instant `days` days before now; rejects negative or out-of-range retention.
pub fn retention_cutoff(days: i64) -> Result<OffsetDateTime, DomainError> {
    if days < 0 {
        return Err(DomainError::validation("days", "retention must not be negative"));
    }
    days.checked_mul(86_400)
        .map(Duration::seconds)
        .and_then(|span| OffsetDateTime::now_utc().checked_sub(span))
        .ok_or_else(|| {
            DomainError::validation("days", format!("retention of {days} days is out of range"))
        })
}

#[derive(Clone)]
pub struct AdminLogService {
    repo: Arc<dyn AdminLogsRepo>,
}

impl AdminLogService {
    pub fn new(repo: Arc<dyn AdminLogsRepo>) -> Self {
        Self { repo }
    }

    pub async fn record(&self, record: AdminLogRecord) -> Result<(), LogError> {
        Ok(self.repo.append_admin_log(record).await?)
    }

    pub async fn list(
        &self,
        filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<AdminLogRecord>, LogError> {
        Ok(self.repo.list_admin_logs(filter, page).await?)
    }

    pub async fn delete(&self, ids: &[Uuid]) -> Result<u64, LogError> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.repo.delete_admin_logs(ids).await?)
    }

    /// Drop entries older than `days` days.
    pub async fn purge_older_than(&self, days: i64) -> Result<u64, LogError> {
        let removed = self.repo.purge_admin_logs_before(retention_cutoff(days)?).await?;
        info!(target = "driftwood::logs", removed, days, "admin logs purged");
        Ok(removed)
    }
}

#[derive(Clone)]
pub struct ExceptionLogService {
    repo: Arc<dyn ExceptionLogsRepo>,
}

impl ExceptionLogService {
    pub fn new(repo: Arc<dyn ExceptionLogsRepo>) -> Self {
        Self { repo }
    }

    pub async fn record(&self, record: ExceptionLogRecord) -> Result<(), LogError> {
        Ok(self.repo.append_exception_log(record).await?)
    }

    pub async fn list(
        &self,
        filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<ExceptionLogRecord>, LogError> {
        Ok(self.repo.list_exception_logs(filter, page).await?)
    }

    pub async fn delete(&self, ids: &[Uuid]) -> Result<u64, LogError> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.repo.delete_exception_logs(ids).await?)
    }

    pub async fn purge_older_than(&self, days: i64) -> Result<u64, LogError> {
        let removed = self.repo.purge_exception_logs_before(retention_cutoff(days)?).await?;
        info!(target = "driftwood::logs", removed, days, "exception logs purged");
        Ok(removed)
    }
}
