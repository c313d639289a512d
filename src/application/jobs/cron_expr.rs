//! Quartz-style cron expressions on top of the `cron` crate.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 6 or 7 fields, found {0}")]
    FieldCount(usize),
    #[error("{0}")]
    Parse(String),
}

/// Collapse whitespace and turn Quartz's `?` into `*`.
pub fn normalize(expr: &str) -> Result<String, CronError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if !(6..=7).contains(&fields.len()) {
        return Err(CronError::FieldCount(fields.len()));
    }
    Ok(fields
        .iter()
        .map(|field| if *field == "?" { "*" } else { field })
        .collect::<Vec<_>>()
        .join(" "))
}

pub fn parse(expr: &str) -> Result<Schedule, CronError> {
    let normalized = normalize(expr)?;
    Schedule::from_str(&normalized).map_err(|err| CronError::Parse(err.to_string()))
}

pub fn validate(expr: &str) -> bool {
    parse(expr).is_ok()
}

/// First fire time strictly after `after`, or `None` for invalid or exhausted expressions.
pub fn next_valid_time(expr: &str, after: OffsetDateTime) -> Option<OffsetDateTime> {
    let schedule = parse(expr).ok()?;
    schedule.after(&to_chrono(after)?).next().and_then(from_chrono)
}

pub(crate) fn to_chrono(at: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(at.unix_timestamp(), at.nanosecond())
}

pub(crate) fn from_chrono(at: DateTime<Utc>) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).ok()
}
