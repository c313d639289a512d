//! Audit trail for administrative operations.
//!
//! Routes carry an [`OperationMeta`]; the HTTP middleware gathers the request
//! context and hands it to [`OperationLogService`] once the handler finished.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::application::logs::{AdminLogService, ExceptionLogService};
use crate::domain::entities::{AdminLogRecord, ExceptionLogRecord};

/// Per-route description of an audited operation. `name` may hold `{n}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMeta {
    pub name: &'static str,
    pub save: bool,
}

impl OperationMeta {
    pub const fn new(name: &'static str) -> Self {
        Self { name, save: true }
    }

    /// Checked for admin access but kept out of the admin log on success.
    pub const fn unsaved(name: &'static str) -> Self {
        Self { name, save: false }
    }
}

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\d+)\}").expect("valid placeholder pattern"));

/// Replace `{n}` (1-based) with the JSON rendering of `args[n - 1]`.
///
/// Placeholders without a matching argument are left as they are.
pub fn parse_params(template: &str, args: &[Value]) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            caps.get(1)
                .and_then(|index| index.as_str().parse::<usize>().ok())
                .and_then(|index| index.checked_sub(1))
                .and_then(|index| args.get(index))
                .map_or_else(|| whole.to_string(), Value::to_string)
        })
        .into_owned()
}

/// Every match of `regex` in `text`; the first capture group wins when present.
pub fn match_all(text: Option<&str>, regex: &Regex) -> Option<Vec<String>> {
    let text = text?;
    Some(
        regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().to_string())
            .collect(),
    )
}

/// `prefix` followed by the type path with `.` and `::` turned into `_`.
pub fn operation_key(prefix: Option<&str>, type_path: &str) -> String {
    format!(
        "{}{}",
        prefix.unwrap_or_default(),
        type_path.replace("::", "_").replace('.', "_")
    )
}

/// Request facts captured before the handler runs.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationContext {
    pub username: String,
    pub request_method: String,
    pub request_uri: String,
    pub ip: String,
    pub ip_source: String,
    pub params: Option<String>,
    pub operation: String,
}

#[derive(Clone)]
pub struct OperationLogService {
    admin_logs: AdminLogService,
    exception_logs: ExceptionLogService,
}

impl OperationLogService {
    pub fn new(admin_logs: AdminLogService, exception_logs: ExceptionLogService) -> Self {
        Self {
            admin_logs,
            exception_logs,
        }
    }

    /// Store a successful operation. Storage failures are logged, never returned.
    pub async fn record_success(&self, context: OperationContext, spend_ms: i64) {
        let record = AdminLogRecord {
            id: Uuid::new_v4(),
            username: context.username,
            request_method: context.request_method,
            request_uri: context.request_uri,
            ip: context.ip,
            ip_source: context.ip_source,
            params: context.params,
            operation: context.operation,
            spend_ms,
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(err) = self.admin_logs.record(record).await {
            warn!(target = "driftwood::operation_log", error = %err, "failed to store admin log");
        }
    }

    /// Store a failed operation with its error chain.
    pub async fn record_failure(&self, context: OperationContext, exception_message: String) {
        let record = ExceptionLogRecord {
            id: Uuid::new_v4(),
            username: context.username,
            request_method: context.request_method,
            request_uri: context.request_uri,
            ip: context.ip,
            ip_source: context.ip_source,
            params: context.params,
            operation: context.operation,
            exception_message,
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(err) = self.exception_logs.record(record).await {
            warn!(target = "driftwood::operation_log", error = %err, "failed to store exception log");
        }
    }
}
