//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{
    FriendLinkStatus, JobRunStatus, JobStatus, MisfirePolicy, PostStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub summary: Option<String>,
    pub body_markdown: String,
    pub body_html: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub cover: Option<String>,
    pub status: PostStatus,
    pub author: String,
    pub published_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriendLinkRecord {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub avatar: Option<String>,
    pub description: Option<String>,
    pub email: String,
    pub status: FriendLinkStatus,
    pub reason: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One successful administrative operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminLogRecord {
    pub id: Uuid,
    pub username: String,
    pub request_method: String,
    pub request_uri: String,
    pub ip: String,
    pub ip_source: String,
    pub params: Option<String>,
    pub operation: String,
    pub spend_ms: i64,
    pub created_at: OffsetDateTime,
}

/// One administrative operation that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionLogRecord {
    pub id: Uuid,
    pub username: String,
    pub request_method: String,
    pub request_uri: String,
    pub ip: String,
    pub ip_source: String,
    pub params: Option<String>,
    pub operation: String,
    pub exception_message: String,
    pub created_at: OffsetDateTime,
}

/// Singleton row holding site and mail-server settings editable at runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemConfigRecord {
    pub site_name: String,
    pub site_url: Option<String>,
    pub email_host: Option<String>,
    pub email_port: Option<i32>,
    pub email_username: Option<String>,
    #[serde(skip_serializing)]
    pub email_password: Option<String>,
    pub owner_email: Option<String>,
    pub ai_enabled: bool,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub job_name: String,
    pub job_group: String,
    pub invoke_target: String,
    pub cron_expression: String,
    pub misfire_policy: MisfirePolicy,
    pub concurrent: bool,
    pub status: JobStatus,
    pub remark: Option<String>,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobLogRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_name: String,
    pub job_group: String,
    pub invoke_target: String,
    pub status: JobRunStatus,
    pub message: String,
    pub exception_info: Option<String>,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
}

/// A one-shot email verification code held until it is consumed or expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCode {
    pub email: String,
    pub code: String,
    pub expires_at: OffsetDateTime,
    pub failed_attempts: u32,
}

impl VerificationCode {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}
