//! Response payloads carried in the `data` field of the envelope.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub summary: Option<String>,
    pub content_markdown: String,
    pub content_html: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub cover: Option<String>,
    pub status: String,
    pub author: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendLinkView {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub avatar: Option<String>,
    pub description: Option<String>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub job_name: String,
    pub job_group: String,
    pub invoke_target: String,
    pub cron_expression: String,
    pub misfire_policy: String,
    pub concurrent: bool,
    pub status: String,
    pub remark: Option<String>,
    pub created_by: String,
    pub updated_by: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_valid_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogView {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_name: String,
    pub job_group: String,
    pub invoke_target: String,
    pub status: String,
    pub message: String,
    pub exception_info: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLogView {
    pub id: Uuid,
    pub username: String,
    pub request_method: String,
    pub request_uri: String,
    pub ip: String,
    pub ip_source: String,
    pub params: Option<String>,
    pub operation: String,
    pub spend_ms: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionLogView {
    pub id: Uuid,
    pub username: String,
    pub request_method: String,
    pub request_uri: String,
    pub ip: String,
    pub ip_source: String,
    pub params: Option<String>,
    pub operation: String,
    pub exception_message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfigView {
    pub site_name: String,
    pub site_url: Option<String>,
    pub email_host: Option<String>,
    pub email_port: Option<u16>,
    pub email_username: Option<String>,
    /// Never echoes the secret, only whether one is stored.
    pub email_password_set: bool,
    pub owner_email: Option<String>,
    pub ai_enabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyIssuedView {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub token: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}
