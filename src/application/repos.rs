//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::domain::api_keys::{ApiKeyRecord, ApiRole};
use crate::domain::entities::{
    AdminLogRecord, ExceptionLogRecord, FriendLinkRecord, JobLogRecord, JobRecord, PostRecord,
    SystemConfigRecord,
};
use crate::domain::types::{FriendLinkStatus, JobRunStatus, JobStatus, MisfirePolicy, PostStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostQueryFilter {
    pub status: Option<PostStatus>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
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
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub body_markdown: String,
    pub body_html: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub cover: Option<String>,
    pub status: PostStatus,
    pub published_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn list_posts(
        &self,
        filter: &PostQueryFilter,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, RepoError>;

    /// Every post of one author regardless of status, newest first.
    async fn list_by_author(
        &self,
        author: &str,
        category: Option<&str>,
        tag: Option<&str>,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_post(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewFriendLink {
    pub name: String,
    pub url: String,
    pub avatar: Option<String>,
    pub description: Option<String>,
    pub email: String,
}

#[async_trait]
pub trait FriendLinksRepo: Send + Sync {
    async fn create_link(&self, link: NewFriendLink) -> Result<FriendLinkRecord, RepoError>;

    async fn find_link(&self, id: Uuid) -> Result<Option<FriendLinkRecord>, RepoError>;

    async fn list_links(
        &self,
        status: Option<FriendLinkStatus>,
    ) -> Result<Vec<FriendLinkRecord>, RepoError>;

    async fn update_link_status(
        &self,
        id: Uuid,
        status: FriendLinkStatus,
        reason: Option<String>,
    ) -> Result<FriendLinkRecord, RepoError>;

    async fn delete_links(&self, ids: &[Uuid]) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone, Default)]
pub struct LogQueryFilter {
    pub username: Option<String>,
    pub operation: Option<String>,
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
}

#[async_trait]
pub trait AdminLogsRepo: Send + Sync {
    async fn append_admin_log(&self, record: AdminLogRecord) -> Result<(), RepoError>;

    async fn list_admin_logs(
        &self,
        filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<AdminLogRecord>, RepoError>;

    async fn delete_admin_logs(&self, ids: &[Uuid]) -> Result<u64, RepoError>;

    async fn purge_admin_logs_before(&self, cutoff: OffsetDateTime) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait ExceptionLogsRepo: Send + Sync {
    async fn append_exception_log(&self, record: ExceptionLogRecord) -> Result<(), RepoError>;

    async fn list_exception_logs(
        &self,
        filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<ExceptionLogRecord>, RepoError>;

    async fn delete_exception_logs(&self, ids: &[Uuid]) -> Result<u64, RepoError>;

    async fn purge_exception_logs_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait SystemConfigRepo: Send + Sync {
    async fn load_config(&self) -> Result<Option<SystemConfigRecord>, RepoError>;

    async fn save_config(&self, record: SystemConfigRecord)
    -> Result<SystemConfigRecord, RepoError>;
}

#[derive(Debug, Clone, Default)]
pub struct JobQueryFilter {
    pub job_name: Option<String>,
    pub job_group: Option<String>,
    pub status: Option<JobStatus>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_name: String,
    pub job_group: String,
    pub invoke_target: String,
    pub cron_expression: String,
    pub misfire_policy: MisfirePolicy,
    pub concurrent: bool,
    pub status: JobStatus,
    pub remark: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone)]
pub struct UpdateJobParams {
    pub id: Uuid,
    pub job_name: String,
    pub job_group: String,
    pub invoke_target: String,
    pub cron_expression: String,
    pub misfire_policy: MisfirePolicy,
    pub concurrent: bool,
    pub status: JobStatus,
    pub remark: Option<String>,
    pub updated_by: String,
}

#[async_trait]
pub trait JobsRepo: Send + Sync {
    async fn list_jobs(
        &self,
        filter: &JobQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobRecord>, RepoError>;

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, RepoError>;

    async fn find_job(&self, id: Uuid) -> Result<Option<JobRecord>, RepoError>;

    async fn create_job(&self, job: NewJob) -> Result<JobRecord, RepoError>;

    async fn update_job(&self, params: UpdateJobParams) -> Result<JobRecord, RepoError>;

    async fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        updated_by: &str,
    ) -> Result<JobRecord, RepoError>;

    async fn delete_jobs(&self, ids: &[Uuid]) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone, Default)]
pub struct JobLogQueryFilter {
    pub job_id: Option<Uuid>,
    pub status: Option<JobRunStatus>,
}

#[async_trait]
pub trait JobLogsRepo: Send + Sync {
    async fn append_job_log(&self, record: JobLogRecord) -> Result<(), RepoError>;

    async fn list_job_logs(
        &self,
        filter: &JobLogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobLogRecord>, RepoError>;

    async fn delete_job_logs(&self, ids: &[Uuid]) -> Result<u64, RepoError>;

    async fn clear_job_logs(&self) -> Result<u64, RepoError>;

    async fn purge_job_logs_before(&self, cutoff: OffsetDateTime) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateApiKeyParams {
    pub name: String,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub role: ApiRole,
    pub expires_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait ApiKeysRepo: Send + Sync {
    async fn create_key(&self, params: CreateApiKeyParams) -> Result<ApiKeyRecord, RepoError>;

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError>;

    async fn update_last_used(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError>;

    async fn revoke_key(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError>;

    /// Remove keys whose expiry lies before `now`; returns how many were removed.
    async fn purge_expired_keys(&self, now: OffsetDateTime) -> Result<u64, RepoError>;
}
