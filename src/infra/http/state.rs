use std::sync::Arc;

use async_trait::async_trait;

use crate::application::ai_chat::AiChatService;
use crate::application::api_keys::ApiKeyService;
use crate::application::email::EmailService;
use crate::application::friend_links::FriendLinkService;
use crate::application::jobs::JobService;
use crate::application::logs::{AdminLogService, ExceptionLogService};
use crate::application::operation_log::OperationLogService;
use crate::application::posts::PostService;
use crate::application::repos::RepoError;
use crate::application::system_config::SystemConfigService;
use crate::infra::db::{PostgresRepositories, map_sqlx_error};

use super::rate_limit::ApiRateLimiter;

/// Liveness of the backing store, reported by `GET health`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<(), RepoError>;
}

#[async_trait]
impl HealthProbe for PostgresRepositories {
    async fn check(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}

/// Services shared by both listeners.
#[derive(Clone)]
pub struct ApiState {
    pub api_keys: ApiKeyService,
    pub posts: PostService,
    pub friend_links: FriendLinkService,
    pub email: EmailService,
    pub ai_chat: AiChatService,
    pub jobs: JobService,
    pub admin_logs: AdminLogService,
    pub exception_logs: ExceptionLogService,
    pub operation_log: OperationLogService,
    pub system_config: SystemConfigService,
    pub rate_limiter: Arc<ApiRateLimiter>,
    /// Keyed by client address; guards the public email code routes.
    pub email_rate_limiter: Arc<ApiRateLimiter>,
    pub health: Arc<dyn HealthProbe>,
}
