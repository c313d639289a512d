use std::error::Error as StdError;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use driftwood_api_types::ResponseResult;

use crate::application::ai_chat::AiChatError;
use crate::application::api_keys::{ApiAuthError, ApiKeyError};
use crate::application::email::EmailError;
use crate::application::error::{ErrorReport, error_chain};
use crate::application::friend_links::FriendLinkError;
use crate::application::jobs::JobServiceError;
use crate::application::logs::LogError;
use crate::application::posts::PostError;
use crate::application::repos::RepoError;
use crate::application::system_config::SystemConfigError;
use crate::domain::error::DomainError;

/// Failure rendered as a failure envelope with a matching HTTP status.
///
/// The full error chain travels in an [`ErrorReport`] on the response so
/// `log_responses` and the operation logger can read it.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    source: &'static str,
    message: String,
    chain: Vec<String>,
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(source: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status,
            source,
            chain: vec![message.clone()],
            message,
            retry_after: None,
        }
    }

    /// Message is the outermost error; the report keeps the whole chain.
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        Self {
            status,
            source,
            message: error.to_string(),
            chain: error_chain(error),
            retry_after: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("infra::http::request", StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("infra::http::auth", StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("infra::http::auth", StatusCode::FORBIDDEN, message)
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(
                "infra::http::rate_limit",
                StatusCode::TOO_MANY_REQUESTS,
                format!("rate limit exceeded, retry after {retry_after} seconds"),
            )
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = ResponseResult::<()>::error_message(self.message);
        if let Some(retry_after) = self.retry_after {
            body = body.put_extra("retry_after", retry_after);
        }
        let mut response = (self.status, Json(body)).into_response();
        if let Some(retry_after) = self.retry_after
            && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        ErrorReport {
            source: self.source,
            status: self.status,
            messages: self.chain,
        }
        .attach(&mut response);
        response
    }
}

/// Consistent status mapping for repository failures across both listeners.
pub fn repo_error_to_api(source: &'static str, err: RepoError) -> ApiError {
    let status = match &err {
        RepoError::Duplicate { .. } | RepoError::Integrity { .. } => StatusCode::CONFLICT,
        RepoError::NotFound => StatusCode::NOT_FOUND,
        RepoError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        RepoError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        RepoError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    ApiError::from_error(source, status, &err)
}

fn domain_to_api(source: &'static str, err: DomainError) -> ApiError {
    ApiError::from_error(source, StatusCode::BAD_REQUEST, &err)
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        domain_to_api("domain", err)
    }
}

impl From<ApiAuthError> for ApiError {
    fn from(err: ApiAuthError) -> Self {
        ApiError::from_error("infra::http::auth", StatusCode::UNAUTHORIZED, &err)
    }
}

impl From<ApiKeyError> for ApiError {
    fn from(err: ApiKeyError) -> Self {
        const SOURCE: &str = "application::api_keys";
        match err {
            ApiKeyError::Repo(repo) => repo_error_to_api(SOURCE, repo),
            other => ApiError::from_error(SOURCE, StatusCode::BAD_REQUEST, &other),
        }
    }
}

impl From<PostError> for ApiError {
    fn from(err: PostError) -> Self {
        const SOURCE: &str = "application::posts";
        let status = match err {
            PostError::Domain(domain) => return domain_to_api(SOURCE, domain),
            PostError::Repo(repo) => return repo_error_to_api(SOURCE, repo),
            PostError::NotFound => StatusCode::NOT_FOUND,
            PostError::Forbidden => StatusCode::FORBIDDEN,
            PostError::Slug(_) => StatusCode::CONFLICT,
        };
        ApiError::from_error(SOURCE, status, &err)
    }
}

impl From<FriendLinkError> for ApiError {
    fn from(err: FriendLinkError) -> Self {
        const SOURCE: &str = "application::friend_links";
        match err {
            FriendLinkError::Domain(domain) => domain_to_api(SOURCE, domain),
            FriendLinkError::Repo(repo) => repo_error_to_api(SOURCE, repo),
            FriendLinkError::NotFound => {
                ApiError::from_error(SOURCE, StatusCode::NOT_FOUND, &err)
            }
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(err: EmailError) -> Self {
        const SOURCE: &str = "application::email";
        let status = match err {
            EmailError::Repo(repo) => return repo_error_to_api(SOURCE, repo),
            EmailError::EmptyRecipient
            | EmailError::InvalidRecipient(_)
            | EmailError::CodeRejected => StatusCode::BAD_REQUEST,
            EmailError::NotInitialized
            | EmailError::SenderMissing
            | EmailError::InvalidSender(_) => StatusCode::SERVICE_UNAVAILABLE,
            EmailError::Mail(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::from_error(SOURCE, status, &err)
    }
}

impl From<AiChatError> for ApiError {
    fn from(err: AiChatError) -> Self {
        let status = match err {
            AiChatError::EmptyMessage => StatusCode::BAD_REQUEST,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        ApiError::from_error("application::ai_chat", status, &err)
    }
}

impl From<JobServiceError> for ApiError {
    fn from(err: JobServiceError) -> Self {
        const SOURCE: &str = "application::jobs";
        let status = match err {
            JobServiceError::Domain(domain) => return domain_to_api(SOURCE, domain),
            JobServiceError::Repo(repo) => return repo_error_to_api(SOURCE, repo),
            JobServiceError::InvalidCron(_)
            | JobServiceError::InvalidTarget(_)
            | JobServiceError::Scheduler(_) => StatusCode::BAD_REQUEST,
            JobServiceError::NotFound => StatusCode::NOT_FOUND,
        };
        ApiError::from_error(SOURCE, status, &err)
    }
}

impl From<LogError> for ApiError {
    fn from(err: LogError) -> Self {
        const SOURCE: &str = "application::logs";
        match err {
            LogError::Domain(domain) => domain_to_api(SOURCE, domain),
            LogError::Repo(repo) => repo_error_to_api(SOURCE, repo),
        }
    }
}

impl From<SystemConfigError> for ApiError {
    fn from(err: SystemConfigError) -> Self {
        const SOURCE: &str = "application::system_config";
        match err {
            SystemConfigError::Domain(domain) => domain_to_api(SOURCE, domain),
            SystemConfigError::Repo(repo) => repo_error_to_api(SOURCE, repo),
            SystemConfigError::NotFound => {
                ApiError::from_error(SOURCE, StatusCode::NOT_FOUND, &err)
            }
        }
    }
}
