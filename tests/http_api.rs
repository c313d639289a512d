use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use httpmock::prelude::*;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

use driftwood::application::ai_chat::{
    AiChatService, ChatBackendError, ChatCompletionBackend, ChatCompletionRequest,
    ChatCompletionResponse,
};
use driftwood::application::api_keys::ApiKeyService;
use driftwood::application::email::{
    EmailService, MailError, MailServerConfig, MailTransport, MailTransportFactory, OutgoingMail,
};
use driftwood::application::friend_links::FriendLinkService;
use driftwood::application::jobs::{JobScheduler, JobService, JobTargetRegistry};
use driftwood::application::logs::{AdminLogService, ExceptionLogService};
use driftwood::application::operation_log::OperationLogService;
use driftwood::application::pagination::{Page, PageRequest};
use driftwood::application::posts::PostService;
use driftwood::application::repos::{
    AdminLogsRepo, ApiKeysRepo, CreateApiKeyParams, CreatePostParams, ExceptionLogsRepo,
    FriendLinksRepo, JobLogQueryFilter, JobLogsRepo, JobQueryFilter, JobsRepo, LogQueryFilter,
    NewFriendLink, NewJob, PostQueryFilter, PostsRepo, RepoError, SystemConfigRepo,
    UpdateJobParams, UpdatePostParams,
};
use driftwood::application::system_config::SystemConfigService;
use driftwood::config::{ApiRateLimitSettings, DeepSeekSettings, MailSettings};
use driftwood::domain::api_keys::{ApiKeyRecord, ApiRole};
use driftwood::domain::entities::{
    AdminLogRecord, ExceptionLogRecord, FriendLinkRecord, JobLogRecord, JobRecord, PostRecord,
    SystemConfigRecord,
};
use driftwood::domain::types::{FriendLinkStatus, JobStatus};
use driftwood::infra::http::{self, ApiRateLimiter, ApiState, HealthProbe};
use driftwood::infra::llm::DeepSeekClient;

/// Everything the routers persist, kept in memory.
#[derive(Default)]
struct MemoryStore {
    keys: Mutex<HashMap<String, ApiKeyRecord>>,
    admin_logs: Mutex<Vec<AdminLogRecord>>,
    exception_logs: Mutex<Vec<ExceptionLogRecord>>,
    config: Mutex<Option<SystemConfigRecord>>,
}

#[async_trait]
impl ApiKeysRepo for MemoryStore {
    async fn create_key(&self, params: CreateApiKeyParams) -> Result<ApiKeyRecord, RepoError> {
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            name: params.name,
            prefix: params.prefix.clone(),
            hashed_secret: params.hashed_secret,
            role: params.role,
            expires_at: params.expires_at,
            revoked_at: None,
            last_used_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.keys.lock().await.insert(params.prefix, record.clone());
        Ok(record)
    }

    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError> {
        Ok(self.keys.lock().await.get(prefix).cloned())
    }

    async fn update_last_used(&self, _id: Uuid, _at: OffsetDateTime) -> Result<(), RepoError> {
        Ok(())
    }

    async fn revoke_key(&self, _id: Uuid, _at: OffsetDateTime) -> Result<(), RepoError> {
        Ok(())
    }

    async fn purge_expired_keys(&self, _now: OffsetDateTime) -> Result<u64, RepoError> {
        Ok(0)
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(
        &self,
        _filter: &PostQueryFilter,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, RepoError> {
        Ok(Page::from_vec(Vec::new(), page))
    }

    async fn list_by_author(
        &self,
        _author: &str,
        _category: Option<&str>,
        _tag: Option<&str>,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Ok(Vec::new())
    }

    async fn find_post(&self, _id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(None)
    }

    async fn find_post_by_slug(&self, _slug: &str) -> Result<Option<PostRecord>, RepoError> {
        Ok(None)
    }

    async fn slug_exists(&self, _slug: &str) -> Result<bool, RepoError> {
        Ok(false)
    }

    async fn create_post(&self, _params: CreatePostParams) -> Result<PostRecord, RepoError> {
        Err(RepoError::from_persistence("read-only store"))
    }

    async fn update_post(&self, _params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        Err(RepoError::NotFound)
    }

    async fn delete_post(&self, _id: Uuid) -> Result<(), RepoError> {
        Err(RepoError::NotFound)
    }
}

#[async_trait]
impl FriendLinksRepo for MemoryStore {
    async fn create_link(&self, _link: NewFriendLink) -> Result<FriendLinkRecord, RepoError> {
        Err(RepoError::from_persistence("read-only store"))
    }

    async fn find_link(&self, _id: Uuid) -> Result<Option<FriendLinkRecord>, RepoError> {
        Ok(None)
    }

    async fn list_links(
        &self,
        _status: Option<FriendLinkStatus>,
    ) -> Result<Vec<FriendLinkRecord>, RepoError> {
        Ok(Vec::new())
    }

    async fn update_link_status(
        &self,
        _id: Uuid,
        _status: FriendLinkStatus,
        _reason: Option<String>,
    ) -> Result<FriendLinkRecord, RepoError> {
        Err(RepoError::NotFound)
    }

    async fn delete_links(&self, _ids: &[Uuid]) -> Result<u64, RepoError> {
        Ok(0)
    }
}

#[async_trait]
impl AdminLogsRepo for MemoryStore {
    async fn append_admin_log(&self, record: AdminLogRecord) -> Result<(), RepoError> {
        self.admin_logs.lock().await.push(record);
        Ok(())
    }

    async fn list_admin_logs(
        &self,
        _filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<AdminLogRecord>, RepoError> {
        Ok(Page::from_vec(self.admin_logs.lock().await.clone(), page))
    }

    async fn delete_admin_logs(&self, _ids: &[Uuid]) -> Result<u64, RepoError> {
        Ok(0)
    }

    async fn purge_admin_logs_before(&self, _cutoff: OffsetDateTime) -> Result<u64, RepoError> {
        Ok(0)
    }
}

#[async_trait]
impl ExceptionLogsRepo for MemoryStore {
    async fn append_exception_log(&self, record: ExceptionLogRecord) -> Result<(), RepoError> {
        self.exception_logs.lock().await.push(record);
        Ok(())
    }

    async fn list_exception_logs(
        &self,
        _filter: &LogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<ExceptionLogRecord>, RepoError> {
        Ok(Page::from_vec(self.exception_logs.lock().await.clone(), page))
    }

    async fn delete_exception_logs(&self, _ids: &[Uuid]) -> Result<u64, RepoError> {
        Ok(0)
    }

    async fn purge_exception_logs_before(
        &self,
        _cutoff: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        Ok(0)
    }
}

#[async_trait]
impl SystemConfigRepo for MemoryStore {
    async fn load_config(&self) -> Result<Option<SystemConfigRecord>, RepoError> {
        Ok(self.config.lock().await.clone())
    }

    async fn save_config(
        &self,
        record: SystemConfigRecord,
    ) -> Result<SystemConfigRecord, RepoError> {
        *self.config.lock().await = Some(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl JobsRepo for MemoryStore {
    async fn list_jobs(
        &self,
        _filter: &JobQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobRecord>, RepoError> {
        Ok(Page::from_vec(Vec::new(), page))
    }

    async fn list_jobs_by_status(&self, _status: JobStatus) -> Result<Vec<JobRecord>, RepoError> {
        Ok(Vec::new())
    }

    async fn find_job(&self, _id: Uuid) -> Result<Option<JobRecord>, RepoError> {
        Ok(None)
    }

    async fn create_job(&self, _job: NewJob) -> Result<JobRecord, RepoError> {
        Err(RepoError::from_persistence("read-only store"))
    }

    async fn update_job(&self, _params: UpdateJobParams) -> Result<JobRecord, RepoError> {
        Err(RepoError::NotFound)
    }

    async fn update_job_status(
        &self,
        _id: Uuid,
        _status: JobStatus,
        _updated_by: &str,
    ) -> Result<JobRecord, RepoError> {
        Err(RepoError::NotFound)
    }

    async fn delete_jobs(&self, _ids: &[Uuid]) -> Result<u64, RepoError> {
        Ok(0)
    }
}

#[async_trait]
impl JobLogsRepo for MemoryStore {
    async fn append_job_log(&self, _record: JobLogRecord) -> Result<(), RepoError> {
        Ok(())
    }

    async fn list_job_logs(
        &self,
        _filter: &JobLogQueryFilter,
        page: PageRequest,
    ) -> Result<Page<JobLogRecord>, RepoError> {
        Ok(Page::from_vec(Vec::new(), page))
    }

    async fn delete_job_logs(&self, _ids: &[Uuid]) -> Result<u64, RepoError> {
        Ok(0)
    }

    async fn clear_job_logs(&self) -> Result<u64, RepoError> {
        Ok(0)
    }

    async fn purge_job_logs_before(&self, _cutoff: OffsetDateTime) -> Result<u64, RepoError> {
        Ok(0)
    }
}

struct SilentTransport;

#[async_trait]
impl MailTransport for SilentTransport {
    async fn send(&self, _message: OutgoingMail) -> Result<(), MailError> {
        Ok(())
    }
}

struct SilentFactory;

impl MailTransportFactory for SilentFactory {
    fn build(&self, _config: &MailServerConfig) -> Result<Arc<dyn MailTransport>, MailError> {
        Ok(Arc::new(SilentTransport))
    }
}

struct UnreachableBackend;

#[async_trait]
impl ChatCompletionBackend for UnreachableBackend {
    async fn complete(
        &self,
        _api_key: &str,
        _request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ChatBackendError> {
        Err(ChatBackendError::Connect)
    }
}

struct StaticHealth(bool);

#[async_trait]
impl HealthProbe for StaticHealth {
    async fn check(&self) -> Result<(), RepoError> {
        if self.0 {
            Ok(())
        } else {
            Err(RepoError::Timeout)
        }
    }
}

fn deepseek_settings() -> DeepSeekSettings {
    DeepSeekSettings {
        api_key: Some("sk-test".into()),
        base_url: Url::parse("http://127.0.0.1:9").expect("url"),
        chat_path: "/v1/chat/completions".into(),
        model: "deepseek-chat".into(),
        temperature: 0.7,
        max_tokens: NonZeroU32::new(256).expect("non-zero"),
        connect_timeout: Duration::from_secs(1),
        read_timeout: Duration::from_secs(1),
        system_prompt: "be brief".into(),
    }
}

const EMAIL_ROUTE_BUDGET: u32 = 3;

struct Harness {
    store: Arc<MemoryStore>,
    state: ApiState,
}

impl Harness {
    fn new(max_requests: u32, healthy: bool) -> Self {
        let store = Arc::new(MemoryStore::default());
        let email = EmailService::new(
            store.clone(),
            Arc::new(SilentFactory),
            MailSettings {
                timeout: Duration::from_secs(5),
                code_ttl: Duration::from_secs(300),
                owner_address: None,
                rate_limit: ApiRateLimitSettings {
                    window_seconds: NonZeroU32::new(60).expect("non-zero"),
                    max_requests: NonZeroU32::new(EMAIL_ROUTE_BUDGET).expect("non-zero"),
                },
            },
        );
        let admin_logs = AdminLogService::new(store.clone());
        let exception_logs = ExceptionLogService::new(store.clone());
        let scheduler = JobScheduler::new(
            Arc::new(JobTargetRegistry::new()),
            store.clone(),
            Duration::from_secs(5),
        );

        let state = ApiState {
            api_keys: ApiKeyService::new(store.clone()),
            posts: PostService::new(store.clone()),
            friend_links: FriendLinkService::new(store.clone(), email.clone()),
            email: email.clone(),
            ai_chat: AiChatService::new(Arc::new(UnreachableBackend), deepseek_settings()),
            jobs: JobService::new(store.clone(), store.clone(), scheduler),
            operation_log: OperationLogService::new(admin_logs.clone(), exception_logs.clone()),
            admin_logs,
            exception_logs,
            system_config: SystemConfigService::new(store.clone(), email),
            rate_limiter: Arc::new(ApiRateLimiter::new(Duration::from_secs(60), max_requests)),
            email_rate_limiter: Arc::new(ApiRateLimiter::new(
                Duration::from_secs(60),
                EMAIL_ROUTE_BUDGET,
            )),
            health: Arc::new(StaticHealth(healthy)),
        };
        Self { store, state }
    }

    fn public(&self) -> Router {
        http::build_public_router(self.state.clone())
    }

    fn admin(&self) -> Router {
        http::build_admin_router(self.state.clone())
    }

    async fn token(&self, name: &str, role: ApiRole) -> String {
        self.state
            .api_keys
            .issue(name, role, None)
            .await
            .expect("issue key")
            .token
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.9");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).expect("json envelope");
    (status, body)
}

#[tokio::test]
async fn health_reports_ok_and_database_outage() {
    let healthy = Harness::new(10, true);
    let (status, body) = send(
        healthy.public(),
        request(Method::GET, "/api/v1/public/health", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
    assert_eq!(body["data"], "ok");

    let down = Harness::new(10, false);
    let (status, body) = send(
        down.public(),
        request(Method::GET, "/api/v1/public/health", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn unknown_routes_answer_with_the_envelope() {
    let harness = Harness::new(10, true);
    let (status, body) = send(
        harness.public(),
        request(Method::GET, "/api/v1/public/nowhere", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "resource not found");
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn user_routes_require_a_key() {
    let harness = Harness::new(10, true);
    let (status, body) = send(
        harness.public(),
        request(Method::GET, "/api/v1/user/articles", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "API key required");

    let token = harness.token("writer", ApiRole::Author).await;
    let (status, body) = send(
        harness.public(),
        request(Method::GET, "/api/v1/user/articles", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn x_api_key_header_is_accepted() {
    let harness = Harness::new(10, true);
    let token = harness.token("writer", ApiRole::Author).await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/user/articles")
        .header("x-api-key", token)
        .body(Body::empty())
        .expect("request");

    let (status, _) = send(harness.public(), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn authors_cannot_reach_admin_routes() {
    let harness = Harness::new(10, true);
    let token = harness.token("writer", ApiRole::Author).await;
    let (status, body) = send(
        harness.admin(),
        request(Method::GET, "/api/v1/admin/jobs", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 400);
    assert!(harness.store.admin_logs.lock().await.is_empty());
}

#[tokio::test]
async fn invalid_cron_is_rejected_and_logged_as_exception() {
    let harness = Harness::new(10, true);
    let token = harness.token("root", ApiRole::Admin).await;
    let payload = json!({
        "job_name": "nightly",
        "invoke_target": "driftwoodTask.purge()",
        "cron_expression": "not a cron",
    });
    let (status, body) = send(
        harness.admin(),
        request(Method::POST, "/api/v1/admin/jobs", Some(&token), Some(payload)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["message"], "invalid cron expression");

    let exceptions = harness.store.exception_logs.lock().await.clone();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].username, "root");
    assert_eq!(exceptions[0].operation, "create job");
    assert!(exceptions[0].exception_message.contains("invalid cron expression"));
    assert!(harness.store.admin_logs.lock().await.is_empty());
}

#[tokio::test]
async fn admin_mutations_write_an_operation_log() {
    let harness = Harness::new(10, true);
    let token = harness.token("root", ApiRole::Admin).await;
    let id = Uuid::new_v4();
    let (status, body) = send(
        harness.admin(),
        request(
            Method::DELETE,
            "/api/v1/admin/friend-links",
            Some(&token),
            Some(json!({ "ids": [id] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);

    let logs = harness.store.admin_logs.lock().await.clone();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.username, "root");
    assert_eq!(log.request_method, "DELETE");
    assert_eq!(log.request_uri, "/api/v1/admin/friend-links");
    assert_eq!(log.operation, "delete friend links");
    assert_eq!(log.ip, "203.0.113.9");
    assert_eq!(log.ip_source, "internet");
    assert!(log.params.as_deref().is_some_and(|p| p.contains(&id.to_string())));
}

#[tokio::test]
async fn reads_are_not_logged_and_passwords_are_masked() {
    let harness = Harness::new(10, true);
    let token = harness.token("root", ApiRole::Admin).await;

    let (status, _) = send(
        harness.admin(),
        request(Method::GET, "/api/v1/admin/friend-links", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(harness.store.admin_logs.lock().await.is_empty());

    let payload = json!({
        "site_name": "Driftwood",
        "email_host": "smtp.example.com",
        "email_port": 465,
        "email_username": "noreply@example.com",
        "email_password": "hunter2",
    });
    let (status, body) = send(
        harness.admin(),
        request(Method::PUT, "/api/v1/admin/system-config", Some(&token), Some(payload)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email_password_set"], true);

    let logs = harness.store.admin_logs.lock().await.clone();
    assert_eq!(logs.len(), 1);
    let params = logs[0].params.clone().unwrap_or_default();
    assert!(params.contains("******"));
    assert!(!params.contains("hunter2"));
}

#[tokio::test]
async fn empty_chat_message_is_a_bad_request() {
    let harness = Harness::new(10, true);
    let (status, body) = send(
        harness.public(),
        request(
            Method::POST,
            "/api/v1/public/ai/chat",
            None,
            Some(json!({ "message": "   " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "message must not be empty");
}

#[tokio::test]
async fn unreachable_chat_backend_is_unavailable() {
    let harness = Harness::new(10, true);
    let (status, body) = send(
        harness.public(),
        request(
            Method::POST,
            "/api/v1/public/ai/chat",
            None,
            Some(json!({ "message": "hello" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body["message"],
        "Unable to connect to AI service, please check network"
    );
}

#[tokio::test]
async fn malformed_json_renders_the_envelope() {
    let harness = Harness::new(10, true);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/public/email/code")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let (status, body) = send(harness.public(), request).await;
    assert!(status.is_client_error());
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn rate_limit_answers_429_with_retry_after() {
    let harness = Harness::new(1, true);
    let token = harness.token("writer", ApiRole::Author).await;
    let router = harness.public();

    let first = router
        .clone()
        .oneshot(request(Method::GET, "/api/v1/user/articles", Some(&token), None))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let second = router
        .oneshot(request(Method::GET, "/api/v1/user/articles", Some(&token), None))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        second
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok()),
        Some("60")
    );
}

#[tokio::test]
async fn chat_reply_carries_content_and_usage() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"id":"c1","choices":[{"index":0,"message":{"role":"assistant","content":"Try the post on lifetimes."},"finish_reason":"stop"}],"usage":{"prompt_tokens":12,"completion_tokens":6,"total_tokens":18}}"#,
                );
        })
        .await;

    let mut harness = Harness::new(10, true);
    let settings = DeepSeekSettings {
        base_url: Url::parse(&server.base_url()).expect("url"),
        ..deepseek_settings()
    };
    let client = DeepSeekClient::new(&settings).expect("client");
    harness.state.ai_chat = AiChatService::new(Arc::new(client), settings);

    let (status, body) = send(
        harness.public(),
        request(
            Method::POST,
            "/api/v1/public/ai/chat",
            None,
            Some(json!({ "message": "what should I read?" })),
        ),
    )
    .await;

    mock.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 200);
    assert_eq!(body["message"], "AI chat succeeded");
    assert_eq!(body["data"], "Try the post on lifetimes.");
    assert_eq!(body["extra"]["usage"]["total_tokens"], 18);
    assert_eq!(body["extra"]["usage"]["prompt_tokens"], 12);
}

fn verify_from(ip: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/public/email/verify")
        .header("x-forwarded-for", ip)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "reader@example.org", "code": "000000" }).to_string(),
        ))
        .expect("request")
}

#[tokio::test]
async fn email_routes_are_limited_per_client_address() {
    let harness = Harness::new(100, true);
    let router = harness.public();

    for _ in 0..EMAIL_ROUTE_BUDGET {
        let (status, body) = send(router.clone(), verify_from("198.51.100.7")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    let limited = router
        .clone()
        .oneshot(verify_from("198.51.100.7"))
        .await
        .expect("response");
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        limited
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok()),
        Some("60")
    );

    // the code route shares the client's address but keeps its own bucket
    let (status, _) = send(
        router.clone(),
        request(
            Method::POST,
            "/api/v1/public/email/code",
            None,
            Some(json!({ "email": "reader@example.org" })),
        ),
    )
    .await;
    assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = send(router, verify_from("198.51.100.8")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
