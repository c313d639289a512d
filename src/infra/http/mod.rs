//! The public and admin listeners.
//!
//! Public routes need no key, except `/api/v1/user/*`, which needs a key of any
//! role. The email code routes are rate limited per client address. Every admin route needs an admin key, then passes the rate limiter and
//! the operation logger.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod ip;
pub mod middleware;
pub mod operation_log;
pub mod rate_limit;
pub mod state;
pub mod views;

pub use error::{ApiError, repo_error_to_api};
pub use rate_limit::ApiRateLimiter;
pub use state::{ApiState, HealthProbe};

use axum::{
    Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{MethodRouter, delete, get, post, put},
};

use crate::application::operation_log::OperationMeta;

use self::handlers::{articles, friend_links, jobs, logs, posts, public, system_config};
use self::middleware::{
    api_auth, api_rate_limit, email_rate_limit, log_responses, set_request_context,
};
use self::operation_log::audited;

async fn route_not_found() -> ApiError {
    ApiError::new(
        "infra::http::router",
        StatusCode::NOT_FOUND,
        "resource not found",
    )
}

pub fn build_public_router(state: ApiState) -> Router {
    let open = Router::new()
        .route("/api/v1/public/ai/chat", post(public::ai_chat))
        .route("/api/v1/public/posts", get(public::list_posts))
        .route("/api/v1/public/posts/{slug}", get(public::get_post))
        .route(
            "/api/v1/public/friend-links",
            get(public::list_friend_links).post(public::apply_friend_link),
        )
        .route("/api/v1/public/health", get(public::health));

    let email = Router::new()
        .route("/api/v1/public/email/code", post(public::send_email_code))
        .route("/api/v1/public/email/verify", post(public::verify_email_code))
        .route_layer(from_fn_with_state(state.clone(), email_rate_limit));

    let user = Router::new()
        .route(
            "/api/v1/user/articles",
            get(articles::list_articles).post(articles::create_article),
        )
        .route(
            "/api/v1/user/articles/{id}",
            put(articles::update_article).delete(articles::delete_article),
        )
        .route_layer(from_fn_with_state(state.clone(), api_rate_limit))
        .route_layer(from_fn_with_state(state.clone(), api_auth));

    open.merge(email)
        .merge(user)
        .fallback(route_not_found)
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}

pub fn build_admin_router(state: ApiState) -> Router {
    let op = |route: MethodRouter<ApiState>, meta: OperationMeta| audited(route, &state, meta);

    let admin = Router::new()
        .route(
            "/api/v1/admin/posts",
            op(get(posts::list_posts), OperationMeta::unsaved("list posts"))
                .merge(op(post(posts::create_post), OperationMeta::new("create post"))),
        )
        .route(
            "/api/v1/admin/posts/{id}",
            op(get(posts::get_post), OperationMeta::unsaved("view post {1}"))
                .merge(op(put(posts::update_post), OperationMeta::new("update post {1}")))
                .merge(op(delete(posts::delete_post), OperationMeta::new("delete post {1}"))),
        )
        .route(
            "/api/v1/admin/friend-links",
            op(get(friend_links::list_links), OperationMeta::unsaved("list friend links"))
                .merge(op(
                    delete(friend_links::delete_links),
                    OperationMeta::new("delete friend links"),
                )),
        )
        .route(
            "/api/v1/admin/friend-links/{id}/approve",
            op(
                post(friend_links::approve_link),
                OperationMeta::new("approve friend link {1}"),
            ),
        )
        .route(
            "/api/v1/admin/friend-links/{id}/reject",
            op(
                post(friend_links::reject_link),
                OperationMeta::new("reject friend link {1}"),
            ),
        )
        .route(
            "/api/v1/admin/jobs",
            op(get(jobs::list_jobs), OperationMeta::unsaved("list jobs"))
                .merge(op(post(jobs::create_job), OperationMeta::new("create job")))
                .merge(op(delete(jobs::delete_jobs), OperationMeta::new("delete jobs"))),
        )
        .route(
            "/api/v1/admin/jobs/{id}",
            op(get(jobs::get_job), OperationMeta::unsaved("view job {1}"))
                .merge(op(put(jobs::update_job), OperationMeta::new("update job {1}")))
                .merge(op(delete(jobs::delete_job), OperationMeta::new("delete job {1}"))),
        )
        .route(
            "/api/v1/admin/jobs/{id}/run",
            op(post(jobs::run_job), OperationMeta::new("run job {1}")),
        )
        .route(
            "/api/v1/admin/jobs/{id}/pause",
            op(post(jobs::pause_job), OperationMeta::new("pause job {1}")),
        )
        .route(
            "/api/v1/admin/jobs/{id}/resume",
            op(post(jobs::resume_job), OperationMeta::new("resume job {1}")),
        )
        .route(
            "/api/v1/admin/jobs/{id}/status",
            op(
                put(jobs::change_job_status),
                OperationMeta::new("change job {1} status"),
            ),
        )
        .route(
            "/api/v1/admin/job-logs",
            op(get(jobs::list_job_logs), OperationMeta::unsaved("list job logs")).merge(op(
                delete(jobs::delete_job_logs),
                OperationMeta::new("delete job logs"),
            )),
        )
        .route(
            "/api/v1/admin/job-logs/clean",
            op(delete(jobs::clean_job_logs), OperationMeta::new("clean job logs")),
        )
        .route(
            "/api/v1/admin/admin-logs",
            op(get(logs::list_admin_logs), OperationMeta::unsaved("list admin logs")).merge(
                op(delete(logs::delete_admin_logs), OperationMeta::new("delete admin logs")),
            ),
        )
        .route(
            "/api/v1/admin/exception-logs",
            op(
                get(logs::list_exception_logs),
                OperationMeta::unsaved("list exception logs"),
            )
            .merge(op(
                delete(logs::delete_exception_logs),
                OperationMeta::new("delete exception logs"),
            )),
        )
        .route(
            "/api/v1/admin/system-config",
            op(
                get(system_config::get_config),
                OperationMeta::unsaved("view system config"),
            )
            .merge(op(
                put(system_config::update_config),
                OperationMeta::new("update system config"),
            )),
        )
        .route_layer(from_fn_with_state(state.clone(), api_rate_limit))
        .route_layer(from_fn_with_state(state.clone(), api_auth));

    admin
        .fallback(route_not_found)
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}
