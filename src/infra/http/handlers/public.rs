//! Unauthenticated endpoints: reading, friend-link applications, mail codes and AI chat.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use driftwood_api_types::{
    AiChatRequest, EmailCodeRequest, EmailVerifyRequest, FriendLinkApplication, FriendLinkView,
    PageResponse, PostListQuery, PostView, ResponseResult,
};
use tracing::info;

use crate::application::pagination::PageRequest;
use crate::infra::http::error::ApiError;
use crate::infra::http::extract::{ApiJson, ApiPath, ApiQuery};
use crate::infra::http::state::ApiState;

use super::{ApiResult, done, ok, ok_message, post_filter};

pub async fn ai_chat(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<AiChatRequest>,
) -> ApiResult<String> {
    let reply = state.ai_chat.chat(request).await?;
    let mut body = ResponseResult::success_message("AI chat succeeded", reply.content);
    if let Some(usage) = reply.usage {
        body = body.put_extra("usage", usage);
    }
    Ok(Json(body))
}

pub async fn list_posts(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<PostListQuery>,
) -> ApiResult<PageResponse<PostView>> {
    let filter = post_filter(&query)?;
    let page = PageRequest::new(query.page, query.page_size);
    let posts = state.posts.list_published(filter, page).await?;
    ok(posts.into_response(PostView::from))
}

pub async fn get_post(
    State(state): State<ApiState>,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<PostView> {
    let post = state.posts.get_published(&slug).await?;
    ok(post.into())
}

pub async fn list_friend_links(State(state): State<ApiState>) -> ApiResult<Vec<FriendLinkView>> {
    let links = state.friend_links.list_public().await?;
    ok(links.into_iter().map(FriendLinkView::from).collect())
}

pub async fn apply_friend_link(
    State(state): State<ApiState>,
    ApiJson(application): ApiJson<FriendLinkApplication>,
) -> ApiResult<FriendLinkView> {
    let link = state.friend_links.apply(application).await?;
    ok_message("application submitted, awaiting review", link.into())
}

pub async fn send_email_code(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<EmailCodeRequest>,
) -> ApiResult<()> {
    state.email.send_code(&request.email).await?;
    done("verification code sent")
}

pub async fn verify_email_code(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<EmailVerifyRequest>,
) -> ApiResult<()> {
    state.email.verify_code(&request.email, &request.code)?;
    info!(target = "driftwood::email", "verification code accepted");
    done("verification succeeded")
}

pub async fn health(State(state): State<ApiState>) -> ApiResult<&'static str> {
    state.health.check().await.map_err(|err| {
        ApiError::from_error(
            "infra::http::health",
            StatusCode::SERVICE_UNAVAILABLE,
            &err,
        )
    })?;
    ok("ok")
}
