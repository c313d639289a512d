use axum::extract::State;
use driftwood_api_types::{FriendLinkDecision, FriendLinkQuery, FriendLinkView, IdList};
use uuid::Uuid;

use crate::infra::http::extract::{ApiJson, ApiPath, ApiQuery};
use crate::infra::http::state::ApiState;

use super::{ApiResult, ok, ok_message, parse_opt};

pub async fn list_links(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<FriendLinkQuery>,
) -> ApiResult<Vec<FriendLinkView>> {
    let status = parse_opt(query.status.as_deref())?;
    let links = state.friend_links.list_admin(status).await?;
    ok(links.into_iter().map(FriendLinkView::from).collect())
}

/// The applicant is mailed off the request path.
pub async fn approve_link(
    State(state): State<ApiState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<FriendLinkView> {
    let link = state.friend_links.approve(id).await?;
    ok_message("friend link approved", link.into())
}

pub async fn reject_link(
    State(state): State<ApiState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(decision): ApiJson<FriendLinkDecision>,
) -> ApiResult<FriendLinkView> {
    let link = state
        .friend_links
        .reject(id, decision.reason.as_deref().unwrap_or_default())
        .await?;
    ok_message("friend link rejected", link.into())
}

pub async fn delete_links(
    State(state): State<ApiState>,
    ApiJson(ids): ApiJson<IdList>,
) -> ApiResult<u64> {
    ok(state.friend_links.delete(&ids.ids).await?)
}
