use axum::extract::{Extension, State};
use driftwood_api_types::{PageResponse, PostListQuery, PostPayload, PostView};
use uuid::Uuid;

use crate::application::api_keys::ApiPrincipal;
use crate::application::pagination::PageRequest;
use crate::infra::http::extract::{ApiJson, ApiPath, ApiQuery};
use crate::infra::http::state::ApiState;

use super::{ApiResult, done, ok, ok_message, post_filter};

pub async fn list_posts(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<PostListQuery>,
) -> ApiResult<PageResponse<PostView>> {
    let filter = post_filter(&query)?;
    let page = PageRequest::new(query.page, query.page_size);
    let posts = state.posts.list_admin(filter, page).await?;
    ok(posts.into_response(PostView::from))
}

pub async fn get_post(
    State(state): State<ApiState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<PostView> {
    ok(state.posts.get(id).await?.into())
}

pub async fn create_post(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiJson(payload): ApiJson<PostPayload>,
) -> ApiResult<PostView> {
    let post = state.posts.create(&principal, payload).await?;
    ok_message("post created", post.into())
}

pub async fn update_post(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<PostPayload>,
) -> ApiResult<PostView> {
    let post = state.posts.update(&principal, id, payload).await?;
    ok(post.into())
}

pub async fn delete_post(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.posts.delete(&principal, id).await?;
    done("post deleted")
}
