//! Self-service posts for any authenticated key; the key name is the author.

use axum::extract::{Extension, State};
use driftwood_api_types::{PostPayload, PostView};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::api_keys::ApiPrincipal;
use crate::infra::http::extract::{ApiJson, ApiPath, ApiQuery};
use crate::infra::http::state::ApiState;

use super::{ApiResult, done, ok, ok_message};

#[derive(Debug, Default, Deserialize)]
pub struct ArticleQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

pub async fn list_articles(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiQuery(query): ApiQuery<ArticleQuery>,
) -> ApiResult<Vec<PostView>> {
    let posts = state
        .posts
        .list_mine(
            &principal.name,
            query.category.as_deref(),
            query.tag.as_deref(),
        )
        .await?;
    ok(posts.into_iter().map(PostView::from).collect())
}

pub async fn create_article(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiJson(payload): ApiJson<PostPayload>,
) -> ApiResult<PostView> {
    let post = state.posts.create(&principal, payload).await?;
    ok_message("article created", post.into())
}

pub async fn update_article(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<PostPayload>,
) -> ApiResult<PostView> {
    let post = state.posts.update(&principal, id, payload).await?;
    ok(post.into())
}

pub async fn delete_article(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.posts.delete(&principal, id).await?;
    done("article deleted")
}
