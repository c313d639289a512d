//! Request handlers. Every body is a [`ResponseResult`] envelope.

pub mod articles;
pub mod friend_links;
pub mod jobs;
pub mod logs;
pub mod posts;
pub mod public;
pub mod system_config;

use axum::Json;
use driftwood_api_types::{PostListQuery, ResponseResult, ResultCode};

use crate::application::repos::PostQueryFilter;
use crate::domain::error::DomainError;

use super::error::ApiError;

pub type ApiResult<T> = Result<Json<ResponseResult<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ResponseResult::success_with(data)))
}

fn ok_message<T>(message: &str, data: T) -> ApiResult<T> {
    Ok(Json(ResponseResult::success_message(message, data)))
}

fn done(message: &str) -> ApiResult<()> {
    Ok(Json(ResponseResult::success_code_message(
        ResultCode::Success.code(),
        message,
    )))
}

/// Parse an optional status-like query value; blanks mean "no filter".
fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, DomainError>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::parse)
        .transpose()
}

fn post_filter(query: &PostListQuery) -> Result<PostQueryFilter, DomainError> {
    let non_blank = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    Ok(PostQueryFilter {
        status: parse_opt(query.status.as_deref())?,
        author: None,
        category: non_blank(&query.category),
        tag: non_blank(&query.tag),
        search: non_blank(&query.search),
    })
}
