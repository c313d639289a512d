use axum::extract::State;
use driftwood_api_types::{AdminLogView, ExceptionLogView, IdList, LogListQuery, PageResponse};

use crate::application::logs::log_filter;
use crate::application::pagination::PageRequest;
use crate::infra::http::extract::{ApiJson, ApiQuery};
use crate::infra::http::state::ApiState;

use super::{ApiResult, ok};

pub async fn list_admin_logs(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<LogListQuery>,
) -> ApiResult<PageResponse<AdminLogView>> {
    let filter = log_filter(
        query.username,
        query.operation,
        query.from.as_deref(),
        query.to.as_deref(),
    )?;
    let page = PageRequest::new(query.page, query.page_size);
    let logs = state.admin_logs.list(&filter, page).await?;
    ok(logs.into_response(AdminLogView::from))
}

pub async fn delete_admin_logs(
    State(state): State<ApiState>,
    ApiJson(ids): ApiJson<IdList>,
) -> ApiResult<u64> {
    ok(state.admin_logs.delete(&ids.ids).await?)
}

pub async fn list_exception_logs(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<LogListQuery>,
) -> ApiResult<PageResponse<ExceptionLogView>> {
    let filter = log_filter(
        query.username,
        query.operation,
        query.from.as_deref(),
        query.to.as_deref(),
    )?;
    let page = PageRequest::new(query.page, query.page_size);
    let logs = state.exception_logs.list(&filter, page).await?;
    ok(logs.into_response(ExceptionLogView::from))
}

pub async fn delete_exception_logs(
    State(state): State<ApiState>,
    ApiJson(ids): ApiJson<IdList>,
) -> ApiResult<u64> {
    ok(state.exception_logs.delete(&ids.ids).await?)
}
