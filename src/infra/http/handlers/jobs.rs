use axum::extract::{Extension, State};
use driftwood_api_types::{
    IdList, JobListQuery, JobLogQuery, JobLogView, JobPayload, JobStatusChange, JobView,
    PageResponse,
};
use uuid::Uuid;

use crate::application::api_keys::ApiPrincipal;
use crate::application::pagination::PageRequest;
use crate::application::repos::{JobLogQueryFilter, JobQueryFilter};
use crate::infra::http::extract::{ApiJson, ApiPath, ApiQuery};
use crate::infra::http::state::ApiState;

use super::{ApiResult, done, ok, ok_message, parse_opt};

pub async fn list_jobs(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<JobListQuery>,
) -> ApiResult<PageResponse<JobView>> {
    let filter = JobQueryFilter {
        job_name: query.job_name.filter(|name| !name.trim().is_empty()),
        job_group: query.job_group.filter(|group| !group.trim().is_empty()),
        status: parse_opt(query.status.as_deref())?,
    };
    let page = PageRequest::new(query.page, query.page_size);
    let jobs = state.jobs.list(&filter, page).await?;
    ok(jobs.into_response(JobView::from))
}

pub async fn get_job(
    State(state): State<ApiState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<JobView> {
    ok(state.jobs.get(id).await?.into())
}

pub async fn create_job(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiJson(payload): ApiJson<JobPayload>,
) -> ApiResult<JobView> {
    let job = state.jobs.create(&principal, payload).await?;
    ok_message("job created", job.into())
}

pub async fn update_job(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<JobPayload>,
) -> ApiResult<JobView> {
    ok(state.jobs.update(&principal, id, payload).await?.into())
}

pub async fn delete_job(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.jobs.delete(&principal, id).await?;
    done("job deleted")
}

pub async fn delete_jobs(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiJson(ids): ApiJson<IdList>,
) -> ApiResult<u64> {
    ok(state.jobs.delete_batch(&principal, &ids.ids).await?)
}

pub async fn run_job(
    State(state): State<ApiState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.jobs.run_once(id).await?;
    done("job triggered")
}

pub async fn pause_job(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<JobView> {
    ok(state.jobs.pause(&principal, id).await?.into())
}

pub async fn resume_job(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<JobView> {
    ok(state.jobs.resume(&principal, id).await?.into())
}

pub async fn change_job_status(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(change): ApiJson<JobStatusChange>,
) -> ApiResult<JobView> {
    let job = state
        .jobs
        .change_status(&principal, id, &change.status)
        .await?;
    ok(job.into())
}

pub async fn list_job_logs(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<JobLogQuery>,
) -> ApiResult<PageResponse<JobLogView>> {
    let filter = JobLogQueryFilter {
        job_id: query.job_id,
        status: parse_opt(query.status.as_deref())?,
    };
    let page = PageRequest::new(query.page, query.page_size);
    let logs = state.jobs.list_logs(&filter, page).await?;
    ok(logs.into_response(JobLogView::from))
}

pub async fn delete_job_logs(
    State(state): State<ApiState>,
    ApiJson(ids): ApiJson<IdList>,
) -> ApiResult<u64> {
    ok(state.jobs.delete_logs(&ids.ids).await?)
}

pub async fn clean_job_logs(State(state): State<ApiState>) -> ApiResult<u64> {
    ok(state.jobs.clean_logs().await?)
}
