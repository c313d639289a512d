use axum::extract::{Extension, State};
use driftwood_api_types::{SystemConfigPayload, SystemConfigView};

use crate::application::api_keys::ApiPrincipal;
use crate::infra::http::extract::ApiJson;
use crate::infra::http::state::ApiState;

use super::{ApiResult, ok, ok_message};

pub async fn get_config(State(state): State<ApiState>) -> ApiResult<SystemConfigView> {
    ok(state.system_config.get().await?.into())
}

/// Saving also rebuilds the SMTP transport.
pub async fn update_config(
    State(state): State<ApiState>,
    Extension(principal): Extension<ApiPrincipal>,
    ApiJson(payload): ApiJson<SystemConfigPayload>,
) -> ApiResult<SystemConfigView> {
    let config = state.system_config.update(&principal, payload).await?;
    ok_message("system configuration saved", config.into())
}
