use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath, State},
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::{api_keys::ApiPrincipal, error::ErrorReport};

use super::{error::ApiError, ip::client_ip, state::ApiState};

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Emit one event per 4xx/5xx response, enriched with the attached [`ErrorReport`].
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let elapsed_ms = start.elapsed().as_millis();
    // auth runs inside this layer, so the principal is read back from the response
    let principal = response.extensions().get::<ApiPrincipal>();
    let api_key_id = principal.map(|p| p.key_id.to_string()).unwrap_or_default();
    let api_key_name = principal.map(|p| p.name.as_str()).unwrap_or("");
    let (source, messages) = match response.extensions().get::<ErrorReport>() {
        Some(report) => (report.source, report.messages.clone()),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .cloned()
        .unwrap_or_else(|| "no diagnostic available".to_string());

    if status.is_server_error() {
        error!(
            target = "driftwood::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            source,
            detail = %detail,
            chain = ?messages,
            request_id,
            api_key_id,
            api_key_name,
            "request failed",
        );
    } else {
        warn!(
            target = "driftwood::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            source,
            detail = %detail,
            chain = ?messages,
            request_id,
            api_key_id,
            api_key_name,
            "client request error",
        );
    }

    response
}

/// Resolve the presented key into an [`ApiPrincipal`] request extension.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers()) else {
        return ApiError::unauthorized("API key required").into_response();
    };

    let principal = match state.api_keys.authenticate(&token).await {
        Ok(principal) => principal,
        Err(err) => return ApiError::from(err).into_response(),
    };

    request.extensions_mut().insert(principal.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(principal) = request.extensions().get::<ApiPrincipal>() else {
        warn!(
            target = "driftwood::http::rate_limit",
            "missing principal in rate limit middleware"
        );
        return ApiError::unauthorized("API key required").into_response();
    };

    let key = principal.key_id.to_string();
    let (allowed, _remaining) = state.rate_limiter.allow(&key, route_template(&request));
    if !allowed {
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs()).into_response();
    }

    next.run(request).await
}

/// Per-client limit for the unauthenticated email routes.
pub async fn email_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer);
    let key = if ip.is_empty() { "unknown" } else { ip.as_str() };

    let (allowed, _remaining) = state.email_rate_limiter.allow(key, route_template(&request));
    if !allowed {
        warn!(
            target = "driftwood::http::rate_limit",
            ip = key,
            path = request.uri().path(),
            "email route rate limited"
        );
        return ApiError::rate_limited(state.email_rate_limiter.retry_after_secs())
            .into_response();
    }

    next.run(request).await
}

/// Matched route such as `/api/v1/user/articles/{id}`, so path parameters share a bucket.
fn route_template(request: &Request<Body>) -> &str {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or_else(|| request.uri().path())
}

/// `Authorization: Bearer <token>` first, then `x-api-key`.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim);
    let raw = bearer.or_else(|| {
        headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
    })?;
    (!raw.is_empty()).then(|| raw.to_string())
}
