//! Route layer that gates admin handlers and writes the operation/exception logs.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, FromRequestParts, RawPathParams, State},
    http::Request,
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use serde_json::{Map, Value};

use crate::application::api_keys::ApiPrincipal;
use crate::application::error::ErrorReport;
use crate::application::operation_log::{
    OperationContext, OperationLogService, OperationMeta, parse_params,
};

use super::error::ApiError;
use super::ip::{client_ip, ip_source};
use super::state::ApiState;

const MAX_CAPTURED_BODY: usize = 1024 * 1024;
const MAX_PARAMS_CHARS: usize = 2000;
const REDACTED: &str = "******";

#[derive(Clone)]
pub struct Audited {
    log: OperationLogService,
    meta: OperationMeta,
}

/// Wrap a method router so its handlers run behind the operation logger.
pub fn audited(
    route: MethodRouter<ApiState>,
    state: &ApiState,
    meta: OperationMeta,
) -> MethodRouter<ApiState> {
    route.route_layer(from_fn_with_state(
        Audited {
            log: state.operation_log.clone(),
            meta,
        },
        operation_log,
    ))
}

pub async fn operation_log(
    State(audited): State<Audited>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let principal = match request.extensions().get::<ApiPrincipal>() {
        Some(principal) if principal.is_admin() => principal.clone(),
        _ => {
            return ApiError::forbidden("only administrators may perform this operation")
                .into_response();
        }
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer);

    let (mut parts, body) = request.into_parts();
    let path_args: Vec<Value> = match RawPathParams::from_request_parts(&mut parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(_, value)| Value::String(value.to_string()))
            .collect(),
        Err(_) => Vec::new(),
    };
    let bytes = match to_bytes(body, MAX_CAPTURED_BODY).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return ApiError::bad_request(format!("unreadable request body: {err}"))
                .into_response();
        }
    };

    let context = OperationContext {
        username: principal.name.clone(),
        request_method: parts.method.to_string(),
        request_uri: parts.uri.path().to_string(),
        ip_source: ip_source(&ip).to_string(),
        ip,
        params: capture_params(parts.uri.query(), &bytes),
        operation: parse_params(audited.meta.name, &path_args),
    };

    let request = Request::from_parts(parts, Body::from(bytes));
    let start = Instant::now();
    let response = next.run(request).await;
    let spend_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

    let report = response.extensions().get::<ErrorReport>();
    if response.status().is_server_error() || report.is_some() {
        let message = report.map(ErrorReport::summary).unwrap_or_else(|| {
            response
                .status()
                .canonical_reason()
                .unwrap_or("handler failed")
                .to_string()
        });
        audited.log.record_failure(context, message).await;
    } else if audited.meta.save {
        audited.log.record_success(context, spend_ms).await;
    }

    response
}

/// Query string and JSON body as one JSON object, secrets masked.
fn capture_params(query: Option<&str>, body: &[u8]) -> Option<String> {
    let mut captured = Map::new();
    if let Some(query) = query.filter(|query| !query.is_empty()) {
        captured.insert("query".to_string(), Value::String(query.to_string()));
    }
    if !body.is_empty() {
        let mut value = serde_json::from_slice::<Value>(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
        redact(&mut value);
        captured.insert("body".to_string(), value);
    }
    if captured.is_empty() {
        return None;
    }

    let rendered = Value::Object(captured).to_string();
    Some(match rendered.char_indices().nth(MAX_PARAMS_CHARS) {
        Some((cut, _)) => rendered[..cut].to_string(),
        None => rendered,
    })
}

fn redact(value: &mut Value) {
    if let Value::Object(map) = value {
        for (key, field) in map.iter_mut() {
            if key.to_ascii_lowercase().contains("password") && !field.is_null() {
                *field = Value::String(REDACTED.to_string());
            }
        }
    }
}
