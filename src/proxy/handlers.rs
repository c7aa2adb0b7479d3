//! HTTP request handlers.

use axum::{
    body::{Body, Bytes},
    extract::{Extension, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;

use super::server::{AppState, RequestId};
use super::types::ChatRequest;
use crate::config::RouteTarget;
use crate::error::Error;
use crate::outbound;
use crate::router::{estimate_prompt_tokens, RoutingDecision};

/// Response header: correlation ID (UUID v4).
pub const REQUEST_ID_HEADER: &str = "x-modelgate-request-id";
/// Response header: provider the request was routed to.
pub const PROVIDER_HEADER: &str = "x-modelgate-provider";
/// Response header: route class the request was classified into.
pub const ROUTE_HEADER: &str = "x-modelgate-route";

/// Inbound headers never forwarded upstream. The caller's credentials are
/// for this proxy, not the backend; the rest are transport-owned.
const STRIPPED_HEADERS: [&str; 5] = [
    "host",
    "content-length",
    "authorization",
    "x-api-key",
    "api-key",
];

/// Attach modelgate metadata headers to a response.
///
/// The request id is always present; provider and route are set once a
/// routing decision exists (errors before routing carry only the id).
fn attach_decision_headers(
    response: &mut Response,
    request_id: &RequestId,
    decision: Option<&RoutingDecision>,
) {
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderValue::from_str(&request_id.0.to_string()).unwrap(),
    );
    if let Some(decision) = decision {
        if let Ok(value) = HeaderValue::from_str(&decision.provider.name) {
            headers.insert(HeaderName::from_static(PROVIDER_HEADER), value);
        }
        headers.insert(
            HeaderName::from_static(ROUTE_HEADER),
            HeaderValue::from_static(decision.route_class.as_str()),
        );
    }
}

/// Extract the caller's key from `Authorization: Bearer` or `x-api-key`.
fn inbound_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
}

/// Reject the request unless it presents the configured inbound API key.
fn check_inbound_auth(state: &AppState, headers: &HeaderMap) -> Result<(), Error> {
    let Some(expected) = &state.config.apikey else {
        return Ok(());
    };
    match inbound_key(headers) {
        Some(key) if key == expected.expose_secret() => Ok(()),
        _ => Err(Error::Unauthorized),
    }
}

/// Handle POST /v1/messages
pub async fn messages(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match forward(&state, &headers, body).await {
        Ok((mut response, decision)) => {
            attach_decision_headers(&mut response, &request_id, Some(&decision));
            response
        }
        Err(error) => {
            let mut response = error.into_response();
            attach_decision_headers(&mut response, &request_id, None);
            response
        }
    }
}

/// Route, authenticate and forward one request.
///
/// The body is parsed only for the fields routing needs, then forwarded
/// byte-for-byte. The upstream response, streaming or not, is piped back
/// with its own status and content type.
async fn forward(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<(Response, RoutingDecision), Error> {
    check_inbound_auth(state, headers)?;

    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::BadRequest(format!("invalid request body: {}", e)))?;

    let prompt_tokens = estimate_prompt_tokens(&request.messages, &request.tools);
    let decision = state
        .router
        .select(&request.model, request.thinking_requested(), prompt_tokens)?;

    tracing::info!(
        provider = %decision.provider.name,
        model = %decision.model,
        route = %decision.route_class.as_str(),
        prompt_tokens,
        stream = request.stream.unwrap_or(false),
        "routing chat completion request"
    );

    let auth = outbound::prepare(&decision, &state.tokens).await?;

    let mut outbound_headers = HeaderMap::new();
    for (name, value) in headers {
        if STRIPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        outbound_headers.insert(name.clone(), value.clone());
    }
    for name in &auth.remove_headers {
        outbound_headers.remove(*name);
    }
    for (name, value) in &auth.set_headers {
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::Internal("prepared header value not representable".to_string()))?;
        outbound_headers.insert(HeaderName::from_static(name), value);
    }
    outbound_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    let upstream = state
        .http_client
        .post(&auth.endpoint)
        .headers(outbound_headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    if !status.is_success() {
        tracing::warn!(
            provider = %decision.provider.name,
            status = %status,
            "provider returned error status"
        );
    }

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = upstream.headers().get(header::CONTENT_TYPE) {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }

    let stream = upstream.bytes_stream().map_err(std::io::Error::other);
    let response = builder
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Internal(format!("failed to build response: {}", e)))?;

    Ok((response, decision))
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "modelgate",
        "providers": state.config.providers.len(),
    }))
}

/// Handle GET /providers - configured providers and routing table, keys redacted.
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let providers: Vec<serde_json::Value> = state
        .config
        .providers
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "auth_type": p.auth_type.as_str(),
                "models": p.models,
            })
        })
        .collect();

    let route = |target: &Option<RouteTarget>| target.as_ref().map(RouteTarget::to_string);
    let table = &state.config.router;

    Json(serde_json::json!({
        "providers": providers,
        "router": {
            "default": route(&table.default),
            "background": route(&table.background),
            "think": route(&table.think),
            "longContext": route(&table.long_context),
        }
    }))
}
