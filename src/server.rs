use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::logging::SharedLogger;
use crate::models::ModelRegistry;
use crate::proxy;
use crate::translate::openai_types::{ChatCompletionRequest, ChatErrorResponse};
use crate::translate::request::build_bito_request;
use crate::translate::streaming::StreamTranslator;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub registry: ModelRegistry,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
}

impl AppState {
    pub fn new(config: ProxyConfig, client: reqwest::Client, logger: SharedLogger) -> Self {
        let registry = ModelRegistry::from_config(&config);
        Self {
            config,
            registry,
            client,
            logger,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return unauthorized();
    };

    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state.logger.error("server", format!("Failed to parse request: {e}"));
            return error_response(&ProxyError::invalid_request(e.to_string()));
        }
    };

    let payload = match state
        .registry
        .resolve(&req.model)
        .and_then(|backend| build_bito_request(&req, backend))
    {
        Ok(p) => p,
        Err(e) => {
            state
                .logger
                .warn("server", format!("Rejected request for model '{}': {e}", req.model));
            return error_response(&e);
        }
    };

    let translator = StreamTranslator::new(&req.model);
    let log = state.logger.request(translator.stream_id());
    log.info_with_context(
        "request",
        format!(
            "Request: model={} streaming={} messages={}",
            req.model,
            req.stream,
            req.messages.len()
        ),
        serde_json::json!({
            "context_pairs": payload.context.len(),
            "prompt_len": payload.prompt.len(),
        }),
    );

    let client = state.client.clone();
    let upstream = &state.config.upstream;

    if req.stream {
        let frames = proxy::stream_completion(client, upstream, token, payload, translator, log);
        let events = frames.map(|frame| Ok::<_, Infallible>(Event::default().data(frame.data())));
        Sse::new(events).keep_alive(KeepAlive::default()).into_response()
    } else {
        Json(proxy::complete(client, upstream, token, payload, translator, log).await).into_response()
    }
}

async fn handle_models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if bearer_token(&headers).is_none() {
        return unauthorized();
    }
    Json(state.registry.list()).into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// The token from `Authorization: Bearer <token>`. Forwarded to Bito as is.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn unauthorized() -> Response {
    let err = ChatErrorResponse::invalid_request("Invalid or missing API key");
    (StatusCode::UNAUTHORIZED, Json(err)).into_response()
}

fn error_response(err: &ProxyError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ChatErrorResponse::new(err.error_type(), err.to_string());
    (status, Json(body)).into_response()
}
