//! HTTP routes.
//!
//! `GET /q/{backend}[/{pattern}]` streams a subscription, `POST` to the same
//! paths publishes the request body. The routing key of a publish comes from
//! the `k` query parameter.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{ACCEPT, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use tracing::{debug, error, warn};

use super::body::PullBody;
use crate::client::{ClientSession, SessionCookie};
use crate::config::Settings;
use crate::controller::{Controller, Gateway, GatewayRequest, PATTERN_PARAM, ResponseHead};
use crate::utils::GatewayError;

const BACKEND_PARAM: &str = "backend";

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub cookie: SessionCookie,
    pub max_chunk_bytes: usize,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, settings: &Settings) -> Self {
        Self {
            gateway,
            cookie: SessionCookie::from_settings(&settings.session),
            max_chunk_bytes: settings.server.max_chunk_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/q/:backend", get(subscribe).post(publish))
        .route("/q/:backend/*pattern", get(subscribe).post(publish))
        .with_state(state)
}

fn error_response(status: StatusCode, error: &GatewayError) -> Response {
    let body = json!({ "error": error.kind(), "message": error.to_string() });
    (status, axum::Json(body)).into_response()
}

/// Resolves the controller and the client session of a request.
fn prepare<'a>(
    state: &'a AppState,
    params: &HashMap<String, String>,
    query: HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<(&'a Controller, ClientSession, GatewayRequest), Response> {
    let backend = params.get(BACKEND_PARAM).map(String::as_str).unwrap_or("");
    let controller = state.gateway.controller(backend).map_err(|e| {
        debug!(backend = %backend, "request for unknown backend");
        error_response(StatusCode::NOT_FOUND, &e)
    })?;

    let cookies = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok());
    let session = state.cookie.resolve(cookies);

    let mut request = GatewayRequest::new(session.id.clone());
    request.query = query;
    request.accept = headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if let Some(pattern) = params.get(PATTERN_PARAM) {
        request = request.with_path_param(PATTERN_PARAM, pattern.clone());
    }
    Ok((controller, session, request))
}

fn respond(
    state: &AppState,
    mut head: ResponseHead,
    session: &ClientSession,
    body: Body,
) -> Response {
    head.push_header(
        SET_COOKIE.as_str(),
        state.cookie.set_cookie(&session.id, Utc::now()),
    );
    let mut builder = Response::builder().status(head.status);
    for (name, value) in &head.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(body)
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to build response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

async fn subscribe(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let (controller, session, request) = match prepare(&state, &params, query, &headers) {
        Ok(prepared) => prepared,
        Err(response) => return response,
    };

    let (head, subscription) = controller.get(&request);
    let body = Body::new(PullBody::new(Arc::new(subscription), state.max_chunk_bytes));
    respond(&state, head, &session, body)
}

async fn publish(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let (controller, session, request) = match prepare(&state, &params, query, &headers) {
        Ok(prepared) => prepared,
        Err(response) => return response,
    };

    let publisher = Arc::new(controller.post(&request));
    let mut chunks = body.into_data_stream();
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(bytes) => publisher.on_body_chunk(&bytes),
            Err(e) => {
                warn!(session = %session.id, error = %e, "request body aborted");
                let error = GatewayError::InvalidRequest(e.to_string());
                return error_response(StatusCode::BAD_REQUEST, &error);
            }
        }
    }

    let head = publisher.on_body_complete().await;
    let body = Body::new(PullBody::new(publisher, state.max_chunk_bytes));
    respond(&state, head, &session, body)
}
