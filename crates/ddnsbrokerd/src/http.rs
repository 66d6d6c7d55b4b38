//! Inbound HTTP surface
//!
//! - `GET /`, `GET /myip`: caller's normalized address as plain text
//! - `GET /nic/update`: dyndns2 update protocol
//! - `GET /health`: liveness check
//!
//! The caller address is the TCP peer, so the router must be served with
//! `into_make_service_with_connect_info::<SocketAddr>()`.

use axum::Router;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use ddnsbroker_core::{UpdateHandler, UpdateRequest, UpdateResponse, normalize_ip};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::error;

/// dyndns2 token for a server-side failure
const SERVER_ERROR_BODY: &str = "911";

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<UpdateHandler>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(my_ip))
        .route("/myip", get(my_ip))
        .route("/nic/update", get(nic_update))
        .route("/health", get(health))
        .with_state(state)
}

async fn my_ip(ConnectInfo(peer): ConnectInfo<SocketAddr>) -> String {
    normalize_ip(&peer.ip().to_string())
}

async fn health() -> &'static str {
    "ok"
}

async fn nic_update(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    // pairs keep repeated myip values
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let mut request = UpdateRequest {
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        remote_addr: Some(peer.ip()),
        ..Default::default()
    };
    for (key, value) in params {
        match key.as_str() {
            "hostname" => request.hostname = Some(value),
            "myip" => request.myip.push(value),
            _ => {}
        }
    }

    match state.handler.handle(&request, Utc::now()).await {
        Ok(outcome) => {
            let status = StatusCode::from_u16(outcome.status()).unwrap_or(StatusCode::OK);
            let mut response = (status, outcome.body()).into_response();
            if outcome == UpdateResponse::BadAuth
                && let Ok(challenge) = HeaderValue::from_str(&state.handler.challenge())
            {
                response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
            }
            response
        }
        Err(e) => {
            error!("Update request from {} failed: {}", peer, e);
            (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_BODY).into_response()
        }
    }
}
