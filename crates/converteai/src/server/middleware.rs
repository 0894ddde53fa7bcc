use std::net::SocketAddr;

use axum::extract::{ConnectInfo, OriginalUri, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use converteai_core::limits::{self, RequestFacts};

use super::state::{ApiState, Limiter};
use crate::prelude::Error;

pub async fn log_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    log::info!("{} {} - {}", request.method(), request.uri().path(), addr.ip());
    next.run(request).await
}

pub async fn ip_blocker(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    if let Err(e) = state.check_blocked(addr.ip()) {
        log::warn!(
            target: "security",
            "Blocked IP attempted access: {} {} {}",
            addr.ip(),
            request.method(),
            request.uri().path()
        );
        return Err(e);
    }
    Ok(next.run(request).await)
}

/// Count suspicious-looking requests against the strict limiter and block
/// addresses that exceed it.
pub async fn screen_request(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let headers = request.headers();
    let facts = RequestFacts {
        method: request.method().as_str(),
        path: request.uri().path(),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok()),
        has_origin: headers.contains_key(header::ORIGIN),
    };
    let found = limits::suspicions(&facts);

    if !found.is_empty() {
        log::warn!(
            target: "security",
            "Suspicious activity detected: {} {} from {} ({:?}, user agent {:?})",
            facts.method,
            facts.path,
            addr.ip(),
            found,
            facts.user_agent
        );
        if let Err(e) = state.hit(Limiter::Strict, addr.ip()) {
            state.block(addr.ip());
            return Err(e);
        }
    }

    Ok(next.run(request).await)
}

/// General `/api` limiter. The API health check is exempt in development.
pub async fn general_limit(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    if !(state.is_development() && path == "/api/health") {
        state.hit(Limiter::General, addr.ip())?;
    }
    Ok(next.run(request).await)
}

/// Only failed uploads count against the upload limit.
pub async fn upload_limit(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    state.peek(Limiter::Upload, addr.ip())?;
    let response = next.run(request).await;
    if !response.status().is_success() {
        state.record(Limiter::Upload, addr.ip());
    }
    Ok(response)
}

pub async fn download_limit(
    State(state): State<ApiState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    state.hit(Limiter::Download, addr.ip())?;
    Ok(next.run(request).await)
}
