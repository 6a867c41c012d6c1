use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::app::rate_limiter::RateLimiter;
use crate::config::rate_limits::PublicAction;
use crate::http::AppError;
use crate::AppState;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// IP-based throttling for the anonymous public endpoints.
pub async fn ip_rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let action = match PublicAction::for_request(request.method().as_str(), request.uri().path()) {
        Some(action) => action,
        None => return Ok(next.run(request).await),
    };

    let ip = addr.ip().to_string();
    let rate_limiter = RateLimiter::new(state.cache.clone(), state.rate_limits);

    let info = rate_limiter
        .check_ip_rate_limit(&ip, action)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to check IP rate limit");
            AppError::internal("failed to check rate limit")
        })?;

    if info.limited {
        tracing::warn!(ip = ip, action = action.as_str(), "IP rate limit exceeded");
        return Err(AppError::rate_limited(
            "Too many requests from your IP address. Please try again later.",
        ));
    }

    if let Err(err) = rate_limiter.increment_ip(&ip, action).await {
        tracing::warn!(error = ?err, "failed to increment IP rate limit counter");
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(info.limit));
    headers.insert(
        REMAINING_HEADER,
        HeaderValue::from(info.remaining.saturating_sub(1)),
    );
    Ok(response)
}
