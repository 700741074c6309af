// rate_limit_middleware.rs
use crate::services::rate_limit::{RateLimitResult, RateLimitService};
use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Serialize)]
struct RateLimitErrorResponse {
    error: String,
    code: String,
    retry_after: u32,
}

/// Extract the client IP used as the rate limit key. Forwarding headers are
/// read only when `trust_proxy` is set.
fn extract_ip_address(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> Option<String> {
    if trust_proxy {
        if let Some(forwarded) = headers.get("x-forwarded-for") {
            if let Ok(forwarded_str) = forwarded.to_str() {
                // Take the first IP in the chain
                if let Some(first_ip) = forwarded_str.split(',').next() {
                    let first_ip = first_ip.trim();
                    if !first_ip.is_empty() {
                        return Some(first_ip.to_string());
                    }
                }
            }
        }

        if let Some(real_ip) = headers.get("x-real-ip") {
            if let Ok(ip_str) = real_ip.to_str() {
                return Some(ip_str.trim().to_string());
            }
        }
    }

    connect_info.map(|info| info.0.ip().to_string())
}

fn limited_response(retry_after: u32) -> Response {
    let error_response = RateLimitErrorResponse {
        error: "Rate limit exceeded. Please try again later.".to_string(),
        code: "RATE_LIMIT_EXCEEDED".to_string(),
        retry_after,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error_response)).into_response();
    if let Ok(retry_header) = HeaderValue::from_str(&retry_after.to_string()) {
        response.headers_mut().insert("retry-after", retry_header);
    }
    response
}

/// Per-IP rate limiting for the public, unauthenticated routes
pub async fn rate_limit_middleware(
    Extension(rate_limit_service): Extension<Arc<RateLimitService>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip_address = extract_ip_address(
        request.headers(),
        connect_info.as_ref(),
        rate_limit_service.config().trust_proxy_headers,
    );
    let path = request.uri().path().to_string();

    match rate_limit_service.check(ip_address.as_deref()).await {
        RateLimitResult::Allowed => {
            debug!(ip = ?ip_address, path = %path, "Request allowed by rate limiter");
            Ok(next.run(request).await)
        }
        RateLimitResult::Limited { retry_after } => {
            warn!(
                ip = ?ip_address,
                path = %path,
                retry_after = retry_after,
                "Request blocked by rate limiter"
            );
            Err(limited_response(retry_after))
        }
    }
}
