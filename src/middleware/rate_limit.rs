use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

use crate::error::ErrorResponse;

/// Process-wide limiter for the admin payout routes
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimitLayer {
    /// `requests` per minute; zero is treated as one
    pub fn per_minute(requests: u32) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        RateLimitLayer {
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(burst))),
        }
    }

    pub fn allow(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

pub async fn rate_limit_middleware(
    State(limit): State<RateLimitLayer>,
    req: Request,
    next: Next,
) -> Response {
    if !limit.allow() {
        warn!("Rate limit hit on {}", req.uri().path());
        let body = Json(ErrorResponse {
            success: false,
            error: "Rate limit exceeded. Please try again later.".to_string(),
            error_code: "RATE_LIMITED".to_string(),
            retry_safe: true,
            details: None,
        });
        return (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    }

    next.run(req).await
}
