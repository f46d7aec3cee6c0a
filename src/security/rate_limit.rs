use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use crate::AppState;
use crate::error::error_response;

/// Token bucket shared by all requests.
///
/// Refills at `rate_per_sec` up to `burst_size`; each admitted request takes
/// one token.
#[derive(Debug)]
pub struct RateLimiter {
    // (last_update, tokens)
    state: Mutex<(Instant, f32)>,
    rate_per_sec: f32,
    burst_size: f32,
}

impl RateLimiter {
    #[must_use]
    pub fn new(rate_per_sec: f32, burst_size: f32) -> Self {
        Self {
            state: Mutex::new((Instant::now(), burst_size)),
            rate_per_sec,
            burst_size,
        }
    }

    /// Take a token if one is available.
    pub fn check(&self) -> bool {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (last_update, tokens) = *guard;
        let now = Instant::now();
        let elapsed = now.duration_since(last_update).as_secs_f32();

        let available = (tokens + elapsed * self.rate_per_sec).min(self.burst_size);

        if available >= 1.0 {
            *guard = (now, available - 1.0);
            true
        } else {
            *guard = (now, available);
            false
        }
    }
}

/// Middleware to enforce rate limits
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if state.config.resilience.rate_limit_enabled && !state.rate_limiter.check() {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "Too many requests, slow down",
        );
    }
    next.run(req).await
}
