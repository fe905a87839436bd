use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, http::Request, middleware::Next, response::Response};
use dashmap::DashMap;
use metrics::counter;

use crate::error::AppError;
use crate::metrics::RATE_LIMITED;
use crate::middleware::client_key;
use crate::storage::Storage;
use crate::AppState;

/// Fixed-window request counter per client
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    window: Duration,
    max_requests: u32,
}

/// Rate limit entry for a client
#[derive(Debug)]
struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            entries: DashMap::new(),
            window,
            max_requests,
        }
    }

    /// Count one request for `client`; false once the window's quota is spent
    pub fn check(&self, client: &str) -> bool {
        let mut entry = self
            .entries
            .entry(client.to_string())
            .or_insert_with(|| RateLimitEntry {
                requests: 0,
                window_start: Instant::now(),
            });

        if entry.window_start.elapsed() > self.window {
            entry.requests = 0;
            entry.window_start = Instant::now();
        }

        if entry.requests >= self.max_requests {
            return false;
        }
        entry.requests += 1;
        true
    }

    /// Drop clients whose window has lapsed
    pub fn cleanup(&self) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.window_start.elapsed() <= self.window);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "stale rate limit entries dropped");
        }
    }
}

/// Rate limiter middleware
pub async fn rate_limit<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_key(request.headers(), request.extensions());
    if !state.rate_limiter.check(&client) {
        counter!(RATE_LIMITED).increment(1);
        tracing::debug!(client = %client, "request rate limited");
        return Err(AppError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}
