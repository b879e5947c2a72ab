use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use super::error::GatewayError;
use super::extractor::ClientIp;
use super::state::AppState;

/// Keys tracked before stale windows are swept.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RateLimit {
    pub(crate) max_requests: usize,
    pub(crate) window: Duration,
}

impl RateLimit {
    pub(crate) const fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Endpoint families with independent windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Auth,
    Write,
}

impl Family {
    fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Write => "write",
        }
    }
}

/// Sliding-window limiter keyed by family and client.
#[derive(Default)]
pub(crate) struct RateLimiter {
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub(crate) async fn allow(&self, family: Family, client: &str, limit: &RateLimit) -> bool {
        self.allow_at(family, client, limit, Instant::now()).await
    }

    async fn allow_at(&self, family: Family, client: &str, limit: &RateLimit, now: Instant) -> bool {
        let mut lock = self.hits.lock().await;
        if lock.len() > SWEEP_THRESHOLD {
            lock.retain(|_, window| {
                window
                    .back()
                    .is_some_and(|last| now.duration_since(*last) < limit.window)
            });
        }

        let window = lock
            .entry(format!("{}:{client}", family.as_str()))
            .or_default();
        while window
            .front()
            .is_some_and(|first| now.duration_since(*first) >= limit.window)
        {
            window.pop_front();
        }
        if window.len() >= limit.max_requests {
            return false;
        }
        window.push_back(now);
        true
    }
}

pub(crate) async fn limit_auth(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Response {
    enforce(&state, Family::Auth, &ip, req, next).await
}

pub(crate) async fn limit_write(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Response {
    enforce(&state, Family::Write, &ip, req, next).await
}

async fn enforce(state: &AppState, family: Family, ip: &str, req: Request, next: Next) -> Response {
    let limit = match family {
        Family::Auth => &state.settings.auth_limit,
        Family::Write => &state.settings.write_limit,
    };
    if state.limiter.allow(family, ip, limit).await {
        next.run(req).await
    } else {
        tracing::warn!(family = family.as_str(), client_ip = %ip, "Rate limit exceeded");
        GatewayError::RateLimited.into_response()
    }
}
