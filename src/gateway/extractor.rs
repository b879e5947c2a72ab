use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

use super::cookies;
use super::error::GatewayError;
use super::state::AppState;

/// Upstream credential unlocked by a verified session cookie.
///
/// Use as an Axum extractor on protected routes. Rejects with
/// `401 {"success": false, "error": "unauthorized"}` before any upstream
/// work happens.
///
/// ```rust,ignore
/// async fn notifications(session: Session) -> impl IntoResponse {
///     fetch(&session.credential).await
/// }
/// ```
#[derive(Clone)]
pub struct Session {
    pub credential: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        resolve_session(state, &jar)
            .await
            .map(|credential| Self { credential })
            .ok_or(GatewayError::Unauthenticated)
    }
}

/// Resolves the session cookie to the stored upstream credential.
///
/// For routes that work anonymously but do better signed in. Every
/// failure (no cookie, stale token, undecryptable record) reads as `None`.
pub async fn resolve_session(state: &AppState, jar: &CookieJar) -> Option<String> {
    let token = cookies::session_token(jar, &state.settings.session_cookie_name);
    state.sessions.credential(token.as_deref()).await
}

/// Client address used as the rate-limit key.
///
/// `X-Forwarded-For` is honoured only in production mode, where the broker
/// sits behind a proxy that sets it.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let connected = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(Self(client_ip(
            &parts.headers,
            connected,
            state.settings.trust_forwarded,
        )))
    }
}

fn client_ip(headers: &HeaderMap, connected: Option<String>, trust_forwarded: bool) -> String {
    let forwarded = trust_forwarded
        .then(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .flatten();
    forwarded
        .or(connected)
        .unwrap_or_else(|| "local".to_string())
}
