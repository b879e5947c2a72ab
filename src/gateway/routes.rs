use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get, post};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;

use super::cookies;
use super::cors::cors_middleware;
use super::error::GatewayError;
use super::proxy::api_proxy;
use super::rate_limit::{limit_auth, limit_write};
use super::state::AppState;
use super::web;
use crate::login::{fetch_profile, normalize_credential, verify_credential};

/// Create the broker router: `/auth/*`, `/web/*` and the `/api/*`
/// pass-through, with CORS preflight handling on every path.
pub fn build_router(state: AppState) -> Router {
    let auth = Router::new()
        .route("/auth/login", post(login))
        .route_layer(from_fn_with_state(state.clone(), limit_auth))
        .route("/auth/session", get(session))
        .route("/auth/logout", post(logout));

    let writes = Router::new()
        .route("/web/reply", post(web::reply))
        .route("/web/topic", post(web::create_topic))
        .route("/web/thank/topic/{id}", post(web::thank_topic))
        .route("/web/thank/reply/{id}", post(web::thank_reply))
        .route_layer(from_fn_with_state(state.clone(), limit_write));

    let reads = Router::new()
        .route("/web/node/{name}", get(web::node_topics))
        .route("/web/replies/{topic_id}", get(web::replies))
        .route("/web/notifications", get(web::notifications));

    let proxied = || -> MethodRouter<AppState> {
        get(api_proxy)
            .post(api_proxy)
            .put(api_proxy)
            .delete(api_proxy)
            .patch(api_proxy)
    };
    let api = Router::new()
        .route("/api", proxied())
        .route("/api/{*path}", proxied());

    Router::new()
        .merge(auth)
        .merge(writes)
        .merge(reads)
        .merge(api)
        .with_state(state)
        .layer(from_fn(cors_middleware))
}

// ── Login ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    cookie: String,
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<(CookieJar, Response), GatewayError> {
    let Json(body) = body.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let credential = normalize_credential(&body.cookie)
        .ok_or_else(|| GatewayError::BadRequest("请输入 Cookie".into()))?;

    let username = match verify_credential(&state.upstream, &credential).await {
        Ok(Some(username)) => username,
        Ok(None) => {
            return Ok((
                jar,
                login_failure(StatusCode::UNAUTHORIZED, "Cookie 无效或已过期"),
            ));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Login probe failed");
            return Ok((
                jar,
                login_failure(StatusCode::BAD_GATEWAY, "V2EX 不可达，请稍后重试"),
            ));
        }
    };

    let profile = fetch_profile(&state.upstream, &state.extract_context(), &username).await;
    let issued = state.sessions.issue();
    state
        .store
        .save(&issued.digest, &credential, &profile)
        .await?;

    let session_cookie = cookies::session_cookie(
        &state.settings.session_cookie_name,
        &issued.token,
        state.settings.session_ttl_days,
        state.settings.secure_cookies,
    );

    tracing::info!(username = %username, "Upstream login successful");

    Ok((
        jar.add(session_cookie),
        Json(json!({"success": true, "member": profile})).into_response(),
    ))
}

fn login_failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "error": message}))).into_response()
}

// ── Session ────────────────────────────────────────────────────────

async fn session(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let token = cookies::session_token(&jar, &state.settings.session_cookie_name);
    if let Some(record) = state.sessions.authorize(token.as_deref()).await {
        return (jar, Json(json!({"member": record.profile})).into_response());
    }

    let jar = if token.is_some() {
        tracing::debug!("Clearing stale session cookie");
        jar.remove(cookies::clear_session_cookie(
            &state.settings.session_cookie_name,
        ))
    } else {
        jar
    };
    (jar, Json(json!({"member": null})).into_response())
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let token = cookies::session_token(&jar, &state.settings.session_cookie_name);
    if state.sessions.verify(token.as_deref()).await {
        if let Err(e) = state.sessions.revoke().await {
            tracing::warn!(error = %e, "Credential removal failed during logout");
        } else {
            tracing::info!("Logged out");
        }
    }

    let clear_cookie = cookies::clear_session_cookie(&state.settings.session_cookie_name);
    (
        jar.remove(clear_cookie),
        Json(json!({"success": true})).into_response(),
    )
}
