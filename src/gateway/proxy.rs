//! Verbatim pass-through of the upstream's public JSON API (`/api/*`).

use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::cors::insert_cors_headers;
use super::state::AppState;

const PROXY_USER_AGENT: &str = "V2Fun/1.0";

/// Connection-scoped headers that must not cross the proxy, plus the
/// length, which the outgoing body sets itself.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

pub(crate) async fn api_proxy(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());

    match forward(&state, method, &path, &headers, body).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(path = %uri.path(), error = %e, "API proxy failed");
            let mut resp = (
                StatusCode::BAD_GATEWAY,
                axum::Json(json!({"error": "V2EX API 不可达，请稍后重试"})),
            )
                .into_response();
            insert_cors_headers(resp.headers_mut());
            resp
        }
    }
}

async fn forward(
    state: &AppState,
    method: Method,
    path: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, crate::error::Error> {
    let url = state.upstream.url(path)?;
    let mut request = state
        .upstream
        .http()
        .request(method.clone(), url)
        .timeout(state.settings.proxy_timeout)
        .header(header::USER_AGENT, PROXY_USER_AGENT);

    for name in [header::AUTHORIZATION, header::CONTENT_TYPE] {
        if let Some(value) = headers.get(&name) {
            request = request.header(name, value.clone());
        }
    }
    if method != Method::GET && method != Method::HEAD {
        request = request.body(body);
    }

    let upstream = request.send().await.map_err(crate::error::Error::from_upstream)?;
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let bytes = upstream.bytes().await.map_err(crate::error::Error::from_upstream)?;

    let mut resp = Response::new(Body::from(bytes));
    *resp.status_mut() = status;
    copy_response_headers(&upstream_headers, resp.headers_mut());
    insert_cors_headers(resp.headers_mut());
    Ok(resp)
}

fn copy_response_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if !is_hop_by_hop(name) {
            to.append(name.clone(), value.clone());
        }
    }
    if !to.contains_key(header::CONTENT_TYPE) {
        to.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
}
