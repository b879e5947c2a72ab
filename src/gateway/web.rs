//! `/web/*`: scraped reads and replayed writes.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::GatewayError;
use super::extractor::{Session, resolve_session};
use super::state::AppState;
use crate::actions::{self, ActionOutcome, Syntax, WriteAction};
use crate::error::ActionError;
use crate::extract::notifications::parse_notification_list;
use crate::extract::replies::parse_reply_list;
use crate::extract::topics::parse_node_page;
use crate::types::{NodeName, ReplyId, TopicId};

#[derive(Debug, Deserialize)]
pub(crate) struct PageQuery {
    p: Option<u32>,
}

impl PageQuery {
    fn page(&self) -> u32 {
        self.p.unwrap_or(1).max(1)
    }
}

// ── Reads ──────────────────────────────────────────────────────────

pub(crate) async fn node_topics(
    State(state): State<AppState>,
    name: Result<Path<String>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
    jar: CookieJar,
) -> Result<Response, GatewayError> {
    let Path(name) = name.map_err(bad_path)?;
    let Query(query) = query.map_err(bad_query)?;
    let name = NodeName::from(name);
    if !name.is_valid() {
        return Err(GatewayError::BadRequest("invalid node name".into()));
    }
    let credential = resolve_session(&state, &jar).await;
    let path = format!("/go/{}?p={}", name.as_str(), query.page());

    Ok(match fetch_listing(&state, &path, credential.as_deref()).await {
        Ok(body) => {
            let page = parse_node_page(&body, &state.extract_context(), &name);
            Json(json!({
                "success": true,
                "result": page.topics.items,
                "totalPages": page.topics.total_pages,
                "node": page.node,
            }))
            .into_response()
        }
        Err(e) => read_failure(&e, "node", &path),
    })
}

pub(crate) async fn replies(
    State(state): State<AppState>,
    topic_id: Result<Path<u64>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
    jar: CookieJar,
) -> Result<Response, GatewayError> {
    let Path(topic_id) = topic_id.map_err(bad_path)?;
    let Query(query) = query.map_err(bad_query)?;
    let topic_id = TopicId(topic_id);
    let credential = resolve_session(&state, &jar).await;
    let path = format!("/t/{topic_id}?p={}", query.page());

    Ok(match fetch_listing(&state, &path, credential.as_deref()).await {
        Ok(body) => {
            let page = parse_reply_list(&body, &state.extract_context(), topic_id);
            read_success(page.items, page.total_pages)
        }
        Err(e) => read_failure(&e, "replies", &path),
    })
}

pub(crate) async fn notifications(
    State(state): State<AppState>,
    session: Session,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Response, GatewayError> {
    let Query(query) = query.map_err(bad_query)?;
    let path = format!("/notifications?p={}", query.page());

    Ok(match fetch_listing(&state, &path, Some(&session.credential)).await {
        Ok(body) => {
            let page = parse_notification_list(&body, &state.extract_context());
            read_success(page.items, page.total_pages)
        }
        Err(e) => read_failure(&e, "notifications", &path),
    })
}

/// GETs a listing page. Redirects are how the upstream says "sign in
/// first"; with a credential attached that means it expired.
async fn fetch_listing(
    state: &AppState,
    path: &str,
    credential: Option<&str>,
) -> Result<String, ActionError> {
    let page = state.upstream.get(path, credential).await?;
    if page.is_redirect() {
        let to = page.location_path().unwrap_or_default().to_string();
        return Err(match credential {
            Some(_) if to.starts_with("/signin") => ActionError::expired(format!("redirected to {to}")),
            None if to.starts_with("/signin") => ActionError::NoCredential,
            _ => ActionError::Unknown(format!("redirected to {to}")),
        });
    }
    if !page.is_success() {
        return Err(ActionError::Unknown(format!("status {}", page.status)));
    }
    Ok(page.body)
}

fn read_success<T: Serialize>(items: Vec<T>, total_pages: u32) -> Response {
    Json(json!({
        "success": true,
        "result": items,
        "totalPages": total_pages.max(1),
    }))
    .into_response()
}

fn read_failure(error: &ActionError, listing: &str, path: &str) -> Response {
    tracing::warn!(listing, path, code = error.code(), error = %error, "Listing fetch failed");
    Json(json!({
        "success": false,
        "result": [],
        "totalPages": 1,
        "error": error.code(),
    }))
    .into_response()
}

// ── Writes ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReplyBody {
    topic_id: u64,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateTopicBody {
    title: String,
    #[serde(default)]
    content: String,
    node_name: String,
    #[serde(default)]
    syntax: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThankReplyBody {
    topic_id: u64,
}

pub(crate) async fn reply(
    State(state): State<AppState>,
    session: Session,
    body: Result<Json<ReplyBody>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(body) = body.map_err(bad_body)?;
    let action = WriteAction::Reply {
        topic_id: TopicId(body.topic_id),
        content: body.content,
    };
    Ok(run_action(&state, &session, &action).await)
}

pub(crate) async fn create_topic(
    State(state): State<AppState>,
    session: Session,
    body: Result<Json<CreateTopicBody>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(body) = body.map_err(bad_body)?;
    let syntax = match body.syntax.as_deref() {
        Some("markdown") => Syntax::Markdown,
        _ => Syntax::Default,
    };
    let action = WriteAction::CreateTopic {
        title: body.title,
        content: body.content,
        node: NodeName::from(body.node_name),
        syntax,
    };
    Ok(run_action(&state, &session, &action).await)
}

pub(crate) async fn thank_topic(
    State(state): State<AppState>,
    session: Session,
    topic_id: Result<Path<u64>, PathRejection>,
) -> Result<Response, GatewayError> {
    let Path(topic_id) = topic_id.map_err(bad_path)?;
    let action = WriteAction::ThankTopic {
        topic_id: TopicId(topic_id),
    };
    Ok(run_action(&state, &session, &action).await)
}

pub(crate) async fn thank_reply(
    State(state): State<AppState>,
    session: Session,
    reply_id: Result<Path<u64>, PathRejection>,
    body: Result<Json<ThankReplyBody>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Path(reply_id) = reply_id.map_err(bad_path)?;
    let Json(body) = body.map_err(bad_body)?;
    let action = WriteAction::ThankReply {
        reply_id: ReplyId(reply_id),
        topic_id: TopicId(body.topic_id),
    };
    Ok(run_action(&state, &session, &action).await)
}

async fn run_action(state: &AppState, session: &Session, action: &WriteAction) -> Response {
    write_response(actions::execute(&state.upstream, &session.credential, action).await)
}

/// Maps an action result onto the wire: domain failures are `200` with
/// `success: false`; only unclassified failures change the status.
pub(crate) fn write_response(result: Result<ActionOutcome, ActionError>) -> Response {
    match result {
        Ok(ActionOutcome {
            created_topic: Some(id),
        }) => Json(json!({"success": true, "topicId": id})).into_response(),
        Ok(ActionOutcome { created_topic: None }) => Json(json!({"success": true})).into_response(),
        Err(e) => {
            let status = match e {
                ActionError::Unknown(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::OK,
            };
            (
                status,
                Json(json!({
                    "success": false,
                    "error": e.code(),
                    "message": e.message(),
                })),
            )
                .into_response()
        }
    }
}

fn bad_body(rejection: JsonRejection) -> GatewayError {
    GatewayError::BadRequest(rejection.body_text())
}

fn bad_path(rejection: PathRejection) -> GatewayError {
    GatewayError::BadRequest(rejection.body_text())
}

fn bad_query(rejection: QueryRejection) -> GatewayError {
    GatewayError::BadRequest(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn created_topic_id_is_returned() {
        let resp = write_response(Ok(ActionOutcome {
            created_topic: Some(TopicId(1085900)),
        }));
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["topicId"], 1085900);
    }

    #[tokio::test]
    async fn domain_failures_are_200() {
        let resp = write_response(Err(ActionError::expired("redirected to /signin")));
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "cookie_expired");

        let resp = write_response(Err(ActionError::ActionFailed("你回复过于频繁了".into())));
        let json = body_json(resp).await;
        assert_eq!(json["error"], "action_failed");
        assert_eq!(json["message"], "你回复过于频繁了");
    }

    #[tokio::test]
    async fn unknown_failure_is_bad_gateway() {
        let resp = write_response(Err(ActionError::Unknown("timeout".into())));
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(resp).await["error"], "unknown");
    }

    #[tokio::test]
    async fn read_failure_shape() {
        let json = body_json(read_failure(&ActionError::expired("x"), "replies", "/t/1")).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["totalPages"], 1);
        assert!(json["result"].as_array().unwrap().is_empty());
        assert_eq!(json["error"], "cookie_expired");
    }

    #[test]
    fn page_query_floors_at_one() {
        assert_eq!(PageQuery { p: None }.page(), 1);
        assert_eq!(PageQuery { p: Some(0) }.page(), 1);
        assert_eq!(PageQuery { p: Some(4) }.page(), 4);
    }
}
