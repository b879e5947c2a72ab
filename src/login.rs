//! Upstream login verification.
//!
//! A credential is good when an authenticated-only page renders instead of
//! redirecting, and the page links to the member's own profile.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::Error;
use crate::extract::{ExtractContext, avatar_variants};
use crate::types::Member;
use crate::upstream::UpstreamClient;

/// Page that only renders for a signed-in member.
pub const PROBE_PATH: &str = "/settings";

/// Cookie the upstream keeps its long-lived session in.
pub const SESSION_COOKIE: &str = "A2";

static OWN_PROFILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="(?:https?://[^/"]+)?/member/([A-Za-z0-9_-]+)""#)
        .expect("static pattern is a valid regex")
});

/// Normalizes a pasted credential into a `Cookie` header value.
///
/// Accepts a full cookie header (with or without the `Cookie:` prefix) or
/// the bare value of the upstream session cookie. Returns `None` when
/// nothing is left.
#[must_use]
pub fn normalize_credential(raw: &str) -> Option<String> {
    let mut value = raw.trim();
    if value
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("cookie:"))
    {
        value = value[7..].trim();
    }
    let value = value.trim_end_matches(';').trim();
    if value.is_empty() {
        return None;
    }
    if value.contains('=') {
        Some(value.to_string())
    } else {
        Some(format!("{SESSION_COOKIE}={value}"))
    }
}

/// Finds the signed-in member's username on an authenticated page.
#[must_use]
pub fn find_username(body: &str) -> Option<String> {
    OWN_PROFILE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Resolves `credential` to the username it belongs to.
///
/// `Ok(None)` means the upstream rejected the credential: it redirected, or
/// the page carried no profile link.
///
/// # Errors
///
/// Returns [`Error::Http`] or [`Error::Timeout`] when the upstream cannot
/// be reached; the credential's validity is then unknown.
pub async fn verify_credential(
    client: &UpstreamClient,
    credential: &str,
) -> Result<Option<String>, Error> {
    let page = client.get(PROBE_PATH, Some(credential)).await?;
    if page.is_redirect() {
        tracing::info!(location = ?page.location_path(), "Credential rejected by upstream");
        return Ok(None);
    }
    if !page.is_success() {
        tracing::warn!(status = page.status, "Unexpected status from login probe");
        return Ok(None);
    }
    Ok(find_username(&page.body))
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(flatten)]
    member: Member,
}

/// Looks up public profile fields. Never fails: anything short of a good
/// answer yields a member carrying only `username`.
pub async fn fetch_profile(client: &UpstreamClient, ctx: &ExtractContext, username: &str) -> Member {
    let path = format!(
        "/api/members/show.json?username={}",
        urlencoding::encode(username)
    );
    let fallback = || ctx.member(username, "");

    match client.get_json::<serde_json::Value>(&path).await {
        Ok(json) => match profile_from_json(json) {
            Some(member) => normalize_profile(member, ctx),
            None => {
                tracing::warn!(username, "Profile lookup returned no member");
                fallback()
            }
        },
        Err(e) => {
            tracing::warn!(username, error = %e, "Profile lookup failed");
            fallback()
        }
    }
}

/// Reads the lookup answer. The upstream sends `null` for unset string
/// fields, which are dropped before decoding.
fn profile_from_json(mut json: serde_json::Value) -> Option<Member> {
    if let Some(object) = json.as_object_mut() {
        object.retain(|_, v| !v.is_null());
    }
    let response: ProfileResponse = serde_json::from_value(json).ok()?;
    (response.status.as_deref() != Some("error") && !response.member.username.is_empty())
        .then_some(response.member)
}

fn normalize_profile(mut member: Member, ctx: &ExtractContext) -> Member {
    let best = [
        &member.avatar_large,
        &member.avatar_normal,
        &member.avatar,
        &member.avatar_mini,
    ]
    .into_iter()
    .find(|s| !s.is_empty())
    .map(|s| ctx.absolute_url(s))
    .unwrap_or_default();

    let (mini, normal, large) = avatar_variants(&best);
    let pick = |given: &str, derived: String| {
        if given.is_empty() {
            derived
        } else {
            ctx.absolute_url(given)
        }
    };
    member.avatar_mini = pick(&member.avatar_mini, mini);
    member.avatar_normal = pick(&member.avatar_normal, normal);
    member.avatar_large = pick(&member.avatar_large, large);
    member.avatar = if member.avatar.is_empty() {
        member.avatar_normal.clone()
    } else {
        ctx.absolute_url(&member.avatar)
    };
    if member.url.is_empty() {
        member.url = ctx.absolute_url(&format!("/member/{}", member.username));
    }
    member
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::UtcOffset;

    fn ctx() -> ExtractContext {
        ExtractContext::new("https://www.v2ex.com".parse().unwrap(), UtcOffset::UTC)
    }

    #[test]
    fn bare_value_becomes_session_cookie() {
        assert_eq!(normalize_credential("  2|1:0|10:abc  ").as_deref(), Some("A2=2|1:0|10:abc"));
    }

    #[test]
    fn cookie_header_is_kept() {
        assert_eq!(
            normalize_credential("Cookie: A2=\"x\"; PB3_SESSION=\"y\";").as_deref(),
            Some("A2=\"x\"; PB3_SESSION=\"y\"")
        );
        assert_eq!(normalize_credential("A2=x").as_deref(), Some("A2=x"));
    }

    #[test]
    fn blank_credential_is_none() {
        assert_eq!(normalize_credential(""), None);
        assert_eq!(normalize_credential("   "), None);
        assert_eq!(normalize_credential("cookie:  ;"), None);
    }

    #[test]
    fn username_is_first_profile_link() {
        let body = r#"<div id="Top"><a href="/member/alice" class="top">alice</a>
            <a href="/member/bob">bob</a></div>"#;
        assert_eq!(find_username(body).as_deref(), Some("alice"));
        assert_eq!(
            find_username(r#"<a href="https://www.v2ex.com/member/Al_ice-2">me</a>"#).as_deref(),
            Some("Al_ice-2")
        );
        assert_eq!(find_username("<a href=\"/signin\">登录</a>"), None);
    }

    #[test]
    fn profile_avatars_are_normalized() {
        let member = Member {
            username: "alice".into(),
            avatar_large: "//cdn.v2ex.com/avatar/a/1_large.png?m=1".into(),
            ..Member::default()
        };
        let member = normalize_profile(member, &ctx());
        assert_eq!(member.avatar_large, "https://cdn.v2ex.com/avatar/a/1_large.png?m=1");
        assert_eq!(member.avatar_mini, "https://cdn.v2ex.com/avatar/a/1_mini.png?m=1");
        assert_eq!(member.avatar, "https://cdn.v2ex.com/avatar/a/1_normal.png?m=1");
        assert_eq!(member.url, "https://www.v2ex.com/member/alice");
    }

    #[test]
    fn profile_response_parses_upstream_shape() {
        let json = r#"{"status":"found","id":1,"url":"https://www.v2ex.com/u/alice","username":"alice",
            "website":"","avatar_large":"https://cdn.v2ex.com/a_large.png","created":1272203146}"#;
        let response: ProfileResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status.as_deref(), Some("found"));
        assert_eq!(response.member.username, "alice");
        assert_eq!(response.member.created, 1_272_203_146);
    }

    #[test]
    fn profile_nulls_are_tolerated() {
        let json = serde_json::json!({
            "status": "found", "username": "alice", "bio": null, "btc": null, "id": 1
        });
        assert_eq!(profile_from_json(json).unwrap().username, "alice");

        let missing = serde_json::json!({"status": "notfound"});
        assert!(profile_from_json(missing).is_none());
        let error = serde_json::json!({"status": "error", "username": "x", "message": "rate"});
        assert!(profile_from_json(error).is_none());
    }
}
