//! Anti-forgery ("once") token retrieval.
//!
//! Every state-changing form on the upstream carries a short-lived numeric
//! token rendered into the page that hosts the form. A write must fetch it
//! first; a page that will not yield one means the credential is no longer
//! accepted.

use std::sync::LazyLock;

use derive_more::Display;
use regex::Regex;

use crate::error::ActionError;
use crate::types::TopicId;
use crate::upstream::UpstreamClient;

/// Shortest digit run accepted as a token.
pub const MIN_TOKEN_DIGITS: usize = 5;

static TOKEN_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    let digits = format!(r"(\d{{{MIN_TOKEN_DIGITS},}})");
    [
        format!(r#"name="once"\s+value="{digits}""#),
        format!(r#"value="{digits}"\s+name="once""#),
        format!(r"once={digits}"),
    ]
    .map(|p| Regex::new(&p).expect("static pattern is a valid regex"))
});

/// Page a token is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OnceTarget {
    /// A topic page: hosts the reply form and the thank links.
    #[display("/t/{_0}")]
    Topic(TopicId),
    /// The new-topic form.
    #[display("/write")]
    Write,
}

impl OnceTarget {
    #[must_use]
    pub fn path(&self) -> String {
        self.to_string()
    }
}

/// Applies the fallback pattern chain to a page body.
#[must_use]
pub fn find_once_token(body: &str) -> Option<String> {
    TOKEN_PATTERNS
        .iter()
        .find_map(|re| re.captures(body)?.get(1))
        .map(|m| m.as_str().to_string())
}

/// Fetches a fresh token for a write against `target`.
///
/// # Errors
///
/// - [`ActionError::CredentialExpired`] when the page redirects, answers
///   with a non-success status, or carries no token. The detail says which.
/// - [`ActionError::Unknown`] when the upstream cannot be reached.
pub async fn fetch_once_token(
    client: &UpstreamClient,
    credential: &str,
    target: OnceTarget,
) -> Result<String, ActionError> {
    let page = client.get(&target.path(), Some(credential)).await?;

    if page.is_redirect() {
        let to = page.location_path().unwrap_or("<no location>").to_string();
        tracing::info!(page = %target, location = %to, "Once-token page redirected");
        return Err(ActionError::expired(format!("redirected to {to}")));
    }
    if !page.is_success() {
        tracing::info!(page = %target, status = page.status, "Once-token page failed");
        return Err(ActionError::expired(format!("status {}", page.status)));
    }

    find_once_token(&page.body).ok_or_else(|| {
        tracing::info!(page = %target, "Once token absent");
        ActionError::expired("token absent in body")
    })
}
