//! Write actions replayed through the upstream's own forms.
//!
//! Each action runs `validate → fetch token → build form → submit →
//! classify`. The upstream has no structured result for these endpoints, so
//! [`classify`] reads the response through an ordered table of rules; the
//! first rule with an opinion decides.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::extract::collapse_whitespace;
use crate::once::{OnceTarget, fetch_once_token};
use crate::types::{NodeName, ReplyId, TopicId};
use crate::upstream::{Page, UpstreamClient};

pub const MAX_TITLE_CHARS: usize = 120;

static SIGNIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:href|action)="(?:https?://[^/"]+)?/signin"#)
        .expect("static pattern is a valid regex")
});
static TOPIC_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/t/(\d+)").expect("static pattern is a valid regex"));
static CANONICAL_TOPIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"rel="canonical"\s+href="[^"]*/t/(\d+)""#).expect("static pattern is a valid regex")
});
static PROBLEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.problem").expect("static selector is valid CSS"));
static PROBLEM_ITEMS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li").expect("static selector is valid CSS"));

/// Markup flavour of a new topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    #[default]
    Default,
    Markdown,
}

impl Syntax {
    #[must_use]
    pub fn as_form_value(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Markdown => "markdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAction {
    Reply {
        topic_id: TopicId,
        content: String,
    },
    ThankTopic {
        topic_id: TopicId,
    },
    ThankReply {
        reply_id: ReplyId,
        topic_id: TopicId,
    },
    CreateTopic {
        title: String,
        content: String,
        node: NodeName,
        syntax: Syntax,
    },
}

/// A ready-to-send form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub path: String,
    pub form: Vec<(&'static str, String)>,
    pub referer: String,
}

/// What a successful action produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub created_topic: Option<TopicId>,
}

impl WriteAction {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reply { .. } => "reply",
            Self::ThankTopic { .. } => "thank_topic",
            Self::ThankReply { .. } => "thank_reply",
            Self::CreateTopic { .. } => "create_topic",
        }
    }

    /// Rejects input the upstream would refuse, before any request is made.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::ActionFailed`] naming the problem.
    pub fn validate(&self) -> Result<(), ActionError> {
        let fail = |msg: &str| Err(ActionError::ActionFailed(msg.to_string()));
        match self {
            Self::Reply { content, .. } if content.trim().is_empty() => fail("回复内容不能为空"),
            Self::CreateTopic { title, .. } if title.trim().is_empty() => fail("标题不能为空"),
            Self::CreateTopic { title, .. } if title.trim().chars().count() > MAX_TITLE_CHARS => {
                fail("标题不能超过 120 个字符")
            }
            Self::CreateTopic { node, .. } if !node.is_valid() => fail("请选择节点"),
            _ => Ok(()),
        }
    }

    /// Page the once token is read from.
    #[must_use]
    pub fn once_target(&self) -> OnceTarget {
        match self {
            Self::Reply { topic_id, .. }
            | Self::ThankTopic { topic_id }
            | Self::ThankReply { topic_id, .. } => OnceTarget::Topic(*topic_id),
            Self::CreateTopic { .. } => OnceTarget::Write,
        }
    }

    #[must_use]
    pub fn submission(&self, once: &str) -> Submission {
        let referer = self.once_target().path();
        let once_query = urlencoding::encode(once);
        match self {
            Self::Reply { topic_id, content } => Submission {
                path: format!("/t/{topic_id}"),
                form: vec![("content", content.trim().to_string()), ("once", once.to_string())],
                referer,
            },
            Self::ThankTopic { topic_id } => Submission {
                path: format!("/thank/topic/{topic_id}?once={once_query}"),
                form: Vec::new(),
                referer,
            },
            Self::ThankReply { reply_id, .. } => Submission {
                path: format!("/thank/reply/{reply_id}?once={once_query}"),
                form: Vec::new(),
                referer,
            },
            Self::CreateTopic {
                title,
                content,
                node,
                syntax,
            } => Submission {
                path: "/write".to_string(),
                form: vec![
                    ("title", title.trim().to_string()),
                    ("content", content.clone()),
                    ("node_name", node.as_str().to_string()),
                    ("syntax", syntax.as_form_value().to_string()),
                    ("once", once.to_string()),
                ],
                referer,
            },
        }
    }
}

/// Runs `action` end to end with the stored `credential`.
///
/// The form is never submitted when the token fetch fails, so an expired
/// credential costs exactly one GET.
///
/// # Errors
///
/// Any [`ActionError`]; see [`classify`] for how responses map.
pub async fn execute(
    client: &UpstreamClient,
    credential: &str,
    action: &WriteAction,
) -> Result<ActionOutcome, ActionError> {
    action.validate()?;
    let once = fetch_once_token(client, credential, action.once_target()).await?;
    let submission = action.submission(&once);
    let form: Vec<(&str, &str)> = submission
        .form
        .iter()
        .map(|(k, v)| (*k, v.as_str()))
        .collect();

    let page = client
        .post_form(&submission.path, credential, &form, &submission.referer)
        .await?;

    let result = classify(action, &page);
    match &result {
        Ok(outcome) => tracing::info!(
            action = action.kind(),
            created_topic = ?outcome.created_topic,
            "Write action succeeded"
        ),
        Err(e) => tracing::warn!(action = action.kind(), code = e.code(), error = %e, "Write action failed"),
    }
    result
}

pub type Verdict = Option<Result<ActionOutcome, ActionError>>;
pub type Rule = (&'static str, fn(&WriteAction, &Page) -> Verdict);

/// Classification precedence, first match wins.
pub const RULES: [Rule; 5] = [
    ("signin", signin_rule),
    ("problem", problem_rule),
    ("json", json_rule),
    ("target", target_rule),
    ("fallback", fallback_rule),
];

/// Maps a submission response to an outcome using [`RULES`].
///
/// # Errors
///
/// [`ActionError::CredentialExpired`] or [`ActionError::ActionFailed`].
pub fn classify(action: &WriteAction, page: &Page) -> Result<ActionOutcome, ActionError> {
    for (name, rule) in RULES {
        if let Some(verdict) = rule(action, page) {
            tracing::debug!(action = action.kind(), rule = name, status = page.status, "Classified response");
            return verdict;
        }
    }
    Err(ActionError::ActionFailed("操作失败".to_string()))
}

fn signin_rule(_: &WriteAction, page: &Page) -> Verdict {
    let redirected = page
        .location_path()
        .is_some_and(|path| path.starts_with("/signin"));
    (redirected || SIGNIN.is_match(&page.body))
        .then(|| Err(ActionError::expired("upstream asked to sign in")))
}

fn problem_rule(_: &WriteAction, page: &Page) -> Verdict {
    if !page.body.contains("problem") {
        return None;
    }
    let document = Html::parse_document(&page.body);
    let problem = document.select(&PROBLEM).next()?;
    let items: Vec<String> = problem
        .select(&PROBLEM_ITEMS)
        .map(|li| collapse_whitespace(&li.text().collect::<String>()))
        .filter(|s| !s.is_empty())
        .collect();
    let message = if items.is_empty() {
        collapse_whitespace(&problem.text().collect::<String>())
    } else {
        items.join("；")
    };
    (!message.is_empty()).then(|| Err(ActionError::ActionFailed(message)))
}

#[derive(Debug, Deserialize)]
struct JsonVerdict {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

fn json_rule(_: &WriteAction, page: &Page) -> Verdict {
    let body = page.body.trim_start();
    if !body.starts_with('{') {
        return None;
    }
    let verdict: JsonVerdict = serde_json::from_str(body).ok()?;
    Some(if verdict.success {
        Ok(ActionOutcome::default())
    } else {
        Err(ActionError::ActionFailed(
            verdict
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "操作失败".to_string()),
        ))
    })
}

fn target_rule(action: &WriteAction, page: &Page) -> Verdict {
    let landed = page
        .location_path()
        .and_then(|path| TOPIC_PATH.captures(path)?.get(1)?.as_str().parse::<u64>().ok())
        .map(TopicId);

    match action {
        WriteAction::CreateTopic { .. } => {
            let created = landed.or_else(|| {
                page.is_success()
                    .then(|| CANONICAL_TOPIC.captures(&page.body)?.get(1)?.as_str().parse::<u64>().ok())
                    .flatten()
                    .map(TopicId)
            })?;
            Some(Ok(ActionOutcome {
                created_topic: Some(created),
            }))
        }
        WriteAction::Reply { topic_id, .. }
        | WriteAction::ThankTopic { topic_id }
        | WriteAction::ThankReply { topic_id, .. } => {
            (landed == Some(*topic_id)).then(|| Ok(ActionOutcome::default()))
        }
    }
}

fn fallback_rule(_: &WriteAction, page: &Page) -> Verdict {
    Some(Err(ActionError::ActionFailed(format!(
        "操作失败 (HTTP {})",
        page.status
    ))))
}
