use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};

/// Upstream topic identifier.
///
/// Opaque and non-sequential: only meaningful within the upstream site.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    FromStr,
    From,
    Into,
)]
#[serde(transparent)]
pub struct TopicId(pub u64);

/// Upstream reply identifier.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    FromStr,
    From,
    Into,
)]
#[serde(transparent)]
pub struct ReplyId(pub u64);

/// Upstream notification identifier.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    FromStr,
    From,
    Into,
)]
#[serde(transparent)]
pub struct NotificationId(pub u64);

/// Node slug, e.g. `python` in `/go/python`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct NodeName(pub String);

impl NodeName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Node slugs are ASCII words with `-`; anything else is rejected before
    /// it reaches an upstream URL.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 64
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

/// Upstream member, also the cached profile of the logged-in user.
///
/// Field names follow the upstream JSON API so the UI can treat scraped and
/// API-sourced members alike.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub id: u64,
    pub username: String,
    pub url: String,
    pub website: String,
    pub twitter: String,
    pub psn: String,
    pub github: String,
    pub btc: String,
    pub location: String,
    pub tagline: String,
    pub bio: String,
    pub avatar_mini: String,
    pub avatar_normal: String,
    pub avatar_large: String,
    pub avatar: String,
    pub created: i64,
}

impl Member {
    /// Minimal member carrying only a name and (optionally) an avatar.
    #[must_use]
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub id: u64,
    pub name: String,
    pub url: String,
    pub title: String,
    pub title_alternative: String,
    pub topics: u64,
    pub stars: u64,
    pub header: String,
    pub footer: String,
    pub avatar: String,
    pub avatar_mini: String,
    pub avatar_normal: String,
    pub avatar_large: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub title: String,
    pub url: String,
    pub content: String,
    pub content_rendered: String,
    pub syntax: u8,
    pub replies: u64,
    pub member: Member,
    pub node: Node,
    pub created: i64,
    pub last_modified: i64,
    pub last_touched: i64,
    pub last_reply_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: ReplyId,
    pub content: String,
    pub content_rendered: String,
    pub member: Member,
    pub created: i64,
    pub topic_id: TopicId,
    pub thanked: bool,
    pub thanks: u64,
    /// Floor number as rendered upstream (1-based, across pages).
    pub floor: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub member_id: u64,
    pub for_member_id: u64,
    pub text: String,
    pub payload: String,
    pub payload_rendered: String,
    pub created: i64,
    pub member: Member,
    /// Topic the notification points at, when a `/t/<id>` link is present.
    pub topic_id: Option<TopicId>,
    pub reply_floor: Option<u32>,
}

/// One page of extracted records.
///
/// `total_pages` is a floor, never an exact count: markup that hides the
/// pager makes it under-count. Treat a short page of `items` as the only
/// reliable exhaustion signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total_pages: u32,
}

impl<T> PageResult<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total_pages: u32) -> Self {
        Self {
            items,
            total_pages: total_pages.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_id_serializes_as_bare_number() {
        let json = serde_json::to_string(&TopicId(1085817)).unwrap();
        assert_eq!(json, "1085817");
        let parsed: TopicId = "1085817".parse().unwrap();
        assert_eq!(parsed, TopicId(1085817));
    }

    #[test]
    fn page_result_never_reports_zero_pages() {
        let page: PageResult<Reply> = PageResult::new(Vec::new(), 0);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn page_result_uses_camel_case() {
        let page: PageResult<u32> = PageResult::new(vec![1, 2], 3);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalPages"], 3);
    }

    #[test]
    fn member_tolerates_partial_json() {
        let member: Member = serde_json::from_str(r#"{"username":"alice","id":7}"#).unwrap();
        assert_eq!(member.username, "alice");
        assert_eq!(member.id, 7);
        assert!(member.avatar.is_empty());
    }

    #[test]
    fn node_name_validation() {
        assert!(NodeName::from("python".to_string()).is_valid());
        assert!(NodeName::from("dev-ops_2".to_string()).is_valid());
        assert!(!NodeName::from(String::new()).is_valid());
        assert!(!NodeName::from("../etc".to_string()).is_valid());
        assert!(!NodeName::from("a b".to_string()).is_valid());
    }

    #[test]
    fn newtypes_prevent_mixing() {
        fn takes_topic(_: TopicId) {}
        fn takes_reply(_: ReplyId) {}

        takes_topic(TopicId::from(1));
        takes_reply(ReplyId::from(1));
        // takes_topic(ReplyId::from(1));  // Compile error!
    }
}
