//! The signed-in member's notification feed (`/notifications?p=<n>`).

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use super::pagination::infer_total_pages;
use super::timestamp::resolve_timestamp;
use super::{ExtractContext, Field, FieldRule, Fields, ParseOutcome, RecordTable, regex, selector_of};
use crate::types::{Notification, NotificationId, PageResult, TopicId};

static TABLE: LazyLock<RecordTable> = LazyLock::new(|| RecordTable {
    kind: "notification",
    anchor: selector_of(r#"div.cell[id^="n_"]"#),
    id: vec![FieldRule::own_attr("id").capture(r"^n_(\d+)$")],
    fields: vec![
        Field::new(
            "username",
            vec![
                FieldRule::text(r#"a[href*="/member/"] strong"#),
                FieldRule::attr(r#"a[href*="/member/"]"#, "href").capture(r"/member/([^/?#]+)"),
            ],
        ),
        Field::new("avatar", vec![FieldRule::attr("img.avatar", "src")]),
        Field::new("text", vec![FieldRule::text("span.fade")]),
        Field::new("headline_html", vec![FieldRule::html("span.fade")]),
        Field::new("payload", vec![FieldRule::text("div.payload")]),
        Field::new("payload_html", vec![FieldRule::html("div.payload")]),
        Field::new("created_title", vec![FieldRule::attr("span.snow", "title")]),
        Field::new("created_text", vec![FieldRule::text("span.snow")]),
        Field::new("topic_href", vec![FieldRule::attr(r#"a[href*="/t/"]"#, "href")]),
    ],
});

static TOPIC_LINK: LazyLock<Regex> = LazyLock::new(|| regex(r"/t/(\d+)(?:[^#]*#reply(\d+))?"));
static MEMBER_LINK: LazyLock<Regex> = LazyLock::new(|| regex(r"/member/([^/?#]+)"));

/// Where a link inside a notification points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Topic {
        topic_id: TopicId,
        reply_floor: Option<u32>,
    },
    Member {
        username: String,
    },
}

/// Classifies a notification href. Absolute and root-relative forms are
/// both accepted; anything else is `None`.
#[must_use]
pub fn parse_notification_link(href: &str) -> Option<LinkTarget> {
    if let Some(caps) = TOPIC_LINK.captures(href) {
        let topic_id = caps.get(1)?.as_str().parse().ok().map(TopicId)?;
        let reply_floor = caps.get(2).and_then(|m| m.as_str().parse().ok());
        return Some(LinkTarget::Topic {
            topic_id,
            reply_floor,
        });
    }
    let caps = MEMBER_LINK.captures(href)?;
    Some(LinkTarget::Member {
        username: caps.get(1)?.as_str().to_string(),
    })
}

/// Extracts one page of notifications.
#[must_use]
pub fn parse_notification_list(html: &str, ctx: &ExtractContext) -> PageResult<Notification> {
    let document = Html::parse_document(html);
    let items = TABLE.extract(&document, |id, fields| build(id, fields, ctx));
    PageResult::new(items, infer_total_pages(&document))
}

fn build(id: u64, fields: &Fields, ctx: &ExtractContext) -> ParseOutcome<Notification> {
    let Some(username) = fields.opt("username") else {
        return ParseOutcome::skip(Some(id), "no sender");
    };

    let (topic_id, reply_floor) = match fields.opt("topic_href").and_then(parse_notification_link) {
        Some(LinkTarget::Topic {
            topic_id,
            reply_floor,
        }) => (Some(topic_id), reply_floor),
        _ => (None, None),
    };

    ParseOutcome::Parsed(Notification {
        id: NotificationId(id),
        member_id: 0,
        for_member_id: 0,
        text: fields.get("text").to_string(),
        payload: fields.get("payload").to_string(),
        payload_rendered: fields
            .opt("payload_html")
            .unwrap_or_else(|| fields.get("headline_html"))
            .to_string(),
        created: resolve_timestamp(
            fields.opt("created_title"),
            fields.opt("created_text"),
            ctx.now,
            ctx.offset,
        ),
        member: ctx.member(username, fields.get("avatar")),
        topic_id,
        reply_floor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::offset;

    const NOW: i64 = 1_735_000_000;

    fn ctx() -> ExtractContext {
        ExtractContext::new("https://www.v2ex.com".parse().unwrap(), offset!(+8)).with_now(NOW)
    }

    const FEED: &str = r##"<html><body><div id="Main"><div class="box">
        <div class="cell" id="n_20001">
          <table cellpadding="0" cellspacing="0" border="0" width="100%"><tr>
          <td width="32" align="left" valign="top"><a href="/member/bob"><img src="//cdn.v2ex.com/avatar/b/2_normal.png?m=1" class="avatar" border="0" align="default" /></a></td>
          <td valign="middle">
            <span class="fade"><a href="/member/bob"><strong>bob</strong></a> 在回复 <a href="/t/1085817#reply12" class="topic-link">Rust 还是 Go？</a> 时提到了你</span> &nbsp;<span class="snow">3 天前</span>
            <a href="#;" class="node">删除</a>
            <div class="sep5"></div>
            <div class="payload">@alice 同意</div>
          </td></tr></table>
        </div>
        <div class="cell" id="n_20002">
          <table><tr>
          <td><a href="/member/carol"><img src="//cdn.v2ex.com/avatar/c/3_normal.png" class="avatar" /></a></td>
          <td><span class="fade"><a href="/member/carol"><strong>carol</strong></a> 感谢了你发布的主题 › <a href="https://www.v2ex.com/t/77">旧帖</a></span> &nbsp;<span class="snow">刚刚</span></td>
          </tr></table>
        </div>
        <div class="cell" id="n_20003"><span class="fade">系统通知</span></div>
        <div class="cell"><input type="number" class="page_input" max="3"></div>
        </div></div></body></html>"##;

    #[test]
    fn feed_is_extracted() {
        let page = parse_notification_list(FEED, &ctx());
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 2);

        let first = &page.items[0];
        assert_eq!(first.id, NotificationId(20001));
        assert_eq!(first.member.username, "bob");
        assert_eq!(first.member.avatar, "https://cdn.v2ex.com/avatar/b/2_normal.png?m=1");
        assert_eq!(first.text, "bob 在回复 Rust 还是 Go？ 时提到了你");
        assert_eq!(first.payload, "@alice 同意");
        assert_eq!(first.payload_rendered, "@alice 同意");
        assert_eq!(first.created, NOW - 3 * 86_400);
        assert_eq!(first.topic_id, Some(TopicId(1085817)));
        assert_eq!(first.reply_floor, Some(12));

        let second = &page.items[1];
        assert_eq!(second.topic_id, Some(TopicId(77)));
        assert_eq!(second.reply_floor, None);
        assert_eq!(second.created, NOW);
        assert!(second.payload.is_empty());
        assert!(second.payload_rendered.contains(r#"<a href="https://www.v2ex.com/t/77">"#));
    }

    #[test]
    fn links_are_classified() {
        assert_eq!(
            parse_notification_link("/t/1085817#reply12"),
            Some(LinkTarget::Topic {
                topic_id: TopicId(1085817),
                reply_floor: Some(12)
            })
        );
        assert_eq!(
            parse_notification_link("https://www.v2ex.com/t/5?p=2#reply140"),
            Some(LinkTarget::Topic {
                topic_id: TopicId(5),
                reply_floor: Some(140)
            })
        );
        assert_eq!(
            parse_notification_link("https://www.v2ex.com/member/alice"),
            Some(LinkTarget::Member {
                username: "alice".into()
            })
        );
        assert_eq!(parse_notification_link("/go/python"), None);
        assert_eq!(parse_notification_link("#;"), None);
    }

    #[test]
    fn signed_out_page_has_no_notifications() {
        let page = parse_notification_list(
            r#"<div class="box"><div class="cell">你要查看的页面需要先登录</div></div>"#,
            &ctx(),
        );
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 1);
    }
}
