//! Topic listings on node pages (`/go/<name>`).

use std::sync::LazyLock;

use scraper::Html;
use serde::Serialize;

use super::nodes::node_header;
use super::pagination::infer_total_pages;
use super::timestamp::resolve_timestamp;
use super::{ExtractContext, Field, FieldRule, Fields, ParseOutcome, RecordTable, selector_of};
use crate::types::{Node, NodeName, PageResult, Topic, TopicId};

static TABLE: LazyLock<RecordTable> = LazyLock::new(|| RecordTable {
    kind: "topic",
    anchor: selector_of(r#"div.cell.item, div.cell[class*="t_"]"#),
    id: vec![
        FieldRule::own_attr("class").capture(r"\bt_(\d+)\b"),
        FieldRule::attr("a.topic-link", "href").capture(r"/t/(\d+)"),
        FieldRule::attr("span.item_title a", "href").capture(r"/t/(\d+)"),
    ],
    fields: vec![
        Field::new(
            "title",
            vec![
                FieldRule::text("a.topic-link"),
                FieldRule::text("span.item_title a"),
            ],
        ),
        Field::new(
            "username",
            vec![
                FieldRule::text("span.topic_info strong a"),
                FieldRule::attr("img.avatar", "alt"),
                FieldRule::attr(r#"a[href*="/member/"]"#, "href").capture(r"/member/([^/?#]+)"),
            ],
        ),
        Field::new("avatar", vec![FieldRule::attr("img.avatar", "src")]),
        Field::new(
            "created_title",
            vec![FieldRule::attr("span.topic_info span[title]", "title")],
        ),
        Field::new(
            "created_text",
            vec![
                FieldRule::text("span.topic_info span[title]"),
                FieldRule::text("span.topic_info").capture(r"•\s*([^•]*前)"),
            ],
        ),
        Field::new(
            "last_reply_by",
            vec![
                FieldRule::text("span.topic_info strong:nth-of-type(2) a"),
                FieldRule::text("span.topic_info").capture(r"最后回复来自\s*(\S+)"),
            ],
        ),
        Field::new(
            "replies",
            vec![
                FieldRule::text("a.count_livid"),
                FieldRule::text("a.count_orange"),
            ],
        ),
        Field::new(
            "node_name",
            vec![FieldRule::attr("a.node", "href").capture(r"/go/([^/?#]+)")],
        ),
        Field::new("node_title", vec![FieldRule::text("a.node")]),
    ],
});

/// A node page: the node header plus one page of its topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePage {
    pub node: Node,
    #[serde(flatten)]
    pub topics: PageResult<Topic>,
}

/// Extracts a node page. Topics without their own node link inherit the
/// page's node.
#[must_use]
pub fn parse_node_page(html: &str, ctx: &ExtractContext, name: &NodeName) -> NodePage {
    let document = Html::parse_document(html);
    let node = node_header(&document, ctx, name);
    let items = TABLE.extract(&document, |id, fields| build(id, fields, ctx, &node));
    let topics = PageResult::new(items, infer_total_pages(&document));
    NodePage { node, topics }
}

fn build(id: u64, fields: &Fields, ctx: &ExtractContext, page_node: &Node) -> ParseOutcome<Topic> {
    let Some(title) = fields.opt("title") else {
        return ParseOutcome::skip(Some(id), "no title");
    };
    let Some(username) = fields.opt("username") else {
        return ParseOutcome::skip(Some(id), "no author");
    };

    let node = match fields.opt("node_name") {
        Some(name) => Node {
            name: name.to_string(),
            url: ctx.absolute_url(&format!("/go/{name}")),
            title: fields.opt("node_title").unwrap_or(name).to_string(),
            ..Node::default()
        },
        None => page_node.clone(),
    };

    let touched = resolve_timestamp(
        fields.opt("created_title"),
        fields.opt("created_text"),
        ctx.now,
        ctx.offset,
    );

    ParseOutcome::Parsed(Topic {
        id: TopicId(id),
        title: title.to_string(),
        url: ctx.absolute_url(&format!("/t/{id}")),
        content: String::new(),
        content_rendered: String::new(),
        syntax: 0,
        replies: fields.number("replies").unwrap_or(0),
        member: ctx.member(username, fields.get("avatar")),
        node,
        created: touched,
        last_modified: touched,
        last_touched: touched,
        last_reply_by: fields.get("last_reply_by").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    const NOW: i64 = 1_735_000_000;

    fn ctx() -> ExtractContext {
        ExtractContext::new("https://www.v2ex.com".parse().unwrap(), offset!(+8)).with_now(NOW)
    }

    fn node_cell(id: u64, title: &str, author: &str, replies: Option<u32>, last: Option<&str>) -> String {
        let count = replies.map_or_else(String::new, |n| {
            format!(r#"<a href="/t/{id}#reply{n}" class="count_livid">{n}</a>"#)
        });
        let last = last.map_or_else(String::new, |u| {
            format!(r#" &nbsp;•&nbsp; 最后回复来自 <strong><a href="/member/{u}">{u}</a></strong>"#)
        });
        format!(
            r#"<div class="cell from_{author} t_{id}">
            <table cellpadding="0" cellspacing="0" border="0" width="100%"><tr>
            <td width="48" valign="top" align="center"><a href="/member/{author}"><img src="//cdn.v2ex.com/avatar/a/{id}_normal.png?m=1" class="avatar" border="0" align="default" alt="{author}" /></a></td>
            <td width="10"></td>
            <td width="auto" valign="middle">
              <span class="item_title"><a href="/t/{id}#reply3" class="topic-link" id="topic-link-{id}">{title}</a></span>
              <div class="sep5"></div>
              <span class="topic_info"><strong><a href="/member/{author}">{author}</a></strong> &nbsp;•&nbsp; <span title="2024-12-24 19:24:23 +08:00">2 小时 5 分钟前</span>{last}</span>
            </td>
            <td width="70" align="right" valign="middle">{count}</td>
            </tr></table></div>"#
        )
    }

    fn node_page(cells: &[String]) -> String {
        format!(
            r#"<html><head><title>V2EX › Python</title></head><body><div id="Main"><div class="box">
            <div class="node_header"><div class="node_info"><div class="fr f12"><span>主题总数</span> <strong>42</strong></div>
            <a href="/">V2EX</a> <span class="chevron">&nbsp;›&nbsp;</span> Python</div></div>
            <div id="TopicsNode">{}</div>
            <div class="cell"><a href="?p=1" class="page_current">1</a><a href="?p=2" class="page_normal">2</a></div>
            </div></div></body></html>"#,
            cells.join("\n")
        )
    }

    #[test]
    fn node_page_topics_inherit_node() {
        let html = node_page(&[
            node_cell(1085817, "Rust 还是 Go？", "alice", Some(12), Some("bob")),
            node_cell(1085818, "求推荐 ORM", "carol", None, None),
        ]);
        let page = parse_node_page(&html, &ctx(), &NodeName::from("python".to_string()));

        assert_eq!(page.node.title, "Python");
        assert_eq!(page.node.topics, 42);
        assert_eq!(page.topics.total_pages, 2);
        assert_eq!(page.topics.items.len(), 2);

        let first = &page.topics.items[0];
        assert_eq!(first.id, TopicId(1085817));
        assert_eq!(first.title, "Rust 还是 Go？");
        assert_eq!(first.url, "https://www.v2ex.com/t/1085817");
        assert_eq!(first.member.username, "alice");
        assert_eq!(first.member.avatar_large, "https://cdn.v2ex.com/avatar/a/1085817_large.png?m=1");
        assert_eq!(first.replies, 12);
        assert_eq!(first.last_reply_by, "bob");
        assert_eq!(first.node.name, "python");
        assert_eq!(first.created, datetime!(2024-12-24 19:24:23 +08:00).unix_timestamp());
        assert_eq!(first.last_touched, first.created);

        let second = &page.topics.items[1];
        assert_eq!(second.replies, 0);
        assert!(second.last_reply_by.is_empty());
    }

    #[test]
    fn untitled_cells_are_skipped() {
        let broken = node_cell(5, "", "alice", None, None);
        let html = node_page(&[broken, node_cell(6, "ok", "bob", None, None)]);
        let page = parse_node_page(&html, &ctx(), &NodeName::from("python".to_string()));
        let ids: Vec<_> = page.topics.items.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![TopicId(6)]);
    }

    #[test]
    fn own_node_link_overrides_page_node() {
        let html = r#"<div class="box"><div class="cell item" style="">
            <table><tr>
            <td><a href="/member/dave"><img src="https://cdn.v2ex.com/avatar/d_normal.png" class="avatar" alt="dave"></a></td>
            <td>
              <span class="item_title"><a href="/t/99#reply0" class="topic-link">标题</a></span>
              <span class="topic_info"><div class="votes"></div><a class="node" href="/go/share">分享发现</a> &nbsp;•&nbsp; <strong><a href="/member/dave">dave</a></strong> &nbsp;•&nbsp; <span>5 分钟前</span></span>
            </td></tr></table></div></div>"#;
        let page = parse_node_page(html, &ctx(), &NodeName::from("python".to_string()));

        let topic = &page.topics.items[0];
        assert_eq!(topic.id, TopicId(99));
        assert_eq!(topic.node.name, "share");
        assert_eq!(topic.node.title, "分享发现");
        assert_eq!(topic.node.url, "https://www.v2ex.com/go/share");
        assert_eq!(topic.member.username, "dave");
        assert_eq!(topic.created, NOW - 300);
    }

    #[test]
    fn node_page_serializes_flat() {
        let page = parse_node_page(&node_page(&[]), &ctx(), &NodeName::from("python".to_string()));
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalPages"], 2);
        assert!(json["items"].as_array().unwrap().is_empty());
        assert_eq!(json["node"]["name"], "python");
    }
}
