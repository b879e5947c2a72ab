//! Replies on a topic page (`/t/<id>?p=<n>`).

use std::sync::LazyLock;

use scraper::Html;

use super::pagination::infer_total_pages;
use super::timestamp::resolve_timestamp;
use super::{ExtractContext, Field, FieldRule, Fields, ParseOutcome, RecordTable, selector_of};
use crate::types::{PageResult, Reply, ReplyId, TopicId};

static TABLE: LazyLock<RecordTable> = LazyLock::new(|| RecordTable {
    kind: "reply",
    anchor: selector_of(r#"div.cell[id^="r_"]"#),
    id: vec![
        FieldRule::own_attr("id").capture(r"^r_(\d+)$"),
        FieldRule::attr("div.thank_area", "id").capture(r"thank_area_(\d+)"),
    ],
    fields: vec![
        Field::new(
            "username",
            vec![
                FieldRule::text("strong a.dark"),
                FieldRule::text(r#"strong a[href*="/member/"]"#),
                FieldRule::attr(r#"a[href*="/member/"]"#, "href")
                    .capture(r"/member/([^/?#]+)"),
            ],
        ),
        Field::new("avatar", vec![FieldRule::attr("img.avatar", "src")]),
        Field::new(
            "content_html",
            vec![
                FieldRule::html("div.reply_content"),
                FieldRule::html(".reply_content"),
            ],
        ),
        Field::new("content_text", vec![FieldRule::text("div.reply_content")]),
        Field::new("created_title", vec![FieldRule::attr("span.ago", "title")]),
        Field::new("created_text", vec![FieldRule::text("span.ago")]),
        Field::new(
            "thanks",
            vec![
                FieldRule::text("span.small.fade").capture(r"(\d+)"),
                FieldRule::text("span.fade").capture(r"♥\s*(\d+)"),
            ],
        ),
        Field::new(
            "thanked",
            vec![FieldRule::exists("div.thank_area.thanked")],
        ),
        Field::new("floor", vec![FieldRule::text("span.no").capture(r"(\d+)")]),
    ],
});

/// Extracts one page of replies.
#[must_use]
pub fn parse_reply_list(html: &str, ctx: &ExtractContext, topic_id: TopicId) -> PageResult<Reply> {
    let document = Html::parse_document(html);
    let items = TABLE.extract(&document, |id, fields| build(id, fields, ctx, topic_id));
    PageResult::new(items, infer_total_pages(&document))
}

fn build(id: u64, fields: &Fields, ctx: &ExtractContext, topic_id: TopicId) -> ParseOutcome<Reply> {
    let Some(username) = fields.opt("username") else {
        return ParseOutcome::skip(Some(id), "no username");
    };

    ParseOutcome::Parsed(Reply {
        id: ReplyId(id),
        content: fields.get("content_text").to_string(),
        content_rendered: fields.get("content_html").to_string(),
        member: ctx.member(username, fields.get("avatar")),
        created: resolve_timestamp(
            fields.opt("created_title"),
            fields.opt("created_text"),
            ctx.now,
            ctx.offset,
        ),
        topic_id,
        thanked: fields.has("thanked"),
        thanks: fields.number("thanks").unwrap_or(0),
        floor: fields.number("floor").unwrap_or(0),
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

    fn reply_block(id: u64, username: Option<&str>, floor: u32, extra: &str) -> String {
        let author = username.map_or_else(String::new, |u| {
            format!(r#"<strong><a href="/member/{u}" class="dark">{u}</a></strong>"#)
        });
        format!(
            r##"<div id="r_{id}" class="cell">
            <table cellpadding="0" cellspacing="0" border="0" width="100%"><tr>
            <td width="48" valign="top" align="center"><img src="//cdn.v2ex.com/avatar/x/{id}_normal.png?m=1" class="avatar" border="0" align="default" /></td>
            <td width="10" valign="top"></td>
            <td width="auto" valign="top" align="left">
              <div class="fr"><div class="thank_area{extra}" id="thank_area_{id}"><a href="#;" class="thank">感谢回复者</a></div>
              &nbsp; <span class="no">{floor}</span></div>
              <div class="sep3"></div>
              {author} &nbsp; &nbsp;<span class="ago" title="2024-12-24 19:24:23 +08:00">3 天前</span>
              &nbsp; <span class="small fade"><img src="/static/img/heart_neue_red.png" width="14" alt="❤️" /> 2</span>
              <div class="sep5"></div>
              <div class="reply_content">reply <b>{floor}</b></div>
            </td></tr></table></div>"##
        )
    }

    fn page(blocks: &[String], pager: &str) -> String {
        format!(
            r#"<html><body><div id="Main"><div class="box">{}{pager}</div></div></body></html>"#,
            blocks.join("\n")
        )
    }

    #[test]
    fn malformed_block_is_dropped_not_erred() {
        let html = page(
            &[
                reply_block(101, Some("alice"), 1, ""),
                reply_block(102, Some("bob"), 2, ""),
                reply_block(103, None, 3, ""),
                reply_block(104, Some("carol"), 4, ""),
            ],
            "",
        );
        let result = parse_reply_list(&html, &ctx(), TopicId(1085817));
        assert_eq!(result.items.len(), 3);
        let ids: Vec<_> = result.items.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![101, 102, 104]);
        assert_eq!(result.total_pages, 1);
    }

    #[test]
    fn fields_are_extracted() {
        let html = page(&[reply_block(200, Some("alice"), 7, " thanked")], "");
        let reply = &parse_reply_list(&html, &ctx(), TopicId(9)).items[0];

        assert_eq!(reply.member.username, "alice");
        assert_eq!(
            reply.member.avatar,
            "https://cdn.v2ex.com/avatar/x/200_normal.png?m=1"
        );
        assert_eq!(reply.member.avatar_large, "https://cdn.v2ex.com/avatar/x/200_large.png?m=1");
        assert_eq!(reply.content, "reply 7");
        assert_eq!(reply.content_rendered, "reply <b>7</b>");
        assert_eq!(
            reply.created,
            datetime!(2024-12-24 19:24:23 +08:00).unix_timestamp()
        );
        assert_eq!(reply.topic_id, TopicId(9));
        assert_eq!(reply.floor, 7);
        assert_eq!(reply.thanks, 2);
        assert!(reply.thanked);
    }

    #[test]
    fn missing_title_falls_back_to_relative_time() {
        let block = reply_block(300, Some("alice"), 1, "")
            .replace(r#" title="2024-12-24 19:24:23 +08:00""#, "");
        let reply = &parse_reply_list(&page(&[block], ""), &ctx(), TopicId(1)).items[0];
        assert_eq!(reply.created, NOW - 3 * 86_400);
        assert!(!reply.thanked);
    }

    #[test]
    fn pagination_is_reported() {
        let pager = r#"<div class="cell"><a href="?p=1" class="page_normal">1</a>
            <span class="page_current">2</span>
            <input type="number" class="page_input" value="2" min="1" max="4"></div>"#;
        let html = page(&[reply_block(1, Some("alice"), 101, "")], pager);
        assert_eq!(parse_reply_list(&html, &ctx(), TopicId(1)).total_pages, 4);
    }

    #[test]
    fn unrelated_markup_yields_empty_page() {
        let result = parse_reply_list("<html><body>502 Bad Gateway</body></html>", &ctx(), TopicId(1));
        assert!(result.items.is_empty());
        assert_eq!(result.total_pages, 1);
    }
}
