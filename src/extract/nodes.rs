//! Node page header: display title, topic count, avatar and intro.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::{ExtractContext, avatar_variants, collapse_whitespace, regex, selector_of};
use crate::types::{Node, NodeName};

static TITLE_CANDIDATES: LazyLock<Selector> = LazyLock::new(|| {
    selector_of("div.node_header div.node_info, div.header div.fr + a + span, div.header, title")
});
static AVATAR: LazyLock<Selector> =
    LazyLock::new(|| selector_of("div.node_header div.node_avatar img, div.header img.node_avatar"));
static INTRO: LazyLock<Selector> =
    LazyLock::new(|| selector_of("div.node_header div.intro, div.header span.f12, div.header div.intro"));
static TOPIC_COUNT: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?:主题总数|topics?)\s*[:：]?\s*(\d[\d,]*)"));

/// Builds the [`Node`] a listing belongs to.
///
/// Every field is best-effort; `name` and `url` are always set.
#[must_use]
pub fn parse_node_header(html: &str, ctx: &ExtractContext, name: &NodeName) -> Node {
    let document = Html::parse_document(html);
    node_header(&document, ctx, name)
}

pub(crate) fn node_header(document: &Html, ctx: &ExtractContext, name: &NodeName) -> Node {
    let mut node = Node {
        name: name.as_str().to_string(),
        url: ctx.absolute_url(&format!("/go/{}", name.as_str())),
        title: name.as_str().to_string(),
        ..Node::default()
    };

    if let Some(title) = document
        .select(&TITLE_CANDIDATES)
        .find_map(|el| title_segment(&el.text().collect::<String>()))
    {
        node.title = title;
    }

    let page_text = collapse_whitespace(&document.root_element().text().collect::<String>());
    if let Some(count) = TOPIC_COUNT
        .captures(&page_text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
    {
        node.topics = count;
    }

    if let Some(src) = document
        .select(&AVATAR)
        .find_map(|el| el.value().attr("src"))
    {
        let avatar = ctx.absolute_url(src);
        let (mini, normal, large) = avatar_variants(&avatar);
        node.avatar = avatar;
        node.avatar_mini = mini;
        node.avatar_normal = normal;
        node.avatar_large = large;
    }

    if let Some(intro) = document
        .select(&INTRO)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|s| !s.is_empty())
    {
        node.header = intro;
    }

    node
}

/// Last `›`-separated segment, without the site suffix (`V2EX › Python`).
fn title_segment(raw: &str) -> Option<String> {
    let text = collapse_whitespace(raw);
    let segment = text.rsplit('›').next()?.trim();
    let segment = TOPIC_COUNT
        .find(segment)
        .map_or(segment, |m| segment[..m.start()].trim());
    (!segment.is_empty() && !segment.eq_ignore_ascii_case("V2EX")).then(|| segment.to_string())
}
