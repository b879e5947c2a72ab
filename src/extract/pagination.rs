//! Page-count inference.
//!
//! Two signals exist: the page-jump input's `max` attribute, and the page
//! numbers visible in the pager links and current-page marker. The former
//! wins; the latter only ever shows a window of pages, so the result is a
//! floor on the true count.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{collapse_whitespace, selector_of};

static MAX_INPUT: LazyLock<Selector> =
    LazyLock::new(|| selector_of(r#"input.page_input[max], input[type="number"][max]"#));
static PAGE_MARKERS: LazyLock<Selector> =
    LazyLock::new(|| selector_of("a.page_normal, a.page_current, span.page_current"));

#[must_use]
pub fn infer_total_pages(document: &Html) -> u32 {
    if let Some(max) = document
        .select(&MAX_INPUT)
        .filter_map(|el| el.value().attr("max")?.trim().parse::<u32>().ok())
        .max()
    {
        return max.max(1);
    }

    document
        .select(&PAGE_MARKERS)
        .filter_map(|el| {
            collapse_whitespace(&el.text().collect::<String>())
                .parse::<u32>()
                .ok()
        })
        .max()
        .unwrap_or(1)
        .max(1)
}
