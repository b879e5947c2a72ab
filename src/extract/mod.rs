//! Extraction of typed records from upstream HTML.
//!
//! Every listing page is handled by the same algorithm, parameterised by a
//! [`RecordTable`]:
//!
//! 1. **Segmentation**: the table's anchor selector picks one element per
//!    candidate record; its id comes from the first id rule that yields digits.
//! 2. **Fields**: each field is an ordered chain of [`FieldRule`]s tried in
//!    turn; a field no rule satisfies is simply absent (empty by default).
//! 3. **Build**: a per-record-type function turns the field bag into a record
//!    or a [`ParseOutcome::Skipped`] with a reason.
//!
//! Upstream markup is not a contract, so a bad candidate only ever costs
//! that one record. Nothing in here returns an error.

pub mod nodes;
pub mod notifications;
pub mod pagination;
pub mod replies;
pub mod timestamp;
pub mod topics;

use std::collections::HashMap;
use std::str::FromStr;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use time::UtcOffset;
use url::Url;

use crate::types::Member;

/// Per-call parameters shared by all extractors.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    pub base_url: Url,
    /// Reference "now" in Unix seconds, for relative timestamps.
    pub now: i64,
    /// Offset applied to calendar dates and offset-less absolute times.
    pub offset: UtcOffset,
}

impl ExtractContext {
    #[must_use]
    pub fn new(base_url: Url, offset: UtcOffset) -> Self {
        Self {
            base_url,
            now: time::OffsetDateTime::now_utc().unix_timestamp(),
            offset,
        }
    }

    #[must_use]
    pub fn with_now(mut self, now: i64) -> Self {
        self.now = now;
        self
    }

    /// Rewrites protocol-relative (`//host/path`) URLs to `https:` and
    /// resolves root-relative paths against the upstream base.
    #[must_use]
    pub fn absolute_url(&self, raw: &str) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return String::new();
        }
        if let Some(rest) = raw.strip_prefix("//") {
            return format!("https://{rest}");
        }
        if raw.starts_with('/') {
            return self
                .base_url
                .join(raw)
                .map_or_else(|_| raw.to_string(), String::from);
        }
        raw.to_string()
    }

    /// A member known only by name and avatar, as listings render them.
    #[must_use]
    pub fn member(&self, username: &str, avatar: &str) -> Member {
        let avatar = self.absolute_url(avatar);
        let (mini, normal, large) = avatar_variants(&avatar);
        Member {
            username: username.to_string(),
            url: self
                .base_url
                .join(&format!("/member/{username}"))
                .map(String::from)
                .unwrap_or_default(),
            avatar: avatar.clone(),
            avatar_mini: mini,
            avatar_normal: normal,
            avatar_large: large,
            ..Member::default()
        }
    }
}

/// Result of turning one candidate element into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    Parsed(T),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipReason {
    pub id: Option<u64>,
    pub reason: &'static str,
}

impl<T> ParseOutcome<T> {
    pub fn skip(id: Option<u64>, reason: &'static str) -> Self {
        Self::Skipped(SkipReason { id, reason })
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Source {
    /// Whitespace-collapsed text content.
    Text,
    /// Inner HTML, trimmed.
    Html,
    Attr(&'static str),
    /// `"1"` when the selector matches anything.
    Exists,
}

/// One way of locating a field inside a record element.
#[derive(Debug, Clone)]
pub(crate) struct FieldRule {
    selector: Option<Selector>,
    source: Source,
    pattern: Option<Regex>,
}

impl FieldRule {
    pub(crate) fn text(selector: &str) -> Self {
        Self::new(Some(selector), Source::Text)
    }

    pub(crate) fn html(selector: &str) -> Self {
        Self::new(Some(selector), Source::Html)
    }

    pub(crate) fn attr(selector: &str, name: &'static str) -> Self {
        Self::new(Some(selector), Source::Attr(name))
    }

    pub(crate) fn exists(selector: &str) -> Self {
        Self::new(Some(selector), Source::Exists)
    }

    /// Attribute of the record element itself.
    pub(crate) fn own_attr(name: &'static str) -> Self {
        Self::new(None, Source::Attr(name))
    }

    /// Narrows the extracted value to capture group 1 of `pattern`.
    pub(crate) fn capture(mut self, pattern: &str) -> Self {
        self.pattern = Some(regex(pattern));
        self
    }

    fn new(selector: Option<&str>, source: Source) -> Self {
        Self {
            selector: selector.map(selector_of),
            source,
            pattern: None,
        }
    }

    /// First non-empty value among the elements the selector matches.
    pub(crate) fn apply(&self, element: ElementRef<'_>) -> Option<String> {
        let Some(selector) = &self.selector else {
            return self.read(element);
        };
        if let Source::Exists = self.source {
            return element.select(selector).next().map(|_| "1".to_string());
        }
        element.select(selector).find_map(|el| self.read(el))
    }

    fn read(&self, element: ElementRef<'_>) -> Option<String> {
        let raw = match self.source {
            Source::Text => collapse_whitespace(&element.text().collect::<String>()),
            Source::Html => element.inner_html().trim().to_string(),
            Source::Attr(name) => element.value().attr(name)?.trim().to_string(),
            Source::Exists => "1".to_string(),
        };
        let value = match &self.pattern {
            Some(re) => re.captures(&raw)?.get(1)?.as_str().to_string(),
            None => raw,
        };
        (!value.is_empty()).then_some(value)
    }
}

/// A named field and its fallback chain, primary rule first.
#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub(crate) name: &'static str,
    pub(crate) chain: Vec<FieldRule>,
}

impl Field {
    pub(crate) fn new(name: &'static str, chain: Vec<FieldRule>) -> Self {
        Self { name, chain }
    }

    fn resolve(&self, element: ElementRef<'_>) -> Option<String> {
        self.chain.iter().find_map(|rule| rule.apply(element))
    }
}

/// Declarative description of one record type on one page shape.
#[derive(Debug, Clone)]
pub(crate) struct RecordTable {
    pub(crate) kind: &'static str,
    pub(crate) anchor: Selector,
    pub(crate) id: Vec<FieldRule>,
    pub(crate) fields: Vec<Field>,
}

/// Values pulled from one record element.
#[derive(Debug, Default)]
pub(crate) struct Fields {
    values: HashMap<&'static str, String>,
}

impl Fields {
    /// Field value, or `""` when absent.
    pub(crate) fn get(&self, name: &str) -> &str {
        self.values.get(name).map_or("", String::as_str)
    }

    pub(crate) fn opt(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub(crate) fn number<T: FromStr>(&self, name: &str) -> Option<T> {
        self.opt(name)?.parse().ok()
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl RecordTable {
    /// Segments `document` and builds every candidate, dropping skips.
    pub(crate) fn extract<T>(
        &self,
        document: &Html,
        build: impl Fn(u64, &Fields) -> ParseOutcome<T>,
    ) -> Vec<T> {
        let mut records = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for element in document.select(&self.anchor) {
            let outcome = match self.id.iter().find_map(|rule| rule.apply(element)) {
                None => ParseOutcome::skip(None, "no record id"),
                Some(raw) => match raw.parse::<u64>() {
                    Err(_) => ParseOutcome::skip(None, "non-numeric record id"),
                    Ok(id) if !seen.insert(id) => ParseOutcome::skip(Some(id), "duplicate id"),
                    Ok(id) => build(id, &self.fields_of(element)),
                },
            };
            match outcome {
                ParseOutcome::Parsed(record) => records.push(record),
                ParseOutcome::Skipped(skip) => {
                    tracing::debug!(
                        kind = self.kind,
                        id = ?skip.id,
                        reason = skip.reason,
                        "Skipped record"
                    );
                }
            }
        }
        records
    }

    fn fields_of(&self, element: ElementRef<'_>) -> Fields {
        let values = self
            .fields
            .iter()
            .filter_map(|field| field.resolve(element).map(|v| (field.name, v)))
            .collect();
        Fields { values }
    }
}

/// Derives mini/normal/large variants from an avatar URL carrying a size
/// marker; otherwise all three are the URL itself.
#[must_use]
pub fn avatar_variants(url: &str) -> (String, String, String) {
    for marker in ["_mini.", "_normal.", "_large."] {
        if url.contains(marker) {
            return (
                url.replacen(marker, "_mini.", 1),
                url.replacen(marker, "_normal.", 1),
                url.replacen(marker, "_large.", 1),
            );
        }
    }
    (url.to_string(), url.to_string(), url.to_string())
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn selector_of(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid CSS")
}

pub(crate) fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern is a valid regex")
}
