//! HTML extraction for archive, listing and article pages.
//!
//! All functions here are synchronous: `scraper::Html` is not `Send`, so a
//! parsed document must never live across an `.await`.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use super::layout::CompiledLayout;
use crate::article::{ArticleRecord, NOT_FOUND, VolumeLink, is_missing};
use crate::clean::normalize_authors;

#[allow(clippy::expect_used)]
static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("year regex is valid")); // Static pattern, safe to panic

/// Article links and paging state of one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Absolute article URLs in page order, deduplicated.
    pub article_links: Vec<String>,
    /// Whether the next-page control is present.
    pub has_next: bool,
}

/// Volume links on an archive page, resolved against `page_url`.
#[must_use]
pub fn extract_volume_links(
    html: &str,
    page_url: &str,
    layout: &CompiledLayout,
) -> BTreeSet<VolumeLink> {
    let Ok(base) = Url::parse(page_url) else {
        return BTreeSet::new();
    };
    let document = Html::parse_document(html);
    document
        .select(&layout.volume_links)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter_map(|href| resolve_link(&base, href))
        .map(VolumeLink::new)
        .collect()
}

/// Article links and next-page presence on a volume listing page.
#[must_use]
pub fn parse_listing(html: &str, page_url: &str, layout: &CompiledLayout) -> ListingPage {
    let Ok(base) = Url::parse(page_url) else {
        return ListingPage::default();
    };
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let article_links = document
        .select(&layout.article_links)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| layout.is_article_href(href))
        .filter_map(|href| resolve_link(&base, href))
        .filter(|link| seen.insert(link.clone()))
        .collect();

    ListingPage {
        article_links,
        has_next: document.select(&layout.next_page).next().is_some(),
    }
}

/// Extracts an article record from a detail page.
///
/// Returns `None` when the page exposes none of title, abstract and DOI,
/// which means the markup did not match at all.
#[must_use]
pub fn parse_article(html: &str, url: &str, layout: &CompiledLayout) -> Option<ArticleRecord> {
    let document = Html::parse_document(html);
    let source = layout.layout();

    let title = first_text(&document, &layout.title);
    let abstract_text = first_text(&document, &layout.abstract_text);
    let doi = document
        .select(&layout.doi)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty())
        .map_or_else(|| NOT_FOUND.to_string(), str::to_string);

    if is_missing(&title) && is_missing(&abstract_text) && is_missing(&doi) {
        return None;
    }

    let authors: Vec<String> = document
        .select(&layout.authors)
        .map(element_text)
        .filter(|name| !name.is_empty())
        .collect();
    let year = YEAR_PATTERN
        .captures_iter(&first_text(&document, &layout.publication_date))
        .last()
        .and_then(|caps| caps.get(1))
        .map_or_else(|| NOT_FOUND.to_string(), |m| m.as_str().to_string());

    Some(ArticleRecord {
        title,
        abstract_text,
        authors: normalize_authors(&authors.join(", ")),
        journal_conference_name: source.journal_conference_name.clone(),
        publisher: source.publisher.clone(),
        year,
        doi,
        group_name: source.group_name.clone(),
        url: Some(url.to_string()),
    })
}

/// Resolves `href` against `base`, drops the fragment and any trailing `/`.
/// Non-HTTP results are rejected.
#[must_use]
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let mut resolved = base.join(href.trim()).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    let text: String = resolved.into();
    Some(text.trim_end_matches('/').to_string())
}

fn first_text(document: &Html, selector: &scraper::Selector) -> String {
    document
        .select(selector)
        .map(element_text)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| NOT_FOUND.to_string())
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
