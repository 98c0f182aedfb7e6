//! Selectors and fixed values describing the source site's markup.

use std::time::Duration;

use scraper::Selector;
use url::Url;

use crate::fetch::{DEFAULT_PAGE_WAIT, FetchError, ReadyCondition};

/// Markup of the source site. Defaults describe IEEE Xplore listing and
/// article pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    /// Anchors on the archive page that point at volumes.
    pub volume_links: String,
    /// Element present once a volume listing page has rendered.
    pub listing_ready: String,
    /// Candidate article anchors on a listing page.
    pub article_links: String,
    /// Substring an anchor `href` must contain to be an article link.
    pub article_marker: String,
    /// Substrings that disqualify an article link.
    pub excluded_fragments: Vec<String>,
    /// Next-page control on a listing page.
    pub next_page: String,
    /// Element present once an article detail page has rendered.
    pub detail_ready: String,
    /// Title element.
    pub title: String,
    /// Abstract element.
    pub abstract_text: String,
    /// One element per author name.
    pub authors: String,
    /// Element carrying the publication date.
    pub publication_date: String,
    /// Anchor whose `href` is the DOI.
    pub doi: String,
    /// `sortType` query value for listing pages.
    pub sort_type: String,
    /// Venue name stored on every record.
    pub journal_conference_name: String,
    /// Publisher stored on every record.
    pub publisher: String,
    /// Collection group tag stored on every record.
    pub group_name: String,
}

impl Default for SiteLayout {
    fn default() -> Self {
        Self {
            volume_links: ".issue-details-past-tabs a".to_string(),
            listing_ready: ".col".to_string(),
            article_links: "a[href]".to_string(),
            article_marker: "/document/".to_string(),
            excluded_fragments: vec!["/citations".to_string()],
            next_page: "li.next-btn".to_string(),
            detail_ready: ".document-title".to_string(),
            title: "h1.document-title".to_string(),
            abstract_text: "div[xplmathjax]".to_string(),
            authors: ".authors-info a span".to_string(),
            publication_date: "div.doc-abstract-pubdate".to_string(),
            doi: "div.stats-document-abstract-doi a[href]".to_string(),
            sort_type: "vol-only-newest".to_string(),
            journal_conference_name: "IEEE Access".to_string(),
            publisher: "IEEE".to_string(),
            group_name: "OpsA".to_string(),
        }
    }
}

impl SiteLayout {
    /// Compiles every selector once, with `page_wait` as the bounded wait for
    /// listing and detail pages.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidSelector`] naming the first bad selector.
    pub fn compile(&self, page_wait: Duration) -> Result<CompiledLayout, FetchError> {
        Ok(CompiledLayout {
            volume_links: parse_selector(&self.volume_links)?,
            volume_ready: ReadyCondition::new(&self.volume_links, page_wait)?,
            listing_ready: ReadyCondition::new(&self.listing_ready, page_wait)?,
            article_links: parse_selector(&self.article_links)?,
            next_page: parse_selector(&self.next_page)?,
            detail_ready: ReadyCondition::new(&self.detail_ready, page_wait)?,
            title: parse_selector(&self.title)?,
            abstract_text: parse_selector(&self.abstract_text)?,
            authors: parse_selector(&self.authors)?,
            publication_date: parse_selector(&self.publication_date)?,
            doi: parse_selector(&self.doi)?,
            source: self.clone(),
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector).map_err(|_| FetchError::invalid_selector(selector))
}

/// A [`SiteLayout`] with parsed selectors, shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct CompiledLayout {
    pub(crate) volume_links: Selector,
    pub(crate) volume_ready: ReadyCondition,
    pub(crate) listing_ready: ReadyCondition,
    pub(crate) article_links: Selector,
    pub(crate) next_page: Selector,
    pub(crate) detail_ready: ReadyCondition,
    pub(crate) title: Selector,
    pub(crate) abstract_text: Selector,
    pub(crate) authors: Selector,
    pub(crate) publication_date: Selector,
    pub(crate) doi: Selector,
    source: SiteLayout,
}

impl CompiledLayout {
    /// Compiles the default layout with the default page wait.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidSelector`] if a default selector is rejected.
    pub fn default_layout() -> Result<Self, FetchError> {
        SiteLayout::default().compile(DEFAULT_PAGE_WAIT)
    }

    /// The layout this was compiled from.
    #[must_use]
    pub fn layout(&self) -> &SiteLayout {
        &self.source
    }

    /// Readiness condition for the archive page listing volumes.
    #[must_use]
    pub fn volume_ready(&self) -> &ReadyCondition {
        &self.volume_ready
    }

    /// Readiness condition for listing pages.
    #[must_use]
    pub fn listing_ready(&self) -> &ReadyCondition {
        &self.listing_ready
    }

    /// Readiness condition for article detail pages.
    #[must_use]
    pub fn detail_ready(&self) -> &ReadyCondition {
        &self.detail_ready
    }

    /// URL of listing page `page` (1-based) of `volume_url`.
    ///
    /// Existing `sortType`/`pageNumber` pairs are replaced; other query pairs
    /// are kept in order.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] when `volume_url` does not parse.
    pub fn listing_page_url(&self, volume_url: &str, page: u32) -> Result<String, FetchError> {
        let mut url = Url::parse(volume_url).map_err(|_| FetchError::invalid_url(volume_url))?;
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "sortType" && key != "pageNumber")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair("sortType", &self.source.sort_type)
            .append_pair("pageNumber", &page.to_string());
        Ok(url.into())
    }

    pub(crate) fn is_article_href(&self, href: &str) -> bool {
        href.contains(&self.source.article_marker)
            && !self
                .source
                .excluded_fragments
                .iter()
                .any(|fragment| href.contains(fragment.as_str()))
    }
}
