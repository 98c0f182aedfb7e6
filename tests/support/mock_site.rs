//! In-memory site serving archive, listing and article pages to the crawler.
//!
//! Pages are keyed by exact URL. A missing page, or one without the element
//! the caller waits for, fails like an unrendered browser page.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use topicmap_core::crawl::CompiledLayout;
use topicmap_core::{FetchError, FetchSession, PageFetcher, ReadyCondition};

pub const HOST: &str = "https://site.example";

#[derive(Debug, Clone)]
enum Page {
    Html(String),
    Status(u16),
    /// Answers `status` for the first `failures` fetches, then `html`.
    Flaky {
        failures: usize,
        status: u16,
        html: String,
    },
}

#[derive(Debug, Default)]
struct Inner {
    pages: HashMap<String, Page>,
    fetches: Mutex<Vec<String>>,
    sessions: Mutex<usize>,
}

/// Builder and [`PageFetcher`] over a fixed set of pages.
#[derive(Debug, Clone, Default)]
pub struct MockSite {
    inner: Arc<Inner>,
}

pub fn volume_url(number: u32) -> String {
    format!("{HOST}/xpl/tocresult.jsp?isnumber={number}")
}

pub fn article_url(number: u32) -> String {
    format!("{HOST}/document/{number}")
}

pub fn listing_url(volume: &str, page: u32) -> String {
    CompiledLayout::default_layout()
        .expect("default layout compiles")
        .listing_page_url(volume, page)
        .expect("volume URL parses")
}

pub fn listing_html(articles: &[u32], has_next: bool) -> String {
    let links: String = articles
        .iter()
        .map(|n| format!(r#"<a href="{}">Article {n}</a>"#, article_url(*n)))
        .collect();
    let next = if has_next {
        r#"<ul><li class="next-btn"><a>next</a></li></ul>"#
    } else {
        ""
    };
    format!(r#"<html><body><div class="col">{links}</div>{next}</body></html>"#)
}

pub fn article_html(title: &str, abstract_text: &str, doi: &str) -> String {
    format!(
        r#"<html><body>
          <h1 class="document-title"><span>{title}</span></h1>
          <div class="authors-info"><a href="/author/1"><span>Ada Byron</span></a></div>
          <div xplmathjax="">{abstract_text}</div>
          <div class="doc-abstract-pubdate">Date of Publication: 4 May 2024</div>
          <div class="stats-document-abstract-doi"><a href="{doi}">doi</a></div>
        </body></html>"#
    )
}

pub fn archive_html(volumes: &[u32]) -> String {
    let links: String = volumes
        .iter()
        .map(|n| format!(r#"<a href="/xpl/tocresult.jsp?isnumber={n}">Volume {n}</a>"#))
        .collect();
    format!(r#"<html><body><div class="issue-details-past-tabs">{links}</div></body></html>"#)
}

impl MockSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner_mut(&mut self) -> &mut Inner {
        Arc::get_mut(&mut self.inner).expect("site is built before it is shared")
    }

    pub fn page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.inner_mut()
            .pages
            .insert(url.into(), Page::Html(html.into()));
        self
    }

    pub fn status(mut self, url: impl Into<String>, status: u16) -> Self {
        self.inner_mut().pages.insert(url.into(), Page::Status(status));
        self
    }

    /// Serves `html` at `url` after `failures` fetches answered with a 503.
    pub fn flaky(
        mut self,
        url: impl Into<String>,
        failures: usize,
        html: impl Into<String>,
    ) -> Self {
        self.inner_mut().pages.insert(
            url.into(),
            Page::Flaky {
                failures,
                status: 503,
                html: html.into(),
            },
        );
        self
    }

    /// Listing page `page` of `volume` linking to `articles`.
    pub fn listing(self, volume: &str, page: u32, articles: &[u32], has_next: bool) -> Self {
        self.page(listing_url(volume, page), listing_html(articles, has_next))
    }

    /// Article page with a DOI derived from its number.
    pub fn article(self, number: u32, title: &str, abstract_text: &str) -> Self {
        self.page(
            article_url(number),
            article_html(
                title,
                abstract_text,
                &format!("https://doi.org/10.1109/TEST.{number}"),
            ),
        )
    }

    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.lock().expect("lock").len()
    }

    pub fn fetches_of(&self, url: &str) -> usize {
        self.inner
            .fetches
            .lock()
            .expect("lock")
            .iter()
            .filter(|fetched| fetched.as_str() == url)
            .count()
    }

    pub fn sessions_opened(&self) -> usize {
        *self.inner.sessions.lock().expect("lock")
    }
}

#[async_trait]
impl PageFetcher for MockSite {
    async fn open_session(&self) -> Result<Box<dyn FetchSession>, FetchError> {
        *self.inner.sessions.lock().expect("lock") += 1;
        Ok(Box::new(MockSession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MockSession {
    inner: Arc<Inner>,
}

#[async_trait]
impl FetchSession for MockSession {
    async fn fetch(&mut self, url: &str, ready: &ReadyCondition) -> Result<String, FetchError> {
        let earlier = {
            let mut fetches = self.inner.fetches.lock().expect("lock");
            let earlier = fetches.iter().filter(|fetched| fetched.as_str() == url).count();
            fetches.push(url.to_string());
            earlier
        };
        match self.inner.pages.get(url) {
            Some(Page::Flaky {
                failures, status, ..
            }) if earlier < *failures => Err(FetchError::http_status(url, *status)),
            Some(Page::Flaky { html, .. }) if ready.is_satisfied_by(html) => Ok(html.clone()),
            Some(Page::Flaky { .. }) => Err(FetchError::not_ready(url, ready.selector())),
            Some(Page::Html(html)) if ready.is_satisfied_by(html) => Ok(html.clone()),
            Some(Page::Html(_)) | None => Err(FetchError::not_ready(url, ready.selector())),
            Some(Page::Status(status)) => Err(FetchError::http_status(url, *status)),
        }
    }
}
