//! Volume discovery and resumable article crawling.
//!
//! - [`discover_volumes`] turns an archive page into a set of [`VolumeLink`]s.
//! - [`ArticleCrawler`] paginates each volume, fetches every article page,
//!   writes one partial file per article and records progress in the
//!   [`ProcessedLedger`].
//!
//! [`VolumeLink`]: crate::article::VolumeLink

mod crawler;
mod discovery;
mod extract;
mod layout;
mod ledger;

pub use crawler::{
    ArticleCrawler, CrawlError, CrawlHandle, CrawlStats, CrawlSummary, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_PAGES, MAX_CONCURRENCY, MIN_CONCURRENCY,
};
pub use discovery::{discover_links, discover_volumes};
pub use extract::{ListingPage, parse_article, parse_listing, resolve_link};
pub use layout::{CompiledLayout, SiteLayout};
pub use ledger::{LedgerError, Outcome, ProcessedLedger};
