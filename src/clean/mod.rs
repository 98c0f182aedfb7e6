//! Merging and cleaning of crawled article records.
//!
//! The crawler leaves one partial file per article. [`merge`] folds them into
//! the canonical dataset, normalizing author lists and stray escapes and
//! deduplicating by DOI (falling back to the title).

mod merger;
mod normalize;

pub use merger::{MergeError, MergeReport, dedup_records, merge};
pub use normalize::{dedup_key, normalize_authors, normalize_record, strip_escapes};
