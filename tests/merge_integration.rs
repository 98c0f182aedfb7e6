//! Integration tests for merging crawled partial files into the canonical
//! dataset.

use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use topicmap_core::article::{read_json_file, write_json_atomic};
use topicmap_core::crawl::CompiledLayout;
use topicmap_core::{
    ArticleCrawler, ArticleRecord, NOT_FOUND, PageFetcher, ProcessedLedger, RetryPolicy,
    VolumeLink, merge,
};

mod support;
use support::mock_site::{MockSite, volume_url};

fn record(title: &str, doi: &str, authors: &str) -> ArticleRecord {
    serde_json::from_value(serde_json::json!({
        "title": title,
        "abstract": format!("Abstract for {title}."),
        "authors": authors,
        "doi": doi,
        "url": "https://site.example/document/1",
    }))
    .unwrap()
}

#[tokio::test]
async fn test_crawl_then_merge_builds_canonical_dataset() {
    let temp = TempDir::new().unwrap();
    let partials = temp.path().join("partial");
    let canonical = temp.path().join("articles.json");
    let volume = volume_url(1);
    let site = MockSite::new()
        .listing(&volume, 1, &[1, 2, 3], false)
        .article(1, "Sparse coding", "Dictionaries.")
        .article(2, "Graph routing", "Shortest paths.")
        .article(3, "Radar imaging", "Synthetic aperture.");
    let fetcher: Arc<dyn PageFetcher> = Arc::new(site);
    let crawler = ArticleCrawler::new(
        fetcher,
        Arc::new(CompiledLayout::default_layout().unwrap()),
        Arc::new(ProcessedLedger::in_memory()),
        &partials,
        1,
    )
    .unwrap()
    .with_retry_policy(RetryPolicy::immediate(1));
    crawler
        .crawl(vec![VolumeLink::new(volume)])
        .finish()
        .await
        .unwrap();

    let report = merge(&partials, &canonical).unwrap();

    assert_eq!(report.files_merged, 3);
    assert_eq!(report.total_records, 3);
    assert_eq!(fs::read_dir(&partials).unwrap().count(), 0);
    let records: Vec<ArticleRecord> = read_json_file(&canonical).unwrap();
    assert!(records.iter().all(|r| r.url.is_none()));
    assert!(records.iter().any(|r| r.title == "Radar imaging"));
}

#[test]
fn test_existing_record_wins_over_duplicate_partial() {
    let temp = TempDir::new().unwrap();
    let partials = temp.path().join("partial");
    let canonical = temp.path().join("articles.json");
    write_json_atomic(
        &canonical,
        &vec![record("Original title", "https://doi.org/10.1/ABC", "Lee")],
    )
    .unwrap();
    write_json_atomic(
        &partials.join("article_0001.json"),
        &record("Retitled", "https://dx.doi.org/10.1/abc", "Kim"),
    )
    .unwrap();

    let report = merge(&partials, &canonical).unwrap();

    assert_eq!(report.records_read, 1);
    assert_eq!(report.duplicates_dropped, 1);
    let records: Vec<ArticleRecord> = read_json_file(&canonical).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Original title");
}

fn set_mtime(path: &std::path::Path, seconds_ago: u64) {
    let when = SystemTime::now() - Duration::from_secs(seconds_ago);
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

#[test]
fn test_older_partial_wins_duplicate_doi() {
    let temp = TempDir::new().unwrap();
    let partials = temp.path().join("partial");
    let canonical = temp.path().join("articles.json");
    let older = partials.join("article_b.json");
    let newer = partials.join("article_a.json");
    write_json_atomic(&older, &record("Crawled first", "https://doi.org/10.1/dup", "Lee"))
        .unwrap();
    write_json_atomic(&newer, &record("Crawled later", "https://doi.org/10.1/DUP", "Kim"))
        .unwrap();
    set_mtime(&older, 3600);
    set_mtime(&newer, 60);

    let report = merge(&partials, &canonical).unwrap();

    assert_eq!(report.files_merged, 2);
    assert_eq!(report.duplicates_dropped, 1);
    let records: Vec<ArticleRecord> = read_json_file(&canonical).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Crawled first");
    assert_eq!(records[0].authors, "Lee");
}

#[test]
fn test_merge_normalizes_fields() {
    let temp = TempDir::new().unwrap();
    let partials = temp.path().join("partial");
    let canonical = temp.path().join("articles.json");
    write_json_atomic(
        &partials.join("article_0001.json"),
        &vec![
            record("  Escaped \\/ title ", "", "Zhou; Abe, Zhou"),
            record("Second", "https://doi.org/10.1/x", ""),
        ],
    )
    .unwrap();

    merge(&partials, &canonical).unwrap();

    let records: Vec<ArticleRecord> = read_json_file(&canonical).unwrap();
    assert_eq!(records[0].title, "Escaped / title");
    assert_eq!(records[0].authors, "Abe, Zhou");
    assert_eq!(records[0].doi, NOT_FOUND);
    assert_eq!(records[1].authors, NOT_FOUND);
}

#[test]
fn test_malformed_partial_is_deleted_and_reported() {
    let temp = TempDir::new().unwrap();
    let partials = temp.path().join("partial");
    let canonical = temp.path().join("articles.json");
    fs::create_dir_all(&partials).unwrap();
    fs::write(partials.join("article_bad.json"), "{ not json").unwrap();
    write_json_atomic(
        &partials.join("article_good.json"),
        &record("Good", "https://doi.org/10.1/good", "Ng"),
    )
    .unwrap();

    let report = merge(&partials, &canonical).unwrap();

    assert_eq!(report.files_rejected, 1);
    assert_eq!(report.files_merged, 1);
    assert!(!partials.join("article_bad.json").exists());
    assert_eq!(report.total_records, 1);
}

#[test]
fn test_repeated_merge_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let partials = temp.path().join("partial");
    let canonical = temp.path().join("articles.json");
    write_json_atomic(
        &partials.join("article_0001.json"),
        &record("Once", "https://doi.org/10.1/once", "Ito"),
    )
    .unwrap();

    let first = merge(&partials, &canonical).unwrap();
    let second = merge(&partials, &canonical).unwrap();

    assert_eq!(first.total_records, 1);
    assert_eq!(second.files_merged, 0);
    assert_eq!(second.total_records, 1);
}
