//! Integration tests for the HTTP page fetcher against a mock server.

use std::time::Duration;

use topicmap_core::{FetchError, HttpPageFetcher, PageFetcher, ReadyCondition};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ready(selector: &str) -> ReadyCondition {
    ReadyCondition::new(selector, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_page_with_ready_element() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/document/1"))
        .and(header_exists("user-agent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<h1 class="document-title">Graph routing</h1>"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut session = HttpPageFetcher::new().open_session().await.unwrap();
    let html = session
        .fetch(
            &format!("{}/document/1", server.uri()),
            &ready(".document-title"),
        )
        .await
        .unwrap();

    assert!(html.contains("Graph routing"));
}

#[tokio::test]
async fn test_fetch_without_ready_element_is_not_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<div>loading</div>"))
        .mount(&server)
        .await;

    let mut session = HttpPageFetcher::new().open_session().await.unwrap();
    let err = session
        .fetch(&format!("{}/listing", server.uri()), &ready(".col"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::NotReady { .. }));
    assert!(err.is_not_rendered());
}

#[tokio::test]
async fn test_fetch_reports_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let mut session = HttpPageFetcher::new().open_session().await.unwrap();
    let err = session
        .fetch(&format!("{}/busy", server.uri()), &ready("h1"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::HttpStatus { status: 429, .. }));
}

#[tokio::test]
async fn test_slow_page_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<h1>late</h1>")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut session = HttpPageFetcher::new().open_session().await.unwrap();
    let quick = ready("h1").with_timeout(Duration::from_millis(200));
    let err = session
        .fetch(&format!("{}/slow", server.uri()), &quick)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Timeout { .. }));
}

#[tokio::test]
async fn test_session_keeps_cookies_between_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "visit=1; Path=/")
                .set_body_string("<h1>start</h1>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .and(header_exists("cookie"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<h1>next</h1>"))
        .mount(&server)
        .await;

    let mut session = HttpPageFetcher::new().open_session().await.unwrap();
    session
        .fetch(&format!("{}/start", server.uri()), &ready("h1"))
        .await
        .unwrap();
    let html = session
        .fetch(&format!("{}/next", server.uri()), &ready("h1"))
        .await
        .unwrap();
    assert!(html.contains("next"));

    // A fresh session starts without the cookie, so `/next` has no match.
    let mut fresh = HttpPageFetcher::new().open_session().await.unwrap();
    let err = fresh
        .fetch(&format!("{}/next", server.uri()), &ready("h1"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
}
