use std::sync::Arc;
use std::time::Duration;

use newscrawl::config::CrawlConfig;
use newscrawl::crawl_engine::crawl_types::{FetchError, QueueEntry};
use newscrawl::crawl_engine::{ErrorClass, FetchPipeline, classify, sha256_hex};
use newscrawl::decision::host_of;
use newscrawl::events::EventBus;

fn pipeline_for(server_url: &str) -> FetchPipeline {
    let config = CrawlConfig::builder()
        .start_url(format!("{server_url}/"))
        .request_timeout_ms(5_000)
        .read_timeout_ms(2_000)
        .build()
        .unwrap();
    FetchPipeline::new(Arc::new(config), Arc::new(EventBus::new(64)), None).unwrap()
}

fn entry_for(url: &str) -> QueueEntry {
    let host = host_of(url).unwrap();
    QueueEntry::seed(url, &host, 0)
}

#[tokio::test]
async fn successful_fetch_carries_sha_and_validators() {
    let mut server = mockito::Server::new_async().await;
    let body = "<html><body>fresh</body></html>";
    server
        .mock("GET", "/page")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_header("etag", "\"v1\"")
        .with_body(body)
        .create_async()
        .await;

    let pipeline = pipeline_for(&server.url());
    let url = format!("{}/page", server.url());
    let result = pipeline.fetch(&entry_for(&url)).await.unwrap();

    assert_eq!(result.http_status, 200);
    assert!(!result.not_modified);
    assert_eq!(result.bytes_downloaded, body.len() as u64);
    assert_eq!(result.content_sha256, sha256_hex(body.as_bytes()));
    assert_eq!(result.cache_validators.etag.as_deref(), Some("\"v1\""));
    assert!(result.is_html());
}

#[tokio::test]
async fn second_fetch_sends_conditional_headers() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/page")
        .match_header("if-none-match", mockito::Matcher::Missing)
        .with_status(200)
        .with_header("etag", "\"v1\"")
        .with_body("<html>original</html>")
        .create_async()
        .await;
    let conditional = server
        .mock("GET", "/page")
        .match_header("if-none-match", "\"v1\"")
        .with_status(304)
        .create_async()
        .await;

    let pipeline = pipeline_for(&server.url());
    let url = format!("{}/page", server.url());
    let entry = entry_for(&url);

    let first = pipeline.fetch(&entry).await.unwrap();
    assert!(!first.not_modified);

    let second = pipeline.fetch(&entry).await.unwrap();
    assert!(second.not_modified);
    assert_eq!(second.http_status, 304);
    assert_eq!(second.bytes_downloaded, 0);
    conditional.assert_async().await;
}

#[tokio::test]
async fn rate_limit_response_surfaces_retry_after() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/busy")
        .with_status(429)
        .with_header("retry-after", "2")
        .create_async()
        .await;

    let pipeline = pipeline_for(&server.url());
    let url = format!("{}/busy", server.url());
    let error = pipeline.fetch(&entry_for(&url)).await.unwrap_err();

    match &error {
        FetchError::Http {
            status,
            retry_after,
        } => {
            assert_eq!(*status, 429);
            assert_eq!(*retry_after, Some(Duration::from_secs(2)));
        }
        other => panic!("expected http error, got {other}"),
    }
    assert_eq!(classify(&error), ErrorClass::RateLimited);
}

#[tokio::test]
async fn server_errors_map_to_their_class() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/down")
        .with_status(503)
        .create_async()
        .await;
    server
        .mock("GET", "/gone")
        .with_status(410)
        .create_async()
        .await;

    let pipeline = pipeline_for(&server.url());

    let down = format!("{}/down", server.url());
    let error = pipeline.fetch(&entry_for(&down)).await.unwrap_err();
    assert_eq!(classify(&error), ErrorClass::ServerError);

    let gone = format!("{}/gone", server.url());
    let error = pipeline.fetch(&entry_for(&gone)).await.unwrap_err();
    assert_eq!(classify(&error), ErrorClass::Permanent);
}
