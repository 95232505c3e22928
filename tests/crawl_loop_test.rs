use std::sync::Arc;
use std::time::{Duration, Instant};

use newscrawl::config::CrawlConfig;
use newscrawl::crawl_engine::CrawlLoop;
use newscrawl::events::{CrawlEvent, CrawlStatus, EventBus};

fn config_for(server_url: &str, dir: &std::path::Path) -> newscrawl::config::CrawlConfigBuilder {
    CrawlConfig::builder()
        .start_url(format!("{server_url}/"))
        .data_dir(dir.to_path_buf())
        .db_path(dir.join("news.db"))
        .concurrent_workers(2)
        .requests_per_minute(6000.0)
        .burst_size(10.0)
        .max_depth(2)
}

#[tokio::test]
async fn crawls_linked_pages_to_completion() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();

    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/sitemap.xml")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<html><body><a href="/a">story</a></body></html>"#)
        .create_async()
        .await;
    server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body><p>the story</p></body></html>")
        .create_async()
        .await;

    let config = config_for(&server.url(), dir.path())
        .max_pages(Some(2))
        .build()
        .unwrap();
    let bus = Arc::new(EventBus::new(1024));
    let crawl = CrawlLoop::new(config, bus);
    let summary = crawl.run().await.unwrap();

    assert_eq!(summary.status, CrawlStatus::Completed);
    assert_eq!(summary.stats.visited, 2);
    assert_eq!(summary.stats.errors, 0);
    assert!(summary.stats.articles >= 1);
    assert!(
        summary
            .init_stages
            .iter()
            .any(|s| s.stage == "content-db" && s.status == "completed")
    );
}

#[tokio::test]
async fn politeness_spaces_out_same_host_fetches() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();

    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/sitemap.xml")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(r#"<html><body><a href="/a">a</a></body></html>"#)
        .create_async()
        .await;
    server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>a</body></html>")
        .create_async()
        .await;

    // one token per second, no burst headroom
    let config = config_for(&server.url(), dir.path())
        .max_pages(Some(2))
        .requests_per_minute(60.0)
        .burst_size(1.0)
        .build()
        .unwrap();
    let bus = Arc::new(EventBus::new(1024));
    let crawl = CrawlLoop::new(config, bus);

    let started = Instant::now();
    let summary = crawl.run().await.unwrap();

    assert_eq!(summary.stats.visited, 2);
    assert_eq!(summary.stats.errors, 0);
    // the second fetch had to wait for the bucket to refill
    assert!(
        started.elapsed() >= Duration::from_millis(900),
        "fetches were {} ms apart",
        started.elapsed().as_millis()
    );
}

#[tokio::test]
async fn robots_disallow_is_honored_and_reported() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();

    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /private/\n")
        .create_async()
        .await;
    server
        .mock("GET", "/sitemap.xml")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(
            r#"<html><body>
                <a href="/public/ok">ok</a>
                <a href="/private/secret">secret</a>
            </body></html>"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/public/ok")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>public</body></html>")
        .create_async()
        .await;
    let secret = server
        .mock("GET", "/private/secret")
        .with_status(200)
        .with_body("should never be fetched")
        .expect(0)
        .create_async()
        .await;

    let config = config_for(&server.url(), dir.path()).build().unwrap();
    let bus = Arc::new(EventBus::new(1024));
    let mut rx = bus.subscribe();
    let crawl = CrawlLoop::new(config, Arc::clone(&bus));
    let summary = crawl.run().await.unwrap();

    assert_eq!(summary.stats.visited, 2);
    secret.assert_async().await;

    let mut robots_skips = 0;
    while let Ok(event) = rx.try_recv() {
        if let CrawlEvent::UrlSkipped { reason, .. } = event
            && reason == "robots-disallowed"
        {
            robots_skips += 1;
        }
    }
    assert_eq!(robots_skips, 1);
}

#[tokio::test]
async fn abort_before_start_finishes_as_aborted() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/sitemap.xml")
        .with_status(404)
        .create_async()
        .await;
    let root = server
        .mock("GET", "/")
        .with_status(200)
        .with_body("<html></html>")
        .expect(0)
        .create_async()
        .await;

    let config = config_for(&server.url(), dir.path()).build().unwrap();
    let bus = Arc::new(EventBus::new(1024));
    let crawl = CrawlLoop::new(config, bus);
    crawl.control().abort();

    let summary = crawl.run().await.unwrap();
    assert_eq!(summary.status, CrawlStatus::Aborted);
    assert_eq!(summary.stats.visited, 0);
    root.assert_async().await;
}

#[tokio::test]
async fn pause_holds_workers_until_resume() {
    let mut server = mockito::Server::new_async().await;
    let dir = tempfile::tempdir().unwrap();
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/sitemap.xml")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><body>solo</body></html>")
        .create_async()
        .await;

    let config = config_for(&server.url(), dir.path())
        .max_pages(Some(1))
        .build()
        .unwrap();
    let bus = Arc::new(EventBus::new(1024));
    let mut rx = bus.subscribe();
    let crawl = Arc::new(CrawlLoop::new(config, bus));
    let control = crawl.control();

    control.pause();
    let handle = {
        let crawl = Arc::clone(&crawl);
        tokio::spawn(async move { crawl.run().await })
    };

    // paused workers issue no fetches
    tokio::time::sleep(Duration::from_millis(400)).await;
    let mut visited_while_paused = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, CrawlEvent::UrlVisited { .. }) {
            visited_while_paused += 1;
        }
    }
    assert_eq!(visited_while_paused, 0);

    control.resume();
    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.status, CrawlStatus::Completed);
    assert_eq!(summary.stats.visited, 1);
}
