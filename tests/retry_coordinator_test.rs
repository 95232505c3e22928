use std::sync::Arc;
use std::time::Duration;

use newscrawl::config::CrawlConfig;
use newscrawl::context::CrawlContext;
use newscrawl::context::domain::DomainAvailability;
use newscrawl::crawl_engine::{
    FetchError, HostRateLimiter, RetryAction, RetryCoordinator,
};
use newscrawl::events::{CrawlEvent, EventBus};

fn coordinator(config: CrawlConfig) -> (RetryCoordinator, Arc<CrawlContext>, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new(128));
    let context = Arc::new(CrawlContext::new(&config, Arc::clone(&bus)));
    let limiter = Arc::new(HostRateLimiter::new(
        config.requests_per_minute(),
        config.burst_size(),
    ));
    let config = Arc::new(config);
    (
        RetryCoordinator::new(config, Arc::clone(&context), limiter),
        context,
        bus,
    )
}

fn default_config() -> CrawlConfig {
    CrawlConfig::builder()
        .start_url("https://example.test/")
        .retry_jitter_factor(0.0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn transient_errors_back_off_exponentially() {
    let (retry, _, _) = coordinator(default_config());

    let v0 = retry.on_failure("example.test", "https://example.test/a", 0, &FetchError::Timeout);
    assert_eq!(v0.action, RetryAction::Retry);
    assert!(v0.should_retry);
    assert_eq!(v0.delay, Duration::from_secs(1));

    let v1 = retry.on_failure("example.test", "https://example.test/a", 1, &FetchError::Timeout);
    assert_eq!(v1.delay, Duration::from_secs(2));

    let v2 = retry.on_failure("example.test", "https://example.test/a", 2, &FetchError::Timeout);
    assert_eq!(v2.delay, Duration::from_secs(4));

    // attempts exhausted at max_retries (default 3)
    let v3 = retry.on_failure("example.test", "https://example.test/a", 3, &FetchError::Timeout);
    assert_eq!(v3.action, RetryAction::Abandon);
    assert!(!v3.should_retry);
}

#[tokio::test]
async fn backoff_is_capped() {
    let (retry, _, _) = coordinator(
        CrawlConfig::builder()
            .start_url("https://example.test/")
            .retry_jitter_factor(0.0)
            .max_retries(20)
            .build()
            .unwrap(),
    );
    let verdict = retry.on_failure(
        "example.test",
        "https://example.test/a",
        10,
        &FetchError::Timeout,
    );
    assert_eq!(verdict.delay, Duration::from_secs(30));
}

#[tokio::test]
async fn rate_limit_honors_retry_after_and_throttles_domain() {
    let (retry, context, _) = coordinator(default_config());
    let error = FetchError::Http {
        status: 429,
        retry_after: Some(Duration::from_secs(2)),
    };
    let verdict = retry.on_failure("example.test", "https://example.test/a", 0, &error);
    assert_eq!(verdict.action, RetryAction::Defer);
    assert_eq!(verdict.delay, Duration::from_secs(2));
    assert!(matches!(
        context.domain_availability("example.test"),
        DomainAvailability::Throttled { .. }
    ));
}

#[tokio::test]
async fn rate_limit_without_header_uses_configured_throttle() {
    let (retry, _, _) = coordinator(default_config());
    let error = FetchError::Http {
        status: 429,
        retry_after: None,
    };
    let verdict = retry.on_failure("example.test", "https://example.test/a", 0, &error);
    assert_eq!(verdict.delay, Duration::from_secs(5));
}

#[tokio::test]
async fn server_errors_lock_host_after_threshold() {
    let config = CrawlConfig::builder()
        .start_url("https://example.test/")
        .retry_jitter_factor(0.0)
        .host_max_errors(3)
        .host_lockout_ms(5_000)
        .build()
        .unwrap();
    let (retry, context, bus) = coordinator(config);
    let mut rx = bus.subscribe();
    let error = FetchError::Http {
        status: 500,
        retry_after: None,
    };

    let v1 = retry.on_failure("example.test", "https://example.test/a", 0, &error);
    assert_eq!(v1.action, RetryAction::Retry);
    let v2 = retry.on_failure("example.test", "https://example.test/a", 1, &error);
    assert_eq!(v2.action, RetryAction::Retry);
    let v3 = retry.on_failure("example.test", "https://example.test/a", 2, &error);
    assert_eq!(v3.action, RetryAction::BlockHost);

    assert!(matches!(
        context.domain_availability("example.test"),
        DomainAvailability::Blocked
    ));

    // exactly one domain:blocked event
    let mut blocked = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, CrawlEvent::DomainBlocked { .. }) {
            blocked += 1;
        }
    }
    assert_eq!(blocked, 1);
}

#[tokio::test]
async fn success_ages_out_one_error() {
    let config = CrawlConfig::builder()
        .start_url("https://example.test/")
        .retry_jitter_factor(0.0)
        .host_max_errors(3)
        .build()
        .unwrap();
    let (retry, context, _) = coordinator(config);
    let error = FetchError::Http {
        status: 500,
        retry_after: None,
    };

    retry.on_failure("example.test", "https://example.test/a", 0, &error);
    retry.on_failure("example.test", "https://example.test/b", 0, &error);
    retry.on_success("example.test");
    assert_eq!(context.domain_errors_in_window("example.test"), 1);

    // the aged-out error means the next failure does not trip the lockout
    let verdict = retry.on_failure("example.test", "https://example.test/c", 0, &error);
    assert_eq!(verdict.action, RetryAction::Retry);
}

#[tokio::test]
async fn connection_resets_escalate_to_domain_block() {
    let (retry, context, _) = coordinator(default_config());

    let v1 = retry.on_failure(
        "flaky.test",
        "https://flaky.test/a",
        0,
        &FetchError::ConnectionReset,
    );
    assert_eq!(v1.action, RetryAction::Retry);
    // resets back off twice as hard as plain transients
    assert_eq!(v1.delay, Duration::from_secs(2));

    retry.on_failure(
        "flaky.test",
        "https://flaky.test/b",
        0,
        &FetchError::ConnectionReset,
    );
    let v3 = retry.on_failure(
        "flaky.test",
        "https://flaky.test/c",
        0,
        &FetchError::ConnectionReset,
    );
    assert_eq!(v3.action, RetryAction::BlockHost);
    assert!(matches!(
        context.domain_availability("flaky.test"),
        DomainAvailability::Blocked
    ));
}

#[tokio::test]
async fn permanent_failures_abandon_immediately() {
    let (retry, _, _) = coordinator(default_config());
    for status in [403u16, 404, 410] {
        let verdict = retry.on_failure(
            "example.test",
            "https://example.test/x",
            0,
            &FetchError::Http {
                status,
                retry_after: None,
            },
        );
        assert_eq!(verdict.action, RetryAction::Abandon, "status {status}");
    }
    let verdict = retry.on_failure(
        "example.test",
        "https://example.test/x",
        0,
        &FetchError::Dns("no such host".into()),
    );
    assert_eq!(verdict.action, RetryAction::Abandon);
}

#[tokio::test]
async fn token_api_delegates_to_bucket() {
    let config = CrawlConfig::builder()
        .start_url("https://example.test/")
        .requests_per_minute(60.0)
        .burst_size(1.0)
        .build()
        .unwrap();
    let (retry, _, _) = coordinator(config);
    assert!(retry.acquire_token("example.test"));
    assert!(!retry.acquire_token("example.test"));
    assert!(retry.token_wait_time("example.test") > Duration::ZERO);
}
