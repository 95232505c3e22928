use std::sync::Arc;

use newscrawl::config::CrawlConfig;
use newscrawl::context::CrawlContext;
use newscrawl::decision::{DecisionAction, DecisionInput, UrlDecisionOrchestrator};
use newscrawl::events::EventBus;
use newscrawl::robots::RobotsCache;

fn orchestrator_for(config: CrawlConfig) -> (UrlDecisionOrchestrator, Arc<CrawlContext>) {
    let bus = Arc::new(EventBus::new(64));
    let context = Arc::new(CrawlContext::new(&config, bus));
    let robots = Arc::new(RobotsCache::new(&config).unwrap());
    robots.load_rules(
        "example.test",
        "User-agent: *\nDisallow: /private/\n",
    );
    let orchestrator = UrlDecisionOrchestrator::new(
        Arc::new(config),
        Arc::clone(&context),
        robots,
        None,
    );
    (orchestrator, context)
}

fn config() -> CrawlConfig {
    CrawlConfig::builder()
        .start_url("https://example.test/")
        .max_depth(3)
        .build()
        .unwrap()
}

#[tokio::test]
async fn invalid_urls_are_skipped() {
    let (orchestrator, _) = orchestrator_for(config());
    let input = DecisionInput::default();

    let decision = orchestrator.decide("not a url", &input).await;
    assert_eq!(decision.action, DecisionAction::Skip);
    assert_eq!(decision.reason, "invalid-url");

    let decision = orchestrator.decide("ftp://example.test/x", &input).await;
    assert_eq!(decision.reason, "invalid-url");

    let decision = orchestrator
        .decide("https://example.test/brochure.pdf", &input)
        .await;
    assert_eq!(decision.reason, "invalid-url");
}

#[tokio::test]
async fn off_domain_and_depth_policy() {
    let (orchestrator, _) = orchestrator_for(config());

    let decision = orchestrator
        .decide("https://other.test/story", &DecisionInput::default())
        .await;
    assert_eq!(decision.reason, "off-domain");

    // subdomains are on-domain
    let decision = orchestrator
        .decide("https://news.example.test/story", &DecisionInput::default())
        .await;
    assert_eq!(decision.reason, "eligible");

    let deep = DecisionInput {
        depth: 9,
        ..DecisionInput::default()
    };
    let decision = orchestrator
        .decide("https://example.test/deep", &deep)
        .await;
    assert_eq!(decision.reason, "max-depth");
}

#[tokio::test]
async fn robots_rules_govern_paths() {
    let (orchestrator, _) = orchestrator_for(config());

    let decision = orchestrator
        .decide("https://example.test/private/secret", &DecisionInput::default())
        .await;
    assert_eq!(decision.action, DecisionAction::Skip);
    assert_eq!(decision.reason, "robots-disallowed");

    let decision = orchestrator
        .decide("https://example.test/public/ok", &DecisionInput::default())
        .await;
    assert_eq!(decision.reason, "eligible");
}

#[tokio::test]
async fn query_urls_skipped_when_configured() {
    let config = CrawlConfig::builder()
        .start_url("https://example.test/")
        .skip_query_urls(true)
        .build()
        .unwrap();
    let (orchestrator, _) = orchestrator_for(config);

    let decision = orchestrator
        .decide("https://example.test/search?q=x", &DecisionInput::default())
        .await;
    assert_eq!(decision.reason, "has-query-string");
}

#[tokio::test]
async fn state_checks_follow_policy_checks() {
    let (orchestrator, context) = orchestrator_for(config());
    let url = "https://example.test/seen";
    context.mark_queued(url, 0, 0).unwrap();
    context.begin_fetch(url).unwrap();
    context.mark_visited(url).unwrap();

    let decision = orchestrator.decide(url, &DecisionInput::default()).await;
    assert_eq!(decision.reason, "already-visited");

    let queued = "https://example.test/queued";
    context.mark_queued(queued, 0, 0).unwrap();
    let decision = orchestrator
        .decide(queued, &DecisionInput::for_enqueue("https://example.test/", 1))
        .await;
    assert_eq!(decision.reason, "already-queued");
}

#[tokio::test]
async fn blocked_domains_skip_and_throttled_defer() {
    let (orchestrator, context) = orchestrator_for(config());

    context
        .throttle_domain("example.test", std::time::Duration::from_secs(30))
        .unwrap();
    let decision = orchestrator
        .decide("https://example.test/a", &DecisionInput::default())
        .await;
    assert_eq!(decision.action, DecisionAction::Defer);
    assert_eq!(decision.reason, "domain-throttled");
    assert!(decision.retry_after.is_some());

    context
        .block_domain("example.test", "connection-resets", None)
        .unwrap();
    let decision = orchestrator
        .decide("https://example.test/b", &DecisionInput::default())
        .await;
    assert_eq!(decision.action, DecisionAction::Skip);
    assert_eq!(decision.reason, "domain-blocked");
}

#[tokio::test]
async fn page_budget_is_enforced() {
    let config = CrawlConfig::builder()
        .start_url("https://example.test/")
        .max_pages(Some(1))
        .build()
        .unwrap();
    let (orchestrator, context) = orchestrator_for(config);

    let first = "https://example.test/one";
    context.mark_queued(first, 0, 0).unwrap();
    context.begin_fetch(first).unwrap();
    context.mark_visited(first).unwrap();

    let decision = orchestrator
        .decide("https://example.test/two", &DecisionInput::default())
        .await;
    assert_eq!(decision.reason, "budget-exceeded");
}

#[tokio::test]
async fn enqueue_intent_reports_queue_action() {
    let (orchestrator, _) = orchestrator_for(config());
    let decision = orchestrator
        .decide(
            "https://example.test/found",
            &DecisionInput::for_enqueue("https://example.test/", 1),
        )
        .await;
    assert_eq!(decision.action, DecisionAction::Queue);
    assert_eq!(decision.reason, "eligible");
}

#[tokio::test]
async fn eligible_decisions_are_cached_and_bypassable() {
    let (orchestrator, context) = orchestrator_for(config());
    let url = "https://example.test/cached";

    let first = orchestrator.decide(url, &DecisionInput::default()).await;
    assert_eq!(first.action, DecisionAction::Fetch);

    // now visited; the cached eligibility still answers unless bypassed
    context.mark_queued(url, 0, 0).unwrap();
    context.begin_fetch(url).unwrap();
    context.mark_visited(url).unwrap();

    let cached = orchestrator.decide(url, &DecisionInput::default()).await;
    assert_eq!(cached.action, DecisionAction::Fetch);

    let rechecked = orchestrator
        .decide(
            url,
            &DecisionInput {
                force_recheck: true,
                ..DecisionInput::default()
            },
        )
        .await;
    assert_eq!(rechecked.reason, "already-visited");
}
