use std::sync::Arc;

use newscrawl::config::{CrawlConfig, UseCase};
use newscrawl::events::EventBus;
use newscrawl::planner::heuristics::{
    self, HeuristicRecord, PatternStat, TRANSFER_CONFIDENCE_FACTOR,
};
use newscrawl::planner::{Constraints, Goal, GoalType, Planner, StepStatus};
use newscrawl::storage::ContentStore;

async fn store_with_urls(urls: &[(&str, &str)]) -> ContentStore {
    let store = ContentStore::open_in_memory(UseCase::Standard).await.unwrap();
    for (url, host) in urls {
        store.upsert_url(url, host).await.unwrap();
    }
    store
}

fn planner_for(store: &ContentStore, adaptive: bool) -> Planner {
    let config = CrawlConfig::builder()
        .start_url("https://news.test/")
        .adaptive_sizing(adaptive)
        .adaptive_branching(adaptive)
        .cross_domain_sharing(true)
        .build()
        .unwrap();
    Planner::new(store.pool().clone(), Arc::new(EventBus::new(64)), &config)
}

fn discover_goals() -> Vec<Goal> {
    vec![Goal {
        goal_type: GoalType::DiscoverArticles,
        target: 100.0,
    }]
}

#[tokio::test]
async fn plans_are_deterministic_without_adaptive_branching() {
    let store = store_with_urls(&[
        ("https://news.test/world/a", "news.test"),
        ("https://news.test/world/b", "news.test"),
        ("https://news.test/sports/c", "news.test"),
    ])
    .await;
    let planner = planner_for(&store, false);

    let first = planner
        .generate_plan("news.test", "https", discover_goals(), Constraints::default())
        .await
        .unwrap();
    let second = planner
        .generate_plan("news.test", "https", discover_goals(), Constraints::default())
        .await
        .unwrap();

    assert!(!first.steps.is_empty());
    assert_eq!(first.steps.len(), second.steps.len());
    for (a, b) in first.steps.iter().zip(&second.steps) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.url_pattern, b.url_pattern);
        assert_eq!(a.priority, b.priority);
        assert_eq!(a.action, b.action);
    }
    assert_eq!(first.seeds, second.seeds);
}

#[tokio::test]
async fn cold_start_uses_observed_sections() {
    let store = store_with_urls(&[
        ("https://news.test/world/a", "news.test"),
        ("https://news.test/sports/b", "news.test"),
    ])
    .await;
    let planner = planner_for(&store, false);
    let plan = planner
        .generate_plan("news.test", "https", discover_goals(), Constraints::default())
        .await
        .unwrap();

    assert!(plan.steps.iter().all(|s| {
        s.url_pattern == "/world" || s.url_pattern == "/sports"
    }));
    // guessed sections shape steps but never become seed fetches
    assert!(plan.seeds.is_empty());
}

#[tokio::test]
async fn persisted_heuristics_seed_the_plan() {
    let store = store_with_urls(&[("https://news.test/world/a", "news.test")]).await;
    let record = HeuristicRecord {
        domain: "news.test".to_string(),
        patterns: vec![
            PatternStat {
                pattern: "/world/africa".to_string(),
                confidence: 0.9,
                avg_value: 24.0,
                sample_size: 40,
            },
            PatternStat {
                pattern: "/sports/nba".to_string(),
                confidence: 0.4,
                avg_value: 6.0,
                sample_size: 5,
            },
        ],
        confidence: 0.7,
        sample_size: 45,
        avg_lookahead: 3.0,
        branching_factor: 5.0,
    };
    heuristics::save(store.pool(), &record).await.unwrap();

    let planner = planner_for(&store, false);
    let plan = planner
        .generate_plan("news.test", "https", discover_goals(), Constraints::default())
        .await
        .unwrap();

    // highest-weight pattern leads
    assert_eq!(plan.steps[0].url_pattern, "/world/africa");
    assert!(plan.priorities.contains(&"/sports/nba".to_string()));
    // known-good patterns seed actual fetches
    assert!(
        plan.seeds
            .contains(&"https://news.test/world/africa".to_string())
    );
}

#[tokio::test]
async fn learn_persists_record_and_transfers_at_reduced_confidence() {
    // two hosts sharing the /world section shape
    let store = store_with_urls(&[
        ("https://news.test/world/a", "news.test"),
        ("https://news.test/world/b", "news.test"),
        ("https://other.test/world/x", "other.test"),
    ])
    .await;
    let planner = planner_for(&store, false);

    let mut plan = planner
        .generate_plan("news.test", "https", discover_goals(), Constraints::default())
        .await
        .unwrap();
    for step in plan.steps.iter_mut() {
        step.status = StepStatus::Done;
        step.result = Some(newscrawl::planner::StepResult {
            value: step.expected_value,
            articles_found: 5,
            elapsed_ms: 100,
        });
    }

    planner.learn_heuristics("news.test", &plan).await.unwrap();

    let learned = heuristics::load(store.pool(), "news.test")
        .await
        .unwrap()
        .expect("record for crawled host");
    assert!(learned.sample_size > 0);
    assert!(learned.confidence > 0.9);

    let transferred = heuristics::load(store.pool(), "other.test")
        .await
        .unwrap()
        .expect("transferred record for similar host");
    assert_eq!(transferred.sample_size, 0);
    let expected = learned.confidence * TRANSFER_CONFIDENCE_FACTOR;
    assert!((transferred.confidence - expected).abs() < 1e-9);
    for (t, l) in transferred.patterns.iter().zip(&learned.patterns) {
        assert_eq!(t.sample_size, 0);
        assert!((t.confidence - l.confidence * TRANSFER_CONFIDENCE_FACTOR).abs() < 1e-9);
    }
}

#[tokio::test]
async fn pattern_performance_rows_accumulate() {
    let store = store_with_urls(&[]).await;
    heuristics::record_pattern_outcome(store.pool(), "/world", true, 10.0)
        .await
        .unwrap();
    heuristics::record_pattern_outcome(store.pool(), "/world", false, 0.0)
        .await
        .unwrap();

    let (successes, total): (i64, i64) = sqlx::query_as(
        "SELECT success_count, total_count FROM pattern_performance WHERE pattern = '/world'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(successes, 1);
    assert_eq!(total, 2);
}
