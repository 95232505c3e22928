//! Top-level crawl lifecycle
//!
//! Runs the staged init sequence, seeds the queue from the planner's
//! plan, drives a pool of workers through decision -> fetch -> store ->
//! discover, and finishes by teaching the planner and freezing the
//! context. Pause, resume, and abort are cooperative: workers observe
//! the flags at every suspension point, and an aborted worker completes
//! its current store write before exiting.

use anyhow::Context as _;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::classify::{DecisionTreeClassifier, PageContext};
use crate::config::{CrawlConfig, RobotsFailurePolicy};
use crate::context::{CrawlContext, StatsSnapshot};
use crate::decision::{DecisionAction, DecisionInput, UrlDecisionOrchestrator, host_of};
use crate::events::{CrawlEvent, CrawlStatus, EventBus, QueueOperation, Severity};
use crate::planner::{Constraints, Goal, GoalType, PlanTracker, Planner};
use crate::robots::RobotsCache;
use crate::storage::ContentStore;

use super::crawl_types::{FetchError, FetchResult, QueueEntry};
use super::fetch::{FetchPipeline, extract_links};
use super::progress::{ProgressReporter, ThrottledBusProgress};
use super::queue::QueueManager;
use super::rate_limiter::HostRateLimiter;
use super::retry::{RetryAction, RetryCoordinator};

/// Idle worker poll interval when the queue is momentarily empty
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Fatal loop errors that callers map to distinct exit codes
#[derive(Debug, thiserror::Error)]
pub enum CrawlLoopError {
    #[error("content database unavailable: {0}")]
    DbUnavailable(String),
    #[error("fatal-config: {0}")]
    FatalConfig(String),
}

/// Cooperative pause/abort flags shared with the loop's owner
#[derive(Debug, Default)]
pub struct CrawlControl {
    paused: AtomicBool,
    aborted: AtomicBool,
    resume: Notify,
}

impl CrawlControl {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume.notify_waiters();
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.resume.notify_waiters();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Suspension point: blocks while paused, returns promptly on abort
    pub async fn checkpoint(&self) {
        while self.is_paused() && !self.is_aborted() {
            let _ = tokio::time::timeout(Duration::from_millis(100), self.resume.notified()).await;
        }
    }
}

/// One init stage's report
#[derive(Debug, Clone, serde::Serialize)]
pub struct StageReport {
    pub stage: String,
    pub status: String,
    pub duration_ms: u64,
    pub message: Option<String>,
}

/// Terminal summary of one crawl job
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub job_id: String,
    pub status: CrawlStatus,
    pub stats: StatsSnapshot,
    pub duration: Duration,
    pub init_stages: Vec<StageReport>,
}

struct WorkerShared {
    config: Arc<CrawlConfig>,
    context: Arc<CrawlContext>,
    bus: Arc<EventBus>,
    control: Arc<CrawlControl>,
    queue: Arc<QueueManager>,
    decisions: Arc<UrlDecisionOrchestrator>,
    limiter: Arc<HostRateLimiter>,
    retry: Arc<RetryCoordinator>,
    pipeline: Arc<FetchPipeline>,
    store: Arc<ContentStore>,
    classifier: Option<Arc<DecisionTreeClassifier>>,
    tracker: Arc<PlanTracker>,
    progress: Arc<dyn ProgressReporter>,
    in_flight: AtomicUsize,
}

pub struct CrawlLoop {
    config: Arc<CrawlConfig>,
    bus: Arc<EventBus>,
    control: Arc<CrawlControl>,
    progress: Arc<dyn ProgressReporter>,
}

impl CrawlLoop {
    #[must_use]
    pub fn new(config: CrawlConfig, bus: Arc<EventBus>) -> Self {
        let progress = Arc::new(ThrottledBusProgress::new(
            Arc::clone(&bus),
            config.progress_interval(),
            config.progress_every_fetches(),
        ));
        Self::with_progress(config, bus, progress)
    }

    #[must_use]
    pub fn with_progress(
        config: CrawlConfig,
        bus: Arc<EventBus>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            bus,
            control: Arc::new(CrawlControl::default()),
            progress,
        }
    }

    /// Handle for pause/resume/abort from outside the loop
    #[must_use]
    pub fn control(&self) -> Arc<CrawlControl> {
        Arc::clone(&self.control)
    }

    /// Run the job to completion (or abort)
    pub async fn run(&self) -> anyhow::Result<CrawlSummary> {
        let started = Instant::now();
        let config = Arc::clone(&self.config);
        let start_host = config.start_host();
        let start_scheme = url::Url::parse(config.start_url())
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "https".to_string());
        let mut stages = Vec::new();

        // ---- Phase 1: init (sequential stages) -------------------------

        let stage = self
            .run_stage("data-dir", async {
                tokio::fs::create_dir_all(config.data_dir()).await?;
                Ok::<_, anyhow::Error>(None)
            })
            .await;
        let failed = stage.status == "failed";
        stages.push(stage);
        if failed {
            return Err(
                CrawlLoopError::FatalConfig("data directory is not writable".to_string()).into(),
            );
        }

        let mut store_slot: Option<Arc<ContentStore>> = None;
        let stage = self
            .run_stage("content-db", async {
                let store = ContentStore::open(&config).await?;
                store_slot = Some(Arc::new(store));
                Ok(None)
            })
            .await;
        let db_message = stage.message.clone();
        stages.push(stage);
        let Some(store) = store_slot else {
            return Err(CrawlLoopError::DbUnavailable(
                db_message.unwrap_or_else(|| config.db_path().display().to_string()),
            )
            .into());
        };

        let robots = Arc::new(RobotsCache::new(&config)?);
        let stage = self
            .run_stage("robots", async {
                if config.respect_robots() {
                    robots.ensure(&start_scheme, &start_host).await;
                    if config.robots_failure_policy() == RobotsFailurePolicy::DenyAll
                        && !robots.has_parsed_rules(&start_host)
                    {
                        anyhow::bail!("robots.txt unavailable and policy denies all");
                    }
                    Ok(Some(format!("rules cached for {start_host}")))
                } else {
                    Err(anyhow::anyhow!("skipped"))
                }
            })
            .await;
        let robots_failed = stage.status == "failed" && config.respect_robots();
        stages.push(stage);
        if robots_failed && config.robots_failure_policy() == RobotsFailurePolicy::DenyAll {
            return Err(CrawlLoopError::FatalConfig(
                "robots rules unavailable under deny-all policy".to_string(),
            )
            .into());
        }

        let mut sitemap_seeds: Vec<String> = Vec::new();
        let stage = self
            .run_stage("sitemaps", async {
                sitemap_seeds = discover_sitemap_seeds(
                    &config,
                    &robots,
                    &start_scheme,
                    &start_host,
                )
                .await;
                Ok(Some(format!("{} sitemap urls", sitemap_seeds.len())))
            })
            .await;
        stages.push(stage);

        let classifier = match config.classifier_config() {
            Some(tree_config) => Some(Arc::new(
                DecisionTreeClassifier::from_config(tree_config)
                    .context("fatal-config: classifier configuration")?,
            )),
            None => None,
        };

        let context = Arc::new(CrawlContext::new(&config, Arc::clone(&self.bus)));
        let planner = Arc::new(Planner::new(
            store.pool().clone(),
            Arc::clone(&self.bus),
            &config,
        ));

        let start_url_id = store
            .upsert_url(config.start_url(), &start_host)
            .await
            .ok();
        if let Err(e) = store
            .record_job(
                config.job_id(),
                "running",
                &serde_json::to_string(config.as_ref()).unwrap_or_default(),
                start_url_id,
            )
            .await
        {
            log::warn!("job row insert failed: {e}");
        }

        self.bus.publish(CrawlEvent::crawl_started(
            config.job_id().to_string(),
            config.start_url().to_string(),
        ));

        // ---- Phase 2: plan ---------------------------------------------

        let goals = vec![Goal {
            goal_type: GoalType::DiscoverArticles,
            target: config.max_pages().unwrap_or(100) as f64,
        }];
        let constraints = Constraints {
            max_pages: config.max_pages(),
            max_depth: Some(config.max_depth()),
            max_time_ms: None,
        };
        let plan = planner
            .generate_plan(&start_host, &start_scheme, goals, constraints)
            .await
            .context("plan generation")?;
        let plan_seeds = plan.seeds.clone();
        let tracker = Arc::new(PlanTracker::new(
            Arc::clone(&planner),
            &start_host,
            &start_scheme,
            plan,
        ));

        let decisions = Arc::new(UrlDecisionOrchestrator::new(
            Arc::clone(&config),
            Arc::clone(&context),
            Arc::clone(&robots),
            Some(Arc::clone(&store)),
        ));
        // A robots crawl-delay can only slow us down, never speed us up
        let mut effective_rpm = config.requests_per_minute();
        if let Some(delay) = robots.crawl_delay(&start_host) {
            let robots_rpm = 60.0 / delay.as_secs_f64().max(0.01);
            if robots_rpm < effective_rpm {
                log::info!(
                    "robots crawl-delay caps {start_host} at {robots_rpm:.2} requests/min"
                );
                effective_rpm = robots_rpm;
            }
        }
        let limiter = Arc::new(HostRateLimiter::new(effective_rpm, config.burst_size()));
        let retry = Arc::new(RetryCoordinator::new(
            Arc::clone(&config),
            Arc::clone(&context),
            Arc::clone(&limiter),
        ));
        let pipeline = Arc::new(FetchPipeline::new(
            Arc::clone(&config),
            Arc::clone(&self.bus),
            Some(Arc::clone(&store)),
        )?);
        let queue = Arc::new(QueueManager::new(config.max_per_host_in_flight()));

        let shared = Arc::new(WorkerShared {
            config: Arc::clone(&config),
            context: Arc::clone(&context),
            bus: Arc::clone(&self.bus),
            control: Arc::clone(&self.control),
            queue: Arc::clone(&queue),
            decisions,
            limiter,
            retry,
            pipeline,
            store: Arc::clone(&store),
            classifier,
            tracker: Arc::clone(&tracker),
            progress: Arc::clone(&self.progress),
            in_flight: AtomicUsize::new(0),
        });

        // Seed: user-supplied start URL first, then plan seeds, then
        // sitemap discoveries. Each passes through its own decision.
        let mut seeds = vec![config.start_url().to_string()];
        seeds.extend(plan_seeds);
        seeds.extend(sitemap_seeds);
        for seed in seeds {
            seed_one(&shared, &seed).await;
        }

        // ---- Phase 3: worker pool --------------------------------------

        let mut workers = FuturesUnordered::new();
        for worker_id in 0..config.concurrent_workers() {
            let shared = Arc::clone(&shared);
            workers.push(tokio::spawn(async move {
                worker_loop(shared, worker_id).await;
            }));
        }
        while let Some(joined) = workers.next().await {
            if let Err(e) = joined {
                log::error!("worker task failed: {e}");
            }
        }

        // ---- Phase 4: finish -------------------------------------------

        let status = if self.control.is_aborted() {
            CrawlStatus::Aborted
        } else {
            CrawlStatus::Completed
        };

        let final_plan = tracker.snapshot().await;
        if let Err(e) = planner.learn_heuristics(&start_host, &final_plan).await {
            log::warn!("heuristic learning failed for {start_host}: {e}");
        }
        if let Err(e) = store.finish_job(config.job_id(), status.as_str()).await {
            log::warn!("job row finish failed: {e}");
        }
        if let Err(e) = store
            .record_queue_event(config.job_id(), "summary", &context.to_json())
            .await
        {
            log::debug!("summary persistence failed: {e}");
        }

        let stats = context.stats().snapshot();
        self.bus.publish(CrawlEvent::crawl_finished(
            config.job_id().to_string(),
            status,
            stats.visited,
            started.elapsed(),
        ));
        context.finish(status);
        self.progress.report_completed(status);
        store.close().await;

        Ok(CrawlSummary {
            job_id: config.job_id().to_string(),
            status,
            stats,
            duration: started.elapsed(),
            init_stages: stages,
        })
    }

    async fn run_stage<F>(&self, name: &str, work: F) -> StageReport
    where
        F: Future<Output = anyhow::Result<Option<String>>>,
    {
        let started = Instant::now();
        self.progress.report_init_stage(name, "started", 0, None);
        let (status, message) = match work.await {
            Ok(message) => ("completed", message),
            Err(e) if e.to_string() == "skipped" => ("skipped", None),
            Err(e) => ("failed", Some(e.to_string())),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        self.progress
            .report_init_stage(name, status, duration_ms, message.as_deref());
        log::debug!("init stage {name}: {status} in {duration_ms} ms");
        StageReport {
            stage: name.to_string(),
            status: status.to_string(),
            duration_ms,
            message,
        }
    }
}

/// Push one seed URL through its decision and into the queue
async fn seed_one(shared: &Arc<WorkerShared>, seed: &str) {
    let Some(normalized) = crate::decision::normalize_url(seed) else {
        return;
    };
    let Some(host) = host_of(&normalized) else {
        return;
    };
    let decision = shared
        .decisions
        .decide(&normalized, &DecisionInput::for_enqueue("", 0))
        .await;
    if decision.action != DecisionAction::Queue {
        return;
    }
    if shared
        .context
        .mark_queued(&normalized, 0, 0)
        .unwrap_or(false)
    {
        shared.queue.enqueue(QueueEntry::seed(&normalized, &host, 0));
        shared.bus.publish(CrawlEvent::queue_changed(
            QueueOperation::Enqueue,
            normalized,
            Some(0),
        ));
    }
}

async fn worker_loop(shared: Arc<WorkerShared>, worker_id: usize) {
    log::debug!("worker {worker_id} up");
    loop {
        shared.control.checkpoint().await;
        if shared.control.is_aborted() {
            break;
        }

        let limiter = Arc::clone(&shared.limiter);
        let entry = shared.queue.next(|host| limiter.would_allow(host));
        let Some(entry) = entry else {
            if shared.in_flight.load(Ordering::Acquire) == 0 && shared.queue.is_empty() {
                break;
            }
            tokio::time::sleep(IDLE_POLL).await;
            continue;
        };

        shared.in_flight.fetch_add(1, Ordering::AcqRel);
        process_entry(&shared, entry).await;
        shared.in_flight.fetch_sub(1, Ordering::AcqRel);

        shared.progress.report_fetch_progress(
            shared.context.stats().visited(),
            shared.queue.size() as u64,
            "crawling",
        );
    }
    log::debug!("worker {worker_id} done");
}

async fn process_entry(shared: &Arc<WorkerShared>, entry: QueueEntry) {
    let url = entry.url.clone();
    let host = entry.host.clone();

    shared.bus.publish(CrawlEvent::queue_changed(
        QueueOperation::Dequeue,
        url.clone(),
        Some(entry.depth),
    ));

    // Own the URL for this worker; a false return means another path
    // already took it past queued.
    if !shared.context.begin_fetch(&url).unwrap_or(false) {
        shared.queue.complete(&host);
        return;
    }

    let decision = shared
        .decisions
        .decide(&url, &DecisionInput::for_fetch(entry.depth))
        .await;

    match decision.action {
        DecisionAction::Skip => {
            if !matches!(decision.reason.as_str(), "already-visited" | "already-queued") {
                shared
                    .bus
                    .publish(CrawlEvent::url_skipped(url.clone(), decision.reason.clone()));
            }
            let _ = shared.context.abandon(&url);
            shared.queue.complete(&host);
        }

        DecisionAction::Defer => {
            let delay = decision
                .retry_after
                .unwrap_or(crate::decision::DEFAULT_THROTTLE_RETRY);
            let _ = shared.context.requeue(&url);
            shared.queue.complete(&host);
            shared.bus.publish(CrawlEvent::queue_changed(
                QueueOperation::Defer,
                url,
                Some(entry.depth),
            ));
            shared.queue.defer(entry, delay);
        }

        DecisionAction::Cache => {
            shared.context.stats().add_cache_hit();
            let _ = shared.context.mark_visited(&url);
            shared
                .bus
                .publish(CrawlEvent::url_visited(url.clone(), 200, 0));
            if let Some(body) = decision.cached_data.clone() {
                process_body(shared, &entry, &body, None).await;
            }
            shared.tracker.on_page_visited(&url, 0, 0).await;
            shared.queue.complete(&host);
        }

        DecisionAction::Fetch => {
            fetch_entry(shared, entry).await;
        }

        // Queue verdicts only come back for enqueue intents
        DecisionAction::Queue => {
            let _ = shared.context.requeue(&url);
            shared.queue.complete(&host);
        }
    }
}

async fn fetch_entry(shared: &Arc<WorkerShared>, entry: QueueEntry) {
    let url = entry.url.clone();
    let host = entry.host.clone();

    // Politeness token; surrendering past the deadline requeues
    if !shared
        .limiter
        .acquire(&host, shared.config.token_wait_max())
        .await
    {
        let _ = shared.context.requeue(&url);
        shared.queue.complete(&host);
        let wait = shared.limiter.wait_time(&host);
        shared.queue.defer(entry, wait);
        return;
    }

    // Abort is checked after every suspension point; no new request
    // once set.
    if shared.control.is_aborted() {
        let _ = shared.context.requeue(&url);
        shared.queue.complete(&host);
        return;
    }

    let _ = shared.context.record_domain_request(&host);

    match shared.pipeline.fetch(&entry).await {
        Ok(result) => {
            shared.retry.on_success(&host);
            handle_success(shared, &entry, result).await;
            shared.queue.complete(&host);
        }
        Err(error) => {
            handle_failure(shared, entry, &error).await;
        }
    }
}

async fn handle_success(shared: &Arc<WorkerShared>, entry: &QueueEntry, result: FetchResult) {
    let url = &entry.url;
    let _ = shared.context.mark_visited(url);
    shared.context.stats().add_bytes(result.bytes_downloaded);
    if result.not_modified {
        shared.context.stats().add_cache_hit();
    }
    shared.bus.publish(CrawlEvent::url_visited(
        url.clone(),
        result.http_status,
        result.elapsed_ms,
    ));

    // An aborted worker still completes this write; partial content is
    // never left behind.
    let save = shared.store.save_fetch(&result, &entry.host).await;
    let url_id = match save {
        Ok(outcome) => {
            if outcome.deduplicated {
                shared.context.stats().add_cache_hit();
            } else {
                shared.context.stats().add_cache_miss();
            }
            Some(outcome.url_id)
        }
        Err(e) => {
            log::warn!("store write failed for {url}: {e}");
            shared.context.record_problem(
                "storage-error",
                Severity::Error,
                &e.to_string(),
                serde_json::json!({ "url": url }),
            );
            None
        }
    };

    let articles_found = process_body(shared, entry, &result.body, url_id).await;
    shared
        .tracker
        .on_page_visited(url, articles_found, result.elapsed_ms)
        .await;
}

/// Classify the page, record articles, and enqueue discovered links.
/// Returns the number of article classifications found.
async fn process_body(
    shared: &Arc<WorkerShared>,
    entry: &QueueEntry,
    body: &[u8],
    url_id: Option<i64>,
) -> u64 {
    let text = String::from_utf8_lossy(body);
    let looks_like_html = text.contains("<html") || text.contains("<a ") || text.contains("<!DOCTYPE");

    let mut articles_found = 0u64;
    if let Some(classifier) = &shared.classifier {
        let ctx = page_context_for(&entry.url, &text);
        let matches = classifier.get_matches(&ctx);
        articles_found = matches.len() as u64;
        for matched in &matches {
            shared.bus.publish(CrawlEvent::article_found(
                entry.url.clone(),
                matched.category_id.clone(),
                matched.confidence,
            ));
        }
        let _ = shared.context.record_analysis(&entry.url, classifier.evaluate_all(&ctx));
    } else if looks_like_html {
        // Without a classifier every fetched page is an article candidate
        articles_found = 1;
        shared.bus.publish(CrawlEvent::article_found(
            entry.url.clone(),
            "article".to_string(),
            1.0,
        ));
    }

    if articles_found > 0 {
        shared.context.stats().add_article();
        if let Some(url_id) = url_id {
            let title = extract_title(&text);
            if let Err(e) = shared
                .store
                .save_article(url_id, &entry.host, title.as_deref(), None)
                .await
            {
                log::debug!("article row insert failed: {e}");
            }
        }
    }

    if looks_like_html {
        discover_links(shared, entry, &text, url_id).await;
    }
    articles_found
}

async fn discover_links(
    shared: &Arc<WorkerShared>,
    entry: &QueueEntry,
    body: &str,
    src_url_id: Option<i64>,
) {
    let links = extract_links(body, &entry.url, shared.config.max_links_per_page());
    for link in links {
        let input = DecisionInput::for_enqueue(&entry.url, entry.depth + 1);
        let decision = shared.decisions.decide(&link, &input).await;
        match decision.action {
            DecisionAction::Queue => {
                let Some(host) = host_of(&link) else { continue };
                if shared
                    .context
                    .mark_queued(&link, entry.depth + 1, 0)
                    .unwrap_or(false)
                {
                    shared
                        .queue
                        .enqueue(QueueEntry::discovered(&link, &host, entry, 0));
                    shared.bus.publish(CrawlEvent::queue_changed(
                        QueueOperation::Enqueue,
                        link.clone(),
                        Some(entry.depth + 1),
                    ));
                    if let Some(src_id) = src_url_id
                        && let Ok(dst_id) = shared.store.upsert_url(&link, &host).await
                        && let Err(e) = shared.store.record_link(src_id, dst_id).await
                    {
                        log::debug!("link edge insert failed: {e}");
                    }
                }
            }
            DecisionAction::Skip => {
                // State conflicts stay silent; policy skips surface
                if !matches!(
                    decision.reason.as_str(),
                    "already-visited" | "already-queued"
                ) {
                    shared
                        .bus
                        .publish(CrawlEvent::url_skipped(link, decision.reason.clone()));
                }
            }
            _ => {}
        }
    }
}

async fn handle_failure(shared: &Arc<WorkerShared>, entry: QueueEntry, error: &FetchError) {
    let url = entry.url.clone();
    let host = entry.host.clone();
    let verdict = shared
        .retry
        .on_failure(&host, &url, entry.retry_count, error);

    if verdict.reason == "rate-limited" {
        shared.context.record_milestone(
            "rate-limited",
            &format!("{host} asked us to slow down"),
            serde_json::json!({ "retry_after_ms": verdict.delay.as_millis() as u64 }),
        );
        shared.bus.publish(CrawlEvent::milestone(
            "rate-limited".to_string(),
            format!("{host} rate limited"),
            serde_json::json!({ "url": url.as_str() }),
        ));
    }

    match verdict.action {
        RetryAction::Retry => {
            let mut retry_entry = entry;
            retry_entry.retry_count += 1;
            let _ = shared.context.requeue(&url);
            shared.queue.complete(&host);
            shared.queue.defer(retry_entry, verdict.delay);
        }
        RetryAction::Defer => {
            let _ = shared.context.requeue(&url);
            shared.queue.complete(&host);
            shared.bus.publish(CrawlEvent::queue_changed(
                QueueOperation::Defer,
                url,
                Some(entry.depth),
            ));
            shared.queue.defer(entry, verdict.delay);
        }
        RetryAction::Abandon | RetryAction::BlockHost => {
            let _ = shared.context.mark_abandoned(&url);
            shared.context.record_problem(
                &verdict.reason,
                Severity::Warning,
                &error.to_string(),
                serde_json::json!({ "url": url.as_str(), "attempts": entry.retry_count + 1 }),
            );
            shared.bus.publish(CrawlEvent::problem(
                verdict.reason.clone(),
                Severity::Warning,
                error.to_string(),
                serde_json::json!({ "url": url.as_str() }),
            ));
            shared.queue.complete(&host);
            shared.tracker.on_page_abandoned(&url).await;
        }
    }
}

fn page_context_for(url: &str, body: &str) -> PageContext {
    let mut ctx = PageContext::for_url(url);
    if let Some(title) = extract_title(body) {
        ctx.title = title;
    }
    if let Some(description) = extract_meta_description(body) {
        ctx.description = description;
    }
    ctx
}

fn extract_title(body: &str) -> Option<String> {
    static TITLE_RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern is valid")
    });
    TITLE_RE
        .captures(body)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

fn extract_meta_description(body: &str) -> Option<String> {
    static DESC_RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r#"(?i)<meta\s+name=["']description["']\s+content=["']([^"']*)["']"#)
            .expect("description pattern is valid")
    });
    DESC_RE.captures(body).map(|c| c[1].trim().to_string())
}

/// Collect seed URLs from sitemaps named by robots.txt or at the
/// well-known path
async fn discover_sitemap_seeds(
    config: &CrawlConfig,
    robots: &RobotsCache,
    scheme: &str,
    host: &str,
) -> Vec<String> {
    static LOC_RE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"(?is)<loc>\s*(.*?)\s*</loc>").expect("loc pattern is valid")
    });

    let mut sitemap_urls = robots.sitemaps(host);
    if sitemap_urls.is_empty() {
        sitemap_urls.push(format!("{scheme}://{host}/sitemap.xml"));
    }
    sitemap_urls.truncate(3);

    let client = match reqwest::Client::builder()
        .user_agent(config.user_agent().to_string())
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            log::warn!("sitemap client build failed: {e}");
            return Vec::new();
        }
    };

    let limit = config.sitemap_seed_limit();
    let mut seeds = Vec::new();
    for sitemap_url in sitemap_urls {
        if seeds.len() >= limit {
            break;
        }
        match client.get(&sitemap_url).send().await {
            Ok(response) if response.status().is_success() => {
                if let Ok(text) = response.text().await {
                    for capture in LOC_RE.captures_iter(&text) {
                        if seeds.len() >= limit {
                            break;
                        }
                        seeds.push(capture[1].to_string());
                    }
                }
            }
            Ok(response) => {
                log::debug!("sitemap {sitemap_url} returned {}", response.status());
            }
            Err(e) => {
                log::debug!("sitemap fetch failed for {sitemap_url}: {e}");
            }
        }
    }
    seeds
}
