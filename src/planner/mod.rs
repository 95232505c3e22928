//! Hierarchical crawl planner
//!
//! Profiles a domain from persisted history, emits a prioritized step
//! plan, adapts mid-run from step performance, and on completion
//! persists what it learned, optionally seeding structurally similar
//! domains with transferred patterns.

pub mod feedback;
pub mod heuristics;
pub mod plan;
pub mod profile;

use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CrawlConfig;
use crate::events::{CrawlEvent, EventBus};

pub use feedback::{FeedbackState, apply_step_feedback, merge_plans};
pub use heuristics::{HeuristicRecord, PatternStat};
pub use plan::{Constraints, CrawlPlan, Goal, GoalType, PlanStep, StepAction, StepResult, StepStatus, two_segment_pattern};
pub use profile::DomainProfile;

/// Sections assumed for a host with no history at all
const DEFAULT_SECTIONS: [&str; 6] = [
    "/news", "/world", "/politics", "/business", "/sports", "/culture",
];

/// Plan sizing when adaptive sizing is disabled
const FIXED_LOOKAHEAD: usize = 5;
const FIXED_BRANCHES: usize = 5;

pub struct Planner {
    pool: SqlitePool,
    bus: Arc<EventBus>,
    adaptive_sizing: bool,
    adaptive_branching: bool,
    cross_domain: bool,
}

impl Planner {
    #[must_use]
    pub fn new(pool: SqlitePool, bus: Arc<EventBus>, config: &CrawlConfig) -> Self {
        Self {
            pool,
            bus,
            adaptive_sizing: config.adaptive_sizing(),
            adaptive_branching: config.adaptive_branching(),
            cross_domain: config.cross_domain_sharing(),
        }
    }

    #[must_use]
    pub fn adaptive_branching(&self) -> bool {
        self.adaptive_branching
    }

    /// Profile the host and emit a prioritized step plan
    ///
    /// `scheme` is the start URL's scheme, used when turning known-good
    /// patterns into seed URLs.
    pub async fn generate_plan(
        &self,
        host: &str,
        scheme: &str,
        goals: Vec<Goal>,
        constraints: Constraints,
    ) -> Result<CrawlPlan, sqlx::Error> {
        let profile = profile::profile_domain(&self.pool, host).await?;
        let (lookahead, branches) = if self.adaptive_sizing {
            (
                profile::lookahead_for(profile.page_count),
                profile::branches_for(profile.hub_type_count, profile.complexity),
            )
        } else {
            (FIXED_LOOKAHEAD, FIXED_BRANCHES)
        };

        let patterns = self.seed_patterns(host, &profile, branches).await?;

        let refresh_wanted = goals
            .iter()
            .any(|g| g.goal_type == GoalType::RefreshContent);
        let action_cycle: &[StepAction] = if refresh_wanted {
            &[
                StepAction::Explore,
                StepAction::Collect,
                StepAction::Refresh,
                StepAction::Probe,
            ]
        } else {
            &[StepAction::Explore, StepAction::Collect, StepAction::Probe]
        };

        let mut steps = Vec::with_capacity(lookahead * branches.min(patterns.len().max(1)));
        for slot in 0..lookahead {
            for (branch, pattern) in patterns.iter().take(branches).enumerate() {
                let action = action_cycle[slot % action_cycle.len()];
                let expected = if pattern.avg_value > 0.0 {
                    pattern.avg_value
                } else {
                    10.0
                };
                steps.push(PlanStep {
                    id: format!("step-{:03}", steps.len()),
                    action,
                    url_pattern: pattern.pattern.clone(),
                    expected_value: expected,
                    priority: (pattern.confidence * 100.0) as i32
                        - (slot as i32 * 5)
                        - branch as i32,
                    status: StepStatus::Pending,
                    result: None,
                });
            }
        }

        // Only patterns with observed history become seed URLs; guessed
        // sections still shape steps but are not worth a fetch on their own.
        let seeds = patterns
            .iter()
            .filter(|p| p.sample_size > 0)
            .take(10)
            .map(|p| format!("{scheme}://{host}{}", p.pattern))
            .collect();
        let priorities = patterns.iter().map(|p| p.pattern.clone()).collect();

        log::info!(
            "planned {} steps for {host} (lookahead {lookahead}, branches {branches}, \
             page_count {}, hub_types {})",
            steps.len(),
            profile.page_count,
            profile.hub_type_count
        );

        Ok(CrawlPlan {
            goals,
            constraints,
            priorities,
            seeds,
            steps,
            recomputed: false,
        })
    }

    /// Patterns to seed the plan with, best first
    async fn seed_patterns(
        &self,
        host: &str,
        profile: &DomainProfile,
        branches: usize,
    ) -> Result<Vec<PatternStat>, sqlx::Error> {
        if let Some(record) = heuristics::load(&self.pool, host).await? {
            let mut patterns = record.patterns;
            patterns.sort_by(|a, b| {
                b.weight()
                    .partial_cmp(&a.weight())
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.pattern.cmp(&b.pattern))
            });
            if !patterns.is_empty() {
                patterns.truncate(branches.max(1));
                return Ok(patterns);
            }
        }

        // No record of our own: borrow from a structurally similar host
        // at a confidence penalty.
        let similar = heuristics::find_similar_hosts(
            &self.pool,
            host,
            &profile.section_tokens,
            heuristics::TRANSFER_HOST_LIMIT,
        )
        .await?;
        for candidate in similar {
            if let Some(record) = heuristics::load(&self.pool, &candidate).await? {
                let mut borrowed: Vec<PatternStat> = record
                    .patterns
                    .into_iter()
                    .map(|p| PatternStat {
                        confidence: p.confidence * heuristics::TRANSFER_CONFIDENCE_FACTOR,
                        ..p
                    })
                    .collect();
                borrowed.sort_by(|a, b| {
                    b.weight()
                        .partial_cmp(&a.weight())
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.pattern.cmp(&b.pattern))
                });
                if !borrowed.is_empty() {
                    borrowed.truncate(branches.max(1));
                    return Ok(borrowed);
                }
            }
        }

        // Cold start: known section tokens, then stock news sections
        let sections: Vec<String> = if profile.section_tokens.is_empty() {
            DEFAULT_SECTIONS.iter().map(|s| (*s).to_string()).collect()
        } else {
            profile
                .section_tokens
                .iter()
                .map(|t| format!("/{t}"))
                .collect()
        };
        Ok(sections
            .into_iter()
            .take(branches.max(1))
            .map(|pattern| PatternStat {
                pattern,
                confidence: 0.5,
                avg_value: 0.0,
                sample_size: 0,
            })
            .collect())
    }

    /// Regenerate the remaining steps and merge, emitting `plan:recomputed`
    pub async fn replan(
        &self,
        plan: &mut CrawlPlan,
        host: &str,
        scheme: &str,
    ) -> Result<(), sqlx::Error> {
        let fresh = self
            .generate_plan(host, scheme, plan.goals.clone(), plan.constraints)
            .await?;
        let completed = plan.completed_steps();
        let added = fresh.steps.len();
        *plan = merge_plans(plan, fresh.steps);
        self.bus
            .publish(CrawlEvent::plan_recomputed(completed, added));
        Ok(())
    }

    /// Persist aggregated patterns from a finished plan and, when
    /// enabled, transfer them to similar record-less hosts
    pub async fn learn_heuristics(&self, host: &str, plan: &CrawlPlan) -> Result<(), sqlx::Error> {
        let mut by_pattern: HashMap<String, Vec<&PlanStep>> = HashMap::new();
        for step in plan
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Done | StepStatus::Failed))
        {
            by_pattern.entry(step.url_pattern.clone()).or_default().push(step);
        }
        if by_pattern.is_empty() {
            return Ok(());
        }

        let mut patterns = Vec::with_capacity(by_pattern.len());
        let mut total_steps = 0i64;
        for (pattern, steps) in &by_pattern {
            let total = steps.len() as u32;
            let successes = steps
                .iter()
                .filter(|s| {
                    s.result
                        .as_ref()
                        .is_some_and(|r| r.value >= s.expected_value * 0.5)
                })
                .count() as u32;
            let avg_value = steps
                .iter()
                .filter_map(|s| s.result.as_ref().map(|r| r.value))
                .sum::<f64>()
                / f64::from(total.max(1));
            let confidence = f64::from(successes) / f64::from(total.max(1));
            total_steps += i64::from(total);

            for step in steps {
                let success = step
                    .result
                    .as_ref()
                    .is_some_and(|r| r.value >= step.expected_value * 0.5);
                let value = step.result.as_ref().map_or(0.0, |r| r.value);
                heuristics::record_pattern_outcome(&self.pool, pattern, success, value).await?;
            }

            patterns.push(PatternStat {
                pattern: pattern.clone(),
                confidence,
                avg_value,
                sample_size: total,
            });
        }
        patterns.sort_by(|a, b| a.pattern.cmp(&b.pattern));

        let profile = profile::profile_domain(&self.pool, host).await?;
        let overall_confidence =
            patterns.iter().map(|p| p.confidence).sum::<f64>() / patterns.len() as f64;
        let record = HeuristicRecord {
            domain: host.to_string(),
            patterns,
            confidence: overall_confidence,
            sample_size: total_steps,
            avg_lookahead: profile::lookahead_for(profile.page_count) as f64,
            branching_factor: profile::branches_for(profile.hub_type_count, profile.complexity)
                as f64,
        };
        heuristics::save(&self.pool, &record).await?;

        if self.cross_domain {
            let similar = heuristics::find_similar_hosts(
                &self.pool,
                host,
                &profile.section_tokens,
                heuristics::TRANSFER_HOST_LIMIT,
            )
            .await?;
            let transferred = heuristics::transfer_patterns(&self.pool, &record, &similar).await?;
            if transferred > 0 {
                log::info!("transferred {host} patterns to {transferred} similar hosts");
            }
        }
        Ok(())
    }
}

/// Attributes fetched pages to plan steps during a crawl
///
/// The crawl loop reports each visited page; the tracker matches it to
/// an open step by its two-segment pattern, completes steps when their
/// expected volume is reached, and drives replanning.
pub struct PlanTracker {
    planner: Arc<Planner>,
    host: String,
    scheme: String,
    plan: tokio::sync::Mutex<CrawlPlan>,
    feedback: tokio::sync::Mutex<FeedbackState>,
    progress: tokio::sync::Mutex<HashMap<String, PatternProgress>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct PatternProgress {
    visits: u64,
    articles: u64,
    elapsed_ms: u64,
}

impl PlanTracker {
    #[must_use]
    pub fn new(planner: Arc<Planner>, host: &str, scheme: &str, plan: CrawlPlan) -> Self {
        Self {
            planner,
            host: host.to_string(),
            scheme: scheme.to_string(),
            plan: tokio::sync::Mutex::new(plan),
            feedback: tokio::sync::Mutex::new(FeedbackState::default()),
            progress: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn seeds(&self) -> Vec<String> {
        self.plan.lock().await.seeds.clone()
    }

    pub async fn snapshot(&self) -> CrawlPlan {
        self.plan.lock().await.clone()
    }

    /// Report one visited page
    pub async fn on_page_visited(&self, url: &str, articles_found: u64, elapsed_ms: u64) {
        let pattern = two_segment_pattern(url);

        let mut progress = self.progress.lock().await;
        let tally = progress.entry(pattern.clone()).or_default();
        tally.visits += 1;
        tally.articles += articles_found;
        tally.elapsed_ms += elapsed_ms;
        let tally = *tally;
        drop(progress);

        let mut plan = self.plan.lock().await;
        let Some(idx) = plan
            .steps
            .iter()
            .position(|s| s.is_open() && s.url_pattern == pattern)
        else {
            return;
        };
        plan.steps[idx].status = StepStatus::Running;

        if (tally.visits as f64) < plan.steps[idx].expected_value {
            return;
        }

        let result = StepResult {
            value: tally.visits as f64,
            articles_found: tally.articles,
            elapsed_ms: tally.elapsed_ms,
        };
        let ratio =
            apply_step_feedback(&mut plan, idx, result, self.planner.adaptive_branching());
        self.progress.lock().await.remove(&pattern);

        let mut feedback = self.feedback.lock().await;
        feedback.record_ratio(ratio);
        if feedback.should_replan() {
            if let Err(e) = self.planner.replan(&mut plan, &self.host, &self.scheme).await {
                log::warn!("replan for {} failed: {e}", self.host);
            } else {
                feedback.mark_replanned();
            }
        }
    }

    /// Report an abandoned URL; enough of these force a replan
    ///
    /// Lock order is plan, then feedback, matching `on_page_visited`.
    pub async fn on_page_abandoned(&self, url: &str) {
        let pattern = two_segment_pattern(url);
        let mut plan = self.plan.lock().await;
        let mut feedback = self.feedback.lock().await;
        feedback.note_backtrack();
        if feedback.should_replan() {
            // Fail the step the abandoned URL belonged to, if any
            if let Some(idx) = plan
                .steps
                .iter()
                .position(|s| s.is_open() && s.url_pattern == pattern)
            {
                plan.steps[idx].status = StepStatus::Failed;
            }
            if let Err(e) = self.planner.replan(&mut plan, &self.host, &self.scheme).await {
                log::warn!("replan for {} failed: {e}", self.host);
            } else {
                feedback.mark_replanned();
            }
        }
    }
}
