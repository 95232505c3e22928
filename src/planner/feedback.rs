//! Step feedback and replanning policy
//!
//! Step outcomes feed a running performance ratio. Strong steps boost
//! similar future steps, weak ones penalize them, and sustained
//! deviation from expectations (or enough backtracks, or a step-count
//! interval) triggers a replan of the remaining steps, at most once per
//! minimum gap.

use std::time::{Duration, Instant};

use super::plan::{CrawlPlan, PlanStep, StepResult, StepStatus};

/// Mean-ratio deviation from 1.0 that triggers a replan (a.k.a. 40%)
pub const REPLAN_DEVIATION_THRESHOLD: f64 = 0.4;
/// Replan every N completed steps regardless of performance
pub const REPLAN_STEP_INTERVAL: u64 = 100;
/// Backtracks tolerated before a replan
pub const REPLAN_MAX_BACKTRACKS: u32 = 5;
/// Minimum spacing between replans
pub const REPLAN_MIN_GAP: Duration = Duration::from_secs(60);

/// Priority boost for similar steps when a step over-performs (ratio > 1.5)
pub const SIMILAR_STEP_BOOST: i32 = 20;
/// Priority penalty when a step under-performs (ratio < 0.5)
pub const SIMILAR_STEP_PENALTY: i32 = -15;
pub const OVERPERFORM_RATIO: f64 = 1.5;
pub const UNDERPERFORM_RATIO: f64 = 0.5;

/// Running feedback across one plan's execution
#[derive(Debug, Default)]
pub struct FeedbackState {
    ratios: Vec<f64>,
    steps_completed: u64,
    backtracks: u32,
    last_replan: Option<Instant>,
}

impl FeedbackState {
    pub fn record_ratio(&mut self, ratio: f64) {
        self.ratios.push(ratio);
        self.steps_completed += 1;
    }

    pub fn note_backtrack(&mut self) {
        self.backtracks += 1;
    }

    #[must_use]
    pub fn steps_completed(&self) -> u64 {
        self.steps_completed
    }

    #[must_use]
    pub fn mean_ratio(&self) -> f64 {
        if self.ratios.is_empty() {
            return 1.0;
        }
        self.ratios.iter().sum::<f64>() / self.ratios.len() as f64
    }

    /// Whether a replan is due, honoring the minimum gap
    #[must_use]
    pub fn should_replan(&self) -> bool {
        if let Some(last) = self.last_replan
            && last.elapsed() < REPLAN_MIN_GAP
        {
            return false;
        }
        let interval_due =
            self.steps_completed > 0 && self.steps_completed % REPLAN_STEP_INTERVAL == 0;
        let deviation_due = (self.mean_ratio() - 1.0).abs() > REPLAN_DEVIATION_THRESHOLD
            && !self.ratios.is_empty();
        let backtracks_due = self.backtracks > REPLAN_MAX_BACKTRACKS;
        interval_due || deviation_due || backtracks_due
    }

    pub fn mark_replanned(&mut self) {
        self.last_replan = Some(Instant::now());
        self.backtracks = 0;
        self.ratios.clear();
    }
}

/// Record a step's result on the plan and nudge similar future steps
///
/// Returns the achieved/expected ratio.
pub fn apply_step_feedback(
    plan: &mut CrawlPlan,
    step_idx: usize,
    result: StepResult,
    adaptive_branching: bool,
) -> f64 {
    let (action, pattern, expected) = {
        let Some(step) = plan.steps.get_mut(step_idx) else {
            return 1.0;
        };
        step.status = StepStatus::Done;
        step.result = Some(result);
        (step.action, step.url_pattern.clone(), step.expected_value)
    };

    let ratio = if expected > 0.0 {
        result.value / expected
    } else {
        1.0
    };

    if adaptive_branching {
        let nudge = if ratio > OVERPERFORM_RATIO {
            SIMILAR_STEP_BOOST
        } else if ratio < UNDERPERFORM_RATIO {
            SIMILAR_STEP_PENALTY
        } else {
            0
        };
        if nudge != 0 {
            for (idx, step) in plan.steps.iter_mut().enumerate() {
                if idx != step_idx
                    && step.is_open()
                    && step.action == action
                    && step.url_pattern == pattern
                {
                    step.priority += nudge;
                }
            }
        }
    }

    ratio
}

/// Merge a fresh plan over the remaining steps of the old one
///
/// Completed steps keep their order and identifiers; open steps are
/// replaced wholesale. The merged plan is flagged `recomputed`.
#[must_use]
pub fn merge_plans(old: &CrawlPlan, new_steps: Vec<PlanStep>) -> CrawlPlan {
    let mut merged = old.clone();
    let mut steps: Vec<PlanStep> = old
        .steps
        .iter()
        .filter(|s| !s.is_open())
        .cloned()
        .collect();
    let existing: std::collections::HashSet<String> =
        steps.iter().map(|s| s.id.clone()).collect();
    steps.extend(new_steps.into_iter().filter(|s| !existing.contains(&s.id)));
    merged.steps = steps;
    merged.recomputed = true;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan::StepAction;

    fn step(id: &str, pattern: &str, status: StepStatus) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            action: StepAction::Explore,
            url_pattern: pattern.to_string(),
            expected_value: 10.0,
            priority: 50,
            status,
            result: None,
        }
    }

    fn plan(steps: Vec<PlanStep>) -> CrawlPlan {
        CrawlPlan {
            goals: Vec::new(),
            constraints: Default::default(),
            priorities: Vec::new(),
            seeds: Vec::new(),
            steps,
            recomputed: false,
        }
    }

    #[test]
    fn overperforming_step_boosts_similar_pending_steps() {
        let mut p = plan(vec![
            step("s1", "/world/africa", StepStatus::Running),
            step("s2", "/world/africa", StepStatus::Pending),
            step("s3", "/sports/nba", StepStatus::Pending),
        ]);
        let ratio = apply_step_feedback(
            &mut p,
            0,
            StepResult {
                value: 20.0,
                articles_found: 20,
                elapsed_ms: 100,
            },
            true,
        );
        assert!(ratio > OVERPERFORM_RATIO);
        assert_eq!(p.steps[1].priority, 50 + SIMILAR_STEP_BOOST);
        assert_eq!(p.steps[2].priority, 50); // different pattern untouched
    }

    #[test]
    fn underperforming_step_penalizes_similar_steps() {
        let mut p = plan(vec![
            step("s1", "/world/africa", StepStatus::Running),
            step("s2", "/world/africa", StepStatus::Pending),
        ]);
        apply_step_feedback(
            &mut p,
            0,
            StepResult {
                value: 2.0,
                articles_found: 0,
                elapsed_ms: 100,
            },
            true,
        );
        assert_eq!(p.steps[1].priority, 50 + SIMILAR_STEP_PENALTY);
    }

    #[test]
    fn adaptive_branching_off_leaves_priorities_alone() {
        let mut p = plan(vec![
            step("s1", "/world/africa", StepStatus::Running),
            step("s2", "/world/africa", StepStatus::Pending),
        ]);
        apply_step_feedback(
            &mut p,
            0,
            StepResult {
                value: 30.0,
                articles_found: 5,
                elapsed_ms: 50,
            },
            false,
        );
        assert_eq!(p.steps[1].priority, 50);
    }

    #[test]
    fn merge_preserves_completed_and_replaces_open() {
        let mut done = step("s1", "/world/a", StepStatus::Done);
        done.result = Some(StepResult {
            value: 12.0,
            articles_found: 3,
            elapsed_ms: 10,
        });
        let old = plan(vec![done, step("s2", "/world/b", StepStatus::Pending)]);

        let merged = merge_plans(
            &old,
            vec![step("s9", "/sports/x", StepStatus::Pending)],
        );
        assert!(merged.recomputed);
        assert_eq!(merged.steps.len(), 2);
        assert_eq!(merged.steps[0].id, "s1");
        assert!(merged.steps[0].result.is_some());
        assert_eq!(merged.steps[1].id, "s9");
    }

    #[test]
    fn replan_triggers_on_deviation_and_backtracks() {
        let mut state = FeedbackState::default();
        assert!(!state.should_replan());

        state.record_ratio(0.2);
        state.record_ratio(0.3);
        assert!(state.should_replan()); // mean deviates > 0.4 from 1.0

        state.mark_replanned();
        assert!(!state.should_replan()); // min gap holds

        let mut by_backtracks = FeedbackState::default();
        for _ in 0..=REPLAN_MAX_BACKTRACKS {
            by_backtracks.note_backtrack();
        }
        assert!(by_backtracks.should_replan());
    }
}
