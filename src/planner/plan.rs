//! Plan, goal, and step types

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalType {
    DiscoverArticles,
    MapStructure,
    RefreshContent,
    GeographicCoverage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Goal {
    pub goal_type: GoalType,
    pub target: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Constraints {
    pub max_pages: Option<u64>,
    pub max_depth: Option<u16>,
    pub max_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// Walk hub pages for structure
    Explore,
    /// Gather article candidates
    Collect,
    /// Re-fetch known content
    Refresh,
    /// Sample unfamiliar path segments
    Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepResult {
    pub value: f64,
    pub articles_found: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub action: StepAction,
    /// Leading two path segments, e.g. `/world/africa`
    pub url_pattern: String,
    pub expected_value: f64,
    pub priority: i32,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StepResult>,
}

impl PlanStep {
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.status, StepStatus::Pending | StepStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlPlan {
    pub goals: Vec<Goal>,
    pub constraints: Constraints,
    pub priorities: Vec<String>,
    pub seeds: Vec<String>,
    pub steps: Vec<PlanStep>,
    /// Set once the plan has been merged with a mid-run replan
    #[serde(default)]
    pub recomputed: bool,
}

impl CrawlPlan {
    #[must_use]
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Done | StepStatus::Failed))
            .count()
    }

    #[must_use]
    pub fn open_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.is_open()).count()
    }
}

/// Leading two path segments of a URL (`/world/africa/x` -> `/world/africa`)
#[must_use]
pub fn two_segment_pattern(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.len() {
        0 => "/".to_string(),
        1 => format!("/{}", segments[0]),
        _ => format!("/{}/{}", segments[0], segments[1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_segment_pattern_truncates_path() {
        assert_eq!(
            two_segment_pattern("https://a.test/world/africa/story-1"),
            "/world/africa"
        );
        assert_eq!(two_segment_pattern("https://a.test/world"), "/world");
        assert_eq!(two_segment_pattern("https://a.test/"), "/");
    }
}
