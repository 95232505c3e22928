//! Persisted planning heuristics and cross-domain pattern transfer
//!
//! A `planning_heuristics` row per domain aggregates pattern statistics
//! learned from completed crawls. Structurally similar hosts (shared
//! section-path tokens) can borrow those patterns at reduced confidence
//! before their own first crawl.

use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeSet;

use super::profile::section_tokens_of;

/// Confidence multiplier applied to transferred patterns
pub const TRANSFER_CONFIDENCE_FACTOR: f64 = 0.7;

/// Most similar hosts considered for transfer on job completion
pub const TRANSFER_HOST_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternStat {
    pub pattern: String,
    pub confidence: f64,
    pub avg_value: f64,
    pub sample_size: u32,
}

impl PatternStat {
    /// Seeding weight: confident patterns with history dominate
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.confidence * f64::from(self.sample_size.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicRecord {
    pub domain: String,
    pub patterns: Vec<PatternStat>,
    pub confidence: f64,
    pub sample_size: i64,
    pub avg_lookahead: f64,
    pub branching_factor: f64,
}

pub async fn load(pool: &SqlitePool, domain: &str) -> Result<Option<HeuristicRecord>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT domain, patterns, confidence, sample_size, avg_lookahead, branching_factor \
         FROM planning_heuristics WHERE domain = ?",
    )
    .bind(domain)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| {
        let patterns_json: String = r.get("patterns");
        let patterns = serde_json::from_str(&patterns_json).unwrap_or_default();
        HeuristicRecord {
            domain: r.get("domain"),
            patterns,
            confidence: r.get("confidence"),
            sample_size: r.get("sample_size"),
            avg_lookahead: r.get("avg_lookahead"),
            branching_factor: r.get("branching_factor"),
        }
    }))
}

pub async fn save(pool: &SqlitePool, record: &HeuristicRecord) -> Result<(), sqlx::Error> {
    let patterns_json = serde_json::to_string(&record.patterns).unwrap_or_else(|_| "[]".into());
    sqlx::query(
        "INSERT INTO planning_heuristics \
         (domain, patterns, confidence, sample_size, avg_lookahead, branching_factor, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(domain) DO UPDATE SET \
           patterns = excluded.patterns, \
           confidence = excluded.confidence, \
           sample_size = excluded.sample_size, \
           avg_lookahead = excluded.avg_lookahead, \
           branching_factor = excluded.branching_factor, \
           updated_at = excluded.updated_at",
    )
    .bind(&record.domain)
    .bind(&patterns_json)
    .bind(record.confidence)
    .bind(record.sample_size)
    .bind(record.avg_lookahead)
    .bind(record.branching_factor)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Update the global per-pattern performance row
pub async fn record_pattern_outcome(
    pool: &SqlitePool,
    pattern: &str,
    success: bool,
    value: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO pattern_performance (pattern, success_count, total_count, avg_value, last_used) \
         VALUES (?, ?, 1, ?, ?) \
         ON CONFLICT(pattern) DO UPDATE SET \
           success_count = success_count + excluded.success_count, \
           total_count = total_count + 1, \
           avg_value = (avg_value * total_count + excluded.avg_value) / (total_count + 1), \
           last_used = excluded.last_used",
    )
    .bind(pattern)
    .bind(i64::from(success))
    .bind(value)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Hosts that share at least one section token with `host`, most
/// overlapping first
pub async fn find_similar_hosts(
    pool: &SqlitePool,
    host: &str,
    host_tokens: &[String],
    limit: usize,
) -> Result<Vec<String>, sqlx::Error> {
    if host_tokens.is_empty() {
        return Ok(Vec::new());
    }
    let wanted: BTreeSet<&str> = host_tokens.iter().map(String::as_str).collect();
    let candidates: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT host FROM urls WHERE host != ? ORDER BY host LIMIT 50",
    )
    .bind(host)
    .fetch_all(pool)
    .await?;

    let mut scored: Vec<(usize, String)> = Vec::new();
    for candidate in candidates {
        let urls: Vec<String> =
            sqlx::query_scalar("SELECT url FROM urls WHERE host = ? ORDER BY id LIMIT 200")
                .bind(&candidate)
                .fetch_all(pool)
                .await?;
        let overlap = section_tokens_of(&urls)
            .iter()
            .filter(|t| wanted.contains(t.as_str()))
            .count();
        if overlap > 0 {
            scored.push((overlap, candidate));
        }
    }
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(scored.into_iter().take(limit).map(|(_, h)| h).collect())
}

/// Copy a source record's patterns onto hosts without their own record
///
/// Transferred rows carry `confidence * 0.7` and `sample_size = 0`.
pub async fn transfer_patterns(
    pool: &SqlitePool,
    source: &HeuristicRecord,
    targets: &[String],
) -> Result<usize, sqlx::Error> {
    let mut transferred = 0;
    for target in targets {
        if load(pool, target).await?.is_some() {
            continue;
        }
        let patterns: Vec<PatternStat> = source
            .patterns
            .iter()
            .map(|p| PatternStat {
                pattern: p.pattern.clone(),
                confidence: p.confidence * TRANSFER_CONFIDENCE_FACTOR,
                avg_value: p.avg_value,
                sample_size: 0,
            })
            .collect();
        let record = HeuristicRecord {
            domain: target.clone(),
            patterns,
            confidence: source.confidence * TRANSFER_CONFIDENCE_FACTOR,
            sample_size: 0,
            avg_lookahead: source.avg_lookahead,
            branching_factor: source.branching_factor,
        };
        save(pool, &record).await?;
        transferred += 1;
    }
    Ok(transferred)
}
