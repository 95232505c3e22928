//! Domain profiling from persisted history
//!
//! The profile drives adaptive plan sizing: how far ahead to plan
//! (lookahead) and how wide (branching), from how much of the host we
//! have seen before and how sectioned it is.

use sqlx::sqlite::SqlitePool;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct DomainProfile {
    pub page_count: u64,
    pub hub_type_count: u64,
    pub complexity: f64,
    /// Canonical leading path segments observed for the host
    pub section_tokens: Vec<String>,
}

/// Sample cap when deriving section tokens from stored URLs
const PROFILE_URL_SAMPLE: i64 = 5_000;

pub async fn profile_domain(pool: &SqlitePool, host: &str) -> Result<DomainProfile, sqlx::Error> {
    let page_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM urls WHERE host = ?")
        .bind(host)
        .fetch_one(pool)
        .await?;

    let urls: Vec<String> =
        sqlx::query_scalar("SELECT url FROM urls WHERE host = ? ORDER BY id LIMIT ?")
            .bind(host)
            .bind(PROFILE_URL_SAMPLE)
            .fetch_all(pool)
            .await?;

    let section_tokens = section_tokens_of(&urls);
    let hub_type_count = section_tokens.len() as u64;
    let complexity = ((page_count as f64 + 10.0).log10() * hub_type_count as f64) / 5.0;

    Ok(DomainProfile {
        page_count: page_count as u64,
        hub_type_count,
        complexity,
        section_tokens,
    })
}

/// Distinct leading path segments, sorted for determinism
#[must_use]
pub fn section_tokens_of(urls: &[String]) -> Vec<String> {
    let mut tokens = BTreeSet::new();
    for url in urls {
        if let Ok(parsed) = url::Url::parse(url)
            && let Some(first) = parsed.path().split('/').find(|s| !s.is_empty())
        {
            tokens.insert(first.to_string());
        }
    }
    tokens.into_iter().collect()
}

/// Plan depth from history size
#[must_use]
pub fn lookahead_for(page_count: u64) -> usize {
    if page_count < 1_000 {
        3
    } else if page_count < 10_000 {
        5
    } else {
        7
    }
}

/// Plan width from structural richness
#[must_use]
pub fn branches_for(hub_type_count: u64, complexity: f64) -> usize {
    if hub_type_count < 5 || complexity < 3.0 {
        5
    } else if hub_type_count < 15 || complexity < 8.0 {
        10
    } else {
        15
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_tokens_are_distinct_and_sorted() {
        let urls = vec![
            "https://a.test/world/x".to_string(),
            "https://a.test/world/y".to_string(),
            "https://a.test/sports/z".to_string(),
        ];
        assert_eq!(section_tokens_of(&urls), vec!["sports", "world"]);
    }

    #[test]
    fn adaptive_sizing_thresholds() {
        assert_eq!(lookahead_for(100), 3);
        assert_eq!(lookahead_for(5_000), 5);
        assert_eq!(lookahead_for(50_000), 7);

        assert_eq!(branches_for(2, 10.0), 5);
        assert_eq!(branches_for(10, 5.0), 10);
        assert_eq!(branches_for(20, 9.0), 15);
    }
}
