//! Condition types for decision-tree nodes
//!
//! Conditions are declared in JSON and evaluated deterministically
//! against a page context. Evaluation order inside compounds follows
//! declaration order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How `url_matches` patterns apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Pattern bounded by string edges or any of `/`, `-`, `?`, `#`
    #[default]
    Segment,
    Contains,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextField {
    Title,
    Description,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundOp {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// Right-hand side of a compare: literal, or another field scaled by a
/// multiplier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompareRhs {
    Dynamic {
        field: String,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
    Literal(serde_json::Value),
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    UrlMatches {
        patterns: Vec<String>,
        #[serde(default)]
        match_type: MatchType,
    },
    TextContains {
        field: TextField,
        patterns: Vec<String>,
    },
    Compare {
        field: String,
        operator: CompareOp,
        value: CompareRhs,
    },
    Compound {
        operator: CompoundOp,
        conditions: Vec<Condition>,
    },
    Flag {
        name: String,
    },
}

/// Inputs a tree evaluates against
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    pub description: String,
    /// Numeric/string fields for `compare` conditions
    pub fields: HashMap<String, serde_json::Value>,
    /// Boolean flags for `flag` conditions
    pub flags: HashMap<String, bool>,
}

impl PageContext {
    #[must_use]
    pub fn for_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    fn text(&self, field: TextField) -> &str {
        match field {
            TextField::Title => &self.title,
            TextField::Description => &self.description,
            TextField::Url => &self.url,
        }
    }
}

impl Condition {
    /// Evaluate against a page context. Deterministic: same inputs, same
    /// result.
    #[must_use]
    pub fn evaluate(&self, ctx: &PageContext) -> bool {
        match self {
            Self::UrlMatches {
                patterns,
                match_type,
            } => patterns
                .iter()
                .any(|p| url_pattern_matches(&ctx.url, p, *match_type)),

            Self::TextContains { field, patterns } => {
                let haystack = ctx.text(*field).to_lowercase();
                patterns
                    .iter()
                    .any(|p| haystack.contains(&p.to_lowercase()))
            }

            Self::Compare {
                field,
                operator,
                value,
            } => evaluate_compare(ctx, field, *operator, value),

            Self::Compound {
                operator,
                conditions,
            } => match operator {
                CompoundOp::And => conditions.iter().all(|c| c.evaluate(ctx)),
                CompoundOp::Or => conditions.iter().any(|c| c.evaluate(ctx)),
            },

            Self::Flag { name } => ctx.flags.get(name).copied().unwrap_or(false),
        }
    }

    /// Short form for audit trails
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::UrlMatches { match_type, .. } => format!("url_matches({match_type:?})"),
            Self::TextContains { field, .. } => format!("text_contains({field:?})"),
            Self::Compare {
                field, operator, ..
            } => format!("compare({field} {operator:?})"),
            Self::Compound {
                operator,
                conditions,
            } => format!("compound({operator:?}, {})", conditions.len()),
            Self::Flag { name } => format!("flag({name})"),
        }
    }
}

/// Delimiters bounding a segment match. Hyphen-delimited hits are
/// deliberately equivalent to slash-delimited ones.
const SEGMENT_DELIMITERS: [char; 4] = ['/', '-', '?', '#'];

fn is_segment_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => SEGMENT_DELIMITERS.contains(&c),
    }
}

fn url_pattern_matches(url: &str, pattern: &str, match_type: MatchType) -> bool {
    match match_type {
        MatchType::Contains => url.contains(pattern),
        MatchType::Regex => match regex::Regex::new(pattern) {
            Ok(re) => re.is_match(url),
            Err(e) => {
                log::warn!("invalid url_matches regex {pattern:?}: {e}");
                false
            }
        },
        MatchType::Segment => {
            if pattern.is_empty() {
                return false;
            }
            let mut search_from = 0;
            while let Some(pos) = url[search_from..].find(pattern) {
                let start = search_from + pos;
                let end = start + pattern.len();
                let before = url[..start].chars().next_back();
                let after = url[end..].chars().next();
                if is_segment_boundary(before) && is_segment_boundary(after) {
                    return true;
                }
                search_from = start + 1;
            }
            false
        }
    }
}

fn evaluate_compare(
    ctx: &PageContext,
    field: &str,
    operator: CompareOp,
    rhs: &CompareRhs,
) -> bool {
    let Some(lhs) = ctx.fields.get(field) else {
        return false;
    };

    let rhs_value: Option<serde_json::Value> = match rhs {
        CompareRhs::Literal(v) => Some(v.clone()),
        CompareRhs::Dynamic {
            field: rhs_field,
            multiplier,
        } => ctx
            .fields
            .get(rhs_field)
            .and_then(serde_json::Value::as_f64)
            .map(|v| serde_json::json!(v * multiplier)),
    };
    let Some(rhs_value) = rhs_value else {
        return false;
    };

    if let (Some(l), Some(r)) = (lhs.as_f64(), rhs_value.as_f64()) {
        return match operator {
            CompareOp::Eq => (l - r).abs() < f64::EPSILON,
            CompareOp::Ne => (l - r).abs() >= f64::EPSILON,
            CompareOp::Gt => l > r,
            CompareOp::Gte => l >= r,
            CompareOp::Lt => l < r,
            CompareOp::Lte => l <= r,
        };
    }
    if let (Some(l), Some(r)) = (lhs.as_str(), rhs_value.as_str()) {
        return match operator {
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
            CompareOp::Gt => l > r,
            CompareOp::Gte => l >= r,
            CompareOp::Lt => l < r,
            CompareOp::Lte => l <= r,
        };
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_matching_honors_delimiters() {
        let url = "http://a.test/the-long-read/x";
        assert!(url_pattern_matches(url, "long-read", MatchType::Segment));
        assert!(url_pattern_matches(url, "the-long-read", MatchType::Segment));
        assert!(url_pattern_matches(url, "long", MatchType::Segment));
        // embedded without delimiters does not match
        assert!(!url_pattern_matches(
            "http://a.test/thelongreadx",
            "long",
            MatchType::Segment
        ));
        assert!(url_pattern_matches(
            "http://a.test/page?long",
            "long",
            MatchType::Segment
        ));
    }

    #[test]
    fn contains_and_regex_match_types() {
        let url = "http://a.test/thelongread";
        assert!(url_pattern_matches(url, "longread", MatchType::Contains));
        assert!(url_pattern_matches(url, "the.*read", MatchType::Regex));
        assert!(!url_pattern_matches(url, "^longread", MatchType::Regex));
    }

    #[test]
    fn compare_with_dynamic_rhs() {
        let mut ctx = PageContext::for_url("http://a.test/");
        ctx.fields
            .insert("word_count".to_string(), serde_json::json!(1200.0));
        ctx.fields
            .insert("avg_words".to_string(), serde_json::json!(400.0));

        let condition = Condition::Compare {
            field: "word_count".to_string(),
            operator: CompareOp::Gt,
            value: CompareRhs::Dynamic {
                field: "avg_words".to_string(),
                multiplier: 2.0,
            },
        };
        assert!(condition.evaluate(&ctx));
    }

    #[test]
    fn compound_and_flag() {
        let mut ctx = PageContext::for_url("http://a.test/live/scores");
        ctx.flags.insert("is_hub".to_string(), true);

        let condition = Condition::Compound {
            operator: CompoundOp::And,
            conditions: vec![
                Condition::Flag {
                    name: "is_hub".to_string(),
                },
                Condition::UrlMatches {
                    patterns: vec!["live".to_string()],
                    match_type: MatchType::Segment,
                },
            ],
        };
        assert!(condition.evaluate(&ctx));

        ctx.flags.insert("is_hub".to_string(), false);
        assert!(!condition.evaluate(&ctx));
    }
}
