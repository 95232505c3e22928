//! JSON-configured boolean decision-tree classifier
//!
//! Each category owns a tree of branch nodes (condition + yes/no
//! children) terminating in leaves. Evaluation is deterministic and in
//! declared node order; every run records the branch choices taken, both
//! as a full audit path and as a compact encoded form that replays to an
//! identical classification.

pub mod condition;

use serde::{Deserialize, Serialize};

pub use condition::{
    CompareOp, CompareRhs, CompoundOp, Condition, MatchType, PageContext, TextField,
};

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classifier config failed to parse: {0}")]
    BadConfig(#[from] serde_json::Error),
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeafResult {
    Match,
    NoMatch,
}

/// A tree node: either a branch with a condition or a terminal leaf
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Branch {
        id: String,
        condition: Condition,
        yes: Box<Node>,
        no: Box<Node>,
    },
    Leaf {
        result: LeafResult,
        confidence: f64,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTree {
    pub id: String,
    pub root: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub categories: Vec<CategoryTree>,
}

/// One (page, category) verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category_id: String,
    pub matched: bool,
    pub confidence: f64,
    pub reason: String,
    /// Compact replayable branch trace, e.g. `root:Y,depth:N`
    pub encoded_path: String,
}

/// One step of the full audit trail
#[derive(Debug, Clone, Serialize)]
pub struct AuditStep {
    pub node_id: String,
    pub condition: String,
    pub result: bool,
    pub branch: &'static str,
}

pub struct DecisionTreeClassifier {
    config: ClassifierConfig,
}

impl DecisionTreeClassifier {
    pub fn from_config(config: &serde_json::Value) -> Result<Self, ClassifyError> {
        let config: ClassifierConfig = serde_json::from_value(config.clone())?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn from_parsed(config: ClassifierConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn category_ids(&self) -> Vec<&str> {
        self.config
            .categories
            .iter()
            .map(|c| c.id.as_str())
            .collect()
    }

    /// Evaluate one category against a page
    pub fn evaluate(
        &self,
        category_id: &str,
        ctx: &PageContext,
    ) -> Result<Classification, ClassifyError> {
        let tree = self
            .config
            .categories
            .iter()
            .find(|c| c.id == category_id)
            .ok_or_else(|| ClassifyError::UnknownCategory(category_id.to_string()))?;
        Ok(self.walk(tree, ctx).0)
    }

    /// Evaluate with the full audit trail
    pub fn evaluate_with_audit(
        &self,
        category_id: &str,
        ctx: &PageContext,
    ) -> Result<(Classification, Vec<AuditStep>), ClassifyError> {
        let tree = self
            .config
            .categories
            .iter()
            .find(|c| c.id == category_id)
            .ok_or_else(|| ClassifyError::UnknownCategory(category_id.to_string()))?;
        Ok(self.walk(tree, ctx))
    }

    /// Every category's verdict, in declaration order
    #[must_use]
    pub fn evaluate_all(&self, ctx: &PageContext) -> Vec<Classification> {
        self.config
            .categories
            .iter()
            .map(|tree| self.walk(tree, ctx).0)
            .collect()
    }

    /// Only the categories that matched
    #[must_use]
    pub fn get_matches(&self, ctx: &PageContext) -> Vec<Classification> {
        self.evaluate_all(ctx)
            .into_iter()
            .filter(|c| c.matched)
            .collect()
    }

    fn walk(&self, tree: &CategoryTree, ctx: &PageContext) -> (Classification, Vec<AuditStep>) {
        let mut audit = Vec::new();
        let mut encoded = Vec::new();
        let mut node = &tree.root;

        loop {
            match node {
                Node::Branch {
                    id,
                    condition,
                    yes,
                    no,
                } => {
                    let result = condition.evaluate(ctx);
                    audit.push(AuditStep {
                        node_id: id.clone(),
                        condition: condition.summary(),
                        result,
                        branch: if result { "yes" } else { "no" },
                    });
                    encoded.push(format!(
                        "{}:{}",
                        strip_category_prefix(id, &tree.id),
                        if result { 'Y' } else { 'N' }
                    ));
                    node = if result { yes } else { no };
                }
                Node::Leaf {
                    result,
                    confidence,
                    reason,
                } => {
                    let classification = Classification {
                        category_id: tree.id.clone(),
                        matched: *result == LeafResult::Match,
                        confidence: *confidence,
                        reason: reason.clone(),
                        encoded_path: encoded.join(","),
                    };
                    return (classification, audit);
                }
            }
        }
    }
}

/// Node ids conventionally carry their category as a prefix; the encoded
/// path drops it for compactness
fn strip_category_prefix<'a>(node_id: &'a str, category_id: &str) -> &'a str {
    node_id
        .strip_prefix(category_id)
        .and_then(|rest| rest.strip_prefix('-'))
        .unwrap_or(node_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_depth_config() -> serde_json::Value {
        serde_json::json!({
            "categories": [{
                "id": "in-depth",
                "root": {
                    "id": "root",
                    "condition": {
                        "type": "url_matches",
                        "patterns": ["long-read"],
                        "match_type": "segment"
                    },
                    "yes": { "result": "match", "confidence": 0.9, "reason": "url-pattern-long-read" },
                    "no": { "result": "no-match", "confidence": 0.6, "reason": "no-structural-signal" }
                }
            }]
        })
    }

    #[test]
    fn long_read_page_matches_with_stable_path() {
        let classifier = DecisionTreeClassifier::from_config(&in_depth_config()).unwrap();
        let ctx = PageContext::for_url("http://a.test/long-read/x");

        let first = classifier.evaluate("in-depth", &ctx).unwrap();
        assert!(first.matched);
        assert_eq!(first.confidence, 0.9);
        assert_eq!(first.reason, "url-pattern-long-read");
        assert_eq!(first.encoded_path, "root:Y");

        let second = classifier.evaluate("in-depth", &ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn changed_tree_changes_encoded_path() {
        let mut config = in_depth_config();
        config["categories"][0]["root"]["condition"]["patterns"] =
            serde_json::json!(["explainer"]);
        let classifier = DecisionTreeClassifier::from_config(&config).unwrap();
        let ctx = PageContext::for_url("http://a.test/long-read/x");

        let result = classifier.evaluate("in-depth", &ctx).unwrap();
        assert!(!result.matched);
        assert_eq!(result.encoded_path, "root:N");
    }

    #[test]
    fn category_prefixed_node_ids_are_compacted() {
        let config = serde_json::json!({
            "categories": [{
                "id": "live",
                "root": {
                    "id": "live-root",
                    "condition": { "type": "url_matches", "patterns": ["live"] },
                    "yes": { "result": "match", "confidence": 0.8, "reason": "live-url" },
                    "no": { "result": "no-match", "confidence": 0.5, "reason": "not-live" }
                }
            }]
        });
        let classifier = DecisionTreeClassifier::from_config(&config).unwrap();
        let ctx = PageContext::for_url("http://a.test/live/scores");
        let result = classifier.evaluate("live", &ctx).unwrap();
        assert_eq!(result.encoded_path, "root:Y");
    }

    #[test]
    fn get_matches_filters_unmatched() {
        let classifier = DecisionTreeClassifier::from_config(&in_depth_config()).unwrap();
        assert_eq!(
            classifier
                .get_matches(&PageContext::for_url("http://a.test/long-read/x"))
                .len(),
            1
        );
        assert!(
            classifier
                .get_matches(&PageContext::for_url("http://a.test/sports/x"))
                .is_empty()
        );
    }
}
