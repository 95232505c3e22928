//! Sequence configuration files
//!
//! JSON or YAML files describing a step sequence. The loader validates
//! structure, resolves `@namespace.key` tokens through the registered
//! resolvers, and hands a normalized [`SequenceRequest`] to the runner.
//! Token resolution happens before override merging.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::runner::{SequenceRequest, SequenceStep};

pub const SUPPORTED_VERSION: &str = "1";

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("sequence file failed to parse: {0}")]
    Parse(String),
    #[error("unsupported sequence version {0:?} (expected {SUPPORTED_VERSION:?})")]
    UnsupportedVersion(String),
    #[error("sequence has no steps")]
    NoSteps,
    #[error("unresolved-token: {0}")]
    UnresolvedToken(String),
}

/// Resolves one token namespace (`playbook`, `config`, `cli`, ...)
pub trait TokenResolver: Send + Sync {
    fn namespace(&self) -> &str;
    fn resolve(&self, key: &str) -> Option<String>;
}

/// Map-backed resolver, the common case for `@config.*` and `@cli.*`
pub struct StaticTokenResolver {
    namespace: String,
    values: HashMap<String, String>,
}

impl StaticTokenResolver {
    #[must_use]
    pub fn new(namespace: &str, values: HashMap<String, String>) -> Self {
        Self {
            namespace: namespace.to_string(),
            values,
        }
    }
}

impl TokenResolver for StaticTokenResolver {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn resolve(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

// Files are accepted in both snake_case and camelCase key styles
#[derive(Debug, Deserialize)]
struct SequenceFile {
    version: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    host: Option<String>,
    #[serde(default, alias = "startUrl")]
    start_url: Option<String>,
    #[serde(default, alias = "sharedOverrides")]
    shared_overrides: Option<Map<String, Value>>,
    #[serde(default, alias = "continueOnError")]
    continue_on_error: Option<bool>,
    steps: Vec<SequenceFileStep>,
}

#[derive(Debug, Deserialize)]
struct SequenceFileStep {
    operation: String,
    #[serde(default, alias = "startUrl")]
    start_url: Option<String>,
    #[serde(default)]
    overrides: Option<Map<String, Value>>,
    #[serde(default, alias = "continueOnError")]
    continue_on_error: Option<bool>,
}

#[derive(Default)]
pub struct SequenceConfigLoader {
    resolvers: Vec<Arc<dyn TokenResolver>>,
}

impl SequenceConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TokenResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Load and normalize a sequence file
    pub fn load(&self, path: &Path) -> Result<SequenceRequest, LoaderError> {
        let raw = std::fs::read_to_string(path)?;
        let file = parse_sequence(path, &raw)?;
        if file.version != SUPPORTED_VERSION {
            return Err(LoaderError::UnsupportedVersion(file.version));
        }
        if file.steps.is_empty() {
            return Err(LoaderError::NoSteps);
        }

        let default_start = match &file.start_url {
            Some(url) => Some(self.resolve_string(url)?),
            None => None,
        };
        let shared_overrides = self.resolve_map(file.shared_overrides.unwrap_or_default())?;

        let mut steps = Vec::with_capacity(file.steps.len());
        for (index, step) in file.steps.into_iter().enumerate() {
            let start_url = match &step.start_url {
                Some(url) => Some(self.resolve_string(url)?),
                None => default_start.clone(),
            };
            steps.push(SequenceStep {
                id: Some(format!("step-{}", index + 1)),
                operation: step.operation,
                start_url,
                overrides: self.resolve_map(step.overrides.unwrap_or_default())?,
                continue_on_error: step.continue_on_error,
            });
        }

        let name = file.name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "sequence".to_string())
        });

        Ok(SequenceRequest {
            name,
            steps,
            shared_overrides,
            continue_on_error: file.continue_on_error.unwrap_or(false),
        })
    }

    /// Resolve `@namespace.key` through the registered resolvers
    fn resolve_string(&self, value: &str) -> Result<String, LoaderError> {
        let Some(token) = value.strip_prefix('@') else {
            return Ok(value.to_string());
        };
        let Some((namespace, key)) = token.split_once('.') else {
            return Err(LoaderError::UnresolvedToken(value.to_string()));
        };
        self.resolvers
            .iter()
            .find(|r| r.namespace() == namespace)
            .and_then(|r| r.resolve(key))
            .ok_or_else(|| LoaderError::UnresolvedToken(value.to_string()))
    }

    fn resolve_map(&self, map: Map<String, Value>) -> Result<Map<String, Value>, LoaderError> {
        let mut resolved = Map::with_capacity(map.len());
        for (key, value) in map {
            let value = match value {
                Value::String(s) => Value::String(self.resolve_string(&s)?),
                other => other,
            };
            resolved.insert(key, value);
        }
        Ok(resolved)
    }
}

fn parse_sequence(path: &Path, raw: &str) -> Result<SequenceFile, LoaderError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("json") => serde_json::from_str(raw).map_err(|e| LoaderError::Parse(e.to_string())),
        Some("yaml" | "yml") => {
            serde_yaml::from_str(raw).map_err(|e| LoaderError::Parse(e.to_string()))
        }
        _ => serde_json::from_str(raw)
            .or_else(|_| serde_yaml::from_str(raw))
            .map_err(|e: serde_yaml::Error| LoaderError::Parse(e.to_string())),
    }
}
