//! Override application for sequence and operation presets
//!
//! Sequence steps and operation presets carry loosely-typed override maps.
//! `apply_overrides` folds one map into a config clone; callers layer maps
//! in precedence order (global < preset < shared < step).

use serde_json::Value;

use super::types::{CrawlConfig, UseCase};

impl CrawlConfig {
    /// Produce a copy of this config with the given overrides applied
    ///
    /// Unknown keys are logged and skipped; a step must not fail because a
    /// playbook mentions a knob this build does not have.
    #[must_use]
    pub fn apply_overrides(&self, overrides: &serde_json::Map<String, Value>) -> CrawlConfig {
        let mut config = self.clone();
        for (key, value) in overrides {
            if !config.apply_override(key, value) {
                log::warn!("ignoring unknown config override {key:?}");
            }
        }
        config
    }

    fn apply_override(&mut self, key: &str, value: &Value) -> bool {
        match key {
            "start_url" => set_string(value, |v| self.start_url = v),
            "user_agent" => set_string(value, |v| self.user_agent = v),
            "stay_on_domain" => set_bool(value, |v| self.stay_on_domain = v),
            "skip_query_urls" => set_bool(value, |v| self.skip_query_urls = v),
            "respect_robots" => set_bool(value, |v| self.respect_robots = v),
            "max_depth" => set_u64(value, |v| self.max_depth = v as u16),
            "max_pages" => match value {
                Value::Null => {
                    self.max_pages = None;
                    true
                }
                _ => set_u64(value, |v| self.max_pages = Some(v)),
            },
            "concurrent_workers" => set_u64(value, |v| self.concurrent_workers = (v as usize).max(1)),
            "requests_per_minute" => set_f64(value, |v| self.requests_per_minute = v),
            "burst_size" => set_f64(value, |v| self.burst_size = v),
            "request_timeout_ms" => set_u64(value, |v| self.request_timeout_ms = v),
            "read_timeout_ms" => set_u64(value, |v| self.read_timeout_ms = v),
            "token_wait_max_ms" => set_u64(value, |v| self.token_wait_max_ms = v),
            "max_retries" => set_u64(value, |v| self.max_retries = v.min(u64::from(u8::MAX)) as u8),
            "throttle_duration_ms" => set_u64(value, |v| self.throttle_duration_ms = v),
            "host_max_errors" => set_u64(value, |v| self.host_max_errors = v as u32),
            "host_window_ms" => set_u64(value, |v| self.host_window_ms = v),
            "host_lockout_ms" => set_u64(value, |v| self.host_lockout_ms = v),
            "cache_freshness_hours" => set_u64(value, |v| self.cache_freshness_hours = v as i64),
            "adaptive_sizing" => set_bool(value, |v| self.adaptive_sizing = v),
            "adaptive_branching" => set_bool(value, |v| self.adaptive_branching = v),
            "cross_domain_sharing" => set_bool(value, |v| self.cross_domain_sharing = v),
            "max_links_per_page" => set_u64(value, |v| self.max_links_per_page = v as usize),
            "use_case" => match value.as_str() {
                Some("realtime") => {
                    self.use_case = UseCase::Realtime;
                    true
                }
                Some("standard") => {
                    self.use_case = UseCase::Standard;
                    true
                }
                Some("high") => {
                    self.use_case = UseCase::High;
                    true
                }
                Some("archival") => {
                    self.use_case = UseCase::Archival;
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }
}

fn set_string(value: &Value, mut apply: impl FnMut(String)) -> bool {
    match value.as_str() {
        Some(s) => {
            apply(s.to_string());
            true
        }
        None => false,
    }
}

fn set_bool(value: &Value, mut apply: impl FnMut(bool)) -> bool {
    match value.as_bool() {
        Some(b) => {
            apply(b);
            true
        }
        None => false,
    }
}

fn set_u64(value: &Value, mut apply: impl FnMut(u64)) -> bool {
    match value.as_u64() {
        Some(v) => {
            apply(v);
            true
        }
        None => false,
    }
}

fn set_f64(value: &Value, mut apply: impl FnMut(f64)) -> bool {
    match value.as_f64() {
        Some(v) => {
            apply(v);
            true
        }
        None => false,
    }
}
