//! Declarative step-sequence execution
//!
//! A sequence is an ordered list of steps naming catalog operations with
//! optional per-step overrides. The runner merges overrides, resolves
//! the operation through a pluggable resolver, supports cooperative
//! pause/resume between steps and abort, and emits sequence/step
//! telemetry throughout.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::crawl_engine::CrawlControl;
use crate::events::{CrawlEvent, EventBus};

/// Resolves and executes one named operation
pub trait OperationResolver: Send + Sync {
    fn execute_operation<'a>(
        &'a self,
        operation: &'a str,
        start_url: Option<&'a str>,
        overrides: &'a Map<String, Value>,
    ) -> BoxFuture<'a, anyhow::Result<Value>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    #[serde(default)]
    pub id: Option<String>,
    pub operation: String,
    #[serde(default)]
    pub start_url: Option<String>,
    #[serde(default)]
    pub overrides: Map<String, Value>,
    #[serde(default)]
    pub continue_on_error: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceRequest {
    #[serde(default)]
    pub name: String,
    pub steps: Vec<SequenceStep>,
    #[serde(default)]
    pub shared_overrides: Map<String, Value>,
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub ok: bool,
    pub step_id: String,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceResult {
    pub ok: bool,
    pub steps: Vec<StepOutcome>,
    pub elapsed_ms: u64,
}

pub struct SequenceRunner {
    resolver: Arc<dyn OperationResolver>,
    bus: Arc<EventBus>,
    control: Arc<CrawlControl>,
}

impl SequenceRunner {
    #[must_use]
    pub fn new(resolver: Arc<dyn OperationResolver>, bus: Arc<EventBus>) -> Self {
        Self {
            resolver,
            bus,
            control: Arc::new(CrawlControl::default()),
        }
    }

    /// Pause/resume/abort handle; suspension happens between steps
    #[must_use]
    pub fn control(&self) -> Arc<CrawlControl> {
        Arc::clone(&self.control)
    }

    pub async fn run(&self, request: SequenceRequest) -> SequenceResult {
        let started = Instant::now();
        self.bus.publish(CrawlEvent::SequenceStarted {
            sequence: request.name.clone(),
            steps: request.steps.len(),
            timestamp: chrono::Utc::now(),
        });

        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(request.steps.len());
        for (index, step) in request.steps.iter().enumerate() {
            // Cooperative suspension point between steps
            self.control.checkpoint().await;

            let step_id = step
                .id
                .clone()
                .unwrap_or_else(|| format!("step-{}", index + 1));

            if self.control.is_aborted() {
                outcomes.push(StepOutcome {
                    ok: false,
                    step_id: step_id.clone(),
                    operation: step.operation.clone(),
                    result: None,
                    error: Some("aborted".to_string()),
                    elapsed_ms: 0,
                });
                self.bus.publish(CrawlEvent::StepError {
                    step_id,
                    operation: step.operation.clone(),
                    error: "aborted".to_string(),
                    timestamp: chrono::Utc::now(),
                });
                break;
            }

            self.bus.publish(CrawlEvent::StepStarted {
                step_id: step_id.clone(),
                operation: step.operation.clone(),
                timestamp: chrono::Utc::now(),
            });

            // shared < step precedence
            let mut merged = request.shared_overrides.clone();
            for (key, value) in &step.overrides {
                merged.insert(key.clone(), value.clone());
            }

            let step_started = Instant::now();
            let executed = self
                .resolver
                .execute_operation(&step.operation, step.start_url.as_deref(), &merged)
                .await;
            let elapsed_ms = step_started.elapsed().as_millis() as u64;

            match executed {
                Ok(result) => {
                    self.bus.publish(CrawlEvent::StepCompleted {
                        step_id: step_id.clone(),
                        operation: step.operation.clone(),
                        elapsed_ms,
                        timestamp: chrono::Utc::now(),
                    });
                    outcomes.push(StepOutcome {
                        ok: true,
                        step_id,
                        operation: step.operation.clone(),
                        result: Some(result),
                        error: None,
                        elapsed_ms,
                    });
                }
                Err(error) => {
                    let message = format!("{error:#}");
                    log::warn!("step {step_id} ({}) failed: {message}", step.operation);
                    self.bus.publish(CrawlEvent::StepError {
                        step_id: step_id.clone(),
                        operation: step.operation.clone(),
                        error: message.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                    outcomes.push(StepOutcome {
                        ok: false,
                        step_id,
                        operation: step.operation.clone(),
                        result: None,
                        error: Some(message),
                        elapsed_ms,
                    });
                    let keep_going = step
                        .continue_on_error
                        .unwrap_or(request.continue_on_error);
                    if !keep_going {
                        break;
                    }
                }
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.ok).count();
        let failed = outcomes.len() - succeeded;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.bus.publish(CrawlEvent::SequenceCompleted {
            sequence: request.name,
            succeeded,
            failed,
            elapsed_ms,
            timestamp: chrono::Utc::now(),
        });

        SequenceResult {
            ok: failed == 0,
            steps: outcomes,
            elapsed_ms,
        }
    }
}
