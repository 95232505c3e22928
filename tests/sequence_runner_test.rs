use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use newscrawl::events::EventBus;
use newscrawl::sequence::{
    OperationResolver, SequenceRequest, SequenceRunner, SequenceStep,
};

#[derive(Default)]
struct RecordingResolver {
    calls: Mutex<Vec<(String, Option<String>, Map<String, Value>)>>,
    fail_operations: Vec<String>,
}

impl OperationResolver for RecordingResolver {
    fn execute_operation<'a>(
        &'a self,
        operation: &'a str,
        start_url: Option<&'a str>,
        overrides: &'a Map<String, Value>,
    ) -> BoxFuture<'a, anyhow::Result<Value>> {
        Box::pin(async move {
            self.calls.lock().push((
                operation.to_string(),
                start_url.map(str::to_string),
                overrides.clone(),
            ));
            if self.fail_operations.iter().any(|f| f == operation) {
                anyhow::bail!("{operation} exploded");
            }
            Ok(json!({ "operation": operation }))
        })
    }
}

fn step(operation: &str) -> SequenceStep {
    SequenceStep {
        id: None,
        operation: operation.to_string(),
        start_url: None,
        overrides: Map::new(),
        continue_on_error: None,
    }
}

#[tokio::test]
async fn runs_steps_in_order_with_merged_overrides() {
    let resolver = Arc::new(RecordingResolver::default());
    let bus = Arc::new(EventBus::new(128));
    let runner = SequenceRunner::new(Arc::clone(&resolver) as Arc<dyn OperationResolver>, bus);

    let mut shared = Map::new();
    shared.insert("max_depth".to_string(), json!(2));
    shared.insert("max_pages".to_string(), json!(100));

    let mut second = step("ExploreCountryHubs");
    second.overrides.insert("max_pages".to_string(), json!(500));

    let result = runner
        .run(SequenceRequest {
            name: "test".to_string(),
            steps: vec![step("EnsureCountryHubs"), second],
            shared_overrides: shared,
            continue_on_error: false,
        })
        .await;

    assert!(result.ok);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].step_id, "step-1");

    let calls = resolver.calls.lock();
    assert_eq!(calls[0].0, "EnsureCountryHubs");
    // step override wins over shared
    assert_eq!(calls[1].2["max_pages"], json!(500));
    assert_eq!(calls[1].2["max_depth"], json!(2));
    assert_eq!(calls[0].2["max_pages"], json!(100));
}

#[tokio::test]
async fn stops_on_error_unless_continue_on_error() {
    let resolver = Arc::new(RecordingResolver {
        fail_operations: vec!["ExploreCountryHubs".to_string()],
        ..Default::default()
    });
    let bus = Arc::new(EventBus::new(128));
    let runner = SequenceRunner::new(Arc::clone(&resolver) as Arc<dyn OperationResolver>, bus);

    let request = SequenceRequest {
        name: "halts".to_string(),
        steps: vec![
            step("EnsureCountryHubs"),
            step("ExploreCountryHubs"),
            step("FindTopicHubs"),
        ],
        shared_overrides: Map::new(),
        continue_on_error: false,
    };
    let result = runner.run(request.clone()).await;
    assert!(!result.ok);
    assert_eq!(result.steps.len(), 2); // third never ran
    assert_eq!(result.steps[1].error.as_deref().map(|e| e.contains("exploded")), Some(true));

    // with continue_on_error all steps run
    let resolver = Arc::new(RecordingResolver {
        fail_operations: vec!["ExploreCountryHubs".to_string()],
        ..Default::default()
    });
    let bus = Arc::new(EventBus::new(128));
    let runner = SequenceRunner::new(Arc::clone(&resolver) as Arc<dyn OperationResolver>, bus);
    let mut request = request;
    request.continue_on_error = true;
    let result = runner.run(request).await;
    assert!(!result.ok);
    assert_eq!(result.steps.len(), 3);
    assert!(result.steps[2].ok);
}

#[tokio::test]
async fn abort_fails_current_step_and_returns() {
    let resolver = Arc::new(RecordingResolver::default());
    let bus = Arc::new(EventBus::new(128));
    let runner = SequenceRunner::new(Arc::clone(&resolver) as Arc<dyn OperationResolver>, bus);

    runner.control().abort();
    let result = runner
        .run(SequenceRequest {
            name: "aborted".to_string(),
            steps: vec![step("EnsureCountryHubs"), step("ExploreCountryHubs")],
            shared_overrides: Map::new(),
            continue_on_error: true,
        })
        .await;

    assert!(!result.ok);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].error.as_deref(), Some("aborted"));
    assert!(resolver.calls.lock().is_empty());
}

#[tokio::test]
async fn sequence_telemetry_is_emitted() {
    let resolver = Arc::new(RecordingResolver::default());
    let bus = Arc::new(EventBus::new(128));
    let mut rx = bus.subscribe();
    let runner = SequenceRunner::new(resolver as Arc<dyn OperationResolver>, bus);

    runner
        .run(SequenceRequest {
            name: "events".to_string(),
            steps: vec![step("FindTopicHubs")],
            shared_overrides: Map::new(),
            continue_on_error: false,
        })
        .await;

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec![
            "sequence:start",
            "step:start",
            "step:complete",
            "sequence:complete"
        ]
    );
}
