//! End-to-end runs of small pipelines through the public API.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use streamweave_plan::api::{create_execution_plan, execute_pipeline, execute_plan};
use streamweave_plan::config::RunConfig;
use streamweave_plan::definition::{GraphBuilder, PipelineDefinition};
use streamweave_plan::engine::RunContext;
use streamweave_plan::error::PlanError;
use streamweave_plan::types::{Event, EventType};
use tokio::time::Instant;

use common::{
  add_one, constant, failing, flaky, init_tracing, linear_pipeline, plan, step, sum, summary,
};

#[tokio::test]
async fn linear_success() {
  init_tracing();
  let result = execute_pipeline(linear_pipeline(), RunConfig::default(), None, RunContext::new())
    .await
    .unwrap();

  assert_eq!(
    summary(&result.events),
    vec![
      plan(EventType::PlanStart),
      step("A.transform", EventType::StepStart),
      step("A.transform", EventType::StepSuccess),
      step("B.transform", EventType::StepStart),
      step("B.transform", EventType::StepSuccess),
      plan(EventType::PlanSuccess),
    ]
  );
  assert!(result.success());
  assert_eq!(result.output_value("A.transform", "result"), Some(&json!(1)));
  assert_eq!(result.output_value("B.transform", "result"), Some(&json!(2)));
}

#[tokio::test]
async fn upstream_failure_abandons_the_consumer() {
  init_tracing();
  let graph = GraphBuilder::new("broken")
    .add_solid(failing("A"))
    .add_solid(add_one("B"))
    .connect("A", "result", "B", "x")
    .build()
    .unwrap();
  let pipeline = Arc::new(PipelineDefinition::new(graph, vec![]).unwrap());

  let result = execute_pipeline(pipeline, RunConfig::default(), None, RunContext::new())
    .await
    .unwrap();

  assert_eq!(
    summary(&result.events),
    vec![
      plan(EventType::PlanStart),
      step("A.transform", EventType::StepStart),
      step("A.transform", EventType::StepFailure),
      plan(EventType::PlanFailure),
    ]
  );
  assert!(result.step_event_types("B.transform").is_empty());
  let failure = result.failure().unwrap();
  assert_eq!(failure.class_name, "StepFailure");
  assert!(failure.message.contains("B.transform"));
}

#[test]
fn subset_without_a_source_is_rejected() {
  let keys = vec!["B.transform".to_string()];
  let err = create_execution_plan(linear_pipeline(), RunConfig::default(), None, Some(&keys))
    .unwrap_err();
  assert_eq!(
    err,
    PlanError::InvalidSubset {
      step: "B.transform".to_string(),
      input: "x".to_string(),
    }
  );
}

#[tokio::test]
async fn subset_with_a_configured_input_runs_alone() {
  init_tracing();
  let run_config = RunConfig::from_value(json!({
    "solids": { "B": { "inputs": { "x": { "value": 41 } } } }
  }))
  .unwrap();
  let keys = vec!["B.transform".to_string()];
  let plan = create_execution_plan(linear_pipeline(), run_config, None, Some(&keys)).unwrap();
  assert_eq!(plan.step_keys(), vec!["B.input.x.value", "B.transform"]);

  let events: Vec<Event> = execute_plan(Arc::new(plan), RunContext::new()).collect().await;
  assert_eq!(events.last().unwrap().event_type(), EventType::PlanSuccess);
  assert!(events.iter().all(|e| e.step_key.as_deref() != Some("A.transform")));
}

#[tokio::test]
async fn fan_in_tolerates_a_failed_member() {
  init_tracing();
  let graph = GraphBuilder::new("fan_in")
    .add_solid(constant("E1", json!(1)))
    .add_solid(failing("E2"))
    .add_solid(constant("E3", json!(3)))
    .add_solid(sum("J"))
    .fan_in(
      "J",
      "xs",
      &[("E1", "result"), ("E2", "result"), ("E3", "result")],
    )
    .build()
    .unwrap();
  let pipeline = Arc::new(PipelineDefinition::new(graph, vec![]).unwrap());

  let result = execute_pipeline(pipeline, RunConfig::default(), None, RunContext::new())
    .await
    .unwrap();

  assert!(result.step_succeeded("E1.transform"));
  assert!(result.step_event_types("E2.transform").contains(&EventType::StepFailure));
  assert!(result.step_succeeded("J.transform"));
  assert_eq!(result.output_value("J.transform", "result"), Some(&json!(4)));
  assert!(!result.success());
  assert!(result.failure().unwrap().message.contains("E2.transform"));
}

#[tokio::test(start_paused = true)]
async fn delayed_retry_waits_before_restarting() {
  init_tracing();
  let (solid, calls) = flaky("T", 1, Some(5.0), json!(7));
  let graph = GraphBuilder::new("delayed").add_solid(solid).build().unwrap();
  let pipeline = Arc::new(PipelineDefinition::new(graph, vec![]).unwrap());

  let started = Instant::now();
  let result = execute_pipeline(pipeline, RunConfig::default(), None, RunContext::new())
    .await
    .unwrap();

  assert!(Instant::now() >= started + Duration::from_secs(5));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  assert_eq!(
    result.step_event_types("T.transform"),
    vec![
      EventType::StepStart,
      EventType::StepUpForRetry,
      EventType::StepRestarted,
      EventType::StepOutput,
      EventType::StepSuccess,
    ]
  );
  assert!(result.success());
}

#[tokio::test]
async fn diamond_runs_every_branch() {
  init_tracing();
  let graph = GraphBuilder::new("diamond")
    .add_solid(constant("A", json!(1)))
    .add_solid(add_one("B"))
    .add_solid(add_one("C"))
    .add_solid(sum("D"))
    .connect("A", "result", "B", "x")
    .connect("A", "result", "C", "x")
    .fan_in("D", "xs", &[("B", "result"), ("C", "result")])
    .build()
    .unwrap();
  let pipeline = Arc::new(PipelineDefinition::new(graph, vec![]).unwrap());

  let result = execute_pipeline(pipeline, RunConfig::default(), None, RunContext::new())
    .await
    .unwrap();

  assert!(result.success());
  assert_eq!(result.output_value("D.transform", "result"), Some(&json!(4)));
  let position = |key: &str| {
    result
      .events
      .iter()
      .position(|e| e.step_key.as_deref() == Some(key) && e.event_type() == EventType::StepSuccess)
      .unwrap()
  };
  assert!(position("A.transform") < position("B.transform"));
  assert!(position("C.transform") < position("D.transform"));
}
