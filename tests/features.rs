//! Expectations, materializations, composites, executors, retries, and instances.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::{Value, json};
use streamweave_plan::api::{create_execution_plan, execute_pipeline, execute_run};
use streamweave_plan::config::RunConfig;
use streamweave_plan::definition::{
  CompositeDefinition, ExpectationDefinition, ExpectationResult, GraphBuilder, InputDefinition,
  InputMapping, OutputDefinition, OutputMapping, PipelineDefinition, Repository, SolidDefinition,
};
use streamweave_plan::engine::{
  InMemoryInstance, InProcessStepWorker, Instance, InterruptHandle, RunContext,
  StepDelegatingExecutor,
};
use streamweave_plan::execution::{ComputeError, lambda};
use streamweave_plan::types::{EventKind, EventType, RunStatus, RuntimeType};

use common::{add_one, constant, failing, flaky, init_tracing, linear_pipeline, sum};

fn positive() -> ExpectationDefinition {
  ExpectationDefinition::new("positive", |_, value| {
    if value.as_i64().is_some_and(|v| v > 0) {
      ExpectationResult::passed()
    } else {
      ExpectationResult::failed(format!("{} is not positive", value))
    }
  })
}

fn small() -> ExpectationDefinition {
  ExpectationDefinition::new("small", |_, value| {
    if value.as_i64().is_some_and(|v| v < 100) {
      ExpectationResult::passed()
    } else {
      ExpectationResult::failed("value is too large")
    }
  })
}

/// `A -> B` where A emits `value` on an output carrying `expectations`.
fn checked_pipeline(value: Value, expectations: Vec<ExpectationDefinition>) -> Arc<PipelineDefinition> {
  let output = expectations
    .into_iter()
    .fold(OutputDefinition::new("result", RuntimeType::Int), |o, e| {
      o.with_expectation(e)
    });
  let a = SolidDefinition::new(
    "A",
    vec![],
    vec![output],
    lambda(move |_, _| {
      let value = value.clone();
      async move { Ok::<_, ComputeError>(value) }
    }),
  )
  .unwrap();
  let graph = GraphBuilder::new("checked")
    .add_solid(a)
    .add_solid(add_one("B"))
    .connect("A", "result", "B", "x")
    .build()
    .unwrap();
  Arc::new(PipelineDefinition::new(graph, vec![]).unwrap())
}

#[tokio::test]
async fn output_expectations_are_joined_before_the_consumer() {
  init_tracing();
  let pipeline = checked_pipeline(json!(5), vec![positive(), small()]);
  let plan = create_execution_plan(pipeline.clone(), RunConfig::default(), None, None).unwrap();
  assert_eq!(
    plan.step_keys(),
    vec![
      "A.transform",
      "A.output.result.expectation.positive",
      "A.output.result.expectation.small",
      "A.output.result.expectations.join",
      "B.transform",
    ]
  );

  let result = execute_pipeline(pipeline, RunConfig::default(), None, RunContext::new())
    .await
    .unwrap();
  assert!(result.success());
  assert!(
    result
      .step_event_types("A.output.result.expectation.small")
      .contains(&EventType::ExpectationResult)
  );
  assert_eq!(result.output_value("B.transform", "result"), Some(&json!(6)));
}

#[tokio::test]
async fn failed_expectation_abandons_the_consumer() {
  init_tracing();
  let pipeline = checked_pipeline(json!(-3), vec![positive()]);
  let result = execute_pipeline(pipeline, RunConfig::default(), None, RunContext::new())
    .await
    .unwrap();

  let expectation = result
    .events_for_step("A.output.result.expectation.positive")
    .find_map(|e| match &e.kind {
      EventKind::ExpectationResult {
        success,
        description,
        ..
      } => Some((*success, description.clone())),
      _ => None,
    })
    .unwrap();
  assert_eq!(expectation, (false, Some("-3 is not positive".to_string())));
  assert!(
    result
      .step_event_types("A.output.result.expectation.positive")
      .contains(&EventType::StepFailure)
  );
  assert!(result.step_event_types("B.transform").is_empty());
  assert!(!result.success());
}

#[test]
fn expectations_can_be_turned_off() {
  let pipeline = checked_pipeline(json!(-3), vec![positive()]);
  let run_config = RunConfig::from_value(json!({ "expectations": { "evaluate": false } })).unwrap();
  let plan = create_execution_plan(pipeline, run_config, None, None).unwrap();
  assert_eq!(plan.step_keys(), vec!["A.transform", "B.transform"]);
}

#[tokio::test]
async fn configured_materialization_writes_the_output() {
  init_tracing();
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("a.json");
  let run_config = RunConfig::from_value(json!({
    "solids": { "A": { "outputs": [ { "result": { "json": { "path": path } } } ] } }
  }))
  .unwrap();

  let result = execute_pipeline(linear_pipeline(), run_config, None, RunContext::new())
    .await
    .unwrap();

  assert!(result.success());
  assert!(
    result
      .step_event_types("A.output.result.materialization.0")
      .contains(&EventType::Materialization)
  );
  let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
  assert_eq!(written, json!(1));
}

#[tokio::test]
async fn input_thunk_loads_a_json_file() {
  init_tracing();
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("x.json");
  std::fs::write(&path, "41").unwrap();
  let graph = GraphBuilder::new("loaded").add_solid(add_one("B")).build().unwrap();
  let pipeline = Arc::new(PipelineDefinition::new(graph, vec![]).unwrap());
  let run_config = RunConfig::from_value(json!({
    "solids": { "B": { "inputs": { "x": { "json": { "path": path } } } } }
  }))
  .unwrap();

  let result = execute_pipeline(pipeline, run_config, None, RunContext::new())
    .await
    .unwrap();

  assert!(result.step_succeeded("B.input.x.value"));
  assert_eq!(result.output_value("B.transform", "result"), Some(&json!(42)));
}

fn length_composite() -> CompositeDefinition {
  let measure = SolidDefinition::new(
    "measure",
    vec![InputDefinition::new("text", RuntimeType::String)],
    vec![OutputDefinition::new("result", RuntimeType::Int)],
    lambda(|_, inputs| async move {
      let len = inputs
        .get("text")
        .and_then(Value::as_str)
        .map(str::len)
        .unwrap_or_default();
      Ok::<_, ComputeError>(json!(len))
    }),
  )
  .unwrap();
  let inner = GraphBuilder::new("length_inner")
    .add_solid(measure)
    .build()
    .unwrap();
  CompositeDefinition::new(
    "length",
    inner,
    vec![InputMapping::new(
      InputDefinition::new("text", RuntimeType::String),
      "measure",
      "text",
    )],
    vec![OutputMapping::new(
      OutputDefinition::new("length", RuntimeType::Int),
      "measure",
      "result",
    )],
  )
  .unwrap()
}

#[tokio::test]
async fn composite_runs_with_prefixed_step_keys() {
  init_tracing();
  let graph = GraphBuilder::new("composed")
    .add_aliased("pd", length_composite())
    .add_solid(add_one("B"))
    .connect("pd", "length", "B", "x")
    .build()
    .unwrap();
  let pipeline = Arc::new(PipelineDefinition::new(graph, vec![]).unwrap());
  let run_config = RunConfig::from_value(json!({
    "solids": { "pd": { "inputs": { "text": { "value": "hello" } } } }
  }))
  .unwrap();

  let plan = create_execution_plan(pipeline.clone(), run_config.clone(), None, None).unwrap();
  assert_eq!(
    plan.step_keys(),
    vec!["pd.input.text.value", "pd.measure.transform", "B.transform"]
  );

  let result = execute_pipeline(pipeline, run_config, None, RunContext::new())
    .await
    .unwrap();
  assert!(result.success());
  assert_eq!(
    result.output_value("pd.measure.transform", "result"),
    Some(&json!(5))
  );
  assert_eq!(result.output_value("B.transform", "result"), Some(&json!(6)));
}

#[tokio::test]
async fn multithread_config_runs_the_pipeline() {
  init_tracing();
  let run_config =
    RunConfig::from_value(json!({ "execution": { "multithread": { "max_concurrent": 2 } } }))
      .unwrap();
  let result = execute_pipeline(linear_pipeline(), run_config, None, RunContext::new())
    .await
    .unwrap();
  assert!(result.success());
  assert_eq!(result.output_value("B.transform", "result"), Some(&json!(2)));
}

#[tokio::test]
async fn step_delegation_matches_in_process_results() {
  init_tracing();
  let pipeline = linear_pipeline();
  let repository = Arc::new(Repository::new().with_pipeline(PipelineDefinition::clone(&pipeline)));
  let worker = Arc::new(InProcessStepWorker::new(repository));
  let run_context =
    RunContext::new().with_executor(Arc::new(StepDelegatingExecutor::new(worker, 2)));

  let result = execute_pipeline(pipeline, RunConfig::default(), None, run_context)
    .await
    .unwrap();

  assert!(result.success());
  assert_eq!(
    result.step_event_types("B.transform"),
    vec![EventType::StepStart, EventType::StepOutput, EventType::StepSuccess]
  );
  assert_eq!(result.output_value("B.transform", "result"), Some(&json!(2)));
}

#[tokio::test]
async fn delegated_fan_in_runs_on_surviving_members() {
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
  let repository = Arc::new(Repository::new().with_pipeline(PipelineDefinition::clone(&pipeline)));
  let worker = Arc::new(InProcessStepWorker::new(repository));
  let run_context =
    RunContext::new().with_executor(Arc::new(StepDelegatingExecutor::new(worker, 2)));

  let result = execute_pipeline(pipeline, RunConfig::default(), None, run_context)
    .await
    .unwrap();

  assert!(result.step_event_types("E2.transform").contains(&EventType::StepFailure));
  assert!(result.step_succeeded("J.transform"));
  assert_eq!(result.output_value("J.transform", "result"), Some(&json!(4)));
  assert!(result.failure().unwrap().message.contains("E2.transform"));
}

fn flaky_pipeline(failures: u32) -> (Arc<PipelineDefinition>, Arc<std::sync::atomic::AtomicU32>) {
  let (solid, calls) = flaky("T", failures, None, json!(1));
  let graph = GraphBuilder::new("flaky")
    .add_solid(solid)
    .add_solid(add_one("B"))
    .connect("T", "result", "B", "x")
    .build()
    .unwrap();
  (Arc::new(PipelineDefinition::new(graph, vec![]).unwrap()), calls)
}

#[tokio::test]
async fn disabled_retries_fail_the_step() {
  init_tracing();
  let (pipeline, calls) = flaky_pipeline(1);
  let run_config = RunConfig::from_value(json!({ "retries": { "disabled": {} } })).unwrap();

  let result = execute_pipeline(pipeline, run_config, None, RunContext::new())
    .await
    .unwrap();

  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(
    result.step_event_types("T.transform"),
    vec![EventType::StepStart, EventType::StepFailure]
  );
  assert!(result.step_event_types("B.transform").is_empty());
  assert!(!result.success());
}

#[tokio::test]
async fn deferred_retries_leave_the_step_for_a_later_run() {
  init_tracing();
  let (pipeline, calls) = flaky_pipeline(1);
  let run_config = RunConfig::from_value(json!({ "retries": { "deferred": {} } })).unwrap();

  let result = execute_pipeline(pipeline, run_config, None, RunContext::new())
    .await
    .unwrap();

  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(
    result.step_event_types("T.transform"),
    vec![EventType::StepStart, EventType::StepUpForRetry]
  );
  assert!(result.step_event_types("B.transform").is_empty());
  assert!(!result.success());
}

#[tokio::test]
async fn retry_limit_is_enforced() {
  init_tracing();
  let (solid, calls) = flaky("T", 5, None, json!(1));
  let limited = SolidDefinition::new(
    "limited",
    vec![],
    vec![OutputDefinition::new("result", RuntimeType::Int)],
    lambda(|_, _| async { Err::<Value, _>(ComputeError::retry(1, None)) }),
  )
  .unwrap();
  let graph = GraphBuilder::new("limits")
    .add_solid(solid)
    .add_solid(limited)
    .build()
    .unwrap();
  let pipeline = Arc::new(PipelineDefinition::new(graph, vec![]).unwrap());

  let result = execute_pipeline(pipeline, RunConfig::default(), None, RunContext::new())
    .await
    .unwrap();

  assert_eq!(calls.load(Ordering::SeqCst), 6);
  assert!(result.step_succeeded("T.transform"));
  let failure = result
    .events_for_step("limited.transform")
    .find_map(|e| match &e.kind {
      EventKind::StepFailure { error } => Some(error.class_name.clone()),
      _ => None,
    })
    .unwrap();
  assert_eq!(failure, "RetryLimitExceeded");
}

#[tokio::test]
async fn priority_tags_order_ready_steps() {
  init_tracing();
  let graph = GraphBuilder::new("prioritized")
    .add_solid(constant("low", json!(1)).with_tag("priority", "-1"))
    .add_solid(constant("mid", json!(2)))
    .add_solid(constant("high", json!(3)).with_tag("priority", "5"))
    .build()
    .unwrap();
  let pipeline = Arc::new(PipelineDefinition::new(graph, vec![]).unwrap());

  let result = execute_pipeline(pipeline, RunConfig::default(), None, RunContext::new())
    .await
    .unwrap();

  let started: Vec<&str> = result
    .events
    .iter()
    .filter(|e| e.event_type() == EventType::StepStart)
    .filter_map(|e| e.step_key.as_deref())
    .collect();
  assert_eq!(started, vec!["high.transform", "mid.transform", "low.transform"]);
}

#[tokio::test]
async fn interrupt_during_a_step_stops_further_launches() {
  init_tracing();
  let interrupt = InterruptHandle::new();
  let trigger = interrupt.clone();
  let a = SolidDefinition::new(
    "A",
    vec![],
    vec![OutputDefinition::new("result", RuntimeType::Int)],
    lambda(move |_, _| {
      trigger.interrupt();
      async { Ok::<_, ComputeError>(json!(1)) }
    }),
  )
  .unwrap();
  let graph = GraphBuilder::new("interrupted")
    .add_solid(a)
    .add_solid(add_one("B"))
    .connect("A", "result", "B", "x")
    .build()
    .unwrap();
  let pipeline = Arc::new(PipelineDefinition::new(graph, vec![]).unwrap());

  let result = execute_pipeline(
    pipeline,
    RunConfig::default(),
    None,
    RunContext::new().with_interrupt(interrupt),
  )
  .await
  .unwrap();

  assert!(result.step_succeeded("A.transform"));
  assert!(result.step_event_types("B.transform").is_empty());
  assert_eq!(result.failure().unwrap().class_name, "Interrupted");
}

#[tokio::test]
async fn execute_run_records_the_run_in_the_instance() {
  init_tracing();
  let instance = Arc::new(InMemoryInstance::new());
  let mut run_context = RunContext::new();
  run_context.tags.insert("team".to_string(), "data".to_string());

  let result = execute_run(
    linear_pipeline(),
    RunConfig::default(),
    None,
    instance.clone(),
    run_context,
  )
  .await
  .unwrap();

  assert!(result.success());
  let run = instance.get_run_by_id(result.run_id).await.unwrap();
  assert_eq!(run.status, RunStatus::Success);
  assert_eq!(run.pipeline_name, "linear");
  assert_eq!(run.tags.get("team").map(String::as_str), Some("data"));
  let recorded = instance.events_for_run(result.run_id).await;
  assert_eq!(recorded[0].event_type(), EventType::EngineEvent);
  assert_eq!(recorded[0].message, "Launching run of pipeline \"linear\" in mode \"default\".");
  assert_eq!(recorded[1..], result.events[..]);
}
