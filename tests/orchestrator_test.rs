//! Integration tests for the build orchestrator
//!
//! Runs publish payloads through resolution, tarball preparation and locale
//! fan-out against in-memory fakes.

mod common;

use common::{payload, Harness, RecordingPublisher, BUILD_TOPIC, STATUS_TOPIC};
use serde_json::{json, Value};

use carpenter::core::orchestrator::{BuildOutcome, OrchestratorEvent};
use carpenter::core::payload::{BuildRequest, PublishPayload};
use carpenter::core::progress::ProgressEvent;
use carpenter::core::spec::DispatchRecord;
use carpenter::error::{BuildError, DispatchError, PrepareError};

fn request(value: Value) -> BuildRequest {
    BuildRequest {
        promote: true,
        payload: PublishPayload::from_json(&value.to_string()).unwrap(),
    }
}

fn webpack_payload(locales: &[&str]) -> Value {
    payload(
        "pkg",
        "1.0.0",
        json!({"build": "webpack", "webpack": "cfg.js", "locales": locales}),
        "test",
    )
}

async fn run(
    harness: &Harness,
    value: Value,
) -> (Result<BuildOutcome, BuildError>, Vec<ProgressEvent>) {
    let handle = harness.orchestrator().build(request(value));
    let (outcome, published) = handle.completion.wait_published().await;
    published.unwrap();
    let events = handle.progress.collect_events().await;
    (outcome, events)
}

fn terminal_status(harness: &Harness) -> Value {
    harness
        .publisher
        .messages(STATUS_TOPIC)
        .last()
        .cloned()
        .expect("no status records")
}

#[tokio::test]
async fn test_every_locale_is_queued() {
    let harness = Harness::new(RecordingPublisher::new());

    let (outcome, events) = run(&harness, webpack_payload(&["en-US", "nl", "de"])).await;

    assert_eq!(outcome.unwrap(), BuildOutcome::Queued { dispatched: 3 });

    let mut locales: Vec<String> = harness
        .publisher
        .messages(BUILD_TOPIC)
        .iter()
        .map(|m| m["locale"].as_str().unwrap().to_string())
        .collect();
    locales.sort();
    assert_eq!(locales, vec!["de", "en-US", "nl"]);

    let record: DispatchRecord =
        serde_json::from_value(harness.publisher.messages(BUILD_TOPIC)[0].clone()).unwrap();
    assert_eq!(record.name, "pkg");
    assert_eq!(record.env, "test");
    assert_eq!(record.version, "1.0.0");
    assert_eq!(record.build_type.as_deref(), Some("webpack"));
    assert_eq!(record.promote, Some(true));

    let done = events
        .iter()
        .filter(|e| e.message == "Successfully queued build" && e.progress == Some(100))
        .count();
    assert_eq!(done, 3);

    let status = terminal_status(&harness);
    assert_eq!(status["eventType"], "queued");
    assert_eq!(status["total"], 3);
    assert_eq!(status["message"], "Builds Queued");
    assert_eq!(status["name"], "pkg");
    assert_eq!(status["buildType"], "webpack");
}

#[tokio::test]
async fn test_working_paths_are_removed() {
    let harness = Harness::new(RecordingPublisher::new());

    let (outcome, _) = run(&harness, webpack_payload(&["en-US"])).await;

    assert!(outcome.is_ok());
    assert_eq!(harness.installer.calls(), 1);
    assert!(harness.project.entries("install").is_empty());
    assert!(harness.project.entries("tarballs").is_empty());
}

#[tokio::test]
async fn test_build_false_is_ignored() {
    let harness = Harness::new(RecordingPublisher::new());
    let value = payload(
        "pkg",
        "1.0.0",
        json!({"build": false, "webpack": "cfg.js"}),
        "prod",
    );

    let (outcome, events) = run(&harness, value).await;

    assert_eq!(outcome.unwrap(), BuildOutcome::Ignored);
    assert!(harness.publisher.messages(BUILD_TOPIC).is_empty());
    assert_eq!(harness.installer.calls(), 0);

    let ignored: Vec<_> = events.iter().filter(|e| e.message == "ignored").collect();
    assert_eq!(ignored.len(), 1);
    assert_eq!(ignored[0].progress, Some(-1));
    assert_eq!(terminal_status(&harness)["eventType"], "ignored");
}

#[tokio::test]
async fn test_unknown_build_type_is_ignored() {
    let harness = Harness::new(RecordingPublisher::new());
    let value = payload("pkg", "1.0.0", json!({"main": "index.js"}), "prod");

    let (outcome, _) = run(&harness, value).await;

    assert_eq!(outcome.unwrap(), BuildOutcome::Ignored);
    assert!(harness.publisher.messages(BUILD_TOPIC).is_empty());
}

#[tokio::test]
async fn test_failures_below_limit_do_not_abort_siblings() {
    let harness = Harness::new(RecordingPublisher::failing_locales(&["nl"]));

    let (outcome, events) = run(&harness, webpack_payload(&["en-US", "nl", "de"])).await;

    assert_eq!(outcome.unwrap(), BuildOutcome::Queued { dispatched: 2 });
    assert_eq!(harness.publisher.messages(BUILD_TOPIC).len(), 2);

    let errors: Vec<_> = events
        .iter()
        .filter(|e| e.event.as_deref() == Some("error"))
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].locale.as_deref(), Some("nl"));

    assert_eq!(terminal_status(&harness)["eventType"], "queued");
    assert_eq!(terminal_status(&harness)["total"], 2);
}

#[tokio::test]
async fn test_failures_at_limit_abort_the_build() {
    let harness = Harness::new(RecordingPublisher::failing_locales(&["nl", "de"]));
    let orchestrator = harness.orchestrator();

    let handle = orchestrator.build(request(webpack_payload(&["en-US", "nl", "de"])));
    let (outcome, _) = handle.completion.wait_published().await;
    let events = handle.progress.collect_events().await;

    match outcome {
        Err(BuildError::Dispatch(DispatchError::TooManyFailures { key, failures, .. })) => {
            assert_eq!(key, "pkg!test!1.0.0");
            assert_eq!(failures, 2);
        }
        other => panic!("expected too many failures, got {other:?}"),
    }

    // the sibling locale still went out
    assert_eq!(harness.publisher.messages(BUILD_TOPIC).len(), 1);
    assert_eq!(orchestrator.failures().count("pkg!test!1.0.0"), 0);
    assert!(harness.project.entries("install").is_empty());

    let last = events.last().unwrap();
    assert_eq!(last.kind.as_deref(), Some("error"));
    assert_eq!(terminal_status(&harness)["eventType"], "error");
}

#[tokio::test]
async fn test_retries_before_counting_a_failure() {
    let harness = Harness::new(RecordingPublisher::failing_locales(&["nl"]));

    let (outcome, _) = run(&harness, webpack_payload(&["nl"])).await;

    assert_eq!(outcome.unwrap(), BuildOutcome::Queued { dispatched: 0 });
    // one build attempt plus one retry; everything else is status records
    let build_attempts = harness.publisher.attempts() as usize
        - harness.publisher.messages(STATUS_TOPIC).len();
    assert_eq!(build_attempts, 2);
}

#[tokio::test]
async fn test_invalid_payload_aborts_before_dispatch() {
    let harness = Harness::new(RecordingPublisher::new());
    let value = json!({"name": "pkg", "versions": {"1.0.0": {"build": "webpack"}}});

    let (outcome, events) = run(&harness, value).await;

    assert!(matches!(outcome, Err(BuildError::Spec(_))));
    assert!(harness.publisher.messages(BUILD_TOPIC).is_empty());
    assert!(events.iter().any(|e| e.event.as_deref() == Some("error")));
    assert_eq!(terminal_status(&harness)["eventType"], "error");
}

#[tokio::test]
async fn test_install_failure_is_fatal() {
    let mut harness = Harness::new(RecordingPublisher::new());
    harness.installer = std::sync::Arc::new(common::StubInstaller::failing(10));

    let (outcome, _) = run(&harness, webpack_payload(&["en-US"])).await;

    match outcome {
        Err(BuildError::Prepare(PrepareError::Install { attempts, .. })) => assert_eq!(attempts, 2),
        other => panic!("expected install failure, got {other:?}"),
    }
    assert!(harness.publisher.messages(BUILD_TOPIC).is_empty());
    assert!(harness.project.entries("install").is_empty());
    assert!(harness.project.entries("tarballs").is_empty());
}

#[tokio::test]
async fn test_dependency_locales_are_intersected() {
    let harness = Harness::new(RecordingPublisher::new());
    harness.packages.insert_package(
        "dep-a",
        json!({"name": "dep-a", "locales": ["en-US", "nl", "de"]})
            .as_object()
            .cloned()
            .unwrap(),
    );
    harness.packages.insert_package(
        "dep-b",
        json!({"name": "dep-b", "locales": ["nl", "de", "fr"]})
            .as_object()
            .cloned()
            .unwrap(),
    );
    let value = payload(
        "pkg",
        "1.0.0",
        json!({"build": "webpack", "dependencies": {"dep-a": "^1.0.0", "dep-b": "^2.0.0"}}),
        "test",
    );

    let (outcome, _) = run(&harness, value).await;

    assert_eq!(outcome.unwrap(), BuildOutcome::Queued { dispatched: 2 });
    let mut locales: Vec<String> = harness
        .publisher
        .messages(BUILD_TOPIC)
        .iter()
        .map(|m| m["locale"].as_str().unwrap().to_string())
        .collect();
    locales.sort();
    assert_eq!(locales, vec!["de", "nl"]);
}

#[tokio::test]
async fn test_bounded_fan_out_dispatches_everything() {
    let mut harness = Harness::new(RecordingPublisher::new());
    harness.options.concurrency = Some(1);

    let (outcome, _) = run(&harness, webpack_payload(&["en-US", "nl", "de", "fr"])).await;

    assert_eq!(outcome.unwrap(), BuildOutcome::Queued { dispatched: 4 });
    assert_eq!(harness.publisher.messages(BUILD_TOPIC).len(), 4);
}

#[tokio::test]
async fn test_lifecycle_events() {
    let harness = Harness::new(RecordingPublisher::new());
    let orchestrator = harness.orchestrator();
    let mut events = orchestrator.subscribe();

    let outcome = orchestrator
        .build(request(webpack_payload(&["en-US", "nl"])))
        .wait()
        .await;
    assert!(outcome.is_ok());

    let mut queue = 0;
    let mut queued = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            OrchestratorEvent::Queue { topic, .. } => {
                assert_eq!(topic, BUILD_TOPIC);
                queue += 1;
            }
            OrchestratorEvent::Queued { .. } => queued += 1,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!((queue, queued), (2, 2));
}

#[tokio::test]
async fn test_build_one_defaults_to_webpack() {
    let harness = Harness::new(RecordingPublisher::new());
    let record = DispatchRecord {
        name: "pkg".to_string(),
        env: "prod".to_string(),
        version: "2.0.0".to_string(),
        locale: "nl".to_string(),
        build_type: None,
        promote: None,
    };

    let handle = harness.orchestrator().build_one(record);
    let (outcome, published) = handle.completion.wait_published().await;
    published.unwrap();

    assert_eq!(outcome.unwrap(), BuildOutcome::Queued { dispatched: 1 });
    let messages = harness.publisher.messages(BUILD_TOPIC);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "webpack");
    assert_eq!(messages[0]["locale"], "nl");
    assert!(messages[0].get("promote").is_none());

    let status = terminal_status(&harness);
    assert_eq!(status["eventType"], "queued");
    assert_eq!(status["total"], 1);
}

#[tokio::test]
async fn test_janitor_disabled_in_development() {
    let mut harness = Harness::new(RecordingPublisher::new());
    harness.options.development = true;
    assert!(harness.orchestrator().start_janitor().is_none());

    harness.options.development = false;
    let janitor = harness.orchestrator().start_janitor();
    assert!(janitor.is_some());
    janitor.unwrap().shutdown().await;
}

#[tokio::test]
async fn test_status_sink_disabled_without_publisher() {
    let harness = Harness::new(RecordingPublisher::new());
    let value = payload("pkg", "1.0.0", json!({"build": false}), "prod");

    let handle = harness.orchestrator_with_status(None).build(request(value));
    assert!(!handle.completion.reporter().status().is_writable());
    let (outcome, published) = handle.completion.wait_published().await;

    assert_eq!(outcome.unwrap(), BuildOutcome::Ignored);
    published.unwrap();
    assert_eq!(harness.publisher.attempts(), 0);
}

#[tokio::test]
async fn test_status_sink_disabled_with_empty_topic() {
    let mut harness = Harness::new(RecordingPublisher::new());
    harness.options.status_topic = String::new();

    let (outcome, _) = run(&harness, webpack_payload(&["en-US", "nl"])).await;

    assert_eq!(outcome.unwrap(), BuildOutcome::Queued { dispatched: 2 });
    assert_eq!(harness.publisher.messages(BUILD_TOPIC).len(), 2);
    assert!(harness.publisher.messages("").is_empty());
    assert_eq!(harness.publisher.attempts(), 2);
}
