//! Consumer-side delivery tests against a local mock HTTP server.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use eventhooks::{
    generate_signature, ActionTarget, Condition, ConditionOp, DeliveryOutcome, DeliveryTask,
    EventAction, EventError, EventRule, RuleId, Snapshots, TaskRetry, TriggerSet, Webhook,
    WebhookId, WebhookWorker, WorkerConfig, SIGNATURE_HEADER,
};

fn delivery_task(webhook: Webhook) -> DeliveryTask {
    let rule = EventRule::new(RuleId(1), "site-changes", ActionTarget::Webhook(webhook))
        .with_triggers(TriggerSet { on_create: true, ..Default::default() });
    DeliveryTask {
        rule,
        model_name: "site".to_string(),
        event: EventAction::Create,
        data: json!({"name": "dc1", "status": {"value": "active"}}),
        snapshots: Snapshots::default(),
        timestamp: Utc::now(),
        username: "admin".to_string(),
        request_id: Some(Uuid::new_v4()),
        retry: TaskRetry::default(),
    }
}

async fn mock_hook(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

#[tokio::test]
async fn success_status_yields_delivered() {
    let server = MockServer::start().await;
    mock_hook(&server, 204).await;

    let webhook = Webhook::new(WebhookId(1), "hook", format!("{}/hook", server.uri()));
    let worker = WebhookWorker::new(WorkerConfig::default());

    let outcome = worker.process(&delivery_task(webhook)).await.expect("delivery");
    match outcome {
        DeliveryOutcome::Delivered { status, message } => {
            assert_eq!(status, 204);
            assert!(message.contains("204"));
        }
        other => panic!("expected Delivered, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_retryable_transport_failure() {
    let server = MockServer::start().await;
    mock_hook(&server, 503).await;

    let webhook = Webhook::new(WebhookId(1), "hook", format!("{}/hook", server.uri()));
    let worker = WebhookWorker::new(WorkerConfig::default());

    let err = worker.process(&delivery_task(webhook)).await.unwrap_err();
    assert!(matches!(err, EventError::Transport { status: Some(503), .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn connection_failure_is_retryable_transport_failure() {
    // Nothing listens on this port.
    let webhook = Webhook::new(WebhookId(1), "hook", "http://127.0.0.1:9/hook");
    let worker = WebhookWorker::new(WorkerConfig::default());

    let err = worker.process(&delivery_task(webhook)).await.unwrap_err();
    assert!(matches!(err, EventError::Transport { status: None, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn empty_secret_sends_no_signature_header() {
    let server = MockServer::start().await;
    mock_hook(&server, 200).await;

    let webhook = Webhook::new(WebhookId(1), "hook", format!("{}/hook", server.uri()));
    let worker = WebhookWorker::new(WorkerConfig::default());

    worker.process(&delivery_task(webhook)).await.expect("delivery");

    let requests = server.received_requests().await.expect("recording");
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get(SIGNATURE_HEADER).is_none());
}

#[tokio::test]
async fn secret_signs_the_exact_request_body() {
    let server = MockServer::start().await;
    mock_hook(&server, 200).await;

    let webhook = Webhook::new(WebhookId(1), "hook", format!("{}/hook", server.uri()))
        .with_secret("S")
        .with_body_template(r#"{"x":1}"#);
    let worker = WebhookWorker::new(WorkerConfig::default());

    worker.process(&delivery_task(webhook)).await.expect("delivery");

    let requests = server.received_requests().await.expect("recording");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert_eq!(request.body, br#"{"x":1}"#);
    let header = request
        .headers
        .get(SIGNATURE_HEADER)
        .expect("signature header")
        .to_str()
        .expect("ascii");
    // Receivers recompute the HMAC over the body they received.
    assert_eq!(header, generate_signature(&request.body, "S"));
}

#[tokio::test]
async fn false_condition_skips_without_sending() {
    let server = MockServer::start().await;
    mock_hook(&server, 200).await;

    let webhook = Webhook::new(WebhookId(1), "hook", format!("{}/hook", server.uri()));
    let mut task = delivery_task(webhook);
    task.rule = task.rule.with_conditions(
        Condition::new("status.value", ConditionOp::Eq, json!("planned")).into(),
    );

    let worker = WebhookWorker::new(WorkerConfig::default());

    // Replaying the task always yields the same no-op success.
    for _ in 0..3 {
        let outcome = worker.process(&task).await.expect("skip");
        assert_eq!(outcome, DeliveryOutcome::Skipped);
    }

    let requests = server.received_requests().await.expect("recording");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn passing_condition_delivers() {
    let server = MockServer::start().await;
    mock_hook(&server, 200).await;

    let webhook = Webhook::new(WebhookId(1), "hook", format!("{}/hook", server.uri()));
    let mut task = delivery_task(webhook);
    task.rule = task.rule.with_conditions(
        Condition::new("status.value", ConditionOp::Eq, json!("active")).into(),
    );

    let worker = WebhookWorker::new(WorkerConfig::default());
    let outcome = worker.process(&task).await.expect("delivery");
    assert!(matches!(outcome, DeliveryOutcome::Delivered { status: 200, .. }));
}

#[tokio::test]
async fn broken_body_template_is_terminal_and_sends_nothing() {
    let server = MockServer::start().await;
    mock_hook(&server, 200).await;

    let webhook = Webhook::new(WebhookId(1), "hook", format!("{}/hook", server.uri()))
        .with_body_template("{{ no_such_field.nested }}");
    let worker = WebhookWorker::new(WorkerConfig::default());

    let err = worker.process(&delivery_task(webhook)).await.unwrap_err();
    assert!(matches!(err, EventError::Template { .. }));
    assert!(!err.is_retryable());

    let requests = server.received_requests().await.expect("recording");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn rendered_headers_and_url_reach_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook/site"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let webhook = Webhook::new(WebhookId(1), "hook", format!("{}/hook/{{{{ model }}}}", server.uri()))
        .with_additional_headers("X-Actor: {{ username }}\nX-Event: {{ event }}");
    let worker = WebhookWorker::new(WorkerConfig::default());

    worker.process(&delivery_task(webhook)).await.expect("delivery");

    let requests = server.received_requests().await.expect("recording");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.headers.get("X-Actor").unwrap(), "admin");
    assert_eq!(request.headers.get("X-Event").unwrap(), "created");
    assert_eq!(request.headers.get("Content-Type").unwrap(), "application/json");
}

#[tokio::test]
async fn empty_body_template_sends_serialized_context() {
    let server = MockServer::start().await;
    mock_hook(&server, 200).await;

    let webhook = Webhook::new(WebhookId(1), "hook", format!("{}/hook", server.uri()));
    let worker = WebhookWorker::new(WorkerConfig::default());

    worker.process(&delivery_task(webhook)).await.expect("delivery");

    let requests = server.received_requests().await.expect("recording");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json body");
    assert_eq!(body["event"], "created");
    assert_eq!(body["model"], "site");
    assert_eq!(body["username"], "admin");
    assert_eq!(body["data"]["name"], "dc1");
}

#[tokio::test]
async fn script_task_is_a_configuration_error() {
    let script = eventhooks::ScriptRef { module: "maintenance".to_string(), name: "sync".to_string() };
    let rule = EventRule::new(RuleId(1), "script-rule", ActionTarget::Script(script))
        .with_triggers(TriggerSet { on_create: true, ..Default::default() });

    let mut task = delivery_task(Webhook::new(WebhookId(1), "unused", "http://localhost/"));
    task.rule = rule;

    let worker = WebhookWorker::new(WorkerConfig::default());
    let err = worker.process(&task).await.unwrap_err();
    assert!(matches!(err, EventError::Configuration { .. }));
    assert!(!err.is_retryable());
}
