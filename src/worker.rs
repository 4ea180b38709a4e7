//! Consumer-side webhook delivery.
//!
//! A worker invocation processes exactly one [`DeliveryTask`] attempt:
//! evaluate the rule's condition gate, render the request, sign it,
//! send it, map the response. Retry scheduling belongs to the external
//! task transport: on a retryable failure the worker returns the
//! error once and the transport re-runs the task per its policy.
//!
//! Each attempt builds its own HTTP client, so connection state is
//! released on every exit path, success or failure.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::conditions;
use crate::error::{DeliveryOutcome, EventError, Result};
use crate::signing::{generate_signature, SIGNATURE_HEADER};
use crate::templates::TemplateRenderer;
use crate::types::{ActionTarget, DeliveryTask, Document, Webhook};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Worker-side configuration, read from global application settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound for one delivery attempt.
    pub request_timeout: Duration,

    /// Outbound proxy applied to every request, if configured.
    pub proxy: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { request_timeout: Duration::from_secs(30), proxy: None }
    }
}

/// Processes webhook delivery tasks pulled from the task transport.
///
/// Stateless between tasks; safe to share across worker threads.
pub struct WebhookWorker {
    config: WorkerConfig,
    renderer: TemplateRenderer,
}

impl WebhookWorker {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config, renderer: TemplateRenderer::new() }
    }

    /// Process one delivery attempt.
    ///
    /// Returns [`DeliveryOutcome::Skipped`] when the rule's condition
    /// gate evaluates false (the task is consumed, nothing is sent),
    /// [`DeliveryOutcome::Delivered`] on a 2xx response. Template and
    /// configuration failures are terminal; transport failures are
    /// retryable by the caller's transport.
    pub async fn process(&self, task: &DeliveryTask) -> Result<DeliveryOutcome> {
        if !conditions::evaluate(task.rule.conditions.as_ref(), &task.data) {
            debug!(rule = %task.rule.name, "conditions not met, skipping delivery");
            metric_inc("webhook.delivery.skipped");
            return Ok(DeliveryOutcome::Skipped);
        }

        let webhook = match &task.rule.action {
            ActionTarget::Webhook(webhook) => webhook,
            ActionTarget::Script(script) => {
                return Err(EventError::configuration(format!(
                    "rule '{}' targets script '{}.{}', not a webhook",
                    task.rule.name, script.module, script.name
                )));
            }
        };

        let context = build_context(task);

        let mut headers =
            vec![("Content-Type".to_string(), webhook.http_content_type.clone())];
        match self.renderer.render_headers(&webhook.additional_headers, &context) {
            Ok(extra) => headers.extend(extra),
            Err(err) => {
                error!(webhook = %webhook.name, rule = %task.rule.name, error = %err,
                    "error parsing HTTP headers");
                return Err(err);
            }
        }

        let body = if webhook.body_template.is_empty() {
            serde_json::to_string(&context)
                .map_err(|err| EventError::template(format!("cannot serialize context: {err}")))?
        } else {
            self.renderer.render(&webhook.body_template, &context).map_err(|err| {
                error!(webhook = %webhook.name, rule = %task.rule.name, error = %err,
                    "error rendering request body");
                err
            })?
        };

        let url = self.renderer.render(&webhook.payload_url, &context).map_err(|err| {
            error!(webhook = %webhook.name, rule = %task.rule.name, error = %err,
                "error rendering payload URL");
            err
        })?;

        info!(
            method = ?webhook.http_method,
            url = %url,
            model = %task.model_name,
            event = task.event.label(),
            "sending webhook request"
        );

        // Scoped client per attempt; dropped on every exit path.
        let client = self.build_client(webhook).await?;

        let mut request = client.request(webhook.http_method.into(), &url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !webhook.secret.is_empty() {
            request =
                request.header(SIGNATURE_HEADER, generate_signature(body.as_bytes(), &webhook.secret));
        }
        let request = request.body(body).build()?;

        let response = client.execute(request).await?;
        let status = response.status().as_u16();

        if (200..300).contains(&status) {
            info!(webhook = %webhook.name, status, "request succeeded");
            metric_inc("webhook.delivery.success");
            Ok(DeliveryOutcome::Delivered {
                status,
                message: format!("Status {status} returned, webhook successfully processed."),
            })
        } else {
            warn!(webhook = %webhook.name, status, "request failed");
            metric_inc("webhook.delivery.failure");
            let content = response.text().await.unwrap_or_default();
            Err(EventError::transport_status(
                status,
                format!("status {status} returned with content {content:?}"),
            ))
        }
    }

    /// HTTP client honoring the webhook's TLS settings and the
    /// configured outbound proxy.
    async fn build_client(&self, webhook: &Webhook) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.config.request_timeout);

        if !webhook.ssl_verification {
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(path) = &webhook.ca_file_path {
            let pem = tokio::fs::read(path).await.map_err(|err| {
                EventError::transport(format!("cannot read CA file '{path}': {err}"))
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        if let Some(proxy) = &self.config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        builder.build().map_err(EventError::from)
    }
}

/// Context dictionary the URL, header, and body templates render
/// against.
fn build_context(task: &DeliveryTask) -> Document {
    let mut context = json!({
        "event": task.event.label(),
        "timestamp": task.timestamp.to_rfc3339(),
        "model": &task.model_name,
        "username": &task.username,
        "request_id": task.request_id,
        "data": &task.data,
    });
    if !task.snapshots.is_empty() {
        context["snapshots"] = json!(&task.snapshots);
    }
    context
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::types::{
        EventAction, EventRule, RuleId, Snapshots, TaskRetry, TriggerSet, WebhookId,
    };

    fn task(snapshots: Snapshots) -> DeliveryTask {
        let webhook = Webhook::new(WebhookId(1), "hook", "http://localhost:9000/");
        let rule = EventRule::new(RuleId(1), "rule", ActionTarget::Webhook(webhook))
            .with_triggers(TriggerSet { on_create: true, ..Default::default() });
        DeliveryTask {
            rule,
            model_name: "site".to_string(),
            event: EventAction::Create,
            data: json!({"name": "dc1"}),
            snapshots,
            timestamp: Utc::now(),
            username: "admin".to_string(),
            request_id: Some(Uuid::new_v4()),
            retry: TaskRetry::default(),
        }
    }

    #[test]
    fn context_exposes_event_fields() {
        let task = task(Snapshots::default());
        let context = build_context(&task);

        assert_eq!(context["event"], "created");
        assert_eq!(context["model"], "site");
        assert_eq!(context["username"], "admin");
        assert_eq!(context["data"]["name"], "dc1");
        assert!(context.get("snapshots").is_none());
    }

    #[test]
    fn context_includes_snapshots_when_present() {
        let snapshots =
            Snapshots { prechange: Some(json!({"name": "old"})), postchange: Some(json!({"name": "dc1"})) };
        let context = build_context(&task(snapshots));

        assert_eq!(context["snapshots"]["prechange"]["name"], "old");
        assert_eq!(context["snapshots"]["postchange"]["name"], "dc1");
    }
}
