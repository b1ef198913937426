//! CRM snapshot fetch over the spreadsheet-automation webhook.
//!
//! The webhook is a direct, externally hosted URL, so it bypasses the
//! endpoint resolver entirely.

use async_trait::async_trait;
use hearth_core::capabilities::{SnapshotCapability, SnapshotOption, SnapshotOutcome};
use hearth_core::transcript::{ClientRef, ClientSnapshot};
use hearth_core::CapabilityError;
use serde_json::{json, Value};
use tracing::debug;

use crate::resolver::{CapabilityRequest, HttpTransport, ReqwestTransport};

pub struct WebhookSnapshotClient<T = ReqwestTransport> {
    transport: T,
    webhook_url: Option<String>,
}

impl<T> WebhookSnapshotClient<T>
where
    T: HttpTransport,
{
    pub fn new(transport: T, webhook_url: Option<String>) -> Self {
        Self { transport, webhook_url }
    }
}

#[async_trait]
impl<T> SnapshotCapability for WebhookSnapshotClient<T>
where
    T: HttpTransport,
{
    async fn fetch(
        &self,
        client: &ClientRef,
        question: &str,
    ) -> Result<SnapshotOutcome, CapabilityError> {
        let Some(url) = &self.webhook_url else {
            return Err(CapabilityError::Transport(
                "client snapshot webhook is not configured".to_owned(),
            ));
        };

        let (first_name, last_name) = split_name(&client.name);
        let payload = json!({
            "client_id": client.id,
            "client_name": client.name,
            "client_email": client.email,
            "question": question,
            "search_fields": {
                "name": client.name,
                "email": client.email,
                "first_name": first_name,
                "last_name": last_name,
            },
        });

        debug!(client_id = %client.id, "fetching client snapshot via webhook");
        let response = self
            .transport
            .send(url, &CapabilityRequest::post(payload))
            .await
            .map_err(|failure| CapabilityError::Transport(failure.0))?;

        let Some(body) = response.json() else {
            return Err(CapabilityError::UnusableReply(
                "snapshot webhook returned a non-JSON body".to_owned(),
            ));
        };

        match body.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(SnapshotOutcome::Found(snapshot_from(&body, &client.name))),
            Some("multiple") => {
                let options = body
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|options| {
                        options
                            .iter()
                            .filter_map(|option| {
                                Some(SnapshotOption {
                                    client_id: option
                                        .get("client_id")
                                        .and_then(Value::as_str)?
                                        .to_owned(),
                                    name: option.get("name").and_then(Value::as_str)?.to_owned(),
                                })
                            })
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Ok(SnapshotOutcome::Multiple(options))
            }
            Some("not_found") => Ok(SnapshotOutcome::NotFound(
                body.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("no matching client found")
                    .to_owned(),
            )),
            _ => Err(CapabilityError::domain(
                response.status,
                None,
                body.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("snapshot fetch failed")
                    .to_owned(),
            )),
        }
    }
}

fn snapshot_from(body: &Value, fallback_name: &str) -> ClientSnapshot {
    let client = body.get("client").cloned().unwrap_or(Value::Null);
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| client.get(*key))
            .and_then(field_text)
    };

    ClientSnapshot {
        name: field(&["name", "full_name"]).unwrap_or_else(|| fallback_name.to_owned()),
        email: field(&["email"]),
        budget: field(&["budget", "budget_range"]),
        timeline: field(&["timeline", "timeframe"]),
        status: field(&["status", "stage"]),
        notes: field(&["notes", "preferences"]),
        answer: body.get("answer").and_then(Value::as_str).map(str::to_owned),
    }
}

/// Sheet cells arrive as strings, numbers, or `{min, max}` ranges.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Object(range) => {
            let min = range.get("min").and_then(Value::as_i64)?;
            let max = range.get("max").and_then(Value::as_i64)?;
            Some(format!("${min} - ${max}"))
        }
        _ => None,
    }
}

fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_owned();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}
