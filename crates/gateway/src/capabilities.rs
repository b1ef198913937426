//! HTTP implementations of the capability traits, one thin client per
//! backend endpoint, all routed through the endpoint resolver.

use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::capabilities::{
    ActionCapability, ActionOutcome, AuthCapability, ClientChatCapability, ClientQaCapability,
    ContractChangeCapability, FollowUpCapability, GeneralChatCapability, GroundedReply,
    HistoryCapability, ParsedChanges,
};
use hearth_core::transcript::{AwaitingSpec, Role, Turn};
use hearth_core::CapabilityError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::resolver::{
    CapabilityRequest, CapabilityResponse, EndpointResolver, HttpTransport, ReqwestTransport,
};

pub struct HttpCapabilities<T = ReqwestTransport> {
    resolver: Arc<EndpointResolver<T>>,
    session_token: Option<SecretString>,
}

impl<T> HttpCapabilities<T>
where
    T: HttpTransport,
{
    pub fn new(resolver: Arc<EndpointResolver<T>>, session_token: Option<SecretString>) -> Self {
        Self { resolver, session_token }
    }

    fn bearer(&self) -> Option<String> {
        self.session_token.as_ref().map(|token| token.expose_secret().to_owned())
    }

    async fn call(
        &self,
        path: &str,
        request: CapabilityRequest,
    ) -> Result<Value, CapabilityError> {
        let response = self
            .resolver
            .resolve(path, &request)
            .await
            .map_err(|error| error.into_capability(path))?;
        decode_envelope(response)
    }
}

/// Tolerant decode of the backend's `{ success, ... }` envelope. Non-JSON
/// bodies (proxy HTML, server error pages) become errors with a readable
/// snippet instead of a parse panic.
fn decode_envelope(response: CapabilityResponse) -> Result<Value, CapabilityError> {
    let Some(body) = response.json() else {
        let snippet: String = response.body.chars().take(100).collect();
        if response.is_success() {
            return Err(CapabilityError::UnusableReply(format!(
                "non-JSON body starts with: {snippet}"
            )));
        }
        return Err(CapabilityError::domain(
            response.status,
            None,
            format!("unexpected response body starts with: {snippet}"),
        ));
    };

    let success = body.get("success").and_then(Value::as_bool).unwrap_or(response.is_success());
    if !response.is_success() || !success {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .or_else(|| body.get("details").and_then(Value::as_str))
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP {}", response.status));
        let code = body
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| message.contains("consent_required").then(|| "consent_required".to_owned()));
        return Err(CapabilityError::Domain { status: response.status, code, message });
    }

    Ok(body)
}

fn history_messages(history: &[Turn]) -> Value {
    let messages = history
        .iter()
        .map(|turn| {
            json!({
                "role": match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                "content": turn.content,
            })
        })
        .collect::<Vec<_>>();
    Value::Array(messages)
}

/// Minimal query-value percent encoding (unreserved characters pass through).
pub(crate) fn encode_query(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

#[async_trait]
impl<T> FollowUpCapability for HttpCapabilities<T>
where
    T: HttpTransport,
{
    async fn generate(&self, client_name: &str) -> Result<String, CapabilityError> {
        let path = format!("/api/followup/from-sheet?clientName={}", encode_query(client_name));
        let body =
            self.call(&path, CapabilityRequest::get().with_bearer(self.bearer())).await?;

        match body.get("body").and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_owned()),
            _ => Err(CapabilityError::UnusableReply(
                "no follow-up body returned; the client may have no source notes".to_owned(),
            )),
        }
    }

    async fn refine(
        &self,
        current_body: &str,
        instruction: &str,
    ) -> Result<String, CapabilityError> {
        let payload = json!({ "currentBody": current_body, "instruction": instruction });
        let body = self
            .call(
                "/api/followup/refine",
                CapabilityRequest::post(payload).with_bearer(self.bearer()),
            )
            .await?;

        match body.get("refinedBody").and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_owned()),
            _ => Err(CapabilityError::UnusableReply("no revised body returned".to_owned())),
        }
    }
}

#[async_trait]
impl<T> ClientQaCapability for HttpCapabilities<T>
where
    T: HttpTransport,
{
    async fn answer(
        &self,
        client_name: &str,
        question: &str,
        history: &[Turn],
    ) -> Result<GroundedReply, CapabilityError> {
        let payload = json!({
            "clientName": client_name,
            "question": question,
            "history": history_messages(history),
        });
        let body = self
            .call("/api/client/qa", CapabilityRequest::post(payload).with_bearer(self.bearer()))
            .await?;

        reply_from(&body, true)
    }
}

#[async_trait]
impl<T> ClientChatCapability for HttpCapabilities<T>
where
    T: HttpTransport,
{
    async fn reply(
        &self,
        client_name: &str,
        question: &str,
        history: &[Turn],
    ) -> Result<GroundedReply, CapabilityError> {
        let payload = json!({
            "clientName": client_name,
            "question": question,
            "history": history_messages(history),
        });
        let body = self
            .call("/api/client/chat", CapabilityRequest::post(payload).with_bearer(self.bearer()))
            .await?;

        reply_from(&body, false)
    }
}

fn reply_from(body: &Value, grounded_default: bool) -> Result<GroundedReply, CapabilityError> {
    let reply = match body.get("reply").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => text.to_owned(),
        _ => return Err(CapabilityError::UnusableReply("no reply returned".to_owned())),
    };
    let grounded = body
        .get("grounded")
        .and_then(Value::as_bool)
        .or_else(|| body.get("usedContext").and_then(Value::as_bool))
        .unwrap_or(grounded_default);
    Ok(GroundedReply { reply, grounded })
}

#[async_trait]
impl<T> GeneralChatCapability for HttpCapabilities<T>
where
    T: HttpTransport,
{
    async fn reply(&self, messages: &[Turn]) -> Result<String, CapabilityError> {
        let payload = json!({ "messages": history_messages(messages) });
        let body = self
            .call("/api/ai/chat", CapabilityRequest::post(payload).with_bearer(self.bearer()))
            .await?;

        match body.get("reply").and_then(Value::as_str) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_owned()),
            _ => Err(CapabilityError::UnusableReply("no reply returned".to_owned())),
        }
    }
}

#[async_trait]
impl<T> ContractChangeCapability for HttpCapabilities<T>
where
    T: HttpTransport,
{
    async fn parse_changes(
        &self,
        spec: &AwaitingSpec,
        changes_text: &str,
    ) -> Result<ParsedChanges, CapabilityError> {
        let payload = json!({
            "action": "parse_nl_changes",
            "params": {
                "client_id": spec.client_id,
                "contract_type": spec.contract_type,
                "state": spec.jurisdiction,
                "changes_text": changes_text,
            },
        });
        let body =
            self.call("/api/contract/parse-changes", CapabilityRequest::post(payload)).await?;

        let data = body
            .get("data")
            .ok_or_else(|| CapabilityError::UnusableReply("no parsed changes returned".to_owned()))?;
        let structured_changes = data.get("structured_changes").cloned().unwrap_or(Value::Null);
        if structured_changes.is_null() {
            return Err(CapabilityError::UnusableReply("no parsed changes returned".to_owned()));
        }
        let affected_clauses = data
            .get("affected_clauses")
            .and_then(Value::as_array)
            .map(|clauses| {
                clauses
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(ParsedChanges { structured_changes, affected_clauses })
    }
}

#[async_trait]
impl<T> ActionCapability for HttpCapabilities<T>
where
    T: HttpTransport,
{
    async fn execute(
        &self,
        action_type: &str,
        parameters: &std::collections::BTreeMap<String, Value>,
        client_id: &str,
        authenticated: bool,
    ) -> Result<ActionOutcome, CapabilityError> {
        let path = if authenticated {
            "/api/chat/action/execute"
        } else {
            "/api/chat/action/execute/test"
        };
        let payload = json!({
            "action_type": action_type,
            "parameters": parameters,
            "clientId": client_id,
        });
        let mut request = CapabilityRequest::post(payload);
        if authenticated {
            request = request.with_bearer(self.bearer());
        }
        let body = self.call(path, request).await?;

        let message = body
            .get("data")
            .and_then(|data| {
                data.get("message")
                    .and_then(Value::as_str)
                    .or_else(|| {
                        data.get("result").and_then(|result| {
                            result.get("detail").and_then(Value::as_str)
                        })
                    })
            })
            .unwrap_or("Action completed successfully")
            .to_owned();

        Ok(ActionOutcome { message })
    }
}

#[async_trait]
impl<T> HistoryCapability for HttpCapabilities<T>
where
    T: HttpTransport,
{
    async fn recent(&self, client_id: &str, limit: usize) -> Result<Vec<Turn>, CapabilityError> {
        let path = format!("/api/chat/history?clientId={}&limit={limit}", encode_query(client_id));
        let body =
            self.call(&path, CapabilityRequest::get().with_bearer(self.bearer())).await?;

        let messages = body
            .get("data")
            .and_then(|data| data.get("messages"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(messages
            .iter()
            .filter_map(|message| {
                let content = message.get("content").and_then(Value::as_str)?;
                let turn = match message.get("role").and_then(Value::as_str) {
                    Some("user") => Turn::user(content),
                    _ => Turn::assistant(content),
                };
                Some(turn)
            })
            .collect())
    }
}

#[async_trait]
impl<T> AuthCapability for HttpCapabilities<T>
where
    T: HttpTransport,
{
    async fn session_is_valid(&self) -> bool {
        let Some(bearer) = self.bearer() else {
            return false;
        };
        auth_status(&self.resolver, Some(bearer)).await
    }
}

/// Shared auth-status probe; any failure counts as "not authenticated".
pub(crate) async fn auth_status<T>(
    resolver: &EndpointResolver<T>,
    bearer: Option<String>,
) -> bool
where
    T: HttpTransport,
{
    let request = CapabilityRequest::get().with_bearer(bearer);
    let Ok(response) = resolver.resolve("/api/auth/status", &request).await else {
        return false;
    };
    let Ok(body) = decode_envelope(response) else {
        return false;
    };
    body.get("isAuthenticated").and_then(Value::as_bool).unwrap_or(false)
}
