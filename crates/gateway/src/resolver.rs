//! Multi-origin endpoint resolution.
//!
//! Deployment environments may proxy the capability surface under different
//! origins (an explicitly configured base, the dev proxy, the service
//! itself). The resolver walks the candidate list in order so callers stay
//! resilient without hardcoding topology.

use async_trait::async_trait;
use hearth_core::config::EndpointConfig;
use hearth_core::CapabilityError;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

#[derive(Clone, Debug, Default)]
pub struct CapabilityRequest {
    pub method: Method,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl CapabilityRequest {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self { method: Method::Post, body: Some(body), bearer: None }
    }

    pub fn with_bearer(mut self, bearer: Option<String>) -> Self {
        self.bearer = bearer;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityResponse {
    pub status: u16,
    pub body: String,
}

impl CapabilityResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Raw-text-first parsing: proxies occasionally answer with HTML error
    /// pages, so a parse failure is a usable signal, not a crash.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportFailure(pub String);

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        request: &CapabilityRequest,
    ) -> Result<CapabilityResponse, TransportFailure>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        url: &str,
        request: &CapabilityRequest,
    ) -> Result<CapabilityResponse, TransportFailure> {
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        builder = builder.header("Accept", "application/json");
        if let Some(bearer) = &request.bearer {
            builder = builder.bearer_auth(bearer);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response =
            builder.send().await.map_err(|error| TransportFailure(error.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| TransportFailure(error.to_string()))?;
        Ok(CapabilityResponse { status, body })
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no candidate origins configured")]
    NoCandidates,
    #[error("no origin answered `{path}` ({attempted} candidates tried): {last_error}")]
    NotFoundAfterAllCandidates { path: String, attempted: usize, last_error: String },
}

impl ResolveError {
    pub fn into_capability(self, path: &str) -> CapabilityError {
        match self {
            Self::NoCandidates => CapabilityError::Transport("no candidate origins configured".to_owned()),
            Self::NotFoundAfterAllCandidates { last_error, .. } => {
                CapabilityError::NotFoundAfterAllCandidates { path: path.to_owned(), last_error }
            }
        }
    }
}

pub struct EndpointResolver<T = ReqwestTransport> {
    bases: Vec<String>,
    transport: T,
}

impl EndpointResolver<ReqwestTransport> {
    pub fn from_config(endpoints: &EndpointConfig) -> Self {
        Self::new(endpoints.candidates(), ReqwestTransport::new())
    }
}

impl<T> EndpointResolver<T>
where
    T: HttpTransport,
{
    pub fn new(bases: Vec<String>, transport: T) -> Self {
        let bases =
            bases.into_iter().map(|base| base.trim_end_matches('/').to_owned()).collect();
        Self { bases, transport }
    }

    /// Walks the candidates in order, each attempted exactly once: a
    /// transport failure or a 404 on a non-final candidate moves on; any
    /// other response is returned immediately (non-2xx included, for
    /// domain-specific handling by the caller). Exhausting every candidate
    /// yields `NotFoundAfterAllCandidates` carrying the last underlying
    /// error.
    pub async fn resolve(
        &self,
        path: &str,
        request: &CapabilityRequest,
    ) -> Result<CapabilityResponse, ResolveError> {
        if self.bases.is_empty() {
            return Err(ResolveError::NoCandidates);
        }

        let mut last_error = String::new();
        for base in &self.bases {
            let url = format!("{base}{path}");
            match self.transport.send(&url, request).await {
                Ok(response) if response.is_not_found() => {
                    debug!(url = %url, "capability endpoint answered 404, trying next origin");
                    last_error = format!("404 at {url}");
                }
                Ok(response) => return Ok(response),
                Err(failure) => {
                    debug!(url = %url, error = %failure, "capability origin unreachable");
                    last_error = failure.0;
                }
            }
        }

        Err(ResolveError::NotFoundAfterAllCandidates {
            path: path.to_owned(),
            attempted: self.bases.len(),
            last_error,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{CapabilityRequest, CapabilityResponse, HttpTransport, TransportFailure};

    /// Scripted transport: maps full URLs to canned outcomes and records the
    /// order of attempts.
    #[derive(Default)]
    pub struct ScriptedTransport {
        script: HashMap<String, Result<CapabilityResponse, TransportFailure>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub fn with(
            entries: Vec<(&str, Result<CapabilityResponse, TransportFailure>)>,
        ) -> Self {
            Self {
                script: entries
                    .into_iter()
                    .map(|(url, outcome)| (url.to_owned(), outcome))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn recorded_calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    pub fn ok(status: u16, body: &str) -> Result<CapabilityResponse, TransportFailure> {
        Ok(CapabilityResponse { status, body: body.to_owned() })
    }

    pub fn unreachable(message: &str) -> Result<CapabilityResponse, TransportFailure> {
        Err(TransportFailure(message.to_owned()))
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(
            &self,
            url: &str,
            _request: &CapabilityRequest,
        ) -> Result<CapabilityResponse, TransportFailure> {
            self.calls.lock().expect("calls lock").push(url.to_owned());
            self.script
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(TransportFailure(format!("unscripted url {url}"))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ok, unreachable, ScriptedTransport};
    use super::{CapabilityRequest, EndpointResolver, ResolveError};

    fn bases() -> Vec<String> {
        vec!["http://a".to_owned(), "http://b".to_owned(), "http://c".to_owned()]
    }

    #[tokio::test]
    async fn first_non_404_answer_wins_and_later_origins_are_not_attempted() {
        let transport = ScriptedTransport::with(vec![
            ("http://a/api/client/qa", ok(404, "")),
            ("http://b/api/client/qa", ok(200, "{\"success\":true}")),
        ]);
        let resolver = EndpointResolver::new(bases(), transport);

        let response = resolver
            .resolve("/api/client/qa", &CapabilityRequest::get())
            .await
            .expect("resolved");

        assert_eq!(response.status, 200);
        assert_eq!(
            resolver.transport.recorded_calls(),
            vec!["http://a/api/client/qa".to_owned(), "http://b/api/client/qa".to_owned()]
        );
    }

    #[tokio::test]
    async fn all_candidates_404_fails_after_trying_each_exactly_once() {
        let transport = ScriptedTransport::with(vec![
            ("http://a/api/x", ok(404, "")),
            ("http://b/api/x", ok(404, "")),
            ("http://c/api/x", ok(404, "")),
        ]);
        let resolver = EndpointResolver::new(bases(), transport);

        let error = resolver
            .resolve("/api/x", &CapabilityRequest::get())
            .await
            .expect_err("must exhaust");

        assert!(matches!(
            error,
            ResolveError::NotFoundAfterAllCandidates { attempted: 3, .. }
        ));
        assert_eq!(resolver.transport.recorded_calls().len(), 3);
    }

    #[tokio::test]
    async fn unreachable_candidate_is_skipped() {
        let transport = ScriptedTransport::with(vec![
            ("http://a/api/x", unreachable("connection refused")),
            ("http://b/api/x", ok(200, "{}")),
        ]);
        let resolver = EndpointResolver::new(bases(), transport);

        let response =
            resolver.resolve("/api/x", &CapabilityRequest::get()).await.expect("resolved");
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn non_404_error_statuses_are_returned_for_domain_handling() {
        let transport = ScriptedTransport::with(vec![(
            "http://a/api/x",
            ok(500, "{\"success\":false,\"error\":\"boom\"}"),
        )]);
        let resolver = EndpointResolver::new(bases(), transport);

        let response =
            resolver.resolve("/api/x", &CapabilityRequest::get()).await.expect("resolved");

        assert_eq!(response.status, 500);
        assert_eq!(resolver.transport.recorded_calls().len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_error_carries_the_last_underlying_failure() {
        let transport = ScriptedTransport::with(vec![
            ("http://a/api/x", ok(404, "")),
            ("http://b/api/x", ok(404, "")),
            ("http://c/api/x", unreachable("tls handshake failed")),
        ]);
        let resolver = EndpointResolver::new(bases(), transport);

        let error =
            resolver.resolve("/api/x", &CapabilityRequest::get()).await.expect_err("exhausted");
        let ResolveError::NotFoundAfterAllCandidates { last_error, .. } = error else {
            panic!("unexpected error variant");
        };
        assert_eq!(last_error, "tls handshake failed");
    }
}
