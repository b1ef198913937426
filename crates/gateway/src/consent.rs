//! Consent collection for the e-signature integration.
//!
//! When an action capability answers `consent_required`, the dispatcher hands
//! off here: fetch the provider consent URL, surface it, and poll the auth
//! status until the user has granted access (the backend's consent callback
//! completes the session), so the original action can resume.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::capabilities::ConsentCollaborator;
use hearth_core::CapabilityError;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, warn};

use crate::capabilities::auth_status;
use crate::resolver::{CapabilityRequest, EndpointResolver, HttpTransport, ReqwestTransport};

pub struct ConsentRedirectCollaborator<T = ReqwestTransport> {
    resolver: Arc<EndpointResolver<T>>,
    session_token: Option<SecretString>,
    poll_interval: Duration,
    max_polls: u32,
}

impl<T> ConsentRedirectCollaborator<T>
where
    T: HttpTransport,
{
    pub fn new(resolver: Arc<EndpointResolver<T>>, session_token: Option<SecretString>) -> Self {
        Self { resolver, session_token, poll_interval: Duration::from_secs(5), max_polls: 60 }
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls;
        self
    }

    fn bearer(&self) -> Option<String> {
        self.session_token.as_ref().map(|token| token.expose_secret().to_owned())
    }
}

#[async_trait]
impl<T> ConsentCollaborator for ConsentRedirectCollaborator<T>
where
    T: HttpTransport,
{
    async fn collect(&self) -> Result<(), CapabilityError> {
        let request = CapabilityRequest::get().with_bearer(self.bearer());
        let response = self
            .resolver
            .resolve("/api/docusign/consent", &request)
            .await
            .map_err(|error| error.into_capability("/api/docusign/consent"))?;

        let consent_url = response
            .json()
            .as_ref()
            .and_then(|body| body.get("consentUrl").and_then(Value::as_str))
            .map(str::to_owned)
            .ok_or_else(|| {
                CapabilityError::UnusableReply("no consent URL returned".to_owned())
            })?;

        warn!(
            consent_url = %consent_url,
            "integration consent required; grant access in the browser, polling for completion"
        );

        for attempt in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            if auth_status(&self.resolver, self.bearer()).await {
                info!(attempt, "integration consent granted");
                return Ok(());
            }
        }

        Err(CapabilityError::Timeout)
    }
}
