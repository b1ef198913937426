use thiserror::Error;

/// Everything a capability call can fail with. All variants are caught at the
/// orchestrator/dispatcher boundary and rendered as a diagnostic turn; none
/// propagate to the presentation layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("no capability endpoint answered `{path}`: {last_error}")]
    NotFoundAfterAllCandidates { path: String, last_error: String },
    #[error("capability returned {status}: {message}")]
    Domain { status: u16, code: Option<String>, message: String },
    #[error("reply unusable: {0}")]
    UnusableReply(String),
    #[error("capability call timed out")]
    Timeout,
}

impl CapabilityError {
    pub fn domain(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self::Domain { status, code, message: message.into() }
    }

    /// Consent-required domain errors are remediated, never shown raw.
    pub fn is_consent_required(&self) -> bool {
        match self {
            Self::Domain { code: Some(code), .. } => code == "consent_required",
            Self::Domain { message, .. } => message.contains("consent_required"),
            _ => false,
        }
    }

    /// Environment-specific next step to render alongside the failure.
    pub fn user_hint(&self) -> &'static str {
        match self {
            Self::Transport(_) => {
                "The backend may be down or unreachable. Check connectivity and that the service is running on :3001."
            }
            Self::NotFoundAfterAllCandidates { .. } => {
                "Endpoint not found on any configured origin. Ensure the backend restarted and ports match (frontend 3000, backend 3001)."
            }
            Self::Domain { .. } => "Check the backend logs for details and retry.",
            Self::UnusableReply(_) => "Try rephrasing the request or retry.",
            Self::Timeout => "You can retry your question or check backend connectivity.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CapabilityError;

    #[test]
    fn consent_required_is_recognized_by_code_or_message() {
        let by_code = CapabilityError::domain(401, Some("consent_required".to_owned()), "denied");
        assert!(by_code.is_consent_required());

        let by_message = CapabilityError::domain(401, None, "error: consent_required");
        assert!(by_message.is_consent_required());

        let unrelated = CapabilityError::domain(500, None, "boom");
        assert!(!unrelated.is_consent_required());
    }

    #[test]
    fn every_variant_offers_a_next_step() {
        let errors = [
            CapabilityError::Transport("connection refused".to_owned()),
            CapabilityError::NotFoundAfterAllCandidates {
                path: "/api/client/qa".to_owned(),
                last_error: "404".to_owned(),
            },
            CapabilityError::domain(500, None, "boom"),
            CapabilityError::UnusableReply("empty body".to_owned()),
            CapabilityError::Timeout,
        ];

        for error in errors {
            assert!(!error.user_hint().is_empty());
        }
    }
}
