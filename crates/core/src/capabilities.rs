//! Collaborator seams for the backend capability surface.
//!
//! Each trait is one opaque backend capability; the gateway crate provides
//! the HTTP implementations, tests provide scripted in-memory fakes. The
//! exact request/response schemas are owned by the backend, so the traits
//! expose only what the routing core consumes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::CapabilityError;
use crate::transcript::{AwaitingSpec, ClientRef, ClientSnapshot, Turn};

/// A reply plus the backend's assertion whether it was derived from actual
/// client data rather than generated without lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroundedReply {
    pub reply: String,
    pub grounded: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedChanges {
    pub structured_changes: Value,
    pub affected_clauses: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotOption {
    pub client_id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SnapshotOutcome {
    Found(ClientSnapshot),
    /// Ambiguous CRM match; the dispatcher turns the options into
    /// selection chips.
    Multiple(Vec<SnapshotOption>),
    NotFound(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub message: String,
}

#[async_trait]
pub trait FollowUpCapability: Send + Sync {
    async fn generate(&self, client_name: &str) -> Result<String, CapabilityError>;
    async fn refine(
        &self,
        current_body: &str,
        instruction: &str,
    ) -> Result<String, CapabilityError>;
}

#[async_trait]
pub trait ClientQaCapability: Send + Sync {
    async fn answer(
        &self,
        client_name: &str,
        question: &str,
        history: &[Turn],
    ) -> Result<GroundedReply, CapabilityError>;
}

#[async_trait]
pub trait ClientChatCapability: Send + Sync {
    async fn reply(
        &self,
        client_name: &str,
        question: &str,
        history: &[Turn],
    ) -> Result<GroundedReply, CapabilityError>;
}

#[async_trait]
pub trait GeneralChatCapability: Send + Sync {
    async fn reply(&self, messages: &[Turn]) -> Result<String, CapabilityError>;
}

#[async_trait]
pub trait ContractChangeCapability: Send + Sync {
    async fn parse_changes(
        &self,
        spec: &AwaitingSpec,
        changes_text: &str,
    ) -> Result<ParsedChanges, CapabilityError>;
}

#[async_trait]
pub trait ActionCapability: Send + Sync {
    /// Executes a backend-catalog action. `authenticated` selects between the
    /// credentialed endpoint and the explicit test variant.
    async fn execute(
        &self,
        action_type: &str,
        parameters: &BTreeMap<String, Value>,
        client_id: &str,
        authenticated: bool,
    ) -> Result<ActionOutcome, CapabilityError>;
}

#[async_trait]
pub trait SnapshotCapability: Send + Sync {
    async fn fetch(
        &self,
        client: &ClientRef,
        question: &str,
    ) -> Result<SnapshotOutcome, CapabilityError>;
}

#[async_trait]
pub trait HistoryCapability: Send + Sync {
    async fn recent(&self, client_id: &str, limit: usize) -> Result<Vec<Turn>, CapabilityError>;
}

#[async_trait]
pub trait AuthCapability: Send + Sync {
    /// Whether the stored session credential is currently valid. Failures
    /// count as "not authenticated" rather than erroring.
    async fn session_is_valid(&self) -> bool;
}

/// Invoked when an integration capability reports consent is required.
/// `collect` drives the consent flow to completion so the original action
/// can be resumed.
#[async_trait]
pub trait ConsentCollaborator: Send + Sync {
    async fn collect(&self) -> Result<(), CapabilityError>;
}
