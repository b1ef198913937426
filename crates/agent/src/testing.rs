//! Scripted in-memory capability fakes shared across the crate's tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hearth_core::capabilities::{
    ActionCapability, ActionOutcome, AuthCapability, ClientChatCapability, ClientQaCapability,
    ConsentCollaborator, ContractChangeCapability, FollowUpCapability, GeneralChatCapability,
    GroundedReply, HistoryCapability, ParsedChanges, SnapshotCapability, SnapshotOption,
    SnapshotOutcome,
};
use hearth_core::transcript::{AwaitingSpec, ClientRef, ClientSnapshot, Turn};
use hearth_core::CapabilityError;
use serde_json::Value;

use crate::orchestrator::CopilotServices;

fn transport(message: &str) -> CapabilityError {
    CapabilityError::Transport(message.to_owned())
}

pub struct ScriptedFollowUp {
    generate_outcome: Result<String, CapabilityError>,
    refine_outcome: Result<String, CapabilityError>,
    pub generate_calls: Mutex<Vec<String>>,
    pub refine_calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedFollowUp {
    pub fn generating(body: &str) -> Self {
        Self {
            generate_outcome: Ok(body.to_owned()),
            refine_outcome: Err(transport("refine unscripted")),
            generate_calls: Mutex::new(Vec::new()),
            refine_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn generating_and_refining(body: &str, refined: &str) -> Self {
        Self {
            generate_outcome: Ok(body.to_owned()),
            refine_outcome: Ok(refined.to_owned()),
            generate_calls: Mutex::new(Vec::new()),
            refine_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn refining(body: &str) -> Self {
        Self {
            generate_outcome: Err(transport("generate unscripted")),
            refine_outcome: Ok(body.to_owned()),
            generate_calls: Mutex::new(Vec::new()),
            refine_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self {
            generate_outcome: Err(error.clone()),
            refine_outcome: Err(error),
            generate_calls: Mutex::new(Vec::new()),
            refine_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FollowUpCapability for ScriptedFollowUp {
    async fn generate(&self, client_name: &str) -> Result<String, CapabilityError> {
        self.generate_calls.lock().expect("lock").push(client_name.to_owned());
        self.generate_outcome.clone()
    }

    async fn refine(
        &self,
        current_body: &str,
        instruction: &str,
    ) -> Result<String, CapabilityError> {
        self.refine_calls
            .lock()
            .expect("lock")
            .push((current_body.to_owned(), instruction.to_owned()));
        self.refine_outcome.clone()
    }
}

/// Follow-up capability whose calls never resolve; drives watchdog tests.
pub struct HangingFollowUp;

#[async_trait]
impl FollowUpCapability for HangingFollowUp {
    async fn generate(&self, _client_name: &str) -> Result<String, CapabilityError> {
        std::future::pending::<()>().await;
        unreachable!()
    }

    async fn refine(
        &self,
        _current_body: &str,
        _instruction: &str,
    ) -> Result<String, CapabilityError> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

pub struct ScriptedQa {
    outcome: Result<GroundedReply, CapabilityError>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedQa {
    pub fn replying(reply: &str, grounded: bool) -> Self {
        Self {
            outcome: Ok(GroundedReply { reply: reply.to_owned(), grounded }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self { outcome: Err(transport(message)), calls: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }
}

#[async_trait]
impl ClientQaCapability for ScriptedQa {
    async fn answer(
        &self,
        _client_name: &str,
        question: &str,
        _history: &[Turn],
    ) -> Result<GroundedReply, CapabilityError> {
        self.calls.lock().expect("lock").push(question.to_owned());
        self.outcome.clone()
    }
}

pub struct ScriptedClientChat {
    outcome: Result<GroundedReply, CapabilityError>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClientChat {
    pub fn replying(reply: &str, grounded: bool) -> Self {
        Self {
            outcome: Ok(GroundedReply { reply: reply.to_owned(), grounded }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self { outcome: Err(transport(message)), calls: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }
}

#[async_trait]
impl ClientChatCapability for ScriptedClientChat {
    async fn reply(
        &self,
        _client_name: &str,
        question: &str,
        _history: &[Turn],
    ) -> Result<GroundedReply, CapabilityError> {
        self.calls.lock().expect("lock").push(question.to_owned());
        self.outcome.clone()
    }
}

pub struct ScriptedGeneralChat {
    outcome: Result<String, CapabilityError>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedGeneralChat {
    pub fn replying(reply: &str) -> Self {
        Self { outcome: Ok(reply.to_owned()), calls: Mutex::new(Vec::new()) }
    }

    pub fn failing(message: &str) -> Self {
        Self { outcome: Err(transport(message)), calls: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }

    /// Message contents from the most recent call.
    pub fn last_message_contents(&self) -> Vec<String> {
        self.calls.lock().expect("lock").last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GeneralChatCapability for ScriptedGeneralChat {
    async fn reply(&self, messages: &[Turn]) -> Result<String, CapabilityError> {
        self.calls
            .lock()
            .expect("lock")
            .push(messages.iter().map(|turn| turn.content.clone()).collect());
        self.outcome.clone()
    }
}

pub struct ScriptedChanges {
    outcome: Result<ParsedChanges, CapabilityError>,
    pub calls: Mutex<Vec<(AwaitingSpec, String)>>,
}

impl ScriptedChanges {
    pub fn parsing(parsed: ParsedChanges) -> Self {
        Self { outcome: Ok(parsed), calls: Mutex::new(Vec::new()) }
    }

    pub fn failing(message: &str) -> Self {
        Self { outcome: Err(transport(message)), calls: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl ContractChangeCapability for ScriptedChanges {
    async fn parse_changes(
        &self,
        spec: &AwaitingSpec,
        changes_text: &str,
    ) -> Result<ParsedChanges, CapabilityError> {
        self.calls.lock().expect("lock").push((spec.clone(), changes_text.to_owned()));
        self.outcome.clone()
    }
}

pub struct ScriptedActions {
    outcomes: Mutex<VecDeque<Result<ActionOutcome, CapabilityError>>>,
    pub calls: Mutex<Vec<(String, String, bool)>>,
}

impl ScriptedActions {
    pub fn completing(message: &str) -> Self {
        Self::with(vec![Ok(ActionOutcome { message: message.to_owned() })])
    }

    pub fn with(outcomes: Vec<Result<ActionOutcome, CapabilityError>>) -> Self {
        Self { outcomes: Mutex::new(outcomes.into()), calls: Mutex::new(Vec::new()) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }
}

#[async_trait]
impl ActionCapability for ScriptedActions {
    async fn execute(
        &self,
        action_type: &str,
        _parameters: &BTreeMap<String, Value>,
        client_id: &str,
        authenticated: bool,
    ) -> Result<ActionOutcome, CapabilityError> {
        self.calls.lock().expect("lock").push((
            action_type.to_owned(),
            client_id.to_owned(),
            authenticated,
        ));
        let mut outcomes = self.outcomes.lock().expect("lock");
        match outcomes.len() {
            0 => Ok(ActionOutcome { message: "Action completed successfully".to_owned() }),
            1 => outcomes.front().cloned().unwrap_or_else(|| unreachable!()),
            _ => outcomes.pop_front().unwrap_or_else(|| unreachable!()),
        }
    }
}

pub struct ScriptedSnapshots {
    outcome: Result<SnapshotOutcome, CapabilityError>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedSnapshots {
    pub fn found(snapshot: ClientSnapshot) -> Self {
        Self { outcome: Ok(SnapshotOutcome::Found(snapshot)), calls: Mutex::new(Vec::new()) }
    }

    pub fn multiple(options: Vec<SnapshotOption>) -> Self {
        Self { outcome: Ok(SnapshotOutcome::Multiple(options)), calls: Mutex::new(Vec::new()) }
    }

    pub fn not_found(message: &str) -> Self {
        Self {
            outcome: Ok(SnapshotOutcome::NotFound(message.to_owned())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self { outcome: Err(transport(message)), calls: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl SnapshotCapability for ScriptedSnapshots {
    async fn fetch(
        &self,
        client: &ClientRef,
        question: &str,
    ) -> Result<SnapshotOutcome, CapabilityError> {
        self.calls.lock().expect("lock").push((client.id.clone(), question.to_owned()));
        self.outcome.clone()
    }
}

pub struct ScriptedHistory {
    outcome: Result<Vec<Turn>, CapabilityError>,
}

impl ScriptedHistory {
    pub fn with(turns: Vec<Turn>) -> Self {
        Self { outcome: Ok(turns) }
    }

    pub fn empty() -> Self {
        Self::with(Vec::new())
    }

    pub fn failing(message: &str) -> Self {
        Self { outcome: Err(transport(message)) }
    }
}

#[async_trait]
impl HistoryCapability for ScriptedHistory {
    async fn recent(&self, _client_id: &str, _limit: usize) -> Result<Vec<Turn>, CapabilityError> {
        self.outcome.clone()
    }
}

pub struct FixedAuth(pub bool);

#[async_trait]
impl AuthCapability for FixedAuth {
    async fn session_is_valid(&self) -> bool {
        self.0
    }
}

pub struct ScriptedConsent {
    outcome: Result<(), CapabilityError>,
    calls: Mutex<usize>,
}

impl ScriptedConsent {
    pub fn granting() -> Self {
        Self { outcome: Ok(()), calls: Mutex::new(0) }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self { outcome: Err(error), calls: Mutex::new(0) }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().expect("lock")
    }
}

#[async_trait]
impl ConsentCollaborator for ScriptedConsent {
    async fn collect(&self) -> Result<(), CapabilityError> {
        *self.calls.lock().expect("lock") += 1;
        self.outcome.clone()
    }
}

/// Baseline service wiring where every capability fails loudly; tests swap in
/// the fakes they actually exercise.
pub fn unscripted_services() -> CopilotServices {
    CopilotServices {
        follow_up: Arc::new(ScriptedFollowUp::failing(transport("follow-up unscripted"))),
        qa: Arc::new(ScriptedQa::failing("qa unscripted")),
        client_chat: Arc::new(ScriptedClientChat::failing("client chat unscripted")),
        general_chat: Arc::new(ScriptedGeneralChat::failing("general chat unscripted")),
        contract_changes: Arc::new(ScriptedChanges::failing("changes unscripted")),
        actions: Arc::new(ScriptedActions::with(vec![Err(transport("actions unscripted"))])),
        snapshots: Arc::new(ScriptedSnapshots::failing("snapshots unscripted")),
        history: Arc::new(ScriptedHistory::empty()),
        auth: Arc::new(FixedAuth(false)),
        consent: Arc::new(ScriptedConsent::failing(transport("consent unscripted"))),
    }
}
