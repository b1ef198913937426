use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry. Immutable once appended; transcript insertion order
/// is the only ordering guarantee the presentation layer may rely on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<TurnAttachments>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<TurnAnnotations>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnAttachments {
    #[serde(default)]
    pub chips: Vec<Chip>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ClientSnapshot>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAnnotations {
    pub used_grounded_data: bool,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), attachments: None, annotations: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachments: None,
            annotations: None,
        }
    }

    pub fn with_chips(mut self, chips: Vec<Chip>) -> Self {
        self.attachments.get_or_insert_with(TurnAttachments::default).chips = chips;
        self
    }

    pub fn with_snapshot(mut self, snapshot: ClientSnapshot) -> Self {
        self.attachments.get_or_insert_with(TurnAttachments::default).snapshot = Some(snapshot);
        self
    }

    pub fn grounded(mut self, used_grounded_data: bool) -> Self {
        self.annotations = Some(TurnAnnotations { used_grounded_data });
        self
    }

    pub fn chips(&self) -> &[Chip] {
        self.attachments.as_ref().map(|a| a.chips.as_slice()).unwrap_or_default()
    }
}

/// Discrete follow-on action offered alongside an assistant reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ChipAction {
    AmendContract,
    SelectContractType,
    ReturnToChanges,
    SendForSignature,
    DownloadCopy,
    EmailPdf,
    ClientSnapshot,
    SnapshotSelect,
    /// Backend-defined action type executed through the generic action
    /// capability (e.g. `LEDGER_LOG_EVENT`, `SHOWING_SCHEDULE`).
    Remote(String),
}

impl ChipAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AmendContract => "contract_amend",
            Self::SelectContractType => "select_contract_type",
            Self::ReturnToChanges => "return_to_changes",
            Self::SendForSignature => "send_for_signature",
            Self::DownloadCopy => "download_contract",
            Self::EmailPdf => "email_contract_pdf",
            Self::ClientSnapshot => "client_snapshot",
            Self::SnapshotSelect => "client_snapshot_select",
            Self::Remote(action_type) => action_type,
        }
    }

    /// The backend action catalog key for remotely executed chips.
    pub fn remote_action_type(&self) -> Option<&str> {
        match self {
            Self::SendForSignature => Some("CONTRACT_SEND_SIGNATURE"),
            Self::Remote(action_type) => Some(action_type),
            _ => None,
        }
    }
}

impl From<String> for ChipAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "contract_amend" => Self::AmendContract,
            "select_contract_type" => Self::SelectContractType,
            "return_to_changes" => Self::ReturnToChanges,
            "send_for_signature" => Self::SendForSignature,
            "download_contract" => Self::DownloadCopy,
            "email_contract_pdf" => Self::EmailPdf,
            "client_snapshot" => Self::ClientSnapshot,
            "client_snapshot_select" => Self::SnapshotSelect,
            _ => Self::Remote(value),
        }
    }
}

impl From<ChipAction> for String {
    fn from(value: ChipAction) -> Self {
        value.as_str().to_owned()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chip {
    pub id: String,
    pub label: String,
    pub action: ChipAction,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// SHA-256 over `{action, parameters}`. Identifies the action for the
    /// ledger; execution itself is deliberately not idempotent.
    pub idempotency_key: String,
}

impl Chip {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        action: ChipAction,
        parameters: BTreeMap<String, Value>,
    ) -> Self {
        let idempotency_key = chip_idempotency_key(&action, &parameters);
        Self { id: id.into(), label: label.into(), action, parameters, idempotency_key }
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

fn chip_idempotency_key(action: &ChipAction, parameters: &BTreeMap<String, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.as_str().as_bytes());
    // BTreeMap keeps key order stable, so the digest is deterministic.
    hasher.update(serde_json::to_string(parameters).unwrap_or_default().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Structured CRM snapshot attached to an assistant turn; the presentation
/// layer owns how it renders.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

/// Handle to the currently selected client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub jurisdiction: Option<String>,
}

impl ClientRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), email: None, jurisdiction: None }
    }

    pub fn jurisdiction_or_default(&self) -> &str {
        self.jurisdiction.as_deref().unwrap_or("VA")
    }
}

/// Marker that the next user message must be routed to the contract-change
/// parser instead of general classification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitingSpec {
    pub contract_type: String,
    pub jurisdiction: String,
    pub client_id: String,
}

/// Per-client conversation state. Created when a client becomes selected and
/// discarded on switch; all mutation goes through the named methods so the
/// invariants stay enforceable.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationState {
    client: Option<ClientRef>,
    transcript: Vec<Turn>,
    last_follow_up_body: Option<String>,
    awaiting_input: Option<AwaitingSpec>,
}

impl ConversationState {
    /// The pre-selection lobby: general chat works, client-scoped flows ask
    /// the user to select a client first.
    pub fn unselected() -> Self {
        Self { client: None, transcript: Vec::new(), last_follow_up_body: None, awaiting_input: None }
    }

    pub fn for_client(client: ClientRef) -> Self {
        Self {
            client: Some(client),
            transcript: Vec::new(),
            last_follow_up_body: None,
            awaiting_input: None,
        }
    }

    pub fn with_history(client: ClientRef, transcript: Vec<Turn>) -> Self {
        Self { client: Some(client), transcript, last_follow_up_body: None, awaiting_input: None }
    }

    pub fn client(&self) -> Option<&ClientRef> {
        self.client.as_ref()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn last_follow_up_body(&self) -> Option<&str> {
        self.last_follow_up_body.as_deref()
    }

    pub fn awaiting_input(&self) -> Option<&AwaitingSpec> {
        self.awaiting_input.as_ref()
    }

    pub fn append_turn(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    /// Replaces any stale clarification silently: an abandoned clarifying
    /// question is dropped, never queued behind the new one.
    pub fn set_awaiting(&mut self, spec: AwaitingSpec) {
        self.awaiting_input = Some(spec);
    }

    pub fn clear_awaiting(&mut self) -> Option<AwaitingSpec> {
        self.awaiting_input.take()
    }

    /// Overwrites the previous draft; refinement always refines the single
    /// most recent body.
    pub fn set_last_follow_up(&mut self, body: impl Into<String>) {
        self.last_follow_up_body = Some(body.into());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AwaitingSpec, Chip, ChipAction, ClientRef, ConversationState, Role, Turn};

    fn awaiting(contract_type: &str) -> AwaitingSpec {
        AwaitingSpec {
            contract_type: contract_type.to_owned(),
            jurisdiction: "VA".to_owned(),
            client_id: "c-1".to_owned(),
        }
    }

    #[test]
    fn setting_awaiting_replaces_stale_spec_silently() {
        let mut state = ConversationState::for_client(ClientRef::new("c-1", "Sam Johnson"));
        state.set_awaiting(awaiting("Purchase Offer"));
        state.set_awaiting(awaiting("Lease"));

        assert_eq!(state.awaiting_input().map(|spec| spec.contract_type.as_str()), Some("Lease"));
        assert!(state.clear_awaiting().is_some());
        assert!(state.awaiting_input().is_none());
    }

    #[test]
    fn last_follow_up_body_is_overwritten_not_appended() {
        let mut state = ConversationState::for_client(ClientRef::new("c-1", "Sam Johnson"));
        state.set_last_follow_up("Hi Sam, first draft.");
        state.set_last_follow_up("Hi Sam, shorter.");

        assert_eq!(state.last_follow_up_body(), Some("Hi Sam, shorter."));
    }

    #[test]
    fn transcript_preserves_insertion_order() {
        let mut state = ConversationState::unselected();
        state.append_turn(Turn::user("hello"));
        state.append_turn(Turn::assistant("hi there"));

        let roles = state.turns().iter().map(|turn| turn.role).collect::<Vec<_>>();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn chip_idempotency_key_is_stable_and_parameter_sensitive() {
        let params = |ct: &str| -> std::collections::BTreeMap<String, serde_json::Value> {
            [("contract_type".to_owned(), json!(ct))].into_iter().collect()
        };
        let first = Chip::new("send", "Send", ChipAction::SendForSignature, params("Lease"));
        let second = Chip::new("send", "Send", ChipAction::SendForSignature, params("Lease"));
        let other = Chip::new("send", "Send", ChipAction::SendForSignature, params("Addendum"));

        assert_eq!(first.idempotency_key, second.idempotency_key);
        assert_ne!(first.idempotency_key, other.idempotency_key);
    }

    #[test]
    fn chip_action_round_trips_through_strings() {
        let known = ChipAction::from("return_to_changes".to_owned());
        assert_eq!(known, ChipAction::ReturnToChanges);

        let custom = ChipAction::from("LEDGER_LOG_EVENT".to_owned());
        assert_eq!(custom.remote_action_type(), Some("LEDGER_LOG_EVENT"));
    }

    #[test]
    fn grounded_turn_carries_annotation() {
        let turn = Turn::assistant("Budget is $450k.").grounded(true);
        assert!(turn.annotations.map(|a| a.used_grounded_data).unwrap_or(false));
    }
}
