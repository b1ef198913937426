//! Top-level turn orchestration.
//!
//! One user input at a time: classify, call the matching capability through
//! the gateway, update conversation state, append the resulting turns. The
//! transcript is the sole error-reporting channel to the presentation layer;
//! no failure propagates past this boundary.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hearth_core::capabilities::{
    ActionCapability, AuthCapability, ClientChatCapability, ClientQaCapability,
    ConsentCollaborator, ContractChangeCapability, FollowUpCapability, GeneralChatCapability,
    HistoryCapability, ParsedChanges, SnapshotCapability,
};
use hearth_core::intent::{classify, has_generative_vocabulary, Intent};
use hearth_core::transcript::{
    AwaitingSpec, Chip, ChipAction, ClientRef, ConversationState, Turn,
};
use hearth_core::CapabilityError;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::fallback::{
    ClientChatStrategy, GeneralChatStrategy, GroundedQaStrategy, ReplyChain, ReplyContext,
};
use crate::watchdog::{TurnFlight, Watchdog};

/// How much history is seeded from the collaborator on client selection.
pub const HISTORY_FETCH_LIMIT: usize = 50;

pub(crate) const SELECT_CLIENT_FIRST: &str = "Select a client first to generate a follow-up.";
pub(crate) const NO_REFINE_TARGET: &str =
    "No follow-up email to refine yet. Generate one first.";
pub(crate) const PARSE_CHANGES_FAILED: &str =
    "❌ Sorry, I couldn't parse those changes. Please try rephrasing them or be more specific.";

/// Capability handles the copilot routes through; the gateway provides the
/// HTTP implementations, tests provide scripted fakes.
#[derive(Clone)]
pub struct CopilotServices {
    pub follow_up: Arc<dyn FollowUpCapability>,
    pub qa: Arc<dyn ClientQaCapability>,
    pub client_chat: Arc<dyn ClientChatCapability>,
    pub general_chat: Arc<dyn GeneralChatCapability>,
    pub contract_changes: Arc<dyn ContractChangeCapability>,
    pub actions: Arc<dyn ActionCapability>,
    pub snapshots: Arc<dyn SnapshotCapability>,
    pub history: Arc<dyn HistoryCapability>,
    pub auth: Arc<dyn AuthCapability>,
    pub consent: Arc<dyn ConsentCollaborator>,
}

/// The conversational copilot. Public surface: select a client, submit free
/// text, execute a chip, read or subscribe to the transcript. Nothing else.
pub struct Copilot {
    pub(crate) services: CopilotServices,
    pub(crate) state: Arc<Mutex<ConversationState>>,
    pub(crate) revision: Arc<watch::Sender<u64>>,
    flight: Arc<TurnFlight>,
    watchdog: Watchdog,
    chain_with_qa: ReplyChain,
    chain_without_qa: ReplyChain,
}

/// Classification inputs captured under one lock so a concurrently executing
/// chip cannot shear the view of the state mid-turn.
struct TurnSnapshot {
    intent: Intent,
    client: Option<ClientRef>,
    awaiting: Option<AwaitingSpec>,
    last_body: Option<String>,
    prior_turns: Vec<Turn>,
}

impl Copilot {
    pub fn new(services: CopilotServices, turn_timeout: Duration) -> Self {
        let chain_with_qa = ReplyChain::new(vec![
            Arc::new(GroundedQaStrategy::new(services.qa.clone())),
            Arc::new(ClientChatStrategy::new(services.client_chat.clone())),
            Arc::new(GeneralChatStrategy::new(services.general_chat.clone())),
        ]);
        let chain_without_qa = ReplyChain::new(vec![
            Arc::new(ClientChatStrategy::new(services.client_chat.clone())),
            Arc::new(GeneralChatStrategy::new(services.general_chat.clone())),
        ]);

        Self {
            services,
            state: Arc::new(Mutex::new(ConversationState::unselected())),
            revision: Arc::new(watch::channel(0).0),
            flight: Arc::new(TurnFlight::default()),
            watchdog: Watchdog::new(turn_timeout),
            chain_with_qa,
            chain_without_qa,
        }
    }

    /// Discards the previous conversation and seeds a fresh one from the
    /// history collaborator. History fetch failure is non-fatal: the new
    /// conversation just starts empty.
    pub async fn select_client(&self, client: ClientRef) {
        let history = match self.services.history.recent(&client.id, HISTORY_FETCH_LIMIT).await {
            Ok(turns) => turns,
            Err(error) => {
                warn!(
                    event_name = "copilot.history.fetch_failed",
                    client_id = %client.id,
                    error = %error,
                    "seeding an empty transcript"
                );
                Vec::new()
            }
        };
        *self.state.lock().await = ConversationState::with_history(client, history);
        self.notify();
    }

    pub async fn selected_client(&self) -> Option<ClientRef> {
        self.state.lock().await.client().cloned()
    }

    pub async fn transcript(&self) -> Vec<Turn> {
        self.state.lock().await.turns().to_vec()
    }

    /// Read-only change notification: the counter bumps on every append, the
    /// subscriber re-reads `transcript()`.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub async fn submit_user_input(&self, text: &str) {
        let text = text.trim().to_owned();
        if text.is_empty() {
            return;
        }

        let correlation_id = Uuid::new_v4().simple().to_string();
        let snapshot = {
            let mut state = self.state.lock().await;
            let intent = classify(&text, state.awaiting_input(), state.last_follow_up_body());
            let snapshot = TurnSnapshot {
                intent,
                client: state.client().cloned(),
                awaiting: state.awaiting_input().cloned(),
                last_body: state.last_follow_up_body().map(str::to_owned),
                prior_turns: state.turns().to_vec(),
            };
            state.append_turn(Turn::user(text.clone()));
            snapshot
        };
        self.notify();

        info!(
            event_name = "copilot.turn.classified",
            correlation_id = %correlation_id,
            client_id = snapshot.client.as_ref().map(|c| c.id.as_str()).unwrap_or("none"),
            intent = ?snapshot.intent,
            "user input classified"
        );

        let seq = self.flight.begin();
        let guard = self.watchdog.arm(
            self.flight.clone(),
            seq,
            self.state.clone(),
            self.revision.clone(),
        );

        match snapshot.intent {
            Intent::FollowUpRequest => self.handle_follow_up(&snapshot).await,
            Intent::RefineFollowUp => self.handle_refine(&text, &snapshot).await,
            Intent::RefineWithNoTarget => self.append(Turn::assistant(NO_REFINE_TARGET)).await,
            Intent::ContractChangeContinuation => {
                self.handle_contract_changes(&text, &snapshot).await;
            }
            Intent::Question => self.handle_chat(&text, &snapshot, true).await,
            Intent::GenerativeChat => self.handle_chat(&text, &snapshot, false).await,
        }

        self.flight.clear(seq);
        guard.disarm();
    }

    async fn handle_follow_up(&self, snapshot: &TurnSnapshot) {
        let Some(client) = &snapshot.client else {
            self.append(Turn::assistant(SELECT_CLIENT_FIRST)).await;
            return;
        };

        match self.services.follow_up.generate(&client.name).await {
            Ok(body) => {
                let mut state = self.state.lock().await;
                state.set_last_follow_up(body.clone());
                state.append_turn(Turn::assistant(body));
                drop(state);
                self.notify();
            }
            Err(error @ CapabilityError::UnusableReply(_)) => {
                warn!(event_name = "copilot.follow_up.empty", error = %error, "no body to render");
                self.append(Turn::assistant(
                    "No follow-up body returned. This client may have no source notes on file yet.",
                ))
                .await;
            }
            Err(error) => {
                self.append(Turn::assistant(format!(
                    "Failed to generate follow-up: {error}. {}",
                    error.user_hint()
                )))
                .await;
            }
        }
    }

    async fn handle_refine(&self, text: &str, snapshot: &TurnSnapshot) {
        let Some(current) = snapshot.last_body.clone() else {
            self.append(Turn::assistant(NO_REFINE_TARGET)).await;
            return;
        };

        let instruction = refine_instruction(text);
        match self.services.follow_up.refine(&current, &instruction).await {
            Ok(revised) => {
                let mut state = self.state.lock().await;
                state.set_last_follow_up(revised.clone());
                state.append_turn(Turn::assistant(revised));
                drop(state);
                self.notify();
            }
            // the current draft stays untouched on failure
            Err(error) => {
                self.append(Turn::assistant(format!(
                    "Refinement failed: {error}. {}",
                    error.user_hint()
                )))
                .await;
            }
        }
    }

    async fn handle_contract_changes(&self, text: &str, snapshot: &TurnSnapshot) {
        let Some(spec) = snapshot.awaiting.clone() else {
            return;
        };

        self.append(Turn::assistant("⏳ Analyzing your requested changes...")).await;
        let result = self.services.contract_changes.parse_changes(&spec, text).await;

        // A failed parse does not re-arm the clarification; the user must
        // re-trigger it through the edit chip.
        self.state.lock().await.clear_awaiting();

        match result {
            Ok(parsed) => {
                let summary = contract_changes_summary(&parsed);
                let chips = contract_follow_on_chips(&spec.contract_type);
                self.append(Turn::assistant(summary).with_chips(chips)).await;
            }
            Err(error) => {
                warn!(event_name = "copilot.contract.parse_failed", error = %error, "parse rejected");
                self.append(Turn::assistant(PARSE_CHANGES_FAILED)).await;
            }
        }
    }

    async fn handle_chat(&self, text: &str, snapshot: &TurnSnapshot, try_qa: bool) {
        let ctx = ReplyContext {
            client: snapshot.client.as_ref(),
            history: &snapshot.prior_turns,
            wants_generative: has_generative_vocabulary(text),
        };
        let chain = if try_qa && snapshot.client.is_some() {
            &self.chain_with_qa
        } else {
            &self.chain_without_qa
        };

        match chain.respond(text, &ctx).await {
            Ok(reply) => {
                self.append(Turn::assistant(reply.content).grounded(reply.grounded)).await;
            }
            Err(exhausted) => {
                self.append(Turn::assistant(format!(
                    "⚠️ I couldn't get a reply: {}. Check that the backend is reachable (frontend 3000, backend 3001) and retry.",
                    exhausted.last_reason
                )))
                .await;
            }
        }
    }

    pub(crate) async fn append(&self, turn: Turn) {
        self.state.lock().await.append_turn(turn);
        self.notify();
    }

    pub(crate) fn notify(&self) {
        self.revision.send_modify(|value| *value += 1);
    }

    #[cfg(test)]
    pub(crate) async fn debug_state(&self) -> ConversationState {
        self.state.lock().await.clone()
    }
}

fn refine_instruction(text: &str) -> String {
    let lowered = text.to_ascii_lowercase();
    let stripped = if lowered.starts_with("refine:") {
        text[7..].trim()
    } else if lowered.starts_with("refine") {
        text[6..].trim()
    } else {
        text
    };
    if stripped.is_empty() {
        text.to_owned()
    } else {
        stripped.to_owned()
    }
}

fn contract_changes_summary(parsed: &ParsedChanges) -> String {
    let structured = serde_json::to_string_pretty(&parsed.structured_changes)
        .unwrap_or_else(|_| parsed.structured_changes.to_string());
    format!(
        "✅ I've parsed your changes:\n\n{structured}\n\nAffected clauses: {}\n\nHere is your modified contract. Changes are highlighted.",
        parsed.affected_clauses.join(", ")
    )
}

pub(crate) fn contract_follow_on_chips(contract_type: &str) -> Vec<Chip> {
    let params: BTreeMap<String, Value> =
        [("contract_type".to_owned(), json!(contract_type))].into_iter().collect();
    vec![
        Chip::new("send_for_signature", "Send for Signature", ChipAction::SendForSignature, params.clone()),
        Chip::new("download", "Download Copy", ChipAction::DownloadCopy, params.clone()),
        Chip::new("edit_changes", "Edit Changes", ChipAction::ReturnToChanges, params.clone()),
        Chip::new("email_pdf", "Email PDF", ChipAction::EmailPdf, params),
    ]
}
