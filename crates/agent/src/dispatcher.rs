//! Chip action dispatch.
//!
//! Two families: locally resolved chips synthesize the next turn (and may arm
//! the contract-changes clarification) with no network call; remotely
//! resolved chips go through the action-execution capability, after an
//! optimistic "processing" turn. Re-invoking a chip re-runs its action: chips
//! are explicit user-triggered operations, not automatic retries, so
//! execution is deliberately not idempotent.
//!
//! Chip execution is not serialized against an in-flight free-text turn; the
//! state mutex makes the interleaving safe, and the transcript simply records
//! turns in completion order.

use hearth_core::capabilities::SnapshotOutcome;
use hearth_core::transcript::{AwaitingSpec, Chip, ChipAction, ClientRef, Turn};
use serde_json::json;
use tracing::{info, warn};

use crate::orchestrator::Copilot;

const CONTRACT_TYPES: &[(&str, &str)] = &[
    ("ct_offer", "Purchase Offer"),
    ("ct_counter", "Counteroffer"),
    ("ct_addendum", "Addendum"),
    ("ct_lease", "Lease"),
];

impl Copilot {
    /// Executes one chip, appending exactly one result turn (plus an
    /// optimistic "processing" turn for the remote family). Ignored when no
    /// client is selected, matching the surface the chips were rendered for.
    pub async fn execute_chip(&self, chip: &Chip) {
        let client = self.state.lock().await.client().cloned();
        let Some(client) = client else {
            warn!(chip_id = %chip.id, "chip execution ignored: no client selected");
            return;
        };

        info!(
            event_name = "copilot.chip.execute",
            chip_id = %chip.id,
            action = chip.action.as_str(),
            idempotency_key = %chip.idempotency_key,
            client_id = %client.id,
            "executing chip"
        );

        match &chip.action {
            ChipAction::AmendContract => self.chip_amend_menu().await,
            ChipAction::SelectContractType => self.chip_select_contract_type(chip, &client).await,
            ChipAction::ReturnToChanges => self.chip_return_to_changes(chip, &client).await,
            ChipAction::DownloadCopy => self.chip_download(chip).await,
            ChipAction::EmailPdf => self.chip_email_pdf(chip, &client).await,
            ChipAction::ClientSnapshot => self.chip_snapshot(chip, client).await,
            ChipAction::SnapshotSelect => {
                let target = ClientRef {
                    id: chip.param_str("client_id").unwrap_or(&client.id).to_owned(),
                    name: chip.param_str("client_name").unwrap_or(&client.name).to_owned(),
                    email: None,
                    jurisdiction: client.jurisdiction.clone(),
                };
                self.chip_snapshot(chip, target).await;
            }
            ChipAction::SendForSignature | ChipAction::Remote(_) => {
                self.chip_remote(chip, &client).await;
            }
        }
    }

    async fn chip_amend_menu(&self) {
        let chips = CONTRACT_TYPES
            .iter()
            .map(|(id, label)| {
                Chip::new(
                    *id,
                    *label,
                    ChipAction::SelectContractType,
                    [("contract_type".to_owned(), json!(label))].into_iter().collect(),
                )
            })
            .collect();
        self.append(
            Turn::assistant("What type of contract would you like to amend?").with_chips(chips),
        )
        .await;
    }

    async fn chip_select_contract_type(&self, chip: &Chip, client: &ClientRef) {
        let contract_type = chip.param_str("contract_type").unwrap_or(&chip.label).to_owned();
        self.append(Turn::user(chip.label.clone())).await;

        let prompt = format!(
            "Great! I'll help you amend the {contract_type}. What would you like to change?\n\nPlease describe the changes you'd like to make (e.g., \"Move closing to Aug 15, add $5,000 seller credit, change escrow to $10,000 due in 3 days\")."
        );
        let mut state = self.state.lock().await;
        state.append_turn(Turn::assistant(prompt));
        state.set_awaiting(awaiting_for(&contract_type, client));
        drop(state);
        self.notify();
    }

    async fn chip_return_to_changes(&self, chip: &Chip, client: &ClientRef) {
        let contract_type = chip.param_str("contract_type").unwrap_or(&chip.label).to_owned();
        let prompt = format!(
            "What would you like to change about the {contract_type}?\n\nPlease describe the new changes you'd like to make."
        );
        let mut state = self.state.lock().await;
        state.append_turn(Turn::assistant(prompt));
        state.set_awaiting(awaiting_for(&contract_type, client));
        drop(state);
        self.notify();
    }

    async fn chip_download(&self, chip: &Chip) {
        let contract_type = chip.param_str("contract_type").unwrap_or("contract");
        self.append(Turn::assistant(format!(
            "📄 Your {contract_type} has been prepared and is ready to download. Would you like me to email it to someone?"
        )))
        .await;
    }

    async fn chip_email_pdf(&self, chip: &Chip, client: &ClientRef) {
        let contract_type = chip.param_str("contract_type").unwrap_or("contract");
        let recipient = client.email.as_deref().unwrap_or("the client's email on file");
        self.append(Turn::assistant(format!(
            "📧 PDF emailed to {recipient} with subject \"Updated {contract_type}: Please Review\". The contract includes all your requested modifications."
        )))
        .await;
    }

    async fn chip_snapshot(&self, chip: &Chip, target: ClientRef) {
        self.append(Turn::user(chip.label.clone())).await;
        self.append(Turn::assistant(format!("⏳ Fetching client snapshot for {}...", target.name)))
            .await;

        match self.services.snapshots.fetch(&target, "client snapshot").await {
            Ok(SnapshotOutcome::Found(snapshot)) => {
                self.append(
                    Turn::assistant("Here's the latest client snapshot.")
                        .with_snapshot(snapshot)
                        .grounded(true),
                )
                .await;
            }
            Ok(SnapshotOutcome::Multiple(options)) => {
                let chips = options
                    .iter()
                    .enumerate()
                    .map(|(index, option)| {
                        Chip::new(
                            format!("snapshot_select_{index}"),
                            option.name.clone(),
                            ChipAction::SnapshotSelect,
                            [
                                ("client_id".to_owned(), json!(option.client_id)),
                                ("client_name".to_owned(), json!(option.name)),
                            ]
                            .into_iter()
                            .collect(),
                        )
                    })
                    .collect();
                self.append(
                    Turn::assistant("Multiple clients found. Please select one:").with_chips(chips),
                )
                .await;
            }
            Ok(SnapshotOutcome::NotFound(message)) => {
                self.append(Turn::assistant(format!("❌ {message}"))).await;
            }
            Err(error) => {
                self.append(Turn::assistant(format!(
                    "❌ Failed to fetch client snapshot: {error}. {}",
                    error.user_hint()
                )))
                .await;
            }
        }
    }

    async fn chip_remote(&self, chip: &Chip, client: &ClientRef) {
        self.append(Turn::assistant(format!("⏳ Processing: {}...", chip.label))).await;

        let action_type = chip.action.remote_action_type().unwrap_or(chip.action.as_str());
        let authenticated = self.services.auth.session_is_valid().await;
        let result = self
            .services
            .actions
            .execute(action_type, &chip.parameters, &client.id, authenticated)
            .await;

        match result {
            Ok(outcome) => self.append(Turn::assistant(outcome.message)).await,
            Err(error) if error.is_consent_required() => {
                self.remediate_consent_and_resume(chip, client, action_type).await;
            }
            Err(error) => {
                self.append(Turn::assistant(format!(
                    "❌ Failed: {}: {error}. {}",
                    chip.label,
                    error.user_hint()
                )))
                .await;
            }
        }
    }

    /// A `consent_required` domain error is never surfaced raw: collect
    /// consent through the collaborator, then resume the original action.
    async fn remediate_consent_and_resume(
        &self,
        chip: &Chip,
        client: &ClientRef,
        action_type: &str,
    ) {
        self.append(Turn::assistant(format!(
            "🔐 The integration needs your consent before I can run \"{}\". Starting the consent flow now; the action resumes automatically once consent completes.",
            chip.label
        )))
        .await;

        if let Err(error) = self.services.consent.collect().await {
            self.append(Turn::assistant(format!(
                "❌ Consent was not completed: {error}. {}",
                error.user_hint()
            )))
            .await;
            return;
        }

        let authenticated = self.services.auth.session_is_valid().await;
        match self
            .services
            .actions
            .execute(action_type, &chip.parameters, &client.id, authenticated)
            .await
        {
            Ok(outcome) => self.append(Turn::assistant(outcome.message)).await,
            Err(error) => {
                self.append(Turn::assistant(format!(
                    "❌ Failed: {}: {error}. {}",
                    chip.label,
                    error.user_hint()
                )))
                .await;
            }
        }
    }
}

fn awaiting_for(contract_type: &str, client: &ClientRef) -> AwaitingSpec {
    AwaitingSpec {
        contract_type: contract_type.to_owned(),
        jurisdiction: client.jurisdiction_or_default().to_owned(),
        client_id: client.id.clone(),
    }
}
