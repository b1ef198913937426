//! Conversational routing core for the Hearth copilot.
//!
//! This crate is the pure-domain layer: the transcript data model, per-client
//! conversation state, free-text intent classification, the capability seams
//! the runtime calls through, and configuration. It performs no I/O of its
//! own; the gateway crate talks HTTP, the agent crate orchestrates turns.
//!
//! # Key Types
//!
//! - `ConversationState` - transcript, refinement target, and pending
//!   clarification, with all mutation through named methods
//! - `Intent` / `classify` - deterministic routing of one user input
//! - capability traits (`FollowUpCapability`, `ClientQaCapability`, ...) -
//!   opaque backend collaborators
//! - `CapabilityError` - the failure taxonomy every call is reduced to

pub mod capabilities;
pub mod config;
pub mod errors;
pub mod intent;
pub mod transcript;

pub use capabilities::{
    ActionCapability, ActionOutcome, AuthCapability, ClientChatCapability, ClientQaCapability,
    ConsentCollaborator, ContractChangeCapability, FollowUpCapability, GeneralChatCapability,
    GroundedReply, HistoryCapability, ParsedChanges, SnapshotCapability, SnapshotOption,
    SnapshotOutcome,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::CapabilityError;
pub use intent::{classify, has_generative_vocabulary, Intent};
pub use transcript::{
    AwaitingSpec, Chip, ChipAction, ClientRef, ClientSnapshot, ConversationState, Role, Turn,
    TurnAnnotations, TurnAttachments,
};
