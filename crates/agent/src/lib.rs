//! Copilot runtime - conversational action routing for Hearth
//!
//! This crate is the turn engine between the presentation layer and the
//! backend capability surface:
//! - **Turn Orchestration** (`orchestrator`) - classify one user input,
//!   route it to the right capability, fold the result into the transcript
//! - **Reply Fallbacks** (`fallback`) - grounded QA, client chat, and general
//!   chat as an ordered chain; only the first usable reply renders
//! - **Chip Dispatch** (`dispatcher`) - replayable follow-on actions, local
//!   and remote, including the consent remediation flow
//! - **Watchdog** (`watchdog`) - bounds how long a turn stays in flight
//!
//! # Surface
//!
//! The presentation layer sees exactly four operations on [`Copilot`]:
//! `select_client`, `submit_user_input`, `execute_chip`, and the read-only
//! transcript (`transcript` / `subscribe`). Every failure becomes a
//! diagnostic turn; nothing throws past the orchestrator boundary.
//!
//! # Concurrency
//!
//! One free-text turn is processed at a time (the presentation layer
//! disables submission while a turn is in flight), but chip execution from an
//! already-rendered turn may interleave with it. Conversation state sits
//! behind a mutex so the interleaving is safe; the logical race is accepted
//! and documented rather than serialized away.

pub mod dispatcher;
pub mod fallback;
pub mod orchestrator;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod testing;

pub use fallback::{
    ChainExhausted, ClientChatStrategy, GeneralChatStrategy, GroundedQaStrategy, ReplyChain,
    ReplyContext, ReplyStrategy, StrategyOutcome, StrategyReply, HISTORY_WINDOW,
    MIN_USEFUL_ANSWER_WORDS,
};
pub use orchestrator::{Copilot, CopilotServices, HISTORY_FETCH_LIMIT};
pub use watchdog::{Watchdog, STALL_WARNING};
