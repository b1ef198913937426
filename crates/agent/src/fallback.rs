//! Ordered reply strategies for question and chat turns.
//!
//! The "try grounded QA, then client chat, then general chat" cascade is an
//! explicit chain: each strategy either produces a usable reply or says why
//! it could not, and only the first usable reply is rendered.

use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::capabilities::{
    ClientChatCapability, ClientQaCapability, GeneralChatCapability,
};
use hearth_core::transcript::{ClientRef, Turn};
use thiserror::Error;
use tracing::debug;

/// Grounded answers shorter than this read as truncated rather than helpful
/// and are discarded in favor of the generative path.
pub const MIN_USEFUL_ANSWER_WORDS: usize = 8;

/// Client-scoped capabilities get this many recent turns as context; the
/// general chat fallback gets the full list.
pub const HISTORY_WINDOW: usize = 6;

/// Canned filler the legacy plan endpoint appends to everything.
const FILLER_SENTENCE: &str = "let me know what you would like to do next.";

#[derive(Clone, Debug)]
pub struct ReplyContext<'a> {
    pub client: Option<&'a ClientRef>,
    /// Recent turns *before* the input being answered.
    pub history: &'a [Turn],
    /// Whether the input carries generative vocabulary; terse grounded
    /// answers are discarded for such inputs.
    pub wants_generative: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StrategyReply {
    pub content: String,
    pub grounded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StrategyOutcome {
    Reply(StrategyReply),
    Unusable(String),
}

#[async_trait]
pub trait ReplyStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn attempt(&self, input: &str, ctx: &ReplyContext<'_>) -> StrategyOutcome;
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no strategy produced a usable reply: {last_reason}")]
pub struct ChainExhausted {
    pub last_reason: String,
}

pub struct ReplyChain {
    strategies: Vec<Arc<dyn ReplyStrategy>>,
}

impl ReplyChain {
    pub fn new(strategies: Vec<Arc<dyn ReplyStrategy>>) -> Self {
        Self { strategies }
    }

    /// Attempts every strategy in order; the first usable reply wins.
    pub async fn respond(
        &self,
        input: &str,
        ctx: &ReplyContext<'_>,
    ) -> Result<StrategyReply, ChainExhausted> {
        let mut last_reason = "no reply strategies configured".to_owned();
        for strategy in &self.strategies {
            match strategy.attempt(input, ctx).await {
                StrategyOutcome::Reply(reply) => return Ok(reply),
                StrategyOutcome::Unusable(reason) => {
                    debug!(strategy = strategy.name(), reason = %reason, "reply strategy fell through");
                    last_reason = reason;
                }
            }
        }
        Err(ChainExhausted { last_reason })
    }
}

/// Client-scoped QA: precise, sheet-grounded, but prone to terse answers.
pub struct GroundedQaStrategy {
    qa: Arc<dyn ClientQaCapability>,
}

impl GroundedQaStrategy {
    pub fn new(qa: Arc<dyn ClientQaCapability>) -> Self {
        Self { qa }
    }
}

#[async_trait]
impl ReplyStrategy for GroundedQaStrategy {
    fn name(&self) -> &'static str {
        "grounded_qa"
    }

    async fn attempt(&self, input: &str, ctx: &ReplyContext<'_>) -> StrategyOutcome {
        let Some(client) = ctx.client else {
            return StrategyOutcome::Unusable("no client selected".to_owned());
        };

        match self.qa.answer(&client.name, input, recent(ctx.history)).await {
            Ok(answer) => {
                if ctx.wants_generative {
                    return StrategyOutcome::Unusable(
                        "input wants drafted prose, not a lookup".to_owned(),
                    );
                }
                if word_count(&answer.reply) < MIN_USEFUL_ANSWER_WORDS {
                    return StrategyOutcome::Unusable(
                        "grounded answer below usefulness threshold".to_owned(),
                    );
                }
                StrategyOutcome::Reply(StrategyReply {
                    content: answer.reply,
                    grounded: answer.grounded,
                })
            }
            Err(error) => StrategyOutcome::Unusable(error.to_string()),
        }
    }
}

/// Hybrid client chat: broader responses, still client grounded.
pub struct ClientChatStrategy {
    chat: Arc<dyn ClientChatCapability>,
}

impl ClientChatStrategy {
    pub fn new(chat: Arc<dyn ClientChatCapability>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl ReplyStrategy for ClientChatStrategy {
    fn name(&self) -> &'static str {
        "client_chat"
    }

    async fn attempt(&self, input: &str, ctx: &ReplyContext<'_>) -> StrategyOutcome {
        let Some(client) = ctx.client else {
            return StrategyOutcome::Unusable("no client selected".to_owned());
        };

        match self.chat.reply(&client.name, input, recent(ctx.history)).await {
            Ok(reply) if !reply.reply.trim().is_empty() => {
                StrategyOutcome::Reply(StrategyReply {
                    content: reply.reply,
                    grounded: reply.grounded,
                })
            }
            Ok(_) => StrategyOutcome::Unusable("client chat returned an empty reply".to_owned()),
            Err(error) => StrategyOutcome::Unusable(error.to_string()),
        }
    }
}

/// Last resort: the general-purpose chat capability with the full recent
/// message list as context.
pub struct GeneralChatStrategy {
    general: Arc<dyn GeneralChatCapability>,
}

impl GeneralChatStrategy {
    pub fn new(general: Arc<dyn GeneralChatCapability>) -> Self {
        Self { general }
    }
}

#[async_trait]
impl ReplyStrategy for GeneralChatStrategy {
    fn name(&self) -> &'static str {
        "general_chat"
    }

    async fn attempt(&self, input: &str, ctx: &ReplyContext<'_>) -> StrategyOutcome {
        let mut messages = ctx.history.to_vec();
        messages.push(Turn::user(input));

        match self.general.reply(&messages).await {
            Ok(reply) => {
                let sanitized = remove_filler(&reply);
                if sanitized.is_empty() {
                    StrategyOutcome::Unusable("general chat returned an empty reply".to_owned())
                } else {
                    StrategyOutcome::Reply(StrategyReply { content: sanitized, grounded: false })
                }
            }
            Err(error) => StrategyOutcome::Unusable(error.to_string()),
        }
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn recent(history: &[Turn]) -> &[Turn] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}

fn remove_filler(reply: &str) -> String {
    let mut sanitized = String::with_capacity(reply.len());
    let lowered = reply.to_ascii_lowercase();
    let mut cursor = 0;
    while let Some(found) = lowered[cursor..].find(FILLER_SENTENCE) {
        sanitized.push_str(&reply[cursor..cursor + found]);
        cursor += found + FILLER_SENTENCE.len();
    }
    sanitized.push_str(&reply[cursor..]);
    sanitized.trim().to_owned()
}
