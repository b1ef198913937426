//! Free-text intent classification.
//!
//! Pure pattern matching over normalized text, isolated behind [`classify`]
//! so the matching rules can evolve without touching the orchestrator.

use crate::transcript::AwaitingSpec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    FollowUpRequest,
    RefineFollowUp,
    /// Refinement asked for with no prior draft to refine. Terminal: the
    /// orchestrator answers with a fixed explanatory turn, no network call.
    RefineWithNoTarget,
    ContractChangeContinuation,
    Question,
    GenerativeChat,
}

/// Deterministic, side-effect-free routing of one user input.
///
/// Decision order, first match wins:
/// 1. an armed contract-changes clarification captures the input outright;
/// 2. follow-up-request phrasing;
/// 3. refinement phrasing, which needs an existing draft to target;
/// 4. factual-question phrasing, unless generative vocabulary also matches
///    (generative wins, so drafting requests never get one-line answers).
pub fn classify(
    text: &str,
    awaiting: Option<&AwaitingSpec>,
    last_follow_up: Option<&str>,
) -> Intent {
    if awaiting.is_some() {
        return Intent::ContractChangeContinuation;
    }

    let normalized = normalize(text);
    if is_follow_up_request(&normalized) {
        return Intent::FollowUpRequest;
    }

    if is_refinement(&normalized) {
        return if last_follow_up.is_some() {
            Intent::RefineFollowUp
        } else {
            Intent::RefineWithNoTarget
        };
    }

    if is_factual_question(&normalized) && !has_generative_vocabulary(text) {
        Intent::Question
    } else {
        Intent::GenerativeChat
    }
}

/// Whether the input asks for drafted prose rather than a looked-up fact.
/// Exposed because the orchestrator applies the same test when deciding to
/// discard a terse grounded answer.
pub fn has_generative_vocabulary(text: &str) -> bool {
    const GENERATIVE: &[&str] = &[
        "draft",
        "write",
        "craft",
        "compose",
        "offer",
        "email",
        "follow up",
        "checklist",
        "plan",
        "strategy",
        "steps",
        "refine",
        "improve",
        "make it",
        "professional",
        "detailed",
        "summary",
        "analyze",
        "analysis",
    ];
    let normalized = normalize(text);
    GENERATIVE.iter().any(|phrase| normalized.contains(phrase))
}

/// Lowercase, fold "follow-up"/"followup" to "follow up", collapse runs of
/// whitespace.
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase().replace("follow-up", "follow up").replace("followup", "follow up");
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_follow_up_request(normalized: &str) -> bool {
    matches!(
        normalized,
        "follow up" | "latest follow up" | "follow up email" | "latest follow up email"
    ) || normalized.contains("generate a follow up")
        || normalized.contains("generate follow up")
}

fn is_refinement(normalized: &str) -> bool {
    const REFINE_OPENERS: &[&str] =
        &["refine", "improve", "edit", "make it", "can you make it", "adjust", "tweak"];
    const TONE_PHRASES: &[&str] = &[
        "more professional",
        "friendlier",
        "more friendly",
        "warmer",
        "shorter",
        "more concise",
        "longer",
        "more detailed",
        "clearer",
        "simpler",
        "less formal",
        "more formal",
    ];

    REFINE_OPENERS.iter().any(|opener| starts_with_word(normalized, opener))
        || TONE_PHRASES.iter().any(|phrase| normalized.contains(phrase))
}

fn is_factual_question(normalized: &str) -> bool {
    const INTERROGATIVES: &[&str] =
        &["what", "when", "where", "who", "which", "does", "do", "is", "are", "has", "have"];
    const FACTUAL_NOUNS: &[&str] = &["budget", "timeline", "city", "status", "email", "phone"];

    let tokens = tokenize(normalized);
    let Some(first) = tokens.first() else {
        return false;
    };

    INTERROGATIVES.contains(&first.as_str())
        || tokens.iter().any(|token| FACTUAL_NOUNS.contains(&token.as_str()))
}

fn starts_with_word(normalized: &str, prefix: &str) -> bool {
    match normalized.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with([' ', ':', ',', '?', '!', '.']),
        None => false,
    }
}

fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .split(|character: char| !character.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_owned())
        .collect()
}
