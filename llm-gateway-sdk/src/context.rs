//! # Context Window Manager
//!
//! Trims a chat request's `messages[]` so the estimated prompt token count
//! fits within a per-mapping token budget before the request ever reaches an
//! upstream provider. Tokenizer selection is approximate by design: exact
//! counts require the provider's own tokenizer, which most providers don't
//! expose over the wire, so this estimates using the closest open
//! implementation available and degrades to a cheap heuristic on failure.
//!
//! ## Algorithm
//!
//! 1. Pick a tokenizer for the mapping's declared [`TokenizerType`].
//! 2. Count tokens per message (role overhead plus content).
//! 3. Never drop the system message(s) or the final user message.
//! 4. Drop the oldest droppable messages until the total fits `budget -
//!    reserve`, where `reserve` defaults to `max_tokens` or a floor if unset.
//! 5. If still over budget once nothing else can be dropped, fail with a
//!    [`ProviderError::ValidationError`] — the caller should not silently
//!    send a request that will be rejected upstream for quota reasons it
//!    could have caught locally.

use crate::error::ProviderError;
use crate::models::{ChatRequest, Message, Role};
use tiktoken_rs::CoreBPE;

/// Default reserve (in tokens) held back for the completion when the
/// request doesn't specify `max_tokens`.
const DEFAULT_RESERVE_TOKENS: u32 = 512;

/// Per-message overhead tokens, following the OpenAI chat-format convention
/// (role + message framing), applied uniformly across tokenizer choices
/// since none of the non-OpenAI dialects publish their own overhead constant.
const TOKENS_PER_MESSAGE: u32 = 3;

/// Tokenizer family used to estimate token counts for a model mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerType {
    /// GPT-3.5/GPT-4 family (OpenAI, Azure, most OpenAI-compatible dialects).
    Cl100kBase,
    /// Older GPT-3 family (text-davinci-*, and some completions-era models).
    P50kBase,
    /// No published open tokenizer for Claude; approximated by characters
    /// per token, calibrated closer to Anthropic's published average than
    /// the generic fallback.
    Claude,
    /// No published open tokenizer for Llama either; same character-based
    /// approximation, calibrated to Llama's typically denser token/word ratio.
    Llama,
    /// Generic 4-characters-per-token estimator, used when a mapping
    /// declares no tokenizer type or names one this module doesn't recognize.
    #[allow(clippy::enum_variant_names)]
    CharEstimate,
}

impl TokenizerType {
    /// Parses a mapping's `tokenizer_type` config string, falling back to
    /// [`TokenizerType::CharEstimate`] for anything unrecognized rather than
    /// failing the request over a config typo.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "cl100k_base" | "cl100k" => Self::Cl100kBase,
            "p50k_base" | "p50k" => Self::P50kBase,
            "claude" => Self::Claude,
            "llama" => Self::Llama,
            _ => Self::CharEstimate,
        }
    }
}

fn bpe_for(tokenizer: TokenizerType) -> Option<&'static CoreBPE> {
    match tokenizer {
        TokenizerType::Cl100kBase => Some(tiktoken_rs::cl100k_base_singleton()),
        TokenizerType::P50kBase => Some(tiktoken_rs::p50k_base_singleton()),
        TokenizerType::Claude | TokenizerType::Llama | TokenizerType::CharEstimate => None,
    }
}

/// Characters-per-token divisors used by the non-BPE estimators.
fn chars_per_token(tokenizer: TokenizerType) -> f32 {
    match tokenizer {
        TokenizerType::Claude => 3.5,
        TokenizerType::Llama => 3.8,
        _ => 4.0,
    }
}

/// Estimates the token count of a single string under the given tokenizer.
/// Falls back to the character-count heuristic for tokenizer families with
/// no BPE encoder available (Claude, Llama, CharEstimate).
fn estimate_tokens(text: &str, tokenizer: TokenizerType) -> u32 {
    match bpe_for(tokenizer) {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
        None => (text.chars().count() as f32 / chars_per_token(tokenizer)).ceil() as u32,
    }
}

fn message_tokens(message: &Message, tokenizer: TokenizerType) -> u32 {
    TOKENS_PER_MESSAGE + 1 + estimate_tokens(&message.content.as_text(), tokenizer)
}

/// Whether a message must never be dropped by the trimmer: every `system`
/// message, and the last message overall if it's a `user` turn.
fn is_protected(index: usize, messages: &[Message]) -> bool {
    if messages[index].role == Role::System {
        return true;
    }
    index == messages.len() - 1 && messages[index].role == Role::User
}

/// Trims `request.messages` in place so the estimated prompt token count
/// fits `budget - reserve`. `reserve` is `request.max_tokens` if set, else
/// [`DEFAULT_RESERVE_TOKENS`]. Returns `Validation` if the protected
/// messages alone already exceed the budget.
///
/// On any tokenizer failure the request is degraded-passed-through
/// unchanged (logged, not raised) per the spec's degraded-operation
/// principle: the upstream may still reject an oversized request, and that
/// rejection is the correct place to surface the failure.
pub fn trim_to_budget(
    request: &mut ChatRequest,
    tokenizer: TokenizerType,
    budget: u32,
) -> Result<(), ProviderError> {
    if request.messages.is_empty() {
        return Ok(());
    }

    let reserve = request.max_tokens.unwrap_or(DEFAULT_RESERVE_TOKENS);
    let allowance = budget.saturating_sub(reserve);

    let original = request.messages.clone();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        trim_loop(&mut request.messages, tokenizer, allowance)
    }));

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            tracing::warn!(
                tokenizer = ?tokenizer,
                "context trimming failed, passing the request through unchanged"
            );
            request.messages = original;
            Ok(())
        }
    }
}

/// Drop oldest droppable messages first until `messages` fits `allowance`.
/// Re-scans from the front each time a message is removed rather than
/// tracking indices, since removal shifts everything after it and the
/// message count is small enough that this is not a hot-path concern.
fn trim_loop(
    messages: &mut Vec<Message>,
    tokenizer: TokenizerType,
    allowance: u32,
) -> Result<(), ProviderError> {
    let mut total: u32 = messages.iter().map(|m| message_tokens(m, tokenizer)).sum();

    loop {
        if total <= allowance {
            return Ok(());
        }

        let droppable_index = messages
            .iter()
            .enumerate()
            .find(|(i, _)| !is_protected(*i, &messages[..]))
            .map(|(i, _)| i);

        match droppable_index {
            Some(i) => {
                total -= message_tokens(&messages[i], tokenizer);
                messages.remove(i);
            }
            None => {
                return Err(ProviderError::ValidationError {
                    field: "messages".to_string(),
                    message: format!(
                        "prompt exceeds the context window even after trimming all droppable \
                         messages ({total} tokens estimated, {allowance} available)"
                    ),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    fn long_message(role_ctor: fn(&str) -> Message, words: usize) -> Message {
        role_ctor(&"word ".repeat(words))
    }

    #[test]
    fn leaves_request_untouched_when_under_budget() {
        let mut request = ChatRequest {
            messages: vec![Message::system("be terse"), Message::user("hi")],
            ..Default::default()
        };
        trim_to_budget(&mut request, TokenizerType::CharEstimate, 4096).unwrap();
        assert_eq!(request.messages.len(), 2);
    }

    #[test]
    fn never_drops_system_or_final_user_message() {
        let mut request = ChatRequest {
            messages: vec![
                Message::system("be terse"),
                long_message(Message::user, 500),
                long_message(Message::assistant, 500),
                Message::user("what did I just say?"),
            ],
            ..Default::default()
        };
        trim_to_budget(&mut request, TokenizerType::CharEstimate, 200).unwrap();
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(
            request.messages.last().unwrap().content.as_text(),
            "what did I just say?"
        );
    }

    #[test]
    fn drops_oldest_droppable_messages_first() {
        let mut request = ChatRequest {
            messages: vec![
                Message::user("oldest"),
                Message::assistant("middle"),
                long_message(Message::user, 2000),
            ],
            ..Default::default()
        };
        trim_to_budget(&mut request, TokenizerType::CharEstimate, 300).unwrap();
        assert!(!request
            .messages
            .iter()
            .any(|m| m.content.as_text() == "oldest"));
    }

    #[test]
    fn raises_validation_when_protected_messages_alone_exceed_budget() {
        let mut request = ChatRequest {
            messages: vec![Message::system("be terse"), long_message(Message::user, 5000)],
            max_tokens: Some(0),
            ..Default::default()
        };
        let err = trim_to_budget(&mut request, TokenizerType::CharEstimate, 10).unwrap_err();
        assert!(matches!(err, ProviderError::ValidationError { .. }));
    }

    #[test]
    fn parses_known_tokenizer_names_case_insensitively() {
        assert_eq!(TokenizerType::parse("CL100K_BASE"), TokenizerType::Cl100kBase);
        assert_eq!(TokenizerType::parse("p50k_base"), TokenizerType::P50kBase);
        assert_eq!(TokenizerType::parse("claude"), TokenizerType::Claude);
        assert_eq!(TokenizerType::parse("llama"), TokenizerType::Llama);
        assert_eq!(TokenizerType::parse("unknown-model"), TokenizerType::CharEstimate);
    }
}
