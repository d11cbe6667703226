//! Translate `OpenAI` chat requests into Bito chat requests.
//!
//! Bito has no message list: it takes one prompt plus prior question/answer
//! pairs. System messages are folded into the prompt, the most recent turn
//! becomes the prompt body, and earlier user/assistant turns are paired up as
//! context.

use super::bito_types::{BitoRequest, ContextPair, CustomLlmConfig};
use super::openai_types::{ChatCompletionRequest, ChatMessage, Role};
use crate::config::BackendConfig;
use crate::error::{ProxyError, Result};

const DEFAULT_TEMPERATURE: f64 = 0.7;

/// The flattened conversation Bito consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationInput {
    pub prompt: String,
    pub context: Vec<ContextPair>,
}

/// Flatten a conversation into a prompt and context pairs.
///
/// The last user/assistant message becomes the prompt body regardless of its
/// role. Earlier turns contribute a [`ContextPair`] only where a `user` message
/// is immediately followed by an `assistant` message; unpaired turns are
/// dropped.
///
/// # Errors
/// `EmptyConversation` for an empty slice, `NoActionableTurn` when there are
/// neither user/assistant turns nor system content.
pub fn build_prompt_context(messages: &[ChatMessage]) -> Result<TranslationInput> {
    if messages.is_empty() {
        return Err(ProxyError::EmptyConversation);
    }

    let system_prompts = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(ChatMessage::text)
        .collect::<Vec<_>>()
        .join("\n");

    let turns: Vec<(Role, String)> = messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .map(|m| (m.role, m.text()))
        .collect();

    let Some(((_, core), history)) = turns.split_last() else {
        if system_prompts.is_empty() {
            return Err(ProxyError::NoActionableTurn);
        }
        return Ok(TranslationInput {
            prompt: system_prompts,
            context: Vec::new(),
        });
    };

    let prompt = if system_prompts.is_empty() {
        core.clone()
    } else {
        format!("{system_prompts}\n\n{core}").trim().to_string()
    };

    Ok(TranslationInput {
        prompt,
        context: pair_context(history),
    })
}

fn pair_context(history: &[(Role, String)]) -> Vec<ContextPair> {
    let mut context = Vec::new();
    let mut i = 0;
    while i < history.len() {
        match (history.get(i), history.get(i + 1)) {
            (Some((Role::User, question)), Some((Role::Assistant, answer))) => {
                context.push(ContextPair {
                    question: question.clone(),
                    answer: answer.clone(),
                });
                i += 2;
            }
            _ => i += 1,
        }
    }
    context
}

/// Assemble the Bito payload for a chat request and its resolved backend.
/// Bito is always asked to stream; non-streaming clients are served by
/// aggregating that stream.
///
/// # Errors
/// Propagates [`build_prompt_context`] failures, and `MissingModelId` when the
/// backend has no usable model id.
pub fn build_bito_request(req: &ChatCompletionRequest, backend: &BackendConfig) -> Result<BitoRequest> {
    let model_id = backend
        .model_id
        .filter(|id| *id != 0)
        .ok_or_else(|| ProxyError::missing_model_id(&req.model))?;

    let TranslationInput { prompt, context } = build_prompt_context(&req.messages)?;

    Ok(BitoRequest {
        ai_model_type: backend
            .ai_model_type
            .clone()
            .unwrap_or_else(|| "ADVANCED".to_string()),
        ide_id: backend.ide_id.unwrap_or(0),
        prompt,
        model_id,
        ide_name: backend.ide_name.clone().unwrap_or_else(|| "CLI".to_string()),
        context,
        request_type: backend.request_type.unwrap_or(1),
        stream: true,
        top_n: backend.top_n.unwrap_or(0),
        top_n_threshold: backend.top_n_threshold.unwrap_or(0.0),
        folder_path: backend.folder_path.clone().unwrap_or_default(),
        custom_llm_config: CustomLlmConfig {
            temperature: Some(
                req.temperature
                    .or(backend.temperature)
                    .unwrap_or(DEFAULT_TEMPERATURE),
            ),
            max_tokens: req.max_tokens.or(backend.max_tokens),
            top_p: req.top_p,
        },
    })
}
