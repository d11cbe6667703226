//! Reduce a translated chunk stream into one `chat.completion` response.
//!
//! Non-streaming clients are served from the same streaming upstream call: the
//! [`StreamTranslator`](super::streaming::StreamTranslator) output is drained and
//! folded here. Upstream failures arrive as error chunks and so end up as the
//! message text; aggregation itself never fails.

use futures::{Stream, StreamExt};

use super::openai_types::{
    ChatCompletionResponse, ChatUsage, Choice, ChoiceMessage, FinishReason, Role,
    COMPLETION_OBJECT,
};
use super::streaming::{generate_id, SseFrame};

#[derive(Debug, Default)]
pub struct ResponseAggregator {
    id: Option<String>,
    content: String,
    finish_reason: Option<FinishReason>,
    complete: bool,
}

impl ResponseAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame in. Returns `false` once no further frames matter: after
    /// `[DONE]` or after a non-`stop` finish reason.
    pub fn push(&mut self, frame: &SseFrame) -> bool {
        if self.complete {
            return false;
        }

        let chunk = match frame {
            SseFrame::Chunk(chunk) => chunk,
            SseFrame::Done => {
                self.complete = true;
                return false;
            }
        };

        self.id.get_or_insert_with(|| chunk.id.clone());

        if let Some(choice) = chunk.choice() {
            if let Some(ref text) = choice.delta.content {
                self.content.push_str(text);
            }
            if let Some(reason) = choice.finish_reason {
                if reason != FinishReason::Stop {
                    self.finish_reason = Some(reason);
                    self.complete = true;
                    return false;
                }
            }
        }
        true
    }

    pub fn into_response(self, model: &str) -> ChatCompletionResponse {
        ChatCompletionResponse {
            id: self.id.unwrap_or_else(generate_id),
            object: COMPLETION_OBJECT.to_string(),
            created: chrono::Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: Role::Assistant,
                    content: self.content,
                },
                finish_reason: self.finish_reason.unwrap_or(FinishReason::Stop),
            }],
            usage: ChatUsage::default(),
        }
    }
}

/// Drain `frames` and build the aggregated response.
pub async fn aggregate<S>(frames: S, model: &str) -> ChatCompletionResponse
where
    S: Stream<Item = SseFrame>,
{
    let mut aggregator = ResponseAggregator::new();
    futures::pin_mut!(frames);

    while let Some(frame) = frames.next().await {
        if !aggregator.push(&frame) {
            break;
        }
    }

    aggregator.into_response(model)
}
