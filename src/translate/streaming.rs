//! State machine for translating the Bito event stream into `OpenAI` SSE chunks.
//!
//! The [`StreamTranslator`] is fed raw upstream bytes as they arrive. It splits
//! them into lines, parses each complete line as a Bito event, and emits the
//! corresponding `chat.completion.chunk` frames. Every translation ends with
//! exactly one terminal chunk followed by [`SseFrame::Done`].

use super::bito_types::{BitoEvent, DONE_SENTINEL};
use super::openai_types::{ChatCompletionChunk, ChunkDelta, FinishReason, Role};

/// One downstream SSE event: a serialized chunk or the `[DONE]` terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Chunk(ChatCompletionChunk),
    Done,
}

impl SseFrame {
    /// The `data:` payload for this frame.
    pub fn data(&self) -> String {
        match self {
            Self::Chunk(chunk) => serde_json::to_string(chunk).unwrap_or_default(),
            Self::Done => DONE_SENTINEL.to_string(),
        }
    }

    /// The frame as it appears on the wire.
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.data())
    }

    pub fn chunk(&self) -> Option<&ChatCompletionChunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            Self::Done => None,
        }
    }
}

/// Carry-over buffer that turns arbitrarily split network reads into lines.
///
/// Bytes are kept raw until a `\n` arrives, so a UTF-8 sequence split across
/// two reads is decoded intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them, without the
    /// trailing newline.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.pending[start..end]).into_owned());
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Whatever is left after the last newline.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }
}

/// Translates one Bito response stream. Not reusable: create a fresh
/// translator per upstream call.
///
/// Usage:
///   let mut translator = StreamTranslator::new("Claude Sonnet 3.7");
///   for bytes in upstream_reads {
///       for frame in translator.push_bytes(&bytes) { /* send */ }
///   }
///   let final_frames = translator.finish();
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    stream_id: String,
    first_chunk_emitted: bool,
    finished: bool,
    buffer: LineBuffer,
}

impl StreamTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            stream_id: generate_id(),
            first_chunk_emitted: false,
            finished: false,
            buffer: LineBuffer::new(),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one network read. Lines after the end sentinel are ignored.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }

        let mut frames = Vec::new();
        for line in self.buffer.push(bytes) {
            frames.append(&mut self.process_line(&line));
            if self.finished {
                break;
            }
        }
        frames
    }

    /// Translate a single complete upstream line.
    pub fn process_line(&mut self, line: &str) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let payload = trimmed
            .strip_prefix("data:")
            .map_or(trimmed, str::trim);

        if payload == DONE_SENTINEL {
            return self.make_finish_frames(ChunkDelta::default(), FinishReason::Stop);
        }

        let event: BitoEvent = match serde_json::from_str(payload) {
            Ok(ev) => ev,
            Err(e) => {
                tracing::warn!(stream_id = %self.stream_id, error = %e, raw = %payload, "Skipping unparseable upstream line");
                return Vec::new();
            }
        };

        let mut delta = ChunkDelta::default();
        if !self.first_chunk_emitted {
            delta.role = Some(Role::Assistant);
            self.first_chunk_emitted = true;
        }
        let text = event.text();
        if !text.is_empty() {
            delta.content = Some(text.to_string());
        }

        if delta.is_empty() {
            return Vec::new();
        }

        vec![SseFrame::Chunk(ChatCompletionChunk::new(
            &self.stream_id,
            &self.model,
            delta,
            None,
        ))]
    }

    /// Call when the upstream body ends. Parses any unterminated last line and
    /// closes the stream if the sentinel never arrived.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }

        let mut frames = Vec::new();
        if let Some(rest) = self.buffer.take_remainder() {
            frames.append(&mut self.process_line(&rest));
        }

        if !self.finished {
            tracing::warn!(stream_id = %self.stream_id, "Upstream closed without end sentinel");
            frames.append(&mut self.make_finish_frames(ChunkDelta::default(), FinishReason::Stop));
        }
        frames
    }

    /// Close the stream with a single error chunk carrying `message`.
    pub fn fail(&mut self, message: impl Into<String>) -> Vec<SseFrame> {
        let delta = ChunkDelta {
            role: None,
            content: Some(message.into()),
        };
        self.make_finish_frames(delta, FinishReason::Error)
    }

    fn make_finish_frames(&mut self, delta: ChunkDelta, reason: FinishReason) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        vec![
            SseFrame::Chunk(ChatCompletionChunk::new(
                &self.stream_id,
                &self.model,
                delta,
                Some(reason),
            )),
            SseFrame::Done,
        ]
    }
}

/// `chatcmpl-` followed by a dashless v4 uuid.
pub fn generate_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> String {
        format!("data: {}\n", serde_json::json!({"choices": [{"text": text}]}))
    }

    fn deltas(frames: &[SseFrame]) -> Vec<ChunkDelta> {
        frames
            .iter()
            .filter_map(SseFrame::chunk)
            .map(|c| c.choices[0].delta.clone())
            .collect()
    }

    #[test]
    fn test_line_buffer_keeps_partial_lines() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"abc").is_empty());
        assert_eq!(buf.push(b"def\nghi"), vec!["abcdef"]);
        assert_eq!(buf.push(b"\n\n"), vec!["ghi", ""]);
        assert_eq!(buf.take_remainder(), None);
    }

    #[test]
    fn test_line_buffer_split_utf8() {
        let bytes = "héllo\n".as_bytes();
        let mut buf = LineBuffer::new();
        // split inside the two-byte 'é'
        assert!(buf.push(&bytes[..2]).is_empty());
        assert_eq!(buf.push(&bytes[2..]), vec!["héllo"]);
    }

    #[test]
    fn test_simple_text_stream() {
        let mut translator = StreamTranslator::new("test-model");

        let frames = translator.push_bytes(line("Hel").as_bytes());
        assert_eq!(
            deltas(&frames),
            vec![ChunkDelta {
                role: Some(Role::Assistant),
                content: Some("Hel".to_string()),
            }]
        );

        let frames = translator.push_bytes(line("lo").as_bytes());
        assert_eq!(
            deltas(&frames),
            vec![ChunkDelta {
                role: None,
                content: Some("lo".to_string()),
            }]
        );

        let frames = translator.push_bytes(b"data: [DONE]\n");
        assert_eq!(frames.len(), 2);
        let terminal = frames[0].chunk().unwrap();
        assert_eq!(terminal.choices[0].finish_reason, Some(FinishReason::Stop));
        assert!(terminal.choices[0].delta.is_empty());
        assert_eq!(frames[1], SseFrame::Done);
        assert!(translator.is_finished());
    }

    #[test]
    fn test_first_event_without_text_carries_role_only() {
        let mut translator = StreamTranslator::new("m");
        let frames = translator.process_line(r#"{"choices":[]}"#);
        assert_eq!(
            deltas(&frames),
            vec![ChunkDelta {
                role: Some(Role::Assistant),
                content: None,
            }]
        );

        // later empty events produce nothing
        assert!(translator.process_line(r#"{"choices":[{"text":""}]}"#).is_empty());
    }

    #[test]
    fn test_null_choices_is_an_empty_fragment() {
        let mut translator = StreamTranslator::new("m");
        let frames = translator.process_line(r#"data: {"choices":null}"#);
        assert_eq!(
            deltas(&frames),
            vec![ChunkDelta {
                role: Some(Role::Assistant),
                content: None,
            }]
        );
        assert!(!translator.is_finished());
    }

    #[test]
    fn test_prefix_is_optional() {
        let mut translator = StreamTranslator::new("m");
        let frames = translator.process_line(r#"  {"choices":[{"text":"x"}]}  "#);
        assert_eq!(deltas(&frames)[0].content.as_deref(), Some("x"));
        let frames = translator.process_line("[DONE]");
        assert_eq!(frames.last(), Some(&SseFrame::Done));
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut translator = StreamTranslator::new("m");
        assert!(translator.process_line("data: {not json").is_empty());
        assert!(!translator.is_finished());

        let frames = translator.process_line(&line("ok"));
        // role still attaches to the first real chunk
        assert_eq!(deltas(&frames)[0].role, Some(Role::Assistant));
    }

    #[test]
    fn test_input_after_done_is_ignored() {
        let mut translator = StreamTranslator::new("m");
        let bytes = format!("{}data: [DONE]\n{}", line("a"), line("b"));
        let frames = translator.push_bytes(bytes.as_bytes());

        assert_eq!(frames.len(), 3);
        assert!(translator.push_bytes(line("c").as_bytes()).is_empty());
        assert!(translator.finish().is_empty());
    }

    #[test]
    fn test_finish_without_sentinel_closes_stream() {
        let mut translator = StreamTranslator::new("m");
        let _ = translator.push_bytes(line("a").as_bytes());
        // unterminated last line is still parsed
        let _ = translator.push_bytes(br#"{"choices":[{"text":"b"}]}"#);

        let frames = translator.finish();
        assert_eq!(frames.len(), 3);
        assert_eq!(deltas(&frames)[0].content.as_deref(), Some("b"));
        assert_eq!(
            frames[1].chunk().unwrap().choices[0].finish_reason,
            Some(FinishReason::Stop)
        );
        assert_eq!(frames[2], SseFrame::Done);
    }

    #[test]
    fn test_fail_emits_single_error_chunk() {
        let mut translator = StreamTranslator::new("m");
        let frames = translator.fail("Bito API error (429): rate limited");

        assert_eq!(frames.len(), 2);
        let chunk = frames[0].chunk().unwrap();
        assert_eq!(chunk.choices[0].finish_reason, Some(FinishReason::Error));
        assert_eq!(
            chunk.choices[0].delta.content.as_deref(),
            Some("Bito API error (429): rate limited")
        );
        assert_eq!(frames[1], SseFrame::Done);
        assert!(translator.fail("again").is_empty());
    }

    #[test]
    fn test_all_chunks_share_stream_id() {
        let mut translator = StreamTranslator::new("m");
        let bytes = format!("{}{}data: [DONE]\n", line("a"), line("b"));
        let frames = translator.push_bytes(bytes.as_bytes());

        let id = translator.stream_id().to_string();
        assert!(id.starts_with("chatcmpl-"));
        assert_eq!(id.matches('-').count(), 1);
        for chunk in frames.iter().filter_map(SseFrame::chunk) {
            assert_eq!(chunk.id, id);
            assert_eq!(chunk.model, "m");
        }
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(SseFrame::Done.to_sse(), "data: [DONE]\n\n");

        let mut translator = StreamTranslator::new("m");
        let frames = translator.process_line(&line("x"));
        let wire = frames[0].to_sse();
        assert!(wire.starts_with("data: {"));
        assert!(wire.ends_with("}\n\n"));
    }
}
