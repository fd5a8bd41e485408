use crate::infrastructure::backend_client::ChatByteStream;
use crate::infrastructure::frame_codec::{decode_action, decode_frame, DecodedAction, StreamFrame};
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    /// Saw `done`, or the transport ended cleanly.
    Finished,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub content: String,
    pub state: StreamState,
    pub action: Option<DecodedAction>,
}

pub fn error_text(message: &str) -> String {
    format!("Error: {message}")
}

/// Accumulates a streamed assistant reply frame by frame.
///
/// Chunks are split on `\n`, so frames and multi-byte characters that span
/// transport chunks are reassembled before decoding.
#[derive(Debug)]
pub struct ChatStreamProcessor {
    buffer: String,
    pending: Vec<u8>,
    state: StreamState,
    action: Option<DecodedAction>,
}

impl Default for ChatStreamProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStreamProcessor {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
            state: StreamState::Streaming,
            action: None,
        }
    }

    pub fn content(&self) -> &str {
        &self.buffer
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Consumes one transport chunk. Returns `true` when the visible content
    /// changed.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.state != StreamState::Streaming {
            return false;
        }
        self.pending.extend_from_slice(chunk);

        let mut changed = false;
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            changed |= self.handle_line(&line[..line.len() - 1]);
            if self.state != StreamState::Streaming {
                self.pending.clear();
                break;
            }
        }
        changed
    }

    /// Transport ended. A trailing frame without a newline is still decoded.
    pub fn finish(&mut self) -> bool {
        if self.state != StreamState::Streaming {
            return false;
        }
        let rest = std::mem::take(&mut self.pending);
        let changed = self.handle_line(&rest);
        if self.state == StreamState::Streaming {
            self.state = StreamState::Finished;
        }
        changed
    }

    pub fn fail(&mut self, message: &str) {
        self.buffer = error_text(message);
        self.action = None;
        self.state = StreamState::Failed;
    }

    pub fn cancel(&mut self) {
        if self.state == StreamState::Streaming {
            self.state = StreamState::Cancelled;
        }
    }

    pub fn into_outcome(self) -> StreamOutcome {
        StreamOutcome {
            content: self.buffer,
            state: self.state,
            action: self.action,
        }
    }

    /// Drives `stream` to completion, calling `on_update` with the whole
    /// buffer after every visible change. Cancellation through `cancel`
    /// stops reading without writing an error.
    pub async fn run<F>(
        mut self,
        mut stream: ChatByteStream,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> StreamOutcome
    where
        F: FnMut(&str),
    {
        while self.state == StreamState::Streaming {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("chat stream cancelled by caller");
                    self.cancel();
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        if self.feed(&chunk) {
                            on_update(&self.buffer);
                        }
                    }
                    Some(Err(error)) => {
                        tracing::warn!(%error, "chat stream interrupted");
                        self.fail(&error.to_string());
                        on_update(&self.buffer);
                    }
                    None => {
                        if self.finish() {
                            on_update(&self.buffer);
                        }
                    }
                },
            }
        }
        self.into_outcome()
    }

    fn handle_line(&mut self, raw: &[u8]) -> bool {
        let line = String::from_utf8_lossy(raw);
        let Some(frame) = decode_frame(&line) else {
            if !line.trim().is_empty() {
                tracing::debug!(frame = %line, "discarding unreadable stream frame");
            }
            return false;
        };

        match frame {
            StreamFrame::Token(content) => {
                self.buffer.push_str(&content);
                true
            }
            StreamFrame::Done {
                action,
                action_data,
            } => {
                self.action = action.and_then(|name| Self::decode(&name, action_data));
                self.state = StreamState::Finished;
                false
            }
            StreamFrame::Error(message) => {
                self.fail(&message);
                true
            }
        }
    }

    fn decode(name: &str, data: Option<Value>) -> Option<DecodedAction> {
        let raw = data.unwrap_or(Value::Null);
        match decode_action(name, &raw) {
            Ok(Some(action)) => Some(DecodedAction { action, raw }),
            Ok(None) => {
                tracing::info!(action = name, "ignoring unrecognised action");
                None
            }
            Err(error) => {
                tracing::warn!(action = name, %error, "discarding invalid action payload");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::error::InfraError;
    use crate::infrastructure::frame_codec::ChatAction;
    use futures_util::stream;
    use std::time::Duration;

    fn byte_stream(chunks: Vec<Result<&'static str, &'static str>>) -> ChatByteStream {
        stream::iter(chunks.into_iter().map(|chunk| {
            chunk
                .map(|text| text.as_bytes().to_vec())
                .map_err(|message| InfraError::Stream(message.to_string()))
        }))
        .boxed()
    }

    #[test]
    fn token_then_done_without_action() {
        let mut processor = ChatStreamProcessor::new();
        processor.feed(b"data: {\"type\":\"token\",\"content\":\"Hi\"}\n\n");
        processor.feed(b"data: {\"type\":\"done\"}\n\n");

        let outcome = processor.into_outcome();
        assert_eq!(outcome.content, "Hi");
        assert_eq!(outcome.state, StreamState::Finished);
        assert!(outcome.action.is_none());
    }

    #[test]
    fn malformed_frame_between_tokens_is_skipped() {
        let mut processor = ChatStreamProcessor::new();
        processor.feed(
            b"data: {\"type\":\"token\",\"content\":\"Hel\"}\n\ndata: not-json\n\ndata: {\"type\":\"token\",\"content\":\"lo\"}\n\n",
        );
        assert_eq!(processor.content(), "Hello");
        assert_eq!(processor.state(), StreamState::Streaming);
    }

    #[test]
    fn frames_split_across_chunks_are_reassembled() {
        let frame = "data: {\"type\":\"token\",\"content\":\"caf\u{e9} \u{1f4c5}\"}\n\n".as_bytes();
        let mut processor = ChatStreamProcessor::new();
        for piece in frame.chunks(3) {
            processor.feed(piece);
        }
        assert_eq!(processor.content(), "caf\u{e9} \u{1f4c5}");
    }

    #[test]
    fn error_frame_replaces_buffer_and_drops_action() {
        let mut processor = ChatStreamProcessor::new();
        processor.feed(b"data: {\"type\":\"token\",\"content\":\"partial\"}\n\n");
        processor.feed(b"data: {\"type\":\"error\",\"error\":\"model crashed\"}\n\n");
        processor.feed(b"data: {\"type\":\"token\",\"content\":\"late\"}\n\n");

        let outcome = processor.into_outcome();
        assert_eq!(outcome.content, "Error: model crashed");
        assert_eq!(outcome.state, StreamState::Failed);
        assert!(outcome.action.is_none());
    }

    #[test]
    fn done_frame_decodes_action_and_ignores_trailing_bytes() {
        let mut processor = ChatStreamProcessor::new();
        processor.feed(
            b"data: {\"type\":\"done\",\"action\":\"DELETE_EVENT\",\"action_data\":{\"id\":\"ab12cd34\"}}\n\ndata: {\"type\":\"token\",\"content\":\"ignored\"}\n\n",
        );

        let outcome = processor.into_outcome();
        assert_eq!(outcome.content, "");
        let decoded = outcome.action.expect("action decoded");
        assert_eq!(
            decoded.action,
            ChatAction::DeleteEvent {
                id: "ab12cd34".to_string()
            }
        );
        assert_eq!(decoded.raw, serde_json::json!({"id": "ab12cd34"}));
    }

    #[test]
    fn unknown_action_is_not_decoded() {
        let mut processor = ChatStreamProcessor::new();
        processor.feed(b"data: {\"type\":\"done\",\"action\":\"SEND_EMAIL\",\"action_data\":{}}\n");
        let outcome = processor.into_outcome();
        assert_eq!(outcome.state, StreamState::Finished);
        assert!(outcome.action.is_none());
    }

    #[test]
    fn finish_decodes_trailing_frame_without_newline() {
        let mut processor = ChatStreamProcessor::new();
        processor.feed(b"data: {\"type\":\"token\",\"content\":\"end\"}");
        assert_eq!(processor.content(), "");
        assert!(processor.finish());
        assert_eq!(processor.content(), "end");
        assert_eq!(processor.state(), StreamState::Finished);
    }

    #[tokio::test]
    async fn run_finishes_cleanly_without_done() {
        let cancel = CancellationToken::new();
        let mut updates = Vec::new();
        let outcome = ChatStreamProcessor::new()
            .run(
                byte_stream(vec![
                    Ok("data: {\"type\":\"token\",\"content\":\"A\"}\n\n"),
                    Ok("data: {\"type\":\"token\",\"content\":\"B\"}\n\n"),
                ]),
                &cancel,
                |content| updates.push(content.to_string()),
            )
            .await;

        assert_eq!(outcome.state, StreamState::Finished);
        assert_eq!(outcome.content, "AB");
        assert!(outcome.action.is_none());
        assert_eq!(updates, vec!["A".to_string(), "AB".to_string()]);
    }

    #[tokio::test]
    async fn run_reports_transport_error_inline() {
        let cancel = CancellationToken::new();
        let outcome = ChatStreamProcessor::new()
            .run(
                byte_stream(vec![
                    Ok("data: {\"type\":\"token\",\"content\":\"A\"}\n\n"),
                    Err("connection reset"),
                ]),
                &cancel,
                |_| {},
            )
            .await;

        assert_eq!(outcome.state, StreamState::Failed);
        assert!(outcome.content.starts_with("Error: "));
        assert!(outcome.content.contains("connection reset"));
    }

    #[tokio::test]
    async fn run_cancellation_is_silent() {
        let cancel = CancellationToken::new();
        let body = stream::iter(vec![Ok::<_, InfraError>(
            b"data: {\"type\":\"token\",\"content\":\"Thinking\"}\n\n".to_vec(),
        )])
        .chain(stream::pending())
        .boxed();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = ChatStreamProcessor::new().run(body, &cancel, |_| {}).await;

        assert_eq!(outcome.state, StreamState::Cancelled);
        assert_eq!(outcome.content, "Thinking");
        assert!(outcome.action.is_none());
    }
}
