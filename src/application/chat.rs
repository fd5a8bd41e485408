use crate::application::action_dispatcher::{ActionDispatcher, DispatchOutcome};
use crate::application::chat_stream::{ChatStreamProcessor, StreamState};
use crate::application::event_store::EventStore;
use crate::domain::models::{ChatMessage, ChatRole};
use crate::infrastructure::backend_client::CalendarBackend;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_cache::EventCacheRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub reply: ChatMessage,
    pub state: StreamState,
    pub dispatch: Option<DispatchOutcome>,
}

/// Chat history plus the send pipeline: stream the reply, then run any
/// terminal action it carried.
pub struct ChatConversation<B, R>
where
    B: CalendarBackend,
    R: EventCacheRepository,
{
    backend: Arc<B>,
    dispatcher: ActionDispatcher<B, R>,
    history: Vec<ChatMessage>,
    awaiting_response: bool,
    next_message: u64,
    now_provider: NowProvider,
}

impl<B, R> ChatConversation<B, R>
where
    B: CalendarBackend,
    R: EventCacheRepository,
{
    pub fn new(store: Arc<EventStore<B, R>>) -> Self {
        Self {
            backend: store.backend().clone(),
            dispatcher: ActionDispatcher::new(store),
            history: Vec::new(),
            awaiting_response: false,
            next_message: 0,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    /// Sends `text` and streams the reply into a new assistant message.
    ///
    /// Stream failures end up in the reply text rather than the `Err` path;
    /// `Err` is reserved for a rejected send. If the returned future is
    /// dropped before it settles, the awaiting flag is still cleared and an
    /// empty reply placeholder is removed from history.
    pub async fn send<F>(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<ChatTurn, InfraError>
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(InfraError::InvalidInput(
                "chat message must not be empty".to_string(),
            ));
        }

        let user = self.new_message(ChatRole::User, text);
        self.history.push(user);
        let reply = self.new_message(ChatRole::Assistant, "");
        let reply_id = reply.id.clone();
        self.history.push(reply);
        tracing::info!(message_id = %reply_id, "chat send started");

        let Self {
            backend,
            dispatcher,
            history,
            awaiting_response,
            ..
        } = self;
        let mut pending = PendingReply::start(history, awaiting_response);

        let outcome = match backend.stream_chat(text).await {
            Ok(stream) => {
                let reply = pending.reply_mut();
                ChatStreamProcessor::new()
                    .run(stream, cancel, |content| {
                        reply.content = content.to_string();
                        on_update(content);
                    })
                    .await
            }
            Err(error) => {
                tracing::warn!(%error, "failed to open chat stream");
                let mut processor = ChatStreamProcessor::new();
                processor.fail(&error.to_string());
                let outcome = processor.into_outcome();
                pending.reply_mut().content = outcome.content.clone();
                on_update(&outcome.content);
                outcome
            }
        };

        let dispatch = match (&outcome.state, &outcome.action) {
            (StreamState::Finished, Some(action)) => {
                Some(dispatcher.dispatch(action, pending.reply_mut()).await)
            }
            _ => None,
        };
        let reply = pending.settle();

        tracing::info!(
            message_id = %reply_id,
            state = ?outcome.state,
            dispatched = dispatch.is_some(),
            "chat send settled"
        );
        Ok(ChatTurn {
            reply,
            state: outcome.state,
            dispatch,
        })
    }

    /// Drops local history and asks the backend to forget its own; the
    /// backend call is best-effort.
    pub async fn clear(&mut self) {
        if let Err(error) = self.backend.clear_chat().await {
            tracing::warn!(%error, "backend chat clear failed");
        }
        self.history.clear();
    }

    fn new_message(&mut self, role: ChatRole, content: &str) -> ChatMessage {
        self.next_message += 1;
        let mut message = ChatMessage::new(format!("msg-{}", self.next_message), role, content);
        message.timestamp = (self.now_provider)();
        message
    }
}

/// The in-flight assistant reply. Dropping it clears the awaiting flag on
/// every exit path, including a dropped `send` future.
struct PendingReply<'a> {
    history: &'a mut Vec<ChatMessage>,
    awaiting: &'a mut bool,
    index: usize,
    settled: bool,
}

impl<'a> PendingReply<'a> {
    fn start(history: &'a mut Vec<ChatMessage>, awaiting: &'a mut bool) -> Self {
        *awaiting = true;
        let index = history.len() - 1;
        Self {
            history,
            awaiting,
            index,
            settled: false,
        }
    }

    fn reply_mut(&mut self) -> &mut ChatMessage {
        &mut self.history[self.index]
    }

    fn settle(mut self) -> ChatMessage {
        self.settled = true;
        self.history[self.index].clone()
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        *self.awaiting = false;
        if self.settled {
            return;
        }
        tracing::warn!("chat send abandoned before the reply settled");
        if self
            .history
            .get(self.index)
            .is_some_and(|reply| reply.content.is_empty())
        {
            self.history.remove(self.index);
        }
    }
}
