use crate::application::chat_stream::error_text;
use crate::application::event_store::EventStore;
use crate::domain::models::{ChatMessage, ConflictWarning};
use crate::infrastructure::backend_client::CalendarBackend;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_cache::EventCacheRepository;
use crate::infrastructure::frame_codec::{ChatAction, DecodedAction};
use std::sync::Arc;

const GENERIC_NOT_FOUND: &str = "not found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Created {
        event_id: Option<String>,
        conflicts: Vec<ConflictWarning>,
    },
    Deleted {
        event_id: String,
    },
    Updated {
        event_id: String,
        conflicts: Vec<ConflictWarning>,
    },
    Failed {
        action: &'static str,
        detail: String,
    },
}

/// Executes decoded chat actions against the event store and annotates the
/// assistant message that carried them.
pub struct ActionDispatcher<B, R>
where
    B: CalendarBackend,
    R: EventCacheRepository,
{
    store: Arc<EventStore<B, R>>,
}

impl<B, R> ActionDispatcher<B, R>
where
    B: CalendarBackend,
    R: EventCacheRepository,
{
    pub fn new(store: Arc<EventStore<B, R>>) -> Self {
        Self { store }
    }

    pub async fn dispatch(
        &self,
        decoded: &DecodedAction,
        message: &mut ChatMessage,
    ) -> DispatchOutcome {
        let name = decoded.action.name();
        tracing::info!(action = name, message_id = %message.id, "dispatching chat action");

        match &decoded.action {
            ChatAction::AddEvent(draft) => match self.store.create(draft).await {
                Ok(outcome) => {
                    let (title, date, time) = match &outcome.event {
                        Some(event) => (&event.title, &event.date, &event.time),
                        None => (&draft.title, &draft.date, &draft.time),
                    };
                    message.append_line(&format!("Created: \"{title}\" on {date} at {time}"));
                    message.tag_action(name, decoded.raw.clone());
                    DispatchOutcome::Created {
                        event_id: outcome.event.map(|event| event.id),
                        conflicts: outcome.conflicts,
                    }
                }
                Err(error) => {
                    tracing::error!(action = name, %error, "chat create failed");
                    DispatchOutcome::Failed {
                        action: name,
                        detail: error.to_string(),
                    }
                }
            },
            ChatAction::DeleteEvent { id } => match self.store.delete(id).await {
                Ok(deleted) => {
                    let label = deleted
                        .map(|event| event.title)
                        .filter(|title| !title.trim().is_empty())
                        .unwrap_or_else(|| id.clone());
                    message.append_line(&format!("Deleted: \"{label}\""));
                    message.tag_action(name, decoded.raw.clone());
                    DispatchOutcome::Deleted {
                        event_id: id.clone(),
                    }
                }
                Err(error) => {
                    let detail = error
                        .backend_detail()
                        .unwrap_or(GENERIC_NOT_FOUND)
                        .to_string();
                    tracing::warn!(action = name, event_id = %id, %error, "chat delete failed");
                    message.append_line(&error_text(&format!("could not delete event: {detail}")));
                    DispatchOutcome::Failed {
                        action: name,
                        detail,
                    }
                }
            },
            ChatAction::UpdateEvent { id, patch } => match self.store.update(id, patch).await {
                Ok(outcome) => {
                    let label = outcome
                        .event
                        .as_ref()
                        .map(|event| event.title.clone())
                        .filter(|title| !title.trim().is_empty())
                        .unwrap_or_else(|| id.clone());
                    message.append_line(&format!("Updated: \"{label}\""));
                    message.tag_action(name, decoded.raw.clone());
                    DispatchOutcome::Updated {
                        event_id: id.clone(),
                        conflicts: outcome.conflicts,
                    }
                }
                Err(error) => {
                    let detail = Self::failure_detail(&error);
                    tracing::warn!(action = name, event_id = %id, %error, "chat update failed");
                    message.append_line(&error_text(&format!("could not update event: {detail}")));
                    DispatchOutcome::Failed {
                        action: name,
                        detail,
                    }
                }
            },
        }
    }

    fn failure_detail(error: &InfraError) -> String {
        error
            .backend_detail()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| error.to_string())
    }
}
