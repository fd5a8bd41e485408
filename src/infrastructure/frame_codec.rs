use crate::domain::models::{EventDraft, EventPatch};
use crate::infrastructure::error::InfraError;
use serde_json::Value;

pub const FRAME_PREFIX: &str = "data: ";

pub const ACTION_ADD_EVENT: &str = "ADD_EVENT";
pub const ACTION_DELETE_EVENT: &str = "DELETE_EVENT";
pub const ACTION_UPDATE_EVENT: &str = "UPDATE_EVENT";

const KEY_ID: &str = "id";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Token(String),
    Done {
        action: Option<String>,
        action_data: Option<Value>,
    },
    Error(String),
}

#[derive(Debug, serde::Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    content: Option<String>,
    action: Option<String>,
    action_data: Option<Value>,
    error: Option<String>,
}

/// Decodes one line of a chat stream. Lines without the `data: ` marker,
/// with a payload that is not JSON, or with an unknown `type` yield `None`.
pub fn decode_frame(line: &str) -> Option<StreamFrame> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(FRAME_PREFIX)?;
    let raw: RawFrame = serde_json::from_str(payload).ok()?;

    match raw.kind.as_str() {
        "token" => raw.content.map(StreamFrame::Token),
        "done" => Some(StreamFrame::Done {
            action: raw
                .action
                .map(|action| action.trim().to_string())
                .filter(|action| !action.is_empty()),
            action_data: raw.action_data.filter(|data| !data.is_null()),
        }),
        "error" => Some(StreamFrame::Error(
            raw.error.unwrap_or_else(|| "unknown stream error".to_string()),
        )),
        _ => None,
    }
}

/// Terminal directive carried by a `done` frame, with its required fields
/// already checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    AddEvent(EventDraft),
    DeleteEvent { id: String },
    UpdateEvent { id: String, patch: EventPatch },
}

impl ChatAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddEvent(_) => ACTION_ADD_EVENT,
            Self::DeleteEvent { .. } => ACTION_DELETE_EVENT,
            Self::UpdateEvent { .. } => ACTION_UPDATE_EVENT,
        }
    }
}

/// A decoded action together with the payload it came from, which is kept
/// for tagging the chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAction {
    pub action: ChatAction,
    pub raw: Value,
}

/// Returns `Ok(None)` for action names this client does not handle.
pub fn decode_action(name: &str, data: &Value) -> Result<Option<ChatAction>, InfraError> {
    let action = match name.trim() {
        ACTION_ADD_EVENT => {
            let draft: EventDraft = serde_json::from_value(data.clone())?;
            draft
                .validate()
                .map_err(|error| InfraError::Stream(format!("invalid {ACTION_ADD_EVENT} payload: {error}")))?;
            ChatAction::AddEvent(draft)
        }
        ACTION_DELETE_EVENT => ChatAction::DeleteEvent {
            id: required_id(data, ACTION_DELETE_EVENT)?,
        },
        ACTION_UPDATE_EVENT => {
            let id = required_id(data, ACTION_UPDATE_EVENT)?;
            let mut body = data.clone();
            if let Some(fields) = body.as_object_mut() {
                fields.remove(KEY_ID);
            }
            let patch: EventPatch = serde_json::from_value(body)?;
            patch
                .validate()
                .map_err(|error| InfraError::Stream(format!("invalid {ACTION_UPDATE_EVENT} payload: {error}")))?;
            ChatAction::UpdateEvent { id, patch }
        }
        _ => return Ok(None),
    };
    Ok(Some(action))
}

fn required_id(data: &Value, action: &str) -> Result<String, InfraError> {
    let id = match data.get(KEY_ID) {
        Some(Value::String(id)) => id.trim().to_string(),
        Some(Value::Number(id)) => id.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        return Err(InfraError::Stream(format!("{action} payload is missing an id")));
    }
    Ok(id)
}
