use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EVENT_DURATION_MINUTES: u32 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Work,
    Personal,
    Health,
    Meeting,
    Reminder,
    #[default]
    Other,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Health => "health",
            Self::Meeting => "meeting",
            Self::Reminder => "reminder",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "work" => Ok(Self::Work),
            "personal" => Ok(Self::Personal),
            "health" => Ok(Self::Health),
            "meeting" => Ok(Self::Meeting),
            "reminder" => Ok(Self::Reminder),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown event category: {other}")),
        }
    }
}

/// An event exactly as the backend last reported it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub date: String,
    pub time: String,
    pub duration: u32,
    #[serde(default)]
    pub description: String,
    pub category: EventCategory,
}

impl Event {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        validate_non_empty(&self.title, "event.title")?;
        validate_date(&self.date, "event.date")?;
        validate_hhmm(&self.time, "event.time")?;
        validate_duration(self.duration, "event.duration")
    }

    pub fn naive_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }

    /// Minutes since midnight of the start time.
    pub fn start_minutes(&self) -> Option<u32> {
        parse_hhmm(&self.time).map(|time| time.hour() * 60 + time.minute())
    }

    pub fn starts_at(&self) -> Option<NaiveDateTime> {
        Some(self.naive_date()?.and_time(parse_hhmm(&self.time)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub date: String,
    pub time: String,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: EventCategory,
}

impl EventDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "draft.title")?;
        validate_date(&self.date, "draft.date")?;
        validate_hhmm(&self.time, "draft.time")?;
        validate_duration(self.duration, "draft.duration")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EventCategory>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = self.title.as_deref() {
            validate_non_empty(title, "patch.title")?;
        }
        if let Some(date) = self.date.as_deref() {
            validate_date(date, "patch.date")?;
        }
        if let Some(time) = self.time.as_deref() {
            validate_hhmm(time, "patch.time")?;
        }
        if let Some(duration) = self.duration {
            validate_duration(duration, "patch.duration")?;
        }
        Ok(())
    }
}

/// Advisory overlap reported by the backend alongside a create or update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictWarning {
    pub event_id: String,
    pub title: String,
    pub overlap_minutes: u32,
    pub message: String,
}

/// Result of a create or update. `event` is the backend's echo of the
/// stored record, when it sends one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MutationOutcome {
    pub event: Option<Event>,
    #[serde(default)]
    pub conflicts: Vec<ConflictWarning>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(rename = "actionData", skip_serializing_if = "Option::is_none")]
    pub action_data: Option<serde_json::Value>,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            action: None,
            action_data: None,
        }
    }

    /// Appends an outcome line below the streamed reply.
    pub fn append_line(&mut self, line: &str) {
        if !self.content.is_empty() {
            self.content.push_str("\n\n");
        }
        self.content.push_str(line);
    }

    pub fn tag_action(&mut self, action: &str, action_data: serde_json::Value) {
        self.action = Some(action.to_string());
        self.action_data = Some(action_data);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerStatus {
    pub status: String,
    #[serde(default)]
    pub ollama_available: bool,
    #[serde(default)]
    pub ollama_model: Option<String>,
    #[serde(default)]
    pub event_count: u32,
    #[serde(default)]
    pub chat_history_length: u32,
}

impl ServerStatus {
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreeSlot {
    pub start: String,
    pub end: String,
    pub duration_mins: u32,
}

fn default_duration() -> u32 {
    DEFAULT_EVENT_DURATION_MINUTES
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_duration(value: u32, field_name: &str) -> Result<(), String> {
    if value == 0 {
        return Err(format!("{field_name} must be > 0"));
    }
    Ok(())
}

fn validate_hhmm(value: &str, field_name: &str) -> Result<(), String> {
    parse_hhmm(value)
        .map(|_| ())
        .ok_or_else(|| format!("{field_name} must be HH:MM"))
}

fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    parse_date(value)
        .map(|_| ())
        .ok_or_else(|| format!("{field_name} must be YYYY-MM-DD"))
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}
