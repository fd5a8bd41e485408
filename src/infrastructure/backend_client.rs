use crate::domain::models::{
    ConflictWarning, Event, EventDraft, EventPatch, FreeSlot, MutationOutcome, ServerStatus,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw body chunks of a streamed chat reply, in transport order.
pub type ChatByteStream = BoxStream<'static, Result<Vec<u8>, InfraError>>;

#[async_trait]
pub trait CalendarBackend: Send + Sync {
    async fn status(&self) -> Result<ServerStatus, InfraError>;

    async fn list_events(&self, date: Option<&str>) -> Result<Vec<Event>, InfraError>;

    async fn create_event(&self, draft: &EventDraft) -> Result<MutationOutcome, InfraError>;

    async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<MutationOutcome, InfraError>;

    /// Returns the deleted event when the backend echoes it.
    async fn delete_event(&self, event_id: &str) -> Result<Option<Event>, InfraError>;

    async fn stream_chat(&self, message: &str) -> Result<ChatByteStream, InfraError>;

    async fn clear_chat(&self) -> Result<(), InfraError>;

    async fn shutdown(&self) -> Result<(), InfraError>;

    async fn free_slots(&self, date: &str, min_duration: u32) -> Result<Vec<FreeSlot>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestCalendarBackend {
    client: Client,
    base_url: Url,
}

impl ReqwestCalendarBackend {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid backend url '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "backend url cannot be a base: {base_url}"
            )));
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| InfraError::Network(format!("failed to build http client: {error}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("backend url cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// Maps a non-2xx answer to `InfraError::Backend`, keeping the `detail`
    /// field when the body carries one.
    fn backend_http_error(status: StatusCode, body: &str) -> InfraError {
        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_detail)
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            });
        InfraError::Backend {
            status: status.as_u16(),
            detail,
        }
    }

    async fn read_body(
        response: reqwest::Response,
        context: &str,
    ) -> Result<String, InfraError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Network(format!("failed reading {context} response: {error}")))?;
        if !status.is_success() {
            return Err(Self::backend_http_error(status, &body));
        }
        Ok(body)
    }

    fn parse_body<T>(body: &str, context: &str) -> Result<T, InfraError>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_str(body).map_err(|error| {
            InfraError::Network(format!("invalid {context} payload: {error}; body={body}"))
        })
    }

    fn ensure_success(
        success: bool,
        detail: Option<String>,
        error: Option<String>,
    ) -> Result<(), InfraError> {
        if success {
            return Ok(());
        }
        Err(InfraError::Backend {
            status: StatusCode::OK.as_u16(),
            detail: detail.or(error),
        })
    }
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl ErrorBody {
    fn into_detail(self) -> Option<String> {
        match self.detail? {
            serde_json::Value::String(detail) => Some(detail),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsListPayload {
    #[serde(default)]
    success: bool,
    events: Option<Vec<Event>>,
    detail: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct MutationPayload {
    #[serde(default)]
    success: bool,
    event: Option<Event>,
    conflicts: Option<Vec<ConflictWarning>>,
    detail: Option<String>,
    error: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct DeletePayload {
    #[serde(default)]
    success: bool,
    deleted: Option<Event>,
    detail: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct FreeSlotsRequest<'a> {
    date: &'a str,
    min_duration: u32,
}

#[derive(Debug, serde::Deserialize)]
struct FreeSlotsPayload {
    #[serde(default)]
    success: bool,
    free_slots: Option<Vec<FreeSlot>>,
    error: Option<String>,
}

#[async_trait]
impl CalendarBackend for ReqwestCalendarBackend {
    async fn status(&self) -> Result<ServerStatus, InfraError> {
        let response = self
            .client
            .get(self.endpoint(&["status"])?)
            .timeout(STATUS_PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while probing status: {error}")))?;

        let body = Self::read_body(response, "status").await?;
        Self::parse_body(&body, "status")
    }

    async fn list_events(&self, date: Option<&str>) -> Result<Vec<Event>, InfraError> {
        let mut request = self.client.get(self.endpoint(&["events"])?);
        if let Some(date) = date.map(str::trim).filter(|value| !value.is_empty()) {
            request = request.query(&[("date", date)]);
        }

        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while listing events: {error}")))?;

        let body = Self::read_body(response, "events list").await?;
        let parsed: EventsListPayload = Self::parse_body(&body, "events list")?;
        Self::ensure_success(parsed.success, parsed.detail, None)?;
        Ok(parsed.events.unwrap_or_default())
    }

    async fn create_event(&self, draft: &EventDraft) -> Result<MutationOutcome, InfraError> {
        let response = self
            .client
            .post(self.endpoint(&["events"])?)
            .json(draft)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while creating event: {error}")))?;

        let body = Self::read_body(response, "event create").await?;
        let parsed: MutationPayload = Self::parse_body(&body, "event create")?;
        Self::ensure_success(parsed.success, parsed.detail, parsed.error)?;
        Ok(MutationOutcome {
            event: parsed.event,
            conflicts: parsed.conflicts.unwrap_or_default(),
        })
    }

    async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<MutationOutcome, InfraError> {
        Self::ensure_non_empty(event_id, "event id")?;

        let response = self
            .client
            .put(self.endpoint(&["events", event_id.trim()])?)
            .json(patch)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while updating event: {error}")))?;

        let body = Self::read_body(response, "event update").await?;
        let parsed: MutationPayload = Self::parse_body(&body, "event update")?;
        Self::ensure_success(parsed.success, parsed.detail, parsed.error)?;
        Ok(MutationOutcome {
            event: parsed.event,
            conflicts: parsed.conflicts.unwrap_or_default(),
        })
    }

    async fn delete_event(&self, event_id: &str) -> Result<Option<Event>, InfraError> {
        Self::ensure_non_empty(event_id, "event id")?;

        let response = self
            .client
            .delete(self.endpoint(&["events", event_id.trim()])?)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while deleting event: {error}")))?;

        let body = Self::read_body(response, "event delete").await?;
        let parsed: DeletePayload = Self::parse_body(&body, "event delete")?;
        Self::ensure_success(parsed.success, parsed.detail, None)?;
        Ok(parsed.deleted)
    }

    async fn stream_chat(&self, message: &str) -> Result<ChatByteStream, InfraError> {
        Self::ensure_non_empty(message, "chat message")?;

        let response = self
            .client
            .post(self.endpoint(&["chat", "stream"])?)
            .json(&ChatRequest { message })
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while opening chat stream: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::backend_http_error(status, &body));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|error| InfraError::Stream(error.to_string()))
            })
            .boxed())
    }

    async fn clear_chat(&self) -> Result<(), InfraError> {
        let response = self
            .client
            .post(self.endpoint(&["chat", "clear"])?)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while clearing chat: {error}")))?;
        Self::read_body(response, "chat clear").await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), InfraError> {
        let response = self
            .client
            .post(self.endpoint(&["shutdown"])?)
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while requesting shutdown: {error}")))?;
        Self::read_body(response, "shutdown").await?;
        Ok(())
    }

    async fn free_slots(&self, date: &str, min_duration: u32) -> Result<Vec<FreeSlot>, InfraError> {
        Self::ensure_non_empty(date, "date")?;

        let response = self
            .client
            .post(self.endpoint(&["solve", "free"])?)
            .json(&FreeSlotsRequest {
                date: date.trim(),
                min_duration,
            })
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("network error while finding free slots: {error}")))?;

        let body = Self::read_body(response, "free slots").await?;
        let parsed: FreeSlotsPayload = Self::parse_body(&body, "free slots")?;
        Self::ensure_success(parsed.success, None, parsed.error)?;
        Ok(parsed.free_slots.unwrap_or_default())
    }
}
