use crate::application::bootstrap::bootstrap_workspace;
use crate::application::chat::{ChatConversation, ChatTurn};
use crate::application::event_store::EventStore;
use crate::application::session::{SessionLifecycle, SessionState};
use crate::domain::calendar_grid::{is_in_month, month_grid, navigate, week_grid, CalendarView};
use crate::domain::models::{
    parse_date, ConflictWarning, Event, EventCategory, EventDraft, EventPatch, FreeSlot,
    ServerStatus, DEFAULT_EVENT_DURATION_MINUTES,
};
use crate::domain::time_layout::{HourMark, SlotGeometry, TimeLayoutEngine};
use crate::infrastructure::backend_client::{CalendarBackend, ReqwestCalendarBackend};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_cache::InMemoryEventCacheRepository;
use crate::infrastructure::launcher::{LaunchRequest, ProcessLauncher, ScriptLauncher};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const DEFAULT_FREE_SLOT_MINUTES: u32 = 30;
const BACKEND_LOG: &str = "backend.log";

type Store<B> = EventStore<B, InMemoryEventCacheRepository>;

pub struct AppState<B = ReqwestCalendarBackend, L = ScriptLauncher>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    config: ClientConfig,
    config_dir: PathBuf,
    logs_dir: PathBuf,
    store: Arc<Store<B>>,
    launcher: Arc<L>,
    layout: TimeLayoutEngine,
    session: Mutex<SessionLifecycle<B, InMemoryEventCacheRepository, L>>,
    chat: Mutex<ChatConversation<B, InMemoryEventCacheRepository>>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let backend = Arc::new(ReqwestCalendarBackend::new(&bootstrap.config.effective_backend_url())?);
        let launcher = Arc::new(ScriptLauncher::new(bootstrap.config.launcher.clone()));
        Ok(Self::with_parts(
            bootstrap.config,
            bootstrap.config_dir,
            bootstrap.logs_dir,
            backend,
            launcher,
        ))
    }
}

impl<B, L> AppState<B, L>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    pub fn with_parts(
        config: ClientConfig,
        config_dir: PathBuf,
        logs_dir: PathBuf,
        backend: Arc<B>,
        launcher: Arc<L>,
    ) -> Self {
        let store = Arc::new(EventStore::new(
            backend,
            Arc::new(InMemoryEventCacheRepository::default()),
        ));
        let launch_request = LaunchRequest {
            name: config.launcher.process_name.clone(),
            environment: config.launcher.environment.clone(),
            script: PathBuf::from(&config.launcher.script_path),
            port: config.port,
            log_file: Some(logs_dir.join(BACKEND_LOG)),
        };
        let session = SessionLifecycle::new(
            Arc::clone(&store),
            Arc::clone(&launcher),
            config.session.clone(),
            launch_request,
        );
        let chat = ChatConversation::new(Arc::clone(&store));

        Self {
            layout: TimeLayoutEngine::new(config.layout),
            config,
            config_dir,
            logs_dir,
            store,
            launcher,
            session: Mutex::new(session),
            chat: Mutex::new(chat),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn store(&self) -> &Arc<Store<B>> {
        &self.store
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        tracing::error!(command, %error, "command failed");
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        tracing::info!(command, "{}", message);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<ServerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectResponse {
    pub state: SessionState,
    pub event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<ServerStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MutationResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    pub conflicts: Vec<ConflictWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    pub in_month: bool,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthViewResponse {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<Vec<DayCell>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedEvent {
    pub event: Event,
    pub column: usize,
    pub geometry: SlotGeometry,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekViewResponse {
    pub days: Vec<NaiveDate>,
    pub hours: Vec<HourMark>,
    pub placed: Vec<PlacedEvent>,
    /// Events in this week that fall outside the visible hours.
    pub hidden: Vec<Event>,
}

#[derive(Debug, Clone, Default)]
pub struct AddEventInput {
    pub title: String,
    pub date: String,
    pub time: String,
    pub duration: Option<u32>,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateEventInput {
    pub title: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub duration: Option<u32>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// One-shot probe that does not change the session state.
pub async fn status_impl<B, L>(state: &AppState<B, L>) -> Result<StatusResponse, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    let session_state = state.session.lock().await.state();
    let response = match state.store.backend().status().await {
        Ok(status) => StatusResponse {
            state: session_state,
            backend: Some(status),
            error: None,
        },
        Err(error) => StatusResponse {
            state: session_state,
            backend: None,
            error: Some(error.to_string()),
        },
    };
    Ok(response)
}

pub async fn connect_impl<B, L>(state: &AppState<B, L>) -> Result<ConnectResponse, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    let mut session = state.session.lock().await;
    let session_state = session.start().await?;
    let event_count = state.store.cached_count()?;
    state.log_info(
        "connect",
        &format!(
            "connected to {} events={event_count}",
            state.config.effective_backend_url()
        ),
    );
    Ok(ConnectResponse {
        state: session_state,
        event_count,
        backend: session.status().cloned(),
    })
}

pub async fn disconnect_impl<B, L>(state: &AppState<B, L>) -> Result<SessionState, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    let session_state = state.session.lock().await.stop().await;
    state.log_info("disconnect", "session stopped");
    Ok(session_state)
}

/// Connects, then keeps probing until the link drops or `cancel` fires.
pub async fn watch_impl<B, L, F>(
    state: &AppState<B, L>,
    cancel: &CancellationToken,
    on_probe: F,
) -> Result<SessionState, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
    F: FnMut(SessionState, Option<&ServerStatus>),
{
    let mut session = state.session.lock().await;
    if session.state() != SessionState::Connected {
        session.start().await?;
    }
    Ok(session.monitor(cancel, on_probe).await)
}

pub async fn list_environments_impl<B, L>(state: &AppState<B, L>) -> Result<Vec<String>, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    state.launcher.list_environments().await
}

pub async fn list_events_impl<B, L>(
    state: &AppState<B, L>,
    date: Option<String>,
) -> Result<Vec<Event>, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    match normalize_optional(date) {
        Some(date) => {
            let date = parse_date_input(&date, "date")?;
            state.store.fetch_for_date(date).await
        }
        None => state.store.fetch_all().await,
    }
}

pub async fn add_event_impl<B, L>(
    state: &AppState<B, L>,
    input: AddEventInput,
) -> Result<MutationResponse, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    let category = match normalize_optional(input.category) {
        Some(category) => EventCategory::parse(&category).map_err(InfraError::InvalidInput)?,
        None => EventCategory::default(),
    };
    let draft = EventDraft {
        title: input.title.trim().to_string(),
        date: input.date.trim().to_string(),
        time: input.time.trim().to_string(),
        duration: input.duration.unwrap_or(DEFAULT_EVENT_DURATION_MINUTES),
        description: input.description.unwrap_or_default(),
        category,
    };
    draft.validate().map_err(InfraError::InvalidInput)?;

    let outcome = state.store.create(&draft).await?;
    state.log_info(
        "add_event",
        &format!(
            "created title={} conflicts={}",
            draft.title,
            outcome.conflicts.len()
        ),
    );
    Ok(MutationResponse {
        event: outcome.event,
        conflicts: outcome.conflicts,
    })
}

pub async fn update_event_impl<B, L>(
    state: &AppState<B, L>,
    event_id: String,
    input: UpdateEventInput,
) -> Result<MutationResponse, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    let event_id = required_id(&event_id)?;
    let patch = EventPatch {
        title: normalize_optional(input.title),
        date: normalize_optional(input.date),
        time: normalize_optional(input.time),
        duration: input.duration,
        description: input.description,
        category: normalize_optional(input.category)
            .map(|category| EventCategory::parse(&category))
            .transpose()
            .map_err(InfraError::InvalidInput)?,
    };
    if patch.is_empty() {
        return Err(InfraError::InvalidInput(
            "update requires at least one field".to_string(),
        ));
    }
    patch.validate().map_err(InfraError::InvalidInput)?;

    let outcome = state.store.update(&event_id, &patch).await?;
    state.log_info("update_event", &format!("updated event_id={event_id}"));
    Ok(MutationResponse {
        event: outcome.event,
        conflicts: outcome.conflicts,
    })
}

pub async fn delete_event_impl<B, L>(
    state: &AppState<B, L>,
    event_id: String,
) -> Result<Option<Event>, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    let event_id = required_id(&event_id)?;
    let deleted = state.store.delete(&event_id).await?;
    state.log_info("delete_event", &format!("deleted event_id={event_id}"));
    Ok(deleted)
}

pub async fn month_view_impl<B, L>(
    state: &AppState<B, L>,
    date: Option<String>,
    offset: i32,
) -> Result<MonthViewResponse, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    let reference = resolve_reference(date, CalendarView::Month, offset)?;
    refresh_or_keep_stale(state).await;

    let (year, month) = (reference.year(), reference.month());
    let grid = month_grid(year, month)
        .ok_or_else(|| InfraError::InvalidInput(format!("invalid month {year}-{month}")))?;
    let events = state.store.events_in(&grid)?;

    let cells: Vec<DayCell> = grid
        .iter()
        .map(|day| DayCell {
            date: *day,
            in_month: is_in_month(*day, year, month),
            events: events
                .iter()
                .filter(|event| event.naive_date() == Some(*day))
                .cloned()
                .collect(),
        })
        .collect();

    Ok(MonthViewResponse {
        year,
        month,
        weeks: cells.chunks(7).map(<[DayCell]>::to_vec).collect(),
    })
}

pub async fn week_view_impl<B, L>(
    state: &AppState<B, L>,
    date: Option<String>,
    offset: i32,
) -> Result<WeekViewResponse, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    let reference = resolve_reference(date, CalendarView::Week, offset)?;
    refresh_or_keep_stale(state).await;

    let days = week_grid(reference);
    let events = state.store.events_in(&days)?;
    let positioned = state.layout.layout_week(&events, &days);

    let mut placed = Vec::with_capacity(positioned.len());
    let mut hidden = Vec::new();
    for event in events {
        match positioned.iter().find(|item| item.event_id == event.id) {
            Some(item) => placed.push(PlacedEvent {
                column: item.column,
                geometry: item.geometry,
                event,
            }),
            None => hidden.push(event),
        }
    }

    Ok(WeekViewResponse {
        days,
        hours: state.layout.hour_marks(),
        placed,
        hidden,
    })
}

pub async fn free_slots_impl<B, L>(
    state: &AppState<B, L>,
    date: String,
    min_duration: Option<u32>,
) -> Result<Vec<FreeSlot>, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    let date = parse_date_input(&date, "date")?;
    state
        .store
        .free_slots(date, min_duration.unwrap_or(DEFAULT_FREE_SLOT_MINUTES))
        .await
}

pub async fn chat_impl<B, L, F>(
    state: &AppState<B, L>,
    message: String,
    cancel: &CancellationToken,
    on_update: F,
) -> Result<ChatTurn, InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
    F: FnMut(&str),
{
    let mut chat = state.chat.try_lock().map_err(|_| InfraError::ChatBusy)?;
    let turn = chat.send(&message, cancel, on_update).await?;
    state.log_info(
        "chat",
        &format!(
            "reply settled state={:?} action={}",
            turn.state,
            turn.reply.action.as_deref().unwrap_or("none")
        ),
    );
    Ok(turn)
}

pub async fn clear_chat_impl<B, L>(state: &AppState<B, L>) -> Result<(), InfraError>
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    state.chat.lock().await.clear().await;
    state.log_info("clear_chat", "chat history cleared");
    Ok(())
}

async fn refresh_or_keep_stale<B, L>(state: &AppState<B, L>)
where
    B: CalendarBackend,
    L: ProcessLauncher,
{
    if let Err(error) = state.store.fetch_all().await {
        tracing::warn!(%error, "showing cached events");
    }
}

fn resolve_reference(
    date: Option<String>,
    view: CalendarView,
    offset: i32,
) -> Result<NaiveDate, InfraError> {
    let reference = match normalize_optional(date) {
        Some(date) => parse_date_input(&date, "date")?,
        None => chrono::Local::now().date_naive(),
    };
    Ok(navigate(view, reference, offset))
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn required_id(value: &str) -> Result<String, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidInput(
            "event id must not be empty".to_string(),
        ));
    }
    Ok(value.to_string())
}

fn parse_date_input(value: &str, field_name: &str) -> Result<NaiveDate, InfraError> {
    parse_date(value).ok_or_else(|| {
        InfraError::InvalidInput(format!("{field_name} must be YYYY-MM-DD, got '{value}'"))
    })
}
