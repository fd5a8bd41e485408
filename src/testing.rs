//! Shared fakes and fixtures for unit tests.

use crate::domain::models::{
    ConflictWarning, Event, EventDraft, EventPatch, FreeSlot, MutationOutcome, ServerStatus,
};
use crate::infrastructure::backend_client::{CalendarBackend, ChatByteStream};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::launcher::{LaunchRequest, ProcessLauncher};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(label: &str) -> Self {
        let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "aion-calendar-{label}-{}-{}",
            std::process::id(),
            sequence
        ));
        fs::create_dir_all(&path).expect("create temp dir");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

pub fn sample_event(id: &str, title: &str, date: &str, time: &str, duration: u32) -> Event {
    Event {
        id: id.to_string(),
        title: title.to_string(),
        date: date.to_string(),
        time: time.to_string(),
        duration,
        description: String::new(),
        category: crate::domain::models::EventCategory::Work,
    }
}

#[derive(Debug, Clone)]
pub enum FakeChunk {
    Data(Vec<u8>),
    Fail(String),
    /// Stream stays open without producing anything further.
    Hang,
}

impl FakeChunk {
    pub fn text(value: &str) -> Self {
        Self::Data(value.as_bytes().to_vec())
    }
}

/// In-memory stand-in for the calendar backend. Mutations behave like the
/// real server, including overlap warnings that never block the write.
#[derive(Debug, Default)]
pub struct FakeCalendarBackend {
    events: Mutex<Vec<Event>>,
    next_id: AtomicUsize,
    offline: AtomicBool,
    status_script: Mutex<VecDeque<bool>>,
    fail_next_list: AtomicBool,
    fail_shutdown: AtomicBool,
    stream_script: Mutex<VecDeque<Vec<FakeChunk>>>,
    pub list_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
    pub sent_messages: Mutex<Vec<String>>,
    pub sent_patches: Mutex<Vec<(String, serde_json::Value)>>,
    pub free_slot_requests: Mutex<Vec<(String, u32)>>,
}

impl FakeCalendarBackend {
    pub fn with_events(events: Vec<Event>) -> Self {
        let backend = Self::default();
        *backend.events.lock().expect("events lock poisoned") = events;
        backend
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    /// Probe answers consumed in order before falling back to the online flag.
    pub fn script_status(&self, answers: Vec<bool>) {
        *self.status_script.lock().expect("status lock poisoned") = answers.into();
    }

    pub fn fail_next_list(&self) {
        self.fail_next_list.store(true, Ordering::SeqCst);
    }

    pub fn fail_shutdown(&self) {
        self.fail_shutdown.store(true, Ordering::SeqCst);
    }

    pub fn script_stream(&self, chunks: Vec<FakeChunk>) {
        self.stream_script
            .lock()
            .expect("stream lock poisoned")
            .push_back(chunks);
    }

    pub fn stored_events(&self) -> Vec<Event> {
        self.events.lock().expect("events lock poisoned").clone()
    }

    fn not_found() -> InfraError {
        InfraError::Backend {
            status: 404,
            detail: Some("Event not found".to_string()),
        }
    }

    fn conflicts_for(events: &[Event], candidate: &Event) -> Vec<ConflictWarning> {
        let Some(start) = candidate.start_minutes() else {
            return Vec::new();
        };
        let end = start + candidate.duration;
        events
            .iter()
            .filter(|event| event.id != candidate.id && event.date == candidate.date)
            .filter_map(|event| {
                let other_start = event.start_minutes()?;
                let other_end = other_start + event.duration;
                let overlap_start = start.max(other_start);
                let overlap_end = end.min(other_end);
                (overlap_start < overlap_end).then(|| {
                    let overlap_minutes = overlap_end - overlap_start;
                    ConflictWarning {
                        event_id: event.id.clone(),
                        title: event.title.clone(),
                        overlap_minutes,
                        message: format!(
                            "Overlaps with '{}' by {overlap_minutes} minutes",
                            event.title
                        ),
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl CalendarBackend for FakeCalendarBackend {
    async fn status(&self) -> Result<ServerStatus, InfraError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .status_script
            .lock()
            .expect("status lock poisoned")
            .pop_front();
        let online = scripted.unwrap_or_else(|| !self.offline.load(Ordering::SeqCst));
        if !online {
            return Err(InfraError::Network("connection refused".to_string()));
        }
        Ok(ServerStatus {
            status: "online".to_string(),
            ollama_available: true,
            ollama_model: Some("qwen2.5:3b".to_string()),
            event_count: self.stored_events().len() as u32,
            chat_history_length: 0,
        })
    }

    async fn list_events(&self, date: Option<&str>) -> Result<Vec<Event>, InfraError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_list.swap(false, Ordering::SeqCst) {
            return Err(InfraError::Network("connection reset".to_string()));
        }
        let events = self.stored_events();
        Ok(match date {
            Some(date) => events.into_iter().filter(|event| event.date == date).collect(),
            None => events,
        })
    }

    async fn create_event(&self, draft: &EventDraft) -> Result<MutationOutcome, InfraError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        draft.validate().map_err(|detail| InfraError::Backend {
            status: 422,
            detail: Some(detail),
        })?;

        let sequence = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id: format!("evt{sequence:05}"),
            title: draft.title.clone(),
            date: draft.date.clone(),
            time: draft.time.clone(),
            duration: draft.duration,
            description: draft.description.clone(),
            category: draft.category,
        };

        let mut events = self.events.lock().expect("events lock poisoned");
        let conflicts = Self::conflicts_for(&events, &event);
        events.push(event.clone());
        Ok(MutationOutcome {
            event: Some(event),
            conflicts,
        })
    }

    async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<MutationOutcome, InfraError> {
        self.sent_patches
            .lock()
            .expect("patch lock poisoned")
            .push((
                event_id.to_string(),
                serde_json::to_value(patch).expect("serialize patch"),
            ));

        let mut events = self.events.lock().expect("events lock poisoned");
        let index = events
            .iter()
            .position(|event| event.id == event_id)
            .ok_or_else(Self::not_found)?;

        let mut updated = events[index].clone();
        if let Some(title) = &patch.title {
            updated.title = title.clone();
        }
        if let Some(date) = &patch.date {
            updated.date = date.clone();
        }
        if let Some(time) = &patch.time {
            updated.time = time.clone();
        }
        if let Some(duration) = patch.duration {
            updated.duration = duration;
        }
        if let Some(description) = &patch.description {
            updated.description = description.clone();
        }
        if let Some(category) = patch.category {
            updated.category = category;
        }

        let conflicts = Self::conflicts_for(&events, &updated);
        events[index] = updated.clone();
        Ok(MutationOutcome {
            event: Some(updated),
            conflicts,
        })
    }

    async fn delete_event(&self, event_id: &str) -> Result<Option<Event>, InfraError> {
        let mut events = self.events.lock().expect("events lock poisoned");
        let index = events
            .iter()
            .position(|event| event.id == event_id)
            .ok_or_else(Self::not_found)?;
        Ok(Some(events.remove(index)))
    }

    async fn stream_chat(&self, message: &str) -> Result<ChatByteStream, InfraError> {
        self.sent_messages
            .lock()
            .expect("message lock poisoned")
            .push(message.to_string());
        let script = self
            .stream_script
            .lock()
            .expect("stream lock poisoned")
            .pop_front()
            .unwrap_or_default();

        let mut items = Vec::new();
        let mut hang = false;
        for chunk in script {
            match chunk {
                FakeChunk::Data(bytes) => items.push(Ok(bytes)),
                FakeChunk::Fail(message) => items.push(Err(InfraError::Stream(message))),
                FakeChunk::Hang => {
                    hang = true;
                    break;
                }
            }
        }

        let body = stream::iter(items);
        if hang {
            Ok(body.chain(stream::pending()).boxed())
        } else {
            Ok(body.boxed())
        }
    }

    async fn clear_chat(&self) -> Result<(), InfraError> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), InfraError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown.load(Ordering::SeqCst) {
            return Err(InfraError::Network("connection refused".to_string()));
        }
        self.set_online(false);
        Ok(())
    }

    async fn free_slots(&self, date: &str, min_duration: u32) -> Result<Vec<FreeSlot>, InfraError> {
        self.free_slot_requests
            .lock()
            .expect("free slot lock poisoned")
            .push((date.to_string(), min_duration));
        Ok(vec![FreeSlot {
            start: "12:00".to_string(),
            end: "13:30".to_string(),
            duration_mins: 90,
        }])
    }
}

#[derive(Debug, Default)]
pub struct FakeLauncher {
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub started: Mutex<Vec<LaunchRequest>>,
}

impl FakeLauncher {
    pub fn failing_start() -> Self {
        let launcher = Self::default();
        launcher.fail_start.store(true, Ordering::SeqCst);
        launcher
    }

    pub fn failing_stop() -> Self {
        let launcher = Self::default();
        launcher.fail_stop.store(true, Ordering::SeqCst);
        launcher
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn start_process(&self, request: &LaunchRequest) -> Result<(), InfraError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(InfraError::Launcher("interpreter not found".to_string()));
        }
        self.started
            .lock()
            .expect("started lock poisoned")
            .push(request.clone());
        Ok(())
    }

    async fn stop_process(&self, name: &str) -> Result<(), InfraError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(InfraError::Launcher(format!("no tracked process named '{name}'")));
        }
        Ok(())
    }

    async fn list_environments(&self) -> Result<Vec<String>, InfraError> {
        Ok(vec!["calendar".to_string()])
    }
}
