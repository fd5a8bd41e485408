use crate::domain::models::{Event, EventDraft, EventPatch, FreeSlot, MutationOutcome};
use crate::infrastructure::backend_client::CalendarBackend;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_cache::EventCacheRepository;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Arc, Mutex};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Client-side view of the backend event list.
///
/// Every mutation is followed by a full refetch, whether or not the mutation
/// succeeded, so the cache only ever holds what the backend last reported.
pub struct EventStore<B, R>
where
    B: CalendarBackend,
    R: EventCacheRepository,
{
    backend: Arc<B>,
    cache: Arc<R>,
    last_synced_at: Mutex<Option<DateTime<Utc>>>,
    now_provider: NowProvider,
}

impl<B, R> EventStore<B, R>
where
    B: CalendarBackend,
    R: EventCacheRepository,
{
    pub fn new(backend: Arc<B>, cache: Arc<R>) -> Self {
        Self {
            backend,
            cache,
            last_synced_at: Mutex::new(None),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Replaces the cache with the backend's full list. On failure the
    /// previous cache stays as it was.
    pub async fn fetch_all(&self) -> Result<Vec<Event>, InfraError> {
        let events = match self.backend.list_events(None).await {
            Ok(events) => events,
            Err(error) => {
                tracing::warn!(%error, "event fetch failed; keeping previous cache");
                return Err(error);
            }
        };

        self.cache.replace_all(events.clone())?;
        let synced_at = (self.now_provider)();
        if let Ok(mut last) = self.last_synced_at.lock() {
            *last = Some(synced_at);
        }
        tracing::debug!(count = events.len(), "event cache refreshed");
        Ok(events)
    }

    pub async fn create(&self, draft: &EventDraft) -> Result<MutationOutcome, InfraError> {
        let result = self.backend.create_event(draft).await;
        self.refresh_after("create").await;

        let outcome = result?;
        Self::log_conflicts("create", &outcome);
        tracing::info!(
            event_id = outcome.event.as_ref().map(|event| event.id.as_str()),
            title = %draft.title,
            "event created"
        );
        Ok(outcome)
    }

    pub async fn update(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<MutationOutcome, InfraError> {
        let result = self.backend.update_event(event_id, patch).await;
        self.refresh_after("update").await;

        let outcome = result?;
        Self::log_conflicts("update", &outcome);
        tracing::info!(event_id, "event updated");
        Ok(outcome)
    }

    /// Returns the deleted event when the backend echoes it back.
    pub async fn delete(&self, event_id: &str) -> Result<Option<Event>, InfraError> {
        let result = self.backend.delete_event(event_id).await;
        self.refresh_after("delete").await;

        let deleted = result?;
        tracing::info!(event_id, "event deleted");
        Ok(deleted)
    }

    /// Queries one day directly from the backend without touching the cache.
    pub async fn fetch_for_date(&self, date: NaiveDate) -> Result<Vec<Event>, InfraError> {
        self.backend
            .list_events(Some(&date.format("%Y-%m-%d").to_string()))
            .await
    }

    pub async fn free_slots(
        &self,
        date: NaiveDate,
        min_duration: u32,
    ) -> Result<Vec<FreeSlot>, InfraError> {
        self.backend
            .free_slots(&date.format("%Y-%m-%d").to_string(), min_duration)
            .await
    }

    pub fn events(&self) -> Result<Vec<Event>, InfraError> {
        self.cache.list_all()
    }

    pub fn cached_count(&self) -> Result<usize, InfraError> {
        self.cache.len()
    }

    pub fn get(&self, event_id: &str) -> Result<Option<Event>, InfraError> {
        self.cache.get_by_id(event_id)
    }

    /// Cached events on `date`, ordered by start time.
    pub fn events_on(&self, date: NaiveDate) -> Result<Vec<Event>, InfraError> {
        self.events_in(&[date])
    }

    /// Cached events falling on any of `dates`, ordered by date then time.
    pub fn events_in(&self, dates: &[NaiveDate]) -> Result<Vec<Event>, InfraError> {
        let mut events: Vec<Event> = self
            .cache
            .list_all()?
            .into_iter()
            .filter(|event| event.naive_date().is_some_and(|day| dates.contains(&day)))
            .collect();
        events.sort_by(|left, right| {
            (left.naive_date(), left.start_minutes()).cmp(&(right.naive_date(), right.start_minutes()))
        });
        Ok(events)
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at.lock().ok().and_then(|last| *last)
    }

    async fn refresh_after(&self, operation: &str) {
        if let Err(error) = self.fetch_all().await {
            tracing::warn!(operation, %error, "refetch after mutation failed");
        }
    }

    fn log_conflicts(operation: &str, outcome: &MutationOutcome) {
        for conflict in &outcome.conflicts {
            tracing::warn!(
                operation,
                conflicting_id = %conflict.event_id,
                overlap_minutes = conflict.overlap_minutes,
                "{}",
                conflict.message
            );
        }
    }
}
