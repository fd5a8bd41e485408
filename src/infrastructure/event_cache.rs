use crate::domain::models::Event;
use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

/// Local mirror of the backend event list. Contents are only ever replaced
/// wholesale from a successful fetch.
pub trait EventCacheRepository: Send + Sync {
    fn replace_all(&self, events: Vec<Event>) -> Result<(), InfraError>;
    fn list_all(&self) -> Result<Vec<Event>, InfraError>;
    fn get_by_id(&self, event_id: &str) -> Result<Option<Event>, InfraError>;
    fn len(&self) -> Result<usize, InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryEventCacheRepository {
    events: Mutex<Vec<Event>>,
}

impl InMemoryEventCacheRepository {
    fn normalized_id(event_id: &str) -> Option<&str> {
        let normalized = event_id.trim();
        if normalized.is_empty() {
            return None;
        }
        Some(normalized)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Event>>, InfraError> {
        self.events
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("event cache lock poisoned: {error}")))
    }
}

impl EventCacheRepository for InMemoryEventCacheRepository {
    fn replace_all(&self, events: Vec<Event>) -> Result<(), InfraError> {
        *self.lock()? = events;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Event>, InfraError> {
        Ok(self.lock()?.clone())
    }

    fn get_by_id(&self, event_id: &str) -> Result<Option<Event>, InfraError> {
        let Some(event_id) = Self::normalized_id(event_id) else {
            return Ok(None);
        };
        Ok(self
            .lock()?
            .iter()
            .find(|event| event.id == event_id)
            .cloned())
    }

    fn len(&self) -> Result<usize, InfraError> {
        Ok(self.lock()?.len())
    }
}
