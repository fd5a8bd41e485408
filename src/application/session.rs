use crate::application::event_store::EventStore;
use crate::domain::models::ServerStatus;
use crate::infrastructure::backend_client::CalendarBackend;
use crate::infrastructure::config::SessionSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_cache::EventCacheRepository;
use crate::infrastructure::launcher::{LaunchRequest, ProcessLauncher};
use std::sync::Arc;
use tokio::time::{sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state machine for the backend link.
pub struct SessionLifecycle<B, R, L>
where
    B: CalendarBackend,
    R: EventCacheRepository,
    L: ProcessLauncher,
{
    store: Arc<EventStore<B, R>>,
    launcher: Arc<L>,
    settings: SessionSettings,
    launch_request: LaunchRequest,
    state: SessionState,
    status: Option<ServerStatus>,
}

impl<B, R, L> SessionLifecycle<B, R, L>
where
    B: CalendarBackend,
    R: EventCacheRepository,
    L: ProcessLauncher,
{
    pub fn new(
        store: Arc<EventStore<B, R>>,
        launcher: Arc<L>,
        settings: SessionSettings,
        launch_request: LaunchRequest,
    ) -> Self {
        Self {
            store,
            launcher,
            settings,
            launch_request,
            state: SessionState::Disconnected,
            status: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Last status seen by a successful probe while connected.
    pub fn status(&self) -> Option<&ServerStatus> {
        self.status.as_ref()
    }

    pub async fn start(&mut self) -> Result<SessionState, InfraError> {
        self.transition(SessionState::Connecting);

        if let Ok(status) = self.store.backend().status().await {
            tracing::info!("backend already running");
            self.connected(status).await;
            return Ok(self.state);
        }

        if let Err(error) = self.launcher.start_process(&self.launch_request).await {
            tracing::error!(%error, process = %self.launch_request.name, "failed to launch backend");
            self.transition(SessionState::Disconnected);
            return Err(error);
        }

        let max_attempts = self.settings.max_attempts;
        for attempt in 1..=max_attempts {
            sleep(self.settings.poll_interval()).await;
            match self.store.backend().status().await {
                Ok(status) => {
                    tracing::info!(attempt, "backend became ready");
                    self.connected(status).await;
                    return Ok(self.state);
                }
                Err(error) => {
                    tracing::debug!(attempt, max_attempts, %error, "backend not ready yet");
                }
            }
        }

        tracing::error!(attempts = max_attempts, "backend did not become ready");
        self.transition(SessionState::Disconnected);
        Err(InfraError::ConnectTimeout {
            attempts: max_attempts,
        })
    }

    /// One health probe. Only meaningful while connected.
    pub async fn health_tick(&mut self) -> SessionState {
        if self.state != SessionState::Connected {
            return self.state;
        }
        match self.store.backend().status().await {
            Ok(status) => self.status = Some(status),
            Err(error) => {
                tracing::warn!(%error, "health probe failed; events are now stale");
                self.status = None;
                self.transition(SessionState::Disconnected);
            }
        }
        self.state
    }

    /// Probes every `health_interval` until the link drops or `cancel` fires.
    pub async fn monitor<F>(&mut self, cancel: &CancellationToken, mut on_probe: F) -> SessionState
    where
        F: FnMut(SessionState, Option<&ServerStatus>),
    {
        let mut ticker = tokio::time::interval(self.settings.health_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        while self.state == SessionState::Connected {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let state = self.health_tick().await;
                    on_probe(state, self.status.as_ref());
                }
            }
        }
        self.state
    }

    /// Best-effort stop: launcher first, then the backend's own shutdown
    /// endpoint. Always ends disconnected.
    pub async fn stop(&mut self) -> SessionState {
        if let Err(error) = self.launcher.stop_process(&self.launch_request.name).await {
            tracing::warn!(%error, "launcher stop failed; requesting backend shutdown");
            if let Err(error) = self.store.backend().shutdown().await {
                tracing::warn!(%error, "backend shutdown request failed");
            }
        }
        self.status = None;
        self.transition(SessionState::Disconnected);
        self.state
    }

    async fn connected(&mut self, status: ServerStatus) {
        self.status = Some(status);
        self.transition(SessionState::Connected);
        if let Err(error) = self.store.fetch_all().await {
            tracing::warn!(%error, "initial event fetch failed");
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::info!(from = ?self.state, to = ?next, "session state changed");
            self.state = next;
        }
    }
}
