//! Session driver: runs the [`Orchestrator`] on one task.
//!
//! User commands and fetch completions share a single channel, so the
//! orchestrator's transitions are applied strictly one at a time. Fetches run
//! on their own tasks and post their result back into that channel; the
//! input side is never blocked by the network.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use weatherly_core::AppError;

use crate::history::HistoryStore;
use crate::orchestrator::{Effect, Event, Orchestrator, QueryOrigin, Rejection, Snapshot};
use crate::provider::WeatherSource;
use crate::types::ProviderError;

/// Messages sent from the session back to the front end
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Fetch state, displayed report or recent searches changed.
    State(Snapshot),
    /// A submission was not accepted.
    Rejected(Rejection),
    /// Non-fatal problem worth telling the user about.
    Warning(String),
}

/// Cheap handle for feeding user input into a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<Event>,
}

impl SessionHandle {
    /// Typed text confirmed by the user. Returns false once the session has stopped.
    pub fn submit(&self, query: impl Into<String>) -> bool {
        self.events
            .send(Event::Submit {
                query: query.into(),
                origin: QueryOrigin::Typed,
            })
            .is_ok()
    }

    /// Re-run the N-th recent search (1-based, oldest first).
    pub fn select_history(&self, index: usize) -> bool {
        self.events.send(Event::SelectHistory { index }).is_ok()
    }
}

pub struct WeatherSession {
    orchestrator: Orchestrator,
    store: HistoryStore,
    source: Arc<dyn WeatherSource>,
    last_published: Option<Snapshot>,
}

impl WeatherSession {
    /// Restore recent searches from `store` and start `Idle`.
    pub fn new(store: HistoryStore, source: Arc<dyn WeatherSource>) -> Self {
        let history = store.load();
        Self {
            orchestrator: Orchestrator::new(history),
            store,
            source,
            last_published: None,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Spawn the event loop. It runs until `cancel` fires.
    ///
    /// The initial state is published before any input is processed.
    pub fn start(
        self,
        cancel: CancellationToken,
    ) -> (
        SessionHandle,
        mpsc::UnboundedReceiver<SessionUpdate>,
        JoinHandle<()>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle {
            events: events_tx.clone(),
        };
        let task = tokio::spawn(self.run(events_tx, events_rx, updates_tx, cancel));

        (handle, updates_rx, task)
    }

    async fn run(
        mut self,
        events_tx: mpsc::UnboundedSender<Event>,
        mut events_rx: mpsc::UnboundedReceiver<Event>,
        updates: mpsc::UnboundedSender<SessionUpdate>,
        cancel: CancellationToken,
    ) {
        tracing::debug!(
            "Session started with {} recent searches",
            self.orchestrator.history().len()
        );
        self.publish(&updates);

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            self.dispatch(event, &events_tx, &updates);
        }

        tracing::debug!("Session stopped");
    }

    fn dispatch(
        &mut self,
        event: Event,
        events_tx: &mpsc::UnboundedSender<Event>,
        updates: &mpsc::UnboundedSender<SessionUpdate>,
    ) {
        let transition = self.orchestrator.handle(event);

        if let Some(rejection) = transition.rejected {
            let _ = updates.send(SessionUpdate::Rejected(rejection));
        }

        for effect in transition.effects {
            match effect {
                Effect::Fetch { ticket, query } => {
                    let source = self.source.clone();
                    let tx = events_tx.clone();
                    tokio::spawn(async move {
                        // A panicking provider must still complete the ticket.
                        let lookup = tokio::spawn(async move { source.fetch(&query).await });
                        let result = match lookup.await {
                            Ok(result) => result,
                            Err(e) => {
                                tracing::error!(
                                    "Lookup task for fetch #{} failed: {}",
                                    ticket.value(),
                                    e
                                );
                                Err(ProviderError::Aborted(e.to_string()))
                            }
                        };
                        let _ = tx.send(Event::FetchCompleted { ticket, result });
                    });
                }
                Effect::Persist(history) => {
                    if let Err(e) = self.store.persist(&history) {
                        tracing::warn!("{}", e);
                        let message = AppError::from(e).user_message().to_string();
                        let _ = updates.send(SessionUpdate::Warning(message));
                    }
                }
            }
        }

        // Persistence has already run, so a published Success is durable.
        self.publish(updates);
    }

    /// Send a snapshot if anything visible changed since the last one.
    fn publish(&mut self, updates: &mpsc::UnboundedSender<SessionUpdate>) {
        let snapshot = self.orchestrator.snapshot();
        if self.last_published.as_ref() == Some(&snapshot) {
            return;
        }
        self.last_published = Some(snapshot.clone());
        let _ = updates.send(SessionUpdate::State(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{MemorySlot, SearchHistory};
    use crate::orchestrator::{FetchState, NOT_FOUND_MESSAGE};
    use crate::types::{CurrentConditions, Place, WeatherReport};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Knows a fixed set of places. Optionally holds every fetch until released.
    struct StubSource {
        known: Vec<&'static str>,
        gate: Option<Semaphore>,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(known: Vec<&'static str>) -> Self {
            Self {
                known,
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn gated(known: Vec<&'static str>) -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::new(known)
            }
        }

        fn release_one(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(1);
            }
        }
    }

    #[async_trait]
    impl WeatherSource for StubSource {
        async fn fetch(&self, place: &str) -> Result<WeatherReport, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire()
                    .await
                    .map_err(|e| ProviderError::Parse(e.to_string()))?
                    .forget();
            }
            if !self.known.iter().any(|k| *k == place) {
                return Err(ProviderError::NotFound(place.to_string()));
            }
            Ok(WeatherReport {
                place: Place {
                    name: place.to_string(),
                    region: String::new(),
                    country: "Testland".to_string(),
                },
                current: CurrentConditions {
                    temperature_c: 12.0,
                    temperature_f: 53.6,
                    condition: "Overcast".to_string(),
                    icon_url: String::new(),
                    humidity: 80,
                    pressure_mb: 1009.0,
                    visibility_km: 8.0,
                },
                fetched_at: Utc::now(),
            })
        }
    }

    /// Every lookup panics.
    struct PanickingSource;

    #[async_trait]
    impl WeatherSource for PanickingSource {
        async fn fetch(&self, place: &str) -> Result<WeatherReport, ProviderError> {
            panic!("provider bug while fetching {place}");
        }
    }

    async fn next_update(rx: &mut mpsc::UnboundedReceiver<SessionUpdate>) -> SessionUpdate {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for session update")
            .expect("session closed")
    }

    /// Wait until a snapshot that is no longer Loading (and not Idle) arrives.
    async fn settled(rx: &mut mpsc::UnboundedReceiver<SessionUpdate>) -> Snapshot {
        loop {
            if let SessionUpdate::State(s) = next_update(rx).await {
                if matches!(s.state, FetchState::Success(_) | FetchState::Failed(_)) {
                    return s;
                }
            }
        }
    }

    fn start(
        slot: Arc<MemorySlot>,
        source: Arc<StubSource>,
    ) -> (
        SessionHandle,
        mpsc::UnboundedReceiver<SessionUpdate>,
        CancellationToken,
    ) {
        let session = WeatherSession::new(HistoryStore::new(slot), source);
        let cancel = CancellationToken::new();
        let (handle, updates, _task) = session.start(cancel.clone());
        (handle, updates, cancel)
    }

    #[tokio::test]
    async fn publishes_initial_state_with_saved_history() {
        let slot = Arc::new(MemorySlot::with_value(r#"["Paris","Oslo"]"#));
        let (_handle, mut updates, cancel) = start(slot, Arc::new(StubSource::new(vec![])));

        match next_update(&mut updates).await {
            SessionUpdate::State(s) => {
                assert_eq!(s.state, FetchState::Idle);
                assert_eq!(s.history.entries(), ["Paris", "Oslo"]);
            }
            other => panic!("unexpected update {other:?}"),
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn paris_then_atlantis() {
        let slot = Arc::new(MemorySlot::new());
        let source = Arc::new(StubSource::new(vec!["Paris"]));
        let (handle, mut updates, cancel) = start(slot.clone(), source);

        assert!(handle.submit("Paris"));
        let s = settled(&mut updates).await;
        assert_eq!(s.history.entries(), ["Paris"]);
        assert_eq!(slot.value().as_deref(), Some(r#"["Paris"]"#));

        assert!(handle.submit("Atlantis"));
        let s = settled(&mut updates).await;
        assert_eq!(s.state, FetchState::Failed(NOT_FOUND_MESSAGE.to_string()));
        assert_eq!(s.history.entries(), ["Paris"]);
        assert_eq!(
            s.displayed.map(|r| r.place.name),
            Some("Paris".to_string())
        );
        assert_eq!(slot.write_count(), 1);

        cancel.cancel();
    }

    #[tokio::test]
    async fn submit_while_loading_is_rejected_and_not_fetched() {
        let slot = Arc::new(MemorySlot::new());
        let source = Arc::new(StubSource::gated(vec!["Paris", "Oslo"]));
        let (handle, mut updates, cancel) = start(slot, source.clone());

        handle.submit("Paris");
        handle.submit("Oslo");

        let mut rejected = None;
        while rejected.is_none() {
            if let SessionUpdate::Rejected(r) = next_update(&mut updates).await {
                rejected = Some(r);
            }
        }
        assert_eq!(
            rejected,
            Some(Rejection::Busy {
                in_flight: "Paris".into()
            })
        );

        source.release_one();
        let s = settled(&mut updates).await;
        assert_eq!(s.history.entries(), ["Paris"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        cancel.cancel();
    }

    #[tokio::test]
    async fn history_selection_does_not_persist() {
        let slot = Arc::new(MemorySlot::with_value(r#"["B","C","D","E","F"]"#));
        let source = Arc::new(StubSource::new(vec!["B", "C", "D", "E", "F"]));
        let (handle, mut updates, cancel) = start(slot.clone(), source.clone());

        assert!(handle.select_history(1));
        let s = settled(&mut updates).await;

        assert_eq!(s.displayed.map(|r| r.place.name), Some("B".to_string()));
        assert_eq!(s.history.entries(), ["B", "C", "D", "E", "F"]);
        assert_eq!(slot.write_count(), 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        cancel.cancel();
    }

    #[tokio::test]
    async fn write_failure_is_a_warning_and_memory_wins() {
        let slot = Arc::new(MemorySlot::new());
        slot.set_fail_writes(true);
        let source = Arc::new(StubSource::new(vec!["Paris"]));
        let (handle, mut updates, cancel) = start(slot.clone(), source);

        handle.submit("Paris");

        let mut warning = None;
        let mut snapshot = None;
        while warning.is_none() || snapshot.is_none() {
            match next_update(&mut updates).await {
                SessionUpdate::Warning(w) => warning = Some(w),
                SessionUpdate::State(s) if matches!(s.state, FetchState::Success(_)) => {
                    snapshot = Some(s)
                }
                _ => {}
            }
        }

        assert!(warning.is_some_and(|w| w.contains("could not be saved")));
        assert_eq!(
            snapshot.map(|s| s.history),
            Some(SearchHistory::from_entries(vec!["Paris".into()]))
        );
        assert_eq!(slot.value(), None);

        cancel.cancel();
    }

    #[tokio::test]
    async fn history_survives_restart() {
        let slot = Arc::new(MemorySlot::new());
        let source = Arc::new(StubSource::new(vec!["Paris", "Lima"]));

        let (handle, mut updates, cancel) = start(slot.clone(), source.clone());
        handle.submit("Paris");
        settled(&mut updates).await;
        handle.submit("Lima");
        settled(&mut updates).await;
        cancel.cancel();

        let restarted = WeatherSession::new(HistoryStore::new(slot), source);
        assert_eq!(
            restarted.orchestrator().history().entries(),
            ["Paris", "Lima"]
        );
    }

    #[tokio::test]
    async fn panicking_provider_fails_the_lookup_instead_of_hanging() {
        let slot = Arc::new(MemorySlot::new());
        let session = WeatherSession::new(HistoryStore::new(slot.clone()), Arc::new(PanickingSource));
        let cancel = CancellationToken::new();
        let (handle, mut updates, _task) = session.start(cancel.clone());

        handle.submit("Paris");
        let s = settled(&mut updates).await;
        assert_eq!(s.state, FetchState::Failed(NOT_FOUND_MESSAGE.to_string()));
        assert!(s.history.is_empty());

        // The session accepts new work afterwards.
        handle.submit("Oslo");
        loop {
            match next_update(&mut updates).await {
                SessionUpdate::Rejected(r) => panic!("unexpected rejection {r:?}"),
                SessionUpdate::State(s) if matches!(s.state, FetchState::Failed(_)) => break,
                _ => {}
            }
        }
        assert_eq!(slot.write_count(), 0);

        cancel.cancel();
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let slot = Arc::new(MemorySlot::new());
        let source = Arc::new(StubSource::new(vec![]));
        let (handle, mut updates, cancel) = start(slot, source.clone());

        let _initial = next_update(&mut updates).await;
        handle.submit("   ");
        assert_eq!(
            next_update(&mut updates).await,
            SessionUpdate::Rejected(Rejection::EmptyQuery)
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        cancel.cancel();
    }
}
