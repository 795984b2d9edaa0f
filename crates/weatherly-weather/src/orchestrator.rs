//! Lookup state machine.
//!
//! [`Orchestrator::handle`] is a reducer: it takes an [`Event`], updates the
//! fetch state and recent searches, and returns the [`Effect`]s the caller
//! must run. It does no I/O itself.
//!
//! Only one fetch may be in flight. A submission that arrives while
//! `Loading` is rejected with [`Rejection::Busy`] and changes nothing.

use crate::history::{HistoryStore, SearchHistory};
use crate::types::{ProviderError, WeatherReport};

/// Shown for every provider failure.
pub const NOT_FOUND_MESSAGE: &str = "place not found";

/// How a query entered the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrigin {
    /// Typed and committed by the user; recorded on success.
    Typed,
    /// Picked from recent searches; never recorded again.
    History,
}

/// Identifies one fetch so its completion can be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingFetch {
    pub ticket: FetchTicket,
    pub query: String,
    pub origin: QueryOrigin,
}

/// Outcome of the most recent lookup.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FetchState {
    #[default]
    Idle,
    Loading(PendingFetch),
    Success(WeatherReport),
    Failed(String),
}

impl FetchState {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading(_))
    }
}

#[derive(Debug)]
pub enum Event {
    /// A place name to look up.
    Submit { query: String, origin: QueryOrigin },
    /// The user picked the N-th recent search (1-based, oldest first).
    SelectHistory { index: usize },
    /// A fetch started by an earlier [`Effect::Fetch`] finished.
    FetchCompleted {
        ticket: FetchTicket,
        result: Result<WeatherReport, ProviderError>,
    },
}

/// Work the caller must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run exactly one provider call and report back with `ticket`.
    Fetch { ticket: FetchTicket, query: String },
    /// Overwrite the persistence slot with this history.
    Persist(SearchHistory),
}

/// Why a submission did not start a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    EmptyQuery,
    Busy { in_flight: String },
    NoSuchHistoryEntry(usize),
}

#[derive(Debug, Default, PartialEq)]
pub struct Transition {
    pub effects: Vec<Effect>,
    pub rejected: Option<Rejection>,
}

impl Transition {
    fn effect(effect: Effect) -> Self {
        Self {
            effects: vec![effect],
            rejected: None,
        }
    }

    fn rejected(rejection: Rejection) -> Self {
        Self {
            effects: Vec::new(),
            rejected: Some(rejection),
        }
    }
}

/// Everything the display needs, copied out of the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: FetchState,
    /// Last successful report; survives later failures.
    pub displayed: Option<WeatherReport>,
    pub history: SearchHistory,
}

#[derive(Debug, Default)]
pub struct Orchestrator {
    state: FetchState,
    displayed: Option<WeatherReport>,
    history: SearchHistory,
    next_ticket: u64,
}

impl Orchestrator {
    /// Start `Idle` with previously saved recent searches.
    pub fn new(history: SearchHistory) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn displayed(&self) -> Option<&WeatherReport> {
        self.displayed.as_ref()
    }

    pub fn history(&self) -> &SearchHistory {
        &self.history
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
            displayed: self.displayed.clone(),
            history: self.history.clone(),
        }
    }

    pub fn handle(&mut self, event: Event) -> Transition {
        match event {
            Event::Submit { query, origin } => self.submit(&query, origin),
            Event::SelectHistory { index } => match self.history.get_display_index(index) {
                Some(query) => {
                    let query = query.to_string();
                    self.submit(&query, QueryOrigin::History)
                }
                None => Transition::rejected(Rejection::NoSuchHistoryEntry(index)),
            },
            Event::FetchCompleted { ticket, result } => self.complete(ticket, result),
        }
    }

    fn submit(&mut self, query: &str, origin: QueryOrigin) -> Transition {
        let query = query.trim();
        if query.is_empty() {
            return Transition::rejected(Rejection::EmptyQuery);
        }

        if let FetchState::Loading(pending) = &self.state {
            tracing::debug!(
                "Ignoring {:?} while {:?} is in flight",
                query,
                pending.query
            );
            return Transition::rejected(Rejection::Busy {
                in_flight: pending.query.clone(),
            });
        }

        self.next_ticket += 1;
        let ticket = FetchTicket(self.next_ticket);
        self.state = FetchState::Loading(PendingFetch {
            ticket,
            query: query.to_string(),
            origin,
        });

        Transition::effect(Effect::Fetch {
            ticket,
            query: query.to_string(),
        })
    }

    fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<WeatherReport, ProviderError>,
    ) -> Transition {
        let pending = match &self.state {
            FetchState::Loading(pending) if pending.ticket == ticket => pending.clone(),
            _ => {
                tracing::debug!("Discarding completion for stale fetch #{}", ticket.value());
                return Transition::default();
            }
        };

        match result {
            Ok(report) => {
                tracing::info!("Weather for {:?} received", pending.query);
                self.displayed = Some(report.clone());
                self.state = FetchState::Success(report);

                if pending.origin == QueryOrigin::Typed {
                    self.history = HistoryStore::record(&pending.query, &self.history);
                    Transition::effect(Effect::Persist(self.history.clone()))
                } else {
                    Transition::default()
                }
            }
            Err(e) => {
                tracing::warn!("Lookup for {:?} failed: {}", pending.query, e);
                self.state = FetchState::Failed(NOT_FOUND_MESSAGE.to_string());
                Transition::default()
            }
        }
    }
}
