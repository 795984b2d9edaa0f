//! Weather lookup for Weatherly
//!
//! Current conditions by place name via WeatherAPI.com, a bounded list of
//! recent searches that survives restarts, and the state machine that ties
//! the two together.

mod error_mapping;
pub mod history;
pub mod orchestrator;
pub mod provider;
pub mod session;
pub mod types;

pub use history::{FileSlot, HistoryStore, MemorySlot, PersistenceSlot, SearchHistory, MAX_HISTORY};
pub use orchestrator::{
    Effect, Event, FetchState, FetchTicket, Orchestrator, QueryOrigin, Rejection, Snapshot,
    Transition, NOT_FOUND_MESSAGE,
};
pub use provider::{WeatherApiProvider, WeatherSource};
pub use session::{SessionHandle, SessionUpdate, WeatherSession};
pub use types::*;
