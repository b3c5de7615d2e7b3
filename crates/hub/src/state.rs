use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public type alias
// ---------------------------------------------------------------------------

pub type SharedState = Arc<RwLock<HubState>>;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

pub struct HubState {
    pub started_at: Instant,
    pub events: VecDeque<HubEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Run,
    Entry,
    Recommendation,
    Error,
    System,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub recommendations_enabled: bool,
    pub systems: usize,
    pub profiles: usize,
    pub products: usize,
    /// Newest first.
    pub events: Vec<HubEvent>,
}

/// Config counts reported alongside the event log.
#[derive(Debug, Clone, Copy)]
pub struct ConfigSummary {
    pub recommendations_enabled: bool,
    pub systems: usize,
    pub profiles: usize,
    pub products: usize,
}

// ---------------------------------------------------------------------------
// Construction & mutation
// ---------------------------------------------------------------------------

impl HubState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn shared() -> SharedState {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn record_run(&mut self, run_id: i64, name: &str) {
        self.push_event(EventKind::Run, format!("run {run_id} created: {name}"));
    }

    pub fn record_entry(&mut self, run_id: i64, date: time::Date, ph: f64, ec: f64) {
        self.push_event(
            EventKind::Entry,
            format!("run {run_id} {date}: ph={ph} ec={ec}"),
        );
    }

    pub fn record_recommendation(&mut self, run_id: i64, detail: String) {
        self.push_event(EventKind::Recommendation, format!("run {run_id}: {detail}"));
    }

    /// Record an error event.
    pub fn record_error(&mut self, detail: String) {
        self.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub fn record_system(&mut self, detail: String) {
        self.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub fn to_status(&self, config: ConfigSummary) -> StatusResponse {
        StatusResponse {
            uptime_secs: self.started_at.elapsed().as_secs(),
            recommendations_enabled: config.recommendations_enabled,
            systems: config.systems,
            profiles: config.profiles,
            products: config.products,
            events: self.events.iter().rev().cloned().collect(),
        }
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(HubEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

impl Default for HubState {
    fn default() -> Self {
        Self::new()
    }
}
