use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foodtrust_core::ActorId;

/// Kind of a history entry, as shown in audit trails.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Create,
    Update,
    Transfer,
    Process,
    Package,
    Ship,
    Receive,
    Recall,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::Create,
        EventKind::Update,
        EventKind::Transfer,
        EventKind::Process,
        EventKind::Package,
        EventKind::Ship,
        EventKind::Receive,
        EventKind::Recall,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Create => "CREATE",
            EventKind::Update => "UPDATE",
            EventKind::Transfer => "TRANSFER",
            EventKind::Process => "PROCESS",
            EventKind::Package => "PACKAGE",
            EventKind::Ship => "SHIP",
            EventKind::Receive => "RECEIVE",
            EventKind::Recall => "RECALL",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown event kind '{s}'"))
    }
}

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts; corrections are new events)
/// - **versioned** (schema evolution)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "batch.transferred").
    fn event_type(&self) -> &'static str;

    /// Audit-trail kind of this event.
    fn kind(&self) -> EventKind;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Principal that caused the event.
    fn actor(&self) -> &ActorId;

    /// Wall-clock time the event occurred. Advisory only; never an order key.
    fn occurred_at(&self) -> DateTime<Utc>;
}
