use serde::{Deserialize, Serialize};

use foodtrust_core::DomainError;
use foodtrust_events::EventKind;

/// Batch lifecycle status.
///
/// ```text
/// CREATED -> PROCESSING -> PACKAGED -> IN_TRANSIT -> IN_STORE -> SOLD
///    \-> RECALLED (from any state, any time)
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Created,
    Processing,
    Packaged,
    InTransit,
    InStore,
    Sold,
    Recalled,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 7] = [
        BatchStatus::Created,
        BatchStatus::Processing,
        BatchStatus::Packaged,
        BatchStatus::InTransit,
        BatchStatus::InStore,
        BatchStatus::Sold,
        BatchStatus::Recalled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Created => "CREATED",
            BatchStatus::Processing => "PROCESSING",
            BatchStatus::Packaged => "PACKAGED",
            BatchStatus::InTransit => "IN_TRANSIT",
            BatchStatus::InStore => "IN_STORE",
            BatchStatus::Sold => "SOLD",
            BatchStatus::Recalled => "RECALLED",
        }
    }

    /// `SOLD` and `RECALLED` end the forward progression.
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Sold | BatchStatus::Recalled)
    }

    /// Next status along the forward progression, if any.
    pub fn successor(self) -> Option<BatchStatus> {
        match self {
            BatchStatus::Created => Some(BatchStatus::Processing),
            BatchStatus::Processing => Some(BatchStatus::Packaged),
            BatchStatus::Packaged => Some(BatchStatus::InTransit),
            BatchStatus::InTransit => Some(BatchStatus::InStore),
            BatchStatus::InStore => Some(BatchStatus::Sold),
            BatchStatus::Sold | BatchStatus::Recalled => None,
        }
    }

    /// Whether moving from `self` to `to` is a legal transition.
    ///
    /// Staying in the same status is not a transition and is always accepted.
    pub fn can_transition_to(self, to: BatchStatus) -> bool {
        to == self || to == BatchStatus::Recalled || self.successor() == Some(to)
    }

    /// Check a requested status change, distinguishing terminal-state rejections
    /// from skipped or backwards steps.
    pub fn check_transition(self, to: BatchStatus, operation: &str) -> Result<(), DomainError> {
        if self.can_transition_to(to) {
            return Ok(());
        }
        if self.is_terminal() {
            return Err(DomainError::terminal_state(self, operation));
        }
        Err(DomainError::invalid_transition(self, to))
    }
}

impl core::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for BatchStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BatchStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation("status", format!("unknown status '{s}'")))
    }
}

/// Supply-chain step recorded by a handler of the batch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStep {
    Process,
    Package,
    Ship,
    Receive,
}

impl LifecycleStep {
    pub const ALL: [LifecycleStep; 4] = [
        LifecycleStep::Process,
        LifecycleStep::Package,
        LifecycleStep::Ship,
        LifecycleStep::Receive,
    ];

    /// Status the batch moves to once the step is recorded.
    pub fn target_status(self) -> BatchStatus {
        match self {
            LifecycleStep::Process => BatchStatus::Processing,
            LifecycleStep::Package => BatchStatus::Packaged,
            LifecycleStep::Ship => BatchStatus::InTransit,
            LifecycleStep::Receive => BatchStatus::InStore,
        }
    }

    pub fn kind(self) -> EventKind {
        match self {
            LifecycleStep::Process => EventKind::Process,
            LifecycleStep::Package => EventKind::Package,
            LifecycleStep::Ship => EventKind::Ship,
            LifecycleStep::Receive => EventKind::Receive,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.kind().as_str()
    }
}

impl core::fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for LifecycleStep {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleStep::ALL
            .into_iter()
            .find(|step| step.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation("step", format!("unknown lifecycle step '{s}'")))
    }
}
