//! `foodtrust-events`: event mechanics shared by the provenance ledger.
//!
//! Pure abstractions only: no storage, no IO beyond in-process channels.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::{Event, EventKind};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
