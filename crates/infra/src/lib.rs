//! Infrastructure layer: stores, dispatch, recall, queries, mirrors, config.
//!
//! `ProvenanceLedger` is the facade callers use; the other modules are public
//! so deployments can swap backends or drive the pieces directly.

pub mod command_dispatcher;
pub mod config;
pub mod error;
pub mod event_store;
pub mod ledger;
pub mod mirror;
pub mod query;
pub mod read_model;
pub mod recall;
pub mod sensor_store;
pub mod telemetry;
pub mod workers;


pub use command_dispatcher::{CommandDispatcher, CommandOutcome};
pub use config::{ConfigError, LedgerConfig};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{Deadline, InMemoryLedger, ProvenanceLedger};
pub use query::{BatchFilter, ComplianceReport, DateRange, Page, PublicBatchView, RecallStatistics, TraceTimeline};
pub use recall::{RecallFailure, RecallRequest, RecallResult};
