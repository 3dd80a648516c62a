//! Batch provenance domain module (event-sourced).
//!
//! This crate contains the batch state machine, implemented purely as
//! deterministic domain logic (no IO, no storage). The current view of a batch
//! is always a fold over its ordered events.

pub mod batch;
pub mod fields;
pub mod status;

pub use batch::{
    Batch, BatchCommand, BatchCreated, BatchEvent, BatchRecalled, BatchUpdated, CreateBatch,
    LifecycleStepRecorded, OwnershipTransferred, RecallBatch, RecallInfo, RecordLifecycleStep,
    TransferOwnership, UpdateBatch, fold,
};
pub use fields::{
    BatchChanges, FarmLocation, Logistics, NewBatch, Packaging, Processing, Quality, Quantity,
    QuantityUnit, Retail, StepDetails,
};
pub use status::{BatchStatus, LifecycleStep};
