use foodtrust_core::BatchId;

/// A command targets a specific batch stream.
///
/// Commands represent **intent** (e.g. "transfer batch B1 to FreshFoods"); they are
/// transient and either rejected or turned into events, which are persisted.
///
/// The target id is what the infrastructure serializes on: two commands for the
/// same batch never run concurrently, commands for different batches never block
/// each other.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_batch_id(&self) -> &BatchId;
}
