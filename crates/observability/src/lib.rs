//! Process-wide logging setup for ledger binaries.

/// Install the JSON subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Same as [`init`], but with an explicit filter directive instead of `RUST_LOG`.
pub fn init_with_filter(directives: &str) {
    tracing::init_with_filter(directives);
}

/// Subscriber construction (filters, JSON formatting).
pub mod tracing;
