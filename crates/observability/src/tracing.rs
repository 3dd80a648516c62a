//! JSON log output with an env-driven filter.
//!
//! Ledger operations log structured fields (`batch_id`, `sequence_number`,
//! `kind`, `actor`); the JSON formatter keeps them as separate keys.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Filter from `RUST_LOG`, falling back to `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init() {
    install(env_filter());
}

/// Invalid directives fall back to `info`.
pub fn init_with_filter(directives: &str) {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter);
}

fn install(filter: EnvFilter) {
    // A subscriber may already be installed (tests, embedding hosts).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_with_filter("debug");
        init_with_filter("not a [valid filter");
        init();
        ::tracing::info!(batch_id = "B1", "still logging");
    }
}
