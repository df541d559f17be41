//! Logger initialization for the gateway binary.

use std::str::FromStr;

use logforth::{append::Stderr, filter::EnvFilter};

/// Initialize the stderr logger.
///
/// The filter is a string like "info" or "llm=debug,gateway=debug".
pub fn init(log_filter: &str) {
    let filter = EnvFilter::from_str(log_filter)
        .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter should be valid"));

    logforth::builder()
        .dispatch(move |dispatch| dispatch.filter(filter).append(Stderr::default()))
        .apply();
}
