//! Log output for hosts embedding the crate.
//!
//! Everything in the crate logs through `tracing`; nothing is printed until
//! the host installs a subscriber. [`init`] installs the usual one: an
//! `EnvFilter` read from `RUST_LOG` with a fmt layer on stderr.

use crate::error::{CoreError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,monitor_core=debug";

/// Install the global subscriber with [`DEFAULT_FILTER`]
pub fn init() -> Result<()> {
    init_with_filter(DEFAULT_FILTER)
}

/// Install the global subscriber, falling back to `default_filter` when
/// `RUST_LOG` is unset or invalid. Fails if a subscriber is already set.
pub fn init_with_filter(default_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter_or(default_filter))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| CoreError::Config(format!("Failed to install log subscriber: {}", e)))
}

fn filter_or(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Either this test or another installed the subscriber first
        let _ = init();
        assert!(init_with_filter("warn").is_err());
    }
}
