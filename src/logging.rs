// SPDX-License-Identifier: GPL-3.0-only

//! Tracing subscriber setup for hosts without their own

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `warn`)
///
/// Returns false if a global subscriber was already set.
pub fn init() -> bool {
    init_with_default(DEFAULT_DIRECTIVE)
}

/// Install a fmt subscriber, falling back to `directive` when `RUST_LOG` is unset
pub fn init_with_default(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
