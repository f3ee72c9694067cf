//! Logging setup for provider binaries embedding the reference layer.
//!
//! All logs are written to **stderr**; stdout belongs to the plugin
//! protocol. Resolution, cache, and suppression decisions are emitted as
//! `tracing` events under the `netbox_provider_refs` target.
//!
//! # Environment Variables
//!
//! - `NETBOX_PROVIDER_LOG`: filter for this provider (takes precedence)
//! - `RUST_LOG`: fallback filter
//!
//! # Examples
//!
//! ```bash
//! # Show every lookup and cache decision
//! NETBOX_PROVIDER_LOG=netbox_provider_refs=debug terraform plan
//!
//! # Include cache hits and in-flight waits
//! NETBOX_PROVIDER_LOG=netbox_provider_refs::cache=trace terraform apply
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ResolverConfig;

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "NETBOX_PROVIDER_LOG";

/// Filter used when no environment variable is set.
pub const DEFAULT_FILTER: &str = "warn,netbox_provider_refs=info";

/// Initialize the default logging subscriber.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_FILTER);
}

/// Initialize logging with a custom default filter, used when neither
/// environment variable is set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_filter: &str) {
    subscriber(default_filter).init();
}

/// Initialize logging from provider settings.
///
/// `log_level` from the configuration is the default; the environment
/// still wins. Returns false if a subscriber was already set.
pub fn init_logging_from_config(config: &ResolverConfig) -> bool {
    let default_filter = config.log_level.as_deref().unwrap_or(DEFAULT_FILTER);
    subscriber(default_filter).try_init().is_ok()
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this does not panic, so it is safe to call from
/// tests and from code paths that may run more than once.
pub fn try_init_logging() -> bool {
    subscriber(DEFAULT_FILTER).try_init().is_ok()
}

fn subscriber(default_filter: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}
