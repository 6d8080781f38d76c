//! Tracing subscriber installation.
//!
//! Library crates in this workspace stay subscriber-agnostic; only
//! binaries and examples should call these.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a tracing subscriber using `RUST_LOG` (default `info`).
///
/// # Panics
/// Panics if a subscriber is already installed.
pub fn init_tracing() {
    init_tracing_with_filter_opt(None)
}

/// Install a tracing subscriber with an explicit filter, e.g.
/// `"debug,hap_transport_ip=trace"`.
///
/// # Panics
/// Panics if a subscriber is already installed or the filter is invalid.
pub fn init_tracing_with_filter(filter: &str) {
    init_tracing_with_filter_opt(Some(filter))
}

fn init_tracing_with_filter_opt(filter: Option<&str>) {
    let env_filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true).compact())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_filter_parses() {
        let _ = EnvFilter::new("debug,hap_pairing=trace");
    }
}
