//! Miscellaneous test code for Finch.

use std::sync::Once;

use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod prelude;

static INIT: Once = Once::new();

/// Initialize global settings for a test.
///
/// Every test should call this at the top. It is idempotent, so calling it in
/// every test of a process is fine; only the first call does any work.
///
/// Installs a `tracing` subscriber that respects `RUST_LOG` and writes through
/// the test capture buffer, plus `color-eyre` panic and error report hooks.
pub fn init() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer().with_target(false).with_test_writer();
        // Use the RUST_LOG env var, or by default:
        //  - warn for most tests, and
        //  - for some modules, hide expected warn logs
        let filter_layer = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,sled=error"));

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(ErrorLayer::default())
            .init();

        color_eyre::install().expect("color-eyre install is only called once");
    })
}
