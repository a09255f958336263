//! Tracing subscriber setup for the binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::LogFormat;

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber and bridges `log` records into it.
///
/// Returns false when a subscriber was already installed; the existing one
/// stays in place.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = match format {
        LogFormat::Json => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber).is_ok()
        }
        LogFormat::Pretty => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr));
            tracing::subscriber::set_global_default(subscriber).is_ok()
        }
    };

    if installed {
        // Repositories log through the `log` facade.
        let _ = tracing_log::LogTracer::init();
    }

    installed
}
