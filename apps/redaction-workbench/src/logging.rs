//! Tracing setup for the workbench binary

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` still applies; `verbose`
/// raises the default level to DEBUG.
///
/// Output goes to stderr so stdout stays machine-readable.
pub fn init(verbose: bool) {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
