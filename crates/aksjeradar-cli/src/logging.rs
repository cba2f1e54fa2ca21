//! Structured logging setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CliError;

/// Initializes stderr logging. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|error| CliError::Logging(format!("invalid log filter '{level}': {error}")))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|error| CliError::Logging(error.to_string()))
}
