pub mod config;
pub mod error;

pub use config::{Config, HistoryConfig, ProviderConfig, ValidationResult};
pub use error::{
    AppError, ConfigError, NetworkError, ReqwestErrorExt, StorageError, WeatherError,
};

use anyhow::Result;

/// Initialize logging.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used. Output goes to
/// stderr so it stays out of the weather display on stdout.
pub fn init(default_filter: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::debug!("Weatherly core initialized");
    Ok(())
}
