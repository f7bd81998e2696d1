pub mod config;
pub mod logger;
pub mod provider;
pub mod proxy;

pub use config::ConfigError;
pub use logger::LoggerError;
pub use provider::ProviderError;
pub use proxy::ProxyError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Proxy(#[from] proxy::ProxyError),

    #[error(transparent)]
    Provider(#[from] provider::ProviderError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Logger(#[from] logger::LoggerError),
}
