use bracken::config::ConfigError;
use thiserror::Error;

pub(crate) type BrackenResult<T> = Result<T, BrackenError>;

#[derive(Debug, Error)]
pub(crate) enum BrackenError {
    #[error("IO error, more details: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read the configuration, more details: {0}")]
    Config(#[from] ConfigError),
    #[error("a configuration file is required unless --list-keys is given")]
    MissingConfig,
}
