use thiserror::Error;

/// Errors raised by the market environment.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Invalid construction parameters or an unsupported option value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An action mapping that cannot be applied to the market.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
