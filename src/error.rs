use thiserror::Error;

/// Why a raw trade record could not be turned into a [`crate::models::Trade`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid number in field {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("negative amount: {0}")]
    NegativeAmount(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Failures reported by an [`crate::gateway::OrderGateway`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("insufficient {currency} balance")]
    InsufficientBalance { currency: String },

    #[error("unknown order: {0}")]
    UnknownOrder(String),
}

#[derive(Error, Debug)]
pub enum TraderError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl From<config::ConfigError> for TraderError {
    fn from(e: config::ConfigError) -> Self {
        TraderError::Config(e.to_string())
    }
}
