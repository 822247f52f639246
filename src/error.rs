use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed numeric or address string.
    #[error("parse error: {0}")]
    Parse(String),

    /// Transport or JSON-RPC level failure talking to the chain.
    #[error("chain rpc error: {0}")]
    ChainRpc(String),

    /// Repository read/write failure, including missing rows.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid invoice: {0}")]
    Validation(String),

    #[error("payment watcher is already running")]
    AlreadyStarted,
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::ChainRpc(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ChainRpc(format!("malformed rpc payload: {}", e))
    }
}

impl From<bigdecimal::ParseBigDecimalError> for Error {
    fn from(e: bigdecimal::ParseBigDecimalError) -> Self {
        Error::Parse(e.to_string())
    }
}
