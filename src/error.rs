//! Error types shared across the chain access layer

use thiserror::Error;

/// Failure talking to a remote HTTP service (block explorer, block height API)
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network failure, timeout, or non-success status
    #[error("{service} request failed: {message}")]
    Request { service: String, message: String },

    /// The service answered but reported an error (rate limit, bad argument...)
    #[error("{service} returned an error: {message}")]
    Api { service: String, message: String },

    /// The response body could not be interpreted
    #[error("{service} returned an unexpected response: {message}")]
    InvalidResponse { service: String, message: String },
}

impl RemoteError {
    pub fn request(service: &str, message: impl Into<String>) -> Self {
        Self::Request {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn api(service: &str, message: impl Into<String>) -> Self {
        Self::Api {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_response(service: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

/// ABI encoding, decoding, and lookup failures
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("invalid ABI: {0}")]
    InvalidAbi(String),

    #[error("no function '{name}' taking {arity} argument(s) in ABI")]
    FunctionNotFound { name: String, arity: usize },

    #[error("no event '{0}' in ABI")]
    EventNotFound(String),

    #[error("event '{event}' has no indexed argument named '{argument}'")]
    UnknownArgument { event: String, argument: String },

    #[error("failed to encode {0}")]
    Encode(String),

    #[error("failed to decode {0}")]
    Decode(String),

    #[error("call to '{0}' returned no output values")]
    EmptyOutput(String),
}

/// Failure converting a raw integer amount into a decimal amount
#[derive(Debug, Error)]
#[error("amount {raw} with {decimals} decimals does not fit a decimal: {reason}")]
pub struct AmountError {
    pub raw: String,
    pub decimals: u8,
    pub reason: String,
}

/// Errors returned by [`crate::chain::ChainAccessor`] operations
#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("node request failed: {0}")]
    Node(String),

    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("unexpected output from '{method}': {message}")]
    UnexpectedOutput { method: String, message: String },
}

impl ChainError {
    /// Wrap a node transport failure, keeping the whole context chain
    pub fn node(err: anyhow::Error) -> Self {
        Self::Node(format!("{:#}", err))
    }
}
