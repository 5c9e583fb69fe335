use thiserror::Error;

/// Node error code for an unknown block, transaction or key.
pub const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
/// Node error code for malformed parameters and out-of-range heights.
pub const RPC_INVALID_PARAMETER: i64 = -8;
/// Node error code returned while the node is still loading its chain.
pub const RPC_IN_WARMUP: i64 = -28;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Unauthorized: check rpc user and password")]
    Unauthorized,

    #[error("Node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl RpcError {
    /// Classify an error object returned inside a JSON-RPC envelope.
    pub fn from_node(code: i64, message: String) -> Self {
        match code {
            RPC_INVALID_ADDRESS_OR_KEY | RPC_INVALID_PARAMETER => RpcError::NotFound(message),
            RPC_IN_WARMUP => RpcError::Transient(message),
            _ => RpcError::Node { code, message },
        }
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RpcError::NotFound(_))
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        // Every failure at the transport layer (connect, timeout, reset,
        // truncated body) leaves the node in an unknown state.
        RpcError::Transient(e.to_string())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
