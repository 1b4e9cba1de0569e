use thiserror::Error;

/// Failures reported by the ledger itself for a state-changing call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Transaction rejected by wallet: {0}")]
    Rejected(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// Central error type for the certificate anchoring client
#[derive(Error, Debug)]
pub enum AnchorError {
    // ============================================================================
    // Caller Errors
    // ============================================================================
    #[error("Invalid certificate input: {0}")]
    Validation(String),

    // ============================================================================
    // Connectivity Errors
    // ============================================================================
    #[error("A wallet authorization request is already pending")]
    RequestAlreadyPending,

    #[error("All {attempted} ledger endpoints are unavailable")]
    AllEndpointsUnavailable { attempted: usize },

    #[error("No ledger connection could be established")]
    NoConnection,

    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("Wallet is on chain {actual}, expected chain {expected}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("Provider error: {0}")]
    Provider(String),

    // ============================================================================
    // Write Path Errors
    // ============================================================================
    #[error("Read-only connection cannot issue certificates, connect a wallet")]
    ReadOnlyCannotWrite,

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Transaction {tx_hash} was not confirmed in time")]
    ConfirmationTimeout { tx_hash: String },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // ============================================================================
    // Configuration / Generic Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    /// Builder pattern validation error
    #[error("Builder error: {0}")]
    Builder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mutex lock error")]
    LockError,

    #[error("{0}")]
    GenericError(String),
}

impl AnchorError {
    /// Whether the caller may try the same operation again later.
    ///
    /// Chain errors are never retryable: blindly resubmitting a
    /// state-changing call can issue the same certificate twice.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnchorError::RequestAlreadyPending
                | AnchorError::AllEndpointsUnavailable { .. }
                | AnchorError::NoConnection
        )
    }
}

// Implement conversion from PoisonError for Mutex locks
impl<T> From<std::sync::PoisonError<T>> for AnchorError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        AnchorError::LockError
    }
}

impl From<AnchorError> for String {
    fn from(error: AnchorError) -> Self {
        error.to_string()
    }
}

impl From<String> for AnchorError {
    fn from(err: String) -> Self {
        AnchorError::GenericError(err)
    }
}

impl From<&str> for AnchorError {
    fn from(err: &str) -> Self {
        AnchorError::GenericError(err.to_string())
    }
}

// Helper type alias for Results
pub type AnchorResult<T> = Result<T, AnchorError>;
