use super::{EndpointConnector, RpcTransport};
use crate::error::{AnchorError, AnchorResult};
use async_trait::async_trait;
use ethers::providers::{Http, Provider, ProviderError, RpcError as _};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// User rejected the request (EIP-1193)
pub const USER_REJECTED: i64 = 4001;

/// Wallet does not know the requested chain (EIP-3326)
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

/// Wallet already has a request of this kind open
pub const REQUEST_PENDING: i64 = -32002;

/// The request never produced a JSON-RPC response
pub const NETWORK_FAILURE: i64 = -32099;

/// Error returned by a JSON-RPC / EIP-1193 request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Failure below the JSON-RPC layer (DNS, TLS, refused connection, ...)
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(NETWORK_FAILURE, message)
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == UNRECOGNIZED_CHAIN
    }

    fn from_provider(err: ProviderError) -> Self {
        match err.as_error_response() {
            Some(response) => Self::new(response.code, response.message.clone()),
            None => Self::network(err.to_string()),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// JSON-RPC over HTTP, backed by an ethers provider
pub struct HttpTransport {
    provider: Provider<Http>,
    url: String,
}

impl HttpTransport {
    pub fn new(url: &str) -> AnchorResult<Self> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| AnchorError::Provider(format!("Invalid RPC URL {}: {}", url, e)))?;

        Ok(Self {
            provider,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.provider
            .request::<Value, Value>(method, params)
            .await
            .map_err(RpcError::from_provider)
    }

    fn label(&self) -> String {
        self.url.clone()
    }
}

/// Opens an `HttpTransport` per endpoint URL
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl EndpointConnector for HttpConnector {
    fn open(&self, url: &str) -> AnchorResult<Arc<dyn RpcTransport>> {
        Ok(Arc::new(HttpTransport::new(url)?))
    }
}
