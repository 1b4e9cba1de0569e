pub mod client;
pub mod config;
pub mod config_builder;
pub mod connection;
pub mod contract;
pub mod endpoint_pool;
pub mod factory;
pub mod mock;
pub mod network_guard;
pub mod state;
pub mod transport;


pub use client::{IssuanceReceipt, LedgerClient, Lookup};
pub use config::{ChainConfig, LedgerConfig, NativeCurrency, WalletConfig};
pub use config_builder::LedgerConfigBuilder;
pub use connection::{
    Capability, Connection, ConnectionManager, ReadOnlyConnection, WalletConnection,
};
pub use endpoint_pool::{EndpointCandidate, EndpointPool, ProbeFailure, ProbeStage};
pub use factory::LedgerClientFactory;
pub use mock::{MockConnector, MockTransport};
pub use network_guard::{NetworkGuard, NetworkStatus};
pub use state::{IssuanceAttempt, IssuanceState};
pub use transport::{HttpConnector, HttpTransport, RpcError};

use crate::error::AnchorResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Request/response channel to a ledger node or an injected wallet
///
/// Mirrors the EIP-1193 `request({ method, params })` shape so the same
/// seam serves public endpoints and interactive wallets.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Issue a single JSON-RPC request
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// Human-readable name for logs (usually the URL)
    fn label(&self) -> String;
}

/// Opens a transport for an endpoint URL
pub trait EndpointConnector: Send + Sync {
    fn open(&self, url: &str) -> AnchorResult<Arc<dyn RpcTransport>>;
}
