use super::{
    ConnectionManager, EndpointConnector, HttpConnector, HttpTransport, LedgerClient,
    LedgerConfig, RpcTransport,
};
use crate::error::AnchorResult;
use crate::repository::ConfigRepository;
use std::sync::Arc;

/// Factory for creating ledger clients
///
/// Wires the HTTP transports from a `LedgerConfig`: the configured wallet
/// (if any) becomes the interactive provider and every chain endpoint is
/// opened on demand by the endpoint pool. The `_with` variants accept
/// custom transports so callers and tests can substitute their own.
pub struct LedgerClientFactory;

impl LedgerClientFactory {
    /// Create a connection manager backed by HTTP transports
    ///
    /// # Errors
    /// Returns an error if the wallet URL or contract address is invalid.
    pub fn create_manager(config: &LedgerConfig) -> AnchorResult<ConnectionManager> {
        let wallet = match &config.wallet {
            Some(wallet) => {
                Some(Arc::new(HttpTransport::new(&wallet.provider_url)?) as Arc<dyn RpcTransport>)
            }
            None => None,
        };

        Self::create_manager_with(config, wallet, Arc::new(HttpConnector))
    }

    /// Create a connection manager from explicit transports
    pub fn create_manager_with(
        config: &LedgerConfig,
        wallet: Option<Arc<dyn RpcTransport>>,
        connector: Arc<dyn EndpointConnector>,
    ) -> AnchorResult<ConnectionManager> {
        ConnectionManager::new(config, wallet, connector)
    }

    /// Create a ledger client backed by HTTP transports
    pub fn create_client(config: &LedgerConfig) -> AnchorResult<LedgerClient> {
        let manager = Self::create_manager(config)?;
        Ok(LedgerClient::new(Arc::new(manager), config))
    }

    /// Create a ledger client from the persisted configuration
    ///
    /// Falls back to the default configuration when nothing has been saved.
    pub fn create_client_from_repository(
        repository: &dyn ConfigRepository,
    ) -> AnchorResult<LedgerClient> {
        let config = match repository.load_config()? {
            Some(config) => config,
            None => {
                tracing::debug!("no saved ledger configuration, using defaults");
                LedgerConfig::default()
            }
        };

        Self::create_client(&config)
    }

    /// Create a ledger client from explicit transports
    pub fn create_client_with(
        config: &LedgerConfig,
        wallet: Option<Arc<dyn RpcTransport>>,
        connector: Arc<dyn EndpointConnector>,
    ) -> AnchorResult<LedgerClient> {
        let manager = Self::create_manager_with(config, wallet, connector)?;
        Ok(LedgerClient::new(Arc::new(manager), config))
    }
}
