use super::config::{ChainConfig, LedgerConfig};
use super::endpoint_pool::EndpointPool;
use super::network_guard::{NetworkGuard, NetworkStatus};
use super::transport::REQUEST_PENDING;
use super::{EndpointConnector, RpcTransport};
use crate::error::{AnchorError, AnchorResult};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::time::timeout;

/// Interactive connection that can sign and submit transactions
#[derive(Clone)]
pub struct WalletConnection {
    transport: Arc<dyn RpcTransport>,
    account: Address,
    chain_id: u64,
}

impl WalletConnection {
    pub fn new(transport: Arc<dyn RpcTransport>, account: Address, chain_id: u64) -> Self {
        Self {
            transport,
            account,
            chain_id,
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn transport(&self) -> Arc<dyn RpcTransport> {
        self.transport.clone()
    }
}

impl fmt::Debug for WalletConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConnection")
            .field("transport", &self.transport.label())
            .field("account", &self.account)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Query-only connection bound to one pool endpoint
#[derive(Clone)]
pub struct ReadOnlyConnection {
    transport: Arc<dyn RpcTransport>,
    endpoint: String,
}

impl ReadOnlyConnection {
    pub fn new(transport: Arc<dyn RpcTransport>, endpoint: String) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn transport(&self) -> Arc<dyn RpcTransport> {
        self.transport.clone()
    }
}

impl fmt::Debug for ReadOnlyConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyConnection")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// The active ledger connection
///
/// Connections are thin handles: they are replaced when the wallet's
/// account or chain changes, never mutated in place.
#[derive(Debug, Clone)]
pub enum Connection {
    Wallet(WalletConnection),
    ReadOnly(ReadOnlyConnection),
}

impl Connection {
    pub fn transport(&self) -> Arc<dyn RpcTransport> {
        match self {
            Connection::Wallet(wallet) => wallet.transport(),
            Connection::ReadOnly(read_only) => read_only.transport(),
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Connection::Wallet(_) => Capability::Wallet,
            Connection::ReadOnly(_) => Capability::ReadOnly,
        }
    }

    pub fn is_wallet(&self) -> bool {
        matches!(self, Connection::Wallet(_))
    }
}

/// What the client can currently do, for status display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Queries and issuance
    Wallet,
    /// Queries only
    ReadOnly,
    /// No connection established yet
    None,
}

/// Marks a wallet authorization as outstanding until dropped
struct AuthorizationClaim<'a> {
    flag: &'a AtomicBool,
}

impl<'a> AuthorizationClaim<'a> {
    fn try_claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for AuthorizationClaim<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owns the single active connection and decides how it is obtained
///
/// A configured wallet is tried first; if it times out, is denied or stays
/// on the wrong chain, the manager degrades to the read-only endpoint pool.
/// Only one connection is ever under construction. With a wallet configured
/// the setup holds the authorization claim from the prompt through any pool
/// fallback, and a concurrent `acquire` fails with `RequestAlreadyPending`
/// instead of prompting again. Without one, concurrent callers queue on the
/// init lock and share the connection the first one built.
pub struct ConnectionManager {
    chain: ChainConfig,
    contract_address: Address,
    wallet: Option<Arc<dyn RpcTransport>>,
    pool: EndpointPool,
    guard: NetworkGuard,
    authorization_timeout: Duration,
    active: RwLock<Option<Connection>>,
    init: AsyncMutex<()>,
    authorizing: AtomicBool,
    last_network: Mutex<Option<NetworkStatus>>,
}

impl ConnectionManager {
    pub fn new(
        config: &LedgerConfig,
        wallet: Option<Arc<dyn RpcTransport>>,
        connector: Arc<dyn EndpointConnector>,
    ) -> AnchorResult<Self> {
        let contract_address: Address = config.chain.contract_address.parse().map_err(|e| {
            AnchorError::Config(format!(
                "Invalid contract address {}: {}",
                config.chain.contract_address, e
            ))
        })?;

        let pool = EndpointPool::new(
            config.chain.rpc_endpoints.clone(),
            contract_address,
            connector,
            config.probe_timeout(),
        );

        Ok(Self {
            chain: config.chain.clone(),
            contract_address,
            wallet,
            pool,
            guard: NetworkGuard::new(config.chain.clone()),
            authorization_timeout: config.authorization_timeout(),
            active: RwLock::new(None),
            init: AsyncMutex::new(()),
            authorizing: AtomicBool::new(false),
            last_network: Mutex::new(None),
        })
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet.is_some()
    }

    /// Return the active connection, establishing one if needed
    pub async fn acquire(&self) -> AnchorResult<Connection> {
        if let Some(connection) = self.active.read().await.clone() {
            return Ok(connection);
        }

        let _claim = if self.has_wallet() {
            Some(
                AuthorizationClaim::try_claim(&self.authorizing)
                    .ok_or(AnchorError::RequestAlreadyPending)?,
            )
        } else {
            None
        };
        let _init = self.init.lock().await;

        // another caller may have finished while we queued
        if let Some(connection) = self.active.read().await.clone() {
            return Ok(connection);
        }

        let connection = self.establish().await?;
        *self.active.write().await = Some(connection.clone());
        Ok(connection)
    }

    /// The active connection, without trying to establish one
    pub async fn active(&self) -> Option<Connection> {
        self.active.read().await.clone()
    }

    /// Drop the active connection so the next `acquire` builds a new one
    pub async fn invalidate(&self) {
        *self.active.write().await = None;
        if let Ok(mut status) = self.last_network.lock() {
            *status = None;
        }
        tracing::debug!("ledger connection invalidated");
    }

    /// Wallet reported a new account list. Returns whether the active
    /// connection was replaced.
    pub async fn on_accounts_changed(&self, accounts: &[Address]) -> bool {
        let unchanged = match self.active().await {
            Some(Connection::Wallet(wallet)) => accounts.first() == Some(&wallet.account()),
            Some(Connection::ReadOnly(_)) => !self.has_wallet(),
            None => true,
        };

        if !unchanged {
            tracing::info!(accounts = accounts.len(), "wallet accounts changed");
            self.invalidate().await;
        }
        !unchanged
    }

    /// Wallet reported a chain switch. Returns whether the active
    /// connection was replaced.
    pub async fn on_chain_changed(&self, chain_id: u64) -> bool {
        let unchanged = match self.active().await {
            Some(Connection::Wallet(wallet)) => wallet.chain_id() == chain_id,
            Some(Connection::ReadOnly(_)) => !self.has_wallet(),
            None => true,
        };

        if !unchanged {
            tracing::info!(chain_id, "wallet chain changed");
            self.invalidate().await;
        }
        !unchanged
    }

    /// Account of the active wallet connection
    pub async fn current_account(&self) -> Option<Address> {
        match self.active().await {
            Some(Connection::Wallet(wallet)) => Some(wallet.account()),
            _ => None,
        }
    }

    pub async fn capability(&self) -> Capability {
        self.active()
            .await
            .map(|c| c.capability())
            .unwrap_or(Capability::None)
    }

    pub async fn is_initialized(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Whether a wallet-backed connection setup is currently outstanding
    pub fn is_authorizing(&self) -> bool {
        self.authorizing.load(Ordering::Acquire)
    }

    /// Result of the last network check on the wallet, if any
    pub fn network_status(&self) -> Option<NetworkStatus> {
        self.last_network.lock().ok().and_then(|s| s.clone())
    }

    /// Build a new connection. Callers hold the init lock.
    async fn establish(&self) -> AnchorResult<Connection> {
        let connection = match &self.wallet {
            Some(wallet) => match self.connect_wallet(wallet).await {
                Ok(wallet_connection) => {
                    tracing::info!(
                        account = ?wallet_connection.account(),
                        chain_id = wallet_connection.chain_id(),
                        "connected to wallet"
                    );
                    Connection::Wallet(wallet_connection)
                }
                Err(AnchorError::RequestAlreadyPending) => {
                    return Err(AnchorError::RequestAlreadyPending)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "wallet not usable, falling back to read-only endpoints");
                    Connection::ReadOnly(self.pool.try_connect().await?)
                }
            },
            None => {
                tracing::debug!("no wallet configured, using read-only endpoints");
                Connection::ReadOnly(self.pool.try_connect().await?)
            }
        };

        Ok(connection)
    }

    async fn connect_wallet(&self, wallet: &Arc<dyn RpcTransport>) -> AnchorResult<WalletConnection> {
        let accounts = match timeout(
            self.authorization_timeout,
            wallet.request("eth_requestAccounts", json!([])),
        )
        .await
        {
            Ok(Ok(accounts)) => accounts,
            Ok(Err(e)) if e.code == REQUEST_PENDING => {
                return Err(AnchorError::RequestAlreadyPending)
            }
            Ok(Err(e)) => {
                return Err(AnchorError::WalletUnavailable(format!(
                    "authorization failed: {}",
                    e
                )))
            }
            Err(_) => {
                return Err(AnchorError::WalletUnavailable(format!(
                    "authorization timed out after {:?}",
                    self.authorization_timeout
                )))
            }
        };

        let account = first_account(accounts)?;
        let chain_id = read_chain_id(wallet.as_ref()).await?;
        let connection = WalletConnection::new(wallet.clone(), account, chain_id);

        let status = self.guard.ensure(&connection).await;
        *self.last_network.lock()? = Some(status.clone());

        match status {
            NetworkStatus::Matched => Ok(connection),
            NetworkStatus::Switched => {
                // the old handle is stale after a switch
                let chain_id = read_chain_id(wallet.as_ref()).await?;
                if chain_id != self.chain.chain_id {
                    return Err(AnchorError::NetworkMismatch {
                        expected: self.chain.chain_id,
                        actual: chain_id,
                    });
                }
                Ok(WalletConnection::new(wallet.clone(), account, chain_id))
            }
            NetworkStatus::Mismatch {
                expected, actual, ..
            } => Err(AnchorError::NetworkMismatch { expected, actual }),
        }
    }
}

fn first_account(accounts: Value) -> AnchorResult<Address> {
    let accounts: Vec<Address> = serde_json::from_value(accounts)
        .map_err(|e| AnchorError::WalletUnavailable(format!("malformed account list: {}", e)))?;

    accounts
        .first()
        .copied()
        .ok_or_else(|| AnchorError::WalletUnavailable("wallet returned no accounts".to_string()))
}

async fn read_chain_id(wallet: &dyn RpcTransport) -> AnchorResult<u64> {
    let value = wallet
        .request("eth_chainId", json!([]))
        .await
        .map_err(|e| AnchorError::WalletUnavailable(format!("could not read chain id: {}", e)))?;

    parse_chain_id(&value)
}

fn parse_chain_id(value: &Value) -> AnchorResult<u64> {
    let hex = value
        .as_str()
        .ok_or_else(|| AnchorError::WalletUnavailable(format!("unexpected chain id {}", value)))?;

    u64::from_str_radix(hex.trim_start_matches("0x"), 16)
        .map_err(|e| AnchorError::WalletUnavailable(format!("invalid chain id {}: {}", hex, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::{MockConnector, MockTransport};
    use crate::ledger::transport::RpcError;

    const SEPOLIA: u64 = 11155111;

    fn config(endpoints: &[&str]) -> LedgerConfig {
        let mut chain = ChainConfig::sepolia();
        chain.rpc_endpoints = endpoints.iter().map(|u| u.to_string()).collect();
        LedgerConfig {
            chain,
            authorization_timeout_ms: 100,
            probe_timeout_ms: 200,
            ..LedgerConfig::default()
        }
    }

    fn healthy_connector() -> MockConnector {
        MockConnector::new().with_endpoint(
            "https://a.example",
            Arc::new(MockTransport::healthy_endpoint("a", SEPOLIA)),
        )
    }

    fn manager(
        config: &LedgerConfig,
        wallet: Option<Arc<MockTransport>>,
        connector: MockConnector,
    ) -> ConnectionManager {
        let wallet = wallet.map(|w| w as Arc<dyn RpcTransport>);
        ConnectionManager::new(config, wallet, Arc::new(connector)).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_acquire_is_single_flight() {
        let account = Address::repeat_byte(0x11);
        let wallet = Arc::new(
            MockTransport::wallet(account, SEPOLIA)
                .with_delay("eth_requestAccounts", Duration::from_millis(200)),
        );
        let mut cfg = config(&["https://a.example"]);
        cfg.authorization_timeout_ms = 2_000;
        let manager = manager(&cfg, Some(wallet.clone()), healthy_connector());

        let (first, second) = tokio::join!(manager.acquire(), manager.acquire());
        let results = [first, second];

        let connected = results
            .iter()
            .filter(|r| matches!(r, Ok(c) if c.is_wallet()))
            .count();
        let pending = results
            .iter()
            .filter(|r| matches!(r, Err(AnchorError::RequestAlreadyPending)))
            .count();
        assert_eq!(connected, 1);
        assert_eq!(pending, 1);
        assert_eq!(wallet.call_count("eth_requestAccounts"), 1);
        assert!(!manager.is_authorizing());
    }

    #[tokio::test]
    async fn test_fallback_after_denial_is_single_flight() {
        let wallet = Arc::new(MockTransport::wallet(Address::repeat_byte(0x11), SEPOLIA));
        wallet.set_response(
            "eth_requestAccounts",
            Err(RpcError::new(4001, "User rejected the request.")),
        );
        let endpoint = Arc::new(
            MockTransport::healthy_endpoint("a", SEPOLIA)
                .with_delay("eth_blockNumber", Duration::from_millis(300)),
        );
        let mut cfg = config(&["https://a.example"]);
        cfg.probe_timeout_ms = 2_000;
        let connector = MockConnector::new().with_endpoint("https://a.example", endpoint.clone());
        let manager = manager(&cfg, Some(wallet.clone()), connector);

        let (first, second) = tokio::join!(manager.acquire(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            manager.acquire().await
        });

        assert_eq!(first.unwrap().capability(), Capability::ReadOnly);
        assert!(matches!(second, Err(AnchorError::RequestAlreadyPending)));
        assert_eq!(wallet.call_count("eth_requestAccounts"), 1);
        assert_eq!(endpoint.call_count("eth_blockNumber"), 1);
        assert!(!manager.is_authorizing());
    }

    #[tokio::test]
    async fn test_concurrent_pool_only_acquire_builds_one_connection() {
        let endpoint = Arc::new(
            MockTransport::healthy_endpoint("a", SEPOLIA)
                .with_delay("eth_blockNumber", Duration::from_millis(50)),
        );
        let connector = MockConnector::new().with_endpoint("https://a.example", endpoint.clone());
        let manager = manager(&config(&["https://a.example"]), None, connector);

        let (first, second) = tokio::join!(manager.acquire(), manager.acquire());

        assert_eq!(first.unwrap().capability(), Capability::ReadOnly);
        assert_eq!(second.unwrap().capability(), Capability::ReadOnly);
        assert_eq!(endpoint.call_count("eth_blockNumber"), 1);
        assert_eq!(endpoint.call_count("eth_getCode"), 1);
    }

    #[tokio::test]
    async fn test_connection_is_cached() {
        let account = Address::repeat_byte(0x11);
        let wallet = Arc::new(MockTransport::wallet(account, SEPOLIA));
        let manager = manager(&config(&["https://a.example"]), Some(wallet.clone()), healthy_connector());

        manager.acquire().await.unwrap();
        manager.acquire().await.unwrap();

        assert_eq!(wallet.call_count("eth_requestAccounts"), 1);
        assert_eq!(manager.current_account().await, Some(account));
        assert_eq!(manager.capability().await, Capability::Wallet);
        assert_eq!(manager.network_status(), Some(NetworkStatus::Matched));
    }

    #[tokio::test]
    async fn test_authorization_timeout_falls_back_to_read_only() {
        let wallet = Arc::new(
            MockTransport::wallet(Address::repeat_byte(0x11), SEPOLIA)
                .with_delay("eth_requestAccounts", Duration::from_millis(500)),
        );
        let manager = manager(&config(&["https://a.example"]), Some(wallet), healthy_connector());

        let connection = manager.acquire().await.unwrap();

        match connection {
            Connection::ReadOnly(read_only) => assert_eq!(read_only.endpoint(), "https://a.example"),
            other => panic!("expected read-only connection, got {:?}", other),
        }
        assert_eq!(manager.current_account().await, None);
        assert!(!manager.is_authorizing());
    }

    #[tokio::test]
    async fn test_denied_authorization_falls_back_to_read_only() {
        let wallet = Arc::new(MockTransport::wallet(Address::repeat_byte(0x11), SEPOLIA));
        wallet.set_response(
            "eth_requestAccounts",
            Err(RpcError::new(4001, "User rejected the request.")),
        );
        let manager = manager(&config(&["https://a.example"]), Some(wallet), healthy_connector());

        let connection = manager.acquire().await.unwrap();

        assert_eq!(connection.capability(), Capability::ReadOnly);
    }

    #[tokio::test]
    async fn test_pending_wallet_request_is_surfaced() {
        let wallet = Arc::new(MockTransport::wallet(Address::repeat_byte(0x11), SEPOLIA));
        wallet.set_response(
            "eth_requestAccounts",
            Err(RpcError::new(-32002, "Request of type 'wallet_requestPermissions' already pending")),
        );
        let connector = healthy_connector();
        let manager = manager(&config(&["https://a.example"]), Some(wallet), connector);

        let result = manager.acquire().await;

        assert!(matches!(result, Err(AnchorError::RequestAlreadyPending)));
        assert!(!manager.is_initialized().await);
    }

    #[tokio::test]
    async fn test_no_wallet_goes_straight_to_pool() {
        let manager = manager(&config(&["https://a.example"]), None, healthy_connector());

        let connection = manager.acquire().await.unwrap();

        assert_eq!(connection.capability(), Capability::ReadOnly);
        assert!(manager.is_initialized().await);
        assert!(manager.network_status().is_none());
    }

    #[tokio::test]
    async fn test_all_endpoints_down_leaves_no_connection() {
        let connector = MockConnector::new()
            .with_endpoint("https://a.example", Arc::new(MockTransport::unreachable("a")))
            .with_endpoint("https://b.example", Arc::new(MockTransport::unreachable("b")));
        let manager = manager(&config(&["https://a.example", "https://b.example"]), None, connector);

        let result = manager.acquire().await;

        assert!(matches!(
            result,
            Err(AnchorError::AllEndpointsUnavailable { attempted: 2 })
        ));
        assert!(!manager.is_initialized().await);
        assert_eq!(manager.capability().await, Capability::None);
    }

    #[tokio::test]
    async fn test_wrong_chain_is_switched() {
        let account = Address::repeat_byte(0x22);
        let wallet = Arc::new(
            MockTransport::wallet(account, 1)
                .with_response("eth_chainId", json!("0xaa36a7"))
                .with_response("wallet_switchEthereumChain", Value::Null),
        );
        let manager = manager(&config(&["https://a.example"]), Some(wallet.clone()), healthy_connector());

        let connection = manager.acquire().await.unwrap();

        match connection {
            Connection::Wallet(wallet_connection) => {
                assert_eq!(wallet_connection.chain_id(), SEPOLIA);
                assert_eq!(wallet_connection.account(), account);
            }
            other => panic!("expected wallet connection, got {:?}", other),
        }
        assert_eq!(manager.network_status(), Some(NetworkStatus::Switched));
        assert_eq!(wallet.call_count("wallet_switchEthereumChain"), 1);
    }

    #[tokio::test]
    async fn test_unremedied_mismatch_falls_back_to_read_only() {
        let wallet = Arc::new(
            MockTransport::wallet(Address::repeat_byte(0x22), 1)
                .with_error("wallet_switchEthereumChain", RpcError::new(4001, "User rejected")),
        );
        let manager = manager(&config(&["https://a.example"]), Some(wallet), healthy_connector());

        let connection = manager.acquire().await.unwrap();

        assert_eq!(connection.capability(), Capability::ReadOnly);
        assert!(manager.network_status().map(|s| s.is_mismatch()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_account_change_replaces_connection() {
        let account = Address::repeat_byte(0x11);
        let wallet = Arc::new(MockTransport::wallet(account, SEPOLIA));
        let manager = manager(&config(&["https://a.example"]), Some(wallet.clone()), healthy_connector());
        manager.acquire().await.unwrap();

        assert!(!manager.on_accounts_changed(&[account]).await);
        assert!(manager.is_initialized().await);

        assert!(manager.on_accounts_changed(&[Address::repeat_byte(0x33)]).await);
        assert!(!manager.is_initialized().await);

        manager.acquire().await.unwrap();
        assert_eq!(wallet.call_count("eth_requestAccounts"), 2);
    }

    #[tokio::test]
    async fn test_chain_change_replaces_connection() {
        let wallet = Arc::new(MockTransport::wallet(Address::repeat_byte(0x11), SEPOLIA));
        let manager = manager(&config(&["https://a.example"]), Some(wallet), healthy_connector());
        manager.acquire().await.unwrap();

        assert!(!manager.on_chain_changed(SEPOLIA).await);
        assert!(manager.on_chain_changed(1).await);
        assert_eq!(manager.capability().await, Capability::None);
    }

    #[test]
    fn test_invalid_contract_address_is_rejected() {
        let mut cfg = config(&["https://a.example"]);
        cfg.chain.contract_address = "0xnot-an-address".to_string();

        let result = ConnectionManager::new(&cfg, None, Arc::new(MockConnector::new()));
        assert!(matches!(result, Err(AnchorError::Config(_))));
    }

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id(&json!("0xaa36a7")).unwrap(), SEPOLIA);
        assert_eq!(parse_chain_id(&json!("0x1")).unwrap(), 1);
        assert!(parse_chain_id(&json!(1)).is_err());
        assert!(parse_chain_id(&json!("0xzz")).is_err());
    }

    #[test]
    fn test_authorization_claim_is_released() {
        let flag = AtomicBool::new(false);
        {
            let _claim = AuthorizationClaim::try_claim(&flag).unwrap();
            assert!(AuthorizationClaim::try_claim(&flag).is_none());
        }
        assert!(AuthorizationClaim::try_claim(&flag).is_some());
    }
}
