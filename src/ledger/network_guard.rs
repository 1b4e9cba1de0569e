use super::config::ChainConfig;
use super::connection::WalletConnection;
use super::transport::RpcError;
use super::RpcTransport;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Outcome of checking a wallet's chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    /// The wallet already targets the expected chain
    Matched,

    /// The wallet accepted a switch; its previous handle is now stale
    Switched,

    /// The wallet stays on the wrong chain
    Mismatch {
        expected: u64,
        actual: u64,
        reason: String,
    },
}

impl NetworkStatus {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, NetworkStatus::Mismatch { .. })
    }
}

/// Keeps a wallet connection on the chain the registry is deployed to
///
/// Switch and add requests are fire-and-forget: a successful switch
/// invalidates the wallet handle, so the caller rebuilds its connection
/// rather than reusing the one passed in here.
pub struct NetworkGuard {
    chain: ChainConfig,
}

impl NetworkGuard {
    pub fn new(chain: ChainConfig) -> Self {
        Self { chain }
    }

    pub fn expected_chain_id(&self) -> u64 {
        self.chain.chain_id
    }

    /// Compare the wallet's chain with the expected one and ask the
    /// wallet to switch (adding the chain first if it is unknown).
    pub async fn ensure(&self, wallet: &WalletConnection) -> NetworkStatus {
        let expected = self.chain.chain_id;
        let actual = wallet.chain_id();

        if actual == expected {
            return NetworkStatus::Matched;
        }

        tracing::warn!(expected, actual, "wallet is on the wrong chain, requesting switch");

        let transport = wallet.transport();
        let mismatch = |reason: String| {
            tracing::warn!(expected, actual, %reason, "could not move wallet to expected chain");
            NetworkStatus::Mismatch {
                expected,
                actual,
                reason,
            }
        };

        match self.request_switch(transport.as_ref()).await {
            Ok(()) => NetworkStatus::Switched,
            Err(e) if e.is_unrecognized_chain() => {
                tracing::info!(chain = %self.chain.name, "wallet does not know the chain, requesting add");

                if let Err(add_error) = self.request_add(transport.as_ref()).await {
                    return mismatch(format!("adding chain failed: {}", add_error));
                }

                match self.request_switch(transport.as_ref()).await {
                    Ok(()) => NetworkStatus::Switched,
                    Err(e) => mismatch(format!("switching after add failed: {}", e)),
                }
            }
            Err(e) => mismatch(format!("switching chain failed: {}", e)),
        }
    }

    async fn request_switch(&self, transport: &dyn RpcTransport) -> Result<(), RpcError> {
        transport
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": self.chain.chain_id_hex() }]),
            )
            .await
            .map(|_| ())
    }

    async fn request_add(&self, transport: &dyn RpcTransport) -> Result<(), RpcError> {
        transport
            .request("wallet_addEthereumChain", self.add_chain_params())
            .await
            .map(|_| ())
    }

    /// Parameters for `wallet_addEthereumChain`
    pub fn add_chain_params(&self) -> Value {
        let currency = &self.chain.native_currency;
        json!([{
            "chainId": self.chain.chain_id_hex(),
            "chainName": self.chain.name,
            "nativeCurrency": {
                "name": currency.name,
                "symbol": currency.symbol,
                "decimals": currency.decimals,
            },
            "rpcUrls": self.chain.rpc_endpoints,
            "blockExplorerUrls": [self.chain.explorer_url],
        }])
    }
}
