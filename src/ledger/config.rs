use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ledger client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    /// Chain the certificate contract lives on
    pub chain: ChainConfig,

    /// Interactive wallet, absent when none is installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletConfig>,

    /// How long to wait for the user to authorize the wallet
    #[serde(default = "default_authorization_timeout_ms")]
    pub authorization_timeout_ms: u64,

    /// Upper bound for each endpoint liveness/code probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// How long to wait for an issuance transaction to be mined
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// Interval between receipt polls while waiting for inclusion
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
}

fn default_authorization_timeout_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    8_000
}

fn default_confirmation_timeout_secs() -> u64 {
    180
}

fn default_receipt_poll_interval_ms() -> u64 {
    2_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::sepolia(),
            wallet: None,
            authorization_timeout_ms: default_authorization_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
        }
    }
}

impl LedgerConfig {
    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_millis(self.authorization_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

/// Native currency as announced to a wallet in `wallet_addEthereumChain`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Chain configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    /// Public read-only endpoints, in fallback priority order
    pub rpc_endpoints: Vec<String>,
    pub contract_address: String,
    pub explorer_url: String,
    pub native_currency: NativeCurrency,
}

/// Wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    /// EIP-1193 endpoint exposed by the wallet (e.g. a desktop wallet's local bridge)
    pub provider_url: String,
}

impl ChainConfig {
    /// Sepolia testnet, where the certificate registry is deployed
    pub fn sepolia() -> Self {
        Self {
            chain_id: 11155111,
            name: "Sepolia Test Network".to_string(),
            rpc_endpoints: vec![
                "https://eth-sepolia.public.blastapi.io".to_string(),
                "https://rpc.sepolia.org".to_string(),
                "https://rpc2.sepolia.org".to_string(),
                "https://sepolia.gateway.tenderly.co".to_string(),
            ],
            contract_address: "0xD2afa4f1a7D4Bd0b8Aff8496dDFa5332DA423ee2".to_string(),
            explorer_url: "https://sepolia.etherscan.io".to_string(),
            native_currency: NativeCurrency {
                name: "Sepolia ETH".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
        }
    }

    /// Local development node (anvil / hardhat)
    pub fn local_devnet() -> Self {
        Self {
            chain_id: 31337,
            name: "Local Devnet".to_string(),
            rpc_endpoints: vec!["http://127.0.0.1:8545".to_string()],
            contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
            explorer_url: "http://127.0.0.1:8545".to_string(),
            native_currency: NativeCurrency {
                name: "Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
        }
    }

    /// Get all available chains
    pub fn all_chains() -> Vec<Self> {
        vec![Self::sepolia(), Self::local_devnet()]
    }

    /// Get chain by ID
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::all_chains().into_iter().find(|c| c.chain_id == chain_id)
    }

    /// Chain id in the `0x`-prefixed form wallets expect
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// Explorer page for a transaction
    pub fn tx_explorer_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}
