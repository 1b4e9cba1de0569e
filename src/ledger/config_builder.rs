use super::config::{ChainConfig, LedgerConfig, WalletConfig};
use crate::error::{AnchorError, AnchorResult};
use ethers::types::Address;
use url::Url;

/// Builder for constructing LedgerConfig instances with a fluent API
///
/// # Example
/// ```
/// use certanchor::ledger::{ChainConfig, LedgerConfigBuilder};
///
/// let config = LedgerConfigBuilder::new()
///     .chain(ChainConfig::sepolia())
///     .wallet_url("http://127.0.0.1:1248")
///     .authorization_timeout_ms(5_000)
///     .build()
///     .unwrap();
/// assert!(config.wallet.is_some());
/// ```
#[derive(Debug, Default)]
pub struct LedgerConfigBuilder {
    chain: Option<ChainConfig>,
    wallet: Option<WalletConfig>,
    authorization_timeout_ms: Option<u64>,
    probe_timeout_ms: Option<u64>,
    confirmation_timeout_secs: Option<u64>,
    receipt_poll_interval_ms: Option<u64>,
}

impl LedgerConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chain configuration
    pub fn chain(mut self, chain: ChainConfig) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Set the chain configuration by chain ID
    pub fn chain_id(mut self, chain_id: u64) -> AnchorResult<Self> {
        let chain = ChainConfig::from_chain_id(chain_id)
            .ok_or_else(|| AnchorError::Builder(format!("Unknown chain ID: {}", chain_id)))?;
        self.chain = Some(chain);
        Ok(self)
    }

    /// Replace the read-only endpoints of the chosen chain
    pub fn rpc_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chain = self.chain.take().unwrap_or_else(ChainConfig::sepolia);
        chain.rpc_endpoints = endpoints.into_iter().map(Into::into).collect();
        self.chain = Some(chain);
        self
    }

    /// Set the wallet configuration
    pub fn wallet(mut self, wallet: WalletConfig) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Set the wallet by its provider URL
    pub fn wallet_url(mut self, provider_url: impl Into<String>) -> Self {
        self.wallet = Some(WalletConfig {
            provider_url: provider_url.into(),
        });
        self
    }

    pub fn authorization_timeout_ms(mut self, ms: u64) -> Self {
        self.authorization_timeout_ms = Some(ms);
        self
    }

    pub fn probe_timeout_ms(mut self, ms: u64) -> Self {
        self.probe_timeout_ms = Some(ms);
        self
    }

    pub fn confirmation_timeout_secs(mut self, secs: u64) -> Self {
        self.confirmation_timeout_secs = Some(secs);
        self
    }

    pub fn receipt_poll_interval_ms(mut self, ms: u64) -> Self {
        self.receipt_poll_interval_ms = Some(ms);
        self
    }

    /// Build the LedgerConfig instance
    ///
    /// # Errors
    /// Returns `AnchorError::Builder` if a value is missing or malformed
    pub fn build(self) -> AnchorResult<LedgerConfig> {
        let defaults = LedgerConfig::default();
        let chain = self.chain.unwrap_or(defaults.chain);

        validate_chain(&chain)?;

        if let Some(wallet) = &self.wallet {
            parse_url(&wallet.provider_url, "wallet provider")?;
        }

        let config = LedgerConfig {
            chain,
            wallet: self.wallet,
            authorization_timeout_ms: self
                .authorization_timeout_ms
                .unwrap_or(defaults.authorization_timeout_ms),
            probe_timeout_ms: self.probe_timeout_ms.unwrap_or(defaults.probe_timeout_ms),
            confirmation_timeout_secs: self
                .confirmation_timeout_secs
                .unwrap_or(defaults.confirmation_timeout_secs),
            receipt_poll_interval_ms: self
                .receipt_poll_interval_ms
                .unwrap_or(defaults.receipt_poll_interval_ms),
        };

        let timeouts = [
            ("authorization_timeout_ms", config.authorization_timeout_ms),
            ("probe_timeout_ms", config.probe_timeout_ms),
            ("confirmation_timeout_secs", config.confirmation_timeout_secs),
            ("receipt_poll_interval_ms", config.receipt_poll_interval_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(AnchorError::Builder(format!("{} must be greater than zero", name)));
        }

        Ok(config)
    }
}

fn validate_chain(chain: &ChainConfig) -> AnchorResult<()> {
    if chain.chain_id == 0 {
        return Err(AnchorError::Builder("chain_id must be non-zero".to_string()));
    }

    if chain.rpc_endpoints.is_empty() {
        return Err(AnchorError::Builder(
            "at least one rpc endpoint is required".to_string(),
        ));
    }

    for endpoint in &chain.rpc_endpoints {
        parse_url(endpoint, "rpc endpoint")?;
    }

    chain.contract_address.parse::<Address>().map_err(|e| {
        AnchorError::Builder(format!(
            "Invalid contract address {}: {}",
            chain.contract_address, e
        ))
    })?;

    Ok(())
}

fn parse_url(raw: &str, what: &str) -> AnchorResult<Url> {
    Url::parse(raw).map_err(|e| AnchorError::Builder(format!("Invalid {} URL {}: {}", what, raw, e)))
}
