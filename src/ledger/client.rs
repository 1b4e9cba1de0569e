use super::config::LedgerConfig;
use super::connection::{Connection, ConnectionManager, WalletConnection};
use super::contract;
use super::network_guard::NetworkStatus;
use super::transport::RpcError;
use super::RpcTransport;
use crate::certificate::{CertificateFields, CertificateRecord};
use crate::error::{AnchorError, AnchorResult, ChainError};
use ethers::types::{Address, Bytes, TransactionReceipt, H256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Proof that an issuance transaction was included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceReceipt {
    pub certificate_id: String,
    pub tx_hash: String,
    pub block_number: Option<u64>,
    /// Account that signed the transaction
    pub from: String,
    pub explorer_url: String,
    /// Whether the receipt carries the registry's issuance event
    pub event_emitted: bool,
}

/// Result of querying the registry for an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(CertificateRecord),
    /// The registry has no record for the id. Not an error.
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn into_record(self) -> Option<CertificateRecord> {
        match self {
            Lookup::Found(record) => Some(record),
            Lookup::NotFound => None,
        }
    }
}

/// Reads and writes certificates through whichever connection is active
pub struct LedgerClient {
    manager: Arc<ConnectionManager>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl LedgerClient {
    pub fn new(manager: Arc<ConnectionManager>, config: &LedgerConfig) -> Self {
        Self {
            manager,
            confirmation_timeout: config.confirmation_timeout(),
            poll_interval: config.receipt_poll_interval(),
        }
    }

    /// Override receipt polling, mostly useful for tests
    pub fn with_timing(mut self, confirmation_timeout: Duration, poll_interval: Duration) -> Self {
        self.confirmation_timeout = confirmation_timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Anchor a certificate, acquiring a wallet connection if needed
    pub async fn submit(
        &self,
        certificate_id: &str,
        fields: &CertificateFields,
    ) -> AnchorResult<IssuanceReceipt> {
        let wallet = self.writable(self.manager.acquire().await?)?;
        self.submit_with(&wallet, certificate_id, fields).await
    }

    /// Anchor a certificate on an already validated wallet connection
    pub async fn submit_with(
        &self,
        wallet: &WalletConnection,
        certificate_id: &str,
        fields: &CertificateFields,
    ) -> AnchorResult<IssuanceReceipt> {
        let fields = fields.trimmed();
        let data = contract::encode_issue(certificate_id, &fields);
        let transport = wallet.transport();

        let tx_hash = self.send_transaction(transport.as_ref(), wallet.account(), data).await?;
        let tx_hash_hex = format!("{:?}", tx_hash);
        tracing::info!(certificate_id, tx_hash = %tx_hash_hex, "issuance transaction sent");

        let receipt = self.wait_for_receipt(transport.as_ref(), tx_hash).await?;

        if receipt.status.map(|s| s.as_u64()) == Some(0) {
            tracing::error!(certificate_id, tx_hash = %tx_hash_hex, "issuance transaction reverted");
            return Err(ChainError::Reverted {
                tx_hash: tx_hash_hex,
            }
            .into());
        }

        let event_topic = contract::issued_event_topic();
        let contract_address = self.manager.contract_address();
        let event_emitted = receipt
            .logs
            .iter()
            .any(|log| log.address == contract_address && log.topics.first() == Some(&event_topic));

        let block_number = receipt.block_number.map(|b| b.as_u64());
        tracing::info!(
            certificate_id,
            tx_hash = %tx_hash_hex,
            block_number = ?block_number,
            event_emitted,
            "certificate anchored"
        );

        Ok(IssuanceReceipt {
            certificate_id: certificate_id.to_string(),
            explorer_url: self.manager.chain().tx_explorer_url(&tx_hash_hex),
            tx_hash: tx_hash_hex,
            block_number,
            from: format!("{:?}", wallet.account()),
            event_emitted,
        })
    }

    /// Fetch the registry's record for `certificate_id`
    pub async fn lookup(&self, certificate_id: &str) -> AnchorResult<Lookup> {
        let connection = self.connection_for_read().await?;

        let data = self
            .call(connection.transport().as_ref(), contract::encode_lookup(certificate_id))
            .await?;
        let certificate = contract::decode_certificate(&data)?;

        if !certificate.exists {
            tracing::debug!(certificate_id, "certificate not found on ledger");
            return Ok(Lookup::NotFound);
        }

        Ok(Lookup::Found(certificate.into_record()))
    }

    /// The registry's own `isCertificateValid` view
    pub async fn is_certificate_valid(&self, certificate_id: &str) -> AnchorResult<bool> {
        let connection = self.connection_for_read().await?;

        let data = self
            .call(connection.transport().as_ref(), contract::encode_is_valid(certificate_id))
            .await?;
        contract::decode_bool(&data)
    }

    /// The wallet behind `connection`, or why it cannot issue
    pub fn writable(&self, connection: Connection) -> AnchorResult<WalletConnection> {
        match connection {
            Connection::Wallet(wallet) => Ok(wallet),
            Connection::ReadOnly(_) => match self.manager.network_status() {
                Some(NetworkStatus::Mismatch {
                    expected, actual, ..
                }) => Err(AnchorError::NetworkMismatch { expected, actual }),
                _ => Err(AnchorError::ReadOnlyCannotWrite),
            },
        }
    }

    async fn connection_for_read(&self) -> AnchorResult<Connection> {
        match self.manager.acquire().await {
            Ok(connection) => Ok(connection),
            Err(AnchorError::RequestAlreadyPending) => Err(AnchorError::RequestAlreadyPending),
            Err(e) => {
                tracing::warn!(error = %e, "no ledger connection for query");
                Err(AnchorError::NoConnection)
            }
        }
    }

    async fn call(&self, transport: &dyn RpcTransport, data: Bytes) -> AnchorResult<Bytes> {
        let value = transport
            .request(
                "eth_call",
                json!([{ "to": self.manager.contract_address(), "data": data }, "latest"]),
            )
            .await
            .map_err(|e| AnchorError::Provider(format!("Contract call failed: {}", e)))?;

        serde_json::from_value(value)
            .map_err(|e| AnchorError::Provider(format!("Malformed call result: {}", e)))
    }

    async fn send_transaction(
        &self,
        transport: &dyn RpcTransport,
        from: Address,
        data: Bytes,
    ) -> AnchorResult<H256> {
        let value = transport
            .request(
                "eth_sendTransaction",
                json!([{
                    "from": from,
                    "to": self.manager.contract_address(),
                    "data": data,
                }]),
            )
            .await
            .map_err(|e| {
                let error = classify_send_error(e);
                tracing::error!(error = %error, "issuance transaction failed");
                AnchorError::Chain(error)
            })?;

        serde_json::from_value(value)
            .map_err(|e| AnchorError::Provider(format!("Malformed transaction hash: {}", e)))
    }

    async fn wait_for_receipt(
        &self,
        transport: &dyn RpcTransport,
        tx_hash: H256,
    ) -> AnchorResult<TransactionReceipt> {
        let deadline = Instant::now() + self.confirmation_timeout;

        loop {
            match transport
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(Value::Null) => {}
                Ok(value) => match serde_json::from_value::<TransactionReceipt>(value) {
                    Ok(receipt) if receipt.block_number.is_some() => return Ok(receipt),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "malformed receipt, polling again"),
                },
                Err(e) => tracing::warn!(error = %e, "receipt poll failed, polling again"),
            }

            if Instant::now() >= deadline {
                tracing::error!(tx_hash = ?tx_hash, "issuance transaction not confirmed in time");
                return Err(AnchorError::ConfirmationTimeout {
                    tx_hash: format!("{:?}", tx_hash),
                });
            }

            sleep(self.poll_interval).await;
        }
    }
}

fn classify_send_error(error: RpcError) -> ChainError {
    if error.is_user_rejection() {
        ChainError::Rejected(error.message)
    } else if error.message.to_lowercase().contains("insufficient funds") {
        ChainError::InsufficientFunds(error.message)
    } else {
        ChainError::Rpc {
            code: error.code,
            message: error.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::OnChainCertificate;
    use crate::ledger::config::ChainConfig;
    use crate::ledger::mock::{issued_event_log, receipt_json, MockConnector, MockTransport};
    use ethers::utils::id;

    const SEPOLIA: u64 = 11155111;

    fn config() -> LedgerConfig {
        let mut chain = ChainConfig::sepolia();
        chain.rpc_endpoints = vec!["https://a.example".to_string()];
        LedgerConfig {
            chain,
            authorization_timeout_ms: 100,
            probe_timeout_ms: 200,
            ..LedgerConfig::default()
        }
    }

    fn contract_address() -> Address {
        ChainConfig::sepolia().contract_address.parse().unwrap()
    }

    fn fields() -> CertificateFields {
        CertificateFields::new(" S-1001 ", "Ada Lovelace", "Analytical Engines", "Cambridge")
    }

    fn client(wallet: Option<Arc<MockTransport>>, endpoint: Arc<MockTransport>) -> LedgerClient {
        let connector = MockConnector::new().with_endpoint("https://a.example", endpoint);
        let wallet = wallet.map(|w| w as Arc<dyn RpcTransport>);
        let manager = ConnectionManager::new(&config(), wallet, Arc::new(connector)).unwrap();

        LedgerClient::new(Arc::new(manager), &config())
            .with_timing(Duration::from_millis(150), Duration::from_millis(10))
    }

    fn sample(exists: bool) -> OnChainCertificate {
        OnChainCertificate {
            certificate_id: "0A1B2C3D".to_string(),
            student_id: "S-1001".to_string(),
            student_name: "Ada Lovelace".to_string(),
            course: "Analytical Engines".to_string(),
            university: "Cambridge".to_string(),
            timestamp: 1_700_000_000,
            issuer: "0x1111111111111111111111111111111111111111".to_string(),
            exists,
        }
    }

    #[tokio::test]
    async fn test_submit_on_read_only_makes_no_network_call() {
        let endpoint = Arc::new(MockTransport::healthy_endpoint("a", SEPOLIA));
        let client = client(None, endpoint.clone());
        client.manager().acquire().await.unwrap();
        let calls_before = endpoint.total_calls();

        let result = client.submit("0A1B2C3D", &fields()).await;

        assert!(matches!(result, Err(AnchorError::ReadOnlyCannotWrite)));
        assert_eq!(endpoint.total_calls(), calls_before);
        assert_eq!(endpoint.call_count("eth_sendTransaction"), 0);
    }

    #[tokio::test]
    async fn test_submit_confirmed() {
        let account = Address::repeat_byte(0x11);
        let tx_hash = H256::repeat_byte(0xab);
        let wallet = Arc::new(
            MockTransport::wallet(account, SEPOLIA)
                .with_response("eth_sendTransaction", json!(tx_hash))
                .with_response("eth_getTransactionReceipt", Value::Null)
                .with_response(
                    "eth_getTransactionReceipt",
                    receipt_json(tx_hash, account, 42, true, vec![issued_event_log(contract_address())]),
                ),
        );
        let endpoint = Arc::new(MockTransport::healthy_endpoint("a", SEPOLIA));
        let client = client(Some(wallet.clone()), endpoint.clone());

        let receipt = client.submit("0A1B2C3D", &fields()).await.unwrap();

        assert_eq!(receipt.tx_hash, format!("{:?}", tx_hash));
        assert_eq!(receipt.block_number, Some(42));
        assert_eq!(receipt.from, format!("{:?}", account));
        assert!(receipt.event_emitted);
        assert!(receipt.explorer_url.starts_with("https://sepolia.etherscan.io/tx/0xabab"));
        assert_eq!(wallet.call_count("eth_getTransactionReceipt"), 2);
        assert_eq!(endpoint.total_calls(), 0);

        let (_, params) = wallet
            .calls()
            .into_iter()
            .find(|(m, _)| m == "eth_sendTransaction")
            .unwrap();
        let selector = format!("0x{}", hex::encode(id("issueCertificate(string,string,string,string,string)")));
        assert!(params[0]["data"].as_str().unwrap().starts_with(&selector));
        assert_eq!(params[0]["from"], json!(account));
        assert_eq!(params[0]["to"], json!(contract_address()));
    }

    #[tokio::test]
    async fn test_submit_reverted() {
        let account = Address::repeat_byte(0x11);
        let tx_hash = H256::repeat_byte(0xcd);
        let wallet = Arc::new(
            MockTransport::wallet(account, SEPOLIA)
                .with_response("eth_sendTransaction", json!(tx_hash))
                .with_response(
                    "eth_getTransactionReceipt",
                    receipt_json(tx_hash, account, 7, false, vec![]),
                ),
        );
        let client = client(Some(wallet), Arc::new(MockTransport::healthy_endpoint("a", SEPOLIA)));

        let result = client.submit("0A1B2C3D", &fields()).await;

        match result {
            Err(AnchorError::Chain(ChainError::Reverted { tx_hash: hash })) => {
                assert_eq!(hash, format!("{:?}", tx_hash));
            }
            other => panic!("expected revert, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_times_out_waiting_for_receipt() {
        let wallet = Arc::new(
            MockTransport::wallet(Address::repeat_byte(0x11), SEPOLIA)
                .with_response("eth_sendTransaction", json!(H256::repeat_byte(0x01)))
                .with_response("eth_getTransactionReceipt", Value::Null),
        );
        let client = client(Some(wallet.clone()), Arc::new(MockTransport::healthy_endpoint("a", SEPOLIA)));

        let result = client.submit("0A1B2C3D", &fields()).await;

        assert!(matches!(result, Err(AnchorError::ConfirmationTimeout { .. })));
        assert!(wallet.call_count("eth_getTransactionReceipt") > 1);
    }

    #[tokio::test]
    async fn test_submit_rejected_by_user() {
        let wallet = Arc::new(
            MockTransport::wallet(Address::repeat_byte(0x11), SEPOLIA).with_error(
                "eth_sendTransaction",
                RpcError::new(4001, "User denied transaction signature."),
            ),
        );
        let client = client(Some(wallet.clone()), Arc::new(MockTransport::healthy_endpoint("a", SEPOLIA)));

        let result = client.submit("0A1B2C3D", &fields()).await;

        assert!(matches!(result, Err(AnchorError::Chain(ChainError::Rejected(_)))));
        assert_eq!(wallet.call_count("eth_sendTransaction"), 1);
        assert_eq!(wallet.call_count("eth_getTransactionReceipt"), 0);
    }

    #[tokio::test]
    async fn test_submit_with_wallet_on_wrong_chain() {
        let wallet = Arc::new(
            MockTransport::wallet(Address::repeat_byte(0x11), 1)
                .with_error("wallet_switchEthereumChain", RpcError::new(4001, "User rejected")),
        );
        let client = client(Some(wallet.clone()), Arc::new(MockTransport::healthy_endpoint("a", SEPOLIA)));

        let result = client.submit("0A1B2C3D", &fields()).await;

        assert!(matches!(
            result,
            Err(AnchorError::NetworkMismatch {
                expected: SEPOLIA,
                actual: 1
            })
        ));
        assert_eq!(wallet.call_count("eth_sendTransaction"), 0);
    }

    #[test]
    fn test_classify_send_error() {
        assert!(matches!(
            classify_send_error(RpcError::new(4001, "User denied")),
            ChainError::Rejected(_)
        ));
        assert!(matches!(
            classify_send_error(RpcError::new(-32000, "Insufficient funds for gas * price + value")),
            ChainError::InsufficientFunds(_)
        ));
        assert_eq!(
            classify_send_error(RpcError::new(-32603, "nonce too low")),
            ChainError::Rpc {
                code: -32603,
                message: "nonce too low".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let endpoint = Arc::new(
            MockTransport::healthy_endpoint("a", SEPOLIA).with_certificate(&sample(false)),
        );
        let client = client(None, endpoint);

        let result = client.lookup("DEADBEEF").await.unwrap();

        assert_eq!(result, Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_lookup_found() {
        let endpoint = Arc::new(
            MockTransport::healthy_endpoint("a", SEPOLIA).with_certificate(&sample(true)),
        );
        let client = client(None, endpoint.clone());

        let record = client.lookup("0A1B2C3D").await.unwrap().into_record().unwrap();

        assert_eq!(record.certificate_id, "0A1B2C3D");
        assert_eq!(record.student_name, "Ada Lovelace");
        assert!(record.anchored);

        let (_, params) = endpoint
            .calls()
            .into_iter()
            .find(|(m, _)| m == "eth_call")
            .unwrap();
        assert_eq!(params[1], "latest");
    }

    #[tokio::test]
    async fn test_lookup_without_connection() {
        let client = client(None, Arc::new(MockTransport::unreachable("a")));

        let result = client.lookup("0A1B2C3D").await;

        assert!(matches!(result, Err(AnchorError::NoConnection)));
    }

    #[tokio::test]
    async fn test_is_certificate_valid() {
        let encoded = ethers::abi::encode(&[ethers::abi::Token::Bool(true)]);
        let endpoint = Arc::new(
            MockTransport::healthy_endpoint("a", SEPOLIA)
                .with_response("eth_call", json!(Bytes::from(encoded))),
        );
        let client = client(None, endpoint);

        assert!(client.is_certificate_valid("0A1B2C3D").await.unwrap());
    }
}
