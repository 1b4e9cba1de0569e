use super::contract;
use super::transport::RpcError;
use super::{EndpointConnector, RpcTransport};
use crate::certificate::OnChainCertificate;
use crate::error::{AnchorError, AnchorResult};
use async_trait::async_trait;
use ethers::types::{Address, Log, TransactionReceipt, H256, U64};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

/// Runtime bytecode stub returned for `eth_getCode` by healthy endpoints
pub const MOCK_CONTRACT_CODE: &str = "0x6080604052348015600f57600080fd5b50";

/// Scripted JSON-RPC transport for development and testing
///
/// This implementation simulates an endpoint or an injected wallet without
/// any real network calls. Each method has a queue of scripted replies:
/// replies are consumed in order and the last one keeps answering. Unscripted
/// methods fail with "method not found". Every request is journaled so
/// tests can assert how often the ledger was contacted.
pub struct MockTransport {
    label: String,
    replies: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            replies: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Endpoint that answers liveness and code probes
    pub fn healthy_endpoint(label: impl Into<String>, chain_id: u64) -> Self {
        Self::new(label)
            .with_response("eth_blockNumber", json!("0x5a3c1f"))
            .with_response("eth_chainId", json!(format!("0x{:x}", chain_id)))
            .with_response("eth_getCode", json!(MOCK_CONTRACT_CODE))
    }

    /// Endpoint that is reachable but has no contract deployed
    pub fn endpoint_without_contract(label: impl Into<String>, chain_id: u64) -> Self {
        let endpoint = Self::healthy_endpoint(label, chain_id);
        endpoint.set_response("eth_getCode", Ok(json!("0x")));
        endpoint
    }

    /// Endpoint whose every request fails below the JSON-RPC layer
    pub fn unreachable(label: impl Into<String>) -> Self {
        let label = label.into();
        let reason = format!("error sending request for url ({}): connection refused", label);
        Self::new(label)
            .with_error("eth_blockNumber", RpcError::network(reason.clone()))
            .with_error("eth_getCode", RpcError::network(reason))
    }

    /// Wallet that authorizes `account` and reports `chain_id`
    pub fn wallet(account: Address, chain_id: u64) -> Self {
        Self::new("mock-wallet")
            .with_response("eth_requestAccounts", json!([account]))
            .with_response("eth_accounts", json!([account]))
            .with_response("eth_chainId", json!(format!("0x{:x}", chain_id)))
    }

    /// Add a successful reply for `method`
    pub fn with_response(self, method: &str, value: Value) -> Self {
        self.push(method, Ok(value));
        self
    }

    /// Add a failing reply for `method`
    pub fn with_error(self, method: &str, error: RpcError) -> Self {
        self.push(method, Err(error));
        self
    }

    /// Delay every reply to `method`
    pub fn with_delay(self, method: &str, delay: Duration) -> Self {
        if let Ok(mut delays) = self.delays.lock() {
            delays.insert(method.to_string(), delay);
        }
        self
    }

    /// Replace whatever is scripted for `method`
    pub fn set_response(&self, method: &str, reply: Result<Value, RpcError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.insert(method.to_string(), VecDeque::from([reply]));
        }
    }

    /// Queue another reply for `method`
    pub fn push(&self, method: &str, reply: Result<Value, RpcError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.entry(method.to_string()).or_default().push_back(reply);
        }
    }

    /// Script the contract's `certificates(id)` view for every id
    pub fn with_certificate(self, certificate: &OnChainCertificate) -> Self {
        let encoded = contract::encode_certificate(certificate);
        self.with_response("eth_call", json!(encoded))
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|(m, _)| m == method).count())
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn next_reply(&self, method: &str) -> Result<Value, RpcError> {
        let mut replies = match self.replies.lock() {
            Ok(replies) => replies,
            Err(_) => return Err(RpcError::new(-32603, "mock transport poisoned")),
        };

        match replies.get_mut(method) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(RpcError::new(-32603, "empty reply queue"))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(RpcError::new(-32603, "empty reply queue"))),
            None => Err(RpcError::new(
                -32601,
                format!("the method {} does not exist/is not available", method),
            )),
        }
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((method.to_string(), params));
        }

        let delay = self
            .delays
            .lock()
            .ok()
            .and_then(|d| d.get(method).copied());
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        self.next_reply(method)
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

/// Maps endpoint URLs to scripted transports
#[derive(Default)]
pub struct MockConnector {
    endpoints: HashMap<String, Arc<MockTransport>>,
    opened: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, url: impl Into<String>, transport: Arc<MockTransport>) -> Self {
        self.endpoints.insert(url.into(), transport);
        self
    }

    /// URLs opened so far, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

impl EndpointConnector for MockConnector {
    fn open(&self, url: &str) -> AnchorResult<Arc<dyn RpcTransport>> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(url.to_string());
        }

        match self.endpoints.get(url) {
            Some(transport) => Ok(transport.clone() as Arc<dyn RpcTransport>),
            None => Err(AnchorError::Provider(format!("Invalid RPC URL {}", url))),
        }
    }
}

/// JSON receipt as a wallet returns it from `eth_getTransactionReceipt`
pub fn receipt_json(
    tx_hash: H256,
    from: Address,
    block_number: u64,
    success: bool,
    logs: Vec<Log>,
) -> Value {
    let receipt = TransactionReceipt {
        transaction_hash: tx_hash,
        block_number: Some(U64::from(block_number)),
        from,
        status: Some(U64::from(u64::from(success))),
        logs,
        ..Default::default()
    };
    serde_json::to_value(receipt).unwrap_or(Value::Null)
}

/// Log carrying the registry's issuance event topic
pub fn issued_event_log(contract_address: Address) -> Log {
    Log {
        address: contract_address,
        topics: vec![contract::issued_event_topic()],
        ..Default::default()
    }
}
