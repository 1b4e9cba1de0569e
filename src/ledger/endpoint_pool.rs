use super::connection::ReadOnlyConnection;
use super::{EndpointConnector, RpcTransport};
use crate::error::{AnchorError, AnchorResult};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

/// A read-only endpoint and what the last probe found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCandidate {
    pub url: String,
    pub last_known_healthy: bool,
}

/// Which check an endpoint failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeStage {
    /// The transport could not be created
    Open,
    /// `eth_blockNumber` failed or timed out
    Liveness,
    /// No code at the registry address, or `eth_getCode` failed
    ContractCode,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeStage::Open => "open",
            ProbeStage::Liveness => "liveness",
            ProbeStage::ContractCode => "contract-code",
        };
        f.write_str(name)
    }
}

/// One failed endpoint attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub url: String,
    pub stage: ProbeStage,
    pub reason: String,
}

impl ProbeFailure {
    fn new(url: &str, stage: ProbeStage, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            stage,
            reason: reason.into(),
        }
    }
}

/// Ordered set of public endpoints used when no wallet is available
///
/// Order is fallback priority. Each `try_connect` walks the list once:
/// no endpoint is retried within a call and one endpoint's failure never
/// stops the next from being probed.
pub struct EndpointPool {
    candidates: Mutex<Vec<EndpointCandidate>>,
    connector: Arc<dyn EndpointConnector>,
    contract_address: Address,
    probe_timeout: Duration,
    last_failures: Mutex<Vec<ProbeFailure>>,
}

impl EndpointPool {
    pub fn new(
        urls: Vec<String>,
        contract_address: Address,
        connector: Arc<dyn EndpointConnector>,
        probe_timeout: Duration,
    ) -> Self {
        let candidates = urls
            .into_iter()
            .map(|url| EndpointCandidate {
                url,
                last_known_healthy: false,
            })
            .collect();

        Self {
            candidates: Mutex::new(candidates),
            connector,
            contract_address,
            probe_timeout,
            last_failures: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the candidates and their health flags
    pub fn candidates(&self) -> Vec<EndpointCandidate> {
        self.candidates.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Failures recorded by the most recent `try_connect`
    pub fn last_failures(&self) -> Vec<ProbeFailure> {
        self.last_failures
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Connect to the first endpoint that is alive and hosts the registry
    pub async fn try_connect(&self) -> AnchorResult<ReadOnlyConnection> {
        let urls: Vec<String> = self.candidates.lock()?.iter().map(|c| c.url.clone()).collect();
        let mut failures = Vec::new();

        let mut connected = None;
        for url in &urls {
            match self.probe(url).await {
                Ok(transport) => {
                    self.mark(url, true)?;
                    connected = Some(ReadOnlyConnection::new(transport, url.clone()));
                    break;
                }
                Err(failure) => {
                    tracing::warn!(
                        url = %failure.url,
                        stage = %failure.stage,
                        reason = %failure.reason,
                        "ledger endpoint unavailable, trying next"
                    );
                    self.mark(url, false)?;
                    failures.push(failure);
                }
            }
        }

        *self.last_failures.lock()? = failures;

        match connected {
            Some(connection) => {
                tracing::info!(url = %connection.endpoint(), "connected to ledger read-only");
                Ok(connection)
            }
            None => {
                tracing::error!(attempted = urls.len(), "all ledger endpoints failed");
                Err(AnchorError::AllEndpointsUnavailable {
                    attempted: urls.len(),
                })
            }
        }
    }

    async fn probe(&self, url: &str) -> Result<Arc<dyn RpcTransport>, ProbeFailure> {
        let transport = self
            .connector
            .open(url)
            .map_err(|e| ProbeFailure::new(url, ProbeStage::Open, e.to_string()))?;

        self.bounded(transport.request("eth_blockNumber", json!([])))
            .await
            .map_err(|reason| ProbeFailure::new(url, ProbeStage::Liveness, reason))?;

        let code = self
            .bounded(transport.request("eth_getCode", json!([self.contract_address, "latest"])))
            .await
            .map_err(|reason| ProbeFailure::new(url, ProbeStage::ContractCode, reason))?;

        if !has_code(&code) {
            return Err(ProbeFailure::new(
                url,
                ProbeStage::ContractCode,
                format!("no contract found at {:?}", self.contract_address),
            ));
        }

        Ok(transport)
    }

    async fn bounded<F>(&self, request: F) -> Result<Value, String>
    where
        F: Future<Output = Result<Value, super::RpcError>>,
    {
        match timeout(self.probe_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.probe_timeout)),
        }
    }

    fn mark(&self, url: &str, healthy: bool) -> AnchorResult<()> {
        let mut candidates = self.candidates.lock()?;
        if let Some(candidate) = candidates.iter_mut().find(|c| c.url == url) {
            candidate.last_known_healthy = healthy;
        }
        Ok(())
    }
}

fn has_code(code: &Value) -> bool {
    code.as_str()
        .map(|s| s.trim_start_matches("0x"))
        .map(|s| !s.is_empty() && s.chars().any(|c| c != '0'))
        .unwrap_or(false)
}
