//! Certificate issuance and verification
//!
//! Issuing always yields a record the caller can persist. Anchoring on
//! the ledger is attempted when a wallet is usable; when it is not, or
//! when the transaction fails, the record comes back flagged as
//! unanchored together with the reason.

use crate::certificate::{generate_id, is_valid_id, CertificateFields, CertificateRecord};
use crate::error::{AnchorError, AnchorResult, ChainError};
use crate::ledger::{IssuanceAttempt, IssuanceReceipt, IssuanceState, LedgerClient, Lookup};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything the caller needs to persist after an issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceOutcome {
    pub record: CertificateRecord,
    pub tx_hash: Option<String>,
    pub explorer_url: Option<String>,
    pub block_number: Option<u64>,
    /// Why anchoring did not happen, when it did not
    pub anchor_error: Option<String>,
    pub state: IssuanceState,
    pub history: Vec<IssuanceState>,
}

impl IssuanceOutcome {
    pub fn is_anchored(&self) -> bool {
        self.record.anchored
    }
}

/// Result of verifying a certificate id against the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Not a canonical 8-character id, the ledger was not queried
    InvalidFormat,
    NotFound,
    Found(CertificateRecord),
}

pub struct CertificateIssuer {
    client: Arc<LedgerClient>,
}

impl CertificateIssuer {
    pub fn new(client: Arc<LedgerClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<LedgerClient> {
        &self.client
    }

    /// Generate an id for `fields` and try to anchor it.
    ///
    /// Only invalid input is an error. Connectivity and chain failures are
    /// reported in the outcome so the record is still persisted.
    pub async fn issue(
        &self,
        fields: &CertificateFields,
        timestamp: Option<DateTime<Utc>>,
    ) -> AnchorResult<IssuanceOutcome> {
        fields.validate()?;

        let issued_at = timestamp.unwrap_or_else(Utc::now);
        let certificate_id = generate_id(fields, Some(issued_at))?;
        let mut record = CertificateRecord::unanchored(&certificate_id, fields, issued_at);
        let mut attempt = IssuanceAttempt::new();

        let result = self.anchor(&mut attempt, &certificate_id, fields).await?;

        let (receipt, anchor_error) = match result {
            Ok(receipt) => {
                record.anchored = true;
                record.issuer = Some(receipt.from.clone());
                (Some(receipt), None)
            }
            Err(e) => {
                tracing::warn!(
                    certificate_id = %certificate_id,
                    state = attempt.state().name(),
                    error = %e,
                    "certificate kept unanchored"
                );
                (None, Some(e.to_string()))
            }
        };

        Ok(IssuanceOutcome {
            record,
            tx_hash: receipt.as_ref().map(|r| r.tx_hash.clone()),
            explorer_url: receipt.as_ref().map(|r| r.explorer_url.clone()),
            block_number: receipt.as_ref().and_then(|r| r.block_number),
            anchor_error,
            state: attempt.state(),
            history: attempt.history().to_vec(),
        })
    }

    /// Drive one attempt through the state machine. The outer result only
    /// fails on an illegal transition; the inner one is the anchoring result.
    async fn anchor(
        &self,
        attempt: &mut IssuanceAttempt,
        certificate_id: &str,
        fields: &CertificateFields,
    ) -> AnchorResult<Result<IssuanceReceipt, AnchorError>> {
        attempt.advance(IssuanceState::Connecting)?;

        let connection = match self.client.manager().acquire().await {
            Ok(connection) => connection,
            Err(e) => {
                attempt.advance(IssuanceState::Unavailable)?;
                return Ok(Err(e));
            }
        };

        let wallet = match self.client.writable(connection) {
            Ok(wallet) => wallet,
            Err(e) => {
                attempt.advance(IssuanceState::ReadOnlyReady)?;
                return Ok(Err(e));
            }
        };

        attempt.advance(IssuanceState::WalletReady)?;
        attempt.advance(IssuanceState::Submitting)?;

        let result = self.client.submit_with(&wallet, certificate_id, fields).await;
        attempt.advance(match &result {
            Ok(_) => IssuanceState::Confirmed,
            Err(e) => failure_state(e),
        })?;

        Ok(result)
    }

    /// Check an id's format, then look it up on the ledger
    pub async fn verify(&self, certificate_id: &str) -> AnchorResult<Verification> {
        let certificate_id = certificate_id.trim();
        if !is_valid_id(certificate_id) {
            return Ok(Verification::InvalidFormat);
        }

        Ok(match self.client.lookup(certificate_id).await? {
            Lookup::Found(record) => Verification::Found(record),
            Lookup::NotFound => Verification::NotFound,
        })
    }
}

fn failure_state(error: &AnchorError) -> IssuanceState {
    match error {
        AnchorError::Chain(ChainError::Reverted { .. }) => IssuanceState::Reverted,
        AnchorError::ConfirmationTimeout { .. } => IssuanceState::TimedOut,
        _ => IssuanceState::Failed,
    }
}
