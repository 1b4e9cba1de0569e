//! Certificate anchoring client
//!
//! Derives compact certificate ids, anchors them in a registry contract on
//! an Ethereum-compatible ledger and verifies them later. Connections go
//! through an interactive wallet when one is available and degrade to a
//! pool of public read-only endpoints otherwise.

pub mod certificate;
pub mod error;
pub mod issuance;
pub mod ledger;
pub mod logger;
pub mod repository;

pub use certificate::{
    extract_metadata, generate_id, is_valid_id, CertificateFields, CertificateRecord,
};
pub use error::{AnchorError, AnchorResult, ChainError};
pub use issuance::{CertificateIssuer, IssuanceOutcome, Verification};
pub use ledger::{
    Capability, ConnectionManager, LedgerClient, LedgerClientFactory, LedgerConfig,
    LedgerConfigBuilder, Lookup,
};
