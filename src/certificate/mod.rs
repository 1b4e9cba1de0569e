pub mod id;
pub mod record;

pub use id::{
    extract_metadata, generate_id, is_valid_id, CertificateIdMetadata, CANONICAL_ID_LEN,
    FALLBACK_ID_LEN,
};
pub use record::{CertificateFields, CertificateRecord, OnChainCertificate};
