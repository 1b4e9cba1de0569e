//! Certificate identifier derivation.
//!
//! Canonical ids are the first 4 bytes of a keccak-256 digest over a JSON
//! payload, rendered as 8 uppercase hex characters. If the payload cannot
//! be serialized the id is derived from a dash-joined string instead and
//! is 12 characters wide. `is_valid_id` only accepts the 8-character form,
//! so fallback ids never validate.

use super::record::CertificateFields;
use crate::error::AnchorResult;
use chrono::{DateTime, Utc};
use ethers::utils::keccak256;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Digest bytes kept for canonical ids (8 hex chars)
const CANONICAL_ID_BYTES: usize = 4;

/// Digest bytes kept for fallback ids (12 hex chars)
const FALLBACK_ID_BYTES: usize = 6;

/// Exclusive upper bound of the payload nonce
const NONCE_BOUND: u32 = 1_000_000;

pub const CANONICAL_ID_LEN: usize = CANONICAL_ID_BYTES * 2;
pub const FALLBACK_ID_LEN: usize = FALLBACK_ID_BYTES * 2;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdPayload<'a> {
    student_id: &'a str,
    student_name: &'a str,
    course: &'a str,
    university: &'a str,
    timestamp: i64,
    nonce: u32,
    /// 128 random bits so two payloads never share a nonce in practice
    salt: String,
}

/// Derive a fresh certificate id.
///
/// Not idempotent: a random nonce is mixed into every call, so identical
/// inputs yield different ids. `timestamp` defaults to now.
pub fn generate_id(
    fields: &CertificateFields,
    timestamp: Option<DateTime<Utc>>,
) -> AnchorResult<String> {
    fields.validate()?;

    let millis = timestamp.unwrap_or_else(Utc::now).timestamp_millis();
    let trimmed = fields.trimmed();
    let mut rng = rand::thread_rng();

    let payload = IdPayload {
        student_id: &trimmed.student_id,
        student_name: &trimmed.student_name,
        course: &trimmed.course,
        university: &trimmed.university,
        timestamp: millis,
        nonce: rng.gen_range(0..NONCE_BOUND),
        salt: hex::encode(rng.gen::<u128>().to_be_bytes()),
    };

    Ok(derive_id(serde_json::to_vec(&payload), fields, millis))
}

fn derive_id(
    serialized: Result<Vec<u8>, serde_json::Error>,
    fields: &CertificateFields,
    millis: i64,
) -> String {
    match serialized {
        Ok(bytes) => digest_prefix(&bytes, CANONICAL_ID_BYTES),
        Err(e) => {
            tracing::warn!(error = %e, "certificate payload serialization failed, using fallback id");
            fallback_id(fields, millis)
        }
    }
}

/// 12-character id over a plain delimited string
fn fallback_id(fields: &CertificateFields, millis: i64) -> String {
    let random: f64 = rand::thread_rng().gen();
    let input = format!(
        "{}-{}-{}-{}-{}-{}",
        fields.student_id, fields.student_name, fields.course, fields.university, millis, random
    );
    digest_prefix(input.as_bytes(), FALLBACK_ID_BYTES)
}

fn digest_prefix(data: &[u8], bytes: usize) -> String {
    let digest = keccak256(data);
    hex::encode_upper(&digest[..bytes])
}

/// Whether `id` has the canonical shape `^[0-9A-F]{8}$`
pub fn is_valid_id(id: &str) -> bool {
    id.len() == CANONICAL_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

/// What can be read back out of a canonical id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateIdMetadata {
    pub prefix: String,
}

/// Ids carry no internal structure, the whole id is the prefix
pub fn extract_metadata(id: &str) -> Option<CertificateIdMetadata> {
    if !is_valid_id(id) {
        return None;
    }
    Some(CertificateIdMetadata {
        prefix: id.to_string(),
    })
}
