use crate::error::{AnchorError, AnchorResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The four user-supplied fields a certificate is issued for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateFields {
    pub student_id: String,
    pub student_name: String,
    pub course: String,
    pub university: String,
}

impl CertificateFields {
    pub fn new(
        student_id: impl Into<String>,
        student_name: impl Into<String>,
        course: impl Into<String>,
        university: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            student_name: student_name.into(),
            course: course.into(),
            university: university.into(),
        }
    }

    /// Copy of the fields with surrounding whitespace removed
    pub fn trimmed(&self) -> Self {
        Self {
            student_id: self.student_id.trim().to_string(),
            student_name: self.student_name.trim().to_string(),
            course: self.course.trim().to_string(),
            university: self.university.trim().to_string(),
        }
    }

    /// Every field must be non-empty after trimming
    pub fn validate(&self) -> AnchorResult<()> {
        let named = [
            ("studentId", &self.student_id),
            ("studentName", &self.student_name),
            ("course", &self.course),
            ("university", &self.university),
        ];

        let missing: Vec<&str> = named
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AnchorError::Validation(format!(
                "all certificate fields are required, missing: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Certificate as handed back to the caller for persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    /// 8 uppercase hex characters for canonical ids
    pub certificate_id: String,
    pub student_id: String,
    pub student_name: String,
    pub course: String,
    pub university: String,
    pub issued_at: DateTime<Utc>,

    /// Account that anchored the certificate, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Whether the certificate hash is recorded on the ledger
    pub anchored: bool,
}

impl CertificateRecord {
    /// Record for a certificate that has not (yet) been anchored
    pub fn unanchored(
        certificate_id: impl Into<String>,
        fields: &CertificateFields,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let fields = fields.trimmed();
        Self {
            certificate_id: certificate_id.into(),
            student_id: fields.student_id,
            student_name: fields.student_name,
            course: fields.course,
            university: fields.university,
            issued_at,
            issuer: None,
            anchored: false,
        }
    }

    pub fn fields(&self) -> CertificateFields {
        CertificateFields::new(
            self.student_id.clone(),
            self.student_name.clone(),
            self.course.clone(),
            self.university.clone(),
        )
    }
}

/// Raw result of the contract's `certificates(id)` view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainCertificate {
    pub certificate_id: String,
    pub student_id: String,
    pub student_name: String,
    pub course: String,
    pub university: String,
    /// Block timestamp in seconds
    pub timestamp: u64,
    pub issuer: String,
    pub exists: bool,
}

impl OnChainCertificate {
    pub fn into_record(self) -> CertificateRecord {
        let issued_at = i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_default();

        CertificateRecord {
            certificate_id: self.certificate_id,
            student_id: self.student_id,
            student_name: self.student_name,
            course: self.course,
            university: self.university,
            issued_at,
            issuer: Some(self.issuer),
            anchored: self.exists,
        }
    }
}
