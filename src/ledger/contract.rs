use crate::certificate::{CertificateFields, OnChainCertificate};
use crate::error::{AnchorError, AnchorResult};
use ethers::abi::{self, AbiEncode, ParamType, Token};
use ethers::contract::{abigen, EthEvent};
use ethers::types::{Address, Bytes, H256, U256};

// ABI for the certificate registry contract
abigen!(
    CertificateRegistry,
    r#"[
        function issueCertificate(string certificateId, string studentId, string studentName, string course, string university) external
        function certificates(string certificateId) external view returns (string certificateId, string studentId, string studentName, string course, string university, uint256 timestamp, address issuer, bool exists)
        function isCertificateValid(string certificateId) external view returns (bool)
        function owner() external view returns (address)
        event CertificateIssued(string indexed certificateId, address indexed issuer, string studentId, string studentName, string course, string university, uint256 timestamp)
    ]"#
);

/// Output layout of `certificates(string)`
fn certificate_output_types() -> [ParamType; 8] {
    [
        ParamType::String,
        ParamType::String,
        ParamType::String,
        ParamType::String,
        ParamType::String,
        ParamType::Uint(256),
        ParamType::Address,
        ParamType::Bool,
    ]
}

/// Calldata for `issueCertificate(id, studentId, studentName, course, university)`
pub fn encode_issue(certificate_id: &str, fields: &CertificateFields) -> Bytes {
    IssueCertificateCall {
        certificate_id: certificate_id.to_string(),
        student_id: fields.student_id.clone(),
        student_name: fields.student_name.clone(),
        course: fields.course.clone(),
        university: fields.university.clone(),
    }
    .encode()
    .into()
}

/// Calldata for `certificates(id)`
pub fn encode_lookup(certificate_id: &str) -> Bytes {
    CertificatesCall {
        certificate_id: certificate_id.to_string(),
    }
    .encode()
    .into()
}

/// Calldata for `isCertificateValid(id)`
pub fn encode_is_valid(certificate_id: &str) -> Bytes {
    IsCertificateValidCall {
        certificate_id: certificate_id.to_string(),
    }
    .encode()
    .into()
}

/// Decode the return data of `certificates(id)`
pub fn decode_certificate(data: &[u8]) -> AnchorResult<OnChainCertificate> {
    let tokens = abi::decode(&certificate_output_types(), data).map_err(|e| {
        AnchorError::Provider(format!("Malformed certificate record: {}", e))
    })?;

    let mut tokens = tokens.into_iter();
    let mut next_string = |name: &str| {
        tokens
            .next()
            .and_then(Token::into_string)
            .ok_or_else(|| AnchorError::Provider(format!("Certificate record is missing {}", name)))
    };

    let certificate_id = next_string("certificateId")?;
    let student_id = next_string("studentId")?;
    let student_name = next_string("studentName")?;
    let course = next_string("course")?;
    let university = next_string("university")?;

    let timestamp = tokens
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| AnchorError::Provider("Certificate record is missing timestamp".into()))?;
    let issuer = tokens
        .next()
        .and_then(Token::into_address)
        .ok_or_else(|| AnchorError::Provider("Certificate record is missing issuer".into()))?;
    let exists = tokens
        .next()
        .and_then(Token::into_bool)
        .ok_or_else(|| AnchorError::Provider("Certificate record is missing exists".into()))?;

    Ok(OnChainCertificate {
        certificate_id,
        student_id,
        student_name,
        course,
        university,
        timestamp: if timestamp > U256::from(u64::MAX) {
            u64::MAX
        } else {
            timestamp.as_u64()
        },
        issuer: format!("{:?}", issuer),
        exists,
    })
}

/// Return data a registry would produce for `certificate`
pub fn encode_certificate(certificate: &OnChainCertificate) -> Bytes {
    let issuer: Address = certificate.issuer.parse().unwrap_or_default();
    abi::encode(&[
        Token::String(certificate.certificate_id.clone()),
        Token::String(certificate.student_id.clone()),
        Token::String(certificate.student_name.clone()),
        Token::String(certificate.course.clone()),
        Token::String(certificate.university.clone()),
        Token::Uint(U256::from(certificate.timestamp)),
        Token::Address(issuer),
        Token::Bool(certificate.exists),
    ])
    .into()
}

/// Decode a single `bool` return value
pub fn decode_bool(data: &[u8]) -> AnchorResult<bool> {
    abi::decode(&[ParamType::Bool], data)
        .map_err(|e| AnchorError::Provider(format!("Malformed boolean result: {}", e)))?
        .into_iter()
        .next()
        .and_then(Token::into_bool)
        .ok_or_else(|| AnchorError::Provider("Empty boolean result".to_string()))
}

/// topic0 of `CertificateIssued`
pub fn issued_event_topic() -> H256 {
    CertificateIssuedFilter::signature()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::{id, keccak256};

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

    #[test]
    fn test_issue_selector() {
        let fields = CertificateFields::new("S-1001", "Ada", "CS", "MIT");
        let data = encode_issue("0A1B2C3D", &fields);

        assert_eq!(
            &data[..4],
            &id("issueCertificate(string,string,string,string,string)")[..]
        );
    }

    #[test]
    fn test_lookup_selector() {
        let data = encode_lookup("0A1B2C3D");
        assert_eq!(&data[..4], &id("certificates(string)")[..]);

        let data = encode_is_valid("0A1B2C3D");
        assert_eq!(&data[..4], &id("isCertificateValid(string)")[..]);
    }

    #[test]
    fn test_decode_certificate() {
        let encoded = encode_certificate(&sample(true));
        let decoded = decode_certificate(&encoded).unwrap();

        assert_eq!(decoded, sample(true));
    }

    #[test]
    fn test_decode_missing_certificate() {
        let empty = OnChainCertificate {
            certificate_id: String::new(),
            student_id: String::new(),
            student_name: String::new(),
            course: String::new(),
            university: String::new(),
            timestamp: 0,
            issuer: format!("{:?}", Address::zero()),
            exists: false,
        };

        let decoded = decode_certificate(&encode_certificate(&empty)).unwrap();
        assert!(!decoded.exists);
    }

    #[test]
    fn test_decode_certificate_rejects_garbage() {
        let result = decode_certificate(&[0u8; 3]);
        assert!(matches!(result, Err(AnchorError::Provider(_))));
    }

    #[test]
    fn test_decode_bool() {
        let encoded = abi::encode(&[Token::Bool(true)]);
        assert!(decode_bool(&encoded).unwrap());
        assert!(decode_bool(&[]).is_err());
    }

    #[test]
    fn test_issued_event_topic() {
        let expected = H256::from(keccak256(
            "CertificateIssued(string,address,string,string,string,string,uint256)",
        ));
        assert_eq!(issued_event_topic(), expected);
    }
}
