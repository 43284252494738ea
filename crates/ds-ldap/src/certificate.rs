//! X.509 certificate handling.
//!
//! A user's certificate is stored as raw DER bytes. Its correlation id is
//! the hex SHA-384 of those bytes, recorded as `certificateId$<id>` in the
//! user's properties attribute.

use aws_lc_rs::digest;
use chrono::{DateTime, Utc};
use ds_model::CertificateMetadata;
use x509_parser::prelude::*;

use crate::config::CERTIFICATE_ID_MARKER;
use crate::error::{MappingError, MappingResult};

/// Details read from a DER certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    /// Issuer distinguished name.
    pub issuer: String,
    /// Subject distinguished name.
    pub subject: String,
    /// End of the validity period.
    pub not_after: DateTime<Utc>,
    /// Whether now is within the validity period.
    pub valid: bool,
    /// Correlation id derived from the bytes.
    pub id: String,
}

/// Parses a DER certificate.
///
/// ## Errors
///
/// Returns `MappingError::InvalidCertificate` if the bytes aren't a
/// well-formed X.509 certificate.
pub fn parse(der: &[u8]) -> MappingResult<ParsedCertificate> {
    let (rest, cert) = X509Certificate::from_der(der)
        .map_err(|e| MappingError::InvalidCertificate(e.to_string()))?;
    if !rest.is_empty() {
        return Err(MappingError::InvalidCertificate(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }

    let validity = cert.validity();
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or_else(|| MappingError::InvalidCertificate("expiration out of range".to_string()))?;

    Ok(ParsedCertificate {
        issuer: cert.issuer().to_string(),
        subject: cert.subject().to_string(),
        not_after,
        valid: validity.is_valid(),
        id: certificate_id(der),
    })
}

/// Correlation id of a certificate: hex SHA-384 of its DER bytes.
#[must_use]
pub fn certificate_id(der: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA384, der).as_ref())
}

/// Properties value recording a correlation id.
#[must_use]
pub fn id_marker(id: &str) -> String {
    format!("{CERTIFICATE_ID_MARKER}{id}")
}

/// Checks if a properties value records a correlation id.
#[must_use]
pub fn is_id_marker(value: &str) -> bool {
    value.starts_with(CERTIFICATE_ID_MARKER)
}

/// Correlation id recorded among `properties`, if any.
#[must_use]
pub fn find_id(properties: &[String]) -> Option<String> {
    properties
        .iter()
        .find_map(|value| value.strip_prefix(CERTIFICATE_ID_MARKER))
        .map(|id| id.split('$').next().unwrap_or(id).to_string())
}

/// Read-time metadata of a certificate.
///
/// The id comes from `properties`, not from the bytes, so a stale or
/// missing marker shows up as such.
pub fn metadata(der: &[u8], properties: &[String]) -> MappingResult<CertificateMetadata> {
    let parsed = parse(der)?;
    Ok(CertificateMetadata {
        id: find_id(properties),
        issuer: parsed.issuer,
        subject: parsed.subject,
        expiration: parsed.not_after,
        valid: parsed.valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::certificate;

    #[test]
    fn parses_generated_certificate() {
        let der = certificate("John Doe", 2020, 2099);
        let parsed = parse(&der).unwrap();

        assert!(parsed.subject.contains("CN=John Doe"));
        assert_eq!(parsed.subject, parsed.issuer);
        assert!(parsed.valid);
        assert_eq!(parsed.not_after.format("%Y").to_string(), "2099");
        assert_eq!(parsed.id, certificate_id(&der));
    }

    #[test]
    fn expired_certificate_is_not_valid() {
        let der = certificate("Old", 2000, 2001);
        assert!(!parse(&der).unwrap().valid);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse(b"not a certificate"),
            Err(MappingError::InvalidCertificate(_))
        ));
    }

    #[test]
    fn id_is_hex_sha384() {
        let id = certificate_id(b"abc");
        assert_eq!(id.len(), 96);
        assert!(id.starts_with("cb00753f45a35e8b"));
    }

    #[test]
    fn finds_marker_among_properties() {
        let properties = vec![
            "quota$10".to_string(),
            id_marker("abcd"),
            "certificateId$later".to_string(),
        ];

        assert_eq!(find_id(&properties).as_deref(), Some("abcd"));
        assert_eq!(properties.iter().filter(|p| is_id_marker(p)).count(), 2);
        assert_eq!(find_id(&["quota$10".to_string()]), None);
    }

    #[test]
    fn metadata_takes_id_from_properties() {
        let der = certificate("Jane", 2020, 2099);
        let meta = metadata(&der, &[id_marker("recorded")]).unwrap();

        assert_eq!(meta.id.as_deref(), Some("recorded"));
        assert!(meta.valid);
        assert!(metadata(&der, &[]).unwrap().id.is_none());
    }
}
