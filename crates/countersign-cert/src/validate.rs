//! validation of submitted certificates against an authority table.
//!
//! the same check serves both submission paths: a creation request must be
//! signed by a key in the environment's authorized-user table, an
//! endorsement by a key in its authorized-signer table. only the table
//! differs.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use countersign_types::KeyFingerprint;

use crate::cert::{CertError, CertType, Certificate, VALID_FOREVER, key_fingerprint};

/// validate a base64 certificate blob against `authorities` at the current
/// time.
pub fn validate_certificate(
    blob: &str,
    authorities: &HashMap<KeyFingerprint, String>,
) -> Result<Certificate, ValidateError> {
    validate_certificate_at(blob, authorities, unix_now())
}

/// validate a base64 certificate blob against `authorities` at `now`
/// (unix seconds).
///
/// checks, in order: the blob decodes and parses, the certificate is a user
/// certificate with at least one principal, `now` falls inside the validity
/// window, the signature key's fingerprint appears in `authorities`, and
/// the signature verifies over the to-be-signed encoding.
pub fn validate_certificate_at(
    blob: &str,
    authorities: &HashMap<KeyFingerprint, String>,
    now: u64,
) -> Result<Certificate, ValidateError> {
    let cert = Certificate::from_base64(blob)?;

    if cert.cert_type != CertType::User {
        return Err(ValidateError::Unauthorized("not a user certificate"));
    }
    if cert.valid_principals.is_empty() {
        return Err(ValidateError::Unauthorized("certificate lists no principals"));
    }
    if now < cert.valid_after {
        return Err(ValidateError::Unauthorized("certificate is not yet valid"));
    }
    if cert.valid_before != VALID_FOREVER && now >= cert.valid_before {
        return Err(ValidateError::Unauthorized("certificate has expired"));
    }

    let authority = key_fingerprint(&cert.signature_key);
    if !authorities.contains_key(&authority) {
        return Err(ValidateError::Unauthorized(
            "signing authority is not trusted",
        ));
    }

    cert.verify_signature()
        .map_err(|_| ValidateError::Unauthorized("signature verification failed"))?;

    Ok(cert)
}

/// error type for certificate validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// the blob could not be decoded or parsed.
    #[error("unable to parse certificate: {0}")]
    Malformed(#[from] CertError),

    /// the certificate does not verify against the authority table.
    #[error("certificate not valid: {0}")]
    Unauthorized(&'static str),
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::CertificateBuilder;
    use ssh_key::rand_core::OsRng;
    use ssh_key::{Algorithm, PrivateKey};

    const NOW: u64 = 1_700_000_000;

    fn test_key() -> PrivateKey {
        PrivateKey::random(&mut OsRng, Algorithm::Ed25519).expect("key generation")
    }

    fn cert_blob(
        key: &PrivateKey,
        build: impl FnOnce(CertificateBuilder) -> CertificateBuilder,
    ) -> String {
        let public = key.public_key().key_data().clone();
        let builder = CertificateBuilder::new(public.clone(), NOW - 60, NOW + 3600)
            .key_id("requested-name")
            .valid_principal("alice");
        build(builder)
            .sign(public, key)
            .unwrap()
            .to_base64()
            .unwrap()
    }

    fn authorities(key: &PrivateKey) -> HashMap<KeyFingerprint, String> {
        let mut table = HashMap::new();
        table.insert(
            key_fingerprint(key.public_key().key_data()),
            "alice".to_string(),
        );
        table
    }

    #[test]
    fn accepts_authorized_self_signed_cert() {
        let key = test_key();
        let blob = cert_blob(&key, |b| b);
        let cert = validate_certificate_at(&blob, &authorities(&key), NOW).unwrap();
        assert_eq!(cert.valid_principals, vec!["alice".to_string()]);
    }

    #[test]
    fn rejects_unknown_authority() {
        let key = test_key();
        let stranger = test_key();
        let blob = cert_blob(&key, |b| b);
        let result = validate_certificate_at(&blob, &authorities(&stranger), NOW);
        assert!(matches!(
            result,
            Err(ValidateError::Unauthorized("signing authority is not trusted"))
        ));
    }

    #[test]
    fn rejects_expired_cert() {
        let key = test_key();
        let blob = cert_blob(&key, |b| b);
        let result = validate_certificate_at(&blob, &authorities(&key), NOW + 7200);
        assert!(matches!(
            result,
            Err(ValidateError::Unauthorized("certificate has expired"))
        ));
    }

    #[test]
    fn rejects_not_yet_valid_cert() {
        let key = test_key();
        let blob = cert_blob(&key, |b| b);
        let result = validate_certificate_at(&blob, &authorities(&key), NOW - 3600);
        assert!(matches!(
            result,
            Err(ValidateError::Unauthorized("certificate is not yet valid"))
        ));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let key = test_key();
        let blob = cert_blob(&key, |b| b);
        // valid_before itself is already expired, one second earlier is not
        assert!(validate_certificate_at(&blob, &authorities(&key), NOW + 3600).is_err());
        assert!(validate_certificate_at(&blob, &authorities(&key), NOW + 3599).is_ok());
    }

    #[test]
    fn forever_certs_do_not_expire() {
        let key = test_key();
        let public = key.public_key().key_data().clone();
        let blob = CertificateBuilder::new(public.clone(), 0, VALID_FOREVER)
            .valid_principal("alice")
            .sign(public, &key)
            .unwrap()
            .to_base64()
            .unwrap();
        assert!(validate_certificate_at(&blob, &authorities(&key), u64::MAX - 1).is_ok());
    }

    #[test]
    fn rejects_host_cert() {
        let key = test_key();
        let blob = cert_blob(&key, |b| b.cert_type(CertType::Host));
        let result = validate_certificate_at(&blob, &authorities(&key), NOW);
        assert!(matches!(
            result,
            Err(ValidateError::Unauthorized("not a user certificate"))
        ));
    }

    #[test]
    fn rejects_cert_without_principals() {
        let key = test_key();
        let public = key.public_key().key_data().clone();
        let blob = CertificateBuilder::new(public.clone(), NOW - 60, NOW + 3600)
            .sign(public, &key)
            .unwrap()
            .to_base64()
            .unwrap();
        let result = validate_certificate_at(&blob, &authorities(&key), NOW);
        assert!(matches!(
            result,
            Err(ValidateError::Unauthorized("certificate lists no principals"))
        ));
    }

    #[test]
    fn rejects_tampered_cert() {
        let key = test_key();
        let blob = cert_blob(&key, |b| b);
        let mut cert = Certificate::from_base64(&blob).unwrap();
        cert.key_id = "forged-name".to_string();
        let tampered = cert.to_base64().unwrap();

        let result = validate_certificate_at(&tampered, &authorities(&key), NOW);
        assert!(matches!(
            result,
            Err(ValidateError::Unauthorized("signature verification failed"))
        ));
    }

    #[test]
    fn rejects_garbage_blob() {
        let key = test_key();
        assert!(matches!(
            validate_certificate_at("%%%", &authorities(&key), NOW),
            Err(ValidateError::Malformed(_))
        ));
        assert!(matches!(
            validate_certificate_at("AAAA", &authorities(&key), NOW),
            Err(ValidateError::Malformed(_))
        ));
    }
}
