//! ssh certificate handling for countersign.
//!
//! this crate owns the openssh certificate wire format: parsing and
//! marshaling, signing and verification, the canonical comparison used by
//! the endorsement protocol, and validation of submitted certificates
//! against an authority table.
//!
//! the certificate type keeps its fields public and mutable because the
//! daemon rewrites server-controlled fields (key id, serial) and the
//! signing flow rewrites the nonce, signature key and signature.

mod cert;
mod validate;

pub use cert::{
    CERT_NONCE_LEN, CertError, CertType, Certificate, CertificateBuilder, VALID_FOREVER,
    endorses_same_certificate, key_fingerprint,
};
pub use validate::{ValidateError, validate_certificate, validate_certificate_at};
