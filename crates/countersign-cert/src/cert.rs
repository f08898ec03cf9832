//! openssh certificate type and wire codec.

use base64::prelude::*;
use countersign_types::KeyFingerprint;
use ssh_encoding::{Decode, Encode, Reader, Writer};
use ssh_key::public::{EcdsaPublicKey, Ed25519PublicKey, KeyData, RsaPublicKey};
use ssh_key::{Algorithm, EcdsaCurve, Signature};

/// length of a certificate nonce in bytes.
pub const CERT_NONCE_LEN: usize = 32;

/// `valid_before` value meaning the certificate never expires.
pub const VALID_FOREVER: u64 = u64::MAX;

/// certificate type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertType {
    /// user certificate (the only kind this daemon issues).
    User,
    /// host certificate.
    Host,
}

impl From<CertType> for u32 {
    fn from(cert_type: CertType) -> u32 {
        match cert_type {
            CertType::User => 1,
            CertType::Host => 2,
        }
    }
}

impl TryFrom<u32> for CertType {
    type Error = CertError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CertType::User),
            2 => Ok(CertType::Host),
            other => Err(CertError::InvalidCertType(other)),
        }
    }
}

/// an openssh certificate.
///
/// mirrors the certificate wire format: a public key plus metadata, signed
/// over its to-be-signed encoding by the key in `signature_key`. round-trips
/// byte-for-byte through [`Certificate::from_bytes`] and
/// [`Certificate::to_wire_bytes`].
///
/// `signature` is `None` only for canonical comparison copies; parsed and
/// freshly signed certificates always carry one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// ca-supplied nonce, regenerated on every signing.
    pub nonce: Vec<u8>,
    /// the key this certificate certifies.
    pub public_key: KeyData,
    /// serial number stamped by the daemon at acceptance time.
    pub serial: u64,
    /// user or host certificate.
    pub cert_type: CertType,
    /// key id; the daemon stamps the requester's configured principal name.
    pub key_id: String,
    /// principals the certificate is valid for.
    pub valid_principals: Vec<String>,
    /// start of the validity window (unix seconds).
    pub valid_after: u64,
    /// end of the validity window (unix seconds, [`VALID_FOREVER`] for none).
    pub valid_before: u64,
    /// critical options, in wire order, with raw data blobs.
    pub critical_options: Vec<(String, Vec<u8>)>,
    /// extensions, in wire order, with raw data blobs.
    pub extensions: Vec<(String, Vec<u8>)>,
    /// reserved field, empty in practice.
    pub reserved: Vec<u8>,
    /// public key of whoever signed this certificate.
    pub signature_key: KeyData,
    /// signature over the to-be-signed encoding.
    pub signature: Option<Signature>,
}

impl Certificate {
    /// parse a certificate from its wire encoding.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, CertError> {
        let reader = &mut bytes;
        let cert = Self::decode_inner(reader)?;
        if !reader.is_finished() {
            return Err(ssh_encoding::Error::TrailingData {
                remaining: reader.remaining_len(),
            }
            .into());
        }
        Ok(cert)
    }

    /// parse a certificate from a standard base64 encoding of its wire form.
    pub fn from_base64(blob: &str) -> Result<Self, CertError> {
        let raw = BASE64_STANDARD
            .decode(blob.trim())
            .map_err(CertError::Base64)?;
        Self::from_bytes(&raw)
    }

    /// marshal to the wire encoding.
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>, CertError> {
        let mut out = Vec::new();
        self.encode_tbs(&mut out)?;
        match &self.signature {
            Some(signature) => signature.encode_prefixed(&mut out)?,
            // an absent signature marshals as an empty section
            None => 0u32.encode(&mut out)?,
        }
        Ok(out)
    }

    /// marshal to standard base64 for transport in form fields.
    pub fn to_base64(&self) -> Result<String, CertError> {
        Ok(BASE64_STANDARD.encode(self.to_wire_bytes()?))
    }

    /// the wire algorithm identifier, e.g. `ssh-ed25519-cert-v01@openssh.com`.
    pub fn algorithm_id(&self) -> String {
        format!(
            "{}-cert-v01@openssh.com",
            self.public_key.algorithm().as_str()
        )
    }

    /// the bytes a signer signs: the full encoding minus the signature.
    pub fn tbs_bytes(&self) -> Result<Vec<u8>, CertError> {
        let mut out = Vec::new();
        self.encode_tbs(&mut out)?;
        Ok(out)
    }

    /// verify the signature against the embedded signature key.
    pub fn verify_signature(&self) -> Result<(), CertError> {
        use signature::Verifier;

        let signature = self.signature.as_ref().ok_or(CertError::MissingSignature)?;
        let tbs = self.tbs_bytes()?;
        self.signature_key
            .verify(&tbs, signature)
            .map_err(|_| CertError::InvalidSignature)
    }

    /// install a fresh nonce and `signer_public` as the signature key,
    /// clearing any existing signature, and return the bytes to sign.
    ///
    /// the caller must produce a signature over the returned bytes with the
    /// corresponding private key and store it in `signature`.
    pub fn prepare_resign(&mut self, signer_public: KeyData) -> Result<Vec<u8>, CertError> {
        self.nonce = random_nonce();
        self.signature_key = signer_public;
        self.signature = None;
        self.tbs_bytes()
    }

    /// re-sign with an in-process key.
    pub fn sign_with<S>(&mut self, signer_public: KeyData, signer: &S) -> Result<(), CertError>
    where
        S: signature::Signer<Signature>,
    {
        let tbs = self.prepare_resign(signer_public)?;
        self.signature = Some(signer.try_sign(&tbs).map_err(CertError::Signing)?);
        Ok(())
    }

    fn decode_inner(reader: &mut impl Reader) -> Result<Self, CertError> {
        let type_id = String::decode(reader)?;
        let algorithm = certificate_algorithm(&type_id)
            .ok_or(CertError::UnsupportedAlgorithm(type_id))?;

        let nonce = Vec::<u8>::decode(reader)?;
        let public_key = decode_public_key(&algorithm, reader)?;
        let serial = u64::decode(reader)?;
        let cert_type = CertType::try_from(u32::decode(reader)?)?;
        let key_id = String::decode(reader)?;

        let valid_principals =
            reader.read_prefixed(|reader| -> Result<Vec<String>, CertError> {
                let mut principals = Vec::new();
                while !reader.is_finished() {
                    principals.push(String::decode(reader)?);
                }
                Ok(principals)
            })?;

        let valid_after = u64::decode(reader)?;
        let valid_before = u64::decode(reader)?;
        let critical_options = decode_fields(reader)?;
        let extensions = decode_fields(reader)?;
        let reserved = Vec::<u8>::decode(reader)?;

        let signature_key = reader.read_prefixed(|reader| KeyData::decode(reader))?;
        let signature = reader.read_prefixed(|reader| -> Result<Option<Signature>, CertError> {
            if reader.is_finished() {
                Ok(None)
            } else {
                Ok(Some(Signature::decode(reader)?))
            }
        })?;

        Ok(Self {
            nonce,
            public_key,
            serial,
            cert_type,
            key_id,
            valid_principals,
            valid_after,
            valid_before,
            critical_options,
            extensions,
            reserved,
            signature_key,
            signature,
        })
    }

    fn encode_tbs(&self, writer: &mut impl Writer) -> Result<(), CertError> {
        self.algorithm_id().encode(writer)?;
        self.nonce.encode(writer)?;
        encode_public_key(&self.public_key, writer)?;
        self.serial.encode(writer)?;
        u32::from(self.cert_type).encode(writer)?;
        self.key_id.encode(writer)?;

        // principals are packed strings inside one section
        let mut section_len = 0usize;
        for principal in &self.valid_principals {
            section_len += principal.encoded_len()?;
        }
        encode_section_len(section_len, writer)?;
        for principal in &self.valid_principals {
            principal.encode(writer)?;
        }

        self.valid_after.encode(writer)?;
        self.valid_before.encode(writer)?;
        encode_fields(&self.critical_options, writer)?;
        encode_fields(&self.extensions, writer)?;
        self.reserved.encode(writer)?;
        self.signature_key.encode_prefixed(writer)?;
        Ok(())
    }
}

/// fingerprint a public key by its wire-format blob.
pub fn key_fingerprint(key: &KeyData) -> KeyFingerprint {
    let mut blob = Vec::new();
    key.encode(&mut blob)
        .expect("public key blob encoding does not fail");
    KeyFingerprint::of_blob(&blob)
}

/// check that `endorsed` is an endorsement of exactly `stored`.
///
/// the act of re-signing rewrites the signature key, the signature, and the
/// nonce, so those fields are excluded from the comparison: the endorsed
/// copy's signature key is restored to the stored one, both signatures are
/// dropped, both nonces are cleared, and the remaining wire encodings must
/// match byte for byte. anything else (serial, key id, principals, validity
/// window, options) causes a mismatch, which stops a signer's old signature
/// being replayed against a different request.
pub fn endorses_same_certificate(
    stored: &Certificate,
    endorsed: &Certificate,
) -> Result<bool, CertError> {
    let mut stored = stored.clone();
    let mut endorsed = endorsed.clone();

    endorsed.signature_key = stored.signature_key.clone();
    stored.signature = None;
    endorsed.signature = None;
    stored.nonce.clear();
    endorsed.nonce.clear();

    Ok(stored.to_wire_bytes()? == endorsed.to_wire_bytes()?)
}

/// builder for user certificates; used by clients and tests.
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    public_key: KeyData,
    serial: u64,
    cert_type: CertType,
    key_id: String,
    valid_principals: Vec<String>,
    valid_after: u64,
    valid_before: u64,
    critical_options: Vec<(String, Vec<u8>)>,
    extensions: Vec<(String, Vec<u8>)>,
}

impl CertificateBuilder {
    /// start a builder for `public_key` valid over the given window.
    pub fn new(public_key: KeyData, valid_after: u64, valid_before: u64) -> Self {
        Self {
            public_key,
            serial: 0,
            cert_type: CertType::User,
            key_id: String::new(),
            valid_principals: Vec::new(),
            valid_after,
            valid_before,
            critical_options: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// set the serial number.
    pub fn serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }

    /// set the certificate type.
    pub fn cert_type(mut self, cert_type: CertType) -> Self {
        self.cert_type = cert_type;
        self
    }

    /// set the key id.
    pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = key_id.into();
        self
    }

    /// add a valid principal.
    pub fn valid_principal(mut self, principal: impl Into<String>) -> Self {
        self.valid_principals.push(principal.into());
        self
    }

    /// add a flag extension such as `permit-pty`.
    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push((name.into(), Vec::new()));
        self
    }

    /// sign the assembled certificate and return it.
    pub fn sign<S>(self, signer_public: KeyData, signer: &S) -> Result<Certificate, CertError>
    where
        S: signature::Signer<Signature>,
    {
        let mut cert = Certificate {
            nonce: Vec::new(),
            public_key: self.public_key,
            serial: self.serial,
            cert_type: self.cert_type,
            key_id: self.key_id,
            valid_principals: self.valid_principals,
            valid_after: self.valid_after,
            valid_before: self.valid_before,
            critical_options: self.critical_options,
            extensions: self.extensions,
            reserved: Vec::new(),
            signature_key: signer_public.clone(),
            signature: None,
        };
        cert.sign_with(signer_public, signer)?;
        Ok(cert)
    }
}

/// error type for certificate handling.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// the base64 transport encoding is invalid.
    #[error("unable to base64 decode certificate")]
    Base64(#[source] base64::DecodeError),

    /// the certificate names an algorithm this daemon does not handle.
    #[error("unsupported certificate algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// the certificate type field is neither user nor host.
    #[error("invalid certificate type {0}")]
    InvalidCertType(u32),

    /// the certificate carries no signature.
    #[error("certificate has no signature")]
    MissingSignature,

    /// the signature does not verify against the signature key.
    #[error("signature verification failed")]
    InvalidSignature,

    /// producing a signature failed.
    #[error("signature operation failed: {0}")]
    Signing(signature::Error),

    /// wire encoding or decoding failed.
    #[error("certificate encoding: {0}")]
    Encoding(#[from] ssh_encoding::Error),

    /// embedded key material could not be handled.
    #[error("certificate key material: {0}")]
    Key(#[from] ssh_key::Error),
}

fn certificate_algorithm(id: &str) -> Option<Algorithm> {
    match id {
        "ssh-ed25519-cert-v01@openssh.com" => Some(Algorithm::Ed25519),
        "ssh-rsa-cert-v01@openssh.com" => Some(Algorithm::Rsa { hash: None }),
        "ecdsa-sha2-nistp256-cert-v01@openssh.com" => Some(Algorithm::Ecdsa {
            curve: EcdsaCurve::NistP256,
        }),
        "ecdsa-sha2-nistp384-cert-v01@openssh.com" => Some(Algorithm::Ecdsa {
            curve: EcdsaCurve::NistP384,
        }),
        "ecdsa-sha2-nistp521-cert-v01@openssh.com" => Some(Algorithm::Ecdsa {
            curve: EcdsaCurve::NistP521,
        }),
        _ => None,
    }
}

fn decode_public_key(
    algorithm: &Algorithm,
    reader: &mut impl Reader,
) -> Result<KeyData, CertError> {
    match algorithm {
        Algorithm::Ed25519 => Ok(KeyData::Ed25519(Ed25519PublicKey::decode(reader)?)),
        Algorithm::Rsa { .. } => Ok(KeyData::Rsa(RsaPublicKey::decode(reader)?)),
        Algorithm::Ecdsa { .. } => Ok(KeyData::Ecdsa(EcdsaPublicKey::decode(reader)?)),
        other => Err(CertError::UnsupportedAlgorithm(other.as_str().to_owned())),
    }
}

// the embedded public key is encoded without its own algorithm prefix
fn encode_public_key(key: &KeyData, writer: &mut impl Writer) -> Result<(), CertError> {
    match key {
        KeyData::Ed25519(key) => key.encode(writer)?,
        KeyData::Rsa(key) => key.encode(writer)?,
        KeyData::Ecdsa(key) => key.encode(writer)?,
        other => {
            return Err(CertError::UnsupportedAlgorithm(
                other.algorithm().as_str().to_owned(),
            ));
        }
    }
    Ok(())
}

fn decode_fields(reader: &mut impl Reader) -> Result<Vec<(String, Vec<u8>)>, CertError> {
    reader.read_prefixed(|reader| -> Result<Vec<(String, Vec<u8>)>, CertError> {
        let mut fields = Vec::new();
        while !reader.is_finished() {
            let name = String::decode(reader)?;
            let data = Vec::<u8>::decode(reader)?;
            fields.push((name, data));
        }
        Ok(fields)
    })
}

fn encode_fields(
    fields: &[(String, Vec<u8>)],
    writer: &mut impl Writer,
) -> Result<(), CertError> {
    let mut section_len = 0usize;
    for (name, data) in fields {
        section_len += name.encoded_len()? + data.encoded_len()?;
    }
    encode_section_len(section_len, writer)?;
    for (name, data) in fields {
        name.encode(writer)?;
        data.encode(writer)?;
    }
    Ok(())
}

fn encode_section_len(len: usize, writer: &mut impl Writer) -> Result<(), CertError> {
    let len = u32::try_from(len).map_err(|_| ssh_encoding::Error::Length)?;
    len.encode(writer)?;
    Ok(())
}

fn random_nonce() -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; CERT_NONCE_LEN] = rng.random();
    bytes.to_vec()
}
