//! the ca signing seam.
//!
//! once a request reaches quorum the daemon hands the certificate to a
//! [`CaSigner`] for the final ca signature. the production implementation
//! talks to an ssh key-agent over a unix socket; the agent holds the ca
//! private keys and this process never sees them. [`LocalSigner`] signs
//! with an in-process key for development and tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use countersign_cert::{CertError, Certificate, key_fingerprint};
use countersign_types::KeyFingerprint;
use ssh_agent_client_rs::Client;
use ssh_key::PrivateKey;

/// signs quorum-approved certificates with an environment's ca key.
#[async_trait]
pub trait CaSigner: Send + Sync {
    /// produce the ca-signed form of `cert` using the key identified by
    /// `signing_key`.
    ///
    /// the returned certificate carries a fresh nonce, the ca key as its
    /// signature key, and the ca signature over the to-be-signed encoding.
    async fn sign_certificate(
        &self,
        cert: &Certificate,
        signing_key: &KeyFingerprint,
    ) -> Result<Certificate, CaError>;
}

/// ca signer backed by an ssh key-agent.
///
/// holds one long-lived connection to the agent socket, reused across
/// requests. the agent protocol is synchronous, so signing runs on the
/// blocking thread pool.
pub struct AgentSigner {
    client: Arc<Mutex<Client>>,
}

impl AgentSigner {
    /// connect to the agent socket.
    pub fn connect(socket: &Path) -> Result<Self, CaError> {
        let client = Client::connect(socket)?;
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }
}

#[async_trait]
impl CaSigner for AgentSigner {
    async fn sign_certificate(
        &self,
        cert: &Certificate,
        signing_key: &KeyFingerprint,
    ) -> Result<Certificate, CaError> {
        let client = Arc::clone(&self.client);
        let mut cert = cert.clone();
        let signing_key = *signing_key;

        tokio::task::spawn_blocking(move || {
            let mut client = client.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

            let identities = client.list_identities()?;
            let ca_key = identities
                .into_iter()
                .find(|identity| key_fingerprint(identity.key_data()) == signing_key)
                .ok_or(CaError::KeyNotFound(signing_key))?;

            let tbs = cert.prepare_resign(ca_key.key_data().clone())?;
            cert.signature = Some(client.sign(&ca_key, &tbs)?);
            Ok(cert)
        })
        .await?
    }
}

/// ca signer holding the private key in-process.
///
/// useful for development and tests; production deployments keep the ca key
/// in an agent.
pub struct LocalSigner {
    key: PrivateKey,
}

impl LocalSigner {
    /// wrap a private key.
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    /// fingerprint of the wrapped key.
    pub fn fingerprint(&self) -> KeyFingerprint {
        key_fingerprint(self.key.public_key().key_data())
    }
}

#[async_trait]
impl CaSigner for LocalSigner {
    async fn sign_certificate(
        &self,
        cert: &Certificate,
        signing_key: &KeyFingerprint,
    ) -> Result<Certificate, CaError> {
        if self.fingerprint() != *signing_key {
            return Err(CaError::KeyNotFound(*signing_key));
        }
        let mut cert = cert.clone();
        cert.sign_with(self.key.public_key().key_data().clone(), &self.key)?;
        Ok(cert)
    }
}

/// error type for ca signing.
#[derive(Debug, thiserror::Error)]
pub enum CaError {
    /// the signer does not hold the requested ca key.
    #[error("signing key {0} is not held by the agent")]
    KeyNotFound(KeyFingerprint),

    /// the agent connection or protocol failed.
    #[error("ssh agent: {0}")]
    Agent(#[from] ssh_agent_client_rs::Error),

    /// certificate encoding failed.
    #[error(transparent)]
    Cert(#[from] CertError),

    /// the blocking signing task was cancelled or panicked.
    #[error("signing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
