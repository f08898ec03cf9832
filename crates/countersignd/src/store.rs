//! in-memory certificate request store.
//!
//! holds every request accepted during the process lifetime, keyed by
//! request id. records are created on acceptance, gain endorsers one at a
//! time, and latch to `signed` once the ca signature is committed; they are
//! never removed.
//!
//! all access goes through one store-wide lock. endorsement counting and
//! the signed latch live behind the same lock so concurrent handlers see a
//! consistent record, and ca signing (which blocks on the agent socket)
//! happens strictly outside it: [`RequestStore::add_endorser`] returns a
//! snapshot when the quorum is first met, and
//! [`RequestStore::commit_signed`] latches the result afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Instant;

use countersign_cert::Certificate;
use countersign_types::{KeyFingerprint, RequestId};

/// one accepted certificate request.
#[derive(Debug, Clone)]
pub struct CertRequest {
    /// the certificate as stored; the ca-signed form once `signed` is set.
    pub cert: Certificate,
    /// environment the request was made against. never changes.
    pub environment: String,
    /// requester-supplied justification.
    pub reason: String,
    /// when the request was accepted.
    pub submitted_at: Instant,
    /// fingerprints of signers whose endorsements were accepted.
    pub endorsers: HashSet<KeyFingerprint>,
    /// whether the ca signature has been applied. one-way.
    pub signed: bool,
}

impl CertRequest {
    /// create a fresh record with no endorsements.
    pub fn new(cert: Certificate, environment: String, reason: String) -> Self {
        Self {
            cert,
            environment,
            reason,
            submitted_at: Instant::now(),
            endorsers: HashSet::new(),
            signed: false,
        }
    }
}

/// outcome of committing an endorsement.
#[derive(Debug)]
pub enum EndorseOutcome {
    /// endorsement recorded; the quorum is not yet met.
    Pending {
        /// distinct endorsers so far
        endorsements: usize,
    },
    /// this endorsement met the quorum. the caller must obtain the ca
    /// signature for the snapshot and commit it with
    /// [`RequestStore::commit_signed`].
    ThresholdReached {
        /// the stored certificate at the moment the quorum was met
        cert: Certificate,
        /// distinct endorsers so far
        endorsements: usize,
    },
    /// the record is already ca-signed; the endorser set is frozen.
    AlreadySigned,
}

/// in-memory request store behind a store-wide lock.
pub struct RequestStore {
    state: RwLock<HashMap<RequestId, CertRequest>>,
}

impl RequestStore {
    /// create an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }

    /// insert a new record. fails if the id is already in use.
    pub fn insert(&self, id: RequestId, request: CertRequest) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();
        if state.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        state.insert(id, request);
        Ok(())
    }

    /// get a copy of a record.
    pub fn get(&self, id: &RequestId) -> Option<CertRequest> {
        let state = self.state.read().unwrap();
        state.get(id).cloned()
    }

    /// list records, optionally restricted to one id.
    pub fn list(&self, filter: Option<&RequestId>) -> Vec<(RequestId, CertRequest)> {
        let state = self.state.read().unwrap();
        match filter {
            Some(id) => state
                .get_key_value(id)
                .map(|(id, request)| vec![(id.clone(), request.clone())])
                .unwrap_or_default(),
            None => state
                .iter()
                .map(|(id, request)| (id.clone(), request.clone()))
                .collect(),
        }
    }

    /// record an endorsement by `signer` and report where that leaves the
    /// request relative to `quorum`.
    ///
    /// duplicate endorsements from one signer are idempotent. a record that
    /// is already signed is left untouched. returns `None` for unknown ids.
    pub fn add_endorser(
        &self,
        id: &RequestId,
        signer: KeyFingerprint,
        quorum: usize,
    ) -> Option<EndorseOutcome> {
        let mut state = self.state.write().unwrap();
        let request = state.get_mut(id)?;

        if request.signed {
            return Some(EndorseOutcome::AlreadySigned);
        }

        request.endorsers.insert(signer);
        let endorsements = request.endorsers.len();

        if endorsements >= quorum {
            Some(EndorseOutcome::ThresholdReached {
                cert: request.cert.clone(),
                endorsements,
            })
        } else {
            Some(EndorseOutcome::Pending { endorsements })
        }
    }

    /// latch a record as signed and store the ca-signed certificate.
    ///
    /// a no-op returning `false` if the record is unknown or already
    /// latched, so a lost race with another signing attempt commits only
    /// the first result.
    pub fn commit_signed(&self, id: &RequestId, cert: Certificate) -> bool {
        let mut state = self.state.write().unwrap();
        match state.get_mut(id) {
            Some(request) if !request.signed => {
                request.cert = cert;
                request.signed = true;
                true
            }
            _ => false,
        }
    }
}

impl Default for RequestStore {
    fn default() -> Self {
        Self::new()
    }
}

/// error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// a record with this id already exists.
    #[error("request id '{0}' already in use")]
    DuplicateId(RequestId),
}

#[cfg(test)]
fn test_cert() -> Certificate {
    use countersign_cert::{CertificateBuilder, VALID_FOREVER};
    use ssh_key::rand_core::OsRng;
    use ssh_key::{Algorithm, PrivateKey};

    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).expect("key generation");
    let public = key.public_key().key_data().clone();
    CertificateBuilder::new(public.clone(), 0, VALID_FOREVER)
        .serial(1)
        .key_id("alice")
        .valid_principal("alice")
        .sign(public, &key)
        .expect("signing")
}

#[cfg(test)]
fn test_request() -> CertRequest {
    CertRequest::new(test_cert(), "prod".to_string(), "deploy".to_string())
}
