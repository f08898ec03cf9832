//! handlers for the `/cert/requests` endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Form;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use countersign_agent::CaError;
use countersign_cert::{endorses_same_certificate, key_fingerprint, validate_certificate};
use countersign_types::RequestId;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ApiError;
use crate::{AppState, CertRequest, EndorseOutcome};

/// form body for creating a signing request.
#[derive(Debug, Deserialize)]
pub struct CreateForm {
    /// environment to request a certificate for.
    pub environment: Option<String>,
    /// base64 certificate, self-signed by the requester.
    pub cert: Option<String>,
    /// free-text justification.
    pub reason: Option<String>,
}

/// form body for endorsing a request.
#[derive(Debug, Deserialize)]
pub struct EndorseForm {
    /// base64 certificate, re-signed by an authorized signer.
    pub cert: Option<String>,
}

/// query parameters for listing requests.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// restrict the listing to one request id.
    #[serde(rename = "certRequestId")]
    pub cert_request_id: Option<String>,
}

/// one entry in the listing response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEntry {
    environment: String,
    reason: String,
    cert_blob: String,
}

/// POST /cert/requests - accept a new signing request.
pub async fn create_request(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Form(form): Form<CreateForm>,
) -> Result<impl IntoResponse, ApiError> {
    let environment = form
        .environment
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::bad_request("must specify environment"))?;
    let policy = state
        .environments
        .get(&environment)
        .ok_or_else(|| ApiError::bad_request("environment is not configured (is it valid?)"))?;

    let blob = form
        .cert
        .ok_or_else(|| ApiError::bad_request("please specify exactly one cert request"))?;
    let mut cert = validate_certificate(&blob, &policy.authorized_users).map_err(|e| {
        warn!(environment = %environment, remote = %remote, error = %e,
            "rejected certificate request");
        ApiError::bad_request(e.to_string())
    })?;

    let reason = form
        .reason
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::bad_request("you forgot to send in a reason"))?;

    let requester = key_fingerprint(&cert.signature_key);
    // the key id is server-controlled: stamp the configured principal name
    // rather than trusting whatever the requester wrote into the cert.
    let principal = policy
        .authorized_users
        .get(&requester)
        .cloned()
        .ok_or_else(|| {
            ApiError::bad_request(format!("requester fingerprint ({requester}) not found in config"))
        })?;

    let id = RequestId::generate();
    let serial = state.serials.next_serial();
    cert.key_id = principal.clone();
    cert.serial = serial;

    info!(
        serial,
        id = %id,
        environment = %environment,
        requester = %requester,
        principal = %principal,
        remote = %remote,
        principals = ?cert.valid_principals,
        valid_after = cert.valid_after,
        valid_before = cert.valid_before,
        reason = %reason,
        "certificate request accepted"
    );

    state
        .store
        .insert(id.clone(), CertRequest::new(cert, environment, reason))
        .map_err(|e| ApiError::bad_request(format!("request not made: {e}")))?;

    Ok((StatusCode::CREATED, id.into_inner()))
}

/// GET /cert/requests - list pending requests, optionally filtered by id.
pub async fn list_requests(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = match query.cert_request_id.filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            raw.parse::<RequestId>()
                .map_err(|_| ApiError::bad_request("invalid certRequestId"))?,
        ),
        None => None,
    };

    info!(remote = %remote, filter = ?filter, "list pending requests");

    let records = state.store.list(filter.as_ref());
    if records.is_empty() {
        return Err(ApiError::not_found("no certs found"));
    }

    let mut results = HashMap::new();
    for (id, record) in records {
        let cert_blob = record.cert.to_base64().map_err(ApiError::internal)?;
        results.insert(
            id.into_inner(),
            ListEntry {
                environment: record.environment,
                reason: record.reason,
                cert_blob,
            },
        );
    }

    let body = serde_json::to_vec(&results)
        .map_err(|e| ApiError::internal(format!("trouble marshaling json response: {e}")))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

/// GET /cert/requests/{request_id} - poll for the signed certificate.
///
/// responds 412 until the ca signature lands. unknown ids look the same as
/// unsigned ones; the listing endpoint is the way to tell them apart.
pub async fn request_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = request_id
        .parse::<RequestId>()
        .ok()
        .and_then(|id| state.store.get(&id));

    match record {
        Some(record) if record.signed => {
            let blob = record.cert.to_base64().map_err(ApiError::internal)?;
            Ok((
                StatusCode::OK,
                format!("{} {}\n", record.cert.algorithm_id(), blob),
            ))
        }
        _ => Err(ApiError::not_ready("cert not signed yet")),
    }
}

/// POST /cert/requests/{request_id} - endorse a pending request.
pub async fn endorse_request(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Path(request_id): Path<String>,
    Form(form): Form<EndorseForm>,
) -> Result<StatusCode, ApiError> {
    let id: RequestId = request_id
        .parse()
        .map_err(|_| ApiError::not_found("unknown request id"))?;
    let record = state
        .store
        .get(&id)
        .ok_or_else(|| ApiError::not_found("unknown request id"))?;
    let policy = state
        .environments
        .get(&record.environment)
        .ok_or_else(|| ApiError::bad_request("original request has an unconfigured environment"))?;

    let blob = form
        .cert
        .ok_or_else(|| ApiError::bad_request("please specify exactly one cert request"))?;
    let endorsed = validate_certificate(&blob, &policy.authorized_signers).map_err(|e| {
        warn!(id = %id, remote = %remote, error = %e,
            "invalid certificate endorsement received, ignoring");
        ApiError::bad_request(e.to_string())
    })?;

    let signer = key_fingerprint(&endorsed.signature_key);

    // the signer must have endorsed the stored cert, not some other cert
    // they once signed for this id.
    let matches = endorses_same_certificate(&record.cert, &endorsed)
        .map_err(ApiError::internal)?;
    if !matches {
        warn!(id = %id, signer = %signer, remote = %remote,
            "signature was valid, but cert didn't match");
        return Err(ApiError::bad_request(
            "signature was valid, but cert didn't match",
        ));
    }

    let label = policy
        .authorized_signers
        .get(&signer)
        .cloned()
        .unwrap_or_default();
    let outcome = state
        .store
        .add_endorser(&id, signer, policy.signers_required)
        .ok_or_else(|| ApiError::not_found("unknown request id"))?;

    info!(
        serial = endorsed.serial,
        id = %id,
        signer = %signer,
        label = %label,
        remote = %remote,
        "endorsement received and determined valid"
    );

    match outcome {
        EndorseOutcome::Pending { endorsements } => {
            info!(id = %id, endorsements, "quorum not yet met");
            Ok(StatusCode::OK)
        }
        EndorseOutcome::AlreadySigned => Ok(StatusCode::OK),
        EndorseOutcome::ThresholdReached { cert, endorsements } => {
            info!(id = %id, endorsements, "quorum met, signing now");

            // the signing must run to completion even if the endorsing
            // client disconnects, so it happens on its own task; handler
            // cancellation cannot abort it.
            let ca = Arc::clone(&state.ca);
            let store = Arc::clone(&state.store);
            let signing_key = policy.signing_key_fingerprint;
            let signing_id = id.clone();
            let signing = tokio::spawn(async move {
                let signed = ca.sign_certificate(&cert, &signing_key).await?;
                store.commit_signed(&signing_id, signed);
                Ok::<_, CaError>(())
            });

            match signing.await {
                Ok(Ok(())) => {
                    info!(id = %id, "request signed by the ca");
                    Ok(StatusCode::OK)
                }
                Ok(Err(CaError::KeyNotFound(fingerprint))) => {
                    warn!(id = %id, signing_key = %fingerprint,
                        "couldn't find signing key, unable to sign request");
                    Err(ApiError::not_found(
                        "couldn't find signing key, unable to sign. sorry.",
                    ))
                }
                Ok(Err(e)) => {
                    warn!(id = %id, error = %e, "ca signing failed");
                    Err(ApiError::internal(e))
                }
                Err(e) => Err(ApiError::internal(e)),
            }
        }
    }
}
