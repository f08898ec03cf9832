//! shared helpers for countersignd integration tests.

#![allow(dead_code)] // helpers may not all be used in every test file

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode, header};
use countersign_agent::LocalSigner;
use countersign_cert::{Certificate, CertificateBuilder, VALID_FOREVER, key_fingerprint};
use countersign_types::{EnvironmentPolicy, KeyFingerprint};
use countersignd::create_app;
use serde::Deserialize;
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, PrivateKey};
use tower::ServiceExt;

/// one entry of the listing response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    pub environment: String,
    pub reason: String,
    pub cert_blob: String,
}

pub fn test_key() -> PrivateKey {
    PrivateKey::random(&mut OsRng, Algorithm::Ed25519).expect("key generation")
}

pub fn fingerprint(key: &PrivateKey) -> KeyFingerprint {
    key_fingerprint(key.public_key().key_data())
}

/// build a `prod` environment policy for the given keys.
pub fn prod_policy(
    quorum: usize,
    users: &[(&PrivateKey, &str)],
    signers: &[(&PrivateKey, &str)],
    signing_key: KeyFingerprint,
) -> EnvironmentPolicy {
    EnvironmentPolicy {
        signing_key_fingerprint: signing_key,
        authorized_users: users
            .iter()
            .map(|(key, name)| (fingerprint(key), name.to_string()))
            .collect(),
        authorized_signers: signers
            .iter()
            .map(|(key, label)| (fingerprint(key), label.to_string()))
            .collect(),
        signers_required: quorum,
    }
}

/// build an app with a single `prod` environment backed by a local ca.
pub fn test_app(
    quorum: usize,
    users: &[(&PrivateKey, &str)],
    signers: &[(&PrivateKey, &str)],
    ca: LocalSigner,
) -> Router {
    let policy = prod_policy(quorum, users, signers, ca.fingerprint());
    test_app_with_policy(policy, ca)
}

pub fn test_app_with_policy(policy: EnvironmentPolicy, ca: LocalSigner) -> Router {
    let mut environments = HashMap::new();
    environments.insert("prod".to_string(), policy);
    create_app(environments, Arc::new(ca))
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 48372))))
}

/// a self-signed certificate as a requester would submit it.
pub fn request_cert(requester: &PrivateKey, principal: &str) -> Certificate {
    let public = requester.public_key().key_data().clone();
    CertificateBuilder::new(public.clone(), 0, VALID_FOREVER)
        .key_id("client-requested-name")
        .valid_principal(principal)
        .extension("permit-pty")
        .sign(public, requester)
        .expect("signing")
}

pub fn cert_b64(cert: &Certificate) -> String {
    cert.to_base64().expect("encode certificate")
}

/// re-sign a certificate the way an endorsing signer does.
pub fn endorse_b64(cert: &Certificate, signer: &PrivateKey) -> String {
    let mut endorsed = cert.clone();
    endorsed
        .sign_with(signer.public_key().key_data().clone(), signer)
        .expect("signing");
    cert_b64(&endorsed)
}

pub async fn post_form(app: &Router, path: &str, fields: &[(&str, &str)]) -> (StatusCode, String) {
    let body = serde_urlencoded::to_string(fields).expect("encode form");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .expect("build request"),
        )
        .await
        .expect("request failed");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

pub async fn get(app: &Router, path: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(path)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request failed");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

/// submit a request and return its id.
pub async fn create_request(app: &Router, cert: &Certificate, reason: &str) -> String {
    let (status, body) = post_form(
        app,
        "/cert/requests",
        &[
            ("environment", "prod"),
            ("cert", &cert_b64(cert)),
            ("reason", reason),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
    body
}

/// fetch the stored certificate for one request from the listing endpoint.
///
/// this is what a signer does before endorsing: the stored cert carries the
/// server-stamped key id and serial, so endorsing the originally submitted
/// blob would fail the equivalence check.
pub async fn fetch_stored_cert(app: &Router, id: &str) -> Certificate {
    let (status, body) = get(app, &format!("/cert/requests?certRequestId={id}")).await;
    assert_eq!(status, StatusCode::OK, "list failed: {body}");

    let entries: HashMap<String, ListEntry> =
        serde_json::from_str(&body).expect("parse listing");
    let entry = entries.get(id).expect("listing contains the request");
    Certificate::from_base64(&entry.cert_blob).expect("parse stored cert")
}

/// parse the one-line status response `"<type> <base64>\n"`.
pub fn parse_status_body(body: &str) -> Certificate {
    let line = body.strip_suffix('\n').expect("status ends with newline");
    let (cert_type, blob) = line.split_once(' ').expect("status has two fields");
    assert!(cert_type.ends_with("-cert-v01@openssh.com"));
    Certificate::from_base64(blob).expect("parse signed cert")
}
