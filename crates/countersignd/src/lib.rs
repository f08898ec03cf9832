//! countersignd library - http handlers and application setup.

pub mod cli;
pub mod handlers;
mod serial;
mod store;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use countersign_agent::CaSigner;
use countersign_types::EnvironmentPolicy;

pub use serial::SerialAllocator;
pub use store::{CertRequest, EndorseOutcome, RequestStore, StoreError};

/// application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// per-environment signing policy, immutable for the process lifetime.
    pub environments: Arc<HashMap<String, EnvironmentPolicy>>,
    /// pending and signed certificate requests.
    pub store: Arc<RequestStore>,
    /// certificate serial numbers.
    pub serials: Arc<SerialAllocator>,
    /// the ca signing seam.
    pub ca: Arc<dyn CaSigner>,
}

/// create the axum application with all routes.
pub fn create_app(
    environments: HashMap<String, EnvironmentPolicy>,
    ca: Arc<dyn CaSigner>,
) -> Router {
    let state = AppState {
        environments: Arc::new(environments),
        store: Arc::new(RequestStore::new()),
        serials: Arc::new(SerialAllocator::new()),
        ca,
    };

    Router::new()
        .route(
            "/cert/requests",
            post(handlers::create_request).get(handlers::list_requests),
        )
        .route(
            "/cert/requests/{request_id}",
            get(handlers::request_status).post(handlers::endorse_request),
        )
        .with_state(state)
}
